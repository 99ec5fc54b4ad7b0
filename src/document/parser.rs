//! Markdown parsing with comrak.

use anyhow::Result;
use comrak::nodes::{AstNode, ListType, NodeValue};
use comrak::{Arena, Options, parse_document};

use super::types::{MathId, Node, NodeKind, VisualTree};

/// Parse markdown source into a neutral (unthemed) visual tree.
///
/// # Example
///
/// ```
/// use mdpress::document::parse;
///
/// let tree = parse("# Hello\n\nWorld").unwrap();
/// assert_eq!(tree.root().children.len(), 2);
/// ```
pub fn parse(source: &str) -> Result<VisualTree> {
    let arena = Arena::new();
    let options = create_options();
    let root = parse_document(&arena, source, &options);

    let mut state = ParseState::default();
    let mut children = Vec::new();
    for child in root.children() {
        convert_into(child, &mut children, &mut state);
    }
    Ok(VisualTree::new(Node::with_children(
        NodeKind::Document,
        children,
    )))
}

fn create_options() -> Options {
    let mut options = Options::default();

    // Enable GFM extensions
    options.extension.strikethrough = true;
    options.extension.table = true;
    options.extension.autolink = true;
    options.extension.tasklist = true;
    options.extension.footnotes = true;

    // `$inline$` and `$$display$$` math
    options.extension.math_dollars = true;

    options
}

/// Container levels kept as structure. Anything nested deeper is read
/// as one flat paragraph.
const MAX_DEPTH: usize = 32;

#[derive(Debug, Default)]
struct ParseState {
    next_math: usize,
    depth: usize,
}

impl ParseState {
    const fn math_id(&mut self) -> MathId {
        let id = MathId(self.next_math);
        self.next_math += 1;
        id
    }
}

fn convert_children<'a>(node: &'a AstNode<'a>, state: &mut ParseState) -> Vec<Node> {
    let mut out = Vec::new();
    state.depth += 1;
    for child in node.children() {
        convert_into(child, &mut out, state);
    }
    state.depth -= 1;
    out
}

fn convert_into<'a>(node: &'a AstNode<'a>, out: &mut Vec<Node>, state: &mut ParseState) {
    let value = node.data.borrow().value.clone();
    let kind = match value {
        NodeValue::Heading(heading) => NodeKind::Heading(heading.level.clamp(1, 6)),
        NodeValue::Paragraph => {
            if is_display_math_paragraph(node) {
                for child in node.children() {
                    if let NodeValue::Math(math) = &child.data.borrow().value {
                        out.push(Node::new(NodeKind::MathBlock(
                            state.math_id(),
                            math.literal.trim().to_string(),
                        )));
                    }
                }
                return;
            }
            NodeKind::Paragraph
        }
        NodeValue::Text(text) => {
            out.push(Node::text(text));
            return;
        }
        NodeValue::Emph => NodeKind::Emphasis,
        NodeValue::Strong => NodeKind::Strong,
        NodeValue::Strikethrough => NodeKind::Strikethrough,
        NodeValue::Code(code) => {
            out.push(Node::new(NodeKind::InlineCode(code.literal)));
            return;
        }
        NodeValue::CodeBlock(code_block) => {
            let language = code_block
                .info
                .split_whitespace()
                .next()
                .filter(|s| !s.is_empty())
                .map(ToString::to_string);
            let literal = code_block.literal.trim_end_matches('\n').to_string();
            out.push(Node::with_children(
                NodeKind::CodeBlock { language },
                code_lines(&literal),
            ));
            return;
        }
        NodeValue::Link(link) => NodeKind::Link { url: link.url },
        NodeValue::Image(link) => {
            out.push(Node::new(NodeKind::Image {
                src: link.url,
                alt: node_text(node),
            }));
            return;
        }
        NodeValue::Math(math) => {
            let id = state.math_id();
            let tex = math.literal.trim().to_string();
            let kind = if math.display_math {
                NodeKind::MathBlock(id, tex)
            } else {
                NodeKind::MathInline(id, tex)
            };
            out.push(Node::new(kind));
            return;
        }
        NodeValue::List(list) => NodeKind::List {
            ordered: list.list_type == ListType::Ordered,
            start: list.start,
        },
        NodeValue::Item(_) => NodeKind::ListItem { checked: None },
        NodeValue::TaskItem(symbol) => NodeKind::ListItem {
            checked: Some(symbol.is_some()),
        },
        NodeValue::BlockQuote => NodeKind::BlockQuote,
        NodeValue::Table(_) => NodeKind::Table,
        NodeValue::TableRow(header) => NodeKind::TableRow { header },
        NodeValue::TableCell => NodeKind::TableCell,
        NodeValue::ThematicBreak => {
            out.push(Node::new(NodeKind::ThematicBreak));
            return;
        }
        NodeValue::SoftBreak => {
            out.push(Node::new(NodeKind::SoftBreak));
            return;
        }
        NodeValue::LineBreak => {
            out.push(Node::new(NodeKind::LineBreak));
            return;
        }
        NodeValue::HtmlInline(html) => {
            out.push(Node::text(html));
            return;
        }
        NodeValue::HtmlBlock(html) => {
            let text = html.literal.trim_end().to_string();
            if !text.is_empty() {
                out.push(Node::with_children(
                    NodeKind::Paragraph,
                    vec![Node::text(text)],
                ));
            }
            return;
        }
        NodeValue::FootnoteReference(reference) => {
            out.push(Node::text(format!("[{}]", reference.name)));
            return;
        }
        NodeValue::FrontMatter(_) => return,
        _ => {
            // Splice children of containers without a visual kind of their own
            out.extend(convert_children(node, state));
            return;
        }
    };

    if state.depth < MAX_DEPTH {
        let children = convert_children(node, state);
        out.push(Node::with_children(kind, children));
        return;
    }
    let inlines = flat_inlines(node, state);
    match kind {
        NodeKind::BlockQuote
        | NodeKind::List { .. }
        | NodeKind::ListItem { .. }
        | NodeKind::Table
        | NodeKind::TableRow { .. } => {
            out.push(Node::with_children(NodeKind::Paragraph, inlines));
        }
        kind => out.push(Node::with_children(kind, inlines)),
    }
}

/// Every inline below `node`, in reading order, with a line break between
/// blocks. Walks iteratively so arbitrarily deep sources are safe.
fn flat_inlines<'a>(node: &'a AstNode<'a>, state: &mut ParseState) -> Vec<Node> {
    let mut out: Vec<Node> = Vec::new();
    for descendant in node.descendants().skip(1) {
        let value = descendant.data.borrow().value.clone();
        match value {
            NodeValue::Paragraph
            | NodeValue::Heading(_)
            | NodeValue::Item(_)
            | NodeValue::TaskItem(_)
            | NodeValue::TableRow(_)
            | NodeValue::ThematicBreak => {
                if !out.is_empty() {
                    out.push(Node::new(NodeKind::LineBreak));
                }
            }
            NodeValue::TableCell => {
                if !out.is_empty() {
                    out.push(Node::text(" "));
                }
            }
            NodeValue::Text(text) | NodeValue::HtmlInline(text) => out.push(Node::text(text)),
            NodeValue::Code(code) => out.push(Node::new(NodeKind::InlineCode(code.literal))),
            NodeValue::CodeBlock(code) => {
                if !out.is_empty() {
                    out.push(Node::new(NodeKind::LineBreak));
                }
                out.extend(code_lines(code.literal.trim_end_matches('\n')));
            }
            NodeValue::Math(math) => out.push(Node::new(NodeKind::MathInline(
                state.math_id(),
                math.literal.trim().to_string(),
            ))),
            NodeValue::SoftBreak => out.push(Node::text(" ")),
            NodeValue::LineBreak => out.push(Node::new(NodeKind::LineBreak)),
            _ => {}
        }
    }
    out
}

/// Split code into `Text` lines separated by `LineBreak`s.
fn code_lines(literal: &str) -> Vec<Node> {
    let mut children = Vec::new();
    for (index, line) in literal.split('\n').enumerate() {
        if index > 0 {
            children.push(Node::new(NodeKind::LineBreak));
        }
        children.push(Node::text(line));
    }
    children
}

/// A paragraph holding nothing but `$$...$$` blocks is promoted to block math.
fn is_display_math_paragraph<'a>(node: &'a AstNode<'a>) -> bool {
    let mut saw_math = false;
    for child in node.children() {
        match &child.data.borrow().value {
            NodeValue::Math(math) if math.display_math => saw_math = true,
            NodeValue::SoftBreak | NodeValue::LineBreak => {}
            NodeValue::Text(text) if text.trim().is_empty() => {}
            _ => return false,
        }
    }
    saw_math
}

fn node_text<'a>(node: &'a AstNode<'a>) -> String {
    let mut text = String::new();
    for descendant in node.descendants() {
        match &descendant.data.borrow().value {
            NodeValue::Text(t) => text.push_str(t),
            NodeValue::Code(code) => text.push_str(&code.literal),
            NodeValue::SoftBreak | NodeValue::LineBreak => text.push(' '),
            _ => {}
        }
    }
    text
}

//! Core visual tree types.

use crate::style::{Paint, Rgba, ThemeToken};

/// Identifier of a math node, assigned in reading order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MathId(pub usize);

/// Semantic kind of a visual tree node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Document,
    /// Heading with level (1-6)
    Heading(u8),
    Paragraph,
    Text(String),
    Emphasis,
    Strong,
    Strikethrough,
    InlineCode(String),
    /// Fenced or indented code; content lives in `Text`/`LineBreak` children
    CodeBlock { language: Option<String> },
    Link { url: String },
    Image { src: String, alt: String },
    MathInline(MathId, String),
    MathBlock(MathId, String),
    List { ordered: bool, start: usize },
    /// `checked` is set for task list items
    ListItem { checked: Option<bool> },
    BlockQuote,
    Table,
    TableRow { header: bool },
    TableCell,
    ThematicBreak,
    SoftBreak,
    LineBreak,
}

impl NodeKind {
    /// True for nodes laid out as blocks rather than inline runs.
    pub const fn is_block(&self) -> bool {
        matches!(
            self,
            Self::Document
                | Self::Heading(_)
                | Self::Paragraph
                | Self::CodeBlock { .. }
                | Self::MathBlock(..)
                | Self::List { .. }
                | Self::ListItem { .. }
                | Self::BlockQuote
                | Self::Table
                | Self::TableRow { .. }
                | Self::TableCell
                | Self::ThematicBreak
        )
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum FontWeight {
    #[default]
    Normal,
    Bold,
}

/// Font family role, mapped to a concrete family at render time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum FontRole {
    #[default]
    Sans,
    Serif,
    Mono,
    Math,
}

/// Vertical space around a block, in CSS pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Spacing {
    pub before: f32,
    pub after: f32,
}

impl Spacing {
    pub const fn new(before: f32, after: f32) -> Self {
        Self { before, after }
    }
}

/// Presentation attributes of a single node.
#[derive(Debug, Clone, PartialEq)]
pub struct Presentation {
    pub foreground: Paint,
    pub background: Paint,
    pub weight: FontWeight,
    pub italic: bool,
    pub underline: bool,
    pub strikethrough: bool,
    pub font: FontRole,
    /// Font size in CSS pixels
    pub size: f32,
    pub spacing: Spacing,
}

impl Default for Presentation {
    fn default() -> Self {
        Self {
            foreground: Paint::Token(ThemeToken::Text),
            background: Paint::Rgba(Rgba::TRANSPARENT),
            weight: FontWeight::Normal,
            italic: false,
            underline: false,
            strikethrough: false,
            font: FontRole::Sans,
            size: 16.0,
            spacing: Spacing::default(),
        }
    }
}

impl Presentation {
    /// Both paints of this node.
    pub const fn paints(&self) -> [Paint; 2] {
        [self.foreground, self.background]
    }
}

/// A node in the visual tree. Children are in reading order.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub kind: NodeKind,
    pub style: Presentation,
    pub children: Vec<Self>,
}

impl Node {
    pub fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            style: Presentation::default(),
            children: Vec::new(),
        }
    }

    pub fn with_children(kind: NodeKind, children: Vec<Self>) -> Self {
        Self {
            kind,
            style: Presentation::default(),
            children,
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::new(NodeKind::Text(text.into()))
    }

    /// Concatenated text content, with line breaks as `\n`.
    pub fn plain_text(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        match &self.kind {
            NodeKind::Text(text) | NodeKind::InlineCode(text) => out.push_str(text),
            NodeKind::MathInline(_, tex) | NodeKind::MathBlock(_, tex) => out.push_str(tex),
            NodeKind::SoftBreak => out.push(' '),
            NodeKind::LineBreak => out.push('\n'),
            _ => {}
        }
        for child in &self.children {
            child.collect_text(out);
        }
    }

    /// Pre-order traversal.
    pub fn walk(&self, visit: &mut impl FnMut(&Self)) {
        visit(self);
        for child in &self.children {
            child.walk(visit);
        }
    }
}

/// Source of a math node, as handed to the typesetter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MathSource {
    pub id: MathId,
    pub tex: String,
    pub display: bool,
}

/// A rendered markdown document: an ordered, rooted tree of styled nodes.
#[derive(Debug, Clone, PartialEq)]
pub struct VisualTree {
    root: Node,
}

impl VisualTree {
    pub const fn new(root: Node) -> Self {
        Self { root }
    }

    /// A document with no content.
    pub fn empty() -> Self {
        Self::new(Node::new(NodeKind::Document))
    }

    pub const fn root(&self) -> &Node {
        &self.root
    }

    pub const fn root_mut(&mut self) -> &mut Node {
        &mut self.root
    }

    pub fn into_root(self) -> Node {
        self.root
    }

    pub fn walk(&self, visit: &mut impl FnMut(&Node)) {
        self.root.walk(visit);
    }

    /// True when the document has no renderable children.
    pub fn is_empty(&self) -> bool {
        self.root.children.is_empty()
    }

    pub fn node_count(&self) -> usize {
        let mut count = 0;
        self.walk(&mut |_| count += 1);
        count
    }

    /// All math nodes in reading order.
    pub fn math_nodes(&self) -> Vec<MathSource> {
        let mut out = Vec::new();
        self.walk(&mut |node| match &node.kind {
            NodeKind::MathInline(id, tex) => out.push(MathSource {
                id: *id,
                tex: tex.clone(),
                display: false,
            }),
            NodeKind::MathBlock(id, tex) => out.push(MathSource {
                id: *id,
                tex: tex.clone(),
                display: true,
            }),
            _ => {}
        });
        out
    }
}

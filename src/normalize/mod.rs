//! Print normalization of visual trees.
//!
//! Rewrites every node's presentation attributes from whatever interactive
//! theme styled the tree into the fixed print palette and typography. The
//! transform is structural: node kinds and children are untouched, only
//! [`Presentation`] values change.

use crate::document::{FontRole, FontWeight, Node, NodeKind, Presentation, Spacing, VisualTree};
use crate::style::{Paint, PrintColor, ThemeToken};

/// Fixed print typography, in CSS pixels.
pub struct PrintTypography;

impl PrintTypography {
    pub const BODY_SIZE: f32 = 16.0;
    pub const CODE_SIZE: f32 = 14.0;
    pub const HEADING_SIZES: [f32; 6] = [32.0, 26.0, 22.0, 18.0, 16.0, 14.0];

    pub fn heading_size(level: u8) -> f32 {
        Self::HEADING_SIZES[usize::from(level.clamp(1, 6)) - 1]
    }
}

/// Total mapping from interactive paints to the print palette.
///
/// Every [`ThemeToken`] has an explicit arm; raw colours fall back to
/// black text on white.
pub struct PaletteMapping;

impl PaletteMapping {
    pub const fn foreground(paint: Paint) -> PrintColor {
        match paint {
            Paint::Token(token) => match token {
                ThemeToken::Link => PrintColor::Link,
                ThemeToken::CodeText => PrintColor::CodeAccent,
                ThemeToken::Border => PrintColor::Rule,
                ThemeToken::Text
                | ThemeToken::TextMuted
                | ThemeToken::TextStrong
                | ThemeToken::Heading(_)
                | ThemeToken::QuoteText
                | ThemeToken::Accent
                | ThemeToken::Canvas
                | ThemeToken::Surface
                | ThemeToken::CodeSurface => PrintColor::Text,
            },
            Paint::Print(PrintColor::Background | PrintColor::CodeBackground) | Paint::Rgba(_) => {
                PrintColor::Text
            }
            Paint::Print(color) => color,
        }
    }

    pub const fn background(paint: Paint) -> PrintColor {
        match paint {
            Paint::Token(token) => match token {
                ThemeToken::CodeSurface => PrintColor::CodeBackground,
                ThemeToken::Canvas
                | ThemeToken::Surface
                | ThemeToken::Text
                | ThemeToken::TextMuted
                | ThemeToken::TextStrong
                | ThemeToken::Heading(_)
                | ThemeToken::Link
                | ThemeToken::CodeText
                | ThemeToken::Accent
                | ThemeToken::Border
                | ThemeToken::QuoteText => PrintColor::Background,
            },
            Paint::Print(PrintColor::CodeBackground) => PrintColor::CodeBackground,
            Paint::Print(_) | Paint::Rgba(_) => PrintColor::Background,
        }
    }
}

/// A visual tree whose presentation uses only print-safe values.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedTree(VisualTree);

impl NormalizedTree {
    pub const fn tree(&self) -> &VisualTree {
        &self.0
    }

    pub fn into_inner(self) -> VisualTree {
        self.0
    }

    /// Paints outside the print palette. Empty for normalizer output.
    pub fn leaked_tokens(&self) -> Vec<Paint> {
        let mut leaked = Vec::new();
        self.0.walk(&mut |node| {
            leaked.extend(
                node.style
                    .paints()
                    .into_iter()
                    .filter(|paint| !paint.is_print_safe()),
            );
        });
        leaked
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Context {
    heading: Option<u8>,
    in_link: bool,
    in_code: bool,
    in_math: bool,
    in_quote: bool,
    strong: bool,
    emphasis: bool,
    strikethrough: bool,
    header_row: bool,
}

/// Normalize a copy of `tree` for print. The input is left untouched.
pub fn normalize(tree: &VisualTree) -> NormalizedTree {
    let mut root = tree.root().clone();
    normalize_node(&mut root, Context::default());
    NormalizedTree(VisualTree::new(root))
}

fn normalize_node(node: &mut Node, parent: Context) {
    let ctx = enter(&node.kind, parent);
    node.style = presentation(node, ctx);
    for child in &mut node.children {
        normalize_node(child, ctx);
    }
}

const fn enter(kind: &NodeKind, mut ctx: Context) -> Context {
    match kind {
        NodeKind::Heading(level) => ctx.heading = Some(*level),
        NodeKind::Link { .. } => ctx.in_link = true,
        NodeKind::InlineCode(_) | NodeKind::CodeBlock { .. } => ctx.in_code = true,
        NodeKind::MathInline(..) | NodeKind::MathBlock(..) => ctx.in_math = true,
        NodeKind::BlockQuote => ctx.in_quote = true,
        NodeKind::Strong => ctx.strong = true,
        NodeKind::Emphasis => ctx.emphasis = true,
        NodeKind::Strikethrough => ctx.strikethrough = true,
        NodeKind::TableRow { header } => ctx.header_row = *header,
        _ => {}
    }
    ctx
}

fn presentation(node: &Node, ctx: Context) -> Presentation {
    let foreground = if ctx.in_link {
        PrintColor::Link
    } else if ctx.in_code {
        PrintColor::CodeAccent
    } else if matches!(node.kind, NodeKind::ThematicBreak) {
        PrintColor::Rule
    } else {
        PaletteMapping::foreground(node.style.foreground)
    };

    let background = match node.kind {
        NodeKind::Document => PrintColor::Background,
        NodeKind::InlineCode(_) | NodeKind::CodeBlock { .. } => PrintColor::CodeBackground,
        // Runs inside code sit on the block's fill.
        _ if ctx.in_code => PrintColor::CodeBackground,
        _ => PaletteMapping::background(node.style.background),
    };

    let size = if ctx.in_code {
        PrintTypography::CODE_SIZE
    } else if let Some(level) = ctx.heading {
        PrintTypography::heading_size(level)
    } else {
        PrintTypography::BODY_SIZE
    };

    let font = if ctx.in_code {
        FontRole::Mono
    } else if ctx.in_math {
        FontRole::Math
    } else if ctx.heading.is_some() {
        FontRole::Sans
    } else {
        FontRole::Serif
    };

    let bold = !ctx.in_code && (ctx.heading.is_some() || ctx.strong || ctx.header_row);

    Presentation {
        foreground: Paint::Print(foreground),
        background: Paint::Print(background),
        weight: if bold {
            FontWeight::Bold
        } else {
            FontWeight::Normal
        },
        italic: !ctx.in_code && (ctx.emphasis || ctx.in_quote),
        underline: ctx.in_link,
        strikethrough: ctx.strikethrough,
        font,
        size,
        spacing: spacing_for(&node.kind),
    }
}

fn spacing_for(kind: &NodeKind) -> Spacing {
    let body = PrintTypography::BODY_SIZE;
    match kind {
        NodeKind::Heading(level) => {
            let size = PrintTypography::heading_size(*level);
            Spacing::new(size * 0.75, size * 0.35)
        }
        NodeKind::Paragraph | NodeKind::CodeBlock { .. } | NodeKind::Table => {
            Spacing::new(0.0, body)
        }
        NodeKind::List { .. } | NodeKind::BlockQuote | NodeKind::MathBlock(..) => {
            Spacing::new(0.0, body * 0.75)
        }
        NodeKind::ListItem { .. } => Spacing::new(0.0, body * 0.25),
        NodeKind::ThematicBreak => Spacing::new(body * 0.5, body * 1.5),
        _ => Spacing::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::parse;
    use crate::style::{Rgba, Theme};
    use proptest::prelude::*;

    const SAMPLE: &str = "# Title\n\nSome *emphasis*, **strong** and `code` with a [link](https://x.y).\n\n\
        > quoted ~~text~~\n\n```rust\nfn main() {}\n```\n\n| a | b |\n|---|---|\n| 1 | 2 |\n\n---\n\n\
        - [x] done\n- item $x^2$\n\n$$\\frac{a}{b}$$\n";

    fn themed(source: &str, theme: &Theme) -> VisualTree {
        let mut tree = parse(source).unwrap();
        theme.apply(&mut tree);
        tree
    }

    fn find<'a>(node: &'a Node, pred: &dyn Fn(&Node) -> bool) -> Option<&'a Node> {
        if pred(node) {
            return Some(node);
        }
        node.children.iter().find_map(|child| find(child, pred))
    }

    fn text_node<'a>(tree: &'a VisualTree, text: &str) -> &'a Node {
        find(tree.root(), &|n| matches!(&n.kind, NodeKind::Text(t) if t == text))
            .unwrap_or_else(|| panic!("no text node {text:?}"))
    }

    #[test]
    fn test_dark_theme_output_is_print_safe() {
        let normalized = normalize(&themed(SAMPLE, &Theme::dark()));
        assert!(normalized.leaked_tokens().is_empty());
    }

    #[test]
    fn test_input_tree_is_not_mutated() {
        let tree = themed(SAMPLE, &Theme::dark());
        let before = tree.clone();
        let _ = normalize(&tree);
        assert_eq!(tree, before);
    }

    #[test]
    fn test_structure_is_preserved() {
        let tree = themed(SAMPLE, &Theme::dark());
        let normalized = normalize(&tree);
        let kinds = |t: &VisualTree| {
            let mut out = Vec::new();
            t.walk(&mut |n| out.push(n.kind.clone()));
            out
        };
        assert_eq!(kinds(&tree), kinds(normalized.tree()));
    }

    #[test]
    fn test_document_background_is_white() {
        let normalized = normalize(&themed(SAMPLE, &Theme::dark()));
        assert_eq!(
            normalized.tree().root().style.background,
            Paint::Print(PrintColor::Background)
        );
    }

    #[test]
    fn test_heading_and_body_text_are_black() {
        let normalized = normalize(&themed(SAMPLE, &Theme::dark()));
        for text in ["Title", "Some "] {
            assert_eq!(
                text_node(normalized.tree(), text).style.foreground,
                Paint::Print(PrintColor::Text)
            );
        }
    }

    #[test]
    fn test_link_text_is_blue() {
        let normalized = normalize(&themed(SAMPLE, &Theme::dark()));
        let link = text_node(normalized.tree(), "link");
        assert_eq!(link.style.foreground, Paint::Print(PrintColor::Link));
        assert!(link.style.underline);
    }

    #[test]
    fn test_code_uses_fixed_accent_on_gray() {
        let normalized = normalize(&themed(SAMPLE, &Theme::dark()));
        let block = find(normalized.tree().root(), &|n| {
            matches!(n.kind, NodeKind::CodeBlock { .. })
        })
        .unwrap();
        assert_eq!(
            block.style.background,
            Paint::Print(PrintColor::CodeBackground)
        );
        block.walk(&mut |run| {
            assert_eq!(run.style.foreground, Paint::Print(PrintColor::CodeAccent));
            assert_eq!(run.style.font, FontRole::Mono);
        });

        let inline = find(normalized.tree().root(), &|n| {
            matches!(n.kind, NodeKind::InlineCode(_))
        })
        .unwrap();
        assert_eq!(
            inline.style.foreground,
            Paint::Print(PrintColor::CodeAccent)
        );
    }

    #[test]
    fn test_translucent_quote_overlay_becomes_white() {
        let normalized = normalize(&themed("> quoted", &Theme::dark()));
        let quote = &normalized.tree().root().children[0];
        assert_eq!(quote.style.background, Paint::Print(PrintColor::Background));
    }

    #[test]
    fn test_unknown_literal_colour_falls_back_to_black() {
        let mut tree = themed("plain", &Theme::dark());
        tree.root_mut().children[0].children[0].style.foreground =
            Paint::Rgba(Rgba::new(250, 10, 200, 40));
        let normalized = normalize(&tree);
        assert_eq!(
            normalized.tree().root().children[0].children[0].style.foreground,
            Paint::Print(PrintColor::Text)
        );
    }

    #[test]
    fn test_typography_is_independent_of_theme() {
        let source = "# Title\n\n> quote with **bold** and `code`\n\n- [x] task\n\n$$x^2$$";
        let dark = normalize(&themed(source, &Theme::dark()));
        let light = normalize(&themed(source, &Theme::light()));
        assert_eq!(dark, light);
    }

    #[test]
    fn test_palette_mapping_is_total_over_tokens() {
        let tokens = [
            ThemeToken::Canvas,
            ThemeToken::Surface,
            ThemeToken::Text,
            ThemeToken::TextMuted,
            ThemeToken::TextStrong,
            ThemeToken::Heading(1),
            ThemeToken::Link,
            ThemeToken::CodeText,
            ThemeToken::CodeSurface,
            ThemeToken::Accent,
            ThemeToken::Border,
            ThemeToken::QuoteText,
        ];
        for token in tokens {
            let fg = PaletteMapping::foreground(Paint::Token(token));
            let bg = PaletteMapping::background(Paint::Token(token));
            assert_ne!(fg, PrintColor::Background, "{token:?} fg would vanish");
            assert!(matches!(
                bg,
                PrintColor::Background | PrintColor::CodeBackground
            ));
        }
    }

    fn arb_paint() -> impl Strategy<Value = Paint> {
        prop_oneof![
            (1u8..=6).prop_map(|l| Paint::Token(ThemeToken::Heading(l))),
            prop::sample::select(vec![
                ThemeToken::Canvas,
                ThemeToken::Surface,
                ThemeToken::Text,
                ThemeToken::TextMuted,
                ThemeToken::TextStrong,
                ThemeToken::Link,
                ThemeToken::CodeText,
                ThemeToken::CodeSurface,
                ThemeToken::Accent,
                ThemeToken::Border,
                ThemeToken::QuoteText,
            ])
            .prop_map(Paint::Token),
            any::<(u8, u8, u8, u8)>().prop_map(|(r, g, b, a)| Paint::Rgba(Rgba::new(r, g, b, a))),
            prop::sample::select(PrintColor::ALL.to_vec()).prop_map(Paint::Print),
        ]
    }

    fn repaint(node: &mut Node, paints: &[(Paint, Paint)], index: &mut usize) {
        if !paints.is_empty() {
            let (fg, bg) = paints[*index % paints.len()];
            node.style.foreground = fg;
            node.style.background = bg;
            *index += 1;
        }
        for child in &mut node.children {
            repaint(child, paints, index);
        }
    }

    fn markdown_source() -> impl Strategy<Value = String> {
        prop::collection::vec(
            prop::sample::select(vec![
                "# Heading",
                "plain words here",
                "*emph* and **strong**",
                "`inline code`",
                "[a link](https://example.com)",
                "> a quote",
                "```\nlet x = 1;\n```",
                "- one\n- two",
                "$E = mc^2$",
                "$$\\sqrt{x}$$",
                "---",
                "| a | b |\n|---|---|\n| 1 | 2 |",
            ]),
            0..8,
        )
        .prop_map(|blocks| blocks.join("\n\n"))
    }

    proptest! {
        #[test]
        fn prop_normalize_is_idempotent(source in markdown_source(), dark in any::<bool>()) {
            let theme = if dark { Theme::dark() } else { Theme::light() };
            let once = normalize(&themed(&source, &theme));
            let twice = normalize(once.tree());
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn prop_output_never_leaks_theme_paints(
            source in markdown_source(),
            paints in prop::collection::vec((arb_paint(), arb_paint()), 0..16),
        ) {
            let mut tree = themed(&source, &Theme::dark());
            let mut index = 0;
            repaint(tree.root_mut(), &paints, &mut index);
            let normalized = normalize(&tree);
            prop_assert!(normalized.leaked_tokens().is_empty());
        }
    }
}

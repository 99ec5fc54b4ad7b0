//! Theming, colour tokens and the print-safe palette.
//!
//! The live document view is styled by an interactive [`Theme`] (dark or
//! light). Themes emit [`Paint`] values: semantic [`ThemeToken`]s for the
//! regular slots and raw [`Rgba`] literals for anything computed on the fly
//! (syntax highlighting, translucent overlays). Exported output only ever uses
//! [`PrintColor`].

use crate::config::ThemeMode;
use crate::document::{FontRole, FontWeight, Node, NodeKind, Presentation, Spacing, VisualTree};
use crate::highlight::{HighlightSpan, highlight_code};

/// RGBA colour with straight (non-premultiplied) alpha.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub const TRANSPARENT: Self = Self::new(0, 0, 0, 0);

    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self::new(r, g, b, 255)
    }

    /// `#rrggbb`, ignoring alpha.
    pub fn to_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }

    pub fn opacity(self) -> f32 {
        f32::from(self.a) / 255.0
    }
}

/// Semantic colour slots an interactive theme can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThemeToken {
    /// Page background of the preview pane
    Canvas,
    /// Raised panels (quotes, table headers)
    Surface,
    /// Body text
    Text,
    /// De-emphasized text (captions, list markers)
    TextMuted,
    /// Strong text
    TextStrong,
    /// Heading text by level
    Heading(u8),
    Link,
    CodeText,
    CodeSurface,
    Accent,
    Border,
    QuoteText,
}

/// Fixed, high-contrast colours used for exported output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrintColor {
    Text,
    Background,
    Link,
    CodeBackground,
    CodeAccent,
    Rule,
}

impl PrintColor {
    pub const ALL: [Self; 6] = [
        Self::Text,
        Self::Background,
        Self::Link,
        Self::CodeBackground,
        Self::CodeAccent,
        Self::Rule,
    ];

    pub const fn rgba(self) -> Rgba {
        match self {
            Self::Text => Rgba::rgb(0, 0, 0),
            Self::Background => Rgba::rgb(255, 255, 255),
            Self::Link => Rgba::rgb(6, 69, 173),
            Self::CodeBackground => Rgba::rgb(243, 244, 246),
            Self::CodeAccent => Rgba::rgb(109, 40, 217),
            Self::Rule => Rgba::rgb(156, 163, 175),
        }
    }
}

/// A colour as carried by a node's presentation attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Paint {
    Token(ThemeToken),
    Rgba(Rgba),
    Print(PrintColor),
}

impl Paint {
    pub const fn print(self) -> Option<PrintColor> {
        match self {
            Self::Print(color) => Some(color),
            Self::Token(_) | Self::Rgba(_) => None,
        }
    }

    pub const fn is_print_safe(self) -> bool {
        matches!(self, Self::Print(_))
    }
}

/// Interactive theme for the live document view.
#[derive(Debug, Clone, PartialEq)]
pub struct Theme {
    mode: ThemeMode,
    /// Heading font sizes, h1 through h6
    heading_sizes: [f32; 6],
    body_size: f32,
    code_size: f32,
    /// Translucent fill laid over block quotes
    quote_overlay: Rgba,
}

impl Default for Theme {
    fn default() -> Self {
        Self::dark()
    }
}

impl Theme {
    /// Large-type dark preview, the look of the original converter page.
    pub const fn dark() -> Self {
        Self {
            mode: ThemeMode::Dark,
            heading_sizes: [40.0, 32.0, 26.0, 22.0, 20.0, 18.0],
            body_size: 18.0,
            code_size: 16.0,
            quote_overlay: Rgba::new(55, 65, 81, 102),
        }
    }

    pub const fn light() -> Self {
        Self {
            mode: ThemeMode::Light,
            heading_sizes: [36.0, 30.0, 24.0, 20.0, 18.0, 16.0],
            body_size: 16.0,
            code_size: 14.0,
            quote_overlay: Rgba::new(229, 231, 235, 128),
        }
    }

    pub const fn for_mode(mode: ThemeMode) -> Self {
        match mode {
            ThemeMode::Dark => Self::dark(),
            ThemeMode::Light => Self::light(),
        }
    }

    pub const fn mode(&self) -> ThemeMode {
        self.mode
    }

    /// Colour a token is displayed with in the live view.
    pub const fn resolve(&self, token: ThemeToken) -> Rgba {
        match self.mode {
            ThemeMode::Dark => match token {
                ThemeToken::Canvas => Rgba::rgb(17, 24, 39),
                ThemeToken::Surface | ThemeToken::CodeSurface => Rgba::rgb(31, 41, 55),
                ThemeToken::Text => Rgba::rgb(209, 213, 219),
                ThemeToken::TextMuted => Rgba::rgb(156, 163, 175),
                ThemeToken::TextStrong | ThemeToken::Heading(_) => Rgba::rgb(243, 244, 246),
                ThemeToken::Link => Rgba::rgb(96, 165, 250),
                ThemeToken::CodeText => Rgba::rgb(192, 132, 252),
                ThemeToken::Accent => Rgba::rgb(139, 92, 246),
                ThemeToken::Border => Rgba::new(55, 65, 81, 153),
                ThemeToken::QuoteText => Rgba::rgb(156, 163, 175),
            },
            ThemeMode::Light => match token {
                ThemeToken::Canvas => Rgba::rgb(255, 255, 255),
                ThemeToken::Surface | ThemeToken::CodeSurface => Rgba::rgb(243, 244, 246),
                ThemeToken::Text => Rgba::rgb(55, 65, 81),
                ThemeToken::TextMuted | ThemeToken::QuoteText => Rgba::rgb(107, 114, 128),
                ThemeToken::TextStrong | ThemeToken::Heading(_) => Rgba::rgb(17, 24, 39),
                ThemeToken::Link => Rgba::rgb(37, 99, 235),
                ThemeToken::CodeText => Rgba::rgb(124, 58, 237),
                ThemeToken::Accent => Rgba::rgb(109, 40, 217),
                ThemeToken::Border => Rgba::new(209, 213, 219, 204),
            },
        }
    }

    /// Style a freshly parsed tree for the live view.
    ///
    /// Code blocks are re-split into syntax-highlighted runs, so applying a
    /// different theme later replaces the previous highlighting.
    pub fn apply(&self, tree: &mut VisualTree) {
        self.apply_node(tree.root_mut(), &Inherited::default());
    }

    fn apply_node(&self, node: &mut Node, parent: &Inherited) {
        let mut inherited = parent.clone();
        let mut style = inherited.presentation(self);

        match &node.kind {
            NodeKind::Document => {
                style.background = Paint::Token(ThemeToken::Canvas);
            }
            NodeKind::Heading(level) => {
                let level = (*level).clamp(1, 6);
                inherited.foreground = Paint::Token(ThemeToken::Heading(level));
                inherited.size = self.heading_sizes[usize::from(level) - 1];
                inherited.bold = true;
                style = inherited.presentation(self);
                style.spacing = Spacing::new(inherited.size * 0.8, inherited.size * 0.4);
            }
            NodeKind::Paragraph => {
                style.spacing = Spacing::new(0.0, self.body_size * 1.25);
            }
            NodeKind::Strong => {
                inherited.bold = true;
                inherited.foreground = Paint::Token(ThemeToken::TextStrong);
                style = inherited.presentation(self);
            }
            NodeKind::Emphasis => {
                inherited.italic = true;
                style = inherited.presentation(self);
            }
            NodeKind::Strikethrough => {
                inherited.strikethrough = true;
                inherited.foreground = Paint::Token(ThemeToken::TextMuted);
                style = inherited.presentation(self);
            }
            NodeKind::Link { .. } => {
                inherited.foreground = Paint::Token(ThemeToken::Link);
                inherited.underline = true;
                style = inherited.presentation(self);
            }
            NodeKind::InlineCode(_) => {
                style.foreground = Paint::Token(ThemeToken::CodeText);
                style.background = Paint::Token(ThemeToken::CodeSurface);
                style.font = FontRole::Mono;
                style.size = self.code_size;
            }
            NodeKind::CodeBlock { language } => {
                inherited.foreground = Paint::Token(ThemeToken::CodeText);
                inherited.font = FontRole::Mono;
                inherited.size = self.code_size;
                style = inherited.presentation(self);
                style.background = Paint::Token(ThemeToken::CodeSurface);
                style.spacing = Spacing::new(0.0, self.body_size * 1.25);
                let literal = node.plain_text();
                node.children = highlighted_children(language.as_deref(), &literal, self);
            }
            NodeKind::MathInline(..) | NodeKind::MathBlock(..) => {
                style.font = FontRole::Math;
                style.foreground = Paint::Token(ThemeToken::TextStrong);
            }
            NodeKind::BlockQuote => {
                inherited.foreground = Paint::Token(ThemeToken::QuoteText);
                inherited.italic = true;
                style = inherited.presentation(self);
                style.background = Paint::Rgba(self.quote_overlay);
                style.spacing = Spacing::new(0.0, self.body_size);
            }
            NodeKind::List { .. } => {
                style.spacing = Spacing::new(0.0, self.body_size);
            }
            NodeKind::TableRow { header: true } => {
                inherited.bold = true;
                style = inherited.presentation(self);
                style.background = Paint::Token(ThemeToken::Surface);
            }
            NodeKind::Table => {
                style.background = Paint::Token(ThemeToken::Border);
                style.spacing = Spacing::new(0.0, self.body_size * 1.25);
            }
            NodeKind::ThematicBreak => {
                style.foreground = Paint::Token(ThemeToken::Border);
                style.spacing = Spacing::new(self.body_size, self.body_size);
            }
            NodeKind::Image { .. } => {
                style.foreground = Paint::Token(ThemeToken::TextMuted);
            }
            _ => {}
        }

        // Highlighted code runs carry their own colours already.
        let keep_literal_colour =
            matches!(node.kind, NodeKind::Text(_)) && matches!(node.style.foreground, Paint::Rgba(_));
        if keep_literal_colour {
            style.foreground = node.style.foreground;
        }
        node.style = style;

        for child in &mut node.children {
            self.apply_node(child, &inherited);
        }
    }
}

/// Text attributes that flow from a container to its descendants.
#[derive(Debug, Clone)]
struct Inherited {
    foreground: Paint,
    size: f32,
    font: FontRole,
    bold: bool,
    italic: bool,
    underline: bool,
    strikethrough: bool,
}

impl Default for Inherited {
    fn default() -> Self {
        Self {
            foreground: Paint::Token(ThemeToken::Text),
            size: 0.0,
            font: FontRole::Sans,
            bold: false,
            italic: false,
            underline: false,
            strikethrough: false,
        }
    }
}

impl Inherited {
    fn presentation(&self, theme: &Theme) -> Presentation {
        let size = if self.size > 0.0 { self.size } else { theme.body_size };
        Presentation {
            foreground: self.foreground,
            background: Paint::Rgba(Rgba::TRANSPARENT),
            weight: if self.bold {
                FontWeight::Bold
            } else {
                FontWeight::Normal
            },
            italic: self.italic,
            underline: self.underline,
            strikethrough: self.strikethrough,
            font: self.font,
            size,
            spacing: Spacing::default(),
        }
    }
}

fn highlighted_children(language: Option<&str>, literal: &str, theme: &Theme) -> Vec<Node> {
    let mut children = Vec::new();
    for (index, line) in highlight_code(language, literal, theme.mode())
        .into_iter()
        .enumerate()
    {
        if index > 0 {
            children.push(Node::new(NodeKind::LineBreak));
        }
        for HighlightSpan { text, color } in line {
            let mut run = Node::text(text);
            if let Some(color) = color {
                run.style.foreground = Paint::Rgba(color);
            }
            children.push(run);
        }
    }
    children
}

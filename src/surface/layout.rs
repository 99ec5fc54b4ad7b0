//! Block and inline layout of a normalized tree into a flat scene.

use std::collections::HashMap;
use std::sync::Arc;

use super::measure::TextMeasure;
use super::{CANONICAL_WIDTH, PADDING};
use crate::document::{FontRole, FontWeight, MathId, Node, NodeKind, Presentation};
use crate::image::{EmbeddedImage, ImageLoader};
use crate::math::MathLayout;
use crate::normalize::PrintTypography;
use crate::style::{Paint, PrintColor};

const CODE_PADDING: f32 = 12.0;
const INLINE_CODE_PADDING: f32 = 3.0;
const LIST_INDENT: f32 = 28.0;
const QUOTE_INDENT: f32 = 20.0;
const QUOTE_BAR: f32 = 4.0;
const CELL_PADDING: f32 = 8.0;
const DISPLAY_MATH_SCALE: f32 = 1.2;
/// Narrowest box nested blocks are indented into.
const MIN_CONTENT_WIDTH: f32 = 48.0;
const MIN_CELL_WIDTH: f32 = 8.0;

/// Styling of a single text run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunStyle {
    pub size: f32,
    pub font: FontRole,
    pub bold: bool,
    pub italic: bool,
    pub color: PrintColor,
    pub underline: bool,
    pub strikethrough: bool,
}

impl RunStyle {
    fn from_presentation(style: &Presentation) -> Self {
        Self {
            size: style.size,
            font: style.font,
            bold: style.weight == FontWeight::Bold,
            italic: style.italic,
            color: print_color(style.foreground, PrintColor::Text),
            underline: style.underline,
            strikethrough: style.strikethrough,
        }
    }
}

/// One drawable item. Coordinates are CSS pixels from the top-left; text `y`
/// is the baseline.
#[derive(Debug, Clone, PartialEq)]
pub enum SceneItem {
    Rect {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        fill: PrintColor,
    },
    Text {
        x: f32,
        y: f32,
        text: String,
        style: RunStyle,
    },
    Image {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        image: Arc<EmbeddedImage>,
    },
    /// Math whose glyph layout has not arrived yet; drawn as its source
    MathPlaceholder {
        id: MathId,
        x: f32,
        y: f32,
        tex: String,
        size: f32,
    },
}

/// A laid-out surface: fixed width, content height, display list.
#[derive(Debug, Clone, PartialEq)]
pub struct Scene {
    pub width: f32,
    pub height: f32,
    pub items: Vec<SceneItem>,
}

impl Scene {
    pub fn pending_math(&self) -> usize {
        self.items
            .iter()
            .filter(|item| matches!(item, SceneItem::MathPlaceholder { .. }))
            .count()
    }

    /// Concatenated text of all text items, in paint order.
    pub fn text(&self) -> String {
        self.items
            .iter()
            .filter_map(|item| match item {
                SceneItem::Text { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

pub struct LayoutInputs<'a> {
    pub measure: &'a dyn TextMeasure,
    pub images: &'a ImageLoader,
    pub math: &'a HashMap<MathId, MathLayout>,
}

/// Lay out `root` at [`CANONICAL_WIDTH`].
pub fn layout(root: &Node, inputs: &LayoutInputs<'_>) -> Scene {
    let mut engine = Engine {
        inputs,
        items: Vec::new(),
        y: PADDING,
    };
    let content_width = CANONICAL_WIDTH - 2.0 * PADDING;
    for child in &root.children {
        engine.block(child, PADDING, content_width);
    }
    Scene {
        width: CANONICAL_WIDTH,
        height: (engine.y + PADDING).ceil(),
        items: engine.items,
    }
}

fn print_color(paint: Paint, fallback: PrintColor) -> PrintColor {
    paint.print().unwrap_or(fallback)
}

#[derive(Debug, Clone)]
enum Piece {
    Word {
        text: String,
        style: RunStyle,
        width: f32,
    },
    Space {
        width: f32,
    },
    Break,
    Code {
        text: String,
        style: RunStyle,
        width: f32,
    },
    Math {
        id: MathId,
        tex: String,
        style: RunStyle,
    },
    Image {
        image: Arc<EmbeddedImage>,
    },
    AltText {
        text: String,
        style: RunStyle,
        width: f32,
    },
}

#[derive(Debug, Default)]
struct Line {
    pieces: Vec<(f32, Piece)>,
    width: f32,
    ascent: f32,
    descent: f32,
}

impl Line {
    fn height(&self) -> f32 {
        self.ascent + self.descent
    }
}

struct Engine<'a, 'b> {
    inputs: &'b LayoutInputs<'a>,
    items: Vec<SceneItem>,
    y: f32,
}

impl Engine<'_, '_> {
    fn text_metrics(&self, size: f32) -> (f32, f32) {
        let line = self.inputs.measure.line_height(size);
        let ascent = size * 0.8 + (line - size) / 2.0;
        (ascent, line - ascent)
    }

    fn advance(&self, text: &str, style: &RunStyle) -> f32 {
        self.inputs
            .measure
            .advance(text, style.size, style.font, style.bold)
    }

    fn block(&mut self, node: &Node, x: f32, width: f32) {
        let spacing = node.style.spacing;
        self.y += spacing.before;
        match &node.kind {
            NodeKind::Heading(level) => {
                let lines = self.inline_lines(&node.children, width, &node.style);
                self.emit_lines(lines, x, width, false);
                if *level <= 2 {
                    self.y += 6.0;
                    self.rule(x, width, 1.0);
                }
            }
            NodeKind::Paragraph | NodeKind::TableCell => {
                let lines = self.inline_lines(&node.children, width, &node.style);
                self.emit_lines(lines, x, width, false);
            }
            NodeKind::CodeBlock { .. } => self.code_block(node, x, width),
            NodeKind::MathBlock(id, tex) => {
                let style = RunStyle {
                    size: node.style.size * DISPLAY_MATH_SCALE,
                    ..RunStyle::from_presentation(&node.style)
                };
                let piece = Piece::Math {
                    id: *id,
                    tex: tex.clone(),
                    style,
                };
                let mut line = Line::default();
                self.push_piece(&mut line, piece);
                self.emit_lines(vec![line], x, width, true);
            }
            NodeKind::List { ordered, start } => {
                for (index, item) in node.children.iter().enumerate() {
                    let marker = match item.kind {
                        NodeKind::ListItem {
                            checked: Some(true),
                        } => "☑".to_string(),
                        NodeKind::ListItem {
                            checked: Some(false),
                        } => "☐".to_string(),
                        _ if *ordered => format!("{}.", start + index),
                        _ => "•".to_string(),
                    };
                    self.list_item(item, &marker, x, width);
                }
            }
            NodeKind::ListItem { .. } => self.list_item(node, "•", x, width),
            NodeKind::BlockQuote => {
                let top = self.y;
                let (inner_x, inner_width) = indent(x, width, QUOTE_INDENT);
                for child in &node.children {
                    self.block(child, inner_x, inner_width);
                }
                let bottom = self.y - last_spacing_after(node);
                self.items.push(SceneItem::Rect {
                    x,
                    y: top,
                    width: QUOTE_BAR,
                    height: (bottom - top).max(0.0),
                    fill: PrintColor::Rule,
                });
            }
            NodeKind::Table => self.table(node, x, width),
            NodeKind::ThematicBreak => self.rule(x, width, 1.0),
            _ if node.kind.is_block() => {
                for child in &node.children {
                    self.block(child, x, width);
                }
            }
            // Stray inline content at block level gets its own line box.
            _ => {
                let lines = self.inline_lines(std::slice::from_ref(node), width, &node.style);
                self.emit_lines(lines, x, width, false);
            }
        }
        self.y += spacing.after;
    }

    fn rule(&mut self, x: f32, width: f32, thickness: f32) {
        self.items.push(SceneItem::Rect {
            x,
            y: self.y,
            width,
            height: thickness,
            fill: PrintColor::Rule,
        });
        self.y += thickness;
    }

    fn list_item(&mut self, item: &Node, marker: &str, x: f32, width: f32) {
        let style = item
            .children
            .first()
            .map_or_else(|| RunStyle::from_presentation(&item.style), |first| {
                RunStyle::from_presentation(&first.style)
            });
        let marker_style = RunStyle {
            bold: false,
            italic: false,
            underline: false,
            strikethrough: false,
            font: FontRole::Sans,
            size: PrintTypography::BODY_SIZE,
            color: PrintColor::Text,
        };
        let (ascent, _) = self.text_metrics(style.size);
        self.y += item.style.spacing.before;
        self.items.push(SceneItem::Text {
            x: x + 4.0,
            y: self.y + ascent,
            text: marker.to_string(),
            style: marker_style,
        });
        let start = self.y;
        let (inner_x, inner_width) = indent(x, width, LIST_INDENT);
        for child in &item.children {
            self.block(child, inner_x, inner_width);
        }
        if (self.y - start).abs() < f32::EPSILON {
            let (a, d) = self.text_metrics(style.size);
            self.y += a + d;
        }
        self.y += item.style.spacing.after;
    }

    fn code_block(&mut self, node: &Node, x: f32, width: f32) {
        let inner = (width - 2.0 * CODE_PADDING).max(MIN_CELL_WIDTH);
        let block_style = RunStyle::from_presentation(&node.style);
        let (ascent, descent) = self.text_metrics(block_style.size);

        let mut lines: Vec<Vec<(String, RunStyle)>> = vec![Vec::new()];
        for child in &node.children {
            match &child.kind {
                NodeKind::LineBreak => lines.push(Vec::new()),
                NodeKind::Text(text) => {
                    if let Some(line) = lines.last_mut() {
                        line.push((text.clone(), RunStyle::from_presentation(&child.style)));
                    }
                }
                _ => {}
            }
        }
        if lines.len() > 1 && lines.last().is_some_and(Vec::is_empty) {
            lines.pop();
        }

        // Character wrap: code keeps its whitespace.
        let mut rows: Vec<Vec<(f32, String, RunStyle)>> = Vec::new();
        for line in lines {
            let mut row = Vec::new();
            let mut cursor = 0.0;
            for (text, style) in line {
                let mut chunk = String::new();
                let mut chunk_x = cursor;
                for ch in text.chars() {
                    let w = self.advance(ch.encode_utf8(&mut [0; 4]), &style);
                    if cursor + w > inner && cursor > 0.0 {
                        if !chunk.is_empty() {
                            row.push((chunk_x, std::mem::take(&mut chunk), style.clone()));
                        }
                        rows.push(std::mem::take(&mut row));
                        cursor = 0.0;
                        chunk_x = 0.0;
                    }
                    chunk.push(ch);
                    cursor += w;
                }
                if !chunk.is_empty() {
                    row.push((chunk_x, chunk, style.clone()));
                }
            }
            rows.push(row);
        }

        let height = rows.len() as f32 * (ascent + descent) + 2.0 * CODE_PADDING;
        self.items.push(SceneItem::Rect {
            x,
            y: self.y,
            width,
            height,
            fill: print_color(node.style.background, PrintColor::CodeBackground),
        });
        let mut baseline = self.y + CODE_PADDING + ascent;
        for row in rows {
            for (dx, text, style) in row {
                self.items.push(SceneItem::Text {
                    x: x + CODE_PADDING + dx,
                    y: baseline,
                    text,
                    style,
                });
            }
            baseline += ascent + descent;
        }
        self.y += height;
    }

    fn table(&mut self, node: &Node, x: f32, width: f32) {
        let columns = node
            .children
            .iter()
            .map(|row| row.children.len())
            .max()
            .unwrap_or(0);
        if columns == 0 {
            return;
        }
        let column_width = width / columns as f32;
        let cell_width = (column_width - 2.0 * CELL_PADDING).max(MIN_CELL_WIDTH);
        let top = self.y;
        let mut boundaries = vec![top];

        for row in &node.children {
            let header = matches!(row.kind, NodeKind::TableRow { header: true });
            let cells: Vec<Vec<Line>> = row
                .children
                .iter()
                .map(|cell| self.inline_lines(&cell.children, cell_width, &cell.style))
                .collect();
            let content = cells
                .iter()
                .map(|lines| lines.iter().map(Line::height).sum::<f32>())
                .fold(0.0_f32, f32::max);
            let row_height = content + 2.0 * CELL_PADDING;
            if header {
                self.items.push(SceneItem::Rect {
                    x,
                    y: self.y,
                    width,
                    height: row_height,
                    fill: PrintColor::CodeBackground,
                });
            }
            let row_top = self.y;
            for (index, lines) in cells.into_iter().enumerate() {
                self.y = row_top + CELL_PADDING;
                let cell_x = x + index as f32 * column_width + CELL_PADDING;
                self.emit_lines(lines, cell_x, cell_width, false);
            }
            self.y = row_top + row_height;
            boundaries.push(self.y);
        }

        for y in &boundaries {
            self.items.push(SceneItem::Rect {
                x,
                y: *y,
                width,
                height: 1.0,
                fill: PrintColor::Rule,
            });
        }
        let bottom = self.y;
        for column in 0..=columns {
            self.items.push(SceneItem::Rect {
                x: (x + column as f32 * column_width).min(x + width - 1.0),
                y: top,
                width: 1.0,
                height: bottom - top + 1.0,
                fill: PrintColor::Rule,
            });
        }
        self.y += 1.0;
    }

    fn collect_pieces(&self, nodes: &[Node], out: &mut Vec<Piece>) {
        for node in nodes {
            match &node.kind {
                NodeKind::Text(text) => {
                    let style = RunStyle::from_presentation(&node.style);
                    for (token, is_space) in split_words(text) {
                        if is_space {
                            let width = self.advance(" ", &style);
                            out.push(Piece::Space { width });
                        } else {
                            let width = self.advance(token, &style);
                            out.push(Piece::Word {
                                text: token.to_string(),
                                style: style.clone(),
                                width,
                            });
                        }
                    }
                }
                NodeKind::SoftBreak => {
                    let style = RunStyle::from_presentation(&node.style);
                    out.push(Piece::Space {
                        width: self.advance(" ", &style),
                    });
                }
                NodeKind::LineBreak => out.push(Piece::Break),
                NodeKind::InlineCode(text) => {
                    let style = RunStyle::from_presentation(&node.style);
                    let width = self.advance(text, &style) + 2.0 * INLINE_CODE_PADDING;
                    out.push(Piece::Code {
                        text: text.clone(),
                        style,
                        width,
                    });
                }
                NodeKind::MathInline(id, tex) | NodeKind::MathBlock(id, tex) => {
                    out.push(Piece::Math {
                        id: *id,
                        tex: tex.clone(),
                        style: RunStyle::from_presentation(&node.style),
                    });
                }
                NodeKind::Image { src, alt } => match self.inputs.images.load(src) {
                    Some(image) => out.push(Piece::Image { image }),
                    None => {
                        let style = RunStyle::from_presentation(&node.style);
                        let text = if alt.is_empty() {
                            format!("[image: {src}]")
                        } else {
                            format!("[{alt}]")
                        };
                        let width = self.advance(&text, &style);
                        out.push(Piece::AltText { text, style, width });
                    }
                },
                _ => self.collect_pieces(&node.children, out),
            }
        }
    }

    fn piece_extent(&self, piece: &Piece, max_width: f32) -> (f32, f32, f32) {
        match piece {
            Piece::Word { style, width, .. } | Piece::AltText { style, width, .. } => {
                let (a, d) = self.text_metrics(style.size);
                (*width, a, d)
            }
            Piece::Code { style, width, .. } => {
                let (a, d) = self.text_metrics(style.size);
                (*width, a + 1.0, d + 1.0)
            }
            Piece::Space { width } => (*width, 0.0, 0.0),
            Piece::Break => (0.0, 0.0, 0.0),
            Piece::Math { id, tex, style } => match self.inputs.math.get(id) {
                Some(layout) => (
                    layout.width,
                    layout.ascent + style.size * 0.1,
                    layout.descent + style.size * 0.1,
                ),
                None => {
                    let placeholder = RunStyle {
                        font: FontRole::Mono,
                        ..style.clone()
                    };
                    let (a, d) = self.text_metrics(style.size);
                    (self.advance(tex, &placeholder), a, d)
                }
            },
            Piece::Image { image } => {
                let (w, h) = image_size(image, max_width);
                let (_, d) = self.text_metrics(PrintTypography::BODY_SIZE);
                (w, h, d)
            }
        }
    }

    fn push_piece(&self, line: &mut Line, piece: Piece) {
        let (width, ascent, descent) = self.piece_extent(&piece, f32::INFINITY);
        line.ascent = line.ascent.max(ascent);
        line.descent = line.descent.max(descent);
        line.pieces.push((line.width, piece));
        line.width += width;
    }

    /// Greedy word wrap of inline children into line boxes.
    fn inline_lines(&self, nodes: &[Node], width: f32, style: &Presentation) -> Vec<Line> {
        let mut pieces = Vec::new();
        self.collect_pieces(nodes, &mut pieces);
        let (base_ascent, base_descent) = self.text_metrics(style.size);
        let new_line = || Line {
            ascent: base_ascent,
            descent: base_descent,
            ..Line::default()
        };

        let mut lines = Vec::new();
        let mut line = new_line();
        for piece in pieces {
            match piece {
                Piece::Break => {
                    lines.push(std::mem::replace(&mut line, new_line()));
                }
                Piece::Space { width: w } => {
                    if !line.pieces.is_empty() {
                        line.width += w;
                    }
                }
                Piece::Word { text, style, width: w } if w > width => {
                    // Longer than a whole line: break inside the word.
                    for chunk in self.split_to_width(&text, &style, width) {
                        let w = self.advance(&chunk, &style);
                        if !line.pieces.is_empty() && line.width + w > width {
                            lines.push(std::mem::replace(&mut line, new_line()));
                        }
                        self.push_piece(
                            &mut line,
                            Piece::Word {
                                text: chunk,
                                style: style.clone(),
                                width: w,
                            },
                        );
                    }
                }
                piece => {
                    let (w, _, _) = self.piece_extent(&piece, width);
                    if !line.pieces.is_empty() && line.width + w > width {
                        lines.push(std::mem::replace(&mut line, new_line()));
                    }
                    let (w, ascent, descent) = self.piece_extent(&piece, width);
                    line.ascent = line.ascent.max(ascent);
                    line.descent = line.descent.max(descent);
                    line.pieces.push((line.width, piece));
                    line.width += w;
                }
            }
        }
        if !line.pieces.is_empty() || lines.is_empty() {
            lines.push(line);
        }
        lines
    }

    fn split_to_width(&self, text: &str, style: &RunStyle, width: f32) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut chunk = String::new();
        let mut used = 0.0;
        for ch in text.chars() {
            let w = self.advance(ch.encode_utf8(&mut [0; 4]), style);
            if used + w > width && !chunk.is_empty() {
                chunks.push(std::mem::take(&mut chunk));
                used = 0.0;
            }
            chunk.push(ch);
            used += w;
        }
        if !chunk.is_empty() {
            chunks.push(chunk);
        }
        chunks
    }

    fn emit_lines(&mut self, lines: Vec<Line>, x: f32, width: f32, centered: bool) {
        for line in lines {
            let baseline = self.y + line.ascent;
            let offset = if centered {
                ((width - line.width) / 2.0).max(0.0)
            } else {
                0.0
            };
            for (dx, piece) in line.pieces {
                self.emit_piece(piece, x + offset + dx, baseline, width);
            }
            self.y += line.ascent + line.descent;
        }
    }

    fn emit_piece(&mut self, piece: Piece, x: f32, baseline: f32, max_width: f32) {
        match piece {
            Piece::Word { text, style, .. } | Piece::AltText { text, style, .. } => {
                self.items.push(SceneItem::Text {
                    x,
                    y: baseline,
                    text,
                    style,
                });
            }
            Piece::Code { text, style, width } => {
                self.items.push(SceneItem::Rect {
                    x,
                    y: baseline - style.size * 0.8 - 2.0,
                    width,
                    height: style.size + 4.0,
                    fill: PrintColor::CodeBackground,
                });
                self.items.push(SceneItem::Text {
                    x: x + INLINE_CODE_PADDING,
                    y: baseline,
                    text,
                    style,
                });
            }
            Piece::Math { id, tex, style } => match self.inputs.math.get(&id) {
                Some(layout) => {
                    for run in &layout.runs {
                        self.items.push(SceneItem::Text {
                            x: x + run.dx,
                            y: baseline + run.dy,
                            text: run.text.clone(),
                            style: RunStyle {
                                size: run.size,
                                font: FontRole::Math,
                                bold: false,
                                italic: run.italic,
                                underline: false,
                                strikethrough: false,
                                color: style.color,
                            },
                        });
                    }
                    for rule in &layout.rules {
                        self.items.push(SceneItem::Rect {
                            x: x + rule.dx,
                            y: baseline + rule.dy,
                            width: rule.width,
                            height: rule.thickness,
                            fill: style.color,
                        });
                    }
                }
                None => self.items.push(SceneItem::MathPlaceholder {
                    id,
                    x,
                    y: baseline,
                    tex,
                    size: style.size,
                }),
            },
            Piece::Image { image } => {
                let (width, height) = image_size(&image, max_width);
                self.items.push(SceneItem::Image {
                    x,
                    y: baseline - height,
                    width,
                    height,
                    image,
                });
            }
            Piece::Space { .. } | Piece::Break => {}
        }
    }
}

/// Natural size at one CSS pixel per image pixel, shrunk to fit `max_width`.
/// Shift a box right by `by`, unless that would leave it too narrow.
fn indent(x: f32, width: f32, by: f32) -> (f32, f32) {
    if width - by >= MIN_CONTENT_WIDTH {
        (x + by, width - by)
    } else {
        (x, width)
    }
}

fn image_size(image: &EmbeddedImage, max_width: f32) -> (f32, f32) {
    let (w, h) = (image.width as f32, image.height as f32);
    if w > max_width {
        (max_width, h * max_width / w)
    } else {
        (w, h)
    }
}

fn last_spacing_after(node: &Node) -> f32 {
    node.children.last().map_or(0.0, |child| child.style.spacing.after)
}

/// Split text into alternating word and whitespace tokens.
fn split_words(text: &str) -> Vec<(&str, bool)> {
    let mut tokens = Vec::new();
    let mut start = 0;
    let mut current: Option<bool> = None;
    for (index, ch) in text.char_indices() {
        let is_space = ch.is_whitespace();
        match current {
            Some(kind) if kind == is_space => {}
            Some(kind) => {
                tokens.push((&text[start..index], kind));
                start = index;
                current = Some(is_space);
            }
            None => current = Some(is_space),
        }
    }
    if let Some(kind) = current {
        tokens.push((&text[start..], kind));
    }
    tokens
}

/// Font size a math node is typeset at.
pub fn math_size(node: &Node) -> f32 {
    match node.kind {
        NodeKind::MathBlock(..) => node.style.size * DISPLAY_MATH_SCALE,
        _ => node.style.size,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::parse;
    use crate::math::{GlyphRun, MathRule};
    use crate::normalize::normalize;
    use crate::style::Theme;
    use crate::surface::ApproxMeasure;

    fn scene_with(source: &str, math: &HashMap<MathId, MathLayout>) -> Scene {
        let mut tree = parse(source).unwrap();
        Theme::dark().apply(&mut tree);
        let normalized = normalize(&tree);
        let images = ImageLoader::new(".");
        let inputs = LayoutInputs {
            measure: &ApproxMeasure,
            images: &images,
            math,
        };
        layout(normalized.tree().root(), &inputs)
    }

    fn scene(source: &str) -> Scene {
        scene_with(source, &HashMap::new())
    }

    fn texts(scene: &Scene) -> Vec<&SceneItem> {
        scene
            .items
            .iter()
            .filter(|item| matches!(item, SceneItem::Text { .. }))
            .collect()
    }

    #[test]
    fn test_split_words_alternates() {
        assert_eq!(
            split_words("ab  cd "),
            vec![("ab", false), ("  ", true), ("cd", false), (" ", true)]
        );
        assert!(split_words("").is_empty());
    }

    #[test]
    fn test_empty_document_is_padding_only() {
        let scene = scene("");
        assert!((scene.width - CANONICAL_WIDTH).abs() < f32::EPSILON);
        assert!((scene.height - 2.0 * PADDING).abs() < f32::EPSILON);
        assert!(scene.items.is_empty());
    }

    #[test]
    fn test_width_is_canonical_regardless_of_content() {
        let short = scene("hi");
        let long = scene(&"word ".repeat(500));
        assert!((short.width - long.width).abs() < f32::EPSILON);
        assert!(long.height > short.height);
    }

    #[test]
    fn test_text_stays_inside_content_box() {
        let scene = scene(&"wrapping words keep going ".repeat(60));
        for item in texts(&scene) {
            if let SceneItem::Text { x, text, style, .. } = item {
                let right = x + ApproxMeasure.advance(text, style.size, style.font, style.bold);
                assert!(*x >= PADDING - 0.01);
                assert!(right <= CANONICAL_WIDTH - PADDING + 0.01, "{text} overflows");
            }
        }
    }

    #[test]
    fn test_long_word_is_broken() {
        let scene = scene(&"x".repeat(400));
        assert!(texts(&scene).len() > 1);
    }

    fn assert_within_canvas(scene: &Scene) {
        for item in &scene.items {
            match item {
                SceneItem::Rect {
                    x, width, height, ..
                } => {
                    assert!(*width >= 0.0 && *height >= 0.0);
                    assert!(*x >= 0.0 && x + width <= scene.width + 0.01);
                }
                SceneItem::Text { x, .. } => {
                    assert!(*x >= PADDING - 0.01 && *x < scene.width);
                }
                _ => {}
            }
        }
    }

    #[test]
    fn test_long_word_lines_fit_the_content_box() {
        let scene = scene(&"y".repeat(5000));
        let lines = texts(&scene);
        assert!(lines.len() > 5);
        for item in lines {
            if let SceneItem::Text { x, text, style, .. } = item {
                let right = x + ApproxMeasure.advance(text, style.size, style.font, style.bold);
                assert!(right <= CANONICAL_WIDTH - PADDING + 0.01);
            }
        }
    }

    #[test]
    fn test_deep_quotes_never_shrink_below_minimum_width() {
        let scene = scene(&format!("{}bottom", "> ".repeat(300)));
        assert!(scene.text().contains("bottom"));
        assert_within_canvas(&scene);
    }

    #[test]
    fn test_deep_lists_never_shrink_below_minimum_width() {
        let scene = scene(&format!("{}leaf", "- ".repeat(300)));
        assert!(scene.text().contains("leaf"));
        assert_within_canvas(&scene);
    }

    #[test]
    fn test_indent_keeps_narrow_boxes() {
        assert_eq!(indent(10.0, 200.0, 20.0), (30.0, 180.0));
        assert_eq!(indent(10.0, 50.0, 20.0), (10.0, 50.0));
    }

    #[test]
    fn test_wide_table_has_no_negative_cells() {
        let columns = 200;
        let source = format!(
            "|{}\n|{}\n|{}",
            "h|".repeat(columns),
            "-|".repeat(columns),
            "v|".repeat(columns)
        );
        let scene = scene(&source);
        assert_within_canvas(&scene);
        let cells = texts(&scene)
            .into_iter()
            .filter(|item| matches!(item, SceneItem::Text { text, .. } if text == "v"))
            .count();
        assert_eq!(cells, columns);
    }

    #[test]
    fn test_heading_gets_rule_and_text() {
        let scene = scene("# Hello\n\nWorld");
        assert_eq!(scene.text(), "Hello World");
        assert!(scene.items.iter().any(|item| matches!(
            item,
            SceneItem::Rect {
                fill: PrintColor::Rule,
                ..
            }
        )));
    }

    #[test]
    fn test_code_block_has_fill_behind_lines() {
        let scene = scene("```\nfirst\nsecond\n```");
        let SceneItem::Rect { fill, height, .. } = &scene.items[0] else {
            panic!("expected code background first");
        };
        assert_eq!(*fill, PrintColor::CodeBackground);
        assert!(*height > 0.0);
        let lines: Vec<_> = texts(&scene)
            .into_iter()
            .filter_map(|item| match item {
                SceneItem::Text { y, text, .. } => Some((*y, text.clone())),
                _ => None,
            })
            .collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].0 > lines[0].0);
    }

    #[test]
    fn test_list_markers() {
        let scene = scene("- a\n- b\n\n3. x\n4. y\n\n- [x] done\n- [ ] todo");
        let text = scene.text();
        assert!(text.contains("• a"));
        assert!(text.contains("3. x"));
        assert!(text.contains("4. y"));
        assert!(text.contains("☑ done"));
        assert!(text.contains("☐ todo"));
    }

    #[test]
    fn test_math_without_layout_is_placeholder() {
        let scene = scene("Energy $E = mc^2$ here");
        assert_eq!(scene.pending_math(), 1);
    }

    #[test]
    fn test_math_with_layout_draws_runs() {
        let mut math = HashMap::new();
        math.insert(
            MathId(0),
            MathLayout {
                id: MathId(0),
                width: 30.0,
                ascent: 14.0,
                descent: 4.0,
                runs: vec![GlyphRun {
                    text: "x".into(),
                    dx: 0.0,
                    dy: 0.0,
                    size: 16.0,
                    italic: true,
                }],
                rules: vec![MathRule {
                    dx: 0.0,
                    dy: -5.0,
                    width: 30.0,
                    thickness: 1.0,
                }],
            },
        );
        let scene = scene_with("$$x$$", &math);
        assert_eq!(scene.pending_math(), 0);
        assert!(scene.text().contains('x'));
    }

    #[test]
    fn test_missing_image_draws_alt_text() {
        let scene = scene("![a cat](missing/cat.png)");
        assert!(scene.text().contains("[a cat]"));
    }

    #[test]
    fn test_table_cells_are_laid_out_in_columns() {
        let scene = scene("| a | b |\n|---|---|\n| 1 | 2 |");
        let xs: Vec<f32> = texts(&scene)
            .into_iter()
            .filter_map(|item| match item {
                SceneItem::Text { x, text, .. } if text == "a" || text == "b" => Some(*x),
                _ => None,
            })
            .collect();
        assert_eq!(xs.len(), 2);
        assert!(xs[1] > xs[0] + 100.0);
    }

    #[test]
    fn test_block_quote_has_left_bar() {
        let scene = scene("> quoted");
        assert!(scene.items.iter().any(|item| matches!(
            item,
            SceneItem::Rect { width, fill: PrintColor::Rule, .. } if (*width - QUOTE_BAR).abs() < f32::EPSILON
        )));
    }
}

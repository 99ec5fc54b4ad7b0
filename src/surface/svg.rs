//! SVG emission for laid-out scenes.

use std::fmt::Write;

use super::layout::{RunStyle, Scene, SceneItem};
use crate::document::FontRole;
use crate::style::PrintColor;

const fn font_family(font: FontRole) -> &'static str {
    match font {
        FontRole::Sans => "sans-serif",
        FontRole::Serif | FontRole::Math => "serif",
        FontRole::Mono => "monospace",
    }
}

fn escape_xml(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

fn push_text(out: &mut String, x: f32, y: f32, text: &str, style: &RunStyle) {
    let weight = if style.bold { r#" font-weight="700""# } else { "" };
    let slant = if style.italic { r#" font-style="italic""# } else { "" };
    let decoration = match (style.underline, style.strikethrough) {
        (true, true) => r#" text-decoration="underline line-through""#,
        (true, false) => r#" text-decoration="underline""#,
        (false, true) => r#" text-decoration="line-through""#,
        (false, false) => "",
    };
    // Non-breaking spaces keep code indentation without xml:space.
    let body = escape_xml(text).replace(' ', "&#160;");
    let _ = write!(
        out,
        r#"<text x="{x:.2}" y="{y:.2}" font-family="{}" font-size="{:.2}" fill="{}"{weight}{slant}{decoration}>{body}</text>"#,
        font_family(style.font),
        style.size,
        style.color.rgba().to_hex(),
    );
}

/// Render `scene` as a standalone SVG document on an opaque white page.
pub fn to_svg(scene: &Scene) -> String {
    let mut out = String::with_capacity(scene.items.len() * 128 + 256);
    let _ = write!(
        out,
        r#"<svg xmlns="http://www.w3.org/2000/svg" xmlns:xlink="http://www.w3.org/1999/xlink" width="{w}" height="{h}" viewBox="0 0 {w} {h}"><rect x="0" y="0" width="{w}" height="{h}" fill="{bg}"/>"#,
        w = scene.width,
        h = scene.height,
        bg = PrintColor::Background.rgba().to_hex(),
    );
    for item in &scene.items {
        match item {
            SceneItem::Rect {
                x,
                y,
                width,
                height,
                fill,
            } => {
                let _ = write!(
                    out,
                    r#"<rect x="{x:.2}" y="{y:.2}" width="{width:.2}" height="{height:.2}" fill="{}"/>"#,
                    fill.rgba().to_hex()
                );
            }
            SceneItem::Text { x, y, text, style } => push_text(&mut out, *x, *y, text, style),
            SceneItem::Image {
                x,
                y,
                width,
                height,
                image,
            } => {
                let _ = write!(
                    out,
                    r#"<image x="{x:.2}" y="{y:.2}" width="{width:.2}" height="{height:.2}" preserveAspectRatio="none" xlink:href="{}"/>"#,
                    image.data_url
                );
            }
            SceneItem::MathPlaceholder {
                x, y, tex, size, ..
            } => {
                let style = RunStyle {
                    size: *size,
                    font: FontRole::Mono,
                    bold: false,
                    italic: false,
                    color: PrintColor::Text,
                    underline: false,
                    strikethrough: false,
                };
                push_text(&mut out, *x, *y, tex, &style);
            }
        }
    }
    out.push_str("</svg>");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_item(text: &str, underline: bool) -> SceneItem {
        SceneItem::Text {
            x: 10.0,
            y: 20.0,
            text: text.into(),
            style: RunStyle {
                size: 16.0,
                font: FontRole::Serif,
                bold: true,
                italic: false,
                color: PrintColor::Link,
                underline,
                strikethrough: false,
            },
        }
    }

    #[test]
    fn test_svg_has_white_background_first() {
        let scene = Scene {
            width: 800.0,
            height: 64.0,
            items: Vec::new(),
        };
        let svg = to_svg(&scene);
        assert!(svg.starts_with("<svg"));
        assert!(svg.contains(r##"fill="#ffffff""##));
        assert!(svg.ends_with("</svg>"));
    }

    #[test]
    fn test_text_is_escaped_and_styled() {
        let scene = Scene {
            width: 800.0,
            height: 64.0,
            items: vec![text_item("a < b & c", true)],
        };
        let svg = to_svg(&scene);
        assert!(svg.contains("a&#160;&lt;&#160;b&#160;&amp;&#160;c"));
        assert!(svg.contains(r#"font-weight="700""#));
        assert!(svg.contains(r#"text-decoration="underline""#));
        assert!(svg.contains("#0645ad"));
        assert!(svg.contains(r#"font-family="serif""#));
    }

    #[test]
    fn test_placeholder_renders_source_in_mono() {
        let scene = Scene {
            width: 800.0,
            height: 64.0,
            items: vec![SceneItem::MathPlaceholder {
                id: crate::document::MathId(0),
                x: 0.0,
                y: 20.0,
                tex: "x^2".into(),
                size: 16.0,
            }],
        };
        let svg = to_svg(&scene);
        assert!(svg.contains("monospace"));
        assert!(svg.contains("x^2"));
    }
}

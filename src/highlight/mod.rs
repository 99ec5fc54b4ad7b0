//! Syntax highlighting for code blocks in the live view.
//!
//! Uses syntect with Sublime Text syntax definitions. Highlight colours are
//! theme-dependent literals; the export normalizer flattens them.

use std::sync::OnceLock;

use syntect::easy::HighlightLines;
use syntect::highlighting::{Theme as SyntectTheme, ThemeSet};
use syntect::parsing::{SyntaxReference, SyntaxSet};
use syntect::util::LinesWithEndings;

use crate::config::ThemeMode;
use crate::style::Rgba;

const DARK_THEME: &str = "base16-ocean.dark";
const LIGHT_THEME: &str = "InspiredGitHub";

/// A highlighted run of code. `color` is `None` for plain text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HighlightSpan {
    pub text: String,
    pub color: Option<Rgba>,
}

fn syntax_set() -> &'static SyntaxSet {
    static SYNTAXES: OnceLock<SyntaxSet> = OnceLock::new();
    SYNTAXES.get_or_init(SyntaxSet::load_defaults_newlines)
}

fn theme_set() -> &'static ThemeSet {
    static THEMES: OnceLock<ThemeSet> = OnceLock::new();
    THEMES.get_or_init(ThemeSet::load_defaults)
}

fn syntect_theme(mode: ThemeMode) -> Option<&'static SyntectTheme> {
    let name = match mode {
        ThemeMode::Dark => DARK_THEME,
        ThemeMode::Light => LIGHT_THEME,
    };
    theme_set().themes.get(name)
}

fn find_syntax(language: &str) -> Option<&'static SyntaxReference> {
    let set = syntax_set();
    set.find_syntax_by_token(language)
        .or_else(|| set.find_syntax_by_extension(&language.to_ascii_lowercase()))
}

/// Highlight `code`, returning one span list per source line.
///
/// Unknown or missing languages produce uncoloured spans.
pub fn highlight_code(language: Option<&str>, code: &str, mode: ThemeMode) -> Vec<Vec<HighlightSpan>> {
    let syntax = language.and_then(find_syntax);
    let (Some(syntax), Some(theme)) = (syntax, syntect_theme(mode)) else {
        return plain_lines(code);
    };

    let mut highlighter = HighlightLines::new(syntax, theme);
    let mut lines = Vec::new();
    for line in LinesWithEndings::from(code) {
        let Ok(ranges) = highlighter.highlight_line(line, syntax_set()) else {
            return plain_lines(code);
        };
        let spans = ranges
            .into_iter()
            .filter_map(|(style, text)| {
                let text = text.trim_end_matches(['\n', '\r']);
                if text.is_empty() {
                    return None;
                }
                let fg = style.foreground;
                Some(HighlightSpan {
                    text: text.to_string(),
                    color: Some(Rgba::new(fg.r, fg.g, fg.b, fg.a)),
                })
            })
            .collect();
        lines.push(spans);
    }
    if code.is_empty() || code.ends_with('\n') {
        lines.push(Vec::new());
    }
    lines
}

fn plain_lines(code: &str) -> Vec<Vec<HighlightSpan>> {
    code.split('\n')
        .map(|line| {
            if line.is_empty() {
                Vec::new()
            } else {
                vec![HighlightSpan {
                    text: line.to_string(),
                    color: None,
                }]
            }
        })
        .collect()
}

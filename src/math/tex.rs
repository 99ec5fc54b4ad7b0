//! A small TeX subset laid out as positioned Unicode glyph runs.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

use super::{GlyphRun, MathLayout, MathRule};
use crate::document::{FontRole, MathId};
use crate::surface::TextMeasure;

static TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\\[A-Za-z]+|\\.|[{}^_]|\s+|.").expect("valid token pattern")
});

pub(super) static SYMBOLS: LazyLock<HashMap<&'static str, &'static str>> = LazyLock::new(|| {
    [
        ("alpha", "α"),
        ("beta", "β"),
        ("gamma", "γ"),
        ("delta", "δ"),
        ("epsilon", "ε"),
        ("varepsilon", "ε"),
        ("zeta", "ζ"),
        ("eta", "η"),
        ("theta", "θ"),
        ("iota", "ι"),
        ("kappa", "κ"),
        ("lambda", "λ"),
        ("mu", "μ"),
        ("nu", "ν"),
        ("xi", "ξ"),
        ("pi", "π"),
        ("rho", "ρ"),
        ("sigma", "σ"),
        ("tau", "τ"),
        ("phi", "φ"),
        ("varphi", "φ"),
        ("chi", "χ"),
        ("psi", "ψ"),
        ("omega", "ω"),
        ("Gamma", "Γ"),
        ("Delta", "Δ"),
        ("Theta", "Θ"),
        ("Lambda", "Λ"),
        ("Xi", "Ξ"),
        ("Pi", "Π"),
        ("Sigma", "Σ"),
        ("Phi", "Φ"),
        ("Psi", "Ψ"),
        ("Omega", "Ω"),
        ("sum", "∑"),
        ("prod", "∏"),
        ("int", "∫"),
        ("oint", "∮"),
        ("partial", "∂"),
        ("nabla", "∇"),
        ("infty", "∞"),
        ("pm", "±"),
        ("mp", "∓"),
        ("times", "×"),
        ("div", "÷"),
        ("cdot", "·"),
        ("ldots", "…"),
        ("cdots", "⋯"),
        ("leq", "≤"),
        ("le", "≤"),
        ("geq", "≥"),
        ("ge", "≥"),
        ("neq", "≠"),
        ("ne", "≠"),
        ("approx", "≈"),
        ("equiv", "≡"),
        ("sim", "∼"),
        ("propto", "∝"),
        ("in", "∈"),
        ("notin", "∉"),
        ("subset", "⊂"),
        ("subseteq", "⊆"),
        ("cup", "∪"),
        ("cap", "∩"),
        ("forall", "∀"),
        ("exists", "∃"),
        ("emptyset", "∅"),
        ("to", "→"),
        ("rightarrow", "→"),
        ("leftarrow", "←"),
        ("Rightarrow", "⇒"),
        ("Leftrightarrow", "⇔"),
        ("mapsto", "↦"),
        ("langle", "⟨"),
        ("rangle", "⟩"),
        ("hbar", "ℏ"),
        ("ell", "ℓ"),
        ("prime", "′"),
        ("circ", "∘"),
        ("{", "{"),
        ("}", "}"),
        ("%", "%"),
        ("$", "$"),
        ("\\", ""),
    ]
    .into_iter()
    .collect()
});

const FUNCTIONS: &[&str] = &[
    "sin", "cos", "tan", "log", "ln", "exp", "lim", "max", "min", "det", "sup", "inf", "arg",
];

const SCRIPT_SCALE: f32 = 0.7;
const SUPERSCRIPT_RAISE: f32 = 0.4;
const SUBSCRIPT_DROP: f32 = 0.2;
const AXIS: f32 = 0.3;
const RULE_THICKNESS: f32 = 0.06;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Command(String),
    Open,
    Close,
    Sup,
    Sub,
    Char(char),
}

fn tokenize(tex: &str) -> Vec<Token> {
    TOKEN
        .find_iter(tex)
        .filter_map(|m| {
            let s = m.as_str();
            if let Some(name) = s.strip_prefix('\\') {
                return Some(Token::Command(name.to_string()));
            }
            match s {
                "{" => Some(Token::Open),
                "}" => Some(Token::Close),
                "^" => Some(Token::Sup),
                "_" => Some(Token::Sub),
                _ if s.trim().is_empty() => None,
                _ => s.chars().next().map(Token::Char),
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
enum Atom {
    Glyph { text: String, italic: bool },
    Group(Vec<Atom>),
    Scripts {
        base: Box<Atom>,
        sup: Option<Box<Atom>>,
        sub: Option<Box<Atom>>,
    },
    Frac(Box<Atom>, Box<Atom>),
    Sqrt(Box<Atom>),
    /// Horizontal space in em
    Space(f32),
}

impl Atom {
    fn upright(self) -> Self {
        match self {
            Self::Glyph { text, .. } => Self::Glyph {
                text,
                italic: false,
            },
            Self::Group(atoms) => Self::Group(atoms.into_iter().map(Self::upright).collect()),
            Self::Scripts { base, sup, sub } => Self::Scripts {
                base: Box::new(base.upright()),
                sup: sup.map(|a| Box::new(a.upright())),
                sub: sub.map(|a| Box::new(a.upright())),
            },
            Self::Frac(num, den) => Self::Frac(Box::new(num.upright()), Box::new(den.upright())),
            Self::Sqrt(body) => Self::Sqrt(Box::new(body.upright())),
            Self::Space(em) => Self::Space(em),
        }
    }
}

/// Deepest group or argument nesting kept as structure. Deeper braces are
/// read as flat content so parse and layout recursion stay bounded.
const MAX_NESTING: usize = 48;

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
    /// Open braces read flat past [`MAX_NESTING`], awaiting their close
    flattened: usize,
}

impl Parser {
    const fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            depth: 0,
            flattened: 0,
        }
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    /// Run `f` one level deeper, or return `None` at the nesting cap.
    fn nested<T>(&mut self, f: impl FnOnce(&mut Self) -> T) -> Option<T> {
        if self.depth >= MAX_NESTING {
            return None;
        }
        self.depth += 1;
        let out = f(self);
        self.depth -= 1;
        Some(out)
    }

    fn open_group(&mut self) -> Atom {
        if let Some(atoms) = self.nested(|p| p.parse_list(true)) {
            Atom::Group(atoms)
        } else {
            self.flattened += 1;
            Atom::Group(Vec::new())
        }
    }

    fn parse_list(&mut self, in_group: bool) -> Vec<Atom> {
        let mut atoms = Vec::new();
        while let Some(token) = self.next() {
            match token {
                Token::Close if self.flattened > 0 => self.flattened -= 1,
                Token::Close if in_group => break,
                Token::Close => {}
                Token::Sup | Token::Sub => {
                    let script = Box::new(self.parse_argument());
                    attach_script(&mut atoms, script, token == Token::Sup);
                }
                Token::Open => atoms.push(self.open_group()),
                Token::Command(name) => atoms.extend(self.parse_command(&name)),
                Token::Char(ch) => atoms.extend(char_atoms(ch)),
            }
        }
        atoms
    }

    fn parse_argument(&mut self) -> Atom {
        match self.next() {
            Some(Token::Open) => self.open_group(),
            Some(Token::Command(name)) => match self.nested(|p| p.parse_command(&name)) {
                Some(atoms) => Atom::Group(atoms),
                None => upright(name),
            },
            Some(Token::Char(ch)) => Atom::Group(char_atoms(ch)),
            Some(Token::Close | Token::Sup | Token::Sub) | None => Atom::Group(Vec::new()),
        }
    }

    fn parse_command(&mut self, name: &str) -> Vec<Atom> {
        match name {
            "frac" | "dfrac" | "tfrac" => {
                let num = self.parse_argument();
                let den = self.parse_argument();
                vec![Atom::Frac(Box::new(num), Box::new(den))]
            }
            "sqrt" => vec![Atom::Sqrt(Box::new(self.parse_argument()))],
            "text" | "mathrm" | "mathbf" | "operatorname" => {
                vec![self.parse_argument().upright()]
            }
            "mathit" => vec![self.parse_argument()],
            "left" | "right" => match self.next() {
                Some(Token::Char('.')) | None => Vec::new(),
                Some(Token::Char(ch)) => vec![upright(ch.to_string())],
                Some(Token::Command(inner)) => self
                    .nested(|p| p.parse_command(&inner))
                    .unwrap_or_default(),
                Some(_) => Vec::new(),
            },
            "," => vec![Atom::Space(0.17)],
            ":" | ">" => vec![Atom::Space(0.22)],
            ";" => vec![Atom::Space(0.28)],
            " " => vec![Atom::Space(0.33)],
            "quad" => vec![Atom::Space(1.0)],
            "qquad" => vec![Atom::Space(2.0)],
            "!" => Vec::new(),
            _ if FUNCTIONS.contains(&name) => vec![upright(name.to_string()), Atom::Space(0.17)],
            _ => match SYMBOLS.get(name) {
                Some(symbol) => {
                    let lowercase_greek = symbol.chars().all(|c| ('α'..='ω').contains(&c));
                    vec![Atom::Glyph {
                        text: (*symbol).to_string(),
                        italic: lowercase_greek,
                    }]
                }
                None => vec![Atom::Glyph {
                    text: name.to_string(),
                    italic: true,
                }],
            },
        }
    }
}

fn upright(text: String) -> Atom {
    Atom::Glyph {
        text,
        italic: false,
    }
}

fn char_atoms(ch: char) -> Vec<Atom> {
    match ch {
        '=' | '<' | '>' | '+' | '-' => {
            let glyph = if ch == '-' { '−' } else { ch };
            vec![
                Atom::Space(0.22),
                upright(glyph.to_string()),
                Atom::Space(0.22),
            ]
        }
        ',' => vec![upright(",".into()), Atom::Space(0.17)],
        '\'' => vec![upright("′".into())],
        _ => vec![Atom::Glyph {
            text: ch.to_string(),
            italic: ch.is_alphabetic(),
        }],
    }
}

/// Attach a script to the last atom. A base whose slot is already taken
/// keeps it, and the script starts a new empty-based atom, so repeated
/// scripts never nest.
fn attach_script(atoms: &mut Vec<Atom>, script: Box<Atom>, is_sup: bool) {
    let (base, sup, sub) = match atoms.pop() {
        Some(Atom::Scripts { base, sup, sub })
            if (is_sup && sup.is_none()) || (!is_sup && sub.is_none()) =>
        {
            (base, sup, sub)
        }
        Some(taken @ Atom::Scripts { .. }) => {
            atoms.push(taken);
            (Box::new(Atom::Group(Vec::new())), None, None)
        }
        Some(base) => (Box::new(base), None, None),
        None => (Box::new(Atom::Group(Vec::new())), None, None),
    };
    let (sup, sub) = if is_sup {
        (Some(script), sub)
    } else {
        (sup, Some(script))
    };
    atoms.push(Atom::Scripts { base, sup, sub });
}

/// Geometry of a laid-out atom, relative to its baseline origin.
#[derive(Debug, Default)]
struct MathBox {
    width: f32,
    ascent: f32,
    descent: f32,
    runs: Vec<GlyphRun>,
    rules: Vec<MathRule>,
}

impl MathBox {
    fn place(&mut self, other: Self, dx: f32, dy: f32) {
        self.ascent = self.ascent.max(other.ascent - dy);
        self.descent = self.descent.max(other.descent + dy);
        self.width = self.width.max(dx + other.width);
        self.runs.extend(other.runs.into_iter().map(|mut run| {
            run.dx += dx;
            run.dy += dy;
            run
        }));
        self.rules.extend(other.rules.into_iter().map(|mut rule| {
            rule.dx += dx;
            rule.dy += dy;
            rule
        }));
    }

    fn append(&mut self, other: Self) {
        let dx = self.width;
        self.place(other, dx, 0.0);
    }
}

struct Layouter<'a> {
    measure: &'a dyn TextMeasure,
}

impl Layouter<'_> {
    fn layout(&self, atom: &Atom, size: f32) -> MathBox {
        match atom {
            Atom::Glyph { text, italic } => MathBox {
                width: self.measure.advance(text, size, FontRole::Math, false),
                ascent: size * 0.8,
                descent: size * 0.2,
                runs: vec![GlyphRun {
                    text: text.clone(),
                    dx: 0.0,
                    dy: 0.0,
                    size,
                    italic: *italic,
                }],
                rules: Vec::new(),
            },
            Atom::Group(atoms) => self.layout_row(atoms, size),
            Atom::Space(em) => MathBox {
                width: em * size,
                ..MathBox::default()
            },
            Atom::Scripts { base, sup, sub } => {
                let mut out = self.layout(base, size);
                let x = out.width;
                let script_size = size * SCRIPT_SCALE;
                if let Some(sup) = sup {
                    let b = self.layout(sup, script_size);
                    out.place(b, x, -size * SUPERSCRIPT_RAISE);
                }
                if let Some(sub) = sub {
                    let b = self.layout(sub, script_size);
                    out.place(b, x, size * SUBSCRIPT_DROP);
                }
                out
            }
            Atom::Frac(num, den) => {
                let part_size = size * 0.85;
                let num = self.layout(num, part_size);
                let den = self.layout(den, part_size);
                let pad = size * 0.1;
                let width = num.width.max(den.width) + 2.0 * pad;
                let axis = -size * AXIS;
                let gap = size * 0.15;
                let thickness = size * RULE_THICKNESS;
                let mut out = MathBox::default();
                let num_dy = axis - gap - num.descent;
                let den_dy = axis + gap + den.ascent;
                let num_dx = (width - num.width) / 2.0;
                let den_dx = (width - den.width) / 2.0;
                out.place(num, num_dx, num_dy);
                out.place(den, den_dx, den_dy);
                out.rules.push(MathRule {
                    dx: 0.0,
                    dy: axis - thickness / 2.0,
                    width,
                    thickness,
                });
                out.width = width;
                out
            }
            Atom::Sqrt(body) => {
                let body = self.layout(body, size);
                let radical = self.layout(
                    &Atom::Glyph {
                        text: "√".into(),
                        italic: false,
                    },
                    size,
                );
                let thickness = size * RULE_THICKNESS;
                let bar_dy = -(body.ascent + size * 0.1);
                let body_width = body.width;
                let mut out = MathBox::default();
                let x = radical.width;
                out.append(radical);
                out.place(body, x, 0.0);
                out.rules.push(MathRule {
                    dx: x,
                    dy: bar_dy - thickness,
                    width: body_width,
                    thickness,
                });
                out.ascent = out.ascent.max(-bar_dy + thickness);
                out
            }
        }
    }

    fn layout_row(&self, atoms: &[Atom], size: f32) -> MathBox {
        let mut row = MathBox::default();
        for atom in atoms {
            row.append(self.layout(atom, size));
        }
        row
    }
}

/// Lay out `tex` at `size` CSS pixels.
pub fn layout(id: MathId, tex: &str, size: f32, measure: &dyn TextMeasure) -> MathLayout {
    let mut parser = Parser::new(tokenize(tex));
    let atoms = parser.parse_list(false);
    let layouter = Layouter { measure };
    let mut out = layouter.layout_row(&atoms, size);
    if out.runs.is_empty() && out.rules.is_empty() {
        out.ascent = size * 0.8;
        out.descent = size * 0.2;
    }
    MathLayout {
        id,
        width: out.width,
        ascent: out.ascent,
        descent: out.descent,
        runs: out.runs,
        rules: out.rules,
    }
}

//! Rich text for chat messages.
//!
//! Messages are kept as a list of styled segments rather than a flat string,
//! so a channel prefix can be put in front of a message without disturbing
//! the formatting of either part. Configuration and chat input use the
//! legacy `&`-code markup (`&a` green, `&l` bold, `&r` reset, ...).

mod color;

pub use color::Color;

use std::fmt;

/// Escape character for ANSI sequences.
const ESC: char = '\x1b';

/// Character introducing a legacy format code.
const CODE_CHAR: char = '&';

/// Formatting applied to a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Style {
    /// Foreground color, `None` for the client default.
    pub color: Option<Color>,
    /// Bold text.
    pub bold: bool,
    /// Italic text.
    pub italic: bool,
    /// Underlined text.
    pub underline: bool,
    /// Struck-through text.
    pub strikethrough: bool,
    /// Scrambled text.
    pub obfuscated: bool,
}

impl Style {
    /// A style with only a color set.
    pub fn colored(color: Color) -> Self {
        Self {
            color: Some(color),
            ..Self::default()
        }
    }

    /// Whether this style changes anything from the default.
    pub fn is_plain(&self) -> bool {
        *self == Self::default()
    }

    fn ansi_params(&self) -> Vec<String> {
        let mut params = Vec::new();
        if self.bold {
            params.push("1".to_string());
        }
        if self.italic {
            params.push("3".to_string());
        }
        if self.underline {
            params.push("4".to_string());
        }
        if self.obfuscated {
            params.push("5".to_string());
        }
        if self.strikethrough {
            params.push("9".to_string());
        }
        if let Some(color) = self.color {
            params.push(color.fg_code().to_string());
        }
        params
    }
}

/// A run of text sharing one style.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// The text content.
    pub text: String,
    /// Formatting of the text.
    pub style: Style,
}

/// Structured, styled chat text.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RichText {
    segments: Vec<Segment>,
}

impl RichText {
    /// Create empty rich text.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create rich text from unstyled text. Markup is not interpreted.
    pub fn plain(text: impl Into<String>) -> Self {
        let mut rich = Self::new();
        rich.push(text, Style::default());
        rich
    }

    /// Parse legacy `&`-code markup.
    ///
    /// A color code resets any active formatting; `&r` resets everything.
    /// `&&` produces a literal `&`, and unknown codes are kept as text.
    pub fn from_legacy(input: &str) -> Self {
        let mut rich = Self::new();
        let mut style = Style::default();
        let mut buf = String::new();
        let mut chars = input.chars().peekable();

        while let Some(c) = chars.next() {
            if c != CODE_CHAR {
                buf.push(c);
                continue;
            }

            let Some(&code) = chars.peek() else {
                buf.push(c);
                continue;
            };

            if code == CODE_CHAR {
                chars.next();
                buf.push(CODE_CHAR);
                continue;
            }

            let next_style = match Color::from_code(code) {
                Some(color) => Some(Style::colored(color)),
                None => match code.to_ascii_lowercase() {
                    'l' => Some(Style { bold: true, ..style }),
                    'o' => Some(Style { italic: true, ..style }),
                    'n' => Some(Style { underline: true, ..style }),
                    'm' => Some(Style { strikethrough: true, ..style }),
                    'k' => Some(Style { obfuscated: true, ..style }),
                    'r' => Some(Style::default()),
                    _ => None,
                },
            };

            match next_style {
                Some(next) => {
                    chars.next();
                    rich.push(std::mem::take(&mut buf), style);
                    style = next;
                }
                None => buf.push(c),
            }
        }

        rich.push(buf, style);
        rich
    }

    /// Append a styled run. Empty text is ignored.
    pub fn push(&mut self, text: impl Into<String>, style: Style) {
        let text = text.into();
        if text.is_empty() {
            return;
        }
        self.segments.push(Segment { text, style });
    }

    /// Append another rich text, keeping each segment's own style.
    pub fn append(&mut self, other: RichText) {
        self.segments.extend(other.segments);
    }

    /// Builder form of [`RichText::append`].
    pub fn then(mut self, other: RichText) -> Self {
        self.append(other);
        self
    }

    /// Join two rich texts.
    pub fn concat(a: RichText, b: RichText) -> Self {
        a.then(b)
    }

    /// The styled segments in order.
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Whether there is no visible text.
    pub fn is_empty(&self) -> bool {
        self.segments.iter().all(|s| s.text.is_empty())
    }

    /// The text with all formatting removed.
    pub fn to_plain(&self) -> String {
        self.segments.iter().map(|s| s.text.as_str()).collect()
    }

    /// Render for an ANSI-capable terminal.
    pub fn to_ansi(&self) -> String {
        let mut out = String::new();
        let mut styled = false;

        for segment in &self.segments {
            if styled {
                out.push_str(&format!("{ESC}[0m"));
                styled = false;
            }
            let params = segment.style.ansi_params();
            if !params.is_empty() {
                out.push_str(&format!("{ESC}[{}m", params.join(";")));
                styled = true;
            }
            out.push_str(&segment.text);
        }

        if styled {
            out.push_str(&format!("{ESC}[0m"));
        }
        out
    }

    /// Render back to legacy `&`-code markup.
    pub fn to_legacy(&self) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            let style = segment.style;
            if !style.is_plain() {
                match style.color {
                    Some(color) => {
                        out.push(CODE_CHAR);
                        out.push(color.code());
                    }
                    None => out.push_str("&r"),
                }
                for (on, code) in [
                    (style.bold, 'l'),
                    (style.italic, 'o'),
                    (style.underline, 'n'),
                    (style.strikethrough, 'm'),
                    (style.obfuscated, 'k'),
                ] {
                    if on {
                        out.push(CODE_CHAR);
                        out.push(code);
                    }
                }
            } else if !out.is_empty() {
                out.push_str("&r");
            }
            out.push_str(&segment.text.replace(CODE_CHAR, "&&"));
        }
        out
    }
}

impl fmt::Display for RichText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_plain())
    }
}

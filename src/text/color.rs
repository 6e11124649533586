//! Legacy chat colors and their ANSI counterparts.

/// The sixteen legacy chat colors, addressed by the hex digit after `&`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Color {
    /// `&0`
    Black,
    /// `&1`
    DarkBlue,
    /// `&2`
    DarkGreen,
    /// `&3`
    DarkAqua,
    /// `&4`
    DarkRed,
    /// `&5`
    DarkPurple,
    /// `&6`
    Gold,
    /// `&7`
    Gray,
    /// `&8`
    DarkGray,
    /// `&9`
    Blue,
    /// `&a`
    Green,
    /// `&b`
    Aqua,
    /// `&c`
    Red,
    /// `&d`
    LightPurple,
    /// `&e`
    Yellow,
    /// `&f`
    White,
}

const ALL: [Color; 16] = [
    Color::Black,
    Color::DarkBlue,
    Color::DarkGreen,
    Color::DarkAqua,
    Color::DarkRed,
    Color::DarkPurple,
    Color::Gold,
    Color::Gray,
    Color::DarkGray,
    Color::Blue,
    Color::Green,
    Color::Aqua,
    Color::Red,
    Color::LightPurple,
    Color::Yellow,
    Color::White,
];

impl Color {
    /// Look up a color by its legacy code character (case-insensitive).
    pub fn from_code(code: char) -> Option<Self> {
        code.to_digit(16).map(|idx| ALL[idx as usize])
    }

    /// The legacy code character for this color.
    pub fn code(self) -> char {
        let idx = ALL.iter().position(|c| *c == self).unwrap_or(15);
        std::char::from_digit(idx as u32, 16).unwrap_or('f')
    }

    /// Get the ANSI SGR code for the foreground.
    ///
    /// Dark variants use the standard 30-37 range, bright ones 90-97.
    pub fn fg_code(self) -> u8 {
        match self {
            Color::Black => 30,
            Color::DarkRed => 31,
            Color::DarkGreen => 32,
            Color::Gold => 33,
            Color::DarkBlue => 34,
            Color::DarkPurple => 35,
            Color::DarkAqua => 36,
            Color::Gray => 37,
            Color::DarkGray => 90,
            Color::Red => 91,
            Color::Green => 92,
            Color::Yellow => 93,
            Color::Blue => 94,
            Color::LightPurple => 95,
            Color::Aqua => 96,
            Color::White => 97,
        }
    }
}

//! Member color palette
//!
//! Eight colors assigned to members by joined-order index modulo 8, plus
//! the mapping from palette names to tmux border colours.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Closed member color palette, in assignment order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    Red,
    Blue,
    Green,
    Yellow,
    Purple,
    Orange,
    Pink,
    Cyan,
}

/// All palette entries in assignment order.
pub const PALETTE: [Color; 8] = [
    Color::Red,
    Color::Blue,
    Color::Green,
    Color::Yellow,
    Color::Purple,
    Color::Orange,
    Color::Pink,
    Color::Cyan,
];

impl Color {
    /// Color for the member at `index` in joined order.
    pub fn assign(index: usize) -> Self {
        PALETTE[index % PALETTE.len()]
    }

    /// tmux border colour for this palette entry.
    pub fn tmux_border(self) -> &'static str {
        match self {
            Color::Purple => "magenta",
            Color::Orange => "colour208",
            Color::Pink => "colour205",
            Color::Red => "red",
            Color::Blue => "blue",
            Color::Green => "green",
            Color::Yellow => "yellow",
            Color::Cyan => "cyan",
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Color::Red => "red",
            Color::Blue => "blue",
            Color::Green => "green",
            Color::Yellow => "yellow",
            Color::Purple => "purple",
            Color::Orange => "orange",
            Color::Pink => "pink",
            Color::Cyan => "cyan",
        };
        write!(f, "{name}")
    }
}

impl FromStr for Color {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "red" => Ok(Color::Red),
            "blue" => Ok(Color::Blue),
            "green" => Ok(Color::Green),
            "yellow" => Ok(Color::Yellow),
            "purple" => Ok(Color::Purple),
            "orange" => Ok(Color::Orange),
            "pink" => Ok(Color::Pink),
            "cyan" => Ok(Color::Cyan),
            other => Err(format!("unknown color: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assignment_wraps_modulo_eight() {
        assert_eq!(Color::assign(0), Color::Red);
        assert_eq!(Color::assign(4), Color::Purple);
        assert_eq!(Color::assign(8), Color::Red);
        assert_eq!(Color::assign(13), Color::Orange);
    }

    #[test]
    fn test_tmux_border_mapping() {
        assert_eq!(Color::Purple.tmux_border(), "magenta");
        assert_eq!(Color::Orange.tmux_border(), "colour208");
        assert_eq!(Color::Pink.tmux_border(), "colour205");
        assert_eq!(Color::Green.tmux_border(), "green");
    }

    #[test]
    fn test_roundtrip_display_parse() {
        for color in PALETTE {
            assert_eq!(color.to_string().parse::<Color>().unwrap(), color);
        }
    }
}

// colour.rs — The fixed line-colour palette and its cursor.
//
// Values follow the usual game-engine named-colour constants, so yellow is
// the slightly orange (1, 0.92, 0.016) and grey is mid-grey.

use serde::{Deserialize, Serialize};

use crate::image::Rgba;

/// Named entries of the line-colour palette, in cycle order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaletteColour {
    Red,
    Green,
    Blue,
    Cyan,
    Magenta,
    Yellow,
    White,
    Grey,
    Black,
}

impl PaletteColour {
    /// Cycle order.
    pub const ALL: [PaletteColour; 9] = [
        PaletteColour::Red,
        PaletteColour::Green,
        PaletteColour::Blue,
        PaletteColour::Cyan,
        PaletteColour::Magenta,
        PaletteColour::Yellow,
        PaletteColour::White,
        PaletteColour::Grey,
        PaletteColour::Black,
    ];

    pub fn rgba(self) -> Rgba {
        match self {
            PaletteColour::Red => Rgba::new(1.0, 0.0, 0.0, 1.0),
            PaletteColour::Green => Rgba::new(0.0, 1.0, 0.0, 1.0),
            PaletteColour::Blue => Rgba::new(0.0, 0.0, 1.0, 1.0),
            PaletteColour::Cyan => Rgba::new(0.0, 1.0, 1.0, 1.0),
            PaletteColour::Magenta => Rgba::new(1.0, 0.0, 1.0, 1.0),
            PaletteColour::Yellow => Rgba::new(1.0, 0.92, 0.016, 1.0),
            PaletteColour::White => Rgba::WHITE,
            PaletteColour::Grey => Rgba::new(0.5, 0.5, 0.5, 1.0),
            PaletteColour::Black => Rgba::BLACK,
        }
    }

    /// Position in the cycle.
    pub fn index(self) -> usize {
        // ALL is in declaration order.
        self as usize
    }

    /// The entry after this one, wrapping from black back to red.
    pub fn next(self) -> PaletteColour {
        Self::ALL[(self.index() + 1) % Self::ALL.len()]
    }
}

impl std::fmt::Display for PaletteColour {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PaletteColour::Red => "red",
            PaletteColour::Green => "green",
            PaletteColour::Blue => "blue",
            PaletteColour::Cyan => "cyan",
            PaletteColour::Magenta => "magenta",
            PaletteColour::Yellow => "yellow",
            PaletteColour::White => "white",
            PaletteColour::Grey => "grey",
            PaletteColour::Black => "black",
        };
        f.write_str(name)
    }
}

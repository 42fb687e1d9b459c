//! Capability tags a measure unit can expose.
//!
//! Every [`Operation`](super::Operation) names the capability it needs; the
//! session checks the unit's set before encoding anything, so asking a
//! Trimble for ATR is a predictable `UnsupportedCapability` branch rather than
//! a half-built command.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Feature an instrument family may or may not provide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Capability {
    /// Motorized rotation
    Robot,
    /// Angle readout
    Angle,
    /// Electronic distance measurement
    Edm,
    /// Automatic target recognition
    Atr,
    /// Prism lock and follow
    Lock,
    /// Reflectorless EDM
    Rl,
    /// Red laser pointer
    Laser,
    /// Coordinate output
    Position,
    /// Power search for a lost prism
    PowerSearch,
}

impl Capability {
    pub fn tag(self) -> &'static str {
        match self {
            Capability::Robot => "ROBOT",
            Capability::Angle => "ANGLE",
            Capability::Edm => "EDM",
            Capability::Atr => "ATR",
            Capability::Lock => "LOCK",
            Capability::Rl => "RL",
            Capability::Laser => "LASER",
            Capability::Position => "POSITION",
            Capability::PowerSearch => "POWERSEARCH",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Robotic Leica total station with every feature.
pub const LEICA_TPS1200: &[Capability] = &[
    Capability::Robot,
    Capability::Angle,
    Capability::Edm,
    Capability::Atr,
    Capability::Lock,
    Capability::Rl,
    Capability::PowerSearch,
    Capability::Laser,
    Capability::Position,
];

/// Older Leica robot, no power search.
pub const LEICA_TCRA1100: &[Capability] = &[
    Capability::Robot,
    Capability::Angle,
    Capability::Edm,
    Capability::Atr,
    Capability::Lock,
    Capability::Rl,
    Capability::Laser,
    Capability::Position,
];

pub const TRIMBLE_5500: &[Capability] = &[
    Capability::Robot,
    Capability::Angle,
    Capability::Edm,
    Capability::Rl,
    Capability::Laser,
    Capability::Position,
];

pub const NMEA_GNSS: &[Capability] = &[Capability::Position];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags() {
        assert_eq!(Capability::PowerSearch.to_string(), "POWERSEARCH");
        assert_eq!(Capability::Rl.to_string(), "RL");
    }

    #[test]
    fn test_model_sets() {
        assert!(LEICA_TPS1200.contains(&Capability::PowerSearch));
        assert!(!LEICA_TCRA1100.contains(&Capability::PowerSearch));
        assert!(!TRIMBLE_5500.contains(&Capability::Atr));
        assert!(!TRIMBLE_5500.contains(&Capability::Lock));
        assert_eq!(NMEA_GNSS, &[Capability::Position]);
    }
}

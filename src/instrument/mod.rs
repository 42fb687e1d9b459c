//! Vendor command protocols.
//!
//! A [`MeasureUnit`] turns a logical [`Operation`] into vendor wire text and a
//! raw reply back into a [`Measurement`]. It never touches a transport; the
//! session owns the exchange. Three families are provided:
//!
//! - [`leica::LeicaUnit`]: GeoCOM `%R1Q,<code>:<args>` (TPS1200, TCRA1100)
//! - [`trimble::Trimble5500`]: `WG,<code>=<value>` / `RG,<code>` batches
//! - [`nmea::NmeaGnssUnit`]: passive `$GPGGA` sentences

pub mod capabilities;
pub mod leica;
pub mod nmea;
pub mod trimble;

pub use capabilities::Capability;
pub use leica::{LeicaModel, LeicaUnit};
pub use nmea::NmeaGnssUnit;
pub use trimble::Trimble5500;

use crate::angle::Angle;
use crate::error::ProtocolError;
use crate::measurement::Measurement;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// EDM program for a distance measurement (Leica `TMC_DoMeasure`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EdmProgram {
    Stop,
    #[default]
    Default,
    Track,
    Clear,
    Signal,
    Rtrk,
}

impl EdmProgram {
    pub fn code(self) -> u8 {
        match self {
            EdmProgram::Stop => 0,
            EdmProgram::Default => 1,
            EdmProgram::Track => 2,
            EdmProgram::Clear => 3,
            EdmProgram::Signal => 4,
            EdmProgram::Rtrk => 8,
        }
    }
}

/// Atmospheric correction to apply.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AtmCorrection {
    /// Scale in ppm (Trimble only)
    Ppm(f64),
    /// Meteorological readings
    Meteo {
        lambda: f64,
        pressure: f64,
        dry_temp: f64,
        wet_temp: f64,
    },
}

/// One logical instrument operation with its typed parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// Wake up; `remote` switches to remote control mode
    SwitchOn { remote: bool },
    SwitchOff,
    /// Prism constant in mm
    SetPc(f64),
    GetPc,
    SetAtr(bool),
    GetAtr,
    SetLock(bool),
    GetLock,
    LockIn,
    SetAtmCorr(AtmCorrection),
    GetAtmCorr,
    SetRefCorr {
        enabled: bool,
        earth_radius: f64,
        scale: f64,
    },
    GetRefCorr,
    SetStation {
        east: f64,
        north: f64,
        elev: Option<f64>,
        ih: f64,
    },
    GetStation,
    /// Model specific EDM mode code
    SetEdmMode(i32),
    GetEdmMode,
    SetOrientation(Angle),
    Move { hz: Angle, v: Angle, atr: bool },
    FineAdjust { hz_range: Angle, v_range: Angle },
    Measure { program: EdmProgram, incl: u8 },
    GetMeasure { wait_ms: u32, incl: u8 },
    MeasureDistAng { program: EdmProgram },
    Coords { wait_ms: u32, incl: u8 },
    GetAngles,
    ClearDistance,
    ChangeFace,
    SetRedLaser(bool),
    SetSearchArea {
        hz_center: Angle,
        v_center: Angle,
        hz_range: Angle,
        v_range: Angle,
        enabled: bool,
    },
    PowerSearch { clockwise: bool },
    GetSpiral,
    SetSpiral { hz_range: Angle, v_range: Angle },
    SearchTarget,
    GetInstrumentNo,
    GetInstrumentName,
    GetInternalTemperature,
    SetPrismType(i32),
    GetPrismType,
    /// GGA position fix from a GNSS receiver
    GnssPosition,
}

impl Operation {
    /// Capability the instrument must have for this operation, if any.
    pub fn required_capability(&self) -> Option<Capability> {
        use Operation::*;
        match self {
            SwitchOn { .. } | SwitchOff | GetInstrumentNo | GetInstrumentName
            | GetInternalTemperature => None,
            SetPc(_) | GetPc | SetAtmCorr(_) | GetAtmCorr | SetRefCorr { .. } | GetRefCorr
            | SetEdmMode(_) | GetEdmMode | Measure { .. } | GetMeasure { .. }
            | MeasureDistAng { .. } | ClearDistance | SetPrismType(_) | GetPrismType => {
                Some(Capability::Edm)
            }
            SetAtr(_) | GetAtr | FineAdjust { .. } | GetSpiral | SetSpiral { .. }
            | SearchTarget => Some(Capability::Atr),
            SetLock(_) | GetLock | LockIn => Some(Capability::Lock),
            SetStation { .. } | GetStation | Coords { .. } | GnssPosition => {
                Some(Capability::Position)
            }
            SetOrientation(_) | GetAngles => Some(Capability::Angle),
            Move { .. } | ChangeFace => Some(Capability::Robot),
            SetRedLaser(_) => Some(Capability::Laser),
            SetSearchArea { .. } | PowerSearch { .. } => Some(Capability::PowerSearch),
        }
    }

    pub fn name(&self) -> &'static str {
        use Operation::*;
        match self {
            SwitchOn { .. } => "switch on",
            SwitchOff => "switch off",
            SetPc(_) => "set prism constant",
            GetPc => "get prism constant",
            SetAtr(_) => "set ATR",
            GetAtr => "get ATR",
            SetLock(_) => "set lock",
            GetLock => "get lock",
            LockIn => "lock in",
            SetAtmCorr(AtmCorrection::Ppm(_)) => "set atmospheric ppm",
            SetAtmCorr(_) => "set atmospheric correction",
            GetAtmCorr => "get atmospheric correction",
            SetRefCorr { .. } => "set refraction correction",
            GetRefCorr => "get refraction correction",
            SetStation { .. } => "set station",
            GetStation => "get station",
            SetEdmMode(_) => "set EDM mode",
            GetEdmMode => "get EDM mode",
            SetOrientation(_) => "set orientation",
            Move { .. } => "move",
            FineAdjust { .. } => "fine adjust",
            Measure { .. } => "measure",
            GetMeasure { .. } => "get measure",
            MeasureDistAng { .. } => "measure distance and angles",
            Coords { .. } => "coordinates",
            GetAngles => "get angles",
            ClearDistance => "clear distance",
            ChangeFace => "change face",
            SetRedLaser(_) => "set red laser",
            SetSearchArea { .. } => "set search area",
            PowerSearch { .. } => "power search",
            GetSpiral => "get spiral",
            SetSpiral { .. } => "set spiral",
            SearchTarget => "search target",
            GetInstrumentNo => "instrument number",
            GetInstrumentName => "instrument name",
            GetInternalTemperature => "internal temperature",
            SetPrismType(_) => "set prism type",
            GetPrismType => "get prism type",
            GnssPosition => "GNSS position",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Vendor wire text for one logical operation.
///
/// `parts` are sent one line at a time and each gets exactly one reply; the
/// replies are joined with [`Command::SEPARATOR`] before decoding. A listen
/// command sends nothing and reads sentences until one carries `tag`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    parts: Vec<String>,
    listen: Option<String>,
}

impl Command {
    /// Batch separator on the wire and between joined replies.
    pub const SEPARATOR: char = '|';

    /// Split `text` on `|` into a request batch.
    pub fn new(text: impl AsRef<str>) -> Self {
        Self {
            parts: text
                .as_ref()
                .split(Self::SEPARATOR)
                .filter(|p| !p.trim().is_empty())
                .map(str::to_string)
                .collect(),
            listen: None,
        }
    }

    /// Wait for an unsolicited sentence carrying `tag`.
    pub fn listen(tag: impl Into<String>) -> Self {
        Self {
            parts: Vec::new(),
            listen: Some(tag.into()),
        }
    }

    pub fn parts(&self) -> &[String] {
        &self.parts
    }

    pub fn listen_tag(&self) -> Option<&str> {
        self.listen.as_deref()
    }

    /// Whole request as one `|`-joined string.
    pub fn text(&self) -> String {
        match &self.listen {
            Some(tag) => tag.clone(),
            None => self.parts.join("|"),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text())
    }
}

/// What a measure unit wants the session to do for an operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    /// Exchange this command and decode the reply.
    Wire(Command),
    /// No native command; the session synthesizes the operation.
    Derived,
    /// Answered from state the unit keeps, no exchange.
    Local(Measurement),
}

/// Encoder/decoder for one instrument family.
pub trait MeasureUnit: Send {
    /// Display name, e.g. "Leica TPS1200".
    fn name(&self) -> &str;

    /// Fixed capability set of this family.
    fn capabilities(&self) -> &'static [Capability];

    fn has(&self, capability: Capability) -> bool {
        self.capabilities().contains(&capability)
    }

    /// Reject `op` if the family lacks the capability it needs.
    fn check(&self, op: &Operation) -> Result<(), ProtocolError> {
        match op.required_capability() {
            Some(capability) if !self.has(capability) => {
                Err(ProtocolError::UnsupportedCapability {
                    unit: self.name().to_string(),
                    capability,
                })
            }
            _ => Ok(()),
        }
    }

    /// Byte that ends one reply on a serial line.
    fn end_of_message(&self) -> u8 {
        b'\n'
    }

    /// Look up an EDM mode code by name, e.g. "FAST".
    fn edm_mode(&self, name: &str) -> Option<i32>;

    /// Build the request for `op`. Capability has already been checked.
    fn encode(&mut self, op: &Operation) -> Result<Request, ProtocolError>;

    /// Parse the joined replies to `command`.
    fn decode(&self, command: &Command, reply: &str) -> Result<Measurement, ProtocolError>;

    fn unsupported(&self, op: &Operation) -> ProtocolError {
        ProtocolError::UnsupportedOperation {
            unit: self.name().to_string(),
            operation: op.name().to_string(),
        }
    }
}

/// Instrument family selectable from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstrumentModel {
    Tps1200,
    Tcra1100,
    Trimble5500,
    Nmea,
}

impl InstrumentModel {
    /// Fresh measure unit for this model.
    pub fn build(self) -> Box<dyn MeasureUnit> {
        match self {
            InstrumentModel::Tps1200 => Box::new(LeicaUnit::new(LeicaModel::Tps1200)),
            InstrumentModel::Tcra1100 => Box::new(LeicaUnit::new(LeicaModel::Tcra1100)),
            InstrumentModel::Trimble5500 => Box::new(Trimble5500::new()),
            InstrumentModel::Nmea => Box::new(NmeaGnssUnit::new()),
        }
    }
}

impl FromStr for InstrumentModel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tps1200" | "1200" => Ok(InstrumentModel::Tps1200),
            "tcra1100" | "1100" => Ok(InstrumentModel::Tcra1100),
            "trimble5500" | "5500" => Ok(InstrumentModel::Trimble5500),
            "nmea" | "gnss" => Ok(InstrumentModel::Nmea),
            other => Err(format!("unknown instrument model '{other}'")),
        }
    }
}

/// Pseudo degrees with four decimals, the angle argument format.
pub(crate) fn pdeg4(angle: Angle) -> String {
    format!("{:.4}", angle.pdeg())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_batches() {
        let cmd = Command::new("TG|RG");
        assert_eq!(cmd.parts(), &["TG".to_string(), "RG".to_string()]);
        assert_eq!(cmd.to_string(), "TG|RG");
        assert!(cmd.listen_tag().is_none());

        let single = Command::new("%R1Q,2003:0");
        assert_eq!(single.parts().len(), 1);

        let nmea = Command::listen("GPGGA");
        assert!(nmea.parts().is_empty());
        assert_eq!(nmea.listen_tag(), Some("GPGGA"));
    }

    #[test]
    fn test_required_capabilities() {
        assert_eq!(Operation::GetAtr.required_capability(), Some(Capability::Atr));
        assert_eq!(
            Operation::PowerSearch { clockwise: true }.required_capability(),
            Some(Capability::PowerSearch)
        );
        assert_eq!(Operation::SwitchOff.required_capability(), None);
        assert_eq!(Operation::ChangeFace.required_capability(), Some(Capability::Robot));
    }

    #[test]
    fn test_check_rejects_missing_capability() {
        let trimble = InstrumentModel::Trimble5500.build();
        let err = trimble.check(&Operation::SetAtr(true)).unwrap_err();
        assert_eq!(
            err,
            ProtocolError::UnsupportedCapability {
                unit: "Trimble 5500".into(),
                capability: Capability::Atr
            }
        );
        assert!(trimble.check(&Operation::GetAngles).is_ok());
    }

    #[test]
    fn test_model_parse() {
        assert_eq!("TPS1200".parse::<InstrumentModel>(), Ok(InstrumentModel::Tps1200));
        assert_eq!("5500".parse::<InstrumentModel>(), Ok(InstrumentModel::Trimble5500));
        assert!("axis10".parse::<InstrumentModel>().is_err());
    }

    #[test]
    fn test_pdeg4() {
        assert_eq!(pdeg4(Angle::from_deg(90.5)), "90.3000");
        assert_eq!(pdeg4(Angle::from_gon(100.0)), "90.0000");
    }
}

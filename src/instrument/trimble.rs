//! Trimble 5500 register protocol.
//!
//! "Set" is `WG,<code>=<value>`, "get" is `RG,<code>`; one logical operation
//! may batch several of them with `|`. Replies are `<code>=<value>` lines,
//! terminated by the `>` prompt.

use super::capabilities::TRIMBLE_5500;
use super::{pdeg4, AtmCorrection, Capability, Command, MeasureUnit, Operation, Request};
use crate::angle::Angle;
use crate::error::ProtocolError;
use crate::measurement::{AtmosphericCorrection, Measurement, RefractionCorrection};

/// Register codes.
mod code {
    pub const IH: u32 = 3;
    pub const HA: u32 = 7;
    pub const VA: u32 = 8;
    pub const SD: u32 = 9;
    pub const PC: u32 = 20;
    pub const HAREF: u32 = 21;
    pub const SVA: u32 = 26;
    pub const SHA: u32 = 27;
    pub const PPM: u32 = 30;
    pub const NORTHING: u32 = 37;
    pub const EASTING: u32 = 38;
    pub const ELE: u32 = 39;
    pub const TEMP: u32 = 56;
    pub const EARAD: u32 = 58;
    pub const REFRAC: u32 = 59;
    pub const WETTEMP: u32 = 66;
    pub const PRESS: u32 = 74;

    /// Registers the decoder converts; others (point number, codes) are text.
    pub const DECODED: &[u32] = &[
        IH, HA, VA, SD, PC, PPM, NORTHING, EASTING, ELE, TEMP, EARAD, REFRAC, WETTEMP, PRESS,
    ];
}

const EDM_MODES: &[(&str, i32)] = &[
    ("STANDARD", 0),
    ("TRACKING", 1),
    ("D-BAR", 2),
    ("FAST", 3),
    ("HRD_BAR", 4),
];

pub struct Trimble5500 {
    name: String,
    /// Last EDM mode set; the instrument has no register to read it back.
    edm_mode: i32,
}

impl Trimble5500 {
    pub fn new() -> Self {
        Self {
            name: "Trimble 5500".to_string(),
            edm_mode: 0,
        }
    }
}

impl Default for Trimble5500 {
    fn default() -> Self {
        Self::new()
    }
}

fn wire(text: String) -> Result<Request, ProtocolError> {
    Ok(Request::Wire(Command::new(text)))
}

impl MeasureUnit for Trimble5500 {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> &'static [Capability] {
        TRIMBLE_5500
    }

    fn end_of_message(&self) -> u8 {
        b'>'
    }

    fn edm_mode(&self, name: &str) -> Option<i32> {
        EDM_MODES
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, code)| *code)
    }

    fn encode(&mut self, op: &Operation) -> Result<Request, ProtocolError> {
        use code::*;
        use Operation as Op;
        match op {
            Op::SetPc(pc) => wire(format!("WG,{PC}={:.3}", pc / 1000.0)),
            Op::GetPc => wire(format!("RG,{PC}")),
            Op::SetAtmCorr(AtmCorrection::Ppm(ppm)) => wire(format!("WG,{PPM}={ppm}")),
            Op::SetAtmCorr(AtmCorrection::Meteo {
                pressure,
                dry_temp,
                wet_temp,
                ..
            }) => wire(format!(
                "WG,{PRESS}={pressure}|WG,{TEMP}={dry_temp}|WG,{WETTEMP}={wet_temp}"
            )),
            Op::GetAtmCorr => wire(format!("RG,{PPM}")),
            Op::SetRefCorr {
                earth_radius,
                scale,
                ..
            } => wire(format!("WG,{EARAD}={earth_radius}|WG,{REFRAC}={scale:.2}")),
            Op::GetRefCorr => wire(format!("RG,{EARAD}|RG,{REFRAC}")),
            Op::SetStation {
                east,
                north,
                elev,
                ih,
            } => {
                let mut msg = format!("WG,{EASTING}={east:.3}|WG,{NORTHING}={north:.3}");
                if let Some(z) = elev {
                    msg.push_str(&format!("|WG,{ELE}={z:.3}"));
                }
                msg.push_str(&format!("|WG,{IH}={ih:.3}"));
                wire(msg)
            }
            Op::GetStation => wire(format!("RG,{EASTING}|RG,{NORTHING}|RG,{ELE}|RG,{IH}")),
            Op::SetEdmMode(mode) => {
                self.edm_mode = *mode;
                wire(format!("PG,3{mode}"))
            }
            Op::GetEdmMode => Ok(Request::Local(Measurement {
                edm_mode: Some(self.edm_mode),
                ..Default::default()
            })),
            Op::SetOrientation(ori) => wire(format!("WG,{HAREF}={}", pdeg4(*ori))),
            Op::Move { hz, v, .. } => wire(format!(
                "WG,{SVA}={}|WG,{SHA}={}|WS=PH02V02",
                pdeg4(*v),
                pdeg4(*hz)
            )),
            Op::Measure { .. } => wire("TG".into()),
            Op::GetMeasure { .. } => wire("RG".into()),
            Op::MeasureDistAng { .. } => wire("TG|RG".into()),
            Op::Coords { .. } => wire(format!("RG,{NORTHING}|RG,{EASTING}|RG,{ELE}")),
            Op::GetAngles => wire(format!("RG,{HA}|RG,{VA}")),
            Op::ChangeFace => Ok(Request::Derived),
            _ => Err(self.unsupported(op)),
        }
    }

    fn decode(&self, _command: &Command, reply: &str) -> Result<Measurement, ProtocolError> {
        let mut m = Measurement::default();
        let lines = reply.split(Command::SEPARATOR).flat_map(|ans| ans.split('\n'));
        for line in lines {
            let line = line.trim_matches(|c: char| c == '\r' || c == '|' || c == '>' || c.is_whitespace());
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let register: u32 = key
                .trim()
                .parse()
                .map_err(|_| ProtocolError::malformed(reply, format!("bad register '{key}'")))?;
            if !code::DECODED.contains(&register) {
                continue;
            }
            let number: f64 = value
                .trim()
                .parse()
                .map_err(|_| ProtocolError::malformed(reply, format!("bad value '{value}'")))?;
            match register {
                code::HA => m.hz = Some(Angle::from_pdeg(number)),
                code::VA => m.v = Some(Angle::from_pdeg(number)),
                code::SD => m.distance = Some(number),
                code::EASTING => m.east = Some(number),
                code::NORTHING => m.north = Some(number),
                code::ELE => m.elev = Some(number),
                code::IH => m.instrument_height = Some(number),
                code::PC => m.pc = Some(number * 1000.0),
                code::PPM => m.ppm = Some(number),
                code::PRESS | code::TEMP | code::WETTEMP => {
                    let atm = m.atmospheric.get_or_insert(AtmosphericCorrection {
                        lambda: None,
                        pressure: None,
                        dry_temp: None,
                        wet_temp: None,
                    });
                    match register {
                        code::PRESS => atm.pressure = Some(number),
                        code::TEMP => atm.dry_temp = Some(number),
                        _ => atm.wet_temp = Some(number),
                    }
                }
                code::EARAD | code::REFRAC => {
                    let refr = m.refraction.get_or_insert(RefractionCorrection {
                        enabled: None,
                        earth_radius: None,
                        scale: None,
                    });
                    if register == code::EARAD {
                        refr.earth_radius = Some(number);
                    } else {
                        refr.scale = Some(number);
                    }
                }
                _ => {}
            }
        }
        Ok(m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(unit: &mut Trimble5500, op: Operation) -> String {
        match unit.encode(&op).unwrap() {
            Request::Wire(cmd) => cmd.to_string(),
            other => panic!("expected a wire command, got {other:?}"),
        }
    }

    #[test]
    fn test_encode_batches() {
        let mut t = Trimble5500::new();
        assert_eq!(text(&mut t, Operation::GetAngles), "RG,7|RG,8");
        assert_eq!(
            text(&mut t, Operation::Coords { wait_ms: 1000, incl: 0 }),
            "RG,37|RG,38|RG,39"
        );
        assert_eq!(text(&mut t, Operation::SetPc(30.0)), "WG,20=0.030");
        assert_eq!(
            text(
                &mut t,
                Operation::Move {
                    hz: Angle::from_deg(90.5),
                    v: Angle::from_deg(85.0),
                    atr: false
                }
            ),
            "WG,26=85.0000|WG,27=90.3000|WS=PH02V02"
        );
        assert_eq!(
            text(
                &mut t,
                Operation::SetStation {
                    east: 1.0,
                    north: 2.0,
                    elev: None,
                    ih: 1.5
                }
            ),
            "WG,38=1.000|WG,37=2.000|WG,3=1.500"
        );
    }

    #[test]
    fn test_edm_mode_is_local_state() {
        let mut t = Trimble5500::new();
        let mode = t.edm_mode("fast").unwrap();
        assert_eq!(text(&mut t, Operation::SetEdmMode(mode)), "PG,33");
        match t.encode(&Operation::GetEdmMode).unwrap() {
            Request::Local(m) => assert_eq!(m.edm_mode, Some(3)),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_change_face_is_derived() {
        let mut t = Trimble5500::new();
        assert_eq!(t.encode(&Operation::ChangeFace).unwrap(), Request::Derived);
        assert!(t.encode(&Operation::ClearDistance).is_err());
        assert_eq!(t.end_of_message(), b'>');
    }

    #[test]
    fn test_decode_register_lines() {
        let t = Trimble5500::new();
        let cmd = Command::new("RG,7|RG,8");
        let m = t.decode(&cmd, "7=90.3000\r\n|8=85.0000\r\n").unwrap();
        assert!((m.hz.unwrap().deg() - 90.5).abs() < 1e-9);
        assert!((m.v.unwrap().deg() - 85.0).abs() < 1e-9);

        let m = t.decode(&Command::new("TG|RG"), "|7=10.0000\n8=90.0000\n9=25.125>").unwrap();
        assert_eq!(m.distance, Some(25.125));

        let m = t.decode(&Command::new("RG,58|RG,59"), "58=6370000|59=0.14").unwrap();
        assert_eq!(m.refraction.unwrap().scale, Some(0.14));
    }

    #[test]
    fn test_decode_empty_and_bad() {
        let t = Trimble5500::new();
        assert!(t.decode(&Command::new("RG"), "|").unwrap().is_empty());
        assert!(t.decode(&Command::new("RG,7"), "7=abc").is_err());
    }

    #[test]
    fn test_decode_skips_text_registers() {
        let t = Trimble5500::new();
        let m = t
            .decode(
                &Command::new("RG"),
                "4=ABC\n5=P12\n7=10.0000\n8=90.0000\n9=25.125",
            )
            .unwrap();
        assert_eq!(m.distance, Some(25.125));
        assert!((m.hz.unwrap().deg() - 10.0).abs() < 1e-9);
        assert!((m.v.unwrap().deg() - 90.0).abs() < 1e-9);
    }
}

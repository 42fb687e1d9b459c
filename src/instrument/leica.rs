//! Leica GeoCOM ASCII protocol.
//!
//! Requests are `%R1Q,<code>:<arg>,<arg>,...`, replies
//! `%R1P,<com rc>,<tr id>:<rc>,<value>,...`. Angle arguments go out as
//! pseudo degrees with four decimals; angles in replies are radians.

use super::capabilities::{LEICA_TCRA1100, LEICA_TPS1200};
use super::{pdeg4, AtmCorrection, Capability, Command, MeasureUnit, Operation, Request};
use crate::angle::Angle;
use crate::error::ProtocolError;
use crate::measurement::{AtmosphericCorrection, Measurement, RefractionCorrection};
use tracing::error;

/// EDM modes shared by the supported GeoCOM models.
/// RT = reflector tape, RL = reflectorless, LR = long range.
const EDM_MODES: &[(&str, i32)] = &[
    ("RTSTANDARD", 1),
    ("STANDARD", 2),
    ("FAST", 3),
    ("LRSTANDARD", 4),
    ("RLSTANDARD", 5),
    ("TRACK", 6),
    ("RLTRACK", 8),
    ("TRACK2", 9),
    ("AVERAGING", 10),
    ("RLAVERAGING", 11),
    ("LRAVERAGING", 12),
];

/// GeoCOM requests this crate issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rpc {
    SwitchOn,
    SwitchOff,
    SetPc,
    GetPc,
    InstrNo,
    InstrName,
    IntTemp,
    SetAtr,
    GetAtr,
    SetLock,
    GetLock,
    LockIn,
    SetAtmCorr,
    GetAtmCorr,
    SetRefCorr,
    GetRefCorr,
    GetStn,
    SetStn,
    SetEdmMode,
    GetEdmMode,
    SetOri,
    Move,
    FineAdj,
    Measure,
    GetMeasure,
    MeasureAngDist,
    Coords,
    GetAngles,
    ChangeFace,
    SetSearchArea,
    PowerSearch,
    SetRedLaser,
    GetPt,
    SetPt,
    GetSpiral,
    SetSpiral,
    SearchTarget,
}

/// Supported GeoCOM instrument generations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeicaModel {
    Tps1200,
    Tcra1100,
}

impl LeicaModel {
    fn code(self, rpc: Rpc) -> Option<u32> {
        use Rpc::*;
        let code = match (self, rpc) {
            (_, SwitchOn) => 111,
            (_, SwitchOff) => 112,
            (_, SetPc) => 2024,
            (_, GetPc) => 2023,
            (_, InstrNo) => 5003,
            (_, InstrName) => 5004,
            (_, IntTemp) => 5011,
            (_, SetAtr) => 18005,
            (_, GetAtr) => 18006,
            (_, SetLock) => 18007,
            (_, GetLock) => 18008,
            (_, LockIn) => 9013,
            (_, SetAtmCorr) => 2028,
            (_, GetAtmCorr) => 2029,
            (_, SetRefCorr) => 2030,
            (_, GetRefCorr) => 2031,
            (_, GetStn) => 2009,
            (_, SetStn) => 2010,
            (_, SetEdmMode) => 2020,
            (_, GetEdmMode) => 2021,
            (_, SetOri) => 2113,
            (_, Move) => 9027,
            (LeicaModel::Tps1200, FineAdj) => 9037,
            (LeicaModel::Tcra1100, FineAdj) => return None,
            (_, Measure) => 2008,
            (_, GetMeasure) => 2108,
            (_, MeasureAngDist) => 17017,
            (_, Coords) => 2082,
            (_, GetAngles) => 2003,
            (_, ChangeFace) => 9028,
            (LeicaModel::Tps1200, SetSearchArea) => 9043,
            (LeicaModel::Tps1200, PowerSearch) => 9051,
            (LeicaModel::Tcra1100, SetSearchArea | PowerSearch) => return None,
            (_, SetRedLaser) => 1004,
            (_, GetPt) => 17009,
            (_, SetPt) => 17008,
            (_, GetSpiral) => 9040,
            (_, SetSpiral) => 9041,
            (_, SearchTarget) => 17020,
        };
        Some(code)
    }

    fn rpc(self, code: u32) -> Option<Rpc> {
        use Rpc::*;
        [
            GetPc, InstrNo, InstrName, IntTemp, GetAtr, GetLock, GetAtmCorr, GetRefCorr, GetStn,
            GetEdmMode, GetMeasure, MeasureAngDist, Coords, GetAngles, GetPt, GetSpiral,
        ]
        .into_iter()
        .find(|rpc| self.code(*rpc) == Some(code))
    }
}

/// GeoCOM measure unit.
pub struct LeicaUnit {
    model: LeicaModel,
    name: String,
}

impl LeicaUnit {
    pub fn new(model: LeicaModel) -> Self {
        let name = match model {
            LeicaModel::Tps1200 => "Leica TPS1200",
            LeicaModel::Tcra1100 => "Leica TCRA1100",
        };
        Self {
            model,
            name: name.to_string(),
        }
    }

    pub fn model(&self) -> LeicaModel {
        self.model
    }

    fn request(&self, op: &Operation, rpc: Rpc, args: &[String]) -> Result<Request, ProtocolError> {
        let code = self.model.code(rpc).ok_or_else(|| self.unsupported(op))?;
        Ok(Request::Wire(Command::new(format!(
            "%R1Q,{}:{}",
            code,
            args.join(",")
        ))))
    }
}

fn flag(on: bool) -> String {
    u8::from(on).to_string()
}

/// Request code of a GeoCOM command line.
fn request_code(command: &Command) -> Option<u32> {
    let first = command.parts().first()?;
    let rest = first.trim().strip_prefix("%R1Q,")?;
    rest.split(':').next()?.trim().parse().ok()
}

impl MeasureUnit for LeicaUnit {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> &'static [Capability] {
        match self.model {
            LeicaModel::Tps1200 => LEICA_TPS1200,
            LeicaModel::Tcra1100 => LEICA_TCRA1100,
        }
    }

    fn edm_mode(&self, name: &str) -> Option<i32> {
        EDM_MODES
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, code)| *code)
    }

    fn encode(&mut self, op: &Operation) -> Result<Request, ProtocolError> {
        use Operation as Op;
        match op {
            Op::SwitchOn { remote } => self.request(op, Rpc::SwitchOn, &[flag(*remote)]),
            Op::SwitchOff => self.request(op, Rpc::SwitchOff, &["0".into()]),
            Op::SetPc(pc) => self.request(op, Rpc::SetPc, &[format!("{}", pc / 1000.0)]),
            Op::GetPc => self.request(op, Rpc::GetPc, &[]),
            Op::SetAtr(on) => self.request(op, Rpc::SetAtr, &[flag(*on)]),
            Op::GetAtr => self.request(op, Rpc::GetAtr, &[]),
            Op::SetLock(on) => self.request(op, Rpc::SetLock, &[flag(*on)]),
            Op::GetLock => self.request(op, Rpc::GetLock, &[]),
            Op::LockIn => self.request(op, Rpc::LockIn, &[]),
            Op::SetAtmCorr(AtmCorrection::Meteo {
                lambda,
                pressure,
                dry_temp,
                wet_temp,
            }) => self.request(
                op,
                Rpc::SetAtmCorr,
                &[
                    lambda.to_string(),
                    pressure.to_string(),
                    dry_temp.to_string(),
                    wet_temp.to_string(),
                ],
            ),
            Op::SetAtmCorr(AtmCorrection::Ppm(_)) => Err(self.unsupported(op)),
            Op::GetAtmCorr => self.request(op, Rpc::GetAtmCorr, &[]),
            Op::SetRefCorr {
                enabled,
                earth_radius,
                scale,
            } => self.request(
                op,
                Rpc::SetRefCorr,
                &[flag(*enabled), earth_radius.to_string(), scale.to_string()],
            ),
            Op::GetRefCorr => self.request(op, Rpc::GetRefCorr, &[]),
            Op::SetStation {
                east,
                north,
                elev,
                ih,
            } => self.request(
                op,
                Rpc::SetStn,
                &[
                    format!("{east:.3}"),
                    format!("{north:.3}"),
                    format!("{:.3}", elev.unwrap_or(0.0)),
                    format!("{ih:.3}"),
                ],
            ),
            Op::GetStation => self.request(op, Rpc::GetStn, &[]),
            Op::SetEdmMode(mode) => self.request(op, Rpc::SetEdmMode, &[mode.to_string()]),
            Op::GetEdmMode => self.request(op, Rpc::GetEdmMode, &[]),
            Op::SetOrientation(ori) => self.request(op, Rpc::SetOri, &[pdeg4(*ori)]),
            Op::Move { hz, v, atr } => self.request(
                op,
                Rpc::Move,
                &[pdeg4(*hz), pdeg4(*v), "0".into(), flag(*atr), "0".into()],
            ),
            Op::FineAdjust { hz_range, v_range } => {
                self.request(op, Rpc::FineAdj, &[pdeg4(*hz_range), pdeg4(*v_range)])
            }
            Op::Measure { program, incl } => self.request(
                op,
                Rpc::Measure,
                &[program.code().to_string(), incl.to_string()],
            ),
            Op::GetMeasure { wait_ms, incl } => self.request(
                op,
                Rpc::GetMeasure,
                &[wait_ms.to_string(), incl.to_string()],
            ),
            Op::MeasureDistAng { program } => {
                self.request(op, Rpc::MeasureAngDist, &[program.code().to_string()])
            }
            Op::Coords { wait_ms, incl } => {
                self.request(op, Rpc::Coords, &[wait_ms.to_string(), incl.to_string()])
            }
            Op::GetAngles => self.request(op, Rpc::GetAngles, &["0".into()]),
            Op::ClearDistance => self.request(
                op,
                Rpc::Measure,
                &[super::EdmProgram::Clear.code().to_string(), "0".into()],
            ),
            Op::ChangeFace => {
                self.request(op, Rpc::ChangeFace, &["0".into(), "0".into(), "0".into()])
            }
            Op::SetRedLaser(on) => self.request(op, Rpc::SetRedLaser, &[flag(*on)]),
            Op::SetSearchArea {
                hz_center,
                v_center,
                hz_range,
                v_range,
                enabled,
            } => self.request(
                op,
                Rpc::SetSearchArea,
                &[
                    pdeg4(*hz_center),
                    pdeg4(*v_center),
                    pdeg4(*hz_range),
                    pdeg4(*v_range),
                    flag(*enabled),
                ],
            ),
            Op::PowerSearch { clockwise } => {
                let direction = if *clockwise { "1" } else { "-1" };
                self.request(op, Rpc::PowerSearch, &[direction.into(), "0".into()])
            }
            Op::GetSpiral => self.request(op, Rpc::GetSpiral, &[]),
            Op::SetSpiral { hz_range, v_range } => {
                self.request(op, Rpc::SetSpiral, &[pdeg4(*hz_range), pdeg4(*v_range)])
            }
            Op::SearchTarget => self.request(op, Rpc::SearchTarget, &["0".into()]),
            Op::GetInstrumentNo => self.request(op, Rpc::InstrNo, &[]),
            Op::GetInstrumentName => self.request(op, Rpc::InstrName, &[]),
            Op::GetInternalTemperature => self.request(op, Rpc::IntTemp, &[]),
            Op::SetPrismType(pt) => self.request(op, Rpc::SetPt, &[pt.to_string()]),
            Op::GetPrismType => self.request(op, Rpc::GetPt, &[]),
            Op::GnssPosition => Err(self.unsupported(op)),
        }
    }

    fn decode(&self, command: &Command, reply: &str) -> Result<Measurement, ProtocolError> {
        let reply = reply.trim();
        if !reply.starts_with("%R1P") {
            return Err(ProtocolError::malformed(reply, "not a GeoCOM reply"));
        }
        let tokens: Vec<&str> = reply.split([':', ',']).map(str::trim).collect();
        let rc: i32 = tokens
            .get(3)
            .and_then(|t| t.parse().ok())
            .ok_or_else(|| ProtocolError::malformed(reply, "missing return code"))?;
        if rc != 0 {
            error!("{} returned error code {} for '{}'", self.name, rc, command);
            return Ok(Measurement::with_error_code(rc));
        }

        let values = Values { reply, tokens: &tokens[4..] };
        let mut m = Measurement::default();
        let Some(rpc) = request_code(command).and_then(|code| self.model.rpc(code)) else {
            return Ok(m);
        };
        match rpc {
            Rpc::GetMeasure | Rpc::MeasureAngDist => {
                m.hz = Some(values.angle(0)?);
                m.v = Some(values.angle(1)?);
                m.distance = Some(values.float(2)?);
            }
            Rpc::Coords => {
                m.east = Some(values.float(0)?);
                m.north = Some(values.float(1)?);
                m.elev = Some(values.float(2)?);
            }
            Rpc::GetAngles => {
                m.hz = Some(values.angle(0)?);
                m.v = Some(values.angle(1)?);
            }
            Rpc::GetStn => {
                m.east = Some(values.float(0)?);
                m.north = Some(values.float(1)?);
                m.elev = Some(values.float(2)?);
                m.instrument_height = Some(values.float(3)?);
            }
            Rpc::GetAtmCorr => {
                m.atmospheric = Some(AtmosphericCorrection {
                    lambda: Some(values.float(0)?),
                    pressure: Some(values.float(1)?),
                    dry_temp: Some(values.float(2)?),
                    wet_temp: Some(values.float(3)?),
                });
            }
            Rpc::GetRefCorr => {
                m.refraction = Some(RefractionCorrection {
                    enabled: Some(values.int(0)? != 0),
                    earth_radius: Some(values.float(1)?),
                    scale: Some(values.float(2)?),
                });
            }
            Rpc::GetPc => m.pc = Some(values.float(0)? * 1000.0),
            Rpc::InstrNo => {
                m.instrument_no = Some(values.float(0)? as u64);
            }
            Rpc::InstrName => m.instrument_name = Some(values.text(0)?),
            Rpc::IntTemp => m.internal_temp = Some(values.float(0)?),
            Rpc::GetAtr => m.atr = Some(values.int(0)? != 0),
            Rpc::GetLock => m.lock = Some(values.int(0)? != 0),
            Rpc::GetEdmMode => m.edm_mode = Some(values.int(0)?),
            Rpc::GetPt => m.prism_type = Some(values.int(0)?),
            Rpc::GetSpiral => {
                m.spiral_hz = Some(values.angle(0)?);
                m.spiral_v = Some(values.angle(1)?);
            }
            _ => {}
        }
        Ok(m)
    }
}

/// Value tokens after the return code.
struct Values<'a> {
    reply: &'a str,
    tokens: &'a [&'a str],
}

impl Values<'_> {
    fn token(&self, index: usize) -> Result<&str, ProtocolError> {
        self.tokens
            .get(index)
            .copied()
            .ok_or_else(|| ProtocolError::malformed(self.reply, format!("missing value {index}")))
    }

    fn float(&self, index: usize) -> Result<f64, ProtocolError> {
        let token = self.token(index)?;
        token
            .parse()
            .map_err(|_| ProtocolError::malformed(self.reply, format!("'{token}' is not a number")))
    }

    fn int(&self, index: usize) -> Result<i32, ProtocolError> {
        let token = self.token(index)?;
        token
            .parse()
            .map_err(|_| ProtocolError::malformed(self.reply, format!("'{token}' is not an integer")))
    }

    fn angle(&self, index: usize) -> Result<Angle, ProtocolError> {
        self.float(index).map(Angle::from_rad)
    }

    fn text(&self, index: usize) -> Result<String, ProtocolError> {
        Ok(self.token(index)?.trim_matches('"').to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instrument::EdmProgram;

    fn wire(unit: &mut LeicaUnit, op: Operation) -> String {
        match unit.encode(&op).unwrap() {
            Request::Wire(cmd) => cmd.to_string(),
            other => panic!("expected a wire command, got {other:?}"),
        }
    }

    #[test]
    fn test_encode_basic_requests() {
        let mut tps = LeicaUnit::new(LeicaModel::Tps1200);
        assert_eq!(wire(&mut tps, Operation::GetAngles), "%R1Q,2003:0");
        assert_eq!(wire(&mut tps, Operation::GetPc), "%R1Q,2023:");
        assert_eq!(wire(&mut tps, Operation::SetPc(-17.5)), "%R1Q,2024:-0.0175");
        assert_eq!(
            wire(
                &mut tps,
                Operation::Measure {
                    program: EdmProgram::Default,
                    incl: 0
                }
            ),
            "%R1Q,2008:1,0"
        );
        assert_eq!(wire(&mut tps, Operation::ClearDistance), "%R1Q,2008:3,0");
        assert_eq!(wire(&mut tps, Operation::ChangeFace), "%R1Q,9028:0,0,0");
        assert_eq!(
            wire(&mut tps, Operation::PowerSearch { clockwise: false }),
            "%R1Q,9051:-1,0"
        );
    }

    #[test]
    fn test_move_uses_pseudo_degrees() {
        let mut tps = LeicaUnit::new(LeicaModel::Tps1200);
        let op = Operation::Move {
            hz: Angle::from_deg(90.5),
            v: Angle::from_gon(100.0),
            atr: true,
        };
        assert_eq!(wire(&mut tps, op), "%R1Q,9027:90.3000,90.0000,0,1,0");
    }

    #[test]
    fn test_tcra1100_table_differs() {
        let mut tcra = LeicaUnit::new(LeicaModel::Tcra1100);
        assert!(!tcra.has(Capability::PowerSearch));
        let err = tcra
            .encode(&Operation::FineAdjust {
                hz_range: Angle::from_deg(1.0),
                v_range: Angle::from_deg(1.0),
            })
            .unwrap_err();
        assert!(matches!(err, ProtocolError::UnsupportedOperation { .. }));
        assert_eq!(tcra.edm_mode("rlstandard"), Some(5));
        assert_eq!(tcra.edm_mode("D-BAR"), None);
    }

    #[test]
    fn test_decode_angles_and_measure() {
        let tps = LeicaUnit::new(LeicaModel::Tps1200);
        let m = tps
            .decode(&Command::new("%R1Q,2003:0"), "%R1P,0,0:0,1.5707963268,1.3962634016")
            .unwrap();
        assert!((m.hz.unwrap().deg() - 90.0).abs() < 1e-6);
        assert!((m.v.unwrap().deg() - 80.0).abs() < 1e-6);
        assert!(m.distance.is_none());

        let m = tps
            .decode(&Command::new("%R1Q,2108:15000,0"), "%R1P,0,0:0,0.5,1.5,12.345")
            .unwrap();
        assert_eq!(m.distance, Some(12.345));
        assert_eq!(m.hz, Some(Angle::from_rad(0.5)));
    }

    #[test]
    fn test_decode_scalars() {
        let tps = LeicaUnit::new(LeicaModel::Tps1200);
        let pc = tps.decode(&Command::new("%R1Q,2023:"), "%R1P,0,0:0,-0.0344").unwrap();
        assert!((pc.pc.unwrap() + 34.4).abs() < 1e-9);

        let name = tps
            .decode(&Command::new("%R1Q,5004:"), "%R1P,0,0:0,\"TCRP1201\"")
            .unwrap();
        assert_eq!(name.instrument_name.as_deref(), Some("TCRP1201"));

        let stn = tps
            .decode(&Command::new("%R1Q,2009:"), "%R1P,0,0:0,100.0,200.0,50.5,1.6")
            .unwrap();
        assert_eq!(stn.instrument_height, Some(1.6));

        let refr = tps
            .decode(&Command::new("%R1Q,2031:"), "%R1P,0,0:0,1,6378000,0.13")
            .unwrap()
            .refraction
            .unwrap();
        assert_eq!(refr.enabled, Some(true));
        assert_eq!(refr.scale, Some(0.13));
    }

    #[test]
    fn test_nonzero_return_code_is_carried() {
        let tps = LeicaUnit::new(LeicaModel::Tps1200);
        let m = tps
            .decode(&Command::new("%R1Q,2108:15000,0"), "%R1P,0,0:1284")
            .unwrap();
        assert_eq!(m.error_code, Some(1284));
        assert!(m.distance.is_none());
    }

    #[test]
    fn test_malformed_replies() {
        let tps = LeicaUnit::new(LeicaModel::Tps1200);
        let cmd = Command::new("%R1Q,2003:0");
        assert!(tps.decode(&cmd, "garbage").is_err());
        assert!(tps.decode(&cmd, "%R1P,0,0:0,1.0").is_err());
        assert!(tps.decode(&cmd, "%R1P,0,0:0,abc,1.0").is_err());
    }
}

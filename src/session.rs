//! Instrument session.
//!
//! [`TotalStation`] owns one measure unit, one transport and an optional
//! writer for the whole run. Every public operation goes through the same
//! path: capability check, encode, exchange, decode. On top of that the
//! session polls for results that are not ready on the first read and
//! synthesizes operations a unit has no native command for.
//!
//! A transport failure ends the current operation with an error and leaves the
//! transport in a non-OK state. The session does not recover on its own; call
//! [`TotalStation::reset_state`] before issuing more operations.

use crate::adapters::{Transport, TransportState};
use crate::angle::Angle;
use crate::error::{ProtocolError, SurveyError, SurveyResult, TransportError};
use crate::error_recovery::{Polled, RetryPolicy};
use crate::instrument::{
    AtmCorrection, Capability, Command, EdmProgram, MeasureUnit, Operation, Request,
};
use crate::measurement::{Face, Measurement, Record};
use crate::writer::Writer;
use std::f64::consts::PI;
use tracing::{debug, error, info, warn};

/// Sentences read while waiting for a listened tag before giving up.
pub const LISTEN_LIMIT: u32 = 32;

/// Default wait passed to `GetMeasure` / `Coords`, in ms.
pub const DEFAULT_WAIT_MS: u32 = 15000;

/// Target of a synthesized face change: `(hz + 180°, 360° − v)`.
pub fn change_face_target(hz: Angle, v: Angle) -> (Angle, Angle) {
    (hz + Angle::from_rad(PI), Angle::from_rad(2.0 * PI) - v)
}

/// A surveying instrument driven over one transport.
pub struct TotalStation {
    name: String,
    unit: Box<dyn MeasureUnit>,
    transport: Box<dyn Transport>,
    writer: Option<Box<dyn Writer>>,
    poll: RetryPolicy,
}

impl TotalStation {
    /// Session over `transport` speaking `unit`'s protocol.
    pub fn new(
        name: impl Into<String>,
        unit: Box<dyn MeasureUnit>,
        transport: Box<dyn Transport>,
    ) -> Self {
        Self {
            name: name.into(),
            unit,
            transport,
            writer: None,
            poll: RetryPolicy::default(),
        }
    }

    /// Writer receiving every recorded point.
    pub fn with_writer(mut self, writer: Box<dyn Writer>) -> Self {
        self.writer = Some(writer);
        self
    }

    /// Policy for [`TotalStation::get_measure`] and other polled reads.
    pub fn with_poll_policy(mut self, policy: RetryPolicy) -> Self {
        self.poll = policy;
        self
    }

    /// Session name used in log lines.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The measure unit driven by this session.
    pub fn unit(&self) -> &dyn MeasureUnit {
        self.unit.as_ref()
    }

    /// Whether the unit has `capability`.
    pub fn has(&self, capability: Capability) -> bool {
        self.unit.has(capability)
    }

    /// Current transport state.
    pub fn state(&self) -> TransportState {
        self.transport.state()
    }

    /// Clear a soft transport error so the session can be used again.
    pub fn reset_state(&mut self) {
        if !self.transport.state().is_ok() {
            info!("{}: resetting transport state {:?}", self.name, self.transport.state());
        }
        self.transport.reset_state();
    }

    /// Open the transport. Failure here is fatal for a run.
    pub async fn open(&mut self) -> SurveyResult<()> {
        let state = self.transport.open().await;
        info!(
            "{}: {} on '{}' opened with state {:?}",
            self.name,
            self.unit.name(),
            self.transport.name(),
            state
        );
        match state {
            TransportState::Ok => Ok(()),
            TransportState::FileError => Err(TransportError::FileNotFound(
                self.transport.name().to_string(),
            )
            .into()),
            _ => Err(TransportError::SourceUnavailable(self.transport.name().to_string()).into()),
        }
    }

    /// Flush the writer and release the transport.
    pub async fn close(&mut self) {
        if let Some(writer) = self.writer.as_mut() {
            writer.finish().await;
        }
        self.transport.close().await;
        info!("{}: closed", self.name);
    }

    /// Hand a record to the writer, if one is attached.
    pub async fn write_record(&mut self, record: &Record) {
        if let Some(writer) = self.writer.as_mut() {
            writer.write_record(record).await;
        }
    }

    /// Record a measurement with a timestamp.
    pub async fn record(&mut self, measurement: &Measurement) {
        self.write_record(&Record::from(measurement)).await;
    }

    /// Run one operation, synthesizing it when the unit has no command.
    pub async fn dispatch(&mut self, op: Operation) -> SurveyResult<Measurement> {
        match self.prepare(&op)? {
            Request::Wire(command) => self.exchange(&command).await,
            Request::Local(m) => Ok(m),
            Request::Derived => match op {
                Operation::ChangeFace => self.derived_change_face().await,
                other => Err(self.unit.unsupported(&other).into()),
            },
        }
    }

    /// Run one operation that must not be synthesized.
    async fn run(&mut self, op: Operation) -> SurveyResult<Measurement> {
        match self.prepare(&op)? {
            Request::Wire(command) => self.exchange(&command).await,
            Request::Local(m) => Ok(m),
            Request::Derived => Err(self.unit.unsupported(&op).into()),
        }
    }

    fn prepare(&mut self, op: &Operation) -> SurveyResult<Request> {
        let state = self.transport.state();
        if !state.is_ok() {
            return Err(TransportError::NotReady(state).into());
        }
        self.unit.check(op)?;
        Ok(self.unit.encode(op)?)
    }

    /// Send every part of `command`, one reply each, and decode the joined
    /// replies. Listen commands read sentences instead.
    async fn exchange(&mut self, command: &Command) -> SurveyResult<Measurement> {
        if let Some(tag) = command.listen_tag() {
            return self.listen(command, tag).await;
        }
        let mut replies = Vec::with_capacity(command.parts().len());
        for part in command.parts() {
            self.transport.send(part).await?;
            let reply = self.transport.receive().await?;
            debug!("{}: {} -> {}", self.name, part, reply);
            replies.push(reply);
        }
        let joined = replies.join("|");
        Ok(self.unit.decode(command, &joined)?)
    }

    async fn listen(&mut self, command: &Command, tag: &str) -> SurveyResult<Measurement> {
        for _ in 0..LISTEN_LIMIT {
            let line = self.transport.receive().await?;
            match self.unit.decode(command, &line) {
                Err(ProtocolError::TagMismatch { received, .. }) => {
                    debug!("{}: skipping '{}' while waiting for {}", self.name, received, tag);
                }
                other => return Ok(other?),
            }
        }
        Err(ProtocolError::TagMismatch {
            expected: tag.to_string(),
            received: format!("{LISTEN_LIMIT} other sentences"),
        }
        .into())
    }

    /// Repeat `op` until `ready` holds or the poll ceiling is reached.
    ///
    /// Hitting the ceiling is not an error: the last measurement is returned
    /// with `satisfied == false`.
    pub async fn poll_until<F>(
        &mut self,
        op: Operation,
        ready: F,
    ) -> SurveyResult<Polled<Measurement>>
    where
        F: Fn(&Measurement) -> bool + Send,
    {
        let policy = self.poll;
        let mut attempts = 0;
        loop {
            let value = self.run(op.clone()).await?;
            attempts += 1;
            if ready(&value) {
                return Ok(Polled {
                    value,
                    attempts,
                    satisfied: true,
                });
            }
            if !policy.allows(attempts) {
                warn!(
                    "{}: '{}' not ready after {} attempts",
                    self.name, op, attempts
                );
                return Ok(Polled {
                    value,
                    attempts,
                    satisfied: false,
                });
            }
            policy.pause().await;
        }
    }

    /// Power the instrument on, optionally in remote mode.
    pub async fn switch_on(&mut self, remote: bool) -> SurveyResult<Measurement> {
        self.dispatch(Operation::SwitchOn { remote }).await
    }

    /// Power the instrument off.
    pub async fn switch_off(&mut self) -> SurveyResult<Measurement> {
        self.dispatch(Operation::SwitchOff).await
    }

    /// Set the prism constant [mm].
    pub async fn set_pc(&mut self, pc: f64) -> SurveyResult<Measurement> {
        self.dispatch(Operation::SetPc(pc)).await
    }

    /// Read the prism constant [mm].
    pub async fn get_pc(&mut self) -> SurveyResult<Measurement> {
        self.dispatch(Operation::GetPc).await
    }

    /// Switch automatic target recognition on or off.
    pub async fn set_atr(&mut self, on: bool) -> SurveyResult<Measurement> {
        self.dispatch(Operation::SetAtr(on)).await
    }

    /// Read the ATR state.
    pub async fn get_atr(&mut self) -> SurveyResult<Measurement> {
        self.dispatch(Operation::GetAtr).await
    }

    /// Switch prism lock on or off.
    pub async fn set_lock(&mut self, on: bool) -> SurveyResult<Measurement> {
        self.dispatch(Operation::SetLock(on)).await
    }

    /// Read the lock state.
    pub async fn get_lock(&mut self) -> SurveyResult<Measurement> {
        self.dispatch(Operation::GetLock).await
    }

    /// Start following the prism.
    pub async fn lock_in(&mut self) -> SurveyResult<Measurement> {
        self.dispatch(Operation::LockIn).await
    }

    /// Set meteorological correction; wet temperature defaults to dry − 5 °C.
    pub async fn set_atm_corr(
        &mut self,
        lambda: f64,
        pressure: f64,
        dry_temp: f64,
        wet_temp: Option<f64>,
    ) -> SurveyResult<Measurement> {
        self.dispatch(Operation::SetAtmCorr(AtmCorrection::Meteo {
            lambda,
            pressure,
            dry_temp,
            wet_temp: wet_temp.unwrap_or(dry_temp - 5.0),
        }))
        .await
    }

    /// Set atmospheric scale directly in ppm.
    pub async fn set_atm_ppm(&mut self, ppm: f64) -> SurveyResult<Measurement> {
        self.dispatch(Operation::SetAtmCorr(AtmCorrection::Ppm(ppm))).await
    }

    /// Read the atmospheric correction.
    pub async fn get_atm_corr(&mut self) -> SurveyResult<Measurement> {
        self.dispatch(Operation::GetAtmCorr).await
    }

    /// Set the refraction correction.
    pub async fn set_ref_corr(
        &mut self,
        enabled: bool,
        earth_radius: f64,
        scale: f64,
    ) -> SurveyResult<Measurement> {
        self.dispatch(Operation::SetRefCorr {
            enabled,
            earth_radius,
            scale,
        })
        .await
    }

    /// Read the refraction correction.
    pub async fn get_ref_corr(&mut self) -> SurveyResult<Measurement> {
        self.dispatch(Operation::GetRefCorr).await
    }

    /// Set station coordinates and instrument height.
    pub async fn set_station(
        &mut self,
        east: f64,
        north: f64,
        elev: Option<f64>,
        ih: f64,
    ) -> SurveyResult<Measurement> {
        self.dispatch(Operation::SetStation {
            east,
            north,
            elev,
            ih,
        })
        .await
    }

    /// Read station coordinates and instrument height.
    pub async fn get_station(&mut self) -> SurveyResult<Measurement> {
        self.dispatch(Operation::GetStation).await
    }

    /// Set the EDM mode by code.
    pub async fn set_edm_mode(&mut self, mode: i32) -> SurveyResult<Measurement> {
        self.dispatch(Operation::SetEdmMode(mode)).await
    }

    /// Set the EDM mode by its name in the unit's table, e.g. "FAST".
    pub async fn set_edm_mode_by_name(&mut self, name: &str) -> SurveyResult<Measurement> {
        let mode = self
            .unit
            .edm_mode(name)
            .ok_or_else(|| ProtocolError::UnknownEdmMode(name.to_string()))?;
        self.set_edm_mode(mode).await
    }

    /// Read the EDM mode code.
    pub async fn get_edm_mode(&mut self) -> SurveyResult<Measurement> {
        self.dispatch(Operation::GetEdmMode).await
    }

    /// Clear the last distance, then set the orientation.
    ///
    /// If the clear reply carries an instrument error that reply is returned
    /// and the orientation is left untouched.
    pub async fn set_orientation(&mut self, ori: Angle) -> SurveyResult<Measurement> {
        if self.unit.check(&Operation::ClearDistance).is_ok() {
            match self.clear_distance().await {
                Ok(m) if m.error_code.is_some() => return Ok(m),
                Ok(_) => {}
                Err(SurveyError::Protocol(ProtocolError::UnsupportedOperation { .. })) => {}
                Err(e) => return Err(e),
            }
        }
        self.dispatch(Operation::SetOrientation(ori)).await
    }

    /// Rotate to an absolute direction. Negative angles are normalized first.
    pub async fn move_to(&mut self, hz: Angle, v: Angle, atr: bool) -> SurveyResult<Measurement> {
        self.run(Operation::Move {
            hz: hz.normalized(true),
            v: v.normalized(true),
            atr,
        })
        .await
    }

    /// Rotate relative to the current direction.
    ///
    /// Reads the angles, then moves; the instrument may turn in between.
    /// Returns `None` when the current angles could not be read.
    pub async fn move_rel(
        &mut self,
        hz_rel: Angle,
        v_rel: Angle,
        atr: bool,
    ) -> SurveyResult<Option<Measurement>> {
        let current = self.get_angles().await?;
        match current.angles() {
            Some((hz, v)) => Ok(Some(self.move_to(hz + hz_rel, v + v_rel, atr).await?)),
            None => {
                warn!("{}: cannot move relative, angles unavailable", self.name);
                Ok(None)
            }
        }
    }

    /// Fine-aim on the prism within the given window.
    pub async fn fine_adjust(&mut self, hz_range: Angle, v_range: Angle) -> SurveyResult<Measurement> {
        self.dispatch(Operation::FineAdjust { hz_range, v_range }).await
    }

    /// Start a distance measurement.
    pub async fn measure(&mut self, program: EdmProgram, incl: u8) -> SurveyResult<Measurement> {
        self.dispatch(Operation::Measure { program, incl }).await
    }

    /// Read the last measurement, polling until a distance is present.
    pub async fn get_measure(&mut self, wait_ms: u32, incl: u8) -> SurveyResult<Measurement> {
        Ok(self.get_measure_polled(wait_ms, incl).await?.value)
    }

    /// Like [`TotalStation::get_measure`], also reporting the attempts used.
    pub async fn get_measure_polled(
        &mut self,
        wait_ms: u32,
        incl: u8,
    ) -> SurveyResult<Polled<Measurement>> {
        self.poll_until(Operation::GetMeasure { wait_ms, incl }, |m| {
            m.distance.is_some()
        })
        .await
    }

    /// Measure distance and angles in one go.
    pub async fn measure_dist_ang(&mut self, program: EdmProgram) -> SurveyResult<Measurement> {
        self.dispatch(Operation::MeasureDistAng { program }).await
    }

    /// Read the target coordinates of the last measurement.
    pub async fn coords(&mut self, wait_ms: u32, incl: u8) -> SurveyResult<Measurement> {
        self.dispatch(Operation::Coords { wait_ms, incl }).await
    }

    /// Read horizontal and zenith angles.
    pub async fn get_angles(&mut self) -> SurveyResult<Measurement> {
        self.dispatch(Operation::GetAngles).await
    }

    /// Forget the last measured distance.
    pub async fn clear_distance(&mut self) -> SurveyResult<Measurement> {
        self.dispatch(Operation::ClearDistance).await
    }

    /// Turn the telescope to the other face.
    pub async fn change_face(&mut self) -> SurveyResult<Measurement> {
        self.dispatch(Operation::ChangeFace).await
    }

    async fn derived_change_face(&mut self) -> SurveyResult<Measurement> {
        let current = self.run(Operation::GetAngles).await?;
        let Some((hz, v)) = current.angles() else {
            error!("{}: cannot change face, angles unavailable", self.name);
            return Ok(current);
        };
        let (hz, v) = change_face_target(hz, v);
        self.move_to(hz, v, false).await
    }

    /// Face derived from the current zenith angle.
    pub async fn get_face(&mut self) -> SurveyResult<Option<Face>> {
        let current = self.get_angles().await?;
        match current.v {
            Some(v) => Ok(Some(Face::from_zenith(v))),
            None => {
                error!("{}: get angles failed", self.name);
                Ok(None)
            }
        }
    }

    /// Switch the red laser pointer on or off.
    pub async fn set_red_laser(&mut self, on: bool) -> SurveyResult<Measurement> {
        self.dispatch(Operation::SetRedLaser(on)).await
    }

    /// Set the power search window. A missing centre is taken from the
    /// current direction; ranges default to the full circle and 95°.
    pub async fn set_search_area(
        &mut self,
        hz_center: Option<Angle>,
        v_center: Option<Angle>,
        hz_range: Option<Angle>,
        v_range: Option<Angle>,
        enabled: bool,
    ) -> SurveyResult<Measurement> {
        self.unit.check(&Operation::PowerSearch { clockwise: true })?;
        let (hz_center, v_center) = match (hz_center, v_center) {
            (Some(hz), Some(v)) => (hz, v),
            (hz, v) => {
                let current = self.get_angles().await?;
                match (hz.or(current.hz), v.or(current.v)) {
                    (Some(hz), Some(v)) => (hz, v),
                    _ => return Ok(current),
                }
            }
        };
        self.dispatch(Operation::SetSearchArea {
            hz_center,
            v_center,
            hz_range: hz_range.unwrap_or_else(|| Angle::from_gon(399.9999)),
            v_range: v_range.unwrap_or_else(|| Angle::from_deg(95.0)),
            enabled,
        })
        .await
    }

    /// Start a power search in the given direction.
    pub async fn power_search(&mut self, clockwise: bool) -> SurveyResult<Measurement> {
        self.dispatch(Operation::PowerSearch { clockwise }).await
    }

    /// Read the ATR search window.
    pub async fn get_spiral(&mut self) -> SurveyResult<Measurement> {
        self.dispatch(Operation::GetSpiral).await
    }

    /// Set the ATR search window.
    pub async fn set_spiral(&mut self, hz_range: Angle, v_range: Angle) -> SurveyResult<Measurement> {
        self.dispatch(Operation::SetSpiral { hz_range, v_range }).await
    }

    /// Search for a prism in the ATR window.
    pub async fn search_target(&mut self) -> SurveyResult<Measurement> {
        self.dispatch(Operation::SearchTarget).await
    }

    /// Read the serial number.
    pub async fn instrument_no(&mut self) -> SurveyResult<Measurement> {
        self.dispatch(Operation::GetInstrumentNo).await
    }

    /// Read the instrument name.
    pub async fn instrument_name(&mut self) -> SurveyResult<Measurement> {
        self.dispatch(Operation::GetInstrumentName).await
    }

    /// Read the internal temperature [°C].
    pub async fn internal_temperature(&mut self) -> SurveyResult<Measurement> {
        self.dispatch(Operation::GetInternalTemperature).await
    }

    /// Select a prism type by code.
    pub async fn set_prism_type(&mut self, prism_type: i32) -> SurveyResult<Measurement> {
        self.dispatch(Operation::SetPrismType(prism_type)).await
    }

    /// Read the prism type code.
    pub async fn get_prism_type(&mut self) -> SurveyResult<Measurement> {
        self.dispatch(Operation::GetPrismType).await
    }

    /// Wait for the next GGA fix from a GNSS receiver.
    pub async fn gnss_position(&mut self) -> SurveyResult<Measurement> {
        self.dispatch(Operation::GnssPosition).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{MockReply, MockTransport};
    use crate::instrument::{LeicaModel, LeicaUnit, NmeaGnssUnit, Trimble5500};
    use std::time::Duration;

    fn leica(mock: MockTransport) -> TotalStation {
        TotalStation::new("ts", Box::new(LeicaUnit::new(LeicaModel::Tps1200)), Box::new(mock))
            .with_poll_policy(RetryPolicy::new(20, Duration::ZERO))
    }

    #[test]
    fn test_change_face_target() {
        let (hz, v) = change_face_target(Angle::from_gon(50.0), Angle::from_gon(80.0));
        assert!((hz.gon() - 250.0).abs() < 1e-9);
        assert!((v.gon() - 320.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_dispatch_round_trip() {
        let mock = MockTransport::scripted([MockReply::line("%R1P,0,0:0,1.0,1.5")]);
        let log = mock.sent_log();
        let mut ts = leica(mock);
        let m = ts.get_angles().await.unwrap();
        assert_eq!(m.angles(), Some((Angle::from_rad(1.0), Angle::from_rad(1.5))));
        assert_eq!(log.lines(), vec!["%R1Q,2003:0"]);
    }

    #[tokio::test]
    async fn test_capability_checked_before_sending() {
        let mock = MockTransport::scripted([]);
        let log = mock.sent_log();
        let mut ts = TotalStation::new("t", Box::new(Trimble5500::new()), Box::new(mock));
        let err = ts.set_atr(true).await.unwrap_err();
        assert!(matches!(
            err,
            SurveyError::Protocol(ProtocolError::UnsupportedCapability {
                capability: Capability::Atr,
                ..
            })
        ));
        assert!(log.lines().is_empty());
    }

    #[tokio::test]
    async fn test_transport_error_sticks_until_reset() {
        let mock = MockTransport::scripted([
            MockReply::Timeout,
            MockReply::line("%R1P,0,0:0,1.0,1.5"),
        ]);
        let mut ts = leica(mock);
        assert!(matches!(
            ts.get_angles().await,
            Err(SurveyError::Transport(TransportError::Timeout))
        ));
        assert_eq!(ts.state(), TransportState::Timeout);
        assert!(matches!(
            ts.get_angles().await,
            Err(SurveyError::Transport(TransportError::NotReady(TransportState::Timeout)))
        ));
        ts.reset_state();
        assert!(ts.get_angles().await.is_ok());
    }

    #[tokio::test]
    async fn test_get_measure_polls_until_distance() {
        let mut calls = 0;
        let mock = MockTransport::with_responder(move |_| {
            calls += 1;
            if calls < 5 {
                MockReply::line("%R1P,0,0:1284")
            } else {
                MockReply::line("%R1P,0,0:0,0.1,1.5,42.0")
            }
        });
        let log = mock.sent_log();
        let mut ts = leica(mock);
        let polled = ts.get_measure_polled(DEFAULT_WAIT_MS, 0).await.unwrap();
        assert!(polled.satisfied);
        assert_eq!(polled.attempts, 5);
        assert_eq!(polled.value.distance, Some(42.0));
        assert_eq!(log.count_prefix("%R1Q,2108:"), 5);
    }

    #[tokio::test]
    async fn test_get_measure_gives_up_at_ceiling() {
        let mock = MockTransport::with_responder(|_| MockReply::line("%R1P,0,0:1284"));
        let log = mock.sent_log();
        let mut ts = leica(mock);
        let polled = ts.get_measure_polled(DEFAULT_WAIT_MS, 0).await.unwrap();
        assert!(!polled.satisfied);
        assert_eq!(polled.attempts, 20);
        assert_eq!(polled.value.error_code, Some(1284));
        assert_eq!(log.lines().len(), 20);
    }

    #[tokio::test]
    async fn test_trimble_batch_sends_each_part() {
        let mock = MockTransport::with_responder(|req| match req {
            "RG,7" => MockReply::line("7=50.0000"),
            "RG,8" => MockReply::line("8=80.0000"),
            _ => MockReply::line(""),
        });
        let log = mock.sent_log();
        let mut ts = TotalStation::new("t", Box::new(Trimble5500::new()), Box::new(mock));
        let m = ts.get_angles().await.unwrap();
        assert!((m.hz.unwrap().deg() - 50.0).abs() < 1e-9);
        assert!((m.v.unwrap().deg() - 80.0).abs() < 1e-9);
        assert_eq!(log.lines(), vec!["RG,7", "RG,8"]);
    }

    #[tokio::test]
    async fn test_derived_change_face_moves_to_other_face() {
        // 50 gon = 45°, 80 gon = 72°
        let mock = MockTransport::with_responder(|req| match req {
            "RG,7" => MockReply::line("7=45.0000"),
            "RG,8" => MockReply::line("8=72.0000"),
            _ => MockReply::line(""),
        });
        let log = mock.sent_log();
        let mut ts = TotalStation::new("t", Box::new(Trimble5500::new()), Box::new(mock));
        ts.change_face().await.unwrap();
        // 250 gon = 225°, 320 gon = 288°
        assert_eq!(
            log.lines(),
            vec!["RG,7", "RG,8", "WG,26=288.0000", "WG,27=225.0000", "WS=PH02V02"]
        );
    }

    #[tokio::test]
    async fn test_native_change_face_on_leica() {
        let mock = MockTransport::scripted([MockReply::line("%R1P,0,0:0")]);
        let log = mock.sent_log();
        let mut ts = leica(mock);
        ts.change_face().await.unwrap();
        assert_eq!(log.lines(), vec!["%R1Q,9028:0,0,0"]);
    }

    #[tokio::test]
    async fn test_move_normalizes_and_move_rel_adds() {
        let mock = MockTransport::with_responder(|req| {
            if req.starts_with("%R1Q,2003") {
                MockReply::line("%R1P,0,0:0,0.0,1.5707963267948966")
            } else {
                MockReply::line("%R1P,0,0:0")
            }
        });
        let log = mock.sent_log();
        let mut ts = leica(mock);
        ts.move_to(Angle::from_deg(-90.0), Angle::from_deg(90.0), false)
            .await
            .unwrap();
        ts.move_rel(Angle::from_deg(10.0), Angle::from_deg(-5.0), true)
            .await
            .unwrap()
            .unwrap();
        let lines = log.lines();
        assert_eq!(lines[0], "%R1Q,9027:270.0000,90.0000,0,0,0");
        assert_eq!(lines[1], "%R1Q,2003:0");
        assert_eq!(lines[2], "%R1Q,9027:10.0000,85.0000,0,1,0");
    }

    #[tokio::test]
    async fn test_get_face() {
        let mock = MockTransport::scripted([
            MockReply::line("%R1P,0,0:0,0.0,1.2"),
            MockReply::line("%R1P,0,0:0,0.0,4.5"),
            MockReply::line("%R1P,0,0:1"),
        ]);
        let mut ts = leica(mock);
        assert_eq!(ts.get_face().await.unwrap(), Some(Face::Left));
        assert_eq!(ts.get_face().await.unwrap(), Some(Face::Right));
        assert_eq!(ts.get_face().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_set_orientation_clears_first() {
        let mock = MockTransport::with_responder(|_| MockReply::line("%R1P,0,0:0"));
        let log = mock.sent_log();
        let mut ts = leica(mock);
        ts.set_orientation(Angle::from_deg(12.5)).await.unwrap();
        assert_eq!(log.lines(), vec!["%R1Q,2008:3,0", "%R1Q,2113:12.3000"]);

        let failing = MockTransport::with_responder(|_| MockReply::line("%R1P,0,0:3"));
        let log = failing.sent_log();
        let mut ts = leica(failing);
        let m = ts.set_orientation(Angle::from_deg(12.5)).await.unwrap();
        assert_eq!(m.error_code, Some(3));
        assert_eq!(log.lines().len(), 1);
    }

    #[tokio::test]
    async fn test_set_search_area_defaults() {
        let mock = MockTransport::with_responder(|req| {
            if req.starts_with("%R1Q,2003") {
                MockReply::line("%R1P,0,0:0,0.0,1.5707963267948966")
            } else {
                MockReply::line("%R1P,0,0:0")
            }
        });
        let log = mock.sent_log();
        let mut ts = leica(mock);
        ts.set_search_area(None, None, None, None, true).await.unwrap();
        assert_eq!(log.lines()[1], "%R1Q,9043:0.0000,90.0000,360.0000,95.0000,1");
    }

    #[tokio::test]
    async fn test_edm_mode_by_name() {
        let mock = MockTransport::with_responder(|_| MockReply::line("%R1P,0,0:0"));
        let log = mock.sent_log();
        let mut ts = leica(mock);
        ts.set_edm_mode_by_name("fast").await.unwrap();
        assert_eq!(log.lines(), vec!["%R1Q,2020:3"]);
        assert!(matches!(
            ts.set_edm_mode_by_name("warp").await,
            Err(SurveyError::Protocol(ProtocolError::UnknownEdmMode(_)))
        ));
    }

    #[tokio::test]
    async fn test_gnss_listen_skips_other_sentences() {
        let mock = MockTransport::scripted([
            MockReply::line("$GPRMC,123519,A,4807.038,N,01131.000,E,022.4,084.4,230394,003.1,W*6A"),
            MockReply::line("$GPGGA,183730,3907.356,N,12102.482,W,1,05,1.6,646.4,M,-24.1,M,,*75"),
        ]);
        let log = mock.sent_log();
        let mut ts = TotalStation::new("gnss", Box::new(NmeaGnssUnit::new()), Box::new(mock));
        let m = ts.gnss_position().await.unwrap();
        assert_eq!(m.nsat, Some(5));
        assert!(log.lines().is_empty());
    }
}

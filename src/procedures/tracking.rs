//! Continuous measurement to a moving target.
//!
//! Each [`TrackingMode`] is a different per-cycle strategy. After every cycle
//! the local coordinates are derived from the last known slope distance and
//! the current angles, and the point is written out.

use super::StopSignal;
use crate::angle::{Angle, PI2};
use crate::error::{SurveyError, SurveyResult};
use crate::instrument::{Capability, EdmProgram};
use crate::measurement::Measurement;
use crate::session::{TotalStation, DEFAULT_WAIT_MS};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, error, info, warn};

/// Per-cycle measuring strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum TrackingMode {
    /// 0: distance only, no aiming (e.g. reflectorless on a pylon)
    DistanceOnly,
    /// 1: aim with ATR, then measure distance
    AimAndMeasure,
    /// 2: aim with ATR, angles only
    AimAndAngles,
    /// 3: angles only while locked on the prism
    LockedAngles,
    /// 4: distance while locked on the prism
    LockedDistance,
    /// 5: measure when the prism has stopped
    CaptureOnStop,
}

impl TrackingMode {
    /// Whether the mode aims with ATR before the loop starts.
    pub fn aims(self) -> bool {
        self != TrackingMode::DistanceOnly
    }

    /// Whether the mode locks onto the prism.
    pub fn locks(self) -> bool {
        matches!(
            self,
            TrackingMode::LockedAngles | TrackingMode::LockedDistance | TrackingMode::CaptureOnStop
        )
    }
}

impl TryFrom<u8> for TrackingMode {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(TrackingMode::DistanceOnly),
            1 => Ok(TrackingMode::AimAndMeasure),
            2 => Ok(TrackingMode::AimAndAngles),
            3 => Ok(TrackingMode::LockedAngles),
            4 => Ok(TrackingMode::LockedDistance),
            5 => Ok(TrackingMode::CaptureOnStop),
            other => Err(format!("tracking mode must be 0..=5, got {other}")),
        }
    }
}

impl From<TrackingMode> for u8 {
    fn from(mode: TrackingMode) -> u8 {
        mode as u8
    }
}

impl fmt::Display for TrackingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", u8::from(*self))
    }
}

/// Stop detector for [`TrackingMode::CaptureOnStop`].
///
/// While moving, the current angles are compared with the previous cycle's.
/// After `stable_cycles` consecutive cycles with both deltas under `limit` the
/// target counts as stopped and [`MotionDetector::update`] asks for one
/// capture. While stopped, the angles are compared with the last captured
/// point instead; a delta at or above `limit` means moving again.
#[derive(Debug, Clone, PartialEq)]
pub struct MotionDetector {
    limit: Angle,
    stable_cycles: u32,
    moving: bool,
    stable: u32,
    prev: (Angle, Angle),
    last_recorded: (Angle, Angle),
}

impl MotionDetector {
    /// Detector starting as moving, at `hz` / `v`.
    pub fn new(limit: Angle, stable_cycles: u32, hz: Angle, v: Angle) -> Self {
        Self {
            limit: limit.abs(),
            stable_cycles: stable_cycles.max(1),
            moving: true,
            stable: 0,
            prev: (hz, v),
            last_recorded: (hz, v),
        }
    }

    /// Whether the target is currently considered moving.
    pub fn is_moving(&self) -> bool {
        self.moving
    }

    /// Feed one cycle's angles. Returns true when a capture is due.
    pub fn update(&mut self, hz: Angle, v: Angle) -> bool {
        if self.moving {
            let still = self.within(self.prev, (hz, v));
            self.prev = (hz, v);
            if !still {
                self.stable = 0;
                return false;
            }
            self.stable += 1;
            if self.stable < self.stable_cycles {
                return false;
            }
            self.moving = false;
            self.stable = 0;
            debug!("Target stopped at {} / {}", hz, v);
            true
        } else {
            if !self.within(self.last_recorded, (hz, v)) {
                debug!("Target moving again");
                self.moving = true;
                self.stable = 0;
                self.prev = (hz, v);
            }
            false
        }
    }

    /// Remember the direction of the point just captured.
    pub fn recorded(&mut self, hz: Angle, v: Angle) {
        self.last_recorded = (hz, v);
        self.prev = (hz, v);
    }

    fn within(&self, a: (Angle, Angle), b: (Angle, Angle)) -> bool {
        delta(a.0, b.0) < self.limit.rad() && delta(a.1, b.1) < self.limit.rad()
    }
}

/// Absolute angular difference, shortest way round the circle.
fn delta(a: Angle, b: Angle) -> f64 {
    let d = (a - b).normalized(true).rad();
    d.min(PI2 - d)
}

/// Parameters of a tracking run.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackingSettings {
    /// Per-cycle strategy
    pub mode: TrackingMode,
    /// EDM mode name; unknown names fall back to FAST
    pub edm_mode: String,
    /// Angular threshold for the stop detector
    pub limit: Angle,
    /// Consecutive still cycles before a capture
    pub stable_cycles: u32,
    /// Stop after this many cycles; run until stopped when `None`
    pub max_cycles: Option<u64>,
}

impl Default for TrackingSettings {
    fn default() -> Self {
        Self {
            mode: TrackingMode::LockedDistance,
            edm_mode: "FAST".to_string(),
            limit: Angle::from_deg(3.0 / 60.0),
            stable_cycles: 3,
            max_cycles: None,
        }
    }
}

/// Result of a tracking run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackingReport {
    /// Cycles started
    pub cycles: u64,
    /// Points written out
    pub recorded: u64,
    /// Cycles where the mode produced incomplete data
    pub incomplete: u64,
}

/// The tracking procedure, borrowing the session for its whole run.
pub struct Tracking<'a> {
    ts: &'a mut TotalStation,
    settings: TrackingSettings,
    stop: StopSignal,
    slope_distance: f64,
    detector: Option<MotionDetector>,
}

impl<'a> Tracking<'a> {
    /// Borrow `ts` for one tracking run.
    pub fn new(ts: &'a mut TotalStation, settings: TrackingSettings, stop: StopSignal) -> Self {
        Self {
            ts,
            settings,
            stop,
            slope_distance: 0.0,
            detector: None,
        }
    }

    /// Run until stopped, the cycle limit is hit or the transport fails.
    pub async fn run(&mut self) -> SurveyResult<TrackingReport> {
        self.setup().await?;
        let mut report = TrackingReport::default();
        while !self.stop.is_stopped() && self.ts.state().is_ok() {
            if self.settings.max_cycles.is_some_and(|max| report.cycles >= max) {
                break;
            }
            report.cycles += 1;
            let measurement = match self.cycle().await {
                Ok(Some(m)) => m,
                Ok(None) => continue,
                Err(SurveyError::Transport(e)) => {
                    error!("Tracking stopped, transport failure: {}", e);
                    break;
                }
                Err(e) => {
                    warn!("Cycle {} failed: {}", report.cycles, e);
                    continue;
                }
            };
            if self.store(measurement).await {
                report.recorded += 1;
            } else {
                report.incomplete += 1;
            }
        }
        info!(
            "Tracking finished after {} cycles, {} points recorded",
            report.cycles, report.recorded
        );
        Ok(report)
    }

    async fn setup(&mut self) -> SurveyResult<()> {
        let mode = self.settings.mode;
        info!("Tracking in mode {} with EDM mode {}", mode, self.settings.edm_mode);
        if self.ts.has(Capability::Edm) {
            let edm = &self.settings.edm_mode;
            let edm = if self.ts.unit().edm_mode(edm).is_some() {
                edm.clone()
            } else {
                warn!("Unknown EDM mode '{}', using FAST", edm);
                "FAST".to_string()
            };
            self.ts.set_edm_mode_by_name(&edm).await?;
        }

        let has_atr = self.ts.has(Capability::Atr);
        if !mode.aims() {
            if has_atr {
                self.ts.set_atr(false).await?;
            }
            return Ok(());
        }

        if self.ts.has(Capability::Lock) {
            self.ts.set_lock(false).await?;
        }
        if has_atr {
            self.ts.set_atr(true).await?;
        } else {
            warn!("{} has no ATR, aiming skipped", self.ts.unit().name());
        }
        self.ts.move_rel(Angle::zero(), Angle::zero(), has_atr).await?;
        self.ts.measure(EdmProgram::Default, 0).await?;
        let first = self.ts.get_measure(DEFAULT_WAIT_MS, 0).await?;
        if let Some(d) = first.distance {
            self.slope_distance = d;
        }

        if mode.locks() {
            if self.ts.has(Capability::Lock) {
                self.ts.set_lock(true).await?;
                self.ts.lock_in().await?;
            } else {
                warn!("{} cannot lock on the prism", self.ts.unit().name());
            }
        }
        if mode == TrackingMode::CaptureOnStop {
            let (hz, v) = match first.angles() {
                Some(angles) => angles,
                None => self
                    .ts
                    .get_angles()
                    .await?
                    .angles()
                    .ok_or_else(|| SurveyError::Baseline("angles unavailable".into()))?,
            };
            self.detector = Some(MotionDetector::new(
                self.settings.limit,
                self.settings.stable_cycles,
                hz,
                v,
            ));
        }
        Ok(())
    }

    /// One cycle of the selected mode. `None` when nothing is to be stored.
    async fn cycle(&mut self) -> SurveyResult<Option<Measurement>> {
        let m = match self.settings.mode {
            TrackingMode::DistanceOnly | TrackingMode::LockedDistance => {
                self.measure_distance().await?
            }
            TrackingMode::AimAndMeasure => {
                self.ts.move_rel(Angle::zero(), Angle::zero(), true).await?;
                self.measure_distance().await?
            }
            TrackingMode::AimAndAngles => {
                self.ts.move_rel(Angle::zero(), Angle::zero(), true).await?;
                self.ts.get_angles().await?
            }
            TrackingMode::LockedAngles => self.ts.get_angles().await?,
            TrackingMode::CaptureOnStop => return self.capture_on_stop().await,
        };
        Ok(Some(m))
    }

    async fn measure_distance(&mut self) -> SurveyResult<Measurement> {
        self.ts.measure(EdmProgram::Default, 0).await?;
        self.ts.get_measure(DEFAULT_WAIT_MS, 0).await
    }

    async fn capture_on_stop(&mut self) -> SurveyResult<Option<Measurement>> {
        let current = self.ts.get_angles().await?;
        let Some((hz, v)) = current.angles() else {
            warn!("Angles missing, cycle skipped");
            return Ok(None);
        };
        let Some(detector) = self.detector.as_mut() else {
            return Ok(None);
        };
        if !detector.update(hz, v) {
            return Ok(None);
        }
        let m = self.measure_distance().await?;
        let (rec_hz, rec_v) = m.angles().unwrap_or((hz, v));
        if let Some(detector) = self.detector.as_mut() {
            detector.recorded(rec_hz, rec_v);
        }
        info!("Target stopped, point captured");
        Ok(Some(m))
    }

    /// Derive coordinates and write the point. False when data is missing.
    async fn store(&mut self, mut m: Measurement) -> bool {
        if let Some(d) = m.distance {
            self.slope_distance = d;
        }
        let Some((hz, v)) = m.angles() else {
            warn!("Some measurement data are missing");
            return false;
        };
        m.set_local_coordinates(hz, v, self.slope_distance);
        self.ts.record(&m).await;
        true
    }
}

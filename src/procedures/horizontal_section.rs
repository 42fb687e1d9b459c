//! Horizontal section scan.
//!
//! Turns the instrument around its vertical axis in fixed steps and, at every
//! step, tilts the telescope until the measured point lies on the horizontal
//! plane `height = h0` (within a tolerance). `h0` is either given or taken
//! from the first point: `h0 = d·cos(v)`.
//!
//! A point that does not converge, or whose readings fail, is skipped and the
//! scan goes on. Only a failed first measurement aborts the run. The scan
//! measures reflectorless (RLSTANDARD) unless another EDM mode is given.

use super::StopSignal;
use crate::angle::Angle;
use crate::error::{SurveyError, SurveyResult};
use crate::instrument::{Capability, EdmProgram};
use crate::measurement::{Measurement, Record};
use crate::session::{TotalStation, DEFAULT_WAIT_MS};
use std::f64::consts::PI;
use tracing::{debug, error, info, warn};

/// Parameters of a section scan.
#[derive(Debug, Clone, PartialEq)]
pub struct SectionSettings {
    /// Horizontal step between points
    pub step: Angle,
    /// Stop once this much of the circle has been swept
    pub max_angle: Angle,
    /// Accepted distance from the plane [m]
    pub tolerance: f64,
    /// Corrective tilts per point before giving up
    pub max_iterations: u32,
    /// Plane height above the horizontal axis [m]; measured when `None`
    pub elevation: Option<f64>,
    /// Direction of the first point; the current direction when `None`
    pub start_hz: Option<Angle>,
    /// EDM mode name set before the first point; skipped when the unit
    /// does not know it
    pub edm_mode: String,
}

impl SectionSettings {
    /// Reject settings the scan cannot finish with.
    ///
    /// # Errors
    /// [`SurveyError::Configuration`] for a non-positive step, sweep or
    /// tolerance, or a zero iteration budget.
    pub fn check(&self) -> SurveyResult<()> {
        let invalid = |what: &str| Err(SurveyError::Configuration(what.to_string()));
        if self.step.rad() <= 0.0 {
            return invalid("section step must be positive");
        }
        if self.max_angle.rad() <= 0.0 {
            return invalid("section sweep must be positive");
        }
        if self.tolerance <= 0.0 {
            return invalid("section tolerance must be positive");
        }
        if self.max_iterations == 0 {
            return invalid("section needs at least one iteration");
        }
        Ok(())
    }
}

impl Default for SectionSettings {
    fn default() -> Self {
        Self {
            step: Angle::from_deg(45.0),
            max_angle: Angle::from_rad(2.0 * PI),
            tolerance: 0.02,
            max_iterations: 10,
            elevation: None,
            start_hz: None,
            edm_mode: "RLSTANDARD".to_string(),
        }
    }
}

/// Result of a finished scan.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SectionReport {
    /// Plane height used
    pub height: f64,
    /// Points recorded, in scan order
    pub points: Vec<Measurement>,
    /// Steps abandoned
    pub skipped: u32,
    /// Steps visited
    pub steps: u32,
}

/// The scan procedure, borrowing the session for its whole run.
pub struct HorizontalSection<'a> {
    ts: &'a mut TotalStation,
    settings: SectionSettings,
    stop: StopSignal,
}

impl<'a> HorizontalSection<'a> {
    /// Borrow `ts` for one scan.
    pub fn new(ts: &'a mut TotalStation, settings: SectionSettings, stop: StopSignal) -> Self {
        Self { ts, settings, stop }
    }

    /// Run the scan and rotate back to the first point. A stopped scan
    /// stays where it is.
    ///
    /// # Errors
    /// [`SurveyError::Configuration`] for unusable settings,
    /// [`SurveyError::Baseline`] when the first point cannot be measured.
    pub async fn run(&mut self) -> SurveyResult<SectionReport> {
        self.settings.check()?;
        self.set_edm_mode().await;
        let start = self.baseline().await?;
        let Some((start_hz, start_v, start_d)) = start.polar() else {
            return Err(SurveyError::Baseline("incomplete first measurement".into()));
        };
        let height = self
            .settings
            .elevation
            .unwrap_or_else(|| start_d * start_v.rad().cos());
        info!(
            "Horizontal section at height {:.3} m, step {}, tolerance {} m",
            height,
            self.settings.step.dms(),
            self.settings.tolerance
        );

        if self.ts.has(Capability::Laser) {
            if let Err(e) = self.ts.set_red_laser(true).await {
                debug!("Red laser not switched on: {}", e);
                self.ts.reset_state();
            }
        }

        let mut report = SectionReport {
            height,
            ..Default::default()
        };
        let mut act = Angle::zero();
        while act.rad() < self.settings.max_angle.rad() {
            if self.stop.is_stopped() {
                info!("Horizontal section stopped after {} steps", report.steps);
                break;
            }
            report.steps += 1;
            match self.level_point(height).await {
                Ok(Some(point)) => {
                    let point = self.complete(point).await;
                    let mut record = Record::timestamped();
                    record.insert("id", (report.points.len() + 1).to_string());
                    record.extend_from(&point);
                    self.ts.write_record(&record).await;
                    report.points.push(point);
                }
                Ok(None) => {
                    warn!("Missing measurement at {} gon, point skipped", act);
                    report.skipped += 1;
                }
                Err(e) => {
                    warn!("Point at {} gon skipped: {}", act, e);
                    self.ts.reset_state();
                    report.skipped += 1;
                }
            }
            if let Err(e) = self.ts.move_rel(self.settings.step, Angle::zero(), false).await {
                warn!("Rotation to the next step failed: {}", e);
                self.ts.reset_state();
            }
            act += self.settings.step;
        }

        if self.stop.is_stopped() {
            info!("Stopped, not rotating back to the start direction");
        } else if let Err(e) = self.ts.move_to(start_hz, start_v, false).await {
            error!("Cannot rotate back to the start direction: {}", e);
            self.ts.reset_state();
        }
        info!(
            "Horizontal section done: {} points, {} skipped",
            report.points.len(),
            report.skipped
        );
        Ok(report)
    }

    async fn set_edm_mode(&mut self) {
        let name = self.settings.edm_mode.clone();
        if !self.ts.has(Capability::Edm) || self.ts.unit().edm_mode(&name).is_none() {
            warn!("{} has no EDM mode '{}', left unchanged", self.ts.unit().name(), name);
            return;
        }
        if let Err(e) = self.ts.set_edm_mode_by_name(&name).await {
            warn!("EDM mode '{}' not set: {}", name, e);
            self.ts.reset_state();
        }
    }

    /// First point: optional turn to the start direction, then one polled
    /// distance measurement.
    async fn baseline(&mut self) -> SurveyResult<Measurement> {
        let fatal = |e: SurveyError| SurveyError::Baseline(e.to_string());
        self.ts
            .measure(EdmProgram::Default, 0)
            .await
            .map_err(fatal)?;
        if let Some(start_hz) = self.settings.start_hz {
            let current = self.ts.get_angles().await.map_err(fatal)?;
            let v = current
                .v
                .ok_or_else(|| SurveyError::Baseline("zenith angle unavailable".into()))?;
            self.ts.move_to(start_hz, v, false).await.map_err(fatal)?;
            self.ts
                .measure(EdmProgram::Default, 0)
                .await
                .map_err(fatal)?;
        }
        let start = self.ts.get_measure(DEFAULT_WAIT_MS, 0).await.map_err(fatal)?;
        if let Some(code) = start.error_code {
            return Err(SurveyError::Baseline(format!("instrument error code {code}")));
        }
        if start.distance.is_none() {
            return Err(SurveyError::Baseline("no distance".into()));
        }
        Ok(start)
    }

    /// Measure at the current direction and tilt until the point is on the
    /// plane. `Ok(None)` when a reading came back incomplete.
    async fn level_point(&mut self, height0: f64) -> SurveyResult<Option<Measurement>> {
        self.ts.measure(EdmProgram::Default, 0).await?;
        let mut point = self.ts.get_measure(DEFAULT_WAIT_MS, 0).await?;
        let mut iterations = 0;
        loop {
            let Some((_, zenith, distance)) = point.polar() else {
                return Ok(None);
            };
            let residual = distance * zenith.rad().cos() - height0;
            if residual.abs() <= self.settings.tolerance {
                debug!("Point on plane after {} iterations", iterations);
                return Ok(Some(point));
            }
            if iterations >= self.settings.max_iterations || height0.abs() > distance {
                return Err(SurveyError::Convergence {
                    iterations,
                    residual,
                });
            }
            let zenith1 = Angle::from_rad((height0 / distance).acos());
            self.ts
                .move_rel(Angle::zero(), zenith1 - zenith, false)
                .await?;
            self.ts.measure(EdmProgram::Default, 0).await?;
            iterations += 1;
            point = self.ts.get_measure(DEFAULT_WAIT_MS, 0).await?;
        }
    }

    /// Add instrument coordinates when the unit can provide them.
    async fn complete(&mut self, mut point: Measurement) -> Measurement {
        if self.ts.has(Capability::Position) {
            match self.ts.coords(DEFAULT_WAIT_MS, 0).await {
                Ok(coords) if coords.error_code.is_none() => point.merge(coords),
                Ok(coords) => warn!("Coordinates unavailable, code {:?}", coords.error_code),
                Err(e) => {
                    warn!("Coordinates unavailable: {}", e);
                    self.ts.reset_state();
                }
            }
        }
        point
    }
}

//! Simulated GeoCOM instrument and a collecting writer for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use rust_survey::adapters::{MockReply, MockTransport, SentLog};
use rust_survey::angle::Angle;
use rust_survey::error_recovery::RetryPolicy;
use rust_survey::instrument::InstrumentModel;
use rust_survey::measurement::Record;
use rust_survey::writer::Writer;
use rust_survey::TotalStation;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Where the simulated telescope points and what it sees there.
pub struct Scene {
    pub hz: f64,
    pub v: f64,
    /// Slope distance for the current direction, `None` for no return
    pub range: Box<dyn Fn(f64, f64) -> Option<f64> + Send>,
    /// Directions reported by successive angle reads; the telescope
    /// direction once exhausted
    pub targets: VecDeque<(f64, f64)>,
}

impl Scene {
    pub fn new(hz: Angle, v: Angle, range: impl Fn(f64, f64) -> Option<f64> + Send + 'static) -> Self {
        Self {
            hz: hz.rad(),
            v: v.rad(),
            range: Box::new(range),
            targets: VecDeque::new(),
        }
    }

    fn reply(&mut self, request: &str) -> String {
        let Some((code, args)) = request
            .strip_prefix("%R1Q,")
            .and_then(|rest| rest.split_once(':'))
        else {
            return "%R1P,0,0:0".to_string();
        };
        match code {
            "2003" => {
                if let Some((hz, v)) = self.targets.pop_front() {
                    self.hz = hz;
                    self.v = v;
                }
                format!("%R1P,0,0:0,{:.10},{:.10}", self.hz, self.v)
            }
            "9027" => {
                let values: Vec<f64> = args
                    .split(',')
                    .take(2)
                    .filter_map(|t| t.parse().ok())
                    .collect();
                if let [hz, v] = values[..] {
                    self.hz = Angle::from_pdeg(hz).rad();
                    self.v = Angle::from_pdeg(v).rad();
                }
                "%R1P,0,0:0".to_string()
            }
            "2108" => match (self.range)(self.hz, self.v) {
                Some(d) => format!("%R1P,0,0:0,{:.10},{:.10},{:.4}", self.hz, self.v, d),
                None => "%R1P,0,0:1284".to_string(),
            },
            "2082" => match (self.range)(self.hz, self.v) {
                Some(d) => format!(
                    "%R1P,0,0:0,{:.4},{:.4},{:.4}",
                    d * self.v.sin() * self.hz.sin(),
                    d * self.v.sin() * self.hz.cos(),
                    d * self.v.cos()
                ),
                None => "%R1P,0,0:1284".to_string(),
            },
            _ => "%R1P,0,0:0".to_string(),
        }
    }
}

/// Shared handle on the simulated telescope.
#[derive(Clone)]
pub struct Simulator(Arc<Mutex<Scene>>);

impl Simulator {
    pub fn new(scene: Scene) -> Self {
        Self(Arc::new(Mutex::new(scene)))
    }

    pub fn direction(&self) -> (Angle, Angle) {
        let scene = self.0.lock().unwrap();
        (Angle::from_rad(scene.hz), Angle::from_rad(scene.v))
    }

    /// Queue prism directions for the next angle reads.
    pub fn push_targets(&self, targets: impl IntoIterator<Item = (f64, f64)>) {
        self.0.lock().unwrap().targets.extend(targets);
    }

    pub fn transport(&self) -> MockTransport {
        let scene = Arc::clone(&self.0);
        MockTransport::with_responder(move |request| {
            MockReply::line(scene.lock().unwrap().reply(request))
        })
    }
}

/// Writer keeping every record it receives.
#[derive(Clone, Default)]
pub struct Collected(pub Arc<Mutex<Vec<Record>>>);

impl Collected {
    pub fn records(&self) -> Vec<Record> {
        self.0.lock().unwrap().clone()
    }
}

#[async_trait]
impl Writer for Collected {
    async fn write_record(&mut self, record: &Record) {
        self.0.lock().unwrap().push(record.clone());
    }
}

/// A TPS1200 session on the simulator, with a collecting writer.
pub async fn tps1200(sim: &Simulator) -> (TotalStation, Collected, SentLog) {
    let transport = sim.transport();
    let log = transport.sent_log();
    let collected = Collected::default();
    let mut ts = TotalStation::new(
        "sim",
        InstrumentModel::Tps1200.build(),
        Box::new(transport),
    )
    .with_writer(Box::new(collected.clone()))
    .with_poll_policy(RetryPolicy::new(3, std::time::Duration::ZERO));
    ts.open().await.unwrap();
    (ts, collected, log)
}

/// Vertical cylinder wall of horizontal radius `radius(hz)` around the
/// instrument; the slope distance at zenith angle `v` is `R / sin(v)`.
pub fn wall(radius: impl Fn(f64) -> f64 + Send + 'static) -> impl Fn(f64, f64) -> Option<f64> + Send + 'static {
    move |hz, v| Some(radius(hz) / v.sin())
}

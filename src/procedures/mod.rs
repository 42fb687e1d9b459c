//! Measurement procedures built on a [`TotalStation`](crate::session::TotalStation).
//!
//! Procedures only talk to the session's public operations. They check a
//! [`StopSignal`] between cycles, never in the middle of an exchange.

pub mod horizontal_section;
pub mod tracking;

pub use horizontal_section::{HorizontalSection, SectionReport, SectionSettings};
pub use tracking::{MotionDetector, Tracking, TrackingMode, TrackingReport, TrackingSettings};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative cancellation flag shared between a procedure and whoever
/// wants to stop it (for example a Ctrl-C handler).
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the procedure to stop after the current exchange.
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_signal_is_shared() {
        let signal = StopSignal::new();
        let handle = signal.clone();
        assert!(!signal.is_stopped());
        handle.stop();
        assert!(signal.is_stopped());
    }
}

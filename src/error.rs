//! Custom error types for the surveying stack.
//!
//! `SurveyError` is the crate-wide error. It groups the failure classes an
//! instrument session can run into:
//!
//! - **`Transport`**: the byte stream to the instrument timed out, hit EOF, or
//!   could not be opened. These short-circuit the current operation and leave the
//!   transport in a non-OK state until the caller resets it.
//! - **`Protocol`**: the measure unit could not express or understand an exchange
//!   (capability not available, malformed reply, NMEA checksum mismatch, ...).
//! - **`Convergence`**: the elevation-matching loop ran out of iterations.
//! - **`Format`**: an angle literal did not match its unit's grammar.
//! - **`Baseline`**: a procedure could not take its first reference measurement.
//!
//! Instrument-side return codes (for example a Leica `RC` other than zero) are
//! *not* errors at this level. They are carried on the decoded
//! [`Measurement`](crate::measurement::Measurement) so polling callers can keep
//! waiting for a result.

use crate::adapters::TransportState;
use crate::instrument::Capability;
use thiserror::Error;

/// Convenience alias for results using the crate error type.
pub type SurveyResult<T> = std::result::Result<T, SurveyError>;

#[derive(Error, Debug)]
pub enum SurveyError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Elevation matching did not converge after {iterations} iterations (residual {residual:.4} m)")]
    Convergence { iterations: u32, residual: f64 },

    #[error("Angle format error: {0}")]
    Format(#[from] AngleFormatError),

    #[error("Cannot establish baseline measurement: {0}")]
    Baseline(String),

    #[error("Configuration validation error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Feature '{0}' is not enabled. Please build with --features {0}")]
    FeatureNotEnabled(String),
}

/// Failures of the byte stream underneath a session.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("read timed out")]
    Timeout,

    #[error("unexpected end of stream")]
    Eof,

    #[error("source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("file not found: {0}")]
    FileNotFound(String),

    #[error("transport is in {0:?} state, reset it before reuse")]
    NotReady(TransportState),
}

impl TransportError {
    /// The transport state this failure leaves behind.
    pub fn state(&self) -> TransportState {
        match self {
            TransportError::Timeout => TransportState::Timeout,
            TransportError::Eof => TransportState::Eof,
            TransportError::SourceUnavailable(_) => TransportState::SourceError,
            TransportError::FileNotFound(_) => TransportState::FileError,
            TransportError::NotReady(state) => *state,
        }
    }
}

/// Failures while building or parsing vendor wire messages.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    #[error("{unit} does not provide the {capability} capability")]
    UnsupportedCapability {
        unit: String,
        capability: Capability,
    },

    #[error("{unit} has no command for '{operation}'")]
    UnsupportedOperation { unit: String, operation: String },

    #[error("malformed reply '{reply}': {reason}")]
    MalformedReply { reply: String, reason: String },

    #[error("checksum mismatch: computed {computed:02X}, transmitted {transmitted:02X}")]
    ChecksumMismatch { computed: u8, transmitted: u8 },

    #[error("expected {expected} sentence, got '{received}'")]
    TagMismatch { expected: String, received: String },

    #[error("receiver reports no position fix")]
    NoFix,

    #[error("unknown EDM mode '{0}'")]
    UnknownEdmMode(String),
}

impl ProtocolError {
    pub(crate) fn malformed(reply: &str, reason: impl Into<String>) -> Self {
        ProtocolError::MalformedReply {
            reply: reply.trim().to_string(),
            reason: reason.into(),
        }
    }
}

/// Invalid angle literal or unit name.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AngleFormatError {
    #[error("invalid DMS literal '{0}', expected D[-MM[-SS]]")]
    InvalidDms(String),

    #[error("unknown angle unit '{0}'")]
    UnknownUnit(String),

    #[error("{unit} angles need a {expected} value")]
    ValueKind {
        unit: &'static str,
        expected: &'static str,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SurveyError::Protocol(ProtocolError::UnsupportedCapability {
            unit: "Trimble 5500".to_string(),
            capability: Capability::Atr,
        });
        assert_eq!(
            err.to_string(),
            "Protocol error: Trimble 5500 does not provide the ATR capability"
        );
    }

    #[test]
    fn test_transport_error_maps_to_state() {
        assert_eq!(TransportError::Timeout.state(), TransportState::Timeout);
        assert_eq!(
            TransportError::FileNotFound("obs.txt".into()).state(),
            TransportState::FileError
        );
        assert_eq!(
            TransportError::SourceUnavailable("/dev/ttyUSB0".into()).state(),
            TransportState::SourceError
        );
    }

    #[test]
    fn test_checksum_display_is_hex() {
        let err = ProtocolError::ChecksumMismatch {
            computed: 0x75,
            transmitted: 0x7A,
        };
        assert_eq!(err.to_string(), "checksum mismatch: computed 75, transmitted 7A");
    }
}

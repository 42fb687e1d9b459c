//! Core library for the rust_survey application.
//!
//! Drives robotic total stations and GNSS receivers over a serial line (or a
//! recorded reply file), decodes their replies into [`measurement::Measurement`]
//! values and runs measurement procedures on top of a single
//! [`session::TotalStation`].
//!
//! Layers, bottom up:
//!
//! - [`angle`]: angle values and unit conversions
//! - [`adapters`]: byte transports
//! - [`instrument`]: vendor command encoders and reply decoders
//! - [`session`]: the instrument session with polling and derived operations
//! - [`procedures`]: horizontal section and prism tracking
//! - [`writer`]: record sinks

pub mod adapters;
pub mod angle;
pub mod config;
pub mod error;
pub mod error_recovery;
pub mod instrument;
pub mod measurement;
pub mod procedures;
pub mod session;
pub mod writer;

pub use angle::{Angle, AngleUnit};
pub use error::{SurveyError, SurveyResult};
pub use session::TotalStation;

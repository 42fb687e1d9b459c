//! Transport implementations
//!
//! This module defines the [`Transport`] trait, the byte-stream abstraction an
//! instrument session talks through, and its implementations:
//!
//! - [`SerialTransport`] for RS-232 instruments (feature `instrument_serial`)
//! - [`ReplayTransport`] replays recorded instrument replies from a file
//! - [`MockTransport`] scripted or closure-driven replies for tests
//!
//! A transport keeps an explicit [`TransportState`]. Any failure moves it out of
//! `Ok` and it stays there until the owner calls [`Transport::reset_state`].

pub mod mock;
pub mod replay;
pub mod serial_adapter;

pub use mock::{MockReply, MockTransport, SentLog};
pub use replay::ReplayTransport;
pub use serial_adapter::SerialTransport;

use crate::error::TransportError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Connection state of a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransportState {
    /// Ready for the next exchange
    Ok,
    /// Last read did not complete in time
    Timeout,
    /// Peer closed the stream or the replay file ran out
    Eof,
    /// Backing file could not be opened
    FileError,
    /// Device or source could not be opened or failed while in use
    SourceError,
}

impl TransportState {
    pub fn is_ok(self) -> bool {
        self == TransportState::Ok
    }
}

/// Line-oriented ASCII byte stream to one instrument.
#[async_trait]
pub trait Transport: Send {
    /// Transport name used in log output
    fn name(&self) -> &str;

    /// Open the underlying source and report the resulting state.
    async fn open(&mut self) -> TransportState;

    /// Write one request line. The transport appends its own line terminator.
    async fn send(&mut self, line: &str) -> Result<(), TransportError>;

    /// Block until one reply is available or the transport times out.
    async fn receive(&mut self) -> Result<String, TransportError>;

    /// Current state
    fn state(&self) -> TransportState;

    /// Return to `Ok` after a soft error.
    fn reset_state(&mut self);

    /// Release the underlying source.
    async fn close(&mut self);
}

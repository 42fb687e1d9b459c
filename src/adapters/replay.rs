//! File replay transport.
//!
//! Reads one instrument reply per line from a text file and hands them out in
//! order, ignoring what was sent. Lets procedures run offline against a
//! recorded session.

use super::{Transport, TransportState};
use crate::error::TransportError;
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tracing::{debug, warn};

pub struct ReplayTransport {
    name: String,
    path: PathBuf,
    lines: Option<Lines<BufReader<File>>>,
    state: TransportState,
}

impl ReplayTransport {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            name: format!("replay:{}", path.display()),
            path,
            lines: None,
            state: TransportState::Ok,
        }
    }

    fn fail(&mut self, err: TransportError) -> TransportError {
        self.state = err.state();
        err
    }
}

#[async_trait]
impl Transport for ReplayTransport {
    fn name(&self) -> &str {
        &self.name
    }

    async fn open(&mut self) -> TransportState {
        match File::open(&self.path).await {
            Ok(file) => {
                self.lines = Some(BufReader::new(file).lines());
                self.state = TransportState::Ok;
                debug!("Replay file '{}' opened", self.path.display());
            }
            Err(e) => {
                warn!("Cannot open replay file '{}': {}", self.path.display(), e);
                self.state = TransportState::FileError;
            }
        }
        self.state
    }

    async fn send(&mut self, line: &str) -> Result<(), TransportError> {
        if !self.state.is_ok() {
            return Err(TransportError::NotReady(self.state));
        }
        debug!("replay <- {}", line);
        Ok(())
    }

    async fn receive(&mut self) -> Result<String, TransportError> {
        if !self.state.is_ok() {
            return Err(TransportError::NotReady(self.state));
        }
        let Some(lines) = self.lines.as_mut() else {
            let err = TransportError::FileNotFound(self.path.display().to_string());
            return Err(self.fail(err));
        };
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim_end_matches('\r').to_string();
                debug!("replay -> {}", line);
                Ok(line)
            }
            Ok(None) => Err(self.fail(TransportError::Eof)),
            Err(e) => {
                let err = TransportError::SourceUnavailable(e.to_string());
                Err(self.fail(err))
            }
        }
    }

    fn state(&self) -> TransportState {
        self.state
    }

    fn reset_state(&mut self) {
        self.state = TransportState::Ok;
    }

    async fn close(&mut self) {
        self.lines = None;
    }
}

//! Scripted transport for tests and demos.
//!
//! `MockTransport` answers each request either from a fixed queue of replies or
//! through a responder closure that sees the request text. Every request line is
//! appended to a shared [`SentLog`] so tests can inspect the wire traffic after
//! the transport has been moved into a session.

use super::{Transport, TransportState};
use crate::error::TransportError;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// What the mock does for one receive call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockReply {
    /// Return this text
    Line(String),
    /// Simulate a read timeout
    Timeout,
    /// Simulate a closed stream
    Eof,
}

impl MockReply {
    pub fn line(text: impl Into<String>) -> Self {
        MockReply::Line(text.into())
    }
}

type Responder = Box<dyn FnMut(&str) -> MockReply + Send>;

/// Shared handle to the requests a [`MockTransport`] has seen.
#[derive(Debug, Clone, Default)]
pub struct SentLog(Arc<Mutex<Vec<String>>>);

impl SentLog {
    fn push(&self, line: &str) {
        self.0
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(line.to_string());
    }

    /// Snapshot of all requests so far.
    pub fn lines(&self) -> Vec<String> {
        self.0
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Number of requests whose text starts with `prefix`.
    pub fn count_prefix(&self, prefix: &str) -> usize {
        self.lines().iter().filter(|l| l.starts_with(prefix)).count()
    }
}

/// Transport backed by a script or a closure.
pub struct MockTransport {
    name: String,
    responder: Responder,
    last_request: String,
    state: TransportState,
    sent: SentLog,
}

impl MockTransport {
    /// Answer every request with `responder(request)`.
    pub fn with_responder<F>(responder: F) -> Self
    where
        F: FnMut(&str) -> MockReply + Send + 'static,
    {
        Self {
            name: "mock".to_string(),
            responder: Box::new(responder),
            last_request: String::new(),
            state: TransportState::Ok,
            sent: SentLog::default(),
        }
    }

    /// Answer requests with the given replies in order; `Eof` once exhausted.
    pub fn scripted<I>(replies: I) -> Self
    where
        I: IntoIterator<Item = MockReply>,
    {
        let mut queue: VecDeque<MockReply> = replies.into_iter().collect();
        Self::with_responder(move |_| queue.pop_front().unwrap_or(MockReply::Eof))
    }

    /// Handle to the request log.
    pub fn sent_log(&self) -> SentLog {
        self.sent.clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn name(&self) -> &str {
        &self.name
    }

    async fn open(&mut self) -> TransportState {
        self.state
    }

    async fn send(&mut self, line: &str) -> Result<(), TransportError> {
        if !self.state.is_ok() {
            return Err(TransportError::NotReady(self.state));
        }
        debug!("mock <- {}", line);
        self.sent.push(line);
        self.last_request = line.to_string();
        Ok(())
    }

    async fn receive(&mut self) -> Result<String, TransportError> {
        if !self.state.is_ok() {
            return Err(TransportError::NotReady(self.state));
        }
        let request = std::mem::take(&mut self.last_request);
        match (self.responder)(&request) {
            MockReply::Line(text) => {
                debug!("mock -> {}", text);
                Ok(text)
            }
            MockReply::Timeout => {
                self.state = TransportState::Timeout;
                Err(TransportError::Timeout)
            }
            MockReply::Eof => {
                self.state = TransportState::Eof;
                Err(TransportError::Eof)
            }
        }
    }

    fn state(&self) -> TransportState {
        self.state
    }

    fn reset_state(&mut self) {
        self.state = TransportState::Ok;
    }

    async fn close(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_replies_in_order() {
        let mut mock = MockTransport::scripted([MockReply::line("a"), MockReply::line("b")]);
        let log = mock.sent_log();

        mock.send("first").await.unwrap();
        assert_eq!(mock.receive().await.unwrap(), "a");
        mock.send("second").await.unwrap();
        assert_eq!(mock.receive().await.unwrap(), "b");
        assert_eq!(log.lines(), vec!["first", "second"]);

        assert_eq!(mock.receive().await, Err(TransportError::Eof));
        assert_eq!(mock.state(), TransportState::Eof);
    }

    #[tokio::test]
    async fn test_error_state_sticks_until_reset() {
        let mut mock = MockTransport::scripted([MockReply::Timeout, MockReply::line("ok")]);
        assert_eq!(mock.receive().await, Err(TransportError::Timeout));
        assert_eq!(
            mock.send("x").await,
            Err(TransportError::NotReady(TransportState::Timeout))
        );
        mock.reset_state();
        mock.send("x").await.unwrap();
        assert_eq!(mock.receive().await.unwrap(), "ok");
    }

    #[tokio::test]
    async fn test_responder_sees_request() {
        let mut mock = MockTransport::with_responder(|req| MockReply::line(req.to_uppercase()));
        mock.send("ping").await.unwrap();
        assert_eq!(mock.receive().await.unwrap(), "PING");
    }
}

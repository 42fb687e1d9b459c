use super::{Transport, TransportState};
use crate::error::TransportError;
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};

#[cfg(feature = "instrument_serial")]
use tokio::io::{AsyncReadExt, AsyncWriteExt};
#[cfg(feature = "instrument_serial")]
use tokio_serial::{SerialPortBuilderExt, SerialStream};

/// Serial transport for RS-232 total stations
///
/// Wraps tokio-serial. Requests get `line_terminator` appended; a reply is
/// everything up to the `end_of_message` byte (`\n` for GeoCOM, `>` for the
/// Trimble prompt), trimmed.
pub struct SerialTransport {
    /// Port name (e.g., "/dev/ttyUSB0", "COM3")
    port_name: String,

    /// Baud rate (e.g., 9600, 19200)
    baud_rate: u32,

    /// Overall read timeout for one reply
    timeout: Duration,

    /// Line terminator for requests
    line_terminator: String,

    /// Byte that ends a reply
    end_of_message: u8,

    state: TransportState,

    #[cfg(feature = "instrument_serial")]
    port: Option<SerialStream>,
}

impl SerialTransport {
    /// Create a new serial transport with GeoCOM defaults
    ///
    /// # Arguments
    /// * `port_name` - Serial port path (e.g., "/dev/ttyUSB0", "COM3")
    /// * `baud_rate` - Communication speed
    pub fn new(port_name: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate,
            timeout: Duration::from_secs(15),
            line_terminator: "\n".to_string(),
            end_of_message: b'\n',
            state: TransportState::Ok,
            #[cfg(feature = "instrument_serial")]
            port: None,
        }
    }

    /// Override the per-reply read timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Override the reply terminator byte.
    pub fn with_end_of_message(mut self, byte: u8) -> Self {
        self.end_of_message = byte;
        self
    }

    fn fail(&mut self, err: TransportError) -> TransportError {
        self.state = err.state();
        err
    }
}

#[async_trait]
impl Transport for SerialTransport {
    fn name(&self) -> &str {
        &self.port_name
    }

    async fn open(&mut self) -> TransportState {
        #[cfg(feature = "instrument_serial")]
        {
            match tokio_serial::new(&self.port_name, self.baud_rate)
                .data_bits(tokio_serial::DataBits::Eight)
                .parity(tokio_serial::Parity::None)
                .stop_bits(tokio_serial::StopBits::One)
                .flow_control(tokio_serial::FlowControl::None)
                .open_native_async()
            {
                Ok(port) => {
                    self.port = Some(port);
                    self.state = TransportState::Ok;
                    debug!(
                        "Serial port '{}' opened at {} baud",
                        self.port_name, self.baud_rate
                    );
                }
                Err(e) => {
                    warn!("Failed to open serial port '{}': {}", self.port_name, e);
                    self.state = TransportState::SourceError;
                }
            }
            self.state
        }

        #[cfg(not(feature = "instrument_serial"))]
        {
            warn!(
                "Serial support not enabled, cannot open '{}' at {} baud. Rebuild with --features instrument_serial",
                self.port_name, self.baud_rate
            );
            self.state = TransportState::SourceError;
            self.state
        }
    }

    async fn send(&mut self, line: &str) -> Result<(), TransportError> {
        if !self.state.is_ok() {
            return Err(TransportError::NotReady(self.state));
        }

        #[cfg(feature = "instrument_serial")]
        {
            let payload = format!("{}{}", line, self.line_terminator);
            let Some(port) = self.port.as_mut() else {
                let err = TransportError::SourceUnavailable(self.port_name.clone());
                return Err(self.fail(err));
            };
            let written = async {
                port.write_all(payload.as_bytes()).await?;
                port.flush().await
            }
            .await;
            if let Err(e) = written {
                let err = TransportError::SourceUnavailable(format!("write failed: {e}"));
                return Err(self.fail(err));
            }
            debug!("Sent serial command: {}", line);
            Ok(())
        }

        #[cfg(not(feature = "instrument_serial"))]
        {
            debug!(
                "Serial support disabled, dropping '{}{}'",
                line,
                self.line_terminator.escape_debug()
            );
            let err = TransportError::SourceUnavailable(self.port_name.clone());
            Err(self.fail(err))
        }
    }

    async fn receive(&mut self) -> Result<String, TransportError> {
        if !self.state.is_ok() {
            return Err(TransportError::NotReady(self.state));
        }

        #[cfg(feature = "instrument_serial")]
        {
            let delimiter = self.end_of_message;
            let timeout = self.timeout;
            let Some(port) = self.port.as_mut() else {
                let err = TransportError::SourceUnavailable(self.port_name.clone());
                return Err(self.fail(err));
            };

            let read = tokio::time::timeout(timeout, async {
                let mut response = Vec::with_capacity(64);
                let mut buffer = [0u8; 1];
                loop {
                    match port.read(&mut buffer).await {
                        Ok(0) => return Err(TransportError::Eof),
                        Ok(_) => {
                            if buffer[0] == delimiter {
                                return Ok(response);
                            }
                            response.push(buffer[0]);
                        }
                        Err(e) if e.kind() == std::io::ErrorKind::TimedOut => continue,
                        Err(e) => return Err(TransportError::SourceUnavailable(e.to_string())),
                    }
                }
            })
            .await;

            match read {
                Ok(Ok(bytes)) => {
                    let response = String::from_utf8_lossy(&bytes).trim().to_string();
                    debug!("Received serial response: {}", response);
                    Ok(response)
                }
                Ok(Err(err)) => Err(self.fail(err)),
                Err(_) => {
                    warn!("Serial read timeout after {:?} on '{}'", timeout, self.port_name);
                    Err(self.fail(TransportError::Timeout))
                }
            }
        }

        #[cfg(not(feature = "instrument_serial"))]
        {
            let _ = (self.timeout, self.end_of_message);
            let err = TransportError::SourceUnavailable(self.port_name.clone());
            Err(self.fail(err))
        }
    }

    fn state(&self) -> TransportState {
        self.state
    }

    fn reset_state(&mut self) {
        self.state = TransportState::Ok;
    }

    async fn close(&mut self) {
        #[cfg(feature = "instrument_serial")]
        {
            if self.port.take().is_some() {
                debug!("Serial port '{}' closed", self.port_name);
            }
        }
    }
}

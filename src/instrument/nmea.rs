//! Passive NMEA 0183 GNSS receiver.
//!
//! Nothing is sent to the receiver: the session listens for the sentence whose
//! tag the command names, and this unit validates and decodes it.

use super::capabilities::NMEA_GNSS;
use super::{Capability, Command, MeasureUnit, Operation, Request};
use crate::angle::{Angle, AngleUnit};
use crate::error::ProtocolError;
use crate::measurement::Measurement;
use tracing::error;

/// Sentence carrying the position fix.
pub const GGA: &str = "GPGGA";

pub struct NmeaGnssUnit {
    name: String,
}

impl NmeaGnssUnit {
    pub fn new() -> Self {
        Self {
            name: "Nmea Gnss".to_string(),
        }
    }
}

impl Default for NmeaGnssUnit {
    fn default() -> Self {
        Self::new()
    }
}

/// XOR of every byte between `$` and `*`.
pub fn checksum(body: &str) -> u8 {
    body.bytes().fold(0, |acc, b| acc ^ b)
}

impl MeasureUnit for NmeaGnssUnit {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> &'static [Capability] {
        NMEA_GNSS
    }

    fn edm_mode(&self, _name: &str) -> Option<i32> {
        None
    }

    fn encode(&mut self, op: &Operation) -> Result<Request, ProtocolError> {
        match op {
            Operation::GnssPosition => Ok(Request::Wire(Command::listen(GGA))),
            _ => Err(self.unsupported(op)),
        }
    }

    fn decode(&self, command: &Command, reply: &str) -> Result<Measurement, ProtocolError> {
        let sentence = reply.trim();
        let tag = command.listen_tag().unwrap_or(GGA);
        let received = sentence
            .strip_prefix('$')
            .and_then(|s| s.split(',').next())
            .unwrap_or_default();
        if received != tag {
            return Err(ProtocolError::TagMismatch {
                expected: tag.to_string(),
                received: sentence.to_string(),
            });
        }

        let (data, transmitted) = sentence
            .split_once('*')
            .ok_or_else(|| ProtocolError::malformed(sentence, "missing checksum"))?;
        let transmitted = u8::from_str_radix(transmitted.trim(), 16)
            .map_err(|_| ProtocolError::malformed(sentence, "checksum is not hex"))?;
        let computed = checksum(&data[1..]);
        if computed != transmitted {
            error!("Checksum error in '{}'", sentence);
            return Err(ProtocolError::ChecksumMismatch {
                computed,
                transmitted,
            });
        }

        let fields: Vec<&str> = data.split(',').collect();
        if tag != GGA {
            return Ok(Measurement::default());
        }
        let field = |index: usize| {
            fields
                .get(index)
                .copied()
                .ok_or_else(|| ProtocolError::malformed(sentence, format!("missing field {index}")))
        };
        let number = |index: usize| -> Result<f64, ProtocolError> {
            let text = field(index)?;
            text.parse()
                .map_err(|_| ProtocolError::malformed(sentence, format!("bad field {index} '{text}'")))
        };

        let quality: u8 = field(6)?
            .parse()
            .map_err(|_| ProtocolError::malformed(sentence, "bad fix quality"))?;
        if quality == 0 {
            return Err(ProtocolError::NoFix);
        }
        let lat_sign = if field(3)? == "N" { 1.0 } else { -1.0 };
        let lon_sign = if field(5)? == "E" { 1.0 } else { -1.0 };
        let nmea = |value: f64| {
            Angle::new(value, AngleUnit::Nmea)
                .map_err(|e| ProtocolError::malformed(sentence, e.to_string()))
        };

        Ok(Measurement {
            latitude: Some(nmea(lat_sign * number(2)?)?),
            longitude: Some(nmea(lon_sign * number(4)?)?),
            quality: Some(quality),
            nsat: Some(number(7)? as u32),
            hdop: Some(number(8)?),
            altitude: Some(number(9)?),
            ..Default::default()
        })
    }
}

//! Flat field/value rows handed to writers.

use super::{Face, Measurement};
use crate::angle::Angle;
use chrono::{DateTime, Local};
use serde::Serialize;

/// One value in a [`Record`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Angle(Angle),
    Float(f64),
    Int(i64),
    Text(String),
    Timestamp(DateTime<Local>),
}

impl From<Angle> for FieldValue {
    fn from(value: Angle) -> Self {
        FieldValue::Angle(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Float(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Int(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

/// Ordered mapping from field name to value.
///
/// Insertion order is kept so writers emit columns in a stable order.
/// Inserting an existing name replaces its value in place.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Record {
    fields: Vec<(String, FieldValue)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record stamped with the current local time under `datetime`.
    pub fn timestamped() -> Self {
        let mut record = Self::new();
        record.insert("datetime", FieldValue::Timestamp(Local::now()));
        record
    }

    pub fn insert(&mut self, name: &str, value: impl Into<FieldValue>) {
        let value = value.into();
        match self.fields.iter_mut().find(|(n, _)| n == name) {
            Some((_, slot)) => *slot = value,
            None => self.fields.push((name.to_string(), value)),
        }
    }

    pub fn insert_opt<V: Into<FieldValue>>(&mut self, name: &str, value: Option<V>) {
        if let Some(value) = value {
            self.insert(name, value);
        }
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// Append every field of a measurement that is present.
    pub fn extend_from(&mut self, m: &Measurement) {
        self.insert_opt("hz", m.hz);
        self.insert_opt("v", m.v);
        self.insert_opt("distance", m.distance);
        self.insert_opt("east", m.east);
        self.insert_opt("north", m.north);
        self.insert_opt("elev", m.elev);
        self.insert_opt("ih", m.instrument_height);
        self.insert_opt("pc", m.pc);
        self.insert_opt("ppm", m.ppm);
        self.insert_opt("latitude", m.latitude);
        self.insert_opt("longitude", m.longitude);
        self.insert_opt("altitude", m.altitude);
        self.insert_opt("quality", m.quality.map(i64::from));
        self.insert_opt("nsat", m.nsat.map(i64::from));
        self.insert_opt("hdop", m.hdop);
        self.insert_opt(
            "face",
            m.face.map(|f| match f {
                Face::Left => "left",
                Face::Right => "right",
            }),
        );
        self.insert_opt("errorCode", m.error_code.map(i64::from));
    }
}

impl From<&Measurement> for Record {
    fn from(m: &Measurement) -> Self {
        let mut record = Record::timestamped();
        record.extend_from(m);
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_keeps_order_and_replaces() {
        let mut r = Record::new();
        r.insert("id", "P1");
        r.insert("hz", Angle::from_gon(10.0));
        r.insert("id", "P2");
        let names: Vec<&str> = r.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["id", "hz"]);
        assert_eq!(r.get("id"), Some(&FieldValue::Text("P2".into())));
    }

    #[test]
    fn test_from_measurement_skips_missing_fields() {
        let m = Measurement {
            hz: Some(Angle::from_gon(1.0)),
            distance: Some(12.5),
            ..Default::default()
        };
        let r = Record::from(&m);
        assert!(r.contains("datetime"));
        assert!(r.contains("hz"));
        assert!(!r.contains("v"));
        assert_eq!(r.get("distance"), Some(&FieldValue::Float(12.5)));
        assert_eq!(r.len(), 3);
    }
}

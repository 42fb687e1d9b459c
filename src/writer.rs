//! Record sinks.
//!
//! A [`Writer`] receives one [`Record`] per observation. Write failures are the
//! writer's own concern: they are logged and swallowed, never returned to the
//! session or the procedure that produced the record.

use crate::angle::AngleUnit;
use crate::measurement::{FieldValue, Record};
use async_trait::async_trait;
use std::io::Write as _;

/// Sink for observation records.
#[async_trait]
pub trait Writer: Send {
    async fn write_record(&mut self, record: &Record);

    /// Flush buffered output. Called once when a run ends.
    async fn finish(&mut self) {}
}

/// How records are rendered to text.
#[derive(Debug, Clone, PartialEq)]
pub struct WriterOptions {
    /// Unit for angle fields
    pub angle_unit: AngleUnit,
    /// Decimals for distances, coordinates and numeric angles
    pub decimals: usize,
    /// chrono format for timestamps
    pub datetime_format: String,
    /// Field separator
    pub separator: char,
    /// Only these fields, in this order; all fields when `None`
    pub filter: Option<Vec<String>>,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            angle_unit: AngleUnit::Gon,
            decimals: 3,
            datetime_format: "%Y-%m-%d %H:%M:%S%.6f".to_string(),
            separator: ';',
            filter: None,
        }
    }
}

impl WriterOptions {
    /// Text form of one value.
    pub fn format(&self, value: &FieldValue) -> String {
        match value {
            FieldValue::Angle(a) => format!("{:.*}", self.decimals + 1, a.as_unit(self.angle_unit)),
            FieldValue::Float(f) => format!("{:.*}", self.decimals, f),
            FieldValue::Int(i) => i.to_string(),
            FieldValue::Text(t) => t.clone(),
            FieldValue::Timestamp(ts) => ts.format(&self.datetime_format).to_string(),
        }
    }

    /// Fields to write, `None` if the filter keeps nothing of this record.
    pub fn columns(&self, record: &Record) -> Option<Vec<(String, String)>> {
        match &self.filter {
            None => Some(
                record
                    .iter()
                    .map(|(name, value)| (name.to_string(), self.format(value)))
                    .collect(),
            ),
            Some(filter) => {
                let kept = filter
                    .iter()
                    .filter(|name| name.as_str() != "datetime" && name.as_str() != "id")
                    .any(|name| record.contains(name));
                kept.then(|| {
                    filter
                        .iter()
                        .map(|name| {
                            let text = record.get(name).map(|v| self.format(v)).unwrap_or_default();
                            (name.clone(), text)
                        })
                        .collect()
                })
            }
        }
    }
}

/// Prints records to stdout as `name=value` pairs.
#[derive(Debug, Default)]
pub struct EchoWriter {
    options: WriterOptions,
}

impl EchoWriter {
    pub fn new(options: WriterOptions) -> Self {
        Self { options }
    }

    /// One output line for `record`, or `None` when it is filtered out.
    pub fn line(&self, record: &Record) -> Option<String> {
        let columns = self.options.columns(record)?;
        let sep = self.options.separator.to_string();
        Some(
            columns
                .iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect::<Vec<_>>()
                .join(&sep),
        )
    }
}

#[async_trait]
impl Writer for EchoWriter {
    async fn write_record(&mut self, record: &Record) {
        if let Some(line) = self.line(record) {
            let mut stdout = std::io::stdout().lock();
            if let Err(e) = writeln!(stdout, "{line}") {
                tracing::warn!("Echo writer failed: {}", e);
            }
        }
    }
}

#[cfg(feature = "storage_csv")]
mod csv_enabled {
    use super::*;
    use std::fs::{File, OpenOptions};
    use std::path::{Path, PathBuf};
    use tracing::{info, warn};

    /// Appends records to a delimited text file.
    ///
    /// With a filter the columns are fixed and a header row is written when
    /// the file is new; without one each row carries the record's own fields.
    pub struct CsvWriter {
        path: PathBuf,
        options: WriterOptions,
        writer: Option<csv::Writer<File>>,
    }

    impl CsvWriter {
        pub fn new(path: impl AsRef<Path>, options: WriterOptions) -> Self {
            Self {
                path: path.as_ref().to_path_buf(),
                options,
                writer: None,
            }
        }

        fn open(&mut self) -> std::io::Result<&mut csv::Writer<File>> {
            if self.writer.is_none() {
                let file = OpenOptions::new().create(true).append(true).open(&self.path)?;
                let is_new = file.metadata()?.len() == 0;
                let mut writer = csv::WriterBuilder::new()
                    .delimiter(self.options.separator as u8)
                    .flexible(true)
                    .from_writer(file);
                if let (true, Some(filter)) = (is_new, &self.options.filter) {
                    writer.write_record(filter)?;
                }
                info!("CSV writer appending to '{}'", self.path.display());
                self.writer = Some(writer);
            }
            self.writer
                .as_mut()
                .ok_or_else(|| std::io::Error::other("CSV writer not open"))
        }
    }

    #[async_trait]
    impl Writer for CsvWriter {
        async fn write_record(&mut self, record: &Record) {
            let Some(columns) = self.options.columns(record) else {
                return;
            };
            let row: Vec<String> = columns.into_iter().map(|(_, value)| value).collect();
            let result = self.open().and_then(|writer| {
                writer.write_record(&row)?;
                writer.flush()
            });
            if let Err(e) = result {
                warn!("Failed to write record to '{}': {}", self.path.display(), e);
            }
        }

        async fn finish(&mut self) {
            if let Some(mut writer) = self.writer.take() {
                if let Err(e) = writer.flush() {
                    warn!("Failed to flush '{}': {}", self.path.display(), e);
                }
            }
        }
    }
}

#[cfg(not(feature = "storage_csv"))]
mod csv_disabled {
    use super::*;
    use std::path::Path;

    /// Placeholder when the `storage_csv` feature is off; drops every record.
    pub struct CsvWriter;

    impl CsvWriter {
        pub fn new(path: impl AsRef<Path>, _options: WriterOptions) -> Self {
            tracing::error!(
                "{}: cannot write '{}'",
                crate::error::SurveyError::FeatureNotEnabled("storage_csv".to_string()),
                path.as_ref().display()
            );
            Self
        }
    }

    #[async_trait]
    impl Writer for CsvWriter {
        async fn write_record(&mut self, _record: &Record) {}
    }
}

#[cfg(feature = "storage_csv")]
pub use csv_enabled::CsvWriter;

#[cfg(not(feature = "storage_csv"))]
pub use csv_disabled::CsvWriter;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::angle::Angle;

    fn sample() -> Record {
        let mut r = Record::new();
        r.insert("id", "P1");
        r.insert("hz", Angle::from_gon(100.0));
        r.insert("distance", 12.34567);
        r
    }

    #[test]
    fn test_echo_line() {
        let echo = EchoWriter::default();
        assert_eq!(
            echo.line(&sample()).unwrap(),
            "id=P1;hz=100.0000;distance=12.346"
        );
    }

    #[test]
    fn test_filter_orders_and_pads() {
        let options = WriterOptions {
            angle_unit: AngleUnit::Deg,
            separator: ',',
            filter: Some(vec!["id".into(), "v".into(), "hz".into()]),
            ..Default::default()
        };
        let echo = EchoWriter::new(options);
        assert_eq!(echo.line(&sample()).unwrap(), "id=P1,v=,hz=90.0000");

        let mut only_id = Record::new();
        only_id.insert("id", "P2");
        assert!(echo.line(&only_id).is_none());
    }

    #[test]
    fn test_dms_angles() {
        let options = WriterOptions {
            angle_unit: AngleUnit::Dms,
            ..Default::default()
        };
        let mut r = Record::new();
        r.insert("hz", Angle::from_deg(10.5));
        assert_eq!(EchoWriter::new(options).line(&r).unwrap(), "hz=10-30-00");
    }

    #[cfg(feature = "storage_csv")]
    #[tokio::test]
    async fn test_csv_appends_with_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("obs.csv");
        let options = WriterOptions {
            filter: Some(vec!["id".into(), "hz".into(), "distance".into()]),
            ..Default::default()
        };

        let mut writer = CsvWriter::new(&path, options.clone());
        writer.write_record(&sample()).await;
        writer.finish().await;

        let mut again = CsvWriter::new(&path, options);
        again.write_record(&sample()).await;
        again.finish().await;

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            text,
            "id;hz;distance\nP1;100.0000;12.346\nP1;100.0000;12.346\n"
        );
    }
}

//! CSV and JSONL export sinks for per-record rows.
//!
//! Rows are `{identifier, datestamp, value}` and are appended
//! immediately; the sinks are never read back. Each sink writes its
//! header (CSV) only when the file is first created, so exports survive
//! resumed runs without duplicating headers.

use std::borrow::Cow;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{HarvesterError, Result};

/// Which side-channel export sinks to write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportMode {
    None,
    Csv,
    Jsonl,
    Both,
}

impl ExportMode {
    pub fn csv_enabled(self) -> bool {
        matches!(self, ExportMode::Csv | ExportMode::Both)
    }

    pub fn jsonl_enabled(self) -> bool {
        matches!(self, ExportMode::Jsonl | ExportMode::Both)
    }
}

impl FromStr for ExportMode {
    type Err = HarvesterError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(ExportMode::None),
            "csv" => Ok(ExportMode::Csv),
            "jsonl" => Ok(ExportMode::Jsonl),
            "both" => Ok(ExportMode::Both),
            other => Err(HarvesterError::InvalidExportMode(other.to_string())),
        }
    }
}

/// Append-only exporter writing `<base>.csv` and/or `<base>.jsonl`.
#[derive(Debug)]
pub struct Exporter {
    field_name: String,
    csv_path: Option<PathBuf>,
    jsonl_path: Option<PathBuf>,
}

impl Exporter {
    /// Create an exporter for the given mode and output base.
    ///
    /// `field_name` labels the third column/key; it defaults to
    /// `edm_field` when no export field was configured.
    pub fn new(mode: ExportMode, base: &Path, field_name: Option<&str>) -> Self {
        let sink_path = |ext: &str| {
            let mut os = base.as_os_str().to_os_string();
            os.push(ext);
            PathBuf::from(os)
        };
        Exporter {
            field_name: field_name.unwrap_or("edm_field").to_string(),
            csv_path: mode.csv_enabled().then(|| sink_path(".csv")),
            jsonl_path: mode.jsonl_enabled().then(|| sink_path(".jsonl")),
        }
    }

    pub fn csv_path(&self) -> Option<&Path> {
        self.csv_path.as_deref()
    }

    pub fn jsonl_path(&self) -> Option<&Path> {
        self.jsonl_path.as_deref()
    }

    /// Append one row to every enabled sink.
    pub fn write_row(&self, identifier: &str, datestamp: &str, value: &str) -> Result<()> {
        if let Some(path) = &self.csv_path {
            let is_new = !path.exists();
            let mut file = OpenOptions::new().append(true).create(true).open(path)?;
            if is_new {
                writeln!(
                    file,
                    "identifier,datestamp,{}",
                    csv_escape(&self.field_name)
                )?;
            }
            writeln!(
                file,
                "{},{},{}",
                csv_escape(identifier),
                csv_escape(datestamp),
                csv_escape(value)
            )?;
        }

        if let Some(path) = &self.jsonl_path {
            let mut row = serde_json::Map::new();
            row.insert("identifier".to_string(), identifier.into());
            row.insert("datestamp".to_string(), datestamp.into());
            row.insert(self.field_name.clone(), value.into());

            let mut file = OpenOptions::new().append(true).create(true).open(path)?;
            writeln!(file, "{}", serde_json::Value::Object(row))?;
        }

        Ok(())
    }
}

/// Quote a CSV field when it contains a delimiter, quote or newline.
fn csv_escape(field: &str) -> Cow<'_, str> {
    if field.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", field.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(field)
    }
}

//! Configuration types, constants and validation functions for the harvester.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;

use crate::error::{HarvesterError, Result};
use crate::export::ExportMode;
use crate::protocol::Verb;

/// HTTP timeout in seconds.
///
/// Set to 30 seconds to accommodate large result pages and slow endpoints.
pub const HTTP_TIMEOUT_SECS: u64 = 30;

/// User agent string identifying this harvester.
pub const USER_AGENT: &str = concat!("oai-harvester/", env!("CARGO_PKG_VERSION"));

/// `Accept` header value preferring XML responses.
pub const ACCEPT_XML: &str = "application/xml, text/xml;q=0.9, */*;q=0.1";

/// `Accept-Encoding` header value; bodies are decompressed explicitly.
pub const ACCEPT_ENCODINGS: &str = "identity, gzip, deflate";

/// Trailing window (bytes) scanned for closing envelope tags when
/// reopening an existing output segment for append.
pub const TAIL_SCAN_WINDOW: u64 = 8192;

/// Emit a progress event every this many harvested items.
pub const PROGRESS_INTERVAL: u64 = 1000;

/// Fixed-name file receiving the last unparsable response body,
/// overwritten on each occurrence.
pub const DUMP_FILE_NAME: &str = "last_response_dump.xml";

/// Default pause between page requests (seconds).
pub const DEFAULT_SLEEP_SECS: f64 = 0.3;

/// Default maximum retry attempts per request.
pub const DEFAULT_RETRIES: u32 = 3;

/// Default backoff multiplier (seconds per attempt number).
pub const DEFAULT_BACKOFF: f64 = 1.5;

/// Date pattern: YYYY-MM-DD.
#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static DATE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("valid regex"));

/// Fully-resolved configuration for one harvest invocation.
///
/// Produced by the CLI layer; the orchestrator treats it as read-only.
#[derive(Debug, Clone)]
pub struct HarvestConfig {
    /// Base URL of the OAI-PMH endpoint.
    pub base_url: String,
    /// OAI-PMH verb to issue.
    pub verb: Verb,
    /// `metadataPrefix` parameter for paginated verbs.
    pub metadata_prefix: Option<String>,
    /// `set` filter for paginated verbs.
    pub set_spec: Option<String>,
    /// Selective-harvesting lower bound (`from`), YYYY-MM-DD.
    pub from_date: Option<String>,
    /// Selective-harvesting upper bound (`until`), YYYY-MM-DD.
    pub until_date: Option<String>,
    /// Path of the (first) output segment, e.g. `out/harvest.xml`.
    pub output_path: PathBuf,
    /// Fixed pause between page requests.
    pub sleep_between: Duration,
    /// Maximum attempts per request.
    pub retries: u32,
    /// Backoff multiplier: wait `backoff * attempt_number` seconds.
    pub backoff: f64,
    /// Stop after this many items (None = unbounded).
    pub max_items: Option<u64>,
    /// Start a new output segment after this many items (None = never).
    pub rotate_every: Option<u64>,
    /// Side-channel export mode.
    pub export: ExportMode,
    /// Qualified field name exported per record (e.g. `edm:isShownAt`).
    pub export_field: Option<String>,
}

impl HarvestConfig {
    /// Validate everything that can be checked before the first request.
    pub fn validate(&self) -> Result<()> {
        validate_base_url(&self.base_url)?;
        if let Some(date) = &self.from_date {
            validate_date(date)?;
        }
        if let Some(date) = &self.until_date {
            validate_date(date)?;
        }
        Ok(())
    }

    /// Output path without its extension; shared by segments, the
    /// checkpoint identity and the export sinks.
    pub fn output_base(&self) -> PathBuf {
        self.output_path.with_extension("")
    }

    /// Output extension including the leading dot (`.xml` if absent).
    pub fn output_ext(&self) -> String {
        match self.output_path.extension() {
            Some(ext) => format!(".{}", ext.to_string_lossy()),
            None => ".xml".to_string(),
        }
    }

    /// Diagnostic dump path: a fixed-name sibling of the output file.
    pub fn dump_path(&self) -> PathBuf {
        self.output_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(DUMP_FILE_NAME)
    }
}

/// Validate an OAI-PMH endpoint URL.
///
/// # Examples
/// ```
/// use oai_harvester::config::validate_base_url;
///
/// assert!(validate_base_url("https://example.org/oai").is_ok());
/// assert!(validate_base_url("not a url").is_err());
/// ```
pub fn validate_base_url(url: &str) -> Result<()> {
    let parsed =
        reqwest::Url::parse(url.trim_end_matches('?')).map_err(|e| HarvesterError::InvalidUrl {
            url: url.to_string(),
            message: e.to_string(),
        })?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(HarvesterError::InvalidUrl {
            url: url.to_string(),
            message: format!("unsupported scheme '{}'", parsed.scheme()),
        });
    }
    Ok(())
}

/// Validate a selective-harvesting date (YYYY-MM-DD).
///
/// # Examples
/// ```
/// use oai_harvester::config::validate_date;
///
/// assert!(validate_date("2025-01-01").is_ok());
/// assert!(validate_date("2025-13-01").is_err()); // Invalid month
/// ```
pub fn validate_date(date_str: &str) -> Result<()> {
    if !DATE_PATTERN.is_match(date_str) {
        return Err(HarvesterError::InvalidDate(date_str.to_string()));
    }

    // Parse and validate it's a real date
    chrono::NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
        .map_err(|_| HarvesterError::InvalidDate(date_str.to_string()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_config() -> HarvestConfig {
        HarvestConfig {
            base_url: "https://example.org/oai".to_string(),
            verb: Verb::ListRecords,
            metadata_prefix: Some("edm".to_string()),
            set_spec: None,
            from_date: None,
            until_date: None,
            output_path: PathBuf::from("out/harvest.xml"),
            sleep_between: Duration::from_millis(300),
            retries: DEFAULT_RETRIES,
            backoff: DEFAULT_BACKOFF,
            max_items: None,
            rotate_every: None,
            export: ExportMode::None,
            export_field: None,
        }
    }

    #[test]
    fn test_validate_base_url_valid() {
        assert!(validate_base_url("http://localhost:8080/oai").is_ok());
        assert!(validate_base_url("https://example.org/api/oai-pmh/").is_ok());
        // Trailing '?' is tolerated, matching the query-string builder
        assert!(validate_base_url("https://example.org/oai?").is_ok());
    }

    #[test]
    fn test_validate_base_url_invalid() {
        assert!(validate_base_url("").is_err());
        assert!(validate_base_url("example.org/oai").is_err());
        assert!(validate_base_url("ftp://example.org/oai").is_err());
    }

    #[test]
    fn test_validate_date_valid() {
        assert!(validate_date("2025-01-01").is_ok());
        assert!(validate_date("2000-06-15").is_ok());
    }

    #[test]
    fn test_validate_date_invalid() {
        assert!(validate_date("").is_err());
        assert!(validate_date("2025/01/01").is_err());
        assert!(validate_date("2025-1-1").is_err());
        assert!(validate_date("2025-02-30").is_err()); // Invalid day
        assert!(validate_date("2025-00-01").is_err()); // Zero month
    }

    #[test]
    fn test_output_base_and_ext() {
        let config = sample_config();
        assert_eq!(config.output_base(), PathBuf::from("out/harvest"));
        assert_eq!(config.output_ext(), ".xml");
    }

    #[test]
    fn test_output_ext_defaults_to_xml() {
        let mut config = sample_config();
        config.output_path = PathBuf::from("out/harvest");
        assert_eq!(config.output_ext(), ".xml");
    }

    #[test]
    fn test_dump_path_is_sibling() {
        let config = sample_config();
        assert_eq!(config.dump_path(), PathBuf::from("out/last_response_dump.xml"));
    }

    #[test]
    fn test_dump_path_bare_filename() {
        let mut config = sample_config();
        config.output_path = PathBuf::from("harvest.xml");
        assert_eq!(config.dump_path(), PathBuf::from("last_response_dump.xml"));
    }

    #[test]
    fn test_validate_rejects_bad_dates() {
        let mut config = sample_config();
        config.from_date = Some("01-01-2025".to_string());
        assert!(config.validate().is_err());
    }
}

//! Error types for the harvester.
//!
//! A single `HarvesterError` enum carries enough context (URL, attempt
//! count, dump path) to diagnose a failed run without re-running it.
//! Transient fetch errors are retried inside the fetch layer and only
//! surface here once retries are exhausted.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for the harvester library.
#[derive(Debug, Error)]
pub enum HarvesterError {
    /// Invalid OAI-PMH endpoint URL.
    #[error("Invalid endpoint URL '{url}': {message}")]
    InvalidUrl { url: String, message: String },

    /// Unknown OAI-PMH verb.
    #[error(
        "Unknown OAI-PMH verb: '{0}'. Expected Identify, ListRecords, \
         ListIdentifiers, ListMetadataFormats or GetRecord"
    )]
    InvalidVerb(String),

    /// Invalid date for a selective-harvesting bound.
    #[error("Invalid date: '{0}'. Expected YYYY-MM-DD (e.g., 2025-01-01)")]
    InvalidDate(String),

    /// Unknown export mode.
    #[error("Unknown export mode: '{0}'. Expected none, csv, jsonl or both")]
    InvalidExportMode(String),

    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// All retry attempts exhausted for a single request.
    #[error("Request failed after {attempts} attempts: {message}")]
    RetriesExhausted { attempts: u32, message: String },

    /// Response body could not be decompressed.
    ///
    /// Distinct from a transport failure: the bytes arrived but cannot
    /// be decoded, so retrying would not help.
    #[error("Failed to decompress {encoding}-encoded response body: {source}")]
    Decompress {
        encoding: String,
        #[source]
        source: std::io::Error,
    },

    /// XML parsing failed.
    #[error("XML parsing failed: {0}")]
    XmlParse(#[from] roxmltree::Error),

    /// XML still unparsable after the single entity-escaping repair pass.
    #[error("Unrepairable XML response: {source}. Raw response dumped to {}", .dump_path.display())]
    MalformedXml {
        #[source]
        source: roxmltree::Error,
        dump_path: PathBuf,
    },

    /// Requested metadataPrefix is not advertised by the server.
    #[error(
        "metadataPrefix '{prefix}' is not advertised by the server. Available: {}",
        if .available.is_empty() { "(none)".to_string() } else { .available.join(", ") }
    )]
    PrefixNotSupported {
        prefix: String,
        available: Vec<String>,
    },

    /// Checkpoint file exists but cannot be read or deserialized.
    #[error("Checkpoint {} is unreadable: {message}", .path.display())]
    CheckpointCorrupt { path: PathBuf, message: String },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Checkpoint (de)serialization error.
    #[error("Checkpoint serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for harvester operations.
pub type Result<T> = std::result::Result<T, HarvesterError>;

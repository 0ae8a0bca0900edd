//! OAI-PMH Harvester - Stream metadata records from a repository to disk.
//!
//! This crate harvests records from OAI-PMH endpoints by following
//! resumption tokens page by page, writing each record verbatim into a
//! wrapped XML file. Runs survive interruption through an on-disk
//! checkpoint, large harvests rotate across numbered output segments,
//! and selected fields can be exported to CSV/JSONL alongside the XML.
//!
//! # Example
//!
//! ```
//! use oai_harvester::config;
//!
//! // Validate endpoint and date bounds before harvesting
//! assert!(config::validate_base_url("https://example.org/oai").is_ok());
//! assert!(config::validate_date("2025-01-01").is_ok());
//! ```
//!
//! # Architecture
//!
//! The harvester is organized into several modules:
//!
//! - [`config`]: Configuration, constants and validation
//! - [`error`]: Error types and Result alias
//! - [`http`]: HTTP fetching with retries and decompression
//! - [`sanitize`]: XML cleanup and single-pass repair
//! - [`protocol`]: OAI-PMH verbs, parameters and page parsing
//! - [`fields`]: Per-record field extraction for export
//! - [`state`]: Checkpointing for resumable runs
//! - [`output`]: Envelope and segment management
//! - [`export`]: CSV/JSONL side-channel export
//! - [`xml`]: XML utilities
//! - [`cli`]: Command-line interface
//! - [`harvester`]: Harvest orchestration

pub mod cli;
pub mod config;
pub mod error;
pub mod export;
pub mod fields;
pub mod harvester;
pub mod http;
pub mod output;
pub mod protocol;
pub mod sanitize;
pub mod state;
pub mod xml;

// Re-export main functions
pub use harvester::{run_harvest, HarvestSummary, ResumeDecision};

// Re-export commonly used items
pub use config::{validate_base_url, validate_date, HarvestConfig};
pub use error::{HarvesterError, Result};
pub use export::ExportMode;
pub use protocol::Verb;

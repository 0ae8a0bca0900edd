//! Durable harvest checkpointing.
//!
//! Progress is persisted to `<output>.state.json` after every page so a
//! run interrupted at any point can resume exactly where it stopped.
//! Saves are atomic with respect to process crash: the state is written
//! to a temporary sibling and renamed into place, so a reader never
//! observes a partially written checkpoint.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{HarvesterError, Result};
use crate::protocol::Verb;

/// Durable snapshot of harvesting progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarvestState {
    pub base_url: String,
    pub verb: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata_prefix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub set_spec: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub until_date: Option<String>,
    /// Output path without extension; part of the checkpoint identity.
    pub output_base: String,
    /// Current segment index, starting at 1.
    pub file_index: u32,
    /// Items written so far across all segments.
    pub item_count: u64,
    /// Opaque server token for the next page; empty when none remains.
    pub resumption_token: String,
}

impl HarvestState {
    /// Whether this checkpoint belongs to the given invocation.
    ///
    /// A checkpoint for a different verb or output target is stale and
    /// must not be resumed.
    pub fn matches(&self, verb: Verb, output_base: &str) -> bool {
        self.verb == verb.as_str() && self.output_base == output_base
    }
}

/// Checkpoint path for an output file: `<output>.state.json`.
pub fn state_path_for(output: &Path) -> PathBuf {
    let mut os = output.as_os_str().to_os_string();
    os.push(".state.json");
    PathBuf::from(os)
}

/// Load a checkpoint; an absent file is not an error.
///
/// A present-but-unreadable checkpoint, or one violating the
/// `file_index >= 1` invariant, is reported as
/// [`HarvesterError::CheckpointCorrupt`]; the caller decides whether to
/// surface or ignore it, the file itself is never deleted here.
pub fn load(path: &Path) -> Result<Option<HarvestState>> {
    if !path.exists() {
        return Ok(None);
    }
    let text = fs::read_to_string(path).map_err(|e| HarvesterError::CheckpointCorrupt {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    let state: HarvestState =
        serde_json::from_str(&text).map_err(|e| HarvesterError::CheckpointCorrupt {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
    if state.file_index == 0 {
        return Err(HarvesterError::CheckpointCorrupt {
            path: path.to_path_buf(),
            message: "file_index must be at least 1".to_string(),
        });
    }
    Ok(Some(state))
}

/// Save a checkpoint via write-to-temp-and-rename.
pub fn save(path: &Path, state: &HarvestState) -> Result<()> {
    let mut tmp_os = path.as_os_str().to_os_string();
    tmp_os.push(".tmp");
    let tmp = PathBuf::from(tmp_os);

    let json = serde_json::to_string_pretty(state)?;
    fs::write(&tmp, json)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Remove a checkpoint; a missing file is fine.
pub fn remove(path: &Path) -> Result<()> {
    if path.exists() {
        fs::remove_file(path)?;
    }
    Ok(())
}

//! Harvest orchestration: preflight, pagination, rotation, resumption
//! and export wiring.
//!
//! The orchestrator owns the page loop and delegates everything else:
//! fetching to [`crate::http`], response cleanup to [`crate::sanitize`],
//! envelope/segment handling to [`crate::output`] and checkpointing to
//! [`crate::state`]. Whatever way a run ends, the current segment is
//! sealed so every file on disk parses as standalone XML.

use std::fs;
use std::path::PathBuf;
use std::thread;

use reqwest::blocking::Client;
use roxmltree::Document;

use crate::config::{HarvestConfig, PROGRESS_INTERVAL};
use crate::error::{HarvesterError, Result};
use crate::export::Exporter;
use crate::http;
use crate::output;
use crate::protocol::{self, Verb};
use crate::sanitize;
use crate::state::{self, HarvestState};

/// Caller's answer when a matching checkpoint is found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeDecision {
    /// Continue from the checkpoint's resumption token.
    Resume,
    /// Discard the checkpoint and overwrite the output.
    StartFresh,
}

/// What a completed run did.
#[derive(Debug, Clone)]
pub struct HarvestSummary {
    pub verb: Verb,
    /// Items written across all segments, including resumed progress.
    pub item_count: u64,
    /// Number of output segments on disk.
    pub segments: u32,
    /// Path of the last segment written.
    pub output_path: PathBuf,
    /// True when the run stopped at the item limit with pages remaining;
    /// the checkpoint is kept so a later run can continue.
    pub limit_reached: bool,
}

/// Run one harvest invocation to completion.
///
/// `decide_resume` is consulted when a checkpoint matching this
/// invocation exists; it is never called otherwise.
pub fn run_harvest(
    config: &HarvestConfig,
    decide_resume: impl FnOnce(&HarvestState) -> ResumeDecision,
) -> Result<HarvestSummary> {
    config.validate()?;
    if let Some(dir) = config.output_path.parent() {
        if !dir.as_os_str().is_empty() {
            fs::create_dir_all(dir)?;
        }
    }

    let client = http::create_client()?;
    preflight(&client, config)?;

    if config.verb.is_paginated() {
        run_paginated(&client, config, decide_resume)
    } else {
        harvest_single(&client, config)
    }
}

/// Identify the repository and check the requested metadataPrefix.
///
/// A failed `Identify` is only a warning. The prefix check runs for
/// paginated verbs with a configured prefix and is fatal when the
/// advertised format list omits the prefix, an empty list included:
/// every harvested page would come back as an error response.
fn preflight(client: &Client, config: &HarvestConfig) -> Result<()> {
    match fetch_verb(client, config, Verb::Identify) {
        Ok(text) => {
            if let Ok(doc) = Document::parse(&text) {
                let info = protocol::identify_info(&doc);
                tracing::info!(
                    repository = info.repository_name.as_deref().unwrap_or("?"),
                    base_url = info.base_url.as_deref().unwrap_or("?"),
                    granularity = info.granularity.as_deref().unwrap_or("?"),
                    earliest = info.earliest_datestamp.as_deref().unwrap_or("?"),
                    "preflight Identify"
                );
            }
        }
        Err(e) => tracing::warn!(error = %e, "preflight Identify failed"),
    }

    let prefix = match (&config.metadata_prefix, config.verb.is_paginated()) {
        (Some(prefix), true) => prefix,
        _ => return Ok(()),
    };

    let text = fetch_verb(client, config, Verb::ListMetadataFormats)?;
    let doc = Document::parse(&text)?;
    let available = protocol::metadata_prefixes(&doc);
    tracing::info!(prefixes = ?available, "preflight ListMetadataFormats");
    if !available.iter().any(|p| p == prefix) {
        return Err(HarvesterError::PrefixNotSupported {
            prefix: prefix.clone(),
            available,
        });
    }
    Ok(())
}

/// One-shot verbs: archive the whole response inside the envelope.
fn harvest_single(client: &Client, config: &HarvestConfig) -> Result<HarvestSummary> {
    let text = fetch_verb(client, config, config.verb)?;
    let doc = Document::parse(&text)?;

    let body = &text[doc.root_element().range()];
    let content = format!(
        "{}{body}\n{}",
        output::open_tag(config.verb),
        output::close_tag(config.verb)
    );
    fs::write(&config.output_path, content)?;
    state::remove(&state::state_path_for(&config.output_path))?;

    tracing::info!(
        verb = %config.verb,
        path = %config.output_path.display(),
        "response archived"
    );
    Ok(HarvestSummary {
        verb: config.verb,
        item_count: 0,
        segments: 1,
        output_path: config.output_path.clone(),
        limit_reached: false,
    })
}

/// Mutable cursor over the paginated run: checkpoint plus the open
/// segment it is writing into.
struct Paging {
    state: HarvestState,
    current: PathBuf,
    items_in_segment: u64,
    base: PathBuf,
    ext: String,
}

fn run_paginated(
    client: &Client,
    config: &HarvestConfig,
    decide_resume: impl FnOnce(&HarvestState) -> ResumeDecision,
) -> Result<HarvestSummary> {
    let state_path = state::state_path_for(&config.output_path);
    let base = config.output_base();
    let ext = config.output_ext();
    let output_base = base.to_string_lossy().into_owned();

    let resumed = match state::load(&state_path) {
        Ok(Some(existing)) if existing.matches(config.verb, &output_base) => {
            match decide_resume(&existing) {
                ResumeDecision::Resume => {
                    tracing::info!(
                        items = existing.item_count,
                        segment = existing.file_index,
                        "resuming from checkpoint"
                    );
                    Some(existing)
                }
                ResumeDecision::StartFresh => {
                    tracing::info!("discarding checkpoint, overwriting output");
                    state::remove(&state_path)?;
                    fs::write(output::segment_path(&base, &ext, 1), "")?;
                    None
                }
            }
        }
        Ok(Some(existing)) => {
            tracing::warn!(
                checkpoint_verb = %existing.verb,
                checkpoint_output = %existing.output_base,
                "checkpoint belongs to a different harvest, starting fresh"
            );
            None
        }
        Ok(None) => None,
        Err(e) => {
            tracing::warn!(error = %e, "checkpoint unreadable, starting fresh");
            None
        }
    };

    let state = match resumed {
        Some(state) => state,
        None => {
            let fresh = HarvestState {
                base_url: config.base_url.clone(),
                verb: config.verb.as_str().to_string(),
                metadata_prefix: config.metadata_prefix.clone(),
                set_spec: config.set_spec.clone(),
                from_date: config.from_date.clone(),
                until_date: config.until_date.clone(),
                output_base,
                file_index: 1,
                item_count: 0,
                resumption_token: String::new(),
            };
            state::save(&state_path, &fresh)?;
            fresh
        }
    };

    // file_index >= 1 is guaranteed by state::load
    let items_in_segment = match config.rotate_every {
        Some(every) => state
            .item_count
            .saturating_sub(u64::from(state.file_index - 1).saturating_mul(every)),
        None => state.item_count,
    };
    let current = output::segment_path(&base, &ext, state.file_index);
    output::ensure_open(&current, config.verb)?;

    let exporter = Exporter::new(config.export, &base, config.export_field.as_deref());
    let mut paging = Paging {
        state,
        current,
        items_in_segment,
        base,
        ext,
    };

    let result = run_pages(client, config, &mut paging, &state_path, &exporter);

    match result {
        Ok(limit_reached) => {
            output::seal(&paging.current, config.verb)?;
            if !limit_reached {
                state::remove(&state_path)?;
            }
            tracing::info!(
                items = paging.state.item_count,
                segments = paging.state.file_index,
                last_segment = %paging.current.display(),
                "harvest finished"
            );
            Ok(HarvestSummary {
                verb: config.verb,
                item_count: paging.state.item_count,
                segments: paging.state.file_index,
                output_path: paging.current,
                limit_reached,
            })
        }
        Err(e) => {
            // Seal so the partial segment still parses; the checkpoint
            // already points at the page to refetch.
            if let Err(seal_err) = output::seal(&paging.current, config.verb) {
                tracing::warn!(
                    error = %seal_err,
                    path = %paging.current.display(),
                    "failed to seal segment after error"
                );
            }
            Err(e)
        }
    }
}

/// The page loop. Returns `Ok(true)` when the item limit stopped the
/// run with a resumption token outstanding.
fn run_pages(
    client: &Client,
    config: &HarvestConfig,
    paging: &mut Paging,
    state_path: &std::path::Path,
    exporter: &Exporter,
) -> Result<bool> {
    let mut page_no = 0u64;

    loop {
        if let Some(max) = config.max_items {
            if paging.state.item_count >= max {
                tracing::info!(max, "item limit reached, stopping");
                return Ok(!paging.state.resumption_token.is_empty());
            }
        }

        page_no += 1;
        let params = if paging.state.resumption_token.is_empty() {
            protocol::first_call_params(
                config.verb,
                config.metadata_prefix.as_deref(),
                config.set_spec.as_deref(),
                config.from_date.as_deref(),
                config.until_date.as_deref(),
            )
        } else {
            protocol::token_params(config.verb, &paging.state.resumption_token)
        };
        let url = protocol::build_url(&config.base_url, &params)?;
        let text = fetch_document(client, url.as_str(), config)?;
        let doc = Document::parse(&text)?;
        let page = protocol::extract_page(&doc, &text, config.verb, config.export_field.as_deref());

        let mut limit_hit = false;
        for item in &page.items {
            if let Some(max) = config.max_items {
                if paging.state.item_count >= max {
                    limit_hit = true;
                    break;
                }
            }
            if let Some(every) = config.rotate_every {
                if paging.items_in_segment >= every {
                    rotate(paging, config.verb)?;
                }
            }
            output::append_element(&paging.current, &item.xml)?;
            exporter.write_row(&item.identifier, &item.datestamp, &item.field_value)?;
            paging.state.item_count += 1;
            paging.items_in_segment += 1;
            if paging.state.item_count % PROGRESS_INTERVAL == 0 {
                tracing::info!(items = paging.state.item_count, "progress");
            }
        }

        tracing::info!(
            page = page_no,
            items = page.items.len(),
            total = paging.state.item_count,
            token = page.resumption_token.is_some(),
            "page processed"
        );

        if limit_hit {
            // The checkpoint keeps the token that produced this page,
            // so resuming refetches it rather than skipping items.
            state::save(state_path, &paging.state)?;
            return Ok(true);
        }

        match page.resumption_token {
            Some(token) => {
                paging.state.resumption_token = token;
                state::save(state_path, &paging.state)?;
                thread::sleep(config.sleep_between);
            }
            None => return Ok(false),
        }
    }
}

/// Seal the full segment and open the next one.
fn rotate(paging: &mut Paging, verb: Verb) -> Result<()> {
    output::seal(&paging.current, verb)?;
    paging.state.file_index += 1;
    paging.items_in_segment = 0;
    paging.current = output::segment_path(&paging.base, &paging.ext, paging.state.file_index);
    output::ensure_open(&paging.current, verb)?;
    tracing::info!(segment = %paging.current.display(), "rotated to new segment");
    Ok(())
}

/// Fetch a URL and return sanitized text that is guaranteed to parse.
fn fetch_document(client: &Client, url: &str, config: &HarvestConfig) -> Result<String> {
    tracing::info!(%url, "requesting");
    let (body, _content_type) = http::fetch(client, url, config.retries, config.backoff)?;
    let raw = String::from_utf8_lossy(&body);
    sanitize::sanitize_for_parse(&raw, &config.dump_path())
}

/// Build and fetch a bare single-verb request (preflight and one-shot
/// verbs).
fn fetch_verb(client: &Client, config: &HarvestConfig, verb: Verb) -> Result<String> {
    let params = protocol::first_call_params(verb, None, None, None, None);
    let url = protocol::build_url(&config.base_url, &params)?;
    fetch_document(client, url.as_str(), config)
}

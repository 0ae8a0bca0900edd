//! Command-line interface for the harvester.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::config::{HarvestConfig, DEFAULT_BACKOFF, DEFAULT_RETRIES, DEFAULT_SLEEP_SECS};
use crate::error::Result;
use crate::export::ExportMode;
use crate::harvester::{run_harvest, HarvestSummary, ResumeDecision};
use crate::protocol::Verb;
use crate::state::HarvestState;

/// OAI-PMH Harvester - Stream metadata records from a repository to disk.
#[derive(Parser)]
#[command(name = "oai-harvester")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Harvest records from an OAI-PMH endpoint.
    Harvest {
        /// Base URL of the endpoint (e.g., https://example.org/api/oai-pmh/)
        url: String,

        /// OAI-PMH verb (e.g., ListRecords, ListIdentifiers, Identify)
        #[arg(short, long, default_value = "ListRecords")]
        verb: String,

        /// metadataPrefix parameter (e.g., edm, oai_dc)
        #[arg(short, long)]
        prefix: Option<String>,

        /// set= filter (e.g., amsterdam-museum)
        #[arg(short, long)]
        set: Option<String>,

        /// Selective harvesting lower bound, YYYY-MM-DD
        #[arg(long)]
        from: Option<String>,

        /// Selective harvesting upper bound, YYYY-MM-DD
        #[arg(long)]
        until: Option<String>,

        /// Output file (default: <verb>_<set>.xml)
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Pause between page requests in seconds
        #[arg(long, default_value_t = DEFAULT_SLEEP_SECS)]
        sleep: f64,

        /// Maximum attempts per request
        #[arg(long, default_value_t = DEFAULT_RETRIES)]
        retries: u32,

        /// Backoff multiplier in seconds per attempt
        #[arg(long, default_value_t = DEFAULT_BACKOFF)]
        backoff: f64,

        /// Stop after this many items
        #[arg(long)]
        max_items: Option<u64>,

        /// Start a new output file after this many items
        #[arg(long)]
        rotate_every: Option<u64>,

        /// Extra flat export next to the XML: none, csv, jsonl or both
        #[arg(long, default_value = "none")]
        export: String,

        /// Field exported per record (default: edm:isShownAt)
        #[arg(long)]
        export_field: Option<String>,

        /// Resume from an existing checkpoint without asking
        #[arg(short = 'y', long)]
        yes: bool,
    },
}

/// Run the CLI.
pub fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Harvest {
            url,
            verb,
            prefix,
            set,
            from,
            until,
            out,
            sleep,
            retries,
            backoff,
            max_items,
            rotate_every,
            export,
            export_field,
            yes,
        } => {
            let verb: Verb = verb.parse()?;
            let export: ExportMode = export.parse()?;

            let export_field = match (export, export_field) {
                (ExportMode::None, field) => field,
                (_, Some(field)) => Some(field),
                (_, None) => Some("edm:isShownAt".to_string()),
            };

            let output_path = out.unwrap_or_else(|| default_output_name(verb, set.as_deref()));

            let config = HarvestConfig {
                base_url: url,
                verb,
                metadata_prefix: prefix,
                set_spec: set,
                from_date: from,
                until_date: until,
                output_path,
                sleep_between: Duration::from_secs_f64(sleep.max(0.0)),
                retries,
                backoff,
                max_items,
                rotate_every,
                export,
                export_field,
            };
            harvest_command(&config, yes)
        }
    }
}

/// Default output file name: `<verb>_<set>.xml`.
fn default_output_name(verb: Verb, set_spec: Option<&str>) -> PathBuf {
    PathBuf::from(format!(
        "{}_{}.xml",
        verb.as_str().to_lowercase(),
        set_spec.unwrap_or("all")
    ))
}

/// Execute the harvest command.
fn harvest_command(config: &HarvestConfig, assume_yes: bool) -> Result<()> {
    config.validate()?;

    println!(
        "{} {} from {}",
        style("Harvesting").bold(),
        style(config.verb).cyan(),
        style(&config.base_url).green()
    );
    if let Some(set) = &config.set_spec {
        println!("  Set: {set}");
    }
    if let Some(prefix) = &config.metadata_prefix {
        println!("  Prefix: {prefix}");
    }
    println!("  Output: {}", config.output_path.display());
    println!();

    let pb = ProgressBar::new_spinner();
    #[allow(clippy::expect_used)] // Static template string that is guaranteed to be valid
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .expect("valid template"),
    );
    pb.set_message("Harvesting...");
    pb.enable_steady_tick(Duration::from_millis(100));

    let summary = match run_harvest(config, |state| {
        pb.suspend(|| confirm_resume(state, assume_yes))
    }) {
        Ok(summary) => summary,
        Err(e) => {
            pb.finish_and_clear();
            return Err(e);
        }
    };

    pb.finish_and_clear();
    print_summary(&summary);
    Ok(())
}

/// Ask whether to continue from a found checkpoint (default: yes).
fn confirm_resume(state: &HarvestState, assume_yes: bool) -> ResumeDecision {
    println!(
        "{} {} items harvested, segment {}, token {}",
        style("Found checkpoint:").yellow().bold(),
        state.item_count,
        state.file_index,
        if state.resumption_token.is_empty() {
            "absent"
        } else {
            "present"
        }
    );
    if assume_yes {
        println!("Resuming (--yes).");
        return ResumeDecision::Resume;
    }

    print!("Resume from checkpoint? (Y/n): ");
    let mut answer = String::new();
    if io::stdout().flush().is_err() || io::stdin().lock().read_line(&mut answer).is_err() {
        return ResumeDecision::Resume;
    }
    match answer.trim().to_lowercase().as_str() {
        "" | "y" | "yes" => ResumeDecision::Resume,
        _ => ResumeDecision::StartFresh,
    }
}

fn print_summary(summary: &HarvestSummary) {
    if summary.limit_reached {
        println!(
            "{} checkpoint kept, run again to continue",
            style("Item limit reached:").yellow().bold()
        );
    }
    println!(
        "{} {} items in {} file(s)",
        style("Done:").green().bold(),
        summary.item_count,
        summary.segments
    );
    println!("  Last file: {}", summary.output_path.display());
}

// src/main.rs
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::{env, fs, path::PathBuf};
use tracing::info;
use tracing_subscriber::FmtSubscriber;

mod cell;
mod engine;
mod filler;
mod loader;
mod lookup;
mod record;
mod reference;


use engine::calculate_fields;
use filler::fill_empty_cells;
use loader::{load_dataset, load_reference_dir, write_dataset};
use record::Record;
use reference::SnapshotCache;

/// Fallback for `--workbook`, usually set from `.env`.
const WORKBOOK_DIR_ENV: &str = "MANCOST_WORKBOOK_DIR";

#[derive(Parser)]
#[command(
    name = "mancost",
    version,
    about = "Derives man-hour billing/cost fields and repairs half-filled workbook exports"
)]
struct Cli {
    /// Directory with the exported reference sheets: info.csv,
    /// hourly_rates.csv and (optionally) summary.csv.
    #[arg(long)]
    workbook: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fill the empty derived-field cells of a dataset CSV and write the
    /// repaired copy. Existing values are never overwritten.
    Fill {
        /// Dataset CSV (first row = headers).
        input: PathBuf,
        /// Where to write the repaired dataset.
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Derive all fields for a single record given as a JSON object of
    /// header -> value; prints the augmented record and the fields that
    /// still need manual entry.
    Calc {
        /// Record file (JSON object).
        record: PathBuf,
    },
    /// Look up a person by name in the rates sheet.
    Person { name: String },
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Setting tracing subscriber failed")?;

    let cli = Cli::parse();

    let workbook_dir = match cli.workbook {
        Some(dir) => dir,
        None => env::var(WORKBOOK_DIR_ENV)
            .map(PathBuf::from)
            .with_context(|| {
                format!(
                    "No reference workbook: pass --workbook or set {}",
                    WORKBOOK_DIR_ENV
                )
            })?,
    };

    // One resident snapshot per source identity; pointing at a different
    // directory swaps the whole snapshot.
    let cache = SnapshotCache::new();
    let source_id = workbook_dir.display().to_string();
    let refs = cache
        .get_or_load(&source_id, || load_reference_dir(&workbook_dir))
        .context("Loading reference workbook failed")?;

    match cli.command {
        Command::Fill { input, output } => {
            let table = load_dataset(&input).context("Loading dataset failed")?;
            let (filled, fill_summary) = fill_empty_cells(&table, &refs);
            write_dataset(&filled, &output).context("Writing repaired dataset failed")?;
            info!(
                input = %input.display(),
                output = %output.display(),
                cells_filled = fill_summary.cells_filled,
                flags_normalized = fill_summary.flags_normalized,
                "dataset repaired"
            );
        }
        Command::Calc { record } => {
            let raw = fs::read_to_string(&record)
                .with_context(|| format!("Reading record file '{}' failed", record.display()))?;
            let input: Record = serde_json::from_str(&raw)
                .context("Record file is not a JSON object of header -> value")?;
            let outcome = calculate_fields(&input, &refs);
            let rendered = serde_json::json!({
                "record": outcome.record,
                "not_available": outcome.unresolved,
            });
            println!("{}", serde_json::to_string_pretty(&rendered)?);
        }
        Command::Person { name } => match refs.person_info(&name) {
            Some(person) => println!("{}", serde_json::to_string_pretty(&person)?),
            None => bail!("Person '{}' not found in the rates sheet", name),
        },
    }

    Ok(())
}

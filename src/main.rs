use anyhow::Context;
use chrono::{Duration as ChronoDuration, Local, NaiveDate};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use spd_cleaner::config::Config;
use spd_cleaner::feed::{
    fetch_with_fallback, CsvDownloadSource, FileSource, ODataSource, RecordSource, SocrataSource,
};
use spd_cleaner::logging;
use spd_cleaner::pipeline::output::{write_audit_csv, write_records_csv, write_timings_csv};
use spd_cleaner::pipeline::{CleaningOutcome, CleaningPipeline};
use spd_cleaner::reference::ReferenceTables;
use spd_cleaner::store::CrimeStore;
use spd_cleaner::types::RawRecord;

#[derive(Parser)]
#[command(name = "spd_cleaner")]
#[command(about = "Seattle Police Department crime feed cleaner")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Clean a local feed snapshot (.csv or .json) and write the results as CSV
    Clean {
        #[arg(long)]
        input: PathBuf,
        /// Directory for clean.csv, audit.csv and stage_timings.csv
        #[arg(long, default_value = "output")]
        output: PathBuf,
    },
    /// Retrieve the feed and save it as JSON
    Fetch {
        /// First report date to retrieve (yyyy-mm-dd); defaults to yesterday
        #[arg(long)]
        since: Option<NaiveDate>,
        #[arg(long, default_value = "output/feed.json")]
        output: PathBuf,
    },
    /// Fetch, clean, purge expired rows and load into SQLite
    Run {
        #[arg(long)]
        since: Option<NaiveDate>,
    },
}

fn yesterday() -> NaiveDate {
    Local::now().date_naive() - ChronoDuration::days(1)
}

fn build_pipeline(config: &Config) -> anyhow::Result<CleaningPipeline> {
    let (loc, mcpp) = config.reference_paths()?;
    let tables = ReferenceTables::load(loc, mcpp).context("loading reference tables")?;
    Ok(CleaningPipeline::new(Arc::new(tables), config.fuzzy.clone()))
}

async fn fetch_feed(config: &Config, since: NaiveDate) -> anyhow::Result<Vec<RawRecord>> {
    let sources: Vec<Box<dyn RecordSource>> = vec![
        Box::new(SocrataSource::new(&config.feed, since)?),
        Box::new(ODataSource::new(&config.feed, since)?),
        Box::new(CsvDownloadSource::new(&config.feed)?),
    ];
    let records = fetch_with_fallback(&sources, config.feed.max_retries, Duration::from_secs(2)).await?;
    Ok(records)
}

fn print_summary(outcome: &CleaningOutcome) {
    println!("\n📊 Cleaning run {}:", outcome.run_id);
    println!("   Records out: {}", outcome.records.len());
    println!("   Audited values: {}", outcome.ledger.len());
    for (reason, count) in outcome.ledger.count_by_reason() {
        println!("   - [{}] {}: {}", reason.id(), reason.label(), count);
    }
}

fn write_outputs(outcome: &CleaningOutcome, dir: &Path) -> anyhow::Result<()> {
    write_records_csv(&dir.join("clean.csv"), &outcome.records)?;
    write_audit_csv(&dir.join("audit.csv"), &outcome.ledger)?;
    write_timings_csv(&dir.join("stage_timings.csv"), &outcome.timings)?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init_logging();

    let cli = Cli::parse();
    let config = Config::load().context("loading configuration")?;

    match cli.command {
        Commands::Clean { input, output } => {
            println!("🧹 Cleaning {}...", input.display());
            let pipeline = build_pipeline(&config)?;
            let raw = FileSource::new(&input)
                .read()
                .with_context(|| format!("reading {}", input.display()))?;
            let outcome = pipeline.run(raw);
            write_outputs(&outcome, &output)?;
            print_summary(&outcome);
            println!("✅ Wrote results to {}", output.display());
        }
        Commands::Fetch { since, output } => {
            let since = since.unwrap_or_else(yesterday);
            println!("📡 Fetching crimes reported since {}...", since);
            let records = fetch_feed(&config, since).await?;
            if let Some(parent) = output.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = std::fs::File::create(&output)?;
            serde_json::to_writer(std::io::BufWriter::new(file), &records)?;
            println!("✅ Saved {} records to {}", records.len(), output.display());
        }
        Commands::Run { since } => {
            let since = since.unwrap_or_else(yesterday);
            let pipeline = build_pipeline(&config)?;
            println!("📡 Fetching crimes reported since {}...", since);
            let raw = fetch_feed(&config, since).await?;

            println!("🧹 Cleaning {} records...", raw.len());
            let outcome = pipeline.run(raw);
            print_summary(&outcome);

            let mut store = CrimeStore::open(&config.store.db_path)
                .with_context(|| format!("opening {}", config.store.db_path.display()))?;
            let purged = store.purge_expired(Local::now().date_naive(), config.store.retention_days)?;
            let summary = store.load(&outcome)?;
            info!(purged, records = summary.records, "Run complete");
            println!(
                "✅ Purged {} expired crimes, loaded {} records and {} audit values",
                purged, summary.records, summary.audit_values
            );
        }
    }

    Ok(())
}

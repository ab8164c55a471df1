//! Loghound - Binary Entry Point
//!
//! `loghound ingest <file>` appends a file's lines as events,
//! `loghound search <terms>...` runs a search job and prints its result.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime, Utc};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use loghound::config::{resolve, RawConfig, Settings};
use loghound::types::{NewEvent, Query, TimeRange};
use loghound::{EventStore, JobManager};

/// Lines per `add_batch` call during ingestion
const INGEST_BATCH_SIZE: usize = 1000;

#[derive(Parser)]
#[command(name = "loghound", version, about = "Log event store and search jobs")]
struct Cli {
    /// JSON configuration file
    #[arg(long, short)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Append every line of a file as an event
    Ingest {
        file: PathBuf,
        /// Host recorded on each event
        #[arg(long, default_value = "localhost")]
        host: String,
        /// Source recorded on each event (defaults to the file path)
        #[arg(long)]
        source: Option<String>,
    },
    /// Run a search job and print its stats and newest matches
    Search {
        /// Keywords every matching event must contain
        terms: Vec<String>,
        /// Exclude events containing this text
        #[arg(long)]
        not: Vec<String>,
        /// Only events from this host
        #[arg(long)]
        host: Vec<String>,
        /// Only events from this source
        #[arg(long)]
        source: Vec<String>,
        /// Only events from the last N minutes
        #[arg(long)]
        last_minutes: Option<i64>,
        /// Number of matched events to print
        #[arg(long, default_value_t = 10)]
        show: usize,
    },
    /// Print store statistics
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = match &cli.config {
        Some(path) => Settings::from_path(path)?,
        None => resolve(RawConfig::default())?,
    };
    let store = Arc::new(EventStore::open(&settings.store)?);

    match cli.command {
        Command::Ingest { file, host, source } => {
            let source = source.unwrap_or_else(|| file.display().to_string());
            ingest(&store, &file, &host, &source)?;
        }
        Command::Search {
            terms,
            not,
            host,
            source,
            last_minutes,
            show,
        } => {
            let mut query = Query::keywords(&terms.join(" "));
            query.not_fragments = not;
            query.hosts = host;
            query.sources = source;
            let range = match last_minutes {
                Some(minutes) => TimeRange::last(chrono::Duration::minutes(minutes)),
                None => TimeRange::all(),
            };

            let manager = Arc::new(JobManager::new(
                store,
                Arc::new(settings.extractor),
                settings.jobs,
            ));
            let job = manager.create_job(query, range);

            let on_interrupt = Arc::clone(&manager);
            let job_id = job.id;
            ctrlc::set_handler(move || {
                let _ = on_interrupt.abort_job(job_id);
            })?;

            let snapshot = manager.wait_for(job.id).await?;
            println!("{}", serde_json::to_string_pretty(&snapshot)?);

            let results = manager.get_results(job.id, 0, show)?;
            for event in &results.events {
                println!(
                    "{} {} {} {}",
                    event.timestamp.to_rfc3339(),
                    event.host,
                    event.source,
                    event.raw
                );
            }
            for corruption in &results.corrupted {
                warn!(id = corruption.id, reason = %corruption.reason, "Matched event could not be read");
            }
        }
        Command::Stats => {
            let stats = store.stats();
            println!("location:       {}", stats.location);
            println!("rows:           {}", stats.rows);
            println!("indexed rows:   {}", stats.indexed_rows);
            println!("unique tokens:  {}", stats.unique_tokens);
            println!("next id:        {}", stats.next_id);
            println!("log bytes:      {}", stats.log_bytes);
            println!("codec:          {}", stats.codec);
            println!("write strategy: {:?}", stats.write_strategy);
        }
    }

    Ok(())
}

fn ingest(store: &EventStore, file: &Path, host: &str, source: &str) -> anyhow::Result<()> {
    let mut reader = BufReader::new(File::open(file)?);
    let mut batch = Vec::with_capacity(INGEST_BATCH_SIZE);
    let mut offset: i64 = 0;
    let mut total = 0;
    let mut line = String::new();

    loop {
        line.clear();
        let read = reader.read_line(&mut line)?;
        if read == 0 {
            break;
        }

        let raw = line.trim_end_matches(['\r', '\n']);
        if !raw.is_empty() {
            let event = NewEvent::new(raw, host, source).with_offset(offset);
            let event = match parse_timestamp(raw) {
                Some(ts) => event.with_timestamp(ts),
                None => event,
            };
            batch.push(event);
        }
        offset += read as i64;

        if batch.len() >= INGEST_BATCH_SIZE {
            total += store.add_batch(&batch)?.len();
            batch.clear();
        }
    }
    total += store.add_batch(&batch)?.len();

    info!(events = total, file = %file.display(), "Ingest complete");
    Ok(())
}

/// Leading `YYYY/MM/DD HH:MM:SS.ffffff` timestamp, if present
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let prefix = raw.get(..26)?;
    NaiveDateTime::parse_from_str(prefix, "%Y/%m/%d %H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

//! Loghound - log aggregation core
//!
//! Durable event storage with keyword search, and asynchronous search jobs
//! that aggregate fields extracted from matching events.
//!
//! # Features
//!
//! - **Batched ingestion**: all-or-nothing or row-by-row durable appends
//! - **Optional compression**: zlib codec fixed per store
//! - **Keyword index**: posting-list intersection, resumable chunked scans
//! - **Field extraction**: ordered regex rules, first rule wins
//! - **Search jobs**: live progress and field statistics, cooperative abort
//!
//! # Modules
//!
//! - `types`: Core data structures (Event, Query, Job, JobStats)
//! - `codec`: Stored-form encoding of raw text
//! - `event_store`: Append-only event log with token index
//! - `search`: Token index and tokenizer
//! - `extract`: Regex field extraction
//! - `jobs`: Job manager and search pipeline
//! - `config`: JSON configuration and defaults
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use loghound::{EventStore, EventStoreConfig, FieldExtractor, JobManager, JobSettings};
//! use loghound::types::{NewEvent, Query, TimeRange};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(EventStore::open(&EventStoreConfig::in_memory())?);
//!     store.add_batch(&[NewEvent::new("level=error code=500", "web-1", "app.log")])?;
//!
//!     let extractor = Arc::new(FieldExtractor::new(&[r"(\w+)=(\w+)"])?);
//!     let manager = JobManager::new(store, extractor, JobSettings::default());
//!
//!     let job = manager.create_job(Query::keywords("error"), TimeRange::all());
//!     let done = manager.wait_for(job.id).await?;
//!     println!("{} matches", done.stats.num_matched_events);
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod config;
pub mod event_store;
pub mod extract;
pub mod jobs;
pub mod search;
pub mod types;

// Re-export commonly used items at crate root
pub use codec::{Codec, CodecKind};
pub use config::{resolve, ConfigError, RawConfig, Settings};
pub use event_store::{
    DataCorruption, EventBatch, EventSource, EventStore, EventStoreConfig, StoreError,
    WriteStrategy,
};
pub use extract::FieldExtractor;
pub use jobs::{JobError, JobManager, JobSettings};
pub use types::{
    Event, Fields, Job, JobSnapshot, JobState, JobStats, NewEvent, Query, SortMode, TimeRange,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

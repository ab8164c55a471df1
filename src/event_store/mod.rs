//! Event Store Module
//!
//! This module provides the storage engine for log events:
//! - `EventStore`: durable batched ingestion, id lookup, keyword scans
//! - `LogMedium`: the durable byte log underneath (file or memory)
//! - `EventScan` / `EventSource`: the read contract the job engine uses
//!
//! # Architecture
//!
//! ```text
//! Write Path:
//! ┌───────────┐    ┌──────────────┐    ┌─────────────────┐    ┌───────────────┐
//! │ add_batch │───►│ assign ids + │───►│ append + fsync  │───►│ publish rows  │
//! │           │    │ encode rows  │    │ (batch or row)  │    │ + token index │
//! └───────────┘    └──────────────┘    └─────────────────┘    └───────────────┘
//!
//! Read Path:
//! ┌──────────────┐    ┌──────────────────┐    ┌──────────────────┐
//! │ search/query │───►│ index candidates │───►│ chunked decode   │───► events
//! └──────────────┘    │ + time filter    │    │ (codec)          │
//!                     └──────────────────┘    └──────────────────┘
//! ```

mod error;
mod medium;
mod row;
mod scan;
mod store;

pub use error::{DataCorruption, StoreError, StoreResult};
pub use medium::{FileLog, LogMedium, MemoryLog};
pub use row::{StoreHeader, StoredRow, FORMAT_VERSION};
pub use scan::{EventScan, EventSource, ScanCursor, ScanItem, StoreScan};
pub use store::{
    EventBatch, EventStore, EventStoreConfig, EventStoreStats, StoreLocation, WriteStrategy,
};

//! Event types for the append-only event log
//!
//! Events are immutable records of one log line. Once the store assigns an
//! id the event never changes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An event as handed to the store by ingestion, before an id is assigned
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEvent {
    /// The original log line
    pub raw: String,

    /// Event time, parsed upstream or defaulted to arrival time
    pub timestamp: DateTime<Utc>,

    /// Host the line was collected on
    pub host: String,

    /// Origin stream (usually a file name)
    pub source: String,

    /// Byte position in the origin stream
    pub offset: i64,
}

impl NewEvent {
    /// Create a new event stamped with the current time
    pub fn new(raw: impl Into<String>, host: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            raw: raw.into(),
            timestamp: Utc::now(),
            host: host.into(),
            source: source.into(),
            offset: 0,
        }
    }

    /// Set the event time
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Set the byte offset in the origin stream
    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }

    /// Attach a store-assigned id
    pub fn into_event(self, id: i64) -> Event {
        Event {
            id,
            raw: self.raw,
            timestamp: self.timestamp,
            host: self.host,
            source: self.source,
            offset: self.offset,
        }
    }
}

/// An immutable, indexed event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Unique, strictly increasing id assigned by the store
    pub id: i64,
    pub raw: String,
    pub timestamp: DateTime<Utc>,
    pub host: String,
    pub source: String,
    pub offset: i64,
}

/// Ordering requested for a retrieval by id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortMode {
    /// Storage order (ascending id)
    #[default]
    None,
    TimestampAsc,
    TimestampDesc,
}

impl SortMode {
    /// Sort events in place according to this mode
    ///
    /// Ties on timestamp fall back to id so the order is total.
    pub fn apply(self, events: &mut [Event]) {
        match self {
            SortMode::None => events.sort_by_key(|e| e.id),
            SortMode::TimestampAsc => events.sort_by(|a, b| {
                a.timestamp.cmp(&b.timestamp).then(a.id.cmp(&b.id))
            }),
            SortMode::TimestampDesc => events.sort_by(|a, b| {
                b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id))
            }),
        }
    }
}

//! On-disk line format
//!
//! ```text
//! {"format":1,"codec":"zlib"}                                  <- header
//! {"id":1,"ts":"2021-02-01T00:00:00Z","host":"h",...,"raw":"eJz..."}
//! {"id":2,...,"continued":true}                                <- true batch rows...
//! {"id":3,...}                                                 <- ...committed by the last
//! ```
//!
//! Rows of one true batch carry `continued` on every line but the last, so
//! a batch whose final line never landed can be told apart on replay.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::DataCorruption;
use crate::codec::{Codec, CodecError, CodecKind};
use crate::types::{Event, NewEvent};

/// Current log format version
pub const FORMAT_VERSION: u32 = 1;

/// First line of every log; fixes the codec for the whole store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreHeader {
    pub format: u32,
    pub codec: CodecKind,
}

impl StoreHeader {
    pub fn new(codec: CodecKind) -> Self {
        Self {
            format: FORMAT_VERSION,
            codec,
        }
    }

    pub fn to_line(&self) -> serde_json::Result<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

/// One event as stored: raw text in the codec's stored form
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRow {
    pub id: i64,
    pub ts: DateTime<Utc>,
    pub host: String,
    pub source: String,
    pub offset: i64,
    pub raw: String,
    /// More rows of the same batch follow
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub continued: bool,
}

impl StoredRow {
    /// Encode an incoming event under `id`
    pub fn encode(event: &NewEvent, id: i64, codec: &dyn Codec) -> Result<Self, CodecError> {
        Ok(Self {
            id,
            ts: event.timestamp,
            host: event.host.clone(),
            source: event.source.clone(),
            offset: event.offset,
            raw: codec.encode(&event.raw)?,
            continued: false,
        })
    }

    /// Decode back to the logical event
    pub fn decode(&self, codec: &dyn Codec) -> Result<Event, DataCorruption> {
        let raw = codec.decode(&self.raw).map_err(|e| DataCorruption {
            id: self.id,
            reason: e.to_string(),
        })?;

        Ok(Event {
            id: self.id,
            raw,
            timestamp: self.ts,
            host: self.host.clone(),
            source: self.source.clone(),
            offset: self.offset,
        })
    }

    /// Serialize as one newline-terminated JSON line
    pub fn to_line(&self) -> serde_json::Result<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

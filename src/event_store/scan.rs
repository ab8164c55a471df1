//! Resumable scans over the store
//!
//! A scan fixes its high-water id when it is opened: rows committed later
//! are not visible to it. It yields rows in ascending id order, one bounded
//! chunk at a time, taking the store's read lock only for the duration of a
//! chunk so ingestion is never held up for long.

use serde::{Deserialize, Serialize};

use super::error::{DataCorruption, StoreResult};
use super::store::{EventBatch, EventStore};
use crate::types::{Event, Query, SortMode, TimeRange};

/// One scanned row: the decoded event or the reason it could not be decoded
pub type ScanItem = Result<Event, DataCorruption>;

/// Checkpoint of a scan; resuming continues after `last_id`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanCursor {
    pub last_id: i64,
}

/// A lazy, chunked sequence of events
pub trait EventScan: Send {
    /// Number of rows this scan expects to yield, fixed when it was opened
    fn estimated_total(&self) -> u64;

    /// Next chunk of at most `max` items; empty once the scan is exhausted
    fn next_chunk(&mut self, max: usize) -> StoreResult<Vec<ScanItem>>;

    /// Position after the last item yielded so far
    fn cursor(&self) -> ScanCursor;
}

/// Read side of the store, as the job engine sees it
pub trait EventSource: Send + Sync {
    fn search(
        &self,
        query: &Query,
        range: &TimeRange,
        cursor: Option<ScanCursor>,
    ) -> StoreResult<Box<dyn EventScan + '_>>;

    fn get_by_ids(&self, ids: &[i64], sort: SortMode) -> StoreResult<EventBatch>;
}

pub(crate) enum ScanPlan {
    /// Every row
    All,
    /// Index candidates, ascending
    Ids { ids: Vec<i64>, pos: usize },
}

/// Scan over an [`EventStore`]
pub struct StoreScan<'a> {
    pub(crate) store: &'a EventStore,
    pub(crate) plan: ScanPlan,
    pub(crate) range: TimeRange,
    pub(crate) cursor: ScanCursor,
    pub(crate) high_water: i64,
    pub(crate) estimated: u64,
}

impl EventScan for StoreScan<'_> {
    fn estimated_total(&self) -> u64 {
        self.estimated
    }

    fn next_chunk(&mut self, max: usize) -> StoreResult<Vec<ScanItem>> {
        if max == 0 {
            return Ok(Vec::new());
        }

        let rows = self.store.collect_chunk(
            &mut self.plan,
            &self.range,
            &mut self.cursor,
            self.high_water,
            max,
        );

        // Decode outside the lock
        let codec = self.store.codec();
        Ok(rows.iter().map(|row| row.decode(codec)).collect())
    }

    fn cursor(&self) -> ScanCursor {
        self.cursor
    }
}

//! Event Store - durable append-only storage for log events
//!
//! Writes are serialized by a writer mutex that owns the log medium and the
//! next id. A row becomes visible to readers only after its write is durable,
//! when it is published into the row list and token index under the read
//! side's write lock. Readers never wait on I/O.

use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use super::error::{DataCorruption, StoreError, StoreResult};
use super::medium::{FileLog, LogMedium, MemoryLog};
use super::row::{StoreHeader, StoredRow, FORMAT_VERSION};
use super::scan::{EventScan, EventSource, ScanCursor, ScanPlan, StoreScan};
use crate::codec::{Codec, CodecKind};
use crate::search::{tokenize, TokenIndex};
use crate::types::{Event, NewEvent, Query, SortMode, TimeRange};

/// How `add_batch` makes a batch durable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteStrategy {
    /// One append for the whole batch; all rows or none
    TrueBatch,
    /// One append per row; a failure leaves the committed prefix in place
    #[default]
    OneByOne,
}

/// Where the log lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreLocation {
    File(PathBuf),
    Memory,
}

impl StoreLocation {
    /// `:memory:` selects a non-durable store, anything else is a file path
    pub fn parse(location: &str) -> Self {
        if location == ":memory:" {
            StoreLocation::Memory
        } else {
            StoreLocation::File(PathBuf::from(location))
        }
    }
}

/// Configuration for the EventStore
#[derive(Debug, Clone)]
pub struct EventStoreConfig {
    pub location: StoreLocation,
    pub write_strategy: WriteStrategy,
    /// Fixed for the lifetime of the store
    pub codec: CodecKind,
    /// zlib level, 0..=9
    pub compression_level: u32,
}

impl Default for EventStoreConfig {
    fn default() -> Self {
        Self {
            location: StoreLocation::File(PathBuf::from("loghound.jsonl")),
            write_strategy: WriteStrategy::OneByOne,
            codec: CodecKind::Plain,
            compression_level: 6,
        }
    }
}

impl EventStoreConfig {
    /// Create config for a log file at `path`
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            location: StoreLocation::File(path.as_ref().to_path_buf()),
            ..Default::default()
        }
    }

    /// Create config for a non-durable in-memory store
    pub fn in_memory() -> Self {
        Self {
            location: StoreLocation::Memory,
            ..Default::default()
        }
    }

    pub fn with_codec(mut self, codec: CodecKind) -> Self {
        self.codec = codec;
        self
    }

    pub fn with_write_strategy(mut self, write_strategy: WriteStrategy) -> Self {
        self.write_strategy = write_strategy;
        self
    }

    pub fn with_compression_level(mut self, level: u32) -> Self {
        self.compression_level = level;
        self
    }
}

/// Result of a retrieval by id
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventBatch {
    pub events: Vec<Event>,
    /// Requested rows that exist but could not be decoded
    pub corrupted: Vec<DataCorruption>,
}

/// Statistics about the EventStore
#[derive(Debug, Clone, PartialEq)]
pub struct EventStoreStats {
    pub rows: usize,
    /// Rows in the token index; lower than `rows` when some could not be decoded
    pub indexed_rows: usize,
    pub unique_tokens: usize,
    pub next_id: i64,
    pub log_bytes: u64,
    pub codec: CodecKind,
    pub write_strategy: WriteStrategy,
    pub location: String,
}

struct Writer {
    medium: Box<dyn LogMedium>,
    next_id: i64,
    /// Set when a failed append could not be rolled back
    poisoned: Option<String>,
}

#[derive(Default)]
struct Published {
    /// Ascending by id
    rows: Vec<StoredRow>,
    index: TokenIndex,
}

impl Published {
    fn find(&self, id: i64) -> Option<&StoredRow> {
        self.rows
            .binary_search_by_key(&id, |r| r.id)
            .ok()
            .map(|i| &self.rows[i])
    }
}

/// Rows recovered from the log and the next id to assign
struct Replay {
    rows: Vec<StoredRow>,
    next_id: i64,
}

/// Non-empty lines of `bytes` as (line number, offset just past the line, content)
fn log_lines(bytes: &[u8]) -> impl Iterator<Item = (usize, usize, &[u8])> + '_ {
    let mut end = 0;
    bytes
        .split_inclusive(|b| *b == b'\n')
        .enumerate()
        .filter_map(move |(i, line)| {
            end += line.len();
            let line = line.strip_suffix(b"\n").unwrap_or(line);
            (!line.is_empty()).then_some((i + 1, end, line))
        })
}

/// A row encoded and ready to append
struct Prepared {
    row: StoredRow,
    line: String,
    tokens: Vec<String>,
}

/// Durable, append-only store of events with a keyword index
pub struct EventStore {
    codec: Arc<dyn Codec>,
    write_strategy: WriteStrategy,
    writer: Mutex<Writer>,
    published: RwLock<Published>,
}

impl EventStore {
    /// Open (or create) the store described by `config`
    pub fn open(config: &EventStoreConfig) -> StoreResult<Self> {
        let medium: Box<dyn LogMedium> = match &config.location {
            StoreLocation::File(path) => Box::new(FileLog::open(path)?),
            StoreLocation::Memory => Box::new(MemoryLog::new()),
        };
        Self::with_medium(
            medium,
            config.codec.build(config.compression_level),
            config.write_strategy,
        )
    }

    /// Create an empty in-memory store
    pub fn in_memory(codec: CodecKind, write_strategy: WriteStrategy) -> StoreResult<Self> {
        Self::open(
            &EventStoreConfig::in_memory()
                .with_codec(codec)
                .with_write_strategy(write_strategy),
        )
    }

    /// Open a store on an arbitrary medium
    ///
    /// Replays the log, repairs a torn tail or an uncommitted batch and
    /// rebuilds the token index.
    pub fn with_medium(
        mut medium: Box<dyn LogMedium>,
        codec: Arc<dyn Codec>,
        write_strategy: WriteStrategy,
    ) -> StoreResult<Self> {
        let Replay { rows, next_id } = Self::load(medium.as_mut(), codec.kind())?;
        let index = Self::build_index(&rows, codec.as_ref());

        info!(
            location = %medium.describe(),
            rows = rows.len(),
            codec = %codec.kind(),
            ?write_strategy,
            "Opened event store"
        );

        Ok(Self {
            codec,
            write_strategy,
            writer: Mutex::new(Writer {
                medium,
                next_id,
                poisoned: None,
            }),
            published: RwLock::new(Published { rows, index }),
        })
    }

    /// Read the log back into rows
    fn load(medium: &mut dyn LogMedium, codec: CodecKind) -> StoreResult<Replay> {
        let bytes = medium.read_all()?;

        // Anything after the last newline is a write that never completed
        let complete = bytes.iter().rposition(|b| *b == b'\n').map_or(0, |p| p + 1);
        if complete < bytes.len() {
            warn!(
                location = %medium.describe(),
                dropped_bytes = bytes.len() - complete,
                "Truncating torn write at end of event log"
            );
            medium.truncate(complete as u64)?;
        }

        let mut lines = log_lines(&bytes[..complete]);

        let Some((_, header_end, header_line)) = lines.next() else {
            medium.append(StoreHeader::new(codec).to_line()?.as_bytes())?;
            return Ok(Replay {
                rows: Vec::new(),
                next_id: 1,
            });
        };

        let header: StoreHeader = serde_json::from_slice(header_line)
            .map_err(|e| StoreError::CorruptHeader(e.to_string()))?;
        if header.format != FORMAT_VERSION {
            return Err(StoreError::CorruptHeader(format!(
                "unsupported format version {}",
                header.format
            )));
        }
        if header.codec != codec {
            return Err(StoreError::CodecMismatch {
                stored: header.codec,
                requested: codec,
            });
        }

        let mut rows = Vec::new();
        // Every committed data line holds one id, readable or not
        let mut slots: i64 = 0;
        let mut committed_end = header_end;
        let mut pending = Vec::new();
        let mut pending_slots: i64 = 0;

        for (line_num, end, line) in lines {
            pending_slots += 1;
            match serde_json::from_slice::<StoredRow>(line) {
                Ok(row) => {
                    let continued = row.continued;
                    pending.push(row);
                    if continued {
                        continue;
                    }
                }
                Err(e) => {
                    warn!(line = line_num, error = %e, "Skipping unreadable event log line");
                }
            }
            rows.append(&mut pending);
            slots += pending_slots;
            pending_slots = 0;
            committed_end = end;
        }

        if pending_slots > 0 {
            warn!(
                location = %medium.describe(),
                rows = pending_slots,
                "Discarding rows of a batch that never committed"
            );
            medium.truncate(committed_end as u64)?;
        }

        if !rows.windows(2).all(|w| w[0].id < w[1].id) {
            warn!("Event log rows out of id order, sorting");
            rows.sort_by_key(|r| r.id);
            rows.dedup_by_key(|r| r.id);
        }

        // Ids start at 1 and are contiguous, so an unreadable line still
        // holds an id that must not be handed out again
        let last_id = rows.last().map_or(0, |r| r.id);
        if slots > last_id {
            warn!(last_id, lines = slots, "Unreadable rows at end of event log, skipping their ids");
        }

        Ok(Replay {
            rows,
            next_id: last_id.max(slots) + 1,
        })
    }

    fn build_index(rows: &[StoredRow], codec: &dyn Codec) -> TokenIndex {
        let tokenized: Vec<Option<Vec<String>>> = rows
            .par_iter()
            .map(|row| match codec.decode(&row.raw) {
                Ok(raw) => Some(tokenize(&raw)),
                Err(e) => {
                    warn!(id = row.id, error = %e, "Stored event could not be decoded, leaving it out of the index");
                    None
                }
            })
            .collect();

        let mut index = TokenIndex::new();
        for (row, tokens) in rows.iter().zip(tokenized) {
            if let Some(tokens) = tokens {
                index.index_row(row.id, tokens);
            }
        }
        index
    }

    /// Append a batch of events, returning their ids in input order
    ///
    /// On success the ids are `len(events)` contiguous integers. On failure
    /// callers must not infer any ids; with [`WriteStrategy::OneByOne`] the
    /// error says how many leading rows were committed.
    pub fn add_batch(&self, events: &[NewEvent]) -> StoreResult<Vec<i64>> {
        if events.is_empty() {
            return Ok(Vec::new());
        }

        let mut writer = self.writer.lock();
        if let Some(reason) = &writer.poisoned {
            return Err(StoreError::Poisoned(reason.clone()));
        }

        let first_id = writer.next_id;
        let mut prepared = self.prepare(events, first_id)?;
        let count = prepared.len();

        match self.write_strategy {
            WriteStrategy::TrueBatch => {
                let mut buf = String::with_capacity(prepared.iter().map(|p| p.line.len()).sum());
                for p in &prepared {
                    buf.push_str(&p.line);
                }

                let before = writer.medium.len();
                if let Err(e) = writer.medium.append(buf.as_bytes()) {
                    Self::rollback(&mut writer, before, &e);
                    warn!(rows = count, error = %e, "Batch write failed, nothing committed");
                    return Err(StoreError::Io(e));
                }
            }
            WriteStrategy::OneByOne => {
                let mut failure = None;
                for (i, p) in prepared.iter().enumerate() {
                    let before = writer.medium.len();
                    if let Err(e) = writer.medium.append(p.line.as_bytes()) {
                        Self::rollback(&mut writer, before, &e);
                        failure = Some((i, e));
                        break;
                    }
                }

                if let Some((committed, source)) = failure {
                    prepared.truncate(committed);
                    writer.next_id += committed as i64;
                    self.publish(prepared);
                    warn!(committed, rows = count, error = %source, "One-by-one batch interrupted");
                    return Err(StoreError::BatchInterrupted { committed, source });
                }
            }
        }

        writer.next_id += count as i64;
        self.publish(prepared);
        debug!(first_id, rows = count, "Committed event batch");

        Ok((first_id..first_id + count as i64).collect())
    }

    fn prepare(&self, events: &[NewEvent], first_id: i64) -> StoreResult<Vec<Prepared>> {
        let codec = self.codec.as_ref();
        let last = events.len() - 1;
        let batched = self.write_strategy == WriteStrategy::TrueBatch;
        events
            .par_iter()
            .enumerate()
            .map(|(index, event)| {
                let id = first_id + index as i64;
                let mut row = StoredRow::encode(event, id, codec)
                    .map_err(|source| StoreError::Encode { index, source })?;
                row.continued = batched && index < last;
                let line = row.to_line()?;
                Ok(Prepared {
                    row,
                    line,
                    tokens: tokenize(&event.raw),
                })
            })
            .collect()
    }

    fn rollback(writer: &mut Writer, len: u64, cause: &io::Error) {
        if let Err(e) = writer.medium.truncate(len) {
            error!(error = %e, cause = %cause, "Could not roll back failed append");
            writer.poisoned = Some(format!("{}; rollback failed: {}", cause, e));
        }
    }

    /// Make durable rows visible to readers
    fn publish(&self, prepared: Vec<Prepared>) {
        let mut published = self.published.write();
        for Prepared { row, tokens, .. } in prepared {
            published.index.index_row(row.id, tokens);
            published.rows.push(row);
        }
    }

    /// Fetch events by id
    ///
    /// Missing ids are omitted. Rows that fail to decode are reported in
    /// [`EventBatch::corrupted`] without affecting the others.
    pub fn get_by_ids(&self, ids: &[i64], sort: SortMode) -> StoreResult<EventBatch> {
        let wanted: BTreeSet<i64> = ids.iter().copied().collect();
        let rows: Vec<StoredRow> = {
            let published = self.published.read();
            wanted
                .iter()
                .filter_map(|id| published.find(*id).cloned())
                .collect()
        };

        let mut batch = EventBatch::default();
        for row in &rows {
            match row.decode(self.codec.as_ref()) {
                Ok(event) => batch.events.push(event),
                Err(corruption) => {
                    warn!(id = corruption.id, reason = %corruption.reason, "Corrupt event in retrieval");
                    batch.corrupted.push(corruption);
                }
            }
        }
        sort.apply(&mut batch.events);

        Ok(batch)
    }

    /// Open a scan over events matching the keyword part of `query` in `range`
    ///
    /// Pass the cursor of an earlier scan to resume after its last row.
    pub fn search(
        &self,
        query: &Query,
        range: &TimeRange,
        cursor: Option<ScanCursor>,
    ) -> StoreResult<StoreScan<'_>> {
        let after = cursor.map_or(0, |c| c.last_id);

        // Keywords without word characters cannot be looked up in the index
        let mut tokens = Vec::new();
        let mut literals = Vec::new();
        for fragment in &query.fragments {
            let fragment_tokens = tokenize(fragment);
            if fragment_tokens.is_empty() {
                literals.push(fragment.to_lowercase());
            } else {
                tokens.extend(fragment_tokens);
            }
        }

        let guard = self.published.read();
        let published: &Published = &guard;
        let high_water = published.rows.last().map_or(0, |r| r.id);
        let start = published.rows.partition_point(|r| r.id <= after);

        let (plan, estimated) = if query.fragments.is_empty() {
            let estimated = published.rows[start..]
                .iter()
                .filter(|r| range.contains(r.ts))
                .count();
            (ScanPlan::All, estimated)
        } else {
            let mut ids = if tokens.is_empty() {
                published.rows[start..]
                    .iter()
                    .filter(|r| range.contains(r.ts))
                    .map(|r| r.id)
                    .collect()
            } else {
                let mut ids = published.index.candidates(&tokens, after, high_water);
                ids.retain(|id| published.find(*id).is_some_and(|r| range.contains(r.ts)));
                ids
            };
            if !literals.is_empty() {
                ids = self.filter_literals(published, ids, &literals);
            }
            let estimated = ids.len();
            (ScanPlan::Ids { ids, pos: 0 }, estimated)
        };
        drop(guard);

        debug!(
            after,
            high_water,
            estimated,
            index_assisted = !tokens.is_empty(),
            literals = literals.len(),
            "Opened scan"
        );

        Ok(StoreScan {
            store: self,
            plan,
            range: *range,
            cursor: ScanCursor { last_id: after },
            high_water,
            estimated: estimated as u64,
        })
    }

    /// Keep the ids whose raw text contains every literal
    ///
    /// Rows that cannot be decoded are kept so the scan reports them.
    fn filter_literals(
        &self,
        published: &Published,
        ids: Vec<i64>,
        literals: &[String],
    ) -> Vec<i64> {
        let codec = self.codec.as_ref();
        ids.into_par_iter()
            .filter(|id| {
                let Some(row) = published.find(*id) else {
                    return false;
                };
                match codec.decode(&row.raw) {
                    Ok(raw) => {
                        let raw = raw.to_lowercase();
                        literals.iter().all(|l| raw.contains(l.as_str()))
                    }
                    Err(_) => true,
                }
            })
            .collect()
    }

    /// Collect the next chunk of stored rows for a scan
    pub(crate) fn collect_chunk(
        &self,
        plan: &mut ScanPlan,
        range: &TimeRange,
        cursor: &mut ScanCursor,
        high_water: i64,
        max: usize,
    ) -> Vec<StoredRow> {
        let published = self.published.read();
        let mut out = Vec::with_capacity(max.min(1024));

        match plan {
            ScanPlan::All => {
                let start = published.rows.partition_point(|r| r.id <= cursor.last_id);
                for row in published.rows[start..]
                    .iter()
                    .take_while(|r| r.id <= high_water)
                {
                    cursor.last_id = row.id;
                    if range.contains(row.ts) {
                        out.push(row.clone());
                        if out.len() >= max {
                            break;
                        }
                    }
                }
            }
            ScanPlan::Ids { ids, pos } => {
                while *pos < ids.len() && out.len() < max {
                    let id = ids[*pos];
                    *pos += 1;
                    cursor.last_id = id;
                    if let Some(row) = published.find(id) {
                        out.push(row.clone());
                    }
                }
            }
        }

        out
    }

    pub(crate) fn codec(&self) -> &dyn Codec {
        self.codec.as_ref()
    }

    pub fn codec_kind(&self) -> CodecKind {
        self.codec.kind()
    }

    pub fn write_strategy(&self) -> WriteStrategy {
        self.write_strategy
    }

    /// Number of visible rows
    pub fn len(&self) -> usize {
        self.published.read().rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Highest visible id, 0 for an empty store
    pub fn last_id(&self) -> i64 {
        self.published.read().rows.last().map_or(0, |r| r.id)
    }

    /// Collect store statistics
    pub fn stats(&self) -> EventStoreStats {
        let (next_id, log_bytes, location) = {
            let writer = self.writer.lock();
            (writer.next_id, writer.medium.len(), writer.medium.describe())
        };
        let published = self.published.read();
        let index = published.index.stats();

        EventStoreStats {
            rows: published.rows.len(),
            indexed_rows: index.indexed_rows,
            unique_tokens: index.unique_tokens,
            next_id,
            log_bytes,
            codec: self.codec.kind(),
            write_strategy: self.write_strategy,
            location,
        }
    }
}

impl EventSource for EventStore {
    fn search(
        &self,
        query: &Query,
        range: &TimeRange,
        cursor: Option<ScanCursor>,
    ) -> StoreResult<Box<dyn EventScan + '_>> {
        Ok(Box::new(EventStore::search(self, query, range, cursor)?))
    }

    fn get_by_ids(&self, ids: &[i64], sort: SortMode) -> StoreResult<EventBatch> {
        EventStore::get_by_ids(self, ids, sort)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{PlainCodec, ZlibCodec};
    use chrono::{Duration, TimeZone, Utc};
    use tempfile::TempDir;

    fn event(raw: &str, secs: i64) -> NewEvent {
        NewEvent::new(raw, "localhost", "log.txt")
            .with_timestamp(Utc.timestamp_opt(1_600_000_000 + secs, 0).unwrap())
    }

    fn memory_store() -> EventStore {
        EventStore::in_memory(CodecKind::Plain, WriteStrategy::TrueBatch).unwrap()
    }

    fn drain(scan: &mut dyn EventScan, chunk: usize) -> Vec<i64> {
        let mut ids = Vec::new();
        loop {
            let items = scan.next_chunk(chunk).unwrap();
            if items.is_empty() {
                return ids;
            }
            ids.extend(items.into_iter().map(|i| i.unwrap().id));
        }
    }

    #[test]
    fn test_add_and_get() {
        let store = memory_store();
        let input = vec![event("first line", 0), event("second line", 1)];

        let ids = store.add_batch(&input).unwrap();
        assert_eq!(ids, vec![1, 2]);

        let batch = store.get_by_ids(&ids, SortMode::None).unwrap();
        assert!(batch.corrupted.is_empty());
        assert_eq!(batch.events[0], input[0].clone().into_event(1));
        assert_eq!(batch.events[1], input[1].clone().into_event(2));
    }

    #[test]
    fn test_ids_continue_across_batches() {
        let store = memory_store();
        assert_eq!(store.add_batch(&[event("a", 0)]).unwrap(), vec![1]);
        assert_eq!(store.add_batch(&[event("b", 0), event("c", 0)]).unwrap(), vec![2, 3]);
        assert!(store.add_batch(&[]).unwrap().is_empty());
        assert_eq!(store.add_batch(&[event("d", 0)]).unwrap(), vec![4]);
        assert_eq!(store.last_id(), 4);
    }

    #[test]
    fn test_missing_ids_are_omitted() {
        let store = memory_store();
        store.add_batch(&[event("a", 0), event("b", 0)]).unwrap();

        let batch = store.get_by_ids(&[2, 99, 2, -1], SortMode::None).unwrap();
        assert_eq!(batch.events.len(), 1);
        assert_eq!(batch.events[0].id, 2);
    }

    #[test]
    fn test_reopen_file_store() {
        let temp_dir = TempDir::new().unwrap();
        let config = EventStoreConfig::new(temp_dir.path().join("events.jsonl"));

        {
            let store = EventStore::open(&config).unwrap();
            store.add_batch(&[event("alpha beta", 0), event("gamma", 1)]).unwrap();
        }

        let store = EventStore::open(&config).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.add_batch(&[event("delta", 2)]).unwrap(), vec![3]);

        // The index was rebuilt from the log
        let mut scan = store.search(&Query::keywords("beta"), &TimeRange::all(), None).unwrap();
        assert_eq!(drain(&mut scan, 10), vec![1]);
    }

    #[test]
    fn test_torn_tail_is_repaired() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("events.jsonl");
        let config = EventStoreConfig::new(&path);

        {
            let store = EventStore::open(&config).unwrap();
            store.add_batch(&[event("kept", 0)]).unwrap();
        }
        let mut content = std::fs::read(&path).unwrap();
        content.extend_from_slice(b"{\"id\":2,\"ts\":\"20");
        std::fs::write(&path, &content).unwrap();

        let store = EventStore::open(&config).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.add_batch(&[event("next", 1)]).unwrap(), vec![2]);
        drop(store);

        let store = EventStore::open(&config).unwrap();
        let batch = store.get_by_ids(&[1, 2], SortMode::None).unwrap();
        assert_eq!(batch.events.len(), 2);
        assert_eq!(batch.events[1].raw, "next");
    }

    #[test]
    fn test_unreadable_last_row_keeps_its_id() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("events.jsonl");
        let config = EventStoreConfig::new(&path);

        {
            let store = EventStore::open(&config).unwrap();
            assert_eq!(store.add_batch(&[event("one", 0), event("two", 1)]).unwrap(), vec![1, 2]);
        }
        let mut content = std::fs::read(&path).unwrap();
        content.extend_from_slice(b"{\"id\":3,\"ts\":#garbled#}\n");
        std::fs::write(&path, &content).unwrap();

        let store = EventStore::open(&config).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.stats().next_id, 4);
        assert_eq!(store.add_batch(&[event("four", 3)]).unwrap(), vec![4]);
        drop(store);

        let store = EventStore::open(&config).unwrap();
        let batch = store.get_by_ids(&[1, 2, 3, 4], SortMode::None).unwrap();
        let ids: Vec<i64> = batch.events.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![1, 2, 4]);
        assert_eq!(store.add_batch(&[event("five", 4)]).unwrap(), vec![5]);
    }

    #[test]
    fn test_uncommitted_batch_is_discarded() {
        let codec = PlainCodec;
        let mut log = StoreHeader::new(CodecKind::Plain).to_line().unwrap();
        log.push_str(&StoredRow::encode(&event("kept", 0), 1, &codec).unwrap().to_line().unwrap());
        let committed_len = log.len() as u64;
        for id in 2..=3 {
            let mut row = StoredRow::encode(&event("lost", id), id, &codec).unwrap();
            row.continued = true;
            log.push_str(&row.to_line().unwrap());
        }

        let store = EventStore::with_medium(
            Box::new(MemoryLog::with_contents(log.into_bytes())),
            Arc::new(codec),
            WriteStrategy::TrueBatch,
        )
        .unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(store.stats().log_bytes, committed_len);
        assert_eq!(store.add_batch(&[event("next", 4)]).unwrap(), vec![2]);

        let mut scan = store.search(&Query::keywords("lost"), &TimeRange::all(), None).unwrap();
        assert!(drain(&mut scan, 10).is_empty());
    }

    #[test]
    fn test_true_batch_marks_all_but_last_row() {
        let store = memory_store();
        store.add_batch(&[event("a", 0), event("b", 1), event("c", 2)]).unwrap();
        store.add_batch(&[event("d", 3)]).unwrap();

        let published = store.published.read();
        let flags: Vec<bool> = published.rows.iter().map(|r| r.continued).collect();
        assert_eq!(flags, vec![true, true, false, false]);
    }

    #[test]
    fn test_codec_is_fixed_at_creation() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("events.jsonl");

        EventStore::open(&EventStoreConfig::new(&path).with_codec(CodecKind::Zlib)).unwrap();

        let result = EventStore::open(&EventStoreConfig::new(&path).with_codec(CodecKind::Plain));
        assert!(matches!(
            result,
            Err(StoreError::CodecMismatch {
                stored: CodecKind::Zlib,
                requested: CodecKind::Plain
            })
        ));
    }

    #[test]
    fn test_corrupt_row_does_not_spoil_batch() {
        let codec = ZlibCodec::default();
        let good = StoredRow::encode(&event("fine", 0), 1, &codec).unwrap();
        let mut bad = StoredRow::encode(&event("broken", 1), 2, &codec).unwrap();
        bad.raw = "not-zlib".to_string();

        let mut log = StoreHeader::new(CodecKind::Zlib).to_line().unwrap();
        log.push_str(&good.to_line().unwrap());
        log.push_str(&bad.to_line().unwrap());

        let store = EventStore::with_medium(
            Box::new(MemoryLog::with_contents(log.into_bytes())),
            Arc::new(codec),
            WriteStrategy::TrueBatch,
        )
        .unwrap();

        let batch = store.get_by_ids(&[1, 2], SortMode::None).unwrap();
        assert_eq!(batch.events.len(), 1);
        assert_eq!(batch.events[0].raw, "fine");
        assert_eq!(batch.corrupted.len(), 1);
        assert_eq!(batch.corrupted[0].id, 2);
    }

    #[test]
    fn test_search_uses_index_and_time_range() {
        let store = memory_store();
        store
            .add_batch(&[
                event("GET /login 200", 0),
                event("POST /login 500", 10),
                event("GET /index 200", 20),
                event("GET /login 302", 30),
            ])
            .unwrap();

        let mut scan = store.search(&Query::keywords("get login"), &TimeRange::all(), None).unwrap();
        assert_eq!(scan.estimated_total(), 2);
        assert_eq!(drain(&mut scan, 10), vec![1, 4]);

        let base = Utc.timestamp_opt(1_600_000_000, 0).unwrap();
        let range = TimeRange::between(base + Duration::seconds(5), base + Duration::seconds(25));
        let mut scan = store.search(&Query::all(), &range, None).unwrap();
        assert_eq!(scan.estimated_total(), 2);
        assert_eq!(drain(&mut scan, 1), vec![2, 3]);
    }

    #[test]
    fn test_scan_resumes_from_cursor() {
        let store = memory_store();
        let input: Vec<NewEvent> = (0..10).map(|i| event("tick", i)).collect();
        store.add_batch(&input).unwrap();

        let mut scan = store.search(&Query::keywords("tick"), &TimeRange::all(), None).unwrap();
        let first = scan.next_chunk(4).unwrap();
        assert_eq!(first.len(), 4);
        let cursor = scan.cursor();
        assert_eq!(cursor.last_id, 4);
        drop(scan);

        let mut resumed = store.search(&Query::keywords("tick"), &TimeRange::all(), Some(cursor)).unwrap();
        assert_eq!(resumed.estimated_total(), 6);
        assert_eq!(drain(&mut resumed, 4), vec![5, 6, 7, 8, 9, 10]);
    }

    #[test]
    fn test_scan_does_not_see_later_rows() {
        let store = memory_store();
        store.add_batch(&[event("a", 0), event("b", 1)]).unwrap();

        let mut scan = store.search(&Query::all(), &TimeRange::all(), None).unwrap();
        store.add_batch(&[event("c", 2)]).unwrap();

        assert_eq!(drain(&mut scan, 10), vec![1, 2]);
    }

    #[test]
    fn test_unmatched_keyword_yields_nothing() {
        let store = memory_store();
        store.add_batch(&[event("a", 0)]).unwrap();

        let mut scan = store.search(&Query::keywords("zzz"), &TimeRange::all(), None).unwrap();
        assert_eq!(scan.estimated_total(), 0);
        assert!(scan.next_chunk(10).unwrap().is_empty());
    }

    #[test]
    fn test_punctuation_keyword_matches_literally() {
        let store = memory_store();
        store
            .add_batch(&[event("alpha", 0), event("beta", 1), event("a -> b", 2)])
            .unwrap();

        let mut scan = store.search(&Query::keywords("->"), &TimeRange::all(), None).unwrap();
        assert_eq!(scan.estimated_total(), 1);
        assert_eq!(drain(&mut scan, 10), vec![3]);

        let mut scan = store.search(&Query::keywords("==="), &TimeRange::all(), None).unwrap();
        assert_eq!(scan.estimated_total(), 0);
        assert!(drain(&mut scan, 10).is_empty());

        // Mixed with a word, the word narrows through the index first
        let mut scan = store.search(&Query::keywords("beta ->"), &TimeRange::all(), None).unwrap();
        assert_eq!(scan.estimated_total(), 0);
        assert!(drain(&mut scan, 10).is_empty());

        let mut scan = store.search(&Query::keywords("b ->"), &TimeRange::all(), None).unwrap();
        assert_eq!(drain(&mut scan, 10), vec![3]);
    }

    #[test]
    fn test_stats() {
        let store = EventStore::in_memory(CodecKind::Zlib, WriteStrategy::OneByOne).unwrap();
        store.add_batch(&[event("hello world", 0)]).unwrap();

        let stats = store.stats();
        assert_eq!(stats.rows, 1);
        assert_eq!(stats.indexed_rows, 1);
        assert_eq!(stats.unique_tokens, 2);
        assert_eq!(stats.next_id, 2);
        assert_eq!(stats.codec, CodecKind::Zlib);
        assert_eq!(stats.write_strategy, WriteStrategy::OneByOne);
        assert_eq!(stats.location, ":memory:");
        assert!(stats.log_bytes > 0);
    }
}

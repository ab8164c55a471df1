//! Search pipeline: scan, filter, extract, aggregate
//!
//! One pipeline runs per job on Tokio's blocking pool. It owns the job's
//! accumulating [`JobStats`] and hands readers a copy after every chunk.
//! The job record is the only thing shared with the manager; every write to
//! it (chunk publish, finish, failure, abort) is one write-locked section,
//! and nothing is written after the record turns terminal.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::event_store::{EventSource, StoreError};
use crate::extract::FieldExtractor;
use crate::types::{FieldValueCount, Job, JobSnapshot, JobState, JobStats, Query, TimeRange};

/// Everything readers may see of a job
#[derive(Debug)]
struct JobRecord {
    job: Job,
    stats: JobStats,
    /// Matched event ids in scan order
    results: Vec<i64>,
}

/// Shared state of one job
#[derive(Debug)]
pub(crate) struct JobHandle {
    id: i64,
    record: RwLock<JobRecord>,
    cancel: AtomicBool,
    state_tx: watch::Sender<JobState>,
}

impl JobHandle {
    pub(crate) fn new(job: Job) -> Self {
        let (state_tx, _) = watch::channel(job.state);
        Self {
            id: job.id,
            record: RwLock::new(JobRecord {
                job,
                stats: JobStats::default(),
                results: Vec::new(),
            }),
            cancel: AtomicBool::new(false),
            state_tx,
        }
    }

    /// Job and stats as of one instant
    pub(crate) fn snapshot(&self) -> JobSnapshot {
        let record = self.record.read();
        JobSnapshot {
            job: record.job.clone(),
            stats: record.stats.clone(),
        }
    }

    pub(crate) fn job(&self) -> Job {
        self.record.read().job.clone()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<JobState> {
        self.state_tx.subscribe()
    }

    /// Page of matched ids, most recently scanned first
    pub(crate) fn results(&self, skip: usize, take: usize) -> Vec<i64> {
        self.record
            .read()
            .results
            .iter()
            .rev()
            .skip(skip)
            .take(take)
            .copied()
            .collect()
    }

    pub(crate) fn top_values(&self, field: &str, limit: usize) -> Vec<FieldValueCount> {
        self.record.read().stats.top_values(field, limit)
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Acquire)
    }

    /// Request cancellation and move a running job to Aborted
    ///
    /// Returns true if this call made the transition.
    pub(crate) fn abort(&self) -> bool {
        self.cancel.store(true, Ordering::Release);
        let transitioned = self.record.write().job.terminate(JobState::Aborted);
        if transitioned {
            self.state_tx.send_replace(JobState::Aborted);
        }
        transitioned
    }

    /// Publish a chunk's worth of progress
    ///
    /// Returns false if the job is already terminal; the pipeline must stop.
    fn publish(&self, stats: &JobStats, matched: Vec<i64>, warnings: Vec<String>) -> bool {
        let mut record = self.record.write();
        if record.job.state.is_terminal() {
            return false;
        }
        record.stats = stats.clone();
        record.results.extend(matched);
        record.job.warnings.extend(warnings);
        true
    }

    fn finish(&self, mut stats: JobStats) -> bool {
        stats.estimated_progress = 1.0;
        let transitioned = {
            let mut record = self.record.write();
            let transitioned = record.job.terminate(JobState::Finished);
            if transitioned {
                record.stats = stats;
            }
            transitioned
        };
        if transitioned {
            self.state_tx.send_replace(JobState::Finished);
        }
        transitioned
    }

    /// Abort because of an error; `stats` replaces the published stats if given
    pub(crate) fn fail(&self, stats: Option<JobStats>, message: String) -> bool {
        let transitioned = {
            let mut record = self.record.write();
            let transitioned = record.job.terminate(JobState::Aborted);
            if transitioned {
                if let Some(stats) = stats {
                    record.stats = stats;
                }
                record.job.error = Some(message);
            }
            transitioned
        };
        if transitioned {
            self.state_tx.send_replace(JobState::Aborted);
        }
        transitioned
    }
}

/// Why a scan stopped early
enum Halt {
    Cancelled,
    Failed(StoreError),
}

/// One job's execution
pub(crate) struct SearchPipeline {
    pub(crate) handle: Arc<JobHandle>,
    pub(crate) source: Arc<dyn EventSource>,
    pub(crate) extractor: Arc<FieldExtractor>,
    pub(crate) query: Query,
    pub(crate) range: TimeRange,
    pub(crate) chunk_size: usize,
}

impl SearchPipeline {
    /// Run to completion, leaving the job terminal
    pub(crate) fn run(self) {
        let job_id = self.handle.id;
        let mut stats = JobStats::default();

        match self.scan(&mut stats) {
            Ok(()) => {
                let matched = stats.num_matched_events;
                if self.handle.finish(stats) {
                    info!(job_id, matched, "Job finished");
                }
            }
            Err(Halt::Cancelled) => {
                info!(job_id, matched = stats.num_matched_events, "Job aborted");
            }
            Err(Halt::Failed(e)) => {
                error!(job_id, error = %e, "Job aborted by storage error");
                self.handle.fail(Some(stats), e.to_string());
            }
        }
    }

    fn scan(&self, stats: &mut JobStats) -> Result<(), Halt> {
        let mut scan = self
            .source
            .search(&self.query, &self.range, None)
            .map_err(Halt::Failed)?;
        let estimated = scan.estimated_total();
        let mut scanned: u64 = 0;

        debug!(job_id = self.handle.id, estimated, "Job scan started");

        loop {
            if self.handle.is_cancelled() {
                return Err(Halt::Cancelled);
            }

            let chunk = scan.next_chunk(self.chunk_size).map_err(Halt::Failed)?;
            if chunk.is_empty() {
                return Ok(());
            }

            let mut matched = Vec::new();
            let mut warnings = Vec::new();

            for item in chunk {
                if self.handle.is_cancelled() {
                    return Err(Halt::Cancelled);
                }
                scanned += 1;

                match item {
                    Ok(event) => {
                        if self.query.residual_matches(&event) {
                            let fields = self.extractor.extract(&event.raw);
                            stats.record_match(&fields);
                            matched.push(event.id);
                        }
                    }
                    Err(corruption) => {
                        warn!(job_id = self.handle.id, id = corruption.id, reason = %corruption.reason, "Skipping corrupt event");
                        warnings.push(corruption.to_string());
                    }
                }

                stats.advance_progress(scanned, estimated);
            }

            debug!(job_id = self.handle.id, scanned, matched = stats.num_matched_events, "Publishing chunk");
            if !self.handle.publish(stats, matched, warnings) {
                return Err(Halt::Cancelled);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::CodecKind;
    use crate::event_store::{EventStore, WriteStrategy};
    use crate::types::NewEvent;

    fn store_with(raws: &[&str]) -> Arc<EventStore> {
        let store = EventStore::in_memory(CodecKind::Plain, WriteStrategy::TrueBatch).unwrap();
        let events: Vec<NewEvent> = raws.iter().map(|r| NewEvent::new(*r, "h", "s")).collect();
        store.add_batch(&events).unwrap();
        Arc::new(store)
    }

    fn pipeline(store: Arc<EventStore>, query: Query, chunk_size: usize) -> (SearchPipeline, Arc<JobHandle>) {
        let handle = Arc::new(JobHandle::new(Job::new(1, query.to_string())));
        let extractor = FieldExtractor::new(&[r"(\w+)=(\w+)"]).unwrap();
        let pipeline = SearchPipeline {
            handle: Arc::clone(&handle),
            source: store,
            extractor: Arc::new(extractor),
            query,
            range: TimeRange::all(),
            chunk_size,
        };
        (pipeline, handle)
    }

    #[test]
    fn test_run_to_completion() {
        let store = store_with(&["level=error code=500", "level=info", "nothing here"]);
        let (pipeline, handle) = pipeline(store, Query::all(), 2);

        pipeline.run();

        let snapshot = handle.snapshot();
        assert_eq!(snapshot.job.state, JobState::Finished);
        assert!(snapshot.job.end_time.is_some());
        assert_eq!(snapshot.stats.num_matched_events, 3);
        assert_eq!(snapshot.stats.estimated_progress, 1.0);
        assert_eq!(snapshot.stats.field_occurrences["level"], 2);
        assert_eq!(snapshot.stats.field_value_occurrences["level"]["error"], 1);
        assert_eq!(handle.results(0, 10), vec![3, 2, 1]);
    }

    #[test]
    fn test_residual_filter() {
        let store = store_with(&["user=alice ok", "user=bob fail", "user=carol ok"]);
        let (pipeline, handle) = pipeline(store, Query::keywords("user").without_fragment("FAIL"), 10);

        pipeline.run();

        let snapshot = handle.snapshot();
        assert_eq!(snapshot.stats.num_matched_events, 2);
        assert_eq!(handle.results(0, 10), vec![3, 1]);
    }

    #[test]
    fn test_abort_before_run() {
        let store = store_with(&["a", "b"]);
        let (pipeline, handle) = pipeline(store, Query::all(), 1);

        assert!(handle.abort());
        assert!(!handle.abort());
        pipeline.run();

        let snapshot = handle.snapshot();
        assert_eq!(snapshot.job.state, JobState::Aborted);
        assert_eq!(snapshot.stats, JobStats::default());
        assert!(snapshot.job.error.is_none());
    }

    #[test]
    fn test_terminal_record_is_not_overwritten() {
        let handle = JobHandle::new(Job::new(1, "*".to_string()));
        assert!(handle.abort());

        let stats = JobStats {
            num_matched_events: 5,
            ..Default::default()
        };
        assert!(!handle.publish(&stats, vec![1], Vec::new()));
        assert!(!handle.finish(stats.clone()));
        assert!(!handle.fail(Some(stats), "late".to_string()));

        let snapshot = handle.snapshot();
        assert_eq!(snapshot.job.state, JobState::Aborted);
        assert_eq!(snapshot.stats.num_matched_events, 0);
        assert!(snapshot.job.error.is_none());
        assert!(handle.results(0, 10).is_empty());
    }

    #[test]
    fn test_state_channel_sees_transition() {
        let handle = JobHandle::new(Job::new(1, "*".to_string()));
        let rx = handle.subscribe();
        assert_eq!(*rx.borrow(), JobState::Running);

        handle.finish(JobStats::default());
        assert_eq!(*rx.borrow(), JobState::Finished);
    }
}

//! Job manager: creates, tracks and aborts search jobs

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{error, info};

use super::error::{JobError, JobResult};
use super::pipeline::{JobHandle, SearchPipeline};
use crate::event_store::{EventBatch, EventSource};
use crate::extract::FieldExtractor;
use crate::types::{FieldValueCount, Job, JobSnapshot, Query, SortMode, TimeRange};

/// Tuning for job execution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobSettings {
    /// Rows pulled from the store per scan step; also the publish interval
    pub scan_chunk_size: usize,
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            scan_chunk_size: 500,
        }
    }
}

/// Runs search jobs against an event source
///
/// Jobs are kept until [`JobManager::remove_job`] drops them.
pub struct JobManager {
    source: Arc<dyn EventSource>,
    extractor: Arc<FieldExtractor>,
    settings: JobSettings,
    jobs: RwLock<BTreeMap<i64, Arc<JobHandle>>>,
    next_id: AtomicI64,
}

impl JobManager {
    pub fn new(
        source: Arc<dyn EventSource>,
        extractor: Arc<FieldExtractor>,
        settings: JobSettings,
    ) -> Self {
        Self {
            source,
            extractor,
            settings,
            jobs: RwLock::new(BTreeMap::new()),
            next_id: AtomicI64::new(1),
        }
    }

    /// Start a job and return it in its Running state
    ///
    /// The pipeline runs on the blocking pool; this never waits for it.
    /// Must be called from within a Tokio runtime.
    pub fn create_job(&self, query: Query, range: TimeRange) -> Job {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let job = Job::new(id, query.to_string());
        let handle = Arc::new(JobHandle::new(job.clone()));
        self.jobs.write().insert(id, Arc::clone(&handle));

        let pipeline = SearchPipeline {
            handle: Arc::clone(&handle),
            source: Arc::clone(&self.source),
            extractor: Arc::clone(&self.extractor),
            query,
            range,
            chunk_size: self.settings.scan_chunk_size,
        };

        info!(job_id = id, query = %job.query, "Created job");

        let task = tokio::task::spawn_blocking(move || pipeline.run());
        tokio::spawn(async move {
            if let Err(e) = task.await {
                error!(job_id = id, error = %e, "Job pipeline panicked");
                handle.fail(None, format!("pipeline panicked: {}", e));
            }
        });

        job
    }

    fn handle(&self, id: i64) -> JobResult<Arc<JobHandle>> {
        self.jobs
            .read()
            .get(&id)
            .cloned()
            .ok_or(JobError::NotFound(id))
    }

    /// Current job state and stats, read together
    pub fn get_job(&self, id: i64) -> JobResult<JobSnapshot> {
        Ok(self.handle(id)?.snapshot())
    }

    /// Ask a job to stop
    ///
    /// A running job is Aborted as of this call; the pipeline notices within
    /// one scanned event. Aborting a finished or aborted job does nothing.
    pub fn abort_job(&self, id: i64) -> JobResult<()> {
        if self.handle(id)?.abort() {
            info!(job_id = id, "Abort requested");
        }
        Ok(())
    }

    /// Wait until a job is terminal and return its final snapshot
    pub async fn wait_for(&self, id: i64) -> JobResult<JobSnapshot> {
        let handle = self.handle(id)?;
        let mut rx = handle.subscribe();
        // The sender lives in the handle we hold, so this cannot see a closed channel
        let _ = rx.wait_for(|state| state.is_terminal()).await;
        Ok(handle.snapshot())
    }

    /// Matched events, newest match first, paged by `skip`/`take`
    ///
    /// The page is returned in descending timestamp order.
    pub fn get_results(&self, id: i64, skip: usize, take: usize) -> JobResult<EventBatch> {
        let ids = self.handle(id)?.results(skip, take);
        Ok(self.source.get_by_ids(&ids, SortMode::TimestampDesc)?)
    }

    /// Most frequent values of a field among a job's matches
    pub fn field_values(
        &self,
        id: i64,
        field: &str,
        limit: usize,
    ) -> JobResult<Vec<FieldValueCount>> {
        Ok(self.handle(id)?.top_values(field, limit))
    }

    /// All jobs, ordered by id
    pub fn list_jobs(&self) -> Vec<Job> {
        self.jobs.read().values().map(|h| h.job()).collect()
    }

    /// Forget a job and its recorded results, aborting it first if it is running
    ///
    /// Returns the job as it was when removed.
    pub fn remove_job(&self, id: i64) -> JobResult<Job> {
        let handle = self.jobs.write().remove(&id).ok_or(JobError::NotFound(id))?;
        if handle.abort() {
            info!(job_id = id, "Aborted job on removal");
        }
        info!(job_id = id, "Removed job");
        Ok(handle.job())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::CodecKind;
    use crate::event_store::{EventStore, WriteStrategy};
    use crate::types::{JobState, NewEvent};

    fn manager_with(raws: &[&str]) -> JobManager {
        let store = EventStore::in_memory(CodecKind::Plain, WriteStrategy::TrueBatch).unwrap();
        let events: Vec<NewEvent> = raws.iter().map(|r| NewEvent::new(*r, "h", "s")).collect();
        store.add_batch(&events).unwrap();

        let extractor = FieldExtractor::new(&[r"(\w+)=(\w+)"]).unwrap();
        JobManager::new(Arc::new(store), Arc::new(extractor), JobSettings::default())
    }

    #[tokio::test]
    async fn test_create_and_wait() {
        let manager = manager_with(&["status=ok", "status=fail", "status=ok"]);

        let job = manager.create_job(Query::keywords("status"), TimeRange::all());
        assert_eq!(job.id, 1);
        assert_eq!(job.state, JobState::Running);

        let snapshot = manager.wait_for(job.id).await.unwrap();
        assert_eq!(snapshot.job.state, JobState::Finished);
        assert_eq!(snapshot.stats.num_matched_events, 3);

        let values = manager.field_values(job.id, "status", 10).unwrap();
        assert_eq!(values[0], FieldValueCount { value: "ok".to_string(), count: 2 });
        assert_eq!(values[1], FieldValueCount { value: "fail".to_string(), count: 1 });
    }

    #[tokio::test]
    async fn test_job_ids_are_monotonic() {
        let manager = manager_with(&["a"]);

        let first = manager.create_job(Query::all(), TimeRange::all());
        let second = manager.create_job(Query::all(), TimeRange::all());
        assert_eq!(second.id, first.id + 1);

        let listed: Vec<i64> = manager.list_jobs().iter().map(|j| j.id).collect();
        assert_eq!(listed, vec![first.id, second.id]);
    }

    #[tokio::test]
    async fn test_unknown_job() {
        let manager = manager_with(&[]);

        assert!(matches!(manager.get_job(42), Err(JobError::NotFound(42))));
        assert!(matches!(manager.abort_job(42), Err(JobError::NotFound(42))));
        assert!(matches!(manager.wait_for(42).await, Err(JobError::NotFound(42))));
        assert!(matches!(manager.get_results(42, 0, 10), Err(JobError::NotFound(42))));
        assert!(matches!(manager.field_values(42, "x", 10), Err(JobError::NotFound(42))));
    }

    #[tokio::test]
    async fn test_abort_finished_job_is_noop() {
        let manager = manager_with(&["a"]);
        let job = manager.create_job(Query::all(), TimeRange::all());
        let done = manager.wait_for(job.id).await.unwrap();

        manager.abort_job(job.id).unwrap();
        let after = manager.get_job(job.id).unwrap();
        assert_eq!(after.job.state, JobState::Finished);
        assert_eq!(after.job.end_time, done.job.end_time);
    }

    #[tokio::test]
    async fn test_remove_job() {
        let manager = manager_with(&["a", "b"]);
        let done = manager.create_job(Query::all(), TimeRange::all());
        manager.wait_for(done.id).await.unwrap();
        let kept = manager.create_job(Query::all(), TimeRange::all());

        let removed = manager.remove_job(done.id).unwrap();
        assert_eq!(removed.id, done.id);
        assert_eq!(removed.state, JobState::Finished);

        assert!(matches!(manager.get_job(done.id), Err(JobError::NotFound(_))));
        assert!(matches!(manager.get_results(done.id, 0, 10), Err(JobError::NotFound(_))));
        assert!(matches!(manager.remove_job(done.id), Err(JobError::NotFound(_))));

        let listed: Vec<i64> = manager.list_jobs().iter().map(|j| j.id).collect();
        assert_eq!(listed, vec![kept.id]);

        // Ids are never handed out again after a removal
        let next = manager.create_job(Query::all(), TimeRange::all());
        assert_eq!(next.id, kept.id + 1);
    }

    #[tokio::test]
    async fn test_get_results_pages() {
        let manager = manager_with(&["x=1", "x=2", "x=3", "y=4"]);
        let job = manager.create_job(Query::keywords("x"), TimeRange::all());
        manager.wait_for(job.id).await.unwrap();

        let page = manager.get_results(job.id, 0, 2).unwrap();
        let ids: Vec<i64> = page.events.iter().map(|e| e.id).collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&3) && ids.contains(&2));

        let rest = manager.get_results(job.id, 2, 10).unwrap();
        assert_eq!(rest.events.len(), 1);
        assert_eq!(rest.events[0].id, 1);
    }
}

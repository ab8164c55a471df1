//! Job and job statistics types

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Fields;

/// Lifecycle state of a search job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Running,
    Finished,
    Aborted,
}

impl JobState {
    /// Finished and Aborted are terminal; no transition leaves them
    pub fn is_terminal(self) -> bool {
        !matches!(self, JobState::Running)
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobState::Running => write!(f, "running"),
            JobState::Finished => write!(f, "finished"),
            JobState::Aborted => write!(f, "aborted"),
        }
    }
}

/// One asynchronous search execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: i64,
    pub state: JobState,

    /// Display form of the predicate the job runs
    pub query: String,

    pub start_time: DateTime<Utc>,

    /// Set exactly once, on the transition into a terminal state
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,

    /// Fatal error that aborted the job
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Non-fatal problems met while scanning (corrupt rows)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl Job {
    pub fn new(id: i64, query: String) -> Self {
        Self {
            id,
            state: JobState::Running,
            query,
            start_time: Utc::now(),
            end_time: None,
            error: None,
            warnings: Vec::new(),
        }
    }

    /// Move into a terminal state, stamping the end time
    ///
    /// Returns false (and changes nothing) if the job is already terminal.
    pub fn terminate(&mut self, state: JobState) -> bool {
        debug_assert!(state.is_terminal());
        if self.state.is_terminal() {
            return false;
        }
        self.state = state;
        self.end_time = Some(Utc::now());
        true
    }
}

/// Live and final aggregates of a job
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStats {
    /// Fraction of the estimated scan completed, in `[0, 1]`
    pub estimated_progress: f32,
    pub num_matched_events: i64,

    /// field name -> number of matched events carrying it
    pub field_occurrences: BTreeMap<String, i64>,

    /// field name -> value -> number of matched events
    pub field_value_occurrences: BTreeMap<String, BTreeMap<String, i64>>,
}

impl JobStats {
    /// Account for one matched event and the fields extracted from it
    pub fn record_match(&mut self, fields: &Fields) {
        self.num_matched_events += 1;
        for (name, value) in fields {
            *self.field_occurrences.entry(name.clone()).or_insert(0) += 1;
            *self
                .field_value_occurrences
                .entry(name.clone())
                .or_default()
                .entry(value.clone())
                .or_insert(0) += 1;
        }
    }

    /// Recompute progress from scanned/estimated, never moving backwards
    pub fn advance_progress(&mut self, scanned: u64, estimated: u64) {
        let ratio = if estimated == 0 {
            1.0
        } else {
            (scanned as f64 / estimated as f64).clamp(0.0, 1.0) as f32
        };
        if ratio > self.estimated_progress {
            self.estimated_progress = ratio;
        }
    }

    /// Most frequent values of a field, count descending then value ascending
    pub fn top_values(&self, field: &str, limit: usize) -> Vec<FieldValueCount> {
        let Some(values) = self.field_value_occurrences.get(field) else {
            return Vec::new();
        };

        let mut counts: Vec<FieldValueCount> = values
            .iter()
            .map(|(value, count)| FieldValueCount {
                value: value.clone(),
                count: *count,
            })
            .collect();
        counts.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.value.cmp(&b.value)));
        counts.truncate(limit);
        counts
    }
}

/// One entry of a field value breakdown
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldValueCount {
    pub value: String,
    pub count: i64,
}

/// Job state and stats captured at one instant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub job: Job,
    pub stats: JobStats,
}

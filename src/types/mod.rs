//! Data types shared by the store and the job engine

mod event;
mod job;
mod query;

use std::collections::BTreeMap;

pub use event::{Event, NewEvent, SortMode};
pub use job::{FieldValueCount, Job, JobSnapshot, JobState, JobStats};
pub use query::{Query, TimeRange};

/// Fields extracted from one event: name -> value
pub type Fields = BTreeMap<String, String>;

//! Search jobs
//!
//! - `JobManager`: create, inspect, abort and await jobs
//! - `pipeline`: the per-job scan → filter → extract → aggregate loop
//!
//! Jobs are asynchronous. `create_job` returns immediately with a Running
//! job; callers poll `get_job` (or await `wait_for`) for progress and
//! results. Stats are only ever written by the job's own pipeline.

mod error;
mod manager;
mod pipeline;

pub use error::{JobError, JobResult};
pub use manager::{JobManager, JobSettings};

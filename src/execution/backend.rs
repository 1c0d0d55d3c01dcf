//! Execution backend protocol.
//!
//! The core needs exactly four operations from whatever actually runs
//! queries: submit a job, poll its status, fetch its result, and ask for it
//! to be cancelled. The wire format is the implementor's concern.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

use super::types::ResultSet;
use crate::error::Result;
use crate::model::Query;

/// Backend-assigned job identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Job state as reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    /// Waiting for a worker.
    Queued,
    /// A worker is executing the query.
    Running,
    /// Finished; the result can be fetched.
    Finished,
    /// The query failed.
    Failed(String),
    /// The job stopped because cancellation was requested.
    Cancelled,
}

/// One poll response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobStatus {
    pub state: JobState,
    /// Free-form progress text, if the backend provides any.
    pub progress: Option<String>,
}

impl JobStatus {
    pub fn new(state: JobState) -> Self {
        Self {
            state,
            progress: None,
        }
    }
}

/// Trait defining the interface for execution backends.
///
/// All operations are async and return Results with QueryViewError.
#[async_trait]
pub trait ExecutionBackend: Send + Sync {
    /// Submits the query with its applied parameter values.
    async fn submit(&self, query: &Query, parameters: &BTreeMap<String, Value>) -> Result<JobId>;

    /// Returns the job's current status.
    async fn poll_status(&self, job: &JobId) -> Result<JobStatus>;

    /// Fetches the result of a finished job.
    async fn fetch_result(&self, job: &JobId) -> Result<ResultSet>;

    /// Asks the backend to stop the job. Best-effort; the job may still
    /// finish normally.
    async fn request_cancel(&self, job: &JobId) -> Result<()>;
}

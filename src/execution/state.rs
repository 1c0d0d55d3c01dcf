//! Execution lifecycle states, tokens and stored results.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::time::Duration;

use super::types::{duration_ms, ColumnInfo, ResultSet, Row};
use crate::error::QueryViewError;

/// Monotonic identifier of one execution.
///
/// Every asynchronous event is tagged with the token of the execution that
/// produced it; events whose token is not the controller's current one are
/// dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ExecutionToken(u64);

impl ExecutionToken {
    pub(crate) fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the inner u64 value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ExecutionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle state of the query's execution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionState {
    #[default]
    Idle,
    Executing,
    Cancelling,
    Succeeded,
    Failed,
}

impl ExecutionState {
    /// Returns true while an execution is in flight.
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Executing | Self::Cancelling)
    }

    /// Returns true for `Succeeded` and `Failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Executing => "executing",
            Self::Cancelling => "cancelling",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why an execution ended in `Failed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExecutionError {
    /// The backend reported a failure (including a cancelled job).
    Failed { message: String },
    /// A cancel request was never acknowledged by the backend.
    CancelTimeout { after_ms: u64 },
}

impl ExecutionError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }

    /// Returns the message shown in the error banner.
    pub fn message(&self) -> String {
        match self {
            Self::Failed { message } => message.clone(),
            Self::CancelTimeout { after_ms } => {
                format!("Cancellation was not acknowledged within {after_ms}ms")
            }
        }
    }
}

impl From<ExecutionError> for QueryViewError {
    fn from(err: ExecutionError) -> Self {
        match err {
            ExecutionError::Failed { message } => QueryViewError::ExecutionFailed(message),
            ExecutionError::CancelTimeout { after_ms } => QueryViewError::CancelTimeout(after_ms),
        }
    }
}

/// Terminal status of a stored result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    Succeeded,
    Failed,
}

impl From<ResultStatus> for ExecutionState {
    fn from(status: ResultStatus) -> Self {
        match status {
            ResultStatus::Succeeded => ExecutionState::Succeeded,
            ResultStatus::Failed => ExecutionState::Failed,
        }
    }
}

/// The outcome of one execution, stored by the controller.
///
/// Results are never mutated: a new execution replaces the stored result
/// wholesale.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    /// Execution that produced this result.
    pub token: ExecutionToken,
    pub status: ResultStatus,
    pub columns: Vec<ColumnInfo>,
    /// Empty for failed executions.
    pub rows: Vec<Row>,
    /// Present iff `status` is `Failed`.
    pub error: Option<ExecutionError>,
    pub retrieved_at: DateTime<Utc>,
    #[serde(with = "duration_ms")]
    pub runtime: Duration,
}

impl QueryResult {
    /// Wraps a fetched result set.
    pub fn succeeded(token: ExecutionToken, result: ResultSet) -> Self {
        Self {
            token,
            status: ResultStatus::Succeeded,
            columns: result.columns,
            rows: result.rows,
            error: None,
            retrieved_at: result.retrieved_at,
            runtime: result.runtime,
        }
    }

    /// Records a failure observed after `runtime`.
    pub fn failed(token: ExecutionToken, error: ExecutionError, runtime: Duration) -> Self {
        Self {
            token,
            status: ResultStatus::Failed,
            columns: Vec::new(),
            rows: Vec::new(),
            error: Some(error),
            retrieved_at: Utc::now(),
            runtime,
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

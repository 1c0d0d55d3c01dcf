//! Query execution: the lifecycle state machine, the backend protocol, and
//! the per-execution runner task.
//!
//! This module isolates everything asynchronous about running a query from
//! the view state that depends on it.

pub mod backend;
pub mod controller;
pub mod mock;
pub mod runner;
pub mod state;
pub mod types;

pub use backend::{ExecutionBackend, JobId, JobState, JobStatus};
pub use controller::{
    CancelOutcome, DiscardReason, ExecutionController, JobPhase, Progress, Submission, Transition,
};
pub use mock::MockExecutionBackend;
pub use runner::{ExecutionEvent, ExecutionEventKind, ExecutionTask};
pub use state::{ExecutionError, ExecutionState, ExecutionToken, QueryResult, ResultStatus};
pub use types::{ColumnInfo, ResultSet, Row, Value};

//! Error types for queryview.
//!
//! Defines the main error enum used throughout the crate, plus the gate
//! rejection reasons that the execution gate reports back to the caller.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::model::VisualizationId;

/// Why the execution gate refused to submit a query.
///
/// Gate rejections are expected conditions: the caller renders them (usually
/// as a disabled button), they never abort anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GateRejection {
    /// The caller lacks execute capability, or the data source forbids it.
    NoPermission,
    /// An execution is already in flight and supersession was not requested.
    AlreadyRunning,
    /// Parameter values were edited but not applied yet.
    ParametersDirty,
}

impl GateRejection {
    /// Returns a stable reason code for display and scripting.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NoPermission => "no_permission",
            Self::AlreadyRunning => "already_running",
            Self::ParametersDirty => "parameters_dirty",
        }
    }
}

impl fmt::Display for GateRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Self::NoPermission => "not permitted to execute this query",
            Self::AlreadyRunning => "query is already running",
            Self::ParametersDirty => "parameter values have unapplied changes",
        };
        f.write_str(msg)
    }
}

/// Main error type for queryview operations.
#[derive(Error, Debug)]
pub enum QueryViewError {
    /// The execution gate refused the request.
    #[error("Execution rejected: {0}")]
    GateRejected(GateRejection),

    /// A parameter name that the query does not define.
    #[error("Unknown parameter: {0}")]
    UnknownParameter(String),

    /// A visualization id that does not belong to the current query.
    #[error("No such visualization: {0}")]
    NoSuchVisualization(VisualizationId),

    /// An edit was attempted on a query the caller may not edit.
    #[error("Query is not editable")]
    ReadOnly,

    /// The backend reported that the query failed.
    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    /// The backend never acknowledged a cancel request in time.
    #[error("Cancellation timed out after {0}ms")]
    CancelTimeout(u64),

    /// Execution backend transport errors (submit/poll/fetch failed).
    #[error("Backend error: {0}")]
    Backend(String),

    /// Query store errors (saving a description, schedule or visualization).
    #[error("Store error: {0}")]
    Store(String),

    /// Configuration errors (invalid config file, bad CLI values, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal errors (actor closed, unexpected states, bugs, etc.)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl QueryViewError {
    /// Creates a backend error with the given message.
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }

    /// Creates a store error with the given message.
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates an internal error with the given message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns the gate rejection reason, if this is a gate error.
    pub fn gate_reason(&self) -> Option<GateRejection> {
        match self {
            Self::GateRejected(reason) => Some(*reason),
            _ => None,
        }
    }

    /// Returns the error category as a string for display purposes.
    pub fn category(&self) -> &'static str {
        match self {
            Self::GateRejected(_) => "Gate Rejected",
            Self::UnknownParameter(_) => "Unknown Parameter",
            Self::NoSuchVisualization(_) => "No Such Visualization",
            Self::ReadOnly => "Read Only",
            Self::ExecutionFailed(_) => "Execution Failed",
            Self::CancelTimeout(_) => "Cancel Timeout",
            Self::Backend(_) => "Backend Error",
            Self::Store(_) => "Store Error",
            Self::Config(_) => "Configuration Error",
            Self::Internal(_) => "Internal Error",
        }
    }
}

impl From<GateRejection> for QueryViewError {
    fn from(reason: GateRejection) -> Self {
        Self::GateRejected(reason)
    }
}

/// Result type alias using QueryViewError.
pub type Result<T> = std::result::Result<T, QueryViewError>;

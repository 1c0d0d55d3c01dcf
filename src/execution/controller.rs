//! The execution state machine.
//!
//! `ExecutionController` is synchronous and owns no tasks: the session actor
//! feeds it submit/cancel requests and the events produced by runner tasks,
//! one at a time. Ordering between a cancel request and a late completion is
//! settled by execution tokens, not by locking.
//!
//! ```text
//! Idle|Succeeded|Failed --submit--> Executing --complete--> Succeeded|Failed
//!                                       |
//!                                    cancel
//!                                       v
//!                                  Cancelling --complete|timeout--> Succeeded|Failed
//! ```

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

use super::state::{ExecutionError, ExecutionState, ExecutionToken, QueryResult};
use super::types::ResultSet;
use crate::error::GateRejection;

/// A successfully submitted execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Submission {
    pub token: ExecutionToken,
    /// The in-flight execution this one replaced, if any.
    pub superseded: Option<ExecutionToken>,
}

/// What a cancel request did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "token", rename_all = "snake_case")]
pub enum CancelOutcome {
    /// Moved from `Executing` to `Cancelling`.
    Requested(ExecutionToken),
    /// Already `Cancelling`; nothing changed.
    AlreadyCancelling(ExecutionToken),
    /// No execution in flight; nothing changed.
    NotExecuting,
}

/// Whether an asynchronous event changed the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Applied,
    Discarded(DiscardReason),
}

impl Transition {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied)
    }
}

/// Why an event was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    /// The event belongs to an execution that is no longer current.
    StaleToken { current: Option<ExecutionToken> },
    /// The current execution already reached a terminal state.
    AlreadySettled,
}

/// Backend-side phase reported while an execution is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobPhase {
    Queued,
    Running,
}

/// Latest intermediate status of the in-flight execution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Progress {
    pub phase: JobPhase,
    pub detail: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Owns the lifecycle of a single query's executions.
#[derive(Debug)]
pub struct ExecutionController {
    state: ExecutionState,
    current: Option<ExecutionToken>,
    next_token: u64,
    result: Option<Arc<QueryResult>>,
    progress: Option<Progress>,
    started_at: Option<Instant>,
    discarded: u64,
}

impl ExecutionController {
    pub fn new() -> Self {
        Self {
            state: ExecutionState::Idle,
            current: None,
            next_token: 1,
            result: None,
            progress: None,
            started_at: None,
            discarded: 0,
        }
    }

    pub fn state(&self) -> ExecutionState {
        self.state
    }

    /// Token of the latest submitted execution, if any.
    pub fn current_token(&self) -> Option<ExecutionToken> {
        self.current
    }

    /// Result of the current execution once it has settled.
    pub fn result(&self) -> Option<&Arc<QueryResult>> {
        self.result.as_ref()
    }

    pub fn progress(&self) -> Option<&Progress> {
        self.progress.as_ref()
    }

    /// Time since the current execution was submitted.
    pub fn elapsed(&self) -> Option<Duration> {
        self.started_at.map(|t| t.elapsed())
    }

    /// Number of stale or late events dropped so far.
    pub fn discarded_count(&self) -> u64 {
        self.discarded
    }

    /// Starts a new execution.
    ///
    /// While another execution is in flight this fails with `AlreadyRunning`
    /// and issues no token, unless `supersede` is set; then the previous token
    /// is invalidated before the new one is issued.
    pub fn submit(&mut self, supersede: bool) -> Result<Submission, GateRejection> {
        let superseded = if self.state.is_running() {
            if !supersede {
                return Err(GateRejection::AlreadyRunning);
            }
            self.current.take()
        } else {
            None
        };

        let token = ExecutionToken::new(self.next_token);
        self.next_token += 1;

        self.current = Some(token);
        self.state = ExecutionState::Executing;
        self.result = None;
        self.progress = None;
        self.started_at = Some(Instant::now());

        match superseded {
            Some(old) => info!(token = %token, superseded = %old, "Execution superseded"),
            None => info!(token = %token, "Execution submitted"),
        }

        Ok(Submission { token, superseded })
    }

    /// Records an intermediate status (queued → running) for `token`.
    pub fn status_update(
        &mut self,
        token: ExecutionToken,
        phase: JobPhase,
        detail: Option<String>,
    ) -> Transition {
        if let Err(reason) = self.check_in_flight(token) {
            return self.discard(token, reason, "status update");
        }
        self.progress = Some(Progress {
            phase,
            detail,
            updated_at: Utc::now(),
        });
        Transition::Applied
    }

    /// Settles `token` with the backend's terminal outcome.
    ///
    /// Accepted from `Executing` and `Cancelling`; whichever outcome arrives
    /// first wins and later arrivals for the same token are dropped.
    pub fn complete(
        &mut self,
        token: ExecutionToken,
        outcome: Result<ResultSet, ExecutionError>,
    ) -> Transition {
        if let Err(reason) = self.check_in_flight(token) {
            return self.discard(token, reason, "completion");
        }

        let result = match outcome {
            Ok(set) => {
                info!(token = %token, rows = set.row_count(), "Execution succeeded");
                self.state = ExecutionState::Succeeded;
                QueryResult::succeeded(token, set)
            }
            Err(error) => {
                info!(token = %token, error = %error.message(), "Execution failed");
                self.state = ExecutionState::Failed;
                QueryResult::failed(token, error, self.elapsed().unwrap_or_default())
            }
        };
        self.result = Some(Arc::new(result));
        self.progress = None;
        Transition::Applied
    }

    /// Requests cancellation of the in-flight execution.
    ///
    /// Only `Executing` moves to `Cancelling`; the backend is expected to
    /// deliver a terminal outcome later.
    pub fn cancel(&mut self) -> CancelOutcome {
        match (self.state, self.current) {
            (ExecutionState::Executing, Some(token)) => {
                info!(token = %token, "Cancellation requested");
                self.state = ExecutionState::Cancelling;
                CancelOutcome::Requested(token)
            }
            (ExecutionState::Cancelling, Some(token)) => CancelOutcome::AlreadyCancelling(token),
            _ => CancelOutcome::NotExecuting,
        }
    }

    /// Forces `Failed` with a cancel timeout if `token` is still `Cancelling`.
    pub fn cancel_timeout(&mut self, token: ExecutionToken, after: Duration) -> Transition {
        if self.current != Some(token) {
            return Transition::Discarded(DiscardReason::StaleToken {
                current: self.current,
            });
        }
        if self.state != ExecutionState::Cancelling {
            return Transition::Discarded(DiscardReason::AlreadySettled);
        }

        let after_ms = after.as_millis() as u64;
        info!(token = %token, after_ms, "Cancellation timed out");
        self.state = ExecutionState::Failed;
        self.result = Some(Arc::new(QueryResult::failed(
            token,
            ExecutionError::CancelTimeout { after_ms },
            self.elapsed().unwrap_or_default(),
        )));
        self.progress = None;
        Transition::Applied
    }

    fn check_in_flight(&self, token: ExecutionToken) -> Result<(), DiscardReason> {
        if self.current != Some(token) {
            return Err(DiscardReason::StaleToken {
                current: self.current,
            });
        }
        if !self.state.is_running() {
            return Err(DiscardReason::AlreadySettled);
        }
        Ok(())
    }

    fn discard(&mut self, token: ExecutionToken, reason: DiscardReason, what: &str) -> Transition {
        self.discarded += 1;
        debug!(token = %token, ?reason, "Discarded {what}");
        Transition::Discarded(reason)
    }
}

impl Default for ExecutionController {
    fn default() -> Self {
        Self::new()
    }
}

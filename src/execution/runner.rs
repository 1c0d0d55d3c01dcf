//! One task per in-flight execution.
//!
//! The runner drives submit → poll → fetch against the backend and reports
//! every observation back to the session as an `ExecutionEvent` tagged with
//! the execution's token. It never touches view state itself.
//!
//! Two cooperative flags control it: `cancel` asks the backend to stop the
//! job (the runner keeps polling, since the job may still finish), and
//! `abandon` makes the runner stop polling and exit.

use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::backend::{ExecutionBackend, JobId, JobState};
use super::controller::JobPhase;
use super::state::{ExecutionError, ExecutionToken};
use super::types::ResultSet;
use crate::model::Query;

/// Consecutive poll failures tolerated before the execution is failed.
pub const MAX_POLL_FAILURES: u32 = 3;

/// Message shown when the backend confirms a cancellation.
pub const CANCELLED_MESSAGE: &str = "Query execution was cancelled";

/// An observation about one execution.
#[derive(Debug)]
pub struct ExecutionEvent {
    pub token: ExecutionToken,
    pub kind: ExecutionEventKind,
}

#[derive(Debug)]
pub enum ExecutionEventKind {
    /// The backend accepted the job.
    Submitted(JobId),
    /// Intermediate status while the job is queued or running.
    Status {
        phase: JobPhase,
        detail: Option<String>,
    },
    /// Terminal outcome.
    Completed(Result<ResultSet, ExecutionError>),
}

/// Handle to a spawned execution task.
pub struct ExecutionTask {
    pub token: ExecutionToken,
    pub started_at: Instant,
    cancel: CancellationToken,
    abandon: CancellationToken,
}

impl ExecutionTask {
    /// Spawns the runner for `token`.
    pub fn spawn(
        backend: Arc<dyn ExecutionBackend>,
        query: Arc<Query>,
        parameters: BTreeMap<String, Value>,
        token: ExecutionToken,
        poll_interval: Duration,
        events: mpsc::Sender<ExecutionEvent>,
    ) -> Self {
        let cancel = CancellationToken::new();
        let abandon = CancellationToken::new();

        let runner = Runner {
            backend,
            query,
            parameters,
            token,
            poll_interval,
            events,
            cancel: cancel.clone(),
            abandon: abandon.clone(),
        };

        tokio::spawn(runner.run());

        Self {
            token,
            started_at: Instant::now(),
            cancel,
            abandon,
        }
    }

    /// Asks the backend to cancel the job; the runner keeps polling.
    pub fn request_cancel(&self) {
        self.cancel.cancel();
    }

    /// Stops polling. Events already sent may still arrive.
    pub fn abandon(&self) {
        self.abandon.cancel();
    }

    /// Cancels the backend job and stops polling.
    pub fn supersede(&self) {
        self.cancel.cancel();
        self.abandon.cancel();
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }
}

struct Runner {
    backend: Arc<dyn ExecutionBackend>,
    query: Arc<Query>,
    parameters: BTreeMap<String, Value>,
    token: ExecutionToken,
    poll_interval: Duration,
    events: mpsc::Sender<ExecutionEvent>,
    cancel: CancellationToken,
    abandon: CancellationToken,
}

impl Runner {
    async fn run(self) {
        // Submit is never dropped midway, so every job it creates can still be
        // cancelled below.
        let submitted = self.backend.submit(&self.query, &self.parameters).await;

        let job = match submitted {
            Ok(job) => job,
            Err(e) if self.abandon.is_cancelled() => {
                debug!(token = %self.token, "Submit failed after abandon: {e}");
                return;
            }
            Err(e) => {
                warn!(token = %self.token, "Submit failed: {e}");
                self.finish(Err(ExecutionError::failed(e.to_string())))
                    .await;
                return;
            }
        };
        debug!(token = %self.token, job = %job, "Job submitted");

        if self.abandon.is_cancelled() {
            if self.cancel.is_cancelled() {
                self.send_cancel(&job).await;
            }
            debug!(token = %self.token, job = %job, "Runner abandoned during submit");
            return;
        }
        if !self.emit(ExecutionEventKind::Submitted(job.clone())).await {
            return;
        }

        self.poll_until_done(&job).await;
    }

    async fn poll_until_done(&self, job: &JobId) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut cancel_sent = false;
        let mut poll_failures = 0;
        let mut last_phase = None;

        loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled(), if !cancel_sent => {
                    cancel_sent = true;
                    self.send_cancel(job).await;
                    continue;
                }
                _ = self.abandon.cancelled() => {
                    debug!(token = %self.token, job = %job, "Runner abandoned");
                    return;
                }
                _ = ticker.tick() => {}
            }

            let status = match self.backend.poll_status(job).await {
                Ok(status) => {
                    poll_failures = 0;
                    status
                }
                Err(e) => {
                    poll_failures += 1;
                    warn!(token = %self.token, job = %job, poll_failures, "Poll failed: {e}");
                    if poll_failures >= MAX_POLL_FAILURES {
                        self.finish(Err(ExecutionError::failed(format!(
                            "Lost contact with job {job}: {e}"
                        ))))
                        .await;
                        return;
                    }
                    continue;
                }
            };

            let phase = match status.state {
                JobState::Queued => JobPhase::Queued,
                JobState::Running => JobPhase::Running,
                JobState::Finished => {
                    let outcome = self
                        .backend
                        .fetch_result(job)
                        .await
                        .map_err(|e| ExecutionError::failed(e.to_string()));
                    self.finish(outcome).await;
                    return;
                }
                JobState::Failed(message) => {
                    self.finish(Err(ExecutionError::failed(message))).await;
                    return;
                }
                JobState::Cancelled => {
                    self.finish(Err(ExecutionError::failed(CANCELLED_MESSAGE)))
                        .await;
                    return;
                }
            };

            if last_phase != Some(phase) || status.progress.is_some() {
                last_phase = Some(phase);
                let kind = ExecutionEventKind::Status {
                    phase,
                    detail: status.progress,
                };
                if !self.emit(kind).await {
                    return;
                }
            }
        }
    }

    async fn send_cancel(&self, job: &JobId) {
        if let Err(e) = self.backend.request_cancel(job).await {
            warn!(token = %self.token, job = %job, "Cancel request failed: {e}");
        }
    }

    async fn finish(&self, outcome: Result<ResultSet, ExecutionError>) {
        self.emit(ExecutionEventKind::Completed(outcome)).await;
    }

    /// Sends an event; returns false once the session has gone away.
    async fn emit(&self, kind: ExecutionEventKind) -> bool {
        let event = ExecutionEvent {
            token: self.token,
            kind,
        };
        self.events.send(event).await.is_ok()
    }
}

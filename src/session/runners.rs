//! Bookkeeping for the runner tasks a session has started.
//!
//! Kept apart from the actor loop so it can be tested without one. The
//! registry owns every live `ExecutionTask` and the cancel deadlines of the
//! ones waiting for a cancel acknowledgement.

use std::collections::HashMap;
use tokio::time::Instant;
use tracing::debug;

use crate::execution::{ExecutionTask, ExecutionToken};

/// Live runner tasks, keyed by token.
#[derive(Default)]
pub struct RunnerRegistry {
    tasks: HashMap<ExecutionToken, ExecutionTask>,
    deadlines: Vec<(Instant, ExecutionToken)>,
}

impl RunnerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, task: ExecutionTask) {
        debug!(token = %task.token, "Runner started");
        self.tasks.insert(task.token, task);
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Forwards a cancel request and arms its deadline.
    ///
    /// Returns false if no runner exists for `token`.
    pub fn request_cancel(&mut self, token: ExecutionToken, deadline: Instant) -> bool {
        let Some(task) = self.tasks.get(&token) else {
            return false;
        };
        task.request_cancel();
        self.deadlines.retain(|(_, t)| *t != token);
        self.deadlines.push((deadline, token));
        true
    }

    /// Cancels the backend job of a replaced execution and stops its runner.
    pub fn supersede(&mut self, token: ExecutionToken) {
        if let Some(task) = self.remove(token) {
            debug!(token = %token, "Runner superseded");
            task.supersede();
        }
    }

    /// Stops polling for `token` without another backend call.
    pub fn abandon(&mut self, token: ExecutionToken) {
        if let Some(task) = self.remove(token) {
            debug!(token = %token, elapsed_ms = task.elapsed().as_millis() as u64, "Runner abandoned");
            task.abandon();
        }
    }

    /// Forgets a runner that delivered its terminal event.
    pub fn finish(&mut self, token: ExecutionToken) {
        self.remove(token);
    }

    /// The earliest armed cancel deadline.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.deadlines.iter().map(|(at, _)| *at).min()
    }

    /// Removes and returns the tokens whose deadline is at or before `now`.
    pub fn take_expired(&mut self, now: Instant) -> Vec<ExecutionToken> {
        let mut expired = Vec::new();
        self.deadlines.retain(|(at, token)| {
            if *at <= now {
                expired.push(*token);
                false
            } else {
                true
            }
        });
        expired
    }

    /// Stops every runner, cancelling their backend jobs.
    pub fn shutdown(&mut self) {
        for (_, task) in self.tasks.drain() {
            task.supersede();
        }
        self.deadlines.clear();
    }

    fn remove(&mut self, token: ExecutionToken) -> Option<ExecutionTask> {
        self.deadlines.retain(|(_, t)| *t != token);
        self.tasks.remove(&token)
    }
}

//! Mock execution backend for testing.
//!
//! Provides an in-memory backend for headless mode and tests. Jobs move
//! through queued → running → finished on the tokio clock, so tests with a
//! paused clock control them precisely.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

use super::backend::{ExecutionBackend, JobId, JobState, JobStatus};
use super::types::{ColumnInfo, ResultSet, Row, Value};
use crate::error::{QueryViewError, Result};
use crate::model::Query;

#[derive(Debug)]
struct MockJob {
    submitted_at: Instant,
    parameters: BTreeMap<String, JsonValue>,
    cancel_requested: bool,
}

/// A mock backend that returns generated results after a fixed latency.
pub struct MockExecutionBackend {
    latency: Duration,
    submit_delay: Duration,
    rows: usize,
    failure: Option<String>,
    submit_error: Option<String>,
    honor_cancel: bool,
    jobs: Mutex<HashMap<JobId, MockJob>>,
    submissions: AtomicUsize,
    cancel_requests: AtomicUsize,
}

impl MockExecutionBackend {
    /// Creates a backend that finishes every job after 50ms with 3 rows.
    pub fn new() -> Self {
        Self {
            latency: Duration::from_millis(50),
            submit_delay: Duration::ZERO,
            rows: 3,
            failure: None,
            submit_error: None,
            honor_cancel: true,
            jobs: Mutex::new(HashMap::new()),
            submissions: AtomicUsize::new(0),
            cancel_requests: AtomicUsize::new(0),
        }
    }

    /// Sets how long a job takes from submission to completion.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Makes `submit` take `delay` before the job exists.
    pub fn with_submit_delay(mut self, delay: Duration) -> Self {
        self.submit_delay = delay;
        self
    }

    /// Sets how many rows each finished job returns.
    pub fn with_rows(mut self, rows: usize) -> Self {
        self.rows = rows;
        self
    }

    /// Makes every job fail with the given message.
    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(message.into());
        self
    }

    /// Makes every submission fail at the transport level.
    pub fn rejecting_submit(mut self, message: impl Into<String>) -> Self {
        self.submit_error = Some(message.into());
        self
    }

    /// Acknowledges cancel requests but keeps running the job to completion.
    pub fn ignoring_cancel(mut self) -> Self {
        self.honor_cancel = false;
        self
    }

    /// Number of jobs submitted so far.
    pub fn submissions(&self) -> usize {
        self.submissions.load(Ordering::SeqCst)
    }

    /// Number of cancel requests received so far.
    pub fn cancel_requests(&self) -> usize {
        self.cancel_requests.load(Ordering::SeqCst)
    }

    fn jobs(&self) -> Result<MutexGuard<'_, HashMap<JobId, MockJob>>> {
        self.jobs
            .lock()
            .map_err(|_| QueryViewError::internal("mock job table poisoned"))
    }

    fn state_of(&self, job: &MockJob) -> JobState {
        let elapsed = job.submitted_at.elapsed();
        if job.cancel_requested && self.honor_cancel {
            JobState::Cancelled
        } else if elapsed < self.latency / 2 {
            JobState::Queued
        } else if elapsed < self.latency {
            JobState::Running
        } else if let Some(message) = &self.failure {
            JobState::Failed(message.clone())
        } else {
            JobState::Finished
        }
    }

    fn build_result(&self, parameters: &BTreeMap<String, JsonValue>) -> ResultSet {
        let mut columns = vec![ColumnInfo::new("row", "integer")];
        columns.extend(
            parameters
                .keys()
                .map(|name| ColumnInfo::new(name.as_str(), "text")),
        );

        let rows: Vec<Row> = (0..self.rows)
            .map(|i| {
                let mut row = vec![Value::Int(i as i64 + 1)];
                row.extend(parameters.values().map(json_to_value));
                row
            })
            .collect();

        ResultSet::with_data(columns, rows).with_runtime(self.latency)
    }
}

impl Default for MockExecutionBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn json_to_value(value: &JsonValue) -> Value {
    match value {
        JsonValue::Null => Value::Null,
        JsonValue::Bool(b) => Value::Bool(*b),
        JsonValue::Number(n) => match n.as_i64() {
            Some(i) => Value::Int(i),
            None => Value::Float(n.as_f64().unwrap_or_default()),
        },
        JsonValue::String(s) => Value::String(s.clone()),
        other => Value::String(other.to_string()),
    }
}

#[async_trait]
impl ExecutionBackend for MockExecutionBackend {
    async fn submit(
        &self,
        _query: &Query,
        parameters: &BTreeMap<String, JsonValue>,
    ) -> Result<JobId> {
        if !self.submit_delay.is_zero() {
            tokio::time::sleep(self.submit_delay).await;
        }
        if let Some(message) = &self.submit_error {
            return Err(QueryViewError::backend(message.clone()));
        }

        let n = self.submissions.fetch_add(1, Ordering::SeqCst) + 1;
        let id = JobId(format!("job-{n}"));
        self.jobs()?.insert(
            id.clone(),
            MockJob {
                submitted_at: Instant::now(),
                parameters: parameters.clone(),
                cancel_requested: false,
            },
        );
        Ok(id)
    }

    async fn poll_status(&self, job: &JobId) -> Result<JobStatus> {
        let jobs = self.jobs()?;
        let entry = jobs
            .get(job)
            .ok_or_else(|| QueryViewError::backend(format!("Unknown job {job}")))?;

        let state = self.state_of(entry);
        let progress = match state {
            JobState::Running => Some(format!(
                "running for {}ms",
                entry.submitted_at.elapsed().as_millis()
            )),
            _ => None,
        };
        Ok(JobStatus { state, progress })
    }

    async fn fetch_result(&self, job: &JobId) -> Result<ResultSet> {
        let jobs = self.jobs()?;
        let entry = jobs
            .get(job)
            .ok_or_else(|| QueryViewError::backend(format!("Unknown job {job}")))?;

        match self.state_of(entry) {
            JobState::Finished => Ok(self.build_result(&entry.parameters)),
            other => Err(QueryViewError::backend(format!(
                "Job {job} has no result ({other:?})"
            ))),
        }
    }

    async fn request_cancel(&self, job: &JobId) -> Result<()> {
        self.cancel_requests.fetch_add(1, Ordering::SeqCst);
        let mut jobs = self.jobs()?;
        let entry = jobs
            .get_mut(job)
            .ok_or_else(|| QueryViewError::backend(format!("Unknown job {job}")))?;
        entry.cancel_requested = true;
        Ok(())
    }
}

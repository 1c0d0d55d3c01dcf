//! Read-only projection of the current execution for the UI.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use crate::execution::{
    ColumnInfo, ExecutionController, ExecutionState, ExecutionToken, Progress, QueryResult, Row,
};

/// What the results area shows: status, rows, error and timing of the
/// latest execution.
///
/// Built fresh from the controller after every applied transition; it is a
/// value, so holding on to an old one never observes later changes.
#[derive(Debug, Clone, Serialize)]
pub struct ResultView {
    pub token: Option<ExecutionToken>,
    pub status: ExecutionState,
    pub result: Option<Arc<QueryResult>>,
    pub progress: Option<Progress>,
}

impl ResultView {
    /// Projects the controller's current state.
    pub fn project(controller: &ExecutionController) -> Self {
        Self {
            token: controller.current_token(),
            status: controller.state(),
            result: controller.result().cloned(),
            progress: controller.progress().cloned(),
        }
    }

    /// Returns true when rows are available for the visualizations.
    pub fn is_done(&self) -> bool {
        self.status == ExecutionState::Succeeded
    }

    /// Rows of a successful result; empty otherwise.
    pub fn rows(&self) -> &[Row] {
        match &self.result {
            Some(result) if self.is_done() => &result.rows,
            _ => &[],
        }
    }

    pub fn columns(&self) -> &[ColumnInfo] {
        match &self.result {
            Some(result) if self.is_done() => &result.columns,
            _ => &[],
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows().len()
    }

    /// Error banner text of a failed execution.
    pub fn error(&self) -> Option<String> {
        self.result
            .as_ref()
            .and_then(|r| r.error.as_ref())
            .map(|e| e.message())
    }

    pub fn runtime(&self) -> Option<Duration> {
        self.result.as_ref().map(|r| r.runtime)
    }

    pub fn retrieved_at(&self) -> Option<DateTime<Utc>> {
        self.result.as_ref().map(|r| r.retrieved_at)
    }

    /// Footer line under the result tabs, e.g.
    /// `3 rows · 1.2 sec runtime · Updated 5 minutes ago`.
    pub fn footer(&self) -> Option<String> {
        self.footer_at(Utc::now())
    }

    /// The footer as seen at `now`.
    pub fn footer_at(&self, now: DateTime<Utc>) -> Option<String> {
        if !self.is_done() {
            return None;
        }
        let count = self.row_count();
        let runtime = self.runtime().unwrap_or_default();
        let mut footer = format!(
            "{count} {} · {} runtime",
            pluralize("row", count),
            humanize_duration(runtime)
        );
        if let Some(retrieved_at) = self.retrieved_at() {
            footer.push_str(&format!(" · Updated {}", time_ago(retrieved_at, now)));
        }
        Some(footer)
    }
}

/// Appends an `s` unless `count` is exactly one.
pub fn pluralize(word: &str, count: usize) -> String {
    if count == 1 {
        word.to_string()
    } else {
        format!("{word}s")
    }
}

/// Formats a runtime the way the result footer shows it.
pub fn humanize_duration(duration: Duration) -> String {
    let millis = duration.as_millis();
    if millis < 1000 {
        return format!("{millis} ms");
    }
    let secs = duration.as_secs_f64();
    if secs < 60.0 {
        return format!("{secs:.1} sec");
    }
    let total = duration.as_secs();
    if total < 3600 {
        format!("{} min {} sec", total / 60, total % 60)
    } else {
        format!("{} h {} min", total / 3600, (total % 3600) / 60)
    }
}

/// Relative age of `then` as seen at `now`, e.g. `3 minutes ago`.
///
/// Timestamps in the future (clock skew) read as `just now`.
pub fn time_ago(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (now - then).num_seconds().max(0);
    match secs {
        0..=44 => "just now".to_string(),
        45..=89 => "a minute ago".to_string(),
        90..=3_599 => format!("{} minutes ago", (secs + 30) / 60),
        3_600..=5_399 => "an hour ago".to_string(),
        5_400..=86_399 => format!("{} hours ago", (secs + 1_800) / 3_600),
        86_400..=129_599 => "a day ago".to_string(),
        _ => format!("{} days ago", (secs + 43_200) / 86_400),
    }
}

//! Output formatting for headless mode.
//!
//! Renders the view as a plain-text page and formats the final report as
//! text or JSON.

use serde::Serialize;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

use super::HeadlessResult;
use crate::cli::OutputFormat;
use crate::view::{ViewEvent, ViewSnapshot};

/// Renders a view snapshot as the text a user would see on the page.
pub struct ScreenRenderer;

impl ScreenRenderer {
    pub fn render(snapshot: &ViewSnapshot) -> String {
        let mut lines = vec![snapshot.title.clone()];

        if let Some(description) = snapshot.description.as_deref().filter(|d| !d.is_empty()) {
            lines.push(description.to_string());
        }

        lines.push(format!(
            "Data source: {}",
            snapshot.data_source.as_deref().unwrap_or("loading")
        ));

        let schedule = match snapshot.schedule.as_ref().and_then(|s| s.interval) {
            Some(secs) => format!("every {secs}s"),
            None => "Never".to_string(),
        };
        lines.push(format!("Refresh schedule: {schedule}"));

        if !snapshot.parameters.is_empty() {
            lines.push(format!("Parameters: {}", render_values(&snapshot.parameters)));
        }
        if snapshot.parameters_dirty {
            lines.push(format!(
                "Pending: {} (unapplied)",
                render_values(&snapshot.pending_parameters)
            ));
        }

        let mut status = format!("Status: {}", snapshot.state.as_str());
        if let Some(token) = snapshot.token {
            status.push_str(&format!(" {token}"));
        }
        if let Some(progress) = &snapshot.progress {
            status.push_str(&format!(" ({progress})"));
        }
        lines.push(status);

        if let Some(reason) = snapshot.execute_blocked_by {
            lines.push(format!("Execute disabled: {reason}"));
        }
        if !snapshot.flags.can_edit {
            lines.push("Read only".to_string());
        }
        if let Some(error) = &snapshot.error {
            lines.push(format!("Error: {error}"));
        }

        if !snapshot.visualizations.is_empty() {
            let tabs = snapshot
                .visualizations
                .iter()
                .map(|v| {
                    if Some(v.id) == snapshot.selected_visualization {
                        format!("[{}]", v.name)
                    } else {
                        v.name.clone()
                    }
                })
                .collect::<Vec<_>>()
                .join(" | ");
            lines.push(format!("Visualizations: {tabs}"));
        }

        if snapshot.visible_visualization.is_some() && !snapshot.columns.is_empty() {
            lines.push(format!("| {} |", snapshot.columns.join(" | ")));
            for row in &snapshot.rows {
                let cells = row
                    .iter()
                    .map(|v| v.to_display_string())
                    .collect::<Vec<_>>()
                    .join(" | ");
                lines.push(format!("| {cells} |"));
            }
        }

        if let Some(footer) = &snapshot.footer {
            lines.push(footer.clone());
        }

        format!("{}\n", lines.join("\n"))
    }
}

fn render_values(values: &BTreeMap<String, JsonValue>) -> String {
    values
        .iter()
        .map(|(name, value)| match value {
            JsonValue::String(s) => format!("{name}={s}"),
            other => format!("{name}={other}"),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// JSON output structure.
#[derive(Debug, Serialize)]
struct JsonOutput<'a> {
    screen: &'a str,
    transcript: &'a [String],
    events_executed: usize,
    duration_ms: u64,
    assertions: AssertionSummary<'a>,
    view_events: &'a [ViewEvent],
    state: &'a ViewSnapshot,
}

#[derive(Debug, Serialize)]
struct AssertionSummary<'a> {
    passed: usize,
    failed: usize,
    failures: &'a [String],
}

/// Formats headless execution results.
pub struct HeadlessOutput {
    format: OutputFormat,
}

impl HeadlessOutput {
    /// Creates a new output formatter.
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats the result according to the configured format.
    pub fn format(&self, result: &HeadlessResult) -> String {
        match self.format {
            OutputFormat::Text => self.format_text(result),
            OutputFormat::Json => self.format_json(result),
        }
    }

    fn format_text(&self, result: &HeadlessResult) -> String {
        let assertions = if result.assertions_passed > 0 || result.assertions_failed > 0 {
            format!(
                " | Assertions: {} passed, {} failed",
                result.assertions_passed, result.assertions_failed
            )
        } else {
            String::new()
        };

        let failures = result
            .failures
            .iter()
            .map(|f| format!("FAILED {f}\n"))
            .collect::<String>();

        format!(
            "{}\nEvents: {} executed in {}ms{}\n{}",
            result.screen,
            result.events_executed,
            result.duration.as_millis(),
            assertions,
            failures
        )
    }

    fn format_json(&self, result: &HeadlessResult) -> String {
        let json_output = JsonOutput {
            screen: &result.screen,
            transcript: &result.transcript,
            events_executed: result.events_executed,
            duration_ms: result.duration.as_millis() as u64,
            assertions: AssertionSummary {
                passed: result.assertions_passed,
                failed: result.assertions_failed,
                failures: &result.failures,
            },
            view_events: &result.view_events,
            state: &result.snapshot,
        };

        serde_json::to_string_pretty(&json_output)
            .unwrap_or_else(|e| format!("{{\"error\": \"Failed to serialize: {}\"}}", e))
    }
}

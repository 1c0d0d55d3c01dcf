//! Serializable picture of the whole view, for hosts and headless output.

use serde::Serialize;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

use super::facade::{ExecuteOptions, QueryView};
use super::flags::QueryFlags;
use crate::error::GateRejection;
use crate::execution::{ExecutionState, ExecutionToken, JobPhase, Row};
use crate::model::{QueryId, Schedule, VisualizationId};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VisualizationSummary {
    pub id: VisualizationId,
    pub kind: String,
    pub name: String,
}

/// Everything the page shows, flattened.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewSnapshot {
    pub query_id: Option<QueryId>,
    pub title: String,
    pub description: Option<String>,
    pub schedule: Option<Schedule>,
    pub data_source: Option<String>,
    pub flags: QueryFlags,
    /// Why a plain execute click would be rejected right now.
    pub execute_blocked_by: Option<GateRejection>,

    pub state: ExecutionState,
    pub token: Option<ExecutionToken>,
    pub progress: Option<String>,
    pub error: Option<String>,
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    pub row_count: usize,
    pub footer: Option<String>,
    pub discarded_events: u64,

    pub parameters: BTreeMap<String, JsonValue>,
    pub pending_parameters: BTreeMap<String, JsonValue>,
    pub parameters_dirty: bool,

    pub visualizations: Vec<VisualizationSummary>,
    pub selected_visualization: Option<VisualizationId>,
    pub visible_visualization: Option<VisualizationId>,
}

impl ViewSnapshot {
    pub fn capture(view: &QueryView) -> Self {
        let query = view.query();
        let result = view.result_view();
        let progress = result.progress.as_ref().map(|p| {
            let phase = match p.phase {
                JobPhase::Queued => "queued",
                JobPhase::Running => "running",
            };
            match &p.detail {
                Some(detail) => format!("{phase}: {detail}"),
                None => phase.to_string(),
            }
        });

        Self {
            query_id: query.id,
            title: view.title(),
            description: query.description.clone(),
            schedule: query.schedule.clone(),
            data_source: view.data_source().resolved().map(|s| s.display_string()),
            flags: view.flags(),
            execute_blocked_by: view.can_execute(ExecuteOptions::default()).err(),
            state: result.status,
            token: result.token,
            progress,
            error: result.error(),
            columns: result.columns().iter().map(|c| c.name.clone()).collect(),
            rows: result.rows().to_vec(),
            row_count: result.row_count(),
            footer: result.footer(),
            discarded_events: view.controller().discarded_count(),
            parameters: view.parameters().values(),
            pending_parameters: view.parameters().pending_values(),
            parameters_dirty: view.parameters().is_dirty(),
            visualizations: query
                .visualizations
                .iter()
                .map(|v| VisualizationSummary {
                    id: v.id,
                    kind: v.kind.clone(),
                    name: v.name.clone(),
                })
                .collect(),
            selected_visualization: view.selected_visualization(),
            visible_visualization: view.visible_visualization().map(|v| v.id),
        }
    }

    /// Looks up a field by dotted path, rendered as plain text.
    ///
    /// Strings render without quotes and `null` renders as `none`, so
    /// `state=succeeded` or `selected_visualization=2` compare naturally.
    pub fn field(&self, name: &str) -> Option<String> {
        let value = serde_json::to_value(self).ok()?;
        let mut current = &value;
        for part in name.split('.') {
            current = current.get(part)?;
        }
        Some(match current {
            JsonValue::String(s) => s.clone(),
            JsonValue::Null => "none".to_string(),
            other => other.to_string(),
        })
    }
}

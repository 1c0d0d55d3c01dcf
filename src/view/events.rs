//! Notifications the view emits after each applied change.

use serde::Serialize;

use crate::execution::{ExecutionState, ExecutionToken};
use crate::model::VisualizationId;

/// Something the host should re-render for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ViewEvent {
    ExecutionStarted {
        token: ExecutionToken,
        superseded: Option<ExecutionToken>,
    },
    /// The result area changed (progress, success, failure or timeout).
    ResultChanged {
        token: Option<ExecutionToken>,
        status: ExecutionState,
    },
    CancelRequested {
        token: ExecutionToken,
    },
    /// An event for an old execution was dropped.
    StaleResultDiscarded {
        token: ExecutionToken,
    },
    ParametersChanged {
        dirty: bool,
    },
    SelectionChanged {
        selected: Option<VisualizationId>,
    },
    /// A new query snapshot replaced the old one; `title` is the new
    /// document title.
    QueryChanged {
        title: String,
    },
    FlagsChanged {
        can_edit: bool,
        can_execute: bool,
    },
}

impl ViewEvent {
    /// Short name, used in text output.
    pub fn name(&self) -> &'static str {
        match self {
            Self::ExecutionStarted { .. } => "execution_started",
            Self::ResultChanged { .. } => "result_changed",
            Self::CancelRequested { .. } => "cancel_requested",
            Self::StaleResultDiscarded { .. } => "stale_result_discarded",
            Self::ParametersChanged { .. } => "parameters_changed",
            Self::SelectionChanged { .. } => "selection_changed",
            Self::QueryChanged { .. } => "query_changed",
            Self::FlagsChanged { .. } => "flags_changed",
        }
    }
}

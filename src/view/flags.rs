//! Capability flags derived from the caller, the query and its data source.

use serde::{Deserialize, Serialize};

use crate::model::{DataSource, Query};

/// What the current user is allowed to do, as supplied by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    #[serde(default = "default_true")]
    pub can_edit: bool,
    #[serde(default = "default_true")]
    pub can_execute: bool,
}

fn default_true() -> bool {
    true
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            can_edit: true,
            can_execute: true,
        }
    }
}

impl Capabilities {
    /// A caller who may look but not touch.
    pub fn read_only() -> Self {
        Self {
            can_edit: false,
            can_execute: false,
        }
    }
}

/// Resolution state of the query's data source.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum DataSourceState {
    #[default]
    Pending,
    Resolved(DataSource),
    /// The lookup failed; the message is kept for diagnostics.
    Unavailable(String),
}

impl DataSourceState {
    pub fn resolved(&self) -> Option<&DataSource> {
        match self {
            Self::Resolved(source) => Some(source),
            _ => None,
        }
    }
}

/// Flags the page renders its buttons from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueryFlags {
    pub is_new: bool,
    pub is_archived: bool,
    pub is_draft: bool,
    pub can_edit: bool,
    pub can_execute: bool,
}

impl QueryFlags {
    /// Derives the flags.
    ///
    /// Until the data source resolves it counts as view-only, so an unresolved
    /// or failed lookup never grants edit or execute on a saved query.
    pub fn derive(query: &Query, capabilities: Capabilities, data_source: &DataSourceState) -> Self {
        let source = data_source.resolved();
        let view_only = source.map_or(true, |s| s.view_only);
        let paused = source.is_some_and(|s| s.paused);

        let can_edit = capabilities.can_edit && !query.is_archived && !view_only;
        let can_execute = capabilities.can_execute
            && !query.text.trim().is_empty()
            && (query.is_new() || source.is_some())
            && !paused;

        Self {
            is_new: query.is_new(),
            is_archived: query.is_archived,
            is_draft: query.is_draft,
            can_edit,
            can_execute,
        }
    }
}

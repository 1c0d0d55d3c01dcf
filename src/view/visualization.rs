//! Active visualization tab tracking.

use tracing::debug;

use super::result_view::ResultView;
use crate::error::{QueryViewError, Result};
use crate::model::{Query, Visualization, VisualizationId};

/// Tracks which visualization tab is selected.
///
/// Invariant: the selection is either unset or the id of a visualization of
/// the query last passed in. Every method that takes a query re-establishes
/// it before returning.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VisualizationSelector {
    selected: Option<VisualizationId>,
}

impl VisualizationSelector {
    /// Starts on the query's first visualization.
    pub fn new(query: &Query) -> Self {
        Self {
            selected: query.first_visualization_id(),
        }
    }

    pub fn selected(&self) -> Option<VisualizationId> {
        self.selected
    }

    /// Selects `id` if the query owns it.
    pub fn select(&mut self, query: &Query, id: VisualizationId) -> Result<()> {
        if !query.has_visualization(id) {
            return Err(QueryViewError::NoSuchVisualization(id));
        }
        self.selected = Some(id);
        Ok(())
    }

    /// Re-validates the selection against the query's visualization list.
    ///
    /// A selection that no longer exists falls back to the first remaining
    /// visualization, or unset when none remain. Returns true if the selection
    /// changed.
    pub fn reconcile(&mut self, query: &Query) -> bool {
        let before = self.selected;
        let still_valid = self.selected.is_some_and(|id| query.has_visualization(id));
        if !still_valid {
            self.selected = query.first_visualization_id();
        }
        if before != self.selected {
            debug!(from = ?before, to = ?self.selected, "Visualization selection reconciled");
        }
        before != self.selected
    }

    /// Called after `visualization` was added to `query`: the new tab wins.
    pub fn on_add(&mut self, query: &Query, visualization: VisualizationId) -> bool {
        let before = self.selected;
        if self.select(query, visualization).is_err() {
            self.reconcile(query);
        }
        before != self.selected
    }

    /// Called after `visualization` was removed from `query`.
    pub fn on_delete(&mut self, query: &Query, visualization: VisualizationId) -> bool {
        debug_assert!(!query.has_visualization(visualization));
        self.reconcile(query)
    }

    /// The selected visualization, but only once a successful result exists to
    /// render in it.
    pub fn visible<'q>(&self, query: &'q Query, result: &ResultView) -> Option<&'q Visualization> {
        if !result.is_done() {
            return None;
        }
        self.selected.and_then(|id| query.visualization(id))
    }
}

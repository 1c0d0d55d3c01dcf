//! The query view: composes parameters, the execution controller and the
//! visualization selector, and gates every execution.
//!
//! `QueryView` is synchronous. The session actor owns one and feeds it user
//! commands and runner events in order; hosts that drive execution themselves
//! can use it directly.

use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::events::ViewEvent;
use super::flags::{Capabilities, DataSourceState, QueryFlags};
use super::result_view::ResultView;
use super::snapshot::ViewSnapshot;
use super::visualization::VisualizationSelector;
use crate::config::ExecutionSettings;
use crate::error::{GateRejection, QueryViewError, Result};
use crate::execution::{
    CancelOutcome, DiscardReason, ExecutionController, ExecutionError, ExecutionState,
    ExecutionToken, JobPhase, ResultSet, Submission, Transition,
};
use crate::model::{DataSource, Query, Schedule, Visualization, VisualizationId};
use crate::parameters::ParameterSet;

/// Caller options for one execution request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecuteOptions {
    /// Run with the applied values even though edits are pending.
    pub skip_dirty_check: bool,
    /// Replace an in-flight execution instead of being rejected.
    pub supersede: bool,
}

impl ExecuteOptions {
    pub fn bypass() -> Self {
        Self {
            skip_dirty_check: true,
            supersede: false,
        }
    }

    pub fn superseding() -> Self {
        Self {
            skip_dirty_check: false,
            supersede: true,
        }
    }
}

/// Orchestrates one saved query's page state.
pub struct QueryView {
    query: Arc<Query>,
    capabilities: Capabilities,
    data_source: DataSourceState,
    parameters: ParameterSet,
    controller: ExecutionController,
    selector: VisualizationSelector,
    settings: ExecutionSettings,
    listener: Option<mpsc::UnboundedSender<ViewEvent>>,
}

impl QueryView {
    pub fn new(query: Arc<Query>, capabilities: Capabilities, settings: ExecutionSettings) -> Self {
        Self {
            parameters: ParameterSet::from_query(&query),
            selector: VisualizationSelector::new(&query),
            query,
            capabilities,
            data_source: DataSourceState::Pending,
            controller: ExecutionController::new(),
            settings,
            listener: None,
        }
    }

    /// Sends every subsequent `ViewEvent` to `listener`.
    pub fn with_listener(mut self, listener: mpsc::UnboundedSender<ViewEvent>) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn query(&self) -> &Arc<Query> {
        &self.query
    }

    /// Document title for the host to apply.
    pub fn title(&self) -> String {
        if self.query.name.trim().is_empty() {
            "Untitled query".to_string()
        } else {
            self.query.name.clone()
        }
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn settings(&self) -> &ExecutionSettings {
        &self.settings
    }

    pub fn data_source(&self) -> &DataSourceState {
        &self.data_source
    }

    pub fn flags(&self) -> QueryFlags {
        QueryFlags::derive(&self.query, self.capabilities, &self.data_source)
    }

    pub fn parameters(&self) -> &ParameterSet {
        &self.parameters
    }

    pub fn controller(&self) -> &ExecutionController {
        &self.controller
    }

    pub fn state(&self) -> ExecutionState {
        self.controller.state()
    }

    pub fn result_view(&self) -> ResultView {
        ResultView::project(&self.controller)
    }

    pub fn selected_visualization(&self) -> Option<VisualizationId> {
        self.selector.selected()
    }

    /// The visualization tab to render, if a successful result exists.
    pub fn visible_visualization(&self) -> Option<&Visualization> {
        self.selector.visible(&self.query, &self.result_view())
    }

    /// Serializable picture of everything the page shows.
    pub fn snapshot(&self) -> ViewSnapshot {
        ViewSnapshot::capture(self)
    }

    /// Records the outcome of the asynchronous data source lookup.
    ///
    /// A failed lookup is logged and leaves the restrictive default in place.
    pub fn resolve_data_source(&mut self, outcome: std::result::Result<DataSource, String>) {
        let before = self.flags();
        self.data_source = match outcome {
            Ok(source) => {
                debug!(data_source = %source.display_string(), "Data source resolved");
                DataSourceState::Resolved(source)
            }
            Err(message) => {
                warn!(data_source = %self.query.data_source_id, "Data source lookup failed: {message}");
                DataSourceState::Unavailable(message)
            }
        };
        self.notify_flags(before);
    }

    /// Checks the execution gate without changing anything.
    ///
    /// Checked in order: permission, an in-flight execution (unless
    /// superseding), pending parameter edits (unless bypassed).
    pub fn can_execute(&self, options: ExecuteOptions) -> std::result::Result<(), GateRejection> {
        if !self.flags().can_execute {
            return Err(GateRejection::NoPermission);
        }
        if self.state().is_running() && !self.supersedes(options) {
            return Err(GateRejection::AlreadyRunning);
        }
        if self.parameters.is_dirty() && !options.skip_dirty_check {
            return Err(GateRejection::ParametersDirty);
        }
        Ok(())
    }

    /// Submits a new execution if the gate allows it.
    ///
    /// On rejection nothing changes. On success the previous result is
    /// cleared and the caller must start a runner for the returned token
    /// using [`Self::execution_parameters`].
    pub fn execute(
        &mut self,
        options: ExecuteOptions,
    ) -> std::result::Result<Submission, GateRejection> {
        if let Err(reason) = self.can_execute(options) {
            info!(reason = reason.code(), "Execution rejected");
            return Err(reason);
        }

        let submission = self.controller.submit(self.supersedes(options))?;
        self.emit(ViewEvent::ExecutionStarted {
            token: submission.token,
            superseded: submission.superseded,
        });
        self.emit_result_changed();
        Ok(submission)
    }

    /// Parameter values an execution submitted now runs with.
    pub fn execution_parameters(&self) -> std::collections::BTreeMap<String, Value> {
        self.parameters.values()
    }

    /// Requests cancellation of the in-flight execution.
    pub fn cancel(&mut self) -> CancelOutcome {
        let outcome = self.controller.cancel();
        if let CancelOutcome::Requested(token) = outcome {
            self.emit(ViewEvent::CancelRequested { token });
            self.emit_result_changed();
        }
        outcome
    }

    /// Applies an intermediate status reported by the runner of `token`.
    pub fn on_status(
        &mut self,
        token: ExecutionToken,
        phase: JobPhase,
        detail: Option<String>,
    ) -> Transition {
        let phase_before = self.controller.progress().map(|p| p.phase);
        let transition = self.controller.status_update(token, phase, detail);
        match transition {
            // Progress detail alone refreshes the snapshot without a notification.
            Transition::Applied if phase_before == Some(phase) => {}
            _ => self.after_transition(token, transition),
        }
        transition
    }

    /// Applies the terminal outcome reported by the runner of `token`.
    pub fn on_complete(
        &mut self,
        token: ExecutionToken,
        outcome: std::result::Result<ResultSet, ExecutionError>,
    ) -> Transition {
        let transition = self.controller.complete(token, outcome);
        if transition.is_applied() && self.selector.reconcile(&self.query) {
            self.emit_selection();
        }
        self.after_transition(token, transition);
        transition
    }

    /// Fails `token` if it is still waiting for its cancel acknowledgement.
    pub fn on_cancel_timeout(&mut self, token: ExecutionToken) -> Transition {
        let transition = self
            .controller
            .cancel_timeout(token, self.settings.cancel_timeout());
        if transition.is_applied() {
            self.emit_result_changed();
        }
        transition
    }

    /// Edits a parameter without applying it.
    pub fn set_parameter(&mut self, name: &str, value: Value) -> Result<()> {
        self.parameters.set_pending(name, value)?;
        self.emit(ViewEvent::ParametersChanged {
            dirty: self.parameters.is_dirty(),
        });
        Ok(())
    }

    /// Throws away pending parameter edits.
    pub fn discard_parameters(&mut self) {
        if self.parameters.is_dirty() {
            self.parameters.discard();
            self.emit(ViewEvent::ParametersChanged { dirty: false });
        }
    }

    /// Confirms pending parameter edits and re-runs the query with them.
    ///
    /// The values are applied even if the execution itself is then rejected.
    pub fn apply_parameters(&mut self) -> std::result::Result<Submission, GateRejection> {
        if self.parameters.commit() {
            debug!("Parameters applied");
            self.emit(ViewEvent::ParametersChanged { dirty: false });
        }
        self.execute(ExecuteOptions::bypass())
    }

    /// Fails with `ReadOnly` unless the caller may edit this query.
    pub fn ensure_editable(&self) -> Result<()> {
        if self.flags().can_edit {
            Ok(())
        } else {
            Err(QueryViewError::ReadOnly)
        }
    }

    pub fn select_visualization(&mut self, id: VisualizationId) -> Result<()> {
        let before = self.selector.selected();
        self.selector.select(&self.query, id)?;
        if before != self.selector.selected() {
            self.emit_selection();
        }
        Ok(())
    }

    /// Installs a new query snapshot (typically the saved copy returned by the
    /// store) and re-validates the selection against it.
    pub fn replace_query(&mut self, query: Query) {
        let before = self.flags();
        let title_before = self.title();
        self.query = Arc::new(query);

        if self.selector.reconcile(&self.query) {
            self.emit_selection();
        }
        self.emit(ViewEvent::QueryChanged {
            title: self.title(),
        });
        if title_before != self.title() {
            info!(title = %self.title(), "Title changed");
        }
        self.notify_flags(before);
    }

    pub fn update_description(&mut self, text: &str) -> Result<()> {
        self.ensure_editable()?;
        let next = self.query.with_description(text);
        self.replace_query(next);
        Ok(())
    }

    pub fn edit_schedule(&mut self, schedule: Option<Schedule>) -> Result<()> {
        self.ensure_editable()?;
        let next = self.query.with_schedule(schedule);
        self.replace_query(next);
        Ok(())
    }

    /// Adds a persisted visualization and selects it.
    pub fn add_visualization(&mut self, visualization: Visualization) -> Result<()> {
        self.ensure_editable()?;
        let id = visualization.id;
        let next = self.query.with_visualization(visualization);
        self.replace_query(next);
        if self.selector.on_add(&self.query, id) {
            self.emit_selection();
        }
        Ok(())
    }

    /// Replaces an existing visualization's kind, name or options.
    pub fn update_visualization(&mut self, visualization: Visualization) -> Result<()> {
        self.ensure_editable()?;
        if !self.query.has_visualization(visualization.id) {
            return Err(QueryViewError::NoSuchVisualization(visualization.id));
        }
        let next = self.query.with_visualization(visualization);
        self.replace_query(next);
        Ok(())
    }

    /// Removes a visualization; the selection falls back if it pointed there.
    pub fn delete_visualization(&mut self, id: VisualizationId) -> Result<()> {
        self.ensure_editable()?;
        let next = self
            .query
            .without_visualization(id)
            .ok_or(QueryViewError::NoSuchVisualization(id))?;
        if self.selector.on_delete(&next, id) {
            self.emit_selection();
        }
        self.replace_query(next);
        Ok(())
    }

    fn supersedes(&self, options: ExecuteOptions) -> bool {
        options.supersede || self.settings.supersede_in_flight
    }

    fn after_transition(&mut self, token: ExecutionToken, transition: Transition) {
        match transition {
            Transition::Applied => self.emit_result_changed(),
            Transition::Discarded(DiscardReason::StaleToken { .. }) => {
                self.emit(ViewEvent::StaleResultDiscarded { token });
            }
            Transition::Discarded(DiscardReason::AlreadySettled) => {}
        }
    }

    fn notify_flags(&self, before: QueryFlags) {
        let after = self.flags();
        if before.can_edit != after.can_edit || before.can_execute != after.can_execute {
            self.emit(ViewEvent::FlagsChanged {
                can_edit: after.can_edit,
                can_execute: after.can_execute,
            });
        }
    }

    fn emit_result_changed(&self) {
        self.emit(ViewEvent::ResultChanged {
            token: self.controller.current_token(),
            status: self.controller.state(),
        });
    }

    fn emit_selection(&self) {
        self.emit(ViewEvent::SelectionChanged {
            selected: self.selector.selected(),
        });
    }

    fn emit(&self, event: ViewEvent) {
        if let Some(listener) = &self.listener {
            // The host may have stopped listening; state is still authoritative.
            let _ = listener.send(event);
        }
    }
}

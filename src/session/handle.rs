//! Cloneable handle for talking to a session actor.

use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

use super::actor::ViewCommand;
use crate::error::{QueryViewError, Result};
use crate::execution::{CancelOutcome, Submission};
use crate::model::{Query, Schedule, Visualization, VisualizationId};
use crate::view::{ExecuteOptions, ViewSnapshot};

/// Handle for communicating with a `QueryViewActor`.
///
/// Every method waits for the actor to apply the command and returns its
/// outcome. Gate rejections come back as `QueryViewError::GateRejected`.
#[derive(Clone)]
pub struct QueryViewHandle {
    sender: mpsc::Sender<ViewCommand>,
}

impl QueryViewHandle {
    pub(crate) fn new(sender: mpsc::Sender<ViewCommand>) -> Self {
        Self { sender }
    }

    /// Runs the query if the execution gate allows it.
    pub async fn execute_query(&self, options: ExecuteOptions) -> Result<Submission> {
        self.request(|reply| ViewCommand::Execute { options, reply })
            .await?
    }

    /// Requests cancellation of the in-flight execution.
    pub async fn cancel_execution(&self) -> Result<CancelOutcome> {
        self.request(|reply| ViewCommand::Cancel { reply }).await
    }

    /// Edits a parameter value without applying it.
    pub async fn set_parameter(&self, name: impl Into<String>, value: Value) -> Result<()> {
        let name = name.into();
        self.request(|reply| ViewCommand::SetParameter { name, value, reply })
            .await?
    }

    /// Applies pending parameter edits and re-runs the query.
    pub async fn apply_parameters(&self) -> Result<Submission> {
        self.request(|reply| ViewCommand::ApplyParameters { reply })
            .await?
    }

    pub async fn discard_parameters(&self) -> Result<()> {
        self.request(|reply| ViewCommand::DiscardParameters { reply })
            .await
    }

    pub async fn select_visualization(&self, id: VisualizationId) -> Result<()> {
        self.request(|reply| ViewCommand::SelectVisualization { id, reply })
            .await?
    }

    /// Creates a visualization through the store and selects it.
    pub async fn add_visualization(
        &self,
        kind: impl Into<String>,
        name: impl Into<String>,
    ) -> Result<Visualization> {
        let (kind, name) = (kind.into(), name.into());
        self.request(|reply| ViewCommand::AddVisualization { kind, name, reply })
            .await?
    }

    pub async fn update_visualization(&self, visualization: Visualization) -> Result<Arc<Query>> {
        self.request(|reply| ViewCommand::UpdateVisualization {
            visualization,
            reply,
        })
        .await?
    }

    pub async fn delete_visualization(&self, id: VisualizationId) -> Result<Arc<Query>> {
        self.request(|reply| ViewCommand::DeleteVisualization { id, reply })
            .await?
    }

    pub async fn update_description(&self, text: impl Into<String>) -> Result<Arc<Query>> {
        let text = text.into();
        self.request(|reply| ViewCommand::UpdateDescription { text, reply })
            .await?
    }

    pub async fn edit_schedule(&self, schedule: Option<Schedule>) -> Result<Arc<Query>> {
        self.request(|reply| ViewCommand::EditSchedule { schedule, reply })
            .await?
    }

    /// Current view state.
    pub async fn snapshot(&self) -> Result<ViewSnapshot> {
        self.request(|reply| ViewCommand::Snapshot { reply }).await
    }

    /// Waits until no execution is in flight and the data source lookup has
    /// finished, then returns the view state.
    pub async fn settled(&self) -> Result<ViewSnapshot> {
        self.request(|reply| ViewCommand::WhenSettled { reply })
            .await
    }

    /// Stops the actor and every runner it owns.
    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(ViewCommand::Shutdown)
            .await
            .map_err(|_| QueryViewError::internal("Query view actor closed"))
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> ViewCommand,
    ) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.sender
            .send(make(reply))
            .await
            .map_err(|_| QueryViewError::internal("Query view actor closed"))?;
        response
            .await
            .map_err(|_| QueryViewError::internal("Query view actor dropped the request"))
    }
}

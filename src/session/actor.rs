//! The session actor: single owner of a `QueryView`.
//!
//! Every input (host commands, runner events, the data source lookup and
//! cancel deadlines) arrives through one `select!` loop and is applied in
//! order, so view state is never touched concurrently. Async side effects
//! (backend calls, store saves) happen in runner tasks or inline here.

use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::handle::QueryViewHandle;
use super::runners::RunnerRegistry;
use crate::error::{QueryViewError, Result};
use crate::execution::{
    CancelOutcome, ExecutionBackend, ExecutionEvent, ExecutionEventKind, ExecutionTask,
    ExecutionToken, Submission,
};
use crate::model::{DataSource, Query, Schedule, Visualization, VisualizationId};
use crate::store::{DataSourceProvider, QueryStore};
use crate::view::{DataSourceState, ExecuteOptions, QueryView, ViewSnapshot};

const COMMAND_CAPACITY: usize = 32;
const EVENT_CAPACITY: usize = 64;

/// Commands sent from a `QueryViewHandle` to the actor.
#[derive(Debug)]
pub enum ViewCommand {
    Execute {
        options: ExecuteOptions,
        reply: oneshot::Sender<Result<Submission>>,
    },
    Cancel {
        reply: oneshot::Sender<CancelOutcome>,
    },
    SetParameter {
        name: String,
        value: Value,
        reply: oneshot::Sender<Result<()>>,
    },
    ApplyParameters {
        reply: oneshot::Sender<Result<Submission>>,
    },
    DiscardParameters {
        reply: oneshot::Sender<()>,
    },
    SelectVisualization {
        id: VisualizationId,
        reply: oneshot::Sender<Result<()>>,
    },
    AddVisualization {
        kind: String,
        name: String,
        reply: oneshot::Sender<Result<Visualization>>,
    },
    UpdateVisualization {
        visualization: Visualization,
        reply: oneshot::Sender<Result<Arc<Query>>>,
    },
    DeleteVisualization {
        id: VisualizationId,
        reply: oneshot::Sender<Result<Arc<Query>>>,
    },
    UpdateDescription {
        text: String,
        reply: oneshot::Sender<Result<Arc<Query>>>,
    },
    EditSchedule {
        schedule: Option<Schedule>,
        reply: oneshot::Sender<Result<Arc<Query>>>,
    },
    Snapshot {
        reply: oneshot::Sender<ViewSnapshot>,
    },
    /// Replies once nothing is in flight and the data source lookup is done.
    WhenSettled {
        reply: oneshot::Sender<ViewSnapshot>,
    },
    Shutdown,
}

/// The actor that owns a `QueryView` and its runner tasks.
pub struct QueryViewActor {
    view: QueryView,
    backend: Arc<dyn ExecutionBackend>,
    store: Arc<dyn QueryStore>,
    receiver: mpsc::Receiver<ViewCommand>,
    events_tx: mpsc::Sender<ExecutionEvent>,
    events_rx: mpsc::Receiver<ExecutionEvent>,
    data_source_rx: Option<oneshot::Receiver<Result<DataSource>>>,
    runners: RunnerRegistry,
    settle_waiters: Vec<oneshot::Sender<ViewSnapshot>>,
}

impl QueryViewActor {
    /// Creates the actor and starts the data source lookup.
    ///
    /// Must be called inside a tokio runtime. The caller runs the actor with
    /// [`QueryViewActor::run`], or uses [`QueryViewActor::spawn`].
    pub fn new(
        view: QueryView,
        backend: Arc<dyn ExecutionBackend>,
        store: Arc<dyn QueryStore>,
        data_sources: Arc<dyn DataSourceProvider>,
    ) -> (QueryViewHandle, Self) {
        let (sender, receiver) = mpsc::channel(COMMAND_CAPACITY);
        let (events_tx, events_rx) = mpsc::channel(EVENT_CAPACITY);

        let (ds_tx, ds_rx) = oneshot::channel();
        let data_source_id = view.query().data_source_id;
        tokio::spawn(async move {
            let _ = ds_tx.send(data_sources.get(data_source_id).await);
        });

        let actor = Self {
            view,
            backend,
            store,
            receiver,
            events_tx,
            events_rx,
            data_source_rx: Some(ds_rx),
            runners: RunnerRegistry::new(),
            settle_waiters: Vec::new(),
        };

        (QueryViewHandle::new(sender), actor)
    }

    /// Creates the actor and spawns its loop.
    pub fn spawn(
        view: QueryView,
        backend: Arc<dyn ExecutionBackend>,
        store: Arc<dyn QueryStore>,
        data_sources: Arc<dyn DataSourceProvider>,
    ) -> (QueryViewHandle, JoinHandle<()>) {
        let (handle, actor) = Self::new(view, backend, store, data_sources);
        (handle, tokio::spawn(actor.run()))
    }

    /// Runs until `Shutdown` arrives or every handle is dropped.
    pub async fn run(mut self) {
        info!(query = %self.view.title(), "Session started");

        loop {
            let deadline = self.runners.next_deadline();

            tokio::select! {
                biased;

                cmd = self.receiver.recv() => {
                    match cmd {
                        Some(ViewCommand::Shutdown) | None => break,
                        Some(cmd) => self.handle_command(cmd).await,
                    }
                }

                Some(event) = self.events_rx.recv() => {
                    self.handle_execution_event(event);
                }

                outcome = recv_data_source(&mut self.data_source_rx), if self.data_source_rx.is_some() => {
                    self.data_source_rx = None;
                    let outcome = match outcome {
                        Ok(lookup) => lookup.map_err(|e| e.to_string()),
                        Err(_) => Err("data source lookup was dropped".to_string()),
                    };
                    self.view.resolve_data_source(outcome);
                }

                _ = sleep_until_deadline(deadline), if deadline.is_some() => {
                    self.handle_cancel_deadlines();
                }
            }

            self.notify_settled();
        }

        self.shutdown();
    }

    async fn handle_command(&mut self, cmd: ViewCommand) {
        match cmd {
            ViewCommand::Execute { options, reply } => {
                let _ = reply.send(self.execute(options));
            }
            ViewCommand::Cancel { reply } => {
                let _ = reply.send(self.cancel());
            }
            ViewCommand::SetParameter { name, value, reply } => {
                let _ = reply.send(self.view.set_parameter(&name, value));
            }
            ViewCommand::ApplyParameters { reply } => {
                let outcome = self
                    .view
                    .apply_parameters()
                    .map_err(QueryViewError::from)
                    .map(|submission| self.start(submission));
                let _ = reply.send(outcome);
            }
            ViewCommand::DiscardParameters { reply } => {
                self.view.discard_parameters();
                let _ = reply.send(());
            }
            ViewCommand::SelectVisualization { id, reply } => {
                let _ = reply.send(self.view.select_visualization(id));
            }
            ViewCommand::AddVisualization { kind, name, reply } => {
                let _ = reply.send(self.add_visualization(&kind, &name).await);
            }
            ViewCommand::UpdateVisualization {
                visualization,
                reply,
            } => {
                let _ = reply.send(self.update_visualization(visualization).await);
            }
            ViewCommand::DeleteVisualization { id, reply } => {
                let _ = reply.send(self.delete_visualization(id).await);
            }
            ViewCommand::UpdateDescription { text, reply } => {
                let draft = self.view.query().with_description(&text);
                let _ = reply.send(self.save_query(draft).await);
            }
            ViewCommand::EditSchedule { schedule, reply } => {
                let draft = self.view.query().with_schedule(schedule);
                let _ = reply.send(self.save_query(draft).await);
            }
            ViewCommand::Snapshot { reply } => {
                let _ = reply.send(self.view.snapshot());
            }
            ViewCommand::WhenSettled { reply } => {
                self.settle_waiters.push(reply);
            }
            ViewCommand::Shutdown => {
                // Handled in run() loop
            }
        }
    }

    fn execute(&mut self, options: ExecuteOptions) -> Result<Submission> {
        let submission = self.view.execute(options)?;
        Ok(self.start(submission))
    }

    /// Starts the runner for a fresh submission, retiring the one it replaced.
    fn start(&mut self, submission: Submission) -> Submission {
        if let Some(old) = submission.superseded {
            self.runners.supersede(old);
        }
        let task = ExecutionTask::spawn(
            Arc::clone(&self.backend),
            Arc::clone(self.view.query()),
            self.view.execution_parameters(),
            submission.token,
            self.view.settings().poll_interval(),
            self.events_tx.clone(),
        );
        self.runners.insert(task);
        submission
    }

    fn cancel(&mut self) -> CancelOutcome {
        let outcome = self.view.cancel();
        if let CancelOutcome::Requested(token) = outcome {
            let deadline = Instant::now() + self.view.settings().cancel_timeout();
            if !self.runners.request_cancel(token, deadline) {
                warn!(token = %token, "Cancel requested for an execution without a runner");
            }
        }
        outcome
    }

    fn handle_execution_event(&mut self, event: ExecutionEvent) {
        let token = event.token;
        match event.kind {
            ExecutionEventKind::Submitted(job) => {
                debug!(token = %token, job = %job, "Backend accepted job");
            }
            ExecutionEventKind::Status { phase, detail } => {
                self.view.on_status(token, phase, detail);
            }
            ExecutionEventKind::Completed(outcome) => {
                self.runners.finish(token);
                self.view.on_complete(token, outcome);
            }
        }
    }

    fn handle_cancel_deadlines(&mut self) {
        for token in self.runners.take_expired(Instant::now()) {
            self.expire(token);
        }
    }

    fn expire(&mut self, token: ExecutionToken) {
        if self.view.on_cancel_timeout(token).is_applied() {
            warn!(
                token = %token,
                timeout_ms = self.view.settings().cancel_timeout_ms,
                "Backend did not acknowledge cancellation"
            );
        }
        self.runners.abandon(token);
    }

    async fn save_query(&mut self, draft: Query) -> Result<Arc<Query>> {
        self.view.ensure_editable()?;
        let saved = self.store.save_query(&draft).await?;
        self.view.replace_query(saved);
        Ok(Arc::clone(self.view.query()))
    }

    async fn add_visualization(&mut self, kind: &str, name: &str) -> Result<Visualization> {
        self.view.ensure_editable()?;
        let visualization = self
            .store
            .create_visualization(self.view.query(), kind, name)
            .await?;
        self.view.add_visualization(visualization.clone())?;
        Ok(visualization)
    }

    async fn update_visualization(&mut self, visualization: Visualization) -> Result<Arc<Query>> {
        self.view.ensure_editable()?;
        if !self.view.query().has_visualization(visualization.id) {
            return Err(QueryViewError::NoSuchVisualization(visualization.id));
        }
        let saved = self.store.update_visualization(&visualization).await?;
        self.view.update_visualization(saved)?;
        Ok(Arc::clone(self.view.query()))
    }

    async fn delete_visualization(&mut self, id: VisualizationId) -> Result<Arc<Query>> {
        self.view.ensure_editable()?;
        if !self.view.query().has_visualization(id) {
            return Err(QueryViewError::NoSuchVisualization(id));
        }
        self.store.delete_visualization(id).await?;
        self.view.delete_visualization(id)?;
        Ok(Arc::clone(self.view.query()))
    }

    fn is_settled(&self) -> bool {
        !self.view.state().is_running()
            && !matches!(self.view.data_source(), DataSourceState::Pending)
    }

    fn notify_settled(&mut self) {
        if self.settle_waiters.is_empty() || !self.is_settled() {
            return;
        }
        let snapshot = self.view.snapshot();
        for waiter in self.settle_waiters.drain(..) {
            let _ = waiter.send(snapshot.clone());
        }
    }

    fn shutdown(&mut self) {
        info!(runners = self.runners.len(), "Session shutting down");
        self.runners.shutdown();
        // Waiters get the state as of shutdown rather than a dropped reply.
        let snapshot = self.view.snapshot();
        for waiter in self.settle_waiters.drain(..) {
            let _ = waiter.send(snapshot.clone());
        }
    }
}

async fn recv_data_source(
    rx: &mut Option<oneshot::Receiver<Result<DataSource>>>,
) -> std::result::Result<Result<DataSource>, oneshot::error::RecvError> {
    match rx.as_mut() {
        Some(rx) => rx.await,
        None => std::future::pending().await,
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

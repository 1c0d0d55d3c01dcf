//! Headless mode: drive a query view from a script of events.
//!
//! Events are applied one at a time through a `QueryViewHandle`, exactly as
//! a UI would send them. Every event and its outcome is written to a
//! transcript, and assertions are checked against the transcript plus the
//! rendered page.

mod events;
mod output;

pub use events::{Assertion, Event, EventParser};
pub use output::{HeadlessOutput, ScreenRenderer};

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cli::{Cli, OutputFormat};
use crate::config::Config;
use crate::error::{QueryViewError, Result};
use crate::execution::{CancelOutcome, ExecutionBackend, MockExecutionBackend, Submission};
use crate::model::{DataSource, Query};
use crate::session::{QueryViewActor, QueryViewHandle};
use crate::store::{DataSourceProvider, MemoryQueryStore, QueryStore, StaticDataSourceProvider};
use crate::view::{QueryView, ViewEvent, ViewSnapshot};

/// Configuration for a headless run.
#[derive(Debug, Clone, Default)]
pub struct HeadlessConfig {
    pub output_format: OutputFormat,
    pub fail_fast: bool,
    pub output_file: Option<PathBuf>,
}

impl HeadlessConfig {
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let output_format = cli.parse_output_format().map_err(QueryViewError::config)?;

        Ok(Self {
            output_format,
            fail_fast: cli.fail_fast,
            output_file: cli.output_file.clone(),
        })
    }
}

/// Result of a headless run.
#[derive(Debug)]
pub struct HeadlessResult {
    /// The page as rendered after the last event.
    pub screen: String,
    /// Each event followed by what it did.
    pub transcript: Vec<String>,
    pub events_executed: usize,
    pub duration: Duration,
    pub assertions_passed: usize,
    pub assertions_failed: usize,
    /// The failed assertions, as written in the script.
    pub failures: Vec<String>,
    /// Every notification the view emitted, in order.
    pub view_events: Vec<ViewEvent>,
    pub snapshot: ViewSnapshot,
}

/// Runs a script of events against one session.
pub struct HeadlessRunner {
    config: HeadlessConfig,
    handle: QueryViewHandle,
    task: JoinHandle<()>,
    notifications: mpsc::UnboundedReceiver<ViewEvent>,
    events: Vec<Event>,
    transcript: Vec<String>,
    view_events: Vec<ViewEvent>,
    failures: Vec<String>,
    start_time: Instant,
    assertions_passed: usize,
    assertions_failed: usize,
}

impl HeadlessRunner {
    /// Starts a session for `view` and prepares to drive it.
    ///
    /// Must be called inside a tokio runtime.
    pub fn new(
        config: HeadlessConfig,
        view: QueryView,
        backend: Arc<dyn ExecutionBackend>,
        store: Arc<dyn QueryStore>,
        data_sources: Arc<dyn DataSourceProvider>,
    ) -> Self {
        let (tx, notifications) = mpsc::unbounded_channel();
        let view = view.with_listener(tx);
        let (handle, task) = QueryViewActor::spawn(view, backend, store, data_sources);

        Self {
            config,
            handle,
            task,
            notifications,
            events: Vec::new(),
            transcript: Vec::new(),
            view_events: Vec::new(),
            failures: Vec::new(),
            start_time: Instant::now(),
            assertions_passed: 0,
            assertions_failed: 0,
        }
    }

    /// A handle to the session being driven.
    pub fn handle(&self) -> &QueryViewHandle {
        &self.handle
    }

    /// Loads events from a string.
    pub fn load_events(&mut self, input: &str) -> Result<()> {
        let parser = EventParser::new();
        self.events = parser.parse_all(input)?;
        Ok(())
    }

    /// Loads events from a script file, or stdin for `-`.
    pub fn load_script(&mut self, path: &str) -> Result<()> {
        let content = if path == "-" {
            use std::io::Read;
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .map_err(|e| QueryViewError::internal(format!("Failed to read stdin: {e}")))?;
            buffer
        } else {
            std::fs::read_to_string(path).map_err(|e| {
                QueryViewError::config(format!("Failed to read script file '{}': {}", path, e))
            })?
        };

        self.load_events(&content)
    }

    /// Runs all loaded events, then shuts the session down.
    pub async fn run(mut self) -> Result<HeadlessResult> {
        let events = std::mem::take(&mut self.events);
        let mut events_executed = 0;

        for event in events {
            self.transcript.push(format!("> {event}"));
            debug!(event = %event, "Headless event");

            let keep_going = self.apply(&event).await?;
            events_executed += 1;
            self.drain_notifications();

            if !keep_going {
                break;
            }
        }

        let snapshot = self.handle.snapshot().await?;
        self.drain_notifications();
        self.handle.shutdown().await?;
        self.task
            .await
            .map_err(|e| QueryViewError::internal(format!("Session task failed: {e}")))?;

        info!(
            events = events_executed,
            passed = self.assertions_passed,
            failed = self.assertions_failed,
            "Headless run finished"
        );

        Ok(HeadlessResult {
            screen: ScreenRenderer::render(&snapshot),
            transcript: self.transcript,
            events_executed,
            duration: self.start_time.elapsed(),
            assertions_passed: self.assertions_passed,
            assertions_failed: self.assertions_failed,
            failures: self.failures,
            view_events: self.view_events,
            snapshot,
        })
    }

    /// Applies one event. Returns false when the run should stop.
    async fn apply(&mut self, event: &Event) -> Result<bool> {
        let handle = self.handle.clone();

        match event {
            Event::Execute(options) => {
                let outcome = handle.execute_query(*options).await;
                self.record(outcome.map(describe_submission))?;
            }
            Event::Cancel => {
                let line = match handle.cancel_execution().await? {
                    CancelOutcome::Requested(token) => format!("cancel requested for {token}"),
                    CancelOutcome::AlreadyCancelling(token) => {
                        format!("{token} is already cancelling")
                    }
                    CancelOutcome::NotExecuting => "nothing to cancel".to_string(),
                };
                self.note(line);
            }
            Event::Param { name, value } => {
                let outcome = handle.set_parameter(name.clone(), value.clone()).await;
                self.record(outcome.map(|()| format!("{name} pending")))?;
            }
            Event::Apply => {
                let outcome = handle.apply_parameters().await;
                self.record(outcome.map(describe_submission))?;
            }
            Event::Discard => {
                handle.discard_parameters().await?;
                self.note("pending parameters discarded");
            }
            Event::Select(id) => {
                let outcome = handle.select_visualization(*id).await;
                self.record(outcome.map(|()| format!("visualization {id} selected")))?;
            }
            Event::AddViz { kind, name } => {
                let outcome = handle.add_visualization(kind.clone(), name.clone()).await;
                self.record(outcome.map(|v| format!("visualization {} added", v.id)))?;
            }
            Event::DeleteViz(id) => {
                let outcome = handle.delete_visualization(*id).await;
                self.record(outcome.map(|_| format!("visualization {id} deleted")))?;
            }
            Event::Describe(text) => {
                let outcome = handle.update_description(text.clone()).await;
                self.record(outcome.map(|_| "description saved".to_string()))?;
            }
            Event::Schedule(interval) => {
                let outcome = handle.edit_schedule(Event::schedule(*interval)).await;
                self.record(outcome.map(|_| "schedule saved".to_string()))?;
            }
            Event::Wait(duration) => {
                tokio::time::sleep(*duration).await;
            }
            Event::Settle => {
                let snapshot = handle.settled().await?;
                self.note(format!("settled: {}", snapshot.state.as_str()));
            }
            Event::Assert(assertion) => {
                let snapshot = handle.snapshot().await?;
                self.drain_notifications();
                let screen = format!(
                    "{}\n{}",
                    self.transcript.join("\n"),
                    ScreenRenderer::render(&snapshot)
                );

                if assertion.check(&screen, &snapshot) {
                    self.assertions_passed += 1;
                    self.note("passed");
                } else {
                    self.assertions_failed += 1;
                    self.failures.push(event.to_string());
                    self.note("FAILED");
                    if self.config.fail_fast {
                        return Ok(false);
                    }
                }
            }
        }

        Ok(true)
    }

    /// Writes an operation outcome to the transcript.
    ///
    /// Rejections and domain errors are part of the run; only a dead session
    /// aborts it.
    fn record(&mut self, outcome: Result<String>) -> Result<()> {
        match outcome {
            Ok(line) => self.note(line),
            Err(QueryViewError::GateRejected(reason)) => {
                self.note(format!("rejected: {reason} ({})", reason.code()))
            }
            Err(e @ QueryViewError::Internal(_)) => return Err(e),
            Err(e) => self.note(format!("error: {e}")),
        }
        Ok(())
    }

    fn note(&mut self, line: impl Into<String>) {
        self.transcript.push(format!("  {}", line.into()));
    }

    fn drain_notifications(&mut self) {
        while let Ok(event) = self.notifications.try_recv() {
            self.transcript.push(format!("  · {}", event.name()));
            self.view_events.push(event);
        }
    }
}

fn describe_submission(submission: Submission) -> String {
    match submission.superseded {
        Some(old) => format!("started {} (superseded {old})", submission.token),
        None => format!("started {}", submission.token),
    }
}

/// Loads the query fixture, or the demo query when none is given.
pub fn load_query(path: Option<&std::path::Path>) -> Result<Query> {
    let Some(path) = path else {
        return Ok(Query::demo());
    };

    let content = std::fs::read_to_string(path).map_err(|e| {
        QueryViewError::config(format!(
            "Failed to read query fixture '{}': {}",
            path.display(),
            e
        ))
    })?;

    serde_json::from_str(&content).map_err(|e| {
        QueryViewError::config(format!("Invalid query fixture '{}': {}", path.display(), e))
    })
}

/// Builds the mock backend described by the command line.
pub fn mock_backend(cli: &Cli) -> MockExecutionBackend {
    let mut backend = MockExecutionBackend::new()
        .with_latency(cli.mock_latency())
        .with_rows(cli.mock_rows);
    if let Some(message) = &cli.mock_fail {
        backend = backend.failing(message.clone());
    }
    if cli.mock_ignore_cancel {
        backend = backend.ignoring_cancel();
    }
    backend
}

/// Data sources from the config, or a single local one serving `query`
/// when the config declares none.
fn data_sources_for(config: &Config, query: &Query) -> Result<Vec<DataSource>> {
    let sources = config.data_sources()?;
    if !sources.is_empty() {
        return Ok(sources);
    }
    Ok(vec![DataSource {
        id: query.data_source_id,
        name: "local".to_string(),
        kind: "mock".to_string(),
        url: None,
        view_only: false,
        paused: false,
    }])
}

/// Runs headless mode from CLI arguments.
pub async fn run_headless(cli: &Cli) -> Result<i32> {
    cli.validate()?;

    let headless = HeadlessConfig::from_cli(cli)?;

    let config_path = cli.config_path();
    info!("Loading config from: {}", config_path.display());
    let mut config = Config::load_from_file(&config_path)?;
    cli.apply_overrides(&mut config);

    let query = load_query(cli.query.as_deref())?;
    let sources = data_sources_for(&config, &query)?;
    let store = MemoryQueryStore::new().with_query(&query);
    let view = QueryView::new(Arc::new(query), config.permissions, config.execution.clone());

    let mut runner = HeadlessRunner::new(
        headless.clone(),
        view,
        Arc::new(mock_backend(cli)),
        Arc::new(store),
        Arc::new(StaticDataSourceProvider::new(sources)),
    );

    if let Some(ref events_str) = cli.events {
        runner.load_events(events_str)?;
    } else if let Some(ref script_path) = cli.script {
        runner.load_script(script_path)?;
    }

    let result = runner.run().await?;

    let output = HeadlessOutput::new(headless.output_format);
    let output_str = output.format(&result);

    if let Some(ref path) = headless.output_file {
        std::fs::write(path, &output_str)
            .map_err(|e| QueryViewError::internal(format!("Failed to write output file: {e}")))?;
    } else {
        print!("{}", output_str);
    }

    if result.assertions_failed > 0 {
        Ok(1)
    } else {
        Ok(0)
    }
}

//! Session actor tests: real runner tasks against the mock backend, on a
//! paused tokio clock.

use pretty_assertions::assert_eq;
use queryview::config::ExecutionSettings;
use queryview::error::{GateRejection, QueryViewError};
use queryview::execution::{CancelOutcome, ExecutionState, MockExecutionBackend};
use queryview::model::{Query, Schedule, VisualizationId};
use queryview::store::{MemoryQueryStore, StaticDataSourceProvider};
use queryview::view::{Capabilities, ExecuteOptions};
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

use super::common::{warehouse, SessionBuilder};

#[tokio::test(start_paused = true)]
async fn test_pending_data_source_is_restrictive_until_resolved() {
    let handle = SessionBuilder {
        data_sources: StaticDataSourceProvider::new(vec![warehouse()])
            .with_delay(Duration::from_secs(2)),
        ..SessionBuilder::new()
    }
    .start();

    let pending = assert_ok!(handle.snapshot().await);
    assert!(!pending.flags.can_edit);
    assert!(!pending.flags.can_execute);
    assert_eq!(pending.data_source, None);

    let err = assert_err!(handle.execute_query(ExecuteOptions::default()).await);
    assert_eq!(err.gate_reason(), Some(GateRejection::NoPermission));
    let err = assert_err!(handle.update_description("too early").await);
    assert!(matches!(err, QueryViewError::ReadOnly));

    let resolved = assert_ok!(handle.settled().await);
    assert!(resolved.flags.can_edit);
    assert!(resolved.flags.can_execute);
    assert_eq!(resolved.data_source.as_deref(), Some("warehouse (pg)"));
}

#[tokio::test(start_paused = true)]
async fn test_missing_data_source_keeps_restrictive_defaults() {
    let handle = SessionBuilder {
        data_sources: StaticDataSourceProvider::new(Vec::new()),
        ..SessionBuilder::new()
    }
    .start();

    let snapshot = assert_ok!(handle.settled().await);

    assert!(!snapshot.flags.can_edit);
    assert_eq!(snapshot.execute_blocked_by, Some(GateRejection::NoPermission));
}

#[tokio::test(start_paused = true)]
async fn test_paused_data_source_blocks_execution() {
    let mut paused = warehouse();
    paused.paused = true;
    let handle = SessionBuilder {
        data_sources: StaticDataSourceProvider::new(vec![paused]),
        ..SessionBuilder::new()
    }
    .start();
    assert_ok!(handle.settled().await);

    let err = assert_err!(handle.execute_query(ExecuteOptions::default()).await);
    assert_eq!(err.gate_reason(), Some(GateRejection::NoPermission));
}

#[tokio::test(start_paused = true)]
async fn test_full_execution_produces_result() {
    let handle = SessionBuilder {
        backend: MockExecutionBackend::new()
            .with_latency(Duration::from_millis(300))
            .with_rows(5),
        ..SessionBuilder::new()
    }
    .start();
    assert_ok!(handle.settled().await);

    let sub = assert_ok!(handle.execute_query(ExecuteOptions::default()).await);
    let running = assert_ok!(handle.snapshot().await);
    assert_eq!(running.state, ExecutionState::Executing);
    assert_eq!(running.token, Some(sub.token));

    let done = assert_ok!(handle.settled().await);
    assert_eq!(done.state, ExecutionState::Succeeded);
    assert_eq!(done.row_count, 5);
    assert_eq!(done.visible_visualization, Some(VisualizationId(1)));
    assert!(done.footer.unwrap().starts_with("5 rows"));
}

#[tokio::test(start_paused = true)]
async fn test_backend_failure_is_a_failed_result() {
    let handle = SessionBuilder {
        backend: MockExecutionBackend::new().failing("relation \"signups\" does not exist"),
        ..SessionBuilder::new()
    }
    .start();
    assert_ok!(handle.settled().await);

    assert_ok!(handle.execute_query(ExecuteOptions::default()).await);
    let snapshot = assert_ok!(handle.settled().await);

    assert_eq!(snapshot.state, ExecutionState::Failed);
    assert!(snapshot.error.unwrap().contains("does not exist"));
    assert_eq!(snapshot.row_count, 0);
}

#[tokio::test(start_paused = true)]
async fn test_acknowledged_cancel_fails_with_cancelled_message() {
    let handle = SessionBuilder {
        backend: MockExecutionBackend::new().with_latency(Duration::from_secs(30)),
        ..SessionBuilder::new()
    }
    .start();
    assert_ok!(handle.settled().await);

    let sub = assert_ok!(handle.execute_query(ExecuteOptions::default()).await);
    assert_eq!(
        assert_ok!(handle.cancel_execution().await),
        CancelOutcome::Requested(sub.token)
    );
    assert_eq!(
        assert_ok!(handle.cancel_execution().await),
        CancelOutcome::AlreadyCancelling(sub.token)
    );

    let snapshot = assert_ok!(handle.settled().await);
    assert_eq!(snapshot.state, ExecutionState::Failed);
    assert!(snapshot.error.unwrap().contains("cancelled"));
}

#[tokio::test(start_paused = true)]
async fn test_unacknowledged_cancel_times_out() {
    let handle = SessionBuilder {
        backend: MockExecutionBackend::new()
            .with_latency(Duration::from_secs(30))
            .ignoring_cancel(),
        settings: ExecutionSettings {
            cancel_timeout_ms: 1000,
            ..Default::default()
        },
        ..SessionBuilder::new()
    }
    .start();
    assert_ok!(handle.settled().await);

    assert_ok!(handle.execute_query(ExecuteOptions::default()).await);
    assert_ok!(handle.cancel_execution().await);
    let snapshot = assert_ok!(handle.settled().await);

    assert_eq!(snapshot.state, ExecutionState::Failed);
    assert_eq!(
        snapshot.error.as_deref(),
        Some("Cancellation was not acknowledged within 1000ms")
    );

    // Nothing from the abandoned job may land later.
    tokio::time::sleep(Duration::from_secs(60)).await;
    let later = assert_ok!(handle.snapshot().await);
    assert_eq!(later.state, ExecutionState::Failed);
    assert_eq!(later.row_count, 0);
}

#[tokio::test(start_paused = true)]
async fn test_configured_supersession_replaces_in_flight_run() {
    let handle = SessionBuilder {
        backend: MockExecutionBackend::new().with_latency(Duration::from_millis(500)),
        settings: ExecutionSettings {
            supersede_in_flight: true,
            ..Default::default()
        },
        ..SessionBuilder::new()
    }
    .start();
    assert_ok!(handle.settled().await);

    let first = assert_ok!(handle.execute_query(ExecuteOptions::default()).await);
    tokio::time::sleep(Duration::from_millis(100)).await;
    let second = assert_ok!(handle.execute_query(ExecuteOptions::default()).await);
    assert_eq!(second.superseded, Some(first.token));

    let snapshot = assert_ok!(handle.settled().await);
    assert_eq!(snapshot.state, ExecutionState::Succeeded);
    assert_eq!(snapshot.token, Some(second.token));
}

#[tokio::test(start_paused = true)]
async fn test_superseding_during_slow_submit_cancels_the_replaced_job() {
    let (handle, backend) = SessionBuilder {
        backend: MockExecutionBackend::new()
            .with_submit_delay(Duration::from_millis(300))
            .with_latency(Duration::from_secs(2)),
        ..SessionBuilder::new()
    }
    .start_with_backend();
    assert_ok!(handle.settled().await);

    let first = assert_ok!(handle.execute_query(ExecuteOptions::default()).await);
    tokio::time::sleep(Duration::from_millis(100)).await;
    let second = assert_ok!(handle.execute_query(ExecuteOptions::superseding()).await);
    assert_eq!(second.superseded, Some(first.token));

    tokio::time::sleep(Duration::from_secs(5)).await;

    assert_eq!(backend.submissions(), 2);
    assert_eq!(backend.cancel_requests(), 1);
    let snapshot = assert_ok!(handle.settled().await);
    assert_eq!(snapshot.state, ExecutionState::Succeeded);
    assert_eq!(snapshot.token, Some(second.token));
}

#[tokio::test(start_paused = true)]
async fn test_cancel_timeout_during_slow_submit_still_cancels_the_job() {
    let (handle, backend) = SessionBuilder {
        backend: MockExecutionBackend::new()
            .with_submit_delay(Duration::from_secs(2))
            .with_latency(Duration::from_secs(30)),
        settings: ExecutionSettings {
            cancel_timeout_ms: 500,
            ..Default::default()
        },
        ..SessionBuilder::new()
    }
    .start_with_backend();
    assert_ok!(handle.settled().await);

    assert_ok!(handle.execute_query(ExecuteOptions::default()).await);
    assert_ok!(handle.cancel_execution().await);
    let snapshot = assert_ok!(handle.settled().await);
    assert_eq!(
        snapshot.error.as_deref(),
        Some("Cancellation was not acknowledged within 500ms")
    );
    assert_eq!(backend.cancel_requests(), 0);

    tokio::time::sleep(Duration::from_secs(5)).await;

    assert_eq!(backend.submissions(), 1);
    assert_eq!(backend.cancel_requests(), 1);
    let after = assert_ok!(handle.snapshot().await);
    assert_eq!(after.state, ExecutionState::Failed);
}

#[tokio::test(start_paused = true)]
async fn test_read_only_caller_cannot_edit() {
    let handle = SessionBuilder {
        capabilities: Capabilities {
            can_edit: false,
            can_execute: true,
        },
        ..SessionBuilder::new()
    }
    .start();
    assert_ok!(handle.settled().await);

    let err = assert_err!(handle.add_visualization("COUNTER", "Total").await);
    assert!(matches!(err, QueryViewError::ReadOnly));
    let err = assert_err!(handle.edit_schedule(Some(Schedule::every(60))).await);
    assert!(matches!(err, QueryViewError::ReadOnly));

    assert_ok!(handle.execute_query(ExecuteOptions::default()).await);
    let snapshot = assert_ok!(handle.settled().await);
    assert_eq!(snapshot.state, ExecutionState::Succeeded);
}

#[tokio::test(start_paused = true)]
async fn test_store_failure_leaves_view_unchanged() {
    let handle = SessionBuilder {
        store: MemoryQueryStore::new()
            .with_query(&Query::demo())
            .failing("database is read-only"),
        ..SessionBuilder::new()
    }
    .start();
    let before = assert_ok!(handle.settled().await);

    let err = assert_err!(handle.update_description("New text").await);
    assert!(matches!(err, QueryViewError::Store(_)));
    let err = assert_err!(handle.delete_visualization(VisualizationId(1)).await);
    assert!(matches!(err, QueryViewError::Store(_)));

    let after = assert_ok!(handle.snapshot().await);
    assert_eq!(after.description, before.description);
    assert_eq!(after.visualizations, before.visualizations);
    assert_eq!(after.selected_visualization, Some(VisualizationId(1)));
}

#[tokio::test(start_paused = true)]
async fn test_saved_edits_replace_the_query() {
    let handle = SessionBuilder::new().start();
    assert_ok!(handle.settled().await);

    let query = assert_ok!(handle.update_description("Signups by region").await);
    assert_eq!(query.description.as_deref(), Some("Signups by region"));
    let query = assert_ok!(handle.edit_schedule(Some(Schedule::every(3600))).await);
    assert_eq!(query.schedule.as_ref().and_then(|s| s.interval), Some(3600));

    let snapshot = assert_ok!(handle.snapshot().await);
    assert_eq!(snapshot.description.as_deref(), Some("Signups by region"));

    assert_ok!(handle.select_visualization(VisualizationId(2)).await);
    assert_ok!(handle.delete_visualization(VisualizationId(2)).await);
    let snapshot = assert_ok!(handle.snapshot().await);
    assert_eq!(snapshot.selected_visualization, Some(VisualizationId(1)));
}

#[tokio::test(start_paused = true)]
async fn test_discard_parameters_reenables_execute() {
    let handle = SessionBuilder::new().start();
    assert_ok!(handle.settled().await);

    assert_ok!(handle.set_parameter("limit", serde_json::json!(50)).await);
    let dirty = assert_ok!(handle.snapshot().await);
    assert_eq!(dirty.execute_blocked_by, Some(GateRejection::ParametersDirty));

    assert_ok!(handle.discard_parameters().await);
    let clean = assert_ok!(handle.snapshot().await);
    assert!(!clean.parameters_dirty);
    assert_eq!(clean.execute_blocked_by, None);
}

#[tokio::test(start_paused = true)]
async fn test_unknown_parameter_is_rejected() {
    let handle = SessionBuilder::new().start();

    let err = assert_err!(handle.set_parameter("nope", serde_json::json!(1)).await);
    assert!(matches!(err, QueryViewError::UnknownParameter(name) if name == "nope"));
}

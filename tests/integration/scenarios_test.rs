//! End-to-end scenarios for the view state machine, driven synchronously.

use pretty_assertions::assert_eq;
use queryview::config::ExecutionSettings;
use queryview::error::GateRejection;
use queryview::execution::{
    CancelOutcome, ColumnInfo, ExecutionError, ExecutionState, ResultSet, Transition,
};
use queryview::model::VisualizationId;
use queryview::view::ExecuteOptions;
use serde_json::json;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

use super::common::resolved_view;

fn rows(n: i64) -> ResultSet {
    ResultSet::with_data(
        vec![ColumnInfo::new("n", "int8")],
        (0..n).map(|i| vec![i.into()]).collect(),
    )
    .with_runtime(Duration::from_millis(40))
}

#[test]
fn test_deleting_selected_visualization_selects_next() {
    let mut view = resolved_view(ExecutionSettings::default());
    assert_eq!(view.selected_visualization(), Some(VisualizationId(1)));

    assert_ok!(view.delete_visualization(VisualizationId(1)));

    assert_eq!(view.selected_visualization(), Some(VisualizationId(2)));
    assert!(view.query().has_visualization(VisualizationId(2)));
}

#[test]
fn test_deleting_last_visualization_clears_selection() {
    let mut view = resolved_view(ExecutionSettings::default());

    assert_ok!(view.delete_visualization(VisualizationId(1)));
    assert_ok!(view.delete_visualization(VisualizationId(2)));

    assert_eq!(view.selected_visualization(), None);
}

#[test]
fn test_submit_while_executing_is_rejected_without_new_token() {
    let mut view = resolved_view(ExecutionSettings::default());
    let first = assert_ok!(view.execute(ExecuteOptions::default()));

    let reason = assert_err!(view.execute(ExecuteOptions::default()));

    assert_eq!(reason, GateRejection::AlreadyRunning);
    assert_eq!(view.controller().current_token(), Some(first.token));
    assert_eq!(view.state(), ExecutionState::Executing);
}

#[test]
fn test_late_success_after_cancel_timeout_is_discarded() {
    let mut view = resolved_view(ExecutionSettings {
        cancel_timeout_ms: 500,
        ..Default::default()
    });
    let sub = assert_ok!(view.execute(ExecuteOptions::default()));
    assert_eq!(view.cancel(), CancelOutcome::Requested(sub.token));

    assert_eq!(view.on_cancel_timeout(sub.token), Transition::Applied);
    assert_eq!(view.state(), ExecutionState::Failed);
    let failed = view.snapshot();

    let late = view.on_complete(sub.token, Ok(rows(5)));

    assert!(!late.is_applied());
    assert_eq!(view.state(), ExecutionState::Failed);
    let result = view.controller().result().cloned().unwrap();
    assert_eq!(
        result.error,
        Some(ExecutionError::CancelTimeout { after_ms: 500 })
    );
    assert_eq!(view.snapshot().rows, failed.rows);
    assert_eq!(view.result_view().row_count(), 0);
}

#[test]
fn test_dirty_parameters_block_execute_without_transition() {
    let mut view = resolved_view(ExecutionSettings::default());
    assert_ok!(view.set_parameter("region", json!("us")));

    assert_eq!(
        view.can_execute(ExecuteOptions::default()),
        Err(GateRejection::ParametersDirty)
    );
    let reason = assert_err!(view.execute(ExecuteOptions::default()));

    assert_eq!(reason, GateRejection::ParametersDirty);
    assert_eq!(view.state(), ExecutionState::Idle);
    assert_eq!(view.controller().current_token(), None);
}

#[test]
fn test_dirty_parameters_block_execute_in_every_other_condition() {
    let mut view = resolved_view(ExecutionSettings::default());
    assert_ok!(view.set_parameter("limit", json!(10)));

    assert!(view.can_execute(ExecuteOptions::superseding()).is_err());
    assert_ok!(view.can_execute(ExecuteOptions::bypass()));

    let sub = assert_ok!(view.execute(ExecuteOptions::bypass()));
    assert_eq!(view.execution_parameters()["limit"], json!(3));

    assert!(view.can_execute(ExecuteOptions::default()).is_err());
    assert!(view.can_execute(ExecuteOptions::superseding()).is_err());

    view.on_complete(sub.token, Ok(rows(1)));
    assert!(view.can_execute(ExecuteOptions::default()).is_err());
}

#[test]
fn test_stale_completion_never_changes_result_view() {
    let mut view = resolved_view(ExecutionSettings::default());
    let first = assert_ok!(view.execute(ExecuteOptions::default()));
    let second = assert_ok!(view.execute(ExecuteOptions::superseding()));
    assert_eq!(second.superseded, Some(first.token));

    let before = view.snapshot();
    let stale = view.on_complete(first.token, Ok(rows(7)));

    assert!(!stale.is_applied());
    let after = view.snapshot();
    assert_eq!(after.state, before.state);
    assert_eq!(after.token, Some(second.token));
    assert_eq!(after.row_count, 0);
    assert_eq!(after.discarded_events, 1);

    assert!(view.on_complete(second.token, Ok(rows(2))).is_applied());
    assert_eq!(view.result_view().row_count(), 2);
}

#[test]
fn test_second_cancel_has_no_further_effect() {
    let mut view = resolved_view(ExecutionSettings::default());
    let sub = assert_ok!(view.execute(ExecuteOptions::default()));

    assert_eq!(view.cancel(), CancelOutcome::Requested(sub.token));
    let once = view.snapshot();
    assert_eq!(view.cancel(), CancelOutcome::AlreadyCancelling(sub.token));
    let twice = view.snapshot();

    assert_eq!(once, twice);
    assert_eq!(twice.state, ExecutionState::Cancelling);
}

#[test]
fn test_apply_parameters_commits_and_reruns() {
    let mut view = resolved_view(ExecutionSettings::default());
    assert_ok!(view.set_parameter("region", json!("apac")));

    let sub = assert_ok!(view.apply_parameters());

    assert_eq!(view.controller().current_token(), Some(sub.token));
    assert_eq!(view.execution_parameters()["region"], json!("apac"));
    assert!(!view.parameters().is_dirty());
}

#[test]
fn test_state_is_always_one_of_five_across_event_mix() {
    let mut view = resolved_view(ExecutionSettings::default());
    let mut tokens = Vec::new();

    for step in 0..40u32 {
        match step % 5 {
            0 => {
                if let Ok(sub) = view.execute(ExecuteOptions::superseding()) {
                    tokens.push(sub.token);
                }
            }
            1 => {
                view.cancel();
            }
            2 => {
                if let Some(token) = tokens.first().copied() {
                    view.on_complete(token, Ok(rows(1)));
                }
            }
            3 => {
                if let Some(token) = tokens.last().copied() {
                    view.on_complete(token, Err(ExecutionError::failed("boom")));
                }
            }
            _ => {
                if let Some(token) = tokens.last().copied() {
                    view.on_cancel_timeout(token);
                }
            }
        }

        let state = view.state();
        assert!(matches!(
            state,
            ExecutionState::Idle
                | ExecutionState::Executing
                | ExecutionState::Cancelling
                | ExecutionState::Succeeded
                | ExecutionState::Failed
        ));
        if state.is_running() {
            assert!(view.controller().current_token().is_some());
        }
    }
}

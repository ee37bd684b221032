//! Final run report assembled once the scheduler loop exits.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::store::{ActionStatus, ExecutionState, ResultStore};
use crate::types::ActionRef;
use crate::workflow::WorkflowDefinition;

/// Terminal outcome of a whole run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunOutcome {
    /// No reachable action failed; skips routed around by the graph (or
    /// caused by out-of-closure references) do not count against success.
    Succeeded,
    /// At least one reachable action ended Failed.
    Failed,
    /// The run was cancelled before all reachable actions reached a terminal
    /// state; in-flight actions were drained first.
    Cancelled,
}

/// Per-action summary in the final report.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ActionReport {
    pub status: ActionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    pub attempt: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub triggered_by: Option<ActionRef>,
}

/// Complete, serialisable account of one workflow run.
///
/// `dispatch_order` is the deterministic replay witness: two runs of the same
/// definition with the same completion history produce the same sequence.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub workflow_id: String,
    pub outcome: RunOutcome,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Recorded outputs of every succeeded action, keyed by ref.
    pub outputs: BTreeMap<ActionRef, Value>,
    pub actions: BTreeMap<ActionRef, ActionReport>,
    /// Actions in the order the scheduler dispatched them.
    pub dispatch_order: Vec<ActionRef>,
}

impl RunReport {
    /// `true` only when the run completed without any reachable action
    /// ending Failed.
    #[must_use]
    pub fn success(&self) -> bool {
        matches!(self.outcome, RunOutcome::Succeeded)
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn assemble(
        run_id: String,
        workflow_id: String,
        outcome: RunOutcome,
        started_at: DateTime<Utc>,
        definition: &WorkflowDefinition,
        exec: &ExecutionState,
        store: &ResultStore,
        dispatch_order: Vec<ActionRef>,
    ) -> Self {
        let mut outputs = BTreeMap::new();
        let mut actions = BTreeMap::new();
        for action in definition.actions() {
            let state = exec.get(&action.id).cloned().unwrap_or_default();
            let output = store.output(&action.id).cloned();
            if let Some(value) = &output {
                if state.status == ActionStatus::Succeeded {
                    outputs.insert(action.id.clone(), value.clone());
                }
            }
            actions.insert(
                action.id.clone(),
                ActionReport {
                    status: state.status,
                    output,
                    error: state.error,
                    warnings: state.warnings,
                    attempt: state.attempt,
                    triggered_by: state.triggered_by,
                },
            );
        }
        Self {
            run_id,
            workflow_id,
            outcome,
            started_at,
            finished_at: Utc::now(),
            outputs,
            actions,
            dispatch_order,
        }
    }
}

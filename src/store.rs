//! Run-scoped execution state and the append-only result store.
//!
//! Both structures are owned exclusively by the scheduler: one writer, no
//! shared mutable maps reached from multiple call sites. The parameter
//! resolver and the join-gate evaluator read through `&` borrows only.
//!
//! Per-action lifecycle:
//!
//! ```text
//! Pending -> Ready -> Running -> Succeeded
//!                             -> Failed
//! Pending -> Skipped   (no join strategy can route around upstream failure)
//! ```
//!
//! All terminal transitions stamp a monotonically increasing completion
//! index, which is how `triggered_by` attribution stays deterministic under
//! replay: it depends only on the ordered history of completion events.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::types::ActionRef;

/// Status of one action within a run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionStatus {
    #[default]
    Pending,
    Ready,
    Running,
    Succeeded,
    Failed,
    Skipped,
}

impl ActionStatus {
    /// Terminal statuses unblock dependents and count toward run completion.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Skipped)
    }
}

impl fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Ready => "ready",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        };
        write!(f, "{s}")
    }
}

/// Mutable per-action record, owned by the scheduler.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ActionState {
    pub status: ActionStatus,
    pub error: Option<String>,
    /// Upstream ref whose completion made this action ready.
    pub triggered_by: Option<ActionRef>,
    /// Dispatch count; the scheduler itself never re-dispatches, so this
    /// stays at one for every action that ran.
    pub attempt: u32,
    /// Resolver warnings carried for observability in the final report.
    pub warnings: Vec<String>,
    /// Position in the ordered completion history, stamped at the terminal
    /// transition.
    pub completion_index: Option<u64>,
}

/// Scheduler-owned state table for every action of a run.
///
/// Transitions are funneled through the methods below so the state machine
/// invariant (one terminal transition per action) holds at a single choke
/// point.
#[derive(Clone, Debug, Default)]
pub struct ExecutionState {
    states: FxHashMap<ActionRef, ActionState>,
    completion_counter: u64,
}

impl ExecutionState {
    #[must_use]
    pub fn new(refs: impl IntoIterator<Item = ActionRef>) -> Self {
        let states = refs
            .into_iter()
            .map(|r| (r, ActionState::default()))
            .collect();
        Self {
            states,
            completion_counter: 0,
        }
    }

    #[must_use]
    pub fn status(&self, action: &ActionRef) -> ActionStatus {
        self.states
            .get(action)
            .map(|s| s.status)
            .unwrap_or_default()
    }

    #[must_use]
    pub fn get(&self, action: &ActionRef) -> Option<&ActionState> {
        self.states.get(action)
    }

    #[must_use]
    pub fn completion_index(&self, action: &ActionRef) -> Option<u64> {
        self.states.get(action).and_then(|s| s.completion_index)
    }

    /// Pending -> Ready, recording the upstream that unblocked the action.
    pub fn mark_ready(&mut self, action: &ActionRef, triggered_by: Option<ActionRef>) {
        if let Some(state) = self.states.get_mut(action) {
            debug_assert_eq!(state.status, ActionStatus::Pending);
            state.status = ActionStatus::Ready;
            state.triggered_by = triggered_by;
        }
    }

    /// Ready -> Running, stamping the dispatch attempt and resolver warnings.
    pub fn mark_running(&mut self, action: &ActionRef, warnings: Vec<String>) {
        if let Some(state) = self.states.get_mut(action) {
            debug_assert_eq!(state.status, ActionStatus::Ready);
            state.status = ActionStatus::Running;
            state.attempt += 1;
            state.warnings = warnings;
        }
    }

    /// Running -> Succeeded.
    pub fn mark_succeeded(&mut self, action: &ActionRef) {
        self.terminal_transition(action, ActionStatus::Succeeded, None);
    }

    /// Running -> Failed with the component error message.
    pub fn mark_failed(&mut self, action: &ActionRef, error: String) {
        self.terminal_transition(action, ActionStatus::Failed, Some(error));
    }

    /// Pending -> Skipped; the only legal source status for a skip.
    pub fn mark_skipped(&mut self, action: &ActionRef) {
        if let Some(state) = self.states.get(action) {
            debug_assert_eq!(state.status, ActionStatus::Pending);
        }
        self.terminal_transition(action, ActionStatus::Skipped, None);
    }

    fn terminal_transition(
        &mut self,
        action: &ActionRef,
        status: ActionStatus,
        error: Option<String>,
    ) {
        let Some(state) = self.states.get_mut(action) else {
            return;
        };
        if state.status.is_terminal() {
            tracing::warn!(action = %action, from = %state.status, to = %status,
                "ignoring second terminal transition");
            return;
        }
        state.status = status;
        state.error = error;
        state.completion_index = Some(self.completion_counter);
        self.completion_counter += 1;
        tracing::trace!(action = %action, status = %status, "action reached terminal state");
    }

    /// Iterate `(ref, state)` pairs in arbitrary order; callers that need
    /// determinism sort by definition order.
    pub fn iter(&self) -> impl Iterator<Item = (&ActionRef, &ActionState)> {
        self.states.iter()
    }
}

/// Append-only mapping from action ref to recorded output.
///
/// Write access is exclusive to the scheduler's completion handler; the
/// parameter resolver and report builder only read. First write wins.
#[derive(Clone, Debug, Default)]
pub struct ResultStore {
    outputs: FxHashMap<ActionRef, Value>,
}

impl ResultStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an action's output. Duplicate writes are rejected to preserve
    /// the append-only contract.
    pub fn record(&mut self, action: ActionRef, output: Value) {
        match self.outputs.entry(action) {
            std::collections::hash_map::Entry::Occupied(entry) => {
                tracing::warn!(action = %entry.key(), "output already recorded; keeping first write");
            }
            std::collections::hash_map::Entry::Vacant(entry) => {
                entry.insert(output);
            }
        }
    }

    #[must_use]
    pub fn output(&self, action: &ActionRef) -> Option<&Value> {
        self.outputs.get(action)
    }

    #[must_use]
    pub fn contains(&self, action: &ActionRef) -> bool {
        self.outputs.contains_key(action)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ActionRef, &Value)> {
        self.outputs.iter()
    }
}

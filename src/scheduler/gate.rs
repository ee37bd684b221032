//! Join-strategy gating for convergence nodes.
//!
//! One exhaustive function decides whether a pending action may proceed,
//! must keep waiting, or can never proceed. Modelling the strategy as a
//! tagged variant evaluated in a single `match` keeps the state machine
//! auditable; there are no scattered strategy conditionals anywhere else.

use crate::store::{ActionStatus, ExecutionState};
use crate::types::{ActionRef, JoinStrategy};
use crate::workflow::{Action, WorkflowDefinition};

/// Outcome of evaluating an action's readiness gate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GateDecision {
    /// All gates satisfied; the action may be dispatched.
    Open {
        /// Terminal dependency with the highest completion index — the
        /// upstream whose completion unblocked this action.
        triggered_by: Option<ActionRef>,
        /// Dependencies that ended Failed or Skipped, surfaced to the
        /// runner as failure context.
        failed_upstream: Vec<ActionRef>,
    },
    /// At least one gate is still waiting on a non-terminal dependency.
    Blocked,
    /// No join strategy can route around the upstream failures; the action
    /// must be skipped.
    Unsatisfiable,
}

/// Evaluate the readiness gate for one pending action.
///
/// Non-grouped dependencies use an implicit `all` gate over their singleton
/// set: the producer must have Succeeded, and a Failed or Skipped producer
/// makes the gate unsatisfiable. Grouped dependencies are gated per the
/// *consuming* action's join strategy, over every sibling of the group.
#[must_use]
pub fn evaluate_gate(
    definition: &WorkflowDefinition,
    action: &Action,
    exec: &ExecutionState,
) -> GateDecision {
    let deps = definition.dependencies(action);
    if deps.is_empty() {
        return GateDecision::Open {
            triggered_by: None,
            failed_upstream: Vec::new(),
        };
    }

    let strategy = definition.metadata(&action.id).join_strategy;
    let mut blocked = false;

    // Group gates are evaluated once per distinct group; plain deps as they
    // appear. `deps` is definition-ordered, so the failure context is too.
    let mut groups_seen: Vec<String> = Vec::new();
    for dep in &deps {
        match definition.metadata(dep).group_id {
            Some(group_id) => {
                if groups_seen.contains(&group_id) {
                    continue;
                }
                groups_seen.push(group_id.clone());
                let siblings = definition.group_members(&group_id);
                match evaluate_group(strategy, &siblings, exec) {
                    GroupGate::Open => {}
                    GroupGate::Blocked => blocked = true,
                    GroupGate::Unsatisfiable => return GateDecision::Unsatisfiable,
                }
            }
            None => match exec.status(dep) {
                ActionStatus::Succeeded => {}
                ActionStatus::Failed | ActionStatus::Skipped => {
                    return GateDecision::Unsatisfiable;
                }
                ActionStatus::Pending | ActionStatus::Ready | ActionStatus::Running => {
                    blocked = true;
                }
            },
        }
    }

    if blocked {
        return GateDecision::Blocked;
    }

    let failed_upstream: Vec<ActionRef> = deps
        .iter()
        .filter(|d| {
            matches!(
                exec.status(d),
                ActionStatus::Failed | ActionStatus::Skipped
            )
        })
        .cloned()
        .collect();

    let triggered_by = deps
        .iter()
        .filter_map(|d| exec.completion_index(d).map(|idx| (idx, d)))
        .max_by_key(|(idx, _)| *idx)
        .map(|(_, d)| d.clone());

    GateDecision::Open {
        triggered_by,
        failed_upstream,
    }
}

enum GroupGate {
    Open,
    Blocked,
    Unsatisfiable,
}

fn evaluate_group(
    strategy: JoinStrategy,
    siblings: &[ActionRef],
    exec: &ExecutionState,
) -> GroupGate {
    let statuses: Vec<ActionStatus> = siblings.iter().map(|s| exec.status(s)).collect();
    let all_terminal = statuses.iter().all(ActionStatus::is_terminal);
    let any_terminal = statuses.iter().any(ActionStatus::is_terminal);
    let any_succeeded = statuses
        .iter()
        .any(|s| matches!(s, ActionStatus::Succeeded));

    match strategy {
        JoinStrategy::All => {
            if !all_terminal {
                GroupGate::Blocked
            } else if any_succeeded {
                GroupGate::Open
            } else {
                // Every sibling failed or was skipped; nothing to aggregate.
                GroupGate::Unsatisfiable
            }
        }
        JoinStrategy::Any => {
            if any_terminal {
                GroupGate::Open
            } else {
                GroupGate::Blocked
            }
        }
        JoinStrategy::Race => {
            if any_succeeded {
                GroupGate::Open
            } else if all_terminal {
                GroupGate::Unsatisfiable
            } else {
                GroupGate::Blocked
            }
        }
    }
}

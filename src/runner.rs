//! Collaborator contracts consumed by the scheduler.
//!
//! The scheduler never executes an action's side effect itself. It hands a
//! resolved [`ActionContext`] to a pluggable [`ActionRunner`] and does not
//! know or care whether that runner invokes a containerized tool, a remote
//! call, or an inline computation. Per-action timeouts, retries, and
//! concurrency limits all live behind this trait.
//!
//! [`RunLifecycleHooks`] are fire-and-forget notifications; hook failures
//! are logged by the scheduler and never surface as run failure.

use async_trait::async_trait;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::types::{ActionRef, JoinStrategy};
use crate::workflow::Action;

/// Dispatch-time metadata handed to the action runner alongside the
/// resolved parameters.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DispatchMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    pub join_strategy: JoinStrategy,
    /// Upstream ref whose completion made this action ready; `None` for the
    /// entrypoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub triggered_by: Option<ActionRef>,
    /// Upstream group siblings that failed before this dispatch. Lets a join
    /// node see which fan-out branches are missing from its aggregate.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed_upstream: Vec<ActionRef>,
    /// Keyed mapping of every succeeded group sibling's output, populated
    /// for join nodes downstream of a fan-out group.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub group_results: BTreeMap<ActionRef, Value>,
}

/// Execution context for one action dispatch.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ActionContext {
    pub params: Map<String, Value>,
    /// Resolver warnings, for observability only.
    pub warnings: Vec<String>,
    pub metadata: DispatchMetadata,
}

/// Failure reported by an action runner.
///
/// The two variants shape the whole failure policy: a component failure is
/// local to one action and the graph keeps making progress on unaffected
/// branches; an infrastructure failure means the runner itself could not be
/// invoked and aborts the run immediately.
#[derive(Debug, Error, Diagnostic)]
pub enum ActionFailure {
    /// The action ran and reported an unsuccessful result.
    #[error("component failed: {message}")]
    #[diagnostic(code(dagrun::runner::component))]
    Component {
        message: String,
        #[diagnostic(skip)]
        details: Option<Value>,
    },

    /// The runner itself could not execute the action.
    #[error("infrastructure failure: {message}")]
    #[diagnostic(
        code(dagrun::runner::infrastructure),
        help("The action runner could not be invoked; the run is aborted with partial results.")
    )]
    Infrastructure { message: String },
}

impl ActionFailure {
    pub fn component(message: impl Into<String>) -> Self {
        Self::Component {
            message: message.into(),
            details: None,
        }
    }

    pub fn infrastructure(message: impl Into<String>) -> Self {
        Self::Infrastructure {
            message: message.into(),
        }
    }
}

/// External collaborator that performs an action's side effect.
///
/// The scheduler imposes no concurrency cap of its own; if backpressure is
/// needed, implement it here (e.g. a bounded worker pool in the process
/// execution layer).
#[async_trait]
pub trait ActionRunner: Send + Sync {
    /// Execute one action and return its opaque output value.
    async fn execute(&self, action: &Action, ctx: ActionContext) -> Result<Value, ActionFailure>;
}

#[async_trait]
impl<T: ActionRunner + ?Sized> ActionRunner for std::sync::Arc<T> {
    async fn execute(&self, action: &Action, ctx: ActionContext) -> Result<Value, ActionFailure> {
        (**self).execute(action, ctx).await
    }
}

/// Error surfaced by a lifecycle hook. Logged, never propagated.
#[derive(Debug, Error, Diagnostic)]
#[error("lifecycle hook failed: {message}")]
#[diagnostic(code(dagrun::runner::hook))]
pub struct HookError {
    pub message: String,
}

impl HookError {
    pub fn msg(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Fire-and-forget run lifecycle notifications.
#[async_trait]
pub trait RunLifecycleHooks: Send + Sync {
    async fn on_run_start(&self, _run_id: &str, _workflow_id: &str) -> Result<(), HookError> {
        Ok(())
    }

    async fn on_run_finalize(&self, _run_id: &str) -> Result<(), HookError> {
        Ok(())
    }
}

/// Default hooks implementation that does nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopHooks;

#[async_trait]
impl RunLifecycleHooks for NoopHooks {}

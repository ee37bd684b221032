//! Event-driven DAG execution engine.
//!
//! The scheduler owns all mutable run state and drives a single loop:
//! evaluate readiness gates over pending actions in definition order,
//! dispatch everything that opened, then await the next completion from the
//! in-flight set. Skips propagate through the same gate evaluation, so a
//! failed branch collapses deterministically without special casing.
//!
//! Determinism contract: with identical definitions and an identical ordered
//! completion history, dispatch order, `triggered_by` attributions, and the
//! final report are identical. No wall-clock or hash-map iteration order
//! reaches an observable decision.

pub mod gate;
pub mod report;

pub use gate::{GateDecision, evaluate_gate};
pub use report::{ActionReport, RunOutcome, RunReport};

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use futures_util::stream::{FuturesUnordered, StreamExt};
use miette::Diagnostic;
use serde_json::{Map, Value};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tracing::instrument;

use crate::ids::IdGenerator;
use crate::params::resolve_params;
use crate::runner::{
    ActionContext, ActionFailure, ActionRunner, DispatchMetadata, NoopHooks, RunLifecycleHooks,
};
use crate::store::{ActionStatus, ExecutionState, ResultStore};
use crate::types::ActionRef;
use crate::workflow::{Action, ValidationError, WorkflowDefinition};

/// Errors that abort a run before a normal report can be returned.
#[derive(Debug, Error, Diagnostic)]
pub enum SchedulerError {
    /// The definition failed validation; nothing was dispatched.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Validation(#[from] ValidationError),

    /// The runner reported an infrastructure failure; the run aborted with
    /// partial results.
    #[error("infrastructure failure while executing '{action}': {message}")]
    #[diagnostic(
        code(dagrun::scheduler::infrastructure),
        help("Inspect the partial report for actions that completed before the abort.")
    )]
    Infrastructure {
        action: ActionRef,
        message: String,
        partial: Box<RunReport>,
    },

    /// No action is runnable, none is in flight, yet pending actions remain.
    /// Reachable only through an invalid definition that bypassed validation.
    #[error("workflow stuck with no runnable action; pending: {pending}")]
    #[diagnostic(code(dagrun::scheduler::stuck))]
    Stuck {
        pending: String,
        partial: Box<RunReport>,
    },
}

/// Handle used to request cooperative cancellation of a run.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    /// Signal cancellation. Already-running actions are drained, nothing new
    /// dispatches, and the run finishes with [`RunOutcome::Cancelled`].
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

/// Cloneable token observed by the scheduler between dispatch passes.
#[derive(Clone, Debug)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }
}

/// Create a linked cancellation handle/token pair.
#[must_use]
pub fn cancellation_pair() -> (CancelHandle, CancelToken) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelToken { rx })
}

/// Per-run configuration supplied by the caller.
#[derive(Clone, Debug, Default)]
pub struct RunOptions {
    run_id: Option<String>,
    workflow_id: String,
    runtime_inputs: Option<Map<String, Value>>,
    cancellation: Option<CancelToken>,
}

impl RunOptions {
    #[must_use]
    pub fn new(workflow_id: impl Into<String>) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            ..Self::default()
        }
    }

    /// Pin the run id instead of generating one; useful for replay and
    /// correlation with external systems.
    #[must_use]
    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    /// Caller-supplied inputs merged into the entrypoint's parameters.
    #[must_use]
    pub fn with_runtime_inputs(mut self, inputs: Map<String, Value>) -> Self {
        self.runtime_inputs = Some(inputs);
        self
    }

    #[must_use]
    pub fn with_cancellation(mut self, token: CancelToken) -> Self {
        self.cancellation = Some(token);
        self
    }
}

/// The execution engine. Cheap to clone via its shared collaborators.
#[derive(Clone)]
pub struct Scheduler {
    runner: Arc<dyn ActionRunner>,
    hooks: Arc<dyn RunLifecycleHooks>,
}

type CompletionFuture = BoxFuture<'static, (ActionRef, Result<Value, ActionFailure>)>;

impl Scheduler {
    pub fn new(runner: impl ActionRunner + 'static) -> Self {
        Self {
            runner: Arc::new(runner),
            hooks: Arc::new(NoopHooks),
        }
    }

    #[must_use]
    pub fn with_hooks(mut self, hooks: impl RunLifecycleHooks + 'static) -> Self {
        self.hooks = Arc::new(hooks);
        self
    }

    /// Execute a workflow definition to completion.
    ///
    /// Component failures are tolerated per the join gates and reported in
    /// the returned [`RunReport`]; infrastructure failures and a stuck graph
    /// abort with a partial report inside the error.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::Validation`] before any dispatch,
    /// [`SchedulerError::Infrastructure`] when the runner cannot be invoked,
    /// [`SchedulerError::Stuck`] when pending actions remain but nothing is
    /// runnable or in flight.
    #[instrument(skip_all, fields(workflow_id = %options.workflow_id))]
    pub async fn run(
        &self,
        definition: &WorkflowDefinition,
        options: RunOptions,
    ) -> Result<RunReport, SchedulerError> {
        definition.validate()?;
        self.run_validated(definition, options).await
    }

    async fn run_validated(
        &self,
        definition: &WorkflowDefinition,
        options: RunOptions,
    ) -> Result<RunReport, SchedulerError> {
        let run_id = options
            .run_id
            .clone()
            .unwrap_or_else(|| IdGenerator::new().generate_run_id());
        let started_at = chrono::Utc::now();
        tracing::info!(run_id = %run_id, actions = definition.actions().len(), "run starting");

        if let Err(err) = self.hooks.on_run_start(&run_id, &options.workflow_id).await {
            tracing::warn!(run_id = %run_id, error = %err, "on_run_start hook failed");
        }

        let reachable = definition.reachable_from_entrypoint();
        let mut exec = ExecutionState::new(definition.actions().iter().map(|a| a.id.clone()));
        for action in definition.actions() {
            if !reachable.contains(&action.id) {
                tracing::warn!(action = %action.id, "action unreachable from entrypoint; skipping");
                exec.mark_skipped(&action.id);
            }
        }

        let mut store = ResultStore::new();
        let mut dispatch_order: Vec<ActionRef> = Vec::new();
        let mut in_flight: FuturesUnordered<CompletionFuture> = FuturesUnordered::new();
        let mut cancelled = false;

        loop {
            if !cancelled
                && options
                    .cancellation
                    .as_ref()
                    .is_some_and(CancelToken::is_cancelled)
            {
                cancelled = true;
                tracing::info!(run_id = %run_id, "cancellation observed; draining in-flight actions");
            }

            let mut progressed = false;
            if !cancelled {
                for action in definition.actions() {
                    if exec.status(&action.id) != ActionStatus::Pending {
                        continue;
                    }
                    match evaluate_gate(definition, action, &exec) {
                        GateDecision::Open {
                            triggered_by,
                            failed_upstream,
                        } => {
                            self.dispatch(
                                definition,
                                action,
                                triggered_by,
                                failed_upstream,
                                &options,
                                &mut exec,
                                &store,
                                &mut dispatch_order,
                                &mut in_flight,
                            );
                            progressed = true;
                        }
                        GateDecision::Unsatisfiable => {
                            tracing::debug!(action = %action.id,
                                "no join strategy satisfiable; skipping");
                            exec.mark_skipped(&action.id);
                            progressed = true;
                        }
                        GateDecision::Blocked => {}
                    }
                }
            }

            if in_flight.is_empty() {
                let pending = pending_refs(definition, &reachable, &exec);
                if cancelled || pending.is_empty() {
                    break;
                }
                if progressed {
                    // Skips may cascade; re-evaluate gates before concluding.
                    continue;
                }
                let pending_list = pending
                    .iter()
                    .map(ActionRef::as_str)
                    .collect::<Vec<_>>()
                    .join(", ");
                tracing::error!(run_id = %run_id, pending = %pending_list, "run stuck");
                self.finalize(&run_id).await;
                let partial = RunReport::assemble(
                    run_id,
                    options.workflow_id,
                    RunOutcome::Failed,
                    started_at,
                    definition,
                    &exec,
                    &store,
                    dispatch_order,
                );
                return Err(SchedulerError::Stuck {
                    pending: pending_list,
                    partial: Box::new(partial),
                });
            }

            let Some((id, result)) = in_flight.next().await else {
                continue;
            };
            match result {
                Ok(output) => {
                    tracing::debug!(action = %id, "action succeeded");
                    store.record(id.clone(), output);
                    exec.mark_succeeded(&id);
                }
                Err(ActionFailure::Component { message, details }) => {
                    tracing::warn!(action = %id, error = %message, "component failed");
                    if let Some(details) = details {
                        tracing::debug!(action = %id, details = %details, "failure details");
                    }
                    exec.mark_failed(&id, message);
                }
                Err(ActionFailure::Infrastructure { message }) => {
                    tracing::error!(action = %id, error = %message,
                        "infrastructure failure; aborting run");
                    exec.mark_failed(&id, message.clone());
                    self.finalize(&run_id).await;
                    let partial = RunReport::assemble(
                        run_id,
                        options.workflow_id,
                        RunOutcome::Failed,
                        started_at,
                        definition,
                        &exec,
                        &store,
                        dispatch_order,
                    );
                    return Err(SchedulerError::Infrastructure {
                        action: id,
                        message,
                        partial: Box::new(partial),
                    });
                }
            }
        }

        // Skips alone never fail a run: a reachable action skipped because
        // it references an action outside the entrypoint's closure has no
        // failure anywhere. Failure-rooted cascades always leave a Failed
        // ancestor behind.
        let outcome = if cancelled {
            RunOutcome::Cancelled
        } else if reachable
            .iter()
            .any(|r| exec.status(r) == ActionStatus::Failed)
        {
            RunOutcome::Failed
        } else {
            RunOutcome::Succeeded
        };

        self.finalize(&run_id).await;
        let report = RunReport::assemble(
            run_id,
            options.workflow_id,
            outcome,
            started_at,
            definition,
            &exec,
            &store,
            dispatch_order,
        );
        tracing::info!(run_id = %report.run_id, outcome = ?report.outcome,
            dispatched = report.dispatch_order.len(), "run finished");
        Ok(report)
    }

    #[allow(clippy::too_many_arguments)]
    fn dispatch(
        &self,
        definition: &WorkflowDefinition,
        action: &Action,
        triggered_by: Option<ActionRef>,
        failed_upstream: Vec<ActionRef>,
        options: &RunOptions,
        exec: &mut ExecutionState,
        store: &ResultStore,
        dispatch_order: &mut Vec<ActionRef>,
        in_flight: &mut FuturesUnordered<CompletionFuture>,
    ) {
        exec.mark_ready(&action.id, triggered_by.clone());

        let runtime_inputs = if action.id == *definition.entrypoint() {
            options.runtime_inputs.as_ref()
        } else {
            None
        };
        let resolved = resolve_params(action, store, runtime_inputs);
        for warning in &resolved.warnings {
            tracing::warn!(action = %action.id, warning = %warning, "resolver warning");
        }
        exec.mark_running(&action.id, resolved.warnings.clone());
        dispatch_order.push(action.id.clone());

        let meta = definition.metadata(&action.id);
        let ctx = ActionContext {
            params: resolved.params,
            warnings: resolved.warnings,
            metadata: DispatchMetadata {
                stream_id: meta.stream_id,
                group_id: meta.group_id,
                join_strategy: meta.join_strategy,
                triggered_by,
                failed_upstream,
                group_results: collect_group_results(definition, action, store),
            },
        };

        tracing::debug!(action = %action.id, component = %action.component_id, "dispatching");
        let runner = Arc::clone(&self.runner);
        let owned = action.clone();
        in_flight.push(
            async move {
                let result = runner.execute(&owned, ctx).await;
                (owned.id, result)
            }
            .boxed(),
        );
    }

    async fn finalize(&self, run_id: &str) {
        if let Err(err) = self.hooks.on_run_finalize(run_id).await {
            tracing::warn!(run_id = %run_id, error = %err, "on_run_finalize hook failed");
        }
    }
}

/// Reachable actions not yet terminal, in definition order.
fn pending_refs(
    definition: &WorkflowDefinition,
    reachable: &rustc_hash::FxHashSet<ActionRef>,
    exec: &ExecutionState,
) -> Vec<ActionRef> {
    definition
        .actions()
        .iter()
        .filter(|a| reachable.contains(&a.id) && !exec.status(&a.id).is_terminal())
        .map(|a| a.id.clone())
        .collect()
}

/// Outputs of every succeeded sibling across the groups this action joins
/// on, keyed by ref. Empty for actions without grouped dependencies.
fn collect_group_results(
    definition: &WorkflowDefinition,
    action: &Action,
    store: &ResultStore,
) -> std::collections::BTreeMap<ActionRef, Value> {
    let mut results = std::collections::BTreeMap::new();
    for dep in definition.dependencies(action) {
        if definition.metadata(&dep).group_id.is_none() {
            continue;
        }
        if let Some(output) = store.output(&dep) {
            results.insert(dep, output.clone());
        }
    }
    results
}

//! # Dagrun: Deterministic DAG Workflow Execution
//!
//! Dagrun executes directed acyclic workflows of actions with dataflow
//! dependencies, fan-out groups, and pluggable join strategies, while
//! keeping every scheduling decision deterministic enough to replay.
//!
//! ## Core Concepts
//!
//! - **Actions**: Component invocations with declared parameter trees
//! - **References**: `{{action.path}}` expressions resolved from upstream
//!   outputs at dispatch time
//! - **Groups**: Fan-out sibling sets gated by `all`/`any`/`race` joins
//! - **Scheduler**: Event-driven loop dispatching every ready action
//!   concurrently, propagating skips through unsatisfiable gates
//! - **Report**: A serialisable account of the run, including the exact
//!   dispatch order
//!
//! ## Quick Start
//!
//! ```
//! use async_trait::async_trait;
//! use dagrun::params::ParamValue;
//! use dagrun::runner::{ActionContext, ActionFailure, ActionRunner};
//! use dagrun::scheduler::{RunOptions, Scheduler};
//! use dagrun::workflow::{Action, WorkflowBuilder};
//! use serde_json::{Value, json};
//!
//! struct Echo;
//!
//! #[async_trait]
//! impl ActionRunner for Echo {
//!     async fn execute(
//!         &self,
//!         action: &Action,
//!         ctx: ActionContext,
//!     ) -> Result<Value, ActionFailure> {
//!         Ok(json!({ "ran": action.id.as_str(), "with": ctx.params }))
//!     }
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let definition = WorkflowBuilder::new()
//!     .add_action(Action::new("scan", "tools.scan"))
//!     .add_action(
//!         Action::new("triage", "tools.triage")
//!             .with_param("hosts", ParamValue::reference("scan.ran")),
//!     )
//!     .entrypoint("scan")
//!     .build()
//!     .expect("valid workflow");
//!
//! let report = Scheduler::new(Echo)
//!     .run(&definition, RunOptions::new("demo"))
//!     .await
//!     .expect("run completes");
//! assert!(report.success());
//! assert_eq!(report.dispatch_order.len(), 2);
//! # }
//! ```
//!
//! ## Module Guide
//!
//! - [`workflow`]: definitions, validation, dependency analysis
//! - [`params`]: parameter trees and reference resolution
//! - [`scheduler`]: the execution engine, gates, and reports
//! - [`runner`]: the [`runner::ActionRunner`] contract and lifecycle hooks
//! - [`store`]: run-scoped execution state and the append-only result store
//! - [`types`]: shared identifiers and fan-out metadata
//! - [`telemetry`]: tracing subscriber setup for binaries and tests

pub mod ids;
pub mod params;
pub mod runner;
pub mod scheduler;
pub mod store;
pub mod telemetry;
pub mod types;
pub mod workflow;

//! Workflow definition and dependency analysis.
//!
//! A [`WorkflowDefinition`] is the immutable input of a run: an ordered set
//! of [`Action`]s, one designated entrypoint, and per-action fan-out
//! metadata. The definition exposes the dependency structure derived from
//! parameter references plus group-implied join edges, and validates itself
//! before any action dispatches.
//!
//! Iteration order is always stable definition order. The scheduler relies
//! on that for durable replay determinism, so nothing here may leak hash-map
//! iteration order into an observable result.
//!
//! # Quick Start
//!
//! ```
//! use dagrun::workflow::{Action, WorkflowBuilder};
//! use dagrun::params::ParamValue;
//!
//! let definition = WorkflowBuilder::new()
//!     .add_action(Action::new("scan", "tools.nmap"))
//!     .add_action(
//!         Action::new("triage", "tools.triage")
//!             .with_param("hosts", ParamValue::reference("scan.hosts")),
//!     )
//!     .entrypoint("scan")
//!     .build()
//!     .expect("acyclic workflow");
//!
//! let deps = definition.dependencies(definition.action(&"triage".into()).unwrap());
//! assert_eq!(deps, vec!["scan".into()]);
//! ```

mod builder;
#[cfg(test)]
mod tests;

pub use builder::WorkflowBuilder;

use miette::Diagnostic;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::collections::VecDeque;
use thiserror::Error;

use crate::params::ParamValue;
use crate::types::{ActionRef, NodeMetadata};

/// One node of the execution graph: a single component invocation.
///
/// Immutable once a run starts. Parameters are a typed tree mixing literals
/// and references to upstream outputs (see [`crate::params`]).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Action {
    /// Unique ref within the workflow.
    pub id: ActionRef,
    /// Identifies the runnable behavior this action invokes.
    pub component_id: String,
    /// Declared parameters, resolved at dispatch time.
    #[serde(default)]
    pub params: BTreeMap<String, ParamValue>,
}

impl Action {
    pub fn new(id: impl Into<ActionRef>, component_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            component_id: component_id.into(),
            params: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: ParamValue) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    /// Actions referenced by this action's parameter tree, in tree order.
    #[must_use]
    pub fn referenced_actions(&self) -> Vec<ActionRef> {
        let mut out = Vec::new();
        for value in self.params.values() {
            for r in value.referenced_actions() {
                if !out.contains(&r) {
                    out.push(r);
                }
            }
        }
        out
    }
}

/// Validation-time errors, raised before any action dispatches.
#[derive(Debug, Error, Diagnostic)]
pub enum ValidationError {
    /// The dependency graph (including group/join edges) contains a cycle.
    #[error("workflow contains a dependency cycle involving: {members}")]
    #[diagnostic(
        code(dagrun::workflow::cycle),
        help("Remove the circular parameter reference between the listed actions.")
    )]
    Cycle { members: String },

    /// A parameter references an action ref that does not exist.
    #[error("action '{action}' references unknown action '{target}'")]
    #[diagnostic(
        code(dagrun::workflow::dangling_reference),
        help("Check the reference expression for a typo or a removed action.")
    )]
    DanglingReference { action: ActionRef, target: ActionRef },

    /// The designated entrypoint is not present in the action set.
    #[error("entrypoint '{entrypoint}' is not present in the workflow's actions")]
    #[diagnostic(code(dagrun::workflow::unknown_entrypoint))]
    UnknownEntrypoint { entrypoint: ActionRef },

    /// Two actions share the same ref.
    #[error("duplicate action ref '{action}'")]
    #[diagnostic(
        code(dagrun::workflow::duplicate_ref),
        help("Action refs must be unique within one workflow definition.")
    )]
    DuplicateRef { action: ActionRef },
}

/// Immutable, validated workflow graph supplied once per run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    actions: Vec<Action>,
    entrypoint: ActionRef,
    metadata: FxHashMap<ActionRef, NodeMetadata>,
    #[serde(skip)]
    index: FxHashMap<ActionRef, usize>,
}

impl WorkflowDefinition {
    /// Assemble a definition without validating. Used by the builder (which
    /// validates immediately afterwards) and by scheduler tests probing the
    /// deadlock detector.
    pub(crate) fn from_parts_unchecked(
        actions: Vec<Action>,
        entrypoint: ActionRef,
        metadata: FxHashMap<ActionRef, NodeMetadata>,
    ) -> Self {
        let index = actions
            .iter()
            .enumerate()
            .map(|(i, a)| (a.id.clone(), i))
            .collect();
        Self {
            actions,
            entrypoint,
            metadata,
            index,
        }
    }

    #[must_use]
    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    #[must_use]
    pub fn entrypoint(&self) -> &ActionRef {
        &self.entrypoint
    }

    #[must_use]
    pub fn action(&self, id: &ActionRef) -> Option<&Action> {
        self.index.get(id).map(|&i| &self.actions[i])
    }

    /// Position of an action in the authored definition order.
    #[must_use]
    pub fn definition_index(&self, id: &ActionRef) -> Option<usize> {
        self.index.get(id).copied()
    }

    /// Metadata for an action; absent entries behave like the default
    /// (no stream, no group, `all` join).
    #[must_use]
    pub fn metadata(&self, id: &ActionRef) -> NodeMetadata {
        self.metadata.get(id).cloned().unwrap_or_default()
    }

    /// Members of a fan-out group, in definition order.
    #[must_use]
    pub fn group_members(&self, group_id: &str) -> Vec<ActionRef> {
        self.actions
            .iter()
            .filter(|a| {
                self.metadata
                    .get(&a.id)
                    .and_then(|m| m.group_id.as_deref())
                    == Some(group_id)
            })
            .map(|a| a.id.clone())
            .collect()
    }

    /// Dependencies of an action: refs referenced inside its params plus
    /// group-implied join dependencies (every sibling of a referenced
    /// grouped producer, the consumer itself excluded), sorted by definition
    /// order.
    ///
    /// A direct parameter self-reference is kept as a dependency edge so
    /// cycle detection surfaces it; only group-implied self-edges are
    /// stripped.
    ///
    /// Refs that do not resolve to a known action are kept in the result so
    /// validation can report them; they sort after all known actions.
    #[must_use]
    pub fn dependencies(&self, action: &Action) -> Vec<ActionRef> {
        let mut deps = action.referenced_actions();
        let direct = deps.clone();
        for dep in &direct {
            if let Some(group_id) = self
                .metadata
                .get(dep)
                .and_then(|m| m.group_id.clone())
            {
                for sibling in self.group_members(&group_id) {
                    if sibling != action.id && !deps.contains(&sibling) {
                        deps.push(sibling);
                    }
                }
            }
        }
        deps.sort_by_key(|d| self.definition_index(d).unwrap_or(usize::MAX));
        deps
    }

    /// Validate the definition: entrypoint known, no dangling references,
    /// unique refs, and an acyclic dependency graph (including group edges).
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut seen: FxHashSet<&ActionRef> = FxHashSet::default();
        for action in &self.actions {
            if !seen.insert(&action.id) {
                return Err(ValidationError::DuplicateRef {
                    action: action.id.clone(),
                });
            }
        }

        if !self.index.contains_key(&self.entrypoint) {
            return Err(ValidationError::UnknownEntrypoint {
                entrypoint: self.entrypoint.clone(),
            });
        }

        for action in &self.actions {
            for target in action.referenced_actions() {
                if !self.index.contains_key(&target) {
                    return Err(ValidationError::DanglingReference {
                        action: action.id.clone(),
                        target,
                    });
                }
            }
        }

        // Kahn's algorithm; anything left unprocessed sits on a cycle.
        let order = self.topological_order();
        if order.len() != self.actions.len() {
            let ordered: FxHashSet<&ActionRef> = order.iter().collect();
            let members = self
                .actions
                .iter()
                .filter(|a| !ordered.contains(&a.id))
                .map(|a| a.id.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            return Err(ValidationError::Cycle { members });
        }

        Ok(())
    }

    /// Deterministic topological ordering of the dependency graph.
    ///
    /// Ties break by definition order. On a cyclic graph the result is
    /// partial, excluding cycle members; [`validate`](Self::validate) turns
    /// that into a [`ValidationError::Cycle`].
    #[must_use]
    pub fn topological_order(&self) -> Vec<ActionRef> {
        let mut in_degree: FxHashMap<&ActionRef, usize> = FxHashMap::default();
        let mut dependents: FxHashMap<&ActionRef, Vec<&ActionRef>> = FxHashMap::default();

        for action in &self.actions {
            in_degree.entry(&action.id).or_insert(0);
        }
        let deps_by_action: Vec<(usize, Vec<ActionRef>)> = self
            .actions
            .iter()
            .enumerate()
            .map(|(i, a)| (i, self.dependencies(a)))
            .collect();
        for (i, deps) in &deps_by_action {
            let action_id = &self.actions[*i].id;
            for dep in deps {
                // Dangling deps are reported by validate; skip them here.
                let Some(dep_idx) = self.index.get(dep) else {
                    continue;
                };
                *in_degree.entry(action_id).or_insert(0) += 1;
                dependents
                    .entry(&self.actions[*dep_idx].id)
                    .or_default()
                    .push(action_id);
            }
        }

        let mut ready: Vec<&ActionRef> = in_degree
            .iter()
            .filter(|(_, deg)| **deg == 0)
            .map(|(id, _)| *id)
            .collect();
        ready.sort_by_key(|id| self.index[*id]);
        let mut queue: VecDeque<&ActionRef> = ready.into_iter().collect();

        let mut result = Vec::with_capacity(self.actions.len());
        while let Some(id) = queue.pop_front() {
            result.push(id.clone());
            let mut unblocked = Vec::new();
            if let Some(next) = dependents.get(id) {
                for dependent in next {
                    let deg = in_degree.get_mut(*dependent).expect("degree tracked");
                    *deg = deg.saturating_sub(1);
                    if *deg == 0 {
                        unblocked.push(*dependent);
                    }
                }
            }
            unblocked.sort_by_key(|d| self.index[*d]);
            queue.extend(unblocked);
        }

        result
    }

    /// Actions reachable from the entrypoint via dependency edges (the
    /// entrypoint's downstream closure, entrypoint included).
    #[must_use]
    pub fn reachable_from_entrypoint(&self) -> FxHashSet<ActionRef> {
        let mut dependents: FxHashMap<ActionRef, Vec<ActionRef>> = FxHashMap::default();
        for action in &self.actions {
            for dep in self.dependencies(action) {
                dependents.entry(dep).or_default().push(action.id.clone());
            }
        }

        let mut reachable = FxHashSet::default();
        let mut queue = VecDeque::from([self.entrypoint.clone()]);
        while let Some(id) = queue.pop_front() {
            if !reachable.insert(id.clone()) {
                continue;
            }
            if let Some(next) = dependents.get(&id) {
                queue.extend(next.iter().cloned());
            }
        }
        reachable
    }
}

//! Fluent construction of workflow definitions.

use rustc_hash::FxHashMap;

use super::{Action, ValidationError, WorkflowDefinition};
use crate::types::{ActionRef, NodeMetadata};

/// Builder for [`WorkflowDefinition`] with a fluent API.
///
/// Actions keep their insertion order; that order is the deterministic
/// tie-break used everywhere downstream. [`build`](Self::build) validates the
/// assembled graph, so a definition in circulation is always well-formed.
///
/// # Examples
///
/// ```
/// use dagrun::workflow::{Action, WorkflowBuilder};
/// use dagrun::types::{JoinStrategy, NodeMetadata};
/// use dagrun::params::ParamValue;
///
/// let definition = WorkflowBuilder::new()
///     .add_action(Action::new("fanout", "tools.splitter"))
///     .add_action(
///         Action::new("probe_a", "tools.probe")
///             .with_param("target", ParamValue::reference("fanout.targets.0")),
///     )
///     .add_action(
///         Action::new("probe_b", "tools.probe")
///             .with_param("target", ParamValue::reference("fanout.targets.1")),
///     )
///     .add_action(
///         Action::new("join", "tools.merge")
///             .with_param("first", ParamValue::reference("probe_a.result")),
///     )
///     .with_metadata("probe_a", NodeMetadata::grouped("probes", "s0"))
///     .with_metadata("probe_b", NodeMetadata::grouped("probes", "s1"))
///     .with_metadata(
///         "join",
///         NodeMetadata::default().with_join_strategy(JoinStrategy::All),
///     )
///     .entrypoint("fanout")
///     .build()
///     .unwrap();
///
/// assert_eq!(definition.actions().len(), 4);
/// ```
#[derive(Debug, Default)]
pub struct WorkflowBuilder {
    actions: Vec<Action>,
    entrypoint: Option<ActionRef>,
    metadata: FxHashMap<ActionRef, NodeMetadata>,
}

impl WorkflowBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an action; definition order is insertion order.
    #[must_use]
    pub fn add_action(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }

    /// Attach fan-out/join metadata to an action ref.
    #[must_use]
    pub fn with_metadata(mut self, id: impl Into<ActionRef>, metadata: NodeMetadata) -> Self {
        self.metadata.insert(id.into(), metadata);
        self
    }

    /// Designate the entrypoint action.
    #[must_use]
    pub fn entrypoint(mut self, id: impl Into<ActionRef>) -> Self {
        self.entrypoint = Some(id.into());
        self
    }

    /// Validate and freeze the definition.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] for an unknown entrypoint, duplicate refs,
    /// dangling parameter references, or a cyclic dependency graph. A
    /// missing entrypoint reports as [`ValidationError::UnknownEntrypoint`]
    /// with an empty ref.
    pub fn build(self) -> Result<WorkflowDefinition, ValidationError> {
        let entrypoint = self.entrypoint.unwrap_or_else(|| ActionRef::new(""));
        let definition =
            WorkflowDefinition::from_parts_unchecked(self.actions, entrypoint, self.metadata);
        definition.validate()?;
        Ok(definition)
    }
}

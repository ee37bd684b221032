//! Core types for the dagrun workflow scheduler.
//!
//! This module defines the fundamental identifiers and metadata used
//! throughout the crate: action references, fan-out grouping metadata, and
//! the join strategies that gate convergence nodes.
//!
//! # Key Types
//!
//! - [`ActionRef`]: Unique identifier of an action within one workflow
//! - [`JoinStrategy`]: Policy governing when a fan-in node may proceed
//! - [`NodeMetadata`]: Per-action stream/group/join annotations

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// Reserved component id marking the entrypoint as a designated graph-input
/// component. Runtime inputs for such entrypoints are nested under
/// [`RUNTIME_INPUT_KEY`] instead of being merged flat, so a raw multi-field
/// payload cannot collide with user-declared parameter names.
pub const WORKFLOW_INPUT_COMPONENT: &str = "workflow.input";

/// Reserved parameter key that receives the runtime payload when the
/// entrypoint is a [`WORKFLOW_INPUT_COMPONENT`].
pub const RUNTIME_INPUT_KEY: &str = "input";

/// Unique identifier of an action within a workflow definition.
///
/// `ActionRef` is the handle by which parameter references, dependency
/// edges, and the result store address an action. Refs are plain strings
/// chosen by the workflow author and must be unique per definition
/// (enforced at validation time).
///
/// # Examples
///
/// ```
/// use dagrun::types::ActionRef;
///
/// let scan: ActionRef = "scan_hosts".into();
/// assert_eq!(scan.as_str(), "scan_hosts");
/// assert_eq!(scan.to_string(), "scan_hosts");
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionRef(String);

impl ActionRef {
    pub fn new(s: impl Into<String>) -> Self {
        ActionRef(s.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ActionRef {
    fn from(s: &str) -> Self {
        ActionRef(s.to_string())
    }
}

impl From<String> for ActionRef {
    fn from(s: String) -> Self {
        ActionRef(s)
    }
}

impl Borrow<str> for ActionRef {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Policy governing how a convergence node over fan-out siblings decides it
/// may proceed.
///
/// The strategy is evaluated by one exhaustive gate function
/// ([`crate::scheduler::gate`]) rather than scattered conditionals, keeping
/// the per-action state machine auditable.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinStrategy {
    /// Ready only once every sibling in the group is terminal; the join
    /// aggregates every succeeded sibling's output and records failures.
    #[default]
    All,
    /// Ready as soon as the first sibling becomes terminal, succeeded or
    /// failed. Later completions are recorded but never re-trigger the join.
    Any,
    /// Ready as soon as the first sibling succeeds. If every sibling fails
    /// first, the join node is skipped instead.
    Race,
}

impl fmt::Display for JoinStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => write!(f, "all"),
            Self::Any => write!(f, "any"),
            Self::Race => write!(f, "race"),
        }
    }
}

/// Fan-out/fan-in annotations attached to one action of a workflow.
///
/// `group_id` clusters sibling instances fanned out over a collection;
/// `stream_id` identifies which fan-out lineage an instance belongs to, used
/// to correlate siblings at a join; `join_strategy` gates the downstream
/// convergence node.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    #[serde(default)]
    pub join_strategy: JoinStrategy,
}

impl NodeMetadata {
    #[must_use]
    pub fn grouped(group_id: impl Into<String>, stream_id: impl Into<String>) -> Self {
        Self {
            stream_id: Some(stream_id.into()),
            group_id: Some(group_id.into()),
            join_strategy: JoinStrategy::default(),
        }
    }

    #[must_use]
    pub fn with_join_strategy(mut self, strategy: JoinStrategy) -> Self {
        self.join_strategy = strategy;
        self
    }
}

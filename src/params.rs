//! Parameter resolution for action dispatch.
//!
//! Workflow authors write action parameters as a mix of literals and
//! reference expressions pointing at upstream outputs. This module models
//! those parameters as an explicit typed tree ([`ParamValue`]) walked by a
//! single recursive resolver, so every value shape is handled exhaustively
//! at compile time instead of duck-typed string substitution.
//!
//! Resolution is deliberately tolerant: a reference whose field path does not
//! exist in the producer's output substitutes JSON `null` and appends a
//! human-readable warning, so a misconfigured optional reference never blocks
//! the whole run. Hard failures (dangling refs, cycles) are caught earlier by
//! [`crate::workflow::WorkflowDefinition::validate`].
//!
//! # Reference syntax
//!
//! A string parameter of the shape `{{scan.result.hosts}}` is parsed as a
//! reference to the `result.hosts` field of action `scan`'s output. Strings
//! containing no template braces pass through as literals unchanged. The
//! bare-path form is available programmatically via [`ParamValue::reference`].
//!
//! # Examples
//!
//! ```
//! use dagrun::params::ParamValue;
//! use serde_json::json;
//!
//! let v = ParamValue::from_json(json!({
//!     "targets": "{{scan.hosts}}",
//!     "severity": "high",
//! }));
//! let refs = v.referenced_actions();
//! assert_eq!(refs.len(), 1);
//! assert_eq!(refs[0].as_str(), "scan");
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

use crate::store::ResultStore;
use crate::types::{ActionRef, RUNTIME_INPUT_KEY, WORKFLOW_INPUT_COMPONENT};
use crate::workflow::Action;

/// A path into an upstream action's output.
///
/// The first segment of a reference expression names the producing action;
/// the remaining segments descend into its output value. Numeric segments
/// index into arrays.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutputRef {
    pub action: ActionRef,
    pub path: Vec<String>,
}

impl OutputRef {
    /// Parse a bare path expression such as `scan.result.hosts`.
    ///
    /// Returns `None` for an empty expression.
    pub fn parse(expr: &str) -> Option<Self> {
        let mut segments = expr.trim().split('.').map(str::to_string);
        let action = segments.next().filter(|s| !s.is_empty())?;
        Some(Self {
            action: ActionRef::new(action),
            path: segments.collect(),
        })
    }
}

impl fmt::Display for OutputRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.action)?;
        for seg in &self.path {
            write!(f, ".{seg}")?;
        }
        Ok(())
    }
}

/// One node of an action's declared parameter tree.
///
/// Literal values pass through resolution unchanged; references are
/// substituted from the result store; objects and lists recurse.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ParamValue {
    Literal(Value),
    Reference(OutputRef),
    Object(BTreeMap<String, ParamValue>),
    List(Vec<ParamValue>),
}

impl ParamValue {
    /// Build a parameter tree from raw JSON, recognising `{{...}}` template
    /// strings as references.
    #[must_use]
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::String(s) => match parse_template(&s) {
                Some(output_ref) => ParamValue::Reference(output_ref),
                None => ParamValue::Literal(Value::String(s)),
            },
            Value::Object(map) => ParamValue::Object(
                map.into_iter()
                    .map(|(k, v)| (k, ParamValue::from_json(v)))
                    .collect(),
            ),
            Value::Array(items) => {
                ParamValue::List(items.into_iter().map(ParamValue::from_json).collect())
            }
            other => ParamValue::Literal(other),
        }
    }

    /// Construct an explicit reference from a bare path expression.
    ///
    /// # Panics
    ///
    /// Panics if `expr` is empty; declared parameters are authored constants,
    /// so an empty expression is a programming error.
    #[must_use]
    pub fn reference(expr: &str) -> Self {
        ParamValue::Reference(
            OutputRef::parse(expr).expect("reference expression must name an action"),
        )
    }

    /// Collect every action referenced anywhere in this tree, in tree order,
    /// without duplicates.
    #[must_use]
    pub fn referenced_actions(&self) -> Vec<ActionRef> {
        let mut out = Vec::new();
        self.collect_references(&mut out);
        out
    }

    fn collect_references(&self, out: &mut Vec<ActionRef>) {
        match self {
            ParamValue::Literal(_) => {}
            ParamValue::Reference(r) => {
                if !out.contains(&r.action) {
                    out.push(r.action.clone());
                }
            }
            ParamValue::Object(map) => {
                for v in map.values() {
                    v.collect_references(out);
                }
            }
            ParamValue::List(items) => {
                for v in items {
                    v.collect_references(out);
                }
            }
        }
    }
}

/// Recognise a whole-value template string: `{{ scan.hosts }}`.
///
/// Partial interpolation inside a longer string is not reference syntax; such
/// strings stay literal.
fn parse_template(s: &str) -> Option<OutputRef> {
    let trimmed = s.trim();
    let inner = trimmed.strip_prefix("{{")?.strip_suffix("}}")?;
    OutputRef::parse(inner)
}

/// Concrete parameters for one action at dispatch time.
///
/// Warnings are carried into the action's execution context for
/// observability; they are never treated as an instruction to retry or
/// abort.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ResolvedParams {
    pub params: Map<String, Value>,
    pub warnings: Vec<String>,
}

/// Resolve one action's parameters against the current result store.
///
/// Every referenced producer must already be terminal; the scheduler
/// guarantees this before dispatch. A producer without recorded output
/// (failed but tolerated by the join gate) or a missing field path resolves
/// to `null` with a warning. Resolution is idempotent against an unchanged
/// store.
///
/// `runtime_inputs` is `Some` only for the entrypoint action: a designated
/// graph-input entrypoint receives the payload nested under the reserved
/// [`RUNTIME_INPUT_KEY`]; any other entrypoint merges it flat, runtime keys
/// winning over declared defaults.
#[must_use]
pub fn resolve_params(
    action: &Action,
    store: &ResultStore,
    runtime_inputs: Option<&Map<String, Value>>,
) -> ResolvedParams {
    let mut params = Map::new();
    let mut warnings = Vec::new();

    for (key, value) in &action.params {
        let resolved = resolve_value(key, value, store, &mut warnings);
        params.insert(key.clone(), resolved);
    }

    if let Some(inputs) = runtime_inputs {
        if action.component_id == WORKFLOW_INPUT_COMPONENT {
            params.insert(
                RUNTIME_INPUT_KEY.to_string(),
                Value::Object(inputs.clone()),
            );
        } else {
            for (key, value) in inputs {
                params.insert(key.clone(), value.clone());
            }
        }
    }

    ResolvedParams { params, warnings }
}

fn resolve_value(
    key: &str,
    value: &ParamValue,
    store: &ResultStore,
    warnings: &mut Vec<String>,
) -> Value {
    match value {
        ParamValue::Literal(v) => v.clone(),
        ParamValue::Reference(output_ref) => match store.output(&output_ref.action) {
            Some(output) => match lookup_path(output, &output_ref.path) {
                Some(v) => v.clone(),
                None => {
                    warnings.push(format!(
                        "param '{key}': field path '{output_ref}' not found in output of action '{}'; substituting null",
                        output_ref.action
                    ));
                    Value::Null
                }
            },
            None => {
                warnings.push(format!(
                    "param '{key}': no output recorded for action '{}' (failed or produced none); substituting null",
                    output_ref.action
                ));
                Value::Null
            }
        },
        ParamValue::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), resolve_value(key, v, store, warnings)))
                .collect(),
        ),
        ParamValue::List(items) => Value::Array(
            items
                .iter()
                .map(|v| resolve_value(key, v, store, warnings))
                .collect(),
        ),
    }
}

/// Descend a JSON value by field path; numeric segments index arrays.
fn lookup_path<'a>(value: &'a Value, path: &[String]) -> Option<&'a Value> {
    let mut current = value;
    for segment in path {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::Action;
    use serde_json::json;

    fn store_with(entries: &[(&str, Value)]) -> ResultStore {
        let mut store = ResultStore::new();
        for (r, v) in entries {
            store.record(ActionRef::from(*r), v.clone());
        }
        store
    }

    #[test]
    fn template_parsing_accepts_whole_value_only() {
        assert!(parse_template("{{scan.hosts}}").is_some());
        assert!(parse_template("  {{ scan.hosts }}  ").is_some());
        assert!(parse_template("prefix {{scan.hosts}}").is_none());
        assert!(parse_template("scan.hosts").is_none());
        assert!(parse_template("{{}}").is_none());
    }

    #[test]
    fn literal_values_pass_through_unchanged() {
        let action = Action::new("a", "comp").with_param("count", ParamValue::from_json(json!(3)));
        let resolved = resolve_params(&action, &ResultStore::new(), None);
        assert_eq!(resolved.params["count"], json!(3));
        assert!(resolved.warnings.is_empty());
    }

    #[test]
    fn reference_resolves_recorded_output_field() {
        let store = store_with(&[("scan", json!({"hosts": ["10.0.0.1", "10.0.0.2"]}))]);
        let action =
            Action::new("triage", "comp").with_param("targets", ParamValue::reference("scan.hosts"));
        let resolved = resolve_params(&action, &store, None);
        assert_eq!(resolved.params["targets"], json!(["10.0.0.1", "10.0.0.2"]));
        assert!(resolved.warnings.is_empty());
    }

    #[test]
    fn numeric_path_segment_indexes_arrays() {
        let store = store_with(&[("scan", json!({"hosts": ["10.0.0.1", "10.0.0.2"]}))]);
        let action = Action::new("triage", "comp")
            .with_param("first", ParamValue::reference("scan.hosts.0"));
        let resolved = resolve_params(&action, &store, None);
        assert_eq!(resolved.params["first"], json!("10.0.0.1"));
    }

    #[test]
    fn missing_field_path_warns_and_substitutes_null() {
        let store = store_with(&[("scan", json!({"hosts": []}))]);
        let action = Action::new("triage", "comp")
            .with_param("ports", ParamValue::reference("scan.open_ports"));
        let resolved = resolve_params(&action, &store, None);
        assert_eq!(resolved.params["ports"], Value::Null);
        assert_eq!(resolved.warnings.len(), 1);
        assert!(resolved.warnings[0].contains("scan.open_ports"));
    }

    #[test]
    fn missing_output_warns_and_substitutes_null() {
        let action =
            Action::new("triage", "comp").with_param("data", ParamValue::reference("ghost.value"));
        let resolved = resolve_params(&action, &ResultStore::new(), None);
        assert_eq!(resolved.params["data"], Value::Null);
        assert!(resolved.warnings[0].contains("no output recorded"));
    }

    #[test]
    fn nested_trees_resolve_recursively() {
        let store = store_with(&[("scan", json!({"count": 2}))]);
        let action = Action::new("report", "comp").with_param(
            "body",
            ParamValue::from_json(json!({
                "summary": {"total": "{{scan.count}}"},
                "tags": ["fixed", "{{scan.count}}"],
            })),
        );
        let resolved = resolve_params(&action, &store, None);
        assert_eq!(
            resolved.params["body"],
            json!({"summary": {"total": 2}, "tags": ["fixed", 2]})
        );
    }

    #[test]
    fn resolution_is_idempotent_against_unchanged_store() {
        let store = store_with(&[("scan", json!({"hosts": []}))]);
        let action = Action::new("triage", "comp")
            .with_param("a", ParamValue::reference("scan.hosts"))
            .with_param("b", ParamValue::reference("scan.missing"));
        let first = resolve_params(&action, &store, None);
        let second = resolve_params(&action, &store, None);
        assert_eq!(first, second);
    }

    #[test]
    fn graph_input_entrypoint_nests_runtime_payload() {
        let action = Action::new("entry", WORKFLOW_INPUT_COMPONENT)
            .with_param("declared", ParamValue::from_json(json!("kept")));
        let mut inputs = Map::new();
        inputs.insert("declared".into(), json!("payload"));
        inputs.insert("severity".into(), json!("high"));
        let resolved = resolve_params(&action, &ResultStore::new(), Some(&inputs));
        // Declared param survives; the payload lands under the reserved key.
        assert_eq!(resolved.params["declared"], json!("kept"));
        assert_eq!(
            resolved.params[RUNTIME_INPUT_KEY],
            json!({"declared": "payload", "severity": "high"})
        );
    }

    #[test]
    fn plain_entrypoint_merges_runtime_inputs_flat() {
        let action = Action::new("entry", "custom.trigger")
            .with_param("severity", ParamValue::from_json(json!("low")));
        let mut inputs = Map::new();
        inputs.insert("severity".into(), json!("high"));
        let resolved = resolve_params(&action, &ResultStore::new(), Some(&inputs));
        assert_eq!(resolved.params["severity"], json!("high"));
    }
}

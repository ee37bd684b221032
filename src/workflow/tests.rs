use super::*;
use crate::params::ParamValue;
use crate::types::{ActionRef, JoinStrategy, NodeMetadata};

fn linear_chain() -> WorkflowDefinition {
    WorkflowBuilder::new()
        .add_action(Action::new("a", "comp.a"))
        .add_action(Action::new("b", "comp.b").with_param("x", ParamValue::reference("a.out")))
        .add_action(Action::new("c", "comp.c").with_param("y", ParamValue::reference("b.out")))
        .entrypoint("a")
        .build()
        .unwrap()
}

#[test]
fn dependencies_follow_param_references() {
    let def = linear_chain();
    let c = def.action(&"c".into()).unwrap();
    assert_eq!(def.dependencies(c), vec!["b".into()]);
    let a = def.action(&"a".into()).unwrap();
    assert!(def.dependencies(a).is_empty());
}

#[test]
fn group_membership_implies_join_dependencies() {
    // "join" only references x1 by param, but x2 shares the group, so it
    // becomes an implied dependency of the join node.
    let def = WorkflowBuilder::new()
        .add_action(Action::new("root", "comp"))
        .add_action(Action::new("x1", "comp").with_param("v", ParamValue::reference("root.items.0")))
        .add_action(Action::new("x2", "comp").with_param("v", ParamValue::reference("root.items.1")))
        .add_action(Action::new("join", "comp").with_param("agg", ParamValue::reference("x1.out")))
        .with_metadata("x1", NodeMetadata::grouped("g", "s0"))
        .with_metadata("x2", NodeMetadata::grouped("g", "s1"))
        .entrypoint("root")
        .build()
        .unwrap();

    let join = def.action(&"join".into()).unwrap();
    assert_eq!(def.dependencies(join), vec!["x1".into(), "x2".into()]);
    assert_eq!(def.group_members("g"), vec!["x1".into(), "x2".into()]);
}

#[test]
fn dependencies_sorted_by_definition_order_not_param_order() {
    let def = WorkflowBuilder::new()
        .add_action(Action::new("first", "comp"))
        .add_action(Action::new("second", "comp").with_param("v", ParamValue::reference("first.x")))
        .add_action(
            Action::new("sink", "comp")
                // Param keys sort "a" before "b"; refs deliberately reversed.
                .with_param("a", ParamValue::reference("second.x"))
                .with_param("b", ParamValue::reference("first.x")),
        )
        .entrypoint("first")
        .build()
        .unwrap();

    let sink = def.action(&"sink".into()).unwrap();
    assert_eq!(def.dependencies(sink), vec!["first".into(), "second".into()]);
}

#[test]
fn self_reference_is_rejected_as_cycle() {
    let err = WorkflowBuilder::new()
        .add_action(Action::new("a", "comp").with_param("x", ParamValue::reference("a.out")))
        .entrypoint("a")
        .build()
        .unwrap_err();
    assert!(matches!(err, ValidationError::Cycle { .. }));
}

#[test]
fn grouped_sibling_reference_does_not_imply_self_dependency() {
    // x2 references its own group sibling x1; the group-implied edges must
    // never include x2 itself.
    let def = WorkflowBuilder::new()
        .add_action(Action::new("root", "comp"))
        .add_action(Action::new("x1", "comp").with_param("v", ParamValue::reference("root.a")))
        .add_action(Action::new("x2", "comp").with_param("v", ParamValue::reference("x1.out")))
        .with_metadata("x1", NodeMetadata::grouped("g", "s0"))
        .with_metadata("x2", NodeMetadata::grouped("g", "s1"))
        .entrypoint("root")
        .build()
        .unwrap();

    let x2 = def.action(&"x2".into()).unwrap();
    assert_eq!(def.dependencies(x2), vec!["x1".into()]);
}

#[test]
fn cycle_is_rejected_at_validation() {
    let err = WorkflowBuilder::new()
        .add_action(Action::new("a", "comp").with_param("x", ParamValue::reference("b.out")))
        .add_action(Action::new("b", "comp").with_param("y", ParamValue::reference("a.out")))
        .entrypoint("a")
        .build()
        .unwrap_err();
    assert!(matches!(err, ValidationError::Cycle { .. }));
}

#[test]
fn dangling_reference_is_rejected_at_validation() {
    let err = WorkflowBuilder::new()
        .add_action(Action::new("a", "comp"))
        .add_action(Action::new("b", "comp").with_param("x", ParamValue::reference("ghost.out")))
        .entrypoint("a")
        .build()
        .unwrap_err();
    match err {
        ValidationError::DanglingReference { action, target } => {
            assert_eq!(action, "b".into());
            assert_eq!(target, "ghost".into());
        }
        other => panic!("expected DanglingReference, got {other:?}"),
    }
}

#[test]
fn unknown_entrypoint_is_rejected_at_validation() {
    let err = WorkflowBuilder::new()
        .add_action(Action::new("a", "comp"))
        .entrypoint("missing")
        .build()
        .unwrap_err();
    assert!(matches!(err, ValidationError::UnknownEntrypoint { .. }));
}

#[test]
fn duplicate_refs_are_rejected_at_validation() {
    let err = WorkflowBuilder::new()
        .add_action(Action::new("a", "comp"))
        .add_action(Action::new("a", "comp.other"))
        .entrypoint("a")
        .build()
        .unwrap_err();
    assert!(matches!(err, ValidationError::DuplicateRef { .. }));
}

#[test]
fn topological_order_is_deterministic_and_respects_deps() {
    let def = WorkflowBuilder::new()
        .add_action(Action::new("root", "comp"))
        .add_action(Action::new("left", "comp").with_param("v", ParamValue::reference("root.x")))
        .add_action(Action::new("right", "comp").with_param("v", ParamValue::reference("root.x")))
        .add_action(
            Action::new("merge", "comp")
                .with_param("l", ParamValue::reference("left.x"))
                .with_param("r", ParamValue::reference("right.x")),
        )
        .entrypoint("root")
        .build()
        .unwrap();

    let order = def.topological_order();
    assert_eq!(
        order,
        vec!["root".into(), "left".into(), "right".into(), "merge".into()]
    );
    assert_eq!(order, def.topological_order());
}

#[test]
fn reachability_is_the_entrypoint_downstream_closure() {
    let def = WorkflowBuilder::new()
        .add_action(Action::new("entry", "comp"))
        .add_action(Action::new("child", "comp").with_param("v", ParamValue::reference("entry.x")))
        .add_action(Action::new("orphan", "comp"))
        .entrypoint("entry")
        .build()
        .unwrap();

    let reachable = def.reachable_from_entrypoint();
    assert!(reachable.contains(&ActionRef::from("entry")));
    assert!(reachable.contains(&ActionRef::from("child")));
    assert!(!reachable.contains(&ActionRef::from("orphan")));
}

#[test]
fn metadata_defaults_for_unannotated_actions() {
    let def = linear_chain();
    let meta = def.metadata(&"a".into());
    assert!(meta.group_id.is_none());
    assert_eq!(meta.join_strategy, JoinStrategy::All);
}

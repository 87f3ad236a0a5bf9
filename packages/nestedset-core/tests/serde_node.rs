#![cfg(feature = "serde")]

use nestedset_core::{GroupKey, NestedSetOptions, Node, NodeId};

#[test]
fn node_json_uses_field_names() {
    let mut node = Node::child(NodeId(2), NodeId(1)).with_group(GroupKey::from("g"));
    node.lft = Some(2);
    node.rgt = Some(3);
    node.lvl = 1;

    let json = serde_json::to_value(&node).unwrap();
    assert_eq!(json["lft"], 2);
    assert_eq!(json["rgt"], 3);
    assert_eq!(json["lvl"], 1);
    let back: Node = serde_json::from_value(json).unwrap();
    assert_eq!(back, node);
}

#[test]
fn missing_fields_fall_back_to_defaults() {
    let node: Node = serde_json::from_str(r#"{"id": 5}"#).unwrap();
    assert_eq!(node, Node::root(NodeId(5)));

    let options: NestedSetOptions = serde_json::from_str(r#"{"group_scoped": true}"#).unwrap();
    assert!(options.group_scoped);
    assert!(options.rebuild_levels);
}

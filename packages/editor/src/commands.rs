//! Canonical step lists for common edits.
//!
//! Every command marks the stores it changes as touched so the session
//! persists them.

use chrono::Utc;
use specbook_model::slug::{generate_slug, parse_title_for_slug};
use specbook_model::{NodeProperty, NodeType, Tag, TreeNode};

use crate::actions::{MapAction, NewNode, SpecAction};
use crate::errors::EditorResult;
use crate::map_store::map_tree_stub;
use crate::transaction::TransactionStep;

/// Current time in epoch millis
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

fn spec_touched() -> TransactionStep {
    TransactionStep::new(SpecAction::Touched(Some(now_millis())))
}

fn map_touched() -> TransactionStep {
    TransactionStep::new(MapAction::Touched(Some(now_millis())))
}

/// Add a node of `node_type` after `target`. Folders, features and maps go
/// to the specification tree; a map also gets its own example-map tree.
/// Everything else goes to the selected example map.
pub fn add_node(node_type: NodeType, title: &str, slug: Option<&str>, target: Option<&str>) -> Vec<TransactionStep> {
    let key = slug.map(str::to_string).unwrap_or_else(generate_slug);
    let node = NewNode::new(key.clone(), node_type, title);
    let selected_key = target.map(str::to_string);

    if !node_type.is_specification() {
        return vec![
            TransactionStep::new(MapAction::AddTreeNode { node, selected_key }),
            map_touched(),
        ];
    }

    let mut steps = vec![
        TransactionStep::new(SpecAction::AddTreeNode { node, selected_key }),
        spec_touched(),
    ];
    if node_type == NodeType::Map {
        steps.extend(create_map_tree(&key));
    }
    steps
}

pub fn create_map_tree(key: &str) -> Vec<TransactionStep> {
    vec![
        TransactionStep::new(MapAction::CreateTree {
            key: key.to_string(),
            tree: map_tree_stub(),
        }),
        map_touched(),
    ]
}

pub fn remove_node(node: &TreeNode) -> Vec<TransactionStep> {
    let key = node.key.clone();
    if node.node_type.is_specification() {
        vec![TransactionStep::new(SpecAction::RemoveTreeNode { key }), spec_touched()]
    } else {
        vec![TransactionStep::new(MapAction::RemoveTreeNode { key }), map_touched()]
    }
}

pub fn set_value(node: &TreeNode, property: NodeProperty) -> Vec<TransactionStep> {
    let key = node.key.clone();
    if node.node_type.is_specification() {
        vec![TransactionStep::new(SpecAction::SetValue { key, property }), spec_touched()]
    } else {
        vec![TransactionStep::new(MapAction::SetValue { key, property }), map_touched()]
    }
}

pub fn add_tag(node: &TreeNode, name: &str) -> Vec<TransactionStep> {
    let mut tags = node.tags.clone().unwrap_or_default();
    tags.push(Tag::text(name));
    set_value(node, NodeProperty::Tags(tags))
}

pub fn set_notes(node: &TreeNode, notes: &str) -> Vec<TransactionStep> {
    set_value(node, NodeProperty::Notes(Some(notes.to_string())))
}

pub fn change_feature_toggle(node: &TreeNode, state: &str) -> Vec<TransactionStep> {
    set_value(node, NodeProperty::ToggleState(Some(state.to_string())))
}

pub fn change_toggle_conditions(node: &TreeNode, conditions: &str) -> Vec<TransactionStep> {
    let conditions = (!conditions.is_empty()).then(|| conditions.to_string());
    set_value(node, NodeProperty::Conditions(conditions))
}

/// Retitle a node from user input of the form `Title` or `Title #new-slug`.
///
/// `tree` is the tree the node lives in. A map node's example-map tree is
/// renamed with it and becomes the selected map.
pub fn rename_node(node: &TreeNode, input: &str, tree: &[TreeNode]) -> EditorResult<Vec<TransactionStep>> {
    let parsed = parse_title_for_slug(input, Some(&node.key), tree)?;
    let new_key = match parsed.slug {
        Some(slug) if slug != node.key => slug,
        _ => return Ok(set_value(node, NodeProperty::Title(parsed.title))),
    };

    let old = node.key.clone();
    let title = Some(parsed.title);
    let steps = match node.node_type {
        NodeType::Map => vec![
            TransactionStep::new(SpecAction::RenameKey {
                old: old.clone(),
                new: new_key.clone(),
                title,
            }),
            spec_touched(),
            TransactionStep::new(MapAction::RenameTreeKey {
                old,
                new: new_key.clone(),
            }),
            TransactionStep::new(MapAction::ChangeSelectedTree(new_key)),
            map_touched(),
        ],
        t if t.is_specification() => vec![
            TransactionStep::new(SpecAction::RenameKey { old, new: new_key, title }),
            spec_touched(),
        ],
        _ => vec![
            TransactionStep::new(MapAction::RenameKey { old, new: new_key, title }),
            map_touched(),
        ],
    };
    Ok(steps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::StoreAction;

    #[test]
    fn test_add_map_creates_tree() {
        let steps = add_node(NodeType::Map, "Checkout", Some("checkout"), Some("f1"));
        assert_eq!(steps.len(), 4);
        assert!(matches!(
            &steps[2].action,
            StoreAction::Map(MapAction::CreateTree { key, .. }) if key == "checkout"
        ));
    }

    #[test]
    fn test_add_story_targets_map_store() {
        let steps = add_node(NodeType::Story, "Story", None, None);
        assert!(matches!(steps[0].action, StoreAction::Map(MapAction::AddTreeNode { .. })));
        assert!(matches!(steps[1].action, StoreAction::Map(MapAction::Touched(Some(_)))));
    }

    #[test]
    fn test_rename_without_slug_sets_title() {
        let node = TreeNode::new("f1", NodeType::Feature, "Login");
        let steps = rename_node(&node, "Sign in", &[node.clone()]).unwrap();
        assert!(matches!(
            &steps[0].action,
            StoreAction::Spec(SpecAction::SetValue { property: NodeProperty::Title(t), .. }) if t == "Sign in"
        ));
    }

    #[test]
    fn test_rename_map_renames_tree() {
        let node = TreeNode::new("m1", NodeType::Map, "Map");
        let steps = rename_node(&node, "Checkout #checkout", &[node.clone()]).unwrap();
        assert_eq!(steps.len(), 5);
        assert!(matches!(
            &steps[2].action,
            StoreAction::Map(MapAction::RenameTreeKey { old, new }) if old == "m1" && new == "checkout"
        ));
    }

    #[test]
    fn test_rename_rejects_reserved_slug() {
        let node = TreeNode::new("f1", NodeType::Feature, "Login");
        assert!(rename_node(&node, "Spec #specification", &[node.clone()]).is_err());
    }

    #[test]
    fn test_clearing_conditions_sends_none() {
        let node = TreeNode::new("f1", NodeType::Feature, "Login");
        let steps = change_toggle_conditions(&node, "");
        assert!(matches!(
            &steps[0].action,
            StoreAction::Spec(SpecAction::SetValue { property: NodeProperty::Conditions(None), .. })
        ));
    }
}

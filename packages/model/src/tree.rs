//! # Tree Operations
//!
//! Pure functions over an ordered forest of [`TreeNode`]s. Every operation
//! that changes a tree returns a new one; inputs are never mutated.

use std::collections::BTreeMap;

use crate::error::TreeError;
use crate::node::{FeatureToggle, NodeField, NodeProperty, NodeType, TreeNode, TOGGLE_DISABLED};

/// Insert `new_node` after `target`.
///
/// The node becomes the last child of `target` instead when its type nests
/// under the target's type (see [`NodeType::nests_under`]). Without a target
/// the node is appended as a root.
pub fn insert_after(
    target: Option<&TreeNode>,
    tree: &[TreeNode],
    new_node: TreeNode,
) -> Result<Vec<TreeNode>, TreeError> {
    let Some(target) = target else {
        let mut cloned = tree.to_vec();
        cloned.push(new_node);
        return Ok(cloned);
    };

    let mut pending = Some(new_node);
    let cloned = insert_into(&target.key, tree, &mut pending);
    if pending.is_some() {
        return Err(TreeError::NodeNotFound(target.key.clone()));
    }
    Ok(cloned)
}

fn insert_into(target_key: &str, tree: &[TreeNode], pending: &mut Option<TreeNode>) -> Vec<TreeNode> {
    let mut cloned = Vec::with_capacity(tree.len() + 1);
    for original in tree {
        let mut node = original.clone();
        if pending.is_some() {
            if let Some(children) = &original.children {
                node.children = Some(insert_into(target_key, children, pending));
            }
        }

        if original.key == target_key {
            if let Some(insert) = pending.take() {
                if insert.node_type.nests_under(original.node_type) {
                    node.children.get_or_insert_with(Vec::new).push(insert);
                    cloned.push(node);
                } else {
                    cloned.push(node);
                    cloned.push(insert);
                }
                continue;
            }
        }
        cloned.push(node);
    }
    cloned
}

/// Remove the node with `target_key` and its entire subtree
pub fn remove(target_key: &str, tree: &[TreeNode]) -> Vec<TreeNode> {
    tree.iter()
        .filter(|node| node.key != target_key)
        .map(|node| {
            let mut cloned = node.clone();
            if let Some(children) = &node.children {
                cloned.children = Some(remove(target_key, children));
            }
            cloned
        })
        .collect()
}

/// Return a tree with exactly one property of one node replaced
pub fn set_property(
    tree: &[TreeNode],
    target_key: &str,
    property: NodeProperty,
) -> Result<Vec<TreeNode>, TreeError> {
    let mut cloned = tree.to_vec();
    let node = find_by_key_mut(target_key, &mut cloned)
        .ok_or_else(|| TreeError::NodeNotFound(target_key.to_string()))?;
    node.set(property);
    Ok(cloned)
}

/// Depth-first lookup
pub fn find_by_key<'a>(key: &str, tree: &'a [TreeNode]) -> Option<&'a TreeNode> {
    for node in tree {
        if node.key == key {
            return Some(node);
        }
        if let Some(found) = find_by_key(key, node.children()) {
            return Some(found);
        }
    }
    None
}

pub fn find_by_key_mut<'a>(key: &str, tree: &'a mut [TreeNode]) -> Option<&'a mut TreeNode> {
    for node in tree.iter_mut() {
        if node.key == key {
            return Some(node);
        }
        if let Some(children) = node.children.as_deref_mut() {
            if let Some(found) = find_by_key_mut(key, children) {
                return Some(found);
            }
        }
    }
    None
}

/// The parent of `key`, or `None` for roots and unknown keys
pub fn parent_of<'a>(key: &str, tree: &'a [TreeNode]) -> Option<&'a TreeNode> {
    fn walk<'a>(key: &str, tree: &'a [TreeNode], parent: Option<&'a TreeNode>) -> Option<Option<&'a TreeNode>> {
        for node in tree {
            if node.key == key {
                return Some(parent);
            }
            if let Some(found) = walk(key, node.children(), Some(node)) {
                return Some(found);
            }
        }
        None
    }
    walk(key, tree, None).flatten()
}

/// All nodes in pre-order (node before its children)
pub fn flatten(tree: &[TreeNode]) -> Vec<&TreeNode> {
    let mut nodes = Vec::new();
    collect(tree, &mut nodes);
    nodes
}

fn collect<'a>(tree: &'a [TreeNode], out: &mut Vec<&'a TreeNode>) {
    for node in tree {
        out.push(node);
        collect(node.children(), out);
    }
}

/// The node with `key` followed by all of its descendants, pre-order
pub fn subtree<'a>(key: &str, tree: &'a [TreeNode]) -> Vec<&'a TreeNode> {
    match find_by_key(key, tree) {
        Some(node) => {
            let mut nodes = vec![node];
            collect(node.children(), &mut nodes);
            nodes
        }
        None => Vec::new(),
    }
}

/// Keys in display order. Children of collapsed nodes are not visible.
pub fn visible_sequence(tree: &[TreeNode]) -> Vec<&str> {
    fn walk<'a>(tree: &'a [TreeNode], out: &mut Vec<&'a str>) {
        for node in tree {
            out.push(&node.key);
            if node.expanded {
                walk(node.children(), out);
            }
        }
    }
    let mut keys = Vec::new();
    walk(tree, &mut keys);
    keys
}

/// Display-order index of `key`; `None` when hidden or absent
pub fn index_by_key(key: &str, tree: &[TreeNode]) -> Option<usize> {
    visible_sequence(tree).iter().position(|k| *k == key)
}

/// Feature toggles of every feature node that has one set.
///
/// A node with state `Disabled` and no conditions is left out.
pub fn extract_feature_toggles(tree: &[TreeNode]) -> BTreeMap<String, FeatureToggle> {
    flatten(tree)
        .into_iter()
        .filter(|node| node.node_type == NodeType::Feature)
        .filter_map(|node| {
            let state = node.toggle_state.as_ref()?;
            let conditions = node.conditions.clone().unwrap_or_default();
            if conditions.is_empty() && state == TOGGLE_DISABLED {
                return None;
            }
            Some((
                node.key.clone(),
                FeatureToggle {
                    title: node.title.clone(),
                    state: state.clone(),
                    conditions,
                },
            ))
        })
        .collect()
}

/// Deep clone keeping key, type, title, children and the `allowed` fields.
///
/// `expanded` is written as `true` unless it is allowed.
pub fn filter_keys(allowed: &[NodeField], tree: &[TreeNode]) -> Vec<TreeNode> {
    tree.iter()
        .map(|node| {
            let keep = |field: NodeField| allowed.contains(&field);
            TreeNode {
                key: node.key.clone(),
                node_type: node.node_type,
                title: node.title.clone(),
                expanded: if keep(NodeField::Expanded) { node.expanded } else { true },
                tags: node.tags.clone().filter(|_| keep(NodeField::Tags)),
                notes: node.notes.clone().filter(|_| keep(NodeField::Notes)),
                gherkin: node.gherkin.clone().filter(|_| keep(NodeField::Gherkin)),
                toggle_state: node.toggle_state.clone().filter(|_| keep(NodeField::ToggleState)),
                conditions: node.conditions.clone().filter(|_| keep(NodeField::Conditions)),
                children: node.children.as_ref().map(|c| filter_keys(allowed, c)),
            }
        })
        .collect()
}

//! # Example Map Store
//!
//! One tree per map node of the specification, keyed by that node's key.
//! Node-level actions apply to the currently selected map.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use specbook_model::slug::generate_slug;
use specbook_model::tree::{index_by_key, remove, set_property};
use specbook_model::{NodeType, Patch, TreeNode};

use crate::actions::{MapAction, RenameLedger, TransactionId};
use crate::errors::{EditorError, EditorResult};
use crate::spec_store::{add_node, rename_node};
use crate::store::{add_undo, step_history, History, Reducer, TrackedState};

/// Title given to stories inserted without one
pub const NEW_STORY_TITLE: &str = "New Story";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapTreeState {
    #[serde(default)]
    pub tree: Vec<TreeNode>,

    #[serde(default)]
    pub selected_tree_index: usize,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_node_key: Option<String>,
}

impl MapTreeState {
    pub fn new(tree: Vec<TreeNode>) -> Self {
        let selected_node_key = tree.first().map(|n| n.key.clone());
        Self {
            tree,
            selected_tree_index: 0,
            selected_node_key,
        }
    }

    /// A fresh map holding one placeholder story
    pub fn stub() -> Self {
        Self::new(map_tree_stub())
    }
}

/// Nodes of a newly created example map
pub fn map_tree_stub() -> Vec<TreeNode> {
    vec![TreeNode::new(
        generate_slug(),
        NodeType::Story,
        "Add your first story here ...",
    )]
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapTreesState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub touched: Option<i64>,

    #[serde(default)]
    pub trees: BTreeMap<String, MapTreeState>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_tree_key: Option<String>,

    #[serde(default)]
    pub undo: BTreeMap<TransactionId, Patch>,

    #[serde(default)]
    pub redo: BTreeMap<TransactionId, Patch>,

    #[serde(default)]
    pub rename_keys: RenameLedger,
}

impl MapTreesState {
    pub fn with_trees(trees: BTreeMap<String, MapTreeState>) -> Self {
        Self {
            trees,
            ..Self::default()
        }
    }

    pub fn selected_tree(&self) -> Option<&MapTreeState> {
        self.selected_tree_key
            .as_deref()
            .and_then(|key| self.trees.get(key))
    }

    fn selected_tree_mut(&mut self) -> EditorResult<&mut MapTreeState> {
        let key = self.selected_tree_key.as_deref().ok_or(EditorError::NoSelectedMap)?;
        self.trees
            .get_mut(key)
            .ok_or_else(|| EditorError::UnknownMap(key.to_string()))
    }
}

impl TrackedState for MapTreesState {
    fn undo_patches(&self) -> &BTreeMap<TransactionId, Patch> {
        &self.undo
    }

    fn undo_patches_mut(&mut self) -> &mut BTreeMap<TransactionId, Patch> {
        &mut self.undo
    }

    fn redo_patches(&self) -> &BTreeMap<TransactionId, Patch> {
        &self.redo
    }

    fn redo_patches_mut(&mut self) -> &mut BTreeMap<TransactionId, Patch> {
        &mut self.redo
    }
}

impl Reducer for MapTreesState {
    type Action = MapAction;

    fn reduce(self, action: MapAction) -> EditorResult<Self> {
        let mut state = self;
        match action {
            MapAction::Load(loaded) => return Ok(loaded),
            MapAction::ClearUndo => {
                state.undo.clear();
                state.redo.clear();
            }
            MapAction::ClearRedo => state.redo.clear(),
            MapAction::Reload { is_reset } => {
                state.touched = None;
                state.trees.clear();
                state.undo.clear();
                state.redo.clear();
                state.rename_keys.clear();
                if is_reset {
                    state.selected_tree_key = None;
                }
            }
            MapAction::AddUndo { id, patch } => return Ok(add_undo(state, id, patch)),
            MapAction::RemoveUndo { id } => {
                state.undo.remove(&id);
            }
            MapAction::Undo { id } => return step_history(state, &id, History::Undo),
            MapAction::Redo { id } => return step_history(state, &id, History::Redo),
            MapAction::NodeClicked { key, tree_index } => {
                let map = state.selected_tree_mut()?;
                map.selected_tree_index = tree_index;
                map.selected_node_key = Some(key);
            }
            MapAction::SetValue { key, property } => {
                let map = state.selected_tree_mut()?;
                map.tree = set_property(&map.tree, &key, property)?;
            }
            MapAction::SetNodes(tree) => state.selected_tree_mut()?.tree = tree,
            MapAction::AddTreeNode { node, selected_key } => {
                let map = state.selected_tree_mut()?;
                let (tree, key) = add_node(&map.tree, node, selected_key, NodeType::Story, NEW_STORY_TITLE)?;
                map.selected_tree_index = index_by_key(&key, &tree).unwrap_or(0);
                map.selected_node_key = Some(key);
                map.tree = tree;
            }
            MapAction::RemoveTreeNode { key } => {
                let map = state.selected_tree_mut()?;
                map.tree = remove(&key, &map.tree);
                map.selected_node_key = map.tree.first().map(|n| n.key.clone());
                map.selected_tree_index = 0;
            }
            MapAction::RenameKey { old, new, title } => {
                let MapTreesState {
                    trees,
                    selected_tree_key,
                    rename_keys,
                    ..
                } = &mut state;
                let selected = selected_tree_key.as_deref().ok_or(EditorError::NoSelectedMap)?;
                let map = trees
                    .get_mut(selected)
                    .ok_or_else(|| EditorError::UnknownMap(selected.to_string()))?;
                if rename_node(&mut map.tree, rename_keys, &old, &new, title)? {
                    map.selected_node_key = Some(new);
                }
            }
            MapAction::SetRenameKeys(ledger) => state.rename_keys = ledger,
            MapAction::Touched(touched) => state.touched = touched,
            MapAction::LoadTrees(trees) => state.trees = trees,
            MapAction::CreateTree { key, tree } => {
                state.trees.insert(key.clone(), MapTreeState::new(tree));
                state.selected_tree_key = Some(key);
            }
            MapAction::ChangeSelectedTree(key) => state.selected_tree_key = Some(key),
            MapAction::RenameTreeKey { old, new } => {
                if let Some(map) = state.trees.remove(&old) {
                    state.trees.insert(new, map);
                }
            }
        }
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::NewNode;
    use specbook_model::NodeProperty;

    fn with_story_map() -> MapTreesState {
        MapTreesState::default()
            .reduce(MapAction::CreateTree {
                key: "m1".to_string(),
                tree: vec![TreeNode::new("s1", NodeType::Story, "Story")],
            })
            .unwrap()
    }

    #[test]
    fn test_create_tree_selects_it() {
        let state = with_story_map();
        assert_eq!(state.selected_tree_key.as_deref(), Some("m1"));
        let map = state.selected_tree().unwrap();
        assert_eq!(map.selected_node_key.as_deref(), Some("s1"));
    }

    #[test]
    fn test_rule_after_story_becomes_child() {
        let state = with_story_map()
            .reduce(MapAction::AddTreeNode {
                node: NewNode::new("r1", NodeType::Rule, "Rule"),
                selected_key: Some("s1".to_string()),
            })
            .unwrap();

        let map = state.selected_tree().unwrap();
        assert_eq!(map.tree.len(), 1);
        assert_eq!(map.tree[0].children()[0].key, "r1");
        assert_eq!(map.selected_node_key.as_deref(), Some("r1"));
    }

    #[test]
    fn test_node_actions_need_selected_map() {
        let result = MapTreesState::default().reduce(MapAction::SetValue {
            key: "s1".to_string(),
            property: NodeProperty::Title("x".to_string()),
        });
        assert_eq!(result, Err(EditorError::NoSelectedMap));
    }

    #[test]
    fn test_rename_tree_key() {
        let state = with_story_map()
            .reduce(MapAction::RenameTreeKey {
                old: "m1".to_string(),
                new: "m2".to_string(),
            })
            .unwrap()
            .reduce(MapAction::ChangeSelectedTree("m2".to_string()))
            .unwrap();

        assert!(state.trees.contains_key("m2"));
        assert!(!state.trees.contains_key("m1"));
        assert!(state.selected_tree().is_some());
    }

    #[test]
    fn test_rename_node_records_ledger() {
        let state = with_story_map()
            .reduce(MapAction::RenameKey {
                old: "s1".to_string(),
                new: "login-story".to_string(),
                title: None,
            })
            .unwrap();

        assert_eq!(
            state.rename_keys.get("s1").map(String::as_str),
            Some("login-story")
        );
        assert_eq!(state.selected_tree().unwrap().tree[0].key, "login-story");
    }

    #[test]
    fn test_reload_clears_trees() {
        let state = with_story_map()
            .reduce(MapAction::Touched(Some(1)))
            .unwrap()
            .reduce(MapAction::Reload { is_reset: true })
            .unwrap();
        assert!(state.trees.is_empty());
        assert_eq!(state.touched, None);
        assert_eq!(state.selected_tree_key, None);
    }
}

//! # Specification Store
//!
//! Holds the single specification tree of the current repository together
//! with its undo/redo patches, selection and rename ledger.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use specbook_model::slug::{ensure_unique_slug, generate_slug};
use specbook_model::tree::{find_by_key, find_by_key_mut, index_by_key, insert_after, remove, set_property};
use specbook_model::{NodeType, Patch, TreeError, TreeNode, ValidationError};

use crate::actions::{NewNode, RenameLedger, SpecAction, TransactionId};
use crate::errors::EditorResult;
use crate::store::{add_undo, step_history, History, Reducer, TrackedState};

/// Title given to folders inserted without one
pub const NEW_FOLDER_TITLE: &str = "New Folder";

const PROJECT_NOTES: &str = "---\n### Start your new project here.\nClick the title to edit the folder name or click the edit button to change this document.\n";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecTreeState {
    /// Epoch millis of the last unsaved edit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub touched: Option<i64>,

    #[serde(default)]
    pub tree: Vec<TreeNode>,

    #[serde(default)]
    pub undo: BTreeMap<TransactionId, Patch>,

    #[serde(default)]
    pub redo: BTreeMap<TransactionId, Patch>,

    #[serde(default)]
    pub rename_keys: RenameLedger,

    #[serde(default)]
    pub selected_tree_index: usize,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_node_key: Option<String>,
}

impl SpecTreeState {
    /// Starting point for a repository with no specification yet
    pub fn stub() -> Self {
        Self {
            tree: vec![TreeNode::new(generate_slug(), NodeType::Folder, "New Project")
                .with_notes(PROJECT_NOTES)],
            ..Self::default()
        }
    }

    pub fn with_tree(tree: Vec<TreeNode>) -> Self {
        Self {
            tree,
            ..Self::default()
        }
    }

    pub fn selected_node(&self) -> Option<&TreeNode> {
        self.selected_node_key
            .as_deref()
            .and_then(|key| find_by_key(key, &self.tree))
    }
}

impl TrackedState for SpecTreeState {
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

impl Reducer for SpecTreeState {
    type Action = SpecAction;

    fn reduce(self, action: SpecAction) -> EditorResult<Self> {
        let mut state = self;
        match action {
            SpecAction::Load(loaded) => return Ok(loaded),
            SpecAction::ClearUndo => {
                state.undo.clear();
                state.redo.clear();
            }
            SpecAction::ClearRedo => state.redo.clear(),
            SpecAction::Reload { is_reset } => {
                state.touched = None;
                state.tree.clear();
                state.undo.clear();
                state.redo.clear();
                state.rename_keys.clear();
                if is_reset {
                    state.selected_node_key = None;
                    state.selected_tree_index = 0;
                }
            }
            SpecAction::AddUndo { id, patch } => return Ok(add_undo(state, id, patch)),
            SpecAction::RemoveUndo { id } => {
                state.undo.remove(&id);
            }
            SpecAction::Undo { id } => return step_history(state, &id, History::Undo),
            SpecAction::Redo { id } => return step_history(state, &id, History::Redo),
            SpecAction::NodeClicked { key, tree_index } => {
                state.selected_tree_index = tree_index;
                state.selected_node_key = Some(key);
            }
            SpecAction::SetValue { key, property } => {
                state.tree = set_property(&state.tree, &key, property)?;
            }
            SpecAction::SetNodes(tree) => state.tree = tree,
            SpecAction::AddTreeNode { node, selected_key } => {
                let (tree, key) = add_node(&state.tree, node, selected_key, NodeType::Folder, NEW_FOLDER_TITLE)?;
                state.selected_tree_index = index_by_key(&key, &tree).unwrap_or(0);
                state.selected_node_key = Some(key);
                state.tree = tree;
            }
            SpecAction::RemoveTreeNode { key } => {
                state.tree = remove(&key, &state.tree);
                state.selected_node_key = state.tree.first().map(|n| n.key.clone());
                state.selected_tree_index = 0;
            }
            SpecAction::RenameKey { old, new, title } => {
                if rename_node(&mut state.tree, &mut state.rename_keys, &old, &new, title)? {
                    state.selected_node_key = Some(new);
                }
            }
            SpecAction::SetRenameKeys(ledger) => state.rename_keys = ledger,
            SpecAction::Touched(touched) => state.touched = touched,
        }
        Ok(state)
    }
}

/// Insert a node built from `template` after `selected_key`, returning the
/// new tree and the inserted key
pub(crate) fn add_node(
    tree: &[TreeNode],
    template: NewNode,
    selected_key: Option<String>,
    default_type: NodeType,
    default_title: &str,
) -> EditorResult<(Vec<TreeNode>, String)> {
    ensure_unique_slug(&template.key, tree)?;
    let target = match selected_key {
        Some(key) => Some(
            find_by_key(&key, tree)
                .cloned()
                .ok_or(TreeError::NodeNotFound(key))?,
        ),
        None => None,
    };

    let node = template.build(default_type, default_title);
    let key = node.key.clone();
    let tree = insert_after(target.as_ref(), tree, node)?;
    Ok((tree, key))
}

/// Change a node's key and record it in the ledger. Returns `false` when no
/// node has the old key.
pub(crate) fn rename_node(
    tree: &mut [TreeNode],
    ledger: &mut RenameLedger,
    old: &str,
    new: &str,
    title: Option<String>,
) -> EditorResult<bool> {
    if old != new && find_by_key(new, tree).is_some() {
        return Err(ValidationError::DuplicateKey(new.to_string()).into());
    }
    let Some(node) = find_by_key_mut(old, tree) else {
        return Ok(false);
    };
    node.key = new.to_string();
    if let Some(title) = title.filter(|t| !t.is_empty()) {
        node.title = title;
    }
    chain_rename(ledger, old, new);
    Ok(true)
}

/// `a → b` then `b → c` is recorded as `a → c`; renaming back to the
/// original key drops the entry.
pub fn chain_rename(ledger: &mut RenameLedger, old: &str, new: &str) {
    let existing = ledger
        .iter()
        .find(|(_, target)| target.as_str() == old)
        .map(|(origin, _)| origin.clone());

    match existing {
        Some(origin) if origin == new => {
            ledger.remove(&origin);
        }
        Some(origin) => {
            ledger.insert(origin, new.to_string());
        }
        None => {
            ledger.insert(old.to_string(), new.to_string());
        }
    }
}

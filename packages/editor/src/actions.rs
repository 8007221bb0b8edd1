//! # Store Actions
//!
//! The closed vocabulary each store reducer understands. Actions that a user
//! can undo carry a human-readable description which ends up on the
//! application undo stack.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use specbook_model::{
    GitProfile, LocalRepository, NodeProperty, NodeType, Patch, RepositoryConfig, TreeNode,
};

use crate::app_state::TreeViewChange;
use crate::map_store::{MapTreeState, MapTreesState};
use crate::spec_store::SpecTreeState;

/// Identifier shared by every patch recorded for one transaction
pub type TransactionId = String;

/// Old key → new key, accumulated since the last commit
pub type RenameLedger = BTreeMap<String, String>;

/// A node to insert; fields left out come from the store's node stub
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewNode {
    pub key: String,
    #[serde(default, rename = "type")]
    pub node_type: Option<NodeType>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl NewNode {
    pub fn new(key: impl Into<String>, node_type: NodeType, title: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            node_type: Some(node_type),
            title: Some(title.into()),
            notes: None,
        }
    }

    /// Merge onto a stub node of `default_type`
    pub fn build(self, default_type: NodeType, default_title: &str) -> TreeNode {
        let mut node = TreeNode::new(
            self.key,
            self.node_type.unwrap_or(default_type),
            self.title.unwrap_or_else(|| default_title.to_string()),
        );
        node.notes = self.notes;
        node
    }
}

/// Actions understood by the specification store
#[derive(Debug, Clone, PartialEq)]
pub enum SpecAction {
    Load(SpecTreeState),
    ClearUndo,
    ClearRedo,
    Reload { is_reset: bool },
    AddUndo { id: TransactionId, patch: Patch },
    RemoveUndo { id: TransactionId },
    Undo { id: TransactionId },
    Redo { id: TransactionId },
    NodeClicked { key: String, tree_index: usize },
    SetValue { key: String, property: NodeProperty },
    SetNodes(Vec<TreeNode>),
    AddTreeNode { node: NewNode, selected_key: Option<String> },
    RemoveTreeNode { key: String },
    RenameKey { old: String, new: String, title: Option<String> },
    SetRenameKeys(RenameLedger),
    Touched(Option<i64>),
}

impl SpecAction {
    pub fn description(&self) -> Option<String> {
        match self {
            SpecAction::NodeClicked { .. } => Some("node click".to_string()),
            SpecAction::SetValue { property, .. } => Some(describe_property(property)),
            SpecAction::SetNodes(_) => Some("tree change".to_string()),
            SpecAction::AddTreeNode { node, .. } => Some(describe_add(node, NodeType::Folder)),
            SpecAction::RemoveTreeNode { .. } => Some("remove tree node".to_string()),
            SpecAction::RenameKey { .. } => Some("rename slug".to_string()),
            _ => None,
        }
    }
}

/// Actions understood by the example-map store. Node-level actions target
/// the selected map.
#[derive(Debug, Clone, PartialEq)]
pub enum MapAction {
    Load(MapTreesState),
    ClearUndo,
    ClearRedo,
    Reload { is_reset: bool },
    AddUndo { id: TransactionId, patch: Patch },
    RemoveUndo { id: TransactionId },
    Undo { id: TransactionId },
    Redo { id: TransactionId },
    NodeClicked { key: String, tree_index: usize },
    SetValue { key: String, property: NodeProperty },
    SetNodes(Vec<TreeNode>),
    AddTreeNode { node: NewNode, selected_key: Option<String> },
    RemoveTreeNode { key: String },
    RenameKey { old: String, new: String, title: Option<String> },
    SetRenameKeys(RenameLedger),
    Touched(Option<i64>),
    LoadTrees(BTreeMap<String, MapTreeState>),
    CreateTree { key: String, tree: Vec<TreeNode> },
    ChangeSelectedTree(String),
    RenameTreeKey { old: String, new: String },
}

impl MapAction {
    pub fn description(&self) -> Option<String> {
        match self {
            MapAction::NodeClicked { .. } => Some("node click".to_string()),
            MapAction::SetValue { property, .. } => Some(describe_property(property)),
            MapAction::SetNodes(_) => Some("tree change".to_string()),
            MapAction::AddTreeNode { node, .. } => Some(describe_add(node, NodeType::Story)),
            MapAction::RemoveTreeNode { .. } => Some("remove tree node".to_string()),
            MapAction::RenameKey { .. } => Some("rename slug".to_string()),
            MapAction::CreateTree { .. } => Some("create a tree".to_string()),
            MapAction::ChangeSelectedTree(_) => Some("change selected tree".to_string()),
            _ => None,
        }
    }
}

/// Actions understood by the application-state store
#[derive(Debug, Clone, PartialEq)]
pub enum AppAction {
    AddUndo { id: TransactionId, descriptions: Vec<String> },
    Undo,
    Redo,
    ClearUndo,
    Reload,
    Touched(Option<i64>),
    LoadConfig(RepositoryConfig),
    SetCurrentRepositoryUrl(String),
    SetCommitPushChecked(bool),
    SetGitProfile(GitProfile),
    DeleteGitProfile(String),
    SetLocalRepository { url: String, repository: LocalRepository },
    DeleteLocalRepository(String),
    ChangeTreeView(TreeViewChange),
}

fn describe_property(property: &NodeProperty) -> String {
    match property {
        NodeProperty::Notes(_) => "change document".to_string(),
        NodeProperty::ToggleState(_) => "change feature toggle state".to_string(),
        NodeProperty::Conditions(_) => "change toggle conditions".to_string(),
        other => format!("change {}", other.name()),
    }
}

fn describe_add(node: &NewNode, default_type: NodeType) -> String {
    format!("add a {}", node.node_type.unwrap_or(default_type))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptions() {
        let set_notes = SpecAction::SetValue {
            key: "f1".to_string(),
            property: NodeProperty::Notes(Some("# Login".to_string())),
        };
        assert_eq!(set_notes.description().as_deref(), Some("change document"));

        let set_title = MapAction::SetValue {
            key: "s1".to_string(),
            property: NodeProperty::Title("Story".to_string()),
        };
        assert_eq!(set_title.description().as_deref(), Some("change title"));

        let add = MapAction::AddTreeNode {
            node: NewNode::new("r1", NodeType::Rule, "Rule"),
            selected_key: None,
        };
        assert_eq!(add.description().as_deref(), Some("add a rule"));

        assert_eq!(SpecAction::Touched(Some(1)).description(), None);
    }

    #[test]
    fn test_new_node_uses_stub_defaults() {
        let node = NewNode {
            key: "n1".to_string(),
            node_type: None,
            title: None,
            notes: None,
        }
        .build(NodeType::Story, "New Story");

        assert_eq!(node.node_type, NodeType::Story);
        assert_eq!(node.title, "New Story");
        assert!(node.expanded);
    }
}

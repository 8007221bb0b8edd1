//! # Application State
//!
//! The global undo/redo stacks, the repository configuration and view
//! flags. The stacks only hold transaction ids and descriptions; the
//! patches themselves live in the tree stores.

use serde::{Deserialize, Serialize};
use specbook_model::RepositoryConfig;

use crate::actions::{AppAction, TransactionId};
use crate::errors::EditorResult;
use crate::store::Reducer;

/// One user-visible undo step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UndoRedoStackItem {
    pub transaction_id: TransactionId,
    pub descriptions: Vec<String>,
}

impl UndoRedoStackItem {
    pub fn description(&self) -> String {
        self.descriptions.join(", ")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeView {
    pub is_expanded: bool,
    pub is_spec_tree_visible: bool,
    pub is_map_tree_visible: bool,
}

impl Default for TreeView {
    fn default() -> Self {
        Self {
            is_expanded: false,
            is_spec_tree_visible: true,
            is_map_tree_visible: true,
        }
    }
}

/// Partial update merged into [`TreeView`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeViewChange {
    pub is_expanded: Option<bool>,
    pub is_spec_tree_visible: Option<bool>,
    pub is_map_tree_visible: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppState {
    #[serde(default)]
    pub undo_stack: Vec<UndoRedoStackItem>,

    #[serde(default)]
    pub redo_stack: Vec<UndoRedoStackItem>,

    #[serde(default)]
    pub config: RepositoryConfig,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub touched: Option<i64>,

    #[serde(default)]
    pub tree_view: TreeView,
}

impl AppState {
    pub fn with_config(config: RepositoryConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }
}

impl Reducer for AppState {
    type Action = AppAction;

    fn reduce(self, action: AppAction) -> EditorResult<Self> {
        let mut state = self;
        match action {
            AppAction::AddUndo { id, descriptions } => {
                state.undo_stack.push(UndoRedoStackItem {
                    transaction_id: id,
                    descriptions,
                });
                state.redo_stack.clear();
            }
            AppAction::Undo => {
                if let Some(item) = state.undo_stack.pop() {
                    state.redo_stack.push(item);
                }
            }
            AppAction::Redo => {
                if let Some(item) = state.redo_stack.pop() {
                    state.undo_stack.push(item);
                }
            }
            AppAction::ClearUndo | AppAction::Reload => {
                state.undo_stack.clear();
                state.redo_stack.clear();
                state.tree_view = TreeView::default();
            }
            AppAction::Touched(touched) => state.touched = touched,
            AppAction::LoadConfig(config) => state.config = config,
            AppAction::SetCurrentRepositoryUrl(url) => state.config.current_repository_url = url,
            AppAction::SetCommitPushChecked(checked) => state.config.is_commit_push_checked = checked,
            AppAction::SetGitProfile(profile) => {
                state
                    .config
                    .git_profiles
                    .insert(profile.profile_name.clone(), profile);
            }
            AppAction::DeleteGitProfile(name) => {
                state.config.git_profiles.remove(&name);
            }
            AppAction::SetLocalRepository { url, repository } => {
                state.config.local_repositories.insert(url, repository);
            }
            AppAction::DeleteLocalRepository(url) => {
                state.config.local_repositories.remove(&url);
            }
            AppAction::ChangeTreeView(change) => {
                let view = &mut state.tree_view;
                view.is_expanded = change.is_expanded.unwrap_or(view.is_expanded);
                view.is_spec_tree_visible = change.is_spec_tree_visible.unwrap_or(view.is_spec_tree_visible);
                view.is_map_tree_visible = change.is_map_tree_visible.unwrap_or(view.is_map_tree_visible);
            }
        }
        Ok(state)
    }
}

//! # Transaction Coordinator
//!
//! Runs one user action across several stores as a single undo step.
//!
//! ## Design
//!
//! - Every store touched by a transaction is snapshotted before the first step
//! - Steps are dispatched in order; each store sees its own steps FIFO
//! - Afterwards each touched store records `diff(snapshot, current)` as its
//!   undo patch under one transaction id
//! - The application store gets one stack item carrying every step's
//!   description
//! - If any step fails, every store is put back to its snapshot and nothing
//!   is recorded
//!
//! ## Example
//!
//! ```rust,ignore
//! let mut coordinator = TransactionCoordinator::default();
//! coordinator.run_transaction(vec![
//!     TransactionStep::new(SpecAction::SetValue { key, property }),
//!     TransactionStep::new(SpecAction::Touched(Some(now))),
//! ])?;
//!
//! coordinator.undo()?;
//! coordinator.redo()?;
//! ```

use specbook_model::patch::{diff, to_value};
use specbook_model::tree::find_by_key;
use specbook_model::{PatchFilter, ValidationError};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::actions::{AppAction, MapAction, SpecAction, TransactionId};
use crate::app_state::AppState;
use crate::errors::EditorResult;
use crate::map_store::MapTreesState;
use crate::spec_store::SpecTreeState;
use crate::store::{History, Reducer, Store};

/// An action for one of the undoable tree stores
#[derive(Debug, Clone, PartialEq)]
pub enum StoreAction {
    Spec(SpecAction),
    Map(MapAction),
}

impl StoreAction {
    pub fn description(&self) -> Option<String> {
        match self {
            StoreAction::Spec(action) => action.description(),
            StoreAction::Map(action) => action.description(),
        }
    }
}

impl From<SpecAction> for StoreAction {
    fn from(action: SpecAction) -> Self {
        StoreAction::Spec(action)
    }
}

impl From<MapAction> for StoreAction {
    fn from(action: MapAction) -> Self {
        StoreAction::Map(action)
    }
}

/// One action of a transaction, with an optional restriction on what its
/// store's undo patch covers
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionStep {
    pub action: StoreAction,
    pub filter: Option<PatchFilter>,
}

impl TransactionStep {
    pub fn new(action: impl Into<StoreAction>) -> Self {
        Self {
            action: action.into(),
            filter: None,
        }
    }

    pub fn with_filter(mut self, filter: PatchFilter) -> Self {
        self.filter = Some(filter);
        self
    }
}

/// Owns the specification, example-map and application stores
#[derive(Debug, Default)]
pub struct TransactionCoordinator {
    spec: Store<SpecTreeState>,
    maps: Store<MapTreesState>,
    app: Store<AppState>,
}

/// Which stores a transaction touched and the filter each one records with
#[derive(Default)]
struct Touched {
    spec: Option<PatchFilter>,
    maps: Option<PatchFilter>,
}

impl TransactionCoordinator {
    pub fn new(spec: SpecTreeState, maps: MapTreesState, app: AppState) -> Self {
        Self {
            spec: Store::new(spec),
            maps: Store::new(maps),
            app: Store::new(app),
        }
    }

    pub fn spec(&self) -> &SpecTreeState {
        self.spec.state()
    }

    pub fn maps(&self) -> &MapTreesState {
        self.maps.state()
    }

    pub fn app(&self) -> &AppState {
        self.app.state()
    }

    /// Run `steps` as one undoable unit
    pub fn run_transaction(&mut self, steps: Vec<TransactionStep>) -> EditorResult<TransactionId> {
        let id = Uuid::new_v4().to_string();
        let spec_snapshot = self.spec.state().clone();
        let maps_snapshot = self.maps.state().clone();
        let app_snapshot = self.app.state().clone();
        let step_count = steps.len();

        match self.apply_steps(&id, steps, &spec_snapshot, &maps_snapshot) {
            Ok(()) => {
                debug!(transaction_id = %id, steps = step_count, "transaction recorded");
                Ok(id)
            }
            Err(e) => {
                warn!(transaction_id = %id, error = %e, "transaction rolled back");
                self.spec.replace(spec_snapshot);
                self.maps.replace(maps_snapshot);
                self.app.replace(app_snapshot);
                Err(e)
            }
        }
    }

    fn apply_steps(
        &mut self,
        id: &str,
        steps: Vec<TransactionStep>,
        spec_snapshot: &SpecTreeState,
        maps_snapshot: &MapTreesState,
    ) -> EditorResult<()> {
        if steps.is_empty() {
            return Ok(());
        }

        let mut touched = Touched::default();
        let mut descriptions = Vec::new();

        for step in steps {
            self.check_new_key(&step.action)?;
            if let Some(description) = step.action.description() {
                descriptions.push(description);
            }
            match step.action {
                StoreAction::Spec(action) => {
                    touched.spec = step.filter.or(touched.spec.take()).or_else(|| Some(PatchFilter::default()));
                    self.spec.dispatch(action)?;
                }
                StoreAction::Map(action) => {
                    touched.maps = step.filter.or(touched.maps.take()).or_else(|| Some(PatchFilter::default()));
                    self.maps.dispatch(action)?;
                }
            }
        }

        if let Some(filter) = touched.spec {
            let patch = diff(&to_value(spec_snapshot)?, &to_value(self.spec.state())?, &filter);
            if !patch.is_empty() {
                self.spec.dispatch(SpecAction::AddUndo {
                    id: id.to_string(),
                    patch,
                })?;
            }
        }
        if let Some(filter) = touched.maps {
            let patch = diff(&to_value(maps_snapshot)?, &to_value(self.maps.state())?, &filter);
            if !patch.is_empty() {
                self.maps.dispatch(MapAction::AddUndo {
                    id: id.to_string(),
                    patch,
                })?;
            }
        }

        // The redo stack is emptied below, so no store may keep redo patches.
        self.spec.dispatch(SpecAction::ClearRedo)?;
        self.maps.dispatch(MapAction::ClearRedo)?;

        self.app.dispatch(AppAction::AddUndo {
            id: id.to_string(),
            descriptions,
        })
    }

    /// Documents of every tree share one directory, so a key added or
    /// renamed into any tree must be free in all of them
    fn check_new_key(&self, action: &StoreAction) -> EditorResult<()> {
        let key = match action {
            StoreAction::Spec(SpecAction::AddTreeNode { node, .. })
            | StoreAction::Map(MapAction::AddTreeNode { node, .. }) => &node.key,
            StoreAction::Spec(SpecAction::RenameKey { old, new, .. })
            | StoreAction::Map(MapAction::RenameKey { old, new, .. })
                if old != new =>
            {
                new
            }
            _ => return Ok(()),
        };
        if self.key_in_use(key) {
            return Err(ValidationError::DuplicateKey(key.clone()).into());
        }
        Ok(())
    }

    /// Whether `key` names a node of the specification or of any example map
    pub fn key_in_use(&self, key: &str) -> bool {
        find_by_key(key, &self.spec.state().tree).is_some()
            || self
                .maps
                .state()
                .trees
                .values()
                .any(|map| find_by_key(key, &map.tree).is_some())
    }

    /// Revert the most recent transaction. Returns `false` if there is none.
    pub fn undo(&mut self) -> EditorResult<bool> {
        self.step(History::Undo)
    }

    /// Reapply the most recently undone transaction
    pub fn redo(&mut self) -> EditorResult<bool> {
        self.step(History::Redo)
    }

    fn step(&mut self, direction: History) -> EditorResult<bool> {
        let stack = match direction {
            History::Undo => &self.app.state().undo_stack,
            History::Redo => &self.app.state().redo_stack,
        };
        let Some(item) = stack.last() else {
            return Ok(false);
        };
        let id = item.transaction_id.clone();

        // Both stores are computed before either is replaced.
        let (spec, maps, app) = match direction {
            History::Undo => (
                self.spec.state().clone().reduce(SpecAction::Undo { id: id.clone() })?,
                self.maps.state().clone().reduce(MapAction::Undo { id: id.clone() })?,
                self.app.state().clone().reduce(AppAction::Undo)?,
            ),
            History::Redo => (
                self.spec.state().clone().reduce(SpecAction::Redo { id: id.clone() })?,
                self.maps.state().clone().reduce(MapAction::Redo { id: id.clone() })?,
                self.app.state().clone().reduce(AppAction::Redo)?,
            ),
        };
        self.spec.replace(spec);
        self.maps.replace(maps);
        self.app.replace(app);

        debug!(transaction_id = %id, ?direction, "history step applied");
        Ok(true)
    }

    pub fn clear_undo(&mut self) -> EditorResult<()> {
        self.spec.dispatch(SpecAction::ClearUndo)?;
        self.maps.dispatch(MapAction::ClearUndo)?;
        self.app.dispatch(AppAction::ClearUndo)
    }

    pub fn is_undo_available(&self) -> bool {
        !self.app.state().undo_stack.is_empty()
    }

    pub fn is_redo_available(&self) -> bool {
        !self.app.state().redo_stack.is_empty()
    }

    pub fn undo_description(&self) -> Option<String> {
        self.app.state().undo_stack.last().map(|item| item.description())
    }

    pub fn redo_description(&self) -> Option<String> {
        self.app.state().redo_stack.last().map(|item| item.description())
    }

    /// Apply an action to a tree store without recording it
    pub fn dispatch(&mut self, action: impl Into<StoreAction>) -> EditorResult<()> {
        match action.into() {
            StoreAction::Spec(action) => self.spec.dispatch(action),
            StoreAction::Map(action) => self.maps.dispatch(action),
        }
    }

    pub fn dispatch_app(&mut self, action: AppAction) -> EditorResult<()> {
        self.app.dispatch(action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::NewNode;
    use crate::errors::EditorError;
    use crate::map_store::MapTreeState;
    use specbook_model::{NodeProperty, NodeType, TreeNode};

    fn coordinator() -> TransactionCoordinator {
        TransactionCoordinator::new(
            SpecTreeState::with_tree(vec![TreeNode::new("r1", NodeType::Folder, "Root")]),
            MapTreesState::default(),
            AppState::default(),
        )
    }

    fn set_title(key: &str, title: &str) -> TransactionStep {
        TransactionStep::new(SpecAction::SetValue {
            key: key.to_string(),
            property: NodeProperty::Title(title.to_string()),
        })
    }

    #[test]
    fn test_coordinator_creation() {
        let coordinator = coordinator();
        assert!(!coordinator.is_undo_available());
        assert!(!coordinator.is_redo_available());
        assert_eq!(coordinator.undo_description(), None);
    }

    #[test]
    fn test_transaction_records_one_stack_item() {
        let mut coordinator = coordinator();
        let id = coordinator
            .run_transaction(vec![set_title("r1", "Top"), TransactionStep::new(SpecAction::Touched(Some(7)))])
            .unwrap();

        assert_eq!(coordinator.app().undo_stack.len(), 1);
        assert_eq!(coordinator.app().undo_stack[0].transaction_id, id);
        assert!(coordinator.spec().undo.contains_key(&id));
        assert_eq!(coordinator.undo_description().as_deref(), Some("change title"));
    }

    #[test]
    fn test_undo_redo_restores_states() {
        let mut coordinator = coordinator();
        coordinator.run_transaction(vec![set_title("r1", "Top")]).unwrap();

        assert!(coordinator.undo().unwrap());
        assert_eq!(coordinator.spec().tree[0].title, "Root");
        assert!(coordinator.is_redo_available());

        assert!(coordinator.redo().unwrap());
        assert_eq!(coordinator.spec().tree[0].title, "Top");
        assert!(!coordinator.is_redo_available());
    }

    #[test]
    fn test_undo_with_empty_stack() {
        let mut coordinator = coordinator();
        assert!(!coordinator.undo().unwrap());
        assert!(!coordinator.redo().unwrap());
    }

    #[test]
    fn test_failed_step_rolls_back_everything() {
        let mut coordinator = coordinator();
        let before = coordinator.spec().clone();

        let result = coordinator.run_transaction(vec![
            set_title("r1", "Changed"),
            TransactionStep::new(SpecAction::AddTreeNode {
                node: NewNode::new("f1", NodeType::Feature, "Login"),
                selected_key: Some("missing".to_string()),
            }),
        ]);

        assert!(result.is_err());
        assert_eq!(coordinator.spec(), &before);
        assert!(!coordinator.is_undo_available());
    }

    #[test]
    fn test_new_transaction_clears_redo() {
        let mut coordinator = coordinator();
        coordinator.run_transaction(vec![set_title("r1", "One")]).unwrap();
        coordinator.undo().unwrap();
        coordinator.run_transaction(vec![set_title("r1", "Two")]).unwrap();

        assert!(!coordinator.is_redo_available());
        assert!(coordinator.spec().redo.is_empty());
    }

    #[test]
    fn test_include_filter_limits_patch() {
        let mut coordinator = coordinator();
        coordinator
            .run_transaction(vec![
                TransactionStep::new(SpecAction::Touched(Some(3))),
                set_title("r1", "Top").with_filter(PatchFilter::include(["tree"])),
            ])
            .unwrap();

        coordinator.undo().unwrap();
        assert_eq!(coordinator.spec().tree[0].title, "Root");
        assert_eq!(coordinator.spec().touched, Some(3));
    }

    #[test]
    fn test_clear_undo() {
        let mut coordinator = coordinator();
        coordinator.run_transaction(vec![set_title("r1", "Top")]).unwrap();
        coordinator.clear_undo().unwrap();

        assert!(!coordinator.is_undo_available());
        assert!(coordinator.spec().undo.is_empty());
    }

    fn coordinator_with_maps() -> TransactionCoordinator {
        let spec = SpecTreeState::with_tree(vec![TreeNode::new("r1", NodeType::Folder, "Root")
            .with_children(vec![
                TreeNode::new("m1", NodeType::Map, "First map"),
                TreeNode::new("m2", NodeType::Map, "Second map"),
            ])]);
        let mut maps = MapTreesState::with_trees(
            [
                ("m1".to_string(), MapTreeState::new(vec![TreeNode::new("s1", NodeType::Story, "One")])),
                ("m2".to_string(), MapTreeState::new(vec![TreeNode::new("s2", NodeType::Story, "Two")])),
            ]
            .into_iter()
            .collect(),
        );
        maps.selected_tree_key = Some("m1".to_string());
        TransactionCoordinator::new(spec, maps, AppState::default())
    }

    fn add_story(key: &str) -> TransactionStep {
        TransactionStep::new(MapAction::AddTreeNode {
            node: NewNode::new(key, NodeType::Story, "Story"),
            selected_key: None,
        })
    }

    #[test]
    fn test_key_must_be_free_in_every_tree() {
        let mut coordinator = coordinator_with_maps();
        coordinator.run_transaction(vec![add_story("shared")]).unwrap();

        coordinator.dispatch(MapAction::ChangeSelectedTree("m2".to_string())).unwrap();
        let before = coordinator.maps().clone();
        let err = coordinator.run_transaction(vec![add_story("shared")]).unwrap_err();

        assert!(matches!(
            err,
            EditorError::Validation(ValidationError::DuplicateKey(ref key)) if key == "shared"
        ));
        assert_eq!(coordinator.maps(), &before);

        let err = coordinator
            .run_transaction(vec![TransactionStep::new(SpecAction::AddTreeNode {
                node: NewNode::new("s2", NodeType::Feature, "Clash"),
                selected_key: Some("r1".to_string()),
            })])
            .unwrap_err();
        assert!(matches!(err, EditorError::Validation(ValidationError::DuplicateKey(_))));
    }

    #[test]
    fn test_rename_into_other_tree_key_is_rejected() {
        let mut coordinator = coordinator_with_maps();
        let err = coordinator
            .run_transaction(vec![TransactionStep::new(SpecAction::RenameKey {
                old: "r1".to_string(),
                new: "s1".to_string(),
                title: None,
            })])
            .unwrap_err();

        assert!(matches!(err, EditorError::Validation(ValidationError::DuplicateKey(_))));
        assert!(coordinator.key_in_use("r1"));
        assert!(coordinator.key_in_use("s2"));
        assert!(!coordinator.key_in_use("missing"));
    }

    #[test]
    fn test_untouched_store_drops_redo_patches() {
        let mut coordinator = coordinator_with_maps();
        coordinator
            .run_transaction(vec![TransactionStep::new(MapAction::SetValue {
                key: "s1".to_string(),
                property: NodeProperty::Title("Renamed".to_string()),
            })])
            .unwrap();
        coordinator.undo().unwrap();
        assert_eq!(coordinator.maps().redo.len(), 1);

        coordinator.run_transaction(vec![set_title("r1", "Top")]).unwrap();

        assert!(!coordinator.is_redo_available());
        assert!(coordinator.maps().redo.is_empty());
        assert!(coordinator.spec().redo.is_empty());
    }
}

//! Editing session for one repository.
//!
//! Binds a [`TransactionCoordinator`] to a repository URL and a
//! [`KeyValueStore`]: state is loaded from storage (or stubbed), and every
//! mutation is followed by persisting whichever stores hold unsaved work.

use std::collections::BTreeMap;
use std::sync::Arc;

use specbook_editor::commands::now_millis;
use specbook_editor::{
    AppAction, AppState, MapAction, MapTreeState, MapTreesState, SpecAction, SpecTreeState,
    TransactionCoordinator, TransactionId, TransactionStep,
};
use specbook_model::tree::flatten;
use specbook_model::{NodeType, RepositoryConfig, TreeNode};
use tracing::debug;

use crate::error::SyncResult;
use crate::storage::{self, KeyValueStore};

pub struct EditorSession {
    url: String,
    store: Arc<dyn KeyValueStore>,
    coordinator: TransactionCoordinator,
}

/// A stub map for every map node of `tree`
fn stub_maps(tree: &[TreeNode]) -> MapTreesState {
    let trees: BTreeMap<String, MapTreeState> = flatten(tree)
        .into_iter()
        .filter(|node| node.node_type == NodeType::Map)
        .map(|node| (node.key.clone(), MapTreeState::stub()))
        .collect();
    MapTreesState::with_trees(trees)
}

fn load_stores(store: &dyn KeyValueStore, url: &str) -> SyncResult<(SpecTreeState, MapTreesState)> {
    let spec = match storage::fetch_spec(store, url)? {
        Some(persisted) => persisted.into_state(),
        None => SpecTreeState::stub(),
    };
    let maps = match storage::fetch_maps(store, url)? {
        Some(persisted) => persisted.into_state(),
        None => stub_maps(&spec.tree),
    };
    Ok((spec, maps))
}

impl EditorSession {
    pub fn open(url: &str, store: Arc<dyn KeyValueStore>, config: RepositoryConfig) -> SyncResult<Self> {
        let (spec, maps) = load_stores(store.as_ref(), url)?;
        debug!(url, nodes = flatten(&spec.tree).len(), maps = maps.trees.len(), "session opened");
        Ok(Self {
            url: url.to_string(),
            store,
            coordinator: TransactionCoordinator::new(spec, maps, AppState::with_config(config)),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn coordinator(&self) -> &TransactionCoordinator {
        &self.coordinator
    }

    pub fn spec(&self) -> &SpecTreeState {
        self.coordinator.spec()
    }

    pub fn maps(&self) -> &MapTreesState {
        self.coordinator.maps()
    }

    pub fn config(&self) -> &RepositoryConfig {
        &self.coordinator.app().config
    }

    fn persist(&self) -> SyncResult<()> {
        let store = self.store.as_ref();
        storage::persist_spec(store, &self.url, self.coordinator.spec())?;
        storage::persist_maps(store, &self.url, self.coordinator.maps())?;
        storage::persist_config(store, self.coordinator.app())?;
        Ok(())
    }

    pub fn run(&mut self, steps: Vec<TransactionStep>) -> SyncResult<TransactionId> {
        let id = self.coordinator.run_transaction(steps)?;
        self.persist()?;
        Ok(id)
    }

    pub fn undo(&mut self) -> SyncResult<bool> {
        let applied = self.coordinator.undo()?;
        self.persist()?;
        Ok(applied)
    }

    pub fn redo(&mut self) -> SyncResult<bool> {
        let applied = self.coordinator.redo()?;
        self.persist()?;
        Ok(applied)
    }

    /// Change the configuration outside undo history
    pub fn update_config(&mut self, action: AppAction) -> SyncResult<()> {
        self.coordinator.dispatch_app(action)?;
        self.coordinator.dispatch_app(AppAction::Touched(Some(now_millis())))?;
        self.persist()
    }

    /// Reload both trees from storage with history and selection cleared.
    /// Called after a commit or revert has rewritten the persisted state.
    pub fn reload(&mut self) -> SyncResult<()> {
        let (spec, maps) = load_stores(self.store.as_ref(), &self.url)?;
        self.coordinator.dispatch(SpecAction::Load(spec))?;
        self.coordinator.dispatch(MapAction::Load(maps))?;
        self.coordinator.dispatch_app(AppAction::Reload)?;
        debug!(url = %self.url, "session reloaded");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use specbook_editor::commands;

    const URL: &str = "https://example.com/spec.git";

    #[test]
    fn test_opens_with_stub() {
        let store = Arc::new(MemoryStore::new());
        let session = EditorSession::open(URL, store.clone(), RepositoryConfig::default()).unwrap();

        assert_eq!(session.spec().tree.len(), 1);
        assert_eq!(session.spec().tree[0].title, "New Project");
        assert!(storage::fetch_spec(store.as_ref(), URL).unwrap().is_none());
    }

    #[test]
    fn test_mutation_is_persisted() {
        let store = Arc::new(MemoryStore::new());
        let mut session = EditorSession::open(URL, store.clone(), RepositoryConfig::default()).unwrap();
        let root = session.spec().tree[0].clone();

        session.run(commands::set_notes(&root, "changed")).unwrap();

        let persisted = storage::fetch_spec(store.as_ref(), URL).unwrap().unwrap();
        assert_eq!(persisted.tree[0].notes.as_deref(), Some("changed"));
        assert!(persisted.touched.is_some());
    }

    #[test]
    fn test_config_is_persisted_when_touched() {
        let store = Arc::new(MemoryStore::new());
        let mut session = EditorSession::open(URL, store.clone(), RepositoryConfig::default()).unwrap();

        session.update_config(AppAction::SetCommitPushChecked(true)).unwrap();

        let persisted = storage::fetch_config(store.as_ref()).unwrap().unwrap();
        assert!(persisted.config.is_commit_push_checked);
    }

    #[test]
    fn test_reload_clears_history() {
        let store = Arc::new(MemoryStore::new());
        let mut session = EditorSession::open(URL, store.clone(), RepositoryConfig::default()).unwrap();
        let root = session.spec().tree[0].clone();
        session.run(commands::set_notes(&root, "changed")).unwrap();

        session.reload().unwrap();

        assert!(!session.coordinator().is_undo_available());
        assert!(session.spec().undo.is_empty());
        assert_eq!(session.spec().tree[0].notes.as_deref(), Some("changed"));
    }
}

//! # Local Storage
//!
//! Durable key/value storage for the editor's working state: the repository
//! configuration and, per repository URL, the specification tree and the
//! example-map trees together with their rename ledgers.
//!
//! Values are JSON documents. A value that no longer parses surfaces as
//! [`StorageError::Corrupt`] instead of being silently replaced.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use specbook_editor::{AppState, MapTreeState, MapTreesState, RenameLedger, SpecTreeState};
use specbook_model::{RepositoryConfig, TreeNode};
use tracing::{debug, warn};

use crate::error::{StorageError, StorageResult};

pub const CONFIG_KEY: &str = "config";

/// Environment variable holding a bootstrap configuration document
pub const BOOTSTRAP_ENV: &str = "SPECBOOK_CONFIG";

pub fn spec_key(url: &str) -> String {
    format!("spec-{}", url)
}

pub fn map_key(url: &str) -> String {
    format!("map-{}", url)
}

pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> StorageResult<Option<String>>;

    fn set(&self, key: &str, value: &str) -> StorageResult<()>;

    /// Removing a missing key is not an error
    fn remove(&self, key: &str) -> StorageResult<()>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.remove(key);
        Ok(())
    }
}

/// One file per key inside a directory. Keys contain URLs, so file names
/// are a hash of the key.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl AsRef<Path>) -> StorageResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path(&self, key: &str) -> PathBuf {
        let name: String = Sha256::digest(key.as_bytes())
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect();
        self.dir.join(format!("{}.json", name))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        match std::fs::read_to_string(self.path(key)) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        std::fs::write(self.path(key), value)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        match std::fs::remove_file(self.path(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Stored form of the specification store
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub touched: Option<i64>,
    #[serde(default)]
    pub rename_keys: RenameLedger,
    #[serde(default)]
    pub tree: Vec<TreeNode>,
}

impl PersistedSpec {
    pub fn into_state(self) -> SpecTreeState {
        SpecTreeState {
            touched: self.touched,
            tree: self.tree,
            rename_keys: self.rename_keys,
            ..SpecTreeState::default()
        }
    }
}

/// Stored form of the example-map store
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedMaps {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub touched: Option<i64>,
    #[serde(default)]
    pub rename_keys: RenameLedger,
    #[serde(default)]
    pub trees: BTreeMap<String, MapTreeState>,
}

impl PersistedMaps {
    pub fn into_state(self) -> MapTreesState {
        MapTreesState {
            touched: self.touched,
            trees: self.trees,
            rename_keys: self.rename_keys,
            ..MapTreesState::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistedConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub touched: Option<i64>,
    pub config: RepositoryConfig,
}

fn read_json<T: DeserializeOwned>(store: &dyn KeyValueStore, key: &str) -> StorageResult<Option<T>> {
    let Some(raw) = store.get(key)? else {
        return Ok(None);
    };
    serde_json::from_str(&raw)
        .map(Some)
        .map_err(|e| StorageError::Corrupt {
            key: key.to_string(),
            reason: e.to_string(),
        })
}

fn write_json<T: Serialize>(store: &dyn KeyValueStore, key: &str, value: &T) -> StorageResult<()> {
    let raw = serde_json::to_string(value).map_err(|e| StorageError::Encode {
        key: key.to_string(),
        reason: e.to_string(),
    })?;
    store.set(key, &raw)
}

pub fn fetch_spec(store: &dyn KeyValueStore, url: &str) -> StorageResult<Option<PersistedSpec>> {
    read_json(store, &spec_key(url))
}

pub fn fetch_maps(store: &dyn KeyValueStore, url: &str) -> StorageResult<Option<PersistedMaps>> {
    read_json(store, &map_key(url))
}

pub fn fetch_config(store: &dyn KeyValueStore) -> StorageResult<Option<PersistedConfig>> {
    read_json(store, CONFIG_KEY)
}

pub fn save_spec(
    store: &dyn KeyValueStore,
    url: &str,
    tree: &[TreeNode],
    touched: Option<i64>,
    rename_keys: &RenameLedger,
) -> StorageResult<()> {
    let persisted = PersistedSpec {
        touched,
        rename_keys: rename_keys.clone(),
        tree: tree.to_vec(),
    };
    write_json(store, &spec_key(url), &persisted)
}

/// Save map trees with their selection reset
pub fn save_maps(
    store: &dyn KeyValueStore,
    url: &str,
    trees: &BTreeMap<String, MapTreeState>,
    touched: Option<i64>,
    rename_keys: &RenameLedger,
) -> StorageResult<()> {
    let trees = trees
        .iter()
        .map(|(key, state)| {
            let state = MapTreeState {
                tree: state.tree.clone(),
                selected_tree_index: 0,
                selected_node_key: None,
            };
            (key.clone(), state)
        })
        .collect();
    let persisted = PersistedMaps {
        touched,
        rename_keys: rename_keys.clone(),
        trees,
    };
    write_json(store, &map_key(url), &persisted)
}

pub fn save_config(
    store: &dyn KeyValueStore,
    config: &RepositoryConfig,
    touched: Option<i64>,
) -> StorageResult<()> {
    let persisted = PersistedConfig {
        touched,
        config: config.clone(),
    };
    write_json(store, CONFIG_KEY, &persisted)
}

/// Forget the working state of one repository
pub fn remove_repository(store: &dyn KeyValueStore, url: &str) -> StorageResult<()> {
    store.remove(&map_key(url))?;
    store.remove(&spec_key(url))
}

/// Save the specification store if it holds unsaved work. Returns whether
/// anything was written.
pub fn persist_spec(store: &dyn KeyValueStore, url: &str, state: &SpecTreeState) -> StorageResult<bool> {
    if state.touched.is_none() && state.undo.is_empty() && state.redo.is_empty() {
        return Ok(false);
    }
    save_spec(store, url, &state.tree, state.touched, &state.rename_keys)?;
    Ok(true)
}

pub fn persist_maps(store: &dyn KeyValueStore, url: &str, state: &MapTreesState) -> StorageResult<bool> {
    if state.touched.is_none() && state.undo.is_empty() && state.redo.is_empty() {
        return Ok(false);
    }
    save_maps(store, url, &state.trees, state.touched, &state.rename_keys)?;
    Ok(true)
}

/// Configuration is only written once it has been touched
pub fn persist_config(store: &dyn KeyValueStore, state: &AppState) -> StorageResult<bool> {
    if state.touched.is_none() {
        return Ok(false);
    }
    save_config(store, &state.config, state.touched)?;
    Ok(true)
}

/// Resolve the configuration from storage, then `bootstrap`, then the stub.
///
/// A malformed bootstrap document is logged and skipped; malformed stored
/// configuration is an error.
pub fn load_config(store: &dyn KeyValueStore, bootstrap: Option<&str>) -> StorageResult<RepositoryConfig> {
    if let Some(persisted) = fetch_config(store)? {
        debug!("configuration loaded from storage");
        return Ok(persisted.config);
    }

    if let Some(raw) = bootstrap {
        match serde_json::from_str::<RepositoryConfig>(raw) {
            Ok(config) => {
                debug!("configuration loaded from bootstrap document");
                return Ok(config);
            }
            Err(e) => warn!("Ignoring malformed bootstrap configuration: {}", e),
        }
    }

    Ok(RepositoryConfig::default())
}

pub fn bootstrap_from_env() -> Option<String> {
    std::env::var(BOOTSTRAP_ENV).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use specbook_model::{NodeType, DEFAULT_PROFILE};

    const URL: &str = "https://example.com/spec.git";

    #[test]
    fn test_spec_round_trip() {
        let store = MemoryStore::new();
        let tree = vec![TreeNode::new("r1", NodeType::Folder, "Root")];
        let ledger = RenameLedger::from([("old".to_string(), "r1".to_string())]);

        save_spec(&store, URL, &tree, Some(42), &ledger).unwrap();

        let loaded = fetch_spec(&store, URL).unwrap().unwrap();
        assert_eq!(loaded.tree, tree);
        assert_eq!(loaded.touched, Some(42));
        assert_eq!(loaded.rename_keys, ledger);
    }

    #[test]
    fn test_touched_is_omitted_when_absent() {
        let store = MemoryStore::new();
        save_spec(&store, URL, &[], None, &RenameLedger::new()).unwrap();

        let raw = store.get(&spec_key(URL)).unwrap().unwrap();
        assert!(!raw.contains("touched"));
        assert!(raw.contains("renameKeys"));
    }

    #[test]
    fn test_save_maps_resets_selection() {
        let store = MemoryStore::new();
        let mut state = MapTreeState::new(vec![TreeNode::new("s1", NodeType::Story, "Story")]);
        state.selected_tree_index = 3;
        let trees = BTreeMap::from([("m1".to_string(), state)]);

        save_maps(&store, URL, &trees, None, &RenameLedger::new()).unwrap();

        let loaded = fetch_maps(&store, URL).unwrap().unwrap();
        assert_eq!(loaded.trees["m1"].selected_tree_index, 0);
        assert_eq!(loaded.trees["m1"].selected_node_key, None);
    }

    #[test]
    fn test_persist_rule() {
        let store = MemoryStore::new();
        let mut state = SpecTreeState::with_tree(vec![TreeNode::new("r1", NodeType::Folder, "Root")]);
        assert!(!persist_spec(&store, URL, &state).unwrap());
        assert!(fetch_spec(&store, URL).unwrap().is_none());

        state.touched = Some(1);
        assert!(persist_spec(&store, URL, &state).unwrap());
        assert!(fetch_spec(&store, URL).unwrap().is_some());
    }

    #[test]
    fn test_corrupt_value() {
        let store = MemoryStore::new();
        store.set(&spec_key(URL), "{not json").unwrap();

        let result = fetch_spec(&store, URL);
        assert!(matches!(result, Err(StorageError::Corrupt { .. })));
    }

    #[test]
    fn test_load_config_order() {
        let store = MemoryStore::new();

        let stub = load_config(&store, None).unwrap();
        assert!(stub.git_profiles.contains_key(DEFAULT_PROFILE));

        let bad = load_config(&store, Some("not json")).unwrap();
        assert_eq!(bad, stub);

        let mut bootstrap = RepositoryConfig::default();
        bootstrap.current_repository_url = "https://example.com/other.git".to_string();
        let raw = serde_json::to_string(&bootstrap).unwrap();
        assert_eq!(load_config(&store, Some(&raw)).unwrap(), bootstrap);

        let mut saved = RepositoryConfig::default();
        saved.is_commit_push_checked = true;
        save_config(&store, &saved, Some(1)).unwrap();
        assert_eq!(load_config(&store, Some(&raw)).unwrap(), saved);
    }

    #[test]
    fn test_remove_repository() {
        let store = MemoryStore::new();
        save_spec(&store, URL, &[], None, &RenameLedger::new()).unwrap();
        save_maps(&store, URL, &BTreeMap::new(), None, &RenameLedger::new()).unwrap();

        remove_repository(&store, URL).unwrap();

        assert!(fetch_spec(&store, URL).unwrap().is_none());
        assert!(fetch_maps(&store, URL).unwrap().is_none());
    }

    #[test]
    fn test_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path()).unwrap();

        assert_eq!(store.get(CONFIG_KEY).unwrap(), None);
        store.set(CONFIG_KEY, "{}").unwrap();
        assert_eq!(store.get(CONFIG_KEY).unwrap().as_deref(), Some("{}"));

        store.remove(CONFIG_KEY).unwrap();
        store.remove(CONFIG_KEY).unwrap();
        assert_eq!(store.get(CONFIG_KEY).unwrap(), None);
    }
}

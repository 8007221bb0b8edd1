//! Write store state into the working tree and stage every change.

use std::collections::BTreeSet;

use specbook_common::FileSystem;
use specbook_model::tree::{extract_feature_toggles, filter_keys, flatten};
use specbook_model::{NodeType, TreeNode, STRUCTURAL_FIELDS};
use tracing::{debug, warn};

use crate::error::SyncResult;
use crate::git::GitEngine;
use crate::layout::{
    attachment_file, document_file, gherkin_file, map_file, spec_node_files, FEATURE_TOGGLES_FILE,
    FILES_DIR, GIT_DIR, SPECIFICATION_FILE,
};
use crate::storage::{PersistedMaps, PersistedSpec};

/// Paths written (and staged) and removed (and unstaged) by one pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Changes {
    pub written: Vec<String>,
    pub removed: Vec<String>,
}

struct Writer<'a> {
    git: &'a dyn GitEngine,
    fs: &'a dyn FileSystem,
    changes: Changes,
}

impl<'a> Writer<'a> {
    async fn write(&mut self, path: &str, contents: &[u8]) -> SyncResult<()> {
        self.fs.write(path, contents)?;
        self.git.add(self.fs, path).await?;
        self.changes.written.push(path.to_string());
        Ok(())
    }

    async fn remove(&mut self, path: &str) -> SyncResult<()> {
        if self.fs.remove_if_exists(path)? {
            self.git.remove(self.fs, path).await?;
            self.changes.removed.push(path.to_string());
        }
        Ok(())
    }

    async fn write_structure(&mut self, tree: &[TreeNode], path: &str) -> SyncResult<()> {
        let projection = filter_keys(STRUCTURAL_FIELDS, tree);
        let yaml = serde_yaml::to_string(&projection)?;
        self.write(path, yaml.as_bytes()).await
    }

    /// Write the node's document and acceptance criteria, or remove the
    /// files when the node has none
    async fn write_documents(&mut self, node: &TreeNode) -> SyncResult<()> {
        let document = document_file(&node.key);
        match node.notes.as_deref().filter(|n| !n.is_empty()) {
            Some(notes) => self.write(&document, notes.as_bytes()).await?,
            None => self.remove(&document).await?,
        }

        let gherkin = gherkin_file(&node.key);
        match node.gherkin.as_deref().filter(|g| !g.is_empty()) {
            Some(text) => self.write(&gherkin, text.as_bytes()).await?,
            None => self.remove(&gherkin).await?,
        }
        Ok(())
    }

    async fn stage_attachments(&mut self) -> SyncResult<()> {
        if !self.fs.is_dir(FILES_DIR) {
            return Ok(());
        }
        for name in self.fs.read_dir(FILES_DIR)? {
            let path = attachment_file(&name);
            if name == GIT_DIR || self.fs.is_dir(&path) {
                continue;
            }
            self.git.add(self.fs, &path).await?;
            self.changes.written.push(path);
        }
        Ok(())
    }
}

/// Serialize both trees into the working tree of `fs` and stage the result.
///
/// Files of keys that were renamed away are removed last. A ledger key that
/// names a node in the current trees is skipped, since its files were just
/// written for that node.
pub async fn add_changes(
    git: &dyn GitEngine,
    fs: &dyn FileSystem,
    spec: &PersistedSpec,
    maps: &PersistedMaps,
) -> SyncResult<Changes> {
    let mut writer = Writer {
        git,
        fs,
        changes: Changes::default(),
    };
    let mut live_keys = BTreeSet::new();

    writer.write_structure(&spec.tree, SPECIFICATION_FILE).await?;

    for node in flatten(&spec.tree) {
        live_keys.insert(node.key.clone());
        writer.write_documents(node).await?;

        if node.node_type != NodeType::Map {
            continue;
        }
        let Some(map) = maps.trees.get(&node.key) else {
            warn!(map = %node.key, "map node has no example map, skipping");
            continue;
        };
        writer.write_structure(&map.tree, &map_file(&node.key)).await?;
        for map_node in flatten(&map.tree) {
            live_keys.insert(map_node.key.clone());
            writer.write_documents(map_node).await?;
        }
    }

    let toggles = extract_feature_toggles(&spec.tree);
    if toggles.is_empty() {
        writer.remove(FEATURE_TOGGLES_FILE).await?;
    } else {
        let yaml = serde_yaml::to_string(&toggles)?;
        writer.write(FEATURE_TOGGLES_FILE, yaml.as_bytes()).await?;
    }

    writer.stage_attachments().await?;

    for old_key in spec.rename_keys.keys().filter(|k| !live_keys.contains(*k)) {
        for path in spec_node_files(old_key) {
            writer.remove(&path).await?;
        }
    }
    for old_key in maps.rename_keys.keys().filter(|k| !live_keys.contains(*k)) {
        writer.remove(&document_file(old_key)).await?;
    }

    debug!(
        written = writer.changes.written.len(),
        removed = writer.changes.removed.len(),
        "changes staged"
    );
    Ok(writer.changes)
}

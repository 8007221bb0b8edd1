//! Rebuild store state from the files of a checked-out repository.
//!
//! Missing files mean "no content". A file that exists but cannot be read
//! or parsed is reported as a [`LoadError`] and then also treated as
//! missing, so one damaged file never blocks the rest of the repository.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use specbook_common::FileSystem;
use specbook_editor::MapTreeState;
use specbook_model::tree::flatten;
use specbook_model::{FeatureToggle, NodeType, TreeNode};
use tracing::warn;

use crate::error::LoadError;
use crate::layout::{document_file, gherkin_file, map_file, FEATURE_TOGGLES_FILE, SPECIFICATION_FILE};

/// Trees read back from a repository
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Hydrated {
    pub spec_tree: Vec<TreeNode>,
    pub map_trees: BTreeMap<String, MapTreeState>,
    pub errors: Vec<LoadError>,
}

pub fn hydrate(fs: &dyn FileSystem) -> Hydrated {
    let mut errors = Vec::new();
    let spec_tree = hydrate_specification(fs, &mut errors);
    let map_trees = hydrate_maps(fs, &spec_tree, &mut errors);

    for error in &errors {
        warn!("{}", error);
    }

    Hydrated {
        spec_tree,
        map_trees,
        errors,
    }
}

fn for_each_node_mut(tree: &mut [TreeNode], f: &mut impl FnMut(&mut TreeNode)) {
    for node in tree {
        f(node);
        if let Some(children) = node.children.as_mut() {
            for_each_node_mut(children, f);
        }
    }
}

/// Read a text file; unreadable files are recorded and reported as absent
fn read_text(fs: &dyn FileSystem, path: &str, errors: &mut Vec<LoadError>) -> Option<String> {
    match fs.read_optional(path) {
        Ok(content) => content,
        Err(e) => {
            errors.push(LoadError {
                path: path.to_string(),
                reason: e.to_string(),
            });
            None
        }
    }
}

fn read_yaml<T: DeserializeOwned + Default>(
    fs: &dyn FileSystem,
    path: &str,
    errors: &mut Vec<LoadError>,
) -> Option<T> {
    let content = read_text(fs, path, errors)?;
    if content.trim().is_empty() {
        return Some(T::default());
    }
    match serde_yaml::from_str(&content) {
        Ok(value) => Some(value),
        Err(e) => {
            errors.push(LoadError {
                path: path.to_string(),
                reason: e.to_string(),
            });
            None
        }
    }
}

fn load_documents(fs: &dyn FileSystem, tree: &mut [TreeNode], errors: &mut Vec<LoadError>) {
    for_each_node_mut(tree, &mut |node| {
        if let Some(notes) = read_text(fs, &document_file(&node.key), errors) {
            node.notes = Some(notes);
        }
        if node.node_type == NodeType::Feature {
            if let Some(gherkin) = read_text(fs, &gherkin_file(&node.key), errors) {
                node.gherkin = Some(gherkin);
            }
        }
    });
}

fn hydrate_specification(fs: &dyn FileSystem, errors: &mut Vec<LoadError>) -> Vec<TreeNode> {
    let mut tree: Vec<TreeNode> = read_yaml(fs, SPECIFICATION_FILE, errors).unwrap_or_default();
    load_documents(fs, &mut tree, errors);

    let toggles: BTreeMap<String, FeatureToggle> =
        read_yaml(fs, FEATURE_TOGGLES_FILE, errors).unwrap_or_default();
    if !toggles.is_empty() {
        for_each_node_mut(&mut tree, &mut |node| {
            if let Some(toggle) = toggles.get(&node.key) {
                node.toggle_state = Some(toggle.state.clone());
                node.conditions = (!toggle.conditions.is_empty()).then(|| toggle.conditions.clone());
            }
        });
    }

    tree
}

fn hydrate_maps(
    fs: &dyn FileSystem,
    spec_tree: &[TreeNode],
    errors: &mut Vec<LoadError>,
) -> BTreeMap<String, MapTreeState> {
    let mut maps = BTreeMap::new();
    for node in flatten(spec_tree) {
        if node.node_type != NodeType::Map {
            continue;
        }
        let Some(mut tree) = read_yaml::<Vec<TreeNode>>(fs, &map_file(&node.key), errors) else {
            continue;
        };
        load_documents(fs, &mut tree, errors);
        maps.insert(
            node.key.clone(),
            MapTreeState {
                tree,
                selected_tree_index: 0,
                selected_node_key: None,
            },
        );
    }
    maps
}

#[cfg(test)]
mod tests {
    use super::*;
    use specbook_common::MemoryFileSystem;

    #[test]
    fn test_empty_repository() {
        let fs = MemoryFileSystem::new();
        let hydrated = hydrate(&fs);
        assert!(hydrated.spec_tree.is_empty());
        assert!(hydrated.map_trees.is_empty());
        assert!(hydrated.errors.is_empty());
    }

    #[test]
    fn test_documents_and_toggles() {
        let fs = MemoryFileSystem::new();
        fs.write(
            "/specification.yml",
            b"- key: r1\n  type: folder\n  title: Root\n  children:\n  - key: f1\n    type: feature\n    title: Login\n",
        )
        .unwrap();
        fs.write("/f1.md", b"# Login").unwrap();
        fs.write("/f1.feature", b"Feature: Login").unwrap();
        fs.write("/r1.feature", b"ignored").unwrap();
        fs.write(
            "/feature-toggles.yml",
            b"f1:\n  title: Login\n  state: Enabled\n  conditions: ''\n",
        )
        .unwrap();

        let hydrated = hydrate(&fs);
        let root = &hydrated.spec_tree[0];
        let feature = &root.children()[0];

        assert!(root.expanded);
        assert_eq!(root.gherkin, None);
        assert_eq!(feature.notes.as_deref(), Some("# Login"));
        assert_eq!(feature.gherkin.as_deref(), Some("Feature: Login"));
        assert_eq!(feature.toggle_state.as_deref(), Some("Enabled"));
        assert_eq!(feature.conditions, None);
    }

    #[test]
    fn test_maps_are_loaded_per_map_node() {
        let fs = MemoryFileSystem::new();
        fs.write(
            "/specification.yml",
            b"- key: m1\n  type: map\n  title: Rules\n- key: m2\n  type: map\n  title: Missing\n",
        )
        .unwrap();
        fs.write("/map-m1.yml", b"- key: s1\n  type: story\n  title: Story\n").unwrap();
        fs.write("/s1.md", b"story notes").unwrap();

        let hydrated = hydrate(&fs);
        assert_eq!(hydrated.map_trees.len(), 1);
        let map = &hydrated.map_trees["m1"];
        assert_eq!(map.tree[0].notes.as_deref(), Some("story notes"));
        assert_eq!(map.selected_node_key, None);
    }

    #[test]
    fn test_malformed_files_are_reported() {
        let fs = MemoryFileSystem::new();
        fs.write("/specification.yml", b"- key: r1\n  type: folder\n  title: Root\n")
            .unwrap();
        fs.write("/feature-toggles.yml", b"[not: a map").unwrap();

        let hydrated = hydrate(&fs);
        assert_eq!(hydrated.spec_tree.len(), 1);
        assert_eq!(hydrated.errors.len(), 1);
        assert_eq!(hydrated.errors[0].path, FEATURE_TOGGLES_FILE);
    }
}

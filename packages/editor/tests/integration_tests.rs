//! Integration tests for editor crate

use specbook_editor::{
    commands, AppState, EditorError, MapTreesState, SpecAction, SpecTreeState,
    TransactionCoordinator,
};
use specbook_model::tree::find_by_key;
use specbook_model::{NodeType, ValidationError};

fn empty_coordinator() -> TransactionCoordinator {
    TransactionCoordinator::new(
        SpecTreeState::default(),
        MapTreesState::default(),
        AppState::default(),
    )
}

#[test]
fn test_build_tree_with_commands() -> anyhow::Result<()> {
    let mut coordinator = empty_coordinator();

    coordinator.run_transaction(commands::add_node(NodeType::Folder, "Root", Some("r1"), None))?;
    coordinator.run_transaction(commands::add_node(NodeType::Feature, "Login", Some("f1"), Some("r1")))?;

    let feature = find_by_key("f1", &coordinator.spec().tree).cloned().expect("feature exists");
    coordinator.run_transaction(commands::set_notes(&feature, "# Login"))?;

    let tree = &coordinator.spec().tree;
    assert_eq!(tree.len(), 1);
    assert_eq!(tree[0].key, "r1");
    assert_eq!(tree[0].children()[0].key, "f1");
    assert_eq!(tree[0].children()[0].notes.as_deref(), Some("# Login"));
    assert!(coordinator.spec().touched.is_some());
    assert_eq!(coordinator.app().undo_stack.len(), 3);
    assert_eq!(coordinator.undo_description().as_deref(), Some("change document"));
    Ok(())
}

#[test]
fn test_adding_a_map_creates_its_tree() -> anyhow::Result<()> {
    let mut coordinator = empty_coordinator();
    coordinator.run_transaction(commands::add_node(NodeType::Folder, "Root", Some("r1"), None))?;
    coordinator.run_transaction(commands::add_node(NodeType::Feature, "Login", Some("f1"), Some("r1")))?;
    coordinator.run_transaction(commands::add_node(NodeType::Map, "Happy path", Some("m1"), Some("f1")))?;

    let feature = find_by_key("f1", &coordinator.spec().tree).expect("feature exists");
    assert_eq!(feature.children()[0].key, "m1");

    let maps = coordinator.maps();
    assert_eq!(maps.selected_tree_key.as_deref(), Some("m1"));
    assert_eq!(maps.trees["m1"].tree[0].node_type, NodeType::Story);
    assert!(maps.touched.is_some());

    // Undoing the map removes it from both stores
    coordinator.undo()?;
    assert!(find_by_key("m1", &coordinator.spec().tree).is_none());
    assert!(coordinator.maps().trees.is_empty());
    Ok(())
}

#[test]
fn test_untracked_dispatch_is_not_undoable() -> anyhow::Result<()> {
    let mut coordinator = empty_coordinator();
    coordinator.run_transaction(commands::add_node(NodeType::Folder, "Root", Some("r1"), None))?;
    coordinator.dispatch(SpecAction::Touched(None))?;

    assert_eq!(coordinator.spec().touched, None);
    assert_eq!(coordinator.app().undo_stack.len(), 1);
    Ok(())
}

#[test]
fn test_story_key_cannot_be_reused_as_feature() -> anyhow::Result<()> {
    let mut coordinator = empty_coordinator();
    coordinator.run_transaction(commands::add_node(NodeType::Folder, "Root", Some("r1"), None))?;
    coordinator.run_transaction(commands::add_node(NodeType::Feature, "Login", Some("f1"), Some("r1")))?;
    coordinator.run_transaction(commands::add_node(NodeType::Map, "Happy path", Some("m1"), Some("f1")))?;
    coordinator.run_transaction(commands::add_node(NodeType::Story, "Sign in", Some("k1"), None))?;

    let err = coordinator
        .run_transaction(commands::add_node(NodeType::Feature, "Logout", Some("k1"), Some("r1")))
        .unwrap_err();
    assert!(matches!(err, EditorError::Validation(ValidationError::DuplicateKey(ref key)) if key == "k1"));

    // The rejected transaction leaves both trees as they were
    assert!(find_by_key("k1", &coordinator.spec().tree).is_none());
    assert_eq!(coordinator.app().undo_stack.len(), 4);
    Ok(())
}

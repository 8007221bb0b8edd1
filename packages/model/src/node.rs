//! # Tree Nodes
//!
//! Specification trees and example-map trees share one node shape. A node
//! exclusively owns its children; its `key` names it within its tree and
//! doubles as the stem of the files it is persisted to.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed set of node kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    Folder,
    Feature,
    Map,
    Story,
    Rule,
    Example,
    Question,
}

impl NodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Folder => "folder",
            NodeType::Feature => "feature",
            NodeType::Map => "map",
            NodeType::Story => "story",
            NodeType::Rule => "rule",
            NodeType::Example => "example",
            NodeType::Question => "question",
        }
    }

    /// Node kinds that live in the specification tree
    pub fn is_specification(&self) -> bool {
        matches!(self, NodeType::Folder | NodeType::Feature | NodeType::Map)
    }

    /// Node kinds that live in example-map trees
    pub fn is_example_map(&self) -> bool {
        !self.is_specification()
    }

    /// Whether a node of this kind inserted after `target` becomes its child
    /// instead of its sibling.
    pub fn nests_under(&self, target: NodeType) -> bool {
        matches!(
            (self, target),
            (NodeType::Map, NodeType::Feature)
                | (NodeType::Feature, NodeType::Folder)
                | (NodeType::Rule, NodeType::Story)
                | (NodeType::Example, NodeType::Rule)
        )
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tag attached to a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    #[serde(rename = "type")]
    pub tag_type: String,
    pub name: String,
}

impl Tag {
    pub fn text(name: impl Into<String>) -> Self {
        Self {
            tag_type: "text".to_string(),
            name: name.into(),
        }
    }
}

fn default_expanded() -> bool {
    true
}

/// One node of a specification or example-map tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeNode {
    pub key: String,

    #[serde(rename = "type")]
    pub node_type: NodeType,

    #[serde(default)]
    pub title: String,

    /// Display-only, restored to `true` when absent
    #[serde(default = "default_expanded")]
    pub expanded: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<Tag>>,

    /// Markdown document body
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,

    /// Acceptance criteria (feature nodes only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gherkin: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub toggle_state: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conditions: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<TreeNode>>,
}

/// Specification tree node
pub type SpecNode = TreeNode;

/// Example-map tree node
pub type MapNode = TreeNode;

impl TreeNode {
    pub fn new(key: impl Into<String>, node_type: NodeType, title: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            node_type,
            title: title.into(),
            expanded: true,
            tags: None,
            notes: None,
            gherkin: None,
            toggle_state: None,
            conditions: None,
            children: None,
        }
    }

    pub fn with_children(mut self, children: Vec<TreeNode>) -> Self {
        self.children = Some(children);
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn children(&self) -> &[TreeNode] {
        self.children.as_deref().unwrap_or(&[])
    }

    pub fn has_children(&self) -> bool {
        !self.children().is_empty()
    }

    /// Replace one property
    pub fn set(&mut self, property: NodeProperty) {
        match property {
            NodeProperty::Title(v) => self.title = v,
            NodeProperty::Expanded(v) => self.expanded = v,
            NodeProperty::Notes(v) => self.notes = v,
            NodeProperty::Gherkin(v) => self.gherkin = v,
            NodeProperty::Tags(v) => self.tags = Some(v),
            NodeProperty::ToggleState(v) => self.toggle_state = v,
            NodeProperty::Conditions(v) => self.conditions = v,
        }
    }
}

/// A single replaceable node property
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "key", content = "value", rename_all = "camelCase")]
pub enum NodeProperty {
    Title(String),
    Expanded(bool),
    Notes(Option<String>),
    Gherkin(Option<String>),
    Tags(Vec<Tag>),
    ToggleState(Option<String>),
    Conditions(Option<String>),
}

impl NodeProperty {
    pub fn name(&self) -> &'static str {
        match self {
            NodeProperty::Title(_) => "title",
            NodeProperty::Expanded(_) => "expanded",
            NodeProperty::Notes(_) => "notes",
            NodeProperty::Gherkin(_) => "gherkin",
            NodeProperty::Tags(_) => "tags",
            NodeProperty::ToggleState(_) => "toggleState",
            NodeProperty::Conditions(_) => "conditions",
        }
    }
}

/// Optional node fields that a projection may keep
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeField {
    Expanded,
    Tags,
    Notes,
    Gherkin,
    ToggleState,
    Conditions,
}

/// Fields written to structural (`.yml`) files next to key, type and title
pub const STRUCTURAL_FIELDS: &[NodeField] = &[NodeField::Expanded, NodeField::Tags];

/// Feature toggle entry as persisted in `feature-toggles.yml`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureToggle {
    pub title: String,
    pub state: String,
    #[serde(default)]
    pub conditions: String,
}

/// Toggle state that means "off"
pub const TOGGLE_DISABLED: &str = "Disabled";

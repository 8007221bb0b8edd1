//! # Selection Memory
//!
//! Remembers, per repository URL, the last specification node and the last
//! example-map node the user clicked so a reopened session can restore the
//! selection. Values live for the lifetime of the process only.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use specbook_model::NodeType;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionValues {
    pub last_spec_node_key: Option<String>,
    pub last_map_node_key: Option<String>,
}

#[derive(Debug, Default)]
pub struct SelectionMemory {
    values: HashMap<String, SelectionValues>,
}

impl SelectionMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember a click on a node of `node_type`.
    ///
    /// Clicking a map node selects it in the specification tree and forgets
    /// the example-map selection, since a different map is now shown.
    pub fn record_click(&mut self, url: &str, node_type: NodeType, key: &str) {
        let values = self.values.entry(url.to_string()).or_default();
        match node_type {
            NodeType::Map => {
                values.last_spec_node_key = Some(key.to_string());
                values.last_map_node_key = None;
            }
            t if t.is_specification() => values.last_spec_node_key = Some(key.to_string()),
            _ => values.last_map_node_key = Some(key.to_string()),
        }
    }

    pub fn get(&self, url: &str) -> SelectionValues {
        self.values.get(url).cloned().unwrap_or_default()
    }

    pub fn reset(&mut self, url: &str) {
        self.values.remove(url);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const URL: &str = "https://example.com/spec.git";

    #[test]
    fn test_record_by_node_type() {
        let mut memory = SelectionMemory::new();
        memory.record_click(URL, NodeType::Feature, "f1");
        memory.record_click(URL, NodeType::Rule, "r1");

        let values = memory.get(URL);
        assert_eq!(values.last_spec_node_key.as_deref(), Some("f1"));
        assert_eq!(values.last_map_node_key.as_deref(), Some("r1"));

        memory.record_click(URL, NodeType::Map, "m1");
        let values = memory.get(URL);
        assert_eq!(values.last_spec_node_key.as_deref(), Some("m1"));
        assert_eq!(values.last_map_node_key, None);
    }

    #[test]
    fn test_reset_is_per_url() {
        let mut memory = SelectionMemory::new();
        memory.record_click(URL, NodeType::Folder, "a");
        memory.record_click("https://example.com/other.git", NodeType::Folder, "b");
        memory.reset(URL);

        assert_eq!(memory.get(URL), SelectionValues::default());
        assert_eq!(
            memory.get("https://example.com/other.git").last_spec_node_key.as_deref(),
            Some("b")
        );
    }
}

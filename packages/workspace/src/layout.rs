//! Where each part of the document model lives inside a repository.
//!
//! Paths are relative to the repository root, which is how the git engine
//! addresses them; the filesystem images accept them as-is.

/// Structural projection of the specification tree
pub const SPECIFICATION_FILE: &str = "specification.yml";

/// Feature toggles keyed by feature key
pub const FEATURE_TOGGLES_FILE: &str = "feature-toggles.yml";

/// User attachments, committed verbatim
pub const FILES_DIR: &str = "files";

/// The git engine's own directory, never listed as content
pub const GIT_DIR: &str = ".git";

/// Document body of any node
pub fn document_file(key: &str) -> String {
    format!("{}.md", key)
}

/// Acceptance criteria of a feature node
pub fn gherkin_file(key: &str) -> String {
    format!("{}.feature", key)
}

/// Structural projection of one example map
pub fn map_file(key: &str) -> String {
    format!("map-{}.yml", key)
}

pub fn attachment_file(name: &str) -> String {
    format!("{}/{}", FILES_DIR, name)
}

/// Every file that may have been written for a specification node
pub fn spec_node_files(key: &str) -> [String; 3] {
    [document_file(key), map_file(key), gherkin_file(key)]
}

//! # Specbook Model
//!
//! Document model shared by the editor and the repository synchronizer.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ model: trees, keys, patches, config         │
//! │  - Specification and example-map nodes      │
//! │  - Pure tree operations                     │
//! │  - JSON-patch diff / apply                  │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ editor: reducers + transaction coordinator  │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ workspace: git, storage, hydrate, persist   │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use specbook_model::{diff, apply, PatchFilter, TreeNode, NodeType};
//! use serde_json::json;
//!
//! let old = json!({ "title": "Login" });
//! let new = json!({ "title": "Sign in" });
//! let patch = diff(&new, &old, &PatchFilter::default());
//! assert_eq!(apply(&old, &patch).unwrap(), new);
//!
//! let root = TreeNode::new("r1", NodeType::Folder, "Root");
//! assert!(root.expanded);
//! ```

pub mod config;
pub mod error;
pub mod node;
pub mod patch;
pub mod slug;
pub mod tree;

pub use config::{GitProfile, LocalRepository, RepositoryConfig, DEFAULT_PROFILE};
pub use error::{ConfigError, PatchError, TreeError, ValidationError};
pub use node::{
    FeatureToggle, MapNode, NodeField, NodeProperty, NodeType, SpecNode, Tag, TreeNode,
    STRUCTURAL_FIELDS, TOGGLE_DISABLED,
};
pub use patch::{apply, diff, Patch, PatchFilter};

//! Error types for the document model

use thiserror::Error;

/// Structural errors raised by tree operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TreeError {
    #[error("Node not found: {0}")]
    NodeNotFound(String),
}

/// Errors raised while applying a patch
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PatchError {
    /// The target of an operation does not exist in the state. The state has
    /// diverged from the one the patch was computed against.
    #[error("Patch conflict: {0}")]
    Conflict(String),

    #[error("State could not be converted: {0}")]
    Serde(String),
}

impl From<json_patch::PatchError> for PatchError {
    fn from(e: json_patch::PatchError) -> Self {
        PatchError::Conflict(e.to_string())
    }
}

impl From<serde_json::Error> for PatchError {
    fn from(e: serde_json::Error) -> Self {
        PatchError::Serde(e.to_string())
    }
}

/// Validation errors for user-supplied keys and text
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Invalid slug format: {0:?}")]
    InvalidSlug(String),

    #[error("Cannot use reserved word {0:?} for slug")]
    ReservedSlug(String),

    #[error("Slug cannot start with \"map-\": {0:?}")]
    MapPrefix(String),

    #[error("Slug {0:?} is already in use")]
    DuplicateKey(String),

    #[error("Must provide both a title and a slug")]
    MissingTitle,

    #[error("Title is {len} characters long, the limit is {max}")]
    TitleTooLong { len: usize, max: usize },
}

/// Errors resolving repository configuration
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("No local repository is registered for {0}")]
    UnknownRepository(String),

    #[error("No git profile named {0:?} and no Default profile")]
    UnknownProfile(String),
}

//! Error types for the editor

use specbook_model::{PatchError, TreeError, ValidationError};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EditorError {
    #[error("Tree error: {0}")]
    Tree(#[from] TreeError),

    #[error("Patch error: {0}")]
    Patch(#[from] PatchError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("No example map is selected")]
    NoSelectedMap,

    #[error("Unknown example map: {0}")]
    UnknownMap(String),
}

impl EditorError {
    /// The store no longer matches what the caller saw; it should reload
    /// from persisted state.
    pub fn is_structural(&self) -> bool {
        match self {
            EditorError::Tree(_) | EditorError::UnknownMap(_) => true,
            EditorError::Patch(PatchError::Conflict(_)) => true,
            _ => false,
        }
    }
}

pub type EditorResult<T> = Result<T, EditorError>;

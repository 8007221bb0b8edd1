//! Error types for repository synchronization

use specbook_common::FsError;
use specbook_editor::EditorError;
use specbook_model::ConfigError;
use thiserror::Error;

/// Failures reported by a git engine
#[derive(Error, Debug)]
pub enum GitError {
    #[error("Authentication failed for {0}")]
    Auth(String),

    #[error("Could not reach {0}")]
    Network(String),

    #[error("Push to {remote} was rejected: {reason}")]
    Rejected { remote: String, reason: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("No repository has been initialized here")]
    NotInitialized,

    #[error("Repository data is corrupt: {0}")]
    Corrupt(String),

    #[error("Repository image is not backed by a directory")]
    NotOnDisk,

    #[error("Could not sign commit: {0}")]
    Signing(String),

    #[error("Git task failed: {0}")]
    Task(String),

    #[error(transparent)]
    Engine(#[from] git2::Error),

    #[error("Filesystem error: {0}")]
    Fs(#[from] FsError),
}

pub type GitResult<T> = Result<T, GitError>;

/// Failures of durable local storage
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Stored value for {key:?} is corrupt: {reason}")]
    Corrupt { key: String, reason: String },

    #[error("Could not encode value for {key:?}: {reason}")]
    Encode { key: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// A repository file that could not be read during hydration. The file is
/// treated as absent.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Could not load {path}: {reason}")]
pub struct LoadError {
    pub path: String,
    pub reason: String,
}

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Another operation is already running for {0}")]
    Busy(String),

    #[error("Git error: {0}")]
    Git(#[from] GitError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Filesystem error: {0}")]
    Fs(#[from] FsError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Editor error: {0}")]
    Editor(#[from] EditorError),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("Invalid file name: {0:?}")]
    InvalidFileName(String),

    #[error("No local state for {0}; clone or initialize it first")]
    NoLocalState(String),
}

pub type SyncResult<T> = Result<T, SyncError>;

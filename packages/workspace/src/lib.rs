//! # Specbook Workspace
//!
//! Connects the editor to git repositories and to durable local storage.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ EditorSession: coordinator + persisted state │
//! └──────────────────────────────────────────────┘
//!                      ↓ storage
//! ┌──────────────────────────────────────────────┐
//! │ Synchronizer: phase table per URL            │
//! │  - serialize → stage → commit → push         │
//! │  - clone / revert → hydrate                  │
//! └──────────────────────────────────────────────┘
//!                      ↓
//! ┌──────────────────────────────────────────────┐
//! │ GitEngine over one FileSystem image per URL  │
//! └──────────────────────────────────────────────┘
//! ```

pub mod archive;
pub mod attachments;
pub mod editor_session;
pub mod error;
pub mod git;
pub mod hydrate;
pub mod layout;
pub mod serialize;
pub mod storage;
pub mod synchronizer;

pub use attachments::Blob;
pub use editor_session::EditorSession;
pub use error::{GitError, GitResult, LoadError, StorageError, StorageResult, SyncError, SyncResult};
pub use git::{GitEngine, MemoryGit, MemoryRemote, NativeGit};
pub use hydrate::Hydrated;
pub use storage::{FileStore, KeyValueStore, MemoryStore};
pub use synchronizer::{Phase, Synchronizer};

//! # Specbook Editor
//!
//! In-memory editing engine for specification and example-map trees.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ commands: user intent → transaction steps   │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ transaction: one undo step across stores    │
//! │  - Snapshot, dispatch, diff, record         │
//! │  - Roll back every store on failure         │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ stores: spec tree, example maps, app state  │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! ## Core Principles
//!
//! 1. **Reducers are pure**: a store's next state depends only on its
//!    current state and the action
//! 2. **Patches live with their store**: each tree store keeps the undo and
//!    redo patches for its own share of every transaction
//! 3. **One id per user action**: the application store's stacks tie the
//!    per-store patches together
//!
//! ## Usage
//!
//! ```rust,ignore
//! use specbook_editor::{commands, TransactionCoordinator};
//!
//! let mut coordinator = TransactionCoordinator::default();
//! let node = coordinator.spec().tree[0].clone();
//! coordinator.run_transaction(commands::set_notes(&node, "# Login"))?;
//! coordinator.undo()?;
//! ```

pub mod actions;
pub mod app_state;
pub mod commands;
mod errors;
pub mod map_store;
pub mod session;
pub mod spec_store;
pub mod store;
pub mod transaction;

pub use actions::{AppAction, MapAction, NewNode, RenameLedger, SpecAction, TransactionId};
pub use app_state::{AppState, TreeView, TreeViewChange, UndoRedoStackItem};
pub use errors::{EditorError, EditorResult};
pub use map_store::{MapTreeState, MapTreesState};
pub use session::{SelectionMemory, SelectionValues};
pub use spec_store::SpecTreeState;
pub use store::{Reducer, Store};
pub use transaction::{StoreAction, TransactionCoordinator, TransactionStep};

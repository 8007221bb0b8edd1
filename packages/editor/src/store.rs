//! # Stores
//!
//! A [`Store`] holds one piece of state and replaces it wholesale with the
//! output of its reducer. A reducer that fails leaves the store untouched.
//!
//! States that take part in undo/redo implement [`TrackedState`]: they keep
//! their own `undo` and `redo` maps of patches keyed by transaction id.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use specbook_model::patch::{apply, diff, from_value, to_value};
use specbook_model::{Patch, PatchFilter};

use crate::actions::TransactionId;
use crate::errors::EditorResult;

/// Pure state transition
pub trait Reducer: Sized + Clone {
    type Action;

    fn reduce(self, action: Self::Action) -> EditorResult<Self>;
}

/// State with per-transaction undo and redo patches
pub trait TrackedState: Serialize + DeserializeOwned + Clone {
    fn undo_patches(&self) -> &BTreeMap<TransactionId, Patch>;
    fn undo_patches_mut(&mut self) -> &mut BTreeMap<TransactionId, Patch>;
    fn redo_patches(&self) -> &BTreeMap<TransactionId, Patch>;
    fn redo_patches_mut(&mut self) -> &mut BTreeMap<TransactionId, Patch>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum History {
    Undo,
    Redo,
}

/// Record an undo patch; a new undoable change invalidates every redo
pub fn add_undo<S: TrackedState>(mut state: S, id: TransactionId, patch: Patch) -> S {
    state.undo_patches_mut().insert(id, patch);
    state.redo_patches_mut().clear();
    state
}

/// Apply the patch stored under `id` in the `direction` slot.
///
/// The complementary patch, diffed against the result, is stored under the
/// same id in the opposite slot. A missing id leaves the state unchanged.
pub fn step_history<S: TrackedState>(state: S, id: &str, direction: History) -> EditorResult<S> {
    let slot = match direction {
        History::Undo => state.undo_patches(),
        History::Redo => state.redo_patches(),
    };
    let Some(patch) = slot.get(id).cloned() else {
        return Ok(state);
    };

    let current = to_value(&state)?;
    let patched: Value = apply(&current, &patch)?;
    let mut next: S = from_value(patched)?;
    let complement = diff(&current, &to_value(&next)?, &PatchFilter::default());

    match direction {
        History::Undo => {
            next.undo_patches_mut().remove(id);
            next.redo_patches_mut().insert(id.to_string(), complement);
        }
        History::Redo => {
            next.redo_patches_mut().remove(id);
            next.undo_patches_mut().insert(id.to_string(), complement);
        }
    }
    Ok(next)
}

/// Holder of one reducer-driven state
#[derive(Debug, Clone, Default)]
pub struct Store<S> {
    state: S,
}

impl<S: Reducer> Store<S> {
    pub fn new(state: S) -> Self {
        Self { state }
    }

    pub fn state(&self) -> &S {
        &self.state
    }

    /// Run the reducer; on failure the previous state is kept
    pub fn dispatch(&mut self, action: S::Action) -> EditorResult<()> {
        self.state = self.state.clone().reduce(action)?;
        Ok(())
    }

    /// Swap in a state computed elsewhere, returning the previous one
    pub fn replace(&mut self, state: S) -> S {
        std::mem::replace(&mut self.state, state)
    }
}

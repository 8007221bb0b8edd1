//! # Structural Patches
//!
//! Diffs between two snapshots of a store's state and the application of
//! those diffs. Patches are RFC 6902 operation lists (computed and applied
//! by `json-patch`) so they can be persisted alongside the state they
//! describe.
//!
//! ## Direction
//!
//! `diff(new, old)` yields the patch that turns `old` into `new`. Undo
//! patches are therefore computed as `diff(snapshot, current)`.
//!
//! ## Filtering
//!
//! `undo` and `redo` are never part of a patch unless explicitly included,
//! since a patch stored inside `undo` would otherwise describe itself.

use json_patch::PatchOperation;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::PatchError;

/// Top-level keys excluded from every diff by default
pub const BOOKKEEPING_KEYS: &[&str] = &["undo", "redo"];

/// Ordered list of RFC 6902 operations
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Patch(Vec<PatchOperation>);

impl Patch {
    pub fn operations(&self) -> &[PatchOperation] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl From<json_patch::Patch> for Patch {
    fn from(patch: json_patch::Patch) -> Self {
        Patch(patch.0)
    }
}

/// Restricts a diff to some top-level keys
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PatchFilter {
    /// Only these keys are compared
    Include(Vec<String>),
    /// These keys (plus `undo` and `redo`) are ignored
    Exclude(Vec<String>),
}

impl Default for PatchFilter {
    fn default() -> Self {
        PatchFilter::Exclude(Vec::new())
    }
}

impl PatchFilter {
    pub fn include<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        PatchFilter::Include(keys.into_iter().map(Into::into).collect())
    }

    pub fn exclude<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        PatchFilter::Exclude(keys.into_iter().map(Into::into).collect())
    }

    /// Project a state onto the keys this filter admits
    pub fn project(&self, state: &Value) -> Value {
        let Value::Object(map) = state else {
            return state.clone();
        };
        let projected: Map<String, Value> = match self {
            PatchFilter::Include(keys) => map
                .iter()
                .filter(|(k, _)| keys.iter().any(|key| key == *k))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            PatchFilter::Exclude(keys) => map
                .iter()
                .filter(|(k, _)| !BOOKKEEPING_KEYS.contains(&k.as_str()) && !keys.iter().any(|key| key == *k))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        };
        Value::Object(projected)
    }
}

/// Compute the patch that turns `old_state` into `new_state`
pub fn diff(new_state: &Value, old_state: &Value, filter: &PatchFilter) -> Patch {
    json_patch::diff(&filter.project(old_state), &filter.project(new_state)).into()
}

/// Apply a patch to a copy of `state`
pub fn apply(state: &Value, patch: &Patch) -> Result<Value, PatchError> {
    let mut next = state.clone();
    json_patch::patch(&mut next, patch.operations())?;
    Ok(next)
}

/// Convert a typed state into a patchable value
pub fn to_value<T: Serialize>(state: &T) -> Result<Value, PatchError> {
    Ok(serde_json::to_value(state)?)
}

/// Convert a patched value back into a typed state
pub fn from_value<T: DeserializeOwned>(value: Value) -> Result<T, PatchError> {
    Ok(serde_json::from_value(value)?)
}

use serde_json::Value;
use std::collections::HashSet;

use crate::change::DecodedChange;
use crate::error::Result;
use crate::patch::Patch;
use crate::types::{ChangeHash, Heads};

/// What the version-control layer needs from a CRDT document.
///
/// `changes()` is in log order: some topological order consistent with
/// causality, not necessarily identical across replicas.
pub trait DocHistory {
    /// Every change in the document, in log order.
    fn changes(&self) -> &[DecodedChange];

    /// The current causal frontier.
    fn heads(&self) -> Heads;

    fn has_change(&self, hash: &str) -> bool;

    /// All changes reachable from `heads` (inclusive). Unknown hashes are ignored.
    fn ancestors(&self, heads: &[ChangeHash]) -> HashSet<ChangeHash>;

    /// Read-only snapshot of the document at `heads`. Empty heads give the empty document.
    fn view(&self, heads: &[ChangeHash]) -> Result<Value>;

    /// Structural patches turning the state at `from` into the state at `to`.
    fn diff(&self, from: &[ChangeHash], to: &[ChangeHash]) -> Result<Vec<Patch>>;
}

/// Move a causal frontier past `change`: its deps stop being heads, it becomes one.
pub fn advance_frontier(frontier: &mut Heads, change: &DecodedChange) {
    frontier.retain(|h| !change.deps.contains(h));
    if let Err(pos) = frontier.binary_search(&change.hash) {
        frontier.insert(pos, change.hash.clone());
    }
}

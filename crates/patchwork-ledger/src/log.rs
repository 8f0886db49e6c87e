use patchwork_core::{
    advance_frontier, new_actor_id, new_change, normalize_heads, ActorId, ChangeHash,
    ChangeParams, CoreError, DecodedChange, DocHistory, DocUrl, Heads, Op, Patch, Result,
};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::RwLock;

use crate::diff::diff_values;
use crate::materialize::{apply_change, apply_op};

/// Maximum number of historical snapshots kept per document.
const SNAPSHOT_CACHE_MAX_SIZE: usize = 32;

struct CachedSnapshot {
    heads: Heads,
    state: Value,
}

/// Who/when/why for a local change.
#[derive(Debug, Clone, Default)]
pub struct ChangeOptions {
    /// Unix millis; 0 records no time.
    pub time: i64,
    pub author: Option<DocUrl>,
    pub message: Option<String>,
}

impl ChangeOptions {
    /// Options stamped with the current time.
    pub fn now(author: Option<&str>) -> Self {
        Self {
            time: patchwork_core::now_millis(),
            author: author.map(|a| a.to_string()),
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

fn empty_doc() -> Value {
    Value::Object(Map::new())
}

/// One document's causal change log.
///
/// Changes are kept in log order (every change after its deps). The current
/// state is maintained incrementally; older states are rebuilt on demand by
/// replaying the ancestors of the requested heads in log order, and cached.
/// Appending never reorders earlier changes, so a snapshot keyed by heads
/// stays valid for the life of the log.
pub struct DocLog {
    url: DocUrl,
    actor: ActorId,
    changes: Vec<DecodedChange>,
    index: HashMap<ChangeHash, usize>,
    heads: Heads,
    current: Value,
    snapshot_cache: RwLock<VecDeque<CachedSnapshot>>,
}

impl DocLog {
    pub fn new(url: impl Into<DocUrl>) -> Self {
        Self::with_actor(url, new_actor_id())
    }

    pub fn with_actor(url: impl Into<DocUrl>, actor: impl Into<ActorId>) -> Self {
        Self {
            url: url.into(),
            actor: actor.into(),
            changes: Vec::new(),
            index: HashMap::new(),
            heads: Heads::new(),
            current: empty_doc(),
            snapshot_cache: RwLock::new(VecDeque::new()),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn actor(&self) -> &str {
        &self.actor
    }

    /// The current document state.
    pub fn doc(&self) -> &Value {
        &self.current
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn get_change(&self, hash: &str) -> Option<&DecodedChange> {
        self.index.get(hash).map(|&i| &self.changes[i])
    }

    fn next_seq(&self) -> u64 {
        self.changes
            .iter()
            .filter(|c| c.actor == self.actor)
            .map(|c| c.seq)
            .max()
            .unwrap_or(0)
            + 1
    }

    fn push(&mut self, change: DecodedChange, state: Value) {
        advance_frontier(&mut self.heads, &change);
        self.index.insert(change.hash.clone(), self.changes.len());
        self.changes.push(change);
        self.current = state;
    }

    /// Record a local change on top of the current heads.
    ///
    /// Every op must apply cleanly to the current state; otherwise nothing is
    /// recorded and the path error is returned.
    pub fn change(&mut self, opts: &ChangeOptions, ops: Vec<Op>) -> Result<ChangeHash> {
        let mut next = self.current.clone();
        for op in &ops {
            apply_op(&mut next, op)?;
        }
        let change = new_change(ChangeParams {
            actor: &self.actor,
            seq: self.next_seq(),
            deps: self.heads.clone(),
            time: opts.time,
            message: opts.message.as_deref(),
            author: opts.author.as_deref(),
            ops,
        })?;
        let hash = change.hash.clone();
        tracing::debug!(doc = %self.url, change = %hash, "recorded change");
        self.push(change, next);
        Ok(hash)
    }

    /// Add changes received from elsewhere, in any order.
    ///
    /// Known changes are ignored. Changes whose deps are missing are held
    /// back until their deps arrive; whatever is still unresolvable at the
    /// end is reported after everything else has been applied.
    pub fn apply_changes(&mut self, changes: impl IntoIterator<Item = DecodedChange>) -> Result<usize> {
        let mut pending: Vec<DecodedChange> = changes
            .into_iter()
            .filter(|c| !self.index.contains_key(&c.hash))
            .collect();
        let mut applied = 0;
        loop {
            let before = pending.len();
            let mut waiting = Vec::new();
            for change in pending {
                if self.index.contains_key(&change.hash) {
                    continue;
                }
                if change.deps.iter().all(|d| self.index.contains_key(d)) {
                    let mut next = std::mem::take(&mut self.current);
                    apply_change(&mut next, &change);
                    self.push(change, next);
                    applied += 1;
                } else {
                    waiting.push(change);
                }
            }
            pending = waiting;
            if pending.is_empty() || pending.len() == before {
                break;
            }
        }
        if let Some(stuck) = pending.first() {
            let missing = stuck
                .deps
                .iter()
                .find(|d| !self.index.contains_key(*d))
                .cloned()
                .unwrap_or_default();
            return Err(CoreError::MissingDependency {
                change: stuck.hash.clone(),
                missing,
            });
        }
        Ok(applied)
    }

    /// Pull every change `other` has that this log lacks.
    pub fn merge(&mut self, other: &DocLog) -> Result<usize> {
        let incoming: Vec<DecodedChange> = other
            .changes
            .iter()
            .filter(|c| !self.index.contains_key(&c.hash))
            .cloned()
            .collect();
        let n = self.apply_changes(incoming)?;
        tracing::debug!(doc = %self.url, from = %other.url, changes = n, "merged");
        Ok(n)
    }

    /// Copy the full history into a new document with its own actor.
    pub fn fork(&self, url: impl Into<DocUrl>) -> DocLog {
        DocLog {
            url: url.into(),
            actor: new_actor_id(),
            changes: self.changes.clone(),
            index: self.index.clone(),
            heads: self.heads.clone(),
            current: self.current.clone(),
            snapshot_cache: RwLock::new(VecDeque::new()),
        }
    }

    fn cached_snapshot(&self, heads: &[ChangeHash]) -> Option<Value> {
        let cache = self
            .snapshot_cache
            .read()
            .unwrap_or_else(|e| e.into_inner());
        cache
            .iter()
            .find(|s| s.heads == heads)
            .map(|s| s.state.clone())
    }

    fn cache_snapshot(&self, heads: Heads, state: Value) {
        let mut cache = self
            .snapshot_cache
            .write()
            .unwrap_or_else(|e| e.into_inner());
        if cache.iter().any(|s| s.heads == heads) {
            return;
        }
        cache.push_back(CachedSnapshot { heads, state });
        while cache.len() > SNAPSHOT_CACHE_MAX_SIZE {
            cache.pop_front();
        }
    }
}

impl DocHistory for DocLog {
    fn changes(&self) -> &[DecodedChange] {
        &self.changes
    }

    fn heads(&self) -> Heads {
        self.heads.clone()
    }

    fn has_change(&self, hash: &str) -> bool {
        self.index.contains_key(hash)
    }

    fn ancestors(&self, heads: &[ChangeHash]) -> HashSet<ChangeHash> {
        let mut seen = HashSet::new();
        let mut stack: Vec<&str> = heads.iter().map(|h| h.as_str()).collect();
        while let Some(hash) = stack.pop() {
            let Some(&i) = self.index.get(hash) else {
                continue;
            };
            if seen.insert(hash.to_string()) {
                stack.extend(self.changes[i].deps.iter().map(|d| d.as_str()));
            }
        }
        seen
    }

    fn view(&self, heads: &[ChangeHash]) -> Result<Value> {
        let mut heads = heads.to_vec();
        normalize_heads(&mut heads);
        if heads.is_empty() {
            return Ok(empty_doc());
        }
        if let Some(unknown) = heads.iter().find(|h| !self.index.contains_key(*h)) {
            return Err(CoreError::UnknownChange(unknown.clone()));
        }
        if heads == self.heads {
            return Ok(self.current.clone());
        }
        if let Some(state) = self.cached_snapshot(&heads) {
            return Ok(state);
        }

        let keep = self.ancestors(&heads);
        let mut doc = empty_doc();
        for change in self.changes.iter().filter(|c| keep.contains(&c.hash)) {
            apply_change(&mut doc, change);
        }
        self.cache_snapshot(heads, doc.clone());
        Ok(doc)
    }

    fn diff(&self, from: &[ChangeHash], to: &[ChangeHash]) -> Result<Vec<Patch>> {
        let before = self.view(from)?;
        let after = self.view(to)?;
        Ok(diff_values(&before, &after))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use patchwork_core::path;
    use serde_json::json;

    fn put(key: &str, value: Value) -> Vec<Op> {
        vec![Op::Put {
            path: path![key],
            value,
        }]
    }

    fn at(time: i64) -> ChangeOptions {
        ChangeOptions {
            time,
            ..Default::default()
        }
    }

    #[test]
    fn linear_changes_chain_heads() {
        let mut log = DocLog::new("patchwork:doc");
        let a = log.change(&at(1), put("x", json!(1))).unwrap();
        let b = log.change(&at(2), put("x", json!(2))).unwrap();
        assert_eq!(log.heads(), vec![b.clone()]);
        assert_eq!(log.get_change(&b).unwrap().deps, vec![a.clone()]);
        assert_eq!(log.get_change(&b).unwrap().seq, 2);
        assert_eq!(log.doc(), &json!({"x": 2}));
        assert_eq!(log.view(&[a]).unwrap(), json!({"x": 1}));
    }

    #[test]
    fn invalid_op_records_nothing() {
        let mut log = DocLog::new("patchwork:doc");
        log.change(&at(1), put("x", json!("text"))).unwrap();
        let err = log
            .change(
                &at(2),
                vec![Op::Insert {
                    path: path!["x"],
                    index: 0,
                    values: vec![json!(1)],
                }],
            )
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidPath(_)));
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn view_of_empty_heads_is_empty_doc() {
        let mut log = DocLog::new("patchwork:doc");
        log.change(&at(1), put("x", json!(1))).unwrap();
        assert_eq!(log.view(&[]).unwrap(), json!({}));
    }

    #[test]
    fn view_of_unknown_heads_fails() {
        let log = DocLog::new("patchwork:doc");
        assert!(matches!(
            log.view(&["nope".to_string()]),
            Err(CoreError::UnknownChange(h)) if h == "nope"
        ));
    }

    #[test]
    fn repeated_views_are_served_consistently() {
        let mut log = DocLog::new("patchwork:doc");
        let a = log.change(&at(1), put("x", json!(1))).unwrap();
        log.change(&at(2), put("y", json!(2))).unwrap();
        let first = log.view(&[a.clone()]).unwrap();
        log.change(&at(3), put("x", json!(3))).unwrap();
        assert_eq!(log.view(&[a]).unwrap(), first);
    }

    #[test]
    fn fork_and_merge_back() {
        let mut main = DocLog::new("patchwork:main");
        let base = main.change(&at(1), put("title", json!("a"))).unwrap();
        let mut branch = main.fork("patchwork:branch");
        assert_ne!(branch.actor(), main.actor());

        let on_branch = branch.change(&at(2), put("body", json!("b"))).unwrap();
        let on_main = main.change(&at(3), put("title", json!("c"))).unwrap();
        assert_eq!(main.merge(&branch).unwrap(), 1);

        let mut expected = vec![on_branch.clone(), on_main.clone()];
        expected.sort();
        assert_eq!(main.heads(), expected);
        assert_eq!(main.doc(), &json!({"title": "c", "body": "b"}));
        assert!(main.ancestors(&[on_branch]).contains(&base));
        assert!(!main.ancestors(&[on_main]).contains(&branch.heads()[0]));
    }

    #[test]
    fn out_of_order_changes_wait_for_deps() {
        let mut src = DocLog::new("patchwork:src");
        src.change(&at(1), put("a", json!(1))).unwrap();
        src.change(&at(2), put("b", json!(2))).unwrap();
        let mut reversed: Vec<_> = src.changes().to_vec();
        reversed.reverse();

        let mut dst = DocLog::new("patchwork:src");
        assert_eq!(dst.apply_changes(reversed).unwrap(), 2);
        assert_eq!(dst.heads(), src.heads());
        assert_eq!(dst.doc(), src.doc());
    }

    #[test]
    fn missing_dependency_is_reported() {
        let mut src = DocLog::new("patchwork:src");
        src.change(&at(1), put("a", json!(1))).unwrap();
        src.change(&at(2), put("b", json!(2))).unwrap();
        let orphan = src.changes()[1].clone();

        let mut dst = DocLog::new("patchwork:src");
        let err = dst.apply_changes(vec![orphan]).unwrap_err();
        assert!(matches!(err, CoreError::MissingDependency { .. }));
        assert!(dst.is_empty());
    }

    #[test]
    fn diff_between_heads() {
        let mut log = DocLog::new("patchwork:doc");
        let a = log
            .change(
                &at(1),
                vec![Op::Splice {
                    path: path!["content"],
                    index: 0,
                    delete: 0,
                    text: "hello".into(),
                }],
            )
            .unwrap();
        let b = log
            .change(
                &at(2),
                vec![Op::Splice {
                    path: path!["content"],
                    index: 5,
                    delete: 0,
                    text: "!".into(),
                }],
            )
            .unwrap();
        assert_eq!(
            log.diff(&[a], &[b]).unwrap(),
            vec![Patch::Splice {
                path: path!["content", 5usize],
                value: "!".into()
            }]
        );
    }
}

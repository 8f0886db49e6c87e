use patchwork_core::{
    new_doc_url, ChangeHash, DocHistory, DocUrl, Heads, Op, VersionControlMetadata,
};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::lock::{doc_lock_file, FileLock, LockScope};
use crate::log::{ChangeOptions, DocLog};
use crate::paths::WorkspacePaths;
use crate::store::{load_doc, save_doc};

/// Shared handle to one document. Cloning the handle shares the document.
#[derive(Clone)]
pub struct DocHandle {
    url: DocUrl,
    inner: Arc<RwLock<DocLog>>,
}

impl DocHandle {
    fn new(log: DocLog) -> Self {
        Self {
            url: log.url().to_string(),
            inner: Arc::new(RwLock::new(log)),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn read(&self) -> RwLockReadGuard<'_, DocLog> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, DocLog> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Record a local change.
    pub fn change(&self, opts: &ChangeOptions, ops: Vec<Op>) -> anyhow::Result<ChangeHash> {
        Ok(self.write().change(opts, ops)?)
    }

    pub fn doc(&self) -> Value {
        self.read().doc().clone()
    }

    pub fn heads(&self) -> Heads {
        self.read().heads()
    }

    pub fn metadata(&self) -> VersionControlMetadata {
        VersionControlMetadata::from_doc(self.read().doc())
    }
}

/// The set of documents a process works with, optionally backed by a
/// `.patchwork/docs` directory.
#[derive(Default)]
pub struct Repo {
    docs: BTreeMap<DocUrl, DocHandle>,
    removed: BTreeSet<DocUrl>,
    paths: Option<WorkspacePaths>,
}

impl Repo {
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Load every document under `.patchwork/docs`.
    pub fn open(paths: WorkspacePaths) -> anyhow::Result<Self> {
        if !paths.is_initialized() {
            anyhow::bail!(
                "not a patchwork workspace ({}/.patchwork not found). Run `patchwork init` first.",
                paths.root.display()
            );
        }
        let mut repo = Self {
            paths: Some(paths.clone()),
            ..Self::default()
        };
        for entry in std::fs::read_dir(&paths.docs_dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("jsonl") {
                continue;
            }
            let log = load_doc(&path)?;
            repo.docs.insert(log.url().to_string(), DocHandle::new(log));
        }
        tracing::debug!(docs = repo.docs.len(), "opened repo");
        Ok(repo)
    }

    /// Create a new document with empty version-control metadata installed.
    pub fn create(&mut self, opts: &ChangeOptions) -> anyhow::Result<DocHandle> {
        let mut log = DocLog::new(new_doc_url());
        log.change(opts, VersionControlMetadata::init_ops())?;
        Ok(self.insert(log))
    }

    pub fn insert(&mut self, log: DocLog) -> DocHandle {
        let handle = DocHandle::new(log);
        self.removed.remove(handle.url());
        self.docs.insert(handle.url().to_string(), handle.clone());
        handle
    }

    pub fn find(&self, url: &str) -> Option<DocHandle> {
        self.docs.get(url).cloned()
    }

    pub fn get(&self, url: &str) -> anyhow::Result<DocHandle> {
        self.find(url)
            .ok_or_else(|| anyhow::anyhow!("unknown document: {url}"))
    }

    pub fn remove(&mut self, url: &str) -> Option<DocHandle> {
        let handle = self.docs.remove(url)?;
        self.removed.insert(url.to_string());
        Some(handle)
    }

    pub fn urls(&self) -> impl Iterator<Item = &str> {
        self.docs.keys().map(|k| k.as_str())
    }

    /// Write every document back to disk. No-op for in-memory repos.
    pub fn save(&mut self) -> anyhow::Result<()> {
        let Some(paths) = &self.paths else {
            return Ok(());
        };
        for (url, handle) in &self.docs {
            save_doc(&paths.doc_file(url), &handle.read())?;
        }
        for url in std::mem::take(&mut self.removed) {
            let file = paths.doc_file(&url);
            let lock = doc_lock_file(&file);
            let guard = FileLock::exclusive(&lock, LockScope::Document(&url))?;
            if file.exists() {
                std::fs::remove_file(&file)?;
            }
            drop(guard);
            std::fs::remove_file(&lock)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use patchwork_core::path;
    use serde_json::json;

    #[test]
    fn created_docs_carry_metadata() {
        let mut repo = Repo::in_memory();
        let doc = repo.create(&ChangeOptions::default()).unwrap();
        let meta = doc.metadata();
        assert!(meta.branch_metadata.branches.is_empty());
        assert!(meta.branch_metadata.source.is_none());
        assert_eq!(doc.read().len(), 1);
    }

    #[test]
    fn handles_share_state() {
        let mut repo = Repo::in_memory();
        let doc = repo.create(&ChangeOptions::default()).unwrap();
        let other = repo.get(doc.url()).unwrap();
        doc.change(
            &ChangeOptions::default(),
            vec![Op::Put {
                path: path!["title"],
                value: json!("x"),
            }],
        )
        .unwrap();
        assert_eq!(other.doc()["title"], json!("x"));
    }

    #[test]
    fn open_requires_init() {
        let tmp = tempfile::tempdir().unwrap();
        let err = Repo::open(WorkspacePaths::discover(tmp.path()))
            .err()
            .unwrap();
        assert!(err.to_string().contains("patchwork init"));
    }

    #[test]
    fn save_and_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = WorkspacePaths::discover(tmp.path());
        paths.ensure_layout().unwrap();

        let mut repo = Repo::open(paths.clone()).unwrap();
        let keep = repo.create(&ChangeOptions::default()).unwrap();
        let gone = repo.create(&ChangeOptions::default()).unwrap();
        repo.save().unwrap();
        repo.remove(gone.url());
        repo.save().unwrap();

        assert!(!doc_lock_file(&paths.doc_file(gone.url())).exists());
        assert!(doc_lock_file(&paths.doc_file(keep.url())).exists());

        let reopened = Repo::open(paths).unwrap();
        assert_eq!(reopened.urls().collect::<Vec<_>>(), vec![keep.url()]);
        assert_eq!(reopened.get(keep.url()).unwrap().heads(), keep.heads());
    }
}

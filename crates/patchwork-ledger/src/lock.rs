use crate::paths::WorkspacePaths;
use fs2::FileExt;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

/// What a lock file guards. Named in contention errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockScope<'a> {
    /// The whole `.patchwork/` directory.
    Workspace,
    /// One document file, by URL or file name.
    Document(&'a str),
}

impl fmt::Display for LockScope<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockScope::Workspace => f.write_str("the workspace"),
            LockScope::Document(doc) => write!(f, "document {doc}"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Mode {
    Shared,
    Exclusive,
}

/// Advisory, non-blocking lock on a file. Released on drop.
#[derive(Debug)]
pub struct FileLock {
    _file: File,
    path: PathBuf,
}

impl FileLock {
    /// Readers of a document take this; any number may hold it at once.
    pub fn shared(path: &Path, scope: LockScope<'_>) -> anyhow::Result<Self> {
        Self::acquire(path, scope, Mode::Shared)
    }

    /// Writers take this; it excludes every other holder.
    pub fn exclusive(path: &Path, scope: LockScope<'_>) -> anyhow::Result<Self> {
        Self::acquire(path, scope, Mode::Exclusive)
    }

    fn acquire(path: &Path, scope: LockScope<'_>, mode: Mode) -> anyhow::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| anyhow::anyhow!("cannot open lock for {scope} at {}: {e}", path.display()))?;
        let locked = match mode {
            Mode::Shared => FileExt::try_lock_shared(&file),
            Mode::Exclusive => FileExt::try_lock_exclusive(&file),
        };
        locked.map_err(|_| {
            anyhow::anyhow!(
                "{scope} is in use by another patchwork process (lock {})",
                path.display()
            )
        })?;
        tracing::trace!(lock = %path.display(), ?mode, "acquired");
        Ok(Self {
            _file: file,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Lock file guarding a document file: `docs/<id>.lock` beside `docs/<id>.jsonl`.
pub fn doc_lock_file(doc_file: &Path) -> PathBuf {
    doc_file.with_extension("lock")
}

/// Exclusive lock on `.patchwork/LOCK` for a whole CLI session: documents
/// are loaded, changed and written back while it is held.
#[derive(Debug)]
pub struct WorkspaceLock {
    _lock: FileLock,
}

impl WorkspaceLock {
    pub fn acquire(paths: &WorkspacePaths) -> anyhow::Result<Self> {
        Ok(Self {
            _lock: FileLock::exclusive(&paths.lock_file, LockScope::Workspace)?,
        })
    }
}

use std::path::{Path, PathBuf};

/// All well-known paths under `.patchwork/`.
#[derive(Debug, Clone)]
pub struct WorkspacePaths {
    pub root: PathBuf,
    pub patchwork_dir: PathBuf,
    pub docs_dir: PathBuf,
    pub head_file: PathBuf,
    pub config_json: PathBuf,
    pub lock_file: PathBuf,
}

impl WorkspacePaths {
    /// Derive all paths from a workspace root. Pure computation, no I/O.
    pub fn discover(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let patchwork_dir = root.join(".patchwork");
        Self {
            docs_dir: patchwork_dir.join("docs"),
            head_file: patchwork_dir.join("HEAD"),
            config_json: patchwork_dir.join("config.json"),
            lock_file: patchwork_dir.join("LOCK"),
            patchwork_dir,
            root,
        }
    }

    /// Create all required directories. Idempotent.
    pub fn ensure_layout(&self) -> anyhow::Result<()> {
        std::fs::create_dir_all(&self.docs_dir)?;
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.patchwork_dir.is_dir()
    }

    /// Change-log file for a document: `.patchwork/docs/<id>.jsonl`.
    pub fn doc_file(&self, url: &str) -> PathBuf {
        self.docs_dir
            .join(format!("{}.jsonl", patchwork_core::doc_id(url)))
    }

    /// Walk up from `start` looking for a directory containing `.patchwork/`.
    pub fn find_root(start: &Path) -> Option<PathBuf> {
        let mut cur = start.to_path_buf();
        loop {
            if cur.join(".patchwork").is_dir() {
                return Some(cur);
            }
            if !cur.pop() {
                return None;
            }
        }
    }
}

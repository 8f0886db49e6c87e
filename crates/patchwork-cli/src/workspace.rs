use patchwork_derive::{Grouping, GroupingConfig};
use patchwork_ledger::{DocHandle, Repo, WorkspaceLock, WorkspacePaths};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::path::Path;
use std::time::Duration;

// ── Config file ──

/// Read `.patchwork/config.json`. Missing or non-object files read as empty.
pub fn read_config(path: &Path) -> anyhow::Result<Map<String, Value>> {
    if !path.exists() {
        return Ok(Map::new());
    }
    let content = std::fs::read_to_string(path)?;
    match serde_json::from_str(&content)? {
        Value::Object(map) => Ok(map),
        _ => Ok(Map::new()),
    }
}

/// Write `.patchwork/config.json` through a temp file and rename.
pub fn write_config(path: &Path, config: &Map<String, Value>) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(config)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json.as_bytes())?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Typed view of the recognised config keys.
#[derive(Debug, Default, Deserialize)]
pub struct Settings {
    pub author: Option<String>,
    pub grouping: Option<String>,
    pub batch_size: Option<usize>,
    pub max_gap_minutes: Option<u64>,
    #[serde(rename = "summary.endpoint")]
    pub summary_endpoint: Option<String>,
    #[serde(rename = "summary.model")]
    pub summary_model: Option<String>,
    #[serde(rename = "summary.api_key_env")]
    pub summary_api_key_env: Option<String>,
    #[serde(rename = "summary.quiet_ms")]
    pub summary_quiet_ms: Option<u64>,
}

impl Settings {
    pub fn load(paths: &WorkspacePaths) -> anyhow::Result<Self> {
        let map = read_config(&paths.config_json)?;
        serde_json::from_value(Value::Object(map))
            .map_err(|e| anyhow::anyhow!("invalid {}: {e}", paths.config_json.display()))
    }

    /// Grouping from config, with command-line overrides applied on top.
    pub fn grouping(
        &self,
        name: Option<&str>,
        batch_size: Option<usize>,
        max_gap_minutes: Option<u64>,
    ) -> anyhow::Result<Grouping> {
        let mut cfg = GroupingConfig::default();
        if let Some(g) = name.or(self.grouping.as_deref()) {
            cfg.grouping = g.to_string();
        }
        if let Some(n) = batch_size.or(self.batch_size) {
            cfg.batch_size = n;
        }
        if let Some(m) = max_gap_minutes.or(self.max_gap_minutes) {
            cfg.max_gap_minutes = m;
        }
        Ok(Grouping::try_from(&cfg)?)
    }

    /// Delay before a summarization run starts. Unset means none.
    pub fn summary_quiet(&self) -> Duration {
        self.summary_quiet_ms
            .map(Duration::from_millis)
            .unwrap_or(Duration::ZERO)
    }
}

// ── Locked session ──

/// An open workspace: the exclusive lock, every document, and settings.
/// Changes made through `repo` reach disk on [`Workspace::save`].
pub struct Workspace {
    pub paths: WorkspacePaths,
    pub repo: Repo,
    pub settings: Settings,
    _lock: WorkspaceLock,
}

impl Workspace {
    pub fn open(repo_root: &Path) -> anyhow::Result<Self> {
        let paths = WorkspacePaths::discover(repo_root);
        if !paths.is_initialized() {
            anyhow::bail!("No .patchwork/ workspace found. Run `patchwork init` first.");
        }
        let lock = WorkspaceLock::acquire(&paths)?;
        let settings = Settings::load(&paths)?;
        let repo = Repo::open(paths.clone())?;
        Ok(Self {
            paths,
            repo,
            settings,
            _lock: lock,
        })
    }

    pub fn author(&self) -> Option<&str> {
        self.settings.author.as_deref()
    }

    /// URL of the current document, if one has been selected.
    pub fn head_url(&self) -> anyhow::Result<Option<String>> {
        if !self.paths.head_file.exists() {
            return Ok(None);
        }
        let url = std::fs::read_to_string(&self.paths.head_file)?;
        let url = url.trim();
        Ok((!url.is_empty()).then(|| url.to_string()))
    }

    pub fn head(&self) -> anyhow::Result<DocHandle> {
        let Some(url) = self.head_url()? else {
            anyhow::bail!("no current document. Run `patchwork new` or `patchwork use <url>`.");
        };
        self.repo.get(&url)
    }

    pub fn set_head(&self, url: &str) -> anyhow::Result<()> {
        std::fs::write(&self.paths.head_file, format!("{url}\n"))?;
        Ok(())
    }

    pub fn save(&mut self) -> anyhow::Result<()> {
        self.repo.save()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn settings_read_dotted_keys() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = WorkspacePaths::discover(tmp.path());
        paths.ensure_layout().unwrap();
        let mut map = Map::new();
        map.insert("author".into(), json!("patchwork:alice"));
        map.insert("summary.endpoint".into(), json!("http://localhost:1/v1"));
        map.insert("summary.quiet_ms".into(), json!(250));
        map.insert("unrelated".into(), json!(true));
        write_config(&paths.config_json, &map).unwrap();

        let s = Settings::load(&paths).unwrap();
        assert_eq!(s.author.as_deref(), Some("patchwork:alice"));
        assert_eq!(s.summary_endpoint.as_deref(), Some("http://localhost:1/v1"));
        assert_eq!(s.summary_quiet(), Duration::from_millis(250));
    }

    #[test]
    fn flags_override_configured_grouping() {
        let s = Settings {
            grouping: Some("by-number-of-changes".into()),
            batch_size: Some(10),
            ..Settings::default()
        };
        assert_eq!(
            s.grouping(None, None, None).unwrap(),
            Grouping::ByNumberOfChanges { batch_size: 10 }
        );
        assert_eq!(
            s.grouping(None, Some(3), None).unwrap(),
            Grouping::ByNumberOfChanges { batch_size: 3 }
        );
        assert_eq!(
            s.grouping(Some("by-edit-time"), None, Some(5)).unwrap(),
            Grouping::ByEditTime { max_gap_minutes: 5 }
        );
        assert!(s.grouping(Some("hourly"), None, None).is_err());
    }

    #[test]
    fn default_grouping_is_author_or_time() {
        assert_eq!(
            Settings::default().grouping(None, None, None).unwrap(),
            Grouping::ByAuthorOrTime { max_gap_minutes: 60 }
        );
    }

    #[test]
    fn open_requires_init() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(Workspace::open(tmp.path()).is_err());
    }
}

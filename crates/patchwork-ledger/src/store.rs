use patchwork_core::{decode_change, encode_change, DocHistory};
use serde::{Deserialize, Serialize};
use std::io::{BufRead, Write};
use std::path::Path;

use crate::lock::{doc_lock_file, FileLock, LockScope};
use crate::log::DocLog;

/// First line of a document file.
#[derive(Debug, Serialize, Deserialize)]
struct DocHeader {
    url: String,
    actor: String,
}

/// Write a document's full change log as JSONL: a header line, then one
/// encoded change per line in log order. Written to a sibling temp file
/// and renamed into place under the document's exclusive lock.
pub fn save_doc(path: &Path, log: &DocLog) -> anyhow::Result<()> {
    let _lock = FileLock::exclusive(&doc_lock_file(path), LockScope::Document(log.url()))?;
    let tmp = path.with_extension("jsonl.tmp");
    {
        let mut file = std::io::BufWriter::new(std::fs::File::create(&tmp)?);
        let header = DocHeader {
            url: log.url().to_string(),
            actor: log.actor().to_string(),
        };
        writeln!(file, "{}", serde_json::to_string(&header)?)?;
        for change in log.changes() {
            file.write_all(&encode_change(change)?)?;
            file.write_all(b"\n")?;
        }
        file.flush()?;
    }
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Load a document file. Lines that fail to decode (bad JSON, bad author,
/// hash mismatch) are skipped with a warning, as are changes left without
/// their deps as a result.
pub fn load_doc(path: &Path) -> anyhow::Result<DocLog> {
    let name = path.display().to_string();
    let _lock = FileLock::shared(&doc_lock_file(path), LockScope::Document(&name))?;
    let file = std::fs::File::open(path)
        .map_err(|e| anyhow::anyhow!("cannot open {}: {e}", path.display()))?;
    let mut lines = std::io::BufReader::new(file).lines();

    let header_line = lines
        .next()
        .ok_or_else(|| anyhow::anyhow!("empty document file {}", path.display()))??;
    let header: DocHeader = serde_json::from_str(&header_line)
        .map_err(|e| anyhow::anyhow!("bad header in {}: {e}", path.display()))?;

    let mut changes = Vec::new();
    for (n, line) in lines.enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match decode_change(line.as_bytes()) {
            Ok(c) => changes.push(c),
            Err(e) => tracing::warn!(file = %path.display(), line = n + 2, error = %e, "skipping undecodable change"),
        }
    }

    let mut log = DocLog::with_actor(header.url, header.actor);
    if let Err(e) = log.apply_changes(changes) {
        tracing::warn!(doc = %log.url(), error = %e, "some changes could not be attached");
    }
    Ok(log)
}

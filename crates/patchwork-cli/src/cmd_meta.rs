use patchwork_ledger::{add_comment, create_tag, resolve_discussion, start_discussion};
use serde_json::json;
use std::path::Path;

use crate::workspace::Workspace;

/// `patchwork tag <name>`
pub fn tag(repo_root: &Path, name: &str) -> anyhow::Result<()> {
    let mut ws = Workspace::open(repo_root)?;
    let doc = ws.head()?;
    let tag = create_tag(&doc, name, ws.author())?;
    ws.save()?;
    println!("Tagged {} as {name}", tag.heads.join(","));
    Ok(())
}

/// Parse an essay range anchor written as `FROM..TO`.
fn parse_range(s: &str) -> anyhow::Result<serde_json::Value> {
    let (from, to) = s
        .split_once("..")
        .ok_or_else(|| anyhow::anyhow!("expected FROM..TO, got {s}"))?;
    let from: usize = from.trim().parse()?;
    let to: usize = to.trim().parse()?;
    if from > to {
        anyhow::bail!("range start {from} is after its end {to}");
    }
    Ok(json!({"from": from, "to": to}))
}

/// `patchwork comment <text> [--reply <id>] [--range FROM..TO]`
pub fn comment(
    repo_root: &Path,
    text: &str,
    reply_to: Option<&str>,
    range: Option<&str>,
) -> anyhow::Result<()> {
    let mut ws = Workspace::open(repo_root)?;
    let doc = ws.head()?;
    match reply_to {
        Some(id) => {
            if range.is_some() {
                anyhow::bail!("--range only applies to a new discussion");
            }
            add_comment(&doc, id, text, ws.author())?;
            ws.save()?;
            println!("Replied to {id}");
        }
        None => {
            let anchors = range.map(parse_range).transpose()?.into_iter().collect();
            let discussion = start_discussion(&doc, text, anchors, ws.author())?;
            ws.save()?;
            println!("Started discussion {}", discussion.id);
        }
    }
    Ok(())
}

/// `patchwork resolve <discussion-id>`
pub fn resolve(repo_root: &Path, id: &str) -> anyhow::Result<()> {
    let mut ws = Workspace::open(repo_root)?;
    let doc = ws.head()?;
    if resolve_discussion(&doc, id, ws.author())? {
        ws.save()?;
        println!("Resolved {id}");
    } else {
        println!("{id} was already resolved");
    }
    Ok(())
}

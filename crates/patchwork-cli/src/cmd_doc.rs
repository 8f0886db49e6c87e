use patchwork_core::{path, Op};
use patchwork_derive::ESSAY_CONTENT as CONTENT;
use patchwork_ledger::ChangeOptions;
use serde_json::Value;
use std::path::Path;

use crate::workspace::Workspace;

fn content_len(doc: &Value) -> usize {
    doc.get(CONTENT)
        .and_then(Value::as_str)
        .map_or(0, |s| s.chars().count())
}

/// `patchwork new [--content <text>]`
pub fn new(repo_root: &Path, content: Option<&str>) -> anyhow::Result<()> {
    let mut ws = Workspace::open(repo_root)?;
    let opts = ChangeOptions::now(ws.author());
    let handle = ws.repo.create(&opts)?;
    if let Some(text) = content {
        handle.change(
            &opts,
            vec![Op::Put {
                path: path![CONTENT],
                value: Value::String(text.to_string()),
            }],
        )?;
    }
    ws.set_head(handle.url())?;
    ws.save()?;
    println!("{}", handle.url());
    Ok(())
}

/// `patchwork use <url>`
pub fn switch(repo_root: &Path, url: &str) -> anyhow::Result<()> {
    let ws = Workspace::open(repo_root)?;
    let handle = ws.repo.get(url)?;
    ws.set_head(handle.url())?;
    println!("Now on {url}");
    Ok(())
}

/// `patchwork write <text>`: replace the whole content.
pub fn write(repo_root: &Path, text: &str) -> anyhow::Result<()> {
    edit(repo_root, |_| Op::Put {
        path: path![CONTENT],
        value: Value::String(text.to_string()),
    })
}

/// `patchwork append <text>`
pub fn append(repo_root: &Path, text: &str) -> anyhow::Result<()> {
    edit(repo_root, |doc| Op::Splice {
        path: path![CONTENT],
        index: content_len(doc),
        delete: 0,
        text: text.to_string(),
    })
}

/// `patchwork splice <index> <delete> [text]`
pub fn splice(repo_root: &Path, index: usize, delete: usize, text: &str) -> anyhow::Result<()> {
    let mut ws = Workspace::open(repo_root)?;
    let handle = ws.head()?;
    let len = content_len(&handle.doc());
    if index > len || index.saturating_add(delete) > len {
        anyhow::bail!("range {index}..{} is outside the content (length {len})", index + delete);
    }
    handle.change(
        &ChangeOptions::now(ws.author()),
        vec![Op::Splice {
            path: path![CONTENT],
            index,
            delete,
            text: text.to_string(),
        }],
    )?;
    ws.save()
}

fn edit(repo_root: &Path, op: impl FnOnce(&Value) -> Op) -> anyhow::Result<()> {
    let mut ws = Workspace::open(repo_root)?;
    let handle = ws.head()?;
    let op = op(&handle.doc());
    let hash = handle.change(&ChangeOptions::now(ws.author()), vec![op])?;
    tracing::debug!(doc = %handle.url(), change = %hash, "edited content");
    ws.save()
}

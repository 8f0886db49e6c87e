use clap::Subcommand;
use patchwork_core::VersionControlMetadata;
use patchwork_ledger::{create_branch, delete_branch, merge_branch, rebase_branch, rename_branch};
use std::path::Path;

use crate::workspace::Workspace;

// ── CLI Schema ──

#[derive(Subcommand)]
pub enum BranchCmd {
    /// Fork the current document into a new branch
    Create {
        /// Branch name
        name: String,
    },
    /// List branches of the current document
    List,
    /// Merge a branch into the current document
    Merge {
        /// Branch URL or name
        branch: String,
    },
    /// Delete an unmerged branch of the current document
    Delete {
        /// Branch URL or name
        branch: String,
    },
    /// Rename a branch of the current document
    Rename {
        /// Branch URL or name
        branch: String,
        /// New name
        name: String,
    },
    /// Bring a branch up to date with its parent
    Rebase {
        /// Branch URL or name
        branch: String,
    },
}

// ── Dispatch ──

pub fn run(cmd: BranchCmd, repo_root: &Path) -> anyhow::Result<()> {
    let mut ws = Workspace::open(repo_root)?;
    match cmd {
        BranchCmd::Create { name } => create(&mut ws, &name),
        BranchCmd::List => list(&ws),
        BranchCmd::Merge { branch } => merge(&mut ws, &branch),
        BranchCmd::Delete { branch } => delete(&mut ws, &branch),
        BranchCmd::Rename { branch, name } => rename(&mut ws, &branch, &name),
        BranchCmd::Rebase { branch } => rebase(&mut ws, &branch),
    }
}

/// Accept a branch URL, or the name of an open branch.
fn resolve_branch(meta: &VersionControlMetadata, arg: &str) -> anyhow::Result<String> {
    let branches = &meta.branch_metadata.branches;
    if let Some(b) = branches.iter().find(|b| b.url == arg) {
        return Ok(b.url.clone());
    }
    branches
        .iter()
        .find(|b| b.name == arg && !b.is_merged())
        .map(|b| b.url.clone())
        .ok_or_else(|| anyhow::anyhow!("no branch named {arg}"))
}

// ── Command Implementations ──

fn create(ws: &mut Workspace, name: &str) -> anyhow::Result<()> {
    let parent = ws.head()?;
    let author = ws.settings.author.clone();
    let branch = create_branch(&mut ws.repo, parent.url(), name, author.as_deref())?;
    ws.save()?;
    println!("Created branch {name} at {}", branch.url());
    println!("  switch to it with `patchwork use {}`", branch.url());
    Ok(())
}

fn list(ws: &Workspace) -> anyhow::Result<()> {
    let meta = ws.head()?.metadata();
    if let Some(source) = &meta.branch_metadata.source {
        println!("branch of {}", source.url);
    }
    if meta.branch_metadata.branches.is_empty() {
        println!("(no branches)");
        return Ok(());
    }
    for b in &meta.branch_metadata.branches {
        let state = if b.is_merged() { "merged" } else { "open" };
        println!("{:<7} {:<24} {}", state, b.name, b.url);
    }
    Ok(())
}

fn merge(ws: &mut Workspace, arg: &str) -> anyhow::Result<()> {
    let parent = ws.head()?;
    let branch = resolve_branch(&parent.metadata(), arg)?;
    let author = ws.settings.author.clone();
    let merged = merge_branch(&mut ws.repo, parent.url(), &branch, author.as_deref())?;
    ws.save()?;
    println!("Merged {branch} ({} head(s))", merged.merge_heads.len());
    Ok(())
}

fn delete(ws: &mut Workspace, arg: &str) -> anyhow::Result<()> {
    let parent = ws.head()?;
    let branch = resolve_branch(&parent.metadata(), arg)?;
    let author = ws.settings.author.clone();
    delete_branch(&mut ws.repo, parent.url(), &branch, author.as_deref())?;
    ws.save()?;
    println!("Deleted {branch}");
    Ok(())
}

fn rename(ws: &mut Workspace, arg: &str, name: &str) -> anyhow::Result<()> {
    let parent = ws.head()?;
    let branch = resolve_branch(&parent.metadata(), arg)?;
    let author = ws.settings.author.clone();
    rename_branch(&mut ws.repo, parent.url(), &branch, name, author.as_deref())?;
    ws.save()?;
    println!("Renamed {branch} to {name}");
    Ok(())
}

fn rebase(ws: &mut Workspace, arg: &str) -> anyhow::Result<()> {
    // From the parent a name works; from anywhere a URL does.
    let branch = match ws.head() {
        Ok(head) => resolve_branch(&head.metadata(), arg).unwrap_or_else(|_| arg.to_string()),
        Err(_) => arg.to_string(),
    };
    let author = ws.settings.author.clone();
    let heads = rebase_branch(&mut ws.repo, &branch, author.as_deref())?;
    ws.save()?;
    println!("Rebased {branch} onto {}", heads.join(","));
    Ok(())
}

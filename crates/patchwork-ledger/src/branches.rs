//! Branch lifecycle: create, merge, rebase, rename, delete.
//!
//! A branch is a forked clone document. The parent records it in
//! `branchMetadata.branches`; the clone records where it came from in
//! `branchMetadata.source`. Both are ordinary changes.

use patchwork_core::meta::fields::{BRANCHES, BRANCH_METADATA, SOURCE};
use patchwork_core::{new_doc_url, path, Branch, BranchSource, Heads, MergeMetadata, Op};
use serde_json::Value;

use crate::log::ChangeOptions;
use crate::repo::{DocHandle, Repo};

fn validate_branch_name(name: &str) -> anyhow::Result<()> {
    if name.trim().is_empty() || name.chars().count() > 64 {
        anyhow::bail!("invalid branch name: must be 1-64 characters");
    }
    if name.chars().any(|c| c.is_control()) {
        anyhow::bail!("invalid branch name: control characters not allowed");
    }
    Ok(())
}

fn raw_branches(doc: &Value) -> &[Value] {
    doc.get(BRANCH_METADATA)
        .and_then(|bm| bm.get(BRANCHES))
        .and_then(|b| b.as_array())
        .map(|v| v.as_slice())
        .unwrap_or(&[])
}

/// Position of a branch record in the stored list (malformed entries included).
fn raw_branch_index(doc: &Value, url: &str) -> Option<usize> {
    raw_branches(doc)
        .iter()
        .position(|b| b.get("url").and_then(|u| u.as_str()) == Some(url))
}

fn branch_position(parent: &DocHandle, branch_url: &str) -> anyhow::Result<usize> {
    raw_branch_index(&parent.doc(), branch_url).ok_or_else(|| {
        anyhow::anyhow!("{branch_url} is not a branch of {}", parent.url())
    })
}

/// Fork `parent_url` into a new clone document and record it as a branch.
pub fn create_branch(
    repo: &mut Repo,
    parent_url: &str,
    name: &str,
    created_by: Option<&str>,
) -> anyhow::Result<DocHandle> {
    validate_branch_name(name)?;
    let parent = repo.get(parent_url)?;
    let meta = parent.metadata();
    if meta
        .branch_metadata
        .branches
        .iter()
        .any(|b| b.name == name && !b.is_merged())
    {
        anyhow::bail!("branch already exists: {name}");
    }

    let opts = ChangeOptions::now(created_by);
    let branch_heads = parent.heads();
    let clone = parent.read().fork(new_doc_url());
    let handle = repo.insert(clone);

    let source = BranchSource {
        url: parent_url.to_string(),
        branch_heads: branch_heads.clone(),
    };
    handle.change(
        &opts.clone().with_message(format!("branch {name}")),
        vec![Op::Put {
            path: path![BRANCH_METADATA, SOURCE],
            value: serde_json::to_value(&source)?,
        }],
    )?;

    let record = Branch {
        name: name.to_string(),
        url: handle.url().to_string(),
        created_at: opts.time,
        branch_heads,
        created_by: created_by.map(|s| s.to_string()),
        merge_metadata: None,
    };
    parent.change(
        &opts,
        vec![Op::Insert {
            path: path![BRANCH_METADATA, BRANCHES],
            index: raw_branches(&parent.doc()).len(),
            values: vec![serde_json::to_value(&record)?],
        }],
    )?;

    tracing::info!(parent = parent_url, branch = %handle.url(), name, "created branch");
    Ok(handle)
}

/// Merge a branch's changes into its parent and close the branch.
pub fn merge_branch(
    repo: &mut Repo,
    parent_url: &str,
    branch_url: &str,
    merged_by: Option<&str>,
) -> anyhow::Result<MergeMetadata> {
    if parent_url == branch_url {
        anyhow::bail!("cannot merge a document into itself");
    }
    let parent = repo.get(parent_url)?;
    let branch = repo.get(branch_url)?;
    branch_position(&parent, branch_url)?;
    if parent
        .metadata()
        .branch(branch_url)
        .is_some_and(|b| b.is_merged())
    {
        anyhow::bail!("branch already merged: {branch_url}");
    }

    let source_before = parent
        .doc()
        .get(BRANCH_METADATA)
        .and_then(|bm| bm.get(SOURCE))
        .cloned()
        .unwrap_or(Value::Null);
    let merge_heads = branch.heads();
    let base_heads = branch
        .metadata()
        .branch_metadata
        .source
        .map(|s| s.branch_heads);

    parent.write().merge(&branch.read())?;

    let opts = ChangeOptions::now(merged_by);
    let metadata = MergeMetadata {
        merged_at: opts.time,
        merge_heads,
        merged_by: merged_by.map(|s| s.to_string()),
        base_heads,
    };
    let idx = branch_position(&parent, branch_url)?;
    let mut ops = vec![Op::Put {
        path: path![BRANCH_METADATA, BRANCHES, idx, "mergeMetadata"],
        value: serde_json::to_value(&metadata)?,
    }];
    // The clone's own `source` record came along with its changes.
    let source_after = parent
        .doc()
        .get(BRANCH_METADATA)
        .and_then(|bm| bm.get(SOURCE))
        .cloned()
        .unwrap_or(Value::Null);
    if source_after != source_before {
        ops.push(Op::Put {
            path: path![BRANCH_METADATA, SOURCE],
            value: source_before,
        });
    }
    parent.change(&opts, ops)?;

    tracing::info!(parent = parent_url, branch = branch_url, "merged branch");
    Ok(metadata)
}

/// Bring a branch up to date with its parent and move its fork point.
pub fn rebase_branch(repo: &mut Repo, branch_url: &str, by: Option<&str>) -> anyhow::Result<Heads> {
    let branch = repo.get(branch_url)?;
    let Some(source) = branch.metadata().branch_metadata.source else {
        anyhow::bail!("{branch_url} is not a branch");
    };
    let parent = repo.get(&source.url)?;
    if parent
        .metadata()
        .branch(branch_url)
        .is_some_and(|b| b.is_merged())
    {
        anyhow::bail!("cannot rebase a merged branch: {branch_url}");
    }

    branch.write().merge(&parent.read())?;
    let heads = parent.heads();
    let moved = BranchSource {
        url: source.url.clone(),
        branch_heads: heads.clone(),
    };
    branch.change(
        &ChangeOptions::now(by).with_message("rebase"),
        vec![Op::Put {
            path: path![BRANCH_METADATA, SOURCE],
            value: serde_json::to_value(&moved)?,
        }],
    )?;
    tracing::info!(branch = branch_url, parent = %source.url, "rebased branch");
    Ok(heads)
}

pub fn rename_branch(
    repo: &mut Repo,
    parent_url: &str,
    branch_url: &str,
    new_name: &str,
    by: Option<&str>,
) -> anyhow::Result<()> {
    validate_branch_name(new_name)?;
    let parent = repo.get(parent_url)?;
    let idx = branch_position(&parent, branch_url)?;
    parent.change(
        &ChangeOptions::now(by),
        vec![Op::Put {
            path: path![BRANCH_METADATA, BRANCHES, idx, "name"],
            value: Value::String(new_name.to_string()),
        }],
    )?;
    Ok(())
}

/// Drop an open branch: remove its record from the parent and its clone
/// from the repo. Merged branches are part of the parent's history and
/// cannot be deleted.
pub fn delete_branch(
    repo: &mut Repo,
    parent_url: &str,
    branch_url: &str,
    by: Option<&str>,
) -> anyhow::Result<()> {
    let parent = repo.get(parent_url)?;
    let idx = branch_position(&parent, branch_url)?;
    if parent
        .metadata()
        .branch(branch_url)
        .is_some_and(|b| b.is_merged())
    {
        anyhow::bail!("cannot delete a merged branch: {branch_url}");
    }
    parent.change(
        &ChangeOptions::now(by),
        vec![Op::Delete {
            path: path![BRANCH_METADATA, BRANCHES, idx],
        }],
    )?;
    repo.remove(branch_url);
    tracing::info!(parent = parent_url, branch = branch_url, "deleted branch");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use patchwork_core::{DocHistory, VersionControlMetadata};
    use serde_json::json;

    fn setup() -> (Repo, DocHandle) {
        let mut repo = Repo::in_memory();
        let main = repo.create(&ChangeOptions::default()).unwrap();
        main.change(
            &ChangeOptions::default(),
            vec![Op::Put {
                path: path!["content"],
                value: json!("hello"),
            }],
        )
        .unwrap();
        (repo, main)
    }

    fn edit(doc: &DocHandle, text: &str) {
        let len = doc.doc()["content"].as_str().unwrap().chars().count();
        doc.change(
            &ChangeOptions::default(),
            vec![Op::Splice {
                path: path!["content"],
                index: len,
                delete: 0,
                text: text.into(),
            }],
        )
        .unwrap();
    }

    #[test]
    fn create_records_both_sides() {
        let (mut repo, main) = setup();
        let fork_heads = main.heads();
        let branch = create_branch(&mut repo, main.url(), "draft", Some("patchwork:alice")).unwrap();

        let rec = main.metadata().branch(branch.url()).cloned().unwrap();
        assert_eq!(rec.name, "draft");
        assert_eq!(rec.branch_heads, fork_heads);
        assert_eq!(rec.created_by.as_deref(), Some("patchwork:alice"));

        let source = branch.metadata().branch_metadata.source.unwrap();
        assert_eq!(source.url, main.url());
        assert_eq!(source.branch_heads, fork_heads);
        assert_eq!(branch.doc()["content"], json!("hello"));
    }

    #[test]
    fn duplicate_open_branch_name_is_rejected() {
        let (mut repo, main) = setup();
        create_branch(&mut repo, main.url(), "draft", None).unwrap();
        assert!(create_branch(&mut repo, main.url(), "draft", None).is_err());
        assert!(create_branch(&mut repo, main.url(), "", None).is_err());
    }

    #[test]
    fn merge_pulls_changes_and_keeps_parent_source() {
        let (mut repo, main) = setup();
        let branch = create_branch(&mut repo, main.url(), "draft", None).unwrap();
        edit(&branch, " world");
        let branch_heads = branch.heads();

        let mm = merge_branch(&mut repo, main.url(), branch.url(), Some("patchwork:bob")).unwrap();
        assert_eq!(mm.merge_heads, branch_heads);
        assert!(mm.base_heads.is_some());

        let doc = main.doc();
        assert_eq!(doc["content"], json!("hello world"));
        let meta = VersionControlMetadata::from_doc(&doc);
        assert!(meta.branch_metadata.source.is_none());
        assert_eq!(
            meta.branch(branch.url()).unwrap().merge_metadata.as_ref(),
            Some(&mm)
        );
        assert!(main.read().has_change(&branch_heads[0]));

        assert!(merge_branch(&mut repo, main.url(), branch.url(), None).is_err());
    }

    #[test]
    fn rebase_moves_fork_point() {
        let (mut repo, main) = setup();
        let branch = create_branch(&mut repo, main.url(), "draft", None).unwrap();
        edit(&main, "!");
        let heads = rebase_branch(&mut repo, branch.url(), None).unwrap();
        assert_eq!(heads, main.heads());
        let source = branch.metadata().branch_metadata.source.unwrap();
        assert_eq!(source.branch_heads, heads);
        assert_eq!(branch.doc()["content"], json!("hello!"));
    }

    #[test]
    fn rename_and_delete() {
        let (mut repo, main) = setup();
        let branch = create_branch(&mut repo, main.url(), "draft", None).unwrap();
        rename_branch(&mut repo, main.url(), branch.url(), "final", None).unwrap();
        assert_eq!(main.metadata().branch(branch.url()).unwrap().name, "final");

        delete_branch(&mut repo, main.url(), branch.url(), None).unwrap();
        assert!(main.metadata().branch_metadata.branches.is_empty());
        assert!(repo.find(branch.url()).is_none());
    }

    #[test]
    fn merged_branch_cannot_be_deleted() {
        let (mut repo, main) = setup();
        let branch = create_branch(&mut repo, main.url(), "draft", None).unwrap();
        merge_branch(&mut repo, main.url(), branch.url(), None).unwrap();
        assert!(delete_branch(&mut repo, main.url(), branch.url(), None).is_err());
    }
}

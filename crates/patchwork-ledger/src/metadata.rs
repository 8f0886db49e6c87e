//! Tags, discussions and persisted change-group summaries.

use patchwork_core::meta::fields::{CHANGE_GROUP_SUMMARIES, DISCUSSIONS, TAGS};
use patchwork_core::{path, ChangeGroupSummary, Discussion, DiscussionComment, Op, Tag};
use serde_json::Value;

use crate::log::ChangeOptions;
use crate::repo::DocHandle;

fn new_id() -> String {
    ulid::Ulid::new().to_string().to_lowercase()
}

/// Tag the document's current heads.
pub fn create_tag(doc: &DocHandle, name: &str, created_by: Option<&str>) -> anyhow::Result<Tag> {
    if name.trim().is_empty() {
        anyhow::bail!("tag name must not be empty");
    }
    let heads = doc.heads();
    if heads.is_empty() {
        anyhow::bail!("cannot tag an empty document");
    }
    let opts = ChangeOptions::now(created_by);
    let tag = Tag {
        name: name.to_string(),
        heads,
        created_at: opts.time,
        created_by: created_by.map(|s| s.to_string()),
    };
    let index = doc
        .doc()
        .get(TAGS)
        .and_then(|t| t.as_array())
        .map_or(0, |t| t.len());
    doc.change(
        &opts,
        vec![Op::Insert {
            path: path![TAGS],
            index,
            values: vec![serde_json::to_value(&tag)?],
        }],
    )?;
    tracing::info!(doc = %doc.url(), tag = name, "created tag");
    Ok(tag)
}

/// Open a discussion at the current heads with a first comment.
/// Empty `anchors` makes it a general comment on the whole document.
pub fn start_discussion(
    doc: &DocHandle,
    content: &str,
    anchors: Vec<Value>,
    contact: Option<&str>,
) -> anyhow::Result<Discussion> {
    let opts = ChangeOptions::now(contact);
    let discussion = Discussion {
        id: new_id(),
        heads: doc.heads(),
        resolved: false,
        comments: vec![DiscussionComment {
            id: new_id(),
            content: content.to_string(),
            contact_url: contact.map(|s| s.to_string()),
            timestamp: opts.time,
        }],
        anchors,
    };
    doc.change(
        &opts,
        vec![Op::Put {
            path: path![DISCUSSIONS, discussion.id.as_str()],
            value: serde_json::to_value(&discussion)?,
        }],
    )?;
    Ok(discussion)
}

pub fn add_comment(
    doc: &DocHandle,
    discussion_id: &str,
    content: &str,
    contact: Option<&str>,
) -> anyhow::Result<DiscussionComment> {
    let meta = doc.metadata();
    let Some(discussion) = meta.discussions.get(discussion_id) else {
        anyhow::bail!("unknown discussion: {discussion_id}");
    };
    let opts = ChangeOptions::now(contact);
    let comment = DiscussionComment {
        id: new_id(),
        content: content.to_string(),
        contact_url: contact.map(|s| s.to_string()),
        timestamp: opts.time,
    };
    doc.change(
        &opts,
        vec![Op::Insert {
            path: path![DISCUSSIONS, discussion_id, "comments"],
            index: discussion.comments.len(),
            values: vec![serde_json::to_value(&comment)?],
        }],
    )?;
    Ok(comment)
}

/// Mark a discussion resolved. Returns false if it already was.
pub fn resolve_discussion(
    doc: &DocHandle,
    discussion_id: &str,
    by: Option<&str>,
) -> anyhow::Result<bool> {
    let meta = doc.metadata();
    let Some(discussion) = meta.discussions.get(discussion_id) else {
        anyhow::bail!("unknown discussion: {discussion_id}");
    };
    if discussion.resolved {
        return Ok(false);
    }
    doc.change(
        &ChangeOptions::now(by),
        vec![Op::Put {
            path: path![DISCUSSIONS, discussion_id, "resolved"],
            value: Value::Bool(true),
        }],
    )?;
    Ok(true)
}

/// Persist a title for a change group.
pub fn set_change_group_summary(doc: &DocHandle, group_id: &str, title: &str) -> anyhow::Result<()> {
    let summary = ChangeGroupSummary {
        title: title.to_string(),
    };
    doc.change(
        &ChangeOptions::now(None).with_message("summarize"),
        vec![Op::Put {
            path: path![CHANGE_GROUP_SUMMARIES, group_id],
            value: serde_json::to_value(&summary)?,
        }],
    )?;
    Ok(())
}

//! Version-control metadata stored inside every document: branches, tags,
//! discussions and persisted change-group summaries.
//!
//! These records live in the document itself and are only ever changed
//! through ordinary changes, so they sync like any other content.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;

use crate::patch::Op;
use crate::path;
use crate::types::{DocUrl, Heads};

/// Top-level document keys owned by the version-control layer.
pub mod fields {
    pub const BRANCH_METADATA: &str = "branchMetadata";
    pub const BRANCHES: &str = "branches";
    pub const SOURCE: &str = "source";
    pub const TAGS: &str = "tags";
    pub const DISCUSSIONS: &str = "discussions";
    pub const CHANGE_GROUP_SUMMARIES: &str = "changeGroupSummaries";
}

/// Written once when a branch is merged; never modified afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeMetadata {
    pub merged_at: i64,
    /// Heads of the branch at the point it was merged.
    pub merge_heads: Heads,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merged_by: Option<DocUrl>,
    /// The branch's effective fork point at merge time (moves forward on rebase).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_heads: Option<Heads>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Branch {
    pub name: String,
    /// URL of the clone document.
    pub url: DocUrl,
    pub created_at: i64,
    /// Heads of the parent when the branch was forked.
    pub branch_heads: Heads,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<DocUrl>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merge_metadata: Option<MergeMetadata>,
}

impl Branch {
    /// A branch with merge metadata is closed.
    pub fn is_merged(&self) -> bool {
        self.merge_metadata.is_some()
    }
}

/// Where a branch document was forked from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchSource {
    pub url: DocUrl,
    pub branch_heads: Heads,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BranchMetadata {
    #[serde(default)]
    pub source: Option<BranchSource>,
    #[serde(default)]
    pub branches: Vec<Branch>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    pub name: String,
    pub heads: Heads,
    pub created_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<DocUrl>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscussionComment {
    pub id: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_url: Option<DocUrl>,
    pub timestamp: i64,
}

/// A comment thread. Anchors are datatype-specific values; an empty list
/// makes the discussion a general comment on the whole document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Discussion {
    pub id: String,
    pub heads: Heads,
    #[serde(default)]
    pub resolved: bool,
    #[serde(default)]
    pub comments: Vec<DiscussionComment>,
    #[serde(default)]
    pub anchors: Vec<Value>,
}

impl Discussion {
    pub fn is_general(&self) -> bool {
        self.anchors.is_empty()
    }

    pub fn first_comment_time(&self) -> i64 {
        self.comments.first().map(|c| c.timestamp).unwrap_or(0)
    }

    /// Contacts who commented, in comment order, without repeats.
    pub fn participants(&self) -> Vec<DocUrl> {
        let mut users: Vec<DocUrl> = Vec::new();
        for url in self.comments.iter().filter_map(|c| c.contact_url.as_ref()) {
            if !users.contains(url) {
                users.push(url.clone());
            }
        }
        users
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeGroupSummary {
    pub title: String,
}

/// The version-control view of a document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VersionControlMetadata {
    pub branch_metadata: BranchMetadata,
    pub tags: Vec<Tag>,
    pub discussions: BTreeMap<String, Discussion>,
    pub change_group_summaries: BTreeMap<String, ChangeGroupSummary>,
}

fn parse_field<T: DeserializeOwned + Default>(doc: &Value, key: &str) -> T {
    match doc.get(key) {
        None | Some(Value::Null) => T::default(),
        Some(v) => serde_json::from_value(v.clone()).unwrap_or_else(|e| {
            tracing::warn!(field = key, error = %e, "ignoring malformed metadata field");
            T::default()
        }),
    }
}

/// Parse a list element by element, dropping entries that don't decode.
fn parse_list<T: DeserializeOwned>(value: Option<&Value>, what: &str) -> Vec<T> {
    let Some(items) = value.and_then(|v| v.as_array()) else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| match serde_json::from_value(item.clone()) {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!(kind = what, error = %e, "skipping malformed record");
                None
            }
        })
        .collect()
}

impl VersionControlMetadata {
    /// Read metadata out of a document snapshot. Malformed records are
    /// skipped so that the rest of the history still renders.
    pub fn from_doc(doc: &Value) -> Self {
        let bm = doc.get(fields::BRANCH_METADATA);
        let source = bm
            .and_then(|b| b.get(fields::SOURCE))
            .filter(|s| !s.is_null())
            .and_then(|s| match serde_json::from_value::<BranchSource>(s.clone()) {
                Ok(src) => Some(src),
                Err(e) => {
                    tracing::warn!(error = %e, "ignoring malformed branch source");
                    None
                }
            });
        let branches = parse_list(bm.and_then(|b| b.get(fields::BRANCHES)), "branch");
        let tags = parse_list(doc.get(fields::TAGS), "tag");

        let mut discussions = BTreeMap::new();
        if let Some(map) = doc.get(fields::DISCUSSIONS).and_then(|v| v.as_object()) {
            for (id, raw) in map {
                match serde_json::from_value::<Discussion>(raw.clone()) {
                    Ok(d) => {
                        discussions.insert(id.clone(), d);
                    }
                    Err(e) => {
                        tracing::warn!(discussion = %id, error = %e, "skipping malformed discussion")
                    }
                }
            }
        }

        Self {
            branch_metadata: BranchMetadata { source, branches },
            tags,
            discussions,
            change_group_summaries: parse_field(doc, fields::CHANGE_GROUP_SUMMARIES),
        }
    }

    /// Ops that install empty version-control metadata on a new document.
    pub fn init_ops() -> Vec<Op> {
        vec![
            Op::Put {
                path: path![fields::BRANCH_METADATA],
                value: json!({ "source": null, "branches": [] }),
            },
            Op::Put {
                path: path![fields::DISCUSSIONS],
                value: json!({}),
            },
            Op::Put {
                path: path![fields::TAGS],
                value: json!([]),
            },
            Op::Put {
                path: path![fields::CHANGE_GROUP_SUMMARIES],
                value: json!({}),
            },
        ]
    }

    pub fn branch(&self, url: &str) -> Option<&Branch> {
        self.branch_metadata.branches.iter().find(|b| b.url == url)
    }

    pub fn branch_index(&self, url: &str) -> Option<usize> {
        self.branch_metadata.branches.iter().position(|b| b.url == url)
    }

    pub fn merged_branches(&self) -> impl Iterator<Item = (&Branch, &MergeMetadata)> {
        self.branch_metadata
            .branches
            .iter()
            .filter_map(|b| b.merge_metadata.as_ref().map(|m| (b, m)))
    }

    pub fn summary_for(&self, group_id: &str) -> Option<&str> {
        self.change_group_summaries
            .get(group_id)
            .map(|s| s.title.as_str())
    }
}

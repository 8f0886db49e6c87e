use patchwork_core::{
    ActorId, Branch, BranchSource, ChangeHash, DecodedChange, Discussion, DocUrl, Heads,
    MergeMetadata, Patch, Tag,
};
use serde::Serialize;
use serde_json::Value;

// ── Change groups ──

/// The diff a group is presented with: patches from `from_heads` to `to_heads`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupDiff {
    pub patches: Vec<Patch>,
    pub from_heads: Heads,
    pub to_heads: Heads,
}

/// A contiguous run of changes shown as one history entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeGroup {
    /// `<from>-<to>`.
    pub id: String,
    pub from: ChangeHash,
    pub to: ChangeHash,
    pub changes: Vec<DecodedChange>,
    pub actor_ids: Vec<ActorId>,
    pub author_urls: Vec<DocUrl>,
    /// Document snapshot at the end of the group.
    #[serde(skip)]
    pub doc_at_end: Value,
    pub diff: GroupDiff,
    pub number_of_edits: usize,
    pub markers: Vec<HeadsMarker>,
    /// Last nonzero change time seen in the group.
    pub time: Option<i64>,
    pub fallback_summary: String,
}

impl ChangeGroup {
    /// A group spanning `from..to` with no members yet.
    pub(crate) fn seeded(from: &str, to: &str) -> Self {
        Self {
            id: format!("{from}-{to}"),
            from: from.to_string(),
            to: to.to_string(),
            changes: Vec::new(),
            actor_ids: Vec::new(),
            author_urls: Vec::new(),
            doc_at_end: Value::Null,
            diff: GroupDiff::default(),
            number_of_edits: 0,
            markers: Vec::new(),
            time: None,
            fallback_summary: String::new(),
        }
    }

    /// A new group holding just `change`.
    pub(crate) fn starting_at(change: &DecodedChange) -> Self {
        Self::seeded(&change.hash, &change.hash).with_change(change)
    }

    /// The group extended by `change`: `to` moves, actor and author sets
    /// grow, and a nonzero change time replaces the group time.
    pub fn with_change(mut self, change: &DecodedChange) -> Self {
        self.to = change.hash.clone();
        if let Some(t) = change.timestamp() {
            self.time = Some(t);
        }
        if !self.actor_ids.contains(&change.actor) {
            self.actor_ids.push(change.actor.clone());
        }
        if let Some(author) = change.author() {
            if !self.author_urls.iter().any(|a| a == author) {
                self.author_urls.push(author.to_string());
            }
        }
        self.changes.push(change.clone());
        self
    }

    pub fn contains(&self, hash: &str) -> bool {
        self.changes.iter().any(|c| c.hash == hash)
    }

    pub fn merge_marker(&self) -> Option<&HeadsMarker> {
        self.markers.iter().find(|m| m.is_merge())
    }
}

// ── Markers ──

/// A named moment in a document's history, anchored to some heads.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HeadsMarker {
    pub id: String,
    pub heads: Heads,
    pub users: Vec<DocUrl>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub hide_history_before_this: bool,
    #[serde(flatten)]
    pub kind: MarkerKind,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum MarkerKind {
    Tag {
        tag: Tag,
    },
    OtherBranchMergedIntoThisDoc {
        branch: Branch,
        /// The branch's own groups; filled in by the grouping engine.
        #[serde(rename = "changeGroups")]
        change_groups: Vec<ChangeGroup>,
    },
    BranchCreatedFromThisDoc {
        branch: Branch,
    },
    OriginOfThisBranch {
        source: BranchSource,
        branch: Branch,
    },
    DiscussionThread {
        discussion: Discussion,
    },
}

fn first(heads: &[ChangeHash]) -> &str {
    heads.first().map(|h| h.as_str()).unwrap_or("")
}

fn one_user(user: &Option<DocUrl>) -> Vec<DocUrl> {
    user.iter().cloned().collect()
}

impl HeadsMarker {
    pub fn tag(tag: &Tag) -> Self {
        Self {
            id: format!("tag-{}-{}", first(&tag.heads), tag.name),
            heads: tag.heads.clone(),
            users: one_user(&tag.created_by),
            hide_history_before_this: false,
            kind: MarkerKind::Tag { tag: tag.clone() },
        }
    }

    pub fn branch_merged(branch: &Branch, merge: &MergeMetadata) -> Self {
        Self {
            id: format!("branch-merge-{}", first(&merge.merge_heads)),
            heads: merge.merge_heads.clone(),
            users: one_user(&merge.merged_by),
            hide_history_before_this: false,
            kind: MarkerKind::OtherBranchMergedIntoThisDoc {
                branch: branch.clone(),
                change_groups: Vec::new(),
            },
        }
    }

    pub fn branch_created(branch: &Branch) -> Self {
        Self {
            id: format!("branch-created-{}", first(&branch.branch_heads)),
            heads: branch.branch_heads.clone(),
            users: one_user(&branch.created_by),
            hide_history_before_this: false,
            kind: MarkerKind::BranchCreatedFromThisDoc {
                branch: branch.clone(),
            },
        }
    }

    /// Where this document was forked from. History before it belongs to the parent.
    pub fn origin_of_this_branch(source: &BranchSource, branch: &Branch) -> Self {
        Self {
            id: "origin-of-this-branch".to_string(),
            heads: source.branch_heads.clone(),
            users: one_user(&branch.created_by),
            hide_history_before_this: true,
            kind: MarkerKind::OriginOfThisBranch {
                source: source.clone(),
                branch: branch.clone(),
            },
        }
    }

    pub fn discussion(discussion: &Discussion) -> Self {
        Self {
            id: format!("discussion-{}", discussion.id),
            heads: discussion.heads.clone(),
            users: discussion.participants(),
            hide_history_before_this: false,
            kind: MarkerKind::DiscussionThread {
                discussion: discussion.clone(),
            },
        }
    }

    pub fn is_merge(&self) -> bool {
        matches!(self.kind, MarkerKind::OtherBranchMergedIntoThisDoc { .. })
    }

    /// Whether the marker sits exactly on `hash` (its first head).
    pub fn is_anchored_at(&self, hash: &str) -> bool {
        self.heads.first().is_some_and(|h| h == hash)
    }

    /// The time the marked event happened, when known.
    pub fn time(&self) -> Option<i64> {
        let t = match &self.kind {
            MarkerKind::Tag { tag } => tag.created_at,
            MarkerKind::OtherBranchMergedIntoThisDoc { branch, .. } => branch
                .merge_metadata
                .as_ref()
                .map_or(branch.created_at, |m| m.merged_at),
            MarkerKind::BranchCreatedFromThisDoc { branch }
            | MarkerKind::OriginOfThisBranch { branch, .. } => branch.created_at,
            MarkerKind::DiscussionThread { discussion } => discussion.first_comment_time(),
        };
        (t > 0).then_some(t)
    }

    /// A short label for listings.
    pub fn label(&self) -> String {
        match &self.kind {
            MarkerKind::Tag { tag } => format!("tag {}", tag.name),
            MarkerKind::OtherBranchMergedIntoThisDoc { branch, .. } => {
                format!("merged branch {}", branch.name)
            }
            MarkerKind::BranchCreatedFromThisDoc { branch } => {
                format!("created branch {}", branch.name)
            }
            MarkerKind::OriginOfThisBranch { branch, .. } => {
                format!("branch {} starts here", branch.name)
            }
            MarkerKind::DiscussionThread { discussion } => {
                let text = discussion
                    .comments
                    .first()
                    .map(|c| c.content.as_str())
                    .unwrap_or("");
                format!("comment: {text}")
            }
        }
    }
}

/// A marker whose group was dropped for having no edits. It is shown on its
/// own, before the group at `position` in the group list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrphanMarker {
    pub position: usize,
    pub marker: HeadsMarker,
}

#[cfg(test)]
mod tests {
    use super::*;
    use patchwork_core::ChangeMetadata;

    fn change(hash: &str, actor: &str, time: i64, author: Option<&str>) -> DecodedChange {
        DecodedChange {
            hash: hash.into(),
            actor: actor.into(),
            seq: 1,
            deps: vec![],
            time,
            message: None,
            metadata: ChangeMetadata {
                author: author.map(|a| a.to_string()),
                extra: Default::default(),
            },
            ops: vec![],
        }
    }

    #[test]
    fn with_change_tracks_sets_and_last_time() {
        let g = ChangeGroup::starting_at(&change("a", "x", 10, Some("patchwork:alice")))
            .with_change(&change("b", "y", 0, Some("patchwork:alice")))
            .with_change(&change("c", "x", 5, Some("patchwork:bob")));
        assert_eq!(g.from, "a");
        assert_eq!(g.to, "c");
        assert_eq!(g.actor_ids, vec!["x", "y"]);
        assert_eq!(g.author_urls, vec!["patchwork:alice", "patchwork:bob"]);
        assert_eq!(g.time, Some(5));
        assert!(g.contains("b"));
    }

    #[test]
    fn untimed_start_has_no_time() {
        let g = ChangeGroup::starting_at(&change("a", "x", 0, None));
        assert_eq!(g.time, None);
        assert!(g.author_urls.is_empty());
    }

    #[test]
    fn marker_ids_follow_their_heads() {
        let tag = Tag {
            name: "v1".into(),
            heads: vec!["h3".into()],
            created_at: 7,
            created_by: Some("patchwork:alice".into()),
        };
        let m = HeadsMarker::tag(&tag);
        assert_eq!(m.id, "tag-h3-v1");
        assert_eq!(m.users, vec!["patchwork:alice"]);
        assert_eq!(m.time(), Some(7));
        assert!(m.is_anchored_at("h3"));
        assert!(!m.is_merge());
    }

    #[test]
    fn marker_serializes_with_type_tag() {
        let tag = Tag {
            name: "v1".into(),
            heads: vec!["h3".into()],
            created_at: 7,
            created_by: None,
        };
        let v = serde_json::to_value(HeadsMarker::tag(&tag)).unwrap();
        assert_eq!(v["type"], "tag");
        assert_eq!(v["id"], "tag-h3-v1");
        assert!(v.get("hideHistoryBeforeThis").is_none());
    }
}

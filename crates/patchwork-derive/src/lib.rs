mod annotations;
mod datatype;
mod engine;
mod error;
mod essay;
mod grouping;
mod markers;
mod memo;
mod timeline;
mod types;

pub use annotations::{
    annotation_group_id, annotation_groups, does_annotation_group_contain_anchors, Annotation,
    AnnotationGroup,
};
pub use datatype::{default_fallback_summary, ChangeFilter, Datatype};
pub use engine::{group_changes, GroupedChanges, GroupingOptions};
pub use error::{AnchorError, ConfigError};
pub use essay::{EssayDatatype, CONTENT as ESSAY_CONTENT};
pub use grouping::{Grouping, GroupingConfig, GroupingFn, PRESETS};
pub use markers::markers_for_doc;
pub use memo::{group_changes_memo, MemoizedChangeGroups};
pub use timeline::{flatten_timeline, timeline, visible_history, TimelineItem};
pub use types::*;

#[cfg(test)]
pub(crate) mod test_support {
    use crate::{markers_for_doc, EssayDatatype, Grouping, GroupingOptions};
    use patchwork_core::meta::fields::{BRANCH_METADATA, CHANGE_GROUP_SUMMARIES};
    use patchwork_core::{path, ChangeHash, DocHistory, Heads, Op, VersionControlMetadata};
    use patchwork_ledger::{create_branch, merge_branch, ChangeOptions, DocHandle, DocLog, Repo};
    use serde_json::json;
    use std::sync::Arc;

    pub const ALICE: &str = "alice";
    pub const BOB: &str = "bob";
    pub const CAROL: &str = "carol";

    /// An empty essay document.
    pub fn essay_log() -> DocLog {
        DocLog::with_actor("patchwork:essay", "reader")
    }

    /// Record `ops` as written by `actor`, with author `patchwork:<actor>`.
    pub fn change_as(log: &mut DocLog, actor: &str, time: i64, ops: Vec<Op>) -> ChangeHash {
        let mut writer = DocLog::with_actor(log.url(), actor);
        writer.merge(log).unwrap();
        let opts = ChangeOptions {
            time,
            author: Some(format!("patchwork:{actor}")),
            message: None,
        };
        let hash = writer.change(&opts, ops).unwrap();
        log.merge(&writer).unwrap();
        hash
    }

    /// Append `text` to `content`, creating it if needed.
    pub fn append(log: &mut DocLog, actor: &str, time: i64, text: &str) -> ChangeHash {
        let op = match log.doc().get("content").and_then(|c| c.as_str()) {
            Some(current) => Op::Splice {
                path: path!["content"],
                index: current.chars().count(),
                delete: 0,
                text: text.to_string(),
            },
            None => Op::Put {
                path: path!["content"],
                value: json!(text),
            },
        };
        change_as(log, actor, time, vec![op])
    }

    pub fn put_title(log: &mut DocLog, actor: &str, time: i64, title: &str) -> ChangeHash {
        change_as(
            log,
            actor,
            time,
            vec![Op::Put {
                path: path!["title"],
                value: json!(title),
            }],
        )
    }

    pub fn write_summary(log: &mut DocLog, actor: &str, time: i64) -> ChangeHash {
        change_as(
            log,
            actor,
            time,
            vec![Op::Put {
                path: path![CHANGE_GROUP_SUMMARIES, "x-y"],
                value: json!({"title": "summary"}),
            }],
        )
    }

    /// Record a merged branch whose merge heads are `heads`.
    pub fn merge_record_with_heads(log: &mut DocLog, actor: &str, time: i64, heads: Heads) -> ChangeHash {
        change_as(
            log,
            actor,
            time,
            vec![Op::Put {
                path: path![BRANCH_METADATA],
                value: json!({
                    "source": null,
                    "branches": [{
                        "name": "gone",
                        "url": "patchwork:gone",
                        "createdAt": 1,
                        "branchHeads": [],
                        "mergeMetadata": {"mergedAt": 2, "mergeHeads": heads}
                    }]
                }),
            }],
        )
    }

    /// A fresh log holding the first `n` changes of `log`.
    pub fn prefix(log: &DocLog, n: usize) -> DocLog {
        let mut out = DocLog::with_actor(log.url(), "reader");
        out.apply_changes(log.changes()[..n].iter().cloned()).unwrap();
        out
    }

    /// Main forks a branch, the branch gets two edits, main gets three
    /// unrelated edits by another actor, then the branch is merged.
    pub struct BranchFixture {
        pub main: DocHandle,
        pub branch: DocHandle,
        pub main_edits: Vec<ChangeHash>,
        pub branch_edits: Vec<ChangeHash>,
    }

    impl BranchFixture {
        pub fn build() -> Self {
            let mut repo = Repo::in_memory();
            let mut log = DocLog::with_actor("patchwork:main", ALICE);
            let mut ops = VersionControlMetadata::init_ops();
            ops.push(Op::Put {
                path: path!["content"],
                value: json!("hello"),
            });
            let opts = ChangeOptions {
                time: 1,
                author: Some("patchwork:alice".into()),
                message: None,
            };
            log.change(&opts, ops).unwrap();
            let main = repo.insert(log);

            let branch = create_branch(&mut repo, main.url(), "draft", None).unwrap();
            let branch_edits = {
                let mut log = branch.write();
                vec![
                    append(&mut log, CAROL, 10, " from"),
                    append(&mut log, CAROL, 11, " branch"),
                ]
            };
            let main_edits = (0..3)
                .map(|i| append(&mut main.write(), BOB, 20 + i, "!"))
                .collect();
            merge_branch(&mut repo, main.url(), branch.url(), None).unwrap();

            Self {
                main,
                branch,
                main_edits,
                branch_edits,
            }
        }

        pub fn options(&self, grouping: Grouping) -> GroupingOptions {
            let meta = self.main.metadata();
            GroupingOptions::new(grouping)
                .with_datatype(Arc::new(EssayDatatype))
                .with_markers(markers_for_doc(&meta, self.main.url(), None))
        }
    }
}

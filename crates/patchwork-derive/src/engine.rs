//! The change-grouping engine.
//!
//! One pass over the change log in log order. Changes that belong to a
//! merged branch are carved out into one group per branch, emitted when the
//! branch's merge heads have all been seen. Everything else is folded into
//! main-line groups by the active grouping rule. Markers anchored on a
//! main-line change close the group right after it. A branch is always one
//! group: markers anchored inside it ride along on that group and do not
//! split it.
//!
//! Each group is diffed from the causal frontier just before its first
//! member to the frontier just after its last member, so branch and
//! filtered changes interleaved in the log never leak into a main-line diff.

use patchwork_core::{
    advance_frontier, ChangeHash, DecodedChange, DocHistory, DocUrl, Heads,
    VersionControlMetadata,
};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use crate::datatype::{fallback_summary_for, ChangeFilter, Datatype};
use crate::grouping::Grouping;
use crate::types::{ChangeGroup, GroupDiff, HeadsMarker, MarkerKind, OrphanMarker};

/// How to group a document's history.
#[derive(Clone, Default)]
pub struct GroupingOptions {
    pub grouping: Grouping,
    /// Markers to place in the history; each one forces a group boundary
    /// right after the change its first head names.
    pub markers: Vec<HeadsMarker>,
    pub datatype: Option<Arc<dyn Datatype>>,
}

impl GroupingOptions {
    pub fn new(grouping: Grouping) -> Self {
        Self {
            grouping,
            ..Self::default()
        }
    }

    pub fn with_markers(mut self, markers: Vec<HeadsMarker>) -> Self {
        self.markers = markers;
        self
    }

    pub fn with_datatype(mut self, datatype: Arc<dyn Datatype>) -> Self {
        self.datatype = Some(datatype);
        self
    }

    pub fn datatype(&self) -> Option<&dyn Datatype> {
        self.datatype.as_deref()
    }

    /// A change named by any marker is always shown, even if filtered.
    pub(crate) fn is_visible(&self, hash: &str) -> bool {
        self.markers.iter().any(|m| m.heads.iter().any(|h| h == hash))
    }

    pub(crate) fn anchored_at(&self, hash: &str) -> Vec<HeadsMarker> {
        self.markers
            .iter()
            .filter(|m| m.is_anchored_at(hash))
            .cloned()
            .collect()
    }
}

impl PartialEq for GroupingOptions {
    fn eq(&self, other: &Self) -> bool {
        let same_datatype = match (&self.datatype, &other.datatype) {
            (None, None) => true,
            (Some(a), Some(b)) => std::ptr::eq(
                Arc::as_ptr(a) as *const (),
                Arc::as_ptr(b) as *const (),
            ),
            _ => false,
        };
        self.grouping == other.grouping && self.markers == other.markers && same_datatype
    }
}

impl fmt::Debug for GroupingOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GroupingOptions")
            .field("grouping", &self.grouping)
            .field("markers", &self.markers.len())
            .field("datatype", &self.datatype().map(|d| d.id()))
            .finish()
    }
}

/// Result of a grouping pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupedChanges {
    pub change_groups: Vec<ChangeGroup>,
    /// Markers whose group had no edits.
    pub orphan_markers: Vec<OrphanMarker>,
    /// Number of log entries consumed.
    pub change_count: usize,
}

/// Group a document's full history.
pub fn group_changes<H: DocHistory + ?Sized>(history: &H, options: &GroupingOptions) -> GroupedChanges {
    run_full(history, options).0
}

// ── Pass state shared with the memo layer ──

/// A main-line group still accepting changes.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct OpenGroup {
    pub group: ChangeGroup,
    /// Frontier just before the first member.
    pub base: Heads,
    /// Frontier just after the last member.
    pub end: Heads,
}

/// A merged branch as seen by one pass, for cache validation.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct BranchKey {
    pub url: DocUrl,
    pub merge_heads: Heads,
    pub base: Heads,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Tail {
    pub open: OpenGroup,
    /// Whether finalizing the open group produced the last emitted group.
    pub emitted: bool,
}

/// Where a pass stopped, so a later pass can pick up from it.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Checkpoint {
    pub frontier: Heads,
    pub last_hash: Option<ChangeHash>,
    pub tail: Option<Tail>,
    pub branches: Vec<BranchKey>,
    /// Every branch group was emitted during the scan, none at the end.
    pub branches_settled: bool,
}

pub(crate) enum Finalized {
    Kept(ChangeGroup),
    Dropped(Vec<HeadsMarker>),
}

struct PendingBranch {
    key: BranchKey,
    members: HashSet<ChangeHash>,
    unseen_merge_heads: HashSet<ChangeHash>,
    group: ChangeGroup,
    done: bool,
}

/// The document at its current heads, or `{}` if it cannot be materialized.
pub(crate) fn current_doc<H: DocHistory + ?Sized>(history: &H) -> Value {
    history.view(&history.heads()).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "cannot materialize document; ignoring its metadata");
        Value::Object(Map::new())
    })
}

pub(crate) fn merged_branch_keys(meta: &VersionControlMetadata) -> Vec<BranchKey> {
    meta.merged_branches()
        .map(|(branch, merge)| BranchKey {
            url: branch.url.clone(),
            merge_heads: merge.merge_heads.clone(),
            base: merge
                .base_heads
                .clone()
                .unwrap_or_else(|| branch.branch_heads.clone()),
        })
        .collect()
}

/// Work out which changes each merged branch owns. Branches whose merge
/// heads are not in the history are skipped (their changes show inline);
/// the flag is false if that happened.
fn pending_branches<H: DocHistory + ?Sized>(
    history: &H,
    meta: &VersionControlMetadata,
) -> (Vec<PendingBranch>, bool) {
    let mut pending = Vec::new();
    let mut resolved = true;
    for (branch, key) in meta
        .merged_branches()
        .map(|(b, _)| b)
        .zip(merged_branch_keys(meta))
    {
        if key.merge_heads.is_empty() {
            tracing::warn!(branch = %branch.url, "merged branch has no merge heads; skipping");
            continue;
        }
        if let Some(missing) = key.merge_heads.iter().find(|h| !history.has_change(h)) {
            tracing::warn!(branch = %branch.url, head = %missing, "merge head not in history; skipping branch");
            resolved = false;
            continue;
        }

        let fork = history.ancestors(&branch.branch_heads);
        let base = history.ancestors(&key.base);
        let mut members = history.ancestors(&key.merge_heads);
        members.retain(|h| !fork.contains(h) && !base.contains(h));
        if members.is_empty() {
            tracing::debug!(branch = %branch.url, "merged branch has no changes of its own");
            continue;
        }

        let from = branch
            .branch_heads
            .first()
            .or(key.base.first())
            .cloned()
            .unwrap_or_default();
        let to = key.merge_heads[0].clone();
        pending.push(PendingBranch {
            unseen_merge_heads: key
                .merge_heads
                .iter()
                .filter(|h| members.contains(*h))
                .cloned()
                .collect(),
            members,
            group: ChangeGroup::seeded(&from, &to),
            key,
            done: false,
        });
    }
    (pending, resolved)
}

/// Compute diff, snapshot, edit count and summary for a group. Groups with
/// no counted edits are dropped and hand back their markers.
pub(crate) fn finalize<H: DocHistory + ?Sized>(
    history: &H,
    options: &GroupingOptions,
    mut group: ChangeGroup,
    base: &[ChangeHash],
    end: &[ChangeHash],
) -> Finalized {
    let patches = match history.diff(base, end) {
        Ok(p) => p,
        Err(e) => {
            tracing::warn!(from = %group.from, to = %group.to, error = %e, "cannot diff change group; dropping it");
            return Finalized::Dropped(group.markers);
        }
    };
    let datatype = options.datatype();
    let edits = patches
        .iter()
        .filter(|p| datatype.map_or(true, |d| d.include_patch_in_change_group(p)))
        .count();
    if edits == 0 {
        tracing::debug!(from = %group.from, to = %group.to, "dropping change group with no edits");
        return Finalized::Dropped(group.markers);
    }

    group.id = format!("{}-{}", group.from, group.to);
    group.doc_at_end = history.view(end).unwrap_or_else(|e| {
        tracing::warn!(group = %group.id, error = %e, "cannot materialize end of change group");
        Value::Null
    });
    group.diff = GroupDiff {
        patches,
        from_heads: base.to_vec(),
        to_heads: end.to_vec(),
    };
    group.number_of_edits = edits;
    group.fallback_summary = fallback_summary_for(datatype, &group);
    Finalized::Kept(group)
}

pub(crate) fn push_finalized(
    groups: &mut Vec<ChangeGroup>,
    orphans: &mut Vec<OrphanMarker>,
    finalized: Finalized,
) {
    match finalized {
        Finalized::Kept(group) => groups.push(group),
        Finalized::Dropped(markers) => {
            let position = groups.len();
            orphans.extend(
                markers
                    .into_iter()
                    .map(|marker| OrphanMarker { position, marker }),
            );
        }
    }
}

/// Markers for a branch group: those at the merge heads or anchored on a
/// branch change, merge marker first. Attaching never splits the branch;
/// marker boundaries are a main-line rule.
fn branch_markers(markers: &[HeadsMarker], merge_heads: &[ChangeHash], group: &ChangeGroup) -> Vec<HeadsMarker> {
    let mut attached: Vec<HeadsMarker> = markers
        .iter()
        .filter(|m| m.heads == merge_heads || group.changes.iter().any(|c| m.is_anchored_at(&c.hash)))
        .cloned()
        .collect();
    if let Some(pos) = attached
        .iter()
        .position(|m| m.is_merge() && m.heads == merge_heads)
    {
        let merge = attached.remove(pos);
        attached.insert(0, merge);
    }
    attached
}

/// Give the merge marker a copy of the branch group it introduces.
fn link_merge_marker(group: &mut ChangeGroup) {
    let mut nested = group.clone();
    nested.markers.clear();
    if let Some(MarkerKind::OtherBranchMergedIntoThisDoc { change_groups, .. }) =
        group.markers.first_mut().map(|m| &mut m.kind)
    {
        *change_groups = vec![nested];
    }
}

struct Scan<'a, H: DocHistory + ?Sized> {
    history: &'a H,
    options: &'a GroupingOptions,
    filter: Option<ChangeFilter<'a>>,
    groups: Vec<ChangeGroup>,
    orphans: Vec<OrphanMarker>,
    frontier: Heads,
    open: Option<OpenGroup>,
    branches: Vec<PendingBranch>,
    branch_keys: Vec<BranchKey>,
    branches_resolved: bool,
    consumed: usize,
    last_hash: Option<ChangeHash>,
}

impl<'a, H: DocHistory + ?Sized> Scan<'a, H> {
    fn new(history: &'a H, options: &'a GroupingOptions, doc: &'a Value) -> Self {
        let meta = VersionControlMetadata::from_doc(doc);
        let (branches, branches_resolved) = pending_branches(history, &meta);
        Self {
            history,
            options,
            filter: options.datatype().and_then(|d| d.change_filter(doc)),
            groups: Vec::new(),
            orphans: Vec::new(),
            frontier: Heads::new(),
            open: None,
            branches,
            branch_keys: merged_branch_keys(&meta),
            branches_resolved,
            consumed: 0,
            last_hash: None,
        }
    }

    fn step(&mut self, change: &DecodedChange) {
        self.consumed += 1;
        self.last_hash = Some(change.hash.clone());
        let before = self.frontier.clone();
        advance_frontier(&mut self.frontier, change);
        let hash = change.hash.as_str();

        if let Some(filter) = &self.filter {
            if !filter(change) && !self.options.is_visible(hash) {
                self.skip_branch_head(hash);
                return;
            }
        }

        if let Some(i) = self
            .branches
            .iter()
            .position(|b| !b.done && b.members.contains(hash))
        {
            // Branch changes always end the main-line group in progress.
            self.close_open();
            self.fold_into_branch(i, change);
            return;
        }

        let open = match self.open.take() {
            Some(open) if self.options.grouping.accepts(&open.group, change) => OpenGroup {
                group: open.group.with_change(change),
                base: open.base,
                end: self.frontier.clone(),
            },
            previous => {
                if let Some(previous) = previous {
                    self.close(previous);
                }
                OpenGroup {
                    group: ChangeGroup::starting_at(change),
                    base: before,
                    end: self.frontier.clone(),
                }
            }
        };

        let anchored = self.options.anchored_at(hash);
        if anchored.is_empty() {
            self.open = Some(open);
        } else {
            let mut open = open;
            open.group.markers = anchored;
            self.close(open);
        }
    }

    fn close(&mut self, open: OpenGroup) {
        let finalized = finalize(self.history, self.options, open.group, &open.base, &open.end);
        push_finalized(&mut self.groups, &mut self.orphans, finalized);
    }

    fn close_open(&mut self) {
        if let Some(open) = self.open.take() {
            self.close(open);
        }
    }

    /// A filtered-out merge head still counts as seen.
    fn skip_branch_head(&mut self, hash: &str) {
        let Some(i) = self
            .branches
            .iter()
            .position(|b| !b.done && b.unseen_merge_heads.contains(hash))
        else {
            return;
        };
        let branch = &mut self.branches[i];
        branch.unseen_merge_heads.remove(hash);
        if branch.unseen_merge_heads.is_empty() && !branch.group.changes.is_empty() {
            self.close_open();
            self.finish_branch(i);
        }
    }

    fn fold_into_branch(&mut self, i: usize, change: &DecodedChange) {
        let branch = &mut self.branches[i];
        let mut group = std::mem::replace(&mut branch.group, ChangeGroup::seeded("", ""))
            .with_change(change);
        if group.from.is_empty() {
            group.from = change.hash.clone();
        }
        branch.group = group;
        branch.unseen_merge_heads.remove(&change.hash);
        if branch.unseen_merge_heads.is_empty() {
            self.finish_branch(i);
        }
    }

    fn finish_branch(&mut self, i: usize) {
        let branch = &mut self.branches[i];
        branch.done = true;
        let mut group = std::mem::replace(&mut branch.group, ChangeGroup::seeded("", ""));
        let base = branch.key.base.clone();
        let end = branch.key.merge_heads.clone();
        tracing::debug!(branch = %branch.key.url, changes = group.changes.len(), "closing branch group");

        group.markers = branch_markers(&self.options.markers, &end, &group);
        let finalized = match finalize(self.history, self.options, group, &base, &end) {
            Finalized::Kept(mut group) => {
                link_merge_marker(&mut group);
                Finalized::Kept(group)
            }
            dropped => dropped,
        };
        push_finalized(&mut self.groups, &mut self.orphans, finalized);
    }

    fn finish(mut self) -> (GroupedChanges, Checkpoint) {
        let tail = self.open.take().map(|open| {
            let finalized = finalize(
                self.history,
                self.options,
                open.group.clone(),
                &open.base,
                &open.end,
            );
            let emitted = matches!(finalized, Finalized::Kept(_));
            push_finalized(&mut self.groups, &mut self.orphans, finalized);
            Tail { open, emitted }
        });

        // Branches whose merge heads never showed up (e.g. filtered out)
        // are flushed after everything else.
        let mut settled = self.branches_resolved;
        for i in 0..self.branches.len() {
            if !self.branches[i].done && !self.branches[i].group.changes.is_empty() {
                settled = false;
                self.finish_branch(i);
            }
        }

        let grouped = GroupedChanges {
            change_groups: self.groups,
            orphan_markers: self.orphans,
            change_count: self.consumed,
        };
        let checkpoint = Checkpoint {
            frontier: self.frontier,
            last_hash: self.last_hash,
            tail,
            branches: self.branch_keys,
            branches_settled: settled,
        };
        (grouped, checkpoint)
    }
}

/// Group from scratch, also returning where the pass stopped.
pub(crate) fn run_full<H: DocHistory + ?Sized>(
    history: &H,
    options: &GroupingOptions,
) -> (GroupedChanges, Checkpoint) {
    let doc = current_doc(history);
    let mut scan = Scan::new(history, options, &doc);
    for change in history.changes() {
        scan.step(change);
    }
    scan.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::essay::EssayDatatype;
    use crate::test_support::*;
    use patchwork_core::{Patch, Tag};

    fn by_actor() -> GroupingOptions {
        GroupingOptions::new(Grouping::ByActor)
    }

    fn hashes(group: &ChangeGroup) -> Vec<&str> {
        group.changes.iter().map(|c| c.hash.as_str()).collect()
    }

    fn tag_at(hash: &str) -> HeadsMarker {
        HeadsMarker::tag(&Tag {
            name: "milestone".into(),
            heads: vec![hash.to_string()],
            created_at: 1,
            created_by: None,
        })
    }

    #[test]
    fn single_actor_makes_one_group() {
        let mut log = essay_log();
        let hs: Vec<_> = (0..5).map(|i| append(&mut log, ALICE, i + 1, "x")).collect();

        let out = group_changes(&log, &by_actor());
        assert_eq!(out.change_groups.len(), 1);
        let g = &out.change_groups[0];
        assert_eq!(hashes(g), hs.iter().map(|h| h.as_str()).collect::<Vec<_>>());
        assert_eq!(g.actor_ids, vec![ALICE]);
        assert_eq!(g.from, hs[0]);
        assert_eq!(g.to, hs[4]);
        assert_eq!(g.id, format!("{}-{}", hs[0], hs[4]));
        assert_eq!(g.doc_at_end["content"], "xxxxx");
        assert_eq!(out.change_count, 5);
    }

    #[test]
    fn actor_switch_splits_groups() {
        let mut log = essay_log();
        for i in 0..3 {
            append(&mut log, ALICE, i + 1, "a");
        }
        for i in 0..2 {
            append(&mut log, BOB, i + 10, "b");
        }
        let out = group_changes(&log, &by_actor());
        assert_eq!(out.change_groups.len(), 2);
        assert_eq!(out.change_groups[0].changes.len(), 3);
        assert_eq!(out.change_groups[0].actor_ids, vec![ALICE]);
        assert_eq!(out.change_groups[1].changes.len(), 2);
        assert_eq!(out.change_groups[1].actor_ids, vec![BOB]);

        let second = &out.change_groups[1];
        assert_eq!(second.diff.from_heads, vec![out.change_groups[0].to.clone()]);
        assert_eq!(second.diff.to_heads, vec![second.to.clone()]);
        assert_eq!(
            second.diff.patches,
            vec![Patch::Splice {
                path: patchwork_core::path!["content", 3usize],
                value: "bb".into()
            }]
        );
    }

    #[test]
    fn tag_forces_boundary_after_its_change() {
        let mut log = essay_log();
        let hs: Vec<_> = (0..5).map(|i| append(&mut log, ALICE, i + 1, "x")).collect();
        let options = by_actor().with_markers(vec![tag_at(&hs[2])]);

        let out = group_changes(&log, &options);
        assert_eq!(out.change_groups.len(), 2);
        assert_eq!(out.change_groups[0].to, hs[2]);
        assert_eq!(out.change_groups[0].markers, vec![tag_at(&hs[2])]);
        assert_eq!(out.change_groups[1].from, hs[3]);
        assert_eq!(out.change_groups[1].to, hs[4]);
        assert!(out.change_groups[1].markers.is_empty());
    }

    #[test]
    fn marker_on_a_change_that_starts_a_group_still_closes_it() {
        let mut log = essay_log();
        append(&mut log, ALICE, 1, "a");
        let b = append(&mut log, BOB, 2, "b");
        append(&mut log, BOB, 3, "b");
        let out = group_changes(&log, &by_actor().with_markers(vec![tag_at(&b)]));
        let sizes: Vec<_> = out.change_groups.iter().map(|g| g.changes.len()).collect();
        assert_eq!(sizes, vec![1, 1, 1]);
        assert_eq!(out.change_groups[1].to, b);
    }

    #[test]
    fn groups_without_counted_edits_are_dropped() {
        let mut log = essay_log();
        put_title(&mut log, ALICE, 1, "Draft");
        put_title(&mut log, ALICE, 2, "Final");
        let options = by_actor().with_datatype(Arc::new(EssayDatatype));
        let out = group_changes(&log, &options);
        assert!(out.change_groups.is_empty());
        assert_eq!(out.change_count, 2);

        // Without the datatype every patch counts.
        assert_eq!(group_changes(&log, &by_actor()).change_groups.len(), 1);
    }

    #[test]
    fn marker_on_dropped_group_becomes_orphan() {
        let mut log = essay_log();
        append(&mut log, ALICE, 1, "a");
        let t = put_title(&mut log, BOB, 2, "Title");
        append(&mut log, ALICE, 3, "c");
        let options = by_actor()
            .with_datatype(Arc::new(EssayDatatype))
            .with_markers(vec![tag_at(&t)]);

        let out = group_changes(&log, &options);
        assert_eq!(out.change_groups.len(), 2);
        assert_eq!(
            out.orphan_markers,
            vec![OrphanMarker {
                position: 1,
                marker: tag_at(&t)
            }]
        );
        assert!(out.change_groups.iter().all(|g| g.number_of_edits > 0));
    }

    #[test]
    fn filtered_changes_are_skipped_unless_marked() {
        let mut log = essay_log();
        append(&mut log, ALICE, 1, "a");
        let s = write_summary(&mut log, ALICE, 2);
        append(&mut log, ALICE, 3, "b");
        let essay = GroupingOptions::new(Grouping::TagsOnly).with_datatype(Arc::new(EssayDatatype));

        let out = group_changes(&log, &essay);
        assert_eq!(out.change_groups.len(), 1);
        assert!(!out.change_groups[0].contains(&s));
        assert_eq!(out.change_groups[0].changes.len(), 2);

        let marked = essay.with_markers(vec![tag_at(&s)]);
        let out = group_changes(&log, &marked);
        assert!(out.change_groups[0].contains(&s));
        assert_eq!(out.change_groups[0].to, s);
    }

    #[test]
    fn regrouping_is_idempotent() {
        let mut log = essay_log();
        for i in 0..6 {
            let who = if i % 3 == 0 { BOB } else { ALICE };
            append(&mut log, who, i + 1, "z");
        }
        let options = by_actor();
        assert_eq!(group_changes(&log, &options), group_changes(&log, &options));
    }

    #[test]
    fn merged_branch_changes_form_their_own_group() {
        let fx = BranchFixture::build();
        let options = fx.options(Grouping::ByActor);
        let main = fx.main.read();
        let out = group_changes(&*main, &options);

        // Branch changes appear exactly once, in the branch group.
        for h in &fx.branch_edits {
            let owners: Vec<_> = out.change_groups.iter().filter(|g| g.contains(h)).collect();
            assert_eq!(owners.len(), 1, "{h}");
            assert!(owners[0].merge_marker().is_some());
        }
        let main_edits = out
            .change_groups
            .iter()
            .find(|g| fx.main_edits.iter().all(|h| g.contains(h)))
            .expect("main group");
        assert!(fx.branch_edits.iter().all(|h| !main_edits.contains(h)));

        let branch_group = out
            .change_groups
            .iter()
            .find(|g| g.merge_marker().is_some())
            .unwrap();
        let main_pos = out.change_groups.iter().position(|g| g == main_edits).unwrap();
        let branch_pos = out.change_groups.iter().position(|g| g == branch_group).unwrap();
        assert!(main_pos < branch_pos);
        assert_eq!(branch_group.doc_at_end["content"], "hello from branch");

        match &branch_group.merge_marker().unwrap().kind {
            MarkerKind::OtherBranchMergedIntoThisDoc { change_groups, .. } => {
                assert_eq!(change_groups.len(), 1);
                assert_eq!(change_groups[0].id, branch_group.id);
                assert!(change_groups[0].markers.is_empty());
            }
            other => panic!("unexpected marker {other:?}"),
        }
    }

    #[test]
    fn dangling_merge_heads_degrade_to_inline_changes() {
        let mut log = essay_log();
        append(&mut log, ALICE, 1, "a");
        merge_record_with_heads(&mut log, ALICE, 2, vec!["missing".into()]);
        append(&mut log, ALICE, 3, "b");
        let out = group_changes(&log, &by_actor());
        assert_eq!(out.change_groups.len(), 1);
        assert_eq!(out.change_groups[0].changes.len(), 3);
    }

    #[test]
    fn marker_inside_a_branch_does_not_split_it() {
        use patchwork_core::{path, Op};
        use patchwork_ledger::{create_branch, merge_branch, ChangeOptions, DocLog, Repo};

        let mut repo = Repo::in_memory();
        let mut log = DocLog::with_actor("patchwork:main", ALICE);
        let mut ops = VersionControlMetadata::init_ops();
        ops.push(Op::Put {
            path: path!["content"],
            value: serde_json::json!("hello"),
        });
        log.change(&ChangeOptions::default(), ops).unwrap();
        let main = repo.insert(log);

        let branch = create_branch(&mut repo, main.url(), "draft", None).unwrap();
        let first = append(&mut branch.write(), CAROL, 10, " one");
        let second = append(&mut branch.write(), CAROL, 11, " two");
        merge_branch(&mut repo, main.url(), branch.url(), None).unwrap();

        let options = by_actor().with_markers(vec![tag_at(&first)]);
        let out = group_changes(&*main.read(), &options);
        let owners: Vec<_> = out.change_groups.iter().filter(|g| g.contains(&first)).collect();
        assert_eq!(owners.len(), 1);
        assert!(owners[0].contains(&second));
        assert!(owners[0].markers.iter().any(|m| m.heads == vec![first.clone()]));
    }

    #[test]
    fn filtered_merge_head_still_closes_the_branch() {
        use patchwork_core::{path, Op};
        use patchwork_ledger::{create_branch, merge_branch, ChangeOptions, DocLog, Repo};

        let mut repo = Repo::in_memory();
        let mut log = DocLog::with_actor("patchwork:main", ALICE);
        let mut ops = VersionControlMetadata::init_ops();
        ops.push(Op::Put {
            path: path!["content"],
            value: serde_json::json!("hello"),
        });
        log.change(&ChangeOptions::default(), ops).unwrap();
        let main = repo.insert(log);

        let branch = create_branch(&mut repo, main.url(), "draft", None).unwrap();
        let edit = append(&mut branch.write(), CAROL, 10, " more");
        // The branch ends on a metadata-only change the essay filter hides.
        write_summary(&mut branch.write(), CAROL, 11);
        merge_branch(&mut repo, main.url(), branch.url(), None).unwrap();
        let after = append(&mut main.write(), BOB, 30, "!");

        // No markers, so nothing forces the hidden merge head into view.
        let options = GroupingOptions::new(Grouping::ByActor).with_datatype(Arc::new(EssayDatatype));
        let out = group_changes(&*main.read(), &options);
        let branch_pos = out.change_groups.iter().position(|g| g.contains(&edit)).unwrap();
        let after_pos = out.change_groups.iter().position(|g| g.contains(&after)).unwrap();
        assert!(branch_pos < after_pos);
        assert_eq!(out.change_groups[branch_pos].changes.len(), 1);
    }
}

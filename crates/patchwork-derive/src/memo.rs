//! Incremental regrouping.
//!
//! A previous result can be extended instead of recomputed when the log only
//! grew, the options are the same, the merged branches are unchanged, and
//! every new change folds into the last open group. Anything else falls back
//! to a full pass, so the result always equals grouping from scratch.
//!
//! The change filter is re-specialised on the current document for the new
//! changes only; changes already grouped keep the decision made back then.

use patchwork_core::{advance_frontier, DocHistory, VersionControlMetadata};

use crate::engine::{
    current_doc, finalize, merged_branch_keys, push_finalized, run_full, Checkpoint, Finalized,
    GroupedChanges, GroupingOptions, Tail,
};
use crate::types::{ChangeGroup, OrphanMarker};

/// A grouping result plus what is needed to extend it later.
#[derive(Debug, Clone)]
pub struct MemoizedChangeGroups {
    pub change_groups: Vec<ChangeGroup>,
    pub orphan_markers: Vec<OrphanMarker>,
    pub change_count: usize,
    pub options: GroupingOptions,
    checkpoint: Checkpoint,
}

impl MemoizedChangeGroups {
    fn from_parts(grouped: GroupedChanges, options: &GroupingOptions, checkpoint: Checkpoint) -> Self {
        Self {
            change_groups: grouped.change_groups,
            orphan_markers: grouped.orphan_markers,
            change_count: grouped.change_count,
            options: options.clone(),
            checkpoint,
        }
    }

    pub fn grouped(&self) -> GroupedChanges {
        GroupedChanges {
            change_groups: self.change_groups.clone(),
            orphan_markers: self.orphan_markers.clone(),
            change_count: self.change_count,
        }
    }
}

/// Group `history`, reusing `previous` where possible.
///
/// `previous` is consumed: settled groups move into the result, so an
/// extension costs only the new changes plus refinalizing the last group.
pub fn group_changes_memo<H: DocHistory + ?Sized>(
    history: &H,
    options: &GroupingOptions,
    previous: Option<MemoizedChangeGroups>,
) -> MemoizedChangeGroups {
    if let Some(previous) = previous {
        if let Some(next) = extend(history, options, previous) {
            tracing::debug!(changes = next.change_count, "change groups extended incrementally");
            return next;
        }
        tracing::debug!("change group memo invalid; regrouping");
    }
    let (grouped, checkpoint) = run_full(history, options);
    MemoizedChangeGroups::from_parts(grouped, options, checkpoint)
}

fn extend<H: DocHistory + ?Sized>(
    history: &H,
    options: &GroupingOptions,
    previous: MemoizedChangeGroups,
) -> Option<MemoizedChangeGroups> {
    if previous.options != *options {
        return None;
    }
    let changes = history.changes();
    let seen = previous.change_count;
    if changes.len() < seen {
        return None;
    }
    let cp = &previous.checkpoint;
    // The log is append-only, so matching the last seen entry pins the prefix.
    let last_seen = seen.checked_sub(1).map(|i| &changes[i].hash);
    if last_seen != cp.last_hash.as_ref() {
        return None;
    }

    let doc = current_doc(history);
    let meta = VersionControlMetadata::from_doc(&doc);
    if !cp.branches_settled || merged_branch_keys(&meta) != cp.branches {
        return None;
    }

    let fresh = &changes[seen..];
    if fresh.is_empty() {
        return Some(previous);
    }
    let MemoizedChangeGroups {
        mut change_groups,
        mut orphan_markers,
        checkpoint: cp,
        ..
    } = previous;
    let mut tail = cp.tail?;

    let filter = options.datatype().and_then(|d| d.change_filter(&doc));
    let mut frontier = cp.frontier;
    let mut closing = None;
    for change in fresh {
        advance_frontier(&mut frontier, change);
        let hash = change.hash.as_str();
        if let Some(filter) = &filter {
            if !filter(change) && !options.is_visible(hash) {
                continue;
            }
        }
        if closing.is_some() || !options.grouping.accepts(&tail.open.group, change) {
            return None;
        }
        tail.open.group = tail.open.group.with_change(change);
        tail.open.end = frontier.clone();
        let anchored = options.anchored_at(hash);
        if !anchored.is_empty() {
            closing = Some(anchored);
        }
    }

    if tail.emitted {
        change_groups.pop();
    }
    let mut group = tail.open.group.clone();
    if let Some(markers) = &closing {
        group.markers = markers.clone();
    }
    let finalized = finalize(history, options, group, &tail.open.base, &tail.open.end);
    let emitted = matches!(finalized, Finalized::Kept(_));
    push_finalized(&mut change_groups, &mut orphan_markers, finalized);

    let checkpoint = Checkpoint {
        frontier,
        last_hash: fresh.last().map(|c| c.hash.clone()),
        tail: closing.is_none().then_some(Tail {
            open: tail.open,
            emitted,
        }),
        branches: cp.branches,
        branches_settled: true,
    };
    Some(MemoizedChangeGroups {
        change_groups,
        orphan_markers,
        change_count: changes.len(),
        options: options.clone(),
        checkpoint,
    })
}

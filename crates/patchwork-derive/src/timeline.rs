//! Flatten change groups and markers into the list a history view shows.

use patchwork_core::{ChangeHash, DocHistory, DocUrl};
use serde_json::{json, Value};

use crate::engine::GroupingOptions;
use crate::memo::{group_changes_memo, MemoizedChangeGroups};
use crate::types::{ChangeGroup, HeadsMarker, OrphanMarker};

#[derive(Debug, Clone, PartialEq)]
pub enum TimelineItem {
    ChangeGroup {
        /// `changeGroup-<from>-<to>`.
        id: String,
        heads: Vec<ChangeHash>,
        users: Vec<DocUrl>,
        time: Option<i64>,
        change_group: ChangeGroup,
    },
    Marker {
        marker: HeadsMarker,
        time: Option<i64>,
    },
}

impl TimelineItem {
    fn group(group: &ChangeGroup) -> Self {
        TimelineItem::ChangeGroup {
            id: format!("changeGroup-{}-{}", group.from, group.to),
            heads: vec![group.to.clone()],
            users: group.author_urls.clone(),
            time: group.time,
            change_group: group.clone(),
        }
    }

    pub fn id(&self) -> &str {
        match self {
            TimelineItem::ChangeGroup { id, .. } => id,
            TimelineItem::Marker { marker, .. } => &marker.id,
        }
    }

    pub fn heads(&self) -> &[ChangeHash] {
        match self {
            TimelineItem::ChangeGroup { heads, .. } => heads,
            TimelineItem::Marker { marker, .. } => &marker.heads,
        }
    }

    pub fn users(&self) -> &[DocUrl] {
        match self {
            TimelineItem::ChangeGroup { users, .. } => users,
            TimelineItem::Marker { marker, .. } => &marker.users,
        }
    }

    pub fn time(&self) -> Option<i64> {
        match self {
            TimelineItem::ChangeGroup { time, .. } | TimelineItem::Marker { time, .. } => *time,
        }
    }

    pub fn as_marker(&self) -> Option<&HeadsMarker> {
        match self {
            TimelineItem::Marker { marker, .. } => Some(marker),
            TimelineItem::ChangeGroup { .. } => None,
        }
    }

    /// JSON form: change groups as `{"type": "changeGroup", ...}`, markers
    /// in their own tagged shape with the item time added.
    pub fn to_json(&self) -> serde_json::Result<Value> {
        match self {
            TimelineItem::ChangeGroup {
                id,
                heads,
                users,
                time,
                change_group,
            } => Ok(json!({
                "type": "changeGroup",
                "id": id,
                "heads": heads,
                "users": users,
                "time": time,
                "changeGroup": serde_json::to_value(change_group)?,
            })),
            TimelineItem::Marker { marker, time } => {
                let mut v = serde_json::to_value(marker)?;
                if let Some(obj) = v.as_object_mut() {
                    obj.insert("time".into(), json!(time));
                }
                Ok(v)
            }
        }
    }
}

/// Interleave groups, their markers and orphaned markers.
///
/// A group introduced by a merge marker is shown through that marker only.
/// Other markers follow their group and take its time; orphans go before the
/// group at their position and keep their own time.
pub fn flatten_timeline(groups: &[ChangeGroup], orphans: &[OrphanMarker]) -> Vec<TimelineItem> {
    let mut items = Vec::new();
    let mut orphans = orphans.iter().peekable();

    for (position, group) in groups.iter().enumerate() {
        while let Some(orphan) = orphans.next_if(|o| o.position <= position) {
            items.push(TimelineItem::Marker {
                time: orphan.marker.time(),
                marker: orphan.marker.clone(),
            });
        }
        if group.merge_marker().is_none() {
            items.push(TimelineItem::group(group));
        }
        items.extend(group.markers.iter().map(|marker| TimelineItem::Marker {
            marker: marker.clone(),
            time: group.time,
        }));
    }
    items.extend(orphans.map(|o| TimelineItem::Marker {
        time: o.marker.time(),
        marker: o.marker.clone(),
    }));
    items
}

/// Group `history` (reusing `memo` when possible) and flatten it.
pub fn timeline<H: DocHistory + ?Sized>(
    history: &H,
    options: &GroupingOptions,
    memo: Option<MemoizedChangeGroups>,
) -> (Vec<TimelineItem>, MemoizedChangeGroups) {
    let grouped = group_changes_memo(history, options, memo);
    let items = flatten_timeline(&grouped.change_groups, &grouped.orphan_markers);
    (items, grouped)
}

/// Items from the last marker that hides earlier history onwards.
pub fn visible_history(items: &[TimelineItem]) -> &[TimelineItem] {
    let cut = items
        .iter()
        .rposition(|i| i.as_marker().is_some_and(|m| m.hide_history_before_this))
        .unwrap_or(0);
    &items[cut..]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MarkerKind;
    use patchwork_core::{Branch, BranchSource, Tag};

    fn group(from: &str, to: &str, time: i64) -> ChangeGroup {
        let mut g = ChangeGroup::seeded(from, to);
        g.time = Some(time);
        g.author_urls = vec!["patchwork:alice".into()];
        g
    }

    fn tag(name: &str, head: &str, at: i64) -> HeadsMarker {
        HeadsMarker::tag(&Tag {
            name: name.into(),
            heads: vec![head.into()],
            created_at: at,
            created_by: None,
        })
    }

    fn branch() -> Branch {
        Branch {
            name: "draft".into(),
            url: "patchwork:b".into(),
            created_at: 3,
            branch_heads: vec!["h0".into()],
            created_by: None,
            merge_metadata: None,
        }
    }

    #[test]
    fn groups_then_their_markers() {
        let mut first = group("a", "b", 10);
        first.markers = vec![tag("v1", "b", 99)];
        let items = flatten_timeline(&[first, group("c", "d", 20)], &[]);
        let ids: Vec<_> = items.iter().map(|i| i.id()).collect();
        assert_eq!(ids, vec!["changeGroup-a-b", "tag-b-v1", "changeGroup-c-d"]);
        assert_eq!(items[0].heads(), ["b".to_string()]);
        assert_eq!(items[0].users(), ["patchwork:alice".to_string()]);
        // Attached markers take the group's time.
        assert_eq!(items[1].time(), Some(10));
    }

    #[test]
    fn merge_marker_replaces_its_group() {
        let mut b = branch();
        b.merge_metadata = Some(patchwork_core::MergeMetadata {
            merged_at: 50,
            merge_heads: vec!["m".into()],
            merged_by: None,
            base_heads: None,
        });
        let marker = HeadsMarker::branch_merged(&b, b.merge_metadata.as_ref().unwrap());
        let mut merged = group("x", "m", 40);
        merged.markers = vec![marker.clone()];
        let items = flatten_timeline(&[group("a", "b", 10), merged], &[]);
        assert_eq!(items.len(), 2);
        assert_eq!(items[1].id(), "branch-merge-m");
        assert_eq!(items[1].time(), Some(40));
    }

    #[test]
    fn orphans_keep_position_and_own_time() {
        let orphans = vec![
            OrphanMarker {
                position: 1,
                marker: tag("mid", "q", 15),
            },
            OrphanMarker {
                position: 2,
                marker: tag("end", "r", 30),
            },
        ];
        let items = flatten_timeline(&[group("a", "b", 10), group("c", "d", 20)], &orphans);
        let ids: Vec<_> = items.iter().map(|i| i.id()).collect();
        assert_eq!(ids, vec!["changeGroup-a-b", "tag-q-mid", "changeGroup-c-d", "tag-r-end"]);
        assert_eq!(items[1].time(), Some(15));
    }

    #[test]
    fn history_before_origin_is_hidden() {
        let source = BranchSource {
            url: "patchwork:main".into(),
            branch_heads: vec!["b".into()],
        };
        let mut base = group("a", "b", 10);
        base.markers = vec![HeadsMarker::origin_of_this_branch(&source, &branch())];
        let items = flatten_timeline(&[base, group("c", "d", 20)], &[]);
        let visible = visible_history(&items);
        assert_eq!(visible.len(), 2);
        assert!(matches!(
            visible[0].as_marker().map(|m| &m.kind),
            Some(MarkerKind::OriginOfThisBranch { .. })
        ));
        assert_eq!(visible_history(&items[2..]).len(), 1);
    }

    #[test]
    fn json_shapes() {
        let items = flatten_timeline(&[group("a", "b", 10)], &[OrphanMarker {
            position: 1,
            marker: tag("v", "b", 12),
        }]);
        let g = items[0].to_json().unwrap();
        assert_eq!(g["type"], "changeGroup");
        assert_eq!(g["changeGroup"]["from"], "a");
        let m = items[1].to_json().unwrap();
        assert_eq!(m["type"], "tag");
        assert_eq!(m["time"], 12);
    }
}

use patchwork_core::VersionControlMetadata;
use patchwork_derive::{
    markers_for_doc, timeline, visible_history, ChangeGroup, EssayDatatype, GroupingOptions,
    MarkerKind, TimelineItem,
};
use patchwork_ledger::DocHandle;
use std::path::Path;
use std::sync::Arc;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::workspace::Workspace;

pub struct HistoryParams<'a> {
    pub repo_root: &'a Path,
    pub grouping: Option<&'a str>,
    pub batch_size: Option<usize>,
    pub max_gap_minutes: Option<u64>,
    pub json: bool,
    pub all: bool,
}

/// Grouping options for `doc`: the essay datatype plus markers derived from
/// its metadata (and its parent's, when it is a branch).
pub fn grouping_options(
    ws: &Workspace,
    doc: &DocHandle,
    grouping: Option<&str>,
    batch_size: Option<usize>,
    max_gap_minutes: Option<u64>,
) -> anyhow::Result<GroupingOptions> {
    let meta = doc.metadata();
    let source_meta = meta
        .branch_metadata
        .source
        .as_ref()
        .and_then(|s| ws.repo.find(&s.url))
        .map(|parent| parent.metadata());
    let markers = markers_for_doc(&meta, doc.url(), source_meta.as_ref());
    Ok(
        GroupingOptions::new(ws.settings.grouping(grouping, batch_size, max_gap_minutes)?)
            .with_datatype(Arc::new(EssayDatatype))
            .with_markers(markers),
    )
}

pub fn execute(params: HistoryParams<'_>) -> anyhow::Result<()> {
    let ws = Workspace::open(params.repo_root)?;
    let doc = ws.head()?;
    let options = grouping_options(
        &ws,
        &doc,
        params.grouping,
        params.batch_size,
        params.max_gap_minutes,
    )?;
    let (items, _) = timeline(&*doc.read(), &options, None);
    let items = if params.all {
        &items[..]
    } else {
        visible_history(&items)
    };

    if params.json {
        let values = items
            .iter()
            .map(TimelineItem::to_json)
            .collect::<serde_json::Result<Vec<_>>>()?;
        println!("{}", serde_json::to_string_pretty(&values)?);
        return Ok(());
    }
    let meta = doc.metadata();
    for line in render(items, &meta) {
        println!("{line}");
    }
    Ok(())
}

fn format_time(time: Option<i64>) -> String {
    time.and_then(|ms| OffsetDateTime::from_unix_timestamp_nanos(i128::from(ms) * 1_000_000).ok())
        .and_then(|t| t.format(&Rfc3339).ok())
        .unwrap_or_else(|| "-".to_string())
}

fn group_line(group: &ChangeGroup, meta: &VersionControlMetadata, indent: &str) -> String {
    let title = meta
        .summary_for(&group.id)
        .unwrap_or(group.fallback_summary.as_str());
    let who = if group.author_urls.is_empty() {
        group.actor_ids.join(", ")
    } else {
        group.author_urls.join(", ")
    };
    format!(
        "{indent}{}  {title}  ({who}; {} change(s))",
        format_time(group.time),
        group.changes.len()
    )
}

/// Text lines for a timeline, newest last. Merged branches list their
/// groups indented under the merge.
pub fn render(items: &[TimelineItem], meta: &VersionControlMetadata) -> Vec<String> {
    let mut lines = Vec::new();
    for item in items {
        match item {
            TimelineItem::ChangeGroup { change_group, .. } => {
                lines.push(group_line(change_group, meta, ""));
            }
            TimelineItem::Marker { marker, time } => {
                lines.push(format!("{}  * {}", format_time(*time), marker.label()));
                if let MarkerKind::OtherBranchMergedIntoThisDoc { change_groups, .. } = &marker.kind {
                    for g in change_groups {
                        lines.push(group_line(g, meta, "    "));
                    }
                }
            }
        }
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::initialized;
    use crate::{cmd_branch, cmd_doc, cmd_meta};

    fn history_lines(root: &Path) -> Vec<String> {
        let ws = Workspace::open(root).unwrap();
        let doc = ws.head().unwrap();
        let options = grouping_options(&ws, &doc, Some("by-author"), None, None).unwrap();
        let (items, _) = timeline(&*doc.read(), &options, None);
        render(visible_history(&items), &doc.metadata())
    }

    #[test]
    fn times_render_as_rfc3339() {
        assert_eq!(format_time(Some(0)), "1970-01-01T00:00:00Z");
        assert_eq!(format_time(None), "-");
    }

    #[test]
    fn edits_and_tags_show_up() {
        let tmp = initialized(Some("hello"));
        let root = tmp.path();
        cmd_doc::append(root, " world").unwrap();
        cmd_meta::tag(root, "v1").unwrap();

        let lines = history_lines(root);
        assert_eq!(lines.len(), 2, "{lines:#?}");
        assert!(lines[0].contains("added 11 characters"), "{}", lines[0]);
        assert!(lines[1].ends_with("* tag v1"), "{}", lines[1]);
    }

    #[test]
    fn merged_branch_groups_are_nested() {
        let tmp = initialized(Some("hello"));
        let root = tmp.path();
        cmd_branch::run(cmd_branch::BranchCmd::Create { name: "b".into() }, root).unwrap();
        let (main, branch) = {
            let ws = Workspace::open(root).unwrap();
            let head = ws.head().unwrap();
            let b = head.metadata().branch_metadata.branches[0].url.clone();
            (head.url().to_string(), b)
        };
        cmd_doc::switch(root, &branch).unwrap();
        cmd_doc::append(root, "!").unwrap();
        cmd_doc::switch(root, &main).unwrap();
        cmd_branch::run(cmd_branch::BranchCmd::Merge { branch: "b".into() }, root).unwrap();

        let lines = history_lines(root);
        let merge = lines
            .iter()
            .position(|l| l.contains("* merged branch b"))
            .expect("merge line");
        assert!(lines[merge + 1].starts_with("    "));
        assert!(lines[merge + 1].contains("added 1 character"));
    }
}

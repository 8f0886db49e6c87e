//! Annotations: what a diff or a discussion points at in the document.

use patchwork_core::{Discussion, Patch};
use serde::Serialize;
use serde_json::Value;
use std::cmp::Ordering;

use crate::datatype::Datatype;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Annotation {
    Added { anchor: Value, added: Value },
    Deleted { anchor: Value, deleted: Value },
    Changed { anchor: Value, before: Value, after: Value },
    Highlighted { anchor: Value, value: Value },
}

impl Annotation {
    pub fn anchor(&self) -> &Value {
        match self {
            Annotation::Added { anchor, .. }
            | Annotation::Deleted { anchor, .. }
            | Annotation::Changed { anchor, .. }
            | Annotation::Highlighted { anchor, .. } => anchor,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Annotation::Added { .. } => "added",
            Annotation::Deleted { .. } => "deleted",
            Annotation::Changed { .. } => "changed",
            Annotation::Highlighted { .. } => "highlighted",
        }
    }
}

/// Annotations shown together, optionally under a discussion thread.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnnotationGroup {
    pub annotations: Vec<Annotation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discussion: Option<Discussion>,
}

/// Stable id: the discussion id, else kind and anchor of the first annotation.
pub fn annotation_group_id(group: &AnnotationGroup) -> String {
    if let Some(d) = &group.discussion {
        return d.id.clone();
    }
    group
        .annotations
        .first()
        .map(|a| format!("{}:{}", a.kind(), a.anchor()))
        .unwrap_or_default()
}

/// True if every anchor overlaps some annotation of the group.
pub fn does_annotation_group_contain_anchors(
    datatype: &dyn Datatype,
    doc: &Value,
    group: &AnnotationGroup,
    anchors: &[Value],
) -> bool {
    !anchors.is_empty()
        && anchors.iter().all(|anchor| {
            group
                .annotations
                .iter()
                .any(|a| datatype.do_anchors_overlap(doc, a.anchor(), anchor))
        })
}

fn highlights(datatype: &dyn Datatype, doc: &Value, discussion: &Discussion) -> Vec<Annotation> {
    discussion
        .anchors
        .iter()
        .filter_map(|anchor| match datatype.value_of_anchor(doc, anchor) {
            Ok(Some(value)) => Some(Annotation::Highlighted {
                anchor: anchor.clone(),
                value,
            }),
            Ok(None) => {
                tracing::debug!(discussion = %discussion.id, %anchor, "anchor no longer resolves");
                None
            }
            Err(e) => {
                tracing::debug!(discussion = %discussion.id, error = %e, "anchor no longer resolves");
                None
            }
        })
        .collect()
}

/// Build the annotation groups for a diff from `before` to `doc`.
///
/// Unresolved anchored discussions become highlight groups and claim any
/// edit annotation overlapping one of their anchors. Remaining edits are
/// grouped by the datatype. Groups are ordered by their smallest sort key;
/// groups without one keep their relative order at the end.
pub fn annotation_groups<'a>(
    datatype: &dyn Datatype,
    doc: &Value,
    before: &Value,
    patches: &[Patch],
    discussions: impl IntoIterator<Item = &'a Discussion>,
) -> Vec<AnnotationGroup> {
    let mut edits = datatype.patches_to_annotations(doc, before, patches);
    let mut groups = Vec::new();

    for discussion in discussions
        .into_iter()
        .filter(|d| !d.resolved && !d.anchors.is_empty())
    {
        let highlighted = highlights(datatype, doc, discussion);
        if highlighted.is_empty() {
            continue;
        }
        let (mut claimed, rest): (Vec<_>, Vec<_>) = edits.into_iter().partition(|a| {
            highlighted
                .iter()
                .any(|h| datatype.do_anchors_overlap(doc, a.anchor(), h.anchor()))
        });
        edits = rest;
        claimed.extend(highlighted);
        groups.push(AnnotationGroup {
            annotations: claimed,
            discussion: Some(discussion.clone()),
        });
    }

    groups.extend(
        datatype
            .group_annotations(edits)
            .into_iter()
            .filter(|g| !g.is_empty())
            .map(|annotations| AnnotationGroup {
                annotations,
                discussion: None,
            }),
    );

    let mut keyed: Vec<(Option<f64>, AnnotationGroup)> = groups
        .into_iter()
        .map(|g| {
            let key = g
                .annotations
                .iter()
                .filter_map(|a| datatype.sort_anchors_by(doc, a.anchor()))
                .reduce(f64::min);
            (key, g)
        })
        .collect();
    keyed.sort_by(|(a, _), (b, _)| match (a, b) {
        (Some(a), Some(b)) => a.total_cmp(b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
    keyed.into_iter().map(|(_, g)| g).collect()
}

use patchwork_core::VersionControlMetadata;

use crate::types::HeadsMarker;

/// Derive the markers to show in a document's history from its metadata.
///
/// Order: general discussions (oldest first), merged branches, the branch
/// origin, branches created from this doc, tags. `source_meta` is the
/// metadata of the document this one was forked from, when it is a branch;
/// the origin marker is only shown if the source still lists this branch.
pub fn markers_for_doc(
    meta: &VersionControlMetadata,
    doc_url: &str,
    source_meta: Option<&VersionControlMetadata>,
) -> Vec<HeadsMarker> {
    let mut markers = Vec::new();

    let mut general: Vec<_> = meta.discussions.values().filter(|d| d.is_general()).collect();
    general.sort_by_key(|d| d.first_comment_time());
    markers.extend(general.into_iter().map(HeadsMarker::discussion));

    for (branch, merge) in meta.merged_branches() {
        if merge.merge_heads.is_empty() {
            tracing::warn!(branch = %branch.url, "merge metadata without heads; no marker");
            continue;
        }
        markers.push(HeadsMarker::branch_merged(branch, merge));
    }

    let source = meta.branch_metadata.source.as_ref();
    if let (Some(source), Some(parent)) = (source, source_meta) {
        match parent.branch(doc_url) {
            Some(branch) => markers.push(HeadsMarker::origin_of_this_branch(source, branch)),
            None => tracing::debug!(doc = doc_url, source = %source.url, "source does not list this branch"),
        }
    }

    // A branch forked at our own fork point adds nothing to this doc's history.
    markers.extend(
        meta.branch_metadata
            .branches
            .iter()
            .filter(|b| source.map_or(true, |s| s.branch_heads != b.branch_heads))
            .map(HeadsMarker::branch_created),
    );

    markers.extend(meta.tags.iter().map(HeadsMarker::tag));
    markers
}

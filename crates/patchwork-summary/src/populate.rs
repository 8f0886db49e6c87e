use anyhow::Result;
use patchwork_derive::{ChangeGroup, Datatype};
use patchwork_ledger::{set_change_group_summary, DocHandle};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::completion::TextCompletion;

/// Ask for a title for each group and store it in the document.
///
/// Groups that already have a stored summary are skipped unless `force`.
/// Each prompt compares the previous group's end state (or the empty
/// document) with this group's end state. Completion failures are logged
/// and the group is left without a summary. Returns the number written.
pub async fn populate_change_group_summaries(
    groups: &[ChangeGroup],
    handle: &DocHandle,
    datatype: &dyn Datatype,
    completion: &dyn TextCompletion,
    force: bool,
    cancel: &CancellationToken,
) -> Result<usize> {
    if !completion.is_active() {
        tracing::debug!(doc = %handle.url(), "no active completion; skipping summaries");
        return Ok(0);
    }
    let existing = handle.metadata();
    let empty = json!({});
    let mut written = 0;

    for (i, group) in groups.iter().enumerate() {
        if !force && existing.summary_for(&group.id).is_some() {
            continue;
        }
        let before: &Value = match i {
            0 => &empty,
            _ => &groups[i - 1].doc_at_end,
        };
        let Some(prompt) = datatype.prompt_for_ai_summary(before, &group.doc_at_end) else {
            continue;
        };

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = completion.complete(&prompt) => Some(result),
        };
        let Some(result) = result else {
            tracing::debug!(doc = %handle.url(), written, "summarization cancelled");
            break;
        };
        match result {
            Ok(title) if !title.is_empty() => {
                set_change_group_summary(handle, &group.id, &title)?;
                written += 1;
            }
            Ok(_) => tracing::warn!(group = %group.id, "empty summary returned"),
            Err(e) => tracing::warn!(group = %group.id, error = %e, "summary failed"),
        }
    }
    Ok(written)
}

use patchwork_core::{DecodedChange, Patch};
use serde_json::Value;

use crate::annotations::Annotation;
use crate::error::AnchorError;
use crate::types::ChangeGroup;

/// A change filter specialised to one document snapshot.
pub type ChangeFilter<'a> = Box<dyn Fn(&DecodedChange) -> bool + 'a>;

/// Hooks a document type supplies to the history engine. Every hook has a
/// generic default, so a datatype only overrides what it cares about.
pub trait Datatype: Send + Sync {
    fn id(&self) -> &str;

    /// Build a filter deciding which changes appear in history. Called once
    /// per grouping pass so doc-wide work can be done up front.
    fn change_filter<'a>(&'a self, _doc: &'a Value) -> Option<ChangeFilter<'a>> {
        None
    }

    /// Whether a diff patch counts as an edit.
    fn include_patch_in_change_group(&self, _patch: &Patch) -> bool {
        true
    }

    /// Summary used when no persisted summary exists. `None` falls back to `"{n} edit(s)"`.
    fn fallback_summary(&self, _group: &ChangeGroup) -> Option<String> {
        None
    }

    /// Prompt for an AI summary of the step from `before` to `after`.
    /// `None` means this datatype is not summarised.
    fn prompt_for_ai_summary(&self, _before: &Value, _after: &Value) -> Option<String> {
        None
    }

    fn patches_to_annotations(&self, _doc: &Value, _before: &Value, _patches: &[Patch]) -> Vec<Annotation> {
        Vec::new()
    }

    /// The value an anchor currently points at. `Ok(None)` and `Err` both
    /// mean the anchor no longer resolves.
    fn value_of_anchor(&self, _doc: &Value, _anchor: &Value) -> Result<Option<Value>, AnchorError> {
        Ok(None)
    }

    fn do_anchors_overlap(&self, _doc: &Value, a: &Value, b: &Value) -> bool {
        a == b
    }

    fn group_annotations(&self, annotations: Vec<Annotation>) -> Vec<Vec<Annotation>> {
        annotations.into_iter().map(|a| vec![a]).collect()
    }

    /// Sort key for anchors; `None` leaves groups in their computed order.
    fn sort_anchors_by(&self, _doc: &Value, _anchor: &Value) -> Option<f64> {
        None
    }
}

/// `"{n} edit"` / `"{n} edits"`.
pub fn default_fallback_summary(group: &ChangeGroup) -> String {
    let n = group.number_of_edits;
    format!("{n} edit{}", if n == 1 { "" } else { "s" })
}

pub(crate) fn fallback_summary_for(datatype: Option<&dyn Datatype>, group: &ChangeGroup) -> String {
    datatype
        .and_then(|d| d.fallback_summary(group))
        .unwrap_or_else(|| default_fallback_summary(group))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Plain;

    impl Datatype for Plain {
        fn id(&self) -> &str {
            "plain"
        }
    }

    #[test]
    fn default_summary_pluralizes() {
        let mut g = ChangeGroup::seeded("a", "b");
        g.number_of_edits = 1;
        assert_eq!(default_fallback_summary(&g), "1 edit");
        g.number_of_edits = 3;
        assert_eq!(fallback_summary_for(Some(&Plain as &dyn Datatype), &g), "3 edits");
        assert_eq!(fallback_summary_for(None, &g), "3 edits");
    }

    #[test]
    fn default_hooks_are_permissive() {
        let doc = serde_json::json!({});
        let p = Patch::Put {
            path: vec![],
            value: Value::Null,
        };
        assert!(Plain.change_filter(&doc).is_none());
        assert!(Plain.include_patch_in_change_group(&p));
        assert!(Plain.do_anchors_overlap(&doc, &serde_json::json!(1), &serde_json::json!(1)));
        assert_eq!(Plain.value_of_anchor(&doc, &serde_json::json!(1)), Ok(None));
    }
}

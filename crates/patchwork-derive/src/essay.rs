//! The essay datatype: a document whose `content` is a single text field.
//! Anchors are `{from, to}` character ranges into `content`.

use patchwork_core::meta::fields;
use patchwork_core::{DecodedChange, Op, Patch, Prop};
use serde_json::{json, Value};

use crate::annotations::Annotation;
use crate::datatype::{ChangeFilter, Datatype};
use crate::error::AnchorError;
use crate::types::ChangeGroup;

pub const CONTENT: &str = "content";

const METADATA_FIELDS: [&str; 4] = [
    fields::BRANCH_METADATA,
    fields::TAGS,
    fields::DISCUSSIONS,
    fields::CHANGE_GROUP_SUMMARIES,
];

#[derive(Debug, Clone, Copy, Default)]
pub struct EssayDatatype;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Range {
    from: usize,
    to: usize,
}

impl Range {
    fn parse(anchor: &Value) -> Result<Self, AnchorError> {
        let field = |name: &str| {
            anchor
                .get(name)
                .and_then(Value::as_u64)
                .map(|n| n as usize)
                .ok_or_else(|| AnchorError::Malformed(anchor.to_string()))
        };
        Ok(Self {
            from: field("from")?,
            to: field("to")?,
        })
    }

    fn to_value(self) -> Value {
        json!({ "from": self.from, "to": self.to })
    }
}

fn content(doc: &Value) -> &str {
    doc.get(CONTENT).and_then(Value::as_str).unwrap_or("")
}

fn root_key(op: &Op) -> Option<&str> {
    match op.path().first() {
        Some(Prop::Key(k)) => Some(k),
        _ => None,
    }
}

/// Only changes touching something other than version-control metadata.
fn is_content_change(change: &DecodedChange) -> bool {
    change.ops.is_empty()
        || change
            .ops
            .iter()
            .any(|op| root_key(op).map_or(true, |k| !METADATA_FIELDS.contains(&k)))
}

/// Character index of a text patch inside `content`.
fn content_index(patch: &Patch) -> Option<usize> {
    match patch.path() {
        [Prop::Key(k), Prop::Index(i)] if k == CONTENT => Some(*i),
        _ => None,
    }
}

fn text_counts(patches: &[Patch]) -> (usize, usize) {
    let (mut added, mut removed) = (0, 0);
    for patch in patches.iter().filter(|p| p.root_key() == Some(CONTENT)) {
        match patch {
            Patch::Splice { value, .. } => added += value.chars().count(),
            Patch::Put {
                value: Value::String(s),
                ..
            } => added += s.chars().count(),
            Patch::Del { length, .. } if content_index(patch).is_some() => removed += length,
            _ => {}
        }
    }
    (added, removed)
}

fn chars(n: usize) -> String {
    format!("{n} character{}", if n == 1 { "" } else { "s" })
}

impl Datatype for EssayDatatype {
    fn id(&self) -> &str {
        "essay"
    }

    fn change_filter<'a>(&'a self, _doc: &'a Value) -> Option<ChangeFilter<'a>> {
        Some(Box::new(is_content_change))
    }

    fn include_patch_in_change_group(&self, patch: &Patch) -> bool {
        patch.root_key() == Some(CONTENT)
    }

    fn fallback_summary(&self, group: &ChangeGroup) -> Option<String> {
        match text_counts(&group.diff.patches) {
            (0, 0) => None,
            (added, 0) => Some(format!("added {}", chars(added))),
            (0, removed) => Some(format!("removed {}", chars(removed))),
            (added, removed) => Some(format!("added {} and removed {removed}", chars(added))),
        }
    }

    fn prompt_for_ai_summary(&self, before: &Value, after: &Value) -> Option<String> {
        Some(format!(
            "Summarize the changes in this diff in a few words. \
             Only return a short sentence, not a list and no preamble.\n\n\
             <before>\n{}\n</before>\n\n<after>\n{}\n</after>",
            content(before),
            content(after)
        ))
    }

    fn patches_to_annotations(&self, _doc: &Value, before: &Value, patches: &[Patch]) -> Vec<Annotation> {
        let mut text: Vec<char> = content(before).chars().collect();
        let mut out: Vec<Annotation> = Vec::new();

        for patch in patches {
            if let Patch::Put {
                path,
                value: Value::String(s),
            } = patch
            {
                if matches!(path.as_slice(), [Prop::Key(k)] if k == CONTENT) {
                    text = s.chars().collect();
                    out.push(Annotation::Added {
                        anchor: Range { from: 0, to: text.len() }.to_value(),
                        added: json!(s),
                    });
                }
                continue;
            }
            let Some(index) = content_index(patch) else {
                continue;
            };
            let index = index.min(text.len());
            match patch {
                Patch::Del { length, .. } => {
                    let end = (index + length).min(text.len());
                    let deleted: String = text.drain(index..end).collect();
                    out.push(Annotation::Deleted {
                        anchor: Range { from: index, to: index }.to_value(),
                        deleted: json!(deleted),
                    });
                }
                Patch::Splice { value, .. } => {
                    let inserted: Vec<char> = value.chars().collect();
                    let anchor = Range {
                        from: index,
                        to: index + inserted.len(),
                    }
                    .to_value();
                    text.splice(index..index, inserted);

                    // A deletion at the same spot followed by text is a replacement.
                    let replaced = match out.last() {
                        Some(Annotation::Deleted { anchor: at, deleted })
                            if Range::parse(at).is_ok_and(|r| r.from == index) =>
                        {
                            Some(deleted.clone())
                        }
                        _ => None,
                    };
                    match replaced {
                        Some(before) => {
                            out.pop();
                            out.push(Annotation::Changed {
                                anchor,
                                before,
                                after: json!(value),
                            });
                        }
                        None => out.push(Annotation::Added {
                            anchor,
                            added: json!(value),
                        }),
                    }
                }
                _ => {}
            }
        }
        out
    }

    fn value_of_anchor(&self, doc: &Value, anchor: &Value) -> Result<Option<Value>, AnchorError> {
        let Range { from, to } = Range::parse(anchor)?;
        let text: Vec<char> = content(doc).chars().collect();
        if from > to || to > text.len() {
            return Err(AnchorError::OutOfRange {
                from,
                to,
                len: text.len(),
            });
        }
        Ok(Some(Value::String(text[from..to].iter().collect())))
    }

    fn do_anchors_overlap(&self, _doc: &Value, a: &Value, b: &Value) -> bool {
        match (Range::parse(a), Range::parse(b)) {
            (Ok(a), Ok(b)) => a == b || (a.from < b.to && b.from < a.to),
            _ => a == b,
        }
    }

    /// Annotations whose ranges touch or overlap end up in one group.
    fn group_annotations(&self, annotations: Vec<Annotation>) -> Vec<Vec<Annotation>> {
        let mut ranged: Vec<(Option<Range>, Annotation)> = annotations
            .into_iter()
            .map(|a| (Range::parse(a.anchor()).ok(), a))
            .collect();
        ranged.sort_by_key(|(r, _)| r.map_or(usize::MAX, |r| r.from));

        let mut groups: Vec<Vec<Annotation>> = Vec::new();
        let mut reach: Option<usize> = None;
        for (range, annotation) in ranged {
            match (range, reach) {
                (Some(r), Some(end)) if r.from <= end => {
                    if let Some(group) = groups.last_mut() {
                        group.push(annotation);
                    }
                    reach = Some(end.max(r.to));
                }
                _ => {
                    reach = range.map(|r| r.to);
                    groups.push(vec![annotation]);
                }
            }
        }
        groups
    }

    fn sort_anchors_by(&self, _doc: &Value, anchor: &Value) -> Option<f64> {
        Range::parse(anchor).ok().map(|r| r.from as f64)
    }
}

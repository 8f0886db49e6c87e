use patchwork_core::patch::path_string;
use patchwork_core::{CoreError, DecodedChange, Op, Prop, Result};
use serde_json::{Map, Value};

fn invalid(path: &[Prop]) -> CoreError {
    CoreError::InvalidPath(path_string(path))
}

/// Walk `path` from `cur`. With `create`, missing map entries are created
/// (as null, to be shaped by the caller) and null parents become maps.
fn resolve_mut<'a>(mut cur: &'a mut Value, path: &[Prop], create: bool) -> Result<&'a mut Value> {
    for (depth, prop) in path.iter().enumerate() {
        cur = match prop {
            Prop::Key(k) => {
                if create && cur.is_null() {
                    *cur = Value::Object(Map::new());
                }
                let obj = cur
                    .as_object_mut()
                    .ok_or_else(|| invalid(&path[..=depth]))?;
                if create {
                    obj.entry(k.clone()).or_insert(Value::Null)
                } else {
                    obj.get_mut(k).ok_or_else(|| invalid(&path[..=depth]))?
                }
            }
            Prop::Index(i) => cur
                .as_array_mut()
                .and_then(|items| items.get_mut(*i))
                .ok_or_else(|| invalid(&path[..=depth]))?,
        };
    }
    Ok(cur)
}

/// Apply one op to a document in place.
pub fn apply_op(doc: &mut Value, op: &Op) -> Result<()> {
    match op {
        Op::Put { path, value } => {
            let Some((last, parent_path)) = path.split_last() else {
                *doc = value.clone();
                return Ok(());
            };
            let parent = resolve_mut(doc, parent_path, true)?;
            match last {
                Prop::Key(k) => {
                    if parent.is_null() {
                        *parent = Value::Object(Map::new());
                    }
                    parent
                        .as_object_mut()
                        .ok_or_else(|| invalid(path))?
                        .insert(k.clone(), value.clone());
                }
                Prop::Index(i) => {
                    let items = parent.as_array_mut().ok_or_else(|| invalid(path))?;
                    if *i < items.len() {
                        items[*i] = value.clone();
                    } else if *i == items.len() {
                        items.push(value.clone());
                    } else {
                        return Err(invalid(path));
                    }
                }
            }
        }
        Op::Delete { path } => {
            let Some((last, parent_path)) = path.split_last() else {
                *doc = Value::Object(Map::new());
                return Ok(());
            };
            // Deleting something that is already gone is a no-op.
            let Ok(parent) = resolve_mut(doc, parent_path, false) else {
                return Ok(());
            };
            match (last, parent) {
                (Prop::Key(k), Value::Object(obj)) => {
                    obj.remove(k);
                }
                (Prop::Index(i), Value::Array(items)) if *i < items.len() => {
                    items.remove(*i);
                }
                _ => {}
            }
        }
        Op::Insert {
            path,
            index,
            values,
        } => {
            let target = resolve_mut(doc, path, true)?;
            if target.is_null() {
                *target = Value::Array(Vec::new());
            }
            let items = target.as_array_mut().ok_or_else(|| invalid(path))?;
            let at = (*index).min(items.len());
            for (offset, v) in values.iter().enumerate() {
                items.insert(at + offset, v.clone());
            }
        }
        Op::Splice {
            path,
            index,
            delete,
            text,
        } => {
            let target = resolve_mut(doc, path, true)?;
            if target.is_null() {
                *target = Value::String(String::new());
            }
            let current = target.as_str().ok_or_else(|| invalid(path))?;
            let chars: Vec<char> = current.chars().collect();
            let at = (*index).min(chars.len());
            let end = at.saturating_add(*delete).min(chars.len());
            let mut out: String = chars[..at].iter().collect();
            out.push_str(text);
            out.extend(&chars[end..]);
            *target = Value::String(out);
        }
    }
    Ok(())
}

/// Apply every op of a change. Ops that no longer fit the document (for
/// example because a concurrent change removed their target) are skipped.
pub fn apply_change(doc: &mut Value, change: &DecodedChange) {
    for op in &change.ops {
        if let Err(e) = apply_op(doc, op) {
            tracing::debug!(change = %change.hash, error = %e, "skipping op");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use patchwork_core::path;
    use serde_json::json;

    fn applied(mut doc: Value, op: Op) -> Value {
        apply_op(&mut doc, &op).unwrap();
        doc
    }

    #[test]
    fn put_creates_intermediate_maps() {
        let doc = applied(
            json!({}),
            Op::Put {
                path: path!["a", "b"],
                value: json!(1),
            },
        );
        assert_eq!(doc, json!({"a": {"b": 1}}));
    }

    #[test]
    fn put_appends_at_list_end() {
        let doc = applied(
            json!({"l": [1]}),
            Op::Put {
                path: path!["l", 1usize],
                value: json!(2),
            },
        );
        assert_eq!(doc, json!({"l": [1, 2]}));
    }

    #[test]
    fn put_past_list_end_is_invalid() {
        let mut doc = json!({"l": []});
        let err = apply_op(
            &mut doc,
            &Op::Put {
                path: path!["l", 3usize],
                value: json!(0),
            },
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::InvalidPath(p) if p == "l/3"));
    }

    #[test]
    fn delete_missing_is_noop() {
        let doc = applied(
            json!({"a": 1}),
            Op::Delete {
                path: path!["x", "y"],
            },
        );
        assert_eq!(doc, json!({"a": 1}));
    }

    #[test]
    fn delete_key_and_index() {
        let doc = applied(json!({"a": 1, "l": [1, 2, 3]}), Op::Delete { path: path!["a"] });
        let doc = applied(
            doc,
            Op::Delete {
                path: path!["l", 1usize],
            },
        );
        assert_eq!(doc, json!({"l": [1, 3]}));
    }

    #[test]
    fn insert_creates_list_and_clamps_index() {
        let doc = applied(
            json!({}),
            Op::Insert {
                path: path!["tags"],
                index: 5,
                values: vec![json!("a"), json!("b")],
            },
        );
        assert_eq!(doc, json!({"tags": ["a", "b"]}));
    }

    #[test]
    fn splice_is_char_indexed() {
        let doc = applied(
            json!({"content": "héllo"}),
            Op::Splice {
                path: path!["content"],
                index: 1,
                delete: 1,
                text: "e".into(),
            },
        );
        assert_eq!(doc, json!({"content": "hello"}));
    }

    #[test]
    fn splice_clamps_range() {
        let doc = applied(
            json!({}),
            Op::Splice {
                path: path!["content"],
                index: 10,
                delete: 10,
                text: "hi".into(),
            },
        );
        assert_eq!(doc, json!({"content": "hi"}));
    }
}

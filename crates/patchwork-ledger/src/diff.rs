use patchwork_core::{Patch, Path, Prop};
use serde_json::Value;

/// Structural patches that turn `before` into `after`.
///
/// Maps diff per key, strings and lists by their common prefix and suffix.
/// Lists whose changed window keeps its length are diffed element-wise so a
/// field edit inside a record stays a single nested patch.
pub fn diff_values(before: &Value, after: &Value) -> Vec<Patch> {
    let mut out = Vec::new();
    diff_at(&mut Vec::new(), before, after, &mut out);
    out
}

fn child(path: &Path, prop: impl Into<Prop>) -> Path {
    let mut p = path.clone();
    p.push(prop.into());
    p
}

fn diff_at(path: &mut Path, before: &Value, after: &Value, out: &mut Vec<Patch>) {
    if before == after {
        return;
    }
    match (before, after) {
        (Value::Object(a), Value::Object(b)) => {
            for key in a.keys().filter(|k| !b.contains_key(*k)) {
                out.push(Patch::Del {
                    path: child(path, key.as_str()),
                    length: 1,
                });
            }
            for (key, vb) in b {
                match a.get(key) {
                    None => out.push(Patch::Put {
                        path: child(path, key.as_str()),
                        value: vb.clone(),
                    }),
                    Some(va) => {
                        path.push(Prop::from(key.as_str()));
                        diff_at(path, va, vb, out);
                        path.pop();
                    }
                }
            }
        }
        (Value::Array(a), Value::Array(b)) => diff_lists(path, a, b, out),
        (Value::String(a), Value::String(b)) => diff_text(path, a, b, out),
        _ => out.push(Patch::Put {
            path: path.clone(),
            value: after.clone(),
        }),
    }
}

/// Length of the common prefix, and of the common suffix of what remains.
fn common_ends<T: PartialEq>(a: &[T], b: &[T]) -> (usize, usize) {
    let prefix = a.iter().zip(b).take_while(|(x, y)| x == y).count();
    let suffix = a[prefix..]
        .iter()
        .rev()
        .zip(b[prefix..].iter().rev())
        .take_while(|(x, y)| x == y)
        .count();
    (prefix, suffix)
}

fn diff_lists(path: &mut Path, a: &[Value], b: &[Value], out: &mut Vec<Patch>) {
    let (prefix, suffix) = common_ends(a, b);
    let removed = &a[prefix..a.len() - suffix];
    let inserted = &b[prefix..b.len() - suffix];

    if removed.len() == inserted.len() {
        for (offset, (va, vb)) in removed.iter().zip(inserted).enumerate() {
            path.push(Prop::Index(prefix + offset));
            diff_at(path, va, vb, out);
            path.pop();
        }
        return;
    }
    if !removed.is_empty() {
        out.push(Patch::Del {
            path: child(path, prefix),
            length: removed.len(),
        });
    }
    if !inserted.is_empty() {
        out.push(Patch::Insert {
            path: child(path, prefix),
            values: inserted.to_vec(),
        });
    }
}

fn diff_text(path: &Path, a: &str, b: &str, out: &mut Vec<Patch>) {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let (prefix, suffix) = common_ends(&a, &b);
    let removed = a.len() - suffix - prefix;
    let inserted: String = b[prefix..b.len() - suffix].iter().collect();

    if removed > 0 {
        out.push(Patch::Del {
            path: child(path, prefix),
            length: removed,
        });
    }
    if !inserted.is_empty() {
        out.push(Patch::Splice {
            path: child(path, prefix),
            value: inserted,
        });
    }
}

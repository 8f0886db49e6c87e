use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// One step of a path into a document: a map key or a list index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Prop {
    Key(String),
    Index(usize),
}

impl From<&str> for Prop {
    fn from(s: &str) -> Self {
        Prop::Key(s.to_string())
    }
}

impl From<String> for Prop {
    fn from(s: String) -> Self {
        Prop::Key(s)
    }
}

impl From<usize> for Prop {
    fn from(i: usize) -> Self {
        Prop::Index(i)
    }
}

impl fmt::Display for Prop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Prop::Key(k) => f.write_str(k),
            Prop::Index(i) => write!(f, "{i}"),
        }
    }
}

pub type Path = Vec<Prop>;

/// Build a path from anything convertible to props.
#[macro_export]
macro_rules! path {
    ($($p:expr),* $(,)?) => {
        vec![$($crate::patch::Prop::from($p)),*]
    };
}

/// Render a path as `a/b/0` for messages.
pub fn path_string(path: &[Prop]) -> String {
    path.iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join("/")
}

/// A mutation recorded inside a change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Op {
    /// Set the value at `path`, creating intermediate maps.
    Put { path: Path, value: Value },
    /// Remove the key or list element at `path`.
    Delete { path: Path },
    /// Insert `values` into the list at `path` starting at `index`.
    Insert {
        path: Path,
        index: usize,
        values: Vec<Value>,
    },
    /// Edit the text at `path`: remove `delete` chars at `index`, then insert `text`.
    Splice {
        path: Path,
        index: usize,
        delete: usize,
        #[serde(default)]
        text: String,
    },
}

impl Op {
    pub fn path(&self) -> &[Prop] {
        match self {
            Op::Put { path, .. }
            | Op::Delete { path }
            | Op::Insert { path, .. }
            | Op::Splice { path, .. } => path,
        }
    }
}

fn one() -> usize {
    1
}

/// A structural difference between two document states. The last prop of a
/// `del`, `insert` or `splice` path is the list/text index it applies at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Patch {
    Put {
        path: Path,
        value: Value,
    },
    Del {
        path: Path,
        #[serde(default = "one")]
        length: usize,
    },
    Insert {
        path: Path,
        values: Vec<Value>,
    },
    Splice {
        path: Path,
        value: String,
    },
}

impl Patch {
    pub fn path(&self) -> &[Prop] {
        match self {
            Patch::Put { path, .. }
            | Patch::Del { path, .. }
            | Patch::Insert { path, .. }
            | Patch::Splice { path, .. } => path,
        }
    }

    /// The top-level document key this patch touches, if any.
    pub fn root_key(&self) -> Option<&str> {
        match self.path().first() {
            Some(Prop::Key(k)) => Some(k),
            _ => None,
        }
    }
}

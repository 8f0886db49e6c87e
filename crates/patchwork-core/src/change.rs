use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CoreError, Result};
use crate::hash::content_hash;
use crate::patch::Op;
use crate::types::{is_doc_url, ActorId, ChangeHash, DocUrl, Heads};

/// Free-form metadata carried by a change. `author` points at a contact document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangeMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<DocUrl>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// A change as read from the log: immutable, identified by its hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecodedChange {
    pub hash: ChangeHash,
    pub actor: ActorId,
    pub seq: u64,
    #[serde(default)]
    pub deps: Heads,
    /// Unix millis; 0 means the writer recorded no time.
    #[serde(default)]
    pub time: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default)]
    pub metadata: ChangeMetadata,
    #[serde(default)]
    pub ops: Vec<Op>,
}

impl DecodedChange {
    pub fn author(&self) -> Option<&str> {
        self.metadata.author.as_deref()
    }

    /// The change time, if one was recorded.
    pub fn timestamp(&self) -> Option<i64> {
        (self.time > 0).then_some(self.time)
    }
}

/// Parameters for building a new change.
pub struct ChangeParams<'a> {
    pub actor: &'a str,
    pub seq: u64,
    pub deps: Heads,
    pub time: i64,
    pub message: Option<&'a str>,
    pub author: Option<&'a str>,
    pub ops: Vec<Op>,
}

/// Compute a change's hash: encode without the `hash` field, canonicalize, SHA-256.
pub fn compute_change_hash(change: &DecodedChange) -> Result<ChangeHash> {
    let mut val = serde_json::to_value(change)?;
    if let Some(obj) = val.as_object_mut() {
        obj.remove("hash");
    }
    Ok(content_hash(&val)?)
}

/// Build and hash a new change.
pub fn new_change(params: ChangeParams<'_>) -> Result<DecodedChange> {
    if let Some(author) = params.author {
        if !is_doc_url(author) {
            return Err(CoreError::InvalidAuthor(author.to_string()));
        }
    }
    let mut deps = params.deps;
    crate::types::normalize_heads(&mut deps);

    let mut change = DecodedChange {
        hash: String::new(),
        actor: params.actor.to_string(),
        seq: params.seq,
        deps,
        time: params.time,
        message: params.message.map(|s| s.to_string()),
        metadata: ChangeMetadata {
            author: params.author.map(|s| s.to_string()),
            extra: serde_json::Map::new(),
        },
        ops: params.ops,
    };
    change.hash = compute_change_hash(&change)?;
    Ok(change)
}

/// Encode a change to its raw wire form (one JSON document).
pub fn encode_change(change: &DecodedChange) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(change)?)
}

/// Decode a raw change, validating author metadata and the recorded hash.
pub fn decode_change(raw: &[u8]) -> Result<DecodedChange> {
    let change: DecodedChange = serde_json::from_slice(raw)?;
    if let Some(author) = change.author() {
        if !is_doc_url(author) {
            return Err(CoreError::InvalidAuthor(author.to_string()));
        }
    }
    let computed = compute_change_hash(&change)?;
    if computed != change.hash {
        return Err(CoreError::HashMismatch {
            recorded: change.hash,
            computed,
        });
    }
    Ok(change)
}

/// Hex-encoded SHA-256 of a change's canonical encoding.
pub type ChangeHash = String;

/// Identifier of one writer (one replica of one document).
pub type ActorId = String;

/// Document URL, e.g. `patchwork:01j9z...`. Contact references use the same shape.
pub type DocUrl = String;

/// A set of change hashes describing a causal frontier. Kept sorted and deduplicated.
pub type Heads = Vec<ChangeHash>;

/// Scheme prefix for document URLs.
pub const URL_SCHEME: &str = "patchwork:";

/// Mint a fresh document URL.
pub fn new_doc_url() -> DocUrl {
    format!("{URL_SCHEME}{}", ulid::Ulid::new().to_string().to_lowercase())
}

/// True if `s` has the shape of a document URL (`patchwork:<alnum id>`).
pub fn is_doc_url(s: &str) -> bool {
    s.strip_prefix(URL_SCHEME)
        .is_some_and(|id| !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric()))
}

/// The id part of a document URL (used for file names).
pub fn doc_id(url: &str) -> &str {
    url.strip_prefix(URL_SCHEME).unwrap_or(url)
}

/// Mint a fresh actor id: 32 lowercase hex chars.
pub fn new_actor_id() -> ActorId {
    hex::encode(ulid::Ulid::new().to_bytes())
}

/// Current wall-clock time in unix milliseconds.
pub fn now_millis() -> i64 {
    (time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

/// Sort and deduplicate heads in place.
pub fn normalize_heads(heads: &mut Heads) {
    heads.sort();
    heads.dedup();
}

pub mod change;
pub mod error;
pub mod hash;
pub mod history;
pub mod meta;
pub mod patch;
pub mod types;

pub use change::{decode_change, encode_change, new_change, ChangeMetadata, ChangeParams, DecodedChange};
pub use error::{CoreError, Result};
pub use history::{advance_frontier, DocHistory};
pub use meta::{
    Branch, BranchMetadata, BranchSource, ChangeGroupSummary, Discussion, DiscussionComment,
    MergeMetadata, Tag, VersionControlMetadata,
};
pub use patch::{Op, Patch, Path, Prop};
pub use types::*;

pub mod paths;
pub mod lock;
pub mod materialize;
pub mod diff;
pub mod log;
pub mod store;
pub mod repo;
pub mod branches;
pub mod metadata;

pub use paths::WorkspacePaths;
pub use lock::{FileLock, LockScope, WorkspaceLock};
pub use log::{ChangeOptions, DocLog};
pub use repo::{DocHandle, Repo};
pub use diff::diff_values;
pub use store::{load_doc, save_doc};
pub use branches::{create_branch, delete_branch, merge_branch, rebase_branch, rename_branch};
pub use metadata::{
    add_comment, create_tag, resolve_discussion, set_change_group_summary, start_discussion,
};

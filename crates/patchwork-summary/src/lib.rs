mod completion;
mod populate;
mod scheduler;

pub use completion::{HttpCompletion, TextCompletion};
pub use populate::populate_change_group_summaries;
pub use scheduler::{SummaryScheduler, DEFAULT_QUIET};

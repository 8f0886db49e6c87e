//! Grouping predicates: decide whether a change extends the group in
//! progress or starts a new one.

use patchwork_core::DecodedChange;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::error::ConfigError;
use crate::types::ChangeGroup;

const MINUTE_MS: i64 = 60 * 1000;

pub type GroupingFn = dyn Fn(&ChangeGroup, &DecodedChange) -> bool + Send + Sync;

/// Preset names accepted by [`GroupingConfig`].
pub const PRESETS: &[&str] = &[
    "by-actor",
    "by-actor-and-num-changes",
    "by-author",
    "by-number-of-changes",
    "tags-only",
    "by-edit-time",
    "by-author-or-time",
];

pub fn by_actor(group: &ChangeGroup, change: &DecodedChange) -> bool {
    group.actor_ids.first() == Some(&change.actor)
}

pub fn by_actor_and_num_changes(batch_size: usize, group: &ChangeGroup, change: &DecodedChange) -> bool {
    by_actor(group, change) && group.changes.len() < batch_size
}

/// Unattributed changes always join the current group.
pub fn by_author(group: &ChangeGroup, change: &DecodedChange) -> bool {
    match change.author() {
        None => true,
        Some(author) => group.author_urls.iter().any(|a| a == author),
    }
}

pub fn by_number_of_changes(batch_size: usize, group: &ChangeGroup, _change: &DecodedChange) -> bool {
    group.changes.len() < batch_size
}

pub fn tags_only(_group: &ChangeGroup, _change: &DecodedChange) -> bool {
    true
}

/// True when the change comes within `max_gap_minutes` of the group's last
/// timed change. Untimed changes join an untimed group.
pub fn by_edit_time(max_gap_minutes: u64, group: &ChangeGroup, change: &DecodedChange) -> bool {
    match (group.time, change.timestamp()) {
        (_, None) => true,
        (None, Some(_)) => false,
        (Some(g), Some(c)) => c < g.saturating_add(gap_ms(max_gap_minutes)),
    }
}

/// Author match and time match must both hold; a missing author or a
/// missing time on either side passes that half.
pub fn by_author_or_time(max_gap_minutes: u64, group: &ChangeGroup, change: &DecodedChange) -> bool {
    let time_match = match (group.time, change.timestamp()) {
        (Some(g), Some(c)) => c < g.saturating_add(gap_ms(max_gap_minutes)),
        _ => true,
    };
    by_author(group, change) && time_match
}

fn gap_ms(minutes: u64) -> i64 {
    i64::try_from(minutes)
        .unwrap_or(i64::MAX)
        .saturating_mul(MINUTE_MS)
}

/// The grouping rule in effect.
#[derive(Clone)]
pub enum Grouping {
    ByActor,
    ByActorAndNumChanges { batch_size: usize },
    ByAuthor,
    ByNumberOfChanges { batch_size: usize },
    TagsOnly,
    ByEditTime { max_gap_minutes: u64 },
    ByAuthorOrTime { max_gap_minutes: u64 },
    /// Caller-supplied rule. Two custom groupings are equal only if they
    /// share the same function.
    Custom(Arc<GroupingFn>),
}

impl Default for Grouping {
    fn default() -> Self {
        Grouping::ByAuthorOrTime { max_gap_minutes: 60 }
    }
}

impl Grouping {
    /// Should `change` be folded into `group`?
    pub fn accepts(&self, group: &ChangeGroup, change: &DecodedChange) -> bool {
        match self {
            Grouping::ByActor => by_actor(group, change),
            Grouping::ByActorAndNumChanges { batch_size } => {
                by_actor_and_num_changes(*batch_size, group, change)
            }
            Grouping::ByAuthor => by_author(group, change),
            Grouping::ByNumberOfChanges { batch_size } => {
                by_number_of_changes(*batch_size, group, change)
            }
            Grouping::TagsOnly => tags_only(group, change),
            Grouping::ByEditTime { max_gap_minutes } => by_edit_time(*max_gap_minutes, group, change),
            Grouping::ByAuthorOrTime { max_gap_minutes } => {
                by_author_or_time(*max_gap_minutes, group, change)
            }
            Grouping::Custom(f) => f(group, change),
        }
    }

    pub fn custom(f: impl Fn(&ChangeGroup, &DecodedChange) -> bool + Send + Sync + 'static) -> Self {
        Grouping::Custom(Arc::new(f))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Grouping::ByActor => "by-actor",
            Grouping::ByActorAndNumChanges { .. } => "by-actor-and-num-changes",
            Grouping::ByAuthor => "by-author",
            Grouping::ByNumberOfChanges { .. } => "by-number-of-changes",
            Grouping::TagsOnly => "tags-only",
            Grouping::ByEditTime { .. } => "by-edit-time",
            Grouping::ByAuthorOrTime { .. } => "by-author-or-time",
            Grouping::Custom(_) => "custom",
        }
    }
}

impl PartialEq for Grouping {
    fn eq(&self, other: &Self) -> bool {
        use Grouping::*;
        match (self, other) {
            (ByActor, ByActor) | (ByAuthor, ByAuthor) | (TagsOnly, TagsOnly) => true,
            (ByActorAndNumChanges { batch_size: a }, ByActorAndNumChanges { batch_size: b })
            | (ByNumberOfChanges { batch_size: a }, ByNumberOfChanges { batch_size: b }) => a == b,
            (ByEditTime { max_gap_minutes: a }, ByEditTime { max_gap_minutes: b })
            | (ByAuthorOrTime { max_gap_minutes: a }, ByAuthorOrTime { max_gap_minutes: b }) => {
                a == b
            }
            (Custom(a), Custom(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Grouping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Grouping::ByActorAndNumChanges { batch_size }
            | Grouping::ByNumberOfChanges { batch_size } => {
                write!(f, "{}(batch_size={batch_size})", self.name())
            }
            Grouping::ByEditTime { max_gap_minutes }
            | Grouping::ByAuthorOrTime { max_gap_minutes } => {
                write!(f, "{}(max_gap_minutes={max_gap_minutes})", self.name())
            }
            _ => f.write_str(self.name()),
        }
    }
}

/// Serializable grouping preset, e.g. `{"grouping": "by-edit-time", "max_gap_minutes": 30}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupingConfig {
    pub grouping: String,
    pub batch_size: usize,
    pub max_gap_minutes: u64,
}

impl Default for GroupingConfig {
    fn default() -> Self {
        Self {
            grouping: "by-author-or-time".to_string(),
            batch_size: 100,
            max_gap_minutes: 60,
        }
    }
}

impl TryFrom<&GroupingConfig> for Grouping {
    type Error = ConfigError;

    fn try_from(cfg: &GroupingConfig) -> Result<Self, Self::Error> {
        let batch_size = || {
            if cfg.batch_size == 0 {
                Err(ConfigError::ZeroBatchSize)
            } else {
                Ok(cfg.batch_size)
            }
        };
        Ok(match cfg.grouping.as_str() {
            "by-actor" => Grouping::ByActor,
            "by-actor-and-num-changes" => Grouping::ByActorAndNumChanges {
                batch_size: batch_size()?,
            },
            "by-author" => Grouping::ByAuthor,
            "by-number-of-changes" => Grouping::ByNumberOfChanges {
                batch_size: batch_size()?,
            },
            "tags-only" => Grouping::TagsOnly,
            "by-edit-time" => Grouping::ByEditTime {
                max_gap_minutes: cfg.max_gap_minutes,
            },
            "by-author-or-time" => Grouping::ByAuthorOrTime {
                max_gap_minutes: cfg.max_gap_minutes,
            },
            other => return Err(ConfigError::UnknownGrouping(other.to_string())),
        })
    }
}

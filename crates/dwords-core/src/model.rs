//! Plans, words, and the typed word patch.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::clock::Version;

/// Globally unique plan identifier (UUID v4).
pub type PlanId = Uuid;

/// Identifier of the device that produced a record version.
pub type DeviceId = String;

/// A named collection of words representing one learning set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub id: PlanId,
    pub name: String,
    pub deleted: bool,
    pub version: Version,
    pub origin: DeviceId,
}

/// Learning state stored on a word.
///
/// The "planning" bucket is not a state: it is the tail of `Active` words
/// beyond the current window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(into = "i64", try_from = "i64")]
pub enum WordStatus {
    /// Unseen or currently being learned
    #[default]
    Active,
    /// Memorized
    Memorized,
}

impl WordStatus {
    pub fn code(self) -> i64 {
        match self {
            WordStatus::Active => 0,
            WordStatus::Memorized => 1,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(WordStatus::Active),
            1 => Some(WordStatus::Memorized),
            _ => None,
        }
    }
}

impl From<WordStatus> for i64 {
    fn from(status: WordStatus) -> Self {
        status.code()
    }
}

impl TryFrom<i64> for WordStatus {
    type Error = String;

    fn try_from(code: i64) -> Result<Self, Self::Error> {
        WordStatus::from_code(code).ok_or_else(|| format!("invalid word status code: {}", code))
    }
}

impl fmt::Display for WordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WordStatus::Active => write!(f, "active"),
            WordStatus::Memorized => write!(f, "memorized"),
        }
    }
}

/// A single vocabulary entry scoped to one plan.
///
/// Identity is `(plan_id, word)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Word {
    pub plan_id: PlanId,
    pub word: String,
    /// Sort key within the plan, not wall-clock time
    pub time: i64,
    pub paraphrase: String,
    pub show_paraphrase: bool,
    pub color: String,
    pub status: WordStatus,
    pub deleted: bool,
    pub version: Version,
    pub origin: DeviceId,
}

impl Word {
    /// Human-readable identity, used in errors and logs.
    pub fn identity(&self) -> String {
        format!("{}/{}", self.plan_id, self.word)
    }
}

/// Partial update applied by `update_word`.
///
/// Setting `word` to a different value renames the record through the
/// rename reconciler.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub word: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paraphrase: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_paraphrase: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<WordStatus>,
}

impl WordPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rename(mut self, word: impl Into<String>) -> Self {
        self.word = Some(word.into());
        self
    }

    pub fn time(mut self, time: i64) -> Self {
        self.time = Some(time);
        self
    }

    pub fn paraphrase(mut self, paraphrase: impl Into<String>) -> Self {
        self.paraphrase = Some(paraphrase.into());
        self
    }

    pub fn show_paraphrase(mut self, show: bool) -> Self {
        self.show_paraphrase = Some(show);
        self
    }

    pub fn color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }

    pub fn status(mut self, status: WordStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// True when the patch changes nothing besides the identity.
    pub fn has_field_changes(&self) -> bool {
        self.time.is_some()
            || self.paraphrase.is_some()
            || self.show_paraphrase.is_some()
            || self.color.is_some()
            || self.status.is_some()
    }

    /// The new identity, if the patch renames `current`.
    pub fn renames_from(&self, current: &str) -> Option<&str> {
        self.word.as_deref().filter(|w| *w != current)
    }
}

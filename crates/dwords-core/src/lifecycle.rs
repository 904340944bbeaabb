//! Word lifecycle views
//!
//! `Current` and `Planning` split the active words of a plan at a window
//! boundary: the first `max_current` by `time` are current, the rest are
//! planned. The boundary is positional, so resizing the window reclassifies
//! words without touching stored data.

use std::fmt;
use std::str::FromStr;

use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};
use crate::model::{PlanId, Word};
use crate::sqlite_store::{row_to_word, WORD_COLUMNS};

/// Named read-side views over a plan's live words.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WordList {
    /// Active words inside the window
    Current,
    /// Active words past the window
    Planning,
    /// Memorized words
    Memorized,
    /// Every live word
    All,
}

impl WordList {
    pub const ALL_VIEWS: [WordList; 4] = [
        WordList::Current,
        WordList::Planning,
        WordList::Memorized,
        WordList::All,
    ];
}

impl fmt::Display for WordList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WordList::Current => write!(f, "Current"),
            WordList::Planning => write!(f, "Planning"),
            WordList::Memorized => write!(f, "Memorized"),
            WordList::All => write!(f, "All"),
        }
    }
}

impl FromStr for WordList {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "current" => Ok(WordList::Current),
            "planning" => Ok(WordList::Planning),
            "memorized" => Ok(WordList::Memorized),
            "all" => Ok(WordList::All),
            _ => Err(StoreError::NotFound(format!("word list {}", s))),
        }
    }
}

/// Run a lifecycle view against `conn`.
pub(crate) fn query_words(
    conn: &Connection,
    plan_id: PlanId,
    view: WordList,
    max_current: u32,
) -> Result<Vec<Word>> {
    let (filter, windowed) = match view {
        WordList::Current => ("AND status = 0 ORDER BY time, word LIMIT ?2", true),
        // LIMIT -1 means no limit in SQLite
        WordList::Planning => ("AND status = 0 ORDER BY time, word LIMIT -1 OFFSET ?2", true),
        WordList::Memorized => ("AND status = 1 ORDER BY time, word", false),
        WordList::All => ("ORDER BY time, word", false),
    };
    let sql = format!(
        "SELECT {} FROM words WHERE plan_id = ?1 AND NOT deleted {}",
        WORD_COLUMNS, filter
    );

    let plan = plan_id.to_string();
    let mut stmt = conn.prepare(&sql)?;
    let rows = if windowed {
        stmt.query_map(params![plan, max_current as i64], row_to_word)?
            .collect::<std::result::Result<Vec<_>, _>>()?
    } else {
        stmt.query_map(params![plan], row_to_word)?
            .collect::<std::result::Result<Vec<_>, _>>()?
    };
    Ok(rows)
}

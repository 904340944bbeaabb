//! Word identity rename
//!
//! Renaming `(plan, old)` to `(plan, new)` copies the live record to the new
//! identity and tombstones the old one. A tombstone already sitting on the
//! new identity is purged first, otherwise the insert-if-absent below would
//! silently skip the copy. A live record on the new identity rejects the
//! rename with `DuplicateWord`.
//!
//! The caller runs this inside a transaction and rolls back on any error,
//! so either both steps land or neither does.

use rusqlite::{params, Connection};

use crate::clock::Version;
use crate::error::{Result, StoreError};
use crate::model::PlanId;

pub(crate) fn rename_word(
    conn: &Connection,
    plan_id: PlanId,
    old: &str,
    new: &str,
    version: Version,
    origin: &str,
) -> Result<()> {
    let plan = plan_id.to_string();

    let purged = conn.execute(
        "DELETE FROM words WHERE plan_id = ?1 AND word = ?2 AND deleted",
        params![plan, new],
    )?;

    let copied = conn.execute(
        "INSERT OR IGNORE INTO words
             (plan_id, word, time, paraphrase, show_paraphrase, color, status, deleted, version, origin)
         SELECT plan_id, ?3, time, paraphrase, show_paraphrase, color, status, 0, ?4, ?5
         FROM words WHERE plan_id = ?1 AND word = ?2 AND NOT deleted",
        params![plan, old, new, version.value(), origin],
    )?;

    if copied == 0 {
        let source_live: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM words WHERE plan_id = ?1 AND word = ?2 AND NOT deleted)",
            params![plan, old],
            |row| row.get(0),
        )?;
        if !source_live {
            return Err(StoreError::NotFound(format!("word {}/{}", plan_id, old)));
        }
        return Err(StoreError::duplicate(plan_id, new));
    }

    let tombstoned = conn.execute(
        "UPDATE words SET deleted = 1, version = ?3, origin = ?4
         WHERE plan_id = ?1 AND word = ?2 AND NOT deleted",
        params![plan, old, version.value(), origin],
    )?;
    if tombstoned != 1 {
        return Err(StoreError::StoreIo(format!(
            "rename {}/{}: expected one live source row, tombstoned {}",
            plan_id, old, tombstoned
        )));
    }

    tracing::debug!(
        plan = %plan_id,
        from = old,
        to = new,
        purged_tombstone = purged > 0,
        "Renamed word"
    );
    Ok(())
}

//! Last-writer-wins merge of remote records
//!
//! Every plan and word row carries a version stamp and the device that
//! wrote it. A remote record replaces the local one only when its
//! `(version, origin)` pair is greater. Equal stamps with differing content
//! fall back to comparing a canonical content key, so every replica picks
//! the same winner.
//!
//! Each record is merged in its own transaction. Reapplying a batch is a
//! no-op.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

use crate::clock::Version;
use crate::error::{Result, StoreError};
use crate::event::StoreEvent;
use crate::model::{Plan, PlanId, Word};
use crate::sqlite_store::{
    cascade_plan_tombstone, insert_plan, insert_word_if_absent, load_plan, load_word,
    row_to_plan, row_to_word, SqliteRecordStore, PLAN_COLUMNS, WORD_COLUMNS,
};

/// Records exchanged between replicas.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncBatch {
    #[serde(default)]
    pub plans: Vec<Plan>,
    #[serde(default)]
    pub words: Vec<Word>,
}

impl SyncBatch {
    pub fn is_empty(&self) -> bool {
        self.plans.is_empty() && self.words.is_empty()
    }

    pub fn len(&self) -> usize {
        self.plans.len() + self.words.len()
    }

    /// Highest version in the batch, if any.
    pub fn max_version(&self) -> Option<Version> {
        self.plans
            .iter()
            .map(|p| p.version)
            .chain(self.words.iter().map(|w| w.version))
            .max()
    }
}

/// Counts of what a batch did to the local store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub inserted: usize,
    pub updated: usize,
    pub discarded: usize,
    /// Equal-stamp records settled by content comparison
    pub conflicts: usize,
}

impl SyncReport {
    fn record(&mut self, merge: &Merge) {
        match merge.outcome {
            MergeOutcome::Inserted => self.inserted += 1,
            MergeOutcome::Updated => self.updated += 1,
            MergeOutcome::Discarded => self.discarded += 1,
        }
        if merge.conflict {
            self.conflicts += 1;
        }
    }
}

/// What happened to a single remote record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Inserted,
    Updated,
    Discarded,
}

struct Merge {
    outcome: MergeOutcome,
    conflict: bool,
    /// Word list of this plan changed shape
    list_changed: Option<PlanId>,
    /// Current-plan pointer moved
    selected: Option<Option<PlanId>>,
}

impl Merge {
    fn new(outcome: MergeOutcome) -> Self {
        Self {
            outcome,
            conflict: false,
            list_changed: None,
            selected: None,
        }
    }
}

enum Verdict {
    KeepLocal,
    TakeRemote,
}

/// Pick the winner between a local and a remote stamp.
///
/// Identical content always keeps the local row, which makes reapplying a
/// batch a no-op.
fn decide(
    identity: &str,
    local: (Version, &str, String),
    remote: (Version, &str, String),
) -> (Verdict, bool) {
    let (local_version, local_origin, local_key) = local;
    let (remote_version, remote_origin, remote_key) = remote;

    match remote_version
        .cmp(&local_version)
        .then_with(|| remote_origin.cmp(local_origin))
    {
        Ordering::Greater => (Verdict::TakeRemote, false),
        Ordering::Less => (Verdict::KeepLocal, false),
        Ordering::Equal if remote_key == local_key => (Verdict::KeepLocal, false),
        Ordering::Equal => {
            let conflict = StoreError::ReconcileConflict {
                identity: identity.to_string(),
                version: remote_version.value(),
            };
            tracing::warn!("{}; settling by content", conflict);
            if remote_key > local_key {
                (Verdict::TakeRemote, true)
            } else {
                (Verdict::KeepLocal, true)
            }
        }
    }
}

/// Reject stamps the local clock could not step past.
fn check_version(identity: impl FnOnce() -> String, version: Version) -> Result<()> {
    if version > Version::MAX {
        return Err(StoreError::VersionOutOfRange {
            identity: identity(),
            version: version.value(),
        });
    }
    Ok(())
}

fn plan_key(plan: &Plan) -> String {
    serde_json::json!([plan.name, plan.deleted]).to_string()
}

fn word_key(word: &Word) -> String {
    serde_json::json!([
        word.time,
        word.paraphrase,
        word.show_paraphrase,
        word.color,
        word.status.code(),
        word.deleted,
    ])
    .to_string()
}

fn merge_plan(conn: &Connection, remote: &Plan) -> Result<Merge> {
    let Some(local) = load_plan(conn, remote.id)? else {
        insert_plan(conn, remote)?;
        let mut merge = Merge::new(MergeOutcome::Inserted);
        if remote.deleted {
            merge.selected = cascade_plan_tombstone(conn, remote.id)?;
        }
        return Ok(merge);
    };

    let (verdict, conflict) = decide(
        &format!("plan {}", remote.id),
        (local.version, &local.origin, plan_key(&local)),
        (remote.version, &remote.origin, plan_key(remote)),
    );
    let mut merge = match verdict {
        Verdict::KeepLocal => Merge::new(MergeOutcome::Discarded),
        Verdict::TakeRemote => {
            conn.execute(
                "UPDATE plans SET name = ?1, deleted = ?2, version = ?3, origin = ?4 WHERE id = ?5",
                params![
                    remote.name,
                    remote.deleted,
                    remote.version.value(),
                    remote.origin,
                    remote.id.to_string(),
                ],
            )?;
            let mut merge = Merge::new(MergeOutcome::Updated);
            if remote.deleted && !local.deleted {
                merge.selected = cascade_plan_tombstone(conn, remote.id)?;
            }
            merge
        }
    };
    merge.conflict = conflict;
    Ok(merge)
}

fn merge_word(conn: &Connection, remote: &Word) -> Result<Merge> {
    if let Some(plan) = load_plan(conn, remote.plan_id)? {
        if plan.deleted {
            tracing::debug!(word = %remote.identity(), "Discarding word of deleted plan");
            return Ok(Merge::new(MergeOutcome::Discarded));
        }
    }

    let Some(local) = load_word(conn, remote.plan_id, &remote.word)? else {
        insert_word_if_absent(conn, remote)?;
        let mut merge = Merge::new(MergeOutcome::Inserted);
        if !remote.deleted {
            merge.list_changed = Some(remote.plan_id);
        }
        return Ok(merge);
    };

    let (verdict, conflict) = decide(
        &format!("word {}", remote.identity()),
        (local.version, &local.origin, word_key(&local)),
        (remote.version, &remote.origin, word_key(remote)),
    );
    let mut merge = match verdict {
        Verdict::KeepLocal => Merge::new(MergeOutcome::Discarded),
        Verdict::TakeRemote => {
            conn.execute(
                "UPDATE words SET
                     time = ?1, paraphrase = ?2, show_paraphrase = ?3, color = ?4,
                     status = ?5, deleted = ?6, version = ?7, origin = ?8
                 WHERE plan_id = ?9 AND word = ?10",
                params![
                    remote.time,
                    remote.paraphrase,
                    remote.show_paraphrase,
                    remote.color,
                    remote.status.code(),
                    remote.deleted,
                    remote.version.value(),
                    remote.origin,
                    remote.plan_id.to_string(),
                    remote.word,
                ],
            )?;
            let mut merge = Merge::new(MergeOutcome::Updated);
            if local.status != remote.status || local.deleted != remote.deleted {
                merge.list_changed = Some(remote.plan_id);
            }
            merge
        }
    };
    merge.conflict = conflict;
    Ok(merge)
}

impl SqliteRecordStore {
    /// Merge a remote batch: plans first, then words, one transaction per
    /// record. Records applied before an error stay applied, and their
    /// events are still emitted before the error is returned.
    pub fn apply_batch(&self, batch: &SyncBatch) -> Result<SyncReport> {
        let mut report = SyncReport::default();
        let mut changed_plans = BTreeSet::new();
        let mut selected = None;

        let mut merge_all = || -> Result<()> {
            for plan in &batch.plans {
                check_version(|| format!("plan {}", plan.id), plan.version)?;
                let merge = self.merge_one(|conn| merge_plan(conn, plan), plan.version)?;
                report.record(&merge);
                if merge.selected.is_some() {
                    selected = merge.selected;
                }
            }
            for word in &batch.words {
                check_version(|| format!("word {}", word.identity()), word.version)?;
                let merge = self.merge_one(|conn| merge_word(conn, word), word.version)?;
                report.record(&merge);
                changed_plans.extend(merge.list_changed);
            }
            Ok(())
        };
        let result = merge_all();

        match &result {
            Ok(()) => tracing::info!(
                inserted = report.inserted,
                updated = report.updated,
                discarded = report.discarded,
                conflicts = report.conflicts,
                "Applied sync batch"
            ),
            Err(e) => tracing::warn!(
                inserted = report.inserted,
                updated = report.updated,
                discarded = report.discarded,
                "Sync batch stopped: {}",
                e
            ),
        }
        if let Some(plan_id) = selected {
            self.emit(StoreEvent::PlanSelected { plan_id });
        }
        for plan_id in changed_plans {
            self.emit(StoreEvent::ListChanged { plan_id });
        }
        result.map(|()| report)
    }

    fn merge_one<F>(&self, merge: F, version: Version) -> Result<Merge>
    where
        F: FnOnce(&Connection) -> Result<Merge>,
    {
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction()?;
        let result = merge(&*tx)?;
        tx.commit()?;
        self.clock().observe(version);
        Ok(result)
    }

    /// Every plan and word row, tombstones included, with a version
    /// greater than `since`.
    pub fn export_changes(&self, since: Version) -> Result<SyncBatch> {
        let conn = self.lock()?;

        let sql = format!(
            "SELECT {} FROM plans WHERE version > ?1 ORDER BY version, rowid",
            PLAN_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let plans = stmt
            .query_map(params![since.value()], row_to_plan)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let sql = format!(
            "SELECT {} FROM words WHERE version > ?1 ORDER BY version, plan_id, word",
            WORD_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let words = stmt
            .query_map(params![since.value()], row_to_word)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        tracing::debug!(since = %since, plans = plans.len(), words = words.len(), "Exported changes");
        Ok(SyncBatch { plans, words })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::LogicalClock;
    use crate::config::DWordsConfig;
    use crate::model::WordStatus;
    use crate::store::RecordStore;
    use std::sync::Arc;
    use uuid::Uuid;

    fn store(device: &str) -> SqliteRecordStore {
        let config = DWordsConfig {
            device_id: Some(device.into()),
            ..DWordsConfig::default()
        };
        SqliteRecordStore::open_in_memory_with(&config, Arc::new(LogicalClock::new())).unwrap()
    }

    fn remote_plan(id: PlanId, version: i64) -> Plan {
        Plan {
            id,
            name: "remote".into(),
            deleted: false,
            version: Version(version),
            origin: "device-b".into(),
        }
    }

    fn remote_word(plan_id: PlanId, word: &str, version: i64) -> Word {
        Word {
            plan_id,
            word: word.into(),
            time: 1,
            paraphrase: "remote".into(),
            show_paraphrase: true,
            color: "blue".into(),
            status: WordStatus::Memorized,
            deleted: false,
            version: Version(version),
            origin: "device-b".into(),
        }
    }

    #[test]
    fn unknown_records_are_inserted() {
        let store = store("device-a");
        let id = Uuid::new_v4();
        let batch = SyncBatch {
            plans: vec![remote_plan(id, 3)],
            words: vec![remote_word(id, "apple", 4)],
        };

        let report = store.apply_batch(&batch).unwrap();
        assert_eq!(report.inserted, 2);
        assert_eq!(store.get_plan(id).unwrap().unwrap(), batch.plans[0]);
        assert_eq!(store.get_word(id, "apple").unwrap().unwrap(), batch.words[0]);
    }

    #[test]
    fn equal_version_breaks_tie_on_origin() {
        let store = store("device-a");
        let id = Uuid::new_v4();
        store.apply_batch(&SyncBatch {
            plans: vec![remote_plan(id, 5)],
            words: vec![],
        })
        .unwrap();

        let mut lower = remote_plan(id, 5);
        lower.origin = "device-0".into();
        lower.name = "lower".into();
        let report = store.apply_batch(&SyncBatch { plans: vec![lower], words: vec![] }).unwrap();
        assert_eq!(report.discarded, 1);

        let mut higher = remote_plan(id, 5);
        higher.origin = "device-z".into();
        higher.name = "higher".into();
        let report = store.apply_batch(&SyncBatch { plans: vec![higher], words: vec![] }).unwrap();
        assert_eq!(report.updated, 1);
        assert_eq!(store.get_plan(id).unwrap().unwrap().name, "higher");
    }

    #[test]
    fn equal_stamp_with_different_content_counts_conflict() {
        let store = store("device-a");
        let id = Uuid::new_v4();
        let mut first = remote_plan(id, 5);
        first.name = "alpha".into();
        let mut second = remote_plan(id, 5);
        second.name = "beta".into();

        store.apply_batch(&SyncBatch { plans: vec![first.clone()], words: vec![] }).unwrap();
        let report = store
            .apply_batch(&SyncBatch { plans: vec![second.clone()], words: vec![] })
            .unwrap();
        assert_eq!(report.conflicts, 1);
        assert_eq!(report.updated, 1);
        assert_eq!(store.get_plan(id).unwrap().unwrap().name, "beta");

        // The loser arriving later does not flip the winner back
        let report = store.apply_batch(&SyncBatch { plans: vec![first], words: vec![] }).unwrap();
        assert_eq!(report.conflicts, 1);
        assert_eq!(report.discarded, 1);
        assert_eq!(store.get_plan(id).unwrap().unwrap().name, "beta");
    }

    #[test]
    fn remote_plan_tombstone_cascades() {
        let store = store("device-a");
        let plan = store.create_plan("local").unwrap();
        store.add_word(plan, "apple", 1, "").unwrap();

        let mut tombstone = store.get_plan(plan).unwrap().unwrap();
        tombstone.deleted = true;
        tombstone.version = Version(tombstone.version.value() + 100);
        tombstone.origin = "device-b".into();

        store
            .apply_batch(&SyncBatch { plans: vec![tombstone], words: vec![] })
            .unwrap();
        assert!(store.get_plan(plan).unwrap().unwrap().deleted);
        assert!(store.get_word(plan, "apple").unwrap().is_none());
        assert_eq!(store.current_plan().unwrap(), None);
    }

    #[test]
    fn words_of_deleted_plan_are_discarded() {
        let store = store("device-a");
        let plan = store.create_plan("local").unwrap();
        store.soft_delete_plan(plan).unwrap();

        let report = store
            .apply_batch(&SyncBatch {
                plans: vec![],
                words: vec![remote_word(plan, "apple", 1_000)],
            })
            .unwrap();
        assert_eq!(report.discarded, 1);
        assert!(store.get_word(plan, "apple").unwrap().is_none());
    }

    #[test]
    fn merged_versions_advance_the_clock() {
        let store = store("device-a");
        let id = Uuid::new_v4();
        store
            .apply_batch(&SyncBatch {
                plans: vec![remote_plan(id, 500)],
                words: vec![],
            })
            .unwrap();
        store.rename_plan(id, "mine").unwrap();
        assert!(store.get_plan(id).unwrap().unwrap().version > Version(500));
    }

    #[test]
    fn export_includes_tombstones_after_since() {
        let store = store("device-a");
        let plan = store.create_plan("p").unwrap();
        store.add_word(plan, "apple", 1, "").unwrap();
        let mark = store.get_word(plan, "apple").unwrap().unwrap().version;
        store.add_word(plan, "pear", 2, "").unwrap();
        store.delete_word(plan, "apple").unwrap();

        let batch = store.export_changes(mark).unwrap();
        assert!(batch.plans.is_empty());
        let words: Vec<_> = batch.words.iter().map(|w| (w.word.as_str(), w.deleted)).collect();
        assert_eq!(words, vec![("pear", false), ("apple", true)]);

        let all = store.export_changes(Version::ZERO).unwrap();
        assert_eq!(all.plans.len(), 1);
        assert_eq!(all.max_version(), Some(store.get_word(plan, "apple").unwrap().unwrap().version));
    }

    #[test]
    fn status_change_from_sync_notifies() {
        let store = store("device-a");
        let rx = store.subscribe().unwrap();
        let plan = store.create_plan("p").unwrap();
        store.add_word(plan, "apple", 1, "").unwrap();
        while rx.try_recv().is_ok() {}

        let mut remote = store.get_word(plan, "apple").unwrap().unwrap();
        remote.status = WordStatus::Memorized;
        remote.version = Version(remote.version.value() + 1);
        remote.origin = "device-b".into();
        store
            .apply_batch(&SyncBatch { plans: vec![], words: vec![remote] })
            .unwrap();
        assert_eq!(rx.try_recv().unwrap(), StoreEvent::ListChanged { plan_id: plan });
    }
}

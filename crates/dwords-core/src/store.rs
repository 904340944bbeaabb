use std::sync::mpsc::Receiver;

use crate::error::Result;
use crate::event::StoreEvent;
use crate::lifecycle::WordList;
use crate::model::{Plan, PlanId, Word, WordPatch};

/// Plan and word storage with tombstone semantics.
///
/// Every mutating call is atomic and stamps the records it touches with a
/// fresh version.
pub trait RecordStore: Send + Sync {
    /// Create an empty plan. Selects it as current if none is selected.
    fn create_plan(&self, name: &str) -> Result<PlanId>;

    /// Rename a live plan.
    fn rename_plan(&self, id: PlanId, name: &str) -> Result<()>;

    /// Tombstone a plan, hard-delete its words, and move the current-plan
    /// pointer off it if needed.
    fn soft_delete_plan(&self, id: PlanId) -> Result<()>;

    /// All live plans in creation order.
    fn list_plans(&self) -> Result<Vec<Plan>>;

    /// Get a plan by id, tombstoned or not.
    fn get_plan(&self, id: PlanId) -> Result<Option<Plan>>;

    /// Insert a new word. Returns `false` without mutating anything when a
    /// record (live or tombstoned) already holds the identity.
    fn add_word(&self, plan_id: PlanId, word: &str, time: i64, paraphrase: &str) -> Result<bool>;

    /// Apply a partial update; a patch carrying a different `word` renames
    /// the record. Returns the record as stored afterwards.
    fn update_word(&self, plan_id: PlanId, word: &str, patch: &WordPatch) -> Result<Word>;

    /// Tombstone a word. Tombstoning a tombstone is a no-op.
    fn delete_word(&self, plan_id: PlanId, word: &str) -> Result<()>;

    /// Physically remove a tombstoned word. Returns `false` if there was no
    /// tombstone at that identity; live words are never purged.
    fn purge_word(&self, plan_id: PlanId, word: &str) -> Result<bool>;

    /// Get a word by identity, tombstoned or not.
    fn get_word(&self, plan_id: PlanId, word: &str) -> Result<Option<Word>>;

    /// Live words of a plan in one lifecycle view.
    fn list_words(&self, plan_id: PlanId, view: WordList, max_current: u32) -> Result<Vec<Word>>;

    /// The current-plan pointer.
    fn current_plan(&self) -> Result<Option<PlanId>>;

    /// Move the current-plan pointer; the target must be a live plan.
    fn select_plan(&self, id: Option<PlanId>) -> Result<()>;

    /// Take the event receiver. Only one subscriber is supported.
    fn subscribe(&self) -> Result<Receiver<StoreEvent>>;
}

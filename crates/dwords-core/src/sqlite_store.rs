use std::collections::BTreeMap;
use std::path::Path;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use uuid::Uuid;

use crate::clock::{Version, VersionClock, WallClock};
use crate::config::{DWordsConfig, SettingsDefaults};
use crate::dictionary::NullDictionary;
use crate::error::{Result, StoreError};
use crate::event::StoreEvent;
use crate::initializer::NewPlan;
use crate::lifecycle::{query_words, WordList};
use crate::model::{DeviceId, Plan, PlanId, Word, WordPatch, WordStatus};
use crate::rename::rename_word;
use crate::schema::{Schema, SCHEMA_VERSION};
use crate::settings::{self, keys, system, SettingsStore};
use crate::store::RecordStore;

pub(crate) const PLAN_COLUMNS: &str = "id, name, deleted, version, origin";
pub(crate) const WORD_COLUMNS: &str =
    "plan_id, word, time, paraphrase, show_paraphrase, color, status, deleted, version, origin";

/// SQLite-backed implementation of the RecordStore trait.
pub struct SqliteRecordStore {
    conn: Mutex<Connection>,
    clock: Arc<dyn VersionClock>,
    device_id: DeviceId,
    defaults: SettingsDefaults,
    event_tx: Sender<StoreEvent>,
    event_rx: Mutex<Option<Receiver<StoreEvent>>>,
}

impl SqliteRecordStore {
    /// Open (or create) the database configured in `config`.
    pub fn open(config: &DWordsConfig) -> Result<Self> {
        Self::open_at(&config.database_path(), config, Arc::new(WallClock::new()))
    }

    /// Open (or create) a database at `path` with an explicit clock.
    pub fn open_at(
        path: &Path,
        config: &DWordsConfig,
        clock: Arc<dyn VersionClock>,
    ) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StoreError::StoreIo(format!("create {}: {}", parent.display(), e))
                })?;
            }
        }
        let conn = Connection::open(path)
            .map_err(|e| StoreError::StoreIo(format!("open {}: {}", path.display(), e)))?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        Self::init_with_connection(conn, config, clock)
    }

    /// Create an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        Self::open_in_memory_with(&DWordsConfig::default(), Arc::new(WallClock::new()))
    }

    /// In-memory database with explicit configuration and clock.
    pub fn open_in_memory_with(
        config: &DWordsConfig,
        clock: Arc<dyn VersionClock>,
    ) -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| StoreError::StoreIo(format!("open_in_memory: {}", e)))?;
        Self::init_with_connection(conn, config, clock)
    }

    fn init_with_connection(
        conn: Connection,
        config: &DWordsConfig,
        clock: Arc<dyn VersionClock>,
    ) -> Result<Self> {
        config.validate()?;
        conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
        Self::init_schema(&conn)?;

        let max_version: i64 = conn.query_row(
            "SELECT MAX(COALESCE((SELECT MAX(version) FROM plans), 0),
                        COALESCE((SELECT MAX(version) FROM words), 0))",
            [],
            |row| row.get(0),
        )?;
        clock.observe(Version(max_version));

        let device_id = Self::resolve_device_id(&conn, config.device_id.as_deref())?;
        tracing::debug!(device = %device_id, max_version, "Opened record store");

        let (tx, rx) = mpsc::channel();
        Ok(Self {
            conn: Mutex::new(conn),
            clock,
            device_id,
            defaults: config.defaults.clone(),
            event_tx: tx,
            event_rx: Mutex::new(Some(rx)),
        })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        let has_version_table: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'schema_version')",
            [],
            |row| row.get(0),
        )?;
        let current_version: u32 = if has_version_table {
            conn.query_row(
                "SELECT COALESCE(MAX(version), 0) FROM schema_version",
                [],
                |row| row.get(0),
            )?
        } else {
            0
        };

        if current_version == 0 {
            conn.execute_batch(Schema::create_tables())?;
            conn.execute(
                "INSERT INTO schema_version (version) VALUES (?1)",
                params![SCHEMA_VERSION],
            )?;
        } else if current_version < SCHEMA_VERSION {
            for version in current_version..SCHEMA_VERSION {
                if let Some(migration) = Schema::migration(version, version + 1) {
                    conn.execute_batch(migration)?;
                }
            }
            conn.execute(
                "INSERT INTO schema_version (version) VALUES (?1)",
                params![SCHEMA_VERSION],
            )?;
        } else if current_version > SCHEMA_VERSION {
            return Err(StoreError::StoreIo(format!(
                "database schema version {} is newer than supported {}",
                current_version, SCHEMA_VERSION
            )));
        }
        Ok(())
    }

    fn resolve_device_id(conn: &Connection, configured: Option<&str>) -> Result<DeviceId> {
        if let Some(id) = configured {
            return Ok(id.to_string());
        }
        if let Some(id) = settings::read_system(conn, system::DEVICE_ID)? {
            return Ok(id);
        }
        let id = Uuid::new_v4().to_string();
        settings::write_system(conn, system::DEVICE_ID, Some(&id))?;
        Ok(id)
    }

    /// Identifier stamped as `origin` on local writes.
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub(crate) fn clock(&self) -> &dyn VersionClock {
        self.clock.as_ref()
    }

    pub(crate) fn default_dictionary(&self) -> &str {
        &self.defaults.dictionary
    }

    pub(crate) fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| StoreError::StoreIo(format!("store lock poisoned: {}", e)))
    }

    pub(crate) fn emit(&self, event: StoreEvent) {
        // Ignore send errors (receiver may be dropped)
        let _ = self.event_tx.send(event);
    }

    /// Live words of the current plan in one view, windowed by the stored
    /// `maxCurrent` setting. Empty when no plan is selected.
    pub fn word_list(&self, view: WordList) -> Result<Vec<Word>> {
        let conn = self.lock()?;
        let Some(plan_id) = read_current_plan(&conn)? else {
            return Ok(Vec::new());
        };
        let max_current = match settings::read_setting(&conn, keys::MAX_CURRENT)? {
            Some(value) => settings::parse_max_current(&value)?,
            None => self.defaults.max_current,
        };
        query_words(&conn, plan_id, view, max_current)
    }

    /// Next free `time` in a plan: one past the largest, tombstones included.
    pub fn next_word_time(&self, plan_id: PlanId) -> Result<i64> {
        let conn = self.lock()?;
        let next = conn.query_row(
            "SELECT COALESCE(MAX(time), 0) + 1 FROM words WHERE plan_id = ?1",
            params![plan_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(next)
    }

    /// Count live words of a plan.
    pub fn count_words(&self, plan_id: PlanId) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM words WHERE plan_id = ?1 AND NOT deleted",
            params![plan_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

// ==================== Row helpers ====================

fn parse_plan_id(idx: usize, raw: &str) -> rusqlite::Result<PlanId> {
    Uuid::parse_str(raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn row_to_plan(row: &rusqlite::Row<'_>) -> rusqlite::Result<Plan> {
    let id_str: String = row.get(0)?;
    Ok(Plan {
        id: parse_plan_id(0, &id_str)?,
        name: row.get(1)?,
        deleted: row.get(2)?,
        version: Version(row.get(3)?),
        origin: row.get(4)?,
    })
}

pub(crate) fn row_to_word(row: &rusqlite::Row<'_>) -> rusqlite::Result<Word> {
    let plan_str: String = row.get(0)?;
    let status_code: i64 = row.get(6)?;
    let status = WordStatus::from_code(status_code).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            6,
            Type::Integer,
            format!("invalid word status code: {}", status_code).into(),
        )
    })?;
    Ok(Word {
        plan_id: parse_plan_id(0, &plan_str)?,
        word: row.get(1)?,
        time: row.get(2)?,
        paraphrase: row.get(3)?,
        show_paraphrase: row.get(4)?,
        color: row.get(5)?,
        status,
        deleted: row.get(7)?,
        version: Version(row.get(8)?),
        origin: row.get(9)?,
    })
}

pub(crate) fn load_plan(conn: &Connection, id: PlanId) -> Result<Option<Plan>> {
    let sql = format!("SELECT {} FROM plans WHERE id = ?1", PLAN_COLUMNS);
    let plan = conn
        .query_row(&sql, params![id.to_string()], row_to_plan)
        .optional()?;
    Ok(plan)
}

pub(crate) fn load_word(conn: &Connection, plan_id: PlanId, word: &str) -> Result<Option<Word>> {
    let sql = format!(
        "SELECT {} FROM words WHERE plan_id = ?1 AND word = ?2",
        WORD_COLUMNS
    );
    let found = conn
        .query_row(&sql, params![plan_id.to_string(), word], row_to_word)
        .optional()?;
    Ok(found)
}

pub(crate) fn insert_plan(conn: &Connection, plan: &Plan) -> Result<()> {
    conn.execute(
        "INSERT INTO plans (id, name, deleted, version, origin) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            plan.id.to_string(),
            plan.name,
            plan.deleted,
            plan.version.value(),
            plan.origin,
        ],
    )?;
    Ok(())
}

/// Insert a full word row. Returns `false` if the identity is taken.
pub(crate) fn insert_word_if_absent(conn: &Connection, word: &Word) -> Result<bool> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO words
             (plan_id, word, time, paraphrase, show_paraphrase, color, status, deleted, version, origin)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            word.plan_id.to_string(),
            word.word,
            word.time,
            word.paraphrase,
            word.show_paraphrase,
            word.color,
            word.status.code(),
            word.deleted,
            word.version.value(),
            word.origin,
        ],
    )?;
    Ok(inserted == 1)
}

pub(crate) fn read_current_plan(conn: &Connection) -> Result<Option<PlanId>> {
    match settings::read_system(conn, system::CURRENT_PLAN)? {
        Some(raw) => Uuid::parse_str(&raw)
            .map(Some)
            .map_err(|e| StoreError::StoreIo(format!("current plan id {}: {}", raw, e))),
        None => Ok(None),
    }
}

pub(crate) fn write_current_plan(conn: &Connection, id: Option<PlanId>) -> Result<()> {
    let raw = id.map(|p| p.to_string());
    settings::write_system(conn, system::CURRENT_PLAN, raw.as_deref())
}

fn plan_is_live(conn: &Connection, id: PlanId) -> Result<bool> {
    let live = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM plans WHERE id = ?1 AND NOT deleted)",
        params![id.to_string()],
        |row| row.get(0),
    )?;
    Ok(live)
}

/// Hard-delete the words of a tombstoned plan and move the current-plan
/// pointer off it. Returns the new pointer when it moved.
pub(crate) fn cascade_plan_tombstone(
    conn: &Connection,
    id: PlanId,
) -> Result<Option<Option<PlanId>>> {
    let removed = conn.execute(
        "DELETE FROM words WHERE plan_id = ?1",
        params![id.to_string()],
    )?;
    tracing::debug!(plan = %id, removed, "Removed words of deleted plan");

    if read_current_plan(conn)? != Some(id) {
        return Ok(None);
    }
    let replacement: Option<String> = conn
        .query_row(
            "SELECT id FROM plans WHERE NOT deleted ORDER BY rowid LIMIT 1",
            [],
            |row| row.get(0),
        )
        .optional()?;
    let replacement = replacement
        .map(|raw| {
            Uuid::parse_str(&raw).map_err(|e| StoreError::StoreIo(format!("plan id {}: {}", raw, e)))
        })
        .transpose()?;
    write_current_plan(conn, replacement)?;
    Ok(Some(replacement))
}

fn word_not_found(plan_id: PlanId, word: &str) -> StoreError {
    StoreError::NotFound(format!("word {}/{}", plan_id, word))
}

fn plan_not_found(id: PlanId) -> StoreError {
    StoreError::NotFound(format!("plan {}", id))
}

impl RecordStore for SqliteRecordStore {
    fn create_plan(&self, name: &str) -> Result<PlanId> {
        self.create_plan_from(&NewPlan::blank(name), &NullDictionary)
    }

    fn rename_plan(&self, id: PlanId, name: &str) -> Result<()> {
        let conn = self.lock()?;
        let version = self.clock.next();
        let rows = conn.execute(
            "UPDATE plans SET name = ?1, version = ?2, origin = ?3 WHERE id = ?4 AND NOT deleted",
            params![name, version.value(), self.device_id, id.to_string()],
        )?;
        if rows == 0 {
            return Err(plan_not_found(id));
        }
        tracing::debug!(plan = %id, name, %version, "Renamed plan");
        Ok(())
    }

    fn soft_delete_plan(&self, id: PlanId) -> Result<()> {
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction()?;

        let existing = load_plan(&tx, id)?.ok_or_else(|| plan_not_found(id))?;
        if existing.deleted {
            return Ok(());
        }

        let version = self.clock.next();
        tx.execute(
            "UPDATE plans SET deleted = 1, version = ?1, origin = ?2 WHERE id = ?3",
            params![version.value(), self.device_id, id.to_string()],
        )?;
        let moved = cascade_plan_tombstone(&tx, id)?;
        tx.commit()?;
        drop(conn);

        tracing::info!(plan = %id, %version, "Deleted plan");
        if let Some(selected) = moved {
            self.emit(StoreEvent::PlanSelected { plan_id: selected });
        }
        Ok(())
    }

    fn list_plans(&self) -> Result<Vec<Plan>> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT {} FROM plans WHERE NOT deleted ORDER BY rowid",
            PLAN_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let plans = stmt
            .query_map([], row_to_plan)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(plans)
    }

    fn get_plan(&self, id: PlanId) -> Result<Option<Plan>> {
        let conn = self.lock()?;
        load_plan(&conn, id)
    }

    fn add_word(&self, plan_id: PlanId, word: &str, time: i64, paraphrase: &str) -> Result<bool> {
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction()?;

        if !plan_is_live(&tx, plan_id)? {
            return Err(plan_not_found(plan_id));
        }

        let record = Word {
            plan_id,
            word: word.to_string(),
            time,
            paraphrase: paraphrase.to_string(),
            show_paraphrase: false,
            color: String::new(),
            status: WordStatus::Active,
            deleted: false,
            version: self.clock.next(),
            origin: self.device_id.clone(),
        };
        // A tombstone keeps its identity until purged, so it blocks the add too
        if !insert_word_if_absent(&tx, &record)? {
            tracing::debug!(plan = %plan_id, word, "Add rejected: identity taken");
            return Ok(false);
        }
        tx.commit()?;
        tracing::debug!(plan = %plan_id, word, version = %record.version, "Added word");
        Ok(true)
    }

    fn update_word(&self, plan_id: PlanId, word: &str, patch: &WordPatch) -> Result<Word> {
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction()?;

        match load_word(&tx, plan_id, word)? {
            Some(existing) if !existing.deleted => {}
            _ => return Err(word_not_found(plan_id, word)),
        }

        let version = self.clock.next();
        let target = match patch.renames_from(word) {
            Some(new_word) => {
                rename_word(&tx, plan_id, word, new_word, version, &self.device_id)?;
                new_word
            }
            None => word,
        };

        tx.execute(
            "UPDATE words SET
                 time = COALESCE(?1, time),
                 paraphrase = COALESCE(?2, paraphrase),
                 show_paraphrase = COALESCE(?3, show_paraphrase),
                 color = COALESCE(?4, color),
                 status = COALESCE(?5, status),
                 version = ?6,
                 origin = ?7
             WHERE plan_id = ?8 AND word = ?9 AND NOT deleted",
            params![
                patch.time,
                patch.paraphrase,
                patch.show_paraphrase,
                patch.color,
                patch.status.map(WordStatus::code),
                version.value(),
                self.device_id,
                plan_id.to_string(),
                target,
            ],
        )?;
        let updated = load_word(&tx, plan_id, target)?
            .ok_or_else(|| word_not_found(plan_id, target))?;
        tx.commit()?;
        drop(conn);

        tracing::debug!(plan = %plan_id, word = target, %version, "Updated word");
        if patch.status.is_some() {
            self.emit(StoreEvent::ListChanged { plan_id });
        }
        Ok(updated)
    }

    fn delete_word(&self, plan_id: PlanId, word: &str) -> Result<()> {
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction()?;

        let existing = load_word(&tx, plan_id, word)?.ok_or_else(|| word_not_found(plan_id, word))?;
        if existing.deleted {
            return Ok(());
        }
        let version = self.clock.next();
        tx.execute(
            "UPDATE words SET deleted = 1, version = ?1, origin = ?2 WHERE plan_id = ?3 AND word = ?4",
            params![version.value(), self.device_id, plan_id.to_string(), word],
        )?;
        tx.commit()?;
        tracing::debug!(plan = %plan_id, word, %version, "Deleted word");
        Ok(())
    }

    fn purge_word(&self, plan_id: PlanId, word: &str) -> Result<bool> {
        let conn = self.lock()?;
        let rows = conn.execute(
            "DELETE FROM words WHERE plan_id = ?1 AND word = ?2 AND deleted",
            params![plan_id.to_string(), word],
        )?;
        if rows > 0 {
            tracing::debug!(plan = %plan_id, word, "Purged tombstone");
        }
        Ok(rows > 0)
    }

    fn get_word(&self, plan_id: PlanId, word: &str) -> Result<Option<Word>> {
        let conn = self.lock()?;
        load_word(&conn, plan_id, word)
    }

    fn list_words(&self, plan_id: PlanId, view: WordList, max_current: u32) -> Result<Vec<Word>> {
        let conn = self.lock()?;
        query_words(&conn, plan_id, view, max_current)
    }

    fn current_plan(&self) -> Result<Option<PlanId>> {
        let conn = self.lock()?;
        read_current_plan(&conn)
    }

    fn select_plan(&self, id: Option<PlanId>) -> Result<()> {
        let conn = self.lock()?;
        if let Some(plan_id) = id {
            if !plan_is_live(&conn, plan_id)? {
                return Err(plan_not_found(plan_id));
            }
        }
        write_current_plan(&conn, id)?;
        drop(conn);
        self.emit(StoreEvent::PlanSelected { plan_id: id });
        Ok(())
    }

    fn subscribe(&self) -> Result<Receiver<StoreEvent>> {
        let rx = self
            .event_rx
            .lock()
            .map_err(|e| StoreError::StoreIo(e.to_string()))?
            .take()
            .ok_or_else(|| StoreError::StoreIo("subscribe: receiver already taken".to_string()))?;
        Ok(rx)
    }
}

impl SettingsStore for SqliteRecordStore {
    fn get_setting(&self, key: &str) -> Result<Option<Value>> {
        let conn = self.lock()?;
        match settings::read_setting(&conn, key)? {
            Some(value) => Ok(Some(value)),
            None => Ok(settings::default_setting(&self.defaults, key)),
        }
    }

    fn update_settings(&self, values: BTreeMap<String, Value>) -> Result<()> {
        for (key, value) in &values {
            settings::validate_setting(key, value)?;
        }
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction()?;
        for (key, value) in &values {
            settings::write_setting(&tx, key, value)?;
        }
        tx.commit()?;
        tracing::debug!(keys = ?values.keys().collect::<Vec<_>>(), "Updated settings");
        Ok(())
    }
}

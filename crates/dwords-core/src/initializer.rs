//! Plan creation and seeding
//!
//! A plan is created and seeded inside one transaction. If seeding fails the
//! transaction is rolled back, so a half-seeded plan never becomes visible.

use std::path::PathBuf;

use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::clock::Version;
use crate::dictionary::DictionaryProvider;
use crate::error::{Result, StoreError};
use crate::event::StoreEvent;
use crate::import::{ImportFormat, ImportSchema};
use crate::model::{Plan, PlanId};
use crate::settings::{self, keys};
use crate::sqlite_store::{insert_plan, read_current_plan, write_current_plan, SqliteRecordStore};

/// Where a new plan's words come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum PlanSource {
    /// No words
    Blank,
    /// Dictionary entries whose tag contains `tag`, ranked by `order`
    Library {
        dictionary: String,
        tag: String,
        order: String,
    },
    /// A tabular file of `word, paraphrase` rows
    Import { path: PathBuf },
}

/// Request to create a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPlan {
    pub name: String,
    pub source: PlanSource,
}

impl NewPlan {
    pub fn blank(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: PlanSource::Blank,
        }
    }

    pub fn library(
        name: impl Into<String>,
        dictionary: impl Into<String>,
        tag: impl Into<String>,
        order: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            source: PlanSource::Library {
                dictionary: dictionary.into(),
                tag: tag.into(),
                order: order.into(),
            },
        }
    }

    pub fn import(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            source: PlanSource::Import { path: path.into() },
        }
    }
}

/// Seed rows ready to insert, computed before the store is touched.
enum Seed {
    Nothing,
    Ranked(Vec<(String, String)>),
    Imported(Vec<(String, String)>),
}

impl SqliteRecordStore {
    /// Create a plan and seed it from `request.source`.
    ///
    /// Selects the new plan as current when no plan is selected.
    pub fn create_plan_from(
        &self,
        request: &NewPlan,
        dictionary: &dyn DictionaryProvider,
    ) -> Result<PlanId> {
        let seed = load_seed(&request.source, dictionary)?;

        let conn = self.lock()?;
        let tx = conn.unchecked_transaction()?;

        let plan = Plan {
            id: Uuid::new_v4(),
            name: request.name.clone(),
            deleted: false,
            version: self.clock().next(),
            origin: self.device_id().to_string(),
        };

        let seeded = insert_plan(&tx, &plan).and_then(|_| match seed {
            Seed::Nothing => Ok(0),
            Seed::Ranked(rows) => seed_ranked(&tx, &plan, &rows),
            Seed::Imported(rows) => {
                let active = active_dictionary(&tx, self.default_dictionary())?;
                seed_imported(&tx, &plan, rows, dictionary, &active)
            }
        });
        let count = match seeded {
            Ok(count) => count,
            Err(e) => {
                tx.rollback()?;
                tracing::warn!(plan = %plan.id, name = %plan.name, "Plan seeding failed, rolled back: {}", e);
                return Err(e);
            }
        };

        let selected = if read_current_plan(&tx)?.is_none() {
            write_current_plan(&tx, Some(plan.id))?;
            true
        } else {
            false
        };
        tx.commit()?;
        drop(conn);

        tracing::info!(plan = %plan.id, name = %plan.name, words = count, "Created plan");
        if selected {
            self.emit(StoreEvent::PlanSelected {
                plan_id: Some(plan.id),
            });
        }
        Ok(plan.id)
    }
}

fn load_seed(source: &PlanSource, dictionary: &dyn DictionaryProvider) -> Result<Seed> {
    match source {
        PlanSource::Blank => Ok(Seed::Nothing),
        PlanSource::Library {
            dictionary: id,
            tag,
            order,
        } => {
            let entries = dictionary.list_by_tag(id, tag, order)?;
            Ok(Seed::Ranked(
                entries.into_iter().map(|e| (e.word, e.paraphrase)).collect(),
            ))
        }
        PlanSource::Import { path } => {
            let format = ImportFormat::from_path(path)?;
            let raw = std::fs::read_to_string(path)
                .map_err(|e| StoreError::Import(format!("read {}: {}", path.display(), e)))?;
            let schema = ImportSchema::words();
            let rows = format
                .parser()
                .parse(&schema, &raw)?
                .into_iter()
                .map(|mut row| {
                    let word = row.remove("word").unwrap_or_default();
                    let paraphrase = row.remove("paraphrase").unwrap_or_default();
                    (word, paraphrase)
                })
                .collect();
            Ok(Seed::Imported(rows))
        }
    }
}

fn active_dictionary(conn: &Connection, fallback: &str) -> Result<String> {
    match settings::read_setting(conn, keys::DICTIONARY)? {
        Some(serde_json::Value::String(id)) => Ok(id),
        _ => Ok(fallback.to_string()),
    }
}

fn seed_ranked(conn: &Connection, plan: &Plan, rows: &[(String, String)]) -> Result<usize> {
    let mut stmt = conn.prepare(
        "INSERT INTO words (plan_id, word, time, paraphrase, version, origin)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )?;
    let id = plan.id.to_string();
    for (rank, (word, paraphrase)) in rows.iter().enumerate() {
        stmt.execute(params![
            id,
            word,
            rank as i64 + 1,
            paraphrase,
            plan.version.value(),
            plan.origin,
        ])?;
    }
    Ok(rows.len())
}

fn seed_imported(
    conn: &Connection,
    plan: &Plan,
    rows: Vec<(String, String)>,
    dictionary: &dyn DictionaryProvider,
    active: &str,
) -> Result<usize> {
    let mut stmt = conn.prepare(
        "INSERT OR IGNORE INTO words (plan_id, word, time, paraphrase, version, origin)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )?;
    let id = plan.id.to_string();
    let version: Version = plan.version;
    let mut time = 0i64;
    let mut inserted = 0;
    for (word, paraphrase) in rows {
        if word.is_empty() {
            continue;
        }
        time += 1;
        let paraphrase = if paraphrase.is_empty() {
            dictionary
                .lookup_paraphrase(active, &word)?
                .unwrap_or_default()
        } else {
            paraphrase
        };
        inserted += stmt.execute(params![id, word, time, paraphrase, version.value(), plan.origin])?;
    }
    Ok(inserted)
}

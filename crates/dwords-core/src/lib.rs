//! DWords Core - local-first store for vocabulary plans
//!
//! This crate provides the record layer behind the DWords word-learning app:
//!
//! - **Plans and Words**: versioned records with tombstone deletion
//! - **Clock**: monotonic version stamps (`WallClock`, `LogicalClock`)
//! - **Lifecycle**: Current / Planning / Memorized / All views over a plan
//! - **Rename**: identity change as (tombstone old, insert new) in one transaction
//! - **Initializer**: blank plans, dictionary-tag plans, CSV-imported plans
//! - **Sync**: last-writer-wins merge and change export between replicas
//! - **Dictionary**: read-only reference dictionaries in SQLite
//! - **Settings**: JSON-valued user settings with configured defaults
//!
//! # Record identity
//!
//! ```text
//! Plan  : id (UUID v4)
//! Word  : (plan_id, word)   one physical row per identity, live or tombstoned
//! ```

pub mod clock;
pub mod config;
pub mod dictionary;
pub mod error;
pub mod event;
pub mod import;
pub mod initializer;
pub mod lifecycle;
pub mod model;
mod rename;
pub mod schema;
pub mod settings;
pub mod sqlite_store;
pub mod store;
pub mod sync;

pub use clock::{LogicalClock, Version, VersionClock, WallClock};
pub use config::{DWordsConfig, SettingsDefaults};
pub use dictionary::{
    DictEntry, DictionaryProvider, DictionarySpec, NullDictionary, SqliteDictionary,
    PREFIX_SEARCH_LIMIT,
};
pub use error::{Result, StoreError};
pub use event::StoreEvent;
pub use import::{CsvParser, ImportFormat, ImportRow, ImportSchema, TabularParser};
pub use initializer::{NewPlan, PlanSource};
pub use lifecycle::WordList;
pub use model::{DeviceId, Plan, PlanId, Word, WordPatch, WordStatus};
pub use schema::{Schema, SCHEMA_VERSION};
pub use settings::{keys, SettingsStore};
pub use sqlite_store::SqliteRecordStore;
pub use store::RecordStore;
pub use sync::{MergeOutcome, SyncBatch, SyncReport};

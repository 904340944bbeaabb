//! Reference dictionary provider
//!
//! Dictionaries are externally maintained, read-only SQLite tables. Each
//! dictionary id maps to a table and the column holding the paraphrase.
//! Table, column and order-key names are spliced into SQL, so they are
//! checked with [`is_sql_identifier`] first.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};

/// Upper bound on prefix search results
pub const PREFIX_SEARCH_LIMIT: usize = 100;

/// Where a dictionary lives inside the dictionary database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DictionarySpec {
    pub table: String,
    pub field: String,
}

/// One dictionary row projected to what plans need.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DictEntry {
    pub word: String,
    pub paraphrase: String,
}

/// Read-only access to reference dictionaries.
pub trait DictionaryProvider: Send + Sync {
    /// Paraphrase of `word`, if the dictionary has it.
    fn lookup_paraphrase(&self, dictionary_id: &str, word: &str) -> Result<Option<String>>;

    /// Entries whose tag contains `tag`, ordered by the `order_key` column.
    fn list_by_tag(&self, dictionary_id: &str, tag: &str, order_key: &str)
        -> Result<Vec<DictEntry>>;

    /// Words starting with `prefix`, at most [`PREFIX_SEARCH_LIMIT`].
    fn prefix_search(&self, dictionary_id: &str, prefix: &str) -> Result<Vec<String>>;
}

/// True for `[A-Za-z_][A-Za-z0-9_]*`.
pub fn is_sql_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Escape LIKE wildcards so user input matches literally.
fn escape_like(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// SQLite-backed dictionary provider.
pub struct SqliteDictionary {
    conn: Mutex<Connection>,
    specs: BTreeMap<String, DictionarySpec>,
}

impl SqliteDictionary {
    /// Open the dictionary database read-only.
    pub fn open(path: &Path, specs: BTreeMap<String, DictionarySpec>) -> Result<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| StoreError::StoreIo(format!("open dictionary: {}", e)))?;
        Ok(Self::from_connection(conn, specs))
    }

    /// Wrap an existing connection (used by tests with in-memory data).
    pub fn from_connection(conn: Connection, specs: BTreeMap<String, DictionarySpec>) -> Self {
        Self {
            conn: Mutex::new(conn),
            specs,
        }
    }

    fn spec(&self, dictionary_id: &str) -> Result<&DictionarySpec> {
        let spec = self
            .specs
            .get(dictionary_id)
            .ok_or_else(|| StoreError::NotFound(format!("dictionary {}", dictionary_id)))?;
        if !is_sql_identifier(&spec.table) || !is_sql_identifier(&spec.field) {
            return Err(StoreError::Config(format!(
                "dictionary {} has an invalid table or field name",
                dictionary_id
            )));
        }
        Ok(spec)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| StoreError::StoreIo(e.to_string()))
    }
}

impl DictionaryProvider for SqliteDictionary {
    fn lookup_paraphrase(&self, dictionary_id: &str, word: &str) -> Result<Option<String>> {
        let spec = self.spec(dictionary_id)?;
        let sql = format!(
            "SELECT COALESCE({field}, '') FROM {table} WHERE word = ?1 LIMIT 1",
            field = spec.field,
            table = spec.table
        );
        let conn = self.lock()?;
        let paraphrase = conn
            .query_row(&sql, params![word], |row| row.get(0))
            .optional()?;
        Ok(paraphrase)
    }

    fn list_by_tag(
        &self,
        dictionary_id: &str,
        tag: &str,
        order_key: &str,
    ) -> Result<Vec<DictEntry>> {
        let spec = self.spec(dictionary_id)?;
        if !is_sql_identifier(order_key) {
            return Err(StoreError::NotFound(format!("order key {}", order_key)));
        }
        let sql = format!(
            "SELECT word, COALESCE({field}, '') FROM {table}
             WHERE tag LIKE ?1 ESCAPE '\\'
             ORDER BY {order}, rowid",
            field = spec.field,
            table = spec.table,
            order = order_key
        );
        let pattern = format!("%{}%", escape_like(tag));

        let conn = self.lock()?;
        let mut stmt = conn.prepare(&sql)?;
        let entries = stmt
            .query_map(params![pattern], |row| {
                Ok(DictEntry {
                    word: row.get(0)?,
                    paraphrase: row.get(1)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    fn prefix_search(&self, dictionary_id: &str, prefix: &str) -> Result<Vec<String>> {
        let spec = self.spec(dictionary_id)?;
        let sql = format!(
            "SELECT word FROM {table} WHERE word LIKE ?1 ESCAPE '\\' LIMIT ?2",
            table = spec.table
        );
        let pattern = format!("{}%", escape_like(prefix));

        let conn = self.lock()?;
        let mut stmt = conn.prepare(&sql)?;
        let words = stmt
            .query_map(params![pattern, PREFIX_SEARCH_LIMIT as i64], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(words)
    }
}

/// Provider for setups without a dictionary database.
///
/// Lookups find nothing and library listings report the dictionary missing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullDictionary;

impl DictionaryProvider for NullDictionary {
    fn lookup_paraphrase(&self, _dictionary_id: &str, _word: &str) -> Result<Option<String>> {
        Ok(None)
    }

    fn list_by_tag(
        &self,
        dictionary_id: &str,
        _tag: &str,
        _order_key: &str,
    ) -> Result<Vec<DictEntry>> {
        Err(StoreError::NotFound(format!("dictionary {}", dictionary_id)))
    }

    fn prefix_search(&self, _dictionary_id: &str, _prefix: &str) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}

//! User settings and single-value system entries
//!
//! Settings are JSON values keyed by name. The store reads two of them:
//! [`keys::DICTIONARY`] and [`keys::MAX_CURRENT`]; any other key is kept
//! verbatim for the presentation layer.

use std::collections::BTreeMap;

use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;

use crate::config::SettingsDefaults;
use crate::error::{Result, StoreError};

pub mod keys {
    /// Active dictionary id
    pub const DICTIONARY: &str = "dictionary";
    /// Size of the "Current" word window
    pub const MAX_CURRENT: &str = "maxCurrent";
}

/// System-state keys (not user settings)
pub(crate) mod system {
    pub const CURRENT_PLAN: &str = "currentPlan";
    pub const DEVICE_ID: &str = "deviceId";
}

/// Key-value settings store.
pub trait SettingsStore {
    /// Effective value of `key`: the stored value, else the default, else `None`.
    fn get_setting(&self, key: &str) -> Result<Option<Value>>;

    /// Write every entry of `settings` in one transaction.
    fn update_settings(&self, settings: BTreeMap<String, Value>) -> Result<()>;

    /// Window size for the "Current" view.
    fn max_current(&self) -> Result<u32> {
        match self.get_setting(keys::MAX_CURRENT)? {
            Some(value) => parse_max_current(&value),
            None => Err(StoreError::NotFound(format!("setting {}", keys::MAX_CURRENT))),
        }
    }

    /// Active dictionary id.
    fn dictionary(&self) -> Result<String> {
        match self.get_setting(keys::DICTIONARY)? {
            Some(Value::String(id)) => Ok(id),
            Some(other) => Err(StoreError::Config(format!(
                "setting {} must be a string, got {}",
                keys::DICTIONARY,
                other
            ))),
            None => Err(StoreError::NotFound(format!("setting {}", keys::DICTIONARY))),
        }
    }
}

pub(crate) fn parse_max_current(value: &Value) -> Result<u32> {
    value
        .as_u64()
        .filter(|n| *n > 0 && *n <= u32::MAX as u64)
        .map(|n| n as u32)
        .ok_or_else(|| {
            StoreError::Config(format!(
                "setting {} must be a positive integer, got {}",
                keys::MAX_CURRENT,
                value
            ))
        })
}

/// Reject values the store itself could not use.
pub(crate) fn validate_setting(key: &str, value: &Value) -> Result<()> {
    match key {
        keys::MAX_CURRENT => parse_max_current(value).map(|_| ()),
        keys::DICTIONARY if !value.is_string() => Err(StoreError::Config(format!(
            "setting {} must be a string",
            keys::DICTIONARY
        ))),
        _ => Ok(()),
    }
}

pub(crate) fn default_setting(defaults: &SettingsDefaults, key: &str) -> Option<Value> {
    match key {
        keys::DICTIONARY => Some(Value::String(defaults.dictionary.clone())),
        keys::MAX_CURRENT => Some(Value::from(defaults.max_current)),
        _ => None,
    }
}

pub(crate) fn read_setting(conn: &Connection, key: &str) -> Result<Option<Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value FROM settings WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()?;
    raw.map(|s| serde_json::from_str(&s).map_err(StoreError::from))
        .transpose()
}

pub(crate) fn write_setting(conn: &Connection, key: &str, value: &Value) -> Result<()> {
    let raw = serde_json::to_string(value)?;
    conn.execute(
        "INSERT INTO settings (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![key, raw],
    )?;
    Ok(())
}

pub(crate) fn read_system(conn: &Connection, key: &str) -> Result<Option<String>> {
    let value: Option<Option<String>> = conn
        .query_row(
            "SELECT value FROM system_state WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()?;
    Ok(value.flatten())
}

pub(crate) fn write_system(conn: &Connection, key: &str, value: Option<&str>) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO system_state (key, value, updated_at) VALUES (?1, ?2, datetime('now'))",
        params![key, value],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Schema;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(Schema::create_tables()).unwrap();
        conn
    }

    #[test]
    fn setting_round_trip() {
        let conn = conn();
        assert_eq!(read_setting(&conn, "danmakuSpeed").unwrap(), None);

        write_setting(&conn, "danmakuSpeed", &Value::from(0.1)).unwrap();
        write_setting(&conn, "danmakuSpeed", &Value::from(0.2)).unwrap();
        assert_eq!(
            read_setting(&conn, "danmakuSpeed").unwrap(),
            Some(Value::from(0.2))
        );
    }

    #[test]
    fn system_entry_may_be_null() {
        let conn = conn();
        write_system(&conn, system::CURRENT_PLAN, Some("abc")).unwrap();
        assert_eq!(
            read_system(&conn, system::CURRENT_PLAN).unwrap(),
            Some("abc".to_string())
        );
        write_system(&conn, system::CURRENT_PLAN, None).unwrap();
        assert_eq!(read_system(&conn, system::CURRENT_PLAN).unwrap(), None);
    }

    #[test]
    fn max_current_validation() {
        assert_eq!(parse_max_current(&Value::from(5)).unwrap(), 5);
        assert!(parse_max_current(&Value::from(0)).is_err());
        assert!(parse_max_current(&Value::from(-3)).is_err());
        assert!(parse_max_current(&Value::from("5")).is_err());

        assert!(validate_setting(keys::DICTIONARY, &Value::from(3)).is_err());
        assert!(validate_setting("anything", &Value::Null).is_ok());
    }

    #[test]
    fn defaults_cover_known_keys() {
        let defaults = SettingsDefaults::default();
        assert_eq!(
            default_setting(&defaults, keys::MAX_CURRENT),
            Some(Value::from(20))
        );
        assert_eq!(default_setting(&defaults, "unknown"), None);
    }
}

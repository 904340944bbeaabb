//! Shared store and dictionary fixtures

use std::collections::BTreeMap;
use std::io::Write;
use std::sync::Arc;

use dwords_core::{
    DWordsConfig, DictionarySpec, LogicalClock, Plan, PlanId, SqliteDictionary,
    SqliteRecordStore, Version, Word, WordStatus,
};
use rusqlite::Connection;

/// In-memory store with a fixed device id and a logical clock.
pub fn store(device: &str) -> SqliteRecordStore {
    store_with_clock(device, LogicalClock::new())
}

#[allow(dead_code)]
pub fn store_with_clock(device: &str, clock: LogicalClock) -> SqliteRecordStore {
    let config = DWordsConfig {
        device_id: Some(device.to_string()),
        ..DWordsConfig::default()
    };
    SqliteRecordStore::open_in_memory_with(&config, Arc::new(clock))
        .unwrap_or_else(|e| panic!("Failed to open store: {}", e))
}

/// A small ECDICT-shaped dictionary.
#[allow(dead_code)]
pub fn dictionary() -> SqliteDictionary {
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch(
        "
        CREATE TABLE ecdict (word TEXT PRIMARY KEY, translation TEXT, tag TEXT, frq INTEGER);
        INSERT INTO ecdict VALUES ('abandon', 'v. 放弃', 'zk gk cet4', 3);
        INSERT INTO ecdict VALUES ('ability', 'n. 能力', 'gk cet4', 1);
        INSERT INTO ecdict VALUES ('abnormal', 'a. 反常的', 'cet6', 5);
        INSERT INTO ecdict VALUES ('aboard', 'ad. 在船上', 'gk cet4', 2);
        ",
    )
    .unwrap();
    let mut specs = BTreeMap::new();
    specs.insert(
        "ecdict".to_string(),
        DictionarySpec {
            table: "ecdict".to_string(),
            field: "translation".to_string(),
        },
    );
    SqliteDictionary::from_connection(conn, specs)
}

/// Write `contents` to a temp file with the given suffix.
#[allow(dead_code)]
pub fn source_file(suffix: &str, contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[allow(dead_code)]
pub fn plan(id: PlanId, name: &str, version: i64, origin: &str) -> Plan {
    Plan {
        id,
        name: name.to_string(),
        deleted: false,
        version: Version(version),
        origin: origin.to_string(),
    }
}

#[allow(dead_code)]
pub fn word(plan_id: PlanId, word: &str, paraphrase: &str, version: i64, origin: &str) -> Word {
    Word {
        plan_id,
        word: word.to_string(),
        time: 1,
        paraphrase: paraphrase.to_string(),
        show_paraphrase: false,
        color: String::new(),
        status: WordStatus::Active,
        deleted: false,
        version: Version(version),
        origin: origin.to_string(),
    }
}

//! Tabular import sources for new plans

use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{Result, StoreError};

/// A parsed row, keyed by field name.
pub type ImportRow = BTreeMap<String, String>;

/// One column of an import schema.
#[derive(Debug, Clone, Copy)]
pub struct ImportField {
    pub name: &'static str,
    pub parse: fn(&str) -> String,
}

/// Field names and per-field parse functions, in column order.
#[derive(Debug, Clone)]
pub struct ImportSchema {
    pub fields: Vec<ImportField>,
}

impl ImportSchema {
    /// `word, paraphrase` with surrounding whitespace trimmed.
    pub fn words() -> Self {
        fn trimmed(value: &str) -> String {
            value.trim().to_string()
        }
        Self {
            fields: vec![
                ImportField {
                    name: "word",
                    parse: trimmed,
                },
                ImportField {
                    name: "paraphrase",
                    parse: trimmed,
                },
            ],
        }
    }
}

/// Parses raw text into rows according to a schema.
pub trait TabularParser {
    fn parse(&self, schema: &ImportSchema, raw: &str) -> Result<Vec<ImportRow>>;
}

/// Supported import formats, chosen by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportFormat {
    Csv,
}

impl ImportFormat {
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match ext.as_deref() {
            Some("csv") => Ok(ImportFormat::Csv),
            Some(other) => Err(StoreError::UnsupportedFormat(format!(".{}", other))),
            None => Err(StoreError::UnsupportedFormat(path.display().to_string())),
        }
    }

    pub fn parser(self) -> Box<dyn TabularParser> {
        match self {
            ImportFormat::Csv => Box::new(CsvParser::default()),
        }
    }
}

/// Headerless CSV; columns map to schema fields by position and missing
/// trailing columns parse as empty strings.
#[derive(Debug, Clone)]
pub struct CsvParser {
    delimiter: u8,
}

impl Default for CsvParser {
    fn default() -> Self {
        Self { delimiter: b',' }
    }
}

impl CsvParser {
    pub fn with_delimiter(delimiter: u8) -> Self {
        Self { delimiter }
    }
}

impl TabularParser for CsvParser {
    fn parse(&self, schema: &ImportSchema, raw: &str) -> Result<Vec<ImportRow>> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(self.delimiter)
            .has_headers(false)
            .flexible(true)
            .from_reader(raw.as_bytes());

        let mut rows = Vec::new();
        for result in reader.records() {
            let record = result?;
            let row = schema
                .fields
                .iter()
                .enumerate()
                .map(|(i, field)| {
                    let value = record.get(i).unwrap_or("");
                    (field.name.to_string(), (field.parse)(value))
                })
                .collect();
            rows.push(row);
        }
        Ok(rows)
    }
}

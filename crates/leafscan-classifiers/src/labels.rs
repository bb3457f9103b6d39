//! Disease label table
//!
//! Entry `i` of the table describes output class `i` of the model. The table
//! is validated once at load time so that a malformed file fails at startup
//! rather than on the first request.

use leafscan_core::{Error, LabelRecord, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Accepted JSON layouts
#[derive(Deserialize)]
#[serde(untagged)]
enum RawTable {
    /// `[{"name": .., "cause": .., "cure": ..}, ...]`
    List(Vec<LabelRecord>),
    /// `{"0": {...}, "1": {...}, ...}`
    Keyed(BTreeMap<String, LabelRecord>),
}

/// Read-only table of label records indexed by class
#[derive(Debug, Clone, PartialEq)]
pub struct LabelTable {
    records: Vec<LabelRecord>,
}

impl LabelTable {
    /// Build a table from records already in class order
    pub fn new(records: Vec<LabelRecord>) -> Result<Self> {
        if records.is_empty() {
            return Err(Error::labels("label table is empty"));
        }

        if let Some(pos) = records.iter().position(|r| r.name.trim().is_empty()) {
            return Err(Error::labels(format!("entry {} has an empty name", pos)));
        }

        Ok(Self { records })
    }

    /// Parse a table from JSON text.
    ///
    /// When `expected_classes` is given, the table must have exactly that many
    /// entries.
    pub fn from_json_str(json: &str, expected_classes: Option<usize>) -> Result<Self> {
        let raw: RawTable = serde_json::from_str(json).map_err(|e| {
            Error::labels(format!(
                "expected an array of {{name, cause, cure}} records or an object keyed by class index: {}",
                e
            ))
        })?;

        let records = match raw {
            RawTable::List(records) => records,
            RawTable::Keyed(map) => Self::order_keyed(map)?,
        };

        let table = Self::new(records)?;

        if let Some(expected) = expected_classes {
            if table.len() != expected {
                return Err(Error::labels(format!(
                    "label table has {} entries but the model has {} classes",
                    table.len(),
                    expected
                )));
            }
        }

        Ok(table)
    }

    /// Load and validate a table file
    pub fn from_file(path: impl AsRef<Path>, expected_classes: Option<usize>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::labels(format!("Failed to read label table {}: {}", path.display(), e))
        })?;

        let table = Self::from_json_str(&contents, expected_classes)?;
        tracing::info!("Loaded {} labels from {}", table.len(), path.display());
        Ok(table)
    }

    fn order_keyed(map: BTreeMap<String, LabelRecord>) -> Result<Vec<LabelRecord>> {
        let mut indexed = BTreeMap::new();
        for (key, record) in map {
            let index: usize = key
                .trim()
                .parse()
                .map_err(|_| Error::labels(format!("key '{}' is not a class index", key)))?;
            if indexed.insert(index, record).is_some() {
                return Err(Error::labels(format!("class index {} appears more than once", index)));
            }
        }

        // Keys come out sorted, so the first gap is the first mismatch.
        for (expected, actual) in indexed.keys().enumerate() {
            if expected != *actual {
                return Err(Error::labels(format!("missing entry for class index {}", expected)));
            }
        }

        Ok(indexed.into_values().collect())
    }

    /// Record for a class index
    pub fn get(&self, index: usize) -> Result<&LabelRecord> {
        self.records.get(index).ok_or(Error::IndexOutOfRange {
            index,
            len: self.records.len(),
        })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LabelRecord> {
        self.records.iter()
    }
}

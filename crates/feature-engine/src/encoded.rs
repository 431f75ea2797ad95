//! Encoded Records

use std::collections::HashMap;
use tabular_input::Cell;

/// Record after categorical encoding and derived-feature computation.
///
/// Values are kept as cells: passthrough columns may still hold text that
/// the aligner coerces.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EncodedRecord {
    values: HashMap<String, Cell>,
}

impl EncodedRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_number(&mut self, name: impl Into<String>, value: f64) {
        self.values.insert(name.into(), Cell::from(value));
    }

    pub fn insert_cell(&mut self, name: impl Into<String>, cell: Cell) {
        self.values.insert(name.into(), cell);
    }

    pub fn get(&self, name: &str) -> Option<&Cell> {
        self.values.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Overwrite entries with every entry of `other`
    pub fn merge(&mut self, other: EncodedRecord) {
        self.values.extend(other.values);
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Cell)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, f64)> for EncodedRecord {
    fn from_iter<I: IntoIterator<Item = (K, f64)>>(iter: I) -> Self {
        let mut record = EncodedRecord::new();
        for (name, value) in iter {
            record.insert_number(name, value);
        }
        record
    }
}

//! Schema Alignment
//!
//! Reshapes encoded records into the fixed-width, fixed-order vectors the
//! classifier was trained on. Schema drift in an upload never fails a row:
//! absent columns and unusable cells become `0`, extra columns are dropped.

use crate::encoded::EncodedRecord;
use crate::error::FeatureError;
use crate::schema::FeatureSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tabular_input::Cell;
use tracing::{debug, info, warn};

/// Feature vector in schema order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignedFeatureVector {
    values: Vec<f64>,
}

impl AlignedFeatureVector {
    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<f64> {
        self.values.get(idx).copied()
    }

    pub fn into_inner(self) -> Vec<f64> {
        self.values
    }
}

/// What alignment had to default, accumulated over a batch
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AlignmentReport {
    /// Rows aligned
    pub rows: usize,
    /// Schema cells with no value in the record
    pub missing_cells: usize,
    /// Cells present but not numeric
    pub coerced_cells: usize,
    /// Categorical values outside the trained rules
    pub unknown_categories: usize,
    /// Schema column → rows in which it was absent
    pub missing_columns: BTreeMap<String, usize>,
    /// Columns present in the input but not in the schema
    pub dropped_columns: BTreeSet<String>,
}

impl AlignmentReport {
    /// Schema columns absent from every row
    pub fn columns_missing_everywhere(&self) -> Vec<&str> {
        self.missing_columns
            .iter()
            .filter(|(_, rows)| **rows == self.rows)
            .map(|(column, _)| column.as_str())
            .collect()
    }

    pub fn is_clean(&self) -> bool {
        self.missing_cells == 0
            && self.coerced_cells == 0
            && self.unknown_categories == 0
            && self.dropped_columns.is_empty()
    }

    /// Emit a one-line summary of the defaults applied
    pub fn log_summary(&self) {
        if self.is_clean() {
            info!(rows = self.rows, "Aligned batch with no schema drift");
            return;
        }

        let absent = self.columns_missing_everywhere();
        warn!(
            rows = self.rows,
            missing_cells = self.missing_cells,
            coerced_cells = self.coerced_cells,
            unknown_categories = self.unknown_categories,
            absent_columns = absent.len(),
            dropped_columns = self.dropped_columns.len(),
            "Aligned batch with defaults applied"
        );
        if !absent.is_empty() {
            debug!("Columns absent from upload, filled with 0: {:?}", absent);
        }
        if !self.dropped_columns.is_empty() {
            debug!("Columns dropped as unknown to the model: {:?}", self.dropped_columns);
        }
    }
}

/// Projects encoded records onto the schema
#[derive(Debug, Clone)]
pub struct SchemaAligner {
    schema: Arc<FeatureSchema>,
}

impl SchemaAligner {
    pub fn new(schema: Arc<FeatureSchema>) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    /// Align one record; the result always has `feature_count()` entries
    pub fn align(&self, record: &EncodedRecord) -> AlignedFeatureVector {
        let mut report = AlignmentReport::default();
        self.align_with_report(record, &mut report)
    }

    /// Align one record, recording every default applied into `report`
    pub fn align_with_report(
        &self,
        record: &EncodedRecord,
        report: &mut AlignmentReport,
    ) -> AlignedFeatureVector {
        let mut values = Vec::with_capacity(self.schema.feature_count());

        for name in self.schema.feature_names() {
            let value = match record.get(name) {
                None | Some(Cell::Empty) => {
                    report.missing_cells += 1;
                    *report.missing_columns.entry(name.clone()).or_insert(0) += 1;
                    0.0
                }
                Some(cell) => match cell.as_number() {
                    Some(v) => v,
                    None => {
                        debug!(column = %name, value = %cell, "Non-numeric cell coerced to 0");
                        report.coerced_cells += 1;
                        0.0
                    }
                },
            };
            values.push(value);
        }

        for name in record.names() {
            if !self.schema.contains_feature(name) {
                report.dropped_columns.insert(name.to_string());
            }
        }

        report.rows += 1;
        AlignedFeatureVector { values }
    }

    /// Align a whole batch, order preserved
    pub fn align_batch(
        &self,
        records: &[EncodedRecord],
    ) -> Result<(Vec<AlignedFeatureVector>, AlignmentReport), FeatureError> {
        if records.is_empty() {
            return Err(FeatureError::EmptyDataset);
        }

        let mut report = AlignmentReport::default();
        let vectors = records
            .iter()
            .map(|record| self.align_with_report(record, &mut report))
            .collect();

        Ok((vectors, report))
    }
}

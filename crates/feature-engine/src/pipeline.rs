//! Feature Preparation Pipeline
//!
//! Raw upload rows → encoded records → aligned vectors, one batch at a time.

use crate::aligner::{AlignedFeatureVector, AlignmentReport, SchemaAligner};
use crate::derived::DerivedFeatureComputer;
use crate::encoded::EncodedRecord;
use crate::encoder::CategoricalEncoder;
use crate::error::FeatureError;
use crate::schema::FeatureSchema;
use std::sync::Arc;
use tabular_input::RawRecord;
use tracing::debug;

/// A batch ready for the classifier
#[derive(Debug, Clone)]
pub struct PreparedBatch {
    /// One vector per input row, in input order
    pub vectors: Vec<AlignedFeatureVector>,
    /// Identifier per row: the identifier column value, else the row index
    pub row_ids: Vec<String>,
    /// Defaults applied while preparing the batch
    pub report: AlignmentReport,
}

impl PreparedBatch {
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }
}

/// Encoder, derived features and aligner bound to one schema
#[derive(Debug, Clone)]
pub struct FeaturePipeline {
    schema: Arc<FeatureSchema>,
    encoder: CategoricalEncoder,
    derived: DerivedFeatureComputer,
    aligner: SchemaAligner,
}

impl FeaturePipeline {
    pub fn new(schema: Arc<FeatureSchema>) -> Self {
        Self::with_derived(schema, DerivedFeatureComputer::standard())
    }

    pub fn with_derived(schema: Arc<FeatureSchema>, derived: DerivedFeatureComputer) -> Self {
        Self {
            encoder: CategoricalEncoder::from_schema(&schema),
            aligner: SchemaAligner::new(Arc::clone(&schema)),
            derived,
            schema,
        }
    }

    pub fn schema(&self) -> &Arc<FeatureSchema> {
        &self.schema
    }

    /// Build the encoded record for one raw row.
    ///
    /// Later steps overwrite earlier ones: uploaded passthrough columns, then
    /// derived features the schema uses, then categorical indicators.
    /// Returns the unknown categories that were recovered as absent.
    pub fn encode_record(&self, record: &RawRecord) -> (EncodedRecord, Vec<FeatureError>) {
        let identifier = self.schema.identifier_column();
        let mut encoded = EncodedRecord::new();

        for (column, cell) in record.iter() {
            if Some(column) == identifier || self.encoder.handles(column) {
                continue;
            }
            encoded.insert_cell(column, cell.clone());
        }

        for (name, cell) in self.derived.compute(record).iter() {
            if self.schema.contains_feature(name) {
                encoded.insert_cell(name, cell.clone());
            }
        }

        let encoding = self.encoder.encode(record);
        encoded.merge(encoding.record);

        (encoded, encoding.unknown)
    }

    /// Prepare a batch for inference. Fails only on an empty batch.
    pub fn prepare(&self, records: &[RawRecord]) -> Result<PreparedBatch, FeatureError> {
        if records.is_empty() {
            return Err(FeatureError::EmptyDataset);
        }

        let mut unknown_categories = 0;
        let mut row_ids = Vec::with_capacity(records.len());
        let mut encoded = Vec::with_capacity(records.len());

        for (idx, record) in records.iter().enumerate() {
            let (row, unknown) = self.encode_record(record);
            unknown_categories += unknown.len();
            encoded.push(row);
            row_ids.push(self.row_id(record, idx));
        }

        let (vectors, mut report) = self.aligner.align_batch(&encoded)?;
        report.unknown_categories = unknown_categories;
        report.log_summary();

        debug!(
            "Prepared {} rows x {} features",
            vectors.len(),
            self.schema.feature_count()
        );

        Ok(PreparedBatch {
            vectors,
            row_ids,
            report,
        })
    }

    fn row_id(&self, record: &RawRecord, idx: usize) -> String {
        self.schema
            .identifier_column()
            .and_then(|column| record.get(column))
            .and_then(|cell| cell.as_text())
            .unwrap_or_else(|| idx.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tabular_input::Cell;

    const SCHEMA: &str = r#"{
        "version": 1,
        "identifier_column": "PROSPECTID",
        "feature_names": [
            "CC_TL", "Home_TL", "PL_TL", "Other_TL", "pct_tl_open_L6M",
            "EDUCATION", "GENDER_F", "GENDER_M",
            "last_prod_enq2_AL", "last_prod_enq2_CC", "last_prod_enq2_others",
            "Total_TL", "Tot_Active_TL", "pct_active_tl", "Total_TL_opened_L6M"
        ],
        "categorical_rules": {
            "EDUCATION": {"ordinal": {"mapping": {"SSC": 1, "12TH": 2, "GRADUATE": 3}}},
            "GENDER": {"one_hot": {"categories": ["F", "M"]}},
            "last_prod_enq2": {"one_hot": {"categories": ["AL", "CC", "others"]}}
        }
    }"#;

    fn pipeline() -> FeaturePipeline {
        let schema = FeatureSchema::from_json(SCHEMA, r#"["P1","P2","P3","P4"]"#).unwrap();
        FeaturePipeline::new(Arc::new(schema))
    }

    fn column(p: &FeaturePipeline, vector: &AlignedFeatureVector, name: &str) -> f64 {
        vector.get(p.schema().position(name).unwrap()).unwrap()
    }

    fn full_row() -> RawRecord {
        RawRecord::new()
            .with("PROSPECTID", "A-17")
            .with("CC_TL", 2.0)
            .with("Home_TL", 1.0)
            .with("PL_TL", 0.0)
            .with("Other_TL", 1.0)
            .with("Tot_Closed_TL", 1.0)
            .with("pct_tl_open_L6M", 25.0)
            .with("EDUCATION", "GRADUATE")
            .with("GENDER", "F")
            .with("last_prod_enq2", "CC")
    }

    #[test]
    fn test_prepare_full_row() {
        let p = pipeline();
        let batch = p.prepare(&[full_row()]).unwrap();
        let v = &batch.vectors[0];

        assert_eq!(v.len(), 15);
        assert_eq!(column(&p, v, "EDUCATION"), 3.0);
        assert_eq!(column(&p, v, "GENDER_F"), 1.0);
        assert_eq!(column(&p, v, "GENDER_M"), 0.0);
        assert_eq!(column(&p, v, "last_prod_enq2_CC"), 1.0);
        assert_eq!(column(&p, v, "Total_TL"), 4.0);
        assert_eq!(column(&p, v, "Tot_Active_TL"), 3.0);
        assert_eq!(column(&p, v, "pct_active_tl"), 75.0);
        assert_eq!(column(&p, v, "Total_TL_opened_L6M"), 1.0);
        assert_eq!(batch.row_ids, vec!["A-17"]);
    }

    #[test]
    fn test_identifier_and_raw_categoricals_never_reach_vector() {
        let p = pipeline();
        let (encoded, _) = p.encode_record(&full_row());
        assert!(!encoded.contains("PROSPECTID"));
        assert!(!encoded.contains("GENDER"));
        assert!(!encoded.contains("last_prod_enq2"));
        assert!(!encoded.contains("pct_closed_tl"));
    }

    #[test]
    fn test_all_zero_row_with_unknown_category() {
        let p = pipeline();
        let row = RawRecord::new()
            .with("CC_TL", 0.0)
            .with("Home_TL", 0.0)
            .with("PL_TL", 0.0)
            .with("Other_TL", 0.0)
            .with("last_prod_enq2", "Mortgage");

        let batch = p.prepare(&[row]).unwrap();
        assert!(batch.vectors[0].as_slice().iter().all(|v| *v == 0.0));
        assert_eq!(batch.report.unknown_categories, 1);
        assert_eq!(batch.row_ids, vec!["0"]);
    }

    #[test]
    fn test_pre_encoded_indicators_pass_through() {
        let p = pipeline();
        let row = RawRecord::new().with("GENDER_M", 1.0).with("GENDER_F", 0.0);
        let batch = p.prepare(&[row]).unwrap();
        assert_eq!(column(&p, &batch.vectors[0], "GENDER_M"), 1.0);

        let row = RawRecord::new()
            .with("GENDER_M", 1.0)
            .with("GENDER", "F");
        let batch = p.prepare(&[row]).unwrap();
        assert_eq!(column(&p, &batch.vectors[0], "GENDER_M"), 0.0);
        assert_eq!(column(&p, &batch.vectors[0], "GENDER_F"), 1.0);
    }

    #[test]
    fn test_extra_column_does_not_change_output() {
        let p = pipeline();
        let plain = p.prepare(&[full_row()]).unwrap();
        let extra = p.prepare(&[full_row().with("BRANCH_CODE", "X9")]).unwrap();

        assert_eq!(plain.vectors, extra.vectors);
        assert!(extra.report.dropped_columns.contains("BRANCH_CODE"));
    }

    #[test]
    fn test_non_numeric_cell_coerced() {
        let p = pipeline();
        let row = full_row().with("PL_TL", "lots");
        let batch = p.prepare(&[row]).unwrap();

        assert_eq!(column(&p, &batch.vectors[0], "PL_TL"), 0.0);
        assert_eq!(batch.report.coerced_cells, 1);
    }

    #[test]
    fn test_empty_upload_rejected() {
        assert_eq!(pipeline().prepare(&[]).unwrap_err(), FeatureError::EmptyDataset);
    }

    #[test]
    fn test_permuting_rows_permutes_output() {
        let p = pipeline();
        let rows = vec![
            full_row(),
            RawRecord::new().with("CC_TL", 7.0).with("GENDER", "M"),
            RawRecord::new().with("EDUCATION", "SSC"),
        ];
        let reversed: Vec<RawRecord> = rows.iter().rev().cloned().collect();

        let forward = p.prepare(&rows).unwrap();
        let backward = p.prepare(&reversed).unwrap();

        let flipped: Vec<_> = backward.vectors.into_iter().rev().collect();
        assert_eq!(forward.vectors, flipped);
    }

    fn arb_row() -> impl Strategy<Value = RawRecord> {
        let cell = prop_oneof![
            (-1e6f64..1e6).prop_map(Cell::from),
            "[A-Za-z]{0,8}".prop_map(|s| Cell::parse(&s)),
            Just(Cell::Empty),
        ];
        let name = prop_oneof![
            Just("CC_TL".to_string()),
            Just("Home_TL".to_string()),
            Just("Other_TL".to_string()),
            Just("Tot_Closed_TL".to_string()),
            Just("EDUCATION".to_string()),
            Just("GENDER".to_string()),
            Just("last_prod_enq2".to_string()),
            "[a-z]{3,6}",
        ];
        proptest::collection::vec((name, cell), 0..12)
            .prop_map(|cells| cells.into_iter().collect::<RawRecord>())
    }

    proptest! {
        #[test]
        fn prop_same_row_same_vector_in_any_batch(
            target in arb_row(),
            others in proptest::collection::vec(arb_row(), 0..6),
            position in 0usize..6,
        ) {
            let p = pipeline();
            let alone = p.prepare(&[target.clone()]).unwrap().vectors.remove(0);

            let mut batch = others;
            let at = position.min(batch.len());
            batch.insert(at, target);
            let prepared = p.prepare(&batch).unwrap();

            prop_assert_eq!(&prepared.vectors[at], &alone);
            prop_assert!(prepared.vectors.iter().all(|v| v.len() == 15));
        }
    }
}

//! Categorical Encoding
//!
//! Encoding is compiled once from the schema's rules. The output for a value
//! depends only on that value and the rule, never on which other values show
//! up in the same upload.

use crate::encoded::EncodedRecord;
use crate::error::FeatureError;
use crate::schema::{one_hot_column, EncodingRule, FeatureSchema};
use std::collections::{BTreeMap, HashMap};
use tabular_input::{Cell, RawRecord};
use tracing::debug;

#[derive(Debug, Clone)]
enum CompiledRule {
    Ordinal {
        codes: HashMap<String, f64>,
        folded: HashMap<String, f64>,
        known_codes: Vec<f64>,
    },
    OneHot {
        columns: Vec<String>,
        lookup: HashMap<String, usize>,
        folded: HashMap<String, usize>,
    },
}

impl CompiledRule {
    fn compile(field: &str, rule: &EncodingRule) -> Self {
        match rule {
            EncodingRule::Ordinal { mapping } => {
                let codes: HashMap<String, f64> = mapping
                    .iter()
                    .map(|(value, code)| (value.trim().to_string(), *code as f64))
                    .collect();
                let folded = codes
                    .iter()
                    .map(|(value, code)| (value.to_lowercase(), *code))
                    .collect();
                let mut known_codes: Vec<f64> = codes.values().copied().collect();
                known_codes.sort_by(f64::total_cmp);
                known_codes.dedup();
                CompiledRule::Ordinal {
                    codes,
                    folded,
                    known_codes,
                }
            }
            EncodingRule::OneHot { categories, aliases } => {
                let columns = categories
                    .iter()
                    .map(|category| one_hot_column(field, category))
                    .collect();
                let mut lookup: HashMap<String, usize> = categories
                    .iter()
                    .enumerate()
                    .map(|(idx, category)| (category.trim().to_string(), idx))
                    .collect();
                for (alias, target) in aliases {
                    if let Some(idx) = categories.iter().position(|c| c == target) {
                        lookup.entry(alias.trim().to_string()).or_insert(idx);
                    }
                }
                // Case-folded keys: exact categories win over aliases on collision
                let mut folded = HashMap::new();
                for (idx, category) in categories.iter().enumerate() {
                    folded.entry(category.trim().to_lowercase()).or_insert(idx);
                }
                for (key, idx) in &lookup {
                    folded.entry(key.to_lowercase()).or_insert(*idx);
                }
                CompiledRule::OneHot {
                    columns,
                    lookup,
                    folded,
                }
            }
        }
    }

    /// Columns emitted when the field is present but its value is unusable
    fn fallback(&self) -> Vec<(String, f64)> {
        match self {
            CompiledRule::Ordinal { .. } => Vec::new(),
            CompiledRule::OneHot { columns, .. } => {
                columns.iter().map(|column| (column.clone(), 0.0)).collect()
            }
        }
    }
}

/// Result of encoding the categorical fields of one record
#[derive(Debug, Clone, Default)]
pub struct Encoding {
    /// Encoded columns for every categorical field present in the record
    pub record: EncodedRecord,
    /// Values outside the trained rules, already recovered as absent
    pub unknown: Vec<FeatureError>,
}

/// Maps raw categorical values onto the schema's encoded columns
#[derive(Debug, Clone)]
pub struct CategoricalEncoder {
    rules: BTreeMap<String, CompiledRule>,
}

impl CategoricalEncoder {
    /// Compile a rule set
    pub fn new(rules: &BTreeMap<String, EncodingRule>) -> Self {
        Self {
            rules: rules
                .iter()
                .map(|(field, rule)| (field.clone(), CompiledRule::compile(field, rule)))
                .collect(),
        }
    }

    pub fn from_schema(schema: &FeatureSchema) -> Self {
        Self::new(schema.categorical_rules())
    }

    /// Encode one field value.
    ///
    /// Ordinal: the code under the field's own name, nothing for a blank cell.
    /// One-hot: every indicator of the field, `1` on the match and `0` on the
    /// siblings; all `0` for a blank cell. A value outside the rule returns
    /// `UnknownCategory`.
    pub fn encode_field(&self, field: &str, cell: &Cell) -> Result<Vec<(String, f64)>, FeatureError> {
        let Some(rule) = self.rules.get(field) else {
            return Ok(Vec::new());
        };
        let Some(text) = cell.as_text() else {
            return Ok(rule.fallback());
        };

        let unknown = || FeatureError::UnknownCategory {
            field: field.to_string(),
            value: text.clone(),
        };

        match rule {
            CompiledRule::Ordinal {
                codes,
                folded,
                known_codes,
            } => {
                let code = codes
                    .get(&text)
                    .or_else(|| folded.get(&text.to_lowercase()))
                    .copied()
                    .or_else(|| {
                        cell.as_number()
                            .filter(|n| known_codes.iter().any(|code| code == n))
                    })
                    .ok_or_else(unknown)?;
                Ok(vec![(field.to_string(), code)])
            }
            CompiledRule::OneHot {
                columns,
                lookup,
                folded,
            } => {
                let hit = lookup
                    .get(&text)
                    .or_else(|| folded.get(&text.to_lowercase()))
                    .copied()
                    .ok_or_else(unknown)?;
                Ok(columns
                    .iter()
                    .enumerate()
                    .map(|(idx, column)| (column.clone(), if idx == hit { 1.0 } else { 0.0 }))
                    .collect())
            }
        }
    }

    /// Encode every categorical field present in the record.
    ///
    /// Fields absent from the record emit nothing, so pre-encoded indicator
    /// columns supplied by the client survive untouched.
    pub fn encode(&self, record: &RawRecord) -> Encoding {
        let mut encoding = Encoding::default();

        for (field, rule) in &self.rules {
            let Some(cell) = record.get(field) else {
                continue;
            };

            let columns = match self.encode_field(field, cell) {
                Ok(columns) => columns,
                Err(err) => {
                    debug!(field = %field, error = %err, "Unknown category treated as absent");
                    encoding.unknown.push(err);
                    rule.fallback()
                }
            };

            for (column, value) in columns {
                encoding.record.insert_number(column, value);
            }
        }

        encoding
    }

    /// Source fields handled by this encoder
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.rules.keys().map(String::as_str)
    }

    pub fn handles(&self, field: &str) -> bool {
        self.rules.contains_key(field)
    }
}

//! Derived Tradeline Features
//!
//! Totals and ratios computed from raw numeric columns before alignment, so
//! the results take part in the same defaulting as uploaded columns.

use crate::encoded::EncodedRecord;
use std::collections::HashMap;
use tabular_input::RawRecord;
use tracing::debug;

/// Formula for one derived column
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Formula {
    /// Sum of the inputs
    Sum(&'static [&'static str]),
    /// `minuend - subtrahend`
    Difference {
        minuend: &'static str,
        subtrahend: &'static str,
    },
    /// `100 * part / total`, zero when `total` is zero
    Percentage {
        part: &'static str,
        total: &'static str,
    },
    /// `pct * total / 100`, zero when `total` is zero
    ShareOfTotal {
        pct: &'static str,
        total: &'static str,
    },
}

impl Formula {
    /// Columns the formula reads
    pub fn inputs(&self) -> Vec<&'static str> {
        match *self {
            Formula::Sum(inputs) => inputs.to_vec(),
            Formula::Difference { minuend, subtrahend } => vec![minuend, subtrahend],
            Formula::Percentage { part, total } => vec![part, total],
            Formula::ShareOfTotal { pct, total } => vec![pct, total],
        }
    }

    fn evaluate(&self, value: impl Fn(&str) -> f64) -> f64 {
        let result = match *self {
            Formula::Sum(inputs) => inputs.iter().map(|name| value(name)).sum(),
            Formula::Difference { minuend, subtrahend } => value(minuend) - value(subtrahend),
            Formula::Percentage { part, total } => {
                let total = value(total);
                if total == 0.0 {
                    0.0
                } else {
                    100.0 * value(part) / total
                }
            }
            Formula::ShareOfTotal { pct, total } => {
                let total = value(total);
                if total == 0.0 {
                    0.0
                } else {
                    value(pct) * total / 100.0
                }
            }
        };
        finite_or_zero(result)
    }
}

/// A named derived column
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DerivedFeature {
    pub name: &'static str,
    pub formula: Formula,
}

/// Tradeline formulas, in evaluation order
pub const STANDARD_FEATURES: &[DerivedFeature] = &[
    DerivedFeature {
        name: "Total_TL",
        formula: Formula::Sum(&["CC_TL", "Home_TL", "PL_TL", "Other_TL"]),
    },
    DerivedFeature {
        name: "Tot_Active_TL",
        formula: Formula::Difference {
            minuend: "Total_TL",
            subtrahend: "Tot_Closed_TL",
        },
    },
    DerivedFeature {
        name: "pct_active_tl",
        formula: Formula::Percentage {
            part: "Tot_Active_TL",
            total: "Total_TL",
        },
    },
    DerivedFeature {
        name: "pct_closed_tl",
        formula: Formula::Percentage {
            part: "Tot_Closed_TL",
            total: "Total_TL",
        },
    },
    DerivedFeature {
        name: "Total_TL_opened_L6M",
        formula: Formula::ShareOfTotal {
            pct: "pct_tl_open_L6M",
            total: "Total_TL",
        },
    },
    DerivedFeature {
        name: "Tot_TL_closed_L6M",
        formula: Formula::ShareOfTotal {
            pct: "pct_tl_closed_L6M",
            total: "Total_TL",
        },
    },
];

/// Evaluates derived features for one raw record
#[derive(Debug, Clone)]
pub struct DerivedFeatureComputer {
    features: &'static [DerivedFeature],
}

impl DerivedFeatureComputer {
    pub fn new(features: &'static [DerivedFeature]) -> Self {
        Self { features }
    }

    pub fn standard() -> Self {
        Self::new(STANDARD_FEATURES)
    }

    pub fn features(&self) -> &'static [DerivedFeature] {
        self.features
    }

    /// Compute every derived column.
    ///
    /// Inputs resolve to the uploaded numeric value, then to an earlier
    /// derived value, then to `0`. A derived column the upload already
    /// supplies as a number keeps the uploaded value. Results are always
    /// finite.
    pub fn compute(&self, record: &RawRecord) -> EncodedRecord {
        let mut computed: HashMap<&'static str, f64> = HashMap::with_capacity(self.features.len());

        for feature in self.features {
            let value = match record.number(feature.name) {
                Some(supplied) => supplied,
                None => feature.formula.evaluate(|name| {
                    record
                        .number(name)
                        .or_else(|| computed.get(name).copied())
                        .unwrap_or(0.0)
                }),
            };
            computed.insert(feature.name, value);
        }

        debug!("Computed {} derived features", computed.len());
        computed.into_iter().collect()
    }
}

impl Default for DerivedFeatureComputer {
    fn default() -> Self {
        Self::standard()
    }
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

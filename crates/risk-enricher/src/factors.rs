//! Credit Factors
//!
//! Groups the model's per-feature importance into the handful of named
//! factors shown to applicants.

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::HashMap;

/// A named factor and the schema features that make it up
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorGroup {
    pub name: String,
    pub features: Vec<String>,
}

impl FactorGroup {
    pub fn new(name: impl Into<String>, features: &[&str]) -> Self {
        Self {
            name: name.into(),
            features: features.iter().map(|f| f.to_string()).collect(),
        }
    }
}

/// Default grouping over the tradeline schema
pub fn default_factor_groups() -> Vec<FactorGroup> {
    vec![
        FactorGroup::new(
            "Payment History",
            &[
                "Tot_Missed_Pmnt",
                "num_times_60p_dpd",
                "max_recent_level_of_deliq",
                "recent_level_of_deliq",
                "num_deliq_6_12mts",
                "num_std_12mts",
                "num_sub",
                "num_sub_6mts",
                "num_sub_12mts",
                "num_dbt",
                "num_dbt_12mts",
                "num_lss",
                "num_lss_12mts",
                "time_since_recent_payment",
            ],
        ),
        FactorGroup::new(
            "Credit Utilization",
            &[
                "pct_currentBal_all_TL",
                "pct_active_tl",
                "Tot_Active_TL",
                "Secured_TL",
                "Unsecured_TL",
            ],
        ),
        FactorGroup::new(
            "Credit Age",
            &["Age_Oldest_TL", "Age_Newest_TL", "Time_With_Curr_Empr"],
        ),
        FactorGroup::new(
            "Account Mix",
            &[
                "CC_TL", "Home_TL", "PL_TL", "Other_TL", "Total_TL", "CC_Flag", "PL_Flag",
                "HL_Flag", "GL_Flag",
            ],
        ),
        FactorGroup::new(
            "Recent Inquiries",
            &[
                "enq_L3m",
                "CC_enq_L12m",
                "PL_enq_L12m",
                "time_since_recent_enq",
                "pct_PL_enq_L6m_of_ever",
                "pct_CC_enq_L6m_of_ever",
                "pct_tl_open_L6M",
                "Total_TL_opened_L6M",
            ],
        ),
    ]
}

/// Aggregated importance of one factor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditFactor {
    pub name: String,
    pub importance: f64,
}

/// Feature importance ranked highest first; serializes as an ordered JSON object
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RankedImportance(Vec<(String, f64)>);

impl RankedImportance {
    /// Sort by importance, highest first; equal scores keep their input order
    pub fn new(mut entries: Vec<(String, f64)>) -> Self {
        entries.sort_by(|a, b| b.1.total_cmp(&a.1));
        Self(entries)
    }

    pub fn entries(&self) -> &[(String, f64)] {
        &self.0
    }

    pub fn top(&self, n: usize) -> &[(String, f64)] {
        &self.0[..n.min(self.0.len())]
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, v)| *v)
    }
}

impl Serialize for RankedImportance {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, value) in &self.0 {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Average the importance of each group's features.
///
/// Features missing from `importance` count as `0`; a group with no features
/// scores `0`. Output keeps the group order.
pub fn bucket_importance(groups: &[FactorGroup], importance: &RankedImportance) -> Vec<CreditFactor> {
    let lookup: HashMap<&str, f64> = importance
        .entries()
        .iter()
        .map(|(name, value)| (name.as_str(), *value))
        .collect();

    groups
        .iter()
        .map(|group| {
            let total: f64 = group
                .features
                .iter()
                .map(|f| lookup.get(f.as_str()).copied().unwrap_or(0.0))
                .sum();
            let importance = if group.features.is_empty() {
                0.0
            } else {
                total / group.features.len() as f64
            };
            CreditFactor {
                name: group.name.clone(),
                importance,
            }
        })
        .collect()
}

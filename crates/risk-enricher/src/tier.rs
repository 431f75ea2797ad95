//! Risk Tiers

use crate::EnrichError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

/// Advice given to every applicant regardless of tier
const COMMON_RECOMMENDATIONS: [&str; 4] = [
    "Make all payments on time",
    "Keep credit utilization below 30%",
    "Maintain older credit accounts",
    "Limit new credit applications",
];

/// Ordinal risk class; `P1` is the lowest risk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RiskTier {
    P1,
    P2,
    P3,
    P4,
}

impl RiskTier {
    /// Every tier, best first
    pub const ALL: [RiskTier; 4] = [RiskTier::P1, RiskTier::P2, RiskTier::P3, RiskTier::P4];

    /// Parse a class label
    pub fn parse(label: &str) -> Result<Self, EnrichError> {
        match label.trim().to_ascii_uppercase().as_str() {
            "P1" => Ok(RiskTier::P1),
            "P2" => Ok(RiskTier::P2),
            "P3" => Ok(RiskTier::P3),
            "P4" => Ok(RiskTier::P4),
            _ => Err(EnrichError::UnknownRiskTier(label.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskTier::P1 => "P1",
            RiskTier::P2 => "P2",
            RiskTier::P3 => "P3",
            RiskTier::P4 => "P4",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            RiskTier::P1 => "Excellent credit risk - Highly likely to repay loans",
            RiskTier::P2 => "Good credit risk - Generally reliable in loan repayment",
            RiskTier::P3 => "Fair credit risk - Some concerns about repayment ability",
            RiskTier::P4 => "Poor credit risk - High risk of default",
        }
    }

    /// Display category for the credit score
    pub fn category(&self) -> &'static str {
        match self {
            RiskTier::P1 => "Excellent",
            RiskTier::P2 => "Good",
            RiskTier::P3 => "Fair",
            RiskTier::P4 => "Poor",
        }
    }

    /// Closed interval the presented credit score is drawn from
    pub fn credit_score_band(&self) -> RangeInclusive<u32> {
        match self {
            RiskTier::P1 => 740..=850,
            RiskTier::P2 => 670..=739,
            RiskTier::P3 => 580..=669,
            RiskTier::P4 => 300..=579,
        }
    }

    /// Closed interval (percent) the presented success rate is drawn from
    pub fn success_rate_band(&self) -> RangeInclusive<u32> {
        match self {
            RiskTier::P1 => 90..=100,
            RiskTier::P2 => 75..=89,
            RiskTier::P3 => 50..=74,
            RiskTier::P4 => 0..=49,
        }
    }

    pub fn is_eligible(&self) -> bool {
        matches!(self, RiskTier::P1 | RiskTier::P2)
    }

    /// Common advice followed by tier-specific advice
    pub fn recommendations(&self) -> Vec<&'static str> {
        let specific: &[&str] = match self {
            RiskTier::P1 => &[
                "Consider diversifying credit mix for even better scores",
                "Monitor credit report regularly to maintain excellent status",
                "You may qualify for premium credit products",
            ],
            RiskTier::P2 => &[
                "Work on reducing credit utilization",
                "Continue consistent payment history",
                "Consider consolidating any high-interest debt",
            ],
            RiskTier::P3 => &[
                "Focus on making all payments on time",
                "Reduce overall debt levels",
                "Avoid applying for new credit",
                "Consider credit counseling services",
            ],
            RiskTier::P4 => &[
                "Prioritize paying off overdue accounts",
                "Set up payment reminders",
                "Consider credit repair services",
                "Look into secured credit products",
            ],
        };
        COMMON_RECOMMENDATIONS.iter().chain(specific).copied().collect()
    }
}

impl fmt::Display for RiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskTier {
    type Err = EnrichError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_labels() {
        assert_eq!(RiskTier::parse("P1").unwrap(), RiskTier::P1);
        assert_eq!(" p3 ".parse::<RiskTier>().unwrap(), RiskTier::P3);
        assert!(matches!(
            RiskTier::parse("P5"),
            Err(EnrichError::UnknownRiskTier(label)) if label == "P5"
        ));
    }

    #[test]
    fn test_eligibility() {
        let eligible: Vec<RiskTier> = RiskTier::ALL.into_iter().filter(RiskTier::is_eligible).collect();
        assert_eq!(eligible, vec![RiskTier::P1, RiskTier::P2]);
    }

    #[test]
    fn test_bands_are_ordered_and_disjoint() {
        for pair in RiskTier::ALL.windows(2) {
            let (better, worse) = (pair[0], pair[1]);
            assert!(worse.credit_score_band().end() < better.credit_score_band().start());
            assert!(worse.success_rate_band().end() < better.success_rate_band().start());
        }
        assert_eq!(*RiskTier::P4.credit_score_band().start(), 300);
        assert_eq!(*RiskTier::P1.success_rate_band().end(), 100);
    }

    #[test]
    fn test_recommendations() {
        let p3 = RiskTier::P3.recommendations();
        assert_eq!(p3.len(), 8);
        assert_eq!(p3[0], "Make all payments on time");
        assert_eq!(p3[7], "Consider credit counseling services");
        assert_eq!(RiskTier::P1.recommendations().len(), 7);
    }

    #[test]
    fn test_serializes_as_label() {
        assert_eq!(serde_json::to_string(&RiskTier::P2).unwrap(), "\"P2\"");
        assert_eq!(RiskTier::P4.to_string(), "P4");
        assert_eq!(RiskTier::P1.category(), "Excellent");
    }
}

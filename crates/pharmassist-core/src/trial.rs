//! Input records for the trial-analysis workflow.
//!
//! Both records are produced by a loader before a run starts and are never
//! mutated afterwards.

use serde::{Deserialize, Serialize};

use crate::error::DataError;

/// A single trial site row, as found in `trials.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialSite {
    pub site_name: String,
    pub enrolled: u32,
    /// Dropout rate in percent.
    pub dropout_rate: f64,
    #[serde(default)]
    pub protocol_violations: u32,
    #[serde(default)]
    pub serious_adverse_events: u32,
    /// Primary endpoint response rate in percent.
    #[serde(default)]
    pub efficacy_pct: Option<f64>,
}

/// Aggregate view of the trial-site dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialData {
    pub total_enrolled: u32,
    pub enrollment_target: u32,
    pub site_count: usize,
    pub high_dropout_sites: Vec<String>,
    pub violation_sites: Vec<String>,
    pub total_saes: u32,
    /// Average dropout rate across sites, in percent.
    pub avg_dropout_rate: f64,
    pub efficacy_range: String,
}

impl TrialData {
    /// Enrollment as a percentage of target.
    pub fn enrollment_pct(&self) -> f64 {
        if self.enrollment_target == 0 {
            return 0.0;
        }
        f64::from(self.total_enrolled) / f64::from(self.enrollment_target) * 100.0
    }

    /// Serious adverse events per 100 enrolled patients.
    pub fn sae_rate_per_100(&self) -> f64 {
        if self.total_enrolled == 0 {
            return 0.0;
        }
        f64::from(self.total_saes) / f64::from(self.total_enrolled) * 100.0
    }

    /// Reject aggregates that cannot be analyzed.
    pub fn validate(&self) -> Result<(), DataError> {
        if self.enrollment_target == 0 {
            return Err(DataError::invalid("enrollment_target", "must be greater than zero"));
        }
        if !self.avg_dropout_rate.is_finite() || self.avg_dropout_rate < 0.0 {
            return Err(DataError::invalid(
                "avg_dropout_rate",
                format!("expected a non-negative percentage, got {}", self.avg_dropout_rate),
            ));
        }
        if self.efficacy_range.trim().is_empty() {
            return Err(DataError::invalid("efficacy_range", "missing"));
        }
        if self.high_dropout_sites.len() > self.site_count
            || self.violation_sites.len() > self.site_count
        {
            return Err(DataError::invalid(
                "site_count",
                format!("{} sites cannot contain the flagged site lists", self.site_count),
            ));
        }
        Ok(())
    }
}

/// Drug profile with nested operational readiness records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrugProfile {
    pub name: String,
    pub indication: String,
    pub stage: String,
    #[serde(default)]
    pub target_market: String,
    #[serde(rename = "manufacturing_operations")]
    pub manufacturing: ManufacturingReadiness,
    #[serde(rename = "regulatory_operations")]
    pub regulatory: RegulatoryReadiness,
    #[serde(rename = "commercial_operations")]
    pub commercial: CommercialReadiness,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManufacturingReadiness {
    pub readiness: String,
    #[serde(default)]
    pub current_capacity: Option<String>,
    #[serde(default)]
    pub expansion_investment_usd: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegulatoryReadiness {
    pub readiness: String,
    #[serde(default)]
    pub pathway: Option<String>,
    #[serde(default)]
    pub known_safety_issues: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommercialReadiness {
    pub readiness: String,
    #[serde(default)]
    pub target_markets: Vec<String>,
}

//! Structured results returned by the assessment capability, and the shape
//! descriptors used to request and validate them.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::AssessmentError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SafetyStatus {
    Acceptable,
    RequiresMonitoring,
    Concerning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GoNoGo {
    Go,
    ConditionalGo,
    NoGo,
}

/// Shares its value set with [`RiskLevel`] but is a distinct field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConfidenceLevel {
    High,
    Medium,
    Low,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "HIGH",
            Self::Medium => "MEDIUM",
            Self::Low => "LOW",
        }
    }
}

impl SafetyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Acceptable => "ACCEPTABLE",
            Self::RequiresMonitoring => "REQUIRES_MONITORING",
            Self::Concerning => "CONCERNING",
        }
    }
}

impl GoNoGo {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Go => "GO",
            Self::ConditionalGo => "CONDITIONAL_GO",
            Self::NoGo => "NO_GO",
        }
    }
}

impl ConfidenceLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "HIGH",
            Self::Medium => "MEDIUM",
            Self::Low => "LOW",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub risk_level: RiskLevel,
    pub risk_factors: Vec<String>,
    pub mitigation_strategy: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyReview {
    pub safety_status: SafetyStatus,
    pub adverse_events_summary: String,
    pub monitoring_recommendations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalRecommendation {
    pub go_no_go: GoNoGo,
    pub confidence_level: ConfidenceLevel,
    pub critical_actions: Vec<String>,
    pub executive_summary: String,
}

/// Names an expected output shape and carries its JSON schema.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShapeDescriptor {
    pub name: &'static str,
    pub schema: serde_json::Value,
}

impl ShapeDescriptor {
    /// Field names the schema marks as required.
    pub fn required_fields(&self) -> Vec<&str> {
        self.schema
            .get("required")
            .and_then(|r| r.as_array())
            .map(|fields| fields.iter().filter_map(|f| f.as_str()).collect())
            .unwrap_or_default()
    }
}

/// A result type the assessment capability can be asked to produce.
pub trait Shaped: DeserializeOwned {
    fn shape() -> ShapeDescriptor;
}

impl Shaped for RiskAssessment {
    fn shape() -> ShapeDescriptor {
        ShapeDescriptor {
            name: "RiskAssessment",
            schema: json!({
                "type": "object",
                "properties": {
                    "risk_level": {"type": "string", "enum": ["HIGH", "MEDIUM", "LOW"]},
                    "risk_factors": {"type": "array", "items": {"type": "string"}},
                    "mitigation_strategy": {"type": "string"}
                },
                "required": ["risk_level", "risk_factors", "mitigation_strategy"]
            }),
        }
    }
}

impl Shaped for SafetyReview {
    fn shape() -> ShapeDescriptor {
        ShapeDescriptor {
            name: "SafetyReview",
            schema: json!({
                "type": "object",
                "properties": {
                    "safety_status": {
                        "type": "string",
                        "enum": ["ACCEPTABLE", "REQUIRES_MONITORING", "CONCERNING"]
                    },
                    "adverse_events_summary": {"type": "string"},
                    "monitoring_recommendations": {"type": "array", "items": {"type": "string"}}
                },
                "required": [
                    "safety_status",
                    "adverse_events_summary",
                    "monitoring_recommendations"
                ]
            }),
        }
    }
}

impl Shaped for FinalRecommendation {
    fn shape() -> ShapeDescriptor {
        ShapeDescriptor {
            name: "FinalRecommendation",
            schema: json!({
                "type": "object",
                "properties": {
                    "go_no_go": {"type": "string", "enum": ["GO", "CONDITIONAL_GO", "NO_GO"]},
                    "confidence_level": {"type": "string", "enum": ["HIGH", "MEDIUM", "LOW"]},
                    "critical_actions": {"type": "array", "items": {"type": "string"}},
                    "executive_summary": {"type": "string"}
                },
                "required": [
                    "go_no_go",
                    "confidence_level",
                    "critical_actions",
                    "executive_summary"
                ]
            }),
        }
    }
}

/// Check a raw capability result against `T`'s shape and decode it.
pub fn conform<T: Shaped>(value: serde_json::Value) -> Result<T, AssessmentError> {
    let shape = T::shape();
    let non_conforming = |reason: String| AssessmentError::NonConforming {
        shape: shape.name.to_string(),
        reason,
    };

    let obj = value
        .as_object()
        .ok_or_else(|| non_conforming(format!("expected a JSON object, got {}", value)))?;

    let missing: Vec<&str> = shape
        .required_fields()
        .into_iter()
        .filter(|f| !obj.contains_key(*f))
        .collect();
    if !missing.is_empty() {
        return Err(non_conforming(format!(
            "missing required field(s): {}",
            missing.join(", ")
        )));
    }

    serde_json::from_value(value.clone()).map_err(|e| non_conforming(e.to_string()))
}

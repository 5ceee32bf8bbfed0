//! Sample trial data, drug profile, and assessment results.

use pharmassist_core::assessment::{
    ConfidenceLevel, FinalRecommendation, GoNoGo, RiskAssessment, RiskLevel, SafetyReview,
    SafetyStatus,
};
use pharmassist_core::trial::{
    CommercialReadiness, DrugProfile, ManufacturingReadiness, RegulatoryReadiness, TrialData,
};

/// No flagged sites and SAEs under the default threshold. Routes to
/// `recommend` only.
pub fn trial_data_clean() -> TrialData {
    TrialData {
        total_enrolled: 720,
        enrollment_target: 788,
        site_count: 4,
        high_dropout_sites: vec![],
        violation_sites: vec![],
        total_saes: 1,
        avg_dropout_rate: 6.5,
        efficacy_range: "38-44%".into(),
    }
}

/// Site_C above the dropout threshold, 400 of 788 enrolled.
pub fn trial_data_high_dropout() -> TrialData {
    TrialData {
        total_enrolled: 400,
        enrollment_target: 788,
        high_dropout_sites: vec!["Site_C".into()],
        avg_dropout_rate: 8.5,
        ..trial_data_clean()
    }
}

/// Five SAEs and no flagged sites.
pub fn trial_data_safety() -> TrialData {
    TrialData {
        total_saes: 5,
        ..trial_data_clean()
    }
}

/// Both flags set: high dropout, a violation site, and five SAEs.
pub fn trial_data_both() -> TrialData {
    TrialData {
        violation_sites: vec!["Site_B".into()],
        total_saes: 5,
        ..trial_data_high_dropout()
    }
}

pub fn drug_profile() -> DrugProfile {
    DrugProfile {
        name: "CardioRelief".into(),
        indication: "Chronic heart failure".into(),
        stage: "Phase IIb".into(),
        target_market: "US, EU".into(),
        manufacturing: ManufacturingReadiness {
            readiness: "Capacity expansion required".into(),
            current_capacity: Some("50,000 units/month".into()),
            expansion_investment_usd: Some(12_000_000),
        },
        regulatory: RegulatoryReadiness {
            readiness: "CMC package in review".into(),
            pathway: Some("Standard NDA".into()),
            known_safety_issues: vec!["QT prolongation signal".into()],
        },
        commercial: CommercialReadiness {
            readiness: "KOL mapping complete".into(),
            target_markets: vec!["US".into(), "EU".into()],
        },
    }
}

pub fn risk_assessment() -> RiskAssessment {
    RiskAssessment {
        risk_level: RiskLevel::High,
        risk_factors: vec![
            "Site_C dropout above 10%".into(),
            "Enrollment at 51% of target".into(),
        ],
        mitigation_strategy: "Add retention coordinators at Site_C and open two new sites.".into(),
    }
}

pub fn safety_review() -> SafetyReview {
    SafetyReview {
        safety_status: SafetyStatus::RequiresMonitoring,
        adverse_events_summary: "Five SAEs, none clearly drug-related.".into(),
        monitoring_recommendations: vec!["Monthly ECG monitoring for QT interval".into()],
    }
}

pub fn final_recommendation() -> FinalRecommendation {
    FinalRecommendation {
        go_no_go: GoNoGo::ConditionalGo,
        confidence_level: ConfidenceLevel::Medium,
        critical_actions: vec![
            "Close enrollment gap before Phase III start".into(),
            "Secure manufacturing expansion funding".into(),
        ],
        executive_summary: "Efficacy supports Phase III, contingent on operational fixes.".into(),
    }
}

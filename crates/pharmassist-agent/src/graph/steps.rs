//! The four step functions of the trial-analysis graph.
//!
//! Steps only read state and return a [`StateUpdate`]; the executor applies
//! it. Branch steps can therefore share a borrow of the state while running
//! concurrently.

use tracing::debug;

use pharmassist_core::assessment::{
    conform, FinalRecommendation, RiskAssessment, SafetyReview, Shaped,
};
use pharmassist_core::error::StepFailure;
use pharmassist_core::traits::AssessmentCapability;
use pharmassist_core::types::StepId;

use super::state::{StateChange, StateUpdate, WorkflowState};

/// Entry step: snapshot the trial data and compute the routing flags.
pub fn analyze(state: &WorkflowState, sae_threshold: u32) -> Result<StateUpdate, StepFailure> {
    let data = state.trial_data();
    data.validate()?;

    let has_high_risk = !data.high_dropout_sites.is_empty() || !data.violation_sites.is_empty();
    let has_safety_concerns = data.total_saes > sae_threshold;

    let summary = format!(
        "Phase IIb trial snapshot:\n\
         - Enrollment: {}/{} ({:.1}%)\n\
         - Sites: {} total, {} with high dropout ({}), {} with protocol violations ({})\n\
         - Serious adverse events: {}\n\
         - Average dropout rate: {:.1}%\n\
         - Efficacy range: {}",
        data.total_enrolled,
        data.enrollment_target,
        data.enrollment_pct(),
        data.site_count,
        data.high_dropout_sites.len(),
        list_or_none(&data.high_dropout_sites),
        data.violation_sites.len(),
        list_or_none(&data.violation_sites),
        data.total_saes,
        data.avg_dropout_rate,
        data.efficacy_range,
    );

    debug!(has_high_risk, has_safety_concerns, "Trial data analyzed");

    Ok(StateUpdate {
        step: StepId::Analyze,
        change: StateChange::Analysis {
            summary,
            has_high_risk,
            has_safety_concerns,
        },
        notice: format!(
            "Analysis complete: high risk = {}, safety concerns = {}",
            has_high_risk, has_safety_concerns
        ),
    })
}

/// Branch step: assess operational risk from flagged sites.
pub async fn assess_risk(
    state: &WorkflowState,
    capability: &dyn AssessmentCapability,
) -> Result<StateUpdate, StepFailure> {
    let prompt = risk_prompt(state);
    let risk: RiskAssessment = invoke_shaped(capability, &prompt).await?;
    let notice = format!(
        "Risk assessment complete: {} ({} factor(s))",
        risk.risk_level.as_str(),
        risk.risk_factors.len()
    );
    Ok(StateUpdate {
        step: StepId::AssessRisk,
        change: StateChange::Risk(risk),
        notice,
    })
}

/// Branch step: review adverse events against known safety issues.
pub async fn review_safety(
    state: &WorkflowState,
    capability: &dyn AssessmentCapability,
) -> Result<StateUpdate, StepFailure> {
    let prompt = safety_prompt(state);
    let review: SafetyReview = invoke_shaped(capability, &prompt).await?;
    let notice = format!("Safety review complete: {}", review.safety_status.as_str());
    Ok(StateUpdate {
        step: StepId::ReviewSafety,
        change: StateChange::Safety(review),
        notice,
    })
}

/// Terminal step: synthesize the go/no-go decision.
pub async fn recommend(
    state: &WorkflowState,
    capability: &dyn AssessmentCapability,
) -> Result<StateUpdate, StepFailure> {
    let prompt = recommendation_prompt(state);
    let rec: FinalRecommendation = invoke_shaped(capability, &prompt).await?;
    let notice = format!(
        "Recommendation: {} (confidence {})",
        rec.go_no_go.as_str(),
        rec.confidence_level.as_str()
    );
    Ok(StateUpdate {
        step: StepId::Recommend,
        change: StateChange::Recommendation(rec),
        notice,
    })
}

async fn invoke_shaped<T: Shaped>(
    capability: &dyn AssessmentCapability,
    prompt: &str,
) -> Result<T, StepFailure> {
    let shape = T::shape();
    let value = capability.invoke(prompt, &shape).await?;
    Ok(conform(value)?)
}

pub(crate) fn risk_prompt(state: &WorkflowState) -> String {
    let data = state.trial_data();
    format!(
        "Assess the operational risk of this Phase IIb trial.\n\n\
         High-dropout sites: {}\n\
         Sites with protocol violations: {}\n\
         Average dropout rate: {:.1}%\n\
         Enrollment: {:.1}% of target\n\n\
         Classify the risk level, list the risk factors, and propose a mitigation strategy.",
        list_or_none(&data.high_dropout_sites),
        list_or_none(&data.violation_sites),
        data.avg_dropout_rate,
        data.enrollment_pct(),
    )
}

pub(crate) fn safety_prompt(state: &WorkflowState) -> String {
    let data = state.trial_data();
    let issues = &state.drug_profile().regulatory.known_safety_issues;
    format!(
        "Review the safety profile of {} in its Phase IIb trial.\n\n\
         Serious adverse events: {} across {} enrolled patients ({:.2} per 100)\n\
         Known safety issues: {}\n\n\
         Classify the safety status, summarize the adverse events, and recommend monitoring.",
        state.drug_profile().name,
        data.total_saes,
        data.total_enrolled,
        data.sae_rate_per_100(),
        list_or_none(issues),
    )
}

pub(crate) fn recommendation_prompt(state: &WorkflowState) -> String {
    let data = state.trial_data();
    let profile = state.drug_profile();
    // Defaults only stand in for branches the router did not select.
    let risk_level = state
        .risk_assessment()
        .map(|r| r.risk_level.as_str())
        .unwrap_or("N/A");
    let safety_status = state
        .safety_review()
        .map(|s| s.safety_status.as_str())
        .unwrap_or("ACCEPTABLE");

    format!(
        "Make a Phase III go/no-go recommendation for {}.\n\n\
         Enrollment: {:.1}% of target\n\
         Risk level: {}\n\
         Safety status: {}\n\
         Efficacy signal: {}\n\
         Manufacturing readiness: {}\n\
         Regulatory readiness: {}\n\
         Commercial readiness: {}\n\n\
         Decide GO, CONDITIONAL_GO, or NO_GO, state your confidence, list critical actions, \
         and write an executive summary.",
        profile.name,
        data.enrollment_pct(),
        risk_level,
        safety_status,
        data.efficacy_range,
        profile.manufacturing.readiness,
        profile.regulatory.readiness,
        profile.commercial.readiness,
    )
}

fn list_or_none(items: &[String]) -> String {
    if items.is_empty() {
        "none".to_string()
    } else {
        items.join(", ")
    }
}

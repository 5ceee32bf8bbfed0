use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use pharmassist_core::assessment::{FinalRecommendation, RiskAssessment, SafetyReview};
use pharmassist_core::error::StepFailure;
use pharmassist_core::trial::{DrugProfile, TrialData};
use pharmassist_core::types::{RunId, StepId, StepNotice};

/// The record threaded through every step of one workflow run.
///
/// Fields are only written through [`WorkflowState::apply`], which enforces
/// that each step writes its own fields and that nothing is written twice.
#[derive(Debug, Clone)]
pub struct WorkflowState {
    trial_data: TrialData,
    drug_profile: DrugProfile,
    initial_analysis: Option<String>,
    risk_assessment: Option<RiskAssessment>,
    safety_review: Option<SafetyReview>,
    final_recommendation: Option<FinalRecommendation>,
    has_high_risk: bool,
    has_safety_concerns: bool,
    message_log: Vec<StepNotice>,
}

/// A partial state update returned by a step.
#[derive(Debug, Clone)]
pub struct StateUpdate {
    pub step: StepId,
    pub change: StateChange,
    pub notice: String,
}

/// The fields a step writes. Each variant belongs to exactly one step.
#[derive(Debug, Clone)]
pub enum StateChange {
    Analysis {
        summary: String,
        has_high_risk: bool,
        has_safety_concerns: bool,
    },
    Risk(RiskAssessment),
    Safety(SafetyReview),
    Recommendation(FinalRecommendation),
}

impl StateChange {
    fn owner(&self) -> StepId {
        match self {
            Self::Analysis { .. } => StepId::Analyze,
            Self::Risk(_) => StepId::AssessRisk,
            Self::Safety(_) => StepId::ReviewSafety,
            Self::Recommendation(_) => StepId::Recommend,
        }
    }
}

impl WorkflowState {
    pub fn new(trial_data: TrialData, drug_profile: DrugProfile) -> Self {
        Self {
            trial_data,
            drug_profile,
            initial_analysis: None,
            risk_assessment: None,
            safety_review: None,
            final_recommendation: None,
            has_high_risk: false,
            has_safety_concerns: false,
            message_log: Vec::new(),
        }
    }

    pub fn trial_data(&self) -> &TrialData {
        &self.trial_data
    }

    pub fn drug_profile(&self) -> &DrugProfile {
        &self.drug_profile
    }

    /// Empty until `analyze` has run.
    pub fn initial_analysis(&self) -> &str {
        self.initial_analysis.as_deref().unwrap_or("")
    }

    pub fn risk_assessment(&self) -> Option<&RiskAssessment> {
        self.risk_assessment.as_ref()
    }

    pub fn safety_review(&self) -> Option<&SafetyReview> {
        self.safety_review.as_ref()
    }

    pub fn final_recommendation(&self) -> Option<&FinalRecommendation> {
        self.final_recommendation.as_ref()
    }

    pub fn has_high_risk(&self) -> bool {
        self.has_high_risk
    }

    pub fn has_safety_concerns(&self) -> bool {
        self.has_safety_concerns
    }

    pub fn message_log(&self) -> &[StepNotice] {
        &self.message_log
    }

    /// Whether the given branch step has written its result.
    pub fn has_result_for(&self, step: StepId) -> bool {
        match step {
            StepId::Analyze => self.initial_analysis.is_some(),
            StepId::AssessRisk => self.risk_assessment.is_some(),
            StepId::ReviewSafety => self.safety_review.is_some(),
            StepId::Recommend => self.final_recommendation.is_some(),
        }
    }

    /// Merge a step's update into the state.
    pub fn apply(&mut self, update: StateUpdate) -> Result<(), StepFailure> {
        let owner = update.change.owner();
        if owner != update.step {
            return Err(StepFailure::State(format!(
                "step {} tried to write fields owned by {}",
                update.step, owner
            )));
        }
        if self.has_result_for(owner) {
            return Err(StepFailure::State(format!(
                "fields owned by {} were already written",
                owner
            )));
        }

        match update.change {
            StateChange::Analysis {
                summary,
                has_high_risk,
                has_safety_concerns,
            } => {
                self.initial_analysis = Some(summary);
                self.has_high_risk = has_high_risk;
                self.has_safety_concerns = has_safety_concerns;
            }
            StateChange::Risk(risk) => self.risk_assessment = Some(risk),
            StateChange::Safety(review) => self.safety_review = Some(review),
            StateChange::Recommendation(rec) => self.final_recommendation = Some(rec),
        }

        self.message_log.push(StepNotice::new(update.step, update.notice));
        Ok(())
    }

    /// Consume a completed state into the report handed to callers.
    pub fn into_report(
        self,
        run_id: RunId,
        selected_steps: BTreeSet<StepId>,
    ) -> Result<FinalReport, StepFailure> {
        let final_recommendation = self.final_recommendation.ok_or_else(|| {
            StepFailure::State("run finished without a final recommendation".into())
        })?;
        Ok(FinalReport {
            run_id,
            initial_analysis: self.initial_analysis.unwrap_or_default(),
            risk_assessment: self.risk_assessment,
            safety_review: self.safety_review,
            final_recommendation,
            selected_steps,
            message_log: self.message_log,
        })
    }
}

/// Output of a successful run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalReport {
    pub run_id: RunId,
    pub initial_analysis: String,
    pub risk_assessment: Option<RiskAssessment>,
    pub safety_review: Option<SafetyReview>,
    pub final_recommendation: FinalRecommendation,
    /// Steps the router selected after `analyze`.
    pub selected_steps: BTreeSet<StepId>,
    pub message_log: Vec<StepNotice>,
}

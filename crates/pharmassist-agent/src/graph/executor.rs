use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Instant;

use futures::stream::{FuturesUnordered, StreamExt};
use tracing::{debug, error, info};

use pharmassist_core::config::{BranchMode, WorkflowConfig, DEFAULT_SAE_THRESHOLD};
use pharmassist_core::error::{StepFailure, WorkflowError};
use pharmassist_core::event::EventBus;
use pharmassist_core::traits::{AssessmentCapability, DataSource};
use pharmassist_core::trial::{DrugProfile, TrialData};
use pharmassist_core::types::{RunId, StepId, WorkflowEvent, WorkflowPhase};

use super::router;
use super::state::{FinalReport, StateUpdate, WorkflowState};
use super::steps;

/// Outcome of one branch step, before it is merged into the state.
struct BranchOutcome {
    step: StepId,
    result: Result<StateUpdate, StepFailure>,
    elapsed_ms: u64,
}

/// Runs the trial-analysis graph: `analyze`, then the routed branch steps
/// behind a join barrier, then `recommend`.
///
/// The executor holds no per-run state, so one instance can serve any number
/// of concurrent runs.
pub struct WorkflowExecutor {
    capability: Arc<dyn AssessmentCapability>,
    branch_mode: BranchMode,
    sae_threshold: u32,
    event_bus: Option<Arc<EventBus>>,
}

impl WorkflowExecutor {
    pub fn new(capability: Arc<dyn AssessmentCapability>) -> Self {
        Self {
            capability,
            branch_mode: BranchMode::default(),
            sae_threshold: DEFAULT_SAE_THRESHOLD,
            event_bus: None,
        }
    }

    pub fn from_config(capability: Arc<dyn AssessmentCapability>, config: &WorkflowConfig) -> Self {
        Self::new(capability)
            .with_branch_mode(config.branch_mode)
            .with_sae_threshold(config.sae_threshold)
    }

    pub fn with_branch_mode(mut self, mode: BranchMode) -> Self {
        self.branch_mode = mode;
        self
    }

    /// Safety concerns are flagged when total SAEs exceed this count.
    pub fn with_sae_threshold(mut self, threshold: u32) -> Self {
        self.sae_threshold = threshold;
        self
    }

    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    /// Load inputs from `source` and run the workflow.
    ///
    /// Loader failures are reported against `analyze`, since no step can run
    /// without its inputs.
    pub async fn run(&self, source: &dyn DataSource) -> Result<FinalReport, WorkflowError> {
        let trial = source
            .load_trial_data()
            .map_err(|e| WorkflowError::new(StepId::Analyze, e))?;
        let drug = source
            .load_drug_profile()
            .map_err(|e| WorkflowError::new(StepId::Analyze, e))?;
        self.run_with(trial, drug).await
    }

    /// Run the workflow on already-loaded inputs.
    pub async fn run_with(
        &self,
        trial_data: TrialData,
        drug_profile: DrugProfile,
    ) -> Result<FinalReport, WorkflowError> {
        let run_id = RunId::new();
        let start = Instant::now();
        info!(run_id = %run_id, drug = %drug_profile.name, "Workflow run started");
        self.publish(WorkflowEvent::RunStarted {
            run_id: run_id.clone(),
        });

        match self.execute(&run_id, trial_data, drug_profile).await {
            Ok(report) => {
                let total_elapsed_ms = start.elapsed().as_millis() as u64;
                info!(
                    run_id = %run_id,
                    decision = report.final_recommendation.go_no_go.as_str(),
                    total_elapsed_ms,
                    "Workflow run complete"
                );
                self.publish(WorkflowEvent::RunComplete {
                    run_id,
                    total_elapsed_ms,
                });
                Ok(report)
            }
            Err(err) => {
                error!(
                    run_id = %run_id,
                    step = %err.step,
                    error = %err.cause,
                    "Workflow run failed"
                );
                self.set_phase(&run_id, WorkflowPhase::Failed);
                self.publish(WorkflowEvent::RunFailed {
                    run_id,
                    step: err.step,
                    error: err.cause.to_string(),
                });
                Err(err)
            }
        }
    }

    async fn execute(
        &self,
        run_id: &RunId,
        trial_data: TrialData,
        drug_profile: DrugProfile,
    ) -> Result<FinalReport, WorkflowError> {
        let mut state = WorkflowState::new(trial_data, drug_profile);
        self.set_phase(run_id, WorkflowPhase::Init);

        self.set_phase(run_id, WorkflowPhase::Analyzing);
        self.step_started(run_id, StepId::Analyze);
        let step_start = Instant::now();
        let update = steps::analyze(&state, self.sae_threshold)
            .map_err(|e| WorkflowError::new(StepId::Analyze, e))?;
        state
            .apply(update)
            .map_err(|e| WorkflowError::new(StepId::Analyze, e))?;
        self.step_finished(run_id, StepId::Analyze, step_start);

        let selection = router::route_state(&state);
        info!(
            run_id = %run_id,
            selection = ?selection.iter().map(StepId::as_str).collect::<Vec<_>>(),
            "Routed"
        );
        self.publish(WorkflowEvent::Routed {
            run_id: run_id.clone(),
            selection: selection.clone(),
        });

        let branches: Vec<StepId> = selection.iter().copied().filter(StepId::is_branch).collect();
        if !branches.is_empty() {
            self.join_branches(run_id, &mut state, &branches).await?;
        }

        self.set_phase(run_id, WorkflowPhase::Recommending);
        self.step_started(run_id, StepId::Recommend);
        let step_start = Instant::now();
        let update = steps::recommend(&state, self.capability.as_ref())
            .await
            .map_err(|e| WorkflowError::new(StepId::Recommend, e))?;
        state
            .apply(update)
            .map_err(|e| WorkflowError::new(StepId::Recommend, e))?;
        self.step_finished(run_id, StepId::Recommend, step_start);

        self.set_phase(run_id, WorkflowPhase::Done);
        state
            .into_report(run_id.clone(), selection)
            .map_err(|e| WorkflowError::new(StepId::Recommend, e))
    }

    /// Run every selected branch, then merge their updates in step order.
    ///
    /// All branches run to completion before any failure is reported. When
    /// several fail, the first one in step order wins.
    async fn join_branches(
        &self,
        run_id: &RunId,
        state: &mut WorkflowState,
        branches: &[StepId],
    ) -> Result<(), WorkflowError> {
        let outcomes: BTreeMap<StepId, BranchOutcome> = {
            let shared: &WorkflowState = state;
            let mut outcomes = BTreeMap::new();
            let mut pending = branches.len();

            match self.branch_mode {
                BranchMode::Parallel => {
                    let mut in_flight: FuturesUnordered<_> = branches
                        .iter()
                        .map(|&step| self.run_branch(run_id, shared, step))
                        .collect();
                    while let Some(outcome) = in_flight.next().await {
                        pending -= 1;
                        debug!(step = %outcome.step, pending, "Branch joined");
                        outcomes.insert(outcome.step, outcome);
                    }
                }
                BranchMode::Sequential => {
                    for &step in branches {
                        let outcome = self.run_branch(run_id, shared, step).await;
                        pending -= 1;
                        debug!(step = %outcome.step, pending, "Branch joined");
                        outcomes.insert(outcome.step, outcome);
                    }
                }
            }
            outcomes
        };

        let mut first_failure: Option<WorkflowError> = None;
        for (step, outcome) in outcomes {
            let merged = outcome.result.and_then(|update| state.apply(update));
            match merged {
                Ok(()) => {
                    debug!(step = %step, elapsed_ms = outcome.elapsed_ms, "Branch result merged");
                    self.publish(WorkflowEvent::StepFinished {
                        run_id: run_id.clone(),
                        step,
                        elapsed_ms: outcome.elapsed_ms,
                    });
                }
                Err(cause) => {
                    if first_failure.is_none() {
                        first_failure = Some(WorkflowError::new(step, cause));
                    } else {
                        error!(step = %step, error = %cause, "Additional branch failure");
                    }
                }
            }
        }
        if let Some(err) = first_failure {
            return Err(err);
        }

        // Recommend must only see a state where every selected branch wrote.
        for &step in branches {
            if !state.has_result_for(step) {
                return Err(WorkflowError::new(
                    step,
                    StepFailure::State(format!("{} finished without writing its result", step)),
                ));
            }
        }
        Ok(())
    }

    async fn run_branch(
        &self,
        run_id: &RunId,
        state: &WorkflowState,
        step: StepId,
    ) -> BranchOutcome {
        self.set_phase(run_id, WorkflowPhase::for_step(step));
        self.step_started(run_id, step);
        let start = Instant::now();
        let capability = self.capability.as_ref();

        let result = match step {
            StepId::AssessRisk => steps::assess_risk(state, capability).await,
            StepId::ReviewSafety => steps::review_safety(state, capability).await,
            other => Err(StepFailure::State(format!("{} is not a branch step", other))),
        };

        BranchOutcome {
            step,
            result,
            elapsed_ms: start.elapsed().as_millis() as u64,
        }
    }

    fn set_phase(&self, run_id: &RunId, phase: WorkflowPhase) {
        if phase.is_terminal() {
            info!(run_id = %run_id, ?phase, "Reached terminal phase");
        } else {
            debug!(run_id = %run_id, ?phase, "Phase changed");
        }
        self.publish(WorkflowEvent::PhaseChanged {
            run_id: run_id.clone(),
            phase,
        });
    }

    fn step_started(&self, run_id: &RunId, step: StepId) {
        info!(run_id = %run_id, step = %step, "Step started");
        self.publish(WorkflowEvent::StepStarted {
            run_id: run_id.clone(),
            step,
        });
    }

    fn step_finished(&self, run_id: &RunId, step: StepId, start: Instant) {
        self.publish(WorkflowEvent::StepFinished {
            run_id: run_id.clone(),
            step,
            elapsed_ms: start.elapsed().as_millis() as u64,
        });
    }

    fn publish(&self, event: WorkflowEvent) {
        if let Some(bus) = &self.event_bus {
            bus.publish(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use pharmassist_core::assessment::{GoNoGo, RiskLevel, SafetyStatus};
    use pharmassist_core::error::{AssessmentError, DataError};
    use pharmassist_test_utils::{fixtures, StubCapability};

    use super::*;

    fn executor(stub: &Arc<StubCapability>) -> WorkflowExecutor {
        WorkflowExecutor::new(stub.clone())
    }

    fn drain(rx: &mut tokio::sync::broadcast::Receiver<WorkflowEvent>) -> Vec<WorkflowEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_clean_trial_goes_straight_to_recommend() {
        let stub = Arc::new(StubCapability::new());
        let report = executor(&stub)
            .run_with(fixtures::trial_data_clean(), fixtures::drug_profile())
            .await
            .unwrap();

        assert_eq!(report.selected_steps, [StepId::Recommend].into_iter().collect());
        assert!(report.risk_assessment.is_none());
        assert!(report.safety_review.is_none());
        assert_eq!(stub.calls(), vec!["FinalRecommendation".to_string()]);
        let prompt = &stub.prompts_for("FinalRecommendation")[0];
        assert!(prompt.contains("Risk level: N/A"));
        assert!(prompt.contains("Safety status: ACCEPTABLE"));
        assert_eq!(report.message_log.len(), 2);
    }

    #[tokio::test]
    async fn test_high_dropout_runs_risk_branch_only() {
        let stub = Arc::new(StubCapability::new());
        let report = executor(&stub)
            .run_with(fixtures::trial_data_high_dropout(), fixtures::drug_profile())
            .await
            .unwrap();

        assert_eq!(report.selected_steps, [StepId::AssessRisk].into_iter().collect());
        assert_eq!(report.risk_assessment.unwrap().risk_level, RiskLevel::High);
        assert!(report.safety_review.is_none());
        assert_eq!(stub.call_count("SafetyReview"), 0);
        assert!(report.initial_analysis.contains("50.8%"));
        let prompt = &stub.prompts_for("FinalRecommendation")[0];
        assert!(prompt.contains("Risk level: HIGH"));
        assert!(!prompt.contains("N/A"));
    }

    #[tokio::test]
    async fn test_safety_signal_runs_safety_branch_only() {
        let stub = Arc::new(StubCapability::new());
        let report = executor(&stub)
            .run_with(fixtures::trial_data_safety(), fixtures::drug_profile())
            .await
            .unwrap();

        assert_eq!(report.selected_steps, [StepId::ReviewSafety].into_iter().collect());
        assert_eq!(
            report.safety_review.unwrap().safety_status,
            SafetyStatus::RequiresMonitoring
        );
        assert!(report.risk_assessment.is_none());
        assert_eq!(stub.call_count("RiskAssessment"), 0);
    }

    #[tokio::test]
    async fn test_both_branches_join_before_recommend() {
        let stub = Arc::new(
            StubCapability::new()
                .with_delay("RiskAssessment", Duration::from_millis(40))
                .with_delay("SafetyReview", Duration::from_millis(40)),
        );
        let report = executor(&stub)
            .run_with(fixtures::trial_data_both(), fixtures::drug_profile())
            .await
            .unwrap();

        assert!(report.risk_assessment.is_some());
        assert!(report.safety_review.is_some());
        assert_eq!(stub.max_in_flight(), 2);
        assert_eq!(stub.calls().last().unwrap(), "FinalRecommendation");
        assert_eq!(stub.call_count("FinalRecommendation"), 1);
        let prompt = &stub.prompts_for("FinalRecommendation")[0];
        assert!(prompt.contains("Risk level: HIGH"));
        assert!(prompt.contains("Safety status: REQUIRES_MONITORING"));
    }

    #[tokio::test]
    async fn test_completion_order_does_not_change_result() {
        let risk_first = Arc::new(
            StubCapability::new().with_delay("SafetyReview", Duration::from_millis(30)),
        );
        let safety_first = Arc::new(
            StubCapability::new().with_delay("RiskAssessment", Duration::from_millis(30)),
        );

        let a = executor(&risk_first)
            .run_with(fixtures::trial_data_both(), fixtures::drug_profile())
            .await
            .unwrap();
        let b = executor(&safety_first)
            .run_with(fixtures::trial_data_both(), fixtures::drug_profile())
            .await
            .unwrap();

        assert_eq!(
            risk_first.completion_order(),
            vec!["RiskAssessment", "SafetyReview", "FinalRecommendation"]
        );
        assert_eq!(
            safety_first.completion_order(),
            vec!["SafetyReview", "RiskAssessment", "FinalRecommendation"]
        );

        assert_eq!(a.risk_assessment, b.risk_assessment);
        assert_eq!(a.safety_review, b.safety_review);
        assert_eq!(a.final_recommendation, b.final_recommendation);
        assert_eq!(a.initial_analysis, b.initial_analysis);
        assert_eq!(
            risk_first.prompts_for("FinalRecommendation"),
            safety_first.prompts_for("FinalRecommendation")
        );
        let steps = |r: &FinalReport| r.message_log.iter().map(|n| n.step).collect::<Vec<_>>();
        assert_eq!(steps(&a), steps(&b));
    }

    #[tokio::test]
    async fn test_sequential_mode_matches_parallel_mode() {
        let parallel_stub = Arc::new(StubCapability::new());
        let sequential_stub = Arc::new(
            StubCapability::new()
                .with_delay("RiskAssessment", Duration::from_millis(10))
                .with_delay("SafetyReview", Duration::from_millis(10)),
        );

        let parallel = executor(&parallel_stub)
            .run_with(fixtures::trial_data_both(), fixtures::drug_profile())
            .await
            .unwrap();
        let sequential = executor(&sequential_stub)
            .with_branch_mode(BranchMode::Sequential)
            .run_with(fixtures::trial_data_both(), fixtures::drug_profile())
            .await
            .unwrap();

        assert_eq!(sequential_stub.max_in_flight(), 1);
        assert_eq!(parallel.risk_assessment, sequential.risk_assessment);
        assert_eq!(parallel.safety_review, sequential.safety_review);
        assert_eq!(parallel.final_recommendation, sequential.final_recommendation);
        assert_eq!(parallel.selected_steps, sequential.selected_steps);
    }

    #[tokio::test]
    async fn test_branch_failure_fails_run_without_recommend() {
        let stub = Arc::new(
            StubCapability::new()
                .failing("RiskAssessment")
                .with_delay("SafetyReview", Duration::from_millis(20)),
        );
        let bus = Arc::new(EventBus::default());
        let mut rx = bus.subscribe();

        let err = executor(&stub)
            .with_event_bus(bus)
            .run_with(fixtures::trial_data_both(), fixtures::drug_profile())
            .await
            .unwrap_err();

        assert_eq!(err.step, StepId::AssessRisk);
        assert!(matches!(
            err.cause,
            StepFailure::Assessment(AssessmentError::Capability(_))
        ));
        // The sibling still ran to completion.
        assert_eq!(stub.call_count("SafetyReview"), 1);
        assert_eq!(stub.call_count("FinalRecommendation"), 0);

        let events = drain(&mut rx);
        assert!(events.iter().any(|e| matches!(
            e,
            WorkflowEvent::PhaseChanged { phase: WorkflowPhase::Failed, .. }
        )));
        assert!(matches!(
            events.last(),
            Some(WorkflowEvent::RunFailed { step: StepId::AssessRisk, .. })
        ));
        assert!(!events.iter().any(|e| matches!(
            e,
            WorkflowEvent::StepStarted { step: StepId::Recommend, .. }
        )));
    }

    #[tokio::test]
    async fn test_both_branches_failing_reports_first_in_step_order() {
        let stub = Arc::new(
            StubCapability::new()
                .failing("RiskAssessment")
                .failing("SafetyReview")
                .with_delay("RiskAssessment", Duration::from_millis(20)),
        );
        let err = executor(&stub)
            .run_with(fixtures::trial_data_both(), fixtures::drug_profile())
            .await
            .unwrap_err();
        assert_eq!(err.step, StepId::AssessRisk);
    }

    #[tokio::test]
    async fn test_recommend_failure_is_attributed_to_recommend() {
        let stub = Arc::new(StubCapability::new().failing("FinalRecommendation"));
        let err = executor(&stub)
            .run_with(fixtures::trial_data_clean(), fixtures::drug_profile())
            .await
            .unwrap_err();
        assert_eq!(err.step, StepId::Recommend);
    }

    #[tokio::test]
    async fn test_invalid_trial_data_fails_at_analyze() {
        let stub = Arc::new(StubCapability::new());
        let mut data = fixtures::trial_data_clean();
        data.enrollment_target = 0;
        let err = executor(&stub)
            .run_with(data, fixtures::drug_profile())
            .await
            .unwrap_err();
        assert_eq!(err.step, StepId::Analyze);
        assert!(matches!(err.cause, StepFailure::Data(DataError::Invalid { .. })));
        assert!(stub.calls().is_empty());
    }

    #[tokio::test]
    async fn test_sae_threshold_is_configurable() {
        let stub = Arc::new(StubCapability::new());
        let report = executor(&stub)
            .with_sae_threshold(10)
            .run_with(fixtures::trial_data_safety(), fixtures::drug_profile())
            .await
            .unwrap();
        assert_eq!(report.selected_steps, [StepId::Recommend].into_iter().collect());
    }

    #[tokio::test]
    async fn test_repeated_runs_are_idempotent() {
        let stub = Arc::new(StubCapability::new());
        let exec = executor(&stub);
        let first = exec
            .run_with(fixtures::trial_data_both(), fixtures::drug_profile())
            .await
            .unwrap();
        let second = exec
            .run_with(fixtures::trial_data_both(), fixtures::drug_profile())
            .await
            .unwrap();

        assert_ne!(first.run_id, second.run_id);
        assert_eq!(first.initial_analysis, second.initial_analysis);
        assert_eq!(first.risk_assessment, second.risk_assessment);
        assert_eq!(first.safety_review, second.safety_review);
        assert_eq!(first.final_recommendation, second.final_recommendation);
        assert_eq!(first.selected_steps, second.selected_steps);
    }

    #[tokio::test]
    async fn test_concurrent_runs_do_not_share_state() {
        let stub = Arc::new(
            StubCapability::new().with_delay("RiskAssessment", Duration::from_millis(10)),
        );
        let exec = executor(&stub);
        let (clean, risky) = tokio::join!(
            exec.run_with(fixtures::trial_data_clean(), fixtures::drug_profile()),
            exec.run_with(fixtures::trial_data_high_dropout(), fixtures::drug_profile()),
        );
        let clean = clean.unwrap();
        let risky = risky.unwrap();
        assert!(clean.risk_assessment.is_none());
        assert!(risky.risk_assessment.is_some());
        assert_eq!(clean.final_recommendation.go_no_go, GoNoGo::ConditionalGo);
        assert_eq!(stub.call_count("FinalRecommendation"), 2);
    }

    #[tokio::test]
    async fn test_event_sequence_for_successful_run() {
        let stub = Arc::new(StubCapability::new());
        let bus = Arc::new(EventBus::default());
        let mut rx = bus.subscribe();
        executor(&stub)
            .with_event_bus(bus)
            .run_with(fixtures::trial_data_high_dropout(), fixtures::drug_profile())
            .await
            .unwrap();

        let events = drain(&mut rx);
        assert!(matches!(events.first(), Some(WorkflowEvent::RunStarted { .. })));
        assert!(matches!(events.last(), Some(WorkflowEvent::RunComplete { .. })));
        let phases: Vec<WorkflowPhase> = events
            .iter()
            .filter_map(|e| match e {
                WorkflowEvent::PhaseChanged { phase, .. } => Some(*phase),
                _ => None,
            })
            .collect();
        assert_eq!(
            phases,
            vec![
                WorkflowPhase::Init,
                WorkflowPhase::Analyzing,
                WorkflowPhase::AssessingRisk,
                WorkflowPhase::Recommending,
                WorkflowPhase::Done
            ]
        );
        let (last, rest) = phases.split_last().unwrap();
        assert!(last.is_terminal());
        assert!(rest.iter().all(|p| !p.is_terminal()));
        let finished: Vec<StepId> = events
            .iter()
            .filter_map(|e| match e {
                WorkflowEvent::StepFinished { step, .. } => Some(*step),
                _ => None,
            })
            .collect();
        assert_eq!(finished, vec![StepId::Analyze, StepId::AssessRisk, StepId::Recommend]);
    }

    #[tokio::test]
    async fn test_run_reports_loader_failure_against_analyze() {
        struct MissingData;
        impl DataSource for MissingData {
            fn load_trial_data(&self) -> Result<TrialData, DataError> {
                Err(DataError::invalid("trials", "no rows"))
            }
            fn load_drug_profile(&self) -> Result<DrugProfile, DataError> {
                Ok(fixtures::drug_profile())
            }
        }

        let stub = Arc::new(StubCapability::new());
        let err = executor(&stub).run(&MissingData).await.unwrap_err();
        assert_eq!(err.step, StepId::Analyze);
        assert!(stub.calls().is_empty());
    }
}

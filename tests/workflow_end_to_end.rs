use std::path::PathBuf;
use std::sync::Arc;

use pharmassist_agent::{draft_outreach, render_report, WorkflowExecutor};
use pharmassist_core::assessment::RiskLevel;
use pharmassist_core::config::AppConfig;
use pharmassist_core::error::{DataError, StepFailure};
use pharmassist_core::types::StepId;
use pharmassist_data::{load_doctors, FileDataSource};
use pharmassist_test_utils::StubCapability;

fn sample_config() -> AppConfig {
    let data_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("data");
    let toml_content = format!(
        r#"
[model]
model_id = "stub"

[data]
dir = "{}"
"#,
        data_dir.display()
    );
    AppConfig::parse(&toml_content).expect("parse config")
}

#[tokio::test]
async fn test_sample_data_routes_to_risk_assessment() {
    let config = sample_config();
    let stub = Arc::new(StubCapability::new());
    let executor = WorkflowExecutor::from_config(stub.clone(), &config.workflow);

    let report = executor
        .run(&FileDataSource::from_config(&config))
        .await
        .expect("workflow run");

    assert_eq!(
        report.selected_steps,
        [StepId::AssessRisk].into_iter().collect()
    );
    assert_eq!(report.risk_assessment.as_ref().unwrap().risk_level, RiskLevel::High);
    assert!(report.safety_review.is_none());
    assert!(report.initial_analysis.contains("400/788 (50.8%)"));
    assert!(report.initial_analysis.contains("Site_C"));
    assert!(report.initial_analysis.contains("Site_B"));
    assert!(report.initial_analysis.contains("38-44%"));
    assert_eq!(stub.call_count("SafetyReview"), 0);

    let markdown = render_report(&report);
    assert!(markdown.contains("## Risk assessment: HIGH"));

    let json = serde_json::to_value(&report).expect("serialize report");
    assert_eq!(json["selected_steps"], serde_json::json!(["assess_risk"]));
    assert_eq!(json["final_recommendation"]["go_no_go"], "CONDITIONAL_GO");
}

#[tokio::test]
async fn test_lower_sae_threshold_adds_safety_branch() {
    let mut config = sample_config();
    config.workflow.sae_threshold = 1;
    let stub = Arc::new(StubCapability::new());

    let report = WorkflowExecutor::from_config(stub.clone(), &config.workflow)
        .run(&FileDataSource::from_config(&config))
        .await
        .expect("workflow run");

    assert_eq!(
        report.selected_steps,
        [StepId::AssessRisk, StepId::ReviewSafety].into_iter().collect()
    );
    assert!(report.safety_review.is_some());
    assert_eq!(stub.call_count("FinalRecommendation"), 1);
}

#[tokio::test]
async fn test_missing_trials_file_fails_at_analyze() {
    let mut config = sample_config();
    config.data.trials_file = "missing.json".into();
    let stub = Arc::new(StubCapability::new());

    let err = WorkflowExecutor::from_config(stub.clone(), &config.workflow)
        .run(&FileDataSource::from_config(&config))
        .await
        .unwrap_err();

    assert_eq!(err.step, StepId::Analyze);
    assert!(matches!(err.cause, StepFailure::Data(DataError::Read { .. })));
    assert!(stub.calls().is_empty());
}

#[test]
fn test_sample_doctors_produce_drafts() {
    let config = sample_config();
    let doctors = load_doctors(&config.data.doctors_path()).expect("load doctors");
    let drafts = draft_outreach(&doctors);
    assert_eq!(drafts.len(), 3);
    assert!(drafts[0].email_draft.starts_with("Dear Dr. Sarah Johnson,"));
}

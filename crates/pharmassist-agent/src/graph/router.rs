use std::collections::BTreeSet;

use pharmassist_core::types::StepId;

use super::state::WorkflowState;

/// Pick the steps to run after `analyze`.
///
/// Returns the branch steps whose flags are set, or just `Recommend` when
/// neither flag is set. Never empty.
pub fn route(has_high_risk: bool, has_safety_concerns: bool) -> BTreeSet<StepId> {
    let mut selection = BTreeSet::new();
    if has_high_risk {
        selection.insert(StepId::AssessRisk);
    }
    if has_safety_concerns {
        selection.insert(StepId::ReviewSafety);
    }
    if selection.is_empty() {
        selection.insert(StepId::Recommend);
    }
    selection
}

/// Route from the flags `analyze` wrote into the state.
pub fn route_state(state: &WorkflowState) -> BTreeSet<StepId> {
    route(state.has_high_risk(), state.has_safety_concerns())
}

//! Trial-analysis graph: a fixed four-step workflow with conditional fan-out.
//!
//! `analyze` snapshots the trial data and sets two routing flags. The router
//! then selects `assess_risk`, `review_safety`, both, or neither. Selected
//! branches run behind a join barrier, and `recommend` runs exactly once,
//! after every selected branch has written its result.
//!
//! The `WorkflowExecutor` drives a run end to end and returns a
//! `FinalReport`, or a `WorkflowError` naming the step that failed.

pub mod executor;
pub mod router;
pub mod state;
pub mod steps;

pub use executor::WorkflowExecutor;
pub use router::{route, route_state};
pub use state::{FinalReport, StateChange, StateUpdate, WorkflowState};

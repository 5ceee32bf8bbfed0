pub mod assessment;
pub mod config;
pub mod error;
pub mod event;
pub mod traits;
pub mod trial;
pub mod types;

pub use config::AppConfig;
pub use error::{AssessmentError, DataError, PharmaError, Result, StepFailure, WorkflowError};
pub use event::EventBus;
pub use types::*;

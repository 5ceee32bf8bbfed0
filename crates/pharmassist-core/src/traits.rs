use futures::future::BoxFuture;
use futures::stream::BoxStream;

use crate::assessment::ShapeDescriptor;
use crate::config::ModelConfig;
use crate::error::{AssessmentError, DataError, Result};
use crate::trial::{DrugProfile, TrialData};
use crate::types::*;

/// LLM client: streaming chat completion.
pub trait LlmClient: Send + Sync + 'static {
    /// Send a chat request and receive a stream of deltas.
    fn chat_stream(
        &self,
        config: &ModelConfig,
        messages: Vec<ChatMessage>,
    ) -> BoxFuture<'_, Result<BoxStream<'_, Result<StreamDelta>>>>;
}

/// Assessment capability: turns a prompt into a value of a requested shape.
///
/// Implementations return the raw JSON value; callers check it against the
/// shape with [`crate::assessment::conform`].
pub trait AssessmentCapability: Send + Sync + 'static {
    fn invoke<'a>(
        &'a self,
        prompt: &'a str,
        shape: &'a ShapeDescriptor,
    ) -> BoxFuture<'a, std::result::Result<serde_json::Value, AssessmentError>>;
}

/// Data source: loads the two input records for a workflow run.
pub trait DataSource: Send + Sync {
    fn load_trial_data(&self) -> std::result::Result<TrialData, DataError>;

    fn load_drug_profile(&self) -> std::result::Result<DrugProfile, DataError>;
}

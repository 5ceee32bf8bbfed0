//! LLM-backed implementation of the assessment capability.

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::StreamExt;
use tracing::{debug, warn};

use pharmassist_core::assessment::ShapeDescriptor;
use pharmassist_core::config::ModelConfig;
use pharmassist_core::error::AssessmentError;
use pharmassist_core::traits::{AssessmentCapability, LlmClient};
use pharmassist_core::types::{ChatMessage, StopReason, StreamDelta};

/// Asks an LLM for a JSON object matching a shape's schema.
///
/// Only checks that the reply is a JSON value; conformance to the shape is
/// the caller's job.
pub struct LlmAssessor {
    llm: Arc<dyn LlmClient>,
    config: ModelConfig,
}

impl LlmAssessor {
    pub fn new(llm: Arc<dyn LlmClient>, config: ModelConfig) -> Self {
        Self { llm, config }
    }
}

fn system_prompt(shape: &ShapeDescriptor) -> String {
    format!(
        "You are a pharmaceutical development analyst. Respond with ONLY a valid JSON \
         object for a {} that matches this JSON schema, with no commentary:\n{}",
        shape.name,
        serde_json::to_string_pretty(&shape.schema).unwrap_or_else(|_| shape.schema.to_string()),
    )
}

impl AssessmentCapability for LlmAssessor {
    fn invoke<'a>(
        &'a self,
        prompt: &'a str,
        shape: &'a ShapeDescriptor,
    ) -> BoxFuture<'a, Result<serde_json::Value, AssessmentError>> {
        Box::pin(async move {
            let messages = vec![
                ChatMessage::system(system_prompt(shape)),
                ChatMessage::user(prompt),
            ];

            let mut stream = self.llm.chat_stream(&self.config, messages).await?;

            let mut response_text = String::new();
            let mut truncated = false;
            while let Some(delta) = stream.next().await {
                match delta? {
                    StreamDelta::TextDelta(text) => response_text.push_str(&text),
                    StreamDelta::Stop(StopReason::MaxTokens) => truncated = true,
                    StreamDelta::Usage {
                        input_tokens,
                        output_tokens,
                    } => debug!(
                        shape = shape.name,
                        input_tokens,
                        output_tokens,
                        "Assessment usage"
                    ),
                    _ => {}
                }
            }

            if truncated {
                warn!(shape = shape.name, "Assessment response hit max_tokens");
            }

            let json_str = extract_json(&response_text);
            serde_json::from_str(json_str).map_err(|e| AssessmentError::NonConforming {
                shape: shape.name.to_string(),
                reason: format!("reply is not valid JSON: {}", e),
            })
        })
    }
}

/// Extract JSON from a response that may contain markdown code fences.
fn extract_json(text: &str) -> &str {
    let trimmed = text.trim();
    if let Some(start) = trimmed.find("```json") {
        let after = &trimmed[start + 7..];
        if let Some(end) = after.find("```") {
            return after[..end].trim();
        }
    }
    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        if let Some(end) = after.find("```") {
            return after[..end].trim();
        }
    }
    if let Some(start) = trimmed.find('{') {
        if let Some(end) = trimmed.rfind('}') {
            if end > start {
                return &trimmed[start..=end];
            }
        }
    }
    trimmed
}

/// Wraps a capability with a per-call timeout.
pub struct TimeoutCapability {
    inner: Arc<dyn AssessmentCapability>,
    timeout: Duration,
}

impl TimeoutCapability {
    pub fn new(inner: Arc<dyn AssessmentCapability>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

impl AssessmentCapability for TimeoutCapability {
    fn invoke<'a>(
        &'a self,
        prompt: &'a str,
        shape: &'a ShapeDescriptor,
    ) -> BoxFuture<'a, Result<serde_json::Value, AssessmentError>> {
        Box::pin(async move {
            match tokio::time::timeout(self.timeout, self.inner.invoke(prompt, shape)).await {
                Ok(result) => result,
                Err(_) => Err(AssessmentError::Timeout(self.timeout.as_secs())),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use futures::stream::BoxStream;
    use pharmassist_core::assessment::{RiskAssessment, Shaped};
    use pharmassist_core::error::{PharmaError, Result};

    use super::*;

    /// Streams a canned reply in two chunks.
    struct Canned(Result<&'static str>);

    impl LlmClient for Canned {
        fn chat_stream(
            &self,
            _config: &ModelConfig,
            messages: Vec<ChatMessage>,
        ) -> BoxFuture<'_, Result<BoxStream<'_, Result<StreamDelta>>>> {
            assert!(messages[0].content.contains("RiskAssessment"));
            Box::pin(async move {
                match &self.0 {
                    Ok(text) => {
                        let (a, b) = text.split_at(text.len() / 2);
                        let deltas = vec![
                            Ok(StreamDelta::TextDelta(a.to_string())),
                            Ok(StreamDelta::TextDelta(b.to_string())),
                            Ok(StreamDelta::Stop(StopReason::EndTurn)),
                        ];
                        Ok(Box::pin(futures::stream::iter(deltas)) as BoxStream<'_, _>)
                    }
                    Err(e) => Err(PharmaError::LlmRequest(e.to_string())),
                }
            })
        }
    }

    fn model() -> ModelConfig {
        ModelConfig {
            provider: "openai".into(),
            model_id: "gpt-4o-mini".into(),
            api_key: None,
            base_url: None,
            max_tokens: 512,
            temperature: 0.0,
            retry: None,
        }
    }

    #[tokio::test]
    async fn test_invoke_parses_fenced_json() {
        let assessor = LlmAssessor::new(
            Arc::new(Canned(Ok(
                "```json\n{\"risk_level\": \"HIGH\", \"risk_factors\": [], \"mitigation_strategy\": \"x\"}\n```",
            ))),
            model(),
        );
        let value = assessor.invoke("assess", &RiskAssessment::shape()).await.unwrap();
        assert_eq!(value["risk_level"], "HIGH");
    }

    #[tokio::test]
    async fn test_invoke_rejects_prose() {
        let assessor = LlmAssessor::new(Arc::new(Canned(Ok("The risk is high."))), model());
        let err = assessor.invoke("assess", &RiskAssessment::shape()).await.unwrap_err();
        assert!(matches!(err, AssessmentError::NonConforming { .. }));
    }

    #[tokio::test]
    async fn test_invoke_maps_transport_failure() {
        let assessor = LlmAssessor::new(
            Arc::new(Canned(Err(PharmaError::LlmRequest("HTTP 503".into())))),
            model(),
        );
        let err = assessor.invoke("assess", &RiskAssessment::shape()).await.unwrap_err();
        assert!(matches!(err, AssessmentError::Capability(ref m) if m.contains("503")));
    }

    struct Never;

    impl AssessmentCapability for Never {
        fn invoke<'a>(
            &'a self,
            _prompt: &'a str,
            _shape: &'a ShapeDescriptor,
        ) -> BoxFuture<'a, std::result::Result<serde_json::Value, AssessmentError>> {
            Box::pin(futures::future::pending())
        }
    }

    #[tokio::test]
    async fn test_timeout_capability() {
        let capped = TimeoutCapability::new(Arc::new(Never), Duration::from_millis(10));
        let err = capped.invoke("x", &RiskAssessment::shape()).await.unwrap_err();
        assert!(matches!(err, AssessmentError::Timeout(_)));
    }

    #[test]
    fn test_extract_json_variants() {
        assert_eq!(extract_json("```\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(extract_json("Here you go: {\"a\":1} thanks"), "{\"a\":1}");
        assert_eq!(extract_json("  plain  "), "plain");
    }
}

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use futures::future::BoxFuture;
use serde_json::Value;

use pharmassist_core::assessment::ShapeDescriptor;
use pharmassist_core::error::AssessmentError;
use pharmassist_core::traits::AssessmentCapability;

use crate::fixtures;

/// Assessment capability returning canned JSON per shape name.
///
/// Records every call, can delay or fail per shape, and tracks how many
/// calls were in flight at once.
pub struct StubCapability {
    responses: HashMap<String, Value>,
    delays: HashMap<String, Duration>,
    failing: HashSet<String>,
    calls: Mutex<Vec<(String, String)>>,
    completions: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl StubCapability {
    /// Stub answering every shape with the matching fixture.
    pub fn new() -> Self {
        let responses = [
            ("RiskAssessment", serde_json::to_value(fixtures::risk_assessment())),
            ("SafetyReview", serde_json::to_value(fixtures::safety_review())),
            (
                "FinalRecommendation",
                serde_json::to_value(fixtures::final_recommendation()),
            ),
        ]
        .into_iter()
        .map(|(name, value)| (name.to_string(), value.expect("fixture serializes")))
        .collect();

        Self {
            responses,
            delays: HashMap::new(),
            failing: HashSet::new(),
            calls: Mutex::new(Vec::new()),
            completions: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with_response(mut self, shape: &str, value: Value) -> Self {
        self.responses.insert(shape.to_string(), value);
        self
    }

    pub fn with_delay(mut self, shape: &str, delay: Duration) -> Self {
        self.delays.insert(shape.to_string(), delay);
        self
    }

    /// Make every call for `shape` fail with a capability error.
    pub fn failing(mut self, shape: &str) -> Self {
        self.failing.insert(shape.to_string());
        self
    }

    /// Shape names in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(shape, _)| shape.clone())
            .collect()
    }

    pub fn call_count(&self, shape: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(s, _)| s == shape)
            .count()
    }

    pub fn prompts_for(&self, shape: &str) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(s, _)| s == shape)
            .map(|(_, prompt)| prompt.clone())
            .collect()
    }

    /// Shape names in the order their calls returned.
    pub fn completion_order(&self) -> Vec<String> {
        self.completions.lock().unwrap().clone()
    }

    /// Highest number of overlapping calls observed.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl Default for StubCapability {
    fn default() -> Self {
        Self::new()
    }
}

impl AssessmentCapability for StubCapability {
    fn invoke<'a>(
        &'a self,
        prompt: &'a str,
        shape: &'a ShapeDescriptor,
    ) -> BoxFuture<'a, Result<Value, AssessmentError>> {
        Box::pin(async move {
            self.calls
                .lock()
                .unwrap()
                .push((shape.name.to_string(), prompt.to_string()));

            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            if let Some(delay) = self.delays.get(shape.name) {
                tokio::time::sleep(*delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.completions.lock().unwrap().push(shape.name.to_string());

            if self.failing.contains(shape.name) {
                return Err(AssessmentError::Capability(format!(
                    "stub failure for {}",
                    shape.name
                )));
            }
            self.responses.get(shape.name).cloned().ok_or_else(|| {
                AssessmentError::Capability(format!("no stub response for {}", shape.name))
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use pharmassist_core::assessment::{RiskAssessment, SafetyReview, Shaped};

    use super::*;

    #[tokio::test]
    async fn test_records_calls_and_returns_fixture() {
        let stub = StubCapability::new();
        let shape = RiskAssessment::shape();
        let value = stub.invoke("assess this", &shape).await.unwrap();
        assert_eq!(value["risk_level"], "HIGH");
        assert_eq!(stub.calls(), vec!["RiskAssessment".to_string()]);
        assert_eq!(stub.prompts_for("RiskAssessment"), vec!["assess this".to_string()]);
    }

    #[tokio::test]
    async fn test_completion_order_follows_delays() {
        let stub = StubCapability::new().with_delay("RiskAssessment", Duration::from_millis(30));
        let risk = RiskAssessment::shape();
        let safety = SafetyReview::shape();
        let (a, b) = tokio::join!(stub.invoke("r", &risk), stub.invoke("s", &safety));
        assert!(a.is_ok() && b.is_ok());
        assert_eq!(stub.calls(), vec!["RiskAssessment", "SafetyReview"]);
        assert_eq!(stub.completion_order(), vec!["SafetyReview", "RiskAssessment"]);
        assert_eq!(stub.max_in_flight(), 2);
    }

    #[tokio::test]
    async fn test_failing_shape_errors() {
        let stub = StubCapability::new().failing("RiskAssessment");
        let shape = RiskAssessment::shape();
        assert!(stub.invoke("x", &shape).await.is_err());
        assert_eq!(stub.call_count("RiskAssessment"), 1);
    }
}

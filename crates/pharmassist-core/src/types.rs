use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique workflow run identifier.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct RunId(pub String);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The four steps of the trial-analysis graph.
///
/// Ordering is declaration order, so a `BTreeSet<StepId>` iterates
/// `assess_risk` before `review_safety`.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepId {
    Analyze,
    AssessRisk,
    ReviewSafety,
    Recommend,
}

impl StepId {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Analyze => "analyze",
            Self::AssessRisk => "assess_risk",
            Self::ReviewSafety => "review_safety",
            Self::Recommend => "recommend",
        }
    }

    /// Branch steps are selected by the router and run at most once.
    pub fn is_branch(&self) -> bool {
        matches!(self, Self::AssessRisk | Self::ReviewSafety)
    }
}

impl std::fmt::Display for StepId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Executor state machine phases.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowPhase {
    Init,
    Analyzing,
    AssessingRisk,
    ReviewingSafety,
    Recommending,
    Done,
    Failed,
}

impl WorkflowPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// The phase in which the given step runs.
    pub fn for_step(step: StepId) -> Self {
        match step {
            StepId::Analyze => Self::Analyzing,
            StepId::AssessRisk => Self::AssessingRisk,
            StepId::ReviewSafety => Self::ReviewingSafety,
            StepId::Recommend => Self::Recommending,
        }
    }
}

/// A notice appended to the workflow message log by a step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepNotice {
    pub step: StepId,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl StepNotice {
    pub fn new(step: StepId, message: impl Into<String>) -> Self {
        Self {
            step,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Role in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A chat message sent to an LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl ChatMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: text.into(),
            timestamp: Some(Utc::now()),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: text.into(),
            timestamp: Some(Utc::now()),
        }
    }
}

/// Stop reason from the LLM.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum StopReason {
    EndTurn,
    MaxTokens,
    StopSequence,
}

/// A streaming delta from the LLM.
#[derive(Debug, Clone)]
pub enum StreamDelta {
    /// A chunk of text content.
    TextDelta(String),

    /// The response is complete.
    Stop(StopReason),

    /// Usage information.
    Usage {
        input_tokens: u64,
        output_tokens: u64,
    },

    /// Message ID from the API.
    MessageId(String),
}

/// Workflow event broadcast to all subscribers.
#[derive(Debug, Clone)]
pub enum WorkflowEvent {
    /// Run started.
    RunStarted { run_id: RunId },
    /// The executor entered a new phase.
    PhaseChanged { run_id: RunId, phase: WorkflowPhase },
    /// Router picked the steps to run after `analyze`.
    Routed {
        run_id: RunId,
        selection: BTreeSet<StepId>,
    },
    /// A step started.
    StepStarted { run_id: RunId, step: StepId },
    /// A step finished successfully.
    StepFinished {
        run_id: RunId,
        step: StepId,
        elapsed_ms: u64,
    },
    /// Run completed with a final recommendation.
    RunComplete { run_id: RunId, total_elapsed_ms: u64 },
    /// Run failed at the given step.
    RunFailed {
        run_id: RunId,
        step: StepId,
        error: String,
    },
}

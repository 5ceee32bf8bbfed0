use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{PharmaError, Result};

/// A trial counts as having safety concerns above this many serious adverse events.
pub const DEFAULT_SAE_THRESHOLD: u32 = 2;
/// A site counts as high-dropout above this dropout rate (percent).
pub const DEFAULT_DROPOUT_THRESHOLD_PCT: f64 = 10.0;
/// Phase IIb enrollment target.
pub const DEFAULT_ENROLLMENT_TARGET: u32 = 788;

/// Top-level Pharmassist configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub model: ModelConfig,
    #[serde(default)]
    pub fallback_models: Vec<ModelConfig>,
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub workflow: WorkflowConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    pub model_id: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default)]
    pub retry: Option<RetryConfig>,
}

fn default_provider() -> String { "openai".to_string() }
fn default_max_tokens() -> u32 { 2048 }
fn default_temperature() -> f32 { 0.0 }

/// Retry configuration for LLM requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

fn default_max_retries() -> u32 { 3 }
fn default_initial_backoff() -> u64 { 1000 }
fn default_max_backoff() -> u64 { 30000 }

/// Where the input records live.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    #[serde(default = "default_data_dir")]
    pub dir: String,
    #[serde(default = "default_trials_file")]
    pub trials_file: String,
    #[serde(default = "default_drug_profile_file")]
    pub drug_profile_file: String,
    #[serde(default = "default_doctors_file")]
    pub doctors_file: String,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            dir: default_data_dir(),
            trials_file: default_trials_file(),
            drug_profile_file: default_drug_profile_file(),
            doctors_file: default_doctors_file(),
        }
    }
}

impl DataConfig {
    pub fn trials_path(&self) -> PathBuf {
        self.dir_path().join(&self.trials_file)
    }

    pub fn drug_profile_path(&self) -> PathBuf {
        self.dir_path().join(&self.drug_profile_file)
    }

    pub fn doctors_path(&self) -> PathBuf {
        self.dir_path().join(&self.doctors_file)
    }

    /// Resolve the data directory (expand ~).
    fn dir_path(&self) -> PathBuf {
        if let Some(rest) = self.dir.strip_prefix("~/") {
            if let Some(home) = dirs_home() {
                return home.join(rest);
            }
        }
        PathBuf::from(&self.dir)
    }
}

fn default_data_dir() -> String { "data".to_string() }
fn default_trials_file() -> String { "trials.json".to_string() }
fn default_drug_profile_file() -> String { "drug_profile.json".to_string() }
fn default_doctors_file() -> String { "doctors.json".to_string() }

/// How selected branch steps are executed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BranchMode {
    /// Run all selected branches concurrently and join.
    #[default]
    Parallel,
    /// Run selected branches one after another in step order.
    Sequential,
}

/// Trial-analysis workflow settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    #[serde(default)]
    pub branch_mode: BranchMode,
    #[serde(default = "default_sae_threshold")]
    pub sae_threshold: u32,
    #[serde(default = "default_dropout_threshold_pct")]
    pub dropout_threshold_pct: f64,
    #[serde(default = "default_enrollment_target")]
    pub enrollment_target: u32,
    /// Per-call timeout for the assessment capability. None = unbounded.
    #[serde(default)]
    pub capability_timeout_secs: Option<u64>,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            branch_mode: BranchMode::default(),
            sae_threshold: default_sae_threshold(),
            dropout_threshold_pct: default_dropout_threshold_pct(),
            enrollment_target: default_enrollment_target(),
            capability_timeout_secs: None,
        }
    }
}

fn default_sae_threshold() -> u32 { DEFAULT_SAE_THRESHOLD }
fn default_dropout_threshold_pct() -> f64 { DEFAULT_DROPOUT_THRESHOLD_PCT }
fn default_enrollment_target() -> u32 { DEFAULT_ENROLLMENT_TARGET }

impl AppConfig {
    /// Load config from a TOML file, with env var expansion.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| PharmaError::ConfigNotFound(path.display().to_string()))?;

        Self::parse(&content)
    }

    /// Parse config from TOML text, with env var expansion.
    pub fn parse(content: &str) -> Result<Self> {
        // Expand ${ENV_VAR} references
        let expanded = expand_env_vars(content);

        let config: Self =
            toml::from_str(&expanded).map_err(|e| PharmaError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.workflow.enrollment_target == 0 {
            return Err(PharmaError::Config(
                "workflow.enrollment_target must be greater than zero".into(),
            ));
        }
        if !self.workflow.dropout_threshold_pct.is_finite()
            || self.workflow.dropout_threshold_pct < 0.0
        {
            return Err(PharmaError::Config(
                "workflow.dropout_threshold_pct must be a non-negative percentage".into(),
            ));
        }
        if self.workflow.capability_timeout_secs == Some(0) {
            return Err(PharmaError::Config(
                "workflow.capability_timeout_secs must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(val) => result.push_str(&val),
                Err(_) => {
                    // Keep original if env var not set
                    result.push_str(&format!("${{{}}}", var_name));
                }
            }
        } else {
            result.push(c);
        }
    }
    result
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use pharmassist_core::config::AppConfig;
use pharmassist_core::error::DataError;
use pharmassist_core::traits::DataSource;
use pharmassist_core::trial::{DrugProfile, TrialData, TrialSite};

use crate::aggregate::aggregate_sites;

/// `trials.json` holds either per-site rows or a precomputed aggregate.
enum TrialsFile {
    Sites(Vec<TrialSite>),
    Aggregate(TrialData),
}

impl TrialsFile {
    /// An array is read as site rows, an object as an aggregate. Decoding
    /// against the chosen form keeps serde's field-level error message.
    fn from_value(value: Value, what: &str) -> Result<Self, DataError> {
        let parse_error = |message: String| DataError::Parse {
            what: what.to_string(),
            message,
        };
        match value {
            Value::Array(_) => serde_json::from_value(value)
                .map(Self::Sites)
                .map_err(|e| parse_error(format!("site rows: {}", e))),
            Value::Object(_) => serde_json::from_value(value)
                .map(Self::Aggregate)
                .map_err(|e| parse_error(format!("aggregate: {}", e))),
            other => Err(parse_error(format!(
                "expected an array of site rows or an aggregate object, got {}",
                other
            ))),
        }
    }
}

/// Loads trial and drug-profile records from JSON files on disk.
#[derive(Debug, Clone)]
pub struct FileDataSource {
    trials_path: PathBuf,
    drug_profile_path: PathBuf,
    enrollment_target: u32,
    dropout_threshold_pct: f64,
}

impl FileDataSource {
    pub fn new(
        trials_path: impl Into<PathBuf>,
        drug_profile_path: impl Into<PathBuf>,
        enrollment_target: u32,
        dropout_threshold_pct: f64,
    ) -> Self {
        Self {
            trials_path: trials_path.into(),
            drug_profile_path: drug_profile_path.into(),
            enrollment_target,
            dropout_threshold_pct,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            config.data.trials_path(),
            config.data.drug_profile_path(),
            config.workflow.enrollment_target,
            config.workflow.dropout_threshold_pct,
        )
    }
}

impl DataSource for FileDataSource {
    fn load_trial_data(&self) -> Result<TrialData, DataError> {
        let what = format!("trial data ({})", self.trials_path.display());
        let raw: Value = read_json(&self.trials_path, "trial data")?;
        let data = match TrialsFile::from_value(raw, &what)? {
            TrialsFile::Sites(sites) => {
                debug!(
                    path = %self.trials_path.display(),
                    sites = sites.len(),
                    "Loaded trial sites"
                );
                aggregate_sites(&sites, self.enrollment_target, self.dropout_threshold_pct)?
            }
            TrialsFile::Aggregate(data) => {
                data.validate()?;
                data
            }
        };
        Ok(data)
    }

    fn load_drug_profile(&self) -> Result<DrugProfile, DataError> {
        let profile: DrugProfile = read_json(&self.drug_profile_path, "drug profile")?;
        debug!(
            path = %self.drug_profile_path.display(),
            drug = %profile.name,
            "Loaded drug profile"
        );
        Ok(profile)
    }
}

/// Read and deserialize a JSON file, naming `what` in parse errors.
pub(crate) fn read_json<T: DeserializeOwned>(path: &Path, what: &str) -> Result<T, DataError> {
    let content = std::fs::read_to_string(path).map_err(|source| DataError::Read {
        path: path.display().to_string(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|e| DataError::Parse {
        what: format!("{} ({})", what, path.display()),
        message: e.to_string(),
    })
}

//! Failure reports: one JSON artifact per failed replay.

use crate::error::{Result, RetraceError};
use crate::replay::schema::{ReplayOutcome, StepReport, StepStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Serialized content of a failure report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureReport {
    pub test_case_id: String,
    pub test_case_name: String,
    pub run_id: String,
    pub replay_started_at: DateTime<Utc>,
    pub generated_at: DateTime<Utc>,
    pub auto_correct: bool,
    pub success: bool,
    pub interrupted: bool,
    pub setup_error: Option<String>,
    pub total_steps: usize,
    pub executed_steps: usize,
    /// Every step that did not end SUCCEEDED, with its recorded action and
    /// relocation/correction attempts
    pub steps: Vec<StepReport>,
}

impl FailureReport {
    pub fn from_outcome(test_case_id: &str, outcome: &ReplayOutcome) -> Self {
        Self {
            test_case_id: test_case_id.to_string(),
            test_case_name: outcome.test_case_name.clone(),
            run_id: outcome.run_id.clone(),
            replay_started_at: outcome.started_at,
            generated_at: Utc::now(),
            auto_correct: outcome.auto_correct,
            success: outcome.success,
            interrupted: outcome.interrupted,
            setup_error: outcome.setup_error.clone(),
            total_steps: outcome.total_steps,
            executed_steps: outcome.steps.len(),
            steps: outcome
                .steps
                .iter()
                .filter(|s| s.status != StepStatus::Succeeded)
                .cloned()
                .collect(),
        }
    }
}

/// Writes failure reports into a directory.
pub struct FailureReporter {
    dir: PathBuf,
}

impl FailureReporter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &std::path::Path {
        &self.dir
    }

    /// Serialize `outcome` and return the artifact path.
    pub fn report(&self, test_case_id: &str, outcome: &ReplayOutcome) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.dir).map_err(|e| RetraceError::persistence(&self.dir, e))?;

        let report = FailureReport::from_outcome(test_case_id, outcome);
        let short_run: String = outcome.run_id.chars().take(8).collect();
        let path = self.dir.join(format!(
            "failure_{}_{}_{}.json",
            test_case_id,
            report.generated_at.format("%H%M%S"),
            short_run
        ));

        let content = serde_json::to_string_pretty(&report)?;
        std::fs::write(&path, content).map_err(|e| RetraceError::persistence(&path, e))?;

        tracing::info!("Failure report saved to {:?}", path);
        Ok(path)
    }
}

//! Replay result structures.

use crate::recording::schema::RecordedAction;
use crate::replay::relocator::RelocationVerdict;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Per-step replay state.
///
/// `Pending -> Attempted -> {Succeeded, Relocated, Corrected, Failed}`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepStatus {
    Pending,
    Attempted,
    Succeeded,
    Relocated,
    Corrected,
    Failed,
}

impl StepStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            StepStatus::Succeeded | StepStatus::Relocated | StepStatus::Corrected | StepStatus::Failed
        )
    }

    /// Terminal and not failed.
    pub fn is_success(self) -> bool {
        self.is_terminal() && self != StepStatus::Failed
    }

    pub fn can_transition_to(self, next: StepStatus) -> bool {
        match self {
            StepStatus::Pending => next == StepStatus::Attempted,
            StepStatus::Attempted => next.is_terminal(),
            _ => false,
        }
    }
}

/// One relocation try: candidates scored, and the retargeted execution if any.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RelocationAttempt {
    pub original_index: Option<u64>,
    pub candidate_count: usize,
    pub verdict: Option<RelocationVerdict>,
    pub relocated_index: Option<u64>,
    pub score: f64,
    pub confidence: f64,
    /// Whether the retargeted action executed successfully
    pub succeeded: bool,
    pub error: Option<String>,
}

/// One corrective instruction and its result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CorrectionAttempt {
    pub instruction: String,
    pub succeeded: bool,
    pub error: Option<String>,
}

/// Outcome of replaying a single recorded step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepReport {
    pub step_number: usize,
    pub status: StepStatus,
    /// Copy of the recorded action this step replayed
    pub action: RecordedAction,
    #[serde(default)]
    pub relocations: Vec<RelocationAttempt>,
    #[serde(default)]
    pub corrections: Vec<CorrectionAttempt>,
    /// Last failure observed, kept even when a later attempt recovered
    pub error: Option<String>,
    /// Instructions sent to the agent for this step
    pub agent_calls: u32,
}

impl StepReport {
    pub fn new(action: &RecordedAction) -> Self {
        Self {
            step_number: action.step_number,
            status: StepStatus::Pending,
            action: action.clone(),
            relocations: Vec::new(),
            corrections: Vec::new(),
            error: None,
            agent_calls: 0,
        }
    }

    pub fn advance(&mut self, next: StepStatus) {
        debug_assert!(
            self.status.can_transition_to(next),
            "invalid step transition {:?} -> {:?}",
            self.status,
            next
        );
        self.status = next;
    }

    /// Terminal FAILED report for a step that never completed.
    pub fn aborted(action: &RecordedAction, error: impl Into<String>) -> Self {
        let mut report = Self::new(action);
        report.advance(StepStatus::Attempted);
        report.error = Some(error.into());
        report.advance(StepStatus::Failed);
        report
    }
}

/// Result of one replay run. Produced fresh per run and never written into
/// the test case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayOutcome {
    pub run_id: String,
    pub test_case_id: String,
    pub test_case_name: String,
    pub auto_correct: bool,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Recorded steps in the test case
    pub total_steps: usize,
    pub success: bool,
    pub steps: Vec<StepReport>,
    /// Failure before step 1 (opening the start URL)
    pub setup_error: Option<String>,
    pub interrupted: bool,
    /// A failed step ended the run with `continue_on_failure` off
    pub stopped_early: bool,
    pub report_path: Option<PathBuf>,
}

impl ReplayOutcome {
    pub fn new(test_case_id: &str, test_case_name: &str, total_steps: usize, auto_correct: bool) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            test_case_id: test_case_id.to_string(),
            test_case_name: test_case_name.to_string(),
            auto_correct,
            started_at: Utc::now(),
            completed_at: None,
            total_steps,
            success: false,
            steps: Vec::new(),
            setup_error: None,
            interrupted: false,
            stopped_early: false,
            report_path: None,
        }
    }

    /// Compute the overall verdict: every recorded step ran and none failed.
    pub fn finish(&mut self) {
        self.success = self.setup_error.is_none()
            && !self.interrupted
            && self.steps.len() == self.total_steps
            && self.steps.iter().all(|s| s.status.is_success());
        self.completed_at = Some(Utc::now());
    }

    fn count(&self, status: StepStatus) -> usize {
        self.steps.iter().filter(|s| s.status == status).count()
    }

    pub fn succeeded_count(&self) -> usize {
        self.count(StepStatus::Succeeded)
    }

    pub fn relocated_count(&self) -> usize {
        self.count(StepStatus::Relocated)
    }

    pub fn corrected_count(&self) -> usize {
        self.count(StepStatus::Corrected)
    }

    pub fn failed_count(&self) -> usize {
        self.count(StepStatus::Failed)
    }
}

/// One test case's result within a batch replay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchEntry {
    pub test_case_id: String,
    pub success: bool,
    /// Why the case could not be replayed at all
    pub error: Option<String>,
    pub outcome: Option<ReplayOutcome>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::schema::ActionType;
    use serde_json::Map;

    fn action(step: usize) -> RecordedAction {
        RecordedAction {
            step_number: step,
            action_type: ActionType::Click,
            action_name: "click".to_string(),
            parameters: Map::new(),
            timestamp: Utc::now(),
            url: None,
            thinking: None,
            goal: None,
            memory: None,
            element_description: None,
        }
    }

    #[test]
    fn test_status_transitions() {
        assert!(StepStatus::Pending.can_transition_to(StepStatus::Attempted));
        assert!(!StepStatus::Pending.can_transition_to(StepStatus::Succeeded));
        assert!(StepStatus::Attempted.can_transition_to(StepStatus::Relocated));
        assert!(!StepStatus::Failed.can_transition_to(StepStatus::Attempted));
        assert!(!StepStatus::Succeeded.can_transition_to(StepStatus::Failed));
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(
            serde_json::to_string(&StepStatus::Relocated).unwrap(),
            "\"RELOCATED\""
        );
    }

    #[test]
    fn test_outcome_verdict() {
        let mut outcome = ReplayOutcome::new("tc", "Test", 2, true);
        let mut ok = StepReport::new(&action(1));
        ok.advance(StepStatus::Attempted);
        ok.advance(StepStatus::Corrected);
        outcome.steps.push(ok);

        // a step never ran
        outcome.finish();
        assert!(!outcome.success);

        outcome.steps.push(StepReport::aborted(&action(2), "boom"));
        outcome.finish();
        assert!(!outcome.success);
        assert_eq!(outcome.failed_count(), 1);
        assert_eq!(outcome.corrected_count(), 1);

        outcome.steps.pop();
        let mut ok = StepReport::new(&action(2));
        ok.advance(StepStatus::Attempted);
        ok.advance(StepStatus::Succeeded);
        outcome.steps.push(ok);
        outcome.finish();
        assert!(outcome.success);
        assert!(outcome.completed_at.is_some());
    }

    #[test]
    fn test_empty_test_case_succeeds() {
        let mut outcome = ReplayOutcome::new("empty", "Empty", 0, true);
        outcome.finish();
        assert!(outcome.success);
    }
}

//! Replay engine: re-drives a recorded test case step by step.
//!
//! Each recorded step is executed as captured. When the target has drifted
//! (the recorded index now points elsewhere, the agent landed on a different
//! element, or the step failed outright) the engine relocates the element from
//! its fingerprint and retries, then falls back to a corrective instruction
//! built from the recorded reasoning. Both are bounded per step.

use crate::agent::{BrowserAgent, StepResult};
use crate::config::{validate_config, AppConfig, ReplayConfig};
use crate::error::Result;
use crate::recording::manager::TestCaseStore;
use crate::recording::schema::{ActionType, ElementFingerprint, RecordedAction, TestCase};
use crate::replay::prompt;
use crate::replay::relocator::Relocator;
use crate::replay::report::FailureReporter;
use crate::replay::schema::{
    BatchEntry, CorrectionAttempt, RelocationAttempt, ReplayOutcome, StepReport, StepStatus,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Result of checking the recorded index against the live page before acting.
#[derive(Debug, Clone, PartialEq)]
enum TargetCheck {
    /// Recorded index still holds an element with the recorded identity
    Confirmed,
    Diverged(String),
    /// Nothing to check against
    Unchecked,
}

/// State carried across the steps of one run.
#[derive(Debug, Default)]
struct RunState {
    current_url: Option<String>,
}

/// What a successful step result must have landed on.
#[derive(Debug, Clone, Copy)]
enum Landing<'a> {
    /// No target expectation
    Any,
    /// The element carrying the recorded identity
    Recorded(&'a ElementFingerprint),
    /// The index the relocator chose
    Index(u64),
}

/// Apply a step result: track the page URL and decide success.
///
/// A reported target that is not the expected one counts as drift even when
/// the agent says the action succeeded.
fn settle(
    result: std::result::Result<StepResult, String>,
    landing: Landing<'_>,
    run: &mut RunState,
) -> std::result::Result<(), String> {
    let result = result?;

    if let Some(url) = result.url.as_ref().filter(|u| !u.is_empty()) {
        run.current_url = Some(url.clone());
    }

    if !result.success {
        return Err(result
            .error
            .unwrap_or_else(|| "agent reported failure".to_string()));
    }

    let Some(target) = &result.target else {
        return Ok(());
    };

    match landing {
        Landing::Recorded(fp) if !fp.matches(&target.attributes, &target.x_path) => Err(format!(
            "action landed on element {} whose attributes diverge from the recorded target",
            target.index
        )),
        Landing::Index(index) if target.index != index => Err(format!(
            "action landed on element {} instead of relocated element {}",
            target.index, index
        )),
        _ => Ok(()),
    }
}

pub struct ReplayEngine {
    store: Arc<TestCaseStore>,
    reporter: FailureReporter,
    options: ReplayConfig,
    relocator: Relocator,
}

impl ReplayEngine {
    pub fn new(store: Arc<TestCaseStore>, reporter: FailureReporter, options: ReplayConfig) -> Self {
        Self {
            relocator: Relocator::from_config(&options),
            store,
            reporter,
            options,
        }
    }

    /// Build from configuration. Fails fast on unusable LLM settings.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        validate_config(config)?;

        let store = Arc::new(TestCaseStore::new(&config.storage.test_cases_dir)?);
        let reporter = FailureReporter::new(&config.storage.reports_dir);
        Ok(Self::new(store, reporter, config.replay.clone()))
    }

    pub fn options(&self) -> &ReplayConfig {
        &self.options
    }

    pub fn store(&self) -> &Arc<TestCaseStore> {
        &self.store
    }

    /// Replay a stored test case and write a failure report when it fails.
    ///
    /// `auto_correct` falls back to the configured default when `None`. Step
    /// failures are part of the outcome; only a missing test case or a report
    /// that cannot be written is an error.
    pub async fn replay(
        &self,
        agent: &mut dyn BrowserAgent,
        test_case_id: &str,
        auto_correct: Option<bool>,
        cancel: &CancellationToken,
    ) -> Result<ReplayOutcome> {
        let auto_correct = auto_correct.unwrap_or(self.options.auto_correct);
        let test_case = self.store.get(test_case_id)?;
        let mut outcome = self
            .replay_case(agent, &test_case, auto_correct, cancel)
            .await;

        if !outcome.success {
            let path = self.reporter.report(&test_case.id, &outcome).map_err(|e| {
                tracing::error!(
                    "Failed to write failure report for {} (run {}): {}",
                    test_case.id,
                    outcome.run_id,
                    e
                );
                match serde_json::to_string(&outcome) {
                    Ok(json) => tracing::error!("Unsaved replay outcome: {}", json),
                    Err(se) => tracing::error!("Unsaved replay outcome: {:?} ({})", outcome, se),
                }
                e
            })?;
            outcome.report_path = Some(path);
        }

        Ok(outcome)
    }

    /// Replay several stored test cases in order, each with fresh run state.
    ///
    /// A case that cannot be replayed (unknown id, unwritable report) becomes
    /// an unsuccessful entry and the batch moves on. Cancellation stops the
    /// batch after the current case.
    pub async fn replay_batch(
        &self,
        agent: &mut dyn BrowserAgent,
        test_case_ids: &[String],
        auto_correct: Option<bool>,
        cancel: &CancellationToken,
    ) -> Vec<BatchEntry> {
        let mut entries = Vec::with_capacity(test_case_ids.len());

        for id in test_case_ids {
            if cancel.is_cancelled() {
                tracing::warn!("Batch replay interrupted before {}", id);
                break;
            }

            let entry = match self.replay(&mut *agent, id, auto_correct, cancel).await {
                Ok(outcome) => BatchEntry {
                    test_case_id: id.clone(),
                    success: outcome.success,
                    error: None,
                    outcome: Some(outcome),
                },
                Err(e) => {
                    tracing::error!("Batch replay of {} failed: {}", id, e);
                    BatchEntry {
                        test_case_id: id.clone(),
                        success: false,
                        error: Some(e.to_string()),
                        outcome: None,
                    }
                }
            };
            entries.push(entry);
        }

        tracing::info!(
            "Batch replay finished: {}/{} passed",
            entries.iter().filter(|e| e.success).count(),
            test_case_ids.len()
        );
        entries
    }

    /// Replay a test case without touching storage.
    pub async fn replay_case(
        &self,
        agent: &mut dyn BrowserAgent,
        test_case: &TestCase,
        auto_correct: bool,
        cancel: &CancellationToken,
    ) -> ReplayOutcome {
        let mut outcome = ReplayOutcome::new(
            &test_case.id,
            &test_case.name,
            test_case.actions.len(),
            auto_correct,
        );
        let mut run = RunState::default();

        tracing::info!(
            "Replaying test case {} ({} steps, run {})",
            test_case.id,
            test_case.actions.len(),
            outcome.run_id
        );

        let needs_preamble = !test_case.start_url.is_empty()
            && test_case
                .actions
                .first()
                .map_or(true, |a| a.action_type != ActionType::Navigate);

        if needs_preamble {
            let instruction = prompt::navigate_instruction(&test_case.start_url);
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                r = agent.execute(&instruction) => Some(r),
            };

            match result.map(|r| settle(r, Landing::Any, &mut run)) {
                None => {
                    tracing::warn!("Replay interrupted while opening {}", test_case.start_url);
                    outcome.interrupted = true;
                    outcome.finish();
                    return outcome;
                }
                Some(Err(e)) => {
                    tracing::error!("Failed to open start URL {}: {}", test_case.start_url, e);
                    outcome.setup_error =
                        Some(format!("Failed to open start URL {}: {}", test_case.start_url, e));
                    outcome.finish();
                    return outcome;
                }
                Some(Ok(())) => {
                    if run.current_url.is_none() {
                        run.current_url = Some(test_case.start_url.clone());
                    }
                }
            }
        }

        for action in &test_case.actions {
            if cancel.is_cancelled() {
                tracing::warn!("Replay interrupted before step {}", action.step_number);
                outcome.interrupted = true;
                break;
            }

            let step = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                report = self.run_step(&mut *agent, action, auto_correct, &mut run) => Some(report),
            };

            let Some(report) = step else {
                tracing::warn!("Replay interrupted during step {}", action.step_number);
                outcome
                    .steps
                    .push(StepReport::aborted(action, "replay interrupted"));
                outcome.interrupted = true;
                break;
            };

            let failed = report.status == StepStatus::Failed;
            tracing::info!(
                "Step {} ({}) -> {:?}",
                report.step_number,
                action.action_type,
                report.status
            );
            outcome.steps.push(report);

            if failed && !self.options.continue_on_failure {
                tracing::warn!("Stopping replay after failed step {}", action.step_number);
                outcome.stopped_early = true;
                break;
            }
        }

        outcome.finish();
        tracing::info!(
            "Replay of {} finished: success={} relocated={} corrected={} failed={}",
            test_case.id,
            outcome.success,
            outcome.relocated_count(),
            outcome.corrected_count(),
            outcome.failed_count()
        );
        outcome
    }

    /// Check whether the recorded index still points at the recorded element.
    async fn check_target(
        &self,
        agent: &mut dyn BrowserAgent,
        action: &RecordedAction,
        fingerprint: Option<&ElementFingerprint>,
    ) -> TargetCheck {
        let (Some(fp), Some(index)) = (fingerprint, action.index()) else {
            return TargetCheck::Unchecked;
        };

        let candidates = match agent.candidates().await {
            Ok(candidates) => candidates,
            Err(e) => {
                tracing::debug!("Candidate listing failed before step {}: {}", action.step_number, e);
                return TargetCheck::Unchecked;
            }
        };

        if candidates.is_empty() {
            return TargetCheck::Unchecked;
        }

        match candidates.iter().find(|c| c.index == index) {
            Some(c) if fp.matches(&c.attributes, &c.x_path) => TargetCheck::Confirmed,
            Some(_) => TargetCheck::Diverged(format!(
                "element at recorded index {} no longer matches the recorded fingerprint",
                index
            )),
            None => TargetCheck::Diverged(format!(
                "recorded index {} is not present on the page",
                index
            )),
        }
    }

    async fn run_step(
        &self,
        agent: &mut dyn BrowserAgent,
        action: &RecordedAction,
        auto_correct: bool,
        run: &mut RunState,
    ) -> StepReport {
        let mut report = StepReport::new(action);
        report.advance(StepStatus::Attempted);
        let fingerprint = action.fingerprint();

        let mut failure = match self.check_target(agent, action, fingerprint.as_ref()).await {
            TargetCheck::Diverged(reason) => reason,
            check => {
                tracing::debug!("Step {} target check: {:?}", action.step_number, check);
                report.agent_calls += 1;
                let result = agent.execute(&prompt::replay_instruction(action)).await;
                let landing = fingerprint.as_ref().map_or(Landing::Any, Landing::Recorded);
                match settle(result, landing, run) {
                    Ok(()) => {
                        report.advance(StepStatus::Succeeded);
                        return report;
                    }
                    Err(e) => e,
                }
            }
        };

        tracing::warn!("Step {} drifted: {}", action.step_number, failure);
        report.error = Some(failure.clone());

        if let Some(fp) = &fingerprint {
            for _ in 0..self.options.max_relocation_retries {
                let mut attempt = RelocationAttempt {
                    original_index: action.index(),
                    candidate_count: 0,
                    verdict: None,
                    relocated_index: None,
                    score: 0.0,
                    confidence: 0.0,
                    succeeded: false,
                    error: None,
                };

                let candidates = match agent.candidates().await {
                    Ok(candidates) => candidates,
                    Err(e) => {
                        attempt.error = Some(format!("candidate listing failed: {}", e));
                        report.relocations.push(attempt);
                        break;
                    }
                };

                let relocation = self.relocator.relocate(fp, &candidates);
                attempt.candidate_count = candidates.len();
                attempt.verdict = Some(relocation.verdict);
                attempt.relocated_index = relocation.index;
                attempt.score = relocation.score;
                attempt.confidence = relocation.confidence;

                let Some(index) = relocation.index else {
                    tracing::info!(
                        "Step {}: no confident relocation ({:?}, score {:.2})",
                        action.step_number,
                        relocation.verdict,
                        relocation.score
                    );
                    attempt.error = Some(format!("no confident match: {:?}", relocation.verdict));
                    report.relocations.push(attempt);
                    break;
                };

                tracing::info!(
                    "Step {}: relocated index {:?} -> {} (confidence {:.2})",
                    action.step_number,
                    action.index(),
                    index,
                    relocation.confidence
                );

                report.agent_calls += 1;
                let result = agent
                    .execute(&prompt::retargeted_instruction(action, index))
                    .await;
                match settle(result, Landing::Index(index), run) {
                    Ok(()) => {
                        attempt.succeeded = true;
                        report.relocations.push(attempt);
                        report.advance(StepStatus::Relocated);
                        return report;
                    }
                    Err(e) => {
                        attempt.error = Some(e.clone());
                        report.relocations.push(attempt);
                        failure = e;
                    }
                }
            }
        }

        if auto_correct {
            for _ in 0..self.options.max_correction_attempts {
                let instruction =
                    prompt::correction_instruction(action, &failure, run.current_url.as_deref());
                tracing::info!("Step {}: requesting correction", action.step_number);

                report.agent_calls += 1;
                let result = agent.execute(&instruction).await;
                match settle(result, Landing::Any, run) {
                    Ok(()) => {
                        report.corrections.push(CorrectionAttempt {
                            instruction: instruction.prompt,
                            succeeded: true,
                            error: None,
                        });
                        report.advance(StepStatus::Corrected);
                        return report;
                    }
                    Err(e) => {
                        report.corrections.push(CorrectionAttempt {
                            instruction: instruction.prompt,
                            succeeded: false,
                            error: Some(e.clone()),
                        });
                        failure = e;
                    }
                }
            }
        }

        tracing::error!("Step {} failed: {}", action.step_number, failure);
        report.error = Some(failure);
        report.advance(StepStatus::Failed);
        report
    }
}

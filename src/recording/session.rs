//! Recording session: drives the agent through a task and captures each step.

use crate::agent::{AgentTask, RecordingAgent, StepControl, StepObservation, StepObserver};
use crate::config::{validate_config, AppConfig, RecordConfig};
use crate::error::{Result, RetraceError};
use crate::recording::manager::TestCaseStore;
use crate::recording::schema::{
    ActionType, RecordedAction, TestCase, TestCaseMetadata, ELEMENT_KEY, INDEX_KEY,
};
use crate::skills::{build_extend_system_message, load_skills_dir, select_skills, LocalSkill};
use async_trait::async_trait;
use chrono::{Local, Utc};
use regex::Regex;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use std::time::Instant;
use tokio_util::sync::CancellationToken;

const SKILLS_TOP_K: usize = 3;

/// Find the first http(s) URL in free text, without trailing punctuation.
pub fn extract_url_from_prompt(text: &str) -> Option<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r#"https?://[^\s<>"'，。]+"#).expect("valid regex"));

    re.find(text)
        .map(|m| m.as_str().trim_end_matches(['.', ',', ';', ':', ')']).to_string())
        .filter(|url| url.len() > "https://".len())
}

/// In-progress capture buffer for one recording run.
///
/// Acts as the agent's step observer. Cancellation is checked before every
/// append, so a step that completes after the interrupt is not kept.
pub struct RecordingSession {
    actions: Vec<RecordedAction>,
    cancel: CancellationToken,
    interrupted: bool,
}

impl RecordingSession {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            actions: Vec::new(),
            cancel,
            interrupted: false,
        }
    }

    pub fn actions(&self) -> &[RecordedAction] {
        &self.actions
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted
    }

    /// Normalize an observation into a [`RecordedAction`] and append it.
    pub fn capture(&mut self, observation: StepObservation) -> &RecordedAction {
        let StepObservation {
            thinking,
            goal,
            memory,
            url,
            action,
        } = observation;

        let mut parameters = action.params;
        let element_description = action.element.as_ref().and_then(|el| el.describe());

        if let Some(element) = &action.element {
            if parameters.get(INDEX_KEY).is_some_and(Value::is_u64) {
                match serde_json::to_value(element) {
                    Ok(value) => {
                        parameters.insert(ELEMENT_KEY.to_string(), value);
                    }
                    Err(e) => tracing::warn!("Failed to embed element fingerprint: {}", e),
                }
            } else {
                tracing::debug!(
                    "Action {} reported an element without an index; fingerprint not embedded",
                    action.name
                );
            }
        }

        let action_type = ActionType::from_agent_action(&action.name);
        if action_type == ActionType::Unknown {
            tracing::debug!("Unrecognized agent action {:?}, recording as unknown", action.name);
        }

        self.actions.push(RecordedAction {
            step_number: self.actions.len() + 1,
            action_type,
            action_name: action.name,
            parameters,
            timestamp: Utc::now(),
            url,
            thinking,
            goal,
            memory,
            element_description,
        });

        let recorded = &self.actions[self.actions.len() - 1];
        tracing::info!(
            "Captured step {}: {} ({})",
            recorded.step_number,
            recorded.action_type,
            recorded.action_name
        );
        recorded
    }

    fn into_actions(self) -> Vec<RecordedAction> {
        self.actions
    }
}

#[async_trait]
impl StepObserver for RecordingSession {
    async fn on_step_end(&mut self, observation: StepObservation) -> StepControl {
        if self.interrupted || self.cancel.is_cancelled() {
            self.interrupted = true;
            return StepControl::Stop;
        }

        self.capture(observation);
        StepControl::Continue
    }
}

/// Input for a single recording run.
#[derive(Debug, Clone, Default)]
pub struct RecordRequest {
    pub task: String,
    /// Explicit start URL; otherwise the first URL in the task text is used
    pub start_url: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    /// Skill id injected ahead of keyword matches
    pub force_skill: Option<String>,
    pub tags: Vec<String>,
}

impl RecordRequest {
    pub fn new(task: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingState {
    /// Agent ran to its own end (successful or not)
    Completed,
    /// Interrupted; holds only the steps captured before the signal
    Partial,
}

#[derive(Debug, Clone)]
pub struct RecordingResult {
    pub test_case: TestCase,
    pub path: PathBuf,
    pub state: RecordingState,
}

/// Records natural-language tasks into persisted test cases.
pub struct Recorder {
    store: Arc<TestCaseStore>,
    options: RecordConfig,
    skills: Vec<LocalSkill>,
}

impl Recorder {
    pub fn new(store: Arc<TestCaseStore>, options: RecordConfig) -> Self {
        Self {
            store,
            options,
            skills: Vec::new(),
        }
    }

    pub fn with_skills(mut self, skills: Vec<LocalSkill>) -> Self {
        self.skills = skills;
        self
    }

    /// Build from configuration. Fails fast on unusable LLM settings.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        validate_config(config)?;

        let store = Arc::new(TestCaseStore::new(&config.storage.test_cases_dir)?);
        let skills = if config.record.auto_skills {
            load_skills_dir(&config.storage.skills_dir)
        } else {
            Vec::new()
        };
        tracing::debug!("Recorder loaded {} local skills", skills.len());

        Ok(Self::new(store, config.record.clone()).with_skills(skills))
    }

    pub fn store(&self) -> &Arc<TestCaseStore> {
        &self.store
    }

    fn extend_system_message(&self, request: &RecordRequest) -> Option<String> {
        if self.skills.is_empty() {
            return None;
        }
        let selected = select_skills(
            &request.task,
            &self.skills,
            request.force_skill.as_deref(),
            SKILLS_TOP_K,
        );
        if !selected.is_empty() {
            let names: Vec<&str> = selected.iter().map(|s| s.name.as_str()).collect();
            tracing::info!("Injecting skills: {}", names.join(", "));
        }
        build_extend_system_message(&selected)
    }

    /// Run the agent on `request.task` and persist whatever it produced.
    ///
    /// Cancelling `cancel` stops the run between steps and persists the
    /// captured prefix as a partial test case.
    pub async fn record(
        &self,
        agent: &mut dyn RecordingAgent,
        request: RecordRequest,
        cancel: &CancellationToken,
    ) -> Result<RecordingResult> {
        if request.task.trim().is_empty() {
            return Err(RetraceError::Validation("Task cannot be empty".to_string()));
        }

        let start_url = request
            .start_url
            .clone()
            .filter(|u| !u.trim().is_empty())
            .or_else(|| extract_url_from_prompt(&request.task));

        let agent_task = AgentTask {
            task: request.task.clone(),
            start_url: start_url.clone(),
            extend_system_message: self.extend_system_message(&request),
            max_steps: self.options.max_steps,
            headless: self.options.headless,
        };

        let started_at = Utc::now();
        let started = Instant::now();
        let mut session = RecordingSession::new(cancel.clone());

        tracing::info!("Recording task: {}", request.task);

        let run = if cancel.is_cancelled() {
            None
        } else {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                result = agent.run(&agent_task, &mut session) => Some(result),
            }
        };

        let interrupted = run.is_none() || session.is_interrupted();
        let (state, is_successful, final_result) = match run {
            _ if interrupted => {
                tracing::warn!(
                    "Recording interrupted after {} steps, saving partial test case",
                    session.actions().len()
                );
                (RecordingState::Partial, false, None)
            }
            Some(Ok(summary)) => (
                RecordingState::Completed,
                summary.is_successful,
                summary.final_result,
            ),
            Some(Err(e)) => {
                tracing::warn!("Agent run failed: {}", e);
                (RecordingState::Completed, false, Some(e))
            }
            None => (RecordingState::Partial, false, None),
        };

        let id = self.store.allocate_id(Local::now());
        let test_case = TestCase {
            name: request.name.unwrap_or_else(|| format!("Test_{}", id)),
            description: request.description.unwrap_or_else(|| request.task.clone()),
            created_at: started_at,
            updated_at: Utc::now(),
            start_url: start_url.unwrap_or_default(),
            actions: session.into_actions(),
            tags: request.tags,
            metadata: TestCaseMetadata {
                task: request.task,
                is_successful,
                partial: state == RecordingState::Partial,
                max_steps: self.options.max_steps,
                duration_ms: started.elapsed().as_millis() as u64,
                final_result,
                extra: Default::default(),
            },
            id,
        };

        let path = self.store.save(&test_case).map_err(|e| {
            tracing::error!(
                "Failed to persist test case {} ({} actions): {}",
                test_case.id,
                test_case.actions.len(),
                e
            );
            match serde_json::to_string(&test_case) {
                Ok(json) => tracing::error!("Unsaved test case: {}", json),
                Err(se) => tracing::error!("Unsaved test case: {:?} ({})", test_case, se),
            }
            e
        })?;

        tracing::info!(
            "Saved test case {} with {} actions to {:?}",
            test_case.id,
            test_case.actions.len(),
            path
        );

        Ok(RecordingResult {
            test_case,
            path,
            state,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::ObservedAction;
    use crate::recording::schema::ElementFingerprint;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn observation(name: &str, params: Value, element: Option<ElementFingerprint>) -> StepObservation {
        StepObservation {
            thinking: Some("thinking".to_string()),
            goal: Some("goal".to_string()),
            memory: Some("memory".to_string()),
            url: Some("https://www.baidu.com".to_string()),
            action: ObservedAction {
                name: name.to_string(),
                params: params.as_object().cloned().unwrap_or_default(),
                element,
            },
        }
    }

    #[test]
    fn test_extract_url_from_prompt() {
        assert_eq!(
            extract_url_from_prompt("Open https://www.baidu.com, then search ai skills."),
            Some("https://www.baidu.com".to_string())
        );
        assert_eq!(
            extract_url_from_prompt("go to http://localhost:3000/login."),
            Some("http://localhost:3000/login".to_string())
        );
        assert_eq!(extract_url_from_prompt("search for shoes"), None);
    }

    #[test]
    fn test_capture_embeds_fingerprint() {
        let mut session = RecordingSession::new(CancellationToken::new());
        let element = ElementFingerprint {
            attributes: BTreeMap::from([("id".to_string(), "kw".to_string())]),
            x_path: "html/body/input".to_string(),
            node_name: Some("INPUT".to_string()),
            ax_name: None,
        };

        let recorded = session
            .capture(observation(
                "input",
                json!({"index": 4, "text": "ai skills"}),
                Some(element.clone()),
            ))
            .clone();

        assert_eq!(recorded.step_number, 1);
        assert_eq!(recorded.action_type, ActionType::Type);
        assert_eq!(recorded.action_name, "input");
        assert_eq!(recorded.fingerprint(), Some(element));
        assert_eq!(recorded.index(), Some(4));
        assert_eq!(
            recorded.element_description.as_deref(),
            Some("input id='kw' xpath='html/body/input'")
        );
        assert_eq!(recorded.thinking.as_deref(), Some("thinking"));
    }

    #[test]
    fn test_capture_without_index_skips_fingerprint() {
        let mut session = RecordingSession::new(CancellationToken::new());
        let recorded = session
            .capture(observation(
                "navigate",
                json!({"url": "https://example.com"}),
                Some(ElementFingerprint::default()),
            ))
            .clone();
        assert!(recorded.fingerprint().is_none());
        assert_eq!(recorded.action_type, ActionType::Navigate);
    }

    #[tokio::test]
    async fn test_observer_stops_after_cancel() {
        let cancel = CancellationToken::new();
        let mut session = RecordingSession::new(cancel.clone());

        let control = session
            .on_step_end(observation("click", json!({"index": 1}), None))
            .await;
        assert_eq!(control, StepControl::Continue);

        cancel.cancel();
        let control = session
            .on_step_end(observation("click", json!({"index": 2}), None))
            .await;
        assert_eq!(control, StepControl::Stop);
        assert_eq!(session.actions().len(), 1);
        assert!(session.is_interrupted());
    }
}

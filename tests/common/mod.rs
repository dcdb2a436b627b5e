//! Scripted agents and fixtures shared by the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use retrace_lib::agent::{
    AgentRunSummary, AgentTask, BrowserAgent, CandidateElement, Instruction, InstructionKind,
    ObservedAction, RecordingAgent, StepControl, StepObservation, StepObserver, StepResult,
};
use retrace_lib::recording::schema::{
    ActionType, ElementFingerprint, RecordedAction, TestCase, TestCaseMetadata, ELEMENT_KEY,
};
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashSet};
use tokio_util::sync::CancellationToken;

pub fn attrs(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

pub fn fingerprint(pairs: &[(&str, &str)], x_path: &str) -> ElementFingerprint {
    ElementFingerprint {
        attributes: attrs(pairs),
        x_path: x_path.to_string(),
        node_name: Some("input".to_string()),
        ax_name: None,
    }
}

pub fn candidate(index: u64, pairs: &[(&str, &str)], x_path: &str) -> CandidateElement {
    CandidateElement {
        index,
        attributes: attrs(pairs),
        x_path: x_path.to_string(),
    }
}

pub fn navigate_action(step: usize, url: &str) -> RecordedAction {
    RecordedAction {
        step_number: step,
        action_type: ActionType::Navigate,
        action_name: "navigate".to_string(),
        parameters: json!({ "url": url }).as_object().cloned().unwrap_or_default(),
        timestamp: Utc::now(),
        url: Some(url.to_string()),
        thinking: Some("Start from the home page".to_string()),
        goal: Some(format!("Open {}", url)),
        memory: None,
        element_description: None,
    }
}

pub fn element_action(
    step: usize,
    action_type: ActionType,
    name: &str,
    index: u64,
    extra: Value,
    fp: &ElementFingerprint,
) -> RecordedAction {
    let mut parameters: Map<String, Value> = extra.as_object().cloned().unwrap_or_default();
    parameters.insert("index".to_string(), json!(index));
    parameters.insert(ELEMENT_KEY.to_string(), serde_json::to_value(fp).unwrap());

    RecordedAction {
        step_number: step,
        action_type,
        action_name: name.to_string(),
        parameters,
        timestamp: Utc::now(),
        url: None,
        thinking: Some("The target element is visible".to_string()),
        goal: Some(format!("Step {} of the scenario", step)),
        memory: Some("Working through the scenario".to_string()),
        element_description: fp.describe(),
    }
}

pub fn test_case(id: &str, start_url: &str, actions: Vec<RecordedAction>) -> TestCase {
    TestCase {
        id: id.to_string(),
        name: format!("Case {}", id),
        description: "scripted".to_string(),
        created_at: Utc::now(),
        updated_at: Utc::now(),
        start_url: start_url.to_string(),
        actions,
        tags: vec![],
        metadata: TestCaseMetadata {
            task: "scripted task".to_string(),
            is_successful: true,
            ..Default::default()
        },
    }
}

/// Replay agent backed by a static page of candidate elements.
///
/// Index-based instructions land on the element with that index when it
/// exists; corrections return `correction_result`.
pub struct ScriptedAgent {
    pub page: Vec<CandidateElement>,
    pub fail_indices: HashSet<u64>,
    pub fail_navigation: bool,
    pub correction_result: StepResult,
    pub executed: Vec<Instruction>,
    pub candidate_calls: usize,
}

impl ScriptedAgent {
    pub fn new(page: Vec<CandidateElement>) -> Self {
        Self {
            page,
            fail_indices: HashSet::new(),
            fail_navigation: false,
            correction_result: StepResult::failed("correction could not find an equivalent element"),
            executed: Vec::new(),
            candidate_calls: 0,
        }
    }

    pub fn executed_kinds(&self) -> Vec<InstructionKind> {
        self.executed.iter().map(|i| i.kind).collect()
    }
}

#[async_trait]
impl BrowserAgent for ScriptedAgent {
    async fn execute(&mut self, instruction: &Instruction) -> Result<StepResult, String> {
        self.executed.push(instruction.clone());

        if instruction.kind == InstructionKind::Correction {
            return Ok(self.correction_result.clone());
        }

        if instruction.action_type == ActionType::Navigate {
            if self.fail_navigation {
                return Ok(StepResult::failed("net::ERR_NAME_NOT_RESOLVED"));
            }
            let url = instruction
                .parameters
                .get("url")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            return Ok(StepResult::ok().with_url(url));
        }

        let Some(index) = instruction.parameters.get("index").and_then(Value::as_u64) else {
            return Ok(StepResult::ok());
        };

        if self.fail_indices.contains(&index) {
            return Ok(StepResult::failed(format!("action at index {} had no effect", index)));
        }

        match self.page.iter().find(|c| c.index == index) {
            Some(c) => Ok(StepResult::ok().with_target(c.clone())),
            None => Ok(StepResult::failed(format!(
                "element with index {} does not exist",
                index
            ))),
        }
    }

    async fn candidates(&mut self) -> Result<Vec<CandidateElement>, String> {
        self.candidate_calls += 1;
        Ok(self.page.clone())
    }
}

pub fn observation(name: &str, params: Value, element: Option<ElementFingerprint>) -> StepObservation {
    StepObservation {
        thinking: Some(format!("Ready to {}", name)),
        goal: Some(format!("Perform {}", name)),
        memory: Some("scripted".to_string()),
        url: Some("https://www.baidu.com".to_string()),
        action: ObservedAction {
            name: name.to_string(),
            params: params.as_object().cloned().unwrap_or_default(),
            element,
        },
    }
}

/// Recording agent that replays a fixed list of step observations.
pub struct ScriptedRecordingAgent {
    pub steps: Vec<StepObservation>,
    /// Cancel this token right after the given number of steps completed
    pub cancel_after: Option<(usize, CancellationToken)>,
    pub result: Result<AgentRunSummary, String>,
    pub received: Option<AgentTask>,
    pub dispatched: usize,
}

impl ScriptedRecordingAgent {
    pub fn new(steps: Vec<StepObservation>) -> Self {
        Self {
            steps,
            cancel_after: None,
            result: Ok(AgentRunSummary {
                is_successful: true,
                final_result: Some("done".to_string()),
            }),
            received: None,
            dispatched: 0,
        }
    }
}

#[async_trait]
impl RecordingAgent for ScriptedRecordingAgent {
    async fn run(
        &mut self,
        task: &AgentTask,
        observer: &mut dyn StepObserver,
    ) -> Result<AgentRunSummary, String> {
        self.received = Some(task.clone());

        for (i, step) in self.steps.clone().into_iter().enumerate() {
            self.dispatched += 1;
            if observer.on_step_end(step).await == StepControl::Stop {
                break;
            }
            if let Some((n, token)) = &self.cancel_after {
                if i + 1 == *n {
                    token.cancel();
                    tokio::task::yield_now().await;
                }
            }
        }

        self.result.clone()
    }
}

use crate::recording::schema::{ActionType, ElementFingerprint};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Task handed to the agent when a recording starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentTask {
    /// Natural-language task text
    pub task: String,
    /// Page to open before the first step
    pub start_url: Option<String>,
    /// Extra system prompt (matched skills)
    pub extend_system_message: Option<String>,
    pub max_steps: u32,
    pub headless: bool,
}

/// The agent's model output for one completed step.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StepObservation {
    pub thinking: Option<String>,
    pub goal: Option<String>,
    pub memory: Option<String>,
    /// Page URL after the step
    pub url: Option<String>,
    pub action: ObservedAction,
}

/// The concrete action the agent executed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObservedAction {
    /// Agent action name, e.g. `input` or `click_element_by_index`
    pub name: String,
    #[serde(default)]
    pub params: Map<String, Value>,
    /// Resolved element for index-based actions
    #[serde(default)]
    pub element: Option<ElementFingerprint>,
}

/// Hook verdict: keep running or stop before the next step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepControl {
    Continue,
    Stop,
}

/// How the agent judged its own run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentRunSummary {
    pub is_successful: bool,
    pub final_result: Option<String>,
}

/// One interactable element on the current page.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CandidateElement {
    pub index: u64,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    #[serde(default)]
    pub x_path: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InstructionKind {
    /// Opening navigation to the test case's start URL
    Preamble,
    /// Recorded step as captured
    Replay,
    /// Recorded step retargeted to a relocated index
    Relocated,
    /// Re-plan request built from the recorded reasoning
    Correction,
}

/// A single instruction issued to the agent during replay.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Instruction {
    pub kind: InstructionKind,
    pub action_type: ActionType,
    pub parameters: Map<String, Value>,
    /// Natural-language rendering of the instruction
    pub prompt: String,
}

/// Result of executing one instruction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StepResult {
    pub success: bool,
    pub error: Option<String>,
    /// Element the action actually landed on, when the agent reports it
    pub target: Option<CandidateElement>,
    pub url: Option<String>,
}

impl StepResult {
    pub fn ok() -> Self {
        Self {
            success: true,
            ..Default::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }

    pub fn with_target(mut self, target: CandidateElement) -> Self {
        self.target = Some(target);
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }
}

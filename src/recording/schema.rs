//! Recorded test case data structures.
//!
//! A [`TestCase`] is the persisted trace of one recording session: an ordered
//! list of [`RecordedAction`]s, each carrying the agent's reasoning at that
//! step and, for element-targeting actions, an [`ElementFingerprint`] captured
//! at record time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Parameter key holding the agent's element index at record time.
pub const INDEX_KEY: &str = "index";

/// Parameter key holding the embedded [`ElementFingerprint`].
pub const ELEMENT_KEY: &str = "_element";

/// Attributes that change with user interaction and say nothing about identity.
const VOLATILE_ATTRIBUTES: &[&str] = &["value", "style", "checked", "aria-expanded"];

/// Snapshot of an interacted element, captured once at record time.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ElementFingerprint {
    /// Attributes present on the element (`id`, `name`, `class`, ...).
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    /// Hierarchical locator, e.g. `html/body/form/span/input`.
    #[serde(default)]
    pub x_path: String,
    /// Tag name as reported by the agent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_name: Option<String>,
    /// Accessible name (button text, label).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ax_name: Option<String>,
}

impl ElementFingerprint {
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    /// Short human-readable description used in prompts and reports.
    pub fn describe(&self) -> Option<String> {
        let mut parts = Vec::new();

        if let Some(node) = self.node_name.as_deref().filter(|n| !n.is_empty()) {
            parts.push(node.to_lowercase());
        }
        for key in ["id", "name", "class", "value", "type"] {
            if let Some(value) = self.attribute(key) {
                parts.push(format!("{}='{}'", key, value));
            }
        }
        if let Some(text) = self.ax_name.as_deref().filter(|t| !t.is_empty()) {
            parts.push(format!("text='{}'", text));
        }
        if !self.x_path.is_empty() {
            parts.push(format!("xpath='{}'", self.x_path));
        }

        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" "))
        }
    }

    /// Whether a live element carries the same identity as this fingerprint.
    ///
    /// Volatile attributes are ignored. A fingerprint without comparable
    /// attributes falls back to the structural path.
    pub fn matches(&self, attributes: &BTreeMap<String, String>, x_path: &str) -> bool {
        let mut comparable = self
            .attributes
            .iter()
            .filter(|(k, _)| !VOLATILE_ATTRIBUTES.contains(&k.as_str()))
            .peekable();

        if comparable.peek().is_none() {
            return self.x_path.is_empty() || x_path.is_empty() || self.x_path == x_path;
        }

        comparable.all(|(k, v)| attributes.get(k) == Some(v))
    }
}

/// Action types a trace can contain.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Navigate,
    Click,
    Type,
    Scroll,
    Wait,
    SendKeys,
    Select,
    Upload,
    Extract,
    GoBack,
    GoForward,
    Refresh,
    /// Agent action with no counterpart above; kept so the trace stays complete.
    Unknown,
}

impl ActionType {
    /// Map an agent action name onto the trace vocabulary.
    pub fn from_agent_action(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "navigate" | "go_to_url" | "open_tab" => ActionType::Navigate,
            "click" | "click_element" | "click_element_by_index" => ActionType::Click,
            "input" | "input_text" | "type" => ActionType::Type,
            "scroll" | "scroll_to_text" | "scroll_down" | "scroll_up" => ActionType::Scroll,
            "wait" => ActionType::Wait,
            "send_keys" => ActionType::SendKeys,
            "select" | "select_option" | "select_dropdown_option" => ActionType::Select,
            "upload" | "upload_file" => ActionType::Upload,
            "extract" | "extract_content" | "done" => ActionType::Extract,
            "go_back" => ActionType::GoBack,
            "go_forward" => ActionType::GoForward,
            "refresh" | "reload" => ActionType::Refresh,
            _ => ActionType::Unknown,
        }
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ActionType::Navigate => "navigate",
            ActionType::Click => "click",
            ActionType::Type => "type",
            ActionType::Scroll => "scroll",
            ActionType::Wait => "wait",
            ActionType::SendKeys => "send_keys",
            ActionType::Select => "select",
            ActionType::Upload => "upload",
            ActionType::Extract => "extract",
            ActionType::GoBack => "go_back",
            ActionType::GoForward => "go_forward",
            ActionType::Refresh => "refresh",
            ActionType::Unknown => "unknown",
        };
        write!(f, "{}", s)
    }
}

/// A single recorded step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecordedAction {
    /// 1-based position in the trace.
    pub step_number: usize,
    pub action_type: ActionType,
    /// Agent-specific sub-label (`input`, `click_element_by_index`, ...).
    pub action_name: String,
    /// Action arguments; element actions carry `index` and `_element`.
    #[serde(default)]
    pub parameters: Map<String, Value>,
    pub timestamp: DateTime<Utc>,
    /// Page URL when the step completed.
    #[serde(default)]
    pub url: Option<String>,
    /// Agent's evaluation of the state at this step.
    #[serde(default)]
    pub thinking: Option<String>,
    /// Agent's stated next-step intent.
    #[serde(default)]
    pub goal: Option<String>,
    /// Agent's running context summary.
    #[serde(default)]
    pub memory: Option<String>,
    #[serde(default)]
    pub element_description: Option<String>,
}

impl RecordedAction {
    /// Element index the agent used at record time.
    pub fn index(&self) -> Option<u64> {
        self.parameters.get(INDEX_KEY).and_then(Value::as_u64)
    }

    /// Fingerprint embedded under `_element`, if this action targeted an element.
    pub fn fingerprint(&self) -> Option<ElementFingerprint> {
        self.parameters
            .get(ELEMENT_KEY)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Parameters without the embedded fingerprint, for prompts.
    pub fn plain_parameters(&self) -> Map<String, Value> {
        self.parameters
            .iter()
            .filter(|(k, _)| k.as_str() != ELEMENT_KEY)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Plain parameters with the element index replaced.
    pub fn retargeted_parameters(&self, index: u64) -> Map<String, Value> {
        let mut params = self.plain_parameters();
        params.insert(INDEX_KEY.to_string(), Value::from(index));
        params
    }
}

/// A complete recorded test case.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TestCase {
    /// Timestamp-derived id, e.g. `20261018_091502_417`.
    pub id: String,
    pub name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub start_url: String,
    #[serde(default)]
    pub actions: Vec<RecordedAction>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub metadata: TestCaseMetadata,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TestCaseMetadata {
    /// Original natural-language task.
    #[serde(default)]
    pub task: String,
    /// Agent's own completion judgment; never true for partial recordings.
    #[serde(default)]
    pub is_successful: bool,
    /// Recording was interrupted before the agent finished.
    #[serde(default)]
    pub partial: bool,
    #[serde(default)]
    pub max_steps: u32,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_result: Option<String>,
    /// Free-form extension fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

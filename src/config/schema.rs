use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// LLM backend handed to the browser agent
    #[serde(default)]
    pub llm: LlmConfig,

    /// Where test cases, failure reports and skills live
    #[serde(default)]
    pub storage: StorageConfig,

    /// Recording defaults
    #[serde(default)]
    pub record: RecordConfig,

    /// Replay and auto-correction policy
    #[serde(default)]
    pub replay: ReplayConfig,
}

impl AppConfig {
    /// Apply `LLM_*` environment overrides on top of the file values.
    pub fn apply_env_overrides(&mut self) {
        self.llm.apply_overrides(|key| std::env::var(key).ok());
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LlmConfig {
    /// Model name passed to the agent runtime
    #[serde(default = "default_model")]
    pub model: String,

    /// API key (optional for local OpenAI-compatible servers)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Base URL of an OpenAI-compatible endpoint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    #[serde(default)]
    pub temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            api_key: None,
            base_url: None,
            temperature: 0.0,
        }
    }
}

impl LlmConfig {
    /// Override fields from a key lookup. `LLM_API_KEY` wins over `OPENAI_API_KEY`.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(model) = non_empty("LLM_MODEL") {
            self.model = model;
        }
        if let Some(key) = non_empty("LLM_API_KEY").or_else(|| non_empty("OPENAI_API_KEY")) {
            self.api_key = Some(key);
        }
        if let Some(url) = non_empty("LLM_BASE_URL") {
            self.base_url = Some(url);
        }
        if let Some(temp) = non_empty("LLM_TEMPERATURE").and_then(|t| t.parse::<f32>().ok()) {
            self.temperature = temp;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_test_cases_dir")]
    pub test_cases_dir: PathBuf,

    #[serde(default = "default_reports_dir")]
    pub reports_dir: PathBuf,

    #[serde(default = "default_skills_dir")]
    pub skills_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            test_cases_dir: default_test_cases_dir(),
            reports_dir: default_reports_dir(),
            skills_dir: default_skills_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordConfig {
    /// Step budget handed to the agent
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,

    #[serde(default)]
    pub headless: bool,

    /// Inject matching local skills into the agent prompt
    #[serde(default = "default_true")]
    pub auto_skills: bool,
}

impl Default for RecordConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            headless: false,
            auto_skills: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReplayConfig {
    #[serde(default = "default_true")]
    pub auto_correct: bool,

    /// Keep replaying later steps after a step ends FAILED
    #[serde(default = "default_true")]
    pub continue_on_failure: bool,

    #[serde(default = "default_one")]
    pub max_relocation_retries: u32,

    #[serde(default = "default_one")]
    pub max_correction_attempts: u32,

    /// Minimum aggregate relocation score for a candidate to be accepted
    #[serde(default = "default_min_confidence_score")]
    pub min_confidence_score: f64,

    /// Top scores closer than this are treated as a tie
    #[serde(default = "default_tie_epsilon")]
    pub tie_epsilon: f64,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            auto_correct: true,
            continue_on_failure: true,
            max_relocation_retries: 1,
            max_correction_attempts: 1,
            min_confidence_score: default_min_confidence_score(),
            tie_epsilon: default_tie_epsilon(),
        }
    }
}

fn retrace_home() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".retrace")
}

fn default_test_cases_dir() -> PathBuf {
    retrace_home().join("test_cases")
}

fn default_reports_dir() -> PathBuf {
    retrace_home().join("replay_reports")
}

fn default_skills_dir() -> PathBuf {
    retrace_home().join("skills")
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_max_steps() -> u32 {
    50
}

fn default_true() -> bool {
    true
}

fn default_one() -> u32 {
    1
}

fn default_min_confidence_score() -> f64 {
    3.0
}

fn default_tie_epsilon() -> f64 {
    0.01
}

use crate::config::schema::{AppConfig, LlmConfig, ReplayConfig};
use crate::error::{Result, RetraceError};

/// Validate everything a record or replay session needs before the agent starts.
pub fn validate_config(config: &AppConfig) -> Result<()> {
    validate_llm(&config.llm)?;
    validate_replay(&config.replay)?;
    Ok(())
}

/// A usable LLM needs a model and either credentials or a local endpoint.
pub fn validate_llm(llm: &LlmConfig) -> Result<()> {
    if llm.model.trim().is_empty() {
        return Err(RetraceError::Config("LLM model cannot be empty".to_string()));
    }

    let has_key = llm.api_key.as_deref().is_some_and(|k| !k.trim().is_empty());
    let is_local = llm.base_url.as_deref().is_some_and(is_local_endpoint);

    if !has_key && !is_local {
        return Err(RetraceError::Config(
            "No LLM credentials: set LLM_API_KEY (or OPENAI_API_KEY), or point LLM_BASE_URL at a local endpoint"
                .to_string(),
        ));
    }

    if let Some(url) = &llm.base_url {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(RetraceError::Config(format!(
                "Invalid LLM base URL: {}. Must start with http:// or https://",
                url
            )));
        }
    }

    if !(0.0..=2.0).contains(&llm.temperature) {
        return Err(RetraceError::Config(format!(
            "LLM temperature {} out of range 0.0..=2.0",
            llm.temperature
        )));
    }

    Ok(())
}

/// Upper bound on relocation retries and corrections per step.
pub const MAX_ATTEMPTS_PER_STEP: u32 = 5;

pub fn validate_replay(replay: &ReplayConfig) -> Result<()> {
    for (name, value) in [
        ("max_relocation_retries", replay.max_relocation_retries),
        ("max_correction_attempts", replay.max_correction_attempts),
    ] {
        if value > MAX_ATTEMPTS_PER_STEP {
            return Err(RetraceError::Config(format!(
                "{} must be at most {}, got {}",
                name, MAX_ATTEMPTS_PER_STEP, value
            )));
        }
    }

    if !replay.min_confidence_score.is_finite() || replay.min_confidence_score <= 0.0 {
        return Err(RetraceError::Config(format!(
            "min_confidence_score must be positive, got {}",
            replay.min_confidence_score
        )));
    }

    if !replay.tie_epsilon.is_finite() || replay.tie_epsilon < 0.0 {
        return Err(RetraceError::Config(format!(
            "tie_epsilon must be non-negative, got {}",
            replay.tie_epsilon
        )));
    }

    Ok(())
}

fn is_local_endpoint(url: &str) -> bool {
    let rest = url
        .strip_prefix("http://")
        .or_else(|| url.strip_prefix("https://"))
        .unwrap_or(url);
    let host = rest.split(['/', ':']).next().unwrap_or("");
    matches!(host, "localhost" | "127.0.0.1" | "0.0.0.0")
}

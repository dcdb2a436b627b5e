//! Instruction rendering for replay, relocation retries and corrections.

use crate::agent::{Instruction, InstructionKind};
use crate::recording::schema::{ActionType, RecordedAction};
use serde_json::{Map, Value};

fn param_str(params: &Map<String, Value>, key: &str) -> Option<String> {
    params.get(key).map(|v| match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    })
}

/// Human-readable description of a recorded step.
pub fn describe_action(action: &RecordedAction, with_goal: bool) -> String {
    let params = &action.parameters;
    let element = action.element_description.as_deref();

    let mut desc = match action.action_type {
        ActionType::Navigate => format!("Navigate to {}", param_str(params, "url").unwrap_or_default()),
        ActionType::Click => match (element, action.index()) {
            (Some(el), _) => format!("Click the element matching description: {}", el),
            (None, Some(index)) => format!("Click on element (index {})", index),
            (None, None) => "Click on element".to_string(),
        },
        ActionType::Type => {
            let text = param_str(params, "text").unwrap_or_default();
            match element {
                Some(el) => format!("Type '{}' into the element matching description: {}", text, el),
                None => format!("Type '{}' into input field", text),
            }
        }
        ActionType::Scroll => match param_str(params, "text") {
            Some(text) => format!("Scroll to text '{}'", text),
            None => format!(
                "Scroll {}",
                param_str(params, "direction").unwrap_or_else(|| "down".to_string())
            ),
        },
        ActionType::SendKeys => format!("Send keys: {}", param_str(params, "keys").unwrap_or_default()),
        ActionType::Select => {
            let option = param_str(params, "option")
                .or_else(|| param_str(params, "text"))
                .or_else(|| param_str(params, "value"))
                .unwrap_or_default();
            match element {
                Some(el) => format!("Select option '{}' in the element matching description: {}", option, el),
                None => format!("Select option '{}'", option),
            }
        }
        ActionType::Upload => {
            let path = param_str(params, "path").unwrap_or_default();
            match element {
                Some(el) => format!("Upload '{}' using the element matching description: {}", path, el),
                None => format!("Upload '{}'", path),
            }
        }
        ActionType::Wait => format!(
            "Wait for {} seconds",
            param_str(params, "seconds").unwrap_or_else(|| "1".to_string())
        ),
        ActionType::Extract => "Extract/verify content".to_string(),
        ActionType::GoBack => "Go back".to_string(),
        ActionType::GoForward => "Go forward".to_string(),
        ActionType::Refresh => "Refresh the page".to_string(),
        ActionType::Unknown => format!(
            "{}: {}",
            action.action_name,
            Value::Object(action.plain_parameters())
        ),
    };

    if with_goal {
        if let Some(goal) = action.goal.as_deref().filter(|g| !g.is_empty()) {
            desc.push_str(&format!(" (Goal: {})", goal));
        }
    }

    desc
}

/// Replay a recorded step as captured.
pub fn replay_instruction(action: &RecordedAction) -> Instruction {
    Instruction {
        kind: InstructionKind::Replay,
        action_type: action.action_type,
        parameters: action.plain_parameters(),
        prompt: describe_action(action, true),
    }
}

/// Replay a recorded step against a relocated element index.
pub fn retargeted_instruction(action: &RecordedAction, index: u64) -> Instruction {
    Instruction {
        kind: InstructionKind::Relocated,
        action_type: action.action_type,
        parameters: action.retargeted_parameters(index),
        prompt: format!(
            "{} The element now has index {}.",
            describe_action(action, true),
            index
        ),
    }
}

/// Opening navigation to the test case's start URL.
pub fn navigate_instruction(url: &str) -> Instruction {
    let mut parameters = Map::new();
    parameters.insert("url".to_string(), Value::from(url));
    Instruction {
        kind: InstructionKind::Preamble,
        action_type: ActionType::Navigate,
        parameters,
        prompt: format!("Navigate to {}", url),
    }
}

/// Ask the agent to re-plan one failed step from the recorded reasoning.
pub fn correction_instruction(
    action: &RecordedAction,
    error: &str,
    current_url: Option<&str>,
) -> Instruction {
    let params = Value::Object(action.plain_parameters());

    let prompt = format!(
        "The previous action failed. Complete the same goal with an alternative approach, \
then stop. Do not continue to other steps.

FAILED ACTION:
- Type: {action_type}
- Name: {name}
- Original Parameters: {params}
- Element Description: {element}

ORIGINAL GOAL: {goal}

ORIGINAL THINKING: {thinking}

ERROR: {error}

CURRENT URL: {url}

INSTRUCTIONS:
1. The element position may have changed but the functionality should be the same
2. Find the element by text content or label, id or name attribute, class name, \
xpath pattern, or position relative to other elements
3. For a click, click the equivalent button or link
4. For an input, fill the equivalent input field
5. Report whether the correction succeeded",
        action_type = action.action_type,
        name = action.action_name,
        params = params,
        element = action.element_description.as_deref().unwrap_or("N/A"),
        goal = action.goal.as_deref().unwrap_or("Complete the action"),
        thinking = action.thinking.as_deref().unwrap_or("N/A"),
        error = error,
        url = current_url.unwrap_or("unknown"),
    );

    Instruction {
        kind: InstructionKind::Correction,
        action_type: action.action_type,
        parameters: action.plain_parameters(),
        prompt,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::schema::ELEMENT_KEY;
    use chrono::Utc;
    use serde_json::json;

    fn action(action_type: ActionType, params: Value, element: Option<&str>) -> RecordedAction {
        RecordedAction {
            step_number: 1,
            action_type,
            action_name: action_type.to_string(),
            parameters: params.as_object().cloned().unwrap_or_default(),
            timestamp: Utc::now(),
            url: None,
            thinking: Some("The search box is visible".to_string()),
            goal: Some("Search for ai skills".to_string()),
            memory: None,
            element_description: element.map(str::to_string),
        }
    }

    #[test]
    fn test_describe_type_with_element() {
        let a = action(
            ActionType::Type,
            json!({"index": 4, "text": "ai skills"}),
            Some("input id='kw'"),
        );
        assert_eq!(
            describe_action(&a, false),
            "Type 'ai skills' into the element matching description: input id='kw'"
        );
        assert!(describe_action(&a, true).ends_with("(Goal: Search for ai skills)"));
    }

    #[test]
    fn test_describe_click_variants() {
        let with_el = action(ActionType::Click, json!({"index": 3}), Some("button id='su'"));
        assert_eq!(
            describe_action(&with_el, false),
            "Click the element matching description: button id='su'"
        );
        let by_index = action(ActionType::Click, json!({"index": 3}), None);
        assert_eq!(describe_action(&by_index, false), "Click on element (index 3)");
    }

    #[test]
    fn test_replay_instruction_strips_fingerprint() {
        let a = action(
            ActionType::Click,
            json!({"index": 3, "_element": {"attributes": {"id": "su"}, "x_path": "a"}}),
            Some("button id='su'"),
        );
        let instruction = replay_instruction(&a);
        assert_eq!(instruction.kind, InstructionKind::Replay);
        assert!(!instruction.parameters.contains_key(ELEMENT_KEY));

        let retargeted = retargeted_instruction(&a, 7);
        assert_eq!(retargeted.kind, InstructionKind::Relocated);
        assert_eq!(retargeted.parameters.get("index"), Some(&json!(7)));
    }

    #[test]
    fn test_correction_carries_reasoning() {
        let a = action(ActionType::Click, json!({"index": 3}), Some("button id='su'"));
        let instruction = correction_instruction(&a, "element not found", Some("https://www.baidu.com"));
        assert_eq!(instruction.kind, InstructionKind::Correction);
        assert!(instruction.prompt.contains("ORIGINAL GOAL: Search for ai skills"));
        assert!(instruction.prompt.contains("ORIGINAL THINKING: The search box is visible"));
        assert!(instruction.prompt.contains("ERROR: element not found"));
        assert!(instruction.prompt.contains("CURRENT URL: https://www.baidu.com"));
        assert!(instruction.prompt.contains("Element Description: button id='su'"));
    }

    #[test]
    fn test_navigate_instruction() {
        let instruction = navigate_instruction("https://example.com");
        assert_eq!(instruction.kind, InstructionKind::Preamble);
        assert_eq!(instruction.action_type, ActionType::Navigate);
        assert_eq!(instruction.parameters.get("url"), Some(&json!("https://example.com")));
    }
}

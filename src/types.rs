use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::InvalidAction;

/// The closed set of primitive operations an action can perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    Click,
    Type,
    Select,
    Wait,
    Scroll,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::Click => "click",
            ActionType::Type => "type",
            ActionType::Select => "select",
            ActionType::Wait => "wait",
            ActionType::Scroll => "scroll",
        }
    }

    /// Whether the action needs a `value` to be dispatched.
    pub fn requires_value(&self) -> bool {
        matches!(self, ActionType::Type | ActionType::Select)
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single atomic step the planner asks the agent to perform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrowserAction {
    pub action_type: ActionType,
    pub selector: String,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub description: String,
}

impl BrowserAction {
    pub fn new(action_type: ActionType, selector: impl Into<String>) -> Self {
        Self {
            action_type,
            selector: selector.into(),
            value: None,
            description: String::new(),
        }
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Checks the dispatch invariant: non-empty selector, and a value for
    /// type/select actions.
    pub fn validate(&self) -> Result<(), InvalidAction> {
        if self.selector.trim().is_empty() {
            return Err(InvalidAction::EmptySelector);
        }
        if self.action_type.requires_value() && self.value.is_none() {
            return Err(InvalidAction::MissingValue(self.action_type));
        }
        Ok(())
    }
}

/// A clickable element found on the page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractiveElement {
    pub tag: String,
    pub id: String,
    pub text: String,
    pub selector: String,
}

/// An input, textarea or select found on the page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormField {
    #[serde(rename = "type")]
    pub field_type: String,
    pub id: String,
    pub name: String,
    pub placeholder: String,
    pub selector: String,
}

/// Structured snapshot of the page at one point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserState {
    pub current_url: String,
    pub page_title: String,
    pub page_source: String,
    pub interactive_elements: Vec<InteractiveElement>,
    pub visible_text_content: String,
    pub form_fields: Vec<FormField>,
}

impl BrowserState {
    /// Renders the snapshot for inclusion in a prompt. Only the first
    /// `text_limit` characters of visible text are kept.
    pub fn format_for_prompt(&self, text_limit: usize) -> String {
        let elements = serde_json::to_string_pretty(&self.interactive_elements)
            .unwrap_or_else(|_| "[]".to_string());
        let fields =
            serde_json::to_string_pretty(&self.form_fields).unwrap_or_else(|_| "[]".to_string());
        let text: String = self.visible_text_content.chars().take(text_limit).collect();

        format!(
            "Current Page State:\n- URL: {}\n- Title: {}\n- Available Interactive Elements:\n{}\n- Available Form Fields:\n{}\n- Visible Text Content:\n{}\n",
            self.current_url, self.page_title, elements, fields, text
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationType {
    Visibility,
    Value,
    StateChange,
}

/// How to confirm that an action actually took effect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationCheck {
    pub validation_type: ValidationType,
    pub selector: String,
    #[serde(default)]
    pub expected_value: Option<String>,
}

pub const DEFAULT_MAX_STEPS: usize = 10;
pub const VISIBLE_TEXT_PROMPT_CHARS: usize = 500;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_round_trips_wire_names() {
        let action: BrowserAction = serde_json::from_str(
            r##"{"action_type":"type","selector":"#q","value":"rust","description":"search"}"##,
        )
        .unwrap();
        assert_eq!(action.action_type, ActionType::Type);
        assert_eq!(action.value.as_deref(), Some("rust"));
        assert!(action.validate().is_ok());
    }

    #[test]
    fn unknown_action_type_is_rejected() {
        let parsed = serde_json::from_str::<BrowserAction>(
            r#"{"action_type":"hover","selector":"a","description":""}"#,
        );
        assert!(parsed.is_err());
    }

    #[test]
    fn type_without_value_is_invalid() {
        let action = BrowserAction::new(ActionType::Type, "#q");
        assert_eq!(
            action.validate(),
            Err(InvalidAction::MissingValue(ActionType::Type))
        );
        let blank = BrowserAction::new(ActionType::Click, "  ");
        assert_eq!(blank.validate(), Err(InvalidAction::EmptySelector));
    }

    #[test]
    fn validation_check_parses_snake_case() {
        let check: ValidationCheck = serde_json::from_str(
            r#"{"validation_type":"state_change","selector":".result"}"#,
        )
        .unwrap();
        assert_eq!(check.validation_type, ValidationType::StateChange);
        assert!(check.expected_value.is_none());
    }

    #[test]
    fn prompt_truncates_visible_text() {
        let state = BrowserState {
            current_url: "https://example.com".into(),
            page_title: "Example".into(),
            page_source: String::new(),
            interactive_elements: vec![],
            visible_text_content: "abcdefghij".into(),
            form_fields: vec![],
        };
        let rendered = state.format_for_prompt(4);
        assert!(rendered.contains("- URL: https://example.com"));
        assert!(rendered.contains("abcd\n"));
        assert!(!rendered.contains("abcde"));
    }
}

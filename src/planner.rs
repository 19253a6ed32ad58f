use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::AgentConfig;
use crate::error::PlanningError;
use crate::json;
use crate::llm::{CompletionRequest, LanguageModel};
use crate::types::{BrowserAction, BrowserState};

const PLANNER_INSTRUCTIONS: &str = r#"You are a web automation expert. Given the current state of a webpage and a user's intent,
determine the SINGLE NEXT action to take. Generate specific, executable browser actions.

Available action types:
- click: Click on an element
- type: Input text into a field
- select: Choose an option from a dropdown
- wait: Wait for an element to appear
- scroll: Scroll to an element

When generating selectors, use proper CSS selectors:
- By ID: '#elementId'
- By class: '.className'
- By attribute: '[data-testid="example"]'
- By text content: 'a:contains("Link Text")'
- Nested elements: '.parent .child'
Do not use text-based attribute selectors like 'a[text="example"]'."#;

const PLANNER_RESPONSE_FORMAT: &str = r#"Generate a single next action as a JSON object with these fields:
- action_type: one of click, type, select, wait, scroll
- selector: the CSS selector of the target element
- value: the text to enter or option to choose (required for type and select)
- description: what this action does

Respond ONLY with the JSON object for the next action."#;

/// Asks the language model for exactly one next action.
pub struct Planner {
    model: Arc<dyn LanguageModel>,
    config: AgentConfig,
}

impl Planner {
    pub fn new(model: Arc<dyn LanguageModel>, config: AgentConfig) -> Self {
        Self { model, config }
    }

    pub fn build_prompt(
        &self,
        state: &BrowserState,
        intent: &str,
        history: &[BrowserAction],
    ) -> String {
        let mut prompt = String::from(PLANNER_INSTRUCTIONS);
        prompt.push_str("\n\n");
        prompt.push_str(&state.format_for_prompt(self.config.visible_text_chars));

        if !history.is_empty() {
            prompt.push_str("\nPrevious actions taken:\n");
            prompt.push_str(&format_history(history));
        }

        prompt.push_str(&format!("\nUser's Intent: {}\n\n", intent));
        prompt.push_str(PLANNER_RESPONSE_FORMAT);
        prompt
    }

    pub async fn get_next_action(
        &self,
        state: &BrowserState,
        intent: &str,
        history: &[BrowserAction],
    ) -> Result<BrowserAction, PlanningError> {
        let request = CompletionRequest::new(
            self.build_prompt(state, intent, history),
            self.config.model.clone(),
            self.config.planner_max_tokens,
        );

        let response = self
            .model
            .complete(&request)
            .await
            .map_err(PlanningError::Model)?;
        debug!(response = %response, "Planner response");

        parse_action(&response)
    }
}

/// Terse `- <type> on <selector>` list, oldest first.
pub fn format_history(history: &[BrowserAction]) -> String {
    history
        .iter()
        .map(|action| format!("- {} on {}\n", action.action_type, action.selector))
        .collect()
}

/// Interprets a model response as a single well-formed action.
pub fn parse_action(response: &str) -> Result<BrowserAction, PlanningError> {
    json::extract_with(response, |action: &BrowserAction| action.validate().is_ok()).ok_or_else(
        || {
            warn!(response = %response, "Could not parse an action from planner response");
            PlanningError::Unparseable {
                response: response.to_string(),
            }
        },
    )
}

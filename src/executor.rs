use std::sync::{Arc, LazyLock};

use regex::Regex;
use tracing::{debug, info, warn};

use crate::config::AgentConfig;
use crate::driver::BrowserDriver;
use crate::error::ActionFailure;
use crate::json;
use crate::llm::{CompletionRequest, LanguageModel};
use crate::types::{ActionType, BrowserAction, ValidationCheck, ValidationType};

/// The last compound segment of a selector ending in `:contains(...)`, e.g.
/// `a:contains('x')`, `nav a.link:contains("x")` or `button[type='submit']:contains(x)`.
static CONTAINS_SEGMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?P<tag>[A-Za-z][\w-]*)?(?:[.#\[][^\s>+~:]*)*:contains\(\s*(?:'(?P<single>.*)'|"(?P<double>.*)"|(?P<bare>[^)]*?))\s*\)\s*$"#,
    )
    .unwrap()
});

const XPATH_UPPER: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const XPATH_LOWER: &str = "abcdefghijklmnopqrstuvwxyz";

const VALIDATION_INSTRUCTIONS: &str = r#"Generate a SINGLE validation check to verify the action succeeded.
The validation must use proper CSS selectors.
Respond only with a JSON object containing:
- validation_type: "visibility" | "value" | "state_change"
- selector: The CSS selector to check
- expected_value: The expected value or state (if applicable)"#;

/// Resolves, dispatches and validates one action against a driver.
pub struct Executor {
    model: Arc<dyn LanguageModel>,
    config: AgentConfig,
}

impl Executor {
    pub fn new(model: Arc<dyn LanguageModel>, config: AgentConfig) -> Self {
        Self { model, config }
    }

    /// Runs the action. `action.selector` is replaced when a fallback
    /// selector is what resolved the element. Failures are returned, never
    /// raised.
    pub async fn execute_action(
        &self,
        action: &mut BrowserAction,
        driver: &dyn BrowserDriver,
    ) -> Result<(), ActionFailure> {
        action.validate()?;

        self.resolve_target(action, driver).await?;

        if !self.dispatch(action, driver).await {
            warn!(action = %action.action_type, selector = %action.selector, "Dispatch failed");
            return Err(ActionFailure::Dispatch {
                action_type: action.action_type,
                selector: action.selector.clone(),
            });
        }

        self.validate_effect(action, driver).await
    }

    async fn resolve_target(
        &self,
        action: &mut BrowserAction,
        driver: &dyn BrowserDriver,
    ) -> Result<(), ActionFailure> {
        if driver
            .wait_for_element(&action.selector, self.config.element_timeout)
            .await
        {
            return Ok(());
        }

        let alternatives = fallback_selectors(&action.selector);
        debug!(
            selector = %action.selector,
            alternatives = alternatives.len(),
            "Primary selector timed out"
        );

        for alternative in &alternatives {
            if driver
                .wait_for_element(alternative, self.config.fallback_timeout)
                .await
            {
                info!(from = %action.selector, to = %alternative, "Resolved with fallback selector");
                action.selector = alternative.clone();
                return Ok(());
            }
        }

        warn!(selector = %action.selector, "Element not found");
        Err(ActionFailure::ElementNotFound {
            selector: action.selector.clone(),
            attempts: alternatives.len() + 1,
        })
    }

    async fn dispatch(&self, action: &BrowserAction, driver: &dyn BrowserDriver) -> bool {
        let selector = action.selector.as_str();
        let value = action.value.as_deref().unwrap_or_default();

        match action.action_type {
            ActionType::Click => driver.click_element(selector).await,
            ActionType::Type => driver.input_text(selector, value).await,
            ActionType::Select => driver.select_option(selector, value).await,
            ActionType::Wait => {
                driver
                    .wait_for_element(selector, self.config.element_timeout)
                    .await
            }
            ActionType::Scroll => driver.scroll_to_element(selector).await,
        }
    }

    async fn validate_effect(
        &self,
        action: &BrowserAction,
        driver: &dyn BrowserDriver,
    ) -> Result<(), ActionFailure> {
        let action_json =
            serde_json::to_string_pretty(action).unwrap_or_else(|_| format!("{:?}", action));
        let request = CompletionRequest::new(
            format!(
                "Given this browser action:\n{}\n\n{}",
                action_json, VALIDATION_INSTRUCTIONS
            ),
            self.config.model.clone(),
            self.config.validation_max_tokens,
        );

        let response = self.model.complete(&request).await.map_err(|e| {
            warn!(error = %e, "Validation request failed");
            ActionFailure::Validation(format!("model request failed: {:#}", e))
        })?;

        let check: ValidationCheck = json::extract_with(&response, |c: &ValidationCheck| {
            !c.selector.trim().is_empty()
        })
        .ok_or_else(|| {
            warn!(response = %response, "Unparseable validation check");
            ActionFailure::Validation(format!("unparseable validation check: {}", response))
        })?;

        debug!(?check, "Running validation check");
        self.run_check(&check, driver).await
    }

    async fn run_check(
        &self,
        check: &ValidationCheck,
        driver: &dyn BrowserDriver,
    ) -> Result<(), ActionFailure> {
        let selector = check.selector.as_str();

        match check.validation_type {
            ValidationType::Visibility => self.expect_visible(selector, driver).await,
            ValidationType::Value => {
                let expected = check.expected_value.as_deref().ok_or_else(|| {
                    ActionFailure::Validation(format!(
                        "value check on {} has no expected_value",
                        selector
                    ))
                })?;
                let actual = driver.get_element_value(selector).await.map_err(|e| {
                    ActionFailure::Validation(format!("could not read {}: {:#}", selector, e))
                })?;
                if actual == expected {
                    Ok(())
                } else {
                    warn!(%selector, %actual, %expected, "Value check failed");
                    Err(ActionFailure::Validation(format!(
                        "{} has value {:?}, expected {:?}",
                        selector, actual, expected
                    )))
                }
            }
            ValidationType::StateChange => {
                tokio::time::sleep(self.config.state_change_delay).await;
                self.expect_visible(selector, driver).await
            }
        }
    }

    async fn expect_visible(
        &self,
        selector: &str,
        driver: &dyn BrowserDriver,
    ) -> Result<(), ActionFailure> {
        if driver
            .is_element_visible(selector, self.config.visibility_timeout)
            .await
        {
            Ok(())
        } else {
            warn!(%selector, "Visibility check failed");
            Err(ActionFailure::Validation(format!("{} is not visible", selector)))
        }
    }
}

/// Alternative selectors for a text-containment selector, in the order they
/// should be tried: href substring (lower-case, then upper-case), then XPath
/// text matches ignoring case. Empty for any other selector.
pub fn fallback_selectors(selector: &str) -> Vec<String> {
    let Some((tag, text)) = parse_contains(selector) else {
        return Vec::new();
    };
    if text.is_empty() {
        return Vec::new();
    }

    let lower = text.to_lowercase();
    let upper = text.to_uppercase();
    let literal = xpath_literal(&lower);
    let text_match = format!(
        "[contains(translate(normalize-space(.), '{}', '{}'), {})]",
        XPATH_UPPER, XPATH_LOWER, literal
    );

    let mut selectors = vec![
        format!("a[href*='{}']", css_quote(&lower)),
        format!("a[href*='{}']", css_quote(&upper)),
        format!("//{}{}", tag, text_match),
    ];
    if tag != "a" {
        selectors.push(format!("//a{}", text_match));
    }
    selectors.dedup();
    selectors
}

/// Splits the `tag...:contains('text')` segment into its tag (default `a`)
/// and unescaped text. Ancestor segments and qualifiers are dropped.
fn parse_contains(selector: &str) -> Option<(String, String)> {
    let caps = CONTAINS_SEGMENT.captures(selector)?;
    let tag = caps
        .name("tag")
        .map(|m| m.as_str().to_lowercase())
        .unwrap_or_else(|| "a".to_string());
    let text = caps
        .name("single")
        .or_else(|| caps.name("double"))
        .or_else(|| caps.name("bare"))
        .map(|m| m.as_str().replace("\\'", "'").replace("\\\"", "\"").replace("\\\\", "\\"))?;
    Some((tag, text.trim().to_string()))
}

fn css_quote(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Quotes a string as an XPath 1.0 literal.
fn xpath_literal(value: &str) -> String {
    if !value.contains('\'') {
        format!("'{}'", value)
    } else if !value.contains('"') {
        format!("\"{}\"", value)
    } else {
        let parts: Vec<String> = value.split('\'').map(|p| format!("'{}'", p)).collect();
        format!("concat({})", parts.join(", \"'\", "))
    }
}

#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::{Result, bail};
use async_trait::async_trait;
use intent_agent::{AgentConfig, BrowserDriver, CompletionRequest, LanguageModel};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Call {
    Plan,
    Validate,
    IntentCheck,
    Analyze,
}

/// Deterministic stand-in for the language model. Planner calls pop the next
/// scripted reply; validation calls get a fixed reply; the intent check
/// answers `true` once the prompt contains `satisfied_marker`.
pub struct ScriptedModel {
    plans: Mutex<VecDeque<String>>,
    validation: String,
    analysis: String,
    satisfied_marker: Option<String>,
    intent_check_down: bool,
    pub calls: Mutex<Vec<(Call, CompletionRequest)>>,
}

impl ScriptedModel {
    pub fn new(plans: &[&str]) -> Self {
        Self {
            plans: Mutex::new(plans.iter().map(|p| p.to_string()).collect()),
            validation: r#"{"validation_type":"visibility","selector":"body"}"#.to_string(),
            analysis: "A checkout page.".to_string(),
            satisfied_marker: None,
            intent_check_down: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn validation(mut self, reply: &str) -> Self {
        self.validation = reply.to_string();
        self
    }

    pub fn analysis(mut self, reply: &str) -> Self {
        self.analysis = reply.to_string();
        self
    }

    /// Intent-check calls fail as if the provider were unreachable.
    pub fn failing_intent_check(mut self) -> Self {
        self.intent_check_down = true;
        self
    }

    pub fn satisfied_when(mut self, marker: &str) -> Self {
        self.satisfied_marker = Some(marker.to_string());
        self
    }

    pub fn count(&self, kind: Call) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, _)| *k == kind)
            .count()
    }

    pub fn prompts(&self, kind: Call) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, r)| r.prompt.clone())
            .collect()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let kind = if request.prompt.starts_with("Analyze this webpage") {
            Call::Analyze
        } else if request.prompt.contains("SINGLE NEXT action") {
            Call::Plan
        } else if request.prompt.contains("validation check") {
            Call::Validate
        } else {
            Call::IntentCheck
        };
        self.calls.lock().unwrap().push((kind, request.clone()));

        let reply = match kind {
            Call::Plan => self
                .plans
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| "I have no further ideas.".to_string()),
            Call::Validate => self.validation.clone(),
            Call::Analyze => self.analysis.clone(),
            Call::IntentCheck if self.intent_check_down => bail!("connection reset by peer"),
            Call::IntentCheck => {
                let satisfied = self
                    .satisfied_marker
                    .as_ref()
                    .is_some_and(|marker| request.prompt.contains(marker.as_str()));
                if satisfied { " True\n" } else { "false" }.to_string()
            }
        };
        Ok(reply)
    }
}

/// In-memory page. Selectors in `present` always resolve; `#confirmation`
/// appears once `confirm_after` actions have been dispatched.
pub struct FakeDriver {
    present: Mutex<HashSet<String>>,
    confirm_after: Option<usize>,
    fail_dispatch: bool,
    fail_source: bool,
    pub dispatched: Mutex<Vec<(String, String)>>,
    pub waits: Mutex<Vec<String>>,
    pub values: Mutex<HashMap<String, String>>,
    pub source_reads: AtomicUsize,
}

impl FakeDriver {
    pub fn new(present: &[&str]) -> Self {
        Self {
            present: Mutex::new(present.iter().map(|s| s.to_string()).collect()),
            confirm_after: None,
            fail_dispatch: false,
            fail_source: false,
            dispatched: Mutex::new(Vec::new()),
            waits: Mutex::new(Vec::new()),
            values: Mutex::new(HashMap::new()),
            source_reads: AtomicUsize::new(0),
        }
    }

    pub fn confirm_after(mut self, actions: usize) -> Self {
        self.confirm_after = Some(actions);
        self
    }

    pub fn failing_dispatch(mut self) -> Self {
        self.fail_dispatch = true;
        self
    }

    /// Page source reads fail, so no snapshot can be captured.
    pub fn failing_source(mut self) -> Self {
        self.fail_source = true;
        self
    }

    pub fn dispatch_count(&self) -> usize {
        self.dispatched.lock().unwrap().len()
    }

    fn confirmed(&self) -> bool {
        self.confirm_after
            .is_some_and(|n| self.dispatch_count() >= n)
    }

    fn resolves(&self, selector: &str) -> bool {
        selector == "body"
            || self.present.lock().unwrap().contains(selector)
            || (selector == "#confirmation" && self.confirmed())
    }

    fn record(&self, op: &str, selector: &str) -> bool {
        if self.fail_dispatch || !self.resolves(selector) {
            return false;
        }
        self.dispatched
            .lock()
            .unwrap()
            .push((op.to_string(), selector.to_string()));
        true
    }
}

#[async_trait]
impl BrowserDriver for FakeDriver {
    async fn current_url(&self) -> Result<String> {
        Ok("https://shop.test/checkout".to_string())
    }

    async fn get_title(&self) -> Result<String> {
        Ok("Checkout".to_string())
    }

    async fn get_page_source(&self) -> Result<String> {
        self.source_reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_source {
            bail!("target closed");
        }
        let confirmation = if self.confirmed() {
            r#"<p id="confirmation">Order confirmed</p>"#
        } else {
            ""
        };
        Ok(format!(
            r#"<html><body>
<input id="email" placeholder="Email">
<select name="shipping"><option>standard</option><option>express</option></select>
<button id="place-order">Place order</button>
{}
</body></html>"#,
            confirmation
        ))
    }

    async fn click_element(&self, selector: &str) -> bool {
        self.record("click", selector)
    }

    async fn input_text(&self, selector: &str, value: &str) -> bool {
        let ok = self.record("type", selector);
        if ok {
            self.values
                .lock()
                .unwrap()
                .insert(selector.to_string(), value.to_string());
        }
        ok
    }

    async fn select_option(&self, selector: &str, value: &str) -> bool {
        let ok = self.record("select", selector);
        if ok {
            self.values
                .lock()
                .unwrap()
                .insert(selector.to_string(), value.to_string());
        }
        ok
    }

    async fn wait_for_element(&self, selector: &str, _timeout: Duration) -> bool {
        self.waits.lock().unwrap().push(selector.to_string());
        self.resolves(selector)
    }

    async fn scroll_to_element(&self, selector: &str) -> bool {
        self.record("scroll", selector)
    }

    async fn is_element_visible(&self, selector: &str, _timeout: Duration) -> bool {
        self.resolves(selector)
    }

    async fn get_element_value(&self, selector: &str) -> Result<String> {
        Ok(self
            .values
            .lock()
            .unwrap()
            .get(selector)
            .cloned()
            .unwrap_or_default())
    }
}

pub fn test_config() -> AgentConfig {
    AgentConfig {
        state_change_delay: Duration::ZERO,
        ..AgentConfig::default()
    }
}

pub const TYPE_EMAIL: &str = r##"{"action_type":"type","selector":"#email","value":"a@b.test","description":"enter email"}"##;
pub const SELECT_SHIPPING: &str = r##"Next I will pick shipping: {"action_type":"select","selector":"[name='shipping']","value":"express","description":"choose express"}"##;
pub const CLICK_ORDER: &str = r##"```json
{"action_type":"click","selector":"#place-order","description":"place the order"}
```"##;

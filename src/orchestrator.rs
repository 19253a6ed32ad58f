use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::config::{AgentConfig, IntentCheckSnapshot};
use crate::dom::capture_state;
use crate::driver::BrowserDriver;
use crate::events::AgentEvent;
use crate::executor::Executor;
use crate::llm::{CompletionRequest, LanguageModel};
use crate::planner::Planner;
use crate::types::{BrowserAction, BrowserState};

/// Where a run currently is. `Done` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Planning,
    Executing,
    CheckingIntent,
    Done,
    Failed,
}

/// Drives plan, execute and intent-check until the intent is satisfied or
/// the step budget runs out.
///
/// One orchestrator owns one action history. Run concurrent intents with
/// separate orchestrators over separate sessions.
pub struct Orchestrator {
    model: Arc<dyn LanguageModel>,
    planner: Planner,
    executor: Executor,
    config: AgentConfig,
    history: Vec<BrowserAction>,
    state: LoopState,
    last_failure: Option<String>,
    events: Option<broadcast::Sender<AgentEvent>>,
}

impl Orchestrator {
    pub fn new(model: Arc<dyn LanguageModel>, config: AgentConfig) -> Self {
        Self {
            planner: Planner::new(model.clone(), config.clone()),
            executor: Executor::new(model.clone(), config.clone()),
            model,
            config,
            history: Vec::new(),
            state: LoopState::Planning,
            last_failure: None,
            events: None,
        }
    }

    pub fn with_events(mut self, events: broadcast::Sender<AgentEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Actions executed successfully by the most recent run, oldest first.
    pub fn history(&self) -> &[BrowserAction] {
        &self.history
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Why the most recent run failed, if it did.
    pub fn last_failure(&self) -> Option<&str> {
        self.last_failure.as_deref()
    }

    /// Runs at most `max_steps` plan/execute cycles. Returns `true` only if
    /// the intent check confirmed the intent; any step failure ends the run.
    pub async fn execute_intent(
        &mut self,
        driver: &dyn BrowserDriver,
        intent: &str,
        max_steps: usize,
    ) -> bool {
        self.history.clear();
        self.last_failure = None;
        self.state = LoopState::Planning;
        info!(%intent, max_steps, "Starting intent run");

        for step in 1..=max_steps {
            self.state = LoopState::Planning;
            self.emit(AgentEvent::Thinking { step });

            let snapshot = match capture_state(driver).await {
                Ok(snapshot) => snapshot,
                Err(e) => return self.fail(format!("step {}: {}", step, e)),
            };

            let mut action = match self
                .planner
                .get_next_action(&snapshot, intent, &self.history)
                .await
            {
                Ok(action) => action,
                Err(e) => return self.fail(format!("step {}: planning failed: {}", step, e)),
            };
            info!(
                step,
                action = %action.action_type,
                selector = %action.selector,
                description = %action.description,
                "Planned action"
            );

            self.state = LoopState::Executing;
            if let Err(failure) = self.executor.execute_action(&mut action, driver).await {
                self.emit(AgentEvent::StepError {
                    number: step,
                    message: failure.to_string(),
                });
                return self.fail(format!("step {}: {}", step, failure));
            }
            self.history.push(action.clone());
            self.emit(AgentEvent::Step {
                number: step,
                action,
            });

            self.state = LoopState::CheckingIntent;
            let check_state = match self.config.intent_check_snapshot {
                IntentCheckSnapshot::PreAction => snapshot,
                IntentCheckSnapshot::PostAction => match capture_state(driver).await {
                    Ok(fresh) => fresh,
                    Err(e) => return self.fail(format!("step {}: {}", step, e)),
                },
            };

            match self.check_intent_satisfied(intent, &check_state).await {
                Ok(true) => {
                    self.state = LoopState::Done;
                    info!(steps = self.history.len(), "Intent satisfied");
                    self.emit(AgentEvent::TaskComplete {
                        steps: self.history.len(),
                    });
                    return true;
                }
                Ok(false) => debug!(step, "Intent not yet satisfied"),
                Err(e) => {
                    return self.fail(format!("step {}: intent check failed: {:#}", step, e));
                }
            }
        }

        self.fail(format!("intent not satisfied within {} steps", max_steps))
    }

    async fn check_intent_satisfied(
        &self,
        intent: &str,
        state: &BrowserState,
    ) -> anyhow::Result<bool> {
        let history = serde_json::to_string_pretty(&self.history)?;
        let prompt = format!(
            "Given the user's intent and current page state, determine if the intent has been satisfied.\n\nIntent: {}\n\nCurrent State:\n{}\n\nPrevious Actions:\n{}\n\nRespond with ONLY 'true' if the intent is satisfied, or 'false' if more actions are needed.",
            intent,
            state.format_for_prompt(self.config.visible_text_chars),
            history
        );
        let request = CompletionRequest::new(
            prompt,
            self.config.model.clone(),
            self.config.intent_check_max_tokens,
        );

        let answer = self.model.complete(&request).await?;
        Ok(answer.trim().eq_ignore_ascii_case("true"))
    }

    fn fail(&mut self, reason: String) -> bool {
        warn!(%reason, "Intent run failed");
        self.state = LoopState::Failed;
        self.emit(AgentEvent::TaskError {
            message: reason.clone(),
        });
        self.last_failure = Some(reason);
        false
    }

    fn emit(&self, event: AgentEvent) {
        if let Some(events) = &self.events {
            let _ = events.send(event);
        }
    }
}

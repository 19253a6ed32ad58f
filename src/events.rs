use serde::Serialize;

use crate::types::BrowserAction;

/// Progress of an intent run, streamed to whoever is watching.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AgentEvent {
    Thinking { step: usize },
    Step { number: usize, action: BrowserAction },
    StepError { number: usize, message: String },
    TaskComplete { steps: usize },
    TaskError { message: String },
    Ready,
}

impl AgentEvent {
    /// Event name used on the wire (SSE `event:` field).
    pub fn name(&self) -> &'static str {
        match self {
            AgentEvent::Thinking { .. } => "thinking",
            AgentEvent::Step { .. } => "step",
            AgentEvent::StepError { .. } => "step_error",
            AgentEvent::TaskComplete { .. } => "task_complete",
            AgentEvent::TaskError { .. } => "task_error",
            AgentEvent::Ready => "ready",
        }
    }
}

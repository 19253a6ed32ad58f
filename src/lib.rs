//! Plan-act-verify loop that drives a browser toward a natural-language intent.
//!
//! Each step captures the page, asks a language model for exactly one next
//! action, executes it (falling back to alternative selectors when the
//! planned one does not resolve), validates the effect with a second model
//! call, and finally asks the model whether the intent is satisfied.
//!
//! The browser and the model are consumed through the [`BrowserDriver`] and
//! [`LanguageModel`] traits; [`ChromeDriver`], [`OpenAiClient`] and
//! [`AnthropicClient`] are the bundled adapters.

pub mod analysis;
pub mod chrome;
pub mod config;
pub mod dom;
pub mod driver;
pub mod error;
pub mod events;
pub mod executor;
pub mod json;
pub mod llm;
pub mod orchestrator;
pub mod planner;
pub mod types;

pub use analysis::analyze_page;
pub use chrome::{ChromeDriver, ChromeOptions};
pub use config::{AgentConfig, IntentCheckSnapshot, LlmProvider, LlmSettings};
pub use dom::{capture_state, derive_selector};
pub use driver::BrowserDriver;
pub use error::{ActionFailure, CaptureError, ConfigError, PlanningError};
pub use events::AgentEvent;
pub use executor::Executor;
pub use llm::{AnthropicClient, CompletionRequest, LanguageModel, OpenAiClient};
pub use orchestrator::{LoopState, Orchestrator};
pub use planner::Planner;
pub use types::{ActionType, BrowserAction, BrowserState, ValidationCheck, ValidationType};

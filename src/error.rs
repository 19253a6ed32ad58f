//! Error types for the intent loop.

use thiserror::Error;

use crate::types::ActionType;

/// An action that breaks the dispatch invariant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidAction {
    #[error("selector is empty")]
    EmptySelector,

    #[error("{0} action requires a value")]
    MissingValue(ActionType),
}

/// The planner could not produce a usable action.
#[derive(Debug, Error)]
pub enum PlanningError {
    /// The language model request itself failed.
    #[error("language model request failed: {0:#}")]
    Model(anyhow::Error),

    /// No JSON object in the response described a well-formed action.
    #[error("could not interpret model response as an action: {response}")]
    Unparseable { response: String },
}

/// Why an action did not take effect. Returned by the executor, never raised.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActionFailure {
    #[error("invalid action: {0}")]
    Invalid(#[from] InvalidAction),

    /// Primary and all fallback selectors timed out.
    #[error("element not found: {selector} (tried {attempts} selector(s))")]
    ElementNotFound { selector: String, attempts: usize },

    /// The driver primitive reported failure.
    #[error("{action_type} dispatch failed on {selector}")]
    Dispatch {
        action_type: ActionType,
        selector: String,
    },

    /// The post-action check did not confirm the expected state.
    #[error("validation failed: {0}")]
    Validation(String),
}

/// Reading the page for a snapshot failed.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to read {what} from driver: {source:#}")]
    Driver {
        what: &'static str,
        source: anyhow::Error,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} is not set in environment")]
    Missing { name: &'static str },

    #[error("invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },

    #[error("unknown LLM provider '{0}' (expected 'openai' or 'anthropic')")]
    UnknownProvider(String),
}

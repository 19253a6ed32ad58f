use std::time::Duration;

use crate::error::ConfigError;
use crate::types::{DEFAULT_MAX_STEPS, VISIBLE_TEXT_PROMPT_CHARS};

pub const DEFAULT_MODEL: &str = "claude-3-opus-20240229";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o";

/// Which page snapshot the intent check is evaluated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IntentCheckSnapshot {
    /// Reuse the snapshot captured before the action was planned.
    PreAction,
    /// Capture a fresh snapshot after the action has been validated.
    #[default]
    PostAction,
}

/// Tunables for one agent: model parameters, element timeouts and loop bounds.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub model: String,
    pub planner_max_tokens: u32,
    pub validation_max_tokens: u32,
    pub intent_check_max_tokens: u32,
    pub analysis_max_tokens: u32,
    /// Presence wait for the planner's selector.
    pub element_timeout: Duration,
    /// Presence wait for each synthesized alternative selector.
    pub fallback_timeout: Duration,
    pub visibility_timeout: Duration,
    /// Pause before a `state_change` validation looks at the page.
    pub state_change_delay: Duration,
    pub visible_text_chars: usize,
    pub max_steps: usize,
    pub intent_check_snapshot: IntentCheckSnapshot,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            planner_max_tokens: 1000,
            validation_max_tokens: 500,
            intent_check_max_tokens: 100,
            analysis_max_tokens: 1000,
            element_timeout: Duration::from_secs(10),
            fallback_timeout: Duration::from_secs(5),
            visibility_timeout: Duration::from_secs(5),
            state_change_delay: Duration::from_secs(1),
            visible_text_chars: VISIBLE_TEXT_PROMPT_CHARS,
            max_steps: DEFAULT_MAX_STEPS,
            intent_check_snapshot: IntentCheckSnapshot::default(),
        }
    }
}

impl AgentConfig {
    /// Defaults overridden by `AGENT_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(model) = env_string("AGENT_MODEL") {
            config.model = model;
        }
        if let Some(steps) = env_parse::<usize>("AGENT_MAX_STEPS")? {
            config.max_steps = steps;
        }
        if let Some(ms) = env_parse::<u64>("AGENT_ELEMENT_TIMEOUT_MS")? {
            config.element_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = env_parse::<u64>("AGENT_FALLBACK_TIMEOUT_MS")? {
            config.fallback_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = env_parse::<u64>("AGENT_VISIBILITY_TIMEOUT_MS")? {
            config.visibility_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = env_parse::<u64>("AGENT_STATE_CHANGE_DELAY_MS")? {
            config.state_change_delay = Duration::from_millis(ms);
        }
        if let Some(chars) = env_parse::<usize>("AGENT_VISIBLE_TEXT_CHARS")? {
            config.visible_text_chars = chars;
        }
        if let Some(snapshot) = env_string("AGENT_INTENT_CHECK_SNAPSHOT") {
            config.intent_check_snapshot = match snapshot.to_lowercase().as_str() {
                "pre" | "pre_action" => IntentCheckSnapshot::PreAction,
                "post" | "post_action" => IntentCheckSnapshot::PostAction,
                _ => {
                    return Err(ConfigError::Invalid {
                        name: "AGENT_INTENT_CHECK_SNAPSHOT",
                        value: snapshot,
                    });
                }
            };
        }

        Ok(config)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProvider {
    OpenAi,
    Anthropic,
}

/// Connection settings for the language model adapter.
#[derive(Debug, Clone)]
pub struct LlmSettings {
    pub provider: LlmProvider,
    pub api_key: String,
    pub base_url: Option<String>,
}

impl LlmSettings {
    /// Picks the provider from `LLM_PROVIDER`, falling back to whichever API
    /// key is present (Anthropic first).
    pub fn from_env() -> Result<Self, ConfigError> {
        let provider = match env_string("LLM_PROVIDER") {
            Some(name) => match name.to_lowercase().as_str() {
                "openai" => LlmProvider::OpenAi,
                "anthropic" | "claude" => LlmProvider::Anthropic,
                _ => return Err(ConfigError::UnknownProvider(name)),
            },
            None if env_string("ANTHROPIC_API_KEY").is_some() => LlmProvider::Anthropic,
            None => LlmProvider::OpenAi,
        };

        let (key_var, url_var) = match provider {
            LlmProvider::OpenAi => ("OPENAI_API_KEY", "OPENAI_BASE_URL"),
            LlmProvider::Anthropic => ("ANTHROPIC_API_KEY", "ANTHROPIC_BASE_URL"),
        };
        let api_key = env_string(key_var).ok_or(ConfigError::Missing { name: key_var })?;

        Ok(Self {
            provider,
            api_key,
            base_url: env_string(url_var),
        })
    }

    pub fn default_model(&self) -> &'static str {
        match self.provider {
            LlmProvider::OpenAi => DEFAULT_OPENAI_MODEL,
            LlmProvider::Anthropic => DEFAULT_MODEL,
        }
    }
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_parse<T: std::str::FromStr>(name: &'static str) -> Result<Option<T>, ConfigError> {
    match env_string(name) {
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { name, value: raw }),
        None => Ok(None),
    }
}

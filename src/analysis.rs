//! Free-form page summaries for the session navigate route.

use anyhow::{Context, Result};
use tracing::debug;

use crate::config::AgentConfig;
use crate::dom::capture_state;
use crate::driver::BrowserDriver;
use crate::llm::{CompletionRequest, LanguageModel};

/// Markup beyond this many characters is left out of the prompt.
pub const ANALYSIS_SOURCE_CHARS: usize = 20_000;

/// Captures the current page and asks the model to describe what is going on
/// on it.
pub async fn analyze_page(
    model: &dyn LanguageModel,
    config: &AgentConfig,
    driver: &dyn BrowserDriver,
) -> Result<String> {
    let state = capture_state(driver).await?;

    let source: String = state.page_source.chars().take(ANALYSIS_SOURCE_CHARS).collect();
    let prompt = format!(
        "Analyze this webpage and tell me what's happening on it.\n\n{}\nHere's the HTML:\n\n{}",
        state.format_for_prompt(config.visible_text_chars),
        source
    );
    let request = CompletionRequest::new(prompt, config.model.clone(), config.analysis_max_tokens);

    let analysis = model
        .complete(&request)
        .await
        .context("Page analysis request failed")?;
    debug!(url = %state.current_url, chars = analysis.len(), "Page analyzed");
    Ok(analysis.trim().to_string())
}

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

/// The fixed set of browser operations the agent consumes.
///
/// Interaction primitives report success as a plain `bool`; an adapter maps
/// any interaction error to `false` and logs it. Page reads are fallible
/// because a snapshot cannot be built without them.
///
/// Selectors starting with `/` or `(` are XPath expressions, everything else
/// is CSS.
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    async fn current_url(&self) -> Result<String>;
    async fn get_title(&self) -> Result<String>;
    async fn get_page_source(&self) -> Result<String>;

    async fn click_element(&self, selector: &str) -> bool;
    async fn input_text(&self, selector: &str, value: &str) -> bool;
    async fn select_option(&self, selector: &str, value: &str) -> bool;
    async fn wait_for_element(&self, selector: &str, timeout: Duration) -> bool;
    async fn scroll_to_element(&self, selector: &str) -> bool;

    async fn is_element_visible(&self, selector: &str, timeout: Duration) -> bool;
    async fn get_element_value(&self, selector: &str) -> Result<String>;
}

/// Whether a selector should be resolved as XPath rather than CSS.
pub fn is_xpath(selector: &str) -> bool {
    let s = selector.trim_start();
    s.starts_with('/') || s.starts_with('(')
}

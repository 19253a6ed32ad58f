use std::ffi::OsStr;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use headless_chrome::{Browser, Element, LaunchOptions, Tab};
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::driver::{BrowserDriver, is_xpath};

/// Pause after clicks so navigation and re-rendering can start.
const SETTLE_AFTER_CLICK: Duration = Duration::from_millis(1000);
const VISIBILITY_POLL: Duration = Duration::from_millis(200);

const IS_VISIBLE_JS: &str = r#"function() {
  if (this.offsetParent === null && this.tagName !== 'BODY' && this.tagName !== 'HTML') return false;
  const s = getComputedStyle(this);
  return s.display !== 'none' && s.visibility !== 'hidden' && s.opacity !== '0';
}"#;

const CLEAR_VALUE_JS: &str = "function() { this.value = ''; }";

const ELEMENT_VALUE_JS: &str = r#"function() {
  return ('value' in this) ? String(this.value) : (this.textContent || '').trim();
}"#;

const SELECT_OPTION_JS: &str = r#"function(v) {
  const opts = Array.from(this.options || []);
  const o = opts.find(o => o.value === v) || opts.find(o => o.text.trim() === v);
  if (!o) return false;
  this.value = o.value;
  this.dispatchEvent(new Event('input', { bubbles: true }));
  this.dispatchEvent(new Event('change', { bubbles: true }));
  return true;
}"#;

#[derive(Debug, Clone, Default)]
pub struct ChromeOptions {
    /// DevTools endpoint of an already running Chrome: `http://127.0.0.1:9222`
    /// or a `ws://.../devtools/browser/<id>` URL.
    pub debugger_url: Option<String>,
    /// Chrome executable; auto-detected when unset.
    pub chrome_path: Option<PathBuf>,
    /// Persistent profile directory; defaults to the platform cache dir.
    pub profile_dir: Option<PathBuf>,
    pub headless: bool,
}

/// A browser session driven over the DevTools protocol.
///
/// `headless_chrome` is synchronous, so every call runs on the blocking pool.
pub struct ChromeDriver {
    _browser: Browser,
    tab: Arc<Tab>,
    attached: bool,
    tab_closed: AtomicBool,
}

impl Drop for ChromeDriver {
    fn drop(&mut self) {
        // A launched browser exits with its process; an attached one only loses our tab.
        if self.attached && !self.tab_closed.load(Ordering::SeqCst) {
            if let Err(e) = self.tab.close(false) {
                debug!(error = %e, "Closing attached tab failed");
            }
        }
    }
}

impl ChromeDriver {
    /// Opens a session: attaches to `debugger_url` when given (resolving an
    /// `http://` DevTools endpoint to its websocket first), otherwise launches
    /// Chrome.
    pub async fn open(options: &ChromeOptions) -> Result<Self> {
        let mut options = options.clone();
        if let Some(url) = options.debugger_url.take() {
            options.debugger_url = Some(resolve_debugger_url(&url).await?);
        }
        tokio::task::spawn_blocking(move || Self::launch(&options))
            .await
            .map_err(|e| anyhow!("Browser launch panicked: {}", e))?
    }

    /// Blocking half of [`ChromeDriver::open`]. `debugger_url`, when set, must
    /// already be a `ws://` browser endpoint.
    ///
    /// Attached sessions get their own tab, closed when the driver drops.
    pub fn launch(options: &ChromeOptions) -> Result<Self> {
        if let Some(url) = &options.debugger_url {
            info!(%url, "Attaching to existing Chrome");
            let browser = Browser::connect(url.clone())?;
            let tab = browser.new_tab()?;
            return Ok(Self {
                _browser: browser,
                tab,
                attached: true,
                tab_closed: AtomicBool::new(false),
            });
        }

        let profile = match &options.profile_dir {
            Some(dir) => dir.clone(),
            None => default_profile_dir()?,
        };
        std::fs::create_dir_all(&profile)?;
        debug!(profile = %profile.display(), "Using Chrome profile");

        let launch = LaunchOptions {
            headless: options.headless,
            path: options.chrome_path.clone(),
            user_data_dir: Some(profile),
            args: vec![
                OsStr::new("--no-first-run"),
                OsStr::new("--no-default-browser-check"),
                OsStr::new("--disable-blink-features=AutomationControlled"),
                OsStr::new("--disable-infobars"),
                OsStr::new("--password-store=basic"),
            ],
            idle_browser_timeout: Duration::from_secs(600),
            ..Default::default()
        };

        info!(headless = options.headless, "Launching Chrome");
        let browser = Browser::new(launch).map_err(|e| anyhow!("Browser launch failed: {}", e))?;
        let tab = browser.new_tab()?;
        tab.navigate_to("about:blank")?;

        Ok(Self {
            _browser: browser,
            tab,
            attached: false,
            tab_closed: AtomicBool::new(false),
        })
    }

    pub async fn navigate(&self, url: &str) -> Result<()> {
        let url = url.to_string();
        self.blocking(move |tab| {
            tab.navigate_to(&url)?.wait_until_navigated()?;
            Ok(())
        })
        .await
    }

    /// Closes the session's tab immediately, skipping unload handlers. Runs
    /// still holding this driver fail on their next browser call.
    pub async fn force_close(&self) -> Result<()> {
        if self.tab_closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.blocking(|tab| {
            tab.close(false)?;
            Ok(())
        })
        .await
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Tab) -> Result<T> + Send + 'static,
    {
        let tab = self.tab.clone();
        tokio::task::spawn_blocking(move || f(&tab))
            .await
            .map_err(|e| anyhow!("browser task panicked: {}", e))?
    }

    /// Runs an interaction and folds any error into `false`.
    async fn interact<F>(&self, op: &'static str, selector: &str, f: F) -> bool
    where
        F: FnOnce(&Tab, &str) -> Result<bool> + Send + 'static,
    {
        let owned = selector.to_string();
        match self.blocking(move |tab| f(tab, &owned)).await {
            Ok(done) => done,
            Err(e) => {
                warn!(op, %selector, error = %e, "Browser interaction failed");
                false
            }
        }
    }
}

/// Turns an `http(s)://host:port` DevTools endpoint into the browser
/// websocket URL advertised at `/json/version`. `ws(s)://` URLs pass through.
pub async fn resolve_debugger_url(url: &str) -> Result<String> {
    let url = url.trim();
    if url.starts_with("ws://") || url.starts_with("wss://") {
        return Ok(url.to_string());
    }
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(anyhow!(
            "Unsupported debugger URL '{}' (expected http:// or ws://)",
            url
        ));
    }

    let endpoint = format!("{}/json/version", url.trim_end_matches('/'));
    debug!(%endpoint, "Resolving DevTools websocket");
    let body: Value = reqwest::get(&endpoint)
        .await
        .with_context(|| format!("Failed to reach {}", endpoint))?
        .error_for_status()?
        .json()
        .await?;

    body["webSocketDebuggerUrl"]
        .as_str()
        .map(String::from)
        .ok_or_else(|| anyhow!("No webSocketDebuggerUrl in {}", endpoint))
}

/// `intent-agent/chrome-profile` under the platform cache dir.
pub fn default_profile_dir() -> Result<PathBuf> {
    let base = dirs::cache_dir().ok_or_else(|| anyhow!("No cache directory on this platform"))?;
    Ok(base.join("intent-agent").join("chrome-profile"))
}

fn find<'a>(tab: &'a Tab, selector: &str) -> Result<Element<'a>> {
    if is_xpath(selector) {
        Ok(tab.find_element_by_xpath(selector)?)
    } else {
        Ok(tab.find_element(selector)?)
    }
}

fn wait_for<'a>(tab: &'a Tab, selector: &str, timeout: Duration) -> Result<Element<'a>> {
    if is_xpath(selector) {
        Ok(tab.wait_for_xpath_with_custom_timeout(selector, timeout)?)
    } else {
        Ok(tab.wait_for_element_with_custom_timeout(selector, timeout)?)
    }
}

/// Re-runs `check` every `interval` until it returns `Ok(true)` or `timeout`
/// passes. Errors count as "not yet": nodes detach while a page re-renders.
fn poll_until<F>(timeout: Duration, interval: Duration, mut check: F) -> bool
where
    F: FnMut() -> Result<bool>,
{
    let deadline = Instant::now() + timeout;
    loop {
        match check() {
            Ok(true) => return true,
            Ok(false) => {}
            Err(e) => debug!(error = %e, "Check errored, retrying"),
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(interval);
    }
}

fn js_bool(element: &Element<'_>, function: &str, args: Vec<serde_json::Value>) -> Result<bool> {
    let result = element.call_js_fn(function, args, false)?;
    Ok(result.value.and_then(|v| v.as_bool()).unwrap_or(false))
}

#[async_trait]
impl BrowserDriver for ChromeDriver {
    async fn current_url(&self) -> Result<String> {
        self.blocking(|tab| Ok(tab.get_url())).await
    }

    async fn get_title(&self) -> Result<String> {
        self.blocking(|tab| Ok(tab.get_title()?)).await
    }

    async fn get_page_source(&self) -> Result<String> {
        self.blocking(|tab| Ok(tab.get_content()?)).await
    }

    async fn click_element(&self, selector: &str) -> bool {
        self.interact("click", selector, |tab, selector| {
            find(tab, selector)?.click()?;
            std::thread::sleep(SETTLE_AFTER_CLICK);
            Ok(true)
        })
        .await
    }

    async fn input_text(&self, selector: &str, value: &str) -> bool {
        let value = value.to_string();
        self.interact("type", selector, move |tab, selector| {
            let element = find(tab, selector)?;
            element.click()?;
            element.call_js_fn(CLEAR_VALUE_JS, vec![], false)?;
            element.type_into(&value)?;
            Ok(true)
        })
        .await
    }

    async fn select_option(&self, selector: &str, value: &str) -> bool {
        let value = value.to_string();
        self.interact("select", selector, move |tab, selector| {
            let element = find(tab, selector)?;
            js_bool(&element, SELECT_OPTION_JS, vec![json!(value)])
        })
        .await
    }

    async fn wait_for_element(&self, selector: &str, timeout: Duration) -> bool {
        let owned = selector.to_string();
        self.blocking(move |tab| Ok(wait_for(tab, &owned, timeout).is_ok()))
            .await
            .unwrap_or(false)
    }

    async fn scroll_to_element(&self, selector: &str) -> bool {
        self.interact("scroll", selector, |tab, selector| {
            find(tab, selector)?.scroll_into_view()?;
            Ok(true)
        })
        .await
    }

    async fn is_element_visible(&self, selector: &str, timeout: Duration) -> bool {
        self.interact("visible", selector, move |tab, selector| {
            Ok(poll_until(timeout, VISIBILITY_POLL, || {
                find(tab, selector).and_then(|el| js_bool(&el, IS_VISIBLE_JS, vec![]))
            }))
        })
        .await
    }

    async fn get_element_value(&self, selector: &str) -> Result<String> {
        let owned = selector.to_string();
        self.blocking(move |tab| {
            let element = find(tab, &owned)?;
            let result = element.call_js_fn(ELEMENT_VALUE_JS, vec![], false)?;
            Ok(result
                .value
                .and_then(|v| v.as_str().map(String::from))
                .unwrap_or_default())
        })
        .await
    }
}

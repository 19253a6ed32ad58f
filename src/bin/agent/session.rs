use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use intent_agent::chrome;
use intent_agent::{ChromeDriver, ChromeOptions};
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Owns the live browser sessions. Runs hold an `Arc` to their driver, so the
/// map lock is never held while a session is being driven.
pub struct SessionManager {
    options: ChromeOptions,
    sessions: Mutex<HashMap<String, Arc<ChromeDriver>>>,
}

impl SessionManager {
    pub fn new(options: ChromeOptions) -> Self {
        Self {
            options,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Launches (or attaches) a browser and returns its session id.
    pub async fn create(&self) -> Result<String> {
        let id = format!("sess_{:016x}", rand::random::<u64>());

        // Launched browsers cannot share a profile directory.
        let mut options = self.options.clone();
        if options.debugger_url.is_none() {
            let base = match &options.profile_dir {
                Some(base) => base.clone(),
                None => chrome::default_profile_dir()?,
            };
            options.profile_dir = Some(base.join(&id));
        }

        let driver = ChromeDriver::open(&options).await?;

        self.sessions
            .lock()
            .await
            .insert(id.clone(), Arc::new(driver));
        info!(session = %id, "Session created");
        Ok(id)
    }

    pub async fn get(&self, id: &str) -> Option<Arc<ChromeDriver>> {
        self.sessions.lock().await.get(id).cloned()
    }

    /// Removes the session; the browser closes once the last run holding it
    /// finishes. Returns `false` for unknown ids.
    pub async fn close(&self, id: &str) -> bool {
        let removed = self.sessions.lock().await.remove(id);
        match removed {
            Some(driver) => {
                release(driver);
                info!(session = %id, "Session closed");
                true
            }
            None => false,
        }
    }

    /// Removes the session and closes its tab at once, interrupting any run
    /// still using it. Returns `false` for unknown ids.
    pub async fn kill(&self, id: &str) -> Result<bool> {
        let removed = self.sessions.lock().await.remove(id);
        let Some(driver) = removed else {
            return Ok(false);
        };
        let closed = driver.force_close().await;
        release(driver);
        closed?;
        warn!(session = %id, "Session killed");
        Ok(true)
    }

    pub async fn close_all(&self) {
        let drained: Vec<_> = self.sessions.lock().await.drain().collect();
        for (id, driver) in drained {
            release(driver);
            info!(session = %id, "Session closed");
        }
    }
}

/// Dropping the last handle shuts Chrome down, which blocks.
fn release(driver: Arc<ChromeDriver>) {
    let handle = tokio::task::spawn_blocking(move || drop(driver));
    tokio::spawn(async move {
        if let Err(e) = handle.await {
            warn!(error = %e, "Browser shutdown panicked");
        }
    });
}

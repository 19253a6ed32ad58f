use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderValue, Method, StatusCode};
use axum::response::sse::{Event, Sse};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use intent_agent::{
    AgentConfig, AgentEvent, BrowserAction, BrowserDriver, LanguageModel, Orchestrator,
    analyze_page,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::{broadcast, mpsc};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{debug, info, warn};

use crate::session::SessionManager;

/// An intent submitted from the web UI, run on the default session.
#[derive(Debug, Clone, Deserialize)]
pub struct Command {
    pub intent: String,
    #[serde(default)]
    pub url: Option<String>,
}

pub struct AppState {
    pub cmd_tx: mpsc::Sender<Command>,
    pub event_tx: broadcast::Sender<AgentEvent>,
    pub sessions: Arc<SessionManager>,
    pub model: Arc<dyn LanguageModel>,
    pub config: AgentConfig,
    /// Origins allowed by CORS; `*` allows any.
    pub allowed_origins: Vec<String>,
}

#[derive(Deserialize)]
struct NavigatePayload {
    url: String,
}

#[derive(Deserialize)]
struct IntentPayload {
    intent: String,
    #[serde(default)]
    max_steps: Option<usize>,
}

#[derive(Serialize)]
struct IntentResponse {
    success: bool,
    history: Vec<BrowserAction>,
    failure: Option<String>,
}

pub fn router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.allowed_origins);
    Router::new()
        .route("/", get(index_handler))
        .route("/health", get(health_handler))
        .route("/command", post(command_handler))
        .route("/events", get(sse_handler))
        .route("/session", post(create_session))
        .route("/session/{id}", delete(close_session))
        .route("/session/{id}/kill", delete(kill_session))
        .route("/session/{id}/navigate", post(navigate_session))
        .route("/session/{id}/intent", post(run_intent))
        .route("/favicon.ico", get(|| async { StatusCode::NO_CONTENT }))
        .layer(cors)
        .with_state(state)
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origin = if allowed_origins.iter().any(|o| o.trim() == "*") {
        AllowOrigin::from(Any)
    } else {
        AllowOrigin::list(
            allowed_origins
                .iter()
                .filter_map(|o| HeaderValue::from_str(o.trim()).ok()),
        )
    };

    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any)
}

/// Binds `port`, or the next free one of the following nine, and serves in
/// the background.
pub async fn start_server(state: Arc<AppState>, port: u16) -> anyhow::Result<u16> {
    let mut bound = None;
    for p in port..port.saturating_add(10) {
        match tokio::net::TcpListener::bind(("127.0.0.1", p)).await {
            Ok(listener) => {
                bound = Some((listener, p));
                break;
            }
            Err(e) => debug!(port = p, error = %e, "Port unavailable"),
        }
    }
    let (listener, port) = bound.ok_or_else(|| {
        anyhow::anyhow!(
            "Could not bind to any port {}-{}",
            port,
            port.saturating_add(9)
        )
    })?;

    info!("Web UI running at http://localhost:{}", port);

    let app = router(state);
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            warn!(error = %e, "Web server stopped");
        }
    });

    Ok(port)
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

fn session_not_found() -> Response {
    error_response(StatusCode::NOT_FOUND, "Session not found")
}

async fn index_handler() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({ "status": "healthy", "version": env!("CARGO_PKG_VERSION") }))
}

async fn command_handler(
    State(state): State<Arc<AppState>>,
    Json(command): Json<Command>,
) -> Response {
    info!(intent = %command.intent, "POST /command");
    match state.cmd_tx.try_send(command) {
        Ok(()) => (StatusCode::ACCEPTED, "ok").into_response(),
        Err(mpsc::error::TrySendError::Full(_)) => {
            error_response(StatusCode::CONFLICT, "Agent is busy")
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            error_response(StatusCode::SERVICE_UNAVAILABLE, "Agent stopped")
        }
    }
}

async fn sse_handler(
    State(state): State<Arc<AppState>>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    let rx = state.event_tx.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(|result| {
        let event = result.ok()?;
        let data = serde_json::to_string(&event).ok()?;
        Some(Ok::<_, Infallible>(
            Event::default().event(event.name()).data(data),
        ))
    });
    Sse::new(stream)
}

async fn create_session(State(state): State<Arc<AppState>>) -> Response {
    match state.sessions.create().await {
        Ok(id) => (
            StatusCode::CREATED,
            Json(json!({ "session_id": id, "status": "created" })),
        )
            .into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, format!("{:#}", e)),
    }
}

async fn close_session(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    if state.sessions.close(&id).await {
        Json(json!({ "status": "closed" })).into_response()
    } else {
        session_not_found()
    }
}

async fn kill_session(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    match state.sessions.kill(&id).await {
        Ok(true) => Json(json!({ "status": "killed" })).into_response(),
        Ok(false) => session_not_found(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, format!("{:#}", e)),
    }
}

async fn navigate_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(payload): Json<NavigatePayload>,
) -> Response {
    let Some(driver) = state.sessions.get(&id).await else {
        return session_not_found();
    };

    let result = async {
        driver.navigate(&payload.url).await?;
        let url = driver.current_url().await?;
        let title = driver.get_title().await?;
        let analysis = analyze_page(state.model.as_ref(), &state.config, driver.as_ref()).await?;
        anyhow::Ok(json!({ "url": url, "title": title, "analysis": analysis }))
    }
    .await;

    match result {
        Ok(body) => Json(body).into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, format!("{:#}", e)),
    }
}

async fn run_intent(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(payload): Json<IntentPayload>,
) -> Response {
    let Some(driver) = state.sessions.get(&id).await else {
        return session_not_found();
    };

    let max_steps = payload.max_steps.unwrap_or(state.config.max_steps);
    let mut orchestrator = Orchestrator::new(state.model.clone(), state.config.clone());
    let success = orchestrator
        .execute_intent(driver.as_ref(), &payload.intent, max_steps)
        .await;

    Json(IntentResponse {
        success,
        history: orchestrator.history().to_vec(),
        failure: orchestrator.last_failure().map(String::from),
    })
    .into_response()
}

const INDEX_HTML: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>Intent Agent</title>
<style>
  * { margin: 0; padding: 0; box-sizing: border-box; }
  body { background: #0a0a0f; color: #e0e0e0; font-family: system-ui, sans-serif;
         height: 100vh; display: flex; flex-direction: column; }
  header { padding: 20px 32px; border-bottom: 1px solid #1a1a2e; display: flex; gap: 12px; align-items: center; }
  header h1 { font-size: 20px; font-weight: 600; color: #fff; }
  .dot { width: 8px; height: 8px; border-radius: 50%; background: #22c55e; }
  .dot.busy { background: #f59e0b; }
  .main { flex: 1; display: flex; flex-direction: column; max-width: 820px; width: 100%;
          margin: 0 auto; padding: 24px 32px; gap: 12px; overflow: hidden; }
  #log { flex: 1; overflow-y: auto; display: flex; flex-direction: column; gap: 8px; }
  .entry { padding: 10px 14px; border-radius: 8px; font-size: 14px; line-height: 1.5; background: #111118; }
  .entry.user { border-left: 3px solid #6366f1; }
  .entry.step { border-left: 3px solid #3b82f6; font-family: monospace; font-size: 13px; }
  .entry.error { border-left: 3px solid #ef4444; color: #fca5a5; }
  .entry.done { border-left: 3px solid #22c55e; color: #86efac; }
  .entry.thinking { border-left: 3px solid #f59e0b; color: #fcd34d; }
  .inputs { display: flex; gap: 8px; }
  input { background: #111118; border: 1px solid #222; border-radius: 8px; padding: 12px 16px;
          color: #fff; font-size: 15px; outline: none; }
  #intent { flex: 1; }
  #url { width: 240px; }
  button { background: #6366f1; color: #fff; border: none; border-radius: 8px; padding: 12px 24px;
           font-size: 15px; font-weight: 600; cursor: pointer; }
  button:disabled { background: #333; cursor: not-allowed; }
</style>
</head>
<body>
  <header><div class="dot" id="status"></div><h1>Intent Agent</h1></header>
  <div class="main">
    <div id="log"></div>
    <div class="inputs">
      <input id="url" placeholder="Start URL (optional)" />
      <input id="intent" placeholder="What should the browser achieve?" autofocus />
      <button id="send" onclick="send()">Run</button>
    </div>
  </div>
<script>
  const log = document.getElementById('log');
  const intent = document.getElementById('intent');
  const url = document.getElementById('url');
  const sendBtn = document.getElementById('send');
  const dot = document.getElementById('status');
  const esc = s => String(s).replace(/</g, '&lt;');
  let busy = false;

  function addEntry(cls, html) {
    const div = document.createElement('div');
    div.className = 'entry ' + cls;
    div.innerHTML = html;
    log.appendChild(div);
    log.scrollTop = log.scrollHeight;
  }

  function setBusy(b) {
    busy = b;
    intent.disabled = b;
    sendBtn.disabled = b;
    dot.className = b ? 'dot busy' : 'dot';
    if (!b) intent.focus();
  }

  async function send() {
    const text = intent.value.trim();
    if (!text || busy) return;
    intent.value = '';
    addEntry('user', '<strong>Intent:</strong> ' + esc(text));
    setBusy(true);
    const body = { intent: text };
    if (url.value.trim()) body.url = url.value.trim();
    const res = await fetch('/command', {
      method: 'POST',
      headers: { 'Content-Type': 'application/json' },
      body: JSON.stringify(body),
    });
    if (!res.ok) {
      addEntry('error', 'Rejected: ' + esc(await res.text()));
      setBusy(false);
    }
  }

  intent.addEventListener('keydown', e => { if (e.key === 'Enter') send(); });

  const es = new EventSource('/events');
  es.addEventListener('thinking', e => addEntry('thinking', 'Planning step ' + JSON.parse(e.data).step + '...'));
  es.addEventListener('step', e => {
    const d = JSON.parse(e.data);
    addEntry('step', 'Step ' + d.number + ': ' + esc(d.action.action_type + ' ' + d.action.selector) +
      (d.action.description ? ' (' + esc(d.action.description) + ')' : ''));
  });
  es.addEventListener('step_error', e => addEntry('error', 'Step ' + JSON.parse(e.data).number + ': ' + esc(JSON.parse(e.data).message)));
  es.addEventListener('task_complete', e => addEntry('done', 'Intent satisfied after ' + JSON.parse(e.data).steps + ' step(s).'));
  es.addEventListener('task_error', e => addEntry('error', '<strong>Failed:</strong> ' + esc(JSON.parse(e.data).message)));
  es.addEventListener('ready', () => setBusy(false));

  addEntry('done', 'Agent ready. Describe what the browser should do.');
</script>
</body>
</html>
"##;

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use intent_agent::{ChromeOptions, CompletionRequest};

    struct Silent;

    #[async_trait]
    impl LanguageModel for Silent {
        async fn complete(&self, _request: &CompletionRequest) -> anyhow::Result<String> {
            Ok(String::new())
        }
    }

    async fn spawn_app(allowed_origins: &[&str]) -> String {
        let (cmd_tx, _cmd_rx) = mpsc::channel(1);
        let (event_tx, _) = broadcast::channel(8);
        let state = Arc::new(AppState {
            cmd_tx,
            event_tx,
            sessions: Arc::new(SessionManager::new(ChromeOptions::default())),
            model: Arc::new(Silent),
            config: AgentConfig::default(),
            allowed_origins: allowed_origins.iter().map(|o| o.to_string()).collect(),
        });

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(state)).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn allow_origin(response: &reqwest::Response) -> Option<&str> {
        response
            .headers()
            .get("access-control-allow-origin")
            .and_then(|v| v.to_str().ok())
    }

    #[tokio::test]
    async fn cors_echoes_listed_origin_only() {
        let base = spawn_app(&["http://localhost:5173"]).await;
        let client = reqwest::Client::new();

        let listed = client
            .get(format!("{}/health", base))
            .header("Origin", "http://localhost:5173")
            .send()
            .await
            .unwrap();
        assert_eq!(allow_origin(&listed), Some("http://localhost:5173"));

        let other = client
            .get(format!("{}/health", base))
            .header("Origin", "http://evil.test")
            .send()
            .await
            .unwrap();
        assert_eq!(allow_origin(&other), None);
    }

    #[tokio::test]
    async fn wildcard_origin_allows_any() {
        let base = spawn_app(&["*"]).await;
        let response = reqwest::Client::new()
            .get(format!("{}/health", base))
            .header("Origin", "http://anywhere.test")
            .send()
            .await
            .unwrap();
        assert_eq!(allow_origin(&response), Some("*"));
    }

    #[tokio::test]
    async fn unknown_sessions_are_not_found() {
        let base = spawn_app(&["*"]).await;
        let client = reqwest::Client::new();

        let killed = client
            .delete(format!("{}/session/sess_missing/kill", base))
            .send()
            .await
            .unwrap();
        assert_eq!(killed.status(), reqwest::StatusCode::NOT_FOUND);

        let closed = client
            .delete(format!("{}/session/sess_missing", base))
            .send()
            .await
            .unwrap();
        assert_eq!(closed.status(), reqwest::StatusCode::NOT_FOUND);

        let navigated = client
            .post(format!("{}/session/sess_missing/navigate", base))
            .json(&json!({ "url": "https://example.com" }))
            .send()
            .await
            .unwrap();
        assert_eq!(navigated.status(), reqwest::StatusCode::NOT_FOUND);
        let body: serde_json::Value = navigated.json().await.unwrap();
        assert_eq!(body["error"], "Session not found");
    }
}

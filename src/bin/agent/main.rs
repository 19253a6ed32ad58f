mod face;
mod session;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use intent_agent::{
    AgentConfig, AgentEvent, ChromeDriver, ChromeOptions, LanguageModel, LlmSettings,
    Orchestrator, llm,
};
use tokio::sync::{broadcast, mpsc};
use tracing::{error, info, warn};

use face::{AppState, Command};
use session::SessionManager;

#[derive(Parser)]
#[command(name = "agent", version, about = "Drive a browser toward a natural-language intent")]
struct Cli {
    /// Debug-level logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Attach to a running Chrome instead of launching one
    #[arg(long, env = "CHROME_DEBUGGER_URL", global = true)]
    attach: Option<String>,

    /// Chrome executable (auto-detected when omitted)
    #[arg(long, env = "CHROME_PATH", global = true)]
    chrome: Option<PathBuf>,

    /// Profile directory for launched browsers
    #[arg(long, env = "CHROME_PROFILE_DIR", global = true)]
    profile: Option<PathBuf>,

    #[arg(long, global = true)]
    headless: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one intent and print the executed actions as JSON
    Run {
        #[arg(long)]
        intent: String,

        /// Page to open before the first step
        #[arg(long)]
        url: Option<String>,

        #[arg(long)]
        max_steps: Option<usize>,
    },
    /// Serve the web UI and session routes
    Serve {
        #[arg(long, default_value_t = 3000)]
        port: u16,

        /// Comma-separated CORS origins; `*` allows any
        #[arg(long, env = "ALLOWED_ORIGINS", value_delimiter = ',', default_value = "*")]
        allowed_origins: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    dotenv().ok();
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let settings = LlmSettings::from_env()?;
    let mut config = AgentConfig::from_env()?;
    if std::env::var_os("AGENT_MODEL").is_none() {
        config.model = settings.default_model().to_string();
    }
    let model: Arc<dyn LanguageModel> = Arc::from(llm::from_settings(&settings));
    info!(provider = ?settings.provider, model = %config.model, "Language model ready");

    let chrome = ChromeOptions {
        debugger_url: cli.attach,
        chrome_path: cli.chrome,
        profile_dir: cli.profile,
        headless: cli.headless,
    };

    match cli.command {
        Commands::Run {
            intent,
            url,
            max_steps,
        } => {
            let max_steps = max_steps.unwrap_or(config.max_steps);
            run_once(chrome, model, config, &intent, url.as_deref(), max_steps).await
        }
        Commands::Serve {
            port,
            allowed_origins,
        } => {
            serve(chrome, model, config, port, allowed_origins).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("intent_agent=debug,agent=debug")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("intent_agent=info,agent=info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run_once(
    chrome: ChromeOptions,
    model: Arc<dyn LanguageModel>,
    config: AgentConfig,
    intent: &str,
    url: Option<&str>,
    max_steps: usize,
) -> Result<ExitCode> {
    let driver = ChromeDriver::open(&chrome).await?;

    if let Some(url) = url {
        driver
            .navigate(url)
            .await
            .with_context(|| format!("Failed to open {}", url))?;
    }

    let mut orchestrator = Orchestrator::new(model, config);
    let success = orchestrator.execute_intent(&driver, intent, max_steps).await;

    println!("{}", serde_json::to_string_pretty(orchestrator.history())?);

    if success {
        info!(steps = orchestrator.history().len(), "Intent satisfied");
        Ok(ExitCode::SUCCESS)
    } else {
        error!(
            reason = orchestrator.last_failure().unwrap_or("unknown"),
            "Intent not satisfied"
        );
        Ok(ExitCode::FAILURE)
    }
}

async fn serve(
    chrome: ChromeOptions,
    model: Arc<dyn LanguageModel>,
    config: AgentConfig,
    port: u16,
    allowed_origins: Vec<String>,
) -> Result<()> {
    let (cmd_tx, mut cmd_rx) = mpsc::channel::<Command>(1);
    let (event_tx, _) = broadcast::channel::<AgentEvent>(64);
    let sessions = Arc::new(SessionManager::new(chrome));

    let state = Arc::new(AppState {
        cmd_tx,
        event_tx: event_tx.clone(),
        sessions: sessions.clone(),
        model: model.clone(),
        config: config.clone(),
        allowed_origins,
    });
    face::start_server(state, port).await?;

    info!("Launching default browser session...");
    let default_session = sessions.create().await?;

    loop {
        tokio::select! {
            command = cmd_rx.recv() => {
                let Some(command) = command else { break };
                run_command(&sessions, &default_session, &model, &config, &event_tx, command).await;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                break;
            }
        }
    }

    sessions.close_all().await;
    Ok(())
}

async fn run_command(
    sessions: &SessionManager,
    session_id: &str,
    model: &Arc<dyn LanguageModel>,
    config: &AgentConfig,
    events: &broadcast::Sender<AgentEvent>,
    command: Command,
) {
    info!(intent = %command.intent, "Received command");

    let Some(driver) = sessions.get(session_id).await else {
        let _ = events.send(AgentEvent::TaskError {
            message: "Default browser session is gone".to_string(),
        });
        let _ = events.send(AgentEvent::Ready);
        return;
    };

    if let Some(url) = &command.url {
        if let Err(e) = driver.navigate(url).await {
            warn!(%url, error = %e, "Navigation failed");
            let _ = events.send(AgentEvent::TaskError {
                message: format!("Failed to open {}: {:#}", url, e),
            });
            let _ = events.send(AgentEvent::Ready);
            return;
        }
    }

    let mut orchestrator = Orchestrator::new(model.clone(), config.clone()).with_events(events.clone());
    orchestrator
        .execute_intent(driver.as_ref(), &command.intent, config.max_steps)
        .await;

    let _ = events.send(AgentEvent::Ready);
}

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use stagger_agent::{ContentGenerator, EmailComposer, OpenAiProvider};
use stagger_channels::{Dispatcher, HttpRelayDispatcher, LogDispatcher};
use stagger_core::config::StaggerConfig;
use stagger_scheduler::{JobStore, ScheduleZone, StaggerController};
use tracing::{info, warn};

mod app;
mod http;

/// Staggered email gateway
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to stagger.toml (defaults to ~/.stagger/stagger.toml)
    #[arg(long, env = "STAGGER_CONFIG")]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "stagger_gateway=info,stagger_scheduler=info,tower_http=debug".into()
            }),
        )
        .init();

    let args = Args::parse();

    // load config: --config / STAGGER_CONFIG > ~/.stagger/stagger.toml
    let config = StaggerConfig::load(args.config.as_deref()).unwrap_or_else(|e| {
        warn!("Config load failed ({}), using defaults", e);
        StaggerConfig::default()
    });

    let bind = config.gateway.bind.clone();
    let port = config.gateway.port;

    let generator = build_generator(&config);
    let dispatcher = build_dispatcher(&config);
    let zone = config
        .scheduler
        .timezone
        .parse::<ScheduleZone>()
        .unwrap_or_else(|e| {
            warn!("{e}, reading cron expressions in UTC");
            ScheduleZone::Utc
        });
    info!(zone = %zone, "cron schedule zone");

    // Fire queue: trigger tasks → controller run loop
    let (fired_tx, fired_rx) = tokio::sync::mpsc::channel(config.scheduler.fire_queue.max(1));
    let controller = Arc::new(
        StaggerController::new(
            Arc::new(JobStore::new()),
            Arc::clone(&generator),
            Arc::clone(&dispatcher),
            fired_tx,
        )
        .with_zone(zone),
    );

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let runner = tokio::spawn(Arc::clone(&controller).run(fired_rx, shutdown_rx));

    let state = Arc::new(app::AppState::new(config, controller, generator, dispatcher));
    let router = app::build_router(state);

    let addr: SocketAddr = format!("{}:{}", bind, port).parse()?;
    info!("Stagger gateway listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // signal the controller to stop its triggers
    let _ = shutdown_tx.send(true);
    let _ = runner.await;
    info!("Stagger gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for Ctrl-C: {e}");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

/// OpenAI-backed composer when an API key is available, otherwise a
/// generator that fails every request.
fn build_generator(config: &StaggerConfig) -> Arc<dyn ContentGenerator> {
    let provider: Box<dyn stagger_agent::LlmProvider> = match config.generator_api_key() {
        Some(key) => match OpenAiProvider::from_config(key, &config.generator) {
            Ok(openai) => {
                info!(
                    base_url = %config.generator.base_url,
                    model = %config.generator.model,
                    timeout_secs = config.generator.timeout_secs,
                    "email generator: OpenAI-compatible provider"
                );
                Box::new(openai)
            }
            Err(e) => {
                warn!("generator client unusable ({e}), email generation will fail");
                Box::new(NullProvider)
            }
        },
        None => {
            warn!("No generator API key configured, email generation will fail");
            Box::new(NullProvider)
        }
    };
    Arc::new(EmailComposer::from_config(provider, &config.generator))
}

/// HTTP relay when `mail.relay_url` is set, otherwise log-only dry run.
fn build_dispatcher(config: &StaggerConfig) -> Arc<dyn Dispatcher> {
    if config.mail.relay_url.is_none() {
        warn!("mail.relay_url not set, emails will only be logged");
        return Arc::new(LogDispatcher);
    }
    match HttpRelayDispatcher::from_config(&config.mail) {
        Ok(relay) => {
            info!("mail dispatcher: HTTP relay");
            Arc::new(relay)
        }
        Err(e) => {
            warn!("mail relay unusable ({e}), falling back to dry run");
            Arc::new(LogDispatcher)
        }
    }
}

/// Placeholder provider when no API key is available.
struct NullProvider;

#[async_trait::async_trait]
impl stagger_agent::LlmProvider for NullProvider {
    fn name(&self) -> &str {
        "null"
    }
    async fn send(
        &self,
        _req: &stagger_agent::ChatRequest,
    ) -> Result<stagger_agent::ChatResponse, stagger_agent::ProviderError> {
        Err(stagger_agent::ProviderError::Unavailable(
            "no generator configured: set generator.api_key in stagger.toml or OPENAI_API_KEY".into(),
        ))
    }
}

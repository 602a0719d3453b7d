mod adapters;
mod config;
mod routes;

use std::{env, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use chat_core::{ChatCore, CoreConfig};
use dotenvy::dotenv;
use llm::{CompletionClient, SummarizerClient};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use adapters::{CompletionAdapter, SummarizerAdapter};
use config::Settings;
use routes::AppState;

const SWEEP_INTERVAL: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            env::var("RUST_LOG")
                .unwrap_or_else(|_| "chat_server=info,chat_core=info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = Settings::from_env().context("invalid configuration")?;

    let completion = CompletionClient::new(
        settings.completion.base_url.clone(),
        settings.completion.app_id.clone(),
        settings.completion.api_key.clone(),
    )?;
    if !completion.has_credentials() {
        warn!("DASHSCOPE_APP_ID / DASHSCOPE_API_KEY not set; every reply will be an error");
    }

    let summarizer = SummarizerClient::new(
        settings.summarizer.base_url.clone(),
        settings.summarizer.account_id.clone(),
        settings.summarizer.api_token.clone(),
        settings.summarizer.model.clone(),
    )?;
    if !summarizer.has_credentials() {
        warn!("CF_ACCOUNT_ID / CF_API_TOKEN not set; long histories will not be summarized");
    }

    let core = Arc::new(ChatCore::start(
        CoreConfig { history: settings.history, pool: settings.pool.clone() },
        Arc::new(CompletionAdapter::new(completion)),
        Arc::new(SummarizerAdapter::new(summarizer)),
    ));

    let shutdown = CancellationToken::new();
    tokio::spawn(sweep_loop(core.clone(), settings.clone(), shutdown.clone()));

    let app = routes::router(AppState { core: core.clone() });

    let listener = tokio::net::TcpListener::bind((settings.host.as_str(), settings.port))
        .await
        .with_context(|| format!("failed to bind {}:{}", settings.host, settings.port))?;
    info!("Server listening on {}", listener.local_addr()?);
    info!(history = ?settings.history, workers = settings.pool.workers, "chat relay ready");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    shutdown.cancel();
    core.shutdown();
    Ok(())
}

async fn sweep_loop(core: Arc<ChatCore>, settings: Settings, shutdown: CancellationToken) {
    let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                core.sweep(settings.job_ttl, settings.session_idle);
            }
        }
    }
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown requested"),
        Err(e) => {
            error!("failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

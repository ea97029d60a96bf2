use std::net::{IpAddr, SocketAddr};

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use infinitetalk_pipeline::Orchestrator;
use infinitetalk_worker::config::WorkerConfig;
use infinitetalk_worker::router::build_app_router;
use infinitetalk_worker::state::AppState;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    let json_logs = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "infinitetalk_worker=info,infinitetalk_pipeline=info,infinitetalk_comfyui=info,tower_http=info"
                    .into()
            }),
        )
        .with(json_logs.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json_logs).then(tracing_subscriber::fmt::layer))
        .init();

    if let Err(e) = run().await {
        tracing::error!(error = %format!("{e:#}"), "Worker failed");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    // --- Configuration ---
    let client_id = uuid::Uuid::new_v4().to_string();
    let config = WorkerConfig::from_env(client_id).context("Invalid configuration")?;
    let orchestrator_config = &config.orchestrator;
    tracing::info!(
        host = %config.host,
        port = config.port,
        client_id = %orchestrator_config.client_id,
        comfyui = %format!("{}:{}", orchestrator_config.comfyui_host, orchestrator_config.comfyui_port),
        workflow_dir = %orchestrator_config.workflow_dir.display(),
        "Loaded worker configuration",
    );

    // --- App state ---
    let shutdown = CancellationToken::new();
    let state = AppState::new(Orchestrator::new(config.orchestrator.clone()), shutdown.clone());
    let app = build_app_router(state);

    // --- Start server ---
    let ip = config
        .host
        .parse::<IpAddr>()
        .with_context(|| format!("Invalid HOST address {:?}", config.host))?;
    let addr = SocketAddr::new(ip, config.port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;
    tracing::info!(%addr, "Worker listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await
        .context("Server error")?;

    tracing::info!("Graceful shutdown complete");
    Ok(())
}

/// Wait for SIGINT or SIGTERM, then cancel the in-flight job.
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }

    shutdown.cancel();
}

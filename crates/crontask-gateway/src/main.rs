use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use crontask_core::config::CrontaskConfig;
use tracing::{info, warn};

mod app;
mod http;

/// HTTP task scheduler: runs configured HTTP calls on cron schedules.
#[derive(Debug, Parser)]
#[command(name = "crontask-gateway", version, about)]
struct Cli {
    /// Path to crontask.toml (default: ~/.crontask/crontask.toml).
    #[arg(long, env = "CRONTASK_CONFIG")]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "crontask_gateway=info,crontask_scheduler=info,tower_http=info".into()
            }),
        )
        .init();

    let config = CrontaskConfig::load(cli.config.as_deref()).unwrap_or_else(|e| {
        warn!(code = e.code(), "Config load failed ({}), using defaults", e);
        CrontaskConfig::default()
    });

    let db_path = config.database.path.clone();
    ensure_parent_dir(&db_path);
    info!(path = %db_path, "opening SQLite database");
    let conn = crontask_scheduler::db::open(&db_path)?;

    let service = app::build_service(&config, conn)?;
    let report = service.bootstrap()?;
    info!(
        started = report.started,
        failed = report.failed.len(),
        "active tasks scheduled"
    );

    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port).parse()?;
    let state = Arc::new(app::AppState::new(service));
    let router = app::build_router(state.clone());

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("crontask gateway listening on {}", addr);
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let stopped = state.service.shutdown();
    info!(stopped, "crontask gateway stopped");
    Ok(())
}

fn ensure_parent_dir(path: &str) {
    if let Some(parent) = std::path::Path::new(path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}

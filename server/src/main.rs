use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use memberlist_server::config::ServerConfig;
use memberlist_server::db::pool::{create_pool, run_migrations};
use memberlist_server::engine::member_engine::MemberListEngine;
use memberlist_server::notify::stream::subscribe;
use memberlist_server::web::app_state::AppState;
use memberlist_server::web::router::build_router;

#[derive(Parser)]
#[command(about = "Serves community and channel member lists from an incrementally maintained view")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "memberlist.toml")]
    config: String,
}

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    if let Err(e) = run(args).await {
        error!(error = ?e, "member list server stopped");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let config = ServerConfig::load(&args.config).map_err(anyhow::Error::msg)?;

    let pool = create_pool(&config.database.url)
        .await
        .context("failed to connect to database")?;
    if config.database.apply_schema {
        run_migrations(&pool)
            .await
            .context("failed to apply source schema")?;
    }

    let engine = Arc::new(MemberListEngine::new());
    let cancel = CancellationToken::new();

    // Subscribe before loading so changes made during bootstrap stay queued.
    let mut stream = subscribe(&config.notify, Arc::clone(&engine), cancel.clone()).await?;

    engine
        .bootstrap(&pool)
        .await
        .map_err(anyhow::Error::msg)
        .context("bootstrap failed")?;
    pool.close().await;

    let ticks = tokio::spawn(
        Arc::clone(&engine).run_ticks(config.view.tick_interval(), cancel.clone()),
    );

    let app = build_router(Arc::new(AppState {
        engine: Arc::clone(&engine),
    }));
    let listener = tokio::net::TcpListener::bind(&config.server.web_address)
        .await
        .with_context(|| format!("failed to bind {}", config.server.web_address))?;
    info!(
        web = %config.server.web_address,
        notify = %config.notify.address,
        "member list server started"
    );

    let shutdown = cancel.clone();
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
    });

    let outcome = tokio::select! {
        _ = shutdown_signal() => {
            info!("shutdown signal received");
            Ok(())
        }
        result = &mut stream => match result {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(e.context("notification stream lost")),
            Err(e) => Err(anyhow::Error::new(e).context("notification stream task failed")),
        },
    };

    cancel.cancel();
    if let Err(e) = ticks.await {
        error!(error = %e, "view maintainer task failed");
    }
    match server.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(error = %e, "web server error"),
        Err(e) => error!(error = %e, "web server task failed"),
    }
    outcome
}

/// Resolve on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for ctrl-c");
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
                error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

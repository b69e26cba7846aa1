//! Leadflow CLI and HTTP entry point.
//!
//! Binary name: `leadflow`
//!
//! Loads configuration, initializes tracing and the database, then
//! dispatches to a command handler or starts the HTTP server together with
//! the background scheduler.

mod background;
mod cli;
mod http;
mod state;

use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;

use leadflow_infra::config::{LogFormat, default_config_path, default_data_dir, load_config};
use leadflow_observe::tracing_setup::{
    LogOutput, filter_for_verbosity, init_tracing, shutdown_tracing,
};

use cli::{Cli, Commands};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let data_dir = default_data_dir();
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| default_config_path(&data_dir));
    let config = load_config(&config_path).await;

    let output = match config.logging.format {
        LogFormat::Pretty => LogOutput::Pretty,
        LogFormat::Json => LogOutput::Json,
    };
    init_tracing(output, config.logging.otel, filter_for_verbosity(cli.verbose))
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;
    tracing::debug!(config = %config_path.display(), "configuration loaded");

    let state = AppState::init(config, data_dir).await?;

    let outcome = run(cli, state).await;
    shutdown_tracing();
    outcome
}

async fn run(cli: Cli, state: AppState) -> anyhow::Result<()> {
    match cli.command {
        Commands::Serve { port, host } => serve(state, host, port).await?,

        Commands::Execute {
            workflow_id,
            user,
            leads,
            test_mode,
        } => {
            cli::execute::execute(&state, workflow_id, user, leads, test_mode, cli.json).await?;
        }

        Commands::Tick => cli::tick::tick(&state, cli.json).await?,

        Commands::Import { path } => cli::import::import(&state, &path, cli.json).await?,

        Commands::Enrollments { workflow_id, limit } => {
            cli::enrollments::list(&state, workflow_id, limit, cli.json).await?;
        }
    }

    Ok(())
}

async fn serve(state: AppState, host: Option<String>, port: Option<u16>) -> anyhow::Result<()> {
    let host = host.unwrap_or_else(|| state.config.server.host.clone());
    let port = port.unwrap_or(state.config.server.port);
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    let cancel = CancellationToken::new();
    let interval_secs = state.config.scheduler.interval_secs;
    let scheduler = (interval_secs > 0).then(|| {
        background::spawn_scheduler(
            state.clone(),
            Duration::from_secs(interval_secs),
            cancel.clone(),
        )
    });

    println!(
        "  {} Leadflow listening on {}",
        console::style("⚡").bold(),
        console::style(format!("http://{addr}")).cyan()
    );
    println!(
        "  {}",
        console::style(format!("Data: {}", state.data_dir.display())).dim()
    );
    println!("  {}", console::style("Press Ctrl+C to stop").dim());

    let router = http::router::build_router(state);
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    cancel.cancel();
    if let Some(handle) = scheduler {
        if let Err(e) = handle.await {
            tracing::warn!(error = %e, "scheduler task ended abnormally");
        }
    }

    println!("\n  Server stopped.");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
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
                tracing::error!(error = %e, "failed to install SIGTERM handler");
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
}

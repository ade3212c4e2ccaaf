//! VoxCall agent daemon.
//!
//! Runs one call session against the configured backend (the in-process
//! placeholder pair in local mode), serving health probes on the side and
//! shutting down cleanly on CTRL-C / SIGTERM. The health server keeps
//! answering while the call winds down, so an orchestrator sees not-ready
//! before the process exits.

mod health;

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use voxcall_core::{
    AgentDescriptor, CallConfig, CallLifecycle, PlaceholderRoom, PlaceholderSession,
    ReadinessSignal, ReceptionTools,
};

const DEFAULT_INSTRUCTIONS: &str = "You are the phone receptionist for a small clinic. \
Be concise, warm, and never invent appointment details.";

#[tokio::main]
async fn main() {
    // Load .env file if present (before any env::var calls)
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("[voxcall-agentd] .env not loaded: {} (using system environment)", e);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = CallConfig::from_env();
    config.validate().expect("valid configuration");

    let readiness = ReadinessSignal::new();

    let bind = format!("{}:{}", config.health.host, config.health.port);
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .expect("bind health endpoint");
    tracing::info!(addr = %bind, "health endpoint listening");
    let app = health::build_router(readiness.clone());
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "health server stopped");
        }
    });

    // Local mode: scriptable in-process backend and room. A real deployment
    // swaps these for the live transport implementations.
    let session = Arc::new(PlaceholderSession::new());
    session.set_auto_reply(true);
    let room = Arc::new(PlaceholderRoom::new(
        std::env::var("ROOM_NAME").unwrap_or_else(|_| "local-room".into()),
    ));

    let mut lifecycle = CallLifecycle::new(&config, session, room, readiness.clone());
    let tools = Arc::new(ReceptionTools::new(lifecycle.end_call_handle()));
    let instructions =
        std::env::var("AGENT_INSTRUCTIONS").unwrap_or_else(|_| DEFAULT_INSTRUCTIONS.into());
    let agent = AgentDescriptor::new(instructions, tools);

    readiness.mark_startup_complete();
    tracing::info!("voxcall agent daemon started");

    tokio::select! {
        result = lifecycle.run(agent) => match result {
            Ok(summary) => tracing::info!(
                session = %summary.session_id,
                reason = ?summary.end_reason,
                duration_s = summary.duration.as_secs_f64(),
                "call completed"
            ),
            Err(e) => tracing::error!(error = %e, "call failed"),
        },
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received; tearing down");
        }
    }

    // Idempotent: a no-op when the call already tore itself down.
    lifecycle.teardown().await;
    readiness.mark_unhealthy();
    tracing::info!("voxcall agent daemon stopped");
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

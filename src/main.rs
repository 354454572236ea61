use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::signal;

use pushrelay::config::{Config, SessionPolicy};
use pushrelay::gateway::dispatcher::Dispatcher;
use pushrelay::gateway::reaper;
use pushrelay::state::AppState;

/// How long open streams get to finish their current write on shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pushrelay=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env();
    print_banner(&config);

    let dispatcher = Arc::new(Dispatcher::new(
        config.stream.clone(),
        config.backlog_warn_threshold,
    ));

    let reaper_handle = config
        .queue_idle_ttl
        .map(|ttl| reaper::spawn(Arc::clone(&dispatcher), ttl));

    let state = AppState::new(Arc::clone(&dispatcher), config.allowed_origins.clone());
    let app = pushrelay::routes::router(state);

    let listener = TcpListener::bind(("0.0.0.0", config.port))
        .await
        .expect("failed to bind");

    let actual_port = listener
        .local_addr()
        .expect("failed to get local address")
        .port();
    eprintln!("  \x1b[32m→ listening on 0.0.0.0:{actual_port}\x1b[0m");
    eprintln!();

    // Open streams never finish on their own, so the signal has to end the
    // sessions before the server can drain its connections.
    let shutdown = dispatcher.shutdown_token();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            tracing::info!("shutdown requested, closing open streams");
            shutdown.cancel();
        })
        .await
        .expect("server error");

    if !dispatcher.shutdown(SHUTDOWN_GRACE).await {
        tracing::warn!("some stream sessions did not exit within {SHUTDOWN_GRACE:?}");
    }
    if let Some(handle) = reaper_handle {
        let _ = handle.await;
    }

    let health = dispatcher.health();
    tracing::info!(
        recipients = health.recipient_count,
        pending = health.total_pending_commands,
        "stopped; undelivered in-memory commands are discarded"
    );
}

fn print_banner(config: &Config) {
    let version = env!("CARGO_PKG_VERSION");
    let sha = env!("RELAY_BUILD_SHA");
    let policy = match config.stream.policy {
        SessionPolicy::Shared => "shared",
        SessionPolicy::Exclusive => "exclusive",
    };
    let origins = if config.allowed_origins.is_empty() {
        "any".to_string()
    } else {
        config.allowed_origins.join(", ")
    };

    eprintln!();
    eprintln!("  \x1b[1;36mpushrelay\x1b[0m \x1b[2mv{version} ({sha})\x1b[0m");
    eprintln!();
    eprintln!("  \x1b[2mport\x1b[0m         {}", config.port);
    eprintln!(
        "  \x1b[2mheartbeat\x1b[0m    {:?}",
        config.stream.heartbeat_interval
    );
    eprintln!("  \x1b[2mpoll\x1b[0m         {:?}", config.stream.poll_interval);
    eprintln!("  \x1b[2msessions\x1b[0m     {policy}");
    eprintln!("  \x1b[2morigins\x1b[0m      {origins}");
    if let Some(ttl) = config.queue_idle_ttl {
        eprintln!("  \x1b[2mqueue ttl\x1b[0m    {ttl:?}");
    }
    eprintln!();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

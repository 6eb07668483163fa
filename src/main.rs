use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;

use dotenvy::dotenv;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use bloodshare::config::Config;
use bloodshare::database;
use bloodshare::services::notification_service::{HttpNotifier, LogNotifier, Notifier};
use bloodshare::state::AppState;
use bloodshare::web;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv().ok();

    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("bloodshare=info,tower_http=info")),
        )
        .init();

    let config = Config::load()?;

    info!(database_url = %config.database_url, "connecting to database");
    let pool = database::connect(&config.database_url).await?;

    let notifier: Arc<dyn Notifier> = if config.notifications_configured() {
        Arc::new(HttpNotifier::new(
            config.email.clone(),
            config.sms.clone(),
            config.notify_timeout(),
        )?)
    } else {
        warn!("no email or SMS credentials configured, notifications will only be logged");
        Arc::new(LogNotifier)
    };
    info!(notifier = notifier.name(), "notifier ready");

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let app = web::build_router(AppState::new(pool, config, notifier));

    let listener = TcpListener::bind(addr).await?;
    info!(address = %listener.local_addr()?, "server running");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("received Ctrl+C, shutting down"),
            Err(e) => {
                warn!(error = %e, "failed to install Ctrl+C handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                info!("received terminate signal, shutting down");
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
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

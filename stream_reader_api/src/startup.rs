use crate::api::create_router;
use crate::app_config::AppConfig;
use amqp_session::AmqpSessionFactory;
use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;
use stream_reader::manager::ConnectionManager;
use tokio::net::TcpListener;
use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub async fn run_until_stopped(config: AppConfig) -> Result<(), anyhow::Error> {
    let session_factory = Arc::new(AmqpSessionFactory::new(Duration::from_secs(
        config.connect_timeout_secs,
    )));
    let manager = Arc::new(
        ConnectionManager::new(config.connections, session_factory)
            .context("While creating connection manager")?,
    );

    let report = manager.connect(&CancellationToken::new()).await;
    for failed in report.failed() {
        error!("Connection {} is unavailable: {}", failed.id, failed.error);
    }
    if report.connected().is_empty() {
        warn!("No broker is reachable, only the connection list will be served");
    } else {
        info!("Connected to {}", report.connected().join(", "));
    }

    let address = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("While binding {address}"))?;
    info!("Listening {address}");

    let serve_result = axum::serve(listener, create_router(manager.clone()))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("While serving http api");

    info!("Closing connections");
    if let Err(e) = manager.close().await {
        error!("{e}");
    }

    serve_result
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Couldn't listen for Ctrl-C: {e:?}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                terminate.recv().await;
            }
            Err(e) => {
                error!("Couldn't listen for SIGTERM: {e:?}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}

use crate::api::routes;
use crate::config::SharedConfig;
use crate::directory::{Directory, Registrar};
use crate::dns::DnsGateway;
use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;

/// Grace period for in-flight HTTP requests once shutdown begins.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub(super) struct AppState {
    pub config: SharedConfig,
    pub directory: Arc<Directory>,
}

/// Bring the directory up and serve until SIGINT/SIGTERM.
///
/// Startup opens the DNS gateway, binds the API address, and self-registers
/// the directory's endpoints; a registration failure aborts before anything
/// is served. On shutdown the endpoint instances are deregistered first
/// (failures logged, never fatal), then the HTTP server drains with a
/// 10-second deadline.
pub async fn run(config: SharedConfig) -> anyhow::Result<()> {
    let gateway = DnsGateway::open(&config.dns_addr, &config.dns_keypath)?;
    let directory = Arc::new(Directory::new(Arc::new(gateway), &config.domain)?);
    let registrar = Registrar::new(Arc::clone(&directory), &config);

    let app = Router::new().nest(
        &config.root,
        routes::new(AppState {
            config: Arc::clone(&config),
            directory,
        }),
    );
    let server = axum::Server::try_bind(&config.api_bind_addr())?;

    tracing::info!("registering director's services in DNS ...");
    registrar.register_all().await?;
    tracing::info!("director's services have been registered");

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let serve = server
        .serve(app.into_make_service())
        .with_graceful_shutdown(async {
            let _ = shutdown_rx.await;
        });
    tracing::info!(
        "director server listening on http://{}{}",
        config.api_bind_addr(),
        config.root
    );
    let mut handle = tokio::spawn(serve);

    tokio::select! {
        result = &mut handle => {
            // The server stopped without a signal; surface what happened.
            result??;
            return Ok(());
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received");
        }
    }

    tracing::info!("deleting director's instances of services in DNS ...");
    registrar.deregister_all().await;
    tracing::info!("director's instances of services have been deleted");

    tracing::info!(
        "shutting down director server with {}s timeout ...",
        DRAIN_TIMEOUT.as_secs()
    );
    let _ = shutdown_tx.send(());
    match tokio::time::timeout(DRAIN_TIMEOUT, handle).await {
        Ok(result) => result??,
        Err(_) => tracing::warn!("drain deadline exceeded, abandoning open connections"),
    }
    tracing::info!("director server gracefully stopped");
    Ok(())
}

async fn shutdown_signal() {
    let interrupt = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
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
        _ = interrupt => {},
        _ = terminate => {},
    }
}

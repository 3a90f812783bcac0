use crate::{create_router, AppState};
use anyhow::{Context, Result};
use despacho_core::Settings;
use std::net::SocketAddr;
use tokio::{net::TcpListener, signal};
use tracing::{error, info, warn};

pub struct Server {
    state: AppState,
    addr: SocketAddr,
}

impl Server {
    pub async fn new(settings: Settings) -> Result<Self> {
        let addr: SocketAddr = format!("{}:{}", settings.server.host, settings.server.port)
            .parse()
            .context("invalid server.host/server.port")?;
        let state = AppState::new(settings).await?;
        Ok(Self::with_state(addr, state).await)
    }

    /// Makes sure the shared catalog is populated before serving. Failures are
    /// logged; registration retries the same step.
    pub async fn with_state(addr: SocketAddr, state: AppState) -> Self {
        if let Err(err) = state.seeder.ensure_default_templates_exist().await {
            warn!(error = %err, "Could not ensure default templates");
        }
        if let Err(err) = state.seeder.ensure_default_applicatives_exist().await {
            warn!(error = %err, "Could not ensure default applicatives");
        }
        Self { state, addr }
    }

    pub async fn run(self) -> Result<()> {
        let router = create_router(self.state);

        let listener = TcpListener::bind(self.addr)
            .await
            .with_context(|| format!("failed to bind {}", self.addr))?;

        info!("Despacho API listening on http://{}", self.addr);
        info!("  GET  /health");
        info!("  POST /api/auth/registro | /api/auth/login");
        info!("  /api/notas, /api/aplicativos, /api/admin (bearer token)");

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("server error")?;

        info!("Server stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!(error = %err, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                error!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received SIGTERM, shutting down");
        },
    }
}

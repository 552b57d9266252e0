use std::sync::Arc;

use {
    anyhow::Context,
    tokio::net::TcpListener,
    tracing::{error, info, warn},
};

use {
    barista_agents::MediaUnderstanding, barista_auto_reply::Debouncer,
    barista_catalog::CatalogStore, barista_sessions::SessionStore,
};

use crate::routes::build_router;

/// Shared state for all handlers.
#[derive(Clone)]
pub struct AppState {
    pub debouncer: Debouncer,
    pub sessions: Arc<dyn SessionStore>,
    pub catalog: Arc<dyn CatalogStore>,
    /// Transcription and image description; audio is rejected without it.
    pub media: Option<Arc<dyn MediaUnderstanding>>,
}

/// Serve until Ctrl-C or SIGTERM, then discard batches still waiting.
pub async fn serve(state: AppState, addr: &str) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(addr = %listener.local_addr()?, "gateway listening");

    let debouncer = state.debouncer.clone();
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    let dropped = debouncer.shutdown();
    if dropped > 0 {
        warn!(dropped, "pending batches dropped on shutdown");
    }
    info!("gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            },
            Err(e) => {
                error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            },
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("shutdown signal received");
}

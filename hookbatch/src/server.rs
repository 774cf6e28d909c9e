//! axumサーバー起動・シャットダウンハンドリング

use crate::cancel::CancelContext;
use crate::error::{AggregatorError, AggregatorResult};
use crate::AppState;
use tokio::net::TcpListener;
use tracing::{error, info};

/// アドレスにバインドしてサーバーを起動する
pub async fn run(
    state: AppState,
    bind_addr: &str,
    shutdown: CancelContext,
) -> AggregatorResult<()> {
    let listener = TcpListener::bind(bind_addr)
        .await
        .map_err(|e| AggregatorError::Internal(format!("Failed to bind {}: {}", bind_addr, e)))?;

    info!("Hookbatch server listening on {}", bind_addr);
    serve(listener, state, shutdown).await
}

/// バインド済みのリスナーで受け付け、シャットダウン後にエンジンを停止する
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    shutdown: CancelContext,
) -> AggregatorResult<()> {
    let engine = state.engine.clone();
    let app = crate::api::create_router(state);

    let result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await
        .map_err(|e| AggregatorError::Internal(format!("Server error: {}", e)));

    engine.shutdown().await;
    info!("Server shutdown complete");
    result
}

/// シャットダウンシグナルを待機
async fn shutdown_signal(shutdown: CancelContext) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
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
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down...");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down...");
        }
        cause = shutdown.cancelled() => {
            info!(cause = %cause, "Shutdown requested, shutting down...");
        }
    }
}

//! REST APIハンドラー
//!
//! 受信口（`/hook/*path`）と管理API（`/api/endpoints`）を提供する。
//! どちらもエンジンへの薄いアダプタで、集約の挙動は持たない。

pub mod endpoints;
pub mod error;
pub mod hooks;

use crate::AppState;
use axum::{
    routing::{any, get, post},
    Router,
};
use tower_http::trace::TraceLayer;

/// ルーターを構築
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/hook/*path", any(hooks::receive_hook))
        .route(
            "/api/endpoints",
            get(endpoints::list_endpoints).post(endpoints::create_endpoint),
        )
        .route(
            "/api/endpoints/:id",
            get(endpoints::get_endpoint).delete(endpoints::delete_endpoint),
        )
        .route("/api/endpoints/:id/pause", post(endpoints::pause_endpoint))
        .route("/api/endpoints/:id/resume", post(endpoints::resume_endpoint))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

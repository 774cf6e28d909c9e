//! エンドポイント管理API
//!
//! 一覧・登録・取得・削除・一時停止・再開

use crate::api::error::AppError;
use crate::error::AggregatorError;
use crate::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use hookbatch_common::error::CommonError;
use hookbatch_common::types::{EndpointConfig, EndpointSnapshot};
use reqwest::Url;
use serde::Deserialize;

/// エンドポイント登録リクエスト
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateEndpointRequest {
    /// ID（省略時は採番、既存IDなら置き換え）
    #[serde(default)]
    pub id: Option<String>,
    /// 表示名
    pub name: String,
    /// 受信パス
    pub listen_path: String,
    /// 配信先URL
    pub target_url: String,
    /// バッファ時間（秒）
    #[serde(default)]
    pub buffer_time_seconds: u64,
    /// 最大バッファ件数
    #[serde(default)]
    pub max_buffer_size: usize,
    /// 受信を受け付けるか
    #[serde(default = "default_is_active")]
    pub is_active: bool,
    /// cron式
    #[serde(default)]
    pub cron_expression: Option<String>,
}

fn default_is_active() -> bool {
    true
}

impl CreateEndpointRequest {
    /// 入力を検証して設定に変換
    ///
    /// cron式の検証はエンジン登録時に行う。
    pub fn into_config(self) -> Result<EndpointConfig, CommonError> {
        if self.name.trim().is_empty() {
            return Err(CommonError::Validation("Name is required".to_string()));
        }
        if self.listen_path.trim().is_empty() {
            return Err(CommonError::Validation("Listen path is required".to_string()));
        }
        if Url::parse(&self.target_url).is_err() {
            return Err(CommonError::Validation(format!(
                "Invalid target URL: {}",
                self.target_url
            )));
        }

        let mut config = EndpointConfig::new(self.name, self.listen_path, self.target_url)
            .with_buffer_time(self.buffer_time_seconds)
            .with_max_buffer_size(self.max_buffer_size);
        config.is_active = self.is_active;
        config.cron_expression = self.cron_expression;
        if let Some(id) = self.id {
            config.id = id;
        }
        Ok(config)
    }
}

fn not_found(id: &str) -> AppError {
    AppError(AggregatorError::EndpointNotFound(id.to_string()))
}

// --- Handlers ---

/// GET /api/endpoints - エンドポイント一覧（カウンタ付き）
pub async fn list_endpoints(State(state): State<AppState>) -> Json<Vec<EndpointSnapshot>> {
    Json(state.engine.list_endpoints().await)
}

/// POST /api/endpoints - エンドポイント登録
pub async fn create_endpoint(
    State(state): State<AppState>,
    Json(req): Json<CreateEndpointRequest>,
) -> Result<impl IntoResponse, AppError> {
    let config = req.into_config().map_err(AggregatorError::from)?;
    let snapshot = state.engine.register_endpoint(config).await?;
    Ok((StatusCode::CREATED, Json(snapshot)))
}

/// GET /api/endpoints/:id - エンドポイント取得
pub async fn get_endpoint(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<EndpointSnapshot>, AppError> {
    state
        .engine
        .get_endpoint(&id)
        .await
        .map(Json)
        .ok_or_else(|| not_found(&id))
}

/// DELETE /api/endpoints/:id - エンドポイント削除（未配信分は破棄）
pub async fn delete_endpoint(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    if state.engine.deregister_endpoint(&id).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found(&id))
    }
}

/// POST /api/endpoints/:id/pause - 受信停止
pub async fn pause_endpoint(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<EndpointSnapshot>, AppError> {
    if !state.engine.pause(&id).await {
        return Err(not_found(&id));
    }
    get_endpoint(State(state), Path(id)).await
}

/// POST /api/endpoints/:id/resume - 受信再開
pub async fn resume_endpoint(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<EndpointSnapshot>, AppError> {
    if !state.engine.resume(&id).await {
        return Err(not_found(&id));
    }
    get_endpoint(State(state), Path(id)).await
}

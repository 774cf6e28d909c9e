//! Webhook受信口
//!
//! `/hook/*path` に届いたリクエストを `/<path>` としてエンジンへ渡す。
//! ルーティング結果に関わらず常に 200 を返す。

use crate::engine::RouteOutcome;
use crate::AppState;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
};
use hookbatch_common::types::normalize_listen_path;
use std::collections::BTreeMap;
use tracing::debug;

/// ANY /hook/*path - Webhook受信
pub async fn receive_hook(
    State(state): State<AppState>,
    Path(path): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let listen_path = normalize_listen_path(&path);
    let body = decode_body(&body);

    let outcome = state
        .engine
        .route_inbound(&listen_path, body, collect_headers(&headers))
        .await;
    if let RouteOutcome::Routed { endpoint_id } = outcome {
        debug!(listen_path = %listen_path, endpoint_id = %endpoint_id, "Accepted webhook");
    }

    StatusCode::OK
}

/// 本文をUTF-8文字列にする
///
/// 不正なバイト列は置換文字に変換し、その旨をログに残す。
pub fn decode_body(body: &[u8]) -> String {
    match std::str::from_utf8(body) {
        Ok(text) => text.to_string(),
        Err(e) => {
            debug!(
                len = body.len(),
                valid_up_to = e.valid_up_to(),
                "Request body is not valid UTF-8; invalid bytes replaced"
            );
            String::from_utf8_lossy(body).into_owned()
        }
    }
}

/// 同名ヘッダーの値を `", "` で結合する
pub fn collect_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .keys()
        .map(|name| {
            let values: Vec<_> = headers
                .get_all(name)
                .iter()
                .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
                .collect();
            (name.as_str().to_string(), values.join(", "))
        })
        .collect()
}

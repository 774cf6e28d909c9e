//! 設定管理
//!
//! ServerConfig等の設定構造体

use serde::{Deserialize, Serialize};

/// サーバー設定
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerConfig {
    /// ホストアドレス (デフォルト: "0.0.0.0")
    #[serde(default = "default_host")]
    pub host: String,

    /// ポート番号 (デフォルト: 8085)
    #[serde(default = "default_port")]
    pub port: u16,

    /// エンドポイント設定ファイルの保存先 (デフォルト: "./hooks")
    #[serde(default = "default_config_dir")]
    pub config_dir: String,

    /// バッチ配信のタイムアウト（秒）(デフォルト: 30)
    #[serde(default = "default_delivery_timeout")]
    pub delivery_timeout_secs: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8085
}

fn default_config_dir() -> String {
    "./hooks".to_string()
}

fn default_delivery_timeout() -> u64 {
    30
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            config_dir: default_config_dir(),
            delivery_timeout_secs: default_delivery_timeout(),
        }
    }
}

impl ServerConfig {
    /// バインドアドレスを返す
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

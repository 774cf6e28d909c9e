//! エンドポイント設定の永続化
//!
//! 1エンドポイント = 1 JSONドキュメント（`hook_<id>.json`）。
//! スキーマのバージョニングは行わない。

use async_trait::async_trait;
use hookbatch_common::types::{is_valid_endpoint_id, EndpointConfig};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// 設定ファイル名の接頭辞
const FILE_PREFIX: &str = "hook_";

/// 設定ファイルの拡張子
const FILE_EXTENSION: &str = ".json";

/// 永続化エラー
#[derive(Debug, Error)]
pub enum StoreError {
    /// ファイル入出力エラー
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSONエラー
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// ファイル名に使えないID
    #[error("Invalid endpoint id for storage: {0:?}")]
    InvalidId(String),
}

/// 設定ストアのtrait
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// 保存済みの全設定を読み込む
    async fn load_all(&self) -> Result<Vec<EndpointConfig>, StoreError>;
    /// 設定を保存（同じIDは上書き）
    async fn save(&self, config: &EndpointConfig) -> Result<(), StoreError>;
    /// 指定IDの設定を削除（存在しなくてもエラーにしない）
    async fn delete(&self, id: &str) -> Result<(), StoreError>;
}

/// Arc でラップされた設定ストア
pub type SharedConfigStore = Arc<dyn ConfigStore>;

/// IDから設定ファイル名を決定する
pub fn file_name_for(id: &str) -> Result<String, StoreError> {
    if !is_valid_endpoint_id(id) {
        return Err(StoreError::InvalidId(id.to_string()));
    }
    Ok(format!("{}{}{}", FILE_PREFIX, id, FILE_EXTENSION))
}

fn id_from_file_name(name: &str) -> Option<&str> {
    name.strip_prefix(FILE_PREFIX)?
        .strip_suffix(FILE_EXTENSION)
        .filter(|id| !id.is_empty())
}

/// ディレクトリ内のJSONファイルによる設定ストア
#[derive(Debug, Clone)]
pub struct JsonFileConfigStore {
    dir: PathBuf,
}

impl JsonFileConfigStore {
    /// 保存先ディレクトリを指定して作成（ディレクトリは初回保存時に作成）
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// 保存先ディレクトリ
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &str) -> Result<PathBuf, StoreError> {
        Ok(self.dir.join(file_name_for(id)?))
    }
}

#[async_trait]
impl ConfigStore for JsonFileConfigStore {
    async fn load_all(&self) -> Result<Vec<EndpointConfig>, StoreError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(dir = %self.dir.display(), "Config directory does not exist yet");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if id_from_file_name(&name).is_some() {
                files.push((name, entry.path()));
            }
        }
        // 起動時の登録順を決定的にする
        files.sort_by(|a, b| a.0.cmp(&b.0));

        let mut configs = Vec::with_capacity(files.len());
        for (name, path) in files {
            let content = match tokio::fs::read(&path).await {
                Ok(content) => content,
                Err(e) => {
                    warn!(file = %path.display(), error = %e, "Failed to read endpoint config");
                    continue;
                }
            };
            match serde_json::from_slice::<EndpointConfig>(&content) {
                Ok(mut config) => {
                    if config.id.trim().is_empty() {
                        if let Some(id) = id_from_file_name(&name) {
                            config.id = id.to_string();
                        }
                    }
                    configs.push(config);
                }
                Err(e) => {
                    warn!(file = %path.display(), error = %e, "Skipping malformed endpoint config");
                }
            }
        }

        Ok(configs)
    }

    async fn save(&self, config: &EndpointConfig) -> Result<(), StoreError> {
        let path = self.path_for(&config.id)?;
        tokio::fs::create_dir_all(&self.dir).await?;

        let json = serde_json::to_vec_pretty(config)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &path).await?;

        debug!(endpoint_id = %config.id, file = %path.display(), "Saved endpoint config");
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let path = self.path_for(id)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// メモリ内の設定ストア（テスト・組み込み用）
#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    configs: RwLock<Vec<EndpointConfig>>,
}

impl MemoryConfigStore {
    /// 空のストアを作成
    pub fn new() -> Self {
        Self::default()
    }

    /// 初期設定を持つストアを作成
    pub fn with_configs(configs: Vec<EndpointConfig>) -> Self {
        Self {
            configs: RwLock::new(configs),
        }
    }

    /// 保存済みの設定を取得
    pub async fn get(&self, id: &str) -> Option<EndpointConfig> {
        self.configs.read().await.iter().find(|c| c.id == id).cloned()
    }

    /// 保存件数
    pub async fn len(&self) -> usize {
        self.configs.read().await.len()
    }

    /// 空かどうか
    pub async fn is_empty(&self) -> bool {
        self.configs.read().await.is_empty()
    }
}

#[async_trait]
impl ConfigStore for MemoryConfigStore {
    async fn load_all(&self) -> Result<Vec<EndpointConfig>, StoreError> {
        Ok(self.configs.read().await.clone())
    }

    async fn save(&self, config: &EndpointConfig) -> Result<(), StoreError> {
        let mut configs = self.configs.write().await;
        match configs.iter_mut().find(|c| c.id == config.id) {
            Some(existing) => *existing = config.clone(),
            None => configs.push(config.clone()),
        }
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.configs.write().await.retain(|c| c.id != id);
        Ok(())
    }
}

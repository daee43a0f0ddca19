use std::io;
use std::time::Duration;

use thiserror::Error;

/// 正確パーサー（外部プロセス）の失敗
///
/// どのバリアントもフォールバックスキャナーへの切り替えで回復できる。
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("exact parser is unavailable")]
    Unavailable,

    #[error("failed to spawn exact parser: {0}")]
    Spawn(#[from] io::Error),

    #[error("exact parser timed out after {0:?}")]
    Timeout(Duration),

    #[error("exact parser exited with {code:?}: {stderr}")]
    Exit { code: Option<i32>, stderr: String },

    #[error("exact parser reported {kind}: {message}")]
    Reported { kind: String, message: String },

    #[error("malformed exact parser output: {0}")]
    Decode(#[from] serde_json::Error),
}

/// キャッシュ操作エラー
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Deserialization error: {0}")]
    Deserialize(String),

    #[error("Cache version mismatch")]
    VersionMismatch,

    #[error("Cache not found")]
    NotFound,

    #[error("Stale cache: {0}")]
    Stale(String),
}

impl From<serde_json::Error> for CacheError {
    fn from(e: serde_json::Error) -> Self {
        CacheError::Deserialize(e.to_string())
    }
}

/// 設定エラー
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid glob pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: globset::Error,
    },

    #[error("Failed to build glob set: {0}")]
    GlobSet(#[from] globset::Error),
}

/// サーバー全体のエラー
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),
}

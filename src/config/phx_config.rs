use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use super::source_filter::SourceFilter;
use crate::error::ConfigError;

/// 正確パーサーを強制的に無効化する環境変数
pub const DISABLE_EXACT_PARSER_ENV: &str = "PHOENIX_LSP_DISABLE_EXACT_PARSER";

/// phxlsp.json の設定
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhxConfig {
    /// 解析対象のglobパターン（空の場合は全ファイル対象）
    #[serde(default)]
    pub include: Vec<String>,
    /// 追加の除外globパターン（`_build`、`deps`、隠しディレクトリなどは常に除外）
    #[serde(default)]
    pub exclude: Vec<String>,
    /// キャッシュ機能を有効にする（デフォルト: false）
    #[serde(default)]
    pub cache: bool,
    /// 連続した編集をまとめる待ち時間（ミリ秒）
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default)]
    pub parser: ParserConfig,
    /// 診断（警告表示）設定
    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,
}

/// 正確パーサー（外部プロセス）の設定
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParserConfig {
    #[serde(default = "default_true")]
    pub exact: bool,
    #[serde(default = "default_command")]
    pub command: String,
    /// パーサースクリプト（`components.exs` など）を置いたディレクトリ
    #[serde(default)]
    pub scripts_dir: Option<String>,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
    #[serde(default = "default_parse_timeout_ms")]
    pub parse_timeout_ms: u64,
    #[serde(default = "default_file_cache_size")]
    pub file_cache_size: usize,
    #[serde(default = "default_content_cache_size")]
    pub content_cache_size: usize,
}

/// 診断（警告表示）設定
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticsConfig {
    /// 診断機能を有効にする（デフォルト: true）
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// 診断の重要度: "error", "warning", "hint", "information"（デフォルト: "warning"）
    #[serde(default = "default_severity")]
    pub severity: String,
    #[serde(default = "default_true")]
    pub unknown_components: bool,
    #[serde(default = "default_true")]
    pub unknown_attributes: bool,
    #[serde(default = "default_true")]
    pub missing_required: bool,
    #[serde(default = "default_true")]
    pub loop_keys: bool,
    #[serde(default = "default_true")]
    pub verified_routes: bool,
}

fn default_true() -> bool {
    true
}

fn default_severity() -> String {
    "warning".to_string()
}

fn default_command() -> String {
    "elixir".to_string()
}

fn default_debounce_ms() -> u64 {
    300
}

fn default_max_concurrent() -> usize {
    10
}

fn default_probe_timeout_ms() -> u64 {
    2_000
}

fn default_parse_timeout_ms() -> u64 {
    10_000
}

fn default_file_cache_size() -> usize {
    200
}

fn default_content_cache_size() -> usize {
    100
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            exact: default_true(),
            command: default_command(),
            scripts_dir: None,
            max_concurrent: default_max_concurrent(),
            probe_timeout_ms: default_probe_timeout_ms(),
            parse_timeout_ms: default_parse_timeout_ms(),
            file_cache_size: default_file_cache_size(),
            content_cache_size: default_content_cache_size(),
        }
    }
}

impl ParserConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn parse_timeout(&self) -> Duration {
        Duration::from_millis(self.parse_timeout_ms)
    }

    /// 環境変数の値を反映した正確パーサーの有効/無効
    pub fn exact_enabled(&self, env_value: Option<&str>) -> bool {
        self.exact && !env_flag_set(env_value)
    }
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            severity: default_severity(),
            unknown_components: default_true(),
            unknown_attributes: default_true(),
            missing_required: default_true(),
            loop_keys: default_true(),
            verified_routes: default_true(),
        }
    }
}

impl Default for PhxConfig {
    fn default() -> Self {
        Self {
            include: Vec::new(),
            exclude: Vec::new(),
            cache: false,
            debounce_ms: default_debounce_ms(),
            parser: ParserConfig::default(),
            diagnostics: DiagnosticsConfig::default(),
        }
    }
}

impl PhxConfig {
    /// 指定ディレクトリからphxlsp.jsonを読み込む
    pub fn load_from_dir(dir: &Path) -> Self {
        let config_path = dir.join("phxlsp.json");
        Self::load_from_path(&config_path)
    }

    /// 指定パスからphxlsp.jsonを読み込む
    pub fn load_from_path(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!("Failed to parse phxlsp.json: {}", e);
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!("Failed to read phxlsp.json: {}", e);
                Self::default()
            }
        }
    }

    /// include/exclude からソースフィルターを作成
    pub fn source_filter(&self) -> Result<SourceFilter, ConfigError> {
        SourceFilter::new(&self.include, &self.exclude)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

/// 環境変数の値がフラグとして有効か
pub fn env_flag_set(value: Option<&str>) -> bool {
    matches!(
        value.map(|v| v.trim().to_ascii_lowercase()).as_deref(),
        Some("1") | Some("true") | Some("yes")
    )
}

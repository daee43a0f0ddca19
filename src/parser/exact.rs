use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::sync::OnceCell;
use tower_lsp::async_trait;
use tracing::{debug, info, warn};

use super::limiter::ConcurrencyLimiter;
use crate::config::ParserConfig;
use crate::error::ParseError;

/// 正確パーサーへの入力
#[derive(Debug, Clone, Copy)]
pub enum ExactInput<'a> {
    /// ファイルパスを引数で渡す
    File(&'a Path),
    /// 標準入力で内容を渡す（エディタ上の未保存バッファ）
    Content { path: &'a Path, content: &'a str },
}

impl ExactInput<'_> {
    pub fn path(&self) -> &Path {
        match self {
            ExactInput::File(path) => path,
            ExactInput::Content { path, .. } => path,
        }
    }
}

/// 完全な文法を理解する外部パーサー
#[async_trait]
pub trait ExactBackend: Send + Sync {
    /// 利用可能か（プロセス寿命中に一度だけ確認し、結果を保持する）
    async fn is_available(&self) -> bool;

    /// 解析を実行して標準出力のJSONを返す
    async fn run(&self, kind: &'static str, input: ExactInput<'_>) -> Result<Value, ParseError>;
}

/// `elixir <scripts_dir>/<kind>.exs <path>` を起動するバックエンド
pub struct SubprocessBackend {
    command: String,
    scripts_dir: Option<PathBuf>,
    probe_timeout: Duration,
    parse_timeout: Duration,
    limiter: Arc<ConcurrencyLimiter>,
    available: OnceCell<bool>,
    unavailable_logged: AtomicBool,
}

impl SubprocessBackend {
    pub fn new(config: &ParserConfig, limiter: Arc<ConcurrencyLimiter>) -> Self {
        Self {
            command: config.command.clone(),
            scripts_dir: config.scripts_dir.as_ref().map(PathBuf::from),
            probe_timeout: config.probe_timeout(),
            parse_timeout: config.parse_timeout(),
            limiter,
            available: OnceCell::new(),
            unavailable_logged: AtomicBool::new(false),
        }
    }

    fn script_path(&self, kind: &str) -> Option<PathBuf> {
        let dir = self.scripts_dir.as_ref()?;
        let script = dir.join(format!("{}.exs", kind));
        script.exists().then_some(script)
    }

    async fn probe(&self) -> bool {
        if self.scripts_dir.as_ref().is_none_or(|dir| !dir.is_dir()) {
            return false;
        }

        let mut command = Command::new(&self.command);
        command
            .arg("--version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let probe = async {
            let mut child = command.spawn()?;
            let status = child.wait().await?;
            Ok::<_, std::io::Error>(status)
        };

        match tokio::time::timeout(self.probe_timeout, probe).await {
            Ok(Ok(status)) if status.success() => {
                info!("Exact parser available: {}", self.command);
                true
            }
            Ok(Ok(status)) => {
                debug!("Exact parser probe exited with {}", status);
                false
            }
            Ok(Err(e)) => {
                debug!("Exact parser probe failed to spawn: {}", e);
                false
            }
            Err(_) => {
                debug!("Exact parser probe timed out after {:?}", self.probe_timeout);
                false
            }
        }
    }

    async fn spawn_and_collect(
        &self,
        script: &Path,
        input: ExactInput<'_>,
    ) -> Result<Value, ParseError> {
        let mut command = Command::new(&self.command);
        command
            .arg(script)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        match input {
            ExactInput::File(path) => {
                command.arg(path).stdin(Stdio::null());
            }
            ExactInput::Content { path, .. } => {
                command
                    .arg("--stdin")
                    .arg("--path")
                    .arg(path)
                    .stdin(Stdio::piped());
            }
        }

        let mut child = command.spawn()?;
        if let ExactInput::Content { content, .. } = input {
            if let Some(mut stdin) = child.stdin.take() {
                stdin.write_all(content.as_bytes()).await?;
                stdin.shutdown().await?;
            }
        }

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            return Err(ParseError::Exit {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        serde_json::from_slice(&output.stdout).map_err(|e| {
            debug!(
                "Malformed exact parser output for {}: {}",
                input.path().display(),
                String::from_utf8_lossy(&output.stdout)
            );
            ParseError::Decode(e)
        })
    }
}

#[async_trait]
impl ExactBackend for SubprocessBackend {
    async fn is_available(&self) -> bool {
        let available = *self.available.get_or_init(|| self.probe()).await;
        if !available && !self.unavailable_logged.swap(true, Ordering::SeqCst) {
            warn!("Exact parser unavailable, using fallback scanners");
        }
        available
    }

    async fn run(&self, kind: &'static str, input: ExactInput<'_>) -> Result<Value, ParseError> {
        if !self.is_available().await {
            return Err(ParseError::Unavailable);
        }
        let script = self.script_path(kind).ok_or(ParseError::Unavailable)?;

        self.limiter
            .run(async {
                match tokio::time::timeout(
                    self.parse_timeout,
                    self.spawn_and_collect(&script, input),
                )
                .await
                {
                    Ok(result) => result,
                    // タイムアウト時はfutureのdropでkill_on_dropが子プロセスを終了させる
                    Err(_) => Err(ParseError::Timeout(self.parse_timeout)),
                }
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(scripts_dir: Option<&Path>) -> ParserConfig {
        ParserConfig {
            command: "definitely-not-an-elixir-binary".to_string(),
            scripts_dir: scripts_dir.map(|p| p.to_string_lossy().to_string()),
            ..ParserConfig::default()
        }
    }

    #[tokio::test]
    async fn test_unavailable_without_scripts_dir() {
        let backend = SubprocessBackend::new(&config(None), Arc::new(ConcurrencyLimiter::new(1)));
        assert!(!backend.is_available().await);
        let result = backend
            .run("components", ExactInput::File(Path::new("/tmp/x.ex")))
            .await;
        assert!(matches!(result, Err(ParseError::Unavailable)));
    }

    #[tokio::test]
    async fn test_unavailable_when_command_missing() {
        let dir = tempfile::tempdir().unwrap();
        let backend = SubprocessBackend::new(
            &config(Some(dir.path())),
            Arc::new(ConcurrencyLimiter::new(1)),
        );
        assert!(!backend.is_available().await);
        // 二回目はキャッシュされた結果を返す
        assert!(!backend.is_available().await);
    }
}

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use serde_json::Value;
use tracing::warn;

use super::cache::BoundedCache;
use super::exact::{ExactBackend, ExactInput, SubprocessBackend};
use super::kind::ParseKind;
use super::limiter::ConcurrencyLimiter;
use super::payload::decode_payload;
use crate::config::{DISABLE_EXACT_PARSER_ENV, ParserConfig};
use crate::error::ParseError;
use crate::util::content_hash;

/// 結果を生成した戦略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Exact,
    Fallback,
}

#[derive(Debug, Clone)]
pub struct Parsed<M> {
    pub metadata: M,
    pub strategy: Strategy,
}

type FileKey = (&'static str, PathBuf, SystemTime);
type ContentKey = (&'static str, String);

/// 正確パーサーとフォールバックスキャナーを組み合わせる
///
/// 正確パーサーが無効・利用不可・失敗した場合は必ずフォールバックの結果を返す。
pub struct ParserGateway {
    exact: Option<Arc<dyn ExactBackend>>,
    file_cache: BoundedCache<FileKey, Arc<Value>>,
    content_cache: BoundedCache<ContentKey, Arc<Value>>,
}

impl ParserGateway {
    /// 設定と環境変数からゲートウェイを作成
    pub fn from_config(config: &ParserConfig, limiter: Arc<ConcurrencyLimiter>) -> Self {
        let env_value = std::env::var(DISABLE_EXACT_PARSER_ENV).ok();
        if !config.exact_enabled(env_value.as_deref()) {
            return Self::fallback_only();
        }
        let backend: Arc<dyn ExactBackend> = Arc::new(SubprocessBackend::new(config, limiter));
        Self::with_backend(backend, config.file_cache_size, config.content_cache_size)
    }

    pub fn with_backend(
        backend: Arc<dyn ExactBackend>,
        file_cache_size: usize,
        content_cache_size: usize,
    ) -> Self {
        Self {
            exact: Some(backend),
            file_cache: BoundedCache::new(file_cache_size),
            content_cache: BoundedCache::new(content_cache_size),
        }
    }

    /// フォールバックスキャナーのみを使う
    pub fn fallback_only() -> Self {
        Self {
            exact: None,
            file_cache: BoundedCache::new(0),
            content_cache: BoundedCache::new(0),
        }
    }

    pub fn exact_enabled(&self) -> bool {
        self.exact.is_some()
    }

    async fn backend(&self) -> Result<&Arc<dyn ExactBackend>, ParseError> {
        let backend = self.exact.as_ref().ok_or(ParseError::Unavailable)?;
        if !backend.is_available().await {
            return Err(ParseError::Unavailable);
        }
        Ok(backend)
    }

    /// 正確パーサーのみで内容を解析（標準入力経由、内容ハッシュでキャッシュ）
    pub async fn parse_exact<K: ParseKind>(
        &self,
        path: &Path,
        content: &str,
    ) -> Result<K::Metadata, ParseError> {
        let backend = self.backend().await?;
        let key = (K::NAME, content_hash(content));
        if let Some(cached) = self.content_cache.get(&key) {
            return decode_payload(Value::clone(&cached));
        }

        let value = backend
            .run(K::NAME, ExactInput::Content { path, content })
            .await?;
        let metadata = decode_payload::<K::Metadata>(value.clone())?;
        self.content_cache.set(key, Arc::new(value));
        Ok(metadata)
    }

    /// 正確パーサーのみでファイルを解析（パスと更新時刻でキャッシュ）
    pub async fn parse_file_exact<K: ParseKind>(
        &self,
        path: &Path,
    ) -> Result<K::Metadata, ParseError> {
        let backend = self.backend().await?;
        let mtime = tokio::fs::metadata(path).await?.modified()?;
        let key = (K::NAME, path.to_path_buf(), mtime);
        if let Some(cached) = self.file_cache.get(&key) {
            return decode_payload(Value::clone(&cached));
        }

        let value = backend.run(K::NAME, ExactInput::File(path)).await?;
        let metadata = decode_payload::<K::Metadata>(value.clone())?;
        self.file_cache.set(key, Arc::new(value));
        Ok(metadata)
    }

    /// エディタ上の内容を解析
    pub async fn parse<K: ParseKind>(&self, path: &Path, content: &str) -> Parsed<K::Metadata> {
        let result = self.parse_exact::<K>(path, content).await;
        Self::or_fallback::<K>(result, path, content)
    }

    /// ディスク上のファイルを解析（`content` はフォールバック用）
    pub async fn parse_file<K: ParseKind>(&self, path: &Path, content: &str) -> Parsed<K::Metadata> {
        let result = self.parse_file_exact::<K>(path).await;
        Self::or_fallback::<K>(result, path, content)
    }

    fn or_fallback<K: ParseKind>(
        result: Result<K::Metadata, ParseError>,
        path: &Path,
        content: &str,
    ) -> Parsed<K::Metadata> {
        match result {
            Ok(metadata) => Parsed {
                metadata,
                strategy: Strategy::Exact,
            },
            Err(e) => {
                if !matches!(e, ParseError::Unavailable) {
                    warn!(
                        "Exact {} parse failed for {}: {}",
                        K::NAME,
                        path.display(),
                        e
                    );
                }
                Parsed {
                    metadata: K::scan(path, content),
                    strategy: Strategy::Fallback,
                }
            }
        }
    }

    pub fn clear_caches(&self) {
        self.file_cache.clear();
        self.content_cache.clear();
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tower_lsp::async_trait;

    use super::*;

    /// 呼び出し回数を数えるテスト用バックエンド
    pub struct CountingBackend {
        pub calls: AtomicUsize,
        pub available: bool,
        responses: Mutex<Vec<Result<Value, String>>>,
        default: Value,
    }

    impl CountingBackend {
        pub fn returning(default: Value) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                available: true,
                responses: Mutex::new(Vec::new()),
                default,
            }
        }

        pub fn unavailable() -> Self {
            Self {
                available: false,
                ..Self::returning(Value::Null)
            }
        }

        /// 次回以降の応答を順に設定（Errは非ゼロ終了として扱う）
        pub fn push_response(&self, response: Result<Value, String>) {
            self.responses.lock().unwrap().push(response);
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ExactBackend for CountingBackend {
        async fn is_available(&self) -> bool {
            self.available
        }

        async fn run(&self, _kind: &'static str, _input: ExactInput<'_>) -> Result<Value, ParseError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                return Ok(self.default.clone());
            }
            match responses.remove(0) {
                Ok(value) => Ok(value),
                Err(stderr) => Err(ParseError::Exit {
                    code: Some(1),
                    stderr,
                }),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::CountingBackend;
    use super::*;
    use crate::parser::kind::{Components, Controllers};
    use serde_json::json;

    const CORE: &str = r#"defmodule MyAppWeb.CoreComponents do
  use Phoenix.Component

  attr :type, :string, default: nil
  def button(assigns) do
    ~H"""
    <button type={@type}><%= render_slot(@inner_block) %></button>
    """
  end
end
"#;

    fn exact_payload() -> Value {
        json!({
            "components": [{
                "name": "exact_button",
                "moduleName": "MyAppWeb.CoreComponents",
                "line": 5
            }]
        })
    }

    #[tokio::test]
    async fn test_exact_result_is_used_and_cached_by_content() {
        let backend = Arc::new(CountingBackend::returning(exact_payload()));
        let gateway = ParserGateway::with_backend(backend.clone(), 10, 10);
        let path = Path::new("/app/lib/my_app_web/components/core_components.ex");

        let first = gateway.parse::<Components>(path, CORE).await;
        let second = gateway.parse::<Components>(path, CORE).await;

        assert_eq!(first.strategy, Strategy::Exact);
        assert_eq!(second.metadata.components[0].name, "exact_button");
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test]
    async fn test_error_payload_falls_back_to_scanner() {
        let backend = Arc::new(CountingBackend::returning(
            json!({ "error": true, "message": "boom", "type": "CompileError" }),
        ));
        let gateway = ParserGateway::with_backend(backend, 10, 10);
        let path = Path::new("/app/lib/my_app_web/components/core_components.ex");

        let parsed = gateway.parse::<Components>(path, CORE).await;
        assert_eq!(parsed.strategy, Strategy::Fallback);
        assert_eq!(parsed.metadata.components[0].name, "button");
    }

    #[tokio::test]
    async fn test_subprocess_failure_does_not_disable_exact_parser() {
        let backend = Arc::new(CountingBackend::returning(exact_payload()));
        backend.push_response(Err("crashed".to_string()));
        let gateway = ParserGateway::with_backend(backend.clone(), 0, 0);
        let path = Path::new("/app/lib/my_app_web/components/core_components.ex");

        let failed = gateway.parse::<Components>(path, CORE).await;
        let recovered = gateway.parse::<Components>(path, CORE).await;

        assert_eq!(failed.strategy, Strategy::Fallback);
        assert_eq!(recovered.strategy, Strategy::Exact);
        assert_eq!(backend.calls(), 2);
    }

    #[tokio::test]
    async fn test_unavailable_backend_never_runs() {
        let backend = Arc::new(CountingBackend::unavailable());
        let gateway = ParserGateway::with_backend(backend.clone(), 10, 10);
        let parsed = gateway
            .parse::<Components>(Path::new("/app/lib/x.ex"), CORE)
            .await;
        assert_eq!(parsed.strategy, Strategy::Fallback);
        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test]
    async fn test_fallback_only_extracts_render_assigns() {
        let gateway = ParserGateway::fallback_only();
        let source = r#"defmodule MyAppWeb.UserController do
  use MyAppWeb, :controller

  def index(conn, _params) do
    users = Accounts.list_users()
    render(conn, :index, user: hd(users), page_title: "Users")
  end
end
"#;
        let parsed = gateway
            .parse::<Controllers>(
                Path::new("/app/lib/my_app_web/controllers/user_controller.ex"),
                source,
            )
            .await;
        assert_eq!(parsed.strategy, Strategy::Fallback);
        let renders: Vec<_> = parsed
            .metadata
            .controllers
            .iter()
            .flat_map(|c| c.renders.iter())
            .collect();
        assert!(!renders.is_empty());
        assert_eq!(renders[0].assign_names(), vec!["user", "page_title"]);
    }

    #[tokio::test]
    async fn test_file_parse_cached_by_mtime() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("core_components.ex");
        std::fs::write(&path, CORE).unwrap();

        let backend = Arc::new(CountingBackend::returning(exact_payload()));
        let gateway = ParserGateway::with_backend(backend.clone(), 10, 10);
        gateway.parse_file::<Components>(&path, CORE).await;
        gateway.parse_file::<Components>(&path, CORE).await;
        assert_eq!(backend.calls(), 1);
    }
}

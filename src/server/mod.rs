mod debounce;
mod progress;
pub mod workspace;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::RwLock;
use tower_lsp::jsonrpc::Result;
use tower_lsp::lsp_types::*;
use tower_lsp::{Client, LanguageServer};
use tracing::{debug, info, warn};

use crate::cache::{CacheLoader, CacheValidation, CacheWriter};
use crate::config::{DiagnosticsConfig, PhxConfig, SourceFilter};
use crate::error::{CacheError, ServerError};
use crate::handler::{CompletionHandler, DefinitionHandler, DiagnosticsHandler};
use crate::index::Index;
use crate::markup::{UsageExtractor, has_template, template_text};
use crate::parser::{ConcurrencyLimiter, ParserGateway};
use crate::util::{is_heex_file, path_from_uri};

pub use debounce::Debouncer;
use progress::Progress;
use workspace::collect_files;

const REFRESH_COMMAND: &str = "phoenix-lsp.refreshIndex";

pub struct Backend {
    client: Client,
    index: Arc<Index>,
    extractor: Arc<UsageExtractor>,
    gateway: RwLock<Arc<ParserGateway>>,
    root: RwLock<Option<PathBuf>>,
    config: RwLock<PhxConfig>,
    source_filter: RwLock<SourceFilter>,
    documents: Arc<DashMap<Url, String>>,
    debouncer: RwLock<Debouncer<Url>>,
}

/// デバウンス後のタスクに渡す共有ハンドル
#[derive(Clone)]
struct DocumentSync {
    client: Client,
    index: Arc<Index>,
    extractor: Arc<UsageExtractor>,
    gateway: Arc<ParserGateway>,
    documents: Arc<DashMap<Url, String>>,
    diagnostics: DiagnosticsConfig,
}

impl DocumentSync {
    /// 最新のバッファでレジストリと構造木を更新し、診断を送る
    async fn refresh(&self, uri: &Url, path: &Path, tracked: bool) {
        let Some(text) = self.documents.get(uri).map(|doc| doc.value().clone()) else {
            return;
        };

        let changed = tracked && self.index.update_file(&self.gateway, path, &text).await;
        if has_template(path, &text) {
            self.extractor.rebuild_tree(uri.as_str(), &template_text(path, &text));
        } else {
            self.extractor.invalidate(uri.as_str());
        }

        self.publish_diagnostics(uri, path, &text).await;
        if changed {
            debug!("Registries changed by {}, republishing open documents", path.display());
            self.republish_others(uri).await;
        }
    }

    async fn publish_diagnostics(&self, uri: &Url, path: &Path, text: &str) {
        let handler = DiagnosticsHandler::new(
            Arc::clone(&self.index),
            Arc::clone(&self.extractor),
            self.diagnostics.clone(),
        );
        let diagnostics = handler.diagnose(path, uri.as_str(), text);
        self.client
            .publish_diagnostics(uri.clone(), diagnostics, None)
            .await;
    }

    async fn republish_others(&self, current: &Url) {
        let open: Vec<(Url, String)> = self
            .documents
            .iter()
            .filter(|entry| entry.key() != current)
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        for (uri, text) in open {
            if let Some(path) = path_from_uri(&uri) {
                self.publish_diagnostics(&uri, &path, &text).await;
            }
        }
    }
}

impl Backend {
    pub fn new(client: Client) -> Self {
        let config = PhxConfig::default();
        Self {
            client,
            index: Arc::new(Index::new()),
            extractor: Arc::new(UsageExtractor::default()),
            gateway: RwLock::new(Arc::new(ParserGateway::fallback_only())),
            root: RwLock::new(None),
            debouncer: RwLock::new(Debouncer::new(config.debounce())),
            config: RwLock::new(config),
            source_filter: RwLock::new(SourceFilter::default()),
            documents: Arc::new(DashMap::new()),
        }
    }

    async fn document_sync(&self) -> DocumentSync {
        DocumentSync {
            client: self.client.clone(),
            index: Arc::clone(&self.index),
            extractor: Arc::clone(&self.extractor),
            gateway: Arc::clone(&*self.gateway.read().await),
            documents: Arc::clone(&self.documents),
            diagnostics: self.config.read().await.diagnostics.clone(),
        }
    }

    async fn is_tracked(&self, path: &Path) -> bool {
        let root = self.root.read().await;
        self.source_filter.read().await.tracks(path, root.as_deref())
    }

    /// 編集をデバウンスしてから反映
    async fn on_change(&self, uri: Url, text: String) {
        self.documents.insert(uri.clone(), text);
        let Some(path) = path_from_uri(&uri) else {
            return;
        };
        let tracked = self.is_tracked(&path).await;
        let sync = self.document_sync().await;
        let debouncer = self.debouncer.read().await.clone();

        tokio::spawn(async move {
            let ran = debouncer
                .run(uri.clone(), sync.refresh(&uri, &path, tracked))
                .await;
            if !ran {
                debug!("Superseded update for {}", uri);
            }
        });
    }

    /// 設定、ソースフィルター、パーサーゲートウェイ、デバウンサーを準備
    async fn configure(&self, root: &Path) {
        let config = PhxConfig::load_from_dir(root);
        info!(
            "Loaded config: cache={}, exact parser={}, debounce={}ms",
            config.cache, config.parser.exact, config.debounce_ms
        );

        match config.source_filter() {
            Ok(filter) => *self.source_filter.write().await = filter,
            Err(e) => warn!("Invalid include/exclude patterns, using defaults: {}", e),
        }

        let limiter = Arc::new(ConcurrencyLimiter::new(config.parser.max_concurrent));
        let gateway = ParserGateway::from_config(&config.parser, limiter);
        info!("Exact parser enabled: {}", gateway.exact_enabled());
        *self.gateway.write().await = Arc::new(gateway);

        let debouncer = self.debouncer.read().await.with_delay(config.debounce());
        *self.debouncer.write().await = debouncer;
        *self.config.write().await = config;
    }

    fn load_cache(&self, root: &Path) -> std::result::Result<CacheValidation, ServerError> {
        Ok(CacheLoader::new(root).load_into(&self.index)?)
    }

    async fn save_cache(&self) -> std::result::Result<Option<PathBuf>, ServerError> {
        if !self.config.read().await.cache {
            return Ok(None);
        }
        let Some(root) = self.root.read().await.clone() else {
            return Ok(None);
        };
        Ok(Some(CacheWriter::new(&root).save(&self.index)?))
    }

    async fn scan_workspace(&self) {
        let Some(root) = self.root.read().await.clone() else {
            return;
        };
        self.client
            .log_message(MessageType::INFO, format!("Scanning workspace: {}", root.display()))
            .await;

        let progress = Progress::begin(
            &self.client,
            "phoenix-indexing",
            "Indexing Phoenix project",
            Some("Collecting files...".to_string()),
        )
        .await;

        let files = {
            let filter = self.source_filter.read().await;
            collect_files(&root, &filter)
        };
        progress
            .report(format!("Parsing {} files", files.len()), 10)
            .await;

        let gateway = Arc::clone(&*self.gateway.read().await);
        let registrations = self.index.scan_workspace(&gateway, &root, &files).await;

        let message = format!(
            "Indexed {} files: {} components, {} routes, {} schemas",
            files.len(),
            self.index.components.registry().entity_count(),
            self.index.routes.registry().entity_count(),
            self.index.schemas.registry().entity_count(),
        );
        debug!("{} file registrations", registrations);
        progress.end(message.clone()).await;
        self.client.log_message(MessageType::INFO, message).await;
    }

    async fn persist_cache(&self) {
        match self.save_cache().await {
            Ok(Some(path)) => info!("Cache saved to {}", path.display()),
            Ok(None) => {}
            Err(e) => {
                self.client
                    .log_message(MessageType::WARNING, format!("Failed to save cache: {}", e))
                    .await;
            }
        }
    }

    /// ディスク上の変更をインデックスへ反映（開いているバッファは優先）
    async fn on_file_event(&self, uri: &Url, change: FileChangeType) {
        let Some(path) = path_from_uri(uri) else {
            return;
        };
        if !self.is_tracked(&path).await {
            return;
        }
        let gateway = Arc::clone(&*self.gateway.read().await);

        if change == FileChangeType::DELETED {
            self.index.remove_file(&path);
            self.extractor.invalidate(uri.as_str());
        } else if !self.documents.contains_key(uri) {
            match tokio::fs::read_to_string(&path).await {
                Ok(content) => {
                    self.index.update_file(&gateway, &path, &content).await;
                }
                Err(e) => debug!("Failed to read {}: {}", path.display(), e),
            }
        }

        if is_heex_file(&path) && change != FileChangeType::CHANGED {
            self.index.refresh_templates_near(&gateway, &path).await;
        }
    }

    async fn register_file_watchers(&self) {
        let options = DidChangeWatchedFilesRegistrationOptions {
            watchers: vec![FileSystemWatcher {
                glob_pattern: GlobPattern::String("**/*.{ex,exs,heex}".to_string()),
                kind: None,
            }],
        };
        let registration = Registration {
            id: "phoenix-lsp-watch".to_string(),
            method: "workspace/didChangeWatchedFiles".to_string(),
            register_options: serde_json::to_value(options).ok(),
        };
        if let Err(e) = self.client.register_capability(vec![registration]).await {
            debug!("File watcher registration failed: {}", e);
        }
    }

    fn document(&self, uri: &Url) -> Option<(PathBuf, String)> {
        let text = self.documents.get(uri)?.value().clone();
        Some((path_from_uri(uri)?, text))
    }
}

#[tower_lsp::async_trait]
impl LanguageServer for Backend {
    async fn initialize(&self, params: InitializeParams) -> Result<InitializeResult> {
        #[allow(deprecated)]
        let root = params
            .root_uri
            .or_else(|| {
                params
                    .workspace_folders
                    .as_ref()?
                    .first()
                    .map(|f| f.uri.clone())
            })
            .and_then(|uri| path_from_uri(&uri));

        if let Some(ref root) = root {
            self.configure(root).await;
            if self.config.read().await.cache {
                match self.load_cache(root) {
                    Ok(validation) => info!(
                        "Cache restored: {} valid, {} to rescan",
                        validation.valid_files.len(),
                        validation.invalid_files.len()
                    ),
                    Err(ServerError::Cache(CacheError::NotFound)) => debug!("No cache yet"),
                    Err(e) => warn!("Ignoring cache: {}", e),
                }
            }
        }
        *self.root.write().await = root;

        Ok(InitializeResult {
            server_info: Some(ServerInfo {
                name: "phoenix-lsp".to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
            capabilities: ServerCapabilities {
                text_document_sync: Some(TextDocumentSyncCapability::Kind(
                    TextDocumentSyncKind::FULL,
                )),
                definition_provider: Some(OneOf::Left(true)),
                completion_provider: Some(CompletionOptions {
                    trigger_characters: Some(vec![
                        ".".to_string(),
                        ":".to_string(),
                        "/".to_string(),
                        "\"".to_string(),
                    ]),
                    ..Default::default()
                }),
                execute_command_provider: Some(ExecuteCommandOptions {
                    commands: vec![REFRESH_COMMAND.to_string()],
                    work_done_progress_options: Default::default(),
                }),
                ..Default::default()
            },
        })
    }

    async fn initialized(&self, _params: InitializedParams) {
        self.client
            .log_message(MessageType::INFO, "Phoenix Language Server initialized")
            .await;
        self.register_file_watchers().await;
        self.scan_workspace().await;
        self.persist_cache().await;
    }

    async fn execute_command(
        &self,
        params: ExecuteCommandParams,
    ) -> Result<Option<serde_json::Value>> {
        match params.command.as_str() {
            REFRESH_COMMAND => {
                self.index.clear();
                self.extractor.clear();
                self.gateway.read().await.clear_caches();
                self.scan_workspace().await;
                self.persist_cache().await;
                Ok(Some(serde_json::json!({ "success": true })))
            }
            _ => {
                self.client
                    .log_message(
                        MessageType::WARNING,
                        format!("Unknown command: {}", params.command),
                    )
                    .await;
                Ok(None)
            }
        }
    }

    async fn shutdown(&self) -> Result<()> {
        self.persist_cache().await;
        Ok(())
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        self.on_change(params.text_document.uri, params.text_document.text)
            .await;
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        if let Some(change) = params.content_changes.into_iter().next() {
            self.on_change(params.text_document.uri, change.text).await;
        }
    }

    async fn did_save(&self, params: DidSaveTextDocumentParams) {
        if let Some(text) = params.text {
            self.on_change(params.text_document.uri, text).await;
        }
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        let uri = params.text_document.uri;
        self.documents.remove(&uri);
        self.debouncer.read().await.cancel(&uri);
        self.extractor.invalidate(uri.as_str());
        // 保存されなかった編集を捨ててディスクの内容に戻す
        self.on_file_event(&uri, FileChangeType::CHANGED).await;
    }

    async fn did_change_watched_files(&self, params: DidChangeWatchedFilesParams) {
        for event in params.changes {
            self.on_file_event(&event.uri, event.typ).await;
        }
    }

    async fn completion(&self, params: CompletionParams) -> Result<Option<CompletionResponse>> {
        let uri = &params.text_document_position.text_document.uri;
        let Some((path, text)) = self.document(uri) else {
            return Ok(None);
        };
        let handler = CompletionHandler::new(Arc::clone(&self.index), Arc::clone(&self.extractor));
        Ok(handler.complete(
            &path,
            uri.as_str(),
            &text,
            params.text_document_position.position,
        ))
    }

    async fn goto_definition(
        &self,
        params: GotoDefinitionParams,
    ) -> Result<Option<GotoDefinitionResponse>> {
        let uri = &params.text_document_position_params.text_document.uri;
        let Some((path, text)) = self.document(uri) else {
            return Ok(None);
        };
        let handler = DefinitionHandler::new(Arc::clone(&self.index), Arc::clone(&self.extractor));
        Ok(handler.goto_definition(
            &path,
            uri.as_str(),
            &text,
            params.text_document_position_params.position,
        ))
    }
}

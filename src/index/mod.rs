//! エンティティ種類ごとの増分レジストリ

pub mod component_store;
pub mod controller_store;
pub mod event_store;
pub mod registry;
pub mod route_store;
pub mod schema_store;
pub mod template_store;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

pub use component_store::{ComponentKind, ComponentStore};
pub use controller_store::{ControllerKind, ControllerStore};
pub use event_store::{EventStore, LiveEventKind, collect_event_references};
pub use registry::{FileRegistry, RegistryKind, RegistrySnapshot, Store};
pub use route_store::{RouteKind, RouteStore};
pub use schema_store::{SchemaKind, SchemaStore};
pub use template_store::{TemplateEntryKind, TemplateStore};

use crate::model::{Component, ControllerInfo, Event, Route, SchemaInfo, TemplateInfo};
use crate::parser::ParserGateway;

/// 全ストアのスナップショット（キャッシュ保存用）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexSnapshot {
    #[serde(default)]
    pub components: RegistrySnapshot<Component>,
    #[serde(default)]
    pub routes: RegistrySnapshot<Route>,
    #[serde(default)]
    pub events: RegistrySnapshot<Event>,
    #[serde(default)]
    pub schemas: RegistrySnapshot<SchemaInfo>,
    #[serde(default)]
    pub templates: RegistrySnapshot<TemplateInfo>,
    #[serde(default)]
    pub controllers: RegistrySnapshot<ControllerInfo>,
}

impl IndexSnapshot {
    /// 記録されている全ファイルとハッシュ
    pub fn files(&self) -> Vec<&PathBuf> {
        let mut files: Vec<&PathBuf> = self
            .components
            .hashes
            .iter()
            .chain(self.routes.hashes.iter())
            .chain(self.events.hashes.iter())
            .chain(self.schemas.hashes.iter())
            .chain(self.templates.hashes.iter())
            .chain(self.controllers.hashes.iter())
            .map(|(path, _)| path)
            .collect();
        files.sort();
        files.dedup();
        files
    }

    pub fn retain_files(&mut self, keep: impl Fn(&Path) -> bool) {
        self.components.retain_files(&keep);
        self.routes.retain_files(&keep);
        self.events.retain_files(&keep);
        self.schemas.retain_files(&keep);
        self.templates.retain_files(&keep);
        self.controllers.retain_files(&keep);
    }
}

/// 全ストアを束ねるインデックス
pub struct Index {
    pub components: ComponentStore,
    pub routes: RouteStore,
    pub events: EventStore,
    pub schemas: SchemaStore,
    pub templates: TemplateStore,
    pub controllers: ControllerStore,
}

impl Index {
    pub fn new() -> Self {
        Self {
            components: ComponentStore::new(),
            routes: RouteStore::new(),
            events: EventStore::new(),
            schemas: SchemaStore::new(),
            templates: TemplateStore::new(),
            controllers: ControllerStore::new(),
        }
    }

    /// 対象となる全ストアでファイルを更新し、どれかが再解析したかを返す
    pub async fn update_file(&self, gateway: &ParserGateway, path: &Path, content: &str) -> bool {
        let (components, routes, events, schemas, templates, controllers) = tokio::join!(
            async {
                self.components.is_candidate(path)
                    && self.components.update_file(gateway, path, content).await
            },
            async {
                self.routes.is_candidate(path)
                    && self.routes.update_file(gateway, path, content).await
            },
            async {
                self.events.is_candidate(path)
                    && self.events.update_file(gateway, path, content).await
            },
            async {
                self.schemas.is_candidate(path)
                    && self.schemas.update_file(gateway, path, content).await
            },
            async {
                self.templates.is_candidate(path)
                    && self.templates.update_file(gateway, path, content).await
            },
            async {
                self.controllers.is_candidate(path)
                    && self.controllers.update_file(gateway, path, content).await
            },
        );
        components || routes || events || schemas || templates || controllers
    }

    pub fn remove_file(&self, path: &Path) -> bool {
        let removed = [
            self.components.remove_file(path),
            self.routes.remove_file(path),
            self.events.remove_file(path),
            self.schemas.remove_file(path),
            self.templates.remove_file(path),
            self.controllers.remove_file(path),
        ];
        removed.iter().any(|r| *r)
    }

    /// 6種類のスキャンを並行して実行
    pub async fn scan_workspace(
        &self,
        gateway: &Arc<ParserGateway>,
        root: &Path,
        files: &[PathBuf],
    ) -> usize {
        let (components, routes, events, schemas, templates, controllers) = tokio::join!(
            self.components.scan_workspace(gateway, root, files),
            self.routes.scan_workspace(gateway, root, files),
            self.events.scan_workspace(gateway, root, files),
            self.schemas.scan_workspace(gateway, root, files),
            self.templates.scan_workspace(gateway, root, files),
            self.controllers.scan_workspace(gateway, root, files),
        );
        let total = components + routes + events + schemas + templates + controllers;
        info!("Workspace scan complete: {} file registrations", total);
        total
    }

    /// .heex ファイルの追加・削除時、同じ場所にあるテンプレート所有モジュールを再解析
    pub async fn refresh_templates_near(&self, gateway: &ParserGateway, heex: &Path) {
        let mut dirs = Vec::new();
        if let Some(dir) = heex.parent() {
            dirs.push(dir);
            if let Some(parent) = dir.parent() {
                dirs.push(parent);
            }
        }
        for dir in dirs {
            for file in self.templates.module_files_in(dir) {
                self.templates.remove_file(&file);
                if let Ok(content) = tokio::fs::read_to_string(&file).await {
                    self.templates.update_file(gateway, &file, &content).await;
                }
            }
        }
    }

    pub fn serialize_for_cache(&self) -> IndexSnapshot {
        IndexSnapshot {
            components: self.components.snapshot(),
            routes: self.routes.snapshot(),
            events: self.events.snapshot(),
            schemas: self.schemas.snapshot(),
            templates: self.templates.snapshot(),
            controllers: self.controllers.snapshot(),
        }
    }

    pub fn load_from_cache(&self, snapshot: IndexSnapshot) {
        self.components.restore(snapshot.components);
        self.routes.restore(snapshot.routes);
        self.events.restore(snapshot.events);
        self.schemas.restore(snapshot.schemas);
        self.templates.restore(snapshot.templates);
        self.controllers.restore(snapshot.controllers);
    }

    pub fn clear(&self) {
        self.components.clear();
        self.routes.clear();
        self.events.clear();
        self.schemas.clear();
        self.templates.clear();
        self.controllers.clear();
    }
}

impl Default for Index {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use serde_json::{Value, json};
    use tower_lsp::async_trait;

    use crate::error::ParseError;
    use crate::parser::gateway::testing::CountingBackend;
    use crate::parser::{ExactBackend, ExactInput};

    /// 内容に "OLD" を含む場合だけ応答が遅いバックエンド
    #[derive(Default)]
    struct SlowOldBackend {
        old_started: AtomicBool,
    }

    #[async_trait]
    impl ExactBackend for SlowOldBackend {
        async fn is_available(&self) -> bool {
            true
        }

        async fn run(&self, kind: &'static str, input: ExactInput<'_>) -> Result<Value, ParseError> {
            let ExactInput::Content { content, .. } = input else {
                return Ok(json!({}));
            };
            if kind != "routes" {
                return Ok(json!({}));
            }
            let (path, helper) = if content.contains("OLD") {
                self.old_started.store(true, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(100)).await;
                ("/old_route", "old_route")
            } else {
                ("/new_route", "new_route")
            };
            Ok(json!({
                "routes": [{ "path": path, "verb": "GET", "line": 1, "helperBase": helper }]
            }))
        }
    }

    const ROUTER: &str = r#"defmodule MyAppWeb.Router do
  use MyAppWeb, :router

  scope "/", MyAppWeb do
    get "/dashboard", DashboardController, :index
  end
end
"#;

    #[tokio::test]
    async fn test_update_is_idempotent_for_same_content() {
        let backend = Arc::new(CountingBackend::returning(json!({ "routes": [] })));
        let gateway = ParserGateway::with_backend(backend.clone(), 0, 0);
        let index = Index::new();
        let path = Path::new("/app/lib/my_app_web/router.ex");

        assert!(index.update_file(&gateway, path, ROUTER).await);
        let calls = backend.calls();
        assert!(!index.update_file(&gateway, path, ROUTER).await);
        assert_eq!(backend.calls(), calls);
    }

    #[tokio::test]
    async fn test_later_update_wins_over_slower_earlier_parse() {
        let backend = Arc::new(SlowOldBackend::default());
        let gateway = Arc::new(ParserGateway::with_backend(backend.clone(), 0, 0));
        let index = Arc::new(Index::new());
        let path = PathBuf::from("/app/lib/my_app_web/router.ex");

        let old = {
            let index = Arc::clone(&index);
            let gateway = Arc::clone(&gateway);
            let path = path.clone();
            tokio::spawn(async move { index.update_file(&gateway, &path, "# OLD").await })
        };
        while !backend.old_started.load(Ordering::SeqCst) {
            tokio::task::yield_now().await;
        }

        assert!(index.update_file(&gateway, &path, "# NEW").await);
        old.await.unwrap();

        let paths: Vec<_> = index
            .routes
            .get_routes_from_file(&path)
            .into_iter()
            .map(|r| r.path)
            .collect();
        assert_eq!(paths, vec!["/new_route"]);
        assert!(index.routes.registry().hash_matches(&path, &crate::util::content_hash("# NEW")));
    }

    #[tokio::test]
    async fn test_update_replaces_entities_even_when_empty() {
        let gateway = ParserGateway::fallback_only();
        let index = Index::new();
        let path = Path::new("/app/lib/my_app_web/router.ex");

        index.update_file(&gateway, path, ROUTER).await;
        assert_eq!(index.routes.get_routes_from_file(path).len(), 1);
        // コンポーネントストアも `*_web` 配下として対象になる
        assert!(index.components.get_components_from_file(path).is_empty());

        index
            .update_file(&gateway, path, "defmodule MyAppWeb.Router do\nend\n")
            .await;
        assert!(index.routes.get_routes_from_file(path).is_empty());
        assert_eq!(index.routes.registry().file_count(), 1);
    }

    #[tokio::test]
    async fn test_snapshot_round_trip() {
        let gateway = ParserGateway::fallback_only();
        let index = Index::new();
        let path = Path::new("/app/lib/my_app_web/router.ex");
        index.update_file(&gateway, path, ROUTER).await;

        let json = serde_json::to_string(&index.serialize_for_cache()).unwrap();
        let restored = Index::new();
        restored.load_from_cache(serde_json::from_str(&json).unwrap());

        let route = restored.routes.find_route_by_path("/dashboard").unwrap();
        assert_eq!(route.controller.as_deref(), Some("MyAppWeb.DashboardController"));
        assert_eq!(restored.serialize_for_cache().files(), vec![&PathBuf::from(path)]);
    }

    #[tokio::test]
    async fn test_remove_file() {
        let gateway = ParserGateway::fallback_only();
        let index = Index::new();
        let path = Path::new("/app/lib/my_app_web/router.ex");
        index.update_file(&gateway, path, ROUTER).await;

        assert!(index.remove_file(path));
        assert!(index.routes.get_all_routes().is_empty());
        assert!(!index.remove_file(path));
    }
}

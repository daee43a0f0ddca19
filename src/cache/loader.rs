use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::cache_path;
use super::metadata::{CACHE_VERSION, FileMetadata};
use super::schema::CacheDocument;
use crate::error::CacheError;
use crate::index::Index;

/// キャッシュ検証結果
#[derive(Debug, Default)]
pub struct CacheValidation {
    /// キャッシュが有効なファイル（再解析不要）
    pub valid_files: HashSet<PathBuf>,
    /// キャッシュが無効なファイル（再解析必要）
    pub invalid_files: HashSet<PathBuf>,
}

/// キャッシュローダー
pub struct CacheLoader {
    workspace_root: PathBuf,
    cache_file: PathBuf,
}

impl CacheLoader {
    pub fn new(workspace_root: &Path) -> Self {
        Self {
            workspace_root: workspace_root.to_path_buf(),
            cache_file: cache_path(workspace_root),
        }
    }

    pub fn cache_file(&self) -> &Path {
        &self.cache_file
    }

    /// cache.json を読み、バージョンとワークスペースを確認
    pub fn read(&self) -> Result<CacheDocument, CacheError> {
        if !self.cache_file.exists() {
            return Err(CacheError::NotFound);
        }
        let content = fs::read_to_string(&self.cache_file)?;
        let document: CacheDocument = serde_json::from_str(&content)?;

        if !document.metadata.is_compatible() {
            warn!(
                "Cache version mismatch: {} (expected {})",
                document.metadata.version, CACHE_VERSION
            );
            return Err(CacheError::VersionMismatch);
        }
        if document.metadata.workspace_root != self.workspace_root {
            return Err(CacheError::Stale(format!(
                "workspace {}",
                document.metadata.workspace_root.display()
            )));
        }
        Ok(document)
    }

    /// 記録されたファイルの更新時刻とサイズを現在のものと比べる
    pub fn validate(&self, document: &CacheDocument) -> CacheValidation {
        let mut validation = CacheValidation::default();
        for path in document.index.files() {
            let fresh = FileMetadata::from_path(path)
                .is_some_and(|current| document.metadata.is_fresh(path, &current));
            if fresh {
                validation.valid_files.insert(path.clone());
            } else {
                debug!("Cache invalid for {}", path.display());
                validation.invalid_files.insert(path.clone());
            }
        }
        validation
    }

    /// 有効なファイルの分だけインデックスに復元
    pub fn load_into(&self, index: &Index) -> Result<CacheValidation, CacheError> {
        let mut document = self.read()?;
        let validation = self.validate(&document);
        document
            .index
            .retain_files(|path| validation.valid_files.contains(path));
        index.load_from_cache(document.index);

        info!(
            "Loaded cache: {} valid files, {} invalid files",
            validation.valid_files.len(),
            validation.invalid_files.len()
        );
        Ok(validation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheWriter;
    use crate::parser::ParserGateway;

    const ROUTER: &str = r#"defmodule MyAppWeb.Router do
  scope "/", MyAppWeb do
    get "/dashboard", DashboardController, :index
  end
end
"#;

    #[tokio::test]
    async fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let router = root.join("lib/my_app_web/router.ex");
        fs::create_dir_all(router.parent().unwrap()).unwrap();
        fs::write(&router, ROUTER).unwrap();

        let gateway = ParserGateway::fallback_only();
        let index = Index::new();
        index.update_file(&gateway, &router, ROUTER).await;

        let written = CacheWriter::new(root).save(&index).unwrap();
        assert!(written.ends_with(".phoenix-lsp/cache.json"));

        let restored = Index::new();
        let validation = CacheLoader::new(root).load_into(&restored).unwrap();
        assert!(validation.valid_files.contains(&router));
        assert!(restored.routes.find_route_by_path("/dashboard").is_some());
    }

    #[tokio::test]
    async fn test_missing_and_modified_files_are_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let router = root.join("lib/my_app_web/router.ex");
        fs::create_dir_all(router.parent().unwrap()).unwrap();
        fs::write(&router, ROUTER).unwrap();

        let gateway = ParserGateway::fallback_only();
        let index = Index::new();
        index.update_file(&gateway, &router, ROUTER).await;
        CacheWriter::new(root).save(&index).unwrap();

        fs::remove_file(&router).unwrap();
        let restored = Index::new();
        let validation = CacheLoader::new(root).load_into(&restored).unwrap();
        assert!(validation.invalid_files.contains(&router));
        assert!(restored.routes.get_all_routes().is_empty());
    }

    #[test]
    fn test_not_found_and_other_workspace() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(CacheLoader::new(dir.path()).read(), Err(CacheError::NotFound)));

        let index = Index::new();
        CacheWriter::new(dir.path()).save(&index).unwrap();
        let other = dir.path().join("elsewhere");
        let moved = CacheLoader {
            workspace_root: other,
            cache_file: cache_path(dir.path()),
        };
        assert!(matches!(moved.read(), Err(CacheError::Stale(_))));
    }
}

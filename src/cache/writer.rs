use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use super::cache_path;
use super::metadata::{CacheMetadata, FileMetadata};
use super::schema::CacheDocument;
use crate::error::CacheError;
use crate::index::Index;

/// Cache writer
pub struct CacheWriter {
    workspace_root: PathBuf,
    cache_file: PathBuf,
}

impl CacheWriter {
    pub fn new(workspace_root: &Path) -> Self {
        Self {
            workspace_root: workspace_root.to_path_buf(),
            cache_file: cache_path(workspace_root),
        }
    }

    /// Save the entire index to cache
    pub fn save(&self, index: &Index) -> Result<PathBuf, CacheError> {
        let snapshot = index.serialize_for_cache();

        let mut metadata = CacheMetadata::new(&self.workspace_root);
        for path in snapshot.files() {
            if let Some(meta) = FileMetadata::from_path(path) {
                metadata
                    .files
                    .insert(path.to_string_lossy().to_string(), meta);
            }
        }

        let document = CacheDocument {
            metadata,
            index: snapshot,
        };
        let json = serde_json::to_string(&document)?;

        if let Some(dir) = self.cache_file.parent() {
            fs::create_dir_all(dir)?;
        }
        // 書きかけのファイルを読まないよう一時ファイルから置き換える
        let tmp = self.cache_file.with_extension("json.tmp");
        fs::write(&tmp, &json)?;
        fs::rename(&tmp, &self.cache_file)?;

        info!(
            "Saved cache: {} files, {} bytes",
            document.metadata.files.len(),
            json.len()
        );
        Ok(self.cache_file.clone())
    }
}

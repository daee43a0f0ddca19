//! インデックスのJSONキャッシュ
//!
//! `<root>/.phoenix-lsp/cache.json` に全レジストリのスナップショットを保存し、
//! 起動時に更新時刻で検証してから読み込む。

pub mod loader;
pub mod metadata;
pub mod schema;
pub mod writer;

use std::path::{Path, PathBuf};

pub use loader::{CacheLoader, CacheValidation};
pub use metadata::{CACHE_VERSION, CacheMetadata, FileMetadata};
pub use schema::CacheDocument;
pub use writer::CacheWriter;

pub const CACHE_DIR: &str = ".phoenix-lsp";
pub const CACHE_FILE: &str = "cache.json";

pub fn cache_path(workspace_root: &Path) -> PathBuf {
    workspace_root.join(CACHE_DIR).join(CACHE_FILE)
}

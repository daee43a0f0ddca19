use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Cache format version
/// v1: JSON snapshot of all registries
pub const CACHE_VERSION: u32 = 1;

/// Cache metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheMetadata {
    pub version: u32,
    pub tool_version: String,
    /// 保存時刻（UNIX秒）
    pub timestamp: u64,
    pub workspace_root: PathBuf,
    pub files: HashMap<String, FileMetadata>,
}

/// File metadata for cache validation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub mtime: u64,
    pub size: u64,
}

impl FileMetadata {
    pub fn from_path(path: &Path) -> Option<Self> {
        let metadata = std::fs::metadata(path).ok()?;
        Some(Self {
            mtime: unix_secs(metadata.modified().ok()?),
            size: metadata.len(),
        })
    }
}

pub fn unix_secs(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

impl CacheMetadata {
    pub fn new(workspace_root: &Path) -> Self {
        Self {
            version: CACHE_VERSION,
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: unix_secs(SystemTime::now()),
            workspace_root: workspace_root.to_path_buf(),
            files: HashMap::new(),
        }
    }

    pub fn is_compatible(&self) -> bool {
        self.version == CACHE_VERSION && self.tool_version == env!("CARGO_PKG_VERSION")
    }

    /// 記録時と同じで、保存後に変更されていないか
    pub fn is_fresh(&self, path: &Path, current: &FileMetadata) -> bool {
        self.files
            .get(path.to_string_lossy().as_ref())
            .is_some_and(|cached| cached == current && current.mtime <= self.timestamp)
    }
}

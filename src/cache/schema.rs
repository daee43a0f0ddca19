use serde::{Deserialize, Serialize};

use super::metadata::CacheMetadata;
use crate::index::IndexSnapshot;

/// cache.json の中身
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheDocument {
    pub metadata: CacheMetadata,
    #[serde(default)]
    pub index: IndexSnapshot,
}

use std::path::Path;

use super::registry::{RegistryKind, Store};
use crate::model::SchemaInfo;
use crate::parser::Schemas;
use crate::parser::kind::SchemasMetadata;
use crate::util::module_matches_suffix;

/// Ecto スキーマのストア
pub type SchemaStore = Store<SchemaKind>;

pub struct SchemaKind;

impl RegistryKind for SchemaKind {
    type Parse = Schemas;
    type Entity = SchemaInfo;

    const LABEL: &'static str = "schemas";

    /// `lib/` 配下で `*_web` の外にある .ex
    fn is_candidate(path: &Path) -> bool {
        if path.extension().is_none_or(|e| e != "ex") {
            return false;
        }
        let dirs: Vec<&str> = path
            .parent()
            .into_iter()
            .flat_map(|p| p.components())
            .filter_map(|c| c.as_os_str().to_str())
            .collect();
        dirs.contains(&"lib") && !dirs.iter().any(|d| d.ends_with("_web"))
    }

    fn into_entities(path: &Path, metadata: SchemasMetadata) -> Vec<SchemaInfo> {
        metadata
            .schemas
            .into_iter()
            .map(|mut schema| {
                schema.file_path = path.to_path_buf();
                schema
            })
            .collect()
    }
}

impl Store<SchemaKind> {
    pub fn get_all_schemas(&self) -> Vec<SchemaInfo> {
        self.registry().all()
    }

    pub fn get_schemas_from_file(&self, path: &Path) -> Vec<SchemaInfo> {
        self.registry().from_file(path)
    }

    pub fn get_schema(&self, module: &str) -> Option<SchemaInfo> {
        self.registry().find(|s| s.module_name == module)
    }

    /// 完全一致、なければセグメント境界の後方一致（`User` -> `MyApp.Accounts.User`）
    pub fn resolve_schema_module(&self, name: &str) -> Option<SchemaInfo> {
        self.get_schema(name).or_else(|| {
            let mut candidates = self
                .registry()
                .filter(|s| module_matches_suffix(&s.module_name, name));
            candidates.sort_by(|a, b| a.module_name.cmp(&b.module_name));
            candidates.into_iter().next()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_candidate() {
        assert!(SchemaKind::is_candidate(Path::new("/app/lib/my_app/accounts/user.ex")));
        assert!(!SchemaKind::is_candidate(Path::new("/app/lib/my_app_web/router.ex")));
        assert!(!SchemaKind::is_candidate(Path::new("/app/test/support/fixtures.ex")));
    }
}

use std::path::Path;

use super::registry::{RegistryKind, Store};
use crate::model::Component;
use crate::parser::Components;
use crate::parser::kind::ComponentsMetadata;
use crate::util::{is_elixir_file, module_matches_suffix};

/// 関数コンポーネントのストア
pub type ComponentStore = Store<ComponentKind>;

pub struct ComponentKind;

impl RegistryKind for ComponentKind {
    type Parse = Components;
    type Entity = Component;

    const LABEL: &'static str = "components";

    /// `*_web` 配下の .ex、または `*components.ex`
    fn is_candidate(path: &Path) -> bool {
        if !is_elixir_file(path) || path.extension().is_some_and(|e| e == "exs") {
            return false;
        }
        let in_web_dir = path
            .parent()
            .into_iter()
            .flat_map(|p| p.components())
            .any(|c| c.as_os_str().to_str().is_some_and(|s| s.ends_with("_web")));
        let is_components_file = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with("components.ex"));
        in_web_dir || is_components_file
    }

    fn into_entities(path: &Path, metadata: ComponentsMetadata) -> Vec<Component> {
        let mut components: Vec<Component> = Vec::new();
        for mut component in metadata.components {
            component.file_path = path.to_path_buf();
            match components
                .iter_mut()
                .find(|c| c.name == component.name && c.module_name == component.module_name)
            {
                Some(existing) => existing.merge_clause(component),
                None => components.push(component),
            }
        }
        components
    }
}

impl Store<ComponentKind> {
    pub fn get_all_components(&self) -> Vec<Component> {
        self.registry().all()
    }

    pub fn get_components_from_file(&self, path: &Path) -> Vec<Component> {
        self.registry().from_file(path)
    }

    pub fn get_components_by_name(&self, name: &str) -> Vec<Component> {
        self.registry().filter(|c| c.name == name)
    }

    pub fn get_components_by_module(&self, module: &str) -> Vec<Component> {
        self.registry().filter(|c| c.module_name == module)
    }

    /// モジュール名（完全一致を優先し、次にセグメント境界の後方一致）と関数名で検索
    pub fn find_component(&self, module: &str, name: &str) -> Option<Component> {
        self.registry()
            .find(|c| c.name == name && c.module_name == module)
            .or_else(|| {
                self.registry()
                    .find(|c| c.name == name && module_matches_suffix(&c.module_name, module))
            })
    }
}

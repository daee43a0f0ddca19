use std::path::{Path, PathBuf};

use super::registry::{RegistryKind, Store};
use crate::model::TemplateInfo;
use crate::parser::Templates;
use crate::parser::kind::TemplatesMetadata;

/// テンプレートのストア（キーは所属モジュールの .ex ファイル）
pub type TemplateStore = Store<TemplateEntryKind>;

pub struct TemplateEntryKind;

impl RegistryKind for TemplateEntryKind {
    type Parse = Templates;
    type Entity = TemplateInfo;

    const LABEL: &'static str = "templates";

    fn is_candidate(path: &Path) -> bool {
        path.file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with("_html.ex") || n.ends_with("_live.ex"))
    }

    fn into_entities(path: &Path, metadata: TemplatesMetadata) -> Vec<TemplateInfo> {
        metadata
            .templates
            .into_iter()
            .map(|mut template| {
                template.module_file = path.to_path_buf();
                if template.file_path.as_os_str().is_empty() {
                    template.file_path = path.to_path_buf();
                }
                template
            })
            .collect()
    }
}

impl Store<TemplateEntryKind> {
    pub fn get_all_templates(&self) -> Vec<TemplateInfo> {
        self.registry().all()
    }

    /// 所属モジュールのファイルから
    pub fn get_templates_from_file(&self, path: &Path) -> Vec<TemplateInfo> {
        self.registry().from_file(path)
    }

    pub fn get_templates_by_module(&self, module: &str) -> Vec<TemplateInfo> {
        self.registry().filter(|t| t.module_name == module)
    }

    /// .heex ファイルに対応するテンプレート
    pub fn find_template_for_file(&self, path: &Path) -> Option<TemplateInfo> {
        self.registry().find(|t| t.file_path == path)
    }

    /// ファイルを本体とするテンプレート（関数テンプレートなら複数）
    pub fn find_templates_for_file(&self, path: &Path) -> Vec<TemplateInfo> {
        self.registry().filter(|t| t.file_path == path)
    }

    /// ディレクトリ内にあるテンプレート所有モジュールのファイル
    pub fn module_files_in(&self, dir: &Path) -> Vec<PathBuf> {
        self.registry()
            .files()
            .into_iter()
            .filter(|file| file.parent() == Some(dir))
            .collect()
    }
}

//! コンポーネント名から定義を解決する
//!
//! 探索順:
//! 1. モジュール修飾あり: 組み込み → エイリアス展開したモジュール
//! 2. ローカル呼び出し: 同じファイル → 組み込み → `use`/`import` で見えるモジュール
//! 3. どちらも見つからなければ `lib/<app>_web/components` を直接走査

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use super::builtins::{BUILTIN_MODULE, builtin_component};
use crate::index::Index;
use crate::model::Component;
use crate::parser::fallback;
use crate::util::{is_heex_file, last_module_segment, module_matches_suffix};

static USE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^\s*use\s+([A-Z][\w.]*)\s*,\s*:(html|live_view|live_component|component)\b")
        .unwrap()
});
static USE_COMPONENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*use\s+Phoenix\.(Component|LiveView|LiveComponent)\b").unwrap());
static IMPORT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*import\s+([A-Z][\w.]*)").unwrap());
static ALIAS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^\s*alias\s+([A-Z][\w.]*?)(?:\.\{([^}]*)\})?(?:\s*,\s*as:\s*([A-Z]\w*))?\s*$")
        .unwrap()
});

/// 解決の入力
#[derive(Debug, Clone, Copy)]
pub struct ComponentQuery<'q> {
    /// 使用箇所のあるファイル（.ex または .heex）
    pub file_path: &'q Path,
    pub name: &'q str,
    /// `<MyAppWeb.Components.card>` の `MyAppWeb.Components`
    pub module_context: Option<&'q str>,
    /// エディタ上の内容（なければディスクから読む）
    pub content: Option<&'q str>,
}

/// モジュールの `use` / `import` / `alias` 宣言
#[derive(Debug, Default)]
pub struct ModuleHeader {
    pub imports: Vec<String>,
    pub aliases: HashMap<String, String>,
}

impl ModuleHeader {
    pub fn parse(source: &str) -> Self {
        let mut header = ModuleHeader::default();

        for caps in ALIAS_RE.captures_iter(source) {
            let base = &caps[1];
            match (caps.get(2), caps.get(3)) {
                (Some(group), _) => {
                    for name in group.as_str().split(',').map(str::trim).filter(|n| !n.is_empty()) {
                        header
                            .aliases
                            .insert(last_module_segment(name).to_string(), format!("{}.{}", base, name));
                    }
                }
                (None, Some(as_name)) => {
                    header.aliases.insert(as_name.as_str().to_string(), base.to_string());
                }
                (None, None) => {
                    header.aliases.insert(last_module_segment(base).to_string(), base.to_string());
                }
            }
        }

        for caps in USE_RE.captures_iter(source) {
            header.imports.push(format!("{}.CoreComponents", &caps[1]));
        }
        if USE_COMPONENT_RE.is_match(source) {
            header.imports.push(BUILTIN_MODULE.to_string());
        }
        for caps in IMPORT_RE.captures_iter(source) {
            let module = header.expand(&caps[1]);
            if !header.imports.contains(&module) {
                header.imports.push(module);
            }
        }
        header
    }

    /// 先頭セグメントのエイリアスを展開
    pub fn expand(&self, module: &str) -> String {
        let (head, tail) = match module.split_once('.') {
            Some((head, tail)) => (head, Some(tail)),
            None => (module, None),
        };
        match (self.aliases.get(head), tail) {
            (Some(full), Some(tail)) => format!("{}.{}", full, tail),
            (Some(full), None) => full.clone(),
            (None, _) => module.to_string(),
        }
    }
}

/// .heex テンプレートを所有するモジュールの .ex ファイル
pub fn owning_module_file(index: &Index, path: &Path) -> Option<PathBuf> {
    if !is_heex_file(path) {
        return Some(path.to_path_buf());
    }
    if let Some(template) = index.templates.find_template_for_file(path) {
        return Some(template.module_file);
    }

    let file_name = path.file_name()?.to_str()?;
    let stem = file_name.split('.').next()?;
    // foo_live.html.heex -> foo_live.ex
    let sibling = path.with_file_name(format!("{}.ex", stem));
    if sibling.is_file() {
        return Some(sibling);
    }
    // page_html/index.html.heex -> page_html.ex
    let dir = path.parent()?;
    let owner = dir.with_file_name(format!("{}.ex", dir.file_name()?.to_str()?));
    owner.is_file().then_some(owner)
}

fn read_source(query: &ComponentQuery, module_file: &Path) -> Option<String> {
    if module_file == query.file_path {
        if let Some(content) = query.content {
            return Some(content.to_string());
        }
    }
    std::fs::read_to_string(module_file).ok()
}

pub fn resolve_component(index: &Index, query: &ComponentQuery) -> Option<Component> {
    let module_file = owning_module_file(index, query.file_path);
    let header = module_file
        .as_deref()
        .and_then(|file| read_source(query, file))
        .map(|source| ModuleHeader::parse(&source))
        .unwrap_or_default();

    let found = match query.module_context {
        Some(module) => resolve_remote(index, &header, module, query.name),
        None => resolve_local(index, &header, module_file.as_deref(), query.name),
    };
    found.or_else(|| {
        let module = query.module_context.map(|m| header.expand(m));
        scan_components_dir(query.file_path, module.as_deref(), query.name)
    })
}

fn resolve_remote(index: &Index, header: &ModuleHeader, module: &str, name: &str) -> Option<Component> {
    let expanded = header.expand(module);
    if expanded == BUILTIN_MODULE {
        if let Some(component) = builtin_component(name) {
            return Some(component);
        }
    }
    index.components.find_component(&expanded, name)
}

fn resolve_local(
    index: &Index,
    header: &ModuleHeader,
    module_file: Option<&Path>,
    name: &str,
) -> Option<Component> {
    if let Some(file) = module_file {
        if let Some(component) = index
            .components
            .get_components_from_file(file)
            .into_iter()
            .find(|c| c.name == name)
        {
            return Some(component);
        }
    }

    if let Some(component) = builtin_component(name) {
        return Some(component);
    }

    header
        .imports
        .iter()
        .find_map(|module| index.components.find_component(module, name))
}

/// `lib/<app>_web/components/*.ex` を直接走査する
fn scan_components_dir(context: &Path, module: Option<&str>, name: &str) -> Option<Component> {
    let dir = components_dir(context)?;
    let mut files: Vec<PathBuf> = std::fs::read_dir(&dir)
        .ok()?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|e| e == "ex"))
        .collect();
    files.sort();

    for file in files {
        let Ok(source) = std::fs::read_to_string(&file) else {
            continue;
        };
        let found = fallback::components::scan(&file, &source)
            .into_iter()
            .find(|c| c.name == name && module.is_none_or(|m| module_matches_suffix(&c.module_name, m)));
        if found.is_some() {
            debug!("Resolved {} from components directory {}", name, dir.display());
            return found;
        }
    }
    None
}

/// 文脈ファイルのパスから `<app>_web/components` を探す
fn components_dir(context: &Path) -> Option<PathBuf> {
    for ancestor in context.ancestors().skip(1) {
        let name = ancestor.file_name().and_then(|n| n.to_str()).unwrap_or("");
        if name.ends_with("_web") {
            let dir = ancestor.join("components");
            return dir.is_dir().then_some(dir);
        }
        if name == "lib" {
            let web = std::fs::read_dir(ancestor)
                .ok()?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .find(|p| {
                    p.is_dir()
                        && p.file_name()
                            .and_then(|n| n.to_str())
                            .is_some_and(|n| n.ends_with("_web"))
                })?;
            let dir = web.join("components");
            return dir.is_dir().then_some(dir);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_header() {
        let source = r#"defmodule MyAppWeb.PageLive do
  use MyAppWeb, :live_view
  alias MyAppWeb.Components.{Card, Modal}
  alias MyAppWeb.Layouts, as: L
  import MyAppWeb.Icons
  import Card
"#;
        let header = ModuleHeader::parse(source);
        assert_eq!(
            header.imports,
            vec![
                "MyAppWeb.CoreComponents",
                "MyAppWeb.Icons",
                "MyAppWeb.Components.Card"
            ]
        );
        assert_eq!(header.expand("Modal"), "MyAppWeb.Components.Modal");
        assert_eq!(header.expand("L.app"), "MyAppWeb.Layouts.app");
        assert_eq!(header.expand("Other"), "Other");
    }
}

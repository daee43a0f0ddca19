//! テンプレートとその所属モジュールの抽出
//!
//! `embed_templates` はモジュールのあるディレクトリを基準にファイルシステムを照合する。

use std::path::{Path, PathBuf};

use globset::Glob;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use super::{
    BlockTracker, call_args, logical_lines, matching_close, parse_string, split_args,
};
use crate::model::{TemplateInfo, TemplateKind};

static DEF_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*def\s+([a-z_][A-Za-z0-9_]*)\(").unwrap());

pub fn scan(path: &Path, content: &str) -> Vec<TemplateInfo> {
    let mut tracker = BlockTracker::new();
    let mut templates = Vec::new();
    let mut first_module: Option<(String, u32)> = None;
    let is_html_module = file_name(path).ends_with("_html.ex");

    for line in logical_lines(content) {
        let text = line.text.trim();
        if let Some(module) = tracker.current_module() {
            if let Some(args) = call_args(text, "embed_templates") {
                templates.extend(embedded_templates(path, module, args, line.line));
            } else if is_html_module && tracker.depth() == 1 {
                if let Some(name) = function_template(text) {
                    templates.push(TemplateInfo {
                        name,
                        module_name: module.to_string(),
                        file_path: path.to_path_buf(),
                        module_file: path.to_path_buf(),
                        line: line.line,
                        kind: TemplateKind::Function,
                        format: "html".to_string(),
                    });
                }
            }
        }

        if let Some(module) = tracker.advance(&line.text) {
            first_module.get_or_insert((module, line.line));
        }
    }

    if let (Some(colocated), Some((module, line))) = (colocated_template(path), first_module) {
        templates.push(TemplateInfo {
            name: template_name(&colocated),
            module_name: module,
            file_path: colocated,
            module_file: path.to_path_buf(),
            line,
            kind: TemplateKind::Colocated,
            format: "html".to_string(),
        });
    }

    templates
}

fn file_name(path: &Path) -> &str {
    path.file_name().and_then(|n| n.to_str()).unwrap_or("")
}

/// `index.html.heex` -> `index`
fn template_name(path: &Path) -> String {
    let name = file_name(path);
    name.split('.').next().unwrap_or(name).to_string()
}

/// `index.html.heex` -> `html`
fn template_format(path: &Path) -> String {
    let name = file_name(path);
    let parts: Vec<&str> = name.split('.').collect();
    if parts.len() >= 3 {
        parts[parts.len() - 2].to_string()
    } else {
        "html".to_string()
    }
}

/// `def index(assigns)` 形式
fn function_template(text: &str) -> Option<String> {
    let caps = DEF_RE.captures(text)?;
    let after_paren = &text[caps.get(0)?.end()..];
    let args = split_args(&after_paren[..matching_close(after_paren)?]);
    (args.len() == 1 && args[0].trim() == "assigns").then(|| caps[1].to_string())
}

/// `embed_templates "page_html/*"` に一致する .heex ファイル
fn embedded_templates(module_file: &Path, module: &str, args: &str, line: u32) -> Vec<TemplateInfo> {
    let Some(pattern) = split_args(args).first().and_then(|a| parse_string(a)) else {
        return Vec::new();
    };
    let Some(base) = module_file.parent() else {
        return Vec::new();
    };
    let matcher = match Glob::new(&pattern) {
        Ok(glob) => glob.compile_matcher(),
        Err(e) => {
            debug!("Invalid embed_templates pattern {}: {}", pattern, e);
            return Vec::new();
        }
    };

    let relative_dir = pattern.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("");
    let dir = base.join(relative_dir);
    let Ok(entries) = std::fs::read_dir(&dir) else {
        return Vec::new();
    };

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| file_name(p).ends_with(".heex"))
        .filter(|p| {
            let name = template_name(p);
            let candidate = if relative_dir.is_empty() {
                name
            } else {
                format!("{}/{}", relative_dir, name)
            };
            matcher.is_match(candidate)
        })
        .collect();
    files.sort();

    files
        .into_iter()
        .map(|file| TemplateInfo {
            name: template_name(&file),
            module_name: module.to_string(),
            format: template_format(&file),
            file_path: file,
            module_file: module_file.to_path_buf(),
            line,
            kind: TemplateKind::Embedded,
        })
        .collect()
}

/// `foo_live.ex` の隣の `foo_live.html.heex`
fn colocated_template(path: &Path) -> Option<PathBuf> {
    let stem = file_name(path).strip_suffix("_live.ex")?;
    let candidate = path.with_file_name(format!("{}_live.html.heex", stem));
    candidate.is_file().then_some(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_embedded_and_function_templates() {
        let dir = tempfile::tempdir().unwrap();
        let controllers = dir.path().join("controllers");
        fs::create_dir_all(controllers.join("page_html")).unwrap();
        fs::write(controllers.join("page_html/home.html.heex"), "<h1>Home</h1>").unwrap();
        fs::write(controllers.join("page_html/about.html.heex"), "<h1>About</h1>").unwrap();
        fs::write(controllers.join("page_html/notes.txt"), "ignored").unwrap();

        let module_file = controllers.join("page_html.ex");
        let source = r#"defmodule MyAppWeb.PageHTML do
  use MyAppWeb, :html

  embed_templates "page_html/*"

  def contact(assigns) do
    ~H"<p>contact</p>"
  end

  defp helper(x), do: x
end
"#;
        let templates = scan(&module_file, source);
        let names: Vec<_> = templates
            .iter()
            .map(|t| (t.name.as_str(), t.kind))
            .collect();
        assert_eq!(
            names,
            vec![
                ("about", TemplateKind::Embedded),
                ("home", TemplateKind::Embedded),
                ("contact", TemplateKind::Function),
            ]
        );
        assert_eq!(templates[0].module_name, "MyAppWeb.PageHTML");
        assert_eq!(templates[0].line, 4);
        assert_eq!(templates[0].module_file, module_file);
        assert_eq!(templates[2].line, 6);
    }

    #[test]
    fn test_colocated_live_template() {
        let dir = tempfile::tempdir().unwrap();
        let live = dir.path().join("counter_live.ex");
        fs::write(dir.path().join("counter_live.html.heex"), "<div />").unwrap();

        let source = "defmodule MyAppWeb.CounterLive do\n  use MyAppWeb, :live_view\nend\n";
        let templates = scan(&live, source);
        assert_eq!(templates.len(), 1);
        assert_eq!(templates[0].kind, TemplateKind::Colocated);
        assert_eq!(templates[0].name, "counter_live");
        assert_eq!(templates[0].module_name, "MyAppWeb.CounterLive");
    }
}

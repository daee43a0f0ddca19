//! `attr` / `slot` 宣言と関数コンポーネント定義の抽出

use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;

use super::{
    BlockTracker, PendingDoc, call_args, is_module_name, keyword, keyword_args, logical_lines,
    matching_close, opens_do_block, parse_atom, parse_name_list, parse_string, split_args,
};
use crate::model::{Component, ComponentAttribute, ComponentSlot};

static DEF_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*defp?\s+([a-z_][A-Za-z0-9_]*[?!]?)\(").unwrap());

pub fn scan(path: &Path, content: &str) -> Vec<Component> {
    let mut tracker = BlockTracker::new();
    let mut doc = PendingDoc::default();
    let mut pending_attributes: Vec<ComponentAttribute> = Vec::new();
    let mut pending_slots: Vec<ComponentSlot> = Vec::new();
    let mut open_slot: Option<(ComponentSlot, usize)> = None;
    let mut components: Vec<Component> = Vec::new();

    for line in logical_lines(content) {
        let text = line.text.trim();
        let depth_before = tracker.depth();

        if doc.observe(&line) {
            tracker.advance(&line.text);
            continue;
        }

        if let Some(args) = call_args(text, "attr") {
            if let Some(attribute) = parse_attribute(args, line.heredoc.as_deref()) {
                match open_slot.as_mut() {
                    Some((slot, _)) => slot.attributes.push(attribute),
                    None => pending_attributes.push(attribute),
                }
            }
        } else if let Some(args) = call_args(text, "slot") {
            if let Some(slot) = parse_slot(args, line.heredoc.as_deref()) {
                if opens_do_block(text) {
                    open_slot = Some((slot, depth_before));
                } else {
                    pending_slots.push(slot);
                }
            }
        } else if let Some(caps) = DEF_RE.captures(text) {
            let name = caps[1].to_string();
            let after_paren = &text[caps.get(0).map_or(0, |m| m.end())..];
            let is_component = matching_close(after_paren)
                .map(|close| split_args(&after_paren[..close]))
                .is_some_and(|args| args.len() == 1 && args[0].contains("assigns"));

            match (is_component, tracker.current_module()) {
                (true, Some(module)) => {
                    let component = Component {
                        name,
                        module_name: module.to_string(),
                        file_path: path.to_path_buf(),
                        line: line.line,
                        attributes: std::mem::take(&mut pending_attributes),
                        slots: std::mem::take(&mut pending_slots),
                    };
                    push_or_merge(&mut components, component);
                }
                _ => {
                    pending_attributes.clear();
                    pending_slots.clear();
                }
            }
            doc.clear();
        }

        tracker.advance(&line.text);

        if let Some((_, depth)) = &open_slot {
            if tracker.depth() <= *depth {
                if let Some((slot, _)) = open_slot.take() {
                    pending_slots.push(slot);
                }
            }
        }
    }

    components
}

/// 同じ関数の別節は最初の定義にまとめる
fn push_or_merge(components: &mut Vec<Component>, component: Component) {
    match components
        .iter_mut()
        .find(|c| c.name == component.name && c.module_name == component.module_name)
    {
        Some(existing) => existing.merge_clause(component),
        None => components.push(component),
    }
}

fn parse_attribute(args: &str, heredoc: Option<&str>) -> Option<ComponentAttribute> {
    let args = split_args(args);
    let name = parse_atom(args.first()?)?;
    let attr_type = match args.get(1) {
        Some(arg) => parse_atom(arg)
            .or_else(|| is_module_name(arg).then(|| arg.trim().to_string()))
            .unwrap_or_else(|| "any".to_string()),
        None => "any".to_string(),
    };
    let keywords = keyword_args(args.get(2..).unwrap_or_default());

    Some(ComponentAttribute {
        name,
        attr_type,
        required: keyword(&keywords, "required") == Some("true"),
        default: keyword(&keywords, "default").map(str::to_string),
        values: keyword(&keywords, "values").map(parse_name_list),
        doc: keyword(&keywords, "doc").and_then(|v| doc_value(v, heredoc)),
    })
}

fn parse_slot(args: &str, heredoc: Option<&str>) -> Option<ComponentSlot> {
    let args = split_args(args);
    let name = parse_atom(args.first()?)?;
    let keywords = keyword_args(args.get(1..).unwrap_or_default());

    Some(ComponentSlot {
        name,
        required: keyword(&keywords, "required") == Some("true"),
        doc: keyword(&keywords, "doc").and_then(|v| doc_value(v, heredoc)),
        attributes: Vec::new(),
    })
}

fn doc_value(value: &str, heredoc: Option<&str>) -> Option<String> {
    match (value, heredoc) {
        ("\"\"", Some(heredoc)) => Some(heredoc.to_string()),
        _ => parse_string(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CORE: &str = r#"defmodule MyAppWeb.CoreComponents do
  use Phoenix.Component

  @doc """
  Renders a modal.
  """
  attr :id, :string, required: true
  attr :show, :boolean, default: false
  attr :on_cancel, JS, default: %JS{}
  slot :inner_block, required: true

  def modal(assigns) do
    ~H"""
    <div id={@id}>
      <%= render_slot(@inner_block) %>
    </div>
    """
  end

  attr :rows, :list, required: true
  attr :kind, :string, values: ~w(info error), doc: "the flash kind"

  slot :col, required: true do
    attr :label, :string
  end

  slot :action, doc: "actions"

  def table(assigns) do
    ~H"""
    <table></table>
    """
  end

  defp format_value(value, opts), do: value
end
"#;

    fn scan_core() -> Vec<Component> {
        scan(Path::new("/app/lib/my_app_web/components/core_components.ex"), CORE)
    }

    #[test]
    fn test_components_and_attributes() {
        let components = scan_core();
        let names: Vec<_> = components.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["modal", "table"]);

        let modal = &components[0];
        assert_eq!(modal.module_name, "MyAppWeb.CoreComponents");
        assert_eq!(modal.line, 12);
        assert!(modal.find_attribute("id").unwrap().required);
        assert_eq!(modal.find_attribute("show").unwrap().default.as_deref(), Some("false"));
        assert_eq!(modal.find_attribute("on_cancel").unwrap().attr_type, "JS");
        assert!(modal.find_slot("inner_block").unwrap().required);
    }

    #[test]
    fn test_slot_block_attributes() {
        let components = scan_core();
        let table = &components[1];
        let kind = table.find_attribute("kind").unwrap();
        assert_eq!(kind.values.as_deref(), Some(&["info".to_string(), "error".to_string()][..]));
        assert_eq!(kind.doc.as_deref(), Some("the flash kind"));

        let col = table.find_slot("col").unwrap();
        assert!(col.required);
        assert_eq!(col.attributes.len(), 1);
        assert_eq!(col.attributes[0].name, "label");
        assert_eq!(table.find_slot("action").unwrap().doc.as_deref(), Some("actions"));
        assert!(table.find_attribute("label").is_none());
    }

    #[test]
    fn test_multi_clause_merges_into_first() {
        let source = r#"defmodule MyAppWeb.Icons do
  use Phoenix.Component

  attr :name, :string, required: true
  def icon(%{name: "hero-" <> _} = assigns) do
    ~H"<span />"
  end

  attr :size, :integer, default: 4
  def icon(assigns) do
    ~H"<svg />"
  end
end
"#;
        let components = scan(Path::new("/app/lib/my_app_web/components/icons.ex"), source);
        assert_eq!(components.len(), 1);
        assert_eq!(components[0].line, 5);
        let attrs: Vec<_> = components[0].attributes.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(attrs, vec!["name", "size"]);
    }

    #[test]
    fn test_non_component_def_drops_pending_declarations() {
        let source = r#"defmodule MyAppWeb.Helpers do
  attr :x, :string
  def helper(conn, x), do: {conn, x}

  def badge(assigns), do: ~H"<span />"
end
"#;
        let components = scan(Path::new("/app/lib/my_app_web/helpers.ex"), source);
        assert_eq!(components.len(), 1);
        assert_eq!(components[0].name, "badge");
        assert!(components[0].attributes.is_empty());
    }

    #[test]
    fn test_fullwidth_space_indented_heredoc() {
        let source = "defmodule MyAppWeb.Greeting do\n  use Phoenix.Component\n\n  attr :name, :string\n  def greet(assigns) do\n    ~H\"\"\"\n\u{3000}\u{3000}<p>こんにちは {@name}</p>\n    <span>!</span>\n    \"\"\"\n  end\nend\n";
        let components = scan(Path::new("/app/lib/my_app_web/components/greeting.ex"), source);
        assert_eq!(components.len(), 1);
        assert_eq!(components[0].name, "greet");
        assert_eq!(components[0].attributes[0].name, "name");
    }
}

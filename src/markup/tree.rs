//! tree-sitter-html による構造木からの抽出
//!
//! HEEx はそのままでは HTML として読めないので、同じ長さのテキストに置き換えてから
//! 解析する（`<.button` → `<xbutton`、`Mod.fun` → `Mod-fun`、`{...}` → 空白）。
//! バイト位置は元のテキストと一致するため、名前や値は元のテキストから切り出す。

use std::ops::Range;

use tree_sitter::{Node, Parser, Tree};

use super::scanner::{expression_end, provided_slot_names};
use crate::model::{ComponentUsage, UsageAttribute, UsageSlot};

/// 木を辿る深さの上限
const MAX_DEPTH: usize = 256;

/// 名前付きの子を持つノード
pub trait MarkupNode: Copy {
    fn kind(&self) -> &str;
    fn byte_range(&self) -> Range<usize>;
    fn children(&self) -> Vec<Self>;

    fn child_of_kind(&self, kinds: &[&str]) -> Option<Self> {
        self.children().into_iter().find(|c| kinds.contains(&c.kind()))
    }
}

impl MarkupNode for Node<'_> {
    fn kind(&self) -> &str {
        Node::kind(self)
    }

    fn byte_range(&self) -> Range<usize> {
        Node::byte_range(self)
    }

    fn children(&self) -> Vec<Self> {
        let mut cursor = self.walk();
        Node::children(self, &mut cursor).collect()
    }
}

/// HEEx を HTML として読めるテキストに置き換える（長さとUTF-8境界は保つ）
pub fn mask_heex(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut out = bytes.to_vec();
    let mut i = 0;
    let mut in_tag = false;
    let mut quote: Option<u8> = None;

    let blank = |out: &mut Vec<u8>, range: Range<usize>| {
        for b in &mut out[range] {
            if *b != b'\n' {
                *b = b' ';
            }
        }
    };

    while i < bytes.len() {
        let b = bytes[i];
        if let Some(q) = quote {
            if b == q {
                quote = None;
            }
            i += 1;
            continue;
        }

        if in_tag {
            match b {
                b'"' | b'\'' => quote = Some(b),
                b'>' => in_tag = false,
                b'{' => {
                    let end = expression_end(text, i).unwrap_or(bytes.len());
                    let is_value = out[..i]
                        .iter()
                        .rev()
                        .find(|c| !c.is_ascii_whitespace())
                        .is_some_and(|c| *c == b'=');
                    blank(&mut out, i..end);
                    if is_value && end - i >= 2 {
                        out[i] = b'"';
                        out[end - 1] = b'"';
                    }
                    i = end;
                    continue;
                }
                _ => {}
            }
            i += 1;
            continue;
        }

        match b {
            b'<' if text[i..].starts_with("<%") => {
                let end = text[i..].find("%>").map(|e| i + e + 2).unwrap_or(bytes.len());
                blank(&mut out, i..end);
                i = end;
            }
            b'<' if text[i..].starts_with("<!--") => {
                i = text[i..].find("-->").map(|e| i + e + 3).unwrap_or(bytes.len());
            }
            b'<' => {
                let mut j = i + 1;
                if bytes.get(j) == Some(&b'/') {
                    j += 1;
                }
                match bytes.get(j) {
                    Some(b'.') | Some(b':') => {
                        out[j] = b'x';
                        in_tag = true;
                    }
                    Some(c) if c.is_ascii_alphabetic() => {
                        let mut k = j;
                        while k < bytes.len() && (bytes[k].is_ascii_alphanumeric() || matches!(bytes[k], b'_' | b'.' | b'-')) {
                            if bytes[k] == b'.' {
                                out[k] = b'-';
                            }
                            k += 1;
                        }
                        in_tag = true;
                    }
                    _ => {}
                }
                i = j;
            }
            b'{' => {
                let end = expression_end(text, i).unwrap_or(bytes.len());
                blank(&mut out, i..end);
                i = end;
            }
            _ => i += 1,
        }
    }

    // 置き換えはASCIIのみ、マルチバイト文字は丸ごと空白になるので常に成功する
    String::from_utf8(out).unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned())
}

/// 置き換え済みテキストを tree-sitter-html で解析
pub fn parse_heex(text: &str) -> Option<Tree> {
    let mut parser = Parser::new();
    parser.set_language(&tree_sitter_html::LANGUAGE.into()).ok()?;
    parser.parse(mask_heex(text), None)
}

enum TagKind {
    Component { name: String, module: Option<String>, name_start: usize },
    Slot(String),
    Html,
}

fn classify(tag: &str, start: usize) -> TagKind {
    if let Some(name) = tag.strip_prefix('.') {
        return TagKind::Component {
            name: name.to_string(),
            module: None,
            name_start: start,
        };
    }
    if let Some(name) = tag.strip_prefix(':') {
        return TagKind::Slot(name.to_string());
    }
    if tag.starts_with(|c: char| c.is_ascii_uppercase()) {
        if let Some((module, name)) = tag.rsplit_once('.') {
            if name.starts_with(|c: char| c.is_ascii_lowercase() || c == '_') {
                return TagKind::Component {
                    name: name.to_string(),
                    module: Some(module.to_string()),
                    name_start: start,
                };
            }
        }
    }
    TagKind::Html
}

/// 開始タグ（または自己終了タグ）とタグ名の範囲
fn open_tag<N: MarkupNode>(element: N) -> Option<(N, Range<usize>, bool)> {
    let tag = element.child_of_kind(&["start_tag", "self_closing_tag"])?;
    let name = tag.child_of_kind(&["tag_name"])?;
    Some((tag, name.byte_range(), tag.kind() == "self_closing_tag"))
}

fn element_kind<N: MarkupNode>(element: N, text: &str) -> Option<TagKind> {
    let (_, name, _) = open_tag(element)?;
    let start = name.start;
    text.get(name).map(|tag| classify(tag, start))
}

fn attributes<N: MarkupNode>(tag: N, text: &str) -> Vec<UsageAttribute> {
    tag.children()
        .into_iter()
        .filter(|c| c.kind() == "attribute")
        .filter_map(|attr| {
            let name = attr.child_of_kind(&["attribute_name"])?.byte_range();
            let mut attribute = UsageAttribute {
                name: text.get(name.clone())?.to_string(),
                name_start: name.start,
                name_end: name.end,
                value: None,
                value_start: None,
                value_end: None,
            };
            if let Some(value) = attr.child_of_kind(&["quoted_attribute_value", "attribute_value"]) {
                let range = value.byte_range();
                let raw = text.get(range.clone())?;
                let (start, end) = if raw.starts_with('{') || value.kind() == "attribute_value" {
                    (range.start, range.end)
                } else {
                    (range.start + 1, range.end.saturating_sub(1).max(range.start + 1))
                };
                attribute.value = text.get(start..end).map(str::to_string);
                attribute.value_start = Some(start);
                attribute.value_end = Some(end);
            }
            Some(attribute)
        })
        .collect()
}

/// 要素直下（HTML要素は透過）のスロットを集める。別のコンポーネントの中には入らない。
fn slots<N: MarkupNode>(element: N, text: &str) -> Vec<UsageSlot> {
    let mut result = Vec::new();
    let mut stack: Vec<(N, usize)> = element.children().into_iter().rev().map(|c| (c, 0)).collect();

    while let Some((node, depth)) = stack.pop() {
        if depth > MAX_DEPTH || node.kind() != "element" {
            continue;
        }
        match element_kind(node, text) {
            Some(TagKind::Slot(name)) => {
                if let Some((tag, _, self_closing)) = open_tag(node) {
                    result.push(UsageSlot {
                        name,
                        start: node.byte_range().start,
                        open_tag_end: tag.byte_range().end,
                        end: node.byte_range().end,
                        attributes: attributes(tag, text),
                        self_closing,
                    });
                }
            }
            Some(TagKind::Component { .. }) => {}
            _ => {
                for child in node.children().into_iter().rev() {
                    stack.push((child, depth + 1));
                }
            }
        }
    }
    result
}

fn usage_from_element<N: MarkupNode>(element: N, text: &str) -> Option<ComponentUsage> {
    let TagKind::Component { name, module, name_start } = element_kind(element, text)? else {
        return None;
    };
    let (tag, name_range, self_closing) = open_tag(element)?;
    let range = element.byte_range();
    let open_tag_end = tag.byte_range().end;

    let (content_start, content_end) = if self_closing {
        (None, None)
    } else {
        let end = element
            .child_of_kind(&["end_tag"])
            .map(|e| e.byte_range().start)
            .unwrap_or(range.end);
        (Some(open_tag_end), Some(end.max(open_tag_end)))
    };

    let slots = slots(element, text);
    let provided_slot_names = match (content_start, content_end) {
        (Some(start), Some(end)) => provided_slot_names(text, start, end, &slots),
        _ => Vec::new(),
    };

    Some(ComponentUsage {
        component_name: name,
        is_local: module.is_none(),
        module_context: module,
        open_tag_start: range.start,
        open_tag_end,
        name_start,
        name_end: name_range.end,
        attributes: attributes(tag, text),
        slots,
        self_closing,
        content_start,
        content_end,
        block_end: range.end,
        provided_slot_names,
    })
}

/// 構造木を深さ優先で辿って使用箇所を集める（開始位置順）
pub fn collect_usages<N: MarkupNode>(root: N, text: &str) -> Vec<ComponentUsage> {
    let mut usages = Vec::new();
    let mut stack = vec![(root, 0usize)];
    while let Some((node, depth)) = stack.pop() {
        if depth > MAX_DEPTH {
            continue;
        }
        if node.kind() == "element" {
            if let Some(usage) = usage_from_element(node, text) {
                usages.push(usage);
            }
        }
        for child in node.children().into_iter().rev() {
            stack.push((child, depth + 1));
        }
    }
    usages.sort_by_key(|u| u.open_tag_start);
    usages
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usages(text: &str) -> Vec<ComponentUsage> {
        let tree = parse_heex(text).unwrap();
        collect_usages(tree.root_node(), text)
    }

    #[test]
    fn test_mask_keeps_length() {
        let text = r#"<.button phx-click="go" disabled={@busy}>ほげ {@label}</.button>
<MyAppWeb.Layouts.app flash={@flash}><%= @x %></MyAppWeb.Layouts.app>"#;
        let masked = mask_heex(text);
        assert_eq!(masked.len(), text.len());
        assert!(masked.starts_with(r#"<xbutton phx-click="go" disabled="     ">"#));
        assert!(masked.contains("<MyAppWeb-Layouts-app"));
        assert!(masked.contains("</MyAppWeb-Layouts-app>"));
        assert!(!masked.contains("@x"));
    }

    #[test]
    fn test_collect_from_tree() {
        let text = r#"<div>
  <.table id="users" rows={@users}>
    <:col :let={user} label="Name">{user.name}</:col>
    <:action>
      <.link navigate={~p"/users"}>Show</.link>
    </:action>
  </.table>
</div>"#;
        let found = usages(text);
        assert_eq!(found.len(), 2);

        let table = &found[0];
        assert_eq!(table.component_name, "table");
        assert!(table.is_local);
        assert_eq!(&text[table.name_start..table.name_end], ".table");
        let slot_names: Vec<&str> = table.slots.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(slot_names, vec!["col", "action"]);
        assert_eq!(table.find_attribute("rows").unwrap().value.as_deref(), Some("{@users}"));
        assert_eq!(table.find_attribute("id").unwrap().value.as_deref(), Some("users"));
        assert!(!table.provides_slot("inner_block"));

        let link = &found[1];
        assert_eq!(link.component_name, "link");
        assert!(link.provides_slot("inner_block"));
        assert!(link.slots.is_empty());
    }

    #[test]
    fn test_remote_component() {
        let text = r#"<MyAppWeb.Layouts.app flash={@flash}><p>hi</p></MyAppWeb.Layouts.app>"#;
        let found = usages(text);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].module_context.as_deref(), Some("MyAppWeb.Layouts"));
        assert_eq!(found[0].component_name, "app");
        assert_eq!(found[0].block_end, text.len());
    }
}

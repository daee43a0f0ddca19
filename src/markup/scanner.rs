//! 正規表現とタグ走査による使用箇所の抽出
//!
//! 構造木も正確パーサーも使えないときの最終手段。属性値の `{...}` 内の
//! `>` や引用符でタグの終わりを誤検出しないよう、括弧と文字列を追跡する。

use once_cell::sync::Lazy;
use regex::Regex;

use crate::model::{ComponentUsage, UsageAttribute, UsageSlot};

static COMPONENT_OPEN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"<(?:\.([a-z_][A-Za-z0-9_]*[?!]?)|((?:[A-Z][A-Za-z0-9_]*\.)+)([a-z_][A-Za-z0-9_]*[?!]?))")
        .unwrap()
});
static SLOT_OPEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<:([a-z_][A-Za-z0-9_]*)").unwrap());
static TAG_OPEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<([A-Za-z.:][A-Za-z0-9_.:\-]*[?!]?)").unwrap());

/// 開始タグ1つ分
#[derive(Debug, Clone, PartialEq)]
pub struct OpenTag {
    /// `.button` / `Layouts.app` / `:col` / `div`
    pub name: String,
    pub start: usize,
    pub name_end: usize,
    /// `>` の直後
    pub end: usize,
    pub self_closing: bool,
    pub attributes: Vec<UsageAttribute>,
}

/// `{` の位置から対応する `}` の直後までの位置を返す
///
/// 式の中の文字列リテラルと入れ子の括弧を考慮する。
pub fn expression_end(text: &str, start: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut quote: Option<u8> = None;
    let mut i = start;
    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) => {
                if b == b'\\' {
                    i += 1;
                } else if b == q {
                    quote = None;
                }
            }
            None => match b {
                b'"' | b'\'' => quote = Some(b),
                b'{' | b'[' | b'(' => depth += 1,
                b'}' | b']' | b')' => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        return Some(i + 1);
                    }
                }
                _ => {}
            },
        }
        i += 1;
    }
    None
}

/// タグ名の直後から `>` を探し、(終端, 自己終了か) を返す
pub fn scan_tag_end(text: &str, from: usize) -> Option<(usize, bool)> {
    let bytes = text.as_bytes();
    let mut i = from;
    let mut last_significant = None;
    while i < bytes.len() {
        match bytes[i] {
            b'"' | b'\'' => {
                let quote = bytes[i];
                let close = text[i + 1..].find(quote as char)?;
                i += close + 2;
                last_significant = Some(quote);
                continue;
            }
            b'{' => {
                i = expression_end(text, i)?;
                last_significant = Some(b'}');
                continue;
            }
            b'>' => return Some((i + 1, last_significant == Some(b'/'))),
            b'<' => return None,
            b if b.is_ascii_whitespace() => {}
            b => last_significant = Some(b),
        }
        i += 1;
    }
    None
}

/// 開始タグ内の属性を読む（`{@rest}` のような動的属性は読み飛ばす）
pub fn parse_attributes(text: &str, from: usize, to: usize) -> Vec<UsageAttribute> {
    let bytes = text.as_bytes();
    let mut attributes = Vec::new();
    let mut i = from;

    while i < to {
        let b = bytes[i];
        if b.is_ascii_whitespace() || b == b'/' || b == b'>' {
            i += 1;
            continue;
        }
        if b == b'{' {
            i = expression_end(text, i).unwrap_or(to);
            continue;
        }

        let name_start = i;
        while i < to && !matches!(bytes[i], b'=' | b'>' | b'/' | b'{' | b'"' | b'\'') && !bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        let name_end = i;
        if name_end == name_start {
            i += 1;
            continue;
        }

        let mut j = i;
        while j < to && bytes[j].is_ascii_whitespace() {
            j += 1;
        }
        let mut attribute = UsageAttribute {
            name: text[name_start..name_end].to_string(),
            name_start,
            name_end,
            value: None,
            value_start: None,
            value_end: None,
        };

        if j < to && bytes[j] == b'=' {
            j += 1;
            while j < to && bytes[j].is_ascii_whitespace() {
                j += 1;
            }
            if j < to {
                match bytes[j] {
                    b'"' | b'\'' => {
                        let quote = bytes[j] as char;
                        let close = text[j + 1..to].find(quote).map(|c| j + 1 + c).unwrap_or(to);
                        attribute.value = Some(text[j + 1..close].to_string());
                        attribute.value_start = Some(j + 1);
                        attribute.value_end = Some(close);
                        j = (close + 1).min(to);
                    }
                    b'{' => {
                        let end = expression_end(text, j).unwrap_or(to).min(to);
                        attribute.value = Some(text[j..end].to_string());
                        attribute.value_start = Some(j);
                        attribute.value_end = Some(end);
                        j = end;
                    }
                    _ => {
                        let start = j;
                        while j < to && !bytes[j].is_ascii_whitespace() && bytes[j] != b'>' {
                            j += 1;
                        }
                        attribute.value = Some(text[start..j].to_string());
                        attribute.value_start = Some(start);
                        attribute.value_end = Some(j);
                    }
                }
            }
            i = j;
        }
        attributes.push(attribute);
    }
    attributes
}

fn read_open_tag(text: &str, start: usize, name_end: usize) -> Option<OpenTag> {
    let (end, self_closing) = scan_tag_end(text, name_end)?;
    let attr_end = if self_closing {
        text[..end - 1].rfind('/').unwrap_or(end - 1)
    } else {
        end - 1
    };
    Some(OpenTag {
        name: text[start + 1..name_end].to_string(),
        start,
        name_end,
        end,
        self_closing,
        attributes: parse_attributes(text, name_end, attr_end),
    })
}

/// テキスト中の全開始タグ（HTML要素も含む）
pub fn open_tags(text: &str) -> Vec<OpenTag> {
    TAG_OPEN_RE
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            read_open_tag(text, whole.start(), whole.end())
        })
        .collect()
}

fn is_name_boundary(rest: &str) -> bool {
    rest.chars()
        .next()
        .is_none_or(|c| c.is_whitespace() || c == '>' || c == '/')
}

/// 同名の開始・終了タグを数えて対応する閉じタグを探す
///
/// 戻り値は閉じタグの (開始位置, 終端)。`skip` に含まれる範囲の中は数えない。
pub fn find_matching_close(
    text: &str,
    tag: &str,
    from: usize,
    skip: &[(usize, usize)],
) -> Option<(usize, usize)> {
    let mut depth = 1usize;
    let mut pos = from;
    while let Some(rel) = text[pos..].find('<') {
        let at = pos + rel;
        if let Some(&(_, end)) = skip.iter().find(|(s, e)| at >= *s && at < *e) {
            pos = end;
            continue;
        }
        let rest = &text[at + 1..];
        if let Some(after) = rest.strip_prefix('/') {
            if after.starts_with(tag) && is_name_boundary(&after[tag.len()..]) {
                let close_end = text[at..].find('>').map(|i| at + i + 1)?;
                depth -= 1;
                if depth == 0 {
                    return Some((at, close_end));
                }
                pos = close_end;
                continue;
            }
        } else if rest.starts_with(tag) && is_name_boundary(&rest[tag.len()..]) {
            if let Some((end, self_closing)) = scan_tag_end(text, at + 1 + tag.len()) {
                if !self_closing {
                    depth += 1;
                }
                pos = end;
                continue;
            }
        }
        pos = at + 1;
    }
    None
}

/// 正規表現による使用箇所の抽出（開始位置順）
pub fn collect_usages(text: &str) -> Vec<ComponentUsage> {
    let mut usages: Vec<ComponentUsage> = COMPONENT_OPEN_RE
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let tag = read_open_tag(text, whole.start(), whole.end())?;
            let (component_name, module_context, name_start) = match (caps.get(1), caps.get(2), caps.get(3)) {
                (Some(local), _, _) => (local.as_str().to_string(), None, local.start() - 1),
                (None, Some(module), Some(name)) => (
                    name.as_str().to_string(),
                    Some(module.as_str().trim_end_matches('.').to_string()),
                    module.start(),
                ),
                _ => return None,
            };

            let (content, block_end) = if tag.self_closing {
                (None, tag.end)
            } else {
                match find_matching_close(text, &tag.name, tag.end, &[]) {
                    Some((close_start, close_end)) => (Some((tag.end, close_start)), close_end),
                    None => (None, tag.end),
                }
            };

            Some(ComponentUsage {
                component_name,
                is_local: module_context.is_none(),
                module_context,
                open_tag_start: tag.start,
                open_tag_end: tag.end,
                name_start,
                name_end: tag.name_end,
                attributes: tag.attributes,
                slots: Vec::new(),
                self_closing: tag.self_closing,
                content_start: content.map(|c| c.0),
                content_end: content.map(|c| c.1),
                block_end,
                provided_slot_names: Vec::new(),
            })
        })
        .collect();
    usages.sort_by_key(|u| u.open_tag_start);

    let ranges: Vec<(usize, usize)> = usages.iter().map(|u| (u.open_tag_start, u.block_end)).collect();
    for (i, usage) in usages.iter_mut().enumerate() {
        let (Some(start), Some(end)) = (usage.content_start, usage.content_end) else {
            continue;
        };
        // 自分の中にある別コンポーネントの範囲（そのスロットは数えない）
        let nested: Vec<(usize, usize)> = ranges
            .iter()
            .enumerate()
            .filter(|(j, (s, e))| *j != i && *s >= start && *e <= end)
            .map(|(_, r)| *r)
            .collect();
        usage.slots = collect_slots(text, start, end, &nested);
        usage.provided_slot_names = provided_slot_names(text, start, end, &usage.slots);
    }
    usages
}

/// 本文中の直下のスロットを集める
fn collect_slots(text: &str, start: usize, end: usize, nested: &[(usize, usize)]) -> Vec<UsageSlot> {
    let mut slots: Vec<UsageSlot> = Vec::new();
    let mut pos = start;
    while pos < end {
        let Some(caps) = SLOT_OPEN_RE.captures(&text[pos..end]) else {
            break;
        };
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            break;
        };
        let at = pos + whole.start();
        if let Some(&(_, skip_end)) = nested.iter().find(|(s, e)| at >= *s && at < *e) {
            pos = skip_end;
            continue;
        }
        let name_end = pos + whole.end();
        let Some(tag) = read_open_tag(text, at, name_end) else {
            pos = name_end;
            continue;
        };
        let slot_end = if tag.self_closing {
            tag.end
        } else {
            find_matching_close(text, &tag.name, tag.end, nested)
                .map(|(_, close_end)| close_end)
                .unwrap_or(tag.end)
        };
        slots.push(UsageSlot {
            name: name.as_str().to_string(),
            start: at,
            open_tag_end: tag.end,
            end: slot_end,
            attributes: tag.attributes,
            self_closing: tag.self_closing,
        });
        pos = slot_end.max(name_end);
    }
    slots
}

/// 使われているスロット名（スロット外に本文があれば `inner_block` も）
pub fn provided_slot_names(text: &str, start: usize, end: usize, slots: &[UsageSlot]) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for slot in slots {
        if !names.contains(&slot.name) {
            names.push(slot.name.clone());
        }
    }

    let mut pos = start;
    let mut has_body = false;
    let mut ordered: Vec<&UsageSlot> = slots.iter().collect();
    ordered.sort_by_key(|s| s.start);
    for slot in ordered {
        if slot.start > pos && !text[pos..slot.start].trim().is_empty() {
            has_body = true;
        }
        pos = pos.max(slot.end);
    }
    if pos < end && !text[pos..end].trim().is_empty() {
        has_body = true;
    }
    if has_body && !names.iter().any(|n| n == crate::model::INNER_BLOCK) {
        names.push(crate::model::INNER_BLOCK.to_string());
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_end_ignores_expression_contents() {
        let text = r#"<.button disabled={@count > 0} label="a > b">Go</.button>"#;
        let usages = collect_usages(text);
        assert_eq!(usages.len(), 1);
        let usage = &usages[0];
        assert_eq!(&text[usage.open_tag_start..usage.open_tag_end], r#"<.button disabled={@count > 0} label="a > b">"#);
        assert_eq!(usage.find_attribute("disabled").unwrap().value.as_deref(), Some("{@count > 0}"));
        assert_eq!(usage.find_attribute("label").unwrap().value.as_deref(), Some("a > b"));
        assert_eq!(usage.provided_slot_names, vec!["inner_block"]);
        assert_eq!(usage.block_end, text.len());
    }

    #[test]
    fn test_nested_same_name() {
        let text = "<.card>\n  <.card>inner</.card>\n</.card>";
        let usages = collect_usages(text);
        assert_eq!(usages.len(), 2);
        assert_eq!(usages[0].block_end, text.len());
        assert!(usages[1].block_end < usages[0].block_end);
    }

    #[test]
    fn test_nested_slots_are_not_attributed_to_parent() {
        let text = r#"<.table rows={@users}>
  <:col :let={user} label="Name">
    <.modal id="m"><:title>Hi</:title></.modal>
  </:col>
</.table>"#;
        let usages = collect_usages(text);
        assert_eq!(usages.len(), 2);
        let table = &usages[0];
        assert_eq!(table.slots.len(), 1);
        assert_eq!(table.slots[0].name, "col");
        assert_eq!(table.provided_slot_names, vec!["col"]);
        let modal = &usages[1];
        assert_eq!(modal.provided_slot_names, vec!["title"]);
    }

    #[test]
    fn test_remote_and_self_closing() {
        let text = r#"<MyAppWeb.Layouts.app flash={@flash} /><.icon name="hero-x" />"#;
        let usages = collect_usages(text);
        assert_eq!(usages.len(), 2);
        assert_eq!(usages[0].module_context.as_deref(), Some("MyAppWeb.Layouts"));
        assert_eq!(usages[0].component_name, "app");
        assert!(!usages[0].is_local);
        assert!(usages[0].self_closing);
        assert_eq!(usages[1].component_name, "icon");
        assert!(usages[1].provided_slot_names.is_empty());
    }

    #[test]
    fn test_dynamic_attributes_skipped() {
        let text = r#"<div :for={item <- @items} {@rest} class="x">"#;
        let tags = open_tags(text);
        assert_eq!(tags.len(), 1);
        let names: Vec<&str> = tags[0].attributes.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec![":for", "class"]);
    }
}

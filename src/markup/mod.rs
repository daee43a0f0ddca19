//! テンプレート内のコンポーネント使用箇所の抽出
//!
//! 構造木（キャッシュ済みの場合のみ）→ 正確パーサー（非同期版のみ）→ 正規表現、の順に試す。

pub mod scanner;
pub mod tree;

use std::borrow::Cow;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;
use tree_sitter::Tree;

use crate::model::{ComponentUsage, INNER_BLOCK, UsageAttribute};
use crate::parser::cache::BoundedCache;
use crate::parser::kind::{ExactUsage, Markup};
use crate::parser::ParserGateway;
use crate::util::{content_hash, is_heex_file};

static SIGIL_H_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"~H(?:"""|''')"#).unwrap());

pub const DEFAULT_TREE_CACHE_SIZE: usize = 100;

#[derive(Clone)]
struct CachedTree {
    hash: String,
    tree: Tree,
}

/// どの段階で使用箇所を得たか
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Tree,
    Exact,
    Regex,
}

/// コンポーネント使用箇所の抽出器
///
/// 構造木はキーごとに内容ハッシュと一緒に保持し、テキストが一致する場合だけ使う。
pub struct UsageExtractor {
    trees: BoundedCache<String, CachedTree>,
}

impl UsageExtractor {
    pub fn new(capacity: usize) -> Self {
        Self {
            trees: BoundedCache::new(capacity),
        }
    }

    /// テキストを解析して構造木を作り直す
    pub fn rebuild_tree(&self, key: &str, text: &str) -> bool {
        match tree::parse_heex(text) {
            Some(tree) => {
                self.trees.set(
                    key.to_string(),
                    CachedTree {
                        hash: content_hash(text),
                        tree,
                    },
                );
                true
            }
            None => {
                self.trees.delete(&key.to_string());
                false
            }
        }
    }

    pub fn invalidate(&self, key: &str) {
        self.trees.delete(&key.to_string());
    }

    pub fn clear(&self) {
        self.trees.clear();
    }

    fn cached_tree(&self, key: &str, text: &str) -> Option<Tree> {
        let cached = self.trees.get(&key.to_string())?;
        (cached.hash == content_hash(text)).then_some(cached.tree)
    }

    /// 構造木があれば使い、なければ正規表現で抽出
    pub fn collect_usages(&self, text: &str, key: &str) -> Vec<ComponentUsage> {
        self.collect_with_tier(text, key).0
    }

    pub fn collect_with_tier(&self, text: &str, key: &str) -> (Vec<ComponentUsage>, Tier) {
        if let Some(tree) = self.cached_tree(key, text) {
            return (tree::collect_usages(tree.root_node(), text), Tier::Tree);
        }
        (scanner::collect_usages(text), Tier::Regex)
    }

    /// 非同期版: 構造木 → 正確パーサー → 正規表現
    pub async fn collect_usages_async(
        &self,
        gateway: &ParserGateway,
        path: &Path,
        text: &str,
        key: &str,
    ) -> (Vec<ComponentUsage>, Tier) {
        if let Some(tree) = self.cached_tree(key, text) {
            return (tree::collect_usages(tree.root_node(), text), Tier::Tree);
        }
        match gateway.parse_exact::<Markup>(path, text).await {
            Ok(metadata) => {
                let mut usages: Vec<ComponentUsage> = metadata
                    .usages
                    .into_iter()
                    .filter_map(|usage| from_exact(usage, text))
                    .collect();
                usages.sort_by_key(|u| u.open_tag_start);
                (usages, Tier::Exact)
            }
            Err(e) => {
                debug!("Exact markup parse unavailable for {}: {}", path.display(), e);
                (scanner::collect_usages(text), Tier::Regex)
            }
        }
    }

    /// `offset` を含む使用箇所（外側から順）
    pub fn usage_stack(&self, text: &str, key: &str, offset: usize) -> Vec<ComponentUsage> {
        usage_stack(self.collect_usages(text, key), offset)
    }

    /// `offset` を含む最も内側の使用箇所
    pub fn innermost_usage(&self, text: &str, key: &str, offset: usize) -> Option<ComponentUsage> {
        self.usage_stack(text, key, offset).pop()
    }
}

impl Default for UsageExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_TREE_CACHE_SIZE)
    }
}

/// 範囲が `offset` を含む使用箇所を外側から順に並べる
pub fn usage_stack(usages: Vec<ComponentUsage>, offset: usize) -> Vec<ComponentUsage> {
    let mut stack: Vec<ComponentUsage> = usages.into_iter().filter(|u| u.contains(offset)).collect();
    stack.sort_by(|a, b| {
        a.open_tag_start
            .cmp(&b.open_tag_start)
            .then(b.block_end.cmp(&a.block_end))
    });
    stack
}

/// 正確パーサーのフラットな結果を変換（スロットの詳細は名前のみ）
fn from_exact(usage: ExactUsage, text: &str) -> Option<ComponentUsage> {
    if usage.start > usage.end || usage.end > text.len() {
        return None;
    }
    let name_start = usage.name_start.unwrap_or(usage.start + 1);
    let name_end = usage
        .name_end
        .unwrap_or(name_start + usage.name.len() + usize::from(usage.is_local));

    let attributes = usage
        .attributes
        .into_iter()
        .map(|attr| {
            let name_end = attr.start + attr.name.len();
            let value_end = attr.value.as_ref().map(|_| attr.end);
            let value_start = attr
                .value
                .as_ref()
                .map(|v| attr.end.saturating_sub(v.len()));
            UsageAttribute {
                name: attr.name,
                name_start: attr.start,
                name_end,
                value: attr.value,
                value_start,
                value_end,
            }
        })
        .collect();

    let mut provided_slot_names = usage.slots;
    let has_body = match (usage.content_start, usage.content_end) {
        (Some(start), Some(end)) => text.get(start..end).is_some_and(|body| {
            let without_slots = body.split("<:").next().unwrap_or("");
            !without_slots.trim().is_empty()
        }),
        _ => false,
    };
    if has_body && !provided_slot_names.iter().any(|s| s == INNER_BLOCK) {
        provided_slot_names.push(INNER_BLOCK.to_string());
    }

    Some(ComponentUsage {
        component_name: usage.name,
        module_context: usage.module_context,
        is_local: usage.is_local,
        open_tag_start: usage.start,
        open_tag_end: usage.end,
        name_start,
        name_end,
        attributes,
        slots: Vec::new(),
        self_closing: usage.self_closing,
        content_start: usage.content_start,
        content_end: usage.content_end,
        block_end: usage.block_end.unwrap_or(usage.end),
        provided_slot_names,
    })
}

/// テンプレートとして扱うテキスト
///
/// .heex はそのまま、.ex は `~H` シギルの中身以外を空白にした同じ長さのテキスト。
pub fn template_text<'a>(path: &Path, text: &'a str) -> Cow<'a, str> {
    if is_heex_file(path) {
        return Cow::Borrowed(text);
    }
    let mut out: Vec<u8> = text
        .bytes()
        .map(|b| if b == b'\n' { b'\n' } else { b' ' })
        .collect();
    for m in SIGIL_H_RE.find_iter(text) {
        let delimiter = &text[m.end() - 3..m.end()];
        let body_start = m.end();
        let body_end = text[body_start..]
            .find(delimiter)
            .map(|e| body_start + e)
            .unwrap_or(text.len());
        out[body_start..body_end].copy_from_slice(&text.as_bytes()[body_start..body_end]);
    }
    Cow::Owned(String::from_utf8(out).unwrap_or_default())
}

/// `~H` シギルを含むか（.heex は常に対象）
pub fn has_template(path: &Path, text: &str) -> bool {
    is_heex_file(path) || SIGIL_H_RE.is_match(text)
}

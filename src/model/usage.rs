use serde::{Deserialize, Serialize};

/// テンプレート内の属性（バイトオフセット付き）
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageAttribute {
    pub name: String,
    pub name_start: usize,
    pub name_end: usize,
    /// 値（文字列はクォートを除去、式は `{...}` のまま）
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub value_start: Option<usize>,
    #[serde(default)]
    pub value_end: Option<usize>,
}

impl UsageAttribute {
    pub fn is_expression(&self) -> bool {
        self.value.as_deref().is_some_and(|v| v.starts_with('{'))
    }

    /// `{expr}` の中身
    pub fn expression(&self) -> Option<&str> {
        self.value
            .as_deref()
            .and_then(|v| v.strip_prefix('{'))
            .and_then(|v| v.strip_suffix('}'))
            .map(str::trim)
    }
}

/// `<:slot>` の使用箇所
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageSlot {
    pub name: String,
    pub start: usize,
    /// 開始タグの終端
    pub open_tag_end: usize,
    /// 閉じタグの終端（自己終了タグなら開始タグの終端）
    pub end: usize,
    #[serde(default)]
    pub attributes: Vec<UsageAttribute>,
    #[serde(default)]
    pub self_closing: bool,
}

/// テンプレート内のコンポーネント使用箇所
///
/// 問い合わせごとに現在のテキストから組み立てられ、永続化されない。
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentUsage {
    pub component_name: String,
    /// `<MyAppWeb.Layouts.app>` の "MyAppWeb.Layouts"
    #[serde(default)]
    pub module_context: Option<String>,
    /// `<.button>` 形式か
    pub is_local: bool,
    pub open_tag_start: usize,
    pub open_tag_end: usize,
    pub name_start: usize,
    pub name_end: usize,
    #[serde(default)]
    pub attributes: Vec<UsageAttribute>,
    #[serde(default)]
    pub slots: Vec<UsageSlot>,
    pub self_closing: bool,
    #[serde(default)]
    pub content_start: Option<usize>,
    #[serde(default)]
    pub content_end: Option<usize>,
    pub block_end: usize,
    #[serde(default)]
    pub provided_slot_names: Vec<String>,
}

impl ComponentUsage {
    pub fn contains(&self, offset: usize) -> bool {
        offset >= self.open_tag_start && offset <= self.block_end
    }

    /// カーソルが開始タグ内（属性位置）にあるか
    pub fn in_open_tag(&self, offset: usize) -> bool {
        offset > self.name_end && offset < self.open_tag_end.max(self.name_end + 1)
    }

    pub fn find_attribute(&self, name: &str) -> Option<&UsageAttribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn provides_slot(&self, name: &str) -> bool {
        self.provided_slot_names.iter().any(|s| s == name)
    }

    /// テンプレートに書かれた名前（`.button` や `Layouts.app`）
    pub fn tag_name(&self) -> String {
        match &self.module_context {
            Some(module) => format!("{}.{}", module, self.component_name),
            None => format!(".{}", self.component_name),
        }
    }
}

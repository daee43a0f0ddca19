use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    HandleEvent,
    HandleInfo,
}

/// イベント名の書き方（文字列 or アトム）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NameKind {
    String,
    Atom,
}

/// LiveViewのイベントハンドラ
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub name: String,
    #[serde(default)]
    pub file_path: PathBuf,
    pub module_name: String,
    pub line: u32,
    /// 第2引数のパターン（ソースのまま）
    #[serde(default)]
    pub params: String,
    pub kind: EventKind,
    #[serde(default)]
    pub doc: Option<String>,
    pub name_kind: NameKind,
}

impl Event {
    /// 未使用イベント解析の対象か
    ///
    /// アトム名のイベントはテンプレートの文字列と照合できないため対象外。
    pub fn is_unused_candidate(&self) -> bool {
        self.kind == EventKind::HandleEvent && self.name_kind == NameKind::String
    }
}

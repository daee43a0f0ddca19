use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// テンプレートの定義方法
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateKind {
    /// `embed_templates "page_html/*"` で取り込まれた .heex ファイル
    Embedded,
    /// `def index(assigns)` 形式の関数テンプレート
    Function,
    /// `foo_live.ex` と同じ場所にある `foo_live.html.heex`
    Colocated,
}

/// テンプレートとその所属モジュール
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateInfo {
    /// テンプレート名（"index" など）
    pub name: String,
    pub module_name: String,
    /// テンプレート本体のファイル（.heex、関数テンプレートの場合は .ex）
    pub file_path: PathBuf,
    /// 所属モジュールを定義している .ex ファイル
    #[serde(default)]
    pub module_file: PathBuf,
    #[serde(default)]
    pub line: u32,
    pub kind: TemplateKind,
    #[serde(default = "default_format")]
    pub format: String,
}

fn default_format() -> String {
    "html".to_string()
}

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// ルーター定義から得られたルート
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    pub path: String,
    /// "GET", "POST", ... ワイルドカードmatchの場合は "*"
    pub verb: String,
    #[serde(default)]
    pub file_path: PathBuf,
    pub line: u32,
    #[serde(default)]
    pub controller: Option<String>,
    #[serde(default)]
    pub action: Option<String>,
    pub helper_base: String,
    /// パスパラメータ（左から右の出現順、ネスト元のパラメータを含む）
    #[serde(default)]
    pub params: Vec<String>,
    #[serde(default)]
    pub is_resource: bool,
    #[serde(default)]
    pub live_module: Option<String>,
    #[serde(default)]
    pub live_action: Option<String>,
    #[serde(default)]
    pub forward_to: Option<String>,
    #[serde(default)]
    pub resource_options: Option<ResourceOptions>,
    /// 外側から順の `pipe_through` パイプライン
    #[serde(default)]
    pub pipelines: Vec<String>,
    #[serde(default)]
    pub scope_path: Option<String>,
}

/// `resources` のオプション
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceOptions {
    #[serde(default)]
    pub only: Option<Vec<String>>,
    #[serde(default)]
    pub except: Option<Vec<String>>,
    #[serde(default)]
    pub singleton: bool,
    #[serde(default)]
    pub param: Option<String>,
    #[serde(default)]
    pub as_name: Option<String>,
}

impl Route {
    /// 補完やホバーで使う "GET /users/:id"
    pub fn detail(&self) -> String {
        format!("{} {}", self.verb, self.path)
    }

    /// `user_path` 形式のヘルパー名
    pub fn path_helper(&self) -> String {
        format!("{}_path", self.helper_base)
    }

    pub fn is_live(&self) -> bool {
        self.live_module.is_some()
    }
}

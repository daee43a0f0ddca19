use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControllerAction {
    pub name: String,
    pub line: u32,
}

/// テンプレートに渡される assign
///
/// `value` は渡している式。アクション内で束縛された変数ならその右辺に置き換えてある。
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "RawRenderAssign")]
pub struct RenderAssign {
    pub name: String,
    pub value: Option<String>,
}

impl RenderAssign {
    pub fn new(name: impl Into<String>, value: Option<String>) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// 名前だけの形式も受け付ける
#[derive(Deserialize)]
#[serde(untagged)]
enum RawRenderAssign {
    Name(String),
    Full {
        name: String,
        #[serde(default)]
        value: Option<String>,
    },
}

impl From<RawRenderAssign> for RenderAssign {
    fn from(raw: RawRenderAssign) -> Self {
        match raw {
            RawRenderAssign::Name(name) => Self { name, value: None },
            RawRenderAssign::Full { name, value } => Self { name, value },
        }
    }
}

/// `render(conn, :index, user: user)` 呼び出し
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderInfo {
    /// 呼び出しを含むアクション
    #[serde(default)]
    pub action: Option<String>,
    /// テンプレート名（"index"、"index.html" は "index" に正規化）
    pub template: String,
    #[serde(default)]
    pub assigns: Vec<RenderAssign>,
    pub line: u32,
    /// `put_view` で指定されたビュー
    #[serde(default)]
    pub view_module: Option<String>,
}

impl RenderInfo {
    pub fn assign_names(&self) -> Vec<&str> {
        self.assigns.iter().map(|a| a.name.as_str()).collect()
    }
}

/// コントローラー
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControllerInfo {
    pub module_name: String,
    #[serde(default)]
    pub file_path: PathBuf,
    #[serde(default)]
    pub line: u32,
    #[serde(default)]
    pub actions: Vec<ControllerAction>,
    #[serde(default)]
    pub renders: Vec<RenderInfo>,
}

impl ControllerInfo {
    /// 既定のビュー（`PageController` -> `PageHTML`）
    pub fn html_module(&self) -> String {
        match self.module_name.strip_suffix("Controller") {
            Some(base) => format!("{}HTML", base),
            None => format!("{}HTML", self.module_name),
        }
    }

    /// render呼び出しのビュー（put_view指定があればそちらを優先）
    pub fn view_for(&self, render: &RenderInfo) -> String {
        render
            .view_module
            .clone()
            .unwrap_or_else(|| self.html_module())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_assign_accepts_bare_names() {
        let render: RenderInfo = serde_json::from_str(
            r#"{"template": "show", "line": 3, "assigns": ["user", {"name": "post", "value": "post"}]}"#,
        )
        .unwrap();
        assert_eq!(render.assign_names(), vec!["user", "post"]);
        assert_eq!(render.assigns[0].value, None);
        assert_eq!(render.assigns[1].value.as_deref(), Some("post"));
    }
}

use std::path::Path;

use super::registry::{RegistryKind, Store};
use crate::model::{ControllerInfo, RenderAssign, RenderInfo};
use crate::parser::Controllers;
use crate::parser::kind::ControllersMetadata;

/// コントローラーのストア
pub type ControllerStore = Store<ControllerKind>;

pub struct ControllerKind;

impl RegistryKind for ControllerKind {
    type Parse = Controllers;
    type Entity = ControllerInfo;

    const LABEL: &'static str = "controllers";

    fn is_candidate(path: &Path) -> bool {
        path.file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with("_controller.ex"))
    }

    fn into_entities(path: &Path, metadata: ControllersMetadata) -> Vec<ControllerInfo> {
        metadata
            .controllers
            .into_iter()
            .map(|mut controller| {
                controller.file_path = path.to_path_buf();
                controller
            })
            .collect()
    }
}

impl Store<ControllerKind> {
    pub fn get_all_controllers(&self) -> Vec<ControllerInfo> {
        self.registry().all()
    }

    pub fn get_controllers_from_file(&self, path: &Path) -> Vec<ControllerInfo> {
        self.registry().from_file(path)
    }

    /// ビューモジュールとテンプレート名に対応する render 呼び出し
    pub fn get_renders_for_template(&self, view_module: &str, template: &str) -> Vec<RenderInfo> {
        let mut renders = Vec::new();
        for controller in self.get_all_controllers() {
            for render in &controller.renders {
                if render.template == template && controller.view_for(render) == view_module {
                    renders.push(render.clone());
                }
            }
        }
        renders.sort_by_key(|r| r.line);
        renders
    }

    /// テンプレートに渡される assigns（出現順、名前で重複なし）
    ///
    /// 同じ名前が複数の render にあれば、値の式が分かる最初のものを残す。
    pub fn get_assigns_for_template(&self, view_module: &str, template: &str) -> Vec<RenderAssign> {
        let mut assigns: Vec<RenderAssign> = Vec::new();
        for render in self.get_renders_for_template(view_module, template) {
            for assign in render.assigns {
                match assigns.iter_mut().find(|a| a.name == assign.name) {
                    Some(existing) if existing.value.is_none() => existing.value = assign.value,
                    Some(_) => {}
                    None => assigns.push(assign),
                }
            }
        }
        assigns
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::ParserGateway;

    const CONTROLLER: &str = r#"defmodule MyAppWeb.UserController do
  use MyAppWeb, :controller

  def show(conn, %{"id" => id}) do
    render(conn, :show, user: Accounts.get_user!(id))
  end

  def preview(conn, _params) do
    conn
    |> assign(:user, nil)
    |> assign(:mode, :preview)
    |> render(:show)
  end
end
"#;

    #[tokio::test]
    async fn test_assigns_for_template_merge_renders() {
        let gateway = ParserGateway::fallback_only();
        let store = ControllerStore::new();
        let path = Path::new("/app/lib/my_app_web/controllers/user_controller.ex");
        store.update_file(&gateway, path, CONTROLLER).await;

        assert_eq!(store.get_renders_for_template("MyAppWeb.UserHTML", "show").len(), 2);
        let assigns = store.get_assigns_for_template("MyAppWeb.UserHTML", "show");
        let names: Vec<_> = assigns.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["user", "mode"]);
        assert_eq!(assigns[0].value.as_deref(), Some("Accounts.get_user!(id)"));
        assert!(store.get_assigns_for_template("MyAppWeb.PageHTML", "show").is_empty());
    }
}

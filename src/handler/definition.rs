use std::path::Path;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use tower_lsp::lsp_types::*;
use tracing::debug;

use crate::index::Index;
use crate::markup::{UsageExtractor, template_text};
use crate::resolve::Resolver;
use crate::util::{line_range, position_to_offset};

static VERIFIED_ROUTE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"~p"([^"\n]*)""#).unwrap());

pub struct DefinitionHandler {
    index: Arc<Index>,
    extractor: Arc<UsageExtractor>,
}

impl DefinitionHandler {
    pub fn new(index: Arc<Index>, extractor: Arc<UsageExtractor>) -> Self {
        Self { index, extractor }
    }

    pub fn goto_definition(
        &self,
        path: &Path,
        key: &str,
        text: &str,
        position: Position,
    ) -> Option<GotoDefinitionResponse> {
        let offset = position_to_offset(text, position);
        let location = self
            .route_definition(text, offset)
            .or_else(|| self.component_definition(path, key, text, offset))?;
        Some(GotoDefinitionResponse::Scalar(location))
    }

    /// `~p"/users/..."` → ルーターの定義行
    fn route_definition(&self, text: &str, offset: usize) -> Option<Location> {
        let literal = VERIFIED_ROUTE_RE
            .captures_iter(text)
            .filter_map(|caps| caps.get(1))
            .find(|m| offset >= m.start() && offset <= m.end())?;
        let route = Resolver::new(&self.index).find_route_by_path(literal.as_str())?;
        debug!("goto route {} -> {}:{}", literal.as_str(), route.file_path.display(), route.line);
        Some(Location {
            uri: Url::from_file_path(&route.file_path).ok()?,
            range: line_range(route.line),
        })
    }

    /// タグ名の上 → コンポーネントの定義行
    fn component_definition(&self, path: &Path, key: &str, text: &str, offset: usize) -> Option<Location> {
        let template = template_text(path, text);
        let usage = self
            .extractor
            .usage_stack(&template, key, offset)
            .into_iter()
            .rev()
            .find(|u| offset >= u.name_start && offset <= u.name_end)?;
        let component = Resolver::new(&self.index).resolve_component(
            path,
            &usage.component_name,
            usage.module_context.as_deref(),
            Some(text),
        )?;
        // 組み込みコンポーネントには定義ファイルがない
        if component.file_path.as_os_str().is_empty() {
            return None;
        }
        Some(Location {
            uri: Url::from_file_path(&component.file_path).ok()?,
            range: line_range(component.line),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::ParserGateway;
    use crate::util::offset_to_position;

    const ROUTER: &str = r#"defmodule MyAppWeb.Router do
  use MyAppWeb, :router

  scope "/", MyAppWeb do
    get "/users/:id", UserController, :show
  end
end
"#;

    const CORE: &str = r#"defmodule MyAppWeb.CoreComponents do
  use Phoenix.Component

  attr :name, :string, required: true

  def icon(assigns) do
    ~H"""
    <span class={@name} />
    """
  end
end
"#;

    #[tokio::test]
    async fn test_goto_component_and_route() {
        let gateway = ParserGateway::fallback_only();
        let index = Arc::new(Index::new());
        index
            .update_file(&gateway, Path::new("/app/lib/my_app_web/router.ex"), ROUTER)
            .await;
        index
            .update_file(
                &gateway,
                Path::new("/app/lib/my_app_web/components/core_components.ex"),
                CORE,
            )
            .await;
        let handler = DefinitionHandler::new(index, Arc::new(UsageExtractor::default()));

        let page = "defmodule MyAppWeb.PageLive do\n  use MyAppWeb, :live_view\n\n  def render(assigns) do\n    ~H\"\"\"\n    <.icon name=\"x\" /><.link navigate={~p\"/users/1\"}>me</.link>\n    \"\"\"\n  end\nend\n";
        let path = Path::new("/app/lib/my_app_web/live/page_live.ex");

        let on_icon = offset_to_position(page, page.find("icon").unwrap() + 1);
        match handler.goto_definition(path, "k", page, on_icon) {
            Some(GotoDefinitionResponse::Scalar(location)) => {
                assert!(location.uri.path().ends_with("core_components.ex"));
                assert_eq!(location.range.start.line, 5);
            }
            other => panic!("unexpected {:?}", other),
        }

        let on_route = offset_to_position(page, page.find("/users/1").unwrap() + 2);
        match handler.goto_definition(path, "k", page, on_route) {
            Some(GotoDefinitionResponse::Scalar(location)) => {
                assert!(location.uri.path().ends_with("router.ex"));
                assert_eq!(location.range.start.line, 4);
            }
            other => panic!("unexpected {:?}", other),
        }

        let on_link = offset_to_position(page, page.find("link").unwrap());
        assert!(handler.goto_definition(path, "k", page, on_link).is_none());
    }
}

use std::path::Path;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use tower_lsp::lsp_types::{Diagnostic, DiagnosticSeverity, NumberOrString, Range};
use tracing::debug;

use crate::config::DiagnosticsConfig;
use crate::index::Index;
use crate::markup::scanner::{OpenTag, open_tags};
use crate::markup::{UsageExtractor, has_template, template_text};
use crate::model::{Component, ComponentUsage};
use crate::resolve::Resolver;
use crate::resolve::builtins::{is_always_allowed_attribute, is_html_attribute};
use crate::util::offsets_to_range;

static VERIFIED_ROUTE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"~p"([^"\n]*)""#).unwrap());
static STREAM_FOR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\{\s*([a-z_]\w*)\s*,\s*[^}]*\}\s*<-\s*@streams\.").unwrap()
});

const SOURCE: &str = "phoenix-lsp";

/// 診断ハンドラー
pub struct DiagnosticsHandler {
    index: Arc<Index>,
    extractor: Arc<UsageExtractor>,
    config: DiagnosticsConfig,
}

impl DiagnosticsHandler {
    pub fn new(index: Arc<Index>, extractor: Arc<UsageExtractor>, config: DiagnosticsConfig) -> Self {
        Self {
            index,
            extractor,
            config,
        }
    }

    /// 重要度文字列をDiagnosticSeverityに変換
    fn parse_severity(&self) -> DiagnosticSeverity {
        match self.config.severity.to_lowercase().as_str() {
            "error" => DiagnosticSeverity::ERROR,
            "warning" => DiagnosticSeverity::WARNING,
            "hint" => DiagnosticSeverity::HINT,
            "information" | "info" => DiagnosticSeverity::INFORMATION,
            _ => DiagnosticSeverity::WARNING,
        }
    }

    fn diagnostic(&self, range: Range, code: &str, message: String) -> Diagnostic {
        Diagnostic {
            range,
            severity: Some(self.parse_severity()),
            code: Some(NumberOrString::String(code.to_string())),
            source: Some(SOURCE.to_string()),
            message,
            ..Default::default()
        }
    }

    /// テンプレート（.heex と `~H`）と検証済みルートの診断
    pub fn diagnose(&self, path: &Path, key: &str, text: &str) -> Vec<Diagnostic> {
        if !self.config.enabled {
            return Vec::new();
        }

        let mut diagnostics = Vec::new();
        if has_template(path, text) {
            let template = template_text(path, text);
            let usages = self.extractor.collect_usages(&template, key);
            let resolver = Resolver::new(&self.index);

            for usage in &usages {
                match resolver.resolve_component(
                    path,
                    &usage.component_name,
                    usage.module_context.as_deref(),
                    Some(text),
                ) {
                    Some(component) => diagnostics.extend(self.check_usage(text, usage, &component)),
                    None if self.config.unknown_components => {
                        diagnostics.push(self.diagnostic(
                            offsets_to_range(text, usage.name_start, usage.name_end),
                            "unknown-component",
                            format!("Unknown component <{}>", usage.tag_name()),
                        ));
                    }
                    None => {}
                }
            }

            if self.config.loop_keys {
                diagnostics.extend(self.check_loop_keys(text, &open_tags(&template)));
            }
        }

        if self.config.verified_routes {
            diagnostics.extend(self.check_verified_routes(text));
        }

        debug!("diagnose: {} -> {} diagnostics", path.display(), diagnostics.len());
        diagnostics
    }

    /// 属性と必須項目の確認
    fn check_usage(&self, text: &str, usage: &ComponentUsage, component: &Component) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();
        let tag = usage.tag_name();

        if self.config.unknown_attributes {
            for attr in &usage.attributes {
                let known = is_always_allowed_attribute(&attr.name)
                    || component.find_attribute(&attr.name).is_some()
                    || (component.accepts_global_attributes() && is_html_attribute(&attr.name));
                if !known {
                    diagnostics.push(self.diagnostic(
                        offsets_to_range(text, attr.name_start, attr.name_end),
                        "unknown-attribute",
                        format!("Unknown attribute '{}' for <{}>", attr.name, tag),
                    ));
                }
            }
        }

        if self.config.missing_required {
            let name_range = offsets_to_range(text, usage.name_start, usage.name_end);
            for attr in component.required_attributes() {
                if usage.find_attribute(&attr.name).is_none() {
                    diagnostics.push(self.diagnostic(
                        name_range,
                        "missing-attribute",
                        format!("Missing required attribute '{}' for <{}>", attr.name, tag),
                    ));
                }
            }
            for slot in component.required_slots() {
                if !usage.provides_slot(&slot.name) {
                    diagnostics.push(self.diagnostic(
                        name_range,
                        "missing-slot",
                        format!("Missing required slot '{}' for <{}>", slot.name, tag),
                    ));
                }
            }
        }
        diagnostics
    }

    /// `:for` には `:key` か `id` が必要（ストリームでは `id={dom_id}`）
    fn check_loop_keys(&self, text: &str, tags: &[OpenTag]) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();
        for tag in tags.iter().filter(|t| !t.name.starts_with(':')) {
            let Some(for_attr) = tag.attributes.iter().find(|a| a.name == ":for") else {
                continue;
            };
            if tag.attributes.iter().any(|a| a.name == ":key") {
                continue;
            }
            let id = tag.attributes.iter().find(|a| a.name == "id");
            let generator = for_attr.value.as_deref().unwrap_or("");
            let generator = generator
                .strip_prefix('{')
                .and_then(|g| g.strip_suffix('}'))
                .unwrap_or(generator)
                .trim();

            let message = match STREAM_FOR_RE.captures(generator) {
                Some(caps) => {
                    let dom_id = &caps[1];
                    let keyed = id
                        .and_then(|a| a.expression())
                        .is_some_and(|expr| expr == dom_id);
                    (!keyed).then(|| {
                        format!("Stream items rendered with :for need id={{{}}}", dom_id)
                    })
                }
                None => id.is_none().then(|| "Missing :key or id for :for comprehension".to_string()),
            };
            if let Some(message) = message {
                diagnostics.push(self.diagnostic(
                    offsets_to_range(text, for_attr.name_start, for_attr.name_end),
                    "missing-loop-key",
                    message,
                ));
            }
        }
        diagnostics
    }

    /// `~p"..."` がルーターのどのルートにも一致しない
    fn check_verified_routes(&self, text: &str) -> Vec<Diagnostic> {
        if self.index.routes.registry().entity_count() == 0 {
            return Vec::new();
        }
        let resolver = Resolver::new(&self.index);
        VERIFIED_ROUTE_RE
            .captures_iter(text)
            .filter_map(|caps| {
                let path = caps.get(1)?;
                if resolver.verify_route(path.as_str()).is_some() {
                    return None;
                }
                Some(self.diagnostic(
                    offsets_to_range(text, path.start(), path.end()),
                    "unknown-route",
                    format!("No route matches {}", path.as_str()),
                ))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::ParserGateway;

    const CORE: &str = r#"defmodule MyAppWeb.CoreComponents do
  use Phoenix.Component

  attr :id, :string, required: true
  attr :show, :boolean, default: false
  attr :rest, :global
  slot :inner_block, required: true
  slot :title

  def modal(assigns) do
    ~H"""
    <div id={@id} {@rest}>{render_slot(@inner_block)}</div>
    """
  end
end
"#;

    const ROUTER: &str = r#"defmodule MyAppWeb.Router do
  scope "/", MyAppWeb do
    get "/users/:id", UserController, :show
  end
end
"#;

    async fn handler() -> DiagnosticsHandler {
        let gateway = ParserGateway::fallback_only();
        let index = Arc::new(Index::new());
        index
            .update_file(
                &gateway,
                Path::new("/app/lib/my_app_web/components/core_components.ex"),
                CORE,
            )
            .await;
        index
            .update_file(&gateway, Path::new("/app/lib/my_app_web/router.ex"), ROUTER)
            .await;
        DiagnosticsHandler::new(index, Arc::new(UsageExtractor::default()), DiagnosticsConfig::default())
    }

    fn live_view(template: &str) -> String {
        format!(
            "defmodule MyAppWeb.PageLive do\n  use MyAppWeb, :live_view\n\n  def render(assigns) do\n    ~H\"\"\"\n{}\n    \"\"\"\n  end\nend\n",
            template
        )
    }

    fn codes(diagnostics: &[Diagnostic]) -> Vec<String> {
        diagnostics
            .iter()
            .filter_map(|d| match &d.code {
                Some(NumberOrString::String(code)) => Some(code.clone()),
                _ => None,
            })
            .collect()
    }

    const PAGE: &str = "/app/lib/my_app_web/live/page_live.ex";

    #[tokio::test]
    async fn test_clean_usage() {
        let handler = handler().await;
        let source = live_view(r#"<.modal id="m" class="wide" phx-click="x" data-role="d">Hi</.modal>"#);
        let diagnostics = handler.diagnose(Path::new(PAGE), "k", &source);
        assert!(diagnostics.is_empty(), "{:?}", diagnostics);
    }

    #[tokio::test]
    async fn test_unknown_component_and_attribute() {
        let handler = handler().await;
        let source = live_view(r#"<.modal id="m" bogus="1">Hi</.modal><.missing />"#);
        let diagnostics = handler.diagnose(Path::new(PAGE), "k", &source);
        assert_eq!(codes(&diagnostics), vec!["unknown-attribute", "unknown-component"]);
    }

    #[tokio::test]
    async fn test_missing_required() {
        let handler = handler().await;
        let source = live_view(r#"<.modal />"#);
        let diagnostics = handler.diagnose(Path::new(PAGE), "k", &source);
        assert_eq!(codes(&diagnostics), vec!["missing-attribute", "missing-slot"]);
    }

    #[tokio::test]
    async fn test_stream_loop_key() {
        let handler = handler().await;
        let keyed = live_view(
            r#"<div id="users" phx-update="stream"><div :for={{dom_id, user} <- @streams.users} id={dom_id}>{user.name}</div></div>"#,
        );
        assert!(handler.diagnose(Path::new(PAGE), "k", &keyed).is_empty());

        let unkeyed = live_view(
            r#"<div id="users" phx-update="stream"><div :for={{dom_id, user} <- @streams.users}>{user.name}</div></div>"#,
        );
        assert_eq!(codes(&handler.diagnose(Path::new(PAGE), "k", &unkeyed)), vec!["missing-loop-key"]);

        let plain = live_view(r#"<li :for={item <- @items}>{item}</li>"#);
        assert_eq!(codes(&handler.diagnose(Path::new(PAGE), "k", &plain)), vec!["missing-loop-key"]);
    }

    #[tokio::test]
    async fn test_verified_routes() {
        let handler = handler().await;
        let source = live_view(r#"<a href={~p"/users/#{@user.id}"}>me</a><a href={~p"/nope"}>x</a>"#);
        let diagnostics = handler.diagnose(Path::new(PAGE), "k", &source);
        assert_eq!(codes(&diagnostics), vec!["unknown-route"]);
        assert!(diagnostics[0].message.contains("/nope"));
    }
}

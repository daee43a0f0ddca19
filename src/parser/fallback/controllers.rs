//! コントローラーのアクションと `render` 呼び出しの抽出

use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;

use super::{
    BlockTracker, is_module_name, keyword, keyword_args, logical_lines, matching_close,
    parse_atom, parse_keyword, parse_string, split_args,
};
use crate::model::{ControllerAction, ControllerInfo, RenderAssign, RenderInfo};

static ACTION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*def\s+([a-z_][A-Za-z0-9_]*[?!]?)\(").unwrap());
static RENDER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\brender\(").unwrap());
static ASSIGN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bassign\(").unwrap());
static PUT_VIEW_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bput_view\(").unwrap());
static BINDING_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([a-z_][A-Za-z0-9_]*)\s*=\s*([^=].*)$").unwrap());

/// 解析中のアクション
#[derive(Debug)]
struct ActionState {
    name: String,
    depth: usize,
    assigns: Vec<RenderAssign>,
    /// `users = Accounts.list_users()` のようなローカル束縛
    bindings: Vec<(String, String)>,
    view: Option<String>,
}

impl ActionState {
    /// 変数なら束縛された右辺に置き換える
    fn expand(&self, value: &str) -> String {
        let value = value.trim();
        self.bindings
            .iter()
            .rev()
            .find(|(name, _)| name == value)
            .map(|(_, expr)| expr.clone())
            .unwrap_or_else(|| value.to_string())
    }

    fn assign(&self, name: String, value: Option<&str>) -> RenderAssign {
        RenderAssign::new(name, value.map(|v| self.expand(v)))
    }
}

pub fn scan(path: &Path, content: &str) -> Vec<ControllerInfo> {
    let mut tracker = BlockTracker::new();
    let mut controllers: Vec<ControllerInfo> = Vec::new();
    let mut action: Option<ActionState> = None;

    for line in logical_lines(content) {
        let text = line.text.trim();
        let depth_before = tracker.depth();

        let module = tracker.current_module().map(str::to_string);
        let controller = module
            .as_deref()
            .and_then(|module| controllers.iter_mut().rev().find(|c| c.module_name == module));

        if let Some(controller) = controller {
            if let Some(name) = action_head(text) {
                if !controller.actions.iter().any(|a| a.name == name) {
                    controller.actions.push(ControllerAction {
                        name: name.clone(),
                        line: line.line,
                    });
                }
                action = Some(ActionState {
                    name,
                    depth: depth_before,
                    assigns: Vec::new(),
                    bindings: Vec::new(),
                    view: None,
                });
            }

            if let Some(state) = action.as_mut() {
                if let Some(caps) = BINDING_RE.captures(text) {
                    let expr = state.expand(&caps[2]);
                    state.bindings.push((caps[1].to_string(), expr));
                }
                for (name, value) in assign_calls(text) {
                    if !state.assigns.iter().any(|a| a.name == name) {
                        let assign = state.assign(name, value.as_deref());
                        state.assigns.push(assign);
                    }
                }
                if let Some(view) = put_view(text) {
                    state.view = Some(view);
                }
                for (template, keys) in render_calls(text) {
                    let mut assigns: Vec<RenderAssign> = keys
                        .into_iter()
                        .map(|(name, value)| state.assign(name, Some(&value)))
                        .collect();
                    for assign in &state.assigns {
                        if !assigns.iter().any(|a| a.name == assign.name) {
                            assigns.push(assign.clone());
                        }
                    }
                    controller.renders.push(RenderInfo {
                        action: Some(state.name.clone()),
                        template,
                        assigns,
                        line: line.line,
                        view_module: state.view.clone(),
                    });
                }
            }
        }

        if let Some(module) = tracker.advance(&line.text) {
            controllers.push(ControllerInfo {
                module_name: module,
                file_path: path.to_path_buf(),
                line: line.line,
                actions: Vec::new(),
                renders: Vec::new(),
            });
        }

        if action
            .as_ref()
            .is_some_and(|state| tracker.depth() <= state.depth)
        {
            action = None;
        }
    }

    controllers.retain(|c| !c.actions.is_empty() || !c.renders.is_empty());
    controllers
}

/// `def index(conn, params)` のアクション名
fn action_head(text: &str) -> Option<String> {
    let caps = ACTION_RE.captures(text)?;
    let after_paren = &text[caps.get(0)?.end()..];
    let args = split_args(&after_paren[..matching_close(after_paren)?]);
    args.first()
        .is_some_and(|first| first.contains("conn"))
        .then(|| caps[1].to_string())
}

/// 呼び出しの引数リスト（`name(` の直後から）
fn calls<'a>(re: &Regex, text: &'a str) -> Vec<Vec<String>> {
    re.find_iter(text)
        .filter_map(|m| {
            let rest: &'a str = &text[m.end()..];
            matching_close(rest).map(|close| split_args(&rest[..close]))
        })
        .collect()
}

/// パイプの右辺（第1引数が省略された形）か
fn is_piped(args: &[String]) -> bool {
    args.first()
        .is_some_and(|first| !first.contains("conn") || parse_atom(first).is_some())
}

/// テンプレート名とキーワード assigns（名前と値の式）
fn render_calls(text: &str) -> Vec<(String, Vec<(String, String)>)> {
    calls(&RENDER_RE, text)
        .into_iter()
        .filter_map(|args| {
            let rest = if is_piped(&args) { &args[..] } else { args.get(1..)? };
            let template_arg = rest.first()?;
            let template = parse_atom(template_arg).or_else(|| parse_string(template_arg))?;
            let template = template.split('.').next().unwrap_or(&template).to_string();
            Some((template, keyword_args(&rest[1..])))
        })
        .collect()
}

/// `assign(conn, :key, value)` / `assign(conn, key: value)`
fn assign_calls(text: &str) -> Vec<(String, Option<String>)> {
    let mut assigns = Vec::new();
    for args in calls(&ASSIGN_RE, text) {
        let rest = if is_piped(&args) { &args[..] } else { args.get(1..).unwrap_or_default() };
        match rest.first().and_then(|a| parse_atom(a)) {
            Some(name) => assigns.push((name, rest.get(1).map(|v| v.trim().to_string()))),
            None => assigns.extend(
                keyword_args(rest)
                    .into_iter()
                    .map(|(key, value)| (key, Some(value))),
            ),
        }
    }
    assigns
}

/// `put_view(conn, MyAppWeb.X)` / `put_view(conn, html: MyAppWeb.X)`
fn put_view(text: &str) -> Option<String> {
    calls(&PUT_VIEW_RE, text).into_iter().find_map(|args| {
        let rest = if is_piped(&args) { &args[..] } else { args.get(1..)? };
        let first = rest.first()?;
        if is_module_name(first) {
            return Some(first.trim().to_string());
        }
        if parse_keyword(first).is_some() {
            let keywords = keyword_args(rest);
            return keyword(&keywords, "html")
                .filter(|m| is_module_name(m))
                .map(str::to_string);
        }
        None
    })
}

//! ルーター定義の抽出
//!
//! `scope` / `resources` / `pipeline` / `live_session` のブロックをスタックで追跡し、
//! パス・エイリアス・ヘルパー名・パイプラインを積み上げてルートを展開する。

use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;

use super::{
    BlockTracker, call_args, is_module_name, keyword, keyword_args, logical_lines,
    opens_do_block, parse_atom, parse_name_list, parse_string, positional_args, split_args,
};
use crate::model::{ResourceOptions, Route};
use crate::util::{last_module_segment, singularize, snake_case};

const VERBS: &[&str] = &[
    "get", "post", "put", "patch", "delete", "options", "head", "connect", "trace",
];

static MACRO_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*([a-z_]+)\b").unwrap());

#[derive(Debug)]
enum Frame {
    Scope {
        path: String,
        alias: Option<String>,
        helper: Option<String>,
        pipelines: Vec<String>,
    },
    /// ネスト用のパス（親パラメータ込み）とヘルパー名
    Resource { path: String, helper: String },
    LiveSession,
    Pipeline,
}

#[derive(Debug)]
struct OpenFrame {
    frame: Frame,
    depth: usize,
}

struct RouterScanner<'a> {
    file_path: &'a Path,
    frames: Vec<OpenFrame>,
    /// スコープ外の `pipe_through`
    root_pipelines: Vec<String>,
    routes: Vec<Route>,
}

pub fn scan(path: &Path, content: &str) -> Vec<Route> {
    let mut scanner = RouterScanner {
        file_path: path,
        frames: Vec::new(),
        root_pipelines: Vec::new(),
        routes: Vec::new(),
    };
    let mut tracker = BlockTracker::new();

    for line in logical_lines(content) {
        let depth_before = tracker.depth();
        if let Some(frame) = scanner.process_line(line.text.trim(), line.line) {
            scanner.frames.push(OpenFrame {
                frame,
                depth: depth_before,
            });
        }

        tracker.advance(&line.text);
        while let Some(open) = scanner.frames.last() {
            if tracker.depth() > open.depth {
                break;
            }
            scanner.frames.pop();
        }
    }

    scanner.routes
}

impl RouterScanner<'_> {
    /// 1行を処理し、ブロックを開く場合はそのフレームを返す
    fn process_line(&mut self, text: &str, line: u32) -> Option<Frame> {
        let name = MACRO_RE.captures(text)?.get(1)?.as_str();
        let opens_block = opens_do_block(text);

        if self.in_pipeline() {
            return None;
        }

        let args = call_args(text, name)?;
        match name {
            "scope" if opens_block => Some(parse_scope(args)),
            "pipeline" if opens_block => Some(Frame::Pipeline),
            "live_session" if opens_block => Some(Frame::LiveSession),
            "pipe_through" => {
                let names = parse_name_list(args);
                match self.innermost_scope_pipelines() {
                    Some(pipelines) => pipelines.extend(names),
                    None => self.root_pipelines.extend(names),
                }
                None
            }
            "resources" => {
                let frame = self.expand_resources(args, line);
                if opens_block { frame } else { None }
            }
            "live" => {
                self.add_live(args, line);
                None
            }
            "forward" => {
                self.add_forward(args, line);
                None
            }
            "match" => {
                self.add_match(args, line);
                None
            }
            verb if VERBS.contains(&verb) => {
                let args = split_args(args);
                self.add_verb_route(&verb.to_ascii_uppercase(), &args, line);
                None
            }
            _ => None,
        }
    }

    fn in_pipeline(&self) -> bool {
        self.frames
            .iter()
            .any(|open| matches!(open.frame, Frame::Pipeline))
    }

    fn innermost_scope_pipelines(&mut self) -> Option<&mut Vec<String>> {
        self.frames.iter_mut().rev().find_map(|open| match &mut open.frame {
            Frame::Scope { pipelines, .. } => Some(pipelines),
            _ => None,
        })
    }

    /// スコープとネスト元リソースを連結したパス
    fn path_prefix(&self) -> String {
        self.frames
            .iter()
            .fold(String::new(), |prefix, open| match &open.frame {
                Frame::Scope { path, .. } | Frame::Resource { path, .. } => {
                    join_paths(&prefix, path)
                }
                _ => prefix,
            })
    }

    fn scope_path(&self) -> Option<String> {
        let mut found = false;
        let path = self
            .frames
            .iter()
            .fold(String::new(), |prefix, open| match &open.frame {
                Frame::Scope { path, .. } => {
                    found = true;
                    join_paths(&prefix, path)
                }
                _ => prefix,
            });
        found.then_some(path)
    }

    fn helper_prefix(&self) -> Vec<String> {
        self.frames
            .iter()
            .filter_map(|open| match &open.frame {
                Frame::Scope { helper, .. } => helper.clone(),
                Frame::Resource { helper, .. } => Some(helper.clone()),
                _ => None,
            })
            .collect()
    }

    fn pipelines(&self) -> Vec<String> {
        let mut pipelines = self.root_pipelines.clone();
        for open in &self.frames {
            if let Frame::Scope { pipelines: own, .. } = &open.frame {
                pipelines.extend(own.iter().cloned());
            }
        }
        pipelines
    }

    /// スコープのエイリアスを付けたモジュール名
    fn qualify(&self, module: &str) -> String {
        let mut segments: Vec<&str> = self
            .frames
            .iter()
            .filter_map(|open| match &open.frame {
                Frame::Scope { alias, .. } => alias.as_deref(),
                _ => None,
            })
            .collect();
        segments.push(module);
        segments.join(".")
    }

    fn full_helper(&self, own: &str) -> String {
        let mut parts = self.helper_prefix();
        if !own.is_empty() {
            parts.push(own.to_string());
        }
        parts.retain(|p| !p.is_empty());
        parts.join("_")
    }

    fn route(&self, verb: &str, own_path: &str, helper_base: String, line: u32) -> Route {
        let path = join_paths(&self.path_prefix(), own_path);
        Route {
            params: path_params(&path),
            path,
            verb: verb.to_string(),
            file_path: self.file_path.to_path_buf(),
            line,
            controller: None,
            action: None,
            helper_base,
            is_resource: false,
            live_module: None,
            live_action: None,
            forward_to: None,
            resource_options: None,
            pipelines: self.pipelines(),
            scope_path: self.scope_path(),
        }
    }

    fn add_verb_route(&mut self, verb: &str, args: &[String], line: u32) {
        let positional = positional_args(args);
        let keywords = keyword_args(args);
        let Some(own_path) = positional.first().and_then(|p| parse_string(p)) else {
            return;
        };

        let controller = positional
            .iter()
            .skip(1)
            .find(|arg| is_module_name(arg))
            .map(|module| module.trim().to_string());
        let action = positional.iter().skip(1).find_map(|arg| parse_atom(arg));

        let own_helper = explicit_helper(&keywords)
            .or_else(|| static_helper(&own_path))
            .or_else(|| controller.as_deref().map(|c| module_helper(c, "Controller")))
            .unwrap_or_default();

        let mut route = self.route(verb, &own_path, self.full_helper(&own_helper), line);
        route.controller = controller.map(|c| self.qualify(&c));
        route.action = action;
        self.routes.push(route);
    }

    fn add_match(&mut self, args: &str, line: u32) {
        let args = split_args(args);
        let Some((verbs_arg, rest)) = args.split_first() else {
            return;
        };
        let verbs: Vec<String> = parse_name_list(verbs_arg)
            .into_iter()
            .map(|verb| {
                if verb == "*" {
                    verb
                } else {
                    verb.to_ascii_uppercase()
                }
            })
            .collect();
        for verb in verbs {
            self.add_verb_route(&verb, rest, line);
        }
    }

    fn add_live(&mut self, args: &str, line: u32) {
        let args = split_args(args);
        let positional = positional_args(&args);
        let keywords = keyword_args(&args);
        let Some(own_path) = positional.first().and_then(|p| parse_string(p)) else {
            return;
        };
        let module = positional
            .get(1)
            .filter(|arg| is_module_name(arg))
            .map(|m| m.trim().to_string());
        let live_action = positional.get(2).and_then(|arg| parse_atom(arg));

        let own_helper = explicit_helper(&keywords)
            .or_else(|| static_helper(&own_path))
            .or_else(|| module.as_deref().map(|m| module_helper(m, "Live")))
            .unwrap_or_default();

        let mut route = self.route("GET", &own_path, self.full_helper(&own_helper), line);
        route.live_module = module.map(|m| self.qualify(&m));
        route.live_action = live_action;
        self.routes.push(route);
    }

    fn add_forward(&mut self, args: &str, line: u32) {
        let args = split_args(args);
        let positional = positional_args(&args);
        let Some(own_path) = positional.first().and_then(|p| parse_string(p)) else {
            return;
        };
        let target = positional
            .get(1)
            .filter(|arg| is_module_name(arg))
            .map(|m| m.trim().to_string());

        let own_helper = static_helper(&own_path).unwrap_or_default();
        let mut route = self.route("*", &own_path, self.full_helper(&own_helper), line);
        route.forward_to = target.map(|t| self.qualify(&t));
        self.routes.push(route);
    }

    /// `resources` を RESTful ルートに展開し、ネスト用のフレームを返す
    fn expand_resources(&mut self, args: &str, line: u32) -> Option<Frame> {
        let args = split_args(args);
        let positional = positional_args(&args);
        let keywords = keyword_args(&args);
        let resource_path = positional.first().and_then(|p| parse_string(p))?;
        let controller = positional
            .get(1)
            .filter(|arg| is_module_name(arg))
            .map(|c| self.qualify(c.trim()));

        let options = ResourceOptions {
            only: keyword(&keywords, "only").map(parse_name_list),
            except: keyword(&keywords, "except").map(parse_name_list),
            singleton: keyword(&keywords, "singleton") == Some("true"),
            param: keyword(&keywords, "param").and_then(parse_string),
            as_name: explicit_helper(&keywords),
        };

        let segment = last_static_segment(&resource_path).unwrap_or_default();
        let own_helper = options
            .as_name
            .clone()
            .unwrap_or_else(|| singularize(&segment.replace('-', "_")));
        let helper_base = self.full_helper(&own_helper);
        let param = options.param.clone().unwrap_or_else(|| "id".to_string());

        for (action, verb, suffix) in resource_actions(options.singleton, &param) {
            if !action_allowed(&options, action) {
                continue;
            }
            let own_path = format!("{}{}", resource_path.trim_end_matches('/'), suffix);
            let mut route = self.route(verb, &own_path, helper_base.clone(), line);
            route.controller = controller.clone();
            route.action = Some(action.to_string());
            route.is_resource = true;
            route.resource_options = Some(options.clone());
            self.routes.push(route);
        }

        let nested_path = if options.singleton {
            resource_path.clone()
        } else {
            format!(
                "{}/:{}_{}",
                resource_path.trim_end_matches('/'),
                singularize(&segment.replace('-', "_")),
                param
            )
        };
        Some(Frame::Resource {
            path: nested_path,
            helper: own_helper,
        })
    }
}

/// アクション名・HTTPメソッド・リソースパスからの接尾辞（展開順）
fn resource_actions(singleton: bool, param: &str) -> Vec<(&'static str, &'static str, String)> {
    let member = if singleton {
        String::new()
    } else {
        format!("/:{}", param)
    };
    let mut actions = Vec::new();
    if !singleton {
        actions.push(("index", "GET", String::new()));
    }
    actions.push(("edit", "GET", format!("{}/edit", member)));
    actions.push(("new", "GET", "/new".to_string()));
    actions.push(("show", "GET", member.clone()));
    actions.push(("create", "POST", String::new()));
    actions.push(("update", "PATCH", member.clone()));
    actions.push(("update", "PUT", member.clone()));
    actions.push(("delete", "DELETE", member));
    actions
}

fn action_allowed(options: &ResourceOptions, action: &str) -> bool {
    if let Some(only) = &options.only {
        return only.iter().any(|a| a == action);
    }
    if let Some(except) = &options.except {
        return !except.iter().any(|a| a == action);
    }
    true
}

fn parse_scope(args: &str) -> Frame {
    let args = split_args(args);
    let positional = positional_args(&args);
    let keywords = keyword_args(&args);

    let path = positional
        .iter()
        .find_map(|arg| parse_string(arg))
        .or_else(|| keyword(&keywords, "path").and_then(parse_string))
        .unwrap_or_default();
    let alias = positional
        .iter()
        .find(|arg| is_module_name(arg))
        .map(|m| m.trim().to_string())
        .or_else(|| {
            keyword(&keywords, "alias")
                .filter(|m| is_module_name(m))
                .map(str::to_string)
        });

    Frame::Scope {
        path,
        alias,
        helper: explicit_helper(&keywords),
        pipelines: Vec::new(),
    }
}

fn explicit_helper(keywords: &[(String, String)]) -> Option<String> {
    keyword(keywords, "as").and_then(|v| parse_atom(v).or_else(|| parse_string(v)))
}

/// パス中の固定セグメントからヘルパー名を作る（先頭は単数形）
fn static_helper(path: &str) -> Option<String> {
    let segments: Vec<String> = static_segments(path)
        .enumerate()
        .map(|(i, segment)| {
            let segment = segment.replace(['-', '.'], "_");
            if i == 0 { singularize(&segment) } else { segment }
        })
        .collect();
    (!segments.is_empty()).then(|| segments.join("_"))
}

/// `MyAppWeb.PageController` -> `page`
fn module_helper(module: &str, suffix: &str) -> String {
    let last = last_module_segment(module);
    snake_case(last.strip_suffix(suffix).unwrap_or(last))
}

fn static_segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/')
        .filter(|s| !s.is_empty() && !s.starts_with(':') && !s.starts_with('*'))
}

fn last_static_segment(path: &str) -> Option<String> {
    static_segments(path).last().map(str::to_string)
}

fn join_paths(prefix: &str, path: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    match (prefix.is_empty(), path.is_empty()) {
        (true, true) => "/".to_string(),
        (false, true) => prefix.to_string(),
        _ => format!("{}/{}", prefix, path),
    }
}

/// `:id` / `*path` セグメントを左から順に
fn path_params(path: &str) -> Vec<String> {
    path.split('/')
        .filter_map(|s| s.strip_prefix(':').or_else(|| s.strip_prefix('*')))
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

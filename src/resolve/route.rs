//! パスからルートを引く
//!
//! 完全一致 → `:param` をワイルドカードにしたパターン一致 → 入力途中のパスを想定した前方一致。

use crate::markup::scanner::expression_end;
use crate::model::Route;

/// 比較用にパスを整える（`#{...}` 補間を1セグメントとして扱い、クエリとフラグメントを除去）
pub fn normalize_route_path(path: &str) -> String {
    let mut replaced = String::with_capacity(path.len());
    let mut rest = path;
    while let Some(start) = rest.find("#{") {
        replaced.push_str(&rest[..start]);
        replaced.push_str(":_");
        rest = match expression_end(rest, start + 1) {
            Some(end) => &rest[end..],
            None => "",
        };
    }
    replaced.push_str(rest);

    let path = replaced.split(['?', '#']).next().unwrap_or("");
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// ルートのパターンにパスが一致するか
pub fn path_matches(pattern: &str, path: &str) -> bool {
    let pattern = segments(pattern);
    let path = segments(path);

    for (i, expected) in pattern.iter().enumerate() {
        if expected.starts_with('*') {
            return true;
        }
        let Some(actual) = path.get(i) else {
            return false;
        };
        if expected.starts_with(':') || actual.starts_with(':') {
            continue;
        }
        if expected != actual {
            return false;
        }
    }
    pattern.len() == path.len()
}

/// 入力途中のパスがルートの先頭部分に一致するか（最後のセグメントは前方一致）
pub fn path_prefix_matches(pattern: &str, partial: &str) -> bool {
    let pattern = segments(pattern);
    let partial_segments = segments(partial);
    if partial_segments.is_empty() || partial_segments.len() > pattern.len() {
        return false;
    }
    let last = partial_segments.len().saturating_sub(1);
    for (i, actual) in partial_segments.iter().enumerate() {
        let expected = pattern[i];
        if expected.starts_with(':') || expected.starts_with('*') || actual.starts_with(':') {
            continue;
        }
        let matched = if i == last && !partial.ends_with('/') {
            expected.starts_with(actual)
        } else {
            expected == *actual
        };
        if !matched {
            return false;
        }
    }
    true
}

/// 完全一致かパターン一致のみ（検証済みルートの診断用）
pub fn match_route_strict<'a>(routes: &'a [Route], path: &str) -> Option<&'a Route> {
    let path = normalize_route_path(path);
    routes
        .iter()
        .find(|r| normalize_route_path(&r.path) == path)
        .or_else(|| routes.iter().find(|r| path_matches(&r.path, &path)))
}

/// パスに対応するルートを探す
pub fn match_route<'a>(routes: &'a [Route], path: &str) -> Option<&'a Route> {
    if let Some(route) = match_route_strict(routes, path) {
        return Some(route);
    }
    let path = normalize_route_path(path);
    routes
        .iter()
        .filter(|r| path_prefix_matches(&r.path, &path))
        .min_by_key(|r| segments(&r.path).len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn route(path: &str, verb: &str) -> Route {
        Route {
            path: path.to_string(),
            verb: verb.to_string(),
            file_path: PathBuf::from("/app/lib/my_app_web/router.ex"),
            line: 1,
            controller: None,
            action: None,
            helper_base: String::new(),
            params: Vec::new(),
            is_resource: false,
            live_module: None,
            live_action: None,
            forward_to: None,
            resource_options: None,
            pipelines: Vec::new(),
            scope_path: None,
        }
    }

    #[test]
    fn test_exact_before_pattern() {
        let routes = vec![route("/users/:id", "GET"), route("/users/new", "GET")];
        assert_eq!(match_route(&routes, "/users/new").unwrap().path, "/users/new");
        assert_eq!(match_route(&routes, "/users/42").unwrap().path, "/users/:id");
    }

    #[test]
    fn test_interpolation_matches_param() {
        let routes = vec![route("/users/:id/edit", "GET")];
        let found = match_route(&routes, "/users/#{user.id}/edit?tab=1");
        assert_eq!(found.unwrap().path, "/users/:id/edit");
    }

    #[test]
    fn test_partial_path_while_typing() {
        let routes = vec![route("/users", "GET"), route("/dashboard", "GET")];
        assert_eq!(match_route(&routes, "/use").unwrap().path, "/users");
        assert!(match_route(&routes, "/nothing").is_none());
        assert!(match_route_strict(&routes, "/use").is_none());
    }

    #[test]
    fn test_wildcard_route() {
        let routes = vec![route("/files/*path", "GET")];
        assert!(match_route(&routes, "/files/a/b/c.txt").is_some());
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize_route_path("/users/"), "/users");
        assert_eq!(normalize_route_path(""), "/");
        assert_eq!(normalize_route_path("/"), "/");
        assert_eq!(normalize_route_path("/users/#{@user.id}/edit?tab=1"), "/users/:_/edit");
    }

    #[test]
    fn test_normalize_nested_interpolation() {
        assert_eq!(normalize_route_path("/x/#{%{a: 1}}"), "/x/:_");
        assert_eq!(normalize_route_path("/x/#{elem({1, \"}\"}, 0)}/y"), "/x/:_/y");
        assert_eq!(normalize_route_path("/x/#{open"), "/x/:_");
        let routes = vec![route("/posts/:id/comments", "GET")];
        assert!(match_route(&routes, "/posts/#{Map.get(%{id: 1}, :id)}/comments").is_some());
    }
}

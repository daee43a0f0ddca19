use std::path::Path;

use super::registry::{RegistryKind, Store};
use crate::model::Route;
use crate::parser::Routes;
use crate::parser::kind::RoutesMetadata;
use crate::resolve::route::match_route;

/// ルーター定義から得たルートのストア
pub type RouteStore = Store<RouteKind>;

pub struct RouteKind;

impl RegistryKind for RouteKind {
    type Parse = Routes;
    type Entity = Route;

    const LABEL: &'static str = "routes";

    fn is_candidate(path: &Path) -> bool {
        path.file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with("router.ex"))
    }

    fn into_entities(path: &Path, metadata: RoutesMetadata) -> Vec<Route> {
        metadata
            .routes
            .into_iter()
            .map(|mut route| {
                route.file_path = path.to_path_buf();
                route
            })
            .collect()
    }
}

impl Store<RouteKind> {
    /// ファイル順・定義順のルート一覧
    pub fn get_all_routes(&self) -> Vec<Route> {
        let mut files = self.registry().files();
        files.sort();
        files
            .iter()
            .flat_map(|file| self.registry().from_file(file))
            .collect()
    }

    pub fn get_routes_from_file(&self, path: &Path) -> Vec<Route> {
        self.registry().from_file(path)
    }

    /// パスに一致するルート（完全一致、パターン一致、前方一致の順）
    pub fn find_route_by_path(&self, path: &str) -> Option<Route> {
        match_route(&self.get_all_routes(), path).cloned()
    }

    pub fn find_routes_by_helper(&self, helper_base: &str) -> Vec<Route> {
        self.get_all_routes()
            .into_iter()
            .filter(|r| r.helper_base == helper_base)
            .collect()
    }

    /// リソースルートとして有効なアクション（展開順、重複なし）
    pub fn get_valid_resource_actions(&self, helper_base: &str) -> Vec<String> {
        let mut actions: Vec<String> = Vec::new();
        for route in self.find_routes_by_helper(helper_base) {
            if !route.is_resource {
                continue;
            }
            if let Some(action) = route.action {
                if !actions.contains(&action) {
                    actions.push(action);
                }
            }
        }
        actions
    }

    /// パス補完用（メソッドとパスの組で重複を除く）
    pub fn routes_with_prefix(&self, prefix: &str) -> Vec<Route> {
        let mut seen = std::collections::HashSet::new();
        self.get_all_routes()
            .into_iter()
            .filter(|r| r.path.starts_with(prefix))
            .filter(|r| seen.insert((r.verb.clone(), r.path.clone())))
            .collect()
    }
}

//! レジストリを横断する解決処理
//!
//! 状態を持たず、`Index` への参照だけで動く。

pub mod assoc;
pub mod builtins;
pub mod component;
pub mod route;

use std::path::Path;

pub use assoc::{AssignContext, AssociationInfo};
pub use component::{ComponentQuery, ModuleHeader};

use crate::index::Index;
use crate::model::{Component, RenderAssign, Route};

pub struct Resolver<'a> {
    index: &'a Index,
}

impl<'a> Resolver<'a> {
    pub fn new(index: &'a Index) -> Self {
        Self { index }
    }

    /// コンポーネント名から定義を探す（見つからなければNone）
    pub fn resolve_component(
        &self,
        context_file: &Path,
        name: &str,
        module_context: Option<&str>,
        content: Option<&str>,
    ) -> Option<Component> {
        let query = ComponentQuery {
            file_path: context_file,
            name,
            module_context,
            content,
        };
        component::resolve_component(self.index, &query)
    }

    /// 入力途中のパスも含めてルートを探す
    pub fn find_route_by_path(&self, path: &str) -> Option<Route> {
        self.index.routes.find_route_by_path(path)
    }

    /// 完全一致またはパターン一致のルート（`~p` の検証用）
    pub fn verify_route(&self, path: &str) -> Option<Route> {
        let routes = self.index.routes.get_all_routes();
        route::match_route_strict(&routes, path).cloned()
    }

    pub fn find_routes_by_helper(&self, helper_base: &str) -> Vec<Route> {
        self.index.routes.find_routes_by_helper(helper_base)
    }

    pub fn get_valid_resource_actions(&self, helper_base: &str) -> Vec<String> {
        self.index.routes.get_valid_resource_actions(helper_base)
    }

    pub fn get_association_info_from_path(
        &self,
        base_assign: &str,
        path: &[&str],
        context: AssignContext<'_>,
    ) -> Option<AssociationInfo> {
        assoc::association_info_from_path(self.index, base_assign, path, context)
    }

    /// コントローラーからテンプレートへ渡される assigns
    pub fn template_assigns(&self, file: &Path, component: Option<&Component>) -> Vec<RenderAssign> {
        assoc::render_assigns_for_file(self.index, file, component)
    }
}

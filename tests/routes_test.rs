//! ルーター定義の解析とパス照合の統合テスト

use std::path::Path;

use rstest::rstest;

use phoenix_lsp::index::Index;
use phoenix_lsp::parser::ParserGateway;
use phoenix_lsp::resolve::Resolver;

const ROUTER: &str = r#"defmodule MyAppWeb.Router do
  use MyAppWeb, :router

  scope "/", MyAppWeb do
    pipe_through :browser

    get "/", PageController, :home

    resources "/users", UserController do
      resources "/profile", ProfileController, singleton: true
      resources "/posts", PostController, only: [:index, :show]
    end

    live "/dashboard", DashboardLive, :index
  end

  scope "/api", MyAppWeb.Api, as: :api do
    get "/files/*path", FileController, :show
  end
end
"#;

async fn index() -> Index {
    let index = Index::new();
    let gateway = ParserGateway::fallback_only();
    index
        .update_file(&gateway, Path::new("/app/lib/my_app_web/router.ex"), ROUTER)
        .await;
    index
}

#[rstest]
#[case("/", "MyAppWeb.PageController")]
#[case("/users/new", "MyAppWeb.UserController")]
#[case("/users/#{@user.id}", "MyAppWeb.UserController")]
#[case("/users/42/profile", "MyAppWeb.ProfileController")]
#[case("/users/7/posts/9", "MyAppWeb.PostController")]
#[case("/api/files/a/b.txt", "MyAppWeb.Api.FileController")]
#[tokio::test]
async fn test_verified_paths(#[case] path: &str, #[case] controller: &str) {
    let index = index().await;
    let route = Resolver::new(&index).verify_route(path).unwrap();
    assert_eq!(route.controller.as_deref(), Some(controller));
}

#[rstest]
#[case("/nope")]
#[case("/users/1/comments")]
#[case("/users/1/posts/2/edit")]
#[tokio::test]
async fn test_unknown_paths(#[case] path: &str) {
    let index = index().await;
    assert!(Resolver::new(&index).verify_route(path).is_none());
}

#[tokio::test]
async fn test_live_route_ignores_query() {
    let index = index().await;
    let route = Resolver::new(&index).verify_route("/dashboard?tab=1").unwrap();
    assert_eq!(route.live_module.as_deref(), Some("MyAppWeb.DashboardLive"));
    assert_eq!(route.pipelines, vec!["browser"]);
}

#[tokio::test]
async fn test_partial_paths_prefer_shortest_route() {
    let index = index().await;
    let resolver = Resolver::new(&index);

    let dashboard = resolver.find_route_by_path("/dash").unwrap();
    assert_eq!(dashboard.path, "/dashboard");

    let posts = resolver.find_route_by_path("/users/1/pos").unwrap();
    assert_eq!(posts.path, "/users/:user_id/posts");
    assert_eq!(posts.action.as_deref(), Some("index"));
}

#[tokio::test]
async fn test_resource_helpers() {
    let index = index().await;
    let resolver = Resolver::new(&index);

    assert_eq!(resolver.get_valid_resource_actions("user_post"), vec!["index", "show"]);

    let profile = resolver.get_valid_resource_actions("user_profile");
    assert!(profile.contains(&"show".to_string()));
    assert!(!profile.contains(&"index".to_string()));

    let files = resolver.find_routes_by_helper("api_file");
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].params, vec!["path"]);
}

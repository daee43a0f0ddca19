//! ワークスペースのどのファイルを解析するか
//!
//! Mix プロジェクトの生成物・依存・隠しディレクトリは常に辿らない。
//! その上で `phxlsp.json` の include/exclude を適用する。

use std::path::{Component, Path};

use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::error::ConfigError;
use crate::util::{is_elixir_file, is_heex_file};

/// どの階層にあっても辿らないディレクトリ名（umbrella の `apps/*/deps` も含む）
const EXCLUDED_DIR_NAMES: &[&str] = &["_build", "deps", "node_modules", "cover"];

/// `priv/static` のように2階層で指定する除外（ダイジェスト済みアセット）
const EXCLUDED_DIR_PAIRS: &[(&str, &str)] = &[("priv", "static")];

/// .ex / .exs / .heex
pub fn is_source_file(path: &Path) -> bool {
    is_elixir_file(path) || is_heex_file(path)
}

/// 解析対象のソースファイルを選ぶフィルター
#[derive(Debug, Clone, Default)]
pub struct SourceFilter {
    include: Option<GlobSet>,
    exclude: Option<GlobSet>,
}

impl SourceFilter {
    /// include が空なら標準の除外以外すべて対象
    pub fn new(include: &[String], exclude: &[String]) -> Result<Self, ConfigError> {
        Ok(Self {
            include: build_set(include)?,
            exclude: build_set(exclude)?,
        })
    }

    /// ディレクトリに降りるか（相対パス）
    pub fn enters_dir(&self, relative_dir: &Path) -> bool {
        !is_mix_artifact_dir(relative_dir)
            && !self.exclude.as_ref().is_some_and(|set| set.is_match(relative_dir))
    }

    /// ファイルを解析するか（相対パス）
    pub fn accepts_file(&self, relative_path: &Path) -> bool {
        if !is_source_file(relative_path) {
            return false;
        }
        if relative_path.parent().is_some_and(is_mix_artifact_dir) {
            return false;
        }
        if self.exclude.as_ref().is_some_and(|set| set.is_match(relative_path)) {
            return false;
        }
        self.include
            .as_ref()
            .is_none_or(|set| set.is_match(relative_path))
    }

    /// ワークスペース内の絶対パスを判定（ルート未確定なら拡張子だけで判定）
    pub fn tracks(&self, path: &Path, root: Option<&Path>) -> bool {
        match root {
            Some(root) => path
                .strip_prefix(root)
                .is_ok_and(|relative| self.accepts_file(relative)),
            None => is_source_file(path),
        }
    }
}

fn build_set(patterns: &[String]) -> Result<Option<GlobSet>, ConfigError> {
    if patterns.is_empty() {
        return Ok(None);
    }
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|source| ConfigError::InvalidPattern {
            pattern: pattern.clone(),
            source,
        })?;
        builder.add(glob);
    }
    Ok(Some(builder.build()?))
}

/// 隠しディレクトリ、`_build`、`deps`、`priv/static` などを含むか
fn is_mix_artifact_dir(relative_dir: &Path) -> bool {
    let names: Vec<&str> = relative_dir
        .components()
        .filter_map(|c| match c {
            Component::Normal(name) => name.to_str(),
            _ => None,
        })
        .collect();

    names
        .iter()
        .any(|name| name.starts_with('.') || EXCLUDED_DIR_NAMES.contains(name))
        || names
            .windows(2)
            .any(|pair| EXCLUDED_DIR_PAIRS.contains(&(pair[0], pair[1])))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("lib/my_app_web/router.ex", true)]
    #[case("lib/my_app_web/controllers/page_html/home.html.heex", true)]
    #[case("test/support/conn_case.exs", true)]
    #[case("assets/js/app.js", false)]
    #[case("deps/phoenix/lib/phoenix.ex", false)]
    #[case("_build/dev/lib/my_app/x.ex", false)]
    #[case("apps/shop/deps/ecto/lib/ecto.ex", false)]
    #[case(".elixir_ls/build/x.ex", false)]
    #[case("priv/static/assets/app.heex", false)]
    #[case("priv/repo/seeds.exs", true)]
    fn test_default_filter(#[case] path: &str, #[case] accepted: bool) {
        assert_eq!(SourceFilter::default().accepts_file(Path::new(path)), accepted);
    }

    #[test]
    fn test_include_and_exclude() {
        let filter = SourceFilter::new(
            &["lib/**".to_string()],
            &["**/*_test_helpers.ex".to_string()],
        )
        .unwrap();
        assert!(filter.accepts_file(Path::new("lib/my_app/accounts/user.ex")));
        assert!(!filter.accepts_file(Path::new("test/my_app_web/router_test.exs")));
        assert!(!filter.accepts_file(Path::new("lib/my_app/fixture_test_helpers.ex")));
    }

    #[test]
    fn test_enters_dir() {
        let filter = SourceFilter::new(&[], &["lib/legacy".to_string()]).unwrap();
        assert!(filter.enters_dir(Path::new("lib")));
        assert!(filter.enters_dir(Path::new("priv/repo")));
        assert!(!filter.enters_dir(Path::new("lib/legacy")));
        assert!(!filter.enters_dir(Path::new("priv/static")));
        assert!(!filter.enters_dir(Path::new(".git")));
    }

    #[test]
    fn test_tracks_absolute_paths() {
        let filter = SourceFilter::default();
        let root = Path::new("/work/app");
        assert!(filter.tracks(Path::new("/work/app/lib/a.ex"), Some(root)));
        assert!(!filter.tracks(Path::new("/elsewhere/lib/a.ex"), Some(root)));
        assert!(!filter.tracks(Path::new("/work/app/deps/x/lib/a.ex"), Some(root)));
        assert!(filter.tracks(Path::new("/tmp/scratch.exs"), None));
    }

    #[test]
    fn test_invalid_pattern() {
        let err = SourceFilter::new(&["lib/[".to_string()], &[]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPattern { ref pattern, .. } if pattern == "lib/["));
    }
}

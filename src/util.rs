use std::path::{Component, Path, PathBuf};

use sha2::{Digest, Sha256};
use tower_lsp::lsp_types::{Position, Range, Url};

/// コンテンツのハッシュ（変更検知用）
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// パスを正規化（`.` と `..` を字句的に除去）
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

/// ファイルがElixirソースかどうか判定
pub fn is_elixir_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("ex") | Some("exs")
    )
}

/// ファイルがHEExテンプレートかどうか判定
pub fn is_heex_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.ends_with(".heex"))
}

pub fn path_from_uri(uri: &Url) -> Option<PathBuf> {
    uri.to_file_path().ok().map(|p| normalize_path(&p))
}

/// 英単語の単数化（ルートヘルパー名の導出用）
/// 例: "users" -> "user", "categories" -> "category", "addresses" -> "address"
pub fn singularize(word: &str) -> String {
    if let Some(stem) = word.strip_suffix("ies") {
        if !stem.is_empty() {
            return format!("{}y", stem);
        }
    }
    for suffix in ["ses", "xes", "zes"] {
        if word.ends_with(suffix) && word.len() > suffix.len() {
            return word[..word.len() - 2].to_string();
        }
    }
    if word.ends_with("ss") {
        return word.to_string();
    }
    match word.strip_suffix('s') {
        Some(stem) if !stem.is_empty() => stem.to_string(),
        _ => word.to_string(),
    }
}

/// CamelCaseをsnake_caseに変換
/// 例: "UserSettings" -> "user_settings"
pub fn snake_case(s: &str) -> String {
    let mut result = String::with_capacity(s.len() + 4);
    let chars: Vec<char> = s.chars().collect();
    for (i, c) in chars.iter().enumerate() {
        if c.is_uppercase() {
            let prev_lower = i > 0 && (chars[i - 1].is_lowercase() || chars[i - 1].is_ascii_digit());
            let next_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            if i > 0 && (prev_lower || (next_lower && chars[i - 1].is_uppercase())) {
                result.push('_');
            }
            result.extend(c.to_lowercase());
        } else {
            result.push(*c);
        }
    }
    result
}

/// snake_caseをCamelCaseに変換
pub fn camelize(s: &str) -> String {
    s.split('_')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}

/// モジュール名がセグメント境界でsuffixに一致するか
/// 例: ("MyAppWeb.CoreComponents", "CoreComponents") -> true
pub fn module_matches_suffix(module: &str, suffix: &str) -> bool {
    if module == suffix {
        return true;
    }
    module
        .strip_suffix(suffix)
        .is_some_and(|head| head.ends_with('.'))
}

/// モジュール名の最後のセグメント
pub fn last_module_segment(module: &str) -> &str {
    module.rsplit('.').next().unwrap_or(module)
}

/// バイトオフセットをLSP位置に変換
pub fn offset_to_position(text: &str, offset: usize) -> Position {
    let offset = offset.min(text.len());
    let before = &text[..floor_char_boundary(text, offset)];
    let line = before.matches('\n').count() as u32;
    let line_start = before.rfind('\n').map(|i| i + 1).unwrap_or(0);
    let character = before[line_start..].encode_utf16().count() as u32;
    Position { line, character }
}

/// LSP位置をバイトオフセットに変換
pub fn position_to_offset(text: &str, position: Position) -> usize {
    let mut offset = 0;
    for (i, line) in text.split_inclusive('\n').enumerate() {
        if i as u32 == position.line {
            let mut units = 0u32;
            for (byte_idx, c) in line.char_indices() {
                if units >= position.character || c == '\n' {
                    return offset + byte_idx;
                }
                units += c.len_utf16() as u32;
            }
            return offset + line.len();
        }
        offset += line.len();
    }
    text.len()
}

pub fn offsets_to_range(text: &str, start: usize, end: usize) -> Range {
    Range {
        start: offset_to_position(text, start),
        end: offset_to_position(text, end),
    }
}

/// 1始まりの行番号から行全体のRangeを作成
pub fn line_range(line: u32) -> Range {
    let line = line.saturating_sub(1);
    Range {
        start: Position { line, character: 0 },
        end: Position { line, character: 0 },
    }
}

pub fn floor_char_boundary(text: &str, mut offset: usize) -> usize {
    while offset > 0 && !text.is_char_boundary(offset) {
        offset -= 1;
    }
    offset
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("users", "user")]
    #[case("categories", "category")]
    #[case("addresses", "address")]
    #[case("boxes", "box")]
    #[case("quizzes", "quizz")]
    #[case("class", "class")]
    #[case("profile", "profile")]
    #[case("s", "s")]
    fn test_singularize(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(singularize(input), expected);
    }

    #[test]
    fn test_snake_case() {
        assert_eq!(snake_case("UserSettings"), "user_settings");
        assert_eq!(snake_case("Page"), "page");
        assert_eq!(snake_case("HTMLParser"), "html_parser");
    }

    #[test]
    fn test_camelize() {
        assert_eq!(camelize("user_settings"), "UserSettings");
        assert_eq!(camelize("address"), "Address");
    }

    #[test]
    fn test_module_matches_suffix() {
        assert!(module_matches_suffix("MyAppWeb.CoreComponents", "CoreComponents"));
        assert!(module_matches_suffix("MyAppWeb.CoreComponents", "MyAppWeb.CoreComponents"));
        assert!(!module_matches_suffix("MyAppWeb.CoreComponents", "Components"));
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(
            normalize_path(Path::new("/app/lib/./web/../web/page.ex")),
            PathBuf::from("/app/lib/web/page.ex")
        );
    }

    #[test]
    fn test_offset_position_round_trip() {
        let text = "<div>\n  <.button>ok</.button>\n</div>";
        let offset = text.find("<.button").unwrap();
        let position = offset_to_position(text, offset);
        assert_eq!(position, Position { line: 1, character: 2 });
        assert_eq!(position_to_offset(text, position), offset);
    }

    #[test]
    fn test_content_hash_is_stable() {
        assert_eq!(content_hash("abc"), content_hash("abc"));
        assert_ne!(content_hash("abc"), content_hash("abd"));
    }
}

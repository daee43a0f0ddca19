//! 行単位のフォールバックスキャナー
//!
//! 正確パーサーが使えないときに、よくある書き方だけを拾う保守的な解析。
//! 解釈できない行は読み飛ばし、解析全体を中断しない。

pub mod components;
pub mod controllers;
pub mod events;
pub mod routes;
pub mod schemas;
pub mod templates;

use once_cell::sync::Lazy;
use regex::Regex;

/// 継続行を連結するときの上限
const MAX_JOINED_LINES: usize = 40;

static DEFMODULE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*defmodule\s+([A-Z][\w.]*)\s+do\s*(#.*)?$").unwrap());

/// 継続行とヒアドキュメントをまとめた論理行
#[derive(Debug, Clone)]
pub struct LogicalLine {
    /// 開始行（1始まり）
    pub line: u32,
    /// 本文（ヒアドキュメントは `""` に置き換え済み）
    pub text: String,
    /// ヒアドキュメントの中身
    pub heredoc: Option<String>,
}

/// ソースを論理行に分割
pub fn logical_lines(content: &str) -> Vec<LogicalLine> {
    let lines: Vec<&str> = content.lines().collect();
    let mut result = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        let start = i;
        let (mut text, mut heredoc) = take_segment(&lines, &mut i);
        let mut joined = 0;
        while needs_continuation(&text) && i < lines.len() && joined < MAX_JOINED_LINES {
            let (next, next_heredoc) = take_segment(&lines, &mut i);
            text.push(' ');
            text.push_str(next.trim());
            if heredoc.is_none() {
                heredoc = next_heredoc;
            }
            joined += 1;
        }
        result.push(LogicalLine {
            line: start as u32 + 1,
            text,
            heredoc,
        });
    }

    result
}

/// 1物理行を読み、ヒアドキュメントが始まっていれば閉じるまで取り込む
fn take_segment(lines: &[&str], i: &mut usize) -> (String, Option<String>) {
    let line = lines[*i];
    *i += 1;

    let Some((pos, delimiter)) = find_heredoc_open(line) else {
        return (line.to_string(), None);
    };

    let mut body = Vec::new();
    let mut rest = String::new();
    while *i < lines.len() {
        let current = lines[*i];
        *i += 1;
        let trimmed = current.trim_start();
        if let Some(after) = trimmed.strip_prefix(delimiter) {
            rest = after.to_string();
            break;
        }
        body.push(current);
    }

    let text = format!("{}{}{}", &line[..pos], "\"\"", rest);
    (text, Some(dedent(&body)))
}

/// 行末でヒアドキュメントが開いているか（位置と区切り文字）
fn find_heredoc_open(line: &str) -> Option<(usize, &'static str)> {
    for delimiter in ["\"\"\"", "'''"] {
        if let Some(pos) = line.find(delimiter) {
            let after = &line[pos + 3..];
            if after.trim().is_empty() && !in_string_at(line, pos) {
                return Some((pos, delimiter));
            }
        }
    }
    None
}

fn in_string_at(line: &str, pos: usize) -> bool {
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in line.char_indices() {
        if i >= pos {
            break;
        }
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '#' if !in_string => return false,
            _ => {}
        }
    }
    in_string
}

/// 共通インデントを文字単位で除去（全角スペースなどの多バイト空白も1文字として数える）
fn dedent(lines: &[&str]) -> String {
    let indent = lines
        .iter()
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.chars().take_while(|c| c.is_whitespace()).count())
        .min()
        .unwrap_or(0);
    lines
        .iter()
        .map(|l| strip_indent(l, indent))
        .collect::<Vec<_>>()
        .join("\n")
        .trim_end()
        .to_string()
}

fn strip_indent(line: &str, indent: usize) -> &str {
    let cut = line
        .char_indices()
        .take_while(|(_, c)| c.is_whitespace())
        .nth(indent)
        .map(|(i, _)| i);
    match cut {
        Some(i) => &line[i..],
        None => line.trim_start(),
    }
}

fn needs_continuation(text: &str) -> bool {
    let stripped = strip_strings_and_comments(text);
    let trimmed = stripped.trim_end();
    if trimmed.ends_with(',') || trimmed.ends_with("|>") {
        return true;
    }
    bracket_depth(&stripped) > 0
}

fn bracket_depth(stripped: &str) -> i32 {
    let mut depth = 0;
    for c in stripped.chars() {
        match c {
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth -= 1,
            _ => {}
        }
    }
    depth
}

/// 文字列リテラルの中身とコメントを除去（クォートは残す）
pub fn strip_strings_and_comments(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for c in text.chars() {
        match quote {
            Some(q) => {
                if escaped {
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == q {
                    quote = None;
                    result.push(c);
                }
            }
            None => match c {
                '"' | '\'' => {
                    quote = Some(c);
                    result.push(c);
                }
                '#' => break,
                _ => result.push(c),
            },
        }
    }

    result
}

/// ブロックの開閉数（`do` 行末・`fn` で開き、`end` で閉じる）
pub fn block_delta(text: &str) -> (usize, usize) {
    let stripped = strip_strings_and_comments(text);
    let tokens = identifier_tokens(&stripped);

    let mut opens = 0;
    let mut closes = 0;
    for (idx, (token, prev, next)) in tokens.iter().enumerate() {
        if *prev == Some(':') || *prev == Some('.') || *next == Some(':') {
            continue;
        }
        match token.as_str() {
            "fn" => opens += 1,
            "end" => closes += 1,
            "do" if idx == tokens.len() - 1 && stripped.trim_end().ends_with("do") => opens += 1,
            _ => {}
        }
    }
    (opens, closes)
}

/// 識別子トークンと前後の文字
fn identifier_tokens(text: &str) -> Vec<(String, Option<char>, Option<char>)> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        if chars[i].is_alphanumeric() || chars[i] == '_' {
            let start = i;
            while i < chars.len()
                && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '?' || chars[i] == '!')
            {
                i += 1;
            }
            let token: String = chars[start..i].iter().collect();
            let prev = if start > 0 { Some(chars[start - 1]) } else { None };
            let next = chars.get(i).copied();
            tokens.push((token, prev, next));
        } else {
            i += 1;
        }
    }
    tokens
}

/// `defmodule` のネストを追跡する
#[derive(Debug, Default)]
pub struct BlockTracker {
    depth: usize,
    modules: Vec<(String, usize)>,
}

impl BlockTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// 現在のモジュール名（完全修飾）
    pub fn current_module(&self) -> Option<&str> {
        self.modules.last().map(|(name, _)| name.as_str())
    }

    /// 論理行を処理し、`defmodule` 行であればそのモジュール名を返す
    pub fn advance(&mut self, text: &str) -> Option<String> {
        let depth_before = self.depth;
        let mut opened_module = None;

        if let Some(caps) = DEFMODULE_RE.captures(text) {
            let name = &caps[1];
            let full = match self.current_module() {
                Some(parent) => format!("{}.{}", parent, name),
                None => name.to_string(),
            };
            self.modules.push((full.clone(), depth_before));
            opened_module = Some(full);
        }

        let (opens, closes) = block_delta(text);
        self.depth += opens;
        self.depth = self.depth.saturating_sub(closes);

        while let Some((_, depth)) = self.modules.last() {
            if self.depth > *depth {
                break;
            }
            self.modules.pop();
        }
        opened_module
    }
}

/// マクロ呼び出しの引数部分（括弧と末尾の `do` を除去）
/// 例: `attr(:name, :string)` -> `:name, :string`
pub fn call_args<'a>(text: &'a str, name: &str) -> Option<&'a str> {
    let trimmed = text.trim_start();
    let rest = trimmed.strip_prefix(name)?;
    if !(rest.starts_with(' ') || rest.starts_with('(') || rest.is_empty()) {
        return None;
    }
    let mut rest = rest.trim();
    rest = strip_trailing_do(rest);
    if let Some(inner) = rest.strip_prefix('(') {
        if let Some(close) = matching_close(inner) {
            return Some(inner[..close].trim());
        }
        return Some(inner.trim_end_matches(')').trim());
    }
    Some(rest)
}

/// 末尾の ` do` を除去
pub fn strip_trailing_do(text: &str) -> &str {
    let trimmed = text.trim_end();
    match trimmed.strip_suffix("do") {
        Some(head) if head.is_empty() || head.ends_with(' ') || head.ends_with(')') || head.ends_with(',') => {
            head.trim_end().trim_end_matches(',').trim_end()
        }
        _ => trimmed,
    }
}

/// 行が `do` ブロックを開くか
pub fn opens_do_block(text: &str) -> bool {
    let stripped = strip_strings_and_comments(text);
    let trimmed = stripped.trim_end();
    trimmed == "do" || trimmed.ends_with(" do") || trimmed.ends_with(")do") || trimmed.ends_with(",do")
}

/// 開き括弧の直後から対応する閉じ括弧の位置を探す
fn matching_close(text: &str) -> Option<usize> {
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (i, c) in text.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => quote = Some(c),
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => {
                if depth == 0 {
                    return Some(i);
                }
                depth -= 1;
            }
            _ => {}
        }
    }
    None
}

/// トップレベルのカンマで分割
pub fn split_args(text: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for c in text.chars() {
        if let Some(q) = quote {
            current.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => {
                quote = Some(c);
                current.push(c);
            }
            '(' | '[' | '{' => {
                depth += 1;
                current.push(c);
            }
            ')' | ']' | '}' => {
                depth -= 1;
                current.push(c);
            }
            ',' if depth == 0 => {
                let arg = current.trim().to_string();
                if !arg.is_empty() {
                    args.push(arg);
                }
                current.clear();
            }
            _ => current.push(c),
        }
    }

    let arg = current.trim().to_string();
    if !arg.is_empty() {
        args.push(arg);
    }
    args
}

/// キーワード引数 `key: value` を分解
pub fn parse_keyword(arg: &str) -> Option<(&str, &str)> {
    let colon = arg.find(':')?;
    let key = &arg[..colon];
    if key.is_empty() || !key.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '?') {
        return None;
    }
    let rest = &arg[colon + 1..];
    if !rest.starts_with(' ') && !rest.is_empty() {
        return None;
    }
    Some((key, rest.trim()))
}

/// 引数列からキーワード引数を抽出（`[key: v]` 形式のリストも展開）
pub fn keyword_args(args: &[String]) -> Vec<(String, String)> {
    let mut keywords = Vec::new();
    for arg in args {
        let inner = arg
            .strip_prefix('[')
            .and_then(|a| a.strip_suffix(']'))
            .filter(|inner| parse_keyword(inner.trim()).is_some());
        match inner {
            Some(inner) => {
                for part in split_args(inner) {
                    if let Some((k, v)) = parse_keyword(&part) {
                        keywords.push((k.to_string(), v.to_string()));
                    }
                }
            }
            None => {
                if let Some((k, v)) = parse_keyword(arg) {
                    keywords.push((k.to_string(), v.to_string()));
                }
            }
        }
    }
    keywords
}

/// 位置引数（キーワード引数以外）
pub fn positional_args(args: &[String]) -> Vec<&str> {
    args.iter()
        .map(String::as_str)
        .take_while(|arg| parse_keyword(arg).is_none() && !is_keyword_list(arg))
        .collect()
}

fn is_keyword_list(arg: &str) -> bool {
    arg.strip_prefix('[')
        .is_some_and(|inner| parse_keyword(inner.trim()).is_some())
}

pub fn keyword<'a>(keywords: &'a [(String, String)], key: &str) -> Option<&'a str> {
    keywords
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

/// `:name` -> "name"
pub fn parse_atom(text: &str) -> Option<String> {
    let rest = text.trim().strip_prefix(':')?;
    if let Some(quoted) = parse_string(rest) {
        return Some(quoted);
    }
    if rest.is_empty()
        || !rest
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '?' || c == '!' || c == '*')
    {
        return None;
    }
    Some(rest.to_string())
}

/// `"text"` -> "text"
pub fn parse_string(text: &str) -> Option<String> {
    let text = text.trim();
    let inner = text
        .strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .or_else(|| text.strip_prefix('\'').and_then(|t| t.strip_suffix('\'')))?;
    Some(inner.replace("\\\"", "\""))
}

/// アトム/文字列のリストを解析
/// `[:a, :b]`, `~w(a b)`, `~w[a b]a`, `["a", "b"]`, `:a`
pub fn parse_name_list(text: &str) -> Vec<String> {
    let text = text.trim();
    if let Some(rest) = text.strip_prefix("~w") {
        let rest = rest.trim_end_matches(|c: char| c.is_ascii_alphabetic());
        let inner = rest.get(1..rest.len().saturating_sub(1)).unwrap_or("");
        return inner.split_whitespace().map(str::to_string).collect();
    }
    if let Some(inner) = text.strip_prefix('[').and_then(|t| t.strip_suffix(']')) {
        return split_args(inner)
            .iter()
            .filter_map(|item| parse_atom(item).or_else(|| parse_string(item)))
            .collect();
    }
    parse_atom(text)
        .or_else(|| parse_string(text))
        .into_iter()
        .collect()
}

/// モジュール名として妥当か（`MyAppWeb.PageController`）
pub fn is_module_name(text: &str) -> bool {
    let text = text.trim();
    !text.is_empty()
        && text.split('.').all(|segment| {
            segment.chars().next().is_some_and(|c| c.is_ascii_uppercase())
                && segment.chars().all(|c| c.is_alphanumeric() || c == '_')
        })
}

/// 直前の `@doc` を保持する
#[derive(Debug, Default)]
pub struct PendingDoc {
    doc: Option<String>,
}

impl PendingDoc {
    /// `@doc` 行なら取り込んでtrueを返す
    pub fn observe(&mut self, line: &LogicalLine) -> bool {
        let trimmed = line.text.trim_start();
        let Some(rest) = trimmed.strip_prefix("@doc") else {
            return false;
        };
        let rest = rest.trim();
        self.doc = if rest == "false" {
            None
        } else if let Some(heredoc) = &line.heredoc {
            Some(heredoc.clone())
        } else {
            parse_string(rest)
        };
        true
    }

    pub fn take(&mut self) -> Option<String> {
        self.doc.take()
    }

    pub fn clear(&mut self) {
        self.doc = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logical_lines_join_continuations() {
        let source = "attr :rest, :global,\n  include: ~w(disabled form)\ndef x(assigns), do: nil";
        let lines = logical_lines(source);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].line, 1);
        assert_eq!(lines[0].text, "attr :rest, :global, include: ~w(disabled form)");
        assert_eq!(lines[1].line, 3);
    }

    #[test]
    fn test_logical_lines_collapse_heredoc() {
        let source = "@doc \"\"\"\nRenders a button.\n\nend of docs\n\"\"\"\ndef button(assigns) do";
        let lines = logical_lines(source);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].text, "@doc \"\"");
        assert_eq!(lines[0].heredoc.as_deref(), Some("Renders a button.\n\nend of docs"));
        assert_eq!(lines[1].line, 6);
    }

    #[test]
    fn test_logical_lines_dedent_multibyte_whitespace() {
        let source = "@doc \"\"\"\n x\n\u{a0}y\n\u{3000}\u{3000}z\n\"\"\"\ndef x(assigns), do: nil";
        let lines = logical_lines(source);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].heredoc.as_deref(), Some("x\ny\n\u{3000}z"));
    }

    #[test]
    fn test_block_delta() {
        assert_eq!(block_delta("defmodule Foo do"), (1, 0));
        assert_eq!(block_delta("end"), (0, 1));
        assert_eq!(block_delta("Enum.map(xs, fn x -> x end)"), (1, 1));
        assert_eq!(block_delta("if x, do: :end"), (0, 0));
        assert_eq!(block_delta("get \"/end\", PageController, :end # end"), (0, 0));
    }

    #[test]
    fn test_block_tracker_nested_modules() {
        let mut tracker = BlockTracker::new();
        tracker.advance("defmodule MyApp.Outer do");
        assert_eq!(tracker.current_module(), Some("MyApp.Outer"));
        tracker.advance("defmodule Inner do");
        assert_eq!(tracker.current_module(), Some("MyApp.Outer.Inner"));
        tracker.advance("end");
        assert_eq!(tracker.current_module(), Some("MyApp.Outer"));
        tracker.advance("end");
        assert_eq!(tracker.current_module(), None);
    }

    #[test]
    fn test_split_and_keywords() {
        let args = split_args(r#""/users", UserController, only: [:index, :show], as: :people"#);
        assert_eq!(args.len(), 4);
        let keywords = keyword_args(&args);
        assert_eq!(keyword(&keywords, "only"), Some("[:index, :show]"));
        assert_eq!(keyword(&keywords, "as"), Some(":people"));
        assert_eq!(positional_args(&args), vec!["\"/users\"", "UserController"]);
    }

    #[test]
    fn test_parse_name_list() {
        assert_eq!(parse_name_list("[:index, :show]"), vec!["index", "show"]);
        assert_eq!(parse_name_list("~w(primary secondary)"), vec!["primary", "secondary"]);
        assert_eq!(parse_name_list("~w[a b]a"), vec!["a", "b"]);
        assert_eq!(parse_name_list(r#"["x", "y"]"#), vec!["x", "y"]);
    }

    #[test]
    fn test_call_args() {
        assert_eq!(call_args("attr(:name, :string)", "attr"), Some(":name, :string"));
        assert_eq!(call_args("  slot :header do", "slot"), Some(":header"));
        assert_eq!(call_args("attributes :x", "attr"), None);
    }
}

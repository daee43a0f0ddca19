//! `handle_event` / `handle_info` 定義の抽出

use std::collections::HashSet;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;

use super::{BlockTracker, PendingDoc, logical_lines, matching_close, parse_atom, parse_string, split_args};
use crate::model::{Event, EventKind, NameKind};

static HANDLER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*def\s+(handle_event|handle_info)\(").unwrap());

pub fn scan(path: &Path, content: &str) -> Vec<Event> {
    let mut tracker = BlockTracker::new();
    let mut doc = PendingDoc::default();
    let mut seen: HashSet<(String, String, EventKind)> = HashSet::new();
    let mut events = Vec::new();

    for line in logical_lines(content) {
        let text = line.text.trim();
        if doc.observe(&line) {
            tracker.advance(&line.text);
            continue;
        }

        if let Some(caps) = HANDLER_RE.captures(text) {
            let kind = match &caps[1] {
                "handle_event" => EventKind::HandleEvent,
                _ => EventKind::HandleInfo,
            };
            let after_paren = &text[caps.get(0).map_or(0, |m| m.end())..];
            let args = matching_close(after_paren)
                .map(|close| split_args(&after_paren[..close]))
                .unwrap_or_default();

            let parsed = match kind {
                EventKind::HandleEvent => parse_event_head(&args),
                EventKind::HandleInfo => parse_info_head(&args),
            };
            let doc_text = doc.take();

            if let (Some((name, name_kind, params)), Some(module)) =
                (parsed, tracker.current_module())
            {
                if seen.insert((module.to_string(), name.clone(), kind)) {
                    events.push(Event {
                        name,
                        file_path: path.to_path_buf(),
                        module_name: module.to_string(),
                        line: line.line,
                        params,
                        kind,
                        doc: doc_text,
                        name_kind,
                    });
                }
            }
        } else if text.starts_with("def ") || text.starts_with("defp ") {
            doc.clear();
        }

        tracker.advance(&line.text);
    }

    events
}

/// `handle_event("save", params, socket)`
fn parse_event_head(args: &[String]) -> Option<(String, NameKind, String)> {
    let first = args.first()?;
    let (name, name_kind) = match parse_string(first) {
        Some(name) => (name, NameKind::String),
        None => (parse_atom(first)?, NameKind::Atom),
    };
    let params = args.get(1).cloned().unwrap_or_default();
    Some((name, name_kind, params))
}

/// `handle_info(:tick, socket)` / `handle_info({:updated, item}, socket)`
fn parse_info_head(args: &[String]) -> Option<(String, NameKind, String)> {
    let message = args.first()?;
    if let Some(name) = parse_atom(message) {
        return Some((name, NameKind::Atom, message.clone()));
    }
    let inner = message.strip_prefix('{')?.strip_suffix('}')?;
    let tag = split_args(inner).into_iter().next()?;
    let name = parse_atom(&tag)?;
    Some((name, NameKind::Atom, message.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIVE: &str = r#"defmodule MyAppWeb.CounterLive do
  use MyAppWeb, :live_view

  @doc "Increments the counter"
  def handle_event("inc", %{"by" => by}, socket) do
    {:noreply, update(socket, :count, &(&1 + String.to_integer(by)))}
  end

  def handle_event("inc", _params, socket), do: {:noreply, socket}

  def handle_event(:reset, _, socket) do
    {:noreply, assign(socket, count: 0)}
  end

  def handle_info(:tick, socket), do: {:noreply, socket}

  def handle_info({:updated, %{id: id}}, socket) do
    {:noreply, socket}
  end

  def handle_info(msg, socket), do: {:noreply, socket}
end
"#;

    #[test]
    fn test_scan_events() {
        let events = scan(Path::new("/app/lib/my_app_web/live/counter_live.ex"), LIVE);
        let summary: Vec<_> = events
            .iter()
            .map(|e| (e.name.as_str(), e.kind, e.name_kind))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("inc", EventKind::HandleEvent, NameKind::String),
                ("reset", EventKind::HandleEvent, NameKind::Atom),
                ("tick", EventKind::HandleInfo, NameKind::Atom),
                ("updated", EventKind::HandleInfo, NameKind::Atom),
            ]
        );

        let inc = &events[0];
        assert_eq!(inc.line, 5);
        assert_eq!(inc.params, r#"%{"by" => by}"#);
        assert_eq!(inc.doc.as_deref(), Some("Increments the counter"));
        assert_eq!(inc.module_name, "MyAppWeb.CounterLive");
        assert!(inc.is_unused_candidate());
        assert!(!events[1].is_unused_candidate());
        assert!(events[1].doc.is_none());
    }
}

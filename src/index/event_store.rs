use std::collections::HashSet;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;

use super::registry::{RegistryKind, Store};
use crate::model::Event;
use crate::parser::Events;
use crate::parser::kind::EventsMetadata;

/// イベント名を指定するバインディング
const EVENT_BINDINGS: &[&str] = &[
    "click",
    "click-away",
    "capture-click",
    "submit",
    "change",
    "blur",
    "focus",
    "keydown",
    "keyup",
    "window-blur",
    "window-focus",
    "window-keydown",
    "window-keyup",
    "viewport-top",
    "viewport-bottom",
];

static BINDING_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"phx-([a-z-]+)\s*=\s*["']([^"'{}]+)["']"#).unwrap());
static JS_PUSH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"JS\.push\(\s*(?:%JS\{\}\s*,\s*)?"([^"]+)""#).unwrap());

/// LiveView のイベントハンドラのストア
pub type EventStore = Store<LiveEventKind>;

pub struct LiveEventKind;

impl RegistryKind for LiveEventKind {
    type Parse = Events;
    type Entity = Event;

    const LABEL: &'static str = "events";

    /// `*_live.ex` または `*_live/` 配下の .ex
    fn is_candidate(path: &Path) -> bool {
        let is_ex = path.extension().is_some_and(|e| e == "ex");
        let is_live_file = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with("_live.ex"));
        let in_live_dir = path
            .parent()
            .and_then(|p| p.file_name())
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with("_live"));
        is_ex && (is_live_file || in_live_dir)
    }

    fn into_entities(path: &Path, metadata: EventsMetadata) -> Vec<Event> {
        let mut seen = HashSet::new();
        metadata
            .events
            .into_iter()
            .filter(|e| seen.insert((e.module_name.clone(), e.name.clone(), e.kind)))
            .map(|mut event| {
                event.file_path = path.to_path_buf();
                event
            })
            .collect()
    }
}

impl Store<LiveEventKind> {
    pub fn get_all_events(&self) -> Vec<Event> {
        self.registry().all()
    }

    pub fn get_events_from_file(&self, path: &Path) -> Vec<Event> {
        self.registry().from_file(path)
    }

    pub fn get_events_by_module(&self, module: &str) -> Vec<Event> {
        self.registry().filter(|e| e.module_name == module)
    }

    /// テンプレートから参照されていないイベント（文字列名の handle_event のみ）
    pub fn find_unused_events(&self, module: &str, referenced: &HashSet<String>) -> Vec<Event> {
        let mut unused: Vec<Event> = self
            .get_events_by_module(module)
            .into_iter()
            .filter(|e| e.is_unused_candidate() && !referenced.contains(&e.name))
            .collect();
        unused.sort_by_key(|e| e.line);
        unused
    }
}

/// テンプレート中のイベント参照（`phx-click="save"`、`JS.push("save")`）
pub fn collect_event_references(text: &str) -> HashSet<String> {
    let mut names = HashSet::new();
    for caps in BINDING_RE.captures_iter(text) {
        if EVENT_BINDINGS.contains(&&caps[1]) {
            names.insert(caps[2].trim().to_string());
        }
    }
    for caps in JS_PUSH_RE.captures_iter(text) {
        names.insert(caps[1].to_string());
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect_event_references() {
        let template = r##"
<button phx-click="inc">+</button>
<form phx-submit="save" phx-change='validate' phx-target={@myself}>
<div phx-click={JS.push("open") |> JS.hide(to: "#m")}></div>
<div phx-hook="Chart" phx-update="ignore"></div>
"##;
        let names = collect_event_references(template);
        let mut sorted: Vec<_> = names.into_iter().collect();
        sorted.sort();
        assert_eq!(sorted, vec!["inc", "open", "save", "validate"]);
    }

    #[test]
    fn test_is_candidate() {
        assert!(LiveEventKind::is_candidate(Path::new(
            "/app/lib/my_app_web/live/counter_live.ex"
        )));
        assert!(LiveEventKind::is_candidate(Path::new(
            "/app/lib/my_app_web/live/user_live/index.ex"
        )));
        assert!(!LiveEventKind::is_candidate(Path::new(
            "/app/lib/my_app_web/controllers/page_controller.ex"
        )));
    }
}

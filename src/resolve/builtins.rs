//! フレームワーク組み込みのコンポーネントとHTML属性

use std::path::PathBuf;

use phf::phf_set;

use crate::model::{Component, ComponentAttribute, ComponentSlot, INNER_BLOCK};

/// 組み込みコンポーネントを定義しているモジュール
pub const BUILTIN_MODULE: &str = "Phoenix.Component";

/// `Phoenix.Component` の関数コンポーネント（importなしで使える）
static BUILTIN_COMPONENTS: phf::Set<&'static str> = phf_set! {
    "link", "form", "inputs_for", "live_component", "live_title",
    "live_file_input", "live_img_preview", "focus_wrap", "dynamic_tag",
    "intersperse", "async_result",
};

/// `attr :rest, :global` が受け付けるHTML属性
/// MDN HTML attribute reference: https://developer.mozilla.org/en-US/docs/Web/HTML/Reference/Attributes
static HTML_ATTRIBUTES: phf::Set<&'static str> = phf_set! {
    // Global attributes
    "accesskey", "autocapitalize", "autocomplete", "autocorrect",
    "autofocus", "class", "contenteditable", "dir", "draggable",
    "enterkeyhint", "exportparts", "hidden", "id", "inert", "inputmode",
    "is", "itemid", "itemprop", "itemref", "itemscope", "itemtype",
    "lang", "nonce", "part", "popover", "role", "slot", "spellcheck",
    "style", "tabindex", "title", "translate",

    // Element-specific attributes
    "accept", "action", "alt", "checked", "cols", "colspan", "disabled",
    "download", "enctype", "for", "form", "formaction", "height", "href",
    "hreflang", "max", "maxlength", "method", "min", "minlength", "multiple",
    "name", "pattern", "placeholder", "readonly", "rel", "required", "rows",
    "rowspan", "selected", "size", "src", "step", "target", "type", "value",
    "width",

    // Event handler attributes
    "onblur", "onchange", "onclick", "onfocus", "oninput", "onkeydown",
    "onkeyup", "onsubmit",
};

pub fn is_builtin_component(name: &str) -> bool {
    BUILTIN_COMPONENTS.contains(name)
}

/// 組み込みコンポーネントの名前（順序は不定）
pub fn builtin_component_names() -> impl Iterator<Item = &'static str> {
    BUILTIN_COMPONENTS.iter().copied()
}

pub fn is_html_attribute(name: &str) -> bool {
    HTML_ATTRIBUTES.contains(name)
}

/// テンプレート上では常に有効な属性（特殊属性・LiveViewバインディング・data/aria）
pub fn is_always_allowed_attribute(name: &str) -> bool {
    matches!(name, ":if" | ":for" | ":let" | ":key")
        || name.starts_with("phx-")
        || name.starts_with("data-")
        || name.starts_with("aria-")
}

fn attr(name: &str, attr_type: &str, required: bool) -> ComponentAttribute {
    ComponentAttribute {
        name: name.to_string(),
        attr_type: attr_type.to_string(),
        required,
        default: None,
        values: None,
        doc: None,
    }
}

fn slot(name: &str, required: bool) -> ComponentSlot {
    ComponentSlot {
        name: name.to_string(),
        required,
        doc: None,
        attributes: Vec::new(),
    }
}

/// 組み込みコンポーネントの合成メタデータ
pub fn builtin_component(name: &str) -> Option<Component> {
    if !is_builtin_component(name) {
        return None;
    }
    let rest = attr("rest", "global", false);
    let (attributes, slots) = match name {
        "link" => (
            vec![
                attr("navigate", "string", false),
                attr("patch", "string", false),
                attr("href", "any", false),
                attr("replace", "boolean", false),
                attr("method", "string", false),
                attr("csrf_token", "any", false),
                rest,
            ],
            vec![slot(INNER_BLOCK, true)],
        ),
        "form" => (
            vec![
                attr("for", "any", true),
                attr("as", "atom", false),
                attr("action", "string", false),
                attr("method", "string", false),
                attr("multipart", "boolean", false),
                attr("csrf_token", "any", false),
                attr("errors", "list", false),
                rest,
            ],
            vec![slot(INNER_BLOCK, true)],
        ),
        "inputs_for" => (
            vec![
                attr("field", "Phoenix.HTML.FormField", true),
                attr("id", "string", false),
                attr("as", "atom", false),
                attr("default", "any", false),
                attr("prepend", "list", false),
                attr("append", "list", false),
                attr("skip_hidden", "boolean", false),
                attr("skip_persistent_id", "boolean", false),
                attr("options", "list", false),
            ],
            vec![slot(INNER_BLOCK, true)],
        ),
        "live_component" => (
            vec![attr("module", "atom", true), attr("id", "string", true), rest],
            vec![],
        ),
        "live_title" => (
            vec![
                attr("prefix", "string", false),
                attr("suffix", "string", false),
                attr("default", "string", false),
            ],
            vec![slot(INNER_BLOCK, true)],
        ),
        "live_file_input" => (
            vec![
                attr("upload", "Phoenix.LiveView.UploadConfig", true),
                attr("accept", "string", false),
                rest,
            ],
            vec![],
        ),
        "live_img_preview" => (
            vec![attr("entry", "Phoenix.LiveView.UploadEntry", true), rest],
            vec![],
        ),
        "focus_wrap" => (
            vec![attr("id", "string", true), rest],
            vec![slot(INNER_BLOCK, true)],
        ),
        "dynamic_tag" => (
            vec![attr("tag_name", "string", true), attr("name", "string", false), rest],
            vec![slot(INNER_BLOCK, false)],
        ),
        "intersperse" => (
            vec![attr("enum", "any", true)],
            vec![slot(INNER_BLOCK, true), slot("separator", true)],
        ),
        "async_result" => (
            vec![attr("assign", "Phoenix.LiveView.AsyncResult", true)],
            vec![
                slot(INNER_BLOCK, false),
                slot("loading", false),
                slot("failed", false),
            ],
        ),
        _ => (vec![rest], vec![]),
    };

    Some(Component {
        name: name.to_string(),
        module_name: BUILTIN_MODULE.to_string(),
        file_path: PathBuf::new(),
        line: 0,
        attributes,
        slots,
    })
}

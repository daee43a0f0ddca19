use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use tower_lsp::lsp_types::*;

use super::enclosing_component;
use crate::index::Index;
use crate::markup::{UsageExtractor, template_text};
use crate::model::{Component, ComponentAttribute, ComponentUsage};
use crate::resolve::builtins::{BUILTIN_MODULE, builtin_component, builtin_component_names};
use crate::resolve::component::{ModuleHeader, owning_module_file};
use crate::resolve::{AssignContext, AssociationInfo, Resolver};
use crate::util::position_to_offset;

static ROUTE_CONTEXT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?:~p"|(?:navigate|patch|href)=")([^"\s]*)$"#).unwrap());
static ASSIGN_CONTEXT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"@([a-z_]\w*)((?:\.[a-z_]\w*)*)\.(\w*)$").unwrap());
static BARE_ASSIGN_CONTEXT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"@(\w*)$").unwrap());
static COMPONENT_CONTEXT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<\.(\w*)$").unwrap());
static SLOT_CONTEXT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<:(\w*)$").unwrap());

pub struct CompletionHandler {
    index: Arc<Index>,
    extractor: Arc<UsageExtractor>,
}

impl CompletionHandler {
    pub fn new(index: Arc<Index>, extractor: Arc<UsageExtractor>) -> Self {
        Self { index, extractor }
    }

    pub fn complete(
        &self,
        path: &Path,
        key: &str,
        text: &str,
        position: Position,
    ) -> Option<CompletionResponse> {
        let offset = position_to_offset(text, position);
        let line_start = text[..offset].rfind('\n').map(|i| i + 1).unwrap_or(0);
        let before = &text[line_start..offset];

        if let Some(caps) = ROUTE_CONTEXT_RE.captures(before) {
            return Some(CompletionResponse::Array(self.complete_routes(&caps[1])));
        }
        if let Some(caps) = ASSIGN_CONTEXT_RE.captures(before) {
            let segments: Vec<&str> = caps[2].split('.').filter(|s| !s.is_empty()).collect();
            let items = self.complete_assign_path(path, text, offset, &caps[1], &segments);
            return Some(CompletionResponse::Array(items));
        }
        if BARE_ASSIGN_CONTEXT_RE.is_match(before) {
            return Some(CompletionResponse::Array(self.complete_assigns(path, text, offset)));
        }
        if COMPONENT_CONTEXT_RE.is_match(before) {
            return Some(CompletionResponse::Array(self.complete_components(path, text)));
        }

        let template = template_text(path, text);
        let usage = self.extractor.innermost_usage(&template, key, offset)?;
        let component = Resolver::new(&self.index).resolve_component(
            path,
            &usage.component_name,
            usage.module_context.as_deref(),
            Some(text),
        )?;

        if SLOT_CONTEXT_RE.is_match(before) {
            return Some(CompletionResponse::Array(slot_items(&component, &usage)));
        }

        if let Some(slot) = usage
            .slots
            .iter()
            .find(|s| offset > s.start && offset < s.open_tag_end)
        {
            let used: HashSet<&str> = slot.attributes.iter().map(|a| a.name.as_str()).collect();
            let items = component
                .find_slot(&slot.name)
                .map(|decl| attribute_items(&decl.attributes, &used, &component))
                .unwrap_or_default();
            return Some(CompletionResponse::Array(items));
        }

        if usage.in_open_tag(offset) {
            let used: HashSet<&str> = usage.attributes.iter().map(|a| a.name.as_str()).collect();
            return Some(CompletionResponse::Array(attribute_items(
                &component.attributes,
                &used,
                &component,
            )));
        }
        None
    }

    /// ルートのパス候補（`label` はパス、`detail` は "GET /path"）
    pub fn complete_routes(&self, prefix: &str) -> Vec<CompletionItem> {
        let prefix = if prefix.is_empty() { "/" } else { prefix };
        self.index
            .routes
            .routes_with_prefix(prefix)
            .into_iter()
            .map(|route| CompletionItem {
                label: route.path.clone(),
                kind: Some(CompletionItemKind::REFERENCE),
                detail: Some(route.detail()),
                documentation: route_documentation(&route.controller, &route.action, &route.live_module),
                ..Default::default()
            })
            .collect()
    }

    /// `<.` の後: 同じモジュール、組み込み、importされたモジュールのコンポーネント
    pub fn complete_components(&self, path: &Path, text: &str) -> Vec<CompletionItem> {
        let mut components: Vec<Component> = Vec::new();
        let module_file = owning_module_file(&self.index, path);
        if let Some(file) = &module_file {
            components.extend(self.index.components.get_components_from_file(file));
        }

        let source = match &module_file {
            Some(file) if file == path => Some(text.to_string()),
            Some(file) => std::fs::read_to_string(file).ok(),
            None => None,
        };
        let header = source.map(|s| ModuleHeader::parse(&s)).unwrap_or_default();
        for module in &header.imports {
            if module == BUILTIN_MODULE {
                continue;
            }
            components.extend(self.index.components.get_components_by_module(module));
        }
        components.extend(builtin_component_names().filter_map(builtin_component));

        let mut seen = HashSet::new();
        components
            .into_iter()
            .filter(|c| seen.insert(c.name.clone()))
            .map(|c| CompletionItem {
                label: c.name.clone(),
                kind: Some(CompletionItemKind::FUNCTION),
                detail: Some(c.qualified_name()),
                ..Default::default()
            })
            .collect()
    }

    /// `@` の後: 関数コンポーネントの attr とコントローラーから渡される assigns
    pub fn complete_assigns(&self, path: &Path, text: &str, offset: usize) -> Vec<CompletionItem> {
        let component = enclosing_component(&self.index, path, text, offset);
        let mut seen = HashSet::new();
        let mut items = Vec::new();

        if let Some(component) = &component {
            for attr in &component.attributes {
                if attr.attr_type == "global" || !seen.insert(attr.name.clone()) {
                    continue;
                }
                items.push(CompletionItem {
                    label: attr.name.clone(),
                    kind: Some(CompletionItemKind::VARIABLE),
                    detail: Some(format!("attr :{}", attr.attr_type)),
                    ..Default::default()
                });
            }
        }

        let assigns = Resolver::new(&self.index).template_assigns(path, component.as_ref());
        for assign in assigns {
            if !seen.insert(assign.name.clone()) {
                continue;
            }
            items.push(CompletionItem {
                label: assign.name,
                kind: Some(CompletionItemKind::VARIABLE),
                detail: assign.value,
                ..Default::default()
            });
        }
        items
    }

    /// `@user.` の後: スキーマのフィールドと関連
    fn complete_assign_path(
        &self,
        path: &Path,
        text: &str,
        offset: usize,
        base: &str,
        segments: &[&str],
    ) -> Vec<CompletionItem> {
        let component = enclosing_component(&self.index, path, text, offset);
        let context = AssignContext {
            component: component.as_ref(),
            file: Some(path),
        };
        let info = Resolver::new(&self.index).get_association_info_from_path(base, segments, context);
        let Some(schema) = info.as_ref().and_then(AssociationInfo::current_schema) else {
            return Vec::new();
        };

        let fields = schema.fields.iter().map(|field| CompletionItem {
            label: field.name.clone(),
            kind: Some(CompletionItemKind::FIELD),
            detail: Some(format!(":{}", field.field_type)),
            ..Default::default()
        });
        let associations = schema.associations.iter().map(|assoc| CompletionItem {
            label: assoc.field_name.clone(),
            kind: Some(CompletionItemKind::MODULE),
            detail: Some(format!("{} {}", assoc.assoc_type.as_str(), assoc.target_module)),
            ..Default::default()
        });
        fields.chain(associations).collect()
    }
}

fn route_documentation(
    controller: &Option<String>,
    action: &Option<String>,
    live_module: &Option<String>,
) -> Option<Documentation> {
    let target = match (controller, action, live_module) {
        (_, _, Some(live)) => live.clone(),
        (Some(controller), Some(action), _) => format!("{} :{}", controller, action),
        (Some(controller), None, _) => controller.clone(),
        _ => return None,
    };
    Some(Documentation::String(target))
}

fn attribute_items(
    attributes: &[ComponentAttribute],
    used: &HashSet<&str>,
    component: &Component,
) -> Vec<CompletionItem> {
    attributes
        .iter()
        .filter(|attr| attr.attr_type != "global" && !used.contains(attr.name.as_str()))
        .map(|attr| {
            let required = if attr.required { " (required)" } else { "" };
            CompletionItem {
                label: attr.name.clone(),
                kind: Some(CompletionItemKind::PROPERTY),
                detail: Some(format!(":{}{}", attr.attr_type, required)),
                documentation: attr.doc.clone().map(|doc| {
                    Documentation::MarkupContent(MarkupContent {
                        kind: MarkupKind::Markdown,
                        value: doc,
                    })
                }),
                insert_text: Some(format!("{}=", attr.name)),
                sort_text: Some(format!("{}{}", if attr.required { "0" } else { "1" }, attr.name)),
                label_details: Some(CompletionItemLabelDetails {
                    detail: None,
                    description: Some(component.qualified_name()),
                }),
                ..Default::default()
            }
        })
        .collect()
}

fn slot_items(component: &Component, usage: &ComponentUsage) -> Vec<CompletionItem> {
    component
        .slots
        .iter()
        .filter(|slot| slot.name != crate::model::INNER_BLOCK)
        .map(|slot| CompletionItem {
            label: slot.name.clone(),
            kind: Some(CompletionItemKind::SNIPPET),
            detail: Some(if usage.provides_slot(&slot.name) {
                format!("slot of {} (already used)", component.qualified_name())
            } else {
                format!("slot of {}", component.qualified_name())
            }),
            documentation: slot.doc.clone().map(Documentation::String),
            ..Default::default()
        })
        .collect()
}

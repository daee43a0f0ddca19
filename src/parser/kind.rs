//! 解析対象の種類ごとのメタデータ形状
//!
//! 正確パーサーのJSON出力とフォールバックスキャナーの結果はどちらもこの形に揃える。

use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::fallback;
use crate::model::{Component, ControllerInfo, Event, Route, SchemaInfo, TemplateInfo};

/// 解析対象の種類
pub trait ParseKind: Send + Sync + 'static {
    /// 種類名（外部パーサーのスクリプト名 `<NAME>.exs` にも使う）
    const NAME: &'static str;

    type Metadata: DeserializeOwned + Clone + Send + Sync + 'static;

    /// フォールバックスキャナー（失敗しない）
    fn scan(path: &Path, content: &str) -> Self::Metadata;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentsMetadata {
    #[serde(default)]
    pub components: Vec<Component>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutesMetadata {
    #[serde(default)]
    pub routes: Vec<Route>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventsMetadata {
    #[serde(default)]
    pub events: Vec<Event>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemasMetadata {
    #[serde(default)]
    pub schemas: Vec<SchemaInfo>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplatesMetadata {
    #[serde(default)]
    pub templates: Vec<TemplateInfo>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControllersMetadata {
    #[serde(default)]
    pub controllers: Vec<ControllerInfo>,
}

/// 正確パーサーが返すフラットなコンポーネント使用箇所
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExactUsage {
    pub name: String,
    #[serde(default)]
    pub module_context: Option<String>,
    #[serde(default)]
    pub is_local: bool,
    pub start: usize,
    pub end: usize,
    #[serde(default)]
    pub name_start: Option<usize>,
    #[serde(default)]
    pub name_end: Option<usize>,
    #[serde(default)]
    pub self_closing: bool,
    #[serde(default)]
    pub block_end: Option<usize>,
    #[serde(default)]
    pub content_start: Option<usize>,
    #[serde(default)]
    pub content_end: Option<usize>,
    #[serde(default)]
    pub attributes: Vec<ExactAttribute>,
    #[serde(default)]
    pub slots: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExactAttribute {
    pub name: String,
    pub start: usize,
    pub end: usize,
    #[serde(default)]
    pub value: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkupMetadata {
    #[serde(default)]
    pub usages: Vec<ExactUsage>,
}

pub struct Components;
pub struct Routes;
pub struct Events;
pub struct Schemas;
pub struct Templates;
pub struct Controllers;
pub struct Markup;

impl ParseKind for Components {
    const NAME: &'static str = "components";
    type Metadata = ComponentsMetadata;

    fn scan(path: &Path, content: &str) -> Self::Metadata {
        ComponentsMetadata {
            components: fallback::components::scan(path, content),
        }
    }
}

impl ParseKind for Routes {
    const NAME: &'static str = "routes";
    type Metadata = RoutesMetadata;

    fn scan(path: &Path, content: &str) -> Self::Metadata {
        RoutesMetadata {
            routes: fallback::routes::scan(path, content),
        }
    }
}

impl ParseKind for Events {
    const NAME: &'static str = "events";
    type Metadata = EventsMetadata;

    fn scan(path: &Path, content: &str) -> Self::Metadata {
        EventsMetadata {
            events: fallback::events::scan(path, content),
        }
    }
}

impl ParseKind for Schemas {
    const NAME: &'static str = "schemas";
    type Metadata = SchemasMetadata;

    fn scan(path: &Path, content: &str) -> Self::Metadata {
        SchemasMetadata {
            schemas: fallback::schemas::scan(path, content),
        }
    }
}

impl ParseKind for Templates {
    const NAME: &'static str = "templates";
    type Metadata = TemplatesMetadata;

    fn scan(path: &Path, content: &str) -> Self::Metadata {
        TemplatesMetadata {
            templates: fallback::templates::scan(path, content),
        }
    }
}

impl ParseKind for Controllers {
    const NAME: &'static str = "controllers";
    type Metadata = ControllersMetadata;

    fn scan(path: &Path, content: &str) -> Self::Metadata {
        ControllersMetadata {
            controllers: fallback::controllers::scan(path, content),
        }
    }
}

impl ParseKind for Markup {
    const NAME: &'static str = "markup";
    type Metadata = MarkupMetadata;

    /// マークアップの正規表現フォールバックは `markup` モジュール側にある
    fn scan(_path: &Path, _content: &str) -> Self::Metadata {
        MarkupMetadata::default()
    }
}

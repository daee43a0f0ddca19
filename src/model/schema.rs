use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssociationType {
    BelongsTo,
    HasOne,
    HasMany,
    ManyToMany,
    EmbedsOne,
    EmbedsMany,
}

impl AssociationType {
    pub fn from_macro(name: &str) -> Option<Self> {
        match name {
            "belongs_to" => Some(Self::BelongsTo),
            "has_one" => Some(Self::HasOne),
            "has_many" => Some(Self::HasMany),
            "many_to_many" => Some(Self::ManyToMany),
            "embeds_one" => Some(Self::EmbedsOne),
            "embeds_many" => Some(Self::EmbedsMany),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BelongsTo => "belongs_to",
            Self::HasOne => "has_one",
            Self::HasMany => "has_many",
            Self::ManyToMany => "many_to_many",
            Self::EmbedsOne => "embeds_one",
            Self::EmbedsMany => "embeds_many",
        }
    }

    /// 結果がリストになる関連か
    pub fn is_many(&self) -> bool {
        matches!(self, Self::HasMany | Self::ManyToMany | Self::EmbedsMany)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaField {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(default)]
    pub default: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Association {
    pub field_name: String,
    pub target_module: String,
    #[serde(rename = "type")]
    pub assoc_type: AssociationType,
}

/// Ectoスキーマ
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaInfo {
    pub module_name: String,
    #[serde(default)]
    pub table_name: Option<String>,
    #[serde(default)]
    pub file_path: PathBuf,
    #[serde(default)]
    pub line: u32,
    #[serde(default)]
    pub fields: Vec<SchemaField>,
    #[serde(default)]
    pub associations: Vec<Association>,
}

impl SchemaInfo {
    pub fn find_field(&self, name: &str) -> Option<&SchemaField> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn find_association(&self, name: &str) -> Option<&Association> {
        self.associations.iter().find(|a| a.field_name == name)
    }
}

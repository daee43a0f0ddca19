use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// 暗黙的に全コンポーネントが持つスロット
pub const INNER_BLOCK: &str = "inner_block";

/// 関数コンポーネント
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Component {
    pub name: String,
    pub module_name: String,
    #[serde(default)]
    pub file_path: PathBuf,
    /// 定義行（1始まり）
    pub line: u32,
    #[serde(default)]
    pub attributes: Vec<ComponentAttribute>,
    #[serde(default)]
    pub slots: Vec<ComponentSlot>,
}

/// `attr :name, :type, opts` 宣言
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentAttribute {
    pub name: String,
    #[serde(rename = "type")]
    pub attr_type: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub default: Option<String>,
    #[serde(default)]
    pub values: Option<Vec<String>>,
    #[serde(default)]
    pub doc: Option<String>,
}

/// `slot :name, opts` 宣言
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentSlot {
    pub name: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub doc: Option<String>,
    #[serde(default)]
    pub attributes: Vec<ComponentAttribute>,
}

impl Component {
    pub fn find_attribute(&self, name: &str) -> Option<&ComponentAttribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn find_slot(&self, name: &str) -> Option<&ComponentSlot> {
        self.slots.iter().find(|s| s.name == name)
    }

    /// `attr :rest, :global` を持つか（HTMLグローバル属性を受け付ける）
    pub fn accepts_global_attributes(&self) -> bool {
        self.attributes.iter().any(|a| a.attr_type == "global")
    }

    /// スロットとして受け付けるか（inner_blockは常に有効）
    pub fn accepts_slot(&self, name: &str) -> bool {
        name == INNER_BLOCK || self.find_slot(name).is_some()
    }

    pub fn required_attributes(&self) -> impl Iterator<Item = &ComponentAttribute> {
        self.attributes
            .iter()
            .filter(|a| a.required && a.attr_type != "global")
    }

    pub fn required_slots(&self) -> impl Iterator<Item = &ComponentSlot> {
        self.slots.iter().filter(|s| s.required)
    }

    /// 複数節の関数定義をマージ（先に宣言されたものを優先）
    pub fn merge_clause(&mut self, other: Component) {
        for attribute in other.attributes {
            if self.find_attribute(&attribute.name).is_none() {
                self.attributes.push(attribute);
            }
        }
        for slot in other.slots {
            if self.find_slot(&slot.name).is_none() {
                self.slots.push(slot);
            }
        }
    }

    /// 完全修飾名（`MyAppWeb.CoreComponents.button`）
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.module_name, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attr(name: &str, attr_type: &str) -> ComponentAttribute {
        ComponentAttribute {
            name: name.to_string(),
            attr_type: attr_type.to_string(),
            required: false,
            default: None,
            values: None,
            doc: None,
        }
    }

    fn component(attributes: Vec<ComponentAttribute>) -> Component {
        Component {
            name: "button".to_string(),
            module_name: "MyAppWeb.CoreComponents".to_string(),
            file_path: PathBuf::from("/app/lib/my_app_web/components/core_components.ex"),
            line: 10,
            attributes,
            slots: Vec::new(),
        }
    }

    #[test]
    fn test_merge_clause_keeps_earliest() {
        let mut first = component(vec![attr("type", "string"), attr("class", "string")]);
        let second = component(vec![attr("type", "atom"), attr("rest", "global")]);
        first.merge_clause(second);

        let names: Vec<&str> = first.attributes.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["type", "class", "rest"]);
        assert_eq!(first.find_attribute("type").unwrap().attr_type, "string");
        assert!(first.accepts_global_attributes());
    }

    #[test]
    fn test_inner_block_is_implicit() {
        let c = component(Vec::new());
        assert!(c.accepts_slot(INNER_BLOCK));
        assert!(!c.accepts_slot("header"));
    }
}

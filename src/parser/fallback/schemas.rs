//! Ecto スキーマ定義の抽出

use std::collections::HashMap;
use std::path::Path;

use super::{
    BlockTracker, call_args, is_module_name, keyword, keyword_args, logical_lines,
    opens_do_block, parse_atom, parse_keyword, parse_string, split_args,
};
use crate::model::{Association, AssociationType, SchemaField, SchemaInfo};
use crate::util::camelize;

const TIMESTAMP_FIELDS: [&str; 2] = ["inserted_at", "updated_at"];

/// モジュールごとの `alias` 表
#[derive(Debug, Default)]
struct Aliases {
    by_module: HashMap<String, HashMap<String, String>>,
}

impl Aliases {
    fn record(&mut self, module: &str, args: &str) {
        let args = split_args(args);
        let Some(target) = args.first() else {
            return;
        };
        let table = self.by_module.entry(module.to_string()).or_default();
        let keywords = keyword_args(&args[1..]);

        // alias MyApp.Accounts.{User, Team}
        if let Some((base, rest)) = target.split_once(".{") {
            for name in split_args(rest.trim_end_matches('}')) {
                let name = name.trim();
                if is_module_name(name) {
                    table.insert(short_name(name).to_string(), format!("{}.{}", base, name));
                }
            }
            return;
        }

        if !is_module_name(target) {
            return;
        }
        let short = keyword(&keywords, "as")
            .filter(|name| is_module_name(name))
            .unwrap_or_else(|| short_name(target));
        table.insert(short.to_string(), target.trim().to_string());
    }

    /// 先頭セグメントがエイリアスであれば展開
    fn expand(&self, module: &str, name: &str) -> String {
        let name = name.trim();
        if let Some(rest) = name.strip_prefix("__MODULE__") {
            return format!("{}{}", module, rest);
        }
        let (head, tail) = match name.split_once('.') {
            Some((head, tail)) => (head, Some(tail)),
            None => (name, None),
        };
        match self.by_module.get(module).and_then(|t| t.get(head)) {
            Some(full) => match tail {
                Some(tail) => format!("{}.{}", full, tail),
                None => full.clone(),
            },
            None => name.to_string(),
        }
    }
}

fn short_name(module: &str) -> &str {
    module.rsplit('.').next().unwrap_or(module).trim()
}

pub fn scan(path: &Path, content: &str) -> Vec<SchemaInfo> {
    let mut tracker = BlockTracker::new();
    let mut aliases = Aliases::default();
    let mut open: Vec<(SchemaInfo, usize)> = Vec::new();
    let mut schemas = Vec::new();

    for line in logical_lines(content) {
        let text = line.text.trim();
        let depth_before = tracker.depth();
        let module = tracker.current_module().map(str::to_string);

        if let Some(module) = module.as_deref() {
            if let Some(args) = call_args(text, "alias") {
                aliases.record(module, args);
            } else if let Some(args) = call_args(text, "schema").filter(|_| opens_do_block(text)) {
                let table_name = split_args(args).first().and_then(|a| parse_string(a));
                open.push((new_schema(module, table_name, path, line.line), depth_before));
            } else if text.starts_with("embedded_schema") && opens_do_block(text) {
                open.push((new_schema(module, None, path, line.line), depth_before));
            } else if let Some((schema, _)) = open.last_mut() {
                if let Some(nested) = scan_schema_line(schema, text, module, &aliases, path, line.line) {
                    open.push((nested, depth_before));
                }
            }
        }

        tracker.advance(&line.text);
        while let Some((_, depth)) = open.last() {
            if tracker.depth() > *depth {
                break;
            }
            if let Some((schema, _)) = open.pop() {
                schemas.push(schema);
            }
        }
    }

    schemas.extend(open.into_iter().map(|(schema, _)| schema));
    schemas.sort_by_key(|schema| schema.line);
    schemas
}

fn new_schema(module: &str, table_name: Option<String>, path: &Path, line: u32) -> SchemaInfo {
    SchemaInfo {
        module_name: module.to_string(),
        table_name,
        file_path: path.to_path_buf(),
        line,
        fields: Vec::new(),
        associations: Vec::new(),
    }
}

/// スキーマブロック内の1行。インライン埋め込みの場合は入れ子のスキーマを返す
fn scan_schema_line(
    schema: &mut SchemaInfo,
    text: &str,
    module: &str,
    aliases: &Aliases,
    path: &Path,
    line: u32,
) -> Option<SchemaInfo> {
    let macro_name = text.split(|c: char| c == ' ' || c == '(').next()?;

    if macro_name == "field" {
        let args = split_args(call_args(text, "field")?);
        let name = parse_atom(args.first()?)?;
        let field_type = args
            .get(1)
            .filter(|arg| parse_keyword(arg).is_none())
            .map(|arg| parse_atom(arg).unwrap_or_else(|| arg.trim().to_string()))
            .unwrap_or_else(|| "string".to_string());
        let keywords = keyword_args(&args);
        schema.fields.push(SchemaField {
            name,
            field_type,
            default: keyword(&keywords, "default").map(str::to_string),
        });
        return None;
    }

    if macro_name == "timestamps" {
        let keywords = call_args(text, "timestamps")
            .map(|args| keyword_args(&split_args(args)))
            .unwrap_or_default();
        let field_type = keyword(&keywords, "type")
            .and_then(parse_atom)
            .unwrap_or_else(|| "naive_datetime".to_string());
        for name in TIMESTAMP_FIELDS {
            schema.fields.push(SchemaField {
                name: name.to_string(),
                field_type: field_type.clone(),
                default: None,
            });
        }
        return None;
    }

    let assoc_type = AssociationType::from_macro(macro_name)?;
    let args = split_args(call_args(text, macro_name)?);
    let field_name = parse_atom(args.first()?)?;
    let keywords = keyword_args(&args);
    let inline = opens_do_block(text);

    let target = args
        .get(1)
        .filter(|arg| is_module_name(arg) || arg.starts_with("__MODULE__"))
        .map(|arg| {
            if inline {
                format!("{}.{}", schema.module_name, arg.trim())
            } else {
                aliases.expand(module, arg)
            }
        })
        .unwrap_or_else(|| format!("{}.{}", schema.module_name, camelize(&field_name)));

    if assoc_type == AssociationType::BelongsTo {
        let foreign_key = keyword(&keywords, "foreign_key")
            .and_then(parse_atom)
            .unwrap_or_else(|| format!("{}_id", field_name));
        let field_type = keyword(&keywords, "type")
            .and_then(parse_atom)
            .unwrap_or_else(|| "id".to_string());
        schema.fields.push(SchemaField {
            name: foreign_key,
            field_type,
            default: None,
        });
    }

    schema.associations.push(Association {
        field_name,
        target_module: target.clone(),
        assoc_type,
    });

    inline.then(|| new_schema(&target, None, path, line))
}

#[cfg(test)]
mod tests {
    use super::*;

    const USER: &str = r#"defmodule MyApp.Accounts.User do
  use Ecto.Schema
  alias MyApp.Blog.{Post, Comment}
  alias MyApp.Orgs.Organization, as: Org

  schema "users" do
    field :email, :string
    field :role, Ecto.Enum, values: [:admin, :member], default: :member
    field :tags, {:array, :string}, default: []

    belongs_to :org, Org
    has_many :posts, Post
    has_one :latest_comment, Comment
    many_to_many :groups, MyApp.Groups.Group, join_through: "users_groups"

    embeds_one :address, Address do
      field :street, :string
      field :city, :string
    end

    timestamps(type: :utc_datetime)
  end
end
"#;

    #[test]
    fn test_scan_schema_fields_and_associations() {
        let schemas = scan(Path::new("/app/lib/my_app/accounts/user.ex"), USER);
        assert_eq!(schemas.len(), 2);

        let user = &schemas[0];
        assert_eq!(user.module_name, "MyApp.Accounts.User");
        assert_eq!(user.table_name.as_deref(), Some("users"));
        assert_eq!(user.line, 6);

        let fields: Vec<_> = user.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(
            fields,
            vec!["email", "role", "tags", "org_id", "inserted_at", "updated_at"]
        );
        assert_eq!(user.find_field("role").unwrap().field_type, "Ecto.Enum");
        assert_eq!(user.find_field("role").unwrap().default.as_deref(), Some(":member"));
        assert_eq!(user.find_field("tags").unwrap().field_type, "{:array, :string}");
        assert_eq!(user.find_field("inserted_at").unwrap().field_type, "utc_datetime");

        let org = user.find_association("org").unwrap();
        assert_eq!(org.target_module, "MyApp.Orgs.Organization");
        assert_eq!(org.assoc_type, AssociationType::BelongsTo);
        assert_eq!(
            user.find_association("posts").unwrap().target_module,
            "MyApp.Blog.Post"
        );
        assert_eq!(
            user.find_association("groups").unwrap().target_module,
            "MyApp.Groups.Group"
        );
        assert_eq!(
            user.find_association("address").unwrap().target_module,
            "MyApp.Accounts.User.Address"
        );
    }

    #[test]
    fn test_inline_embed_becomes_nested_schema() {
        let schemas = scan(Path::new("/app/lib/my_app/accounts/user.ex"), USER);
        let address = &schemas[1];
        assert_eq!(address.module_name, "MyApp.Accounts.User.Address");
        assert!(address.table_name.is_none());
        let fields: Vec<_> = address.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(fields, vec!["street", "city"]);
    }

    #[test]
    fn test_embedded_schema() {
        let source = r#"defmodule MyApp.Settings do
  use Ecto.Schema

  embedded_schema do
    field :theme, :string, default: "dark"
  end
end
"#;
        let schemas = scan(Path::new("/app/lib/my_app/settings.ex"), source);
        assert_eq!(schemas.len(), 1);
        assert!(schemas[0].table_name.is_none());
        assert_eq!(
            schemas[0].fields[0].default.as_deref(),
            Some("\"dark\"")
        );
    }
}

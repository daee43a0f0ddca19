//! `@user.address.street` のようなassignパスをスキーマの関連で辿る

use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::index::Index;
use crate::model::{Association, Component, RenderAssign, SchemaField, SchemaInfo};
use crate::parser::fallback::{is_module_name, split_args};
use crate::util::{camelize, singularize};

static STRUCT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^%([A-Z][\w.]*)\{").unwrap());
static CALL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:[A-Z][\w.]*\.)?([a-z_]\w*[!?]?)\((.*)\)").unwrap());
static IDENT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z_]\w*$").unwrap());

/// `get_user!` -> `user` のように外す関数名の接頭辞
const FUNCTION_PREFIXES: &[&str] = &[
    "get_", "list_", "fetch_", "create_", "update_", "change_", "new_", "build_", "load_",
];

/// assign の型を決める手がかり
#[derive(Debug, Clone, Copy, Default)]
pub struct AssignContext<'a> {
    /// 囲んでいる関数コンポーネント（`attr` 宣言）
    pub component: Option<&'a Component>,
    /// 編集中のファイル（コントローラーが描画するテンプレートか調べる）
    pub file: Option<&'a Path>,
}

/// パスを辿った結果
#[derive(Debug, Clone, PartialEq)]
pub enum AssociationInfo {
    /// パスが空: assign自体のスキーマ
    Schema(SchemaInfo),
    /// 最後のセグメントがフィールド
    Field {
        schema: SchemaInfo,
        field: SchemaField,
    },
    /// 最後のセグメントが関連（関連先がインデックスになければ `target` はNone）
    Association {
        schema: SchemaInfo,
        association: Association,
        target: Option<SchemaInfo>,
    },
}

impl AssociationInfo {
    /// 補完候補を出すときのスキーマ（フィールドなら持ち主）
    pub fn current_schema(&self) -> Option<&SchemaInfo> {
        match self {
            Self::Schema(schema) => Some(schema),
            Self::Field { schema, .. } => Some(schema),
            Self::Association { target, .. } => target.as_ref(),
        }
    }
}

/// assignに対応するスキーマ
///
/// 1. コンポーネントの `attr :user, MyApp.Accounts.User` 宣言
/// 2. コントローラーの `render(conn, :show, user: Accounts.get_user!(id))` で渡された式
/// 3. 命名規約（`users` -> `User`）
pub fn assign_schema(index: &Index, base_assign: &str, context: AssignContext<'_>) -> Option<SchemaInfo> {
    let base = base_assign.trim_start_matches('@');

    let declared = context
        .component
        .and_then(|c| c.find_attribute(base))
        .map(|attr| attr.attr_type.as_str())
        .filter(|t| t.starts_with(|c: char| c.is_ascii_uppercase()));
    if let Some(module) = declared {
        if let Some(schema) = index.schemas.resolve_schema_module(module) {
            return Some(schema);
        }
    }

    if let Some(file) = context.file {
        let rendered = render_assigns_for_file(index, file, context.component)
            .into_iter()
            .find(|assign| assign.name == base)
            .and_then(|assign| assign.value);
        if let Some(schema) = rendered.and_then(|value| expression_schema(index, &value)) {
            return Some(schema);
        }
    }

    schema_by_name(index, base)
}

fn schema_by_name(index: &Index, name: &str) -> Option<SchemaInfo> {
    index
        .schemas
        .resolve_schema_module(&camelize(&singularize(name)))
}

/// ファイルがコントローラーから描画されるテンプレートなら、渡される assigns
///
/// 1つのモジュールファイルに複数の関数テンプレートがある場合は、囲んでいる関数名で選ぶ。
pub fn render_assigns_for_file(
    index: &Index,
    file: &Path,
    component: Option<&Component>,
) -> Vec<RenderAssign> {
    let templates = index.templates.find_templates_for_file(file);
    let template = if templates.len() == 1 {
        templates.first()
    } else {
        component.and_then(|c| templates.iter().find(|t| t.name == c.name))
    };
    let Some(template) = template else {
        return Vec::new();
    };
    index
        .controllers
        .get_assigns_for_template(&template.module_name, &template.name)
}

/// assign に渡された式からスキーマを推定
///
/// `%User{}`、`Repo.get!(User, id)`、`Accounts.get_user!(id)`、`hd(users)`、
/// `post.author`（関連を辿る）、`user`（変数名）を扱う。
pub fn expression_schema(index: &Index, expr: &str) -> Option<SchemaInfo> {
    let expr = expr.trim();

    if let Some(caps) = STRUCT_RE.captures(expr) {
        return index.schemas.resolve_schema_module(&caps[1]);
    }

    if let Some(caps) = CALL_RE.captures(expr) {
        let args = split_args(&caps[2]);
        if let Some(module) = args.first().filter(|a| is_module_name(a)) {
            if let Some(schema) = index.schemas.resolve_schema_module(module.trim()) {
                return Some(schema);
            }
        }
        let function = caps[1].trim_end_matches(['!', '?']);
        let noun = FUNCTION_PREFIXES
            .iter()
            .find_map(|prefix| function.strip_prefix(prefix))
            .unwrap_or(function);
        if let Some(schema) = schema_by_name(index, noun) {
            return Some(schema);
        }
        return args.first().and_then(|arg| expression_schema(index, arg));
    }

    if IDENT_RE.is_match(expr) {
        return schema_by_name(index, expr);
    }

    // `post.author` は変数のスキーマから関連を辿る
    let mut segments = expr.split('.');
    let base = segments.next().filter(|b| IDENT_RE.is_match(b))?;
    let mut schema = schema_by_name(index, base)?;
    for segment in segments {
        let association = schema.find_association(segment)?;
        schema = index.schemas.resolve_schema_module(&association.target_module)?;
    }
    Some(schema)
}

/// パスの各セグメントを関連として辿る
///
/// フィールドは末尾でのみ許される。不明なセグメントがあればNone。
pub fn association_info_from_path(
    index: &Index,
    base_assign: &str,
    path: &[&str],
    context: AssignContext<'_>,
) -> Option<AssociationInfo> {
    let mut current = assign_schema(index, base_assign, context)?;
    let mut info = AssociationInfo::Schema(current.clone());

    for (i, segment) in path.iter().enumerate() {
        let last = i + 1 == path.len();
        if let Some(association) = current.find_association(segment).cloned() {
            let target = index.schemas.resolve_schema_module(&association.target_module);
            if last {
                info = AssociationInfo::Association {
                    schema: current,
                    association,
                    target,
                };
                break;
            }
            current = target?;
        } else if let Some(field) = current.find_field(segment).cloned() {
            if !last {
                return None;
            }
            info = AssociationInfo::Field {
                schema: current,
                field,
            };
            break;
        } else {
            return None;
        }
    }
    Some(info)
}

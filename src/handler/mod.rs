//! レジストリと解決層の上に乗る薄いLSPハンドラー

pub mod completion;
pub mod definition;
pub mod diagnostics;

use std::path::Path;

pub use completion::CompletionHandler;
pub use definition::DefinitionHandler;
pub use diagnostics::DiagnosticsHandler;

use crate::index::Index;
use crate::model::Component;

/// カーソル位置を含む関数コンポーネント（.ex の `~H` 内のみ）
///
/// 同じファイルで定義されたコンポーネントのうち、カーソルより前で最後に始まるもの。
pub fn enclosing_component(index: &Index, path: &Path, text: &str, offset: usize) -> Option<Component> {
    if path.extension().is_none_or(|e| e != "ex") {
        return None;
    }
    let line = text[..offset.min(text.len())].matches('\n').count() as u32 + 1;
    index
        .components
        .get_components_from_file(path)
        .into_iter()
        .filter(|c| c.line <= line)
        .max_by_key(|c| c.line)
}

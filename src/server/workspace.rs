use std::fs;
use std::path::{Path, PathBuf};

use crate::config::SourceFilter;

/// ワークスペースの .ex / .exs / .heex ファイルを集める
pub fn collect_files(root: &Path, filter: &SourceFilter) -> Vec<PathBuf> {
    let mut files = Vec::new();
    walk(root, root, filter, &mut files);
    files.sort();
    files
}

fn walk(dir: &Path, root: &Path, filter: &SourceFilter, files: &mut Vec<PathBuf>) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let relative_path = path.strip_prefix(root).unwrap_or(&path);

        if path.is_dir() {
            if filter.enters_dir(relative_path) {
                walk(&path, root, filter, files);
            }
        } else if filter.accepts_file(relative_path) {
            files.push(path);
        }
    }
}

//! ファイル単位の増分レジストリ
//!
//! 各ストアは「ファイルパス -> エンティティ列」と「ファイルパス -> 内容ハッシュ」を持つ。
//! 更新はハッシュが一致すれば何もせず、異なれば解析結果でファイル分を丸ごと置き換える。
//! 同じファイルへの更新が重なった場合は、最後に開始した更新の結果だけが残る。

use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::parser::{ParseKind, ParserGateway};
use crate::util::content_hash;

/// エンティティの種類ごとの設定
pub trait RegistryKind: Send + Sync + 'static {
    type Parse: ParseKind;
    type Entity: Clone + Serialize + DeserializeOwned + Send + Sync + 'static;

    /// ログ用の名前
    const LABEL: &'static str;

    /// このストアが扱うファイルか
    fn is_candidate(path: &Path) -> bool;

    /// 解析結果をエンティティに変換（`file_path` を補完する）
    fn into_entities(
        path: &Path,
        metadata: <Self::Parse as ParseKind>::Metadata,
    ) -> Vec<Self::Entity>;
}

/// キャッシュ用のスナップショット
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrySnapshot<T> {
    pub entries: Vec<(PathBuf, Vec<T>)>,
    pub hashes: Vec<(PathBuf, String)>,
    #[serde(default)]
    pub workspace_root: Option<PathBuf>,
}

impl<T> RegistrySnapshot<T> {
    /// 条件を満たすファイルの分だけ残す
    pub fn retain_files(&mut self, keep: impl Fn(&Path) -> bool) {
        self.entries.retain(|(path, _)| keep(path));
        self.hashes.retain(|(path, _)| keep(path));
    }
}

impl<T> Default for RegistrySnapshot<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            hashes: Vec::new(),
            workspace_root: None,
        }
    }
}

/// ファイルパスをキーにしたエンティティとハッシュの表
pub struct FileRegistry<T> {
    entries: DashMap<PathBuf, Vec<T>>,
    hashes: DashMap<PathBuf, String>,
    /// ファイルごとの更新世代（解析開始時に進める）
    generations: DashMap<PathBuf, u64>,
    workspace_root: RwLock<Option<PathBuf>>,
}

impl<T: Clone> FileRegistry<T> {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            hashes: DashMap::new(),
            generations: DashMap::new(),
            workspace_root: RwLock::new(None),
        }
    }

    pub fn hash_matches(&self, path: &Path, hash: &str) -> bool {
        self.hashes
            .get(path)
            .is_some_and(|stored| stored.value() == hash)
    }

    pub fn stored_hash(&self, path: &Path) -> Option<String> {
        self.hashes.get(path).map(|h| h.value().clone())
    }

    /// ファイル分のエンティティを置き換え、最後にハッシュを記録する
    pub fn commit(&self, path: &Path, entities: Vec<T>, hash: String) {
        self.entries.insert(path.to_path_buf(), entities);
        self.hashes.insert(path.to_path_buf(), hash);
    }

    /// 更新の開始を記録し、その世代を返す
    pub fn begin_update(&self, path: &Path) -> u64 {
        let mut generation = self.generations.entry(path.to_path_buf()).or_insert(0);
        *generation += 1;
        *generation
    }

    /// `generation` がまだ最新なら置き換える（後から始まった更新があれば破棄）
    pub fn commit_if_current(
        &self,
        path: &Path,
        generation: u64,
        entities: Vec<T>,
        hash: String,
    ) -> bool {
        // 世代の読み取りガードを保持したまま書き込み、並行する begin_update を待たせる
        let Some(current) = self.generations.get(path) else {
            return false;
        };
        if *current != generation {
            return false;
        }
        self.commit(path, entities, hash);
        true
    }

    pub fn remove_file(&self, path: &Path) -> bool {
        self.begin_update(path);
        let had_entries = self.entries.remove(path).is_some();
        let had_hash = self.hashes.remove(path).is_some();
        had_entries || had_hash
    }

    pub fn all(&self) -> Vec<T> {
        self.entries
            .iter()
            .flat_map(|entry| entry.value().clone())
            .collect()
    }

    pub fn from_file(&self, path: &Path) -> Vec<T> {
        self.entries
            .get(path)
            .map(|v| v.value().clone())
            .unwrap_or_default()
    }

    pub fn find(&self, mut predicate: impl FnMut(&T) -> bool) -> Option<T> {
        self.entries
            .iter()
            .find_map(|entry| entry.value().iter().find(|e| predicate(e)).cloned())
    }

    pub fn filter(&self, mut predicate: impl FnMut(&T) -> bool) -> Vec<T> {
        let mut result = Vec::new();
        for entry in self.entries.iter() {
            result.extend(entry.value().iter().filter(|e| predicate(e)).cloned());
        }
        result
    }

    pub fn files(&self) -> Vec<PathBuf> {
        self.entries.iter().map(|e| e.key().clone()).collect()
    }

    pub fn file_count(&self) -> usize {
        self.hashes.len()
    }

    pub fn entity_count(&self) -> usize {
        self.entries.iter().map(|e| e.value().len()).sum()
    }

    pub fn clear(&self) {
        self.entries.clear();
        self.hashes.clear();
    }

    pub fn set_workspace_root(&self, root: &Path) {
        let mut guard = self
            .workspace_root
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = Some(root.to_path_buf());
    }

    pub fn workspace_root(&self) -> Option<PathBuf> {
        self.workspace_root
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn snapshot(&self) -> RegistrySnapshot<T> {
        let mut entries: Vec<(PathBuf, Vec<T>)> = self
            .entries
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        let mut hashes: Vec<(PathBuf, String)> = self
            .hashes
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        hashes.sort_by(|a, b| a.0.cmp(&b.0));
        RegistrySnapshot {
            entries,
            hashes,
            workspace_root: self.workspace_root(),
        }
    }

    /// スナップショットで内容を置き換える
    pub fn restore(&self, snapshot: RegistrySnapshot<T>) {
        self.clear();
        for (path, entities) in snapshot.entries {
            self.entries.insert(path, entities);
        }
        for (path, hash) in snapshot.hashes {
            self.hashes.insert(path, hash);
        }
        if let Some(root) = snapshot.workspace_root {
            self.set_workspace_root(&root);
        }
    }
}

impl<T: Clone> Default for FileRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// 種類 `K` のエンティティを保持するストア
pub struct Store<K: RegistryKind> {
    registry: Arc<FileRegistry<K::Entity>>,
    _kind: PhantomData<K>,
}

impl<K: RegistryKind> Store<K> {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(FileRegistry::new()),
            _kind: PhantomData,
        }
    }

    pub fn registry(&self) -> &FileRegistry<K::Entity> {
        &self.registry
    }

    pub fn is_candidate(&self, path: &Path) -> bool {
        K::is_candidate(path)
    }

    /// エディタ上の内容でファイルを更新（変更がなければ解析しない）
    ///
    /// 戻り値は内容が変わって再解析したかどうか。
    pub async fn update_file(&self, gateway: &ParserGateway, path: &Path, content: &str) -> bool {
        let generation = self.registry.begin_update(path);
        let hash = content_hash(content);
        if self.registry.hash_matches(path, &hash) {
            return false;
        }
        let parsed = gateway.parse::<K::Parse>(path, content).await;
        let entities = K::into_entities(path, parsed.metadata);
        debug!(
            "{}: {} entities from {} ({:?})",
            K::LABEL,
            entities.len(),
            path.display(),
            parsed.strategy
        );
        if !self.registry.commit_if_current(path, generation, entities, hash) {
            debug!("{}: discarded superseded update of {}", K::LABEL, path.display());
            return false;
        }
        true
    }

    pub fn remove_file(&self, path: &Path) -> bool {
        self.registry.remove_file(path)
    }

    /// ワークスペースの候補ファイルを並行して解析
    pub async fn scan_workspace(
        &self,
        gateway: &Arc<ParserGateway>,
        root: &Path,
        files: &[PathBuf],
    ) -> usize {
        self.registry.set_workspace_root(root);

        let mut tasks = JoinSet::new();
        for path in files.iter().filter(|p| K::is_candidate(p)) {
            let registry = Arc::clone(&self.registry);
            let gateway = Arc::clone(gateway);
            let path = path.clone();
            tasks.spawn(async move { scan_file::<K>(&registry, &gateway, &path).await });
        }

        let mut scanned = 0;
        while let Some(result) = tasks.join_next().await {
            match result {
                Ok(true) => scanned += 1,
                Ok(false) => {}
                Err(e) => warn!("{} scan task failed: {}", K::LABEL, e),
            }
        }

        info!(
            "{}: scanned {} files, {} entities",
            K::LABEL,
            scanned,
            self.registry.entity_count()
        );
        scanned
    }

    pub fn snapshot(&self) -> RegistrySnapshot<K::Entity> {
        self.registry.snapshot()
    }

    pub fn restore(&self, snapshot: RegistrySnapshot<K::Entity>) {
        self.registry.restore(snapshot);
    }

    pub fn clear(&self) {
        self.registry.clear();
    }
}

impl<K: RegistryKind> Default for Store<K> {
    fn default() -> Self {
        Self::new()
    }
}

/// ディスク上のファイルを解析して登録（読めなければfalse）
async fn scan_file<K: RegistryKind>(
    registry: &FileRegistry<K::Entity>,
    gateway: &ParserGateway,
    path: &Path,
) -> bool {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) => {
            debug!("Failed to read {}: {}", path.display(), e);
            return false;
        }
    };
    let generation = registry.begin_update(path);
    let hash = content_hash(&content);
    if registry.hash_matches(path, &hash) {
        return true;
    }
    let parsed = gateway.parse_file::<K::Parse>(path, &content).await;
    registry.commit_if_current(path, generation, K::into_entities(path, parsed.metadata), hash);
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commit_replaces_whole_file() {
        let registry: FileRegistry<String> = FileRegistry::new();
        let path = Path::new("/app/lib/a.ex");
        registry.commit(path, vec!["a".into(), "b".into()], "h1".into());
        registry.commit(path, vec![], "h2".into());

        assert!(registry.from_file(path).is_empty());
        assert!(registry.hash_matches(path, "h2"));
        assert_eq!(registry.file_count(), 1);
    }

    #[test]
    fn test_snapshot_restore() {
        let registry: FileRegistry<String> = FileRegistry::new();
        registry.set_workspace_root(Path::new("/app"));
        registry.commit(Path::new("/app/lib/a.ex"), vec!["a".into()], "h1".into());

        let snapshot = registry.snapshot();
        let restored: FileRegistry<String> = FileRegistry::new();
        restored.restore(snapshot);

        assert_eq!(restored.all(), vec!["a".to_string()]);
        assert_eq!(restored.stored_hash(Path::new("/app/lib/a.ex")).as_deref(), Some("h1"));
        assert_eq!(restored.workspace_root(), Some(PathBuf::from("/app")));
    }

    #[test]
    fn test_superseded_generation_is_discarded() {
        let registry: FileRegistry<&str> = FileRegistry::new();
        let path = Path::new("/app/lib/a.ex");
        let old = registry.begin_update(path);
        let new = registry.begin_update(path);

        assert!(registry.commit_if_current(path, new, vec!["new"], "h2".into()));
        assert!(!registry.commit_if_current(path, old, vec!["old"], "h1".into()));
        assert_eq!(registry.from_file(path), vec!["new"]);
        assert!(registry.hash_matches(path, "h2"));
    }

    #[test]
    fn test_remove_discards_in_flight_update() {
        let registry: FileRegistry<u32> = FileRegistry::new();
        let path = Path::new("/app/lib/a.ex");
        let generation = registry.begin_update(path);
        registry.remove_file(path);

        assert!(!registry.commit_if_current(path, generation, vec![1], "h".into()));
        assert_eq!(registry.file_count(), 0);
    }

    #[test]
    fn test_remove_file() {
        let registry: FileRegistry<u32> = FileRegistry::new();
        let path = Path::new("/app/lib/a.ex");
        registry.commit(path, vec![1], "h".into());
        assert!(registry.remove_file(path));
        assert!(!registry.remove_file(path));
        assert_eq!(registry.entity_count(), 0);
    }
}

use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;

/// キーごとに連続した呼び出しをまとめる
///
/// `run` は待ち時間の間に同じキーで新しい呼び出しがなかった場合だけタスクを実行する。
/// 待ち時間 0 では即座に実行する（テスト用）。
/// 表には待機中・実行中のキーだけが残る。バージョンは全キー共通で単調増加する。
pub struct Debouncer<K> {
    delay: Duration,
    versions: Arc<DashMap<K, u64>>,
    next_version: Arc<AtomicU64>,
}

impl<K> Clone for Debouncer<K> {
    fn clone(&self) -> Self {
        Self {
            delay: self.delay,
            versions: Arc::clone(&self.versions),
            next_version: Arc::clone(&self.next_version),
        }
    }
}

impl<K: Eq + Hash + Clone> Debouncer<K> {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            versions: Arc::new(DashMap::new()),
            next_version: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// 同じ表を共有したまま待ち時間だけ変える
    pub fn with_delay(&self, delay: Duration) -> Self {
        Self {
            delay,
            versions: Arc::clone(&self.versions),
            next_version: Arc::clone(&self.next_version),
        }
    }

    fn bump(&self, key: &K) -> u64 {
        let version = self.next_version.fetch_add(1, Ordering::SeqCst) + 1;
        self.versions.insert(key.clone(), version);
        version
    }

    /// 待機中・実行中のキーの数
    pub fn pending(&self) -> usize {
        self.versions.len()
    }

    /// 実行されたらtrue、新しい呼び出しに置き換えられたらfalse
    pub async fn run<F>(&self, key: K, task: F) -> bool
    where
        F: Future<Output = ()>,
    {
        let version = self.bump(&key);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
            if self.versions.get(&key).map(|v| *v) != Some(version) {
                return false;
            }
        }
        task.await;
        self.versions.remove_if(&key, |_, current| *current == version);
        true
    }

    /// 待機中の呼び出しを破棄
    pub fn cancel(&self, key: &K) {
        self.versions.remove(key);
    }
}

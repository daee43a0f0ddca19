use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::Semaphore;

/// 外部パーサープロセスの同時実行数を制限する
///
/// `tokio::sync::Semaphore` は待機者をFIFOで起こすため、先に並んだタスクから実行される。
/// 許可はタスク終了時（成功・失敗・パニックを問わず）に解放される。
pub struct ConcurrencyLimiter {
    semaphore: Semaphore,
    max_concurrent: usize,
    running: AtomicUsize,
    queued: AtomicUsize,
}

impl ConcurrencyLimiter {
    pub fn new(max_concurrent: usize) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            semaphore: Semaphore::new(max_concurrent),
            max_concurrent,
            running: AtomicUsize::new(0),
            queued: AtomicUsize::new(0),
        }
    }

    pub async fn run<F, T>(&self, task: F) -> T
    where
        F: Future<Output = T>,
    {
        self.queued.fetch_add(1, Ordering::SeqCst);
        // セマフォは閉じないのでErrにはならない
        let permit = self.semaphore.acquire().await.ok();
        self.queued.fetch_sub(1, Ordering::SeqCst);

        let _slot = RunningSlot::enter(&self.running);
        let output = task.await;
        drop(permit);
        output
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    pub fn running(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }

    pub fn queued(&self) -> usize {
        self.queued.load(Ordering::SeqCst)
    }
}

impl Default for ConcurrencyLimiter {
    fn default() -> Self {
        Self::new(10)
    }
}

/// 実行中カウンタ（dropで必ず減算）
struct RunningSlot<'a> {
    counter: &'a AtomicUsize,
}

impl<'a> RunningSlot<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self { counter }
    }
}

impl Drop for RunningSlot<'_> {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::Mutex;
    use std::time::Duration;

    #[tokio::test]
    async fn test_never_exceeds_limit() {
        let limiter = Arc::new(ConcurrencyLimiter::new(3));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..20 {
            let limiter = Arc::clone(&limiter);
            let peak = Arc::clone(&peak);
            handles.push(tokio::spawn(async move {
                limiter
                    .run(async {
                        peak.fetch_max(limiter.running(), Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(5)).await;
                    })
                    .await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert_eq!(limiter.running(), 0);
        assert_eq!(limiter.queued(), 0);
    }

    #[tokio::test]
    async fn test_failed_task_releases_slot() {
        let limiter = ConcurrencyLimiter::new(1);
        let failed: Result<(), String> = limiter.run(async { Err("boom".to_string()) }).await;
        assert!(failed.is_err());

        let ok = limiter.run(async { 42 }).await;
        assert_eq!(ok, 42);
        assert_eq!(limiter.running(), 0);
    }

    #[tokio::test]
    async fn test_waiters_run_in_fifo_order() {
        let limiter = Arc::new(ConcurrencyLimiter::new(1));
        let order = Arc::new(Mutex::new(Vec::new()));
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();

        let blocker = {
            let limiter = Arc::clone(&limiter);
            tokio::spawn(async move {
                limiter
                    .run(async {
                        let _ = release_rx.await;
                    })
                    .await;
            })
        };
        while limiter.running() == 0 {
            tokio::task::yield_now().await;
        }

        let mut handles = Vec::new();
        for i in 0..5 {
            let waiter = Arc::clone(&limiter);
            let order = Arc::clone(&order);
            handles.push(tokio::spawn(async move {
                waiter.run(async { order.lock().unwrap().push(i) }).await;
            }));
            while limiter.queued() < i + 1 {
                tokio::task::yield_now().await;
            }
        }

        release_tx.send(()).unwrap();
        blocker.await.unwrap();
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }
}

//! A lazily-allocated async mutex per repo URL.

use parking_lot::Mutex as SyncMutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Serializes every mutating operation on a repo URL (allocate, prepare,
/// dispose, sync). Non-mutating status polls must not go through this.
#[derive(Default)]
pub struct RepoLockMap {
    locks: SyncMutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl RepoLockMap {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, repo_url: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock();
        locks.entry(repo_url.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    /// Acquire the lock for `repo_url`, holding it until the returned guard drops.
    pub async fn acquire(&self, repo_url: &str) -> OwnedMutexGuard<()> {
        let lock = self.lock_for(repo_url);
        lock.lock_owned().await
    }

    /// Non-blocking check used by the periodic reconciler: a repo currently
    /// held by a mutating operation is skipped on this tick rather than
    /// waited on.
    pub fn is_locked(&self, repo_url: &str) -> bool {
        let lock = self.lock_for(repo_url);
        lock.try_lock().is_err()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn same_url_serializes() {
        let map = Arc::new(RepoLockMap::new());
        let order = Arc::new(SyncMutex::new(Vec::new()));

        let map1 = map.clone();
        let order1 = order.clone();
        let first = tokio::spawn(async move {
            let _guard = map1.acquire("repo-a").await;
            tokio::time::sleep(std::time::Duration::from_millis(30)).await;
            order1.lock().push(1);
        });

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;

        let map2 = map.clone();
        let order2 = order.clone();
        let second = tokio::spawn(async move {
            let _guard = map2.acquire("repo-a").await;
            order2.lock().push(2);
        });

        first.await.unwrap();
        second.await.unwrap();
        assert_eq!(*order.lock(), vec![1, 2]);
    }

    #[tokio::test]
    async fn distinct_urls_do_not_block_each_other() {
        let map = RepoLockMap::new();
        let guard_a = map.acquire("repo-a").await;
        let guard_b_fut = map.acquire("repo-b");
        let guard_b = tokio::time::timeout(std::time::Duration::from_millis(100), guard_b_fut)
            .await
            .expect("distinct urls must not block");
        drop(guard_a);
        drop(guard_b);
    }
}

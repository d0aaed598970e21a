//! Per-path writer locks.
//!
//! Ingestion of one path holds that path's lock; a purge batch holds the
//! locks of every path it touches. Paths that nobody is writing have no
//! entry, so readers never touch this table.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

#[derive(Default)]
pub struct PathLocks {
    inner: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

/// Guards held for a set of paths. Dropping releases them.
pub struct PathGuard {
    _guards: Vec<OwnedMutexGuard<()>>,
}

impl PathLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, path: &str) -> Arc<AsyncMutex<()>> {
        let mut map = match self.inner.lock() {
            Ok(map) => map,
            Err(poisoned) => poisoned.into_inner(),
        };
        // Drop entries nobody holds so the table tracks live writers only.
        map.retain(|_, lock| Arc::strong_count(lock) > 1);
        map.entry(path.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    pub async fn lock(&self, path: &str) -> PathGuard {
        let guard = self.entry(path).lock_owned().await;
        PathGuard {
            _guards: vec![guard],
        }
    }

    /// Lock several paths. Acquisition is in sorted order so two batches
    /// with overlapping paths cannot deadlock.
    pub async fn lock_many<I, S>(&self, paths: I) -> PathGuard
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let sorted: BTreeSet<String> = paths.into_iter().map(|p| p.as_ref().to_string()).collect();
        let mut guards = Vec::with_capacity(sorted.len());
        for path in &sorted {
            guards.push(self.entry(path).lock_owned().await);
        }
        PathGuard { _guards: guards }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_path_is_exclusive() {
        let locks = Arc::new(PathLocks::new());
        let guard = locks.lock("a.md").await;

        let l2 = locks.clone();
        let waiter = tokio::spawn(async move {
            let _g = l2.lock("a.md").await;
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(2), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn different_paths_do_not_block() {
        let locks = PathLocks::new();
        let _a = locks.lock("a.md").await;
        let b = tokio::time::timeout(Duration::from_secs(1), locks.lock("b.md")).await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn lock_many_accepts_duplicates() {
        let locks = PathLocks::new();
        let guard = locks.lock_many(["b.md", "a.md", "b.md"]).await;
        assert_eq!(guard._guards.len(), 2);
    }
}

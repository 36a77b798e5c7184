//! Shared, versioned configuration with change notification.
//!
//! Long-running processors hold a [`ConfigStore`] and a [`ConfigWatcher`];
//! a reload replaces the value and wakes every watcher.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{RwLock, RwLockReadGuard, watch};

pub struct ConfigStore<T> {
    inner: Arc<Shared<T>>,
}

struct Shared<T> {
    value: RwLock<T>,
    version: AtomicU64,
    notify: watch::Sender<u64>,
}

/// Wakes up after each [`ConfigStore::update`].
pub struct ConfigWatcher {
    rx: watch::Receiver<u64>,
}

impl<T> ConfigStore<T> {
    pub fn new(initial: T) -> Self {
        let (notify, _) = watch::channel(0u64);
        Self {
            inner: Arc::new(Shared {
                value: RwLock::new(initial),
                version: AtomicU64::new(0),
                notify,
            }),
        }
    }

    /// Swap in `value` and notify watchers.
    pub async fn update(&self, value: T) {
        {
            let mut guard = self.inner.value.write().await;
            *guard = value;
        }
        // Guard released first so woken watchers can read right away.
        let version = self.inner.version.fetch_add(1, Ordering::Relaxed) + 1;
        let _ = self.inner.notify.send(version);
    }

    pub async fn read(&self) -> RwLockReadGuard<'_, T> {
        self.inner.value.read().await
    }

    pub fn version(&self) -> u64 {
        self.inner.version.load(Ordering::Relaxed)
    }

    pub fn subscribe(&self) -> ConfigWatcher {
        ConfigWatcher {
            rx: self.inner.notify.subscribe(),
        }
    }
}

impl<T> Clone for ConfigStore<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl ConfigWatcher {
    /// Resolves on the next update; errors once the store is gone.
    pub async fn changed(&mut self) -> Result<(), watch::error::RecvError> {
        self.rx.changed().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn update_wakes_watcher_and_bumps_version() {
        let store = ConfigStore::new(1u32);
        let mut watcher = store.subscribe();

        let writer = store.clone();
        tokio::spawn(async move { writer.update(2).await });

        tokio::time::timeout(Duration::from_secs(1), watcher.changed())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(*store.read().await, 2);
        assert_eq!(store.version(), 1);
    }

    #[tokio::test]
    async fn watcher_errors_after_store_dropped() {
        let store = ConfigStore::new(());
        let mut watcher = store.subscribe();
        drop(store);
        assert!(watcher.changed().await.is_err());
    }
}

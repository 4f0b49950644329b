/// Per-tab serialization of read-modify-write sequences
///
/// Event handlers interleave at every await point. Two handlers touching the
/// same tab record would otherwise race, so each tab id gets its own async
/// mutex. Unrelated tabs never wait on each other.
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::tab_data::TabId;

#[derive(Default)]
pub struct TabLocks {
    locks: RefCell<HashMap<TabId, Arc<Mutex<()>>>>,
}

impl TabLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to one tab's record
    pub async fn lock(&self, id: TabId) -> OwnedMutexGuard<()> {
        let mutex = self
            .locks
            .borrow_mut()
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        mutex.lock_owned().await
    }

    /// Forget the lock of a closed tab once nobody holds or awaits it
    pub fn release(&self, id: TabId) {
        let mut locks = self.locks.borrow_mut();
        if locks.get(&id).is_some_and(|m| Arc::strong_count(m) == 1) {
            locks.remove(&id);
        }
    }

    pub fn len(&self) -> usize {
        self.locks.borrow().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_same_tab_is_exclusive() {
        let locks = TabLocks::new();
        let guard = locks.lock(1).await;

        let mutex = locks.locks.borrow().get(&1).cloned().unwrap();
        assert!(mutex.try_lock().is_err());

        drop(guard);
        assert!(mutex.try_lock().is_ok());
    }

    #[tokio::test]
    async fn test_different_tabs_do_not_block() {
        let locks = TabLocks::new();
        let _first = locks.lock(1).await;
        let _second = locks.lock(2).await;

        assert_eq!(locks.len(), 2);
    }

    #[tokio::test]
    async fn test_release_only_when_unused() {
        let locks = TabLocks::new();
        let guard = locks.lock(5).await;

        locks.release(5);
        assert_eq!(locks.len(), 1);

        drop(guard);
        locks.release(5);
        assert_eq!(locks.len(), 0);
    }
}

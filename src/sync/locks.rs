//! Lock helpers shared by the engine.
//!
//! `KeyedLocks` serializes work per key (an external id) so two reconciliations of the same
//! external record never interleave their find-then-save sequence. Entries are removed once the
//! last holder or waiter lets go.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::OwnedMutexGuard;

/// Lock a std mutex, recovering the data if a previous holder panicked.
pub(crate) fn guard<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

type Slots = Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>;

/// A set of async mutexes addressed by string key
#[derive(Clone, Default)]
pub struct KeyedLocks {
    slots: Slots,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`
    pub async fn lock(&self, key: &str) -> KeyedGuard {
        let slot = guard(&self.slots)
            .entry(key.to_string())
            .or_default()
            .clone();
        let held = slot.clone().lock_owned().await;

        KeyedGuard {
            key: key.to_string(),
            held: Some(held),
            slot,
            slots: self.slots.clone(),
        }
    }

    /// Number of keys currently held or awaited
    #[cfg(test)]
    pub fn len(&self) -> usize {
        guard(&self.slots).len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Exclusive access to one key, released on drop
pub struct KeyedGuard {
    key: String,
    held: Option<OwnedMutexGuard<()>>,
    slot: Arc<tokio::sync::Mutex<()>>,
    slots: Slots,
}

impl Drop for KeyedGuard {
    fn drop(&mut self) {
        self.held.take();
        let mut slots = guard(&self.slots);
        // One reference in the map, one here: nobody else is waiting.
        if Arc::strong_count(&self.slot) == 2 {
            slots.remove(&self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_key_is_serialized() {
        let locks = KeyedLocks::new();
        let inside = Arc::new(AtomicU32::new(0));
        let overlaps = Arc::new(AtomicU32::new(0));

        let tasks: Vec<_> = (0..4)
            .map(|_| {
                let locks = locks.clone();
                let inside = inside.clone();
                let overlaps = overlaps.clone();
                tokio::spawn(async move {
                    let _guard = locks.lock("ext-1").await;
                    if inside.fetch_add(1, Ordering::SeqCst) > 0 {
                        overlaps.fetch_add(1, Ordering::SeqCst);
                    }
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    inside.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();

        for task in tasks {
            task.await.expect("Failed while joining task");
        }

        assert_eq!(overlaps.load(Ordering::SeqCst), 0);
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_different_keys_do_not_block() {
        let locks = KeyedLocks::new();
        let _first = locks.lock("ext-1").await;
        let second = tokio::time::timeout(Duration::from_millis(100), locks.lock("ext-2")).await;

        assert!(second.is_ok());
        assert_eq!(locks.len(), 2);
    }
}

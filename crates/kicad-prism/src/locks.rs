//! Per-key mutual exclusion.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};

/// A table of mutexes created on first use, one per key.
///
/// Work under different keys never contends; work under the same key is
/// totally ordered. The table lock is only held while looking up the entry.
#[derive(Debug, Default)]
pub struct KeyedLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, key: &str) -> Arc<Mutex<()>> {
        let mut locks = match self.locks.lock() {
            Ok(g) => g,
            Err(poisoned) => {
                log::warn!("Keyed lock table was poisoned, recovering");
                poisoned.into_inner()
            }
        };
        Arc::clone(locks.entry(key.to_string()).or_default())
    }

    /// Runs `f` while holding the lock for `key`, waiting if necessary.
    pub fn with_lock<T>(&self, key: &str, f: impl FnOnce() -> T) -> T {
        let lock = self.entry(key);
        let _guard = recover(lock.lock(), key);
        f()
    }

    /// Runs `f` only if the lock for `key` is free; returns `None` otherwise.
    pub fn try_with_lock<T>(&self, key: &str, f: impl FnOnce() -> T) -> Option<T> {
        let lock = self.entry(key);
        let _guard = match lock.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poisoned)) => {
                log::warn!("Lock for '{}' was poisoned, recovering", key);
                poisoned.into_inner()
            }
            Err(TryLockError::WouldBlock) => return None,
        };
        Some(f())
    }

    /// Number of keys seen so far.
    pub fn len(&self) -> usize {
        match self.locks.lock() {
            Ok(g) => g.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn recover<'a>(
    result: Result<MutexGuard<'a, ()>, std::sync::PoisonError<MutexGuard<'a, ()>>>,
    key: &str,
) -> MutexGuard<'a, ()> {
    match result {
        Ok(guard) => guard,
        Err(poisoned) => {
            log::warn!("Lock for '{}' was poisoned, recovering", key);
            poisoned.into_inner()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn test_same_key_is_serialized() {
        let locks = Arc::new(KeyedLocks::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let locks = Arc::clone(&locks);
                let inside = Arc::clone(&inside);
                let max_seen = Arc::clone(&max_seen);
                std::thread::spawn(move || {
                    locks.with_lock("board", || {
                        let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                        max_seen.fetch_max(now, Ordering::SeqCst);
                        std::thread::sleep(Duration::from_millis(5));
                        inside.fetch_sub(1, Ordering::SeqCst);
                    })
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
        assert_eq!(locks.len(), 1);
    }

    #[test]
    fn test_try_with_lock_reports_busy_key_only() {
        let locks = KeyedLocks::new();
        locks.with_lock("a", || {
            assert!(locks.try_with_lock("a", || ()).is_none());
            assert_eq!(locks.try_with_lock("b", || 7), Some(7));
        });
        assert_eq!(locks.try_with_lock("a", || 1), Some(1));
    }
}

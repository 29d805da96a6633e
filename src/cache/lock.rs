use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::warn;

/// Acquire a read guard, taking over the state if a writer panicked.
pub(crate) fn read_or_recover<'a, T>(
    lock: &'a RwLock<T>,
    op: &'static str,
) -> RwLockReadGuard<'a, T> {
    lock.read()
        .unwrap_or_else(|poisoned| recover(poisoned, "rwlock.read", op))
}

/// Acquire a write guard, taking over the state if a writer panicked.
pub(crate) fn write_or_recover<'a, T>(
    lock: &'a RwLock<T>,
    op: &'static str,
) -> RwLockWriteGuard<'a, T> {
    lock.write()
        .unwrap_or_else(|poisoned| recover(poisoned, "rwlock.write", op))
}

fn recover<G>(poisoned: PoisonError<G>, lock_kind: &'static str, op: &'static str) -> G {
    warn!(
        target = "dishdash::cache::lock",
        op,
        lock_kind,
        result = "poisoned_recovered",
        "Recovered from poisoned cache lock"
    );
    poisoned.into_inner()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn recovers_after_panicking_writer() {
        let lock = Arc::new(RwLock::new(1_u32));
        let clone = Arc::clone(&lock);
        let _ = std::thread::spawn(move || {
            let _guard = clone.write().unwrap();
            panic!("poison");
        })
        .join();

        assert!(lock.is_poisoned());
        *write_or_recover(&lock, "test") += 1;
        assert_eq!(*read_or_recover(&lock, "test"), 2);
    }
}

//! TTL-based lock table.
//!
//! Locks are keyed by arbitrary strings and are independent of the value
//! store's versioning. Expiry is lazy: an expired lock is treated as absent
//! on the next acquire attempt, with no background sweep. Locks are not
//! reentrant — acquiring a held, unexpired lock fails even for the holder.

use std::collections::HashMap;

/// Outcome of an acquire attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AcquireOutcome {
    /// The lock was granted; it expires at the given timestamp.
    Granted { expires_at: f64 },
    /// The lock is held by someone; it expires at the given timestamp.
    Held { expires_at: f64 },
}

/// Node-local lock table: key -> expiry timestamp (epoch seconds).
#[derive(Debug, Default)]
pub struct LockTable {
    locks: HashMap<String, f64>,
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to acquire a lock for `ttl_sec` seconds, evaluated at `now`.
    /// An expired entry is evicted here rather than by a sweep.
    pub fn acquire(&mut self, key: &str, ttl_sec: f64, now: f64) -> AcquireOutcome {
        if let Some(&expires_at) = self.locks.get(key) {
            if now < expires_at {
                return AcquireOutcome::Held { expires_at };
            }
        }
        let expires_at = now + ttl_sec;
        self.locks.insert(key.to_string(), expires_at);
        AcquireOutcome::Granted { expires_at }
    }

    /// Release a lock. Idempotent: releasing an absent or expired lock is
    /// not an error.
    pub fn release(&mut self, key: &str) {
        self.locks.remove(key);
    }

    /// Number of entries (live or expired-but-unevicted).
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_free_lock() {
        let mut t = LockTable::new();
        let outcome = t.acquire("delivery:1", 30.0, 100.0);
        assert_eq!(outcome, AcquireOutcome::Granted { expires_at: 130.0 });
    }

    #[test]
    fn test_acquire_held_lock_fails() {
        let mut t = LockTable::new();
        t.acquire("k", 30.0, 100.0);
        let outcome = t.acquire("k", 30.0, 110.0);
        assert_eq!(outcome, AcquireOutcome::Held { expires_at: 130.0 });
    }

    #[test]
    fn test_locks_are_not_reentrant() {
        // Even the "same caller" gets a rejection; the table has no notion
        // of holders.
        let mut t = LockTable::new();
        t.acquire("k", 30.0, 100.0);
        assert!(matches!(
            t.acquire("k", 30.0, 100.0),
            AcquireOutcome::Held { .. }
        ));
    }

    #[test]
    fn test_expired_lock_is_reacquirable() {
        let mut t = LockTable::new();
        t.acquire("k", 10.0, 100.0);
        // TTL elapsed
        let outcome = t.acquire("k", 10.0, 110.0);
        assert_eq!(outcome, AcquireOutcome::Granted { expires_at: 120.0 });
    }

    #[test]
    fn test_release_is_idempotent() {
        let mut t = LockTable::new();
        t.acquire("k", 30.0, 100.0);
        t.release("k");
        t.release("k"); // absent: still fine
        assert!(t.is_empty());

        // Freed lock is immediately reacquirable
        assert!(matches!(
            t.acquire("k", 30.0, 101.0),
            AcquireOutcome::Granted { .. }
        ));
    }

    #[test]
    fn test_independent_keys() {
        let mut t = LockTable::new();
        t.acquire("a", 30.0, 100.0);
        assert!(matches!(
            t.acquire("b", 30.0, 100.0),
            AcquireOutcome::Granted { .. }
        ));
        assert_eq!(t.len(), 2);
    }
}

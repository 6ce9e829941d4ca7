//! Per-key build claims

use parking_lot::{Condvar, Mutex};
use std::collections::HashSet;

/// Keys currently being built. A claim covers a whole set of keys and is
/// taken all at once, so callers never hold part of a set while waiting for
/// the rest.
///
/// Claims block the calling thread. Take them before handing work to the
/// build pool, never from inside it: a pool worker that blocks here can be
/// the one the claim holder is waiting on.
#[derive(Debug, Default)]
pub struct KeyedLocks {
    in_flight: Mutex<HashSet<String>>,
    released: Condvar,
}

/// Keys held by one caller; released on drop
#[derive(Debug)]
pub struct KeyClaim<'a> {
    owner: &'a KeyedLocks,
    keys: Vec<String>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until none of `keys` is claimed, then claim all of them
    pub fn claim(&self, keys: &[String]) -> KeyClaim<'_> {
        let mut in_flight = self.in_flight.lock();
        while keys.iter().any(|k| in_flight.contains(k)) {
            self.released.wait(&mut in_flight);
        }
        let mut held = Vec::with_capacity(keys.len());
        for key in keys {
            if in_flight.insert(key.clone()) {
                held.push(key.clone());
            }
        }
        KeyClaim {
            owner: self,
            keys: held,
        }
    }

    pub fn is_claimed(&self, key: &str) -> bool {
        self.in_flight.lock().contains(key)
    }
}

impl KeyClaim<'_> {
    pub fn keys(&self) -> &[String] {
        &self.keys
    }
}

impl Drop for KeyClaim<'_> {
    fn drop(&mut self) {
        let mut in_flight = self.owner.in_flight.lock();
        for key in &self.keys {
            in_flight.remove(key);
        }
        drop(in_flight);
        self.owner.released.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn keys(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_same_key_is_serialised() {
        let locks = KeyedLocks::new();
        let inside = AtomicUsize::new(0);
        let max_seen = AtomicUsize::new(0);
        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    let _claim = locks.claim(&keys(&["m"]));
                    let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    max_seen.fetch_max(now, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(2));
                    inside.fetch_sub(1, Ordering::SeqCst);
                });
            }
        });
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
        assert!(!locks.is_claimed("m"));
    }

    #[test]
    fn test_overlapping_sets_do_not_deadlock() {
        let locks = KeyedLocks::new();
        let done = AtomicUsize::new(0);
        std::thread::scope(|s| {
            for i in 0..8 {
                let locks = &locks;
                let done = &done;
                s.spawn(move || {
                    let set = if i % 2 == 0 { keys(&["a", "b"]) } else { keys(&["b", "a"]) };
                    let claim = locks.claim(&set);
                    assert_eq!(claim.keys().len(), 2);
                    std::thread::sleep(Duration::from_millis(1));
                    done.fetch_add(1, Ordering::SeqCst);
                });
            }
        });
        assert_eq!(done.load(Ordering::SeqCst), 8);
    }

    #[test]
    fn test_duplicate_keys_in_one_claim() {
        let locks = KeyedLocks::new();
        {
            let claim = locks.claim(&keys(&["x", "x"]));
            assert_eq!(claim.keys(), &["x".to_string()]);
            assert!(locks.is_claimed("x"));
        }
        assert!(!locks.is_claimed("x"));
    }
}

//! In-process keyed mutual exclusion
//!
//! Serializes logical operations that span multiple awaited steps (e.g.
//! "add these tracks to the playlist", which does several sequential
//! metadata lookups) so two concurrent requests for the same room do not
//! interleave their multi-step mutations. At most one guard is live per key
//! at any instant; waiters acquire strictly in FIFO arrival order.
//!
//! This primitive coordinates only within one process. Running multiple
//! instances requires sharding rooms to a single owning instance.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;

/// Per-key state; presence of an entry means the key is held
struct KeyState {
    waiters: VecDeque<oneshot::Sender<()>>,
}

/// Keyed mutex with optional FIFO waiting
#[derive(Clone, Default)]
pub struct KeyedMutex {
    keys: Arc<Mutex<HashMap<String, KeyState>>>,
}

/// Exclusive hold on a key; releasing wakes the head waiter
///
/// The wake crosses a oneshot channel, so the successor resumes on its own
/// task when next polled rather than running inside the releaser's stack.
pub struct KeyGuard {
    keys: Arc<Mutex<HashMap<String, KeyState>>>,
    key: String,
}

impl KeyedMutex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire `key`, waiting in FIFO order if it is held
    pub async fn acquire(&self, key: &str) -> KeyGuard {
        loop {
            let rx = {
                let mut keys = self.keys.lock().unwrap();
                match keys.get_mut(key) {
                    None => {
                        keys.insert(
                            key.to_string(),
                            KeyState {
                                waiters: VecDeque::new(),
                            },
                        );
                        return KeyGuard {
                            keys: Arc::clone(&self.keys),
                            key: key.to_string(),
                        };
                    }
                    Some(state) => {
                        let (tx, rx) = oneshot::channel();
                        state.waiters.push_back(tx);
                        rx
                    }
                }
            };

            // A successful recv transfers the hold to this waiter; the map
            // entry stays in place. Err means our sender was dropped in a
            // release race, so go around and contend again.
            if rx.await.is_ok() {
                return KeyGuard {
                    keys: Arc::clone(&self.keys),
                    key: key.to_string(),
                };
            }
        }
    }

    /// Acquire `key` only if it is free; `None` is the normal
    /// "conflict, try again" outcome, not an error
    pub fn try_acquire(&self, key: &str) -> Option<KeyGuard> {
        let mut keys = self.keys.lock().unwrap();
        if keys.contains_key(key) {
            return None;
        }
        keys.insert(
            key.to_string(),
            KeyState {
                waiters: VecDeque::new(),
            },
        );
        Some(KeyGuard {
            keys: Arc::clone(&self.keys),
            key: key.to_string(),
        })
    }

    /// Whether `key` is currently held (diagnostics only; racy by nature)
    pub fn is_held(&self, key: &str) -> bool {
        self.keys.lock().unwrap().contains_key(key)
    }
}

impl Drop for KeyGuard {
    fn drop(&mut self) {
        let mut keys = self.keys.lock().unwrap();
        let Some(state) = keys.get_mut(&self.key) else {
            return;
        };

        // Hand off to the first waiter still listening. A waiter whose
        // future was cancelled dropped its receiver; skip it and wake the
        // next. No live waiters: the entry is garbage-collected.
        while let Some(tx) = state.waiters.pop_front() {
            if tx.send(()).is_ok() {
                return;
            }
        }
        keys.remove(&self.key);
    }
}

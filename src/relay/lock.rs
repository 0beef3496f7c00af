//! Execution locks.
//!
//! One slot per job (each watcher, each wrap executor). A slot is either idle
//! or held by exactly one [`LockGuard`]; dropping the guard frees the slot.
//! Holders call [`LockGuard::refresh`] whenever they make progress. A slot
//! without progress for longer than the TTL is reclaimed by the next acquirer,
//! and the stale holder learns it lost the slot on its next refresh.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::intent::Direction;
use crate::monitor::WatcherId;

/// Identity of a lockable job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKey {
    Watcher(WatcherId),
    Executor(Direction),
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobKey::Watcher(id) => write!(f, "watcher {}", id),
            JobKey::Executor(direction) => write!(f, "executor {}", direction),
        }
    }
}

/// Observable state of a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    Idle,
    Executing { since: Instant },
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    generation: u64,
    last_progress: Instant,
}

/// Process-wide registry of job slots.
pub struct ExecutionLocks {
    slots: Mutex<HashMap<JobKey, Slot>>,
    next_generation: AtomicU64,
    ttl: Option<Duration>,
}

impl ExecutionLocks {
    /// Creates a registry; `ttl = None` disables reclaiming.
    pub fn new(ttl: Option<Duration>) -> Arc<Self> {
        Arc::new(Self {
            slots: Mutex::new(HashMap::new()),
            next_generation: AtomicU64::new(1),
            ttl,
        })
    }

    /// Takes the slot of `key` if it is idle or stale.
    ///
    /// # Returns
    ///
    /// * `Some(LockGuard)` - The caller now owns the slot
    /// * `None` - Another holder is making progress
    pub fn try_acquire(self: &Arc<Self>, key: JobKey) -> Option<LockGuard> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();

        let reclaimed_after = match slots.get(&key) {
            None => None,
            Some(slot) => {
                let idle_for = now.duration_since(slot.last_progress);
                match self.ttl {
                    Some(ttl) if idle_for > ttl => Some(idle_for),
                    _ => return None,
                }
            }
        };

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        slots.insert(
            key,
            Slot {
                generation,
                last_progress: now,
            },
        );

        Some(LockGuard {
            locks: Arc::clone(self),
            key,
            generation,
            reclaimed_after,
        })
    }

    pub fn state(&self, key: JobKey) -> LockState {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        match slots.get(&key) {
            Some(slot) => LockState::Executing {
                since: slot.last_progress,
            },
            None => LockState::Idle,
        }
    }

    pub fn is_executing(&self, key: JobKey) -> bool {
        self.state(key) != LockState::Idle
    }

    fn refresh(&self, key: JobKey, generation: u64) -> bool {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        match slots.get_mut(&key) {
            Some(slot) if slot.generation == generation => {
                slot.last_progress = Instant::now();
                true
            }
            _ => false,
        }
    }

    fn release(&self, key: JobKey, generation: u64) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        if slots.get(&key).map(|s| s.generation) == Some(generation) {
            slots.remove(&key);
        }
    }
}

/// Ownership of one slot; frees it on drop.
pub struct LockGuard {
    locks: Arc<ExecutionLocks>,
    key: JobKey,
    generation: u64,
    reclaimed_after: Option<Duration>,
}

impl LockGuard {
    pub fn key(&self) -> JobKey {
        self.key
    }

    /// How long the previous holder had been silent, if this guard took a stale slot.
    pub fn reclaimed_after(&self) -> Option<Duration> {
        self.reclaimed_after
    }

    /// Records progress. Returns false if the slot was reclaimed by someone else.
    pub fn refresh(&self) -> bool {
        self.locks.refresh(self.key, self.generation)
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        self.locks.release(self.key, self.generation);
    }
}

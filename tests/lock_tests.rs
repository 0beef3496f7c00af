//! Unit tests for execution locks
//!
//! These tests verify single-flight execution per job and the reclaiming of
//! slots whose holder stopped making progress.

use std::time::Duration;

use fio_oracle::intent::Direction;
use fio_oracle::monitor::WatcherId;
use fio_oracle::relay::{ExecutionLocks, JobKey, LockState};

/// 1. Test: Single Flight
/// Verifies that a held slot cannot be taken again and other slots stay independent.
/// Why: Two runs of one executor would race on the same nonce and double-submit.
#[test]
fn test_single_flight() {
    let locks = ExecutionLocks::new(None);
    let key = JobKey::Executor(Direction::WrapTokensEth);

    let guard = locks.try_acquire(key).expect("Idle slot should be acquired");
    assert!(locks.try_acquire(key).is_none());
    assert!(locks.is_executing(key));
    assert!(guard.reclaimed_after().is_none());

    let other = locks.try_acquire(JobKey::Watcher(WatcherId::FioWrap));
    assert!(other.is_some(), "Other jobs are not blocked");
}

/// 2. Test: Drop Releases
/// Verifies that dropping the guard frees the slot.
/// Why: The slot must be released on every exit path, including errors and panics.
#[test]
fn test_drop_releases() {
    let locks = ExecutionLocks::new(None);
    let key = JobKey::Watcher(WatcherId::EvmUnwrap(Direction::UnwrapTokensEth));

    {
        let _guard = locks.try_acquire(key).unwrap();
        assert!(matches!(locks.state(key), LockState::Executing { .. }));
    }
    assert_eq!(locks.state(key), LockState::Idle);
    assert!(locks.try_acquire(key).is_some());
}

/// 3. Test: Stale Slot Reclaimed
/// Verifies that a slot without progress past the TTL is taken over.
/// Why: A hung submission must not block its lane forever.
#[test]
fn test_stale_slot_reclaimed() {
    let locks = ExecutionLocks::new(Some(Duration::from_millis(20)));
    let key = JobKey::Executor(Direction::WrapDomainEth);

    let stale = locks.try_acquire(key).unwrap();
    std::thread::sleep(Duration::from_millis(50));

    let fresh = locks.try_acquire(key).expect("Stale slot should be reclaimed");
    assert!(fresh.reclaimed_after().unwrap() >= Duration::from_millis(20));

    // The stale holder learns it lost the slot, and its drop leaves the new holder alone
    assert!(!stale.refresh());
    drop(stale);
    assert!(locks.is_executing(key));
    assert!(fresh.refresh());
}

/// 4. Test: Refresh Keeps Slot
/// Verifies that a holder making progress is never reclaimed.
/// Why: Long drains with many entries must keep their slot.
#[test]
fn test_refresh_keeps_slot() {
    let locks = ExecutionLocks::new(Some(Duration::from_millis(40)));
    let key = JobKey::Executor(Direction::WrapDomainPolygon);

    let guard = locks.try_acquire(key).unwrap();
    for _ in 0..3 {
        std::thread::sleep(Duration::from_millis(15));
        assert!(guard.refresh());
    }
    assert!(locks.try_acquire(key).is_none());
}

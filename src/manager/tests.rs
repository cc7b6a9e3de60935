//! Lock protocol tests, run against every store backend.

use super::*;
use crate::deadline::Deadline;
use crate::error::LockError;
use crate::store::MemoryStore;
use crate::test_support::{Harness, JOB, LEASE, OTHER_JOB, numbered_targets, targets};
use crate::types::{JobId, TargetId};
use std::sync::Barrier;
use std::thread;
use std::time::Instant;

const BATCH: usize = 3;

fn all_targets() -> Vec<TargetId> {
    targets(&["001", "002", "003", "004"])
}

fn one_target() -> Vec<TargetId> {
    targets(&["001"])
}

fn two_targets() -> Vec<TargetId> {
    targets(&["001", "002"])
}

fn lock(h: &Harness, job: JobId, targets: &[TargetId]) -> crate::error::Result<()> {
    h.manager.lock(Deadline::none(), job, LEASE, targets)
}

fn unlock(h: &Harness, job: JobId, targets: &[TargetId]) -> crate::error::Result<()> {
    h.manager.unlock(Deadline::none(), job, targets)
}

fn try_lock(h: &Harness, job: JobId, targets: &[TargetId], limit: usize) -> Vec<TargetId> {
    h.manager
        .try_lock(Deadline::none(), job, LEASE, targets, limit)
        .unwrap_or_else(|e| panic!("[{}] try_lock failed: {}", h.name, e))
}

fn refresh(h: &Harness, job: JobId, targets: &[TargetId]) -> crate::error::Result<()> {
    h.manager.refresh_locks(Deadline::none(), job, targets)
}

/// Owner of each currently held target, in target order.
fn holders(h: &Harness) -> Vec<(String, u64)> {
    h.manager
        .list_locks(Deadline::none())
        .unwrap()
        .into_iter()
        .filter(|status| status.held)
        .map(|status| (status.record.target.to_string(), status.record.owner.0))
        .collect()
}

fn names(targets: &[TargetId]) -> Vec<&str> {
    targets.iter().map(|t| t.as_str()).collect()
}

// ============================================================================
// Lock
// ============================================================================

#[test]
fn test_lock_invalid_job_with_no_targets() {
    for h in Harness::all(BATCH) {
        let err = lock(&h, JobId(0), &[]).unwrap_err();
        assert!(matches!(err, LockError::InvalidInput(_)), "[{}]", h.name);
    }
}

#[test]
fn test_lock_valid_job_with_no_targets() {
    for h in Harness::all(BATCH) {
        assert!(lock(&h, JOB, &[]).is_ok(), "[{}]", h.name);
        assert!(holders(&h).is_empty());
    }
}

#[test]
fn test_lock_invalid_job_with_one_target() {
    for h in Harness::all(BATCH) {
        assert!(lock(&h, JobId(0), &one_target()).is_err(), "[{}]", h.name);
        assert!(holders(&h).is_empty());
    }
}

#[test]
fn test_lock_empty_target_id_rejected() {
    for h in Harness::all(BATCH) {
        let err = lock(&h, JOB, &targets(&[""])).unwrap_err();
        assert!(matches!(err, LockError::InvalidInput(_)), "[{}]", h.name);
    }
}

#[test]
fn test_lock_empty_target_id_among_valid_rejected_without_mutation() {
    for h in Harness::all(BATCH) {
        assert!(lock(&h, JOB, &targets(&["001", "002", "003", ""])).is_err());
        assert!(holders(&h).is_empty(), "[{}]", h.name);
    }
}

#[test]
fn test_lock_zero_lease_rejected() {
    for h in Harness::all(BATCH) {
        let err = h
            .manager
            .lock(Deadline::none(), JOB, Duration::ZERO, &one_target())
            .unwrap_err();
        assert!(matches!(err, LockError::InvalidInput(_)), "[{}]", h.name);
    }
}

#[test]
fn test_lock_one_and_two_targets() {
    for h in Harness::all(BATCH) {
        assert!(lock(&h, JOB, &one_target()).is_ok());
        assert!(lock(&h, JOB, &two_targets()).is_ok());
        assert_eq!(
            holders(&h),
            vec![("001".to_string(), 123), ("002".to_string(), 123)],
            "[{}]",
            h.name
        );
    }
}

#[test]
fn test_lock_reentrant() {
    for h in Harness::all(BATCH) {
        assert!(lock(&h, JOB, &all_targets()).is_ok());
        assert!(lock(&h, JOB, &one_target()).is_ok());
        assert!(lock(&h, JOB, &all_targets()).is_ok());
        assert_eq!(holders(&h).len(), 4, "[{}]", h.name);
    }
}

#[test]
fn test_lock_reentrant_subset_keeps_the_rest() {
    for h in Harness::all(BATCH) {
        lock(&h, JOB, &all_targets()).unwrap();
        h.advance(Duration::from_millis(1500));
        lock(&h, JOB, &one_target()).unwrap();

        // The subset call neither released nor shortened the others.
        assert_eq!(holders(&h).len(), 4, "[{}]", h.name);
        h.advance(Duration::from_millis(1000));
        assert_eq!(holders(&h), vec![("001".to_string(), 123)], "[{}]", h.name);
    }
}

#[test]
fn test_lock_held_by_other_job_fails() {
    for h in Harness::all(BATCH) {
        lock(&h, JOB, &all_targets()).unwrap();

        for request in [one_target(), two_targets(), all_targets(), targets(&["004"])] {
            let err = lock(&h, OTHER_JOB, &request).unwrap_err();
            assert!(err.is_conflict(), "[{}] {:?}", h.name, request);
        }
    }
}

#[test]
fn test_lock_conflict_names_first_held_target() {
    for h in Harness::all(BATCH) {
        lock(&h, JOB, &targets(&["003"])).unwrap();

        match lock(&h, OTHER_JOB, &all_targets()).unwrap_err() {
            LockError::Conflict {
                target,
                owner,
                expires_at,
            } => {
                assert_eq!(target.as_str(), "003");
                assert_eq!(owner, JOB);
                assert_eq!(expires_at, h.clock.now() + chrono::Duration::seconds(2));
            }
            other => panic!("[{}] expected conflict, got {:?}", h.name, other),
        }
    }
}

#[test]
fn test_lock_is_transactional() {
    for h in Harness::all(BATCH) {
        lock(&h, JOB, &targets(&["002"])).unwrap();
        assert!(lock(&h, OTHER_JOB, &two_targets()).is_err());

        // "001" was not taken by the failed call.
        assert!(lock(&h, JOB, &one_target()).is_ok(), "[{}]", h.name);
    }
}

#[test]
fn test_lock_conflict_in_last_batch_rolls_back_earlier_batches() {
    for h in Harness::all(BATCH) {
        let requested = numbered_targets(7);
        lock(&h, JOB, &targets(&["t7"])).unwrap();

        assert!(lock(&h, OTHER_JOB, &requested).unwrap_err().is_conflict());
        assert_eq!(holders(&h), vec![("t7".to_string(), 123)], "[{}]", h.name);
    }
}

#[test]
fn test_lock_failure_leaves_other_holders_untouched() {
    for h in Harness::all(BATCH) {
        lock(&h, JOB, &targets(&["001"])).unwrap();
        lock(&h, JobId(500), &targets(&["004"])).unwrap();
        let before = h.manager.list_locks(Deadline::none()).unwrap();

        assert!(lock(&h, OTHER_JOB, &all_targets()).is_err());
        assert_eq!(h.manager.list_locks(Deadline::none()).unwrap(), before, "[{}]", h.name);
    }
}

#[test]
fn test_lock_expiry() {
    for h in Harness::all(BATCH) {
        lock(&h, JOB, &two_targets()).unwrap();
        assert!(lock(&h, OTHER_JOB, &two_targets()).is_err());

        h.advance(Duration::from_secs(3));
        assert!(lock(&h, OTHER_JOB, &two_targets()).is_ok(), "[{}]", h.name);
        assert_eq!(holders(&h)[0].1, 124);
    }
}

#[test]
fn test_lock_expiring_exactly_now_is_free() {
    for h in Harness::all(BATCH) {
        lock(&h, JOB, &one_target()).unwrap();

        h.advance(Duration::from_millis(1999));
        assert!(lock(&h, OTHER_JOB, &one_target()).is_err());

        h.advance(Duration::from_millis(1));
        assert!(lock(&h, OTHER_JOB, &one_target()).is_ok(), "[{}]", h.name);
    }
}

#[test]
fn test_lock_duplicate_targets_collapse() {
    for h in Harness::all(BATCH) {
        lock(&h, JOB, &targets(&["001", "001", "002", "001"])).unwrap();
        assert_eq!(holders(&h).len(), 2, "[{}]", h.name);
    }
}

// ============================================================================
// Unlock
// ============================================================================

#[test]
fn test_unlock_no_targets_ignores_job() {
    for h in Harness::all(BATCH) {
        assert!(unlock(&h, JobId(0), &[]).is_ok(), "[{}]", h.name);
        assert!(unlock(&h, JOB, &[]).is_ok(), "[{}]", h.name);
    }
}

#[test]
fn test_unlock_invalid_job_with_one_target() {
    for h in Harness::all(BATCH) {
        assert!(unlock(&h, JobId(0), &one_target()).is_err(), "[{}]", h.name);
    }
}

#[test]
fn test_unlock_empty_target_id_rejected() {
    for h in Harness::all(BATCH) {
        let err = unlock(&h, JOB, &targets(&["001", ""])).unwrap_err();
        assert!(matches!(err, LockError::InvalidInput(_)), "[{}]", h.name);
    }
}

#[test]
fn test_unlock_unheld_targets_is_ok() {
    for h in Harness::all(BATCH) {
        assert!(unlock(&h, JOB, &one_target()).is_ok());
        assert!(unlock(&h, JOB, &two_targets()).is_ok(), "[{}]", h.name);
    }
}

#[test]
fn test_lock_then_unlock_frees_everything() {
    for h in Harness::all(BATCH) {
        lock(&h, JOB, &all_targets()).unwrap();
        unlock(&h, JOB, &all_targets()).unwrap();

        assert!(holders(&h).is_empty());
        assert!(lock(&h, OTHER_JOB, &all_targets()).is_ok(), "[{}]", h.name);
    }
}

#[test]
fn test_unlock_by_other_job_is_silent_noop() {
    for h in Harness::all(BATCH) {
        lock(&h, JOB, &all_targets()).unwrap();

        assert!(unlock(&h, OTHER_JOB, &all_targets()).is_ok());
        assert!(lock(&h, OTHER_JOB, &two_targets()).is_err(), "[{}]", h.name);
    }
}

#[test]
fn test_unlock_releases_only_callers_targets() {
    for h in Harness::all(BATCH) {
        lock(&h, JOB, &two_targets()).unwrap();
        lock(&h, OTHER_JOB, &targets(&["003", "004"])).unwrap();

        unlock(&h, JOB, &all_targets()).unwrap();
        assert_eq!(
            holders(&h),
            vec![("003".to_string(), 124), ("004".to_string(), 124)],
            "[{}]",
            h.name
        );
    }
}

#[test]
fn test_unlock_removes_expired_own_record() {
    for h in Harness::all(BATCH) {
        lock(&h, JOB, &one_target()).unwrap();
        h.advance(Duration::from_secs(5));

        unlock(&h, JOB, &one_target()).unwrap();
        assert!(h.manager.list_locks(Deadline::none()).unwrap().is_empty(), "[{}]", h.name);
    }
}

#[test]
fn test_unlock_is_idempotent() {
    for h in Harness::all(BATCH) {
        lock(&h, JOB, &two_targets()).unwrap();
        unlock(&h, JOB, &two_targets()).unwrap();
        assert!(unlock(&h, JOB, &two_targets()).is_ok(), "[{}]", h.name);
    }
}

// ============================================================================
// TryLock
// ============================================================================

#[test]
fn test_try_lock_one() {
    for h in Harness::all(BATCH) {
        assert_eq!(names(&try_lock(&h, JOB, &one_target(), 1)), vec!["001"]);
    }
}

#[test]
fn test_try_lock_two() {
    for h in Harness::all(BATCH) {
        assert_eq!(names(&try_lock(&h, JOB, &two_targets(), 2)), vec!["001", "002"]);
    }
}

#[test]
fn test_try_lock_limit_above_request() {
    for h in Harness::all(BATCH) {
        assert_eq!(names(&try_lock(&h, JOB, &two_targets(), 100)), vec!["001", "002"]);
    }
}

#[test]
fn test_try_lock_some_held_elsewhere() {
    for h in Harness::all(BATCH) {
        lock(&h, JOB, &two_targets()).unwrap();

        let granted = try_lock(&h, OTHER_JOB, &all_targets(), 4);
        assert_eq!(names(&granted), vec!["003", "004"], "[{}]", h.name);
    }
}

#[test]
fn test_try_lock_same_job_gets_everything() {
    for h in Harness::all(BATCH) {
        lock(&h, JOB, &two_targets()).unwrap();

        let granted = try_lock(&h, JOB, &all_targets(), 4);
        assert_eq!(names(&granted), vec!["001", "002", "003", "004"], "[{}]", h.name);
    }
}

#[test]
fn test_try_lock_zero_limit_acquires_nothing() {
    for h in Harness::all(BATCH) {
        assert!(try_lock(&h, JOB, &two_targets(), 0).is_empty());
        assert!(holders(&h).is_empty(), "[{}]", h.name);
    }
}

#[test]
fn test_try_lock_zero_limit_returns_already_owned() {
    for h in Harness::all(BATCH) {
        lock(&h, JOB, &targets(&["002"])).unwrap();

        let granted = try_lock(&h, JOB, &all_targets(), 0);
        assert_eq!(names(&granted), vec!["002"], "[{}]", h.name);
        assert_eq!(holders(&h).len(), 1);
    }
}

#[test]
fn test_try_lock_limit_respects_input_order() {
    for h in Harness::all(BATCH) {
        let granted = try_lock(&h, JOB, &two_targets(), 1);
        assert_eq!(names(&granted), vec!["001"], "[{}]", h.name);

        // The second target was not attempted.
        assert!(lock(&h, OTHER_JOB, &targets(&["002"])).is_ok());
    }
}

#[test]
fn test_try_lock_owned_targets_do_not_consume_limit() {
    for h in Harness::all(BATCH) {
        lock(&h, JOB, &targets(&["001", "004"])).unwrap();

        // 001 and 004 are free of charge, 002 uses the single slot, 003 is left.
        let granted = try_lock(&h, JOB, &all_targets(), 1);
        assert_eq!(names(&granted), vec!["001", "002", "004"], "[{}]", h.name);
        assert!(lock(&h, OTHER_JOB, &targets(&["003"])).is_ok());
    }
}

#[test]
fn test_try_lock_one_of_two() {
    for h in Harness::all(BATCH) {
        lock(&h, JOB, &one_target()).unwrap();

        let granted = try_lock(&h, OTHER_JOB, &two_targets(), 2);
        assert_eq!(names(&granted), vec!["002"], "[{}]", h.name);
    }
}

#[test]
fn test_try_lock_none_of_two() {
    for h in Harness::all(BATCH) {
        lock(&h, JOB, &two_targets()).unwrap();
        assert!(try_lock(&h, OTHER_JOB, &two_targets(), 2).is_empty(), "[{}]", h.name);
    }
}

#[test]
fn test_try_lock_takes_expired_targets() {
    for h in Harness::all(BATCH) {
        lock(&h, JOB, &two_targets()).unwrap();
        h.advance(Duration::from_secs(2));

        let granted = try_lock(&h, OTHER_JOB, &two_targets(), 2);
        assert_eq!(names(&granted), vec!["001", "002"], "[{}]", h.name);
    }
}

#[test]
fn test_try_lock_renews_owned_lease() {
    for h in Harness::all(BATCH) {
        lock(&h, JOB, &one_target()).unwrap();
        h.advance(Duration::from_millis(1500));
        try_lock(&h, JOB, &one_target(), 0);

        h.advance(Duration::from_millis(1000));
        assert!(lock(&h, OTHER_JOB, &one_target()).is_err(), "[{}]", h.name);
    }
}

#[test]
fn test_try_lock_validation() {
    for h in Harness::all(BATCH) {
        let err = h
            .manager
            .try_lock(Deadline::none(), JobId(0), LEASE, &one_target(), 1)
            .unwrap_err();
        assert!(matches!(err, LockError::InvalidInput(_)));

        let err = h
            .manager
            .try_lock(Deadline::none(), JOB, LEASE, &targets(&["001", ""]), 1)
            .unwrap_err();
        assert!(matches!(err, LockError::InvalidInput(_)), "[{}]", h.name);
    }
}

#[test]
fn test_try_lock_result_bounded_by_limit_plus_owned() {
    for h in Harness::all(BATCH) {
        let pool = numbered_targets(10);
        lock(&h, JOB, &targets(&["t2", "t9"])).unwrap();
        lock(&h, OTHER_JOB, &targets(&["t1", "t5"])).unwrap();

        for limit in 0..4 {
            let owned = holders(&h).iter().filter(|(_, owner)| *owner == 123).count();
            let granted = try_lock(&h, JOB, &pool, limit);

            assert!(granted.len() <= limit + owned, "[{}] limit {}", h.name, limit);
            assert!(!granted.iter().any(|t| t.as_str() == "t1" || t.as_str() == "t5"));
        }
    }
}

// ============================================================================
// RefreshLocks
// ============================================================================

#[test]
fn test_refresh_unheld_targets_is_ok() {
    for h in Harness::all(BATCH) {
        assert!(refresh(&h, JOB, &two_targets()).is_ok());
        assert!(refresh(&h, JOB, &two_targets()).is_ok());
        assert!(refresh(&h, JOB, &one_target()).is_ok());
        // Refresh never acquires.
        assert!(holders(&h).is_empty(), "[{}]", h.name);
    }
}

#[test]
fn test_refresh_no_targets_ignores_job() {
    for h in Harness::all(BATCH) {
        assert!(refresh(&h, JobId(0), &[]).is_ok(), "[{}]", h.name);
    }
}

#[test]
fn test_refresh_invalid_job_with_targets() {
    for h in Harness::all(BATCH) {
        assert!(refresh(&h, JobId(0), &one_target()).is_err(), "[{}]", h.name);
        assert!(refresh(&h, JOB, &targets(&[""])).is_err(), "[{}]", h.name);
    }
}

#[test]
fn test_refresh_extends_lease() {
    for h in Harness::all(BATCH) {
        lock(&h, JOB, &two_targets()).unwrap();
        h.advance(Duration::from_millis(1500));
        refresh(&h, JOB, &two_targets()).unwrap();
        h.advance(Duration::from_secs(1));

        assert!(lock(&h, OTHER_JOB, &targets(&["001"])).is_err(), "[{}]", h.name);
        assert!(lock(&h, OTHER_JOB, &targets(&["002"])).is_err(), "[{}]", h.name);
    }
}

#[test]
fn test_refresh_overlapping_sets() {
    for h in Harness::all(BATCH) {
        lock(&h, JOB, &all_targets()).unwrap();
        h.advance(Duration::from_millis(1000));
        refresh(&h, JOB, &one_target()).unwrap();
        h.advance(Duration::from_millis(500));
        refresh(&h, JOB, &two_targets()).unwrap();
        h.advance(Duration::from_millis(700));

        // 003 and 004 lapsed at 2.0s; 001 and 002 now run until 3.5s.
        assert_eq!(
            holders(&h),
            vec![("001".to_string(), 123), ("002".to_string(), 123)],
            "[{}]",
            h.name
        );
    }
}

#[test]
fn test_refresh_does_not_touch_other_jobs_or_revive_expired() {
    for h in Harness::all(BATCH) {
        lock(&h, JOB, &one_target()).unwrap();
        h.advance(Duration::from_secs(2));
        lock(&h, OTHER_JOB, &targets(&["002"])).unwrap();
        let before = h.manager.list_locks(Deadline::none()).unwrap();

        h.advance(Duration::from_secs(1));
        refresh(&h, JOB, &two_targets()).unwrap();

        assert_eq!(h.manager.list_locks(Deadline::none()).unwrap(), before);
        assert_eq!(holders(&h), vec![("002".to_string(), 124)], "[{}]", h.name);
    }
}

#[test]
fn test_refresh_uses_original_lease() {
    for h in Harness::all(BATCH) {
        h.manager
            .lock(Deadline::none(), JOB, Duration::from_secs(10), &one_target())
            .unwrap();
        h.advance(Duration::from_secs(9));
        refresh(&h, JOB, &one_target()).unwrap();
        h.advance(Duration::from_secs(9));

        assert_eq!(holders(&h).len(), 1, "[{}]", h.name);
    }
}

#[test]
fn test_refresh_keeps_sub_millisecond_lease_held() {
    for h in Harness::all(BATCH) {
        h.manager
            .lock(Deadline::none(), JOB, Duration::from_micros(500), &one_target())
            .unwrap();
        refresh(&h, JOB, &one_target()).unwrap();

        let err = lock(&h, OTHER_JOB, &one_target()).unwrap_err();
        assert!(matches!(err, LockError::Conflict { .. }), "[{}] {}", h.name, err);
    }
}

#[test]
fn test_refresh_uses_configured_lease_when_set() {
    let h = Harness::memory(BATCH);
    let manager = h.manager.clone().with_refresh_lease(Duration::from_secs(1));

    manager
        .lock(Deadline::none(), JOB, Duration::from_secs(10), &one_target())
        .unwrap();
    manager.refresh_locks(Deadline::none(), JOB, &one_target()).unwrap();
    h.advance(Duration::from_secs(1));

    assert!(holders(&h).is_empty());
}

// ============================================================================
// Maintenance
// ============================================================================

#[test]
fn test_reset_all_locks() {
    for h in Harness::all(BATCH) {
        lock(&h, JOB, &two_targets()).unwrap();
        lock(&h, OTHER_JOB, &targets(&["003"])).unwrap();

        h.manager.reset_all_locks(Deadline::none()).unwrap();
        assert!(h.manager.list_locks(Deadline::none()).unwrap().is_empty());
        assert!(lock(&h, OTHER_JOB, &all_targets()).is_ok(), "[{}]", h.name);
    }
}

#[test]
fn test_reset_empty_store() {
    for h in Harness::all(BATCH) {
        assert!(h.manager.reset_all_locks(Deadline::none()).is_ok(), "[{}]", h.name);
    }
}

#[test]
fn test_list_locks_marks_expired() {
    for h in Harness::all(BATCH) {
        lock(&h, JOB, &targets(&["b"])).unwrap();
        h.advance(Duration::from_secs(3));
        lock(&h, OTHER_JOB, &targets(&["a"])).unwrap();

        let statuses = h.manager.list_locks(Deadline::none()).unwrap();
        assert_eq!(statuses.len(), 2, "[{}]", h.name);
        assert_eq!(statuses[0].record.target.as_str(), "a");
        assert!(statuses[0].held);
        assert_eq!(statuses[1].record.target.as_str(), "b");
        assert!(!statuses[1].held);
    }
}

#[test]
fn test_purge_expired_removes_only_lapsed() {
    for h in Harness::all(BATCH) {
        lock(&h, JOB, &numbered_targets(5)).unwrap();
        h.advance(Duration::from_secs(3));
        lock(&h, OTHER_JOB, &targets(&["keep"])).unwrap();

        assert_eq!(h.manager.purge_expired(Deadline::none()).unwrap(), 5);
        let left = h.manager.list_locks(Deadline::none()).unwrap();
        assert_eq!(left.len(), 1, "[{}]", h.name);
        assert_eq!(left[0].record.target.as_str(), "keep");

        assert_eq!(h.manager.purge_expired(Deadline::none()).unwrap(), 0);
    }
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn test_scenario_takeover_after_expiry() {
    for h in Harness::all(BATCH) {
        let t1 = targets(&["t1"]);
        assert!(lock(&h, JobId(1), &t1).is_ok());
        assert!(lock(&h, JobId(2), &t1).is_err());
        h.advance(Duration::from_secs(3));
        assert!(lock(&h, JobId(2), &t1).is_ok(), "[{}]", h.name);
    }
}

#[test]
fn test_scenario_foreign_unlock_does_not_release() {
    for h in Harness::all(BATCH) {
        assert!(lock(&h, JobId(1), &targets(&["t1", "t2"])).is_ok());
        assert!(unlock(&h, JobId(2), &targets(&["t1", "t2"])).is_ok());
        assert!(lock(&h, JobId(2), &targets(&["t1"])).is_err(), "[{}]", h.name);
    }
}

#[test]
fn test_scenario_try_lock_skips_held() {
    for h in Harness::all(BATCH) {
        lock(&h, JobId(1), &targets(&["t1"])).unwrap();
        let granted = try_lock(&h, JobId(2), &targets(&["t1", "t2"]), 2);
        assert_eq!(names(&granted), vec!["t2"], "[{}]", h.name);
    }
}

// ============================================================================
// Batching and failures
// ============================================================================

#[test]
fn test_batch_size_clamped_to_store_limit() {
    let h = Harness::memory_with(MemoryStore::with_statement_limit(2), 50);
    assert_eq!(h.manager.max_batch_size(), 2);

    let requested = numbered_targets(7);
    lock(&h, JOB, &requested).unwrap();
    assert_eq!(holders(&h).len(), 7);

    let memory = h.memory.as_ref().unwrap();
    let before = memory.statement_count();
    assert_eq!(try_lock(&h, JOB, &requested, 0).len(), 7);
    // One select and one upsert per two-target batch.
    assert_eq!(memory.statement_count() - before, 8);
}

#[test]
fn test_large_request_spans_many_batches() {
    for h in Harness::all(BATCH) {
        let requested = numbered_targets(25);
        lock(&h, JOB, &requested).unwrap();

        let granted = try_lock(&h, OTHER_JOB, &requested, 25);
        assert!(granted.is_empty(), "[{}]", h.name);

        unlock(&h, JOB, &requested).unwrap();
        assert!(holders(&h).is_empty());
    }
}

#[test]
fn test_commit_failure_surfaces_store_error_without_mutation() {
    let h = Harness::memory(BATCH);
    let memory = Arc::clone(h.memory.as_ref().unwrap());

    memory.fail_next_commit();
    let err = lock(&h, JOB, &all_targets()).unwrap_err();
    assert!(matches!(err, LockError::StoreError(_)));
    assert!(!err.is_conflict());
    assert!(memory.snapshot().is_empty());

    lock(&h, JOB, &all_targets()).unwrap();
    memory.fail_next_commit();
    assert!(unlock(&h, JOB, &all_targets()).is_err());
    assert_eq!(memory.snapshot().len(), 4);
}

#[test]
fn test_expired_deadline_times_out_without_mutation() {
    for h in Harness::all(BATCH) {
        let past = Deadline::at(Instant::now());

        let err = h.manager.lock(past, JOB, LEASE, &all_targets()).unwrap_err();
        assert!(matches!(err, LockError::Timeout(_)), "[{}]", h.name);
        assert!(
            h.manager
                .try_lock(past, JOB, LEASE, &all_targets(), 4)
                .is_err()
        );
        assert!(h.manager.reset_all_locks(past).is_err());
        assert!(holders(&h).is_empty());
    }
}

#[test]
fn test_busy_store_times_out() {
    let h = Harness::memory(BATCH);
    let memory = Arc::clone(h.memory.as_ref().unwrap());
    let _txn = memory.begin(Deadline::none()).unwrap();

    let err = h
        .manager
        .lock(
            Deadline::after(Duration::from_millis(20)),
            JOB,
            LEASE,
            &one_target(),
        )
        .unwrap_err();
    assert!(matches!(err, LockError::Timeout(_)));
}

// ============================================================================
// Concurrency
// ============================================================================

#[test]
fn test_concurrent_lock_has_single_winner() {
    for h in Harness::all(BATCH) {
        let manager = Arc::new(h.manager.clone());
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (1..=8u64)
            .map(|job| {
                let manager = Arc::clone(&manager);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    manager
                        .lock(Deadline::none(), JobId(job), LEASE, &all_targets())
                        .is_ok()
                })
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1, "[{}]", h.name);

        let owners: std::collections::HashSet<u64> =
            holders(&h).into_iter().map(|(_, owner)| owner).collect();
        assert_eq!(owners.len(), 1);
    }
}

#[test]
fn test_concurrent_try_lock_never_double_grants() {
    for h in Harness::all(BATCH) {
        let manager = Arc::new(h.manager.clone());
        let pool = numbered_targets(6);

        let handles: Vec<_> = (1..=6u64)
            .map(|job| {
                let manager = Arc::clone(&manager);
                let pool = pool.clone();
                thread::spawn(move || {
                    manager
                        .try_lock(Deadline::none(), JobId(job), LEASE, &pool, 1)
                        .unwrap()
                })
            })
            .collect();

        let mut granted: Vec<TargetId> = handles
            .into_iter()
            .flat_map(|handle| handle.join().unwrap())
            .collect();
        assert_eq!(granted.len(), 6, "[{}]", h.name);

        granted.sort();
        granted.dedup();
        assert_eq!(granted.len(), 6, "[{}]", h.name);
    }
}

//! Concurrent/Multi-threaded Tests for tessera-concurrency
//!
//! These tests verify lock behavior under actual concurrent execution:
//!
//! 1. **Deadlock Avoidance** - Opposite-order key sets never deadlock
//! 2. **Mutual Exclusion** - At most one holder per key at any time
//! 3. **Timeout Rollback** - Failed acquisitions leave nothing behind
//! 4. **Stale Eviction** - Abandoned records are taken over
//! 5. **Persistent Locks** - Two connections to one lock table exclude each other
//! 6. **Canonical Ordering** - Property test over random key sets
//!
//! ## Running These Tests
//!
//! ```bash
//! cargo test --test concurrent_tests
//! cargo test --test concurrent_tests -- --nocapture --test-threads=1  # sequential for debugging
//! ```

use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

use chrono::Utc;
use proptest::prelude::*;
use tempfile::TempDir;
use tessera_concurrency::{
    LockOwner, LockRecord, LockState, LockStrategy, MemoryLockStrategy, PersistentLockStrategy,
    TransactionLock, TransactionPool,
};
use tessera_core::{Error, LockConfig, LockKey, Result};

// ============================================================================
// Test Helpers
// ============================================================================

fn fast_config() -> LockConfig {
    LockConfig {
        poll_interval_ms: 2,
        ..LockConfig::default()
    }
}

fn memory() -> Arc<MemoryLockStrategy> {
    Arc::new(MemoryLockStrategy::new(fast_config()).unwrap())
}

fn keys(names: &[&str]) -> Vec<LockKey> {
    names.iter().map(|n| LockKey::new(*n)).collect()
}

fn lock_on(strategy: Arc<dyn LockStrategy>, names: &[&str]) -> TransactionLock {
    TransactionLock::with_keys(strategy, keys(names), false)
}

/// Strategy that remembers the order in which keys were requested
#[derive(Debug)]
struct RecordingStrategy {
    inner: MemoryLockStrategy,
    requests: Mutex<Vec<String>>,
}

impl RecordingStrategy {
    fn new() -> Self {
        Self {
            inner: MemoryLockStrategy::new(fast_config()).unwrap(),
            requests: Mutex::new(Vec::new()),
        }
    }
}

impl LockStrategy for RecordingStrategy {
    fn config(&self) -> &LockConfig {
        self.inner.config()
    }

    fn try_create(&self, record: &LockRecord) -> Result<bool> {
        self.inner.try_create(record)
    }

    fn record(&self, key: &str) -> Result<Option<LockRecord>> {
        self.inner.record(key)
    }

    fn remove(&self, key: &str, owner: Option<&str>) -> Result<bool> {
        self.inner.remove(key, owner)
    }

    fn lock(&self, key: &LockKey, owner: &LockOwner, timeout: Duration) -> Result<()> {
        self.requests.lock().push(key.to_string());
        self.inner.lock(key, owner, timeout)
    }
}

// ============================================================================
// SECTION 1: Deadlock Avoidance
// ============================================================================

mod deadlock_avoidance {
    use super::*;

    /// Two threads lock {A, B} and {B, A} at the same moment.
    /// Both see the keys as [A, B], so one simply waits for the other.
    #[test]
    fn test_opposite_order_sets_complete() {
        let strategy = memory();
        let timeout = Duration::from_secs(2);

        for _ in 0..20 {
            let barrier = Arc::new(Barrier::new(2));
            let start = Instant::now();

            let handles: Vec<_> = [["A", "B"], ["B", "A"]]
                .into_iter()
                .map(|names| {
                    let strategy: Arc<dyn LockStrategy> = strategy.clone();
                    let barrier = Arc::clone(&barrier);
                    thread::spawn(move || {
                        let mut lock = lock_on(strategy, &names);
                        barrier.wait();
                        lock.lock(timeout).unwrap();
                        thread::sleep(Duration::from_millis(2));
                        lock.release();
                    })
                })
                .collect();

            for handle in handles {
                handle.join().unwrap();
            }
            assert!(start.elapsed() < timeout * 2);
        }
        assert!(strategy.is_empty());
    }

    /// Many threads with overlapping key sets all finish
    #[test]
    fn test_overlapping_sets_under_contention() {
        let strategy = memory();
        let num_threads = 8;
        let barrier = Arc::new(Barrier::new(num_threads));
        let completed = Arc::new(AtomicUsize::new(0));
        let sets: [&[&str]; 4] = [&["C", "A"], &["B", "C"], &["A", "B", "C"], &["B"]];

        let handles: Vec<_> = (0..num_threads)
            .map(|i| {
                let strategy: Arc<dyn LockStrategy> = strategy.clone();
                let barrier = Arc::clone(&barrier);
                let completed = Arc::clone(&completed);
                let names = sets[i % sets.len()];
                thread::spawn(move || {
                    barrier.wait();
                    for _ in 0..10 {
                        let mut lock = lock_on(Arc::clone(&strategy), names);
                        lock.lock(Duration::from_secs(5)).unwrap();
                        lock.release();
                    }
                    completed.fetch_add(1, Ordering::SeqCst);
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(completed.load(Ordering::SeqCst), num_threads);
        assert!(strategy.is_empty());
    }
}

// ============================================================================
// SECTION 2: Mutual Exclusion
// ============================================================================

mod mutual_exclusion {
    use super::*;

    /// Holders of the same key never overlap
    #[test]
    fn test_single_holder_per_key() {
        let strategy = memory();
        let num_threads = 6;
        let barrier = Arc::new(Barrier::new(num_threads));
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..num_threads)
            .map(|_| {
                let strategy: Arc<dyn LockStrategy> = strategy.clone();
                let barrier = Arc::clone(&barrier);
                let inside = Arc::clone(&inside);
                let max_inside = Arc::clone(&max_inside);
                thread::spawn(move || {
                    barrier.wait();
                    for _ in 0..5 {
                        let mut lock = lock_on(Arc::clone(&strategy), &["Account,1"]);
                        lock.lock(Duration::from_secs(5)).unwrap();

                        let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                        max_inside.fetch_max(now, Ordering::SeqCst);
                        thread::sleep(Duration::from_millis(1));
                        inside.fetch_sub(1, Ordering::SeqCst);

                        lock.release();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
    }

    /// Pool scopes on different threads contend through the shared strategy
    #[test]
    fn test_pool_scopes_exclude_each_other() {
        let strategy = memory();
        let barrier = Arc::new(Barrier::new(2));
        let order = Arc::new(Mutex::new(Vec::new()));

        let handles: Vec<_> = (0..2)
            .map(|i| {
                let strategy: Arc<dyn LockStrategy> = strategy.clone();
                let barrier = Arc::clone(&barrier);
                let order = Arc::clone(&order);
                thread::spawn(move || {
                    barrier.wait();
                    TransactionPool::acquire(
                        Duration::from_secs(5),
                        lock_on(Arc::clone(&strategy), &["Order,7,EU"]),
                    )
                    .unwrap();
                    order.lock().push(format!("enter {}", i));
                    thread::sleep(Duration::from_millis(10));
                    order.lock().push(format!("leave {}", i));
                    TransactionPool::release();
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let order = order.lock();
        assert_eq!(order.len(), 4);
        // Each enter is immediately followed by the same thread's leave
        assert_eq!(order[0].replace("enter", "leave"), order[1]);
        assert_eq!(order[2].replace("enter", "leave"), order[3]);
    }
}

// ============================================================================
// SECTION 3: Timeout Rollback
// ============================================================================

mod timeout_rollback {
    use super::*;

    /// A contender that cannot get every key releases the keys it did get
    #[test]
    fn test_timeout_reports_all_keys_and_rolls_back() {
        let strategy = memory();
        let held = Arc::new(Barrier::new(2));
        let done = Arc::new(Barrier::new(2));

        let holder = {
            let strategy: Arc<dyn LockStrategy> = strategy.clone();
            let held = Arc::clone(&held);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                let mut lock = lock_on(strategy, &["M"]);
                lock.lock(Duration::ZERO).unwrap();
                held.wait();
                done.wait();
                lock.release();
            })
        };

        held.wait();
        let mut contender = lock_on(strategy.clone(), &["Z", "A", "M"]);
        let start = Instant::now();
        let err = contender.lock(Duration::from_millis(50)).unwrap_err();
        assert!(start.elapsed() >= Duration::from_millis(50));
        assert!(err.is_retryable());
        match err {
            Error::LockTimeout { keys } => assert_eq!(keys, vec!["A", "M", "Z"]),
            other => panic!("expected timeout, got {:?}", other),
        }
        assert_eq!(contender.state(), LockState::Created);
        assert!(!strategy.is_locked(&LockKey::new("A")).unwrap());
        assert!(!strategy.is_locked(&LockKey::new("Z")).unwrap());

        done.wait();
        holder.join().unwrap();

        // Once the holder is gone the same lock succeeds
        contender.lock(Duration::from_millis(50)).unwrap();
        assert_eq!(strategy.len(), 3);
    }

    /// Backend whose inserts fail with a storage error a set number of times
    #[derive(Debug)]
    struct FlakyStrategy {
        inner: MemoryLockStrategy,
        failures_left: AtomicUsize,
    }

    impl FlakyStrategy {
        fn failing(times: usize) -> Arc<Self> {
            Arc::new(Self {
                inner: MemoryLockStrategy::new(fast_config()).unwrap(),
                failures_left: AtomicUsize::new(times),
            })
        }
    }

    impl LockStrategy for FlakyStrategy {
        fn config(&self) -> &LockConfig {
            self.inner.config()
        }

        fn try_create(&self, record: &LockRecord) -> Result<bool> {
            let failed = self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
                .is_ok();
            if failed {
                return Err(Error::Storage("database is locked".to_string()));
            }
            self.inner.try_create(record)
        }

        fn record(&self, key: &str) -> Result<Option<LockRecord>> {
            self.inner.record(key)
        }

        fn remove(&self, key: &str, owner: Option<&str>) -> Result<bool> {
            self.inner.remove(key, owner)
        }
    }

    #[test]
    fn test_transient_backend_errors_are_retried() {
        let strategy = FlakyStrategy::failing(3);
        let mut lock = lock_on(strategy.clone(), &["B", "A"]);
        lock.lock(Duration::from_millis(200)).unwrap();

        assert_eq!(lock.state(), LockState::Locked);
        assert_eq!(strategy.failures_left.load(Ordering::SeqCst), 0);
        assert_eq!(strategy.inner.len(), 2);
    }

    #[test]
    fn test_persistent_backend_errors_time_out() {
        let strategy = FlakyStrategy::failing(usize::MAX);
        let mut lock = lock_on(strategy.clone(), &["B", "A"]);
        let start = Instant::now();
        let err = lock.lock(Duration::from_millis(30)).unwrap_err();

        assert!(start.elapsed() >= Duration::from_millis(30));
        match err {
            Error::LockTimeout { keys } => assert_eq!(keys, vec!["A", "B"]),
            other => panic!("expected timeout, got {:?}", other),
        }
        assert_eq!(lock.state(), LockState::Created);
        assert!(strategy.inner.is_empty());
    }
}

// ============================================================================
// SECTION 4: Stale Eviction
// ============================================================================

mod stale_eviction {
    use super::*;

    fn abandoned_record(key: &LockKey) -> LockRecord {
        let mut record = LockRecord::new(key, &LockOwner::new("crashed worker"));
        record.created = Utc::now() - chrono::Duration::minutes(30);
        record
    }

    #[test]
    fn test_stale_record_is_taken_over() {
        let strategy = memory();
        let key = LockKey::new("Account,42");
        assert!(strategy.try_create(&abandoned_record(&key)).unwrap());

        let mut lock = TransactionLock::with_keys(strategy.clone(), [key.clone()], false);
        lock.lock(Duration::from_millis(100)).unwrap();
        assert!(strategy.is_locked_by_owner(&key, lock.owner()).unwrap());
    }

    #[test]
    fn test_fresh_record_is_not_evicted() {
        let strategy = memory();
        let key = LockKey::new("Account,42");
        let holder = LockOwner::new("live worker");
        strategy.lock(&key, &holder, Duration::ZERO).unwrap();

        let err = strategy
            .lock(&key, &LockOwner::new("contender"), Duration::from_millis(20))
            .unwrap_err();
        assert!(matches!(err, Error::LockTimeout { .. }));
        assert!(strategy.is_locked_by_owner(&key, &holder).unwrap());
    }

    #[test]
    fn test_persistent_stale_record_is_taken_over() {
        let strategy = PersistentLockStrategy::in_memory(fast_config()).unwrap();
        let key = LockKey::new("Order,7,EU");
        assert!(strategy.try_create(&abandoned_record(&key)).unwrap());

        let owner = LockOwner::new("new worker");
        strategy.lock(&key, &owner, Duration::from_millis(100)).unwrap();
        assert!(strategy.is_locked_by_owner(&key, &owner).unwrap());
        assert_eq!(strategy.lock_count().unwrap(), 1);
    }
}

// ============================================================================
// SECTION 5: Persistent Locks
// ============================================================================

mod persistent_locks {
    use super::*;

    /// Two strategies on the same database file behave like two processes
    #[test]
    fn test_two_connections_share_lock_table() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("locks.db");
        let first: Arc<dyn LockStrategy> =
            Arc::new(PersistentLockStrategy::open(&path, fast_config()).unwrap());
        let second: Arc<dyn LockStrategy> =
            Arc::new(PersistentLockStrategy::open(&path, fast_config()).unwrap());

        let mut held = lock_on(Arc::clone(&first), &["Account,1", "Account,2"]);
        held.lock(Duration::ZERO).unwrap();

        let mut blocked = lock_on(Arc::clone(&second), &["Account,2"]);
        assert!(matches!(
            blocked.lock(Duration::from_millis(30)),
            Err(Error::LockTimeout { .. })
        ));

        held.release();
        let mut retry = lock_on(Arc::clone(&second), &["Account,2"]);
        retry.lock(Duration::from_millis(30)).unwrap();
        assert!(first.is_locked(&LockKey::new("Account,2")).unwrap());
    }

    #[test]
    fn test_threads_contend_on_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("locks.db");
        let num_threads = 4;
        let barrier = Arc::new(Barrier::new(num_threads));
        let completed = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..num_threads)
            .map(|_| {
                let path = path.clone();
                let barrier = Arc::clone(&barrier);
                let completed = Arc::clone(&completed);
                thread::spawn(move || {
                    let strategy: Arc<dyn LockStrategy> =
                        Arc::new(PersistentLockStrategy::open(&path, fast_config()).unwrap());
                    barrier.wait();
                    for _ in 0..5 {
                        let mut lock = lock_on(Arc::clone(&strategy), &["B", "A"]);
                        lock.lock(Duration::from_secs(10)).unwrap();
                        lock.release();
                    }
                    completed.fetch_add(1, Ordering::SeqCst);
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(completed.load(Ordering::SeqCst), num_threads);

        let check = PersistentLockStrategy::open(&path, fast_config()).unwrap();
        assert_eq!(check.lock_count().unwrap(), 0);
    }
}

// ============================================================================
// SECTION 6: Canonical Ordering
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Keys reach the strategy sorted, whatever order they were given in
    #[test]
    fn prop_keys_are_requested_in_canonical_order(
        names in prop::collection::vec("[A-Z][a-z]{0,3},[0-9]{1,3}", 1..8)
    ) {
        let strategy = Arc::new(RecordingStrategy::new());
        let mut lock = TransactionLock::with_keys(
            strategy.clone(),
            names.iter().map(|n| LockKey::new(n.as_str())),
            false,
        );
        lock.lock(Duration::from_millis(10)).unwrap();

        let requests = strategy.requests.lock().clone();
        let mut expected = names.clone();
        expected.sort();
        expected.dedup();
        prop_assert_eq!(requests, expected);
    }

    /// Two sets sharing keys request the shared keys in the same relative order
    #[test]
    fn prop_shared_keys_have_same_relative_order(
        shared in prop::collection::btree_set("[a-z]{1,3}", 2..5),
        left in prop::collection::vec("[a-z]{1,3}", 0..4),
        right in prop::collection::vec("[a-z]{1,3}", 0..4),
    ) {
        let order_of = |extra: &[String]| {
            let strategy = Arc::new(RecordingStrategy::new());
            let mut lock = TransactionLock::with_keys(
                strategy.clone(),
                extra.iter().rev().chain(shared.iter()).map(|n| LockKey::new(n.as_str())),
                false,
            );
            lock.lock(Duration::from_millis(10)).unwrap();
            let requests = strategy.requests.lock().clone();
            requests
                .into_iter()
                .filter(|k| shared.contains(k))
                .collect::<Vec<_>>()
        };
        prop_assert_eq!(order_of(&left), order_of(&right));
    }
}

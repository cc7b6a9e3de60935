use crate::clock::MockClock;
use crate::context::StoreContext;
use crate::manager::LockManager;
use crate::store::{FileStore, LockStore, MemoryStore};
use crate::types::{JobId, TargetId};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

pub(crate) const LEASE: Duration = Duration::from_secs(2);
pub(crate) const JOB: JobId = JobId(123);
pub(crate) const OTHER_JOB: JobId = JobId(124);

/// A lock manager wired to a mock clock, plus whatever keeps its store alive.
pub(crate) struct Harness {
    pub(crate) name: &'static str,
    pub(crate) manager: LockManager,
    pub(crate) clock: MockClock,
    pub(crate) memory: Option<Arc<MemoryStore>>,
    _temp_dir: Option<TempDir>,
}

impl Harness {
    pub(crate) fn memory(max_batch_size: usize) -> Self {
        Self::memory_with(MemoryStore::new(), max_batch_size)
    }

    pub(crate) fn memory_with(store: MemoryStore, max_batch_size: usize) -> Self {
        let store = Arc::new(store);
        let clock = MockClock::default();
        let manager = LockManager::new(Arc::clone(&store) as Arc<dyn LockStore>)
            .with_clock(Arc::new(clock.clone()))
            .with_max_batch_size(max_batch_size);
        Self {
            name: "memory",
            manager,
            clock,
            memory: Some(store),
            _temp_dir: None,
        }
    }

    pub(crate) fn file(max_batch_size: usize) -> Self {
        let temp_dir = TempDir::new().unwrap();
        let ctx = StoreContext::at(temp_dir.path());
        let clock = MockClock::default();
        let manager = LockManager::new(Arc::new(FileStore::new(&ctx)))
            .with_clock(Arc::new(clock.clone()))
            .with_max_batch_size(max_batch_size);
        Self {
            name: "file",
            manager,
            clock,
            memory: None,
            _temp_dir: Some(temp_dir),
        }
    }

    /// Both backends with the same batch size.
    pub(crate) fn all(max_batch_size: usize) -> Vec<Self> {
        vec![Self::memory(max_batch_size), Self::file(max_batch_size)]
    }

    pub(crate) fn advance(&self, by: Duration) {
        self.clock.advance(by);
    }
}

pub(crate) fn targets(ids: &[&str]) -> Vec<TargetId> {
    ids.iter().map(|id| TargetId::from(*id)).collect()
}

/// `count` targets named `t1`, `t2`, ...
pub(crate) fn numbered_targets(count: usize) -> Vec<TargetId> {
    (1..=count).map(|i| TargetId::new(format!("t{}", i))).collect()
}

use std::sync::Arc;

use dashmap::DashMap;
use stagger_core::JobId;
use tokio::sync::{watch, Mutex, MutexGuard};

use crate::types::{JobRecord, JobSnapshot};

/// One active job: the record behind its cycle lock, plus the last status
/// published from inside that lock.
///
/// Readers only touch the published status, so a send in flight never
/// delays a status lookup.
pub struct JobSlot {
    record: Mutex<JobRecord>,
    status: watch::Sender<JobSnapshot>,
}

impl JobSlot {
    fn new(record: JobRecord) -> Self {
        let status = watch::Sender::new(record.snapshot(None));
        Self {
            record: Mutex::new(record),
            status,
        }
    }

    /// Take the cycle lock. Held for a whole dispatch cycle, send included.
    pub async fn lock(&self) -> MutexGuard<'_, JobRecord> {
        self.record.lock().await
    }

    /// Replace the published status with the current state of `record`.
    pub fn publish(&self, record: &JobRecord) {
        self.status.send_replace(record.snapshot(None));
    }

    /// Last published status. Never waits.
    pub fn status(&self) -> JobSnapshot {
        self.status.borrow().clone()
    }
}

/// Shared handle to one job.
pub type JobHandle = Arc<JobSlot>;

/// Process-wide table of active staggered jobs.
///
/// Map operations are atomic per key. Callers clone the [`JobHandle`] out of
/// the map before awaiting its lock so no shard guard is held across an await.
#[derive(Default)]
pub struct JobStore {
    jobs: DashMap<JobId, JobHandle>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new record. Returns `false` (and leaves the map untouched)
    /// if the ID is already present.
    pub fn insert(&self, record: JobRecord) -> bool {
        use dashmap::mapref::entry::Entry;
        match self.jobs.entry(record.job_id.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(JobSlot::new(record)));
                true
            }
        }
    }

    pub fn get(&self, id: &JobId) -> Option<JobHandle> {
        self.jobs.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// Remove a record. Removing an absent ID is a no-op returning `false`.
    pub fn remove(&self, id: &JobId) -> bool {
        self.jobs.remove(id).is_some()
    }

    pub fn contains(&self, id: &JobId) -> bool {
        self.jobs.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Published status of a single job.
    pub fn snapshot(&self, id: &JobId) -> Option<JobSnapshot> {
        self.jobs.get(id).map(|entry| entry.value().status())
    }

    /// Published status of every job, oldest first.
    pub fn snapshots(&self) -> Vec<JobSnapshot> {
        let mut out: Vec<JobSnapshot> = self.jobs.iter().map(|e| e.value().status()).collect();
        out.sort_by_key(|s| s.created_at);
        out
    }
}

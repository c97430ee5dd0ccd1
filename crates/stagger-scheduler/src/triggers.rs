//! Recurring cron triggers, one Tokio task per job.
//!
//! A trigger only announces that a job is due: it pushes the job ID onto the
//! fire queue and goes back to sleep. The controller drains that queue and
//! runs the dispatch cycles, so aborting a trigger never interrupts a send.

use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use dashmap::DashMap;
use stagger_core::JobId;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{
    cron::CronSpec,
    error::{Result, SchedulerError},
};

struct Trigger {
    spec: CronSpec,
    task: JoinHandle<()>,
}

/// Registered cron triggers keyed by job ID.
pub struct TriggerRegistry {
    triggers: DashMap<JobId, Trigger>,
    fired_tx: mpsc::Sender<JobId>,
    closed: AtomicBool,
}

impl TriggerRegistry {
    /// Fires are delivered with `try_send` on `fired_tx`, so a full queue
    /// drops that fire instead of stalling the trigger.
    pub fn new(fired_tx: mpsc::Sender<JobId>) -> Self {
        Self {
            triggers: DashMap::new(),
            fired_tx,
            closed: AtomicBool::new(false),
        }
    }

    /// Start firing `job_id` on `spec`.
    ///
    /// Re-registering an ID replaces its trigger. Fails once the registry
    /// has been shut down. Must be called inside a Tokio runtime.
    pub fn register(&self, job_id: &JobId, spec: CronSpec) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SchedulerError::ShuttingDown);
        }
        let (cron, zone) = (spec.expression().to_string(), spec.zone());
        let task = tokio::spawn(drive(job_id.clone(), spec.clone(), self.fired_tx.clone()));
        if let Some(old) = self.triggers.insert(job_id.clone(), Trigger { spec, task }) {
            old.task.abort();
            debug!(job_id = %job_id, "replaced existing trigger");
        }
        info!(job_id = %job_id, cron = %cron, zone = %zone, "trigger registered");
        Ok(())
    }

    /// Stop firing `job_id`. Returns `false` if nothing was registered.
    pub fn deregister(&self, job_id: &JobId) -> bool {
        match self.triggers.remove(job_id) {
            Some((_, trigger)) => {
                trigger.task.abort();
                info!(job_id = %job_id, "trigger deregistered");
                true
            }
            None => false,
        }
    }

    pub fn is_registered(&self, job_id: &JobId) -> bool {
        self.triggers.contains_key(job_id)
    }

    pub fn len(&self) -> usize {
        self.triggers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triggers.is_empty()
    }

    /// Next time the job's schedule matches, from now.
    pub fn next_fire(&self, job_id: &JobId) -> Option<chrono::DateTime<Utc>> {
        let trigger = self.triggers.get(job_id)?;
        trigger.spec.next_after(&Utc::now())
    }

    /// Abort every trigger and refuse new registrations.
    pub fn shutdown(&self) {
        self.closed.store(true, Ordering::Release);
        let count = self.triggers.len();
        self.triggers.retain(|_, trigger| {
            trigger.task.abort();
            false
        });
        if count > 0 {
            info!(count, "all triggers stopped");
        }
    }
}

impl Drop for TriggerRegistry {
    fn drop(&mut self) {
        for entry in self.triggers.iter() {
            entry.value().task.abort();
        }
    }
}

async fn drive(job_id: JobId, spec: CronSpec, fired_tx: mpsc::Sender<JobId>) {
    let mut cursor = Utc::now();
    loop {
        let Some(next) = spec.next_after(&cursor) else {
            warn!(job_id = %job_id, "schedule has no further fire times");
            return;
        };
        let delay = (next - Utc::now()).to_std().unwrap_or_default();
        tokio::time::sleep(delay).await;
        // Late wakeups skip missed slots instead of replaying them.
        cursor = next.max(Utc::now());

        match fired_tx.try_send(job_id.clone()) {
            Ok(()) => debug!(job_id = %job_id, fired_at = %next, "trigger fired"),
            Err(TrySendError::Full(_)) => {
                warn!(job_id = %job_id, "fire queue full, fire dropped");
            }
            Err(TrySendError::Closed(_)) => {
                debug!(job_id = %job_id, "fire queue closed, trigger exiting");
                return;
            }
        }
    }
}

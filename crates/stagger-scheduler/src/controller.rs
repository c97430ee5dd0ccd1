use std::sync::Arc;

use stagger_agent::ContentGenerator;
use stagger_channels::{Dispatcher, OutboundEmail};
use stagger_core::JobId;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::{
    cron::{CronSpec, ScheduleZone},
    error::{Result, SchedulerError},
    store::JobStore,
    triggers::TriggerRegistry,
    types::{CreateJobRequest, CycleOutcome, DispatchEvent, JobRecord, JobSnapshot, DEFAULT_SUBJECT},
};

const EVENT_CAPACITY: usize = 256;

/// Owns the lifecycle of staggered jobs.
///
/// `create_job` sends to the first recipient before returning; every later
/// recipient is sent to from a cycle spawned by [`StaggerController::run`]
/// when the job's trigger fires.
pub struct StaggerController {
    store: Arc<JobStore>,
    triggers: TriggerRegistry,
    generator: Arc<dyn ContentGenerator>,
    dispatcher: Arc<dyn Dispatcher>,
    events: broadcast::Sender<DispatchEvent>,
    zone: ScheduleZone,
}

impl StaggerController {
    /// `fired_tx` is the sending half of the fire queue; hand the receiving
    /// half to [`StaggerController::run`].
    pub fn new(
        store: Arc<JobStore>,
        generator: Arc<dyn ContentGenerator>,
        dispatcher: Arc<dyn Dispatcher>,
        fired_tx: mpsc::Sender<JobId>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            store,
            triggers: TriggerRegistry::new(fired_tx),
            generator,
            dispatcher,
            events,
            zone: ScheduleZone::Utc,
        }
    }

    /// Read every job's cron expression in `zone` (UTC by default).
    pub fn with_zone(mut self, zone: ScheduleZone) -> Self {
        self.zone = zone;
        self
    }

    /// Validate the request, generate the body, schedule the job and send to
    /// the first recipient.
    ///
    /// Failing to send to the first recipient is not an error: the job stays
    /// active and the next fire retries that recipient.
    pub async fn create_job(&self, request: CreateJobRequest) -> Result<JobId> {
        let CreateJobRequest {
            sender,
            recipients,
            prompt,
            subject,
            cron,
        } = request;

        if recipients.is_empty() {
            return Err(SchedulerError::InvalidInput(
                "At least one recipient is required.".to_string(),
            ));
        }
        // Reject bad schedules before spending a generation call.
        let spec = CronSpec::parse(&cron)?.in_zone(self.zone);

        let email_body = self.generator.generate(&prompt).await.map_err(|e| {
            error!(error = %e, "email generation failed, job not created");
            SchedulerError::GenerationFailed(e)
        })?;

        let job_id = JobId::new();
        let subject = subject
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_SUBJECT.to_string());
        let total = recipients.len();
        let cron = spec.expression().to_string();
        let record = JobRecord::new(
            job_id.clone(),
            sender,
            recipients,
            subject,
            email_body,
            cron.clone(),
        );

        if !self.store.insert(record) {
            return Err(SchedulerError::JobExists {
                id: job_id.to_string(),
            });
        }
        // Only fails once shutdown has begun.
        if let Err(e) = self.triggers.register(&job_id, spec) {
            self.store.remove(&job_id);
            warn!(job_id = %job_id, error = %e, "trigger registration failed, job dropped");
            return Err(e);
        }

        info!(job_id = %job_id, recipients = total, cron = %cron, "staggered job created");

        self.fire(&job_id).await;
        Ok(job_id)
    }

    /// One advance-or-complete step for `job_id`.
    ///
    /// Runs entirely under the job's lock, so concurrent cycles for the same
    /// job each target a distinct recipient. Status readers see the state
    /// published before the send until the cycle publishes its result.
    /// Never fails: delivery errors are reported in the returned outcome.
    pub async fn run_dispatch_cycle(&self, job_id: &JobId) -> CycleOutcome {
        let Some(handle) = self.store.get(job_id) else {
            return CycleOutcome::NotFound;
        };
        let mut record = handle.lock().await;

        if record.is_exhausted() {
            // A cycle that finished the job may have held the lock first.
            return if self.retire(job_id) {
                CycleOutcome::Completed
            } else {
                CycleOutcome::NotFound
            };
        }
        // The job may have been retired between the lookup and the lock.
        if !self.store.contains(job_id) {
            return CycleOutcome::NotFound;
        }

        let index = record.next_index;
        let recipient = record.recipients[index].clone();
        let email = OutboundEmail::single(
            record.sender.clone(),
            recipient.clone(),
            record.subject.clone(),
            record.email_body.clone(),
        );

        match self.dispatcher.send(&email).await {
            Ok(()) => {
                record.record_delivery();
                handle.publish(&record);
                let remaining = record.recipients.len() - record.next_index;
                let completed = remaining == 0;
                if completed {
                    self.retire(job_id);
                }
                CycleOutcome::Delivered {
                    index,
                    recipient,
                    remaining,
                    completed,
                }
            }
            Err(e) => {
                let error = e.to_string();
                record.record_failure(error.clone());
                handle.publish(&record);
                CycleOutcome::Failed {
                    index,
                    recipient,
                    attempts: record.failed_attempts,
                    error,
                }
            }
        }
    }

    /// Run one cycle and report it: one log line plus broadcast events.
    pub async fn fire(&self, job_id: &JobId) -> CycleOutcome {
        let outcome = self.run_dispatch_cycle(job_id).await;
        match &outcome {
            CycleOutcome::Delivered {
                index,
                recipient,
                remaining,
                completed,
            } => {
                info!(job_id = %job_id, index, recipient = %recipient, remaining, completed, "email delivered");
                self.emit(DispatchEvent::Delivered {
                    job_id: job_id.clone(),
                    index: *index,
                    recipient: recipient.clone(),
                    remaining: *remaining,
                });
                if *completed {
                    self.emit(DispatchEvent::Completed {
                        job_id: job_id.clone(),
                    });
                }
            }
            CycleOutcome::Failed {
                index,
                recipient,
                attempts,
                error,
            } => {
                warn!(
                    job_id = %job_id,
                    index,
                    recipient = %recipient,
                    attempts,
                    error = %error,
                    "delivery failed, will retry on next fire"
                );
                self.emit(DispatchEvent::Failed {
                    job_id: job_id.clone(),
                    index: *index,
                    recipient: recipient.clone(),
                    attempts: *attempts,
                    error: error.clone(),
                });
            }
            CycleOutcome::Completed => {
                info!(job_id = %job_id, "staggered job completed");
                self.emit(DispatchEvent::Completed {
                    job_id: job_id.clone(),
                });
            }
            CycleOutcome::NotFound => {
                info!(job_id = %job_id, "fire for inactive job ignored");
            }
        }
        outcome
    }

    /// Drain the fire queue until `shutdown` broadcasts `true` or its sender
    /// is dropped. Each fire runs in its own task.
    pub async fn run(
        self: Arc<Self>,
        mut fired_rx: mpsc::Receiver<JobId>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!("stagger controller started");
        loop {
            tokio::select! {
                fired = fired_rx.recv() => {
                    let Some(job_id) = fired else { break };
                    let controller = Arc::clone(&self);
                    tokio::spawn(async move {
                        controller.fire(&job_id).await;
                    });
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        self.shutdown();
        info!("stagger controller stopped");
    }

    /// Stop every trigger. Active records stay readable but never advance.
    pub fn shutdown(&self) {
        self.triggers.shutdown();
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DispatchEvent> {
        self.events.subscribe()
    }

    /// Last published status of `job_id`. Never waits on a send in flight.
    pub fn job(&self, job_id: &JobId) -> Result<JobSnapshot> {
        let snapshot = self
            .store
            .snapshot(job_id)
            .ok_or_else(|| SchedulerError::JobNotFound {
                id: job_id.to_string(),
            })?;
        Ok(self.with_next_fire(snapshot))
    }

    pub fn jobs(&self) -> Vec<JobSnapshot> {
        self.store
            .snapshots()
            .into_iter()
            .map(|s| self.with_next_fire(s))
            .collect()
    }

    pub fn active_jobs(&self) -> usize {
        self.store.len()
    }

    /// True while `job_id` has a registered trigger.
    pub fn is_scheduled(&self, job_id: &JobId) -> bool {
        self.triggers.is_registered(job_id)
    }

    /// Deregister then delete. Returns `true` only for the call that
    /// actually removed the record.
    fn retire(&self, job_id: &JobId) -> bool {
        self.triggers.deregister(job_id);
        let removed = self.store.remove(job_id);
        if removed {
            debug!(job_id = %job_id, "job retired");
        }
        removed
    }

    fn with_next_fire(&self, mut snapshot: JobSnapshot) -> JobSnapshot {
        snapshot.next_fire_at = self.triggers.next_fire(&snapshot.job_id);
        snapshot
    }

    fn emit(&self, event: DispatchEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

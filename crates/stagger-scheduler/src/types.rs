use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use stagger_core::{EmailAddress, JobId, SenderIdentity};

/// Subject used when a staggered job is created without one.
pub const DEFAULT_SUBJECT: &str = "Automated Scheduled Email";

/// Everything needed to start a staggered job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateJobRequest {
    pub sender: SenderIdentity,
    /// Delivery order is list order.
    pub recipients: Vec<EmailAddress>,
    /// Instructions for the content generator.
    pub prompt: String,
    pub subject: Option<String>,
    /// 5-field crontab expression, e.g. `*/2 * * * *`.
    pub cron: String,
}

/// In-memory state of one active staggered job.
///
/// Everything except the cursor and the transient delivery status is frozen
/// at creation. Only dispatch cycles mutate a record, always under the job's
/// lock.
#[derive(Debug, Clone)]
pub struct JobRecord {
    pub(crate) job_id: JobId,
    pub(crate) sender: SenderIdentity,
    pub(crate) recipients: Vec<EmailAddress>,
    pub(crate) subject: String,
    pub(crate) email_body: String,
    pub(crate) cron_expression: String,
    /// Index of the next recipient to send to. Never exceeds `recipients.len()`.
    pub(crate) next_index: usize,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) last_delivered_at: Option<DateTime<Utc>>,
    /// Consecutive failures at the current cursor.
    pub(crate) failed_attempts: u32,
    pub(crate) last_error: Option<String>,
}

impl JobRecord {
    pub fn new(
        job_id: JobId,
        sender: SenderIdentity,
        recipients: Vec<EmailAddress>,
        subject: String,
        email_body: String,
        cron_expression: String,
    ) -> Self {
        Self {
            job_id,
            sender,
            recipients,
            subject,
            email_body,
            cron_expression,
            next_index: 0,
            created_at: Utc::now(),
            last_delivered_at: None,
            failed_attempts: 0,
            last_error: None,
        }
    }

    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    pub fn next_index(&self) -> usize {
        self.next_index
    }

    /// True once every recipient has been sent to.
    pub fn is_exhausted(&self) -> bool {
        self.next_index >= self.recipients.len()
    }

    /// The recipient the next cycle will target, if any.
    pub fn current_recipient(&self) -> Option<&EmailAddress> {
        self.recipients.get(self.next_index)
    }

    /// Advance the cursor after a successful send.
    pub(crate) fn record_delivery(&mut self) {
        if self.is_exhausted() {
            return;
        }
        self.next_index += 1;
        self.last_delivered_at = Some(Utc::now());
        self.failed_attempts = 0;
        self.last_error = None;
    }

    /// Note a failed send. The cursor stays put.
    pub(crate) fn record_failure(&mut self, error: String) {
        self.failed_attempts = self.failed_attempts.saturating_add(1);
        self.last_error = Some(error);
    }

    pub fn snapshot(&self, next_fire_at: Option<DateTime<Utc>>) -> JobSnapshot {
        JobSnapshot {
            job_id: self.job_id.clone(),
            sender: self.sender.mailbox(),
            subject: self.subject.clone(),
            cron: self.cron_expression.clone(),
            total_recipients: self.recipients.len(),
            next_index: self.next_index,
            next_recipient: self.current_recipient().cloned(),
            failed_attempts: self.failed_attempts,
            last_error: self.last_error.clone(),
            created_at: self.created_at,
            last_delivered_at: self.last_delivered_at,
            next_fire_at,
        }
    }
}

/// Read-only view of a job for status endpoints and logs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub job_id: JobId,
    pub sender: String,
    pub subject: String,
    pub cron: String,
    pub total_recipients: usize,
    pub next_index: usize,
    pub next_recipient: Option<EmailAddress>,
    pub failed_attempts: u32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_delivered_at: Option<DateTime<Utc>>,
    pub next_fire_at: Option<DateTime<Utc>>,
}

/// Result of one dispatch cycle. Never an error from the caller's view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// `recipient` (at `index`) was sent to and the cursor advanced.
    /// `completed` is set when that was the last recipient.
    Delivered {
        index: usize,
        recipient: EmailAddress,
        remaining: usize,
        completed: bool,
    },
    /// The send failed; the same recipient is retried on the next fire.
    Failed {
        index: usize,
        recipient: EmailAddress,
        attempts: u32,
        error: String,
    },
    /// The cursor was already at the end; this cycle retired the job.
    Completed,
    /// No active job with that ID (finished earlier, or never existed).
    NotFound,
}

/// Per-cycle event broadcast to observers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DispatchEvent {
    Delivered {
        job_id: JobId,
        index: usize,
        recipient: EmailAddress,
        remaining: usize,
    },
    Failed {
        job_id: JobId,
        index: usize,
        recipient: EmailAddress,
        attempts: u32,
        error: String,
    },
    Completed {
        job_id: JobId,
    },
}

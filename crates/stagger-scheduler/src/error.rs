use stagger_agent::GenerationError;
use thiserror::Error;

/// Errors surfaced to callers of the staggered job controller.
///
/// Delivery failures are deliberately absent: they never leave a dispatch
/// cycle and are reported as [`crate::types::CycleOutcome::Failed`] instead.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The request itself is unusable (e.g. no recipients).
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The cron expression could not be turned into a schedule.
    #[error("Invalid cron expression {expression:?}: {reason}")]
    InvalidCronSchedule { expression: String, reason: String },

    /// The email body could not be generated; no job was created.
    #[error("Failed to generate email: {0}")]
    GenerationFailed(#[from] GenerationError),

    /// A job with this ID is already in the store.
    #[error("Job already exists: {id}")]
    JobExists { id: String },

    /// No active job with the given ID (never created, or already finished).
    #[error("Job not found: {id}")]
    JobNotFound { id: String },

    /// The controller has stopped and takes no new jobs.
    #[error("Scheduler is shutting down")]
    ShuttingDown,
}

impl SchedulerError {
    /// Short error code string returned to HTTP clients.
    pub fn code(&self) -> &'static str {
        match self {
            SchedulerError::InvalidInput(_) => "INVALID_INPUT",
            SchedulerError::InvalidCronSchedule { .. } => "INVALID_CRON_SCHEDULE",
            SchedulerError::GenerationFailed(_) => "GENERATION_FAILED",
            SchedulerError::JobExists { .. } => "JOB_EXISTS",
            SchedulerError::JobNotFound { .. } => "JOB_NOT_FOUND",
            SchedulerError::ShuttingDown => "SHUTTING_DOWN",
        }
    }
}

pub type Result<T> = std::result::Result<T, SchedulerError>;

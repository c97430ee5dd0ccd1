//! `stagger-scheduler`: staggered email jobs driven by cron triggers.
//!
//! # Overview
//!
//! A staggered job sends one pre-generated email to a list of recipients,
//! one recipient per trigger fire. The body is generated once when the job is
//! created and the first recipient is sent to before `create_job` returns.
//! When the cursor reaches the end of the list the job removes its own
//! record and trigger.
//!
//! | Piece                             | Role                                          |
//! |-----------------------------------|-----------------------------------------------|
//! | [`store::JobStore`]               | Active jobs: cycle lock plus published status |
//! | [`triggers::TriggerRegistry`]     | One Tokio task per job, pushes fires          |
//! | [`controller::StaggerController`] | Creation, dispatch cycles, the fire loop      |
//! | [`cron::CronSpec`]                | 5-field crontab parsing, per-zone matching    |
//!
//! Jobs live in memory only and are lost on restart.

pub mod controller;
pub mod cron;
pub mod error;
pub mod store;
pub mod triggers;
pub mod types;

pub use controller::StaggerController;
pub use cron::{CronSpec, ScheduleZone};
pub use error::{Result, SchedulerError};
pub use store::JobStore;
pub use triggers::TriggerRegistry;
pub use types::{CreateJobRequest, CycleOutcome, DispatchEvent, JobSnapshot, DEFAULT_SUBJECT};

//! `stagger-core`: configuration, error and identity types shared by every
//! stagger crate.

pub mod config;
pub mod error;
pub mod types;

pub use error::{Result, StaggerError};
pub use types::{EmailAddress, JobId, SenderIdentity};

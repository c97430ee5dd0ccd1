use thiserror::Error;

#[derive(Debug, Error)]
pub enum StaggerError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid email address: {0:?}")]
    InvalidAddress(String),
}

pub type Result<T> = std::result::Result<T, StaggerError>;

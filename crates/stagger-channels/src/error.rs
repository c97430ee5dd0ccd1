use thiserror::Error;

/// Errors that can occur while handing an email to the outside world.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The relay could not be reached (DNS, TLS, connection reset, …).
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The relay answered but refused the message.
    #[error("Rejected by relay ({status}): {reason}")]
    Rejected { status: u16, reason: String },

    /// The relay did not answer within the configured time budget.
    #[error("Send timed out after {ms}ms")]
    Timeout { ms: u64 },

    /// The dispatcher is misconfigured (bad URL, bad sender override, …).
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

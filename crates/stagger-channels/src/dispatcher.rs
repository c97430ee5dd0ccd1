use async_trait::async_trait;
use tracing::info;

use crate::{error::DeliveryError, types::OutboundEmail};

/// Common interface implemented by every delivery backend.
///
/// Implementations own their connection setup and must bound each call with
/// a timeout: the scheduler holds a job's lock while a send is in flight.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// Stable lowercase identifier used in logs (e.g. `"http-relay"`).
    fn name(&self) -> &str;

    /// Deliver one email to every address in `email.to`.
    async fn send(&self, email: &OutboundEmail) -> Result<(), DeliveryError>;
}

/// Dry-run dispatcher: logs the email and reports success.
///
/// Used when no relay is configured so the scheduler can be exercised locally.
#[derive(Debug, Default)]
pub struct LogDispatcher;

#[async_trait]
impl Dispatcher for LogDispatcher {
    fn name(&self) -> &str {
        "log"
    }

    async fn send(&self, email: &OutboundEmail) -> Result<(), DeliveryError> {
        info!(
            from = %email.sender.mailbox(),
            to = %email.to_header(),
            subject = %email.subject,
            body_len = email.body.len(),
            "dry-run send (no mail relay configured)"
        );
        Ok(())
    }
}

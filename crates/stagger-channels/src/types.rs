use serde::{Deserialize, Serialize};
use stagger_core::{EmailAddress, SenderIdentity};

/// A fully composed plain-text email ready for delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundEmail {
    pub sender: SenderIdentity,

    /// Every address receives the same message. Staggered jobs always send to
    /// exactly one.
    pub to: Vec<EmailAddress>,

    pub subject: String,

    /// Plain text body.
    pub body: String,
}

impl OutboundEmail {
    pub fn single(
        sender: SenderIdentity,
        recipient: EmailAddress,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            sender,
            to: vec![recipient],
            subject: subject.into(),
            body: body.into(),
        }
    }

    /// Comma separated `To` header value.
    pub fn to_header(&self) -> String {
        self.to
            .iter()
            .map(EmailAddress::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

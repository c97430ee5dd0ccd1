//! One-off send: POST /generate-and-send-email
//!
//! Generates one email and sends it to every recipient in a single message.
//!
//! Request:  `{"from_email", "from_name"?, "recipients": [...], "prompt", "subject"?}`
//! Response: `{"status": "sent", "subject", "body", "recipients": [...]}`

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use stagger_channels::OutboundEmail;
use stagger_core::{EmailAddress, SenderIdentity};
use std::sync::Arc;
use tracing::info;

use crate::app::AppState;
use crate::http::error::ApiError;

const DEFAULT_ONE_OFF_SUBJECT: &str = "Automated Email";

/// Fields shared by the one-off and staggered endpoints.
#[derive(Debug, Deserialize)]
pub struct EmailFields {
    pub from_email: String,
    #[serde(default)]
    pub from_name: Option<String>,
    pub recipients: Vec<String>,
    pub prompt: String,
    #[serde(default)]
    pub subject: Option<String>,
}

impl EmailFields {
    pub fn sender(&self) -> Result<SenderIdentity, ApiError> {
        let address = EmailAddress::parse(&self.from_email)
            .map_err(|_| ApiError::InvalidInput(format!("Invalid from_email: {}", self.from_email)))?;
        Ok(SenderIdentity::new(address, self.from_name.clone()))
    }

    /// Parse every recipient, failing on the first malformed one.
    pub fn recipients(&self) -> Result<Vec<EmailAddress>, ApiError> {
        self.recipients
            .iter()
            .map(|raw| {
                EmailAddress::parse(raw)
                    .map_err(|_| ApiError::InvalidInput(format!("Invalid recipient: {raw}")))
            })
            .collect()
    }

    /// Subject as given, or `None` when absent or blank.
    pub fn subject(&self) -> Option<String> {
        self.subject
            .as_ref()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Serialize)]
pub struct SendReply {
    pub status: &'static str,
    pub subject: String,
    pub body: String,
    pub recipients: Vec<EmailAddress>,
}

pub async fn generate_and_send(
    State(state): State<Arc<AppState>>,
    Json(req): Json<EmailFields>,
) -> Result<Json<SendReply>, ApiError> {
    let sender = req.sender()?;
    let recipients = req.recipients()?;
    if recipients.is_empty() {
        return Err(ApiError::InvalidInput(
            "At least one recipient is required.".to_string(),
        ));
    }
    let subject = req
        .subject()
        .unwrap_or_else(|| DEFAULT_ONE_OFF_SUBJECT.to_string());

    let body = state.generator.generate(&req.prompt).await?;
    let email = OutboundEmail {
        sender,
        to: recipients.clone(),
        subject: subject.clone(),
        body: body.clone(),
    };
    state.dispatcher.send(&email).await?;

    info!(recipients = recipients.len(), dispatcher = state.dispatcher.name(), "one-off email sent");

    Ok(Json(SendReply {
        status: "sent",
        subject,
        body,
        recipients,
    }))
}

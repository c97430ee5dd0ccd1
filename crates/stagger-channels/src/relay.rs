//! HTTP mail relay dispatcher.
//!
//! Posts each email as JSON to a transactional-mail style endpoint:
//!
//! ```json
//! {"from": "Ada <ada@example.com>", "to": ["bob@example.com"],
//!  "subject": "Hello", "text": "..."}
//! ```
//!
//! Any 2xx answer counts as delivered.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use stagger_core::{config::MailConfig, EmailAddress};
use tracing::{debug, warn};

use crate::{dispatcher::Dispatcher, error::DeliveryError, types::OutboundEmail};

pub struct HttpRelayDispatcher {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
    sender_override: Option<EmailAddress>,
    timeout: Duration,
}

#[derive(Serialize)]
struct RelayPayload<'a> {
    from: String,
    to: Vec<&'a str>,
    subject: &'a str,
    text: &'a str,
}

impl HttpRelayDispatcher {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, DeliveryError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DeliveryError::ConfigError(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
            api_key: None,
            sender_override: None,
            timeout,
        })
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_sender_override(mut self, address: EmailAddress) -> Self {
        self.sender_override = Some(address);
        self
    }

    /// Build from the `[mail]` config section. Requires `relay_url`.
    pub fn from_config(config: &MailConfig) -> Result<Self, DeliveryError> {
        let url = config
            .relay_url
            .clone()
            .ok_or_else(|| DeliveryError::ConfigError("mail.relay_url is not set".to_string()))?;

        let mut dispatcher = Self::new(url, Duration::from_secs(config.timeout_secs))?;
        if let Some(key) = config.api_key.as_ref().filter(|k| !k.is_empty()) {
            dispatcher = dispatcher.with_api_key(key.clone());
        }
        if let Some(raw) = &config.sender_override {
            let address = EmailAddress::parse(raw)
                .map_err(|e| DeliveryError::ConfigError(format!("mail.sender_override: {e}")))?;
            dispatcher = dispatcher.with_sender_override(address);
        }
        Ok(dispatcher)
    }

    fn from_header(&self, email: &OutboundEmail) -> String {
        match &self.sender_override {
            Some(address) => email.sender.with_address(address.clone()).mailbox(),
            None => email.sender.mailbox(),
        }
    }
}

#[async_trait]
impl Dispatcher for HttpRelayDispatcher {
    fn name(&self) -> &str {
        "http-relay"
    }

    async fn send(&self, email: &OutboundEmail) -> Result<(), DeliveryError> {
        let payload = RelayPayload {
            from: self.from_header(email),
            to: email.to.iter().map(EmailAddress::as_str).collect(),
            subject: &email.subject,
            text: &email.body,
        };

        debug!(to = %email.to_header(), "posting email to relay");

        let mut request = self.client.post(&self.url).json(&payload);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let resp = request.send().await.map_err(|e| {
            if e.is_timeout() {
                DeliveryError::Timeout {
                    ms: self.timeout.as_millis() as u64,
                }
            } else {
                DeliveryError::ConnectionFailed(e.to_string())
            }
        })?;

        let status = resp.status();
        if !status.is_success() {
            let reason = resp.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), reason = %reason, "mail relay rejected email");
            return Err(DeliveryError::Rejected {
                status: status.as_u16(),
                reason,
            });
        }
        Ok(())
    }
}

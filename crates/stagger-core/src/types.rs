use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::StaggerError;

/// Unique identifier for a staggered job (UUIDv4, never reused).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub String);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A syntactically plausible mailbox address (`local@domain.tld`).
///
/// Only the shape is checked: one `@`, a non-empty local part, a dotted domain
/// and no whitespace. Deliverability is the dispatcher's problem.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EmailAddress(String);

impl EmailAddress {
    pub fn parse(raw: &str) -> Result<Self, StaggerError> {
        let addr = raw.trim();
        let invalid = || StaggerError::InvalidAddress(raw.to_string());

        if addr.is_empty() || addr.chars().any(char::is_whitespace) {
            return Err(invalid());
        }
        let (local, domain) = addr.split_once('@').ok_or_else(invalid)?;
        if local.is_empty() || domain.contains('@') {
            return Err(invalid());
        }
        // domain needs at least one dot with non-empty labels on both sides
        let labels: Vec<&str> = domain.split('.').collect();
        if labels.len() < 2 || labels.iter().any(|l| l.is_empty()) {
            return Err(invalid());
        }
        Ok(Self(addr.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for EmailAddress {
    type Error = StaggerError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<EmailAddress> for String {
    fn from(addr: EmailAddress) -> Self {
        addr.0
    }
}

impl std::str::FromStr for EmailAddress {
    type Err = StaggerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Who a message claims to come from. Fixed for the lifetime of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderIdentity {
    pub from_address: EmailAddress,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl SenderIdentity {
    pub fn new(from_address: EmailAddress, display_name: Option<String>) -> Self {
        // a blank display name is the same as none
        let display_name = display_name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());
        Self {
            from_address,
            display_name,
        }
    }

    /// Same identity, but sending from `address`. The display name is kept.
    pub fn with_address(&self, address: EmailAddress) -> Self {
        Self {
            from_address: address,
            display_name: self.display_name.clone(),
        }
    }

    /// RFC 5322 style mailbox: `Name <addr>` or the bare address.
    pub fn mailbox(&self) -> String {
        match &self.display_name {
            Some(name) => format!("{} <{}>", name, self.from_address),
            None => self.from_address.to_string(),
        }
    }
}

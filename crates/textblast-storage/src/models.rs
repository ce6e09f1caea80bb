//! Database models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use textblast_common::types::{ClientId, MailingId, MessageId, OperatorCode, PhoneNumber};
use textblast_common::{Error, Result};

/// Mailing campaign model
///
/// Scheduling state is always keyed by `id`; two mailings with identical
/// fields are distinct scheduling entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mailing {
    pub id: MailingId,
    pub text: String,
    /// Audience tag texts (OR semantics with operator codes)
    pub tags: Vec<String>,
    /// Audience operator codes (OR semantics with tags)
    pub operator_codes: Vec<OperatorCode>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

/// Input for creating a mailing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateMailing {
    pub text: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub operator_codes: Vec<OperatorCode>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

/// Updates replace the full mailing definition, same shape as creation
pub type UpdateMailing = CreateMailing;

/// Client (recipient) model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Client {
    pub id: ClientId,
    pub phone_number: PhoneNumber,
    pub operator_code: OperatorCode,
    /// Single audience tag per client
    pub tag: String,
    /// Stored for future use; delivery timing does not consult it
    pub timezone: String,
}

/// Input for creating a client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateClient {
    pub phone_number: PhoneNumber,
    pub operator_code: OperatorCode,
    pub tag: String,
    pub timezone: String,
}

/// Updates replace the full client definition, same shape as creation
pub type UpdateClient = CreateClient;

/// Delivery status of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    NotDelivered,
    Delivered,
}

impl std::fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageStatus::NotDelivered => write!(f, "not_delivered"),
            MessageStatus::Delivered => write!(f, "delivered"),
        }
    }
}

impl std::str::FromStr for MessageStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "not_delivered" => Ok(MessageStatus::NotDelivered),
            "delivered" => Ok(MessageStatus::Delivered),
            other => Err(Error::Database(format!("Unknown message status: {}", other))),
        }
    }
}

/// Message model
///
/// Created the moment a delivery attempt is launched; flipped to
/// `Delivered` exactly once by the attempt that observes success.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub mailing_id: MailingId,
    pub client_id: ClientId,
    pub created_at: DateTime<Utc>,
    pub status: MessageStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_status_roundtrip() {
        assert_eq!(MessageStatus::Delivered.to_string(), "delivered");
        assert_eq!(MessageStatus::NotDelivered.to_string(), "not_delivered");
        assert_eq!(
            "delivered".parse::<MessageStatus>().unwrap(),
            MessageStatus::Delivered
        );
        assert!("bogus".parse::<MessageStatus>().is_err());
    }
}

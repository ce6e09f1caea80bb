//! Mailing statistics

use serde::Serialize;
use textblast_storage::models::{Mailing, Message, MessageStatus};

/// Per-mailing message counts grouped by status
#[derive(Debug, Clone, Serialize)]
pub struct MailingStats {
    pub mailing: Mailing,
    pub delivered: usize,
    pub not_delivered: usize,
}

impl MailingStats {
    pub fn from_messages(mailing: Mailing, messages: &[Message]) -> Self {
        let delivered = messages
            .iter()
            .filter(|m| m.status == MessageStatus::Delivered)
            .count();
        Self {
            mailing,
            delivered,
            not_delivered: messages.len() - delivered,
        }
    }
}

/// Stats for one mailing including every message it produced
#[derive(Debug, Clone, Serialize)]
pub struct DetailedMailingStats {
    pub mailing: Mailing,
    pub delivered: usize,
    pub not_delivered: usize,
    pub messages: Vec<Message>,
}

impl DetailedMailingStats {
    pub fn from_messages(mailing: Mailing, messages: Vec<Message>) -> Self {
        let summary = MailingStats::from_messages(mailing, &messages);
        Self {
            mailing: summary.mailing,
            delivered: summary.delivered,
            not_delivered: summary.not_delivered,
            messages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pretty_assertions::assert_eq;

    fn message(id: i64, status: MessageStatus) -> Message {
        Message {
            id,
            mailing_id: 1,
            client_id: id,
            created_at: Utc::now(),
            status,
        }
    }

    #[test]
    fn test_counts_by_status() {
        let now = Utc::now();
        let mailing = Mailing {
            id: 1,
            text: "Hi".to_string(),
            tags: vec![],
            operator_codes: vec![],
            start_time: now,
            end_time: now,
        };
        let messages = vec![
            message(1, MessageStatus::Delivered),
            message(2, MessageStatus::NotDelivered),
            message(3, MessageStatus::Delivered),
        ];

        let stats = MailingStats::from_messages(mailing.clone(), &messages);
        assert_eq!(stats.delivered, 2);
        assert_eq!(stats.not_delivered, 1);

        let detailed = DetailedMailingStats::from_messages(mailing, messages);
        assert_eq!(detailed.delivered, 2);
        assert_eq!(detailed.messages.len(), 3);
    }
}

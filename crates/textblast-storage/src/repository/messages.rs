//! Message repository

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use textblast_common::types::{ClientId, MailingId, MessageId};
use textblast_common::{Error, Result};

use crate::models::{Message, MessageStatus};

/// Message repository
#[derive(Clone)]
pub struct MessageRepository {
    pool: PgPool,
}

impl MessageRepository {
    /// Create a new message repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Record a new message in `NotDelivered` state
    pub async fn create(&self, mailing_id: MailingId, client_id: ClientId) -> Result<Message> {
        let (id, created_at, status): (MessageId, DateTime<Utc>, String) = sqlx::query_as(
            r#"
            INSERT INTO messages (mailing_id, client_id)
            VALUES ($1, $2)
            RETURNING id, created_at, status
            "#,
        )
        .bind(mailing_id)
        .bind(client_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(Message {
            id,
            mailing_id,
            client_id,
            created_at,
            status: status.parse()?,
        })
    }

    /// Update a message's delivery status
    pub async fn update_status(&self, id: MessageId, status: MessageStatus) -> Result<()> {
        let result = sqlx::query("UPDATE messages SET status = $2 WHERE id = $1")
            .bind(id)
            .bind(status.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("Message not found: {}", id)));
        }
        Ok(())
    }

    /// Get all messages produced by a mailing
    pub async fn by_mailing(&self, mailing_id: MailingId) -> Result<Vec<Message>> {
        let rows: Vec<(MessageId, ClientId, DateTime<Utc>, String)> = sqlx::query_as(
            r#"
            SELECT id, client_id, created_at, status
            FROM messages
            WHERE mailing_id = $1
            ORDER BY id
            "#,
        )
        .bind(mailing_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        rows.into_iter()
            .map(|(id, client_id, created_at, status)| {
                Ok(Message {
                    id,
                    mailing_id,
                    client_id,
                    created_at,
                    status: status.parse()?,
                })
            })
            .collect()
    }
}

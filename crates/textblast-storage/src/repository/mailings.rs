//! Mailing repository

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use textblast_common::types::{MailingId, OperatorCode, TagId};
use textblast_common::{Error, Result};

use crate::models::{CreateMailing, Mailing, UpdateMailing};

/// Mailing repository
#[derive(Clone)]
pub struct MailingRepository {
    pool: PgPool,
}

impl MailingRepository {
    /// Create a new mailing repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a new mailing with its tag and operator-code associations
    pub async fn create(&self, input: CreateMailing) -> Result<Mailing> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        let (id,): (MailingId,) = sqlx::query_as(
            "INSERT INTO mailings (text, start_time, end_time) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(&input.text)
        .bind(input.start_time)
        .bind(input.end_time)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Self::replace_associations(&mut tx, id, &input.tags, &input.operator_codes).await?;

        tx.commit()
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        Ok(Mailing {
            id,
            text: input.text,
            tags: input.tags,
            operator_codes: input.operator_codes,
            start_time: input.start_time,
            end_time: input.end_time,
        })
    }

    /// Get a mailing by ID
    pub async fn get(&self, id: MailingId) -> Result<Option<Mailing>> {
        let row: Option<(MailingId, String, DateTime<Utc>, DateTime<Utc>)> = sqlx::query_as(
            "SELECT id, text, start_time, end_time FROM mailings WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        let Some((id, text, start_time, end_time)) = row else {
            return Ok(None);
        };

        Ok(Some(Mailing {
            id,
            text,
            tags: self.tags_for(id).await?,
            operator_codes: self.codes_for(id).await?,
            start_time,
            end_time,
        }))
    }

    /// List all mailings
    pub async fn list_all(&self) -> Result<Vec<Mailing>> {
        let rows: Vec<(MailingId, String, DateTime<Utc>, DateTime<Utc>)> = sqlx::query_as(
            "SELECT id, text, start_time, end_time FROM mailings ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        let mut mailings = Vec::with_capacity(rows.len());
        for (id, text, start_time, end_time) in rows {
            mailings.push(Mailing {
                id,
                text,
                tags: self.tags_for(id).await?,
                operator_codes: self.codes_for(id).await?,
                start_time,
                end_time,
            });
        }
        Ok(mailings)
    }

    /// Replace a mailing's definition; returns `None` when absent
    pub async fn update(&self, id: MailingId, input: UpdateMailing) -> Result<Option<Mailing>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        let updated = sqlx::query(
            "UPDATE mailings SET text = $2, start_time = $3, end_time = $4 WHERE id = $1",
        )
        .bind(id)
        .bind(&input.text)
        .bind(input.start_time)
        .bind(input.end_time)
        .execute(&mut *tx)
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        if updated.rows_affected() == 0 {
            return Ok(None);
        }

        Self::replace_associations(&mut tx, id, &input.tags, &input.operator_codes).await?;

        tx.commit()
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        Ok(Some(Mailing {
            id,
            text: input.text,
            tags: input.tags,
            operator_codes: input.operator_codes,
            start_time: input.start_time,
            end_time: input.end_time,
        }))
    }

    /// Delete a mailing; associations are removed by cascade
    pub async fn delete(&self, id: MailingId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM mailings WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn tags_for(&self, id: MailingId) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT t.text FROM mailing_tags t
            JOIN mailings_tags mt ON mt.tag_id = t.id
            WHERE mt.mailing_id = $1
            ORDER BY t.text
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(rows.into_iter().map(|(text,)| text).collect())
    }

    async fn codes_for(&self, id: MailingId) -> Result<Vec<OperatorCode>> {
        let rows: Vec<(OperatorCode,)> = sqlx::query_as(
            "SELECT code FROM mailing_operator_codes WHERE mailing_id = $1 ORDER BY code",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(rows.into_iter().map(|(code,)| code).collect())
    }

    async fn replace_associations(
        tx: &mut Transaction<'_, Postgres>,
        id: MailingId,
        tags: &[String],
        codes: &[OperatorCode],
    ) -> Result<()> {
        sqlx::query("DELETE FROM mailings_tags WHERE mailing_id = $1")
            .bind(id)
            .execute(&mut **tx)
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        sqlx::query("DELETE FROM mailing_operator_codes WHERE mailing_id = $1")
            .bind(id)
            .execute(&mut **tx)
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        for tag in tags {
            let (tag_id,): (TagId,) = sqlx::query_as(
                r#"
                INSERT INTO mailing_tags (text) VALUES ($1)
                ON CONFLICT (text) DO UPDATE SET text = EXCLUDED.text
                RETURNING id
                "#,
            )
            .bind(tag)
            .fetch_one(&mut **tx)
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

            sqlx::query(
                "INSERT INTO mailings_tags (mailing_id, tag_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
            )
            .bind(id)
            .bind(tag_id)
            .execute(&mut **tx)
            .await
            .map_err(|e| Error::Database(e.to_string()))?;
        }

        for code in codes {
            sqlx::query(
                "INSERT INTO mailing_operator_codes (mailing_id, code) VALUES ($1, $2) ON CONFLICT DO NOTHING",
            )
            .bind(id)
            .bind(code)
            .execute(&mut **tx)
            .await
            .map_err(|e| Error::Database(e.to_string()))?;
        }

        Ok(())
    }
}

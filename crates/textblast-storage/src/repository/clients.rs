//! Client repository

use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use textblast_common::types::{validate_timezone, ClientId, OperatorCode, PhoneNumber, TagId};
use textblast_common::{Error, Result};

use crate::models::{Client, CreateClient, UpdateClient};

/// Client repository
#[derive(Clone)]
pub struct ClientRepository {
    pool: PgPool,
}

const CLIENT_COLUMNS: &str =
    "c.id, c.phone_number, c.operator_code, t.text AS tag, c.timezone";

impl ClientRepository {
    /// Create a new client repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a new client, creating its tag when missing
    pub async fn create(&self, input: CreateClient) -> Result<Client> {
        validate_timezone(&input.timezone)?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        let (tag_id,): (TagId,) = sqlx::query_as(
            r#"
            INSERT INTO mailing_tags (text) VALUES ($1)
            ON CONFLICT (text) DO UPDATE SET text = EXCLUDED.text
            RETURNING id
            "#,
        )
        .bind(&input.tag)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        let (id,): (ClientId,) = sqlx::query_as(
            r#"
            INSERT INTO clients (phone_number, operator_code, tag_id, timezone)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(input.phone_number.get())
        .bind(input.operator_code)
        .bind(tag_id)
        .bind(&input.timezone)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        Ok(Client {
            id,
            phone_number: input.phone_number,
            operator_code: input.operator_code,
            tag: input.tag,
            timezone: input.timezone,
        })
    }

    /// Get a client by ID
    pub async fn get(&self, id: ClientId) -> Result<Option<Client>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM clients c JOIN mailing_tags t ON t.id = c.tag_id WHERE c.id = $1",
            CLIENT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        row.map(client_from_row).transpose()
    }

    /// List clients with pagination
    pub async fn list(&self, limit: i64, offset: i64) -> Result<Vec<Client>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {} FROM clients c JOIN mailing_tags t ON t.id = c.tag_id
            ORDER BY c.id
            LIMIT $1 OFFSET $2
            "#,
            CLIENT_COLUMNS
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        rows.into_iter().map(client_from_row).collect()
    }

    /// Replace a client's definition; returns `None` when absent
    pub async fn update(&self, id: ClientId, input: UpdateClient) -> Result<Option<Client>> {
        validate_timezone(&input.timezone)?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        let (tag_id,): (TagId,) = sqlx::query_as(
            r#"
            INSERT INTO mailing_tags (text) VALUES ($1)
            ON CONFLICT (text) DO UPDATE SET text = EXCLUDED.text
            RETURNING id
            "#,
        )
        .bind(&input.tag)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        let updated = sqlx::query(
            r#"
            UPDATE clients
            SET phone_number = $2, operator_code = $3, tag_id = $4, timezone = $5
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(input.phone_number.get())
        .bind(input.operator_code)
        .bind(tag_id)
        .bind(&input.timezone)
        .execute(&mut *tx)
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        if updated.rows_affected() == 0 {
            return Ok(None);
        }

        tx.commit()
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        Ok(Some(Client {
            id,
            phone_number: input.phone_number,
            operator_code: input.operator_code,
            tag: input.tag,
            timezone: input.timezone,
        }))
    }

    /// Delete a client
    pub async fn delete(&self, id: ClientId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM clients WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    /// Get clients whose tag matches any of the given tag texts
    pub async fn by_tags(&self, tags: &[String]) -> Result<Vec<Client>> {
        if tags.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(&format!(
            r#"
            SELECT {} FROM clients c JOIN mailing_tags t ON t.id = c.tag_id
            WHERE t.text = ANY($1)
            ORDER BY c.id
            "#,
            CLIENT_COLUMNS
        ))
        .bind(tags)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        rows.into_iter().map(client_from_row).collect()
    }

    /// Get clients whose operator code matches any of the given codes
    pub async fn by_operator_codes(&self, codes: &[OperatorCode]) -> Result<Vec<Client>> {
        if codes.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(&format!(
            r#"
            SELECT {} FROM clients c JOIN mailing_tags t ON t.id = c.tag_id
            WHERE c.operator_code = ANY($1)
            ORDER BY c.id
            "#,
            CLIENT_COLUMNS
        ))
        .bind(codes)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        rows.into_iter().map(client_from_row).collect()
    }
}

fn client_from_row(row: PgRow) -> Result<Client> {
    let phone: i64 = row
        .try_get("phone_number")
        .map_err(|e| Error::Database(e.to_string()))?;

    Ok(Client {
        id: row
            .try_get("id")
            .map_err(|e| Error::Database(e.to_string()))?,
        phone_number: PhoneNumber::new(phone)
            .map_err(|_| Error::Database(format!("Stored phone number out of range: {}", phone)))?,
        operator_code: row
            .try_get("operator_code")
            .map_err(|e| Error::Database(e.to_string()))?,
        tag: row
            .try_get("tag")
            .map_err(|e| Error::Database(e.to_string()))?,
        timezone: row
            .try_get("timezone")
            .map_err(|e| Error::Database(e.to_string()))?,
    })
}

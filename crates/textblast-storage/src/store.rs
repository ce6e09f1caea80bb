//! Unified store facade over the repositories
//!
//! The dispatch layer talks to storage through [`MailingStore`] so that
//! tests can substitute the in-memory backend for PostgreSQL.

use std::sync::Arc;

use async_trait::async_trait;
use textblast_common::config::DatabaseConfig;
use textblast_common::types::{ClientId, MailingId, MessageId, OperatorCode};
use textblast_common::{Error, Result};
use tracing::info;

use crate::db::DatabasePool;
use crate::memory::MemoryStore;
use crate::models::{
    Client, CreateClient, CreateMailing, Mailing, Message, MessageStatus, UpdateClient,
    UpdateMailing,
};
use crate::repository::{ClientRepository, MailingRepository, MessageRepository};

/// Storage operations used by the dispatch and service layers
#[async_trait]
pub trait MailingStore: Send + Sync {
    async fn create_mailing(&self, input: CreateMailing) -> Result<Mailing>;
    async fn get_mailing(&self, id: MailingId) -> Result<Option<Mailing>>;
    async fn list_mailings(&self) -> Result<Vec<Mailing>>;
    async fn update_mailing(&self, id: MailingId, input: UpdateMailing)
        -> Result<Option<Mailing>>;
    async fn delete_mailing(&self, id: MailingId) -> Result<bool>;

    async fn create_client(&self, input: CreateClient) -> Result<Client>;
    async fn get_client(&self, id: ClientId) -> Result<Option<Client>>;
    async fn list_clients(&self, limit: i64, offset: i64) -> Result<Vec<Client>>;
    async fn update_client(&self, id: ClientId, input: UpdateClient) -> Result<Option<Client>>;
    async fn delete_client(&self, id: ClientId) -> Result<bool>;
    async fn clients_by_tags(&self, tags: &[String]) -> Result<Vec<Client>>;
    async fn clients_by_operator_codes(&self, codes: &[OperatorCode]) -> Result<Vec<Client>>;

    async fn create_message(&self, mailing_id: MailingId, client_id: ClientId)
        -> Result<Message>;
    async fn update_message_status(&self, id: MessageId, status: MessageStatus) -> Result<()>;
    async fn mailing_messages(&self, mailing_id: MailingId) -> Result<Vec<Message>>;
}

/// PostgreSQL-backed store
#[derive(Clone)]
pub struct PgMailingStore {
    mailings: MailingRepository,
    clients: ClientRepository,
    messages: MessageRepository,
}

impl PgMailingStore {
    /// Create a store over an established pool
    pub fn new(db: &DatabasePool) -> Self {
        Self {
            mailings: MailingRepository::new(db.pool().clone()),
            clients: ClientRepository::new(db.pool().clone()),
            messages: MessageRepository::new(db.pool().clone()),
        }
    }
}

#[async_trait]
impl MailingStore for PgMailingStore {
    async fn create_mailing(&self, input: CreateMailing) -> Result<Mailing> {
        self.mailings.create(input).await
    }

    async fn get_mailing(&self, id: MailingId) -> Result<Option<Mailing>> {
        self.mailings.get(id).await
    }

    async fn list_mailings(&self) -> Result<Vec<Mailing>> {
        self.mailings.list_all().await
    }

    async fn update_mailing(
        &self,
        id: MailingId,
        input: UpdateMailing,
    ) -> Result<Option<Mailing>> {
        self.mailings.update(id, input).await
    }

    async fn delete_mailing(&self, id: MailingId) -> Result<bool> {
        self.mailings.delete(id).await
    }

    async fn create_client(&self, input: CreateClient) -> Result<Client> {
        self.clients.create(input).await
    }

    async fn get_client(&self, id: ClientId) -> Result<Option<Client>> {
        self.clients.get(id).await
    }

    async fn list_clients(&self, limit: i64, offset: i64) -> Result<Vec<Client>> {
        self.clients.list(limit, offset).await
    }

    async fn update_client(&self, id: ClientId, input: UpdateClient) -> Result<Option<Client>> {
        self.clients.update(id, input).await
    }

    async fn delete_client(&self, id: ClientId) -> Result<bool> {
        self.clients.delete(id).await
    }

    async fn clients_by_tags(&self, tags: &[String]) -> Result<Vec<Client>> {
        self.clients.by_tags(tags).await
    }

    async fn clients_by_operator_codes(&self, codes: &[OperatorCode]) -> Result<Vec<Client>> {
        self.clients.by_operator_codes(codes).await
    }

    async fn create_message(
        &self,
        mailing_id: MailingId,
        client_id: ClientId,
    ) -> Result<Message> {
        self.messages.create(mailing_id, client_id).await
    }

    async fn update_message_status(&self, id: MessageId, status: MessageStatus) -> Result<()> {
        self.messages.update_status(id, status).await
    }

    async fn mailing_messages(&self, mailing_id: MailingId) -> Result<Vec<Message>> {
        self.messages.by_mailing(mailing_id).await
    }
}

/// Create a store from configuration
///
/// `backend = "postgres"` connects and runs migrations; `backend = "memory"`
/// returns a process-local store suitable for development and tests.
pub async fn create_store(config: &DatabaseConfig) -> Result<Arc<dyn MailingStore>> {
    match config.backend.as_str() {
        "memory" => {
            info!("Using in-memory storage backend");
            Ok(Arc::new(MemoryStore::new()))
        }
        "postgres" => {
            let db = DatabasePool::new(config).await?;
            db.migrate().await?;
            db.health_check().await?;
            Ok(Arc::new(PgMailingStore::new(&db)))
        }
        other => Err(Error::Config(format!(
            "Unknown storage backend: {}",
            other
        ))),
    }
}

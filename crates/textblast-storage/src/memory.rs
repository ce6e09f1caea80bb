//! In-memory storage backend
//!
//! Used for tests and local development where a PostgreSQL instance is
//! not available. Behavior mirrors the SQL backend, including timezone
//! validation and `NotDelivered` as the initial message status.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use textblast_common::types::{validate_timezone, ClientId, MailingId, MessageId, OperatorCode};
use textblast_common::{Error, Result};
use tokio::sync::RwLock;

use crate::models::{
    Client, CreateClient, CreateMailing, Mailing, Message, MessageStatus, UpdateClient,
    UpdateMailing,
};
use crate::store::MailingStore;

#[derive(Default)]
struct MemoryInner {
    mailings: HashMap<MailingId, Mailing>,
    clients: HashMap<ClientId, Client>,
    messages: HashMap<MessageId, Message>,
    next_mailing_id: MailingId,
    next_client_id: ClientId,
    next_message_id: MessageId,
}

/// In-memory store
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MailingStore for MemoryStore {
    async fn create_mailing(&self, input: CreateMailing) -> Result<Mailing> {
        let mut inner = self.inner.write().await;
        inner.next_mailing_id += 1;
        let mailing = Mailing {
            id: inner.next_mailing_id,
            text: input.text,
            tags: input.tags,
            operator_codes: input.operator_codes,
            start_time: input.start_time,
            end_time: input.end_time,
        };
        inner.mailings.insert(mailing.id, mailing.clone());
        Ok(mailing)
    }

    async fn get_mailing(&self, id: MailingId) -> Result<Option<Mailing>> {
        Ok(self.inner.read().await.mailings.get(&id).cloned())
    }

    async fn list_mailings(&self) -> Result<Vec<Mailing>> {
        let inner = self.inner.read().await;
        let mut mailings: Vec<Mailing> = inner.mailings.values().cloned().collect();
        mailings.sort_by_key(|m| m.id);
        Ok(mailings)
    }

    async fn update_mailing(
        &self,
        id: MailingId,
        input: UpdateMailing,
    ) -> Result<Option<Mailing>> {
        let mut inner = self.inner.write().await;
        if !inner.mailings.contains_key(&id) {
            return Ok(None);
        }
        let mailing = Mailing {
            id,
            text: input.text,
            tags: input.tags,
            operator_codes: input.operator_codes,
            start_time: input.start_time,
            end_time: input.end_time,
        };
        inner.mailings.insert(id, mailing.clone());
        Ok(Some(mailing))
    }

    async fn delete_mailing(&self, id: MailingId) -> Result<bool> {
        Ok(self.inner.write().await.mailings.remove(&id).is_some())
    }

    async fn create_client(&self, input: CreateClient) -> Result<Client> {
        validate_timezone(&input.timezone)?;
        let mut inner = self.inner.write().await;
        inner.next_client_id += 1;
        let client = Client {
            id: inner.next_client_id,
            phone_number: input.phone_number,
            operator_code: input.operator_code,
            tag: input.tag,
            timezone: input.timezone,
        };
        inner.clients.insert(client.id, client.clone());
        Ok(client)
    }

    async fn get_client(&self, id: ClientId) -> Result<Option<Client>> {
        Ok(self.inner.read().await.clients.get(&id).cloned())
    }

    async fn list_clients(&self, limit: i64, offset: i64) -> Result<Vec<Client>> {
        let inner = self.inner.read().await;
        let mut clients: Vec<Client> = inner.clients.values().cloned().collect();
        clients.sort_by_key(|c| c.id);
        Ok(clients
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn update_client(&self, id: ClientId, input: UpdateClient) -> Result<Option<Client>> {
        validate_timezone(&input.timezone)?;
        let mut inner = self.inner.write().await;
        if !inner.clients.contains_key(&id) {
            return Ok(None);
        }
        let client = Client {
            id,
            phone_number: input.phone_number,
            operator_code: input.operator_code,
            tag: input.tag,
            timezone: input.timezone,
        };
        inner.clients.insert(id, client.clone());
        Ok(Some(client))
    }

    async fn delete_client(&self, id: ClientId) -> Result<bool> {
        Ok(self.inner.write().await.clients.remove(&id).is_some())
    }

    async fn clients_by_tags(&self, tags: &[String]) -> Result<Vec<Client>> {
        let inner = self.inner.read().await;
        let mut clients: Vec<Client> = inner
            .clients
            .values()
            .filter(|c| tags.iter().any(|t| t == &c.tag))
            .cloned()
            .collect();
        clients.sort_by_key(|c| c.id);
        Ok(clients)
    }

    async fn clients_by_operator_codes(&self, codes: &[OperatorCode]) -> Result<Vec<Client>> {
        let inner = self.inner.read().await;
        let mut clients: Vec<Client> = inner
            .clients
            .values()
            .filter(|c| codes.contains(&c.operator_code))
            .cloned()
            .collect();
        clients.sort_by_key(|c| c.id);
        Ok(clients)
    }

    async fn create_message(
        &self,
        mailing_id: MailingId,
        client_id: ClientId,
    ) -> Result<Message> {
        let mut inner = self.inner.write().await;
        inner.next_message_id += 1;
        let message = Message {
            id: inner.next_message_id,
            mailing_id,
            client_id,
            created_at: Utc::now(),
            status: MessageStatus::NotDelivered,
        };
        inner.messages.insert(message.id, message.clone());
        Ok(message)
    }

    async fn update_message_status(&self, id: MessageId, status: MessageStatus) -> Result<()> {
        let mut inner = self.inner.write().await;
        match inner.messages.get_mut(&id) {
            Some(message) => {
                message.status = status;
                Ok(())
            }
            None => Err(Error::NotFound(format!("Message not found: {}", id))),
        }
    }

    async fn mailing_messages(&self, mailing_id: MailingId) -> Result<Vec<Message>> {
        let inner = self.inner.read().await;
        let mut messages: Vec<Message> = inner
            .messages
            .values()
            .filter(|m| m.mailing_id == mailing_id)
            .cloned()
            .collect();
        messages.sort_by_key(|m| m.id);
        Ok(messages)
    }
}

//! Mailing service
//!
//! Orchestrates storage and scheduling: every mailing mutation keeps
//! the schedule and the sender registry consistent with what the store
//! says. Updating or deleting a mailing stops its running sender;
//! clients are plain CRUD and never touch the schedule.

use std::sync::Arc;

use textblast_common::types::{ClientId, MailingId};
use textblast_common::Result;
use textblast_storage::models::{
    Client, CreateClient, CreateMailing, Mailing, Message, UpdateClient, UpdateMailing,
};
use textblast_storage::MailingStore;
use tracing::info;

use crate::dispatch::schedule::MailingScheduler;
use crate::stats::{DetailedMailingStats, MailingStats};

/// Service coordinating mailing CRUD with dispatch
#[derive(Clone)]
pub struct MailingService {
    store: Arc<dyn MailingStore>,
    scheduler: MailingScheduler,
}

impl MailingService {
    pub fn new(store: Arc<dyn MailingStore>, scheduler: MailingScheduler) -> Self {
        Self { store, scheduler }
    }

    pub fn scheduler(&self) -> &MailingScheduler {
        &self.scheduler
    }

    /// Create a mailing and schedule it
    pub async fn create_mailing(&self, input: CreateMailing) -> Result<Mailing> {
        let mailing = self.store.create_mailing(input).await?;
        self.scheduler.add_to_schedule(&mailing).await;
        info!(mailing_id = mailing.id, "Mailing created");
        Ok(mailing)
    }

    pub async fn get_mailing(&self, id: MailingId) -> Result<Option<Mailing>> {
        self.store.get_mailing(id).await
    }

    pub async fn list_mailings(&self) -> Result<Vec<Mailing>> {
        self.store.list_mailings().await
    }

    /// Replace a mailing, stopping in-flight delivery before rescheduling
    pub async fn update_mailing(
        &self,
        id: MailingId,
        input: UpdateMailing,
    ) -> Result<Option<Mailing>> {
        self.stop_dispatch(id).await;

        let Some(mailing) = self.store.update_mailing(id, input).await? else {
            return Ok(None);
        };

        self.scheduler.add_to_schedule(&mailing).await;
        info!(mailing_id = id, "Mailing updated and rescheduled");
        Ok(Some(mailing))
    }

    /// Delete a mailing, stopping in-flight delivery
    pub async fn delete_mailing(&self, id: MailingId) -> Result<bool> {
        self.stop_dispatch(id).await;

        let deleted = self.store.delete_mailing(id).await?;
        if deleted {
            info!(mailing_id = id, "Mailing deleted");
        }
        Ok(deleted)
    }

    async fn stop_dispatch(&self, id: MailingId) {
        self.scheduler.remove_from_schedule(id).await;
        if let Some(sender) = self.scheduler.registry().remove(id).await {
            sender.stop().await;
        }
    }

    pub async fn create_client(&self, input: CreateClient) -> Result<Client> {
        self.store.create_client(input).await
    }

    pub async fn get_client(&self, id: ClientId) -> Result<Option<Client>> {
        self.store.get_client(id).await
    }

    pub async fn list_clients(&self, limit: i64, offset: i64) -> Result<Vec<Client>> {
        self.store.list_clients(limit, offset).await
    }

    pub async fn update_client(&self, id: ClientId, input: UpdateClient) -> Result<Option<Client>> {
        self.store.update_client(id, input).await
    }

    pub async fn delete_client(&self, id: ClientId) -> Result<bool> {
        self.store.delete_client(id).await
    }

    pub async fn mailing_messages(&self, id: MailingId) -> Result<Vec<Message>> {
        self.store.mailing_messages(id).await
    }

    /// Message counts for every mailing
    pub async fn overall_stats(&self) -> Result<Vec<MailingStats>> {
        let mailings = self.store.list_mailings().await?;
        let mut stats = Vec::with_capacity(mailings.len());
        for mailing in mailings {
            let messages = self.store.mailing_messages(mailing.id).await?;
            stats.push(MailingStats::from_messages(mailing, &messages));
        }
        Ok(stats)
    }

    /// Full message listing for one mailing
    pub async fn mailing_stats(&self, id: MailingId) -> Result<Option<DetailedMailingStats>> {
        let Some(mailing) = self.store.get_mailing(id).await? else {
            return Ok(None);
        };
        let messages = self.store.mailing_messages(id).await?;
        Ok(Some(DetailedMailingStats::from_messages(mailing, messages)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::endpoint::{Endpoint, SendError};
    use async_trait::async_trait;
    use chrono::{Duration, Utc};
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration as StdDuration;
    use textblast_common::config::DispatchConfig;
    use textblast_common::types::PhoneNumber;
    use textblast_storage::models::{Message, MessageStatus};
    use textblast_storage::MemoryStore;

    /// Every other attempt succeeds, so some messages stay undelivered
    /// long enough for the test to interrupt them.
    struct AlternatingEndpoint(AtomicUsize);

    #[async_trait]
    impl Endpoint for AlternatingEndpoint {
        async fn send(
            &self,
            _message: &Message,
            _client: &Client,
            _mailing: &Mailing,
        ) -> std::result::Result<u16, SendError> {
            if self.0.fetch_add(1, Ordering::SeqCst) % 2 == 0 {
                Ok(200)
            } else {
                Ok(500)
            }
        }
    }

    struct AcceptAll;

    #[async_trait]
    impl Endpoint for AcceptAll {
        async fn send(
            &self,
            _message: &Message,
            _client: &Client,
            _mailing: &Mailing,
        ) -> std::result::Result<u16, SendError> {
            Ok(200)
        }
    }

    async fn setup(endpoint: Arc<dyn Endpoint>, clients: usize) -> (Arc<MemoryStore>, MailingService) {
        let store = Arc::new(MemoryStore::new());
        for i in 0..clients {
            store
                .create_client(CreateClient {
                    phone_number: PhoneNumber::new(70000000001 + i as i64).unwrap(),
                    operator_code: 900 + (i % 3) as i32,
                    tag: "Tag".to_string(),
                    timezone: "Europe/Amsterdam".to_string(),
                })
                .await
                .unwrap();
        }
        let scheduler =
            MailingScheduler::new(store.clone(), endpoint, &DispatchConfig::default());
        let service = MailingService::new(store.clone() as Arc<dyn MailingStore>, scheduler);
        (store, service)
    }

    fn open_window_input() -> CreateMailing {
        let now = Utc::now();
        CreateMailing {
            text: "Sale".to_string(),
            tags: vec!["Tag".to_string()],
            operator_codes: vec![],
            start_time: now - Duration::minutes(1),
            end_time: now + Duration::hours(1),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_mailing_dispatches_to_audience() {
        let (store, service) = setup(Arc::new(AcceptAll), 3).await;

        let mailing = service.create_mailing(open_window_input()).await.unwrap();
        tokio::time::sleep(StdDuration::from_secs(1)).await;

        let messages = store.mailing_messages(mailing.id).await.unwrap();
        assert_eq!(messages.len(), 3);
        assert!(messages
            .iter()
            .all(|m| m.status == MessageStatus::Delivered));
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_stops_inflight_delivery() {
        let endpoint = Arc::new(AlternatingEndpoint(AtomicUsize::new(1)));
        let (store, service) = setup(endpoint.clone(), 1000).await;

        let mailing = service.create_mailing(open_window_input()).await.unwrap();
        tokio::time::sleep(StdDuration::from_secs(5)).await;

        assert!(service.delete_mailing(mailing.id).await.unwrap());
        assert!(service.get_mailing(mailing.id).await.unwrap().is_none());

        let delivered_count = |messages: &[Message]| {
            messages
                .iter()
                .filter(|m| m.status == MessageStatus::Delivered)
                .count()
        };

        // With the sender stopped, no retries land after a grace period.
        tokio::time::sleep(StdDuration::from_secs(60)).await;
        let calls = endpoint.0.load(Ordering::SeqCst);
        let delivered = delivered_count(&store.mailing_messages(mailing.id).await.unwrap());
        tokio::time::sleep(StdDuration::from_secs(300)).await;
        assert_eq!(endpoint.0.load(Ordering::SeqCst), calls);
        assert_eq!(
            delivered_count(&store.mailing_messages(mailing.id).await.unwrap()),
            delivered
        );

        // Message rows survive the mailing for audit.
        let messages = store.mailing_messages(mailing.id).await.unwrap();
        assert_eq!(messages.len(), 1000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_restarts_delivery_with_new_definition() {
        let (store, service) = setup(Arc::new(AcceptAll), 2).await;

        let mailing = service.create_mailing(open_window_input()).await.unwrap();
        tokio::time::sleep(StdDuration::from_secs(1)).await;

        let mut input = open_window_input();
        input.text = "Updated sale".to_string();
        let updated = service
            .update_mailing(mailing.id, input)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.text, "Updated sale");

        tokio::time::sleep(StdDuration::from_secs(1)).await;
        // Two clients, dispatched once per activation.
        let messages = store.mailing_messages(mailing.id).await.unwrap();
        assert_eq!(messages.len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_missing_mailing_returns_none() {
        let (_, service) = setup(Arc::new(AcceptAll), 0).await;
        let result = service.update_mailing(42, open_window_input()).await.unwrap();
        assert!(result.is_none());
        assert!(!service.delete_mailing(42).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stats_group_messages_by_status() {
        let (_, service) = setup(Arc::new(AcceptAll), 3).await;

        let mailing = service.create_mailing(open_window_input()).await.unwrap();
        tokio::time::sleep(StdDuration::from_secs(1)).await;

        let overall = service.overall_stats().await.unwrap();
        assert_eq!(overall.len(), 1);
        assert_eq!(overall[0].delivered, 3);
        assert_eq!(overall[0].not_delivered, 0);

        let detailed = service.mailing_stats(mailing.id).await.unwrap().unwrap();
        assert_eq!(detailed.messages.len(), 3);
        assert!(service.mailing_stats(999).await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_client_crud_does_not_touch_schedule() {
        let (_, service) = setup(Arc::new(AcceptAll), 0).await;

        let client = service
            .create_client(CreateClient {
                phone_number: PhoneNumber::new(79990000001).unwrap(),
                operator_code: 999,
                tag: "New".to_string(),
                timezone: "UTC".to_string(),
            })
            .await
            .unwrap();

        let fetched = service.get_client(client.id).await.unwrap().unwrap();
        assert_eq!(fetched.tag, "New");

        let mut update = CreateClient {
            phone_number: fetched.phone_number,
            operator_code: fetched.operator_code,
            tag: "Renamed".to_string(),
            timezone: fetched.timezone,
        };
        update.operator_code = 111;
        let updated = service
            .update_client(client.id, update)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.operator_code, 111);

        assert!(service.delete_client(client.id).await.unwrap());
        assert!(service.get_client(client.id).await.unwrap().is_none());
    }
}

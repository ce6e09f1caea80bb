//! Mailing schedule
//!
//! Every mailing gets two timer tasks: an activation task that waits
//! for the start of the window and launches a sender, and an expiry
//! task that fires at the end of the window and tears the schedule
//! entries down. Expiry does not stop a sender that is already
//! running; retries in flight are allowed to finish.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use textblast_common::config::DispatchConfig;
use textblast_common::types::MailingId;
use textblast_common::Result;
use textblast_storage::models::Mailing;
use textblast_storage::MailingStore;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info};

use super::delivery::DeliveryContext;
use super::endpoint::Endpoint;
use super::sending::{MailingSender, SenderRegistry};

#[derive(Default)]
struct ScheduleEntries {
    activation: HashMap<MailingId, JoinHandle<()>>,
    expiry: HashMap<MailingId, JoinHandle<()>>,
}

struct SchedulerInner {
    ctx: Arc<DeliveryContext>,
    endpoint: Arc<dyn Endpoint>,
    registry: Arc<SenderRegistry>,
    entries: Mutex<ScheduleEntries>,
}

/// Scheduler for mailing activation and expiry
#[derive(Clone)]
pub struct MailingScheduler {
    inner: Arc<SchedulerInner>,
}

impl MailingScheduler {
    pub fn new(
        store: Arc<dyn MailingStore>,
        endpoint: Arc<dyn Endpoint>,
        config: &DispatchConfig,
    ) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                ctx: Arc::new(DeliveryContext::new(store, config)),
                endpoint,
                registry: Arc::new(SenderRegistry::new()),
                entries: Mutex::new(ScheduleEntries::default()),
            }),
        }
    }

    pub fn registry(&self) -> &Arc<SenderRegistry> {
        &self.inner.registry
    }

    /// Schedule a mailing's activation and expiry tasks
    ///
    /// Re-adding an already scheduled mailing replaces its tasks.
    /// Mailings whose window has already closed are ignored.
    pub async fn add_to_schedule(&self, mailing: &Mailing) {
        let now = Utc::now();
        if mailing.end_time <= now {
            debug!(mailing_id = mailing.id, "Window already closed, not scheduling");
            return;
        }

        // The lock is held across both spawns so an immediately firing
        // expiry task cannot observe a half-inserted schedule entry.
        let mut entries = self.inner.entries.lock().await;
        if let Some(handle) = entries.activation.remove(&mailing.id) {
            handle.abort();
        }
        if let Some(handle) = entries.expiry.remove(&mailing.id) {
            handle.abort();
        }

        let activation = tokio::spawn(activation_task(self.inner.clone(), mailing.clone()));
        let expiry = tokio::spawn(expiry_task(
            self.inner.clone(),
            mailing.id,
            mailing.end_time,
        ));

        entries.activation.insert(mailing.id, activation);
        entries.expiry.insert(mailing.id, expiry);

        info!(
            mailing_id = mailing.id,
            start_time = %mailing.start_time,
            end_time = %mailing.end_time,
            "Mailing scheduled"
        );
    }

    /// Remove a mailing's schedule entries, aborting pending timers
    ///
    /// Safe to call for mailings that were never scheduled.
    pub async fn remove_from_schedule(&self, id: MailingId) {
        let mut entries = self.inner.entries.lock().await;
        if let Some(handle) = entries.activation.remove(&id) {
            handle.abort();
        }
        if let Some(handle) = entries.expiry.remove(&id) {
            handle.abort();
        }
    }

    /// Whether a mailing currently has schedule entries
    pub async fn is_scheduled(&self, id: MailingId) -> bool {
        let entries = self.inner.entries.lock().await;
        entries.activation.contains_key(&id) || entries.expiry.contains_key(&id)
    }

    /// Schedule every mailing found in storage; returns how many were taken
    ///
    /// Run once at startup so mailings survive a restart.
    pub async fn schedule_existing(&self) -> Result<usize> {
        let mailings = self.inner.ctx.store().list_mailings().await?;
        let total = mailings.len();
        let mut scheduled = 0;

        for mailing in &mailings {
            if mailing.end_time > Utc::now() {
                self.add_to_schedule(mailing).await;
                scheduled += 1;
            }
        }

        info!(scheduled, total, "Scheduled existing mailings");
        Ok(scheduled)
    }

    /// Abort all timers and stop all running senders
    pub async fn shutdown(&self) {
        info!("Shutting down scheduler");
        {
            let mut entries = self.inner.entries.lock().await;
            for (_, handle) in entries.activation.drain() {
                handle.abort();
            }
            for (_, handle) in entries.expiry.drain() {
                handle.abort();
            }
        }
        self.inner.registry.stop_all().await;
    }
}

/// Wait out the start of the window, then launch the sender
async fn activation_task(inner: Arc<SchedulerInner>, mailing: Mailing) {
    let now = Utc::now();
    if mailing.end_time <= now {
        return;
    }
    if let Ok(wait) = (mailing.start_time - now).to_std() {
        debug!(
            mailing_id = mailing.id,
            wait_secs = wait.as_secs(),
            "Waiting for mailing start"
        );
        sleep(wait).await;
    }

    let id = mailing.id;
    let sender = Arc::new(MailingSender::new(mailing));
    inner.registry.register(sender.clone()).await;

    if let Err(e) = sender.start(inner.ctx.clone(), inner.endpoint.clone()).await {
        error!(mailing_id = id, "Failed to start mailing: {}", e);
    }
}

/// Fire at the end of the window and drop the schedule entries
async fn expiry_task(inner: Arc<SchedulerInner>, id: MailingId, end_time: DateTime<Utc>) {
    if let Ok(wait) = (end_time - Utc::now()).to_std() {
        sleep(wait).await;
    }

    let mut entries = inner.entries.lock().await;
    if let Some(handle) = entries.activation.remove(&id) {
        handle.abort();
    }
    entries.expiry.remove(&id);
    debug!(mailing_id = id, "Mailing window closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::endpoint::SendError;
    use async_trait::async_trait;
    use chrono::Duration;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration as StdDuration;
    use textblast_common::types::PhoneNumber;
    use textblast_storage::models::{Client, CreateClient, CreateMailing, Message};
    use textblast_storage::MemoryStore;

    struct CountingEndpoint(AtomicUsize);

    #[async_trait]
    impl Endpoint for CountingEndpoint {
        async fn send(
            &self,
            _message: &Message,
            _client: &Client,
            _mailing: &Mailing,
        ) -> std::result::Result<u16, SendError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(200)
        }
    }

    struct FailingEndpoint(AtomicUsize);

    #[async_trait]
    impl Endpoint for FailingEndpoint {
        async fn send(
            &self,
            _message: &Message,
            _client: &Client,
            _mailing: &Mailing,
        ) -> std::result::Result<u16, SendError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Err(SendError::Transport("unreachable".to_string()))
        }
    }

    async fn setup(
        endpoint: Arc<dyn Endpoint>,
    ) -> (Arc<MemoryStore>, MailingScheduler) {
        let store = Arc::new(MemoryStore::new());
        store
            .create_client(CreateClient {
                phone_number: PhoneNumber::new(70000000001).unwrap(),
                operator_code: 900,
                tag: "Tag".to_string(),
                timezone: "Europe/Amsterdam".to_string(),
            })
            .await
            .unwrap();
        let scheduler = MailingScheduler::new(
            store.clone(),
            endpoint,
            &textblast_common::config::DispatchConfig::default(),
        );
        (store, scheduler)
    }

    fn mailing_input(start: DateTime<Utc>, end: DateTime<Utc>) -> CreateMailing {
        CreateMailing {
            text: "Hi".to_string(),
            tags: vec!["Tag".to_string()],
            operator_codes: vec![],
            start_time: start,
            end_time: end,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_window_activates_immediately() {
        let endpoint = Arc::new(CountingEndpoint(AtomicUsize::new(0)));
        let (store, scheduler) = setup(endpoint.clone()).await;

        let now = Utc::now();
        let mailing = store
            .create_mailing(mailing_input(now - Duration::minutes(1), now + Duration::hours(1)))
            .await
            .unwrap();

        scheduler.add_to_schedule(&mailing).await;
        tokio::time::sleep(StdDuration::from_secs(1)).await;

        assert!(scheduler.registry().get(mailing.id).await.is_some());
        assert_eq!(endpoint.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_future_window_waits_for_start() {
        let endpoint = Arc::new(CountingEndpoint(AtomicUsize::new(0)));
        let (store, scheduler) = setup(endpoint.clone()).await;

        let now = Utc::now();
        let mailing = store
            .create_mailing(mailing_input(
                now + Duration::seconds(60),
                now + Duration::hours(1),
            ))
            .await
            .unwrap();

        scheduler.add_to_schedule(&mailing).await;

        tokio::time::sleep(StdDuration::from_secs(30)).await;
        assert!(scheduler.registry().get(mailing.id).await.is_none());
        assert_eq!(endpoint.0.load(Ordering::SeqCst), 0);

        tokio::time::sleep(StdDuration::from_secs(31)).await;
        assert!(scheduler.registry().get(mailing.id).await.is_some());
        assert_eq!(endpoint.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_window_never_activates() {
        let endpoint = Arc::new(CountingEndpoint(AtomicUsize::new(0)));
        let (store, scheduler) = setup(endpoint.clone()).await;

        let now = Utc::now();
        let mailing = store
            .create_mailing(mailing_input(
                now - Duration::hours(2),
                now - Duration::hours(1),
            ))
            .await
            .unwrap();

        scheduler.add_to_schedule(&mailing).await;
        tokio::time::sleep(StdDuration::from_secs(5)).await;

        assert!(!scheduler.is_scheduled(mailing.id).await);
        assert!(scheduler.registry().get(mailing.id).await.is_none());
        assert_eq!(endpoint.0.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_removal_is_idempotent() {
        let endpoint = Arc::new(CountingEndpoint(AtomicUsize::new(0)));
        let (store, scheduler) = setup(endpoint.clone()).await;

        let now = Utc::now();
        let mailing = store
            .create_mailing(mailing_input(
                now + Duration::hours(1),
                now + Duration::hours(2),
            ))
            .await
            .unwrap();

        scheduler.add_to_schedule(&mailing).await;
        assert!(scheduler.is_scheduled(mailing.id).await);

        scheduler.remove_from_schedule(mailing.id).await;
        assert!(!scheduler.is_scheduled(mailing.id).await);

        // Second removal and removal of an unknown ID are no-ops.
        scheduler.remove_from_schedule(mailing.id).await;
        scheduler.remove_from_schedule(9999).await;

        // The aborted activation never fires.
        tokio::time::sleep(StdDuration::from_secs(7200)).await;
        assert_eq!(endpoint.0.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rescheduling_replaces_pending_activation() {
        let endpoint = Arc::new(CountingEndpoint(AtomicUsize::new(0)));
        let (store, scheduler) = setup(endpoint.clone()).await;

        let now = Utc::now();
        let mailing = store
            .create_mailing(mailing_input(
                now + Duration::seconds(30),
                now + Duration::hours(1),
            ))
            .await
            .unwrap();

        scheduler.add_to_schedule(&mailing).await;

        // Push the start further out before the first timer fires.
        let mut later = mailing.clone();
        later.start_time = now + Duration::seconds(120);
        scheduler.add_to_schedule(&later).await;

        tokio::time::sleep(StdDuration::from_secs(60)).await;
        assert_eq!(endpoint.0.load(Ordering::SeqCst), 0);

        tokio::time::sleep(StdDuration::from_secs(61)).await;
        assert_eq!(endpoint.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry_clears_entries_but_not_running_sender() {
        let endpoint = Arc::new(FailingEndpoint(AtomicUsize::new(0)));
        let (store, scheduler) = setup(endpoint.clone()).await;

        let now = Utc::now();
        let mailing = store
            .create_mailing(mailing_input(
                now - Duration::minutes(1),
                now + Duration::seconds(30),
            ))
            .await
            .unwrap();

        scheduler.add_to_schedule(&mailing).await;
        tokio::time::sleep(StdDuration::from_secs(31)).await;

        assert!(!scheduler.is_scheduled(mailing.id).await);
        // Retries keep running past the window until stopped explicitly.
        assert!(scheduler.registry().get(mailing.id).await.is_some());
        let before = endpoint.0.load(Ordering::SeqCst);
        tokio::time::sleep(StdDuration::from_secs(120)).await;
        assert!(endpoint.0.load(Ordering::SeqCst) > before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_schedule_existing_skips_closed_windows() {
        let endpoint = Arc::new(CountingEndpoint(AtomicUsize::new(0)));
        let (store, scheduler) = setup(endpoint.clone()).await;

        let now = Utc::now();
        let open = store
            .create_mailing(mailing_input(now, now + Duration::hours(1)))
            .await
            .unwrap();
        store
            .create_mailing(mailing_input(
                now - Duration::hours(2),
                now - Duration::hours(1),
            ))
            .await
            .unwrap();

        let scheduled = scheduler.schedule_existing().await.unwrap();
        assert_eq!(scheduled, 1);
        assert!(scheduler.is_scheduled(open.id).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_everything() {
        let endpoint = Arc::new(FailingEndpoint(AtomicUsize::new(0)));
        let (store, scheduler) = setup(endpoint.clone()).await;

        let now = Utc::now();
        let mailing = store
            .create_mailing(mailing_input(now, now + Duration::hours(1)))
            .await
            .unwrap();
        scheduler.add_to_schedule(&mailing).await;
        tokio::time::sleep(StdDuration::from_secs(1)).await;

        scheduler.shutdown().await;
        assert!(!scheduler.is_scheduled(mailing.id).await);
        assert!(scheduler.registry().get(mailing.id).await.is_none());

        let calls = endpoint.0.load(Ordering::SeqCst);
        tokio::time::sleep(StdDuration::from_secs(300)).await;
        assert_eq!(endpoint.0.load(Ordering::SeqCst), calls);
    }
}

//! Active mailing senders
//!
//! A [`MailingSender`] owns the delivery tasks of one running mailing.
//! The [`SenderRegistry`] tracks all running senders by mailing ID so
//! updates and deletions can stop in-flight work.

use std::collections::HashMap;
use std::sync::Arc;

use textblast_common::types::MailingId;
use textblast_common::Result;
use textblast_storage::models::Mailing;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::audience::resolve_audience;
use super::delivery::{deliver, DeliveryContext};
use super::endpoint::Endpoint;

/// Delivery tasks of one running mailing
pub struct MailingSender {
    mailing: Arc<Mailing>,
    attempts: Mutex<Vec<JoinHandle<()>>>,
}

impl MailingSender {
    pub fn new(mailing: Mailing) -> Self {
        Self {
            mailing: Arc::new(mailing),
            attempts: Mutex::new(Vec::new()),
        }
    }

    pub fn mailing(&self) -> &Arc<Mailing> {
        &self.mailing
    }

    /// Resolve the audience and launch one delivery task per client
    pub async fn start(
        &self,
        ctx: Arc<DeliveryContext>,
        endpoint: Arc<dyn Endpoint>,
    ) -> Result<()> {
        let clients = resolve_audience(ctx.store().as_ref(), &self.mailing).await?;

        info!(
            mailing_id = self.mailing.id,
            clients = clients.len(),
            "Starting mailing"
        );

        let mut attempts = self.attempts.lock().await;
        for client in clients {
            attempts.push(tokio::spawn(deliver(
                ctx.clone(),
                endpoint.clone(),
                self.mailing.clone(),
                client,
            )));
        }

        Ok(())
    }

    /// Abort all in-flight delivery tasks
    pub async fn stop(&self) {
        let mut attempts = self.attempts.lock().await;
        let stopped = attempts.len();
        for handle in attempts.drain(..) {
            handle.abort();
        }
        if stopped > 0 {
            info!(
                mailing_id = self.mailing.id,
                tasks = stopped,
                "Stopped mailing"
            );
        }
    }

    /// Number of delivery tasks launched
    pub async fn task_count(&self) -> usize {
        self.attempts.lock().await.len()
    }
}

/// Registry of running senders, keyed by mailing ID
#[derive(Default)]
pub struct SenderRegistry {
    senders: Mutex<HashMap<MailingId, Arc<MailingSender>>>,
}

impl SenderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a sender, stopping any previous one for the same mailing
    pub async fn register(&self, sender: Arc<MailingSender>) {
        let previous = {
            let mut senders = self.senders.lock().await;
            senders.insert(sender.mailing().id, sender.clone())
        };
        if let Some(previous) = previous {
            debug!(
                mailing_id = sender.mailing().id,
                "Replacing running sender"
            );
            previous.stop().await;
        }
    }

    pub async fn get(&self, id: MailingId) -> Option<Arc<MailingSender>> {
        self.senders.lock().await.get(&id).cloned()
    }

    /// Remove a sender from the registry without stopping it
    pub async fn remove(&self, id: MailingId) -> Option<Arc<MailingSender>> {
        self.senders.lock().await.remove(&id)
    }

    /// Stop and drop every running sender
    pub async fn stop_all(&self) {
        let senders: Vec<_> = self.senders.lock().await.drain().collect();
        for (_, sender) in senders {
            sender.stop().await;
        }
    }
}

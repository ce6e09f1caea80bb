//! Delivery attempts
//!
//! Each recipient gets one message row and one retry loop. The loop
//! runs until the endpoint returns a successful status code; failed
//! attempts back off linearly, adding one step per failure. A global
//! semaphore bounds how many sends are in flight at once, and the
//! permit is released before sleeping so waiting tasks never consume
//! send capacity.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use textblast_common::config::DispatchConfig;
use textblast_common::types::StatusCode;
use textblast_storage::models::{Client, Mailing, MessageStatus};
use textblast_storage::MailingStore;
use tokio::sync::Semaphore;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use super::endpoint::Endpoint;

/// Shared state for delivery attempts
pub struct DeliveryContext {
    store: Arc<dyn MailingStore>,
    slots: Arc<Semaphore>,
    success_codes: HashSet<StatusCode>,
    backoff_step: Duration,
}

impl DeliveryContext {
    pub fn new(store: Arc<dyn MailingStore>, config: &DispatchConfig) -> Self {
        Self {
            store,
            slots: Arc::new(Semaphore::new(config.max_concurrent_sends)),
            success_codes: config.successful_status_codes.iter().copied().collect(),
            backoff_step: Duration::from_secs(config.retry_backoff_secs),
        }
    }

    pub fn store(&self) -> &Arc<dyn MailingStore> {
        &self.store
    }
}

/// Deliver one message to one client, retrying until success
///
/// Runs inside a spawned task owned by the mailing's sender; stopping
/// the sender aborts it. The message row is created up front so an
/// aborted attempt stays visible as `NotDelivered`.
pub async fn deliver(
    ctx: Arc<DeliveryContext>,
    endpoint: Arc<dyn Endpoint>,
    mailing: Arc<Mailing>,
    client: Client,
) {
    let message = match ctx.store.create_message(mailing.id, client.id).await {
        Ok(m) => m,
        Err(e) => {
            error!(
                mailing_id = mailing.id,
                client_id = client.id,
                "Failed to record message: {}", e
            );
            return;
        }
    };

    let mut backoff = Duration::ZERO;
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;

        let result = {
            let _permit = match ctx.slots.clone().acquire_owned().await {
                Ok(p) => p,
                // Semaphore is never closed while senders run
                Err(_) => return,
            };
            endpoint.send(&message, &client, &mailing).await
        };

        match result {
            Ok(status) if ctx.success_codes.contains(&status) => {
                if let Err(e) = ctx
                    .store
                    .update_message_status(message.id, MessageStatus::Delivered)
                    .await
                {
                    error!(
                        message_id = message.id,
                        "Failed to mark message delivered: {}", e
                    );
                }
                info!(
                    message_id = message.id,
                    mailing_id = mailing.id,
                    client_id = client.id,
                    attempt,
                    "Message delivered"
                );
                return;
            }
            Ok(status) => {
                warn!(
                    message_id = message.id,
                    status, attempt, "Endpoint rejected message"
                );
            }
            Err(e) => {
                warn!(
                    message_id = message.id,
                    attempt, "Delivery attempt failed: {}", e
                );
            }
        }

        backoff += ctx.backoff_step;
        debug!(
            message_id = message.id,
            backoff_secs = backoff.as_secs(),
            "Backing off before retry"
        );
        sleep(backoff).await;
    }
}

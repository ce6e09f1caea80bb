//! Delivery endpoints
//!
//! An endpoint takes one message for one client and reports the status
//! code the remote side returned. Whether a status counts as success is
//! decided by the delivery layer, not here.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use textblast_common::config::DispatchConfig;
use textblast_common::types::StatusCode;
use textblast_common::{Error, Result};
use textblast_storage::models::{Client, Mailing, Message};
use tracing::{debug, info};

/// Failure of a single send attempt
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("Request timed out")]
    Timeout,
    #[error("Transport error: {0}")]
    Transport(String),
}

/// Wire format for a delivery request
#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    id: i64,
    phone: i64,
    text: &'a str,
}

/// A destination for outgoing messages
#[async_trait]
pub trait Endpoint: Send + Sync {
    /// Attempt delivery of one message; returns the remote status code
    async fn send(
        &self,
        message: &Message,
        client: &Client,
        mailing: &Mailing,
    ) -> std::result::Result<StatusCode, SendError>;
}

/// HTTP endpoint posting to `{base}/send/{message_id}`
pub struct HttpEndpoint {
    client: reqwest::Client,
    base_url: String,
}

impl HttpEndpoint {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl Endpoint for HttpEndpoint {
    async fn send(
        &self,
        message: &Message,
        client: &Client,
        mailing: &Mailing,
    ) -> std::result::Result<StatusCode, SendError> {
        let url = format!("{}/send/{}", self.base_url, message.id);
        let body = SendRequest {
            id: message.id,
            phone: client.phone_number.get(),
            text: &mailing.text,
        };

        let response = self
            .client
            .post(&url)
            .timeout(Duration::from_secs(30))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SendError::Timeout
                } else {
                    SendError::Transport(e.to_string())
                }
            })?;

        let status = response.status().as_u16();
        debug!(message_id = message.id, status, "Delivery request completed");
        Ok(status)
    }
}

/// Logging endpoint for development; accepts everything
pub struct LogEndpoint;

#[async_trait]
impl Endpoint for LogEndpoint {
    async fn send(
        &self,
        message: &Message,
        client: &Client,
        mailing: &Mailing,
    ) -> std::result::Result<StatusCode, SendError> {
        info!(
            message_id = message.id,
            phone = client.phone_number.get(),
            text = %mailing.text,
            "Message accepted by log endpoint"
        );
        Ok(200)
    }
}

/// Build the endpoint selected by configuration
///
/// With `endpoint_url` set an [`HttpEndpoint`] is used; otherwise the
/// [`LogEndpoint`], which only records attempts.
pub fn endpoint_from_config(config: &DispatchConfig) -> Result<Arc<dyn Endpoint>> {
    match &config.endpoint_url {
        Some(url) if !url.trim().is_empty() => Ok(Arc::new(HttpEndpoint::new(url))),
        Some(_) => Err(Error::Config(
            "Dispatch endpoint URL must not be empty".to_string(),
        )),
        None => {
            info!("No endpoint URL configured, using log endpoint");
            Ok(Arc::new(LogEndpoint))
        }
    }
}

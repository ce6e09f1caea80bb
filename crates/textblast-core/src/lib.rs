//! TextBlast Core - Mailing dispatch library
//!
//! Scheduling, audience resolution, and delivery of mailing campaigns.
//! A mailing is activated inside its time window, fans out one message
//! per matching client, and retries each delivery until the endpoint
//! reports success or the mailing is stopped.

pub mod dispatch;
pub mod service;
pub mod stats;

pub use dispatch::endpoint::{endpoint_from_config, Endpoint, HttpEndpoint, LogEndpoint};
pub use dispatch::schedule::MailingScheduler;
pub use dispatch::sending::{MailingSender, SenderRegistry};
pub use service::MailingService;

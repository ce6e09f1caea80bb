//! Mailing dispatch - scheduling, audience resolution, and delivery

pub mod audience;
pub mod delivery;
pub mod endpoint;
pub mod schedule;
pub mod sending;

pub use delivery::DeliveryContext;
pub use schedule::MailingScheduler;
pub use sending::{MailingSender, SenderRegistry};

//! Repository layer for data access

pub mod clients;
pub mod mailings;
pub mod messages;

pub use clients::ClientRepository;
pub use mailings::MailingRepository;
pub use messages::MessageRepository;

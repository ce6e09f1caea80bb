//! TextBlast Storage - Database abstraction
//!
//! This crate provides storage abstraction for TextBlast, with a
//! PostgreSQL backend for production and an in-memory backend for tests
//! and local development.

pub mod db;
pub mod memory;
pub mod models;
pub mod repository;
pub mod store;

pub use db::DatabasePool;
pub use memory::MemoryStore;
pub use models::*;
pub use repository::*;
pub use store::{create_store, MailingStore, PgMailingStore};

//! Notification store.
//!
//! Durable records for notifications, their per-channel deliveries and user
//! preferences, plus the two indexed queries the pipeline depends on:
//! pending deliveries and failed deliveries eligible for retry.

mod backend;
mod factory;
mod memory_backend;
mod postgres_backend;

pub use backend::{ListQuery, NotificationStore, Page, StoreError};
pub use factory::create_store;
pub use memory_backend::MemoryNotificationStore;
pub use postgres_backend::PostgresNotificationStore;

#[cfg(test)]
pub(crate) mod testing;

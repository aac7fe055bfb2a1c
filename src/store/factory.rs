//! Notification store factory

use std::sync::Arc;

use crate::config::{StoreBackend, StoreConfig};
use crate::postgres::PostgresPool;

use super::backend::NotificationStore;
use super::memory_backend::MemoryNotificationStore;
use super::postgres_backend::PostgresNotificationStore;

/// Create a notification store based on configuration.
///
/// - `postgres`: `PostgresNotificationStore` if a PostgreSQL pool is provided
/// - `memory` (default): `MemoryNotificationStore`
///
/// A postgres backend requested without a pool falls back to memory.
pub fn create_store(
    settings: &StoreConfig,
    postgres_pool: Option<&PostgresPool>,
) -> Arc<dyn NotificationStore> {
    match settings.backend {
        StoreBackend::Postgres => {
            if let Some(pool) = postgres_pool {
                tracing::info!(
                    backend = "postgres",
                    url = %pool.database_url_masked(),
                    "Creating PostgreSQL notification store"
                );
                Arc::new(PostgresNotificationStore::new(pool.pool().clone()))
            } else {
                tracing::warn!(
                    "PostgreSQL store requested but no pool provided, falling back to memory"
                );
                Arc::new(MemoryNotificationStore::new())
            }
        }
        StoreBackend::Memory => {
            tracing::info!(backend = "memory", "Creating memory notification store");
            Arc::new(MemoryNotificationStore::new())
        }
    }
}

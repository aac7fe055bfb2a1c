use std::sync::Arc;
use std::time::Instant;

use crate::compose::NotificationComposer;
use crate::config::Settings;
use crate::listeners::EventListeners;
use crate::postgres::PostgresPool;
use crate::store::NotificationStore;
use crate::worker::WorkQueue;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub store: Arc<dyn NotificationStore>,
    pub composer: Arc<NotificationComposer>,
    pub listeners: EventListeners,
    pub queue: Arc<dyn WorkQueue>,
    pub postgres_pool: Option<Arc<PostgresPool>>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        settings: Settings,
        composer: Arc<NotificationComposer>,
        queue: Arc<dyn WorkQueue>,
        postgres_pool: Option<Arc<PostgresPool>>,
    ) -> Self {
        Self {
            settings: Arc::new(settings),
            store: composer.store().clone(),
            listeners: EventListeners::new(composer.clone()),
            composer,
            queue,
            postgres_pool,
            start_time: Instant::now(),
        }
    }
}

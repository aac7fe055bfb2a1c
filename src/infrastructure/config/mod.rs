mod settings;

pub use settings::{
    ApiConfig, DatabaseConfig, DeliveryConfig, QueueBackend, QueueConfig, SchedulerConfig,
    ServerConfig, Settings, StoreBackend, StoreConfig, TransportConfig,
};

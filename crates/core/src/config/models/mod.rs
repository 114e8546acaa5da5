pub mod api_observability;
pub mod app_config;
pub mod automation;
pub mod database;
pub mod scheduler;

pub use api_observability::{ApiConfig, ObservabilityConfig};
pub use app_config::AppConfig;
pub use automation::AutomationConfig;
pub use database::DatabaseConfig;
pub use scheduler::{PacingConfig, SchedulerConfig};

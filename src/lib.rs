pub mod app;
pub mod config;
pub mod counter;
pub mod errors;
pub mod metrics;
pub mod store;

pub mod prelude {
    pub use crate::app::App;
    pub use crate::config::{ServerConfig, StoreConfig};
    pub use crate::counter::{app, routes, HealthStatus};
    pub use crate::errors::{AppError, AppResult};
    pub use crate::metrics::metric_counter;
    pub use crate::store::{CounterStore, RedisStore, SharedStore, HITS_KEY};
    pub use axum::response::IntoResponse;
    pub use axum::routing::get;
    pub use axum::{Extension, Router};
    pub use tracing::{debug, error, info, trace, warn};
}

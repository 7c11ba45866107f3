//! The two public endpoints: the shared hit counter and its health check.

use crate::{
    app::App,
    errors::AppResult,
    metrics,
    store::{SharedStore, HITS_KEY},
};
use axum::{http::StatusCode, response::IntoResponse, routing::get, Extension, Json, Router};
use serde::Serialize;
use tracing::warn;

/// Health of the counter store as reported by `/health`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy { error: String },
}

impl HealthStatus {
    pub fn status_code(&self) -> StatusCode {
        match self {
            HealthStatus::Healthy => StatusCode::OK,
            HealthStatus::Unhealthy { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<anyhow::Result<()>> for HealthStatus {
    fn from(value: anyhow::Result<()>) -> Self {
        match value {
            Ok(()) => HealthStatus::Healthy,
            Err(err) => {
                let error = err.to_string();
                HealthStatus::Unhealthy {
                    error: if error.is_empty() {
                        "unknown store error".into()
                    } else {
                        error
                    },
                }
            }
        }
    }
}

impl IntoResponse for HealthStatus {
    fn into_response(self) -> axum::response::Response {
        (self.status_code(), Json(self)).into_response()
    }
}

pub fn routes() -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
}

/// The full service wired to `store`.
pub fn app(store: SharedStore) -> App {
    App::new().router(routes()).inject(store)
}

async fn index(Extension(store): Extension<SharedStore>) -> AppResult<String> {
    let count = store.increment(HITS_KEY).await?;
    metrics::record_increment();
    let host = hostname::get()?;
    Ok(format!(
        "Counter: {count} (served by {})",
        host.to_string_lossy()
    ))
}

async fn health(Extension(store): Extension<SharedStore>) -> HealthStatus {
    let status = HealthStatus::from(store.ping().await);
    if let HealthStatus::Unhealthy { error } = &status {
        warn!("Counter store unhealthy: {error}");
        metrics::record_health_failure();
    }
    status
}

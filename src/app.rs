use crate::config::{ServerConfig, TlsConfig};
use axum::{
    http::StatusCode,
    routing::{get, MethodRouter},
    Extension, Router,
};
use axum_prometheus::PrometheusMetricLayer;
use axum_server::tls_rustls::RustlsConfig;
use axum_test::{
    transport_layer::{IntoTransportLayer, TransportLayer, TransportLayerBuilder},
    TestServer,
};
use sentry_tower::{NewSentryLayer, SentryHttpLayer};
use std::{env, net::SocketAddr, time::Duration};
use tokio::net::TcpListener;
use tower_http::compression::CompressionLayer;
use tracing::info;
use tracing_subscriber::{
    filter::EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt, Layer,
};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Service routes plus the operational ones (liveness, prometheus exposition).
///
/// Request metrics are layered when the app is turned into a router, so they
/// cover every route regardless of the order routes were added in.
pub struct App {
    routes: Router,
    operational: Router,
    metrics: PrometheusMetricLayer<'static>,
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}

impl App {
    pub fn new() -> Self {
        dotenvy::dotenv().ok();
        logger();
        let (metrics, exposition) = PrometheusMetricLayer::pair();
        let operational = Router::new()
            .route("/status/liveness", get(|| async { StatusCode::OK }))
            .route(
                "/metrics/prometheus",
                get(move || async move { exposition.render() }),
            );
        Self {
            routes: Router::new(),
            operational,
            metrics,
        }
    }

    pub fn router(mut self, router: Router) -> Self {
        self.routes = self.routes.merge(router);
        self
    }

    pub fn route(mut self, path: &str, method_router: MethodRouter<()>) -> Self {
        self.routes = self.routes.route(path, method_router);
        self
    }

    /// Makes `t` available as `Extension<T>` to the routes added so far.
    pub fn inject<T: Clone + Send + Sync + 'static>(mut self, t: T) -> Self {
        self.routes = self.routes.layer(Extension(t));
        self
    }

    pub async fn start(self) -> anyhow::Result<()> {
        let config = ServerConfig::from_env()?;
        let _sentry = sentry();
        let router = self
            .into_router()
            .layer(NewSentryLayer::new_from_top())
            .layer(SentryHttpLayer::with_transaction())
            .layer(
                CompressionLayer::new()
                    .br(true)
                    .deflate(true)
                    .gzip(true)
                    .zstd(true),
            );
        match config.tls {
            Some(ref tls) => serve_tls(router, config.addr(), tls).await?,
            None => serve(router, config.addr()).await?,
        }
        info!("Server stopped");
        Ok(())
    }

    pub fn as_test_server(self) -> anyhow::Result<TestServer> {
        TestServer::new(self)
    }

    fn into_router(self) -> Router {
        self.routes.merge(self.operational).layer(self.metrics)
    }
}

impl IntoTransportLayer for App {
    fn into_http_transport_layer(
        self,
        builder: TransportLayerBuilder,
    ) -> anyhow::Result<Box<dyn TransportLayer>> {
        self.into_router().into_http_transport_layer(builder)
    }

    fn into_mock_transport_layer(self) -> anyhow::Result<Box<dyn TransportLayer>> {
        self.into_router().into_mock_transport_layer()
    }
}

async fn serve(router: Router, addr: SocketAddr) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("Listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn serve_tls(router: Router, addr: SocketAddr, tls: &TlsConfig) -> anyhow::Result<()> {
    let rustls = RustlsConfig::from_pem_file(&tls.pem_cert, &tls.pem_key).await?;
    let handle = axum_server::Handle::new();
    tokio::spawn({
        let handle = handle.clone();
        async move {
            shutdown_signal().await;
            handle.graceful_shutdown(Some(SHUTDOWN_GRACE));
        }
    });
    info!("Listening on https://{addr}");
    axum_server::bind_rustls(addr, rustls)
        .handle(handle)
        .serve(router.into_make_service())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.ok();
    };
    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(_) => std::future::pending().await,
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}

/// Error reporting is on only when `SENTRY_URL` is set.
fn sentry() -> Option<sentry::ClientInitGuard> {
    let dsn = env::var("SENTRY_URL").ok()?;
    let options = sentry::ClientOptions {
        release: sentry::release_name!(),
        traces_sample_rate: 1.0,
        ..Default::default()
    };
    Some(sentry::init((dsn, options)))
}

/// `STRUCTURED_LOGGING=true` switches to json lines. Safe to call more than once.
pub(crate) fn logger() {
    let json = env::var("STRUCTURED_LOGGING")
        .ok()
        .and_then(|s| s.parse::<bool>().ok())
        .unwrap_or(false);
    let format = if json {
        fmt::layer().json().boxed()
    } else {
        fmt::layer().boxed()
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(format)
        .with(filter)
        .try_init()
        .ok();
}

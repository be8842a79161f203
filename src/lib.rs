//! poolgate - an LLM API gateway over weighted provider pools
//!
//! Clients address three virtual models; each resolves to a pool of
//! `(provider, model)` endpoints. Dispatch selects endpoints round-robin
//! across providers and weight-proportionally within one, fails over around
//! cooling endpoints, and translates between the OpenAI and Anthropic wire
//! formats in both directions, streaming included.

use std::borrow::Cow;
use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use axum_prometheus::{
    GenericMetricLayer, Handle, PrometheusMetricLayerBuilder,
    metrics_exporter_prometheus::PrometheusHandle,
};
use tracing::{info, instrument};

pub mod admin;
pub mod client;
pub mod config;
pub mod dispatch;
pub mod errors;
pub mod handlers;
pub mod health;
pub mod logsink;
pub mod pool;
pub mod registry;
pub mod selector;
pub mod store;
pub mod stream;
pub mod translate;
pub mod wire;

use client::{HttpClient, HyperClient, create_hyper_client};
use config::Config;
use health::HealthTracker;
use logsink::LogSink;
use registry::Registry;
use selector::Selector;
use store::Store;

/// Shared application state; generic over the upstream client so tests can
/// substitute a mock.
#[derive(Debug, Clone)]
pub struct AppState<T: HttpClient> {
    pub http_client: T,
    pub registry: Arc<Registry>,
    pub health: Arc<HealthTracker>,
    pub selector: Arc<Selector>,
    pub log_sink: LogSink,
    pub store: Store,
    pub config: Config,
}

impl AppState<HyperClient> {
    /// Production state with the default hyper client.
    pub async fn new(store: Store, config: Config) -> anyhow::Result<Self> {
        Self::with_client(store, config, create_hyper_client()).await
    }
}

impl<T: HttpClient> AppState<T> {
    /// State with a custom upstream client (used by tests).
    pub async fn with_client(store: Store, config: Config, http_client: T) -> anyhow::Result<Self> {
        let registry = Arc::new(Registry::load(store.clone(), &config).await?);
        let health = Arc::new(HealthTracker::new());
        health.seed(store.load_endpoint_health().await?);
        let log_sink = LogSink::spawn(store.clone(), config.max_logs_count);

        Ok(Self {
            http_client,
            registry,
            health,
            selector: Arc::new(Selector::new()),
            log_sink,
            store,
            config,
        })
    }
}

/// Builds the full router: client surface at the root, admin nested under
/// /admin behind the shared-password gate.
#[instrument(skip(state))]
pub fn build_router<T: HttpClient + Clone + Send + Sync + 'static>(
    state: AppState<T>,
) -> Router {
    info!("Building router");
    let admin_routes = admin::router::<T>().route_layer(axum::middleware::from_fn_with_state(
        state.clone(),
        admin::admin_auth::<T>,
    ));

    Router::new()
        .route("/", get(handlers::index))
        .route("/v1/models", get(handlers::list_models))
        .route("/v1/chat/completions", post(handlers::chat_completions))
        .route("/v1/messages", post(handlers::messages))
        .nest("/admin", admin_routes)
        .with_state(state)
}

/// Builds a router for the metrics endpoint.
#[instrument(skip(handle))]
pub fn build_metrics_router(handle: PrometheusHandle) -> Router {
    Router::new().route(
        "/metrics",
        get(move || async move { handle.render() }),
    )
}

type MetricsLayerAndHandle = (
    GenericMetricLayer<'static, PrometheusHandle, Handle>,
    PrometheusHandle,
);

/// Builds a layer and handle for prometheus metrics collection.
pub fn build_metrics_layer_and_handle(
    prefix: impl Into<Cow<'static, str>>,
) -> MetricsLayerAndHandle {
    PrometheusMetricLayerBuilder::new()
        .with_prefix(prefix)
        .with_endpoint_label_type(axum_prometheus::EndpointLabel::Exact)
        .with_default_metrics()
        .build_pair()
}

pub mod test_utils {
    use super::*;
    use async_trait::async_trait;
    use axum::http::StatusCode;
    use std::sync::{Arc, Mutex};

    /// Records every upstream request and answers from a scripted queue of
    /// responses (falling back to the last one).
    pub struct MockHttpClient {
        pub requests: Arc<Mutex<Vec<MockRequest>>>,
        responses: Arc<Mutex<Vec<MockResponse>>>,
    }

    #[derive(Debug, Clone)]
    pub struct MockRequest {
        pub method: String,
        pub uri: String,
        pub headers: Vec<(String, String)>,
        pub body: Vec<u8>,
    }

    #[derive(Clone)]
    enum MockResponse {
        Json(StatusCode, String),
        Streaming(StatusCode, Vec<String>),
    }

    impl MockHttpClient {
        pub fn new(status: StatusCode, body: &str) -> Self {
            Self {
                requests: Arc::new(Mutex::new(Vec::new())),
                responses: Arc::new(Mutex::new(vec![MockResponse::Json(
                    status,
                    body.to_string(),
                )])),
            }
        }

        pub fn new_streaming(status: StatusCode, chunks: Vec<String>) -> Self {
            Self {
                requests: Arc::new(Mutex::new(Vec::new())),
                responses: Arc::new(Mutex::new(vec![MockResponse::Streaming(status, chunks)])),
            }
        }

        /// Queue an additional response; each request pops the front until
        /// one response remains, which then repeats.
        pub fn push_response(&self, status: StatusCode, body: &str) {
            self.responses
                .lock()
                .unwrap()
                .push(MockResponse::Json(status, body.to_string()));
        }

        pub fn get_requests(&self) -> Vec<MockRequest> {
            self.requests.lock().unwrap().clone()
        }

        fn next_response(&self) -> MockResponse {
            let mut responses = self.responses.lock().unwrap();
            if responses.len() > 1 {
                responses.remove(0)
            } else {
                responses[0].clone()
            }
        }
    }

    impl std::fmt::Debug for MockHttpClient {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("MockHttpClient")
                .field("requests", &self.requests)
                .finish_non_exhaustive()
        }
    }

    impl Clone for MockHttpClient {
        fn clone(&self) -> Self {
            Self {
                requests: Arc::clone(&self.requests),
                responses: Arc::clone(&self.responses),
            }
        }
    }

    #[async_trait]
    impl HttpClient for MockHttpClient {
        async fn request(
            &self,
            req: axum::extract::Request,
        ) -> Result<axum::response::Response, Box<dyn std::error::Error + Send + Sync>> {
            let method = req.method().to_string();
            let uri = req.uri().to_string();
            let headers = req
                .headers()
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or("").to_string()))
                .collect();
            let body = axum::body::to_bytes(req.into_body(), usize::MAX)
                .await
                .map_err(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>)?
                .to_vec();

            self.requests.lock().unwrap().push(MockRequest {
                method,
                uri,
                headers,
                body,
            });

            Ok(match self.next_response() {
                MockResponse::Json(status, body) => axum::response::Response::builder()
                    .status(status)
                    .header("content-type", "application/json")
                    .body(axum::body::Body::from(body))
                    .unwrap(),
                MockResponse::Streaming(status, chunks) => {
                    use futures_util::stream;
                    let stream = stream::iter(
                        chunks
                            .into_iter()
                            .map(|chunk| Ok::<_, std::io::Error>(chunk.into_bytes())),
                    );
                    axum::response::Response::builder()
                        .status(status)
                        .header("content-type", "text/event-stream")
                        .header("cache-control", "no-cache")
                        .header("connection", "keep-alive")
                        .body(axum::body::Body::from_stream(stream))
                        .unwrap()
                }
            })
        }
    }
}

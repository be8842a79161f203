//! Admin surface: CRUD over providers, endpoints and pool configs, the
//! upstream model-catalogue probe, stats, and log paging.
//!
//! Every route sits behind the shared admin password (bearer). Mutations
//! write through the store and then reload the registry snapshot, so the
//! next dispatch sees them.

use std::collections::HashMap;

use axum::extract::{Path, Query, Request, State};
use axum::http::{StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;

use crate::AppState;
use crate::client::HttpClient;
use crate::dispatch::models_url;
use crate::health::HealthTracker;
use crate::pool::{Endpoint, EndpointInfo, PoolTag, Provider, ProviderInfo, WireFormat};
use crate::store::{EndpointPatch, LogQuery, PoolPatch, ProviderPatch};
use crate::wire::anthropic::ANTHROPIC_VERSION;

#[derive(Debug, thiserror::Error)]
pub enum AdminError {
    #[error("not found")]
    NotFound,

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("upstream probe failed: {0}")]
    Probe(String),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

impl IntoResponse for AdminError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AdminError::NotFound => (StatusCode::NOT_FOUND, self.to_string()),
            AdminError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AdminError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            AdminError::Probe(msg) => (StatusCode::BAD_GATEWAY, msg.clone()),
            AdminError::Sqlx(e) => {
                tracing::error!("database error: {e}");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error".into())
            }
        };
        (status, Json(json!({"error": {"message": message}}))).into_response()
    }
}

/// Middleware validating the shared admin password from env config.
pub async fn admin_auth<T: HttpClient>(
    State(state): State<AppState<T>>,
    req: Request,
    next: Next,
) -> Response {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match token {
        Some(token) if token == state.config.admin_password => next.run(req).await,
        Some(_) => (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": {"message": "invalid admin password"}})),
        )
            .into_response(),
        None => (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": {"message": "missing Authorization header"}})),
        )
            .into_response(),
    }
}

// ── Providers ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateProviderRequest {
    pub name: String,
    pub base_url: String,
    pub api_key: String,
    #[serde(default = "default_format")]
    pub api_format: WireFormat,
}

fn default_format() -> WireFormat {
    WireFormat::OpenAi
}

#[derive(Debug, Deserialize)]
pub struct UpdateProviderRequest {
    pub name: Option<String>,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub api_format: Option<WireFormat>,
    pub enabled: Option<bool>,
}

fn provider_info(
    provider: &Provider,
    endpoints: &[Endpoint],
    health: &HealthTracker,
) -> ProviderInfo {
    let now = Utc::now();
    let own: Vec<&Endpoint> = endpoints
        .iter()
        .filter(|e| e.provider_id == provider.id)
        .collect();
    let healthy = own
        .iter()
        .filter(|e| e.enabled && !health.get(e.id).is_cooling(now))
        .count();
    ProviderInfo {
        id: provider.id,
        name: provider.name.clone(),
        base_url: provider.base_url.clone(),
        api_key_preview: provider.api_key_preview(),
        api_format: provider.api_format,
        enabled: provider.enabled,
        total_requests: provider.total_requests,
        success_requests: provider.success_requests,
        error_requests: provider.error_requests,
        endpoint_count: own.len(),
        healthy_endpoint_count: healthy,
        created_at: provider.created_at,
    }
}

async fn list_providers<T: HttpClient>(
    State(state): State<AppState<T>>,
) -> Result<Json<Vec<ProviderInfo>>, AdminError> {
    let providers = state.store.list_providers().await?;
    let endpoints = state.store.list_endpoints(None, None).await?;
    let infos = providers
        .iter()
        .map(|p| provider_info(p, &endpoints, &state.health))
        .collect();
    Ok(Json(infos))
}

async fn create_provider<T: HttpClient>(
    State(state): State<AppState<T>>,
    Json(body): Json<CreateProviderRequest>,
) -> Result<impl IntoResponse, AdminError> {
    if body.name.trim().is_empty() {
        return Err(AdminError::BadRequest("name is required".into()));
    }
    if body.base_url.trim().is_empty() {
        return Err(AdminError::BadRequest("base_url is required".into()));
    }

    let provider = state
        .store
        .create_provider(&body.name, &body.base_url, &body.api_key, body.api_format)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                AdminError::Conflict(format!("provider \"{}\" already exists", body.name))
            }
            other => AdminError::Sqlx(other),
        })?;
    state.registry.reload().await?;

    Ok((
        StatusCode::CREATED,
        Json(provider_info(&provider, &[], &state.health)),
    ))
}

async fn update_provider<T: HttpClient>(
    State(state): State<AppState<T>>,
    Path(id): Path<i64>,
    Json(body): Json<UpdateProviderRequest>,
) -> Result<Json<ProviderInfo>, AdminError> {
    let provider = state
        .store
        .update_provider(
            id,
            ProviderPatch {
                name: body.name,
                base_url: body.base_url,
                api_key: body.api_key,
                api_format: body.api_format,
                enabled: body.enabled,
            },
        )
        .await?
        .ok_or(AdminError::NotFound)?;
    state.registry.reload().await?;

    let endpoints = state.store.list_endpoints(Some(id), None).await?;
    Ok(Json(provider_info(&provider, &endpoints, &state.health)))
}

async fn delete_provider<T: HttpClient>(
    State(state): State<AppState<T>>,
    Path(id): Path<i64>,
) -> Result<StatusCode, AdminError> {
    if !state.store.delete_provider(id).await? {
        return Err(AdminError::NotFound);
    }
    state.registry.reload().await?;
    prune_health(&state).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /admin/providers/{id}/fetch-models — probe the upstream catalogue.
///
/// Aggregator services tend to expose an OpenAI-shaped /models endpoint even
/// for Anthropic-format providers, so the bearer strategy is tried first and
/// the x-api-key strategy second. The result is returned for the UI to drive
/// a batch-create; nothing is persisted.
async fn fetch_models<T: HttpClient>(
    State(state): State<AppState<T>>,
    Path(id): Path<i64>,
) -> Result<Json<Value>, AdminError> {
    let provider = state
        .store
        .get_provider(id)
        .await?
        .ok_or(AdminError::NotFound)?;

    let url = models_url(&provider.base_url, provider.api_format);
    let strategies: [Vec<(&str, String)>; 2] = [
        vec![("authorization", format!("Bearer {}", provider.api_key))],
        vec![
            ("x-api-key", provider.api_key.clone()),
            ("anthropic-version", ANTHROPIC_VERSION.to_string()),
        ],
    ];

    let mut last_error = String::from("no strategies attempted");
    for headers in &strategies {
        let mut builder = axum::extract::Request::builder().method("GET").uri(&url);
        for (name, value) in headers {
            builder = builder.header(*name, value.as_str());
        }
        let request = builder
            .body(axum::body::Body::empty())
            .map_err(|e| AdminError::Probe(e.to_string()))?;

        let response = match state.http_client.request(request).await {
            Ok(response) => response,
            Err(e) => {
                last_error = e.to_string();
                continue;
            }
        };
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), 4 * 1024 * 1024)
            .await
            .unwrap_or_default();
        if !status.is_success() {
            last_error = format!("HTTP {}", status.as_u16());
            debug!("model probe strategy failed for {url}: {last_error}");
            continue;
        }

        let Ok(value) = serde_json::from_slice::<Value>(&bytes) else {
            last_error = "unparseable model list".into();
            continue;
        };
        let mut models = parse_model_list(&value);
        if models.is_empty() {
            last_error = "empty model list".into();
            continue;
        }
        models.sort();
        return Ok(Json(json!({
            "provider_id": provider.id,
            "provider_name": provider.name,
            "models": models,
        })));
    }

    Err(AdminError::Probe(last_error))
}

/// Tolerates OpenAI `{"data": [...]}`, Anthropic `{"models": [...]}` and
/// bare-list shapes, with `id` or `name` keys.
fn parse_model_list(value: &Value) -> Vec<String> {
    let items = if let Some(data) = value.get("data").and_then(Value::as_array) {
        data
    } else if let Some(models) = value.get("models").and_then(Value::as_array) {
        models
    } else if let Some(list) = value.as_array() {
        list
    } else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| match item {
            Value::String(s) => Some(s.clone()),
            Value::Object(_) => item["id"]
                .as_str()
                .or_else(|| item["name"].as_str())
                .map(String::from),
            _ => None,
        })
        .collect()
}

// ── Endpoints ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ListEndpointsQuery {
    pub provider_id: Option<i64>,
    pub pool: Option<PoolTag>,
}

#[derive(Debug, Deserialize)]
pub struct CreateEndpointRequest {
    pub provider_id: i64,
    pub model_id: String,
    pub pool: PoolTag,
    #[serde(default = "default_weight")]
    pub weight: i64,
}

fn default_weight() -> i64 {
    1
}

#[derive(Debug, Deserialize)]
pub struct BatchCreateEndpointsRequest {
    pub provider_id: i64,
    pub pool: PoolTag,
    pub model_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateEndpointRequest {
    pub pool: Option<PoolTag>,
    pub enabled: Option<bool>,
    pub weight: Option<i64>,
    pub min_interval_seconds: Option<i64>,
    pub priority: Option<i64>,
}

fn endpoint_info(
    endpoint: &Endpoint,
    provider_name: &str,
    health: &HealthTracker,
) -> EndpointInfo {
    let now = Utc::now();
    let record = health.get(endpoint.id);
    let success_rate = if record.total_requests > 0 {
        (record.success_requests as f64 / record.total_requests as f64 * 10_000.0).round() / 100.0
    } else {
        0.0
    };
    EndpointInfo {
        id: endpoint.id,
        provider_id: endpoint.provider_id,
        provider_name: provider_name.to_string(),
        model_id: endpoint.model_id.clone(),
        pool: endpoint.pool,
        enabled: endpoint.enabled,
        weight: endpoint.weight,
        min_interval_seconds: endpoint.min_interval_seconds,
        priority: endpoint.priority,
        is_cooling: record.is_cooling(now),
        cooldown_until: record.cooldown_until,
        last_error: record.last_error.clone(),
        last_used_at: record.last_used_at,
        total_requests: record.total_requests,
        success_requests: record.success_requests,
        error_requests: record.error_requests,
        avg_latency_ms: (record.avg_latency_ms * 100.0).round() / 100.0,
        success_rate,
    }
}

async fn list_endpoints<T: HttpClient>(
    State(state): State<AppState<T>>,
    Query(query): Query<ListEndpointsQuery>,
) -> Result<Json<Vec<EndpointInfo>>, AdminError> {
    let providers = state.store.list_providers().await?;
    let names: HashMap<i64, &str> = providers
        .iter()
        .map(|p| (p.id, p.name.as_str()))
        .collect();
    let endpoints = state
        .store
        .list_endpoints(query.provider_id, query.pool)
        .await?;
    let infos = endpoints
        .iter()
        .map(|e| {
            endpoint_info(
                e,
                names.get(&e.provider_id).copied().unwrap_or("unknown"),
                &state.health,
            )
        })
        .collect();
    Ok(Json(infos))
}

async fn create_endpoint<T: HttpClient>(
    State(state): State<AppState<T>>,
    Json(body): Json<CreateEndpointRequest>,
) -> Result<impl IntoResponse, AdminError> {
    let provider = state
        .store
        .get_provider(body.provider_id)
        .await?
        .ok_or(AdminError::NotFound)?;
    if body.model_id.trim().is_empty() {
        return Err(AdminError::BadRequest("model_id is required".into()));
    }
    if state
        .store
        .endpoint_exists(body.provider_id, &body.model_id, body.pool)
        .await?
    {
        return Err(AdminError::Conflict(format!(
            "endpoint {}/{} already in pool {}",
            provider.name,
            body.model_id,
            body.pool.as_str()
        )));
    }

    let endpoint = state
        .store
        .create_endpoint(body.provider_id, &body.model_id, body.pool, body.weight)
        .await?;
    state.registry.reload().await?;

    Ok((
        StatusCode::CREATED,
        Json(endpoint_info(&endpoint, &provider.name, &state.health)),
    ))
}

/// POST /admin/endpoints/batch — create many endpoints for one
/// `(provider, pool)`, skipping ones that already exist.
async fn batch_create_endpoints<T: HttpClient>(
    State(state): State<AppState<T>>,
    Json(body): Json<BatchCreateEndpointsRequest>,
) -> Result<Json<Value>, AdminError> {
    state
        .store
        .get_provider(body.provider_id)
        .await?
        .ok_or(AdminError::NotFound)?;

    let mut created = 0usize;
    let mut skipped = 0usize;
    for model_id in &body.model_ids {
        if model_id.trim().is_empty() {
            skipped += 1;
            continue;
        }
        if state
            .store
            .endpoint_exists(body.provider_id, model_id, body.pool)
            .await?
        {
            skipped += 1;
            continue;
        }
        state
            .store
            .create_endpoint(body.provider_id, model_id, body.pool, 1)
            .await?;
        created += 1;
    }
    state.registry.reload().await?;

    Ok(Json(json!({
        "success": true,
        "created": created,
        "skipped": skipped,
        "pool": body.pool,
    })))
}

async fn update_endpoint<T: HttpClient>(
    State(state): State<AppState<T>>,
    Path(id): Path<i64>,
    Json(body): Json<UpdateEndpointRequest>,
) -> Result<Json<EndpointInfo>, AdminError> {
    let endpoint = state
        .store
        .update_endpoint(
            id,
            EndpointPatch {
                pool: body.pool,
                enabled: body.enabled,
                weight: body.weight,
                min_interval_seconds: body.min_interval_seconds,
                priority: body.priority,
            },
        )
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => AdminError::Conflict(
                "the target pool already has this provider/model placement".into(),
            ),
            other => AdminError::Sqlx(other),
        })?
        .ok_or(AdminError::NotFound)?;
    state.registry.reload().await?;

    let provider = state
        .store
        .get_provider(endpoint.provider_id)
        .await?
        .ok_or(AdminError::NotFound)?;
    Ok(Json(endpoint_info(&endpoint, &provider.name, &state.health)))
}

async fn delete_endpoint<T: HttpClient>(
    State(state): State<AppState<T>>,
    Path(id): Path<i64>,
) -> Result<StatusCode, AdminError> {
    if !state.store.delete_endpoint(id).await? {
        return Err(AdminError::NotFound);
    }
    state.registry.reload().await?;
    prune_health(&state).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn prune_health<T: HttpClient>(state: &AppState<T>) -> Result<(), AdminError> {
    let ids = state
        .store
        .list_endpoints(None, None)
        .await?
        .into_iter()
        .map(|e| e.id)
        .collect();
    state.health.retain_ids(&ids);
    Ok(())
}

// ── Pools ─────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct UpdatePoolRequest {
    pub virtual_model: Option<String>,
    pub cooldown_seconds: Option<i64>,
    pub timeout_seconds: Option<i64>,
    pub max_retries: Option<i64>,
}

#[derive(Debug, Serialize)]
struct PoolInfo {
    pool: PoolTag,
    virtual_model: String,
    cooldown_seconds: i64,
    timeout_seconds: i64,
    max_retries: i64,
    endpoint_count: usize,
    healthy_endpoint_count: usize,
    provider_count: usize,
}

fn pool_info(
    tag: PoolTag,
    config: &crate::pool::PoolConfig,
    endpoints: &[Endpoint],
    providers: &[Provider],
    health: &HealthTracker,
) -> PoolInfo {
    let now = Utc::now();
    let enabled_providers: HashMap<i64, bool> =
        providers.iter().map(|p| (p.id, p.enabled)).collect();
    let own: Vec<&Endpoint> = endpoints.iter().filter(|e| e.pool == tag).collect();
    let healthy = own
        .iter()
        .filter(|e| {
            e.enabled
                && enabled_providers.get(&e.provider_id).copied().unwrap_or(false)
                && !health.get(e.id).is_cooling(now)
        })
        .count();
    let provider_count = own
        .iter()
        .map(|e| e.provider_id)
        .collect::<std::collections::HashSet<_>>()
        .len();
    PoolInfo {
        pool: tag,
        virtual_model: config.virtual_model.clone(),
        cooldown_seconds: config.cooldown_seconds,
        timeout_seconds: config.timeout_seconds,
        max_retries: config.max_retries,
        endpoint_count: own.len(),
        healthy_endpoint_count: healthy,
        provider_count,
    }
}

async fn list_pools<T: HttpClient>(
    State(state): State<AppState<T>>,
) -> Result<Json<Vec<PoolInfo>>, AdminError> {
    let snapshot = state.registry.snapshot();
    let providers = state.store.list_providers().await?;
    let endpoints = state.store.list_endpoints(None, None).await?;
    let infos = PoolTag::ALL
        .into_iter()
        .map(|tag| {
            pool_info(
                tag,
                snapshot.pool_config(tag),
                &endpoints,
                &providers,
                &state.health,
            )
        })
        .collect();
    Ok(Json(infos))
}

/// GET /admin/pools/{tag} — pool detail grouped per provider.
async fn get_pool<T: HttpClient>(
    State(state): State<AppState<T>>,
    Path(tag): Path<String>,
) -> Result<Json<Value>, AdminError> {
    let tag = PoolTag::parse(&tag).ok_or(AdminError::NotFound)?;
    let snapshot = state.registry.snapshot();
    let config = snapshot.pool_config(tag);
    let now = Utc::now();

    let providers: Vec<Value> = snapshot
        .groups(tag)
        .iter()
        .map(|group| {
            let models: Vec<Value> = group
                .endpoints
                .iter()
                .map(|e| {
                    let record = state.health.get(e.id);
                    json!({
                        "id": e.id,
                        "model_id": e.model_id,
                        "enabled": e.enabled,
                        "weight": e.weight,
                        "is_cooling": record.is_cooling(now),
                        "cooldown_remaining": record.cooldown_remaining_secs(now),
                        "total_requests": record.total_requests,
                        "success_requests": record.success_requests,
                        "avg_latency_ms": (record.avg_latency_ms * 100.0).round() / 100.0,
                    })
                })
                .collect();
            let healthy = group
                .endpoints
                .iter()
                .filter(|e| e.enabled && !state.health.get(e.id).is_cooling(now))
                .count();
            json!({
                "provider_id": group.provider.id,
                "provider_name": group.provider.name,
                "base_url": group.provider.base_url,
                "api_format": group.provider.api_format,
                "enabled": group.provider.enabled,
                "models": models,
                "healthy_count": healthy,
                "total_count": group.endpoints.len(),
            })
        })
        .collect();

    Ok(Json(json!({
        "pool": tag,
        "virtual_model": config.virtual_model,
        "cooldown_seconds": config.cooldown_seconds,
        "timeout_seconds": config.timeout_seconds,
        "max_retries": config.max_retries,
        "providers": providers,
    })))
}

/// PUT /admin/pools/{tag} — config changes apply to subsequent dispatches;
/// already-scheduled cooldowns are left as they are.
async fn update_pool<T: HttpClient>(
    State(state): State<AppState<T>>,
    Path(tag): Path<String>,
    Json(body): Json<UpdatePoolRequest>,
) -> Result<Json<PoolInfo>, AdminError> {
    let tag = PoolTag::parse(&tag).ok_or(AdminError::NotFound)?;
    state
        .store
        .update_pool(
            tag,
            PoolPatch {
                virtual_model: body.virtual_model,
                cooldown_seconds: body.cooldown_seconds,
                timeout_seconds: body.timeout_seconds,
                max_retries: body.max_retries,
            },
        )
        .await?
        .ok_or(AdminError::NotFound)?;
    state.registry.reload().await?;

    let snapshot = state.registry.snapshot();
    let providers = state.store.list_providers().await?;
    let endpoints = state.store.list_endpoints(None, None).await?;
    Ok(Json(pool_info(
        tag,
        snapshot.pool_config(tag),
        &endpoints,
        &providers,
        &state.health,
    )))
}

// ── Stats and logs ────────────────────────────────────────────────────

async fn get_stats<T: HttpClient>(
    State(state): State<AppState<T>>,
) -> Result<Json<Value>, AdminError> {
    let providers = state.store.list_providers().await?;
    let endpoints = state.store.list_endpoints(None, None).await?;
    let now = Utc::now();
    let enabled_providers: HashMap<i64, bool> =
        providers.iter().map(|p| (p.id, p.enabled)).collect();

    let mut total_requests = 0u64;
    let mut success_requests = 0u64;
    let mut error_requests = 0u64;
    let mut healthy = 0usize;
    let mut cooling = 0usize;
    for endpoint in &endpoints {
        let record = state.health.get(endpoint.id);
        total_requests += record.total_requests;
        success_requests += record.success_requests;
        error_requests += record.error_requests;
        if record.is_cooling(now) {
            cooling += 1;
        } else if endpoint.enabled
            && enabled_providers
                .get(&endpoint.provider_id)
                .copied()
                .unwrap_or(false)
        {
            healthy += 1;
        }
    }

    let mut pool_stats = serde_json::Map::new();
    for tag in PoolTag::ALL {
        let own: Vec<&Endpoint> = endpoints.iter().filter(|e| e.pool == tag).collect();
        let pool_healthy = own
            .iter()
            .filter(|e| e.enabled && !state.health.get(e.id).is_cooling(now))
            .count();
        let (pool_total, pool_success) = own.iter().fold((0u64, 0u64), |(t, s), e| {
            let record = state.health.get(e.id);
            (t + record.total_requests, s + record.success_requests)
        });
        pool_stats.insert(
            tag.as_str().to_string(),
            json!({
                "total_endpoints": own.len(),
                "healthy_endpoints": pool_healthy,
                "total_requests": pool_total,
                "success_requests": pool_success,
            }),
        );
    }

    let success_rate = if total_requests > 0 {
        (success_requests as f64 / total_requests as f64 * 10_000.0).round() / 100.0
    } else {
        0.0
    };

    Ok(Json(json!({
        "total_providers": providers.len(),
        "enabled_providers": providers.iter().filter(|p| p.enabled).count(),
        "total_endpoints": endpoints.len(),
        "healthy_endpoints": healthy,
        "cooling_endpoints": cooling,
        "total_requests": total_requests,
        "success_requests": success_requests,
        "error_requests": error_requests,
        "success_rate": success_rate,
        "pool_stats": pool_stats,
    })))
}

#[derive(Debug, Deserialize)]
pub struct ListLogsQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub pool: Option<PoolTag>,
    pub success: Option<bool>,
    pub provider_name: Option<String>,
}

async fn list_logs<T: HttpClient>(
    State(state): State<AppState<T>>,
    Query(query): Query<ListLogsQuery>,
) -> Result<Json<Value>, AdminError> {
    let (logs, total) = state
        .store
        .list_logs(&LogQuery {
            limit: query.limit.unwrap_or(100).clamp(1, 1000),
            offset: query.offset.unwrap_or(0).max(0),
            pool: query.pool,
            success: query.success,
            provider_name: query.provider_name,
        })
        .await?;
    Ok(Json(json!({"total": total, "logs": logs})))
}

async fn clear_logs<T: HttpClient>(
    State(state): State<AppState<T>>,
) -> Result<Json<Value>, AdminError> {
    let deleted = state.store.clear_logs().await?;
    Ok(Json(json!({"success": true, "deleted": deleted})))
}

/// The admin router, nested under /admin.
pub fn router<T: HttpClient + Clone + Send + Sync + 'static>() -> Router<AppState<T>> {
    Router::new()
        .route("/providers", get(list_providers).post(create_provider))
        .route(
            "/providers/{id}",
            delete(delete_provider).put(update_provider),
        )
        .route("/providers/{id}/fetch-models", post(fetch_models))
        .route("/endpoints", get(list_endpoints).post(create_endpoint))
        .route("/endpoints/batch", post(batch_create_endpoints))
        .route(
            "/endpoints/{id}",
            delete(delete_endpoint).put(update_endpoint),
        )
        .route("/pools", get(list_pools))
        .route("/pools/{tag}", get(get_pool).put(update_pool))
        .route("/stats", get(get_stats))
        .route("/logs", get(list_logs).delete(clear_logs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_list_parsing_tolerates_all_shapes() {
        let openai = json!({"data": [{"id": "gpt-4o"}, {"id": "gpt-4o-mini"}]});
        assert_eq!(parse_model_list(&openai), vec!["gpt-4o", "gpt-4o-mini"]);

        let anthropic = json!({"models": [{"id": "claude-sonnet-4"}, {"name": "claude-haiku"}]});
        assert_eq!(
            parse_model_list(&anthropic),
            vec!["claude-sonnet-4", "claude-haiku"]
        );

        let bare = json!(["m1", {"id": "m2"}, 42]);
        assert_eq!(parse_model_list(&bare), vec!["m1", "m2"]);

        assert!(parse_model_list(&json!({"unexpected": true})).is_empty());
    }
}

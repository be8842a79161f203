//! Client-facing handlers: the two chat surfaces and the virtual model list.
//!
//! Client credentials are checked for presence only; any non-empty
//! `Authorization` (or `x-api-key` on the Anthropic path) is accepted.

use axum::Json;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{Html, IntoResponse, Response};
use serde_json::json;
use tracing::instrument;

use crate::AppState;
use crate::client::HttpClient;
use crate::dispatch::dispatch;
use crate::pool::WireFormat;

fn has_credential(headers: &HeaderMap, allow_x_api_key: bool) -> bool {
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| !v.trim().is_empty());
    if authorization {
        return true;
    }
    allow_x_api_key
        && headers
            .get("x-api-key")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| !v.trim().is_empty())
}

fn missing_credential() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"error": {"message": "missing credentials", "type": "authentication_error"}})),
    )
        .into_response()
}

/// POST /v1/chat/completions — OpenAI-format entry point.
#[instrument(skip(state, headers, body))]
pub async fn chat_completions<T: HttpClient>(
    State(state): State<AppState<T>>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Response {
    if !has_credential(&headers, false) {
        return missing_credential();
    }
    match dispatch(&state, WireFormat::OpenAi, body).await {
        Ok(response) => response,
        Err(e) => e.into_response(),
    }
}

/// POST /v1/messages — Anthropic-format entry point.
#[instrument(skip(state, headers, body))]
pub async fn messages<T: HttpClient>(
    State(state): State<AppState<T>>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Response {
    if !has_credential(&headers, true) {
        return missing_credential();
    }
    match dispatch(&state, WireFormat::Anthropic, body).await {
        Ok(response) => response,
        Err(e) => e.into_response(),
    }
}

/// GET /v1/models — the three virtual models, OpenAI list shape.
pub async fn list_models<T: HttpClient>(State(state): State<AppState<T>>) -> Response {
    let snapshot = state.registry.snapshot();
    let data: Vec<serde_json::Value> = snapshot
        .virtual_models()
        .iter()
        .map(|(name, pool)| {
            json!({
                "id": name,
                "object": "model",
                "created": 0,
                "owned_by": "poolgate",
                "description": format!("{} pool", pool.as_str()),
            })
        })
        .collect();
    Json(json!({"object": "list", "data": data})).into_response()
}

/// GET / — placeholder page; the management UI ships separately.
pub async fn index() -> Html<&'static str> {
    Html(
        "<!doctype html><html><head><title>poolgate</title></head>\
         <body><h1>poolgate</h1><p>LLM pool gateway is running. \
         Admin API under <code>/admin</code>.</p></body></html>",
    )
}

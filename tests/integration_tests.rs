//! End-to-end tests for the gateway
//!
//! These drive the full router (client surface + admin surface) against an
//! in-memory store and a scripted mock upstream client.

use axum::http::StatusCode;
use axum_test::TestServer;
use clap::Parser;
use poolgate::config::Config;
use poolgate::pool::{PoolTag, WireFormat};
use poolgate::store::{LogQuery, Store};
use poolgate::test_utils::MockHttpClient;
use poolgate::{AppState, build_router};
use serde_json::json;

const ADMIN_BEARER: &str = "Bearer admin123";

async fn gateway(mock: MockHttpClient) -> (AppState<MockHttpClient>, TestServer) {
    let store = Store::connect("sqlite::memory:").await.unwrap();
    let config = Config::parse_from(["poolgate"]).validate().unwrap();
    let state = AppState::with_client(store, config, mock).await.unwrap();
    let server = TestServer::new(build_router(state.clone())).unwrap();
    (state, server)
}

/// Seeds (name, base_url, format, [(model, weight)]) providers into a pool.
async fn seed_pool(
    state: &AppState<MockHttpClient>,
    pool: PoolTag,
    providers: &[(&str, &str, WireFormat, &[(&str, i64)])],
) {
    for (name, base_url, format, endpoints) in providers {
        let provider = state
            .store
            .create_provider(name, base_url, &format!("sk-{name}"), *format)
            .await
            .unwrap();
        for (model, weight) in *endpoints {
            state
                .store
                .create_endpoint(provider.id, model, pool, *weight)
                .await
                .unwrap();
        }
    }
    state.registry.reload().await.unwrap();
}

fn openai_completion(text: &str) -> String {
    json!({
        "id": "chatcmpl-test",
        "object": "chat.completion",
        "created": 1,
        "model": "upstream-model",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": text},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 3, "completion_tokens": 2, "total_tokens": 5}
    })
    .to_string()
}

#[tokio::test]
async fn happy_path_bridges_anthropic_client_to_openai_provider() {
    let mock = MockHttpClient::new(StatusCode::OK, &openai_completion("hello"));
    let (state, server) = gateway(mock.clone()).await;
    seed_pool(
        &state,
        PoolTag::Normal,
        &[("acme", "https://llm.acme.dev/v1", WireFormat::OpenAi, &[("gpt-4o", 1)])],
    )
    .await;

    let response = server
        .post("/v1/messages")
        .add_header("x-api-key", "anything")
        .json(&json!({
            "model": "sonnet",
            "max_tokens": 64,
            "messages": [{"role": "user", "content": "hi"}]
        }))
        .await;

    assert_eq!(response.status_code(), 200);
    let body: serde_json::Value = response.json();
    assert_eq!(body["type"], "message");
    assert_eq!(body["content"][0]["type"], "text");
    assert_eq!(body["content"][0]["text"], "hello");
    assert_eq!(body["stop_reason"], "end_turn");
    assert_eq!(body["model"], "sonnet");
    assert_eq!(body["usage"]["input_tokens"], 3);

    // The upstream saw an OpenAI-format request at the canonical path with
    // the endpoint's model id substituted.
    let requests = mock.get_requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].uri, "https://llm.acme.dev/v1/chat/completions");
    let upstream_body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(upstream_body["model"], "gpt-4o");
    assert_eq!(upstream_body["max_tokens"], 64);
    assert_eq!(upstream_body["messages"][0]["content"], "hi");
    let auth = requests[0]
        .headers
        .iter()
        .find(|(k, _)| k == "authorization")
        .map(|(_, v)| v.as_str());
    assert_eq!(auth, Some("Bearer sk-acme"));

    // Counters reflect the success.
    let endpoint_id = state.store.list_endpoints(None, None).await.unwrap()[0].id;
    let record = state.health.get(endpoint_id);
    assert_eq!(record.total_requests, 1);
    assert_eq!(record.success_requests, 1);
}

#[tokio::test]
async fn failover_cools_the_failed_endpoint_and_logs_both_attempts() {
    let mock = MockHttpClient::new(
        StatusCode::INTERNAL_SERVER_ERROR,
        r#"{"error": {"message": "boom"}}"#,
    );
    mock.push_response(StatusCode::OK, &openai_completion("from p2"));
    let (state, server) = gateway(mock.clone()).await;
    seed_pool(
        &state,
        PoolTag::Tool,
        &[
            ("p1", "https://p1.example/v1", WireFormat::OpenAi, &[("m1", 1)]),
            ("p2", "https://p2.example/v1", WireFormat::OpenAi, &[("m2", 1)]),
        ],
    )
    .await;

    let response = server
        .post("/v1/chat/completions")
        .add_header("authorization", "Bearer anything")
        .json(&json!({
            "model": "haiku",
            "messages": [{"role": "user", "content": "hi"}]
        }))
        .await;

    assert_eq!(response.status_code(), 200);
    let body: serde_json::Value = response.json();
    assert_eq!(body["choices"][0]["message"]["content"], "from p2");

    let requests = mock.get_requests();
    assert_eq!(requests.len(), 2);
    assert!(requests[0].uri.contains("p1.example"));
    assert!(requests[1].uri.contains("p2.example"));

    // p1's endpoint is cooling, p2's is not.
    let endpoints = state.store.list_endpoints(None, None).await.unwrap();
    let now = chrono::Utc::now();
    assert!(state.health.get(endpoints[0].id).is_cooling(now));
    assert!(!state.health.get(endpoints[1].id).is_cooling(now));

    // Both attempts land in the log, oldest first once reversed.
    tokio::time::sleep(tokio::time::Duration::from_millis(150)).await;
    let (mut logs, total) = state
        .store
        .list_logs(&LogQuery { limit: 10, offset: 0, ..Default::default() })
        .await
        .unwrap();
    assert_eq!(total, 2);
    logs.reverse();
    assert_eq!(logs[0].requested_model, "haiku");
    assert!(!logs[0].success);
    assert_eq!(logs[0].status_code, Some(500));
    assert_eq!(logs[1].requested_model, "haiku");
    assert!(logs[1].success);
    assert_eq!(logs[1].provider_name, "p2");
}

#[tokio::test]
async fn six_dispatches_rotate_three_providers_twice() {
    let mock = MockHttpClient::new(StatusCode::OK, &openai_completion("ok"));
    let (state, server) = gateway(mock.clone()).await;
    seed_pool(
        &state,
        PoolTag::Normal,
        &[
            ("p1", "https://p1.example/v1", WireFormat::OpenAi, &[("m1", 1)]),
            ("p2", "https://p2.example/v1", WireFormat::OpenAi, &[("m2", 1)]),
            ("p3", "https://p3.example/v1", WireFormat::OpenAi, &[("m3", 1)]),
        ],
    )
    .await;

    for _ in 0..6 {
        let response = server
            .post("/v1/chat/completions")
            .add_header("authorization", "Bearer anything")
            .json(&json!({
                "model": "sonnet",
                "messages": [{"role": "user", "content": "hi"}]
            }))
            .await;
        assert_eq!(response.status_code(), 200);
    }

    let hosts: Vec<String> = mock
        .get_requests()
        .iter()
        .map(|r| r.uri.split('/').nth(2).unwrap().to_string())
        .collect();
    assert_eq!(
        hosts,
        [
            "p1.example",
            "p2.example",
            "p3.example",
            "p1.example",
            "p2.example",
            "p3.example"
        ]
    );
}

#[tokio::test]
async fn unknown_model_is_rejected_without_touching_upstream() {
    let mock = MockHttpClient::new(StatusCode::OK, "{}");
    let (state, server) = gateway(mock.clone()).await;
    seed_pool(
        &state,
        PoolTag::Normal,
        &[("acme", "https://llm.acme.dev/v1", WireFormat::OpenAi, &[("gpt-4o", 1)])],
    )
    .await;

    let response = server
        .post("/v1/chat/completions")
        .add_header("authorization", "Bearer anything")
        .json(&json!({
            "model": "gpt-4o",
            "messages": [{"role": "user", "content": "hi"}]
        }))
        .await;

    assert_eq!(response.status_code(), 400);
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"]["type"], "unknown_model");
    assert!(mock.get_requests().is_empty());
}

#[tokio::test]
async fn empty_pool_returns_503_without_touching_upstream() {
    let mock = MockHttpClient::new(StatusCode::OK, "{}");
    let (_state, server) = gateway(mock.clone()).await;

    let response = server
        .post("/v1/chat/completions")
        .add_header("authorization", "Bearer anything")
        .json(&json!({
            "model": "sonnet",
            "messages": [{"role": "user", "content": "hi"}]
        }))
        .await;

    assert_eq!(response.status_code(), 503);
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"]["type"], "pool_empty");
    assert!(mock.get_requests().is_empty());
}

#[tokio::test]
async fn missing_credentials_are_rejected() {
    let mock = MockHttpClient::new(StatusCode::OK, "{}");
    let (_state, server) = gateway(mock).await;

    let response = server
        .post("/v1/chat/completions")
        .json(&json!({"model": "sonnet", "messages": []}))
        .await;
    assert_eq!(response.status_code(), 401);
}

#[tokio::test]
async fn all_candidates_failing_produces_a_summary() {
    let mock = MockHttpClient::new(
        StatusCode::BAD_GATEWAY,
        r#"{"error": {"message": "upstream broken"}}"#,
    );
    let (state, server) = gateway(mock.clone()).await;
    seed_pool(
        &state,
        PoolTag::Tool,
        &[
            ("p1", "https://p1.example/v1", WireFormat::OpenAi, &[("m1", 1)]),
            ("p2", "https://p2.example/v1", WireFormat::OpenAi, &[("m2", 1)]),
        ],
    )
    .await;

    let response = server
        .post("/v1/chat/completions")
        .add_header("authorization", "Bearer anything")
        .json(&json!({
            "model": "haiku",
            "messages": [{"role": "user", "content": "hi"}]
        }))
        .await;

    assert_eq!(response.status_code(), 503);
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"]["type"], "all_candidates_failed");
    assert_eq!(body["error"]["pool"], "tool");
    assert_eq!(body["error"]["attempts"], 2);
    assert!(body["error"]["last_errors"]["p1"].is_string());
    assert!(body["error"]["last_errors"]["p2"].is_string());
}

#[tokio::test]
async fn all_cooling_pool_still_serves_via_degraded_fallback() {
    let mock = MockHttpClient::new(StatusCode::OK, &openai_completion("recovered"));
    let (state, server) = gateway(mock.clone()).await;
    seed_pool(
        &state,
        PoolTag::Tool,
        &[
            ("p1", "https://p1.example/v1", WireFormat::OpenAi, &[("m1", 1)]),
            ("p2", "https://p2.example/v1", WireFormat::OpenAi, &[("m2", 1)]),
        ],
    )
    .await;

    // Cool every endpoint by hand.
    let now = chrono::Utc::now();
    for endpoint in state.store.list_endpoints(None, None).await.unwrap() {
        state.health.mark_failure(
            endpoint.id,
            "HTTP 500",
            poolgate::errors::CooldownClass::Full,
            60,
            now,
        );
    }

    let response = server
        .post("/v1/chat/completions")
        .add_header("authorization", "Bearer anything")
        .json(&json!({
            "model": "haiku",
            "messages": [{"role": "user", "content": "hi"}]
        }))
        .await;

    assert_eq!(response.status_code(), 200);
    assert_eq!(mock.get_requests().len(), 1);

    // The successful endpoint's cooldown cleared.
    let endpoints = state.store.list_endpoints(None, None).await.unwrap();
    assert!(!state.health.get(endpoints[0].id).is_cooling(chrono::Utc::now()));
}

#[tokio::test]
async fn openai_streaming_client_bridges_anthropic_upstream() {
    let events = vec![
        "event: message_start\ndata: {\"type\":\"message_start\",\"message\":{\"id\":\"msg_1\",\"type\":\"message\",\"role\":\"assistant\",\"model\":\"claude-opus-4\",\"content\":[],\"stop_reason\":null,\"stop_sequence\":null,\"usage\":{\"input_tokens\":5,\"output_tokens\":0}}}\n\n".to_string(),
        "event: content_block_start\ndata: {\"type\":\"content_block_start\",\"index\":0,\"content_block\":{\"type\":\"text\",\"text\":\"\"}}\n\n".to_string(),
        "event: content_block_delta\ndata: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"str\"}}\n\n".to_string(),
        "event: content_block_delta\ndata: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"eamed\"}}\n\n".to_string(),
        "event: content_block_stop\ndata: {\"type\":\"content_block_stop\",\"index\":0}\n\n".to_string(),
        "event: message_delta\ndata: {\"type\":\"message_delta\",\"delta\":{\"stop_reason\":\"end_turn\",\"stop_sequence\":null},\"usage\":{\"output_tokens\":2}}\n\n".to_string(),
        "event: message_stop\ndata: {\"type\":\"message_stop\"}\n\n".to_string(),
    ];
    let mock = MockHttpClient::new_streaming(StatusCode::OK, events);
    let (state, server) = gateway(mock.clone()).await;
    seed_pool(
        &state,
        PoolTag::Advanced,
        &[(
            "claude",
            "https://api.anthropic.com",
            WireFormat::Anthropic,
            &[("claude-opus-4", 1)],
        )],
    )
    .await;

    let response = server
        .post("/v1/chat/completions")
        .add_header("authorization", "Bearer anything")
        .json(&json!({
            "model": "opus",
            "messages": [{"role": "user", "content": "hi"}],
            "stream": true
        }))
        .await;

    assert_eq!(response.status_code(), 200);
    assert_eq!(response.header("content-type"), "text/event-stream");
    assert_eq!(response.header("cache-control"), "no-cache");

    let text = response.text();
    assert!(text.ends_with("data: [DONE]\n\n"));

    // Reassemble the delta text; it must match the upstream deltas.
    let streamed: String = text
        .lines()
        .filter_map(|line| line.strip_prefix("data: "))
        .filter(|payload| *payload != "[DONE]")
        .filter_map(|payload| serde_json::from_str::<serde_json::Value>(payload).ok())
        .filter_map(|chunk| {
            chunk["choices"][0]["delta"]["content"]
                .as_str()
                .map(String::from)
        })
        .collect();
    assert_eq!(streamed, "streamed");

    // The upstream request went to the Anthropic messages endpoint with the
    // provider's auth headers.
    let requests = mock.get_requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].uri, "https://api.anthropic.com/v1/messages");
    assert!(requests[0].headers.iter().any(|(k, v)| k == "x-api-key" && v == "sk-claude"));
    let upstream_body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(upstream_body["model"], "claude-opus-4");
    assert_eq!(upstream_body["stream"], true);

    // Stream completion marks the endpoint successful.
    tokio::time::sleep(tokio::time::Duration::from_millis(150)).await;
    let endpoint_id = state.store.list_endpoints(None, None).await.unwrap()[0].id;
    assert_eq!(state.health.get(endpoint_id).success_requests, 1);
}

#[tokio::test]
async fn virtual_models_are_listed_openai_style() {
    let mock = MockHttpClient::new(StatusCode::OK, "{}");
    let (_state, server) = gateway(mock).await;

    let response = server.get("/v1/models").await;
    assert_eq!(response.status_code(), 200);
    let body: serde_json::Value = response.json();
    assert_eq!(body["object"], "list");
    let ids: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, ["haiku", "sonnet", "opus"]);
}

// ── Admin surface ─────────────────────────────────────────────────────

#[tokio::test]
async fn admin_requires_the_shared_password() {
    let mock = MockHttpClient::new(StatusCode::OK, "{}");
    let (_state, server) = gateway(mock).await;

    let response = server.get("/admin/providers").await;
    assert_eq!(response.status_code(), 401);

    let response = server
        .get("/admin/providers")
        .add_header("authorization", "Bearer wrong")
        .await;
    assert_eq!(response.status_code(), 401);

    let response = server
        .get("/admin/providers")
        .add_header("authorization", ADMIN_BEARER)
        .await;
    assert_eq!(response.status_code(), 200);
}

#[tokio::test]
async fn admin_provider_and_endpoint_lifecycle() {
    let mock = MockHttpClient::new(StatusCode::OK, "{}");
    let (state, server) = gateway(mock).await;

    // Create a provider.
    let response = server
        .post("/admin/providers")
        .add_header("authorization", ADMIN_BEARER)
        .json(&json!({
            "name": "acme",
            "base_url": "https://llm.acme.dev/v1/",
            "api_key": "sk-acme-123456",
            "api_format": "openai"
        }))
        .await;
    assert_eq!(response.status_code(), 201);
    let provider: serde_json::Value = response.json();
    let provider_id = provider["id"].as_i64().unwrap();
    // Keys are masked in responses.
    assert_eq!(provider["api_key_preview"], "sk-acme-***");
    assert_eq!(provider["base_url"], "https://llm.acme.dev/v1");

    // Duplicate names conflict.
    let response = server
        .post("/admin/providers")
        .add_header("authorization", ADMIN_BEARER)
        .json(&json!({
            "name": "acme",
            "base_url": "https://other.example",
            "api_key": "sk-2"
        }))
        .await;
    assert_eq!(response.status_code(), 409);

    // Create an endpoint; the registry sees it immediately.
    let response = server
        .post("/admin/endpoints")
        .add_header("authorization", ADMIN_BEARER)
        .json(&json!({
            "provider_id": provider_id,
            "model_id": "gpt-4o",
            "pool": "normal",
            "weight": 2
        }))
        .await;
    assert_eq!(response.status_code(), 201);
    let endpoint: serde_json::Value = response.json();
    let endpoint_id = endpoint["id"].as_i64().unwrap();
    assert_eq!(endpoint["weight"], 2);
    assert_eq!(state.registry.snapshot().groups(PoolTag::Normal).len(), 1);

    // Duplicate endpoint conflicts.
    let response = server
        .post("/admin/endpoints")
        .add_header("authorization", ADMIN_BEARER)
        .json(&json!({
            "provider_id": provider_id,
            "model_id": "gpt-4o",
            "pool": "normal"
        }))
        .await;
    assert_eq!(response.status_code(), 409);

    // Batch create dedups against existing placements.
    let response = server
        .post("/admin/endpoints/batch")
        .add_header("authorization", ADMIN_BEARER)
        .json(&json!({
            "provider_id": provider_id,
            "pool": "normal",
            "model_ids": ["gpt-4o", "gpt-4o-mini", "o4-mini"]
        }))
        .await;
    assert_eq!(response.status_code(), 200);
    let body: serde_json::Value = response.json();
    assert_eq!(body["created"], 2);
    assert_eq!(body["skipped"], 1);

    // Update: disable the endpoint; the next dispatch no longer sees it.
    let response = server
        .put(&format!("/admin/endpoints/{endpoint_id}"))
        .add_header("authorization", ADMIN_BEARER)
        .json(&json!({"enabled": false, "min_interval_seconds": 5}))
        .await;
    assert_eq!(response.status_code(), 200);
    let body: serde_json::Value = response.json();
    assert_eq!(body["enabled"], false);
    assert_eq!(body["min_interval_seconds"], 5);

    // Delete the provider; endpoints go with it.
    let response = server
        .delete(&format!("/admin/providers/{provider_id}"))
        .add_header("authorization", ADMIN_BEARER)
        .await;
    assert_eq!(response.status_code(), 204);
    assert!(state.store.list_endpoints(None, None).await.unwrap().is_empty());
    assert!(state.registry.snapshot().groups(PoolTag::Normal).is_empty());
}

#[tokio::test]
async fn admin_pool_config_updates_apply_to_subsequent_dispatches() {
    let mock = MockHttpClient::new(StatusCode::OK, "{}");
    let (state, server) = gateway(mock).await;

    let response = server
        .get("/admin/pools")
        .add_header("authorization", ADMIN_BEARER)
        .await;
    assert_eq!(response.status_code(), 200);
    let pools: serde_json::Value = response.json();
    assert_eq!(pools.as_array().unwrap().len(), 3);
    assert_eq!(pools[0]["cooldown_seconds"], 60);

    let response = server
        .put("/admin/pools/normal")
        .add_header("authorization", ADMIN_BEARER)
        .json(&json!({"cooldown_seconds": 10, "timeout_seconds": 30, "max_retries": 2}))
        .await;
    assert_eq!(response.status_code(), 200);

    let snapshot = state.registry.snapshot();
    let config = snapshot.pool_config(PoolTag::Normal);
    assert_eq!(config.cooldown_seconds, 10);
    assert_eq!(config.timeout_seconds, 30);
    assert_eq!(config.max_retries, 2);

    let response = server
        .put("/admin/pools/premium")
        .add_header("authorization", ADMIN_BEARER)
        .json(&json!({"cooldown_seconds": 1}))
        .await;
    assert_eq!(response.status_code(), 404);
}

#[tokio::test]
async fn admin_fetch_models_probes_the_upstream_catalogue() {
    let mock = MockHttpClient::new(
        StatusCode::OK,
        r#"{"data": [{"id": "gpt-4o"}, {"id": "gpt-4o-mini"}]}"#,
    );
    let (state, server) = gateway(mock.clone()).await;
    seed_pool(
        &state,
        PoolTag::Normal,
        &[("acme", "https://llm.acme.dev/v1", WireFormat::OpenAi, &[("gpt-4o", 1)])],
    )
    .await;
    let provider_id = state.store.list_providers().await.unwrap()[0].id;

    let response = server
        .post(&format!("/admin/providers/{provider_id}/fetch-models"))
        .add_header("authorization", ADMIN_BEARER)
        .await;
    assert_eq!(response.status_code(), 200);
    let body: serde_json::Value = response.json();
    assert_eq!(body["provider_name"], "acme");
    assert_eq!(
        body["models"],
        json!(["gpt-4o", "gpt-4o-mini"])
    );

    let requests = mock.get_requests();
    assert_eq!(requests[0].method, "GET");
    assert_eq!(requests[0].uri, "https://llm.acme.dev/v1/models");
}

#[tokio::test]
async fn admin_stats_and_log_paging() {
    let mock = MockHttpClient::new(StatusCode::OK, &openai_completion("ok"));
    let (state, server) = gateway(mock).await;
    seed_pool(
        &state,
        PoolTag::Normal,
        &[("acme", "https://llm.acme.dev/v1", WireFormat::OpenAi, &[("gpt-4o", 1)])],
    )
    .await;

    for _ in 0..3 {
        let response = server
            .post("/v1/chat/completions")
            .add_header("authorization", "Bearer anything")
            .json(&json!({
                "model": "sonnet",
                "messages": [{"role": "user", "content": "hi"}]
            }))
            .await;
        assert_eq!(response.status_code(), 200);
    }
    tokio::time::sleep(tokio::time::Duration::from_millis(150)).await;

    let response = server
        .get("/admin/stats")
        .add_header("authorization", ADMIN_BEARER)
        .await;
    assert_eq!(response.status_code(), 200);
    let stats: serde_json::Value = response.json();
    assert_eq!(stats["total_providers"], 1);
    assert_eq!(stats["total_endpoints"], 1);
    assert_eq!(stats["total_requests"], 3);
    assert_eq!(stats["success_requests"], 3);
    assert_eq!(stats["success_rate"], 100.0);
    assert_eq!(stats["pool_stats"]["normal"]["total_requests"], 3);

    let response = server
        .get("/admin/logs?limit=2&offset=0&pool=normal&success=true")
        .add_header("authorization", ADMIN_BEARER)
        .await;
    assert_eq!(response.status_code(), 200);
    let body: serde_json::Value = response.json();
    assert_eq!(body["total"], 3);
    assert_eq!(body["logs"].as_array().unwrap().len(), 2);
    // UTC timestamps carry a trailing Z.
    assert!(body["logs"][0]["created_at"].as_str().unwrap().ends_with('Z'));

    let response = server
        .delete("/admin/logs")
        .add_header("authorization", ADMIN_BEARER)
        .await;
    assert_eq!(response.status_code(), 200);
    let body: serde_json::Value = response.json();
    assert_eq!(body["deleted"], 3);
}

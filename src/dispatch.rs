//! The per-request dispatch pipeline.
//!
//! Resolve the virtual model to a pool, walk the selector's candidate
//! sequence, translate the request to each candidate's wire format, POST
//! upstream with the pool timeout applied up to the first byte, and fail over
//! on any attempt error. Every attempt lands in the log sink; endpoint health
//! is updated synchronously and persisted off the hot path.

use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use axum::Json;
use axum::body::{Body, Bytes};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use futures_util::Stream;
use serde_json::json;
use tokio::sync::oneshot;
use tokio::time::timeout;
use tracing::{debug, error, warn};

use crate::AppState;
use crate::client::HttpClient;
use crate::errors::GatewayError;
use crate::health::HealthTracker;
use crate::pool::{PoolTag, WireFormat};
use crate::selector::Candidate;
use crate::store::{NewLogEntry, Store};
use crate::stream::{SseFrameStream, StreamTranslator};
use crate::translate::{ClientRequest, TokenCounts, upstream_request_body, translate_response};
use crate::wire::anthropic::ANTHROPIC_VERSION;

/// Upstream error bodies are truncated to this many characters in logs and
/// cooldown records.
const ERROR_BODY_LIMIT: usize = 200;

/// Cap when buffering upstream bodies.
const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Canonical chat endpoint for a provider base URL.
pub fn upstream_url(base_url: &str, format: WireFormat) -> String {
    let base = base_url.trim_end_matches('/');
    match format {
        WireFormat::OpenAi => format!("{base}/chat/completions"),
        // Do not double a /v1 the operator already included.
        WireFormat::Anthropic => {
            if base.ends_with("/v1") {
                format!("{base}/messages")
            } else {
                format!("{base}/v1/messages")
            }
        }
    }
}

/// Model catalogue endpoint for a provider base URL.
pub fn models_url(base_url: &str, format: WireFormat) -> String {
    let base = base_url.trim_end_matches('/');
    match format {
        WireFormat::OpenAi => format!("{base}/models"),
        WireFormat::Anthropic => {
            if base.ends_with("/v1") {
                format!("{base}/models")
            } else {
                format!("{base}/v1/models")
            }
        }
    }
}

/// Entry point used by both client-facing handlers.
pub async fn dispatch<T: HttpClient>(
    state: &AppState<T>,
    client_format: WireFormat,
    body: Bytes,
) -> Result<Response, GatewayError> {
    let request = match ClientRequest::parse(client_format, &body) {
        Ok(request) => request,
        Err(e) => {
            return Ok((
                StatusCode::BAD_REQUEST,
                Json(json!({"error": {"message": format!("invalid JSON body: {e}"),
                            "type": "invalid_request_error"}})),
            )
                .into_response());
        }
    };

    let snapshot = state.registry.snapshot();
    let requested_model = request.model().to_string();
    let pool = snapshot
        .resolve_virtual(&requested_model)
        .ok_or_else(|| GatewayError::UnknownModel(requested_model.clone()))?;
    let pool_config = snapshot.pool_config(pool).clone();

    let candidates = state
        .selector
        .candidates(&snapshot, &state.health, pool, Utc::now());
    if candidates.is_empty() {
        return Err(GatewayError::PoolEmpty(pool));
    }

    let budget = if pool_config.max_retries > 0 {
        candidates.len().min(pool_config.max_retries as usize)
    } else {
        candidates.len()
    };
    let stream = request.stream();
    debug!(
        pool = pool.as_str(),
        model = %requested_model,
        candidates = candidates.len(),
        budget,
        stream,
        "dispatching"
    );

    let mut last_errors: Vec<(String, String)> = Vec::new();
    let mut attempts = 0usize;

    for candidate in candidates.into_iter().take(budget) {
        attempts += 1;

        // A request that cannot be expressed in the target format fails the
        // whole dispatch without consuming the candidate.
        let upstream_body =
            upstream_request_body(&request, candidate.api_format, &candidate.model_id)?;

        let started = Instant::now();
        let stream_context = StreamContext {
            client_format,
            pool,
            requested_model: requested_model.clone(),
            cooldown_seconds: pool_config.cooldown_seconds,
        };
        let outcome = attempt(
            state,
            &candidate,
            upstream_body,
            stream,
            pool_config.timeout_seconds as u64,
            stream_context,
        )
        .await;

        match outcome {
            Ok(AttemptOutcome::Buffered(upstream_bytes)) => {
                let (value, counts) = match translate_response(
                    &upstream_bytes,
                    candidate.api_format,
                    client_format,
                    &requested_model,
                ) {
                    Ok(translated) => translated,
                    Err(e) => {
                        record_failure(state, pool, &requested_model, &candidate, &e, started);
                        last_errors.retain(|(name, _)| name != &candidate.provider_name);
                        last_errors.push((candidate.provider_name.clone(), e.to_string()));
                        continue;
                    }
                };

                let latency_ms = started.elapsed().as_millis() as i64;
                let row = state
                    .health
                    .mark_success(candidate.endpoint_id, latency_ms, Utc::now());
                persist_health(&state.store, candidate.endpoint_id, candidate.provider_id, true, row);
                state.log_sink.record(NewLogEntry {
                    pool,
                    requested_model: requested_model.clone(),
                    actual_model: candidate.model_id.clone(),
                    provider_name: candidate.provider_name.clone(),
                    success: true,
                    status_code: Some(200),
                    error_message: None,
                    latency_ms,
                    input_tokens: counts.input,
                    output_tokens: counts.output,
                });
                return Ok(Json(value).into_response());
            }
            Ok(AttemptOutcome::Streaming(response)) => {
                return Ok(response);
            }
            Err(e) => {
                record_failure(state, pool, &requested_model, &candidate, &e, started);
                warn!(
                    provider = %candidate.provider_name,
                    endpoint = candidate.endpoint_id,
                    error = %e,
                    "attempt failed, trying next candidate"
                );
                last_errors.retain(|(name, _)| name != &candidate.provider_name);
                last_errors.push((candidate.provider_name.clone(), e.to_string()));
            }
        }
    }

    // Aggregate failure entry for the dispatch as a whole.
    let summary = last_errors
        .iter()
        .map(|(provider, err)| format!("{provider}: {err}"))
        .collect::<Vec<_>>()
        .join("; ");
    state.log_sink.record(NewLogEntry {
        pool,
        requested_model: requested_model.clone(),
        actual_model: String::new(),
        provider_name: "(all)".into(),
        success: false,
        status_code: None,
        error_message: Some(summary),
        latency_ms: 0,
        input_tokens: None,
        output_tokens: None,
    });

    Err(GatewayError::AllCandidatesFailed {
        pool,
        attempts,
        last_errors,
    })
}

enum AttemptOutcome {
    /// Non-streaming upstream body, fully read.
    Buffered(Bytes),
    /// Committed streaming response, already carrying the first event.
    Streaming(Response),
}

/// Request-level context the streaming path needs once it commits.
#[derive(Debug, Clone)]
struct StreamContext {
    client_format: WireFormat,
    pool: PoolTag,
    requested_model: String,
    cooldown_seconds: i64,
}

async fn attempt<T: HttpClient>(
    state: &AppState<T>,
    candidate: &Candidate,
    body: Vec<u8>,
    stream: bool,
    timeout_seconds: u64,
    stream_context: StreamContext,
) -> Result<AttemptOutcome, GatewayError> {
    let url = upstream_url(&candidate.base_url, candidate.api_format);
    let request = build_upstream_request(&url, candidate, body)?;
    let deadline = Duration::from_secs(timeout_seconds);

    if !stream {
        // Headers and body both count against the pool timeout.
        let result = timeout(deadline, async {
            let response = state
                .http_client
                .request(request)
                .await
                .map_err(|e| GatewayError::UpstreamTransport(e.to_string()))?;
            let status = response.status().as_u16();
            let bytes = axum::body::to_bytes(response.into_body(), MAX_BODY_BYTES)
                .await
                .map_err(|e| GatewayError::UpstreamTransport(e.to_string()))?;
            Ok::<_, GatewayError>((status, bytes))
        })
        .await;

        let (status, bytes) = match result {
            Err(_) => return Err(GatewayError::UpstreamTimeout(timeout_seconds)),
            Ok(Err(e)) => return Err(e),
            Ok(Ok(pair)) => pair,
        };
        if !(200..300).contains(&status) {
            return Err(GatewayError::UpstreamHttp {
                status,
                body: truncate(&String::from_utf8_lossy(&bytes)),
            });
        }
        return Ok(AttemptOutcome::Buffered(bytes));
    }

    // Streaming: the timeout governs time to the first event only.
    let response = match timeout(deadline, state.http_client.request(request)).await {
        Err(_) => return Err(GatewayError::UpstreamTimeout(timeout_seconds)),
        Ok(Err(e)) => return Err(GatewayError::UpstreamTransport(e.to_string())),
        Ok(Ok(response)) => response,
    };
    let status = response.status().as_u16();
    if !(200..300).contains(&status) {
        let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024)
            .await
            .unwrap_or_default();
        return Err(GatewayError::UpstreamHttp {
            status,
            body: truncate(&String::from_utf8_lossy(&bytes)),
        });
    }

    let mut frames = SseFrameStream::new(response.into_body().into_data_stream());
    let first = match timeout(deadline, futures_util::StreamExt::next(&mut frames)).await {
        Err(_) => return Err(GatewayError::UpstreamTimeout(timeout_seconds)),
        Ok(None) => return Err(GatewayError::UpstreamMalformed("empty event stream".into())),
        Ok(Some(Err(e))) => return Err(GatewayError::UpstreamMalformed(e.to_string())),
        Ok(Some(Ok(frame))) => frame,
    };

    Ok(AttemptOutcome::Streaming(commit_stream(
        state,
        candidate,
        frames,
        first,
        stream_context,
    )))
}

/// Builds the streaming client response around the already-received first
/// upstream event. From here on no retry is possible; the settlement task
/// updates health and logging when the relay finishes, errors, or is dropped
/// by a disconnecting client.
fn commit_stream<T: HttpClient, S>(
    state: &AppState<T>,
    candidate: &Candidate,
    frames: SseFrameStream<S>,
    first_frame: Bytes,
    context: StreamContext,
) -> Response
where
    S: Stream<Item = Result<Bytes, axum::Error>> + Unpin + Send + 'static,
{
    let mut translator = StreamTranslator::new(
        candidate.api_format,
        context.client_format,
        &context.requested_model,
    );
    let pending: VecDeque<Bytes> = translator.on_frame(&first_frame).into();

    let (outcome_tx, outcome_rx) = oneshot::channel::<StreamOutcome>();

    // Settlement task, fed by the relay when the stream ends (poly-workshop
    // shadow-stream pattern).
    let health = state.health.clone();
    let store = state.store.clone();
    let log_sink = state.log_sink.clone();
    let candidate_for_log = candidate.clone();
    tokio::spawn(async move {
        let outcome = outcome_rx.await.unwrap_or(StreamOutcome::Disconnected);
        settle_stream(
            health.as_ref(),
            &store,
            &log_sink,
            context.pool,
            context.requested_model,
            context.cooldown_seconds,
            candidate_for_log,
            outcome,
        );
    });

    let relay = RelayStream {
        frames,
        translator,
        pending,
        outcome: Some(outcome_tx),
        started: Instant::now(),
        finished: false,
    };

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::CONNECTION, "keep-alive")
        .body(Body::from_stream(relay))
        .expect("static response parts")
}

#[derive(Debug)]
enum StreamOutcome {
    Completed {
        latency_ms: i64,
        counts: TokenCounts,
    },
    Failed {
        error: String,
    },
    Disconnected,
}

#[allow(clippy::too_many_arguments)]
fn settle_stream(
    health: &HealthTracker,
    store: &Store,
    log_sink: &crate::logsink::LogSink,
    pool: PoolTag,
    requested_model: String,
    cooldown_seconds: i64,
    candidate: Candidate,
    outcome: StreamOutcome,
) {
    match outcome {
        StreamOutcome::Completed { latency_ms, counts } => {
            let row = health.mark_success(candidate.endpoint_id, latency_ms, Utc::now());
            persist_health(store, candidate.endpoint_id, candidate.provider_id, true, row);
            log_sink.record(NewLogEntry {
                pool,
                requested_model,
                actual_model: candidate.model_id,
                provider_name: candidate.provider_name,
                success: true,
                status_code: Some(200),
                error_message: None,
                latency_ms,
                input_tokens: counts.input,
                output_tokens: counts.output,
            });
        }
        StreamOutcome::Failed { error } => {
            let row = health.mark_failure(
                candidate.endpoint_id,
                &error,
                crate::errors::CooldownClass::Full,
                cooldown_seconds,
                Utc::now(),
            );
            persist_health(store, candidate.endpoint_id, candidate.provider_id, false, row);
            log_sink.record(NewLogEntry {
                pool,
                requested_model,
                actual_model: candidate.model_id,
                provider_name: candidate.provider_name,
                success: false,
                status_code: None,
                error_message: Some(format!("stream aborted: {error}")),
                latency_ms: 0,
                input_tokens: None,
                output_tokens: None,
            });
        }
        // The client went away; the upstream was not at fault, so the
        // endpoint is not cooled.
        StreamOutcome::Disconnected => {
            log_sink.record(NewLogEntry {
                pool,
                requested_model,
                actual_model: candidate.model_id,
                provider_name: candidate.provider_name,
                success: false,
                status_code: Some(499),
                error_message: Some("client disconnected".into()),
                latency_ms: 0,
                input_tokens: None,
                output_tokens: None,
            });
        }
    }
}

/// Pipes translated frames to the client. Dropping the relay (client
/// disconnect) drops the upstream body, cancelling the connection, and
/// reports `Disconnected` to the settlement task.
struct RelayStream<S> {
    frames: SseFrameStream<S>,
    translator: StreamTranslator,
    pending: VecDeque<Bytes>,
    outcome: Option<oneshot::Sender<StreamOutcome>>,
    started: Instant,
    finished: bool,
}

impl<S> Stream for RelayStream<S>
where
    S: Stream<Item = Result<Bytes, axum::Error>> + Unpin,
{
    type Item = Result<Bytes, std::io::Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        loop {
            if let Some(frame) = this.pending.pop_front() {
                return Poll::Ready(Some(Ok(frame)));
            }
            if this.finished {
                return Poll::Ready(None);
            }
            match Pin::new(&mut this.frames).poll_next(cx) {
                Poll::Ready(Some(Ok(frame))) => {
                    this.pending.extend(this.translator.on_frame(&frame));
                }
                Poll::Ready(Some(Err(e))) => {
                    this.finished = true;
                    if let Some(tx) = this.outcome.take() {
                        let _ = tx.send(StreamOutcome::Failed {
                            error: e.to_string(),
                        });
                    }
                    return Poll::Ready(Some(Err(std::io::Error::other(e))));
                }
                Poll::Ready(None) => {
                    this.finished = true;
                    this.pending.extend(this.translator.finish());
                    if let Some(tx) = this.outcome.take() {
                        let _ = tx.send(StreamOutcome::Completed {
                            latency_ms: this.started.elapsed().as_millis() as i64,
                            counts: this.translator.token_counts(),
                        });
                    }
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

impl<S> Drop for RelayStream<S> {
    fn drop(&mut self) {
        if let Some(tx) = self.outcome.take() {
            let _ = tx.send(StreamOutcome::Disconnected);
        }
    }
}

fn build_upstream_request(
    url: &str,
    candidate: &Candidate,
    body: Vec<u8>,
) -> Result<axum::extract::Request, GatewayError> {
    let parsed: url::Url = url
        .parse()
        .map_err(|e| GatewayError::UpstreamTransport(format!("invalid upstream URL: {e}")))?;
    let host = parsed
        .host_str()
        .map(|host| match parsed.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        })
        .unwrap_or_default();

    let mut builder = axum::extract::Request::builder()
        .method("POST")
        .uri(url)
        .header(header::HOST, host)
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::CONTENT_LENGTH, body.len());

    builder = match candidate.api_format {
        WireFormat::OpenAi => builder.header(
            header::AUTHORIZATION,
            format!("Bearer {}", candidate.api_key),
        ),
        WireFormat::Anthropic => builder
            .header("x-api-key", candidate.api_key.clone())
            .header("anthropic-version", ANTHROPIC_VERSION),
    };

    builder
        .body(Body::from(body))
        .map_err(|e| GatewayError::UpstreamTransport(e.to_string()))
}

fn record_failure<T: HttpClient>(
    state: &AppState<T>,
    pool: PoolTag,
    requested_model: &str,
    candidate: &Candidate,
    error: &GatewayError,
    started: Instant,
) {
    let snapshot = state.registry.snapshot();
    let cooldown_seconds = snapshot.pool_config(pool).cooldown_seconds;
    let row = state.health.mark_failure(
        candidate.endpoint_id,
        &error.to_string(),
        error.cooldown_class(),
        cooldown_seconds,
        Utc::now(),
    );
    persist_health(&state.store, candidate.endpoint_id, candidate.provider_id, false, row);
    state.log_sink.record(NewLogEntry {
        pool,
        requested_model: requested_model.to_string(),
        actual_model: candidate.model_id.clone(),
        provider_name: candidate.provider_name.clone(),
        success: false,
        status_code: error.upstream_status().map(i64::from),
        error_message: Some(error.to_string()),
        latency_ms: started.elapsed().as_millis() as i64,
        input_tokens: None,
        output_tokens: None,
    });
}

fn persist_health(
    store: &Store,
    endpoint_id: i64,
    provider_id: i64,
    success: bool,
    row: crate::store::EndpointHealthRow,
) {
    let store = store.clone();
    tokio::spawn(async move {
        if let Err(e) = store.save_endpoint_health(endpoint_id, &row).await {
            error!("failed to persist endpoint health: {e}");
        }
        if let Err(e) = store.bump_provider_counters(provider_id, success).await {
            error!("failed to bump provider counters: {e}");
        }
    });
}

fn truncate(text: &str) -> String {
    if text.chars().count() > ERROR_BODY_LIMIT {
        text.chars().take(ERROR_BODY_LIMIT).collect()
    } else {
        text.to_string()
    }
}

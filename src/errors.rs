//! Gateway error taxonomy and HTTP mapping.
//!
//! Dispatch failures fall into two groups: request-level errors that end the
//! request immediately (unknown model, empty pool, translation failures) and
//! attempt-level errors that cool the endpoint and move on to the next
//! candidate.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::pool::PoolTag;

/// Errors surfaced by the dispatch pipeline and the admin surface.
#[derive(Debug, Clone, thiserror::Error)]
pub enum GatewayError {
    #[error("unknown model \"{0}\"")]
    UnknownModel(String),

    #[error("pool {0:?} has no dispatchable endpoints")]
    PoolEmpty(PoolTag),

    #[error("all {attempts} candidate(s) in pool {pool:?} failed")]
    AllCandidatesFailed {
        pool: PoolTag,
        attempts: usize,
        /// Last error message per provider name, for the response body.
        last_errors: Vec<(String, String)>,
    },

    #[error("upstream transport error: {0}")]
    UpstreamTransport(String),

    #[error("upstream timed out after {0}s before first byte")]
    UpstreamTimeout(u64),

    #[error("upstream returned HTTP {status}: {body}")]
    UpstreamHttp { status: u16, body: String },

    #[error("upstream response could not be parsed: {0}")]
    UpstreamMalformed(String),

    #[error("request cannot be expressed in the target format: {0}")]
    Translation(String),

    #[error("client disconnected")]
    ClientDisconnect,
}

/// How long a failed endpoint should be kept out of primary selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CooldownClass {
    /// The configured pool cooldown.
    Full,
    /// `min(pool cooldown, 5s)` — client-side errors that should not poison
    /// a pool for the full interval.
    Short,
    /// No state change (the upstream was never at fault).
    None,
}

impl GatewayError {
    /// Whether the dispatcher may move on to the next candidate.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            GatewayError::UpstreamTransport(_)
                | GatewayError::UpstreamTimeout(_)
                | GatewayError::UpstreamHttp { .. }
                | GatewayError::UpstreamMalformed(_)
        )
    }

    /// Cooldown class for a failed attempt. Full cooldown for transport,
    /// timeout, 401/403/408/425/429 and 5xx; short for other 4xx, malformed
    /// bodies, and explicit insufficient-credit responses.
    pub fn cooldown_class(&self) -> CooldownClass {
        match self {
            GatewayError::UpstreamTransport(_) | GatewayError::UpstreamTimeout(_) => {
                CooldownClass::Full
            }
            GatewayError::UpstreamHttp { status, body } => {
                if insufficient_credit(body) {
                    CooldownClass::Short
                } else if matches!(*status, 401 | 403 | 408 | 425 | 429) || *status >= 500 {
                    CooldownClass::Full
                } else if (400..500).contains(status) {
                    CooldownClass::Short
                } else {
                    CooldownClass::Full
                }
            }
            GatewayError::UpstreamMalformed(_) => CooldownClass::Short,
            _ => CooldownClass::None,
        }
    }

    /// HTTP status logged for this attempt, if one applies.
    pub fn upstream_status(&self) -> Option<u16> {
        match self {
            GatewayError::UpstreamHttp { status, .. } => Some(*status),
            GatewayError::ClientDisconnect => Some(499),
            _ => None,
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::UnknownModel(_) | GatewayError::Translation(_) => {
                StatusCode::BAD_REQUEST
            }
            GatewayError::PoolEmpty(_) | GatewayError::AllCandidatesFailed { .. } => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            GatewayError::UpstreamTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::ClientDisconnect => StatusCode::from_u16(499).unwrap(),
            _ => StatusCode::BAD_GATEWAY,
        }
    }

    fn error_type(&self) -> &'static str {
        match self {
            GatewayError::UnknownModel(_) => "unknown_model",
            GatewayError::PoolEmpty(_) => "pool_empty",
            GatewayError::AllCandidatesFailed { .. } => "all_candidates_failed",
            GatewayError::UpstreamTransport(_) => "upstream_transport",
            GatewayError::UpstreamTimeout(_) => "upstream_timeout",
            GatewayError::UpstreamHttp { .. } => "upstream_http",
            GatewayError::UpstreamMalformed(_) => "upstream_malformed",
            GatewayError::Translation(_) => "translation_error",
            GatewayError::ClientDisconnect => "client_disconnect",
        }
    }
}

/// Markers providers use for exhausted balances. Matched case-insensitively
/// against the upstream error body.
fn insufficient_credit(body: &str) -> bool {
    let lower = body.to_ascii_lowercase();
    lower.contains("insufficient credit")
        || lower.contains("insufficient_quota")
        || lower.contains("insufficient balance")
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    message: String,
    r#type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pool: Option<PoolTag>,
    #[serde(skip_serializing_if = "Option::is_none")]
    attempts: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_errors: Option<serde_json::Value>,
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let (pool, attempts, last_errors) = match &self {
            GatewayError::AllCandidatesFailed {
                pool,
                attempts,
                last_errors,
            } => {
                let map: serde_json::Map<String, serde_json::Value> = last_errors
                    .iter()
                    .map(|(provider, err)| (provider.clone(), err.clone().into()))
                    .collect();
                (Some(*pool), Some(*attempts), Some(map.into()))
            }
            GatewayError::PoolEmpty(pool) => (Some(*pool), None, None),
            _ => (None, None, None),
        };

        let body = ErrorBody {
            message: self.to_string(),
            r#type: self.error_type().to_string(),
            pool,
            attempts,
            last_errors,
        };
        (
            self.status_code(),
            Json(serde_json::json!({ "error": body })),
        )
            .into_response()
    }
}

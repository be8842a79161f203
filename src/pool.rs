//! Domain model: pools, wire formats, providers, endpoints, pool configs.
//!
//! These are the rows the store persists and the registry serves. Admin-facing
//! `*Info` structs are derived views that never expose a full API key.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// The three pools backing the three virtual models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum PoolTag {
    Tool,
    Normal,
    Advanced,
}

impl PoolTag {
    pub const ALL: [PoolTag; 3] = [PoolTag::Tool, PoolTag::Normal, PoolTag::Advanced];

    pub fn as_str(&self) -> &'static str {
        match self {
            PoolTag::Tool => "tool",
            PoolTag::Normal => "normal",
            PoolTag::Advanced => "advanced",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "tool" => Some(PoolTag::Tool),
            "normal" => Some(PoolTag::Normal),
            "advanced" => Some(PoolTag::Advanced),
            _ => None,
        }
    }
}

/// On-the-wire request/response shape spoken by a provider or a client path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum WireFormat {
    OpenAi,
    Anthropic,
}

impl WireFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            WireFormat::OpenAi => "openai",
            WireFormat::Anthropic => "anthropic",
        }
    }
}

/// An upstream provider: one base URL + key speaking one wire format.
#[derive(Debug, Clone, FromRow)]
pub struct Provider {
    pub id: i64,
    pub name: String,
    pub base_url: String,
    pub api_key: String,
    pub api_format: WireFormat,
    pub enabled: bool,
    pub total_requests: i64,
    pub success_requests: i64,
    pub error_requests: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Provider {
    /// Masked key for admin responses.
    pub fn api_key_preview(&self) -> String {
        if self.api_key.len() > 8 {
            format!("{}***", &self.api_key[..8])
        } else {
            "***".to_string()
        }
    }
}

/// A `(provider, upstream model)` placement into exactly one pool.
///
/// `priority` is persisted and editable but not consulted by selection.
#[derive(Debug, Clone, FromRow)]
pub struct Endpoint {
    pub id: i64,
    pub provider_id: i64,
    pub model_id: String,
    pub pool: PoolTag,
    pub enabled: bool,
    pub weight: i64,
    pub min_interval_seconds: i64,
    pub priority: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Per-pool routing configuration. `max_retries == 0` means the dispatcher
/// exhausts the candidate list.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct PoolConfig {
    pub pool: PoolTag,
    pub virtual_model: String,
    pub cooldown_seconds: i64,
    pub timeout_seconds: i64,
    pub max_retries: i64,
}

impl PoolConfig {
    pub fn defaults(pool: PoolTag, virtual_model: &str, cooldown_seconds: i64) -> Self {
        Self {
            pool,
            virtual_model: virtual_model.to_string(),
            cooldown_seconds,
            timeout_seconds: 60,
            max_retries: 0,
        }
    }
}

/// Admin view of a provider.
#[derive(Debug, Serialize)]
pub struct ProviderInfo {
    pub id: i64,
    pub name: String,
    pub base_url: String,
    pub api_key_preview: String,
    pub api_format: WireFormat,
    pub enabled: bool,
    pub total_requests: i64,
    pub success_requests: i64,
    pub error_requests: i64,
    pub endpoint_count: usize,
    pub healthy_endpoint_count: usize,
    pub created_at: DateTime<Utc>,
}

/// Admin view of an endpoint, merged with its live health record.
#[derive(Debug, Serialize)]
pub struct EndpointInfo {
    pub id: i64,
    pub provider_id: i64,
    pub provider_name: String,
    pub model_id: String,
    pub pool: PoolTag,
    pub enabled: bool,
    pub weight: i64,
    pub min_interval_seconds: i64,
    pub priority: i64,
    pub is_cooling: bool,
    pub cooldown_until: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub total_requests: u64,
    pub success_requests: u64,
    pub error_requests: u64,
    pub avg_latency_ms: f64,
    pub success_rate: f64,
}

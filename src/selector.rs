//! Candidate selection: round-robin across providers, weighted random across
//! one provider's endpoints, with a degraded fallback pass.
//!
//! The per-pool cursor is the only cross-request state; it advances once per
//! dispatch regardless of outcome. The weighted pick draws from the
//! thread-local system RNG, so two concurrent dispatches are independent.

use std::sync::atomic::{AtomicU64, Ordering};

use bon::Builder;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rand::Rng;

use crate::health::HealthTracker;
use crate::pool::{Endpoint, PoolTag, Provider, WireFormat};
use crate::registry::RegistrySnapshot;

/// Everything the dispatcher needs to issue one attempt.
#[derive(Debug, Clone, Builder)]
pub struct Candidate {
    pub endpoint_id: i64,
    pub provider_id: i64,
    pub provider_name: String,
    pub base_url: String,
    pub api_key: String,
    pub api_format: WireFormat,
    pub model_id: String,
}

impl Candidate {
    fn from_parts(endpoint: &Endpoint, provider: &Provider) -> Self {
        Candidate {
            endpoint_id: endpoint.id,
            provider_id: provider.id,
            provider_name: provider.name.clone(),
            base_url: provider.base_url.clone(),
            api_key: provider.api_key.clone(),
            api_format: provider.api_format,
            model_id: endpoint.model_id.clone(),
        }
    }
}

#[derive(Debug, Default)]
pub struct Selector {
    cursors: DashMap<PoolTag, AtomicU64>,
}

impl Selector {
    pub fn new() -> Self {
        Self::default()
    }

    /// The ordered candidate sequence for one dispatch.
    ///
    /// Primary pass: providers in rotated order, one weighted pick per
    /// provider among its currently-available endpoints. If that yields
    /// nothing, the degraded fallback re-examines the pool ignoring cooldown
    /// and min-interval (but never the enabled flags) in stable order, so a
    /// transiently all-cooling pool still gets an attempt. No endpoint id is
    /// yielded twice.
    pub fn candidates(
        &self,
        snapshot: &RegistrySnapshot,
        health: &HealthTracker,
        pool: PoolTag,
        now: DateTime<Utc>,
    ) -> Vec<Candidate> {
        let groups = snapshot.groups(pool);
        if groups.is_empty() {
            return Vec::new();
        }

        let cursor = self
            .cursors
            .entry(pool)
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed) as usize;

        let total = groups.len();
        let mut out = Vec::new();

        for offset in 0..total {
            let group = &groups[(cursor + offset) % total];
            if !group.provider.enabled {
                continue;
            }
            let available: Vec<&Endpoint> = group
                .endpoints
                .iter()
                .filter(|e| health.is_available(e, &group.provider, now))
                .collect();
            if available.is_empty() {
                continue;
            }
            let index = weighted_index(
                &available.iter().map(|e| e.weight.max(1) as u64).collect::<Vec<_>>(),
                &mut rand::rng(),
            );
            out.push(Candidate::from_parts(available[index], &group.provider));
        }

        if out.is_empty() {
            for group in groups {
                if !group.provider.enabled {
                    continue;
                }
                for endpoint in &group.endpoints {
                    if endpoint.enabled {
                        out.push(Candidate::from_parts(endpoint, &group.provider));
                    }
                }
            }
        }

        out
    }
}

/// Cumulative-weight random pick. `weights` must be non-empty; every weight
/// is at least 1.
fn weighted_index<R: Rng>(weights: &[u64], rng: &mut R) -> usize {
    let total: u64 = weights.iter().sum();
    let roll = rng.random_range(0..total);

    let mut cumulative = 0;
    for (index, weight) in weights.iter().enumerate() {
        cumulative += weight;
        if roll < cumulative {
            return index;
        }
    }
    weights.len() - 1
}

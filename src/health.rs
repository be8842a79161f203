//! Per-endpoint mutable health: cooldowns, counters, rolling latency.
//!
//! Records live in a `DashMap` keyed by endpoint id so a dispatch outcome
//! touches exactly one entry and never takes a registry write. The tracker is
//! purely in-memory; callers persist the row snapshots it returns (the store
//! write-back is allowed to lag and to be lossy across crashes).

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

use crate::errors::CooldownClass;
use crate::pool::{Endpoint, Provider};
use crate::store::EndpointHealthRow;

/// Smoothing factor for the rolling latency mean, applied on successes only.
const LATENCY_ALPHA: f64 = 0.2;

/// Ceiling for the shortened cooldown applied to correctable client errors.
const SHORT_COOLDOWN_SECS: i64 = 5;

#[derive(Debug, Clone, Default)]
pub struct EndpointHealth {
    pub cooldown_until: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub total_requests: u64,
    pub success_requests: u64,
    pub error_requests: u64,
    pub avg_latency_ms: f64,
}

impl EndpointHealth {
    /// An endpoint is cooling while `cooldown_until` lies in the future; the
    /// field is never rewritten on expiry.
    pub fn is_cooling(&self, now: DateTime<Utc>) -> bool {
        self.cooldown_until.is_some_and(|until| until > now)
    }

    pub fn cooldown_remaining_secs(&self, now: DateTime<Utc>) -> i64 {
        self.cooldown_until
            .map(|until| (until - now).num_seconds().max(0))
            .unwrap_or(0)
    }

    fn to_row(&self, id: i64) -> EndpointHealthRow {
        EndpointHealthRow {
            id,
            cooldown_until: self.cooldown_until,
            last_error: self.last_error.clone(),
            last_used_at: self.last_used_at,
            total_requests: self.total_requests as i64,
            success_requests: self.success_requests as i64,
            error_requests: self.error_requests as i64,
            avg_latency_ms: self.avg_latency_ms,
        }
    }
}

#[derive(Debug, Default)]
pub struct HealthTracker {
    records: DashMap<i64, EndpointHealth>,
}

impl HealthTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds records from the persisted endpoint rows at startup.
    pub fn seed(&self, rows: Vec<EndpointHealthRow>) {
        for row in rows {
            self.records.insert(
                row.id,
                EndpointHealth {
                    cooldown_until: row.cooldown_until,
                    last_error: row.last_error,
                    last_used_at: row.last_used_at,
                    total_requests: row.total_requests.max(0) as u64,
                    success_requests: row.success_requests.max(0) as u64,
                    error_requests: row.error_requests.max(0) as u64,
                    avg_latency_ms: row.avg_latency_ms,
                },
            );
        }
    }

    /// Whether the endpoint may be dispatched to right now:
    /// enabled, provider enabled, cooldown expired, and past its soft
    /// min-interval. The min-interval check skips the endpoint without
    /// cooling it.
    pub fn is_available(
        &self,
        endpoint: &Endpoint,
        provider: &Provider,
        now: DateTime<Utc>,
    ) -> bool {
        if !endpoint.enabled || !provider.enabled {
            return false;
        }
        let Some(record) = self.records.get(&endpoint.id) else {
            return true;
        };
        if record.is_cooling(now) {
            return false;
        }
        if endpoint.min_interval_seconds > 0
            && let Some(last_used) = record.last_used_at
            && now - last_used < Duration::seconds(endpoint.min_interval_seconds)
        {
            return false;
        }
        true
    }

    /// Records a successful attempt: clears cooldown and last-error, bumps
    /// counters, folds the latency into the rolling mean.
    pub fn mark_success(&self, id: i64, latency_ms: i64, now: DateTime<Utc>) -> EndpointHealthRow {
        let mut record = self.records.entry(id).or_default();
        record.cooldown_until = None;
        record.last_error = None;
        record.total_requests += 1;
        record.success_requests += 1;
        record.avg_latency_ms = if record.success_requests == 1 {
            latency_ms as f64
        } else {
            record.avg_latency_ms * (1.0 - LATENCY_ALPHA) + latency_ms as f64 * LATENCY_ALPHA
        };
        record.last_used_at = Some(now);
        record.to_row(id)
    }

    /// Records a failed attempt and schedules the cooldown. A pool configured
    /// with `cooldown_seconds == 0` never cools.
    pub fn mark_failure(
        &self,
        id: i64,
        error: &str,
        class: CooldownClass,
        cooldown_seconds: i64,
        now: DateTime<Utc>,
    ) -> EndpointHealthRow {
        let mut record = self.records.entry(id).or_default();
        record.total_requests += 1;
        record.error_requests += 1;
        record.last_error = Some(error.to_string());
        record.last_used_at = Some(now);

        let secs = match class {
            CooldownClass::Full => cooldown_seconds,
            CooldownClass::Short => cooldown_seconds.min(SHORT_COOLDOWN_SECS),
            CooldownClass::None => 0,
        };
        if secs > 0 {
            record.cooldown_until = Some(now + Duration::seconds(secs));
        }
        record.to_row(id)
    }

    pub fn get(&self, id: i64) -> EndpointHealth {
        self.records.get(&id).map(|r| r.clone()).unwrap_or_default()
    }

    /// Drops records for endpoints that no longer exist.
    pub fn retain_ids(&self, ids: &std::collections::HashSet<i64>) {
        self.records.retain(|id, _| ids.contains(id));
    }
}

//! SQLite persistence for providers, endpoints, pool configs and logs.
//!
//! The store is the authoritative record; the registry and the health tracker
//! are in-memory views loaded from it. Health write-back happens off the
//! dispatch hot path and may lag; counters resume monotonically from the last
//! persisted value after a restart.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

use crate::pool::{Endpoint, PoolConfig, PoolTag, Provider, WireFormat};

#[derive(Debug, Clone)]
pub struct Store {
    db: SqlitePool,
}

/// Fields the admin API may change on a provider. `None` keeps the current
/// value.
#[derive(Debug, Default)]
pub struct ProviderPatch {
    pub name: Option<String>,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub api_format: Option<WireFormat>,
    pub enabled: Option<bool>,
}

/// Fields the admin API may change on an endpoint.
#[derive(Debug, Default)]
pub struct EndpointPatch {
    pub pool: Option<PoolTag>,
    pub enabled: Option<bool>,
    pub weight: Option<i64>,
    pub min_interval_seconds: Option<i64>,
    pub priority: Option<i64>,
}

/// Fields the admin API may change on a pool config.
#[derive(Debug, Default)]
pub struct PoolPatch {
    pub virtual_model: Option<String>,
    pub cooldown_seconds: Option<i64>,
    pub timeout_seconds: Option<i64>,
    pub max_retries: Option<i64>,
}

/// Persisted health columns of an endpoint, loaded into the tracker at boot.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct EndpointHealthRow {
    pub id: i64,
    pub cooldown_until: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub total_requests: i64,
    pub success_requests: i64,
    pub error_requests: i64,
    pub avg_latency_ms: f64,
}

/// One dispatch attempt, as recorded by the log sink.
#[derive(Debug, Clone, serde::Serialize, sqlx::FromRow)]
pub struct LogEntry {
    pub id: i64,
    pub pool: PoolTag,
    pub requested_model: String,
    pub actual_model: String,
    pub provider_name: String,
    pub success: bool,
    pub status_code: Option<i64>,
    pub error_message: Option<String>,
    pub latency_ms: i64,
    pub input_tokens: Option<i64>,
    pub output_tokens: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// Log entry before it has an id and timestamp.
#[derive(Debug, Clone)]
pub struct NewLogEntry {
    pub pool: PoolTag,
    pub requested_model: String,
    pub actual_model: String,
    pub provider_name: String,
    pub success: bool,
    pub status_code: Option<i64>,
    pub error_message: Option<String>,
    pub latency_ms: i64,
    pub input_tokens: Option<i64>,
    pub output_tokens: Option<i64>,
}

/// Filters for the paged log listing.
#[derive(Debug, Default, Clone)]
pub struct LogQuery {
    pub limit: i64,
    pub offset: i64,
    pub pool: Option<PoolTag>,
    pub success: Option<bool>,
    pub provider_name: Option<String>,
}

impl Store {
    /// Open (creating if missing) and migrate the database.
    pub async fn connect(database_url: &str) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);

        // In-memory databases exist per connection; a pool larger than one
        // would hand out empty databases.
        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };

        let db = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        sqlx::migrate!("./migrations").run(&db).await?;

        Ok(Self { db })
    }

    // ── Providers ─────────────────────────────────────────────────────

    pub async fn list_providers(&self) -> Result<Vec<Provider>, sqlx::Error> {
        sqlx::query_as::<_, Provider>("SELECT * FROM providers ORDER BY id")
            .fetch_all(&self.db)
            .await
    }

    pub async fn get_provider(&self, id: i64) -> Result<Option<Provider>, sqlx::Error> {
        sqlx::query_as::<_, Provider>("SELECT * FROM providers WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.db)
            .await
    }

    pub async fn create_provider(
        &self,
        name: &str,
        base_url: &str,
        api_key: &str,
        api_format: WireFormat,
    ) -> Result<Provider, sqlx::Error> {
        let now = Utc::now();
        let base_url = base_url.trim_end_matches('/');
        let id = sqlx::query(
            "INSERT INTO providers (name, base_url, api_key, api_format, enabled, created_at, updated_at)
             VALUES (?, ?, ?, ?, TRUE, ?, ?)",
        )
        .bind(name)
        .bind(base_url)
        .bind(api_key)
        .bind(api_format)
        .bind(now)
        .bind(now)
        .execute(&self.db)
        .await?
        .last_insert_rowid();

        Ok(self.get_provider(id).await?.expect("row just inserted"))
    }

    pub async fn update_provider(
        &self,
        id: i64,
        patch: ProviderPatch,
    ) -> Result<Option<Provider>, sqlx::Error> {
        let Some(current) = self.get_provider(id).await? else {
            return Ok(None);
        };

        let name = patch.name.unwrap_or(current.name);
        let base_url = patch
            .base_url
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or(current.base_url);
        let api_key = patch.api_key.unwrap_or(current.api_key);
        let api_format = patch.api_format.unwrap_or(current.api_format);
        let enabled = patch.enabled.unwrap_or(current.enabled);

        sqlx::query(
            "UPDATE providers SET name = ?, base_url = ?, api_key = ?, api_format = ?, enabled = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(&name)
        .bind(&base_url)
        .bind(&api_key)
        .bind(api_format)
        .bind(enabled)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.db)
        .await?;

        self.get_provider(id).await
    }

    /// Deletes a provider and, via the FK cascade, all of its endpoints.
    pub async fn delete_provider(&self, id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM providers WHERE id = ?")
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn bump_provider_counters(
        &self,
        id: i64,
        success: bool,
    ) -> Result<(), sqlx::Error> {
        let column = if success { "success_requests" } else { "error_requests" };
        let sql = format!(
            "UPDATE providers SET total_requests = total_requests + 1, {column} = {column} + 1 WHERE id = ?"
        );
        sqlx::query(&sql).bind(id).execute(&self.db).await?;
        Ok(())
    }

    // ── Endpoints ─────────────────────────────────────────────────────

    pub async fn list_endpoints(
        &self,
        provider_id: Option<i64>,
        pool: Option<PoolTag>,
    ) -> Result<Vec<Endpoint>, sqlx::Error> {
        let mut conditions = Vec::new();
        if provider_id.is_some() {
            conditions.push("provider_id = ?");
        }
        if pool.is_some() {
            conditions.push("pool = ?");
        }
        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let sql = format!(
            "SELECT id, provider_id, model_id, pool, enabled, weight, min_interval_seconds, priority, created_at, updated_at
             FROM endpoints {where_clause} ORDER BY id"
        );
        let mut query = sqlx::query_as::<_, Endpoint>(&sql);
        if let Some(pid) = provider_id {
            query = query.bind(pid);
        }
        if let Some(tag) = pool {
            query = query.bind(tag);
        }
        query.fetch_all(&self.db).await
    }

    pub async fn get_endpoint(&self, id: i64) -> Result<Option<Endpoint>, sqlx::Error> {
        sqlx::query_as::<_, Endpoint>(
            "SELECT id, provider_id, model_id, pool, enabled, weight, min_interval_seconds, priority, created_at, updated_at
             FROM endpoints WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await
    }

    pub async fn endpoint_exists(
        &self,
        provider_id: i64,
        model_id: &str,
        pool: PoolTag,
    ) -> Result<bool, sqlx::Error> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM endpoints WHERE provider_id = ? AND model_id = ? AND pool = ?",
        )
        .bind(provider_id)
        .bind(model_id)
        .bind(pool)
        .fetch_one(&self.db)
        .await?;
        Ok(count > 0)
    }

    pub async fn create_endpoint(
        &self,
        provider_id: i64,
        model_id: &str,
        pool: PoolTag,
        weight: i64,
    ) -> Result<Endpoint, sqlx::Error> {
        let now = Utc::now();
        let id = sqlx::query(
            "INSERT INTO endpoints (provider_id, model_id, pool, enabled, weight, min_interval_seconds, priority, created_at, updated_at)
             VALUES (?, ?, ?, TRUE, ?, 0, 0, ?, ?)",
        )
        .bind(provider_id)
        .bind(model_id)
        .bind(pool)
        .bind(weight.max(1))
        .bind(now)
        .bind(now)
        .execute(&self.db)
        .await?
        .last_insert_rowid();

        Ok(self.get_endpoint(id).await?.expect("row just inserted"))
    }

    pub async fn update_endpoint(
        &self,
        id: i64,
        patch: EndpointPatch,
    ) -> Result<Option<Endpoint>, sqlx::Error> {
        let Some(current) = self.get_endpoint(id).await? else {
            return Ok(None);
        };

        let pool = patch.pool.unwrap_or(current.pool);
        let enabled = patch.enabled.unwrap_or(current.enabled);
        let weight = patch.weight.unwrap_or(current.weight).max(1);
        let min_interval = patch
            .min_interval_seconds
            .unwrap_or(current.min_interval_seconds)
            .max(0);
        let priority = patch.priority.unwrap_or(current.priority);

        sqlx::query(
            "UPDATE endpoints SET pool = ?, enabled = ?, weight = ?, min_interval_seconds = ?, priority = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(pool)
        .bind(enabled)
        .bind(weight)
        .bind(min_interval)
        .bind(priority)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.db)
        .await?;

        self.get_endpoint(id).await
    }

    pub async fn delete_endpoint(&self, id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM endpoints WHERE id = ?")
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // ── Endpoint health write-back ────────────────────────────────────

    pub async fn load_endpoint_health(&self) -> Result<Vec<EndpointHealthRow>, sqlx::Error> {
        sqlx::query_as::<_, EndpointHealthRow>(
            "SELECT id, cooldown_until, last_error, last_used_at, total_requests, success_requests, error_requests, avg_latency_ms
             FROM endpoints",
        )
        .fetch_all(&self.db)
        .await
    }

    /// Writes the tracker's view of one endpoint back to its row.
    pub async fn save_endpoint_health(
        &self,
        id: i64,
        health: &EndpointHealthRow,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE endpoints SET cooldown_until = ?, last_error = ?, last_used_at = ?,
                 total_requests = ?, success_requests = ?, error_requests = ?, avg_latency_ms = ?
             WHERE id = ?",
        )
        .bind(health.cooldown_until)
        .bind(&health.last_error)
        .bind(health.last_used_at)
        .bind(health.total_requests)
        .bind(health.success_requests)
        .bind(health.error_requests)
        .bind(health.avg_latency_ms)
        .bind(id)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    // ── Pool configs ──────────────────────────────────────────────────

    pub async fn get_or_create_pool(
        &self,
        pool: PoolTag,
        virtual_model: &str,
        default_cooldown_seconds: i64,
    ) -> Result<PoolConfig, sqlx::Error> {
        if let Some(config) =
            sqlx::query_as::<_, PoolConfig>("SELECT * FROM pool_configs WHERE pool = ?")
                .bind(pool)
                .fetch_optional(&self.db)
                .await?
        {
            return Ok(config);
        }

        let defaults = PoolConfig::defaults(pool, virtual_model, default_cooldown_seconds);
        sqlx::query(
            "INSERT OR IGNORE INTO pool_configs (pool, virtual_model, cooldown_seconds, timeout_seconds, max_retries)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(pool)
        .bind(&defaults.virtual_model)
        .bind(defaults.cooldown_seconds)
        .bind(defaults.timeout_seconds)
        .bind(defaults.max_retries)
        .execute(&self.db)
        .await?;
        Ok(defaults)
    }

    pub async fn update_pool(
        &self,
        pool: PoolTag,
        patch: PoolPatch,
    ) -> Result<Option<PoolConfig>, sqlx::Error> {
        let Some(current) =
            sqlx::query_as::<_, PoolConfig>("SELECT * FROM pool_configs WHERE pool = ?")
                .bind(pool)
                .fetch_optional(&self.db)
                .await?
        else {
            return Ok(None);
        };

        let virtual_model = patch.virtual_model.unwrap_or(current.virtual_model);
        let cooldown = patch.cooldown_seconds.unwrap_or(current.cooldown_seconds).max(0);
        let timeout = patch.timeout_seconds.unwrap_or(current.timeout_seconds).max(1);
        let max_retries = patch.max_retries.unwrap_or(current.max_retries).max(0);

        sqlx::query(
            "UPDATE pool_configs SET virtual_model = ?, cooldown_seconds = ?, timeout_seconds = ?, max_retries = ?
             WHERE pool = ?",
        )
        .bind(&virtual_model)
        .bind(cooldown)
        .bind(timeout)
        .bind(max_retries)
        .bind(pool)
        .execute(&self.db)
        .await?;

        sqlx::query_as::<_, PoolConfig>("SELECT * FROM pool_configs WHERE pool = ?")
            .bind(pool)
            .fetch_optional(&self.db)
            .await
    }

    // ── Logs ──────────────────────────────────────────────────────────

    pub async fn append_log(&self, entry: &NewLogEntry) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO request_logs (pool, requested_model, actual_model, provider_name, success,
                 status_code, error_message, latency_ms, input_tokens, output_tokens, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(entry.pool)
        .bind(&entry.requested_model)
        .bind(&entry.actual_model)
        .bind(&entry.provider_name)
        .bind(entry.success)
        .bind(entry.status_code)
        .bind(&entry.error_message)
        .bind(entry.latency_ms)
        .bind(entry.input_tokens)
        .bind(entry.output_tokens)
        .bind(Utc::now())
        .execute(&self.db)
        .await?;
        Ok(())
    }

    /// Newest-first page of logs plus the total matching count.
    pub async fn list_logs(&self, query: &LogQuery) -> Result<(Vec<LogEntry>, i64), sqlx::Error> {
        let mut conditions = Vec::new();
        if query.pool.is_some() {
            conditions.push("pool = ?");
        }
        if query.success.is_some() {
            conditions.push("success = ?");
        }
        if query.provider_name.is_some() {
            conditions.push("provider_name = ?");
        }
        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let count_sql = format!("SELECT COUNT(*) FROM request_logs {where_clause}");
        let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
        if let Some(pool) = query.pool {
            count_query = count_query.bind(pool);
        }
        if let Some(success) = query.success {
            count_query = count_query.bind(success);
        }
        if let Some(ref provider) = query.provider_name {
            count_query = count_query.bind(provider);
        }
        let total = count_query.fetch_one(&self.db).await?;

        let data_sql = format!(
            "SELECT * FROM request_logs {where_clause} ORDER BY id DESC LIMIT ? OFFSET ?"
        );
        let mut data_query = sqlx::query_as::<_, LogEntry>(&data_sql);
        if let Some(pool) = query.pool {
            data_query = data_query.bind(pool);
        }
        if let Some(success) = query.success {
            data_query = data_query.bind(success);
        }
        if let Some(ref provider) = query.provider_name {
            data_query = data_query.bind(provider);
        }
        let rows = data_query
            .bind(query.limit)
            .bind(query.offset)
            .fetch_all(&self.db)
            .await?;

        Ok((rows, total))
    }

    /// Evicts the oldest rows past the soft cap. Returns rows deleted.
    pub async fn trim_logs(&self, cap: i64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM request_logs WHERE id NOT IN
                 (SELECT id FROM request_logs ORDER BY id DESC LIMIT ?)",
        )
        .bind(cap)
        .execute(&self.db)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn clear_logs(&self) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM request_logs")
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected())
    }
}

/// Configuration for the gateway, env-first with CLI overrides.
use anyhow::anyhow;
use clap::Parser;

use crate::pool::PoolTag;

#[derive(Debug, Clone, Parser)]
#[command(version, about, long_about = None)]
pub struct Config {
    /// Port the gateway listens on.
    #[arg(long, env = "API_PORT", default_value_t = 8899)]
    pub api_port: u16,

    /// Shared password for the /admin surface (bearer).
    #[arg(long, env = "ADMIN_PASSWORD", default_value = "admin123")]
    pub admin_password: String,

    /// SQLite database URL.
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite:data/gateway.db")]
    pub database_url: String,

    /// Cooldown applied to pools that have never been configured.
    #[arg(long, env = "DEFAULT_COOLDOWN_SECONDS", default_value_t = 60)]
    pub default_cooldown_seconds: i64,

    /// Soft cap on retained log rows; oldest rows are evicted past it.
    #[arg(long, env = "MAX_LOGS_COUNT", default_value_t = 10_000)]
    pub max_logs_count: i64,

    /// Virtual model name resolving to the tool pool.
    #[arg(long, env = "VIRTUAL_MODEL_TOOL", default_value = "haiku")]
    pub virtual_model_tool: String,

    /// Virtual model name resolving to the normal pool.
    #[arg(long, env = "VIRTUAL_MODEL_NORMAL", default_value = "sonnet")]
    pub virtual_model_normal: String,

    /// Virtual model name resolving to the advanced pool.
    #[arg(long, env = "VIRTUAL_MODEL_ADVANCED", default_value = "opus")]
    pub virtual_model_advanced: String,
}

impl Config {
    pub fn validate(self) -> Result<Self, anyhow::Error> {
        if self.admin_password.is_empty() {
            return Err(anyhow!("ADMIN_PASSWORD must not be empty"));
        }
        if self.default_cooldown_seconds < 0 {
            return Err(anyhow!("DEFAULT_COOLDOWN_SECONDS must be non-negative"));
        }
        let names = [
            &self.virtual_model_tool,
            &self.virtual_model_normal,
            &self.virtual_model_advanced,
        ];
        if names.iter().any(|n| n.is_empty()) {
            return Err(anyhow!("virtual model names must not be empty"));
        }
        if names[0] == names[1] || names[0] == names[2] || names[1] == names[2] {
            return Err(anyhow!("virtual model names must be distinct"));
        }
        Ok(self)
    }

    /// The fixed virtual-model table, in pool declaration order.
    pub fn virtual_models(&self) -> [(String, PoolTag); 3] {
        [
            (self.virtual_model_tool.clone(), PoolTag::Tool),
            (self.virtual_model_normal.clone(), PoolTag::Normal),
            (self.virtual_model_advanced.clone(), PoolTag::Advanced),
        ]
    }

    pub fn virtual_name_for(&self, pool: PoolTag) -> &str {
        match pool {
            PoolTag::Tool => &self.virtual_model_tool,
            PoolTag::Normal => &self.virtual_model_normal,
            PoolTag::Advanced => &self.virtual_model_advanced,
        }
    }
}

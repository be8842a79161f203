//! In-memory registry: the authoritative routing view of providers,
//! endpoints and pool configs.
//!
//! Readers clone an `Arc` snapshot and never block each other; mutations go
//! through the store and then rebuild the snapshot wholesale, so the hot path
//! never observes a half-applied change. The snapshot carries the secondary
//! index pool → provider → [endpoints] in insertion (id) order, which is the
//! round-robin order across providers and the deterministic fallback order
//! within one.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::config::Config;
use crate::pool::{Endpoint, PoolConfig, PoolTag, Provider};
use crate::store::Store;

/// One provider and its endpoints within a single pool.
#[derive(Debug, Clone)]
pub struct ProviderGroup {
    pub provider: Provider,
    pub endpoints: Vec<Endpoint>,
}

#[derive(Debug)]
pub struct RegistrySnapshot {
    pub providers: Vec<Provider>,
    pub pools: HashMap<PoolTag, PoolConfig>,
    pool_index: HashMap<PoolTag, Vec<ProviderGroup>>,
    virtual_models: Vec<(String, PoolTag)>,
}

impl RegistrySnapshot {
    /// Resolve a client-visible model name to its pool. Exact match only;
    /// anything else is an unknown model.
    pub fn resolve_virtual(&self, model: &str) -> Option<PoolTag> {
        self.virtual_models
            .iter()
            .find(|(name, _)| name == model)
            .map(|(_, tag)| *tag)
    }

    pub fn virtual_models(&self) -> &[(String, PoolTag)] {
        &self.virtual_models
    }

    /// Provider groups of a pool, in round-robin order.
    pub fn groups(&self, pool: PoolTag) -> &[ProviderGroup] {
        self.pool_index.get(&pool).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Pool configs exist for every tag once the registry has loaded.
    pub fn pool_config(&self, pool: PoolTag) -> &PoolConfig {
        &self.pools[&pool]
    }

    pub fn provider(&self, id: i64) -> Option<&Provider> {
        self.providers.iter().find(|p| p.id == id)
    }
}

#[derive(Debug)]
pub struct Registry {
    store: Store,
    snapshot: RwLock<Arc<RegistrySnapshot>>,
    virtual_models: Vec<(String, PoolTag)>,
    default_cooldown_seconds: i64,
}

impl Registry {
    /// Loads the routing view from the store, creating missing pool configs
    /// with their defaults.
    pub async fn load(store: Store, config: &Config) -> Result<Self, sqlx::Error> {
        let virtual_models: Vec<(String, PoolTag)> = config.virtual_models().into();
        let registry = Self {
            store,
            snapshot: RwLock::new(Arc::new(RegistrySnapshot {
                providers: Vec::new(),
                pools: HashMap::new(),
                pool_index: HashMap::new(),
                virtual_models: virtual_models.clone(),
            })),
            virtual_models,
            default_cooldown_seconds: config.default_cooldown_seconds,
        };
        registry.reload().await?;
        Ok(registry)
    }

    /// Cheap read for the dispatch hot path.
    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        self.snapshot.read().expect("registry lock poisoned").clone()
    }

    /// Rebuilds the snapshot from the store. Called after every admin
    /// mutation; concurrent dispatches keep their old snapshot.
    pub async fn reload(&self) -> Result<(), sqlx::Error> {
        let providers = self.store.list_providers().await?;
        let endpoints = self.store.list_endpoints(None, None).await?;

        let mut pools = HashMap::new();
        for (name, tag) in &self.virtual_models {
            let config = self
                .store
                .get_or_create_pool(*tag, name, self.default_cooldown_seconds)
                .await?;
            pools.insert(*tag, config);
        }

        let pool_index = build_pool_index(&providers, &endpoints);

        let next = Arc::new(RegistrySnapshot {
            providers,
            pools,
            pool_index,
            virtual_models: self.virtual_models.clone(),
        });
        *self.snapshot.write().expect("registry lock poisoned") = next;
        Ok(())
    }

    pub fn store(&self) -> &Store {
        &self.store
    }
}

/// Groups endpoints by pool, then by provider, preserving id order at both
/// levels.
fn build_pool_index(
    providers: &[Provider],
    endpoints: &[Endpoint],
) -> HashMap<PoolTag, Vec<ProviderGroup>> {
    let mut index: HashMap<PoolTag, Vec<ProviderGroup>> = HashMap::new();

    for tag in PoolTag::ALL {
        let mut groups: Vec<ProviderGroup> = Vec::new();
        for provider in providers {
            let eps: Vec<Endpoint> = endpoints
                .iter()
                .filter(|e| e.pool == tag && e.provider_id == provider.id)
                .cloned()
                .collect();
            if !eps.is_empty() {
                groups.push(ProviderGroup {
                    provider: provider.clone(),
                    endpoints: eps,
                });
            }
        }
        index.insert(tag, groups);
    }

    index
}

//! Per-resource cache of resolved strategies and permission listings.
//!
//! Entries are keyed by resource IRI. Every mutation attempt invalidates the
//! listing of its resource, and of the resources below it when the target is
//! a container. Strategies stay cached until evicted.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::CacheConfig;
use crate::facade::ResolvedPermission;
use crate::resolver::AccessStrategy;

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
}

/// Strategy and permission cache.
#[derive(Clone)]
pub struct PermissionCache {
    strategies: Cache<String, AccessStrategy>,
    permissions: Cache<String, Arc<Vec<ResolvedPermission>>>,
    enabled: bool,
    counters: Arc<Counters>,
}

impl PermissionCache {
    /// Create a new cache from configuration.
    pub fn new(config: &CacheConfig) -> Self {
        let ttl = Duration::from_secs(config.ttl_secs);

        let strategies = Cache::builder()
            .max_capacity(config.max_entries)
            .time_to_live(ttl)
            .build();

        let permissions = Cache::builder()
            .max_capacity(config.max_entries)
            .time_to_live(ttl)
            .support_invalidation_closures()
            .build();

        Self {
            strategies,
            permissions,
            enabled: config.enabled,
            counters: Arc::new(Counters::default()),
        }
    }

    /// Create a disabled cache.
    pub fn disabled() -> Self {
        Self {
            strategies: Cache::builder().max_capacity(0).build(),
            permissions: Cache::builder().max_capacity(0).build(),
            enabled: false,
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub async fn get_strategy(&self, iri: &str) -> Option<AccessStrategy> {
        if !self.enabled {
            return None;
        }
        self.strategies.get(iri).await
    }

    pub async fn set_strategy(&self, iri: &str, strategy: AccessStrategy) {
        if !self.enabled {
            return;
        }
        self.strategies.insert(iri.to_string(), strategy).await;
    }

    /// Get the cached listing of a resource.
    pub async fn get_permissions(&self, iri: &str) -> Option<Arc<Vec<ResolvedPermission>>> {
        if !self.enabled {
            return None;
        }

        let result = self.permissions.get(iri).await;
        if result.is_some() {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.counters.misses.fetch_add(1, Ordering::Relaxed);
        }
        result
    }

    pub async fn set_permissions(&self, iri: &str, permissions: Vec<ResolvedPermission>) {
        if !self.enabled {
            return;
        }
        self.permissions
            .insert(iri.to_string(), Arc::new(permissions))
            .await;
    }

    /// Drop the cached listing of one resource.
    pub async fn invalidate(&self, iri: &str) {
        self.permissions.invalidate(iri).await;
    }

    /// Drop the cached listing of `iri` and, for a container, of every
    /// resource below it.
    pub async fn invalidate_tree(&self, iri: &str) {
        self.permissions.invalidate(iri).await;
        if !self.enabled || !iri.ends_with('/') {
            return;
        }

        let prefix = iri.to_string();
        if let Err(e) = self
            .permissions
            .invalidate_entries_if(move |key, _| key.starts_with(&prefix))
        {
            warn!(resource = iri, error = %e, "unable to drop cached listings below container");
        }
    }

    /// Get cache statistics.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            strategy_entries: self.strategies.entry_count(),
            permission_entries: self.permissions.entry_count(),
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
        }
    }
}

/// Cache statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStats {
    /// Number of cached strategies.
    pub strategy_entries: u64,
    /// Number of cached permission listings.
    pub permission_entries: u64,
    /// Listing lookups served from the cache.
    pub hits: u64,
    /// Listing lookups that missed.
    pub misses: u64,
}

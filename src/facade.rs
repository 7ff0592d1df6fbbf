//! Unified permissions facade.
//!
//! The facade resolves a resource's strategy, merges its entries with the
//! valid consent grants, labels each agent, and routes mutations to the
//! strategy that owns the entry.

use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::access::{merge_entries, AccessModes, Agent, PermissionEntry};
use crate::acp::{AcpStrategy, PolicyName, PolicyStorage};
use crate::cache::PermissionCache;
use crate::config::Config;
use crate::consent::ConsentAdapter;
use crate::error::{AccessError, Result};
use crate::profile::{display_name_for, Profile, ProfileFetcher};
use crate::resolver::{AccessStrategy, StrategyKind, StrategyResolver};
use crate::store::ResourceStore;

/// A permission entry with the label shown for its agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedPermission {
    pub entry: PermissionEntry,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<Profile>,
}

impl ResolvedPermission {
    pub fn agent(&self) -> &Agent {
        &self.entry.agent
    }

    pub fn is_mutable(&self) -> bool {
        self.entry.is_mutable()
    }
}

/// A requested change to one agent's access.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermissionChange {
    /// Set the agent's modes. Empty modes revoke access.
    Modes(AccessModes),
    /// Join a policy bucket.
    AddToPolicy(String),
    /// Leave a policy bucket.
    RemoveFromPolicy(String),
}

/// Entry point for reading and editing a resource's permissions.
#[derive(Clone)]
pub struct PermissionsFacade {
    resolver: StrategyResolver,
    consent: Option<ConsentAdapter>,
    profiles: Arc<dyn ProfileFetcher>,
    cache: PermissionCache,
    profile_concurrency: usize,
    profile_timeout: Duration,
}

impl PermissionsFacade {
    pub fn new(store: Arc<dyn ResourceStore>, profiles: Arc<dyn ProfileFetcher>, config: &Config) -> Self {
        let cache = if config.cache.enabled {
            PermissionCache::new(&config.cache)
        } else {
            PermissionCache::disabled()
        };

        Self {
            resolver: StrategyResolver::new(store, PolicyStorage::from(&config.acp)),
            consent: None,
            profiles,
            cache,
            profile_concurrency: config.profile.concurrency.max(1),
            profile_timeout: Duration::from_millis(config.profile.timeout_ms.max(1)),
        }
    }

    /// Merge access grants from `adapter` into every listing.
    pub fn with_consent(mut self, adapter: ConsentAdapter) -> Self {
        self.consent = Some(adapter);
        self
    }

    pub fn cache(&self) -> &PermissionCache {
        &self.cache
    }

    /// Strategy governing `iri`, resolved at most once while cached.
    pub async fn strategy(&self, iri: &str) -> Result<AccessStrategy> {
        if let Some(strategy) = self.cache.get_strategy(iri).await {
            return Ok(strategy);
        }
        let strategy = self.resolver.resolve(iri).await?;
        self.cache.set_strategy(iri, strategy.clone()).await;
        Ok(strategy)
    }

    /// Every agent's access to `iri`, labelled and sorted.
    ///
    /// Public comes first, then Authenticated, then individual agents by
    /// display name. Consent and profile failures degrade the listing
    /// instead of failing it.
    pub async fn get_all_permissions(&self, iri: &str) -> Result<Vec<ResolvedPermission>> {
        if let Some(cached) = self.cache.get_permissions(iri).await {
            debug!(resource = iri, "permission listing served from cache");
            return Ok(cached.as_ref().clone());
        }

        let strategy = self.strategy(iri).await?;
        let permissions = self.collect(iri, &strategy).await?;
        self.cache.set_permissions(iri, permissions.clone()).await;
        Ok(permissions)
    }

    /// Change one entry of `iri`'s listing.
    ///
    /// The cached listing of `iri` is dropped whether or not the change
    /// lands, so a half-applied change shows on the next read.
    pub async fn mutate(&self, iri: &str, entry: &PermissionEntry, change: PermissionChange) -> Result<()> {
        let strategy = self.strategy(iri).await?;
        self.apply(iri, &strategy, entry, change).await
    }

    /// Bind an editing session to `iri`'s current strategy.
    ///
    /// The strategy is resolved fresh, once, and reused for every read and
    /// write made through the session.
    pub async fn session(&self, iri: &str) -> Result<PermissionSession> {
        let strategy = self.resolver.resolve(iri).await?;
        self.cache.set_strategy(iri, strategy.clone()).await;
        Ok(PermissionSession {
            facade: self.clone(),
            iri: iri.to_string(),
            strategy,
        })
    }

    async fn collect(&self, iri: &str, strategy: &AccessStrategy) -> Result<Vec<ResolvedPermission>> {
        let mut entries = strategy.get_permissions().await?;

        if let Some(consent) = &self.consent {
            match consent.active_entries(iri).await {
                Ok(grants) => entries.extend(grants),
                Err(e) => warn!(resource = iri, error = %e, "access grants unavailable, listing without them"),
            }
        }

        let merged = merge_entries(entries);
        let mut resolved: Vec<ResolvedPermission> = stream::iter(merged)
            .map(|entry| self.label(entry))
            .buffer_unordered(self.profile_concurrency)
            .collect()
            .await;

        resolved.sort_by(compare_listing);
        debug!(resource = iri, strategy = %strategy.kind(), count = resolved.len(), "collected permissions");
        Ok(resolved)
    }

    async fn label(&self, entry: PermissionEntry) -> ResolvedPermission {
        let profile = if entry.agent.is_pseudo() {
            None
        } else {
            let fetch = self.profiles.fetch_profile(entry.agent.iri());
            match tokio::time::timeout(self.profile_timeout, fetch).await {
                Ok(Ok(profile)) => Some(profile),
                Ok(Err(e)) => {
                    warn!(agent = %entry.agent, error = %e, "profile unavailable, labelling by WebID");
                    None
                }
                Err(_) => {
                    warn!(agent = %entry.agent, timeout = ?self.profile_timeout, "profile fetch timed out, labelling by WebID");
                    None
                }
            }
        };

        ResolvedPermission {
            display_name: display_name_for(&entry.agent, profile.as_ref()),
            profile,
            entry,
        }
    }

    async fn apply(
        &self,
        iri: &str,
        strategy: &AccessStrategy,
        entry: &PermissionEntry,
        change: PermissionChange,
    ) -> Result<()> {
        if !entry.is_mutable() {
            return Err(AccessError::UnsupportedMutation(format!(
                "access grant for {} is managed by its issuer",
                entry.agent
            )));
        }
        if entry.provenance != strategy.provenance() {
            return Err(AccessError::UnsupportedMutation(format!(
                "{:?} entry for {} cannot be edited through the {} strategy of {}",
                entry.provenance,
                entry.agent,
                strategy.kind(),
                iri
            )));
        }

        let agent = &entry.agent;
        let result = route_change(strategy, agent, &change).await;
        self.cache.invalidate_tree(iri).await;

        match &result {
            Ok(()) => {
                info!(resource = iri, %agent, strategy = %strategy.kind(), change = ?change, "applied permission change");
            }
            Err(e) => {
                warn!(resource = iri, %agent, strategy = %strategy.kind(), change = ?change, error = %e, "permission change failed");
            }
        }
        result
    }
}

async fn route_change(strategy: &AccessStrategy, agent: &Agent, change: &PermissionChange) -> Result<()> {
    match strategy {
        AccessStrategy::Acl(acl) => {
            let modes = match change {
                PermissionChange::Modes(modes) => *modes,
                PermissionChange::AddToPolicy(name) => PolicyName::parse(name)?.allow(),
                PermissionChange::RemoveFromPolicy(_) => AccessModes::NONE,
            };
            acl.save_permissions_for_agent(agent, modes).await?;
        }
        AccessStrategy::Acp(acp) => match change {
            PermissionChange::Modes(modes) => set_acp_modes(acp, agent, modes).await?,
            PermissionChange::AddToPolicy(name) => join(acp, agent, name).await?,
            PermissionChange::RemoveFromPolicy(name) => leave(acp, agent, name).await?,
        },
    }
    Ok(())
}

/// Pseudo-agents are matched by rule flags, individuals by the agent list.
async fn join(acp: &AcpStrategy, agent: &Agent, policy: &str) -> Result<()> {
    match agent {
        Agent::Public => acp.set_rule_public(policy, true).await?,
        Agent::Authenticated => acp.set_rule_authenticated(policy, true).await?,
        Agent::WebId(_) => acp.add_agent_to_policy(agent, policy).await?,
    };
    Ok(())
}

async fn leave(acp: &AcpStrategy, agent: &Agent, policy: &str) -> Result<()> {
    match agent {
        Agent::Public => acp.set_rule_public(policy, false).await?,
        Agent::Authenticated => acp.set_rule_authenticated(policy, false).await?,
        Agent::WebId(_) => acp.remove_agent_from_policy(agent, policy).await?,
    };
    Ok(())
}

/// Move `agent` into the one policy granting exactly `modes`, leaving every
/// other bucket. Empty modes leave all buckets.
async fn set_acp_modes(acp: &AcpStrategy, agent: &Agent, modes: &AccessModes) -> Result<()> {
    let target = if modes.is_empty() {
        None
    } else {
        Some(PolicyName::for_modes(modes).ok_or_else(|| {
            AccessError::UnsupportedMutation(format!("no policy grants exactly {}", modes))
        })?)
    };

    for policy in PolicyName::all().filter(|p| Some(*p) != target) {
        let members = acp.members(policy.as_str()).await?;
        if members.contains(agent) {
            leave(acp, agent, policy.as_str()).await?;
        }
    }

    if let Some(policy) = target {
        join(acp, agent, policy.as_str()).await?;
    }
    Ok(())
}

fn compare_listing(a: &ResolvedPermission, b: &ResolvedPermission) -> Ordering {
    a.entry
        .agent
        .rank()
        .cmp(&b.entry.agent.rank())
        .then_with(|| a.display_name.to_lowercase().cmp(&b.display_name.to_lowercase()))
        .then_with(|| a.entry.agent.cmp(&b.entry.agent))
        .then_with(|| a.entry.provenance.cmp(&b.entry.provenance))
}

/// Permission editing bound to one resource and its resolved strategy.
#[derive(Clone)]
pub struct PermissionSession {
    facade: PermissionsFacade,
    iri: String,
    strategy: AccessStrategy,
}

impl PermissionSession {
    pub fn iri(&self) -> &str {
        &self.iri
    }

    pub fn kind(&self) -> StrategyKind {
        self.strategy.kind()
    }

    pub fn strategy(&self) -> &AccessStrategy {
        &self.strategy
    }

    /// Current listing, read through the bound strategy.
    pub async fn permissions(&self) -> Result<Vec<ResolvedPermission>> {
        let permissions = self.facade.collect(&self.iri, &self.strategy).await?;
        self.facade
            .cache
            .set_permissions(&self.iri, permissions.clone())
            .await;
        Ok(permissions)
    }

    pub async fn mutate(&self, entry: &PermissionEntry, change: PermissionChange) -> Result<()> {
        self.facade
            .apply(&self.iri, &self.strategy, entry, change)
            .await
    }
}

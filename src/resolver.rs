//! Strategy resolution: which access-control mechanism governs a resource.

use std::fmt;
use std::sync::Arc;

use crate::access::{PermissionEntry, Provenance};
use crate::acl::AclStrategy;
use crate::acp::{AcpStrategy, PolicyStorage};
use crate::error::{ResolutionError, Result};
use crate::store::{ResourceInfo, ResourceStore};

/// Mechanism governing a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    Acl,
    Acp,
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrategyKind::Acl => write!(f, "acl"),
            StrategyKind::Acp => write!(f, "acp"),
        }
    }
}

/// A resolved strategy, bound to one resource for the length of an editing
/// session.
#[derive(Clone)]
pub enum AccessStrategy {
    Acl(AclStrategy),
    Acp(AcpStrategy),
}

impl AccessStrategy {
    pub fn kind(&self) -> StrategyKind {
        match self {
            AccessStrategy::Acl(_) => StrategyKind::Acl,
            AccessStrategy::Acp(_) => StrategyKind::Acp,
        }
    }

    /// Provenance of the entries this strategy reads and writes.
    pub fn provenance(&self) -> Provenance {
        match self {
            AccessStrategy::Acl(_) => Provenance::Acl,
            AccessStrategy::Acp(_) => Provenance::Acp,
        }
    }

    pub fn resource(&self) -> &ResourceInfo {
        match self {
            AccessStrategy::Acl(s) => s.resource(),
            AccessStrategy::Acp(s) => s.resource(),
        }
    }

    /// Raw ACL or ACP entries for the resource.
    pub async fn get_permissions(&self) -> Result<Vec<PermissionEntry>> {
        match self {
            AccessStrategy::Acl(s) => Ok(s.get_permissions().await?),
            AccessStrategy::Acp(s) => Ok(s.get_permissions().await?),
        }
    }
}

impl fmt::Debug for AccessStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessStrategy")
            .field("kind", &self.kind())
            .field("resource", &self.resource().iri)
            .finish()
    }
}

/// Picks the strategy for a resource from its link metadata.
#[derive(Clone)]
pub struct StrategyResolver {
    store: Arc<dyn ResourceStore>,
    policy_storage: PolicyStorage,
}

impl StrategyResolver {
    pub fn new(store: Arc<dyn ResourceStore>, policy_storage: PolicyStorage) -> Self {
        Self {
            store,
            policy_storage,
        }
    }

    /// Decide the strategy from already fetched metadata. First match wins:
    /// a linked ACR means ACP, an accessible ACL link means WAC.
    pub fn select(&self, info: ResourceInfo) -> std::result::Result<AccessStrategy, ResolutionError> {
        if info.has_linked_access_control_resource() {
            let iri = info.iri.clone();
            return AcpStrategy::new(self.store.clone(), info, self.policy_storage.clone())
                .map(AccessStrategy::Acp)
                .map_err(|_| ResolutionError::NoAccessPolicy(iri));
        }

        if info.is_access_controlled() {
            return Ok(AccessStrategy::Acl(AclStrategy::new(self.store.clone(), info)));
        }

        Err(ResolutionError::NoAccessPolicy(info.iri))
    }

    /// Fetch metadata for `iri` and select its strategy.
    ///
    /// A failed metadata read is reported as [`ResolutionError::Network`], not
    /// as a missing policy, since a retry may succeed.
    pub async fn resolve(&self, iri: &str) -> std::result::Result<AccessStrategy, ResolutionError> {
        let info = self
            .store
            .get_resource_info(iri)
            .await
            .map_err(ResolutionError::Network)?;

        let strategy = self.select(info)?;
        tracing::debug!(resource = iri, strategy = %strategy.kind(), "resolved access strategy");
        Ok(strategy)
    }
}

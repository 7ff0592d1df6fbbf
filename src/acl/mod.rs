//! Legacy WAC (`.acl`) access-control strategy.
//!
//! Reads effective permissions from the resource's own ACL or, when it has
//! none, from the nearest ancestor's default rules. Writes never touch the
//! ancestor: a resource ACL is materialised from the inherited defaults and
//! saved instead.

mod fallback;

use std::sync::Arc;

use crate::access::{AccessModes, Agent, PermissionEntry, Provenance, Scope};
use crate::error::AclError;
use crate::store::{AclDocument, Dataset, ResourceInfo, ResourceStore};

pub use fallback::{acl_from_fallback, find_fallback_acl, load_state, AclState};

/// Result of a successful ACL save.
#[derive(Debug, Clone)]
pub struct AclSaveOutcome {
    /// The ACL as stored by the server.
    pub acl: AclDocument,
    /// Resource contents re-read after the save.
    pub dataset: Dataset,
}

/// WAC strategy bound to one resource.
#[derive(Clone)]
pub struct AclStrategy {
    store: Arc<dyn ResourceStore>,
    resource: ResourceInfo,
}

impl AclStrategy {
    pub fn new(store: Arc<dyn ResourceStore>, resource: ResourceInfo) -> Self {
        Self { store, resource }
    }

    pub fn resource(&self) -> &ResourceInfo {
        &self.resource
    }

    /// Current ACL state of the resource.
    pub async fn state(&self) -> Result<AclState, AclError> {
        load_state(self.store.as_ref(), &self.resource).await
    }

    /// Effective per-agent permissions.
    ///
    /// Resource ACL entries have resource scope; entries read from a fallback
    /// ACL have default scope and carry the modes exactly as stored.
    pub async fn get_permissions(&self) -> Result<Vec<PermissionEntry>, AclError> {
        let state = self.state().await?;
        tracing::debug!(resource = %self.resource.iri, state = state.name(), "reading ACL permissions");

        let (access, scope) = match &state {
            AclState::HasResourceAcl(acl) => (acl.agent_resource_access(&self.resource.iri), Scope::Resource),
            AclState::HasFallbackAcl { fallback, .. } => {
                (fallback.agent_default_access(&fallback.access_to), Scope::Default)
            }
            AclState::NoAcl | AclState::HasAccessibleAcl { .. } => return Err(AclError::UnableToAccessAcl),
        };

        Ok(access
            .into_iter()
            .filter(|(_, modes)| !modes.is_empty())
            .map(|(agent, modes)| PermissionEntry::new(agent, modes, scope, Provenance::Acl))
            .collect())
    }

    /// Set `agent`'s modes on the resource (and, for containers, its
    /// members), persist, then re-read the resource.
    pub async fn save_permissions_for_agent(
        &self,
        agent: &Agent,
        modes: AccessModes,
    ) -> Result<AclSaveOutcome, AclError> {
        let mut acl = match self.state().await? {
            AclState::HasResourceAcl(acl) => acl,
            AclState::HasFallbackAcl { acl_iri, fallback } => {
                tracing::debug!(
                    resource = %self.resource.iri,
                    fallback = %fallback.iri,
                    "creating resource ACL from inherited defaults"
                );
                acl_from_fallback(&fallback, &self.resource, &acl_iri)
            }
            AclState::HasAccessibleAcl { .. } => return Err(AclError::UnableToAccessDefaultAcl),
            AclState::NoAcl => return Err(AclError::UnableToAccessAcl),
        };

        acl.set_agent_resource_access(&self.resource.iri, agent, modes);
        if self.resource.is_container {
            acl.set_agent_default_access(&self.resource.iri, agent, modes);
        }

        // Never save an ACL without rules.
        if acl.is_empty() {
            return Err(AclError::AclDatasetEmpty);
        }

        let saved = self
            .store
            .save_acl(acl)
            .await?
            .ok_or(AclError::UpdatedAclEmpty)?;

        let dataset = self
            .store
            .get_dataset(&self.resource.iri)
            .await?
            .ok_or(AclError::ResponseEmpty)?;
        if dataset.is_empty() {
            return Err(AclError::DatasetEmpty);
        }

        tracing::info!(
            resource = %self.resource.iri,
            agent = %agent,
            modes = %modes,
            "saved ACL permissions"
        );

        Ok(AclSaveOutcome {
            acl: saved,
            dataset,
        })
    }
}

//! Consent adapter: access grants as permission entries.
//!
//! Grants are fetched from a [`GrantSource`], checked by a [`GrantVerifier`]
//! and normalized into consent-provenance entries. Failed verification hides
//! a grant; it never fails the listing.

mod credential;

pub use credential::*;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use futures::future::join_all;
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::access::{PermissionEntry, Scope};
use crate::config::ConsentConfig;
use crate::error::ConsentError;
use crate::store::parent_container;

/// Verifies the signature and status of a credential.
#[async_trait]
pub trait GrantVerifier: Send + Sync {
    async fn is_valid_consent_grant(&self, credential: &SignedCredential) -> Result<bool, ConsentError>;
}

/// Lists the credentials issued for a resource.
#[async_trait]
pub trait GrantSource: Send + Sync {
    async fn grants_for_resource(&self, resource_iri: &str) -> Result<Vec<SignedCredential>, ConsentError>;
}

/// In-process grant source.
///
/// Returns credentials naming the resource or one of its ancestor containers.
#[derive(Default)]
pub struct StaticGrantSource {
    credentials: RwLock<Vec<SignedCredential>>,
    failure: RwLock<Option<String>>,
}

impl StaticGrantSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_credentials(credentials: Vec<SignedCredential>) -> Self {
        let source = Self::new();
        *source.credentials.write() = credentials;
        source
    }

    pub fn push(&self, credential: SignedCredential) {
        self.credentials.write().push(credential);
    }

    /// Make every lookup fail with `message` until cleared with `None`.
    pub fn set_failure(&self, message: Option<String>) {
        *self.failure.write() = message;
    }
}

#[async_trait]
impl GrantSource for StaticGrantSource {
    async fn grants_for_resource(&self, resource_iri: &str) -> Result<Vec<SignedCredential>, ConsentError> {
        if let Some(message) = self.failure.read().clone() {
            return Err(ConsentError::Source(message));
        }
        Ok(self
            .credentials
            .read()
            .iter()
            .filter(|c| grant_scope(c, resource_iri).is_some())
            .cloned()
            .collect())
    }
}

/// Scope at which `credential` reaches `resource_iri`, if at all.
///
/// A direct grant has resource scope. A grant on an ancestor container that
/// inherits has default scope.
pub fn grant_scope(credential: &SignedCredential, resource_iri: &str) -> Option<Scope> {
    if credential.resources().any(|r| r == resource_iri) {
        return Some(Scope::Resource);
    }
    if !credential.inherits() {
        return None;
    }
    let mut current = parent_container(resource_iri);
    while let Some(container) = current {
        if credential.resources().any(|r| *r == container) {
            return Some(Scope::Default);
        }
        current = parent_container(&container);
    }
    None
}

/// Produces the consent entries of a resource.
#[derive(Clone)]
pub struct ConsentAdapter {
    source: Arc<dyn GrantSource>,
    verifier: Arc<dyn GrantVerifier>,
    config: ConsentConfig,
}

impl ConsentAdapter {
    pub fn new(source: Arc<dyn GrantSource>, verifier: Arc<dyn GrantVerifier>, config: ConsentConfig) -> Self {
        Self {
            source,
            verifier,
            config,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Entries for the currently valid grants on `resource_iri`.
    ///
    /// Requests, denials, expired grants and grants that fail verification
    /// are left out. Only a failing source is an error.
    pub async fn active_entries(&self, resource_iri: &str) -> Result<Vec<PermissionEntry>, ConsentError> {
        if !self.config.enabled {
            return Ok(Vec::new());
        }

        let now = Utc::now();
        let candidates: Vec<(SignedCredential, PermissionEntry)> = self
            .source
            .grants_for_resource(resource_iri)
            .await?
            .into_iter()
            .filter(|c| c.kind() == Some(CredentialKind::Grant))
            .filter(|c| {
                if c.is_denied() {
                    debug!(credential = %c.id, "skipping denied grant");
                    return false;
                }
                if self.config.check_expiration && c.is_expired_at(now) {
                    debug!(credential = %c.id, "skipping expired grant");
                    return false;
                }
                true
            })
            .filter_map(|c| {
                let scope = grant_scope(&c, resource_iri)?;
                match normalize_grant(&c) {
                    Ok(mut entry) => {
                        entry.scope = scope;
                        Some((c, entry))
                    }
                    Err(e) => {
                        warn!(credential = %c.id, error = %e, "ignoring malformed grant");
                        None
                    }
                }
            })
            .collect();

        let checks = candidates
            .iter()
            .map(|(credential, _)| self.verifier.is_valid_consent_grant(credential));
        let verdicts = join_all(checks).await;

        let entries = candidates
            .into_iter()
            .zip(verdicts)
            .filter_map(|((credential, entry), verdict)| match verdict {
                Ok(true) => Some(entry),
                Ok(false) => {
                    debug!(credential = %credential.id, "grant failed verification");
                    None
                }
                Err(e) => {
                    warn!(credential = %credential.id, error = %e, "grant verification errored");
                    None
                }
            })
            .filter(|entry| !entry.modes.is_empty())
            .collect();

        Ok(entries)
    }
}

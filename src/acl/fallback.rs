//! Discovery of the ACL that governs a resource.

use crate::error::AclError;
use crate::store::{parent_container, AclDocument, ResourceInfo, ResourceStore};

/// Where a resource's effective ACL comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AclState {
    /// The server exposes no ACL to this client.
    NoAcl,
    /// An ACL link exists, but neither the resource ACL nor any ancestor ACL
    /// could be read.
    HasAccessibleAcl { acl_iri: String },
    /// The resource has its own ACL.
    HasResourceAcl(AclDocument),
    /// The resource inherits from the nearest ancestor's ACL.
    HasFallbackAcl {
        acl_iri: String,
        fallback: AclDocument,
    },
}

impl AclState {
    pub fn name(&self) -> &'static str {
        match self {
            AclState::NoAcl => "NoAcl",
            AclState::HasAccessibleAcl { .. } => "HasAccessibleAcl",
            AclState::HasResourceAcl(_) => "HasResourceAcl",
            AclState::HasFallbackAcl { .. } => "HasFallbackAcl",
        }
    }
}

/// Determine the ACL state of `resource`.
pub async fn load_state(store: &dyn ResourceStore, resource: &ResourceInfo) -> Result<AclState, AclError> {
    let Some(acl_iri) = resource.acl_url() else {
        return Ok(AclState::NoAcl);
    };

    if let Some(acl) = store.get_acl(acl_iri).await? {
        return Ok(AclState::HasResourceAcl(acl));
    }

    match find_fallback_acl(store, &resource.iri).await? {
        Some(fallback) => Ok(AclState::HasFallbackAcl {
            acl_iri: acl_iri.to_string(),
            fallback,
        }),
        None => Ok(AclState::HasAccessibleAcl {
            acl_iri: acl_iri.to_string(),
        }),
    }
}

/// Walk up the container hierarchy from `resource_iri` and return the first
/// ancestor ACL that exists.
///
/// An ancestor that is not found is skipped; an ancestor the client may not
/// read ends the walk, since nothing above it can be inspected either.
pub async fn find_fallback_acl(
    store: &dyn ResourceStore,
    resource_iri: &str,
) -> Result<Option<AclDocument>, AclError> {
    let mut current = parent_container(resource_iri);

    while let Some(container) = current {
        tracing::debug!(container = %container, "looking for fallback ACL");

        let info = match store.get_resource_info(&container).await {
            Ok(info) => info,
            Err(e) if e.is_not_found() => {
                current = parent_container(&container);
                continue;
            }
            Err(e) if e.is_forbidden() => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let Some(acl_iri) = info.acl_url() else {
            return Ok(None);
        };

        match store.get_acl(acl_iri).await {
            Ok(Some(acl)) => return Ok(Some(acl)),
            Ok(None) => {}
            Err(e) if e.is_forbidden() => return Ok(None),
            Err(e) => return Err(e.into()),
        }

        current = parent_container(&container);
    }

    Ok(None)
}

/// Build a fresh resource ACL from the inherited defaults of `fallback`.
///
/// `fallback` is only read; the result is a new document at `acl_iri`.
pub fn acl_from_fallback(fallback: &AclDocument, resource: &ResourceInfo, acl_iri: &str) -> AclDocument {
    let mut acl = AclDocument::new(acl_iri, resource.iri.clone());

    for (index, rule) in fallback
        .rules
        .iter()
        .filter(|r| r.default.as_deref() == Some(fallback.access_to.as_str()))
        .enumerate()
    {
        let mut copy = rule.clone();
        copy.iri = format!("{}#inherited-{}", acl_iri, index);
        copy.access_to = Some(resource.iri.clone());
        copy.default = resource.is_container.then(|| resource.iri.clone());
        acl.rules.push(copy);
    }

    acl
}

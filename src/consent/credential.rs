//! Signed access-request / access-grant credentials.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::access::{AccessModes, Agent, CredentialRef, PermissionEntry, Provenance, Scope};
use crate::error::ConsentError;

/// A value that may be given as a single item or a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        match self {
            OneOrMany::One(item) => std::slice::from_ref(item).iter(),
            OneOrMany::Many(items) => items.iter(),
        }
    }
}

impl<T> Default for OneOrMany<T> {
    fn default() -> Self {
        OneOrMany::Many(Vec::new())
    }
}

/// Consent statement of a grant or request.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Consent {
    #[serde(default)]
    pub mode: OneOrMany<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_status: Option<String>,
    #[serde(default)]
    pub for_personal_data: OneOrMany<String>,
    #[serde(default)]
    pub for_purpose: OneOrMany<String>,
    /// Grantee of a grant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_provided_to: Option<String>,
    /// Data owner addressed by a request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_consent_for_data_subject: Option<String>,
    /// Whether the grant extends to members of a granted container.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inherit: Option<bool>,
}

/// Credential subject: grants carry `providedConsent`, requests `hasConsent`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialSubject {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provided_consent: Option<Consent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_consent: Option<Consent>,
}

/// A verifiable credential granting or requesting access.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedCredential {
    pub id: String,
    #[serde(default, rename = "type")]
    pub types: OneOrMany<String>,
    pub issuer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuance_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration_date: Option<DateTime<Utc>>,
    pub credential_subject: CredentialSubject,
    /// Signature block, passed through to the verifier untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proof: Option<serde_json::Value>,
}

/// Whether a credential grants or requests access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialKind {
    Grant,
    Request,
}

impl SignedCredential {
    /// Parse a credential from its JSON form.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn kind(&self) -> Option<CredentialKind> {
        let subject = &self.credential_subject;
        if subject.provided_consent.is_some() {
            Some(CredentialKind::Grant)
        } else if subject.has_consent.is_some() {
            Some(CredentialKind::Request)
        } else {
            None
        }
    }

    pub fn consent(&self) -> Option<&Consent> {
        let subject = &self.credential_subject;
        subject
            .provided_consent
            .as_ref()
            .or(subject.has_consent.as_ref())
    }

    /// Agent the access is for: the grantee of a grant, the requester of a request.
    pub fn grantee(&self) -> Option<&str> {
        match self.kind()? {
            CredentialKind::Grant => self.consent()?.is_provided_to.as_deref(),
            CredentialKind::Request => Some(self.credential_subject.id.as_str()),
        }
    }

    /// A denial credential records refused or revoked consent.
    pub fn is_denied(&self) -> bool {
        self.consent()
            .and_then(|c| c.has_status.as_deref())
            .map(|status| status.contains("Denied") || status.contains("Refused"))
            .unwrap_or(false)
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiration_date.map(|exp| exp <= now).unwrap_or(false)
    }

    pub fn resources(&self) -> impl Iterator<Item = &String> {
        self.consent()
            .into_iter()
            .flat_map(|c| c.for_personal_data.iter())
    }

    pub fn inherits(&self) -> bool {
        self.consent().and_then(|c| c.inherit).unwrap_or(true)
    }
}

/// Map a credential onto a consent-provenance permission entry.
///
/// Modes come from the credential's mode vocabulary by substring
/// (`Read`, `Write`, `Append`, `Control`). The entry has resource scope;
/// callers adjust it when the grant reaches the resource by inheritance.
pub fn normalize_grant(credential: &SignedCredential) -> Result<PermissionEntry, ConsentError> {
    let consent = credential
        .consent()
        .ok_or_else(|| ConsentError::MissingConsent(credential.id.clone()))?;
    let grantee = credential
        .grantee()
        .filter(|g| !g.is_empty())
        .ok_or_else(|| ConsentError::MissingGrantee(credential.id.clone()))?;

    let modes = AccessModes::from_vocabulary(consent.mode.iter());
    let reference = CredentialRef {
        id: credential.id.clone(),
        issuer: credential.issuer.clone(),
        purposes: consent.for_purpose.iter().cloned().collect(),
    };

    Ok(
        PermissionEntry::new(Agent::from_iri(grantee), modes, Scope::Resource, Provenance::Consent)
            .with_credential(reference),
    )
}

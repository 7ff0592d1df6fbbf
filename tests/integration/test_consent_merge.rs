//! Access grants merged into ACL listings.

use std::sync::Arc;

use async_trait::async_trait;

use pod_access::access::{AccessModes, Agent, Provenance};
use pod_access::config::{Config, ConsentConfig};
use pod_access::consent::{ConsentAdapter, GrantVerifier, SignedCredential, StaticGrantSource};
use pod_access::error::{AccessError, ConsentError};
use pod_access::facade::{PermissionChange, PermissionsFacade};
use pod_access::profile::MemoryProfileFetcher;
use pod_access::store::{acl_sidecar, AclDocument, AclRule, Dataset, MemoryResourceStore, ResourceInfo, REL_ACL};

const DOC: &str = "https://pod.example/notes/doc";
const BOB: &str = "https://bob.example/card#me";
const CAROL: &str = "https://carol.example/card#me";

fn credential(id: &str, grantee: &str) -> SignedCredential {
    let json = format!(
        r#"{{
            "id": "{id}",
            "type": ["VerifiableCredential", "SolidAccessGrant"],
            "issuer": "https://vc.example",
            "issuanceDate": "2026-01-01T00:00:00Z",
            "credentialSubject": {{
                "id": "https://owner.example/card#me",
                "providedConsent": {{
                    "mode": ["http://www.w3.org/ns/auth/acl#Read"],
                    "hasStatus": "https://w3id.org/GConsent#ConsentStatusExplicitlyGiven",
                    "forPersonalData": ["{DOC}"],
                    "isProvidedTo": "{grantee}"
                }}
            }}
        }}"#
    );
    SignedCredential::from_json(&json).unwrap()
}

/// Accepts every credential except the ones it was built with.
struct RejectIds(Vec<&'static str>);

#[async_trait]
impl GrantVerifier for RejectIds {
    async fn is_valid_consent_grant(&self, credential: &SignedCredential) -> Result<bool, ConsentError> {
        Ok(!self.0.iter().any(|id| *id == credential.id))
    }
}

fn acl_store() -> Arc<MemoryResourceStore> {
    let store = Arc::new(MemoryResourceStore::new());
    store.put_resource(
        ResourceInfo::new(DOC).with_link(REL_ACL, acl_sidecar(DOC)),
        Some(Dataset::new(DOC).with_statement(DOC, "http://purl.org/dc/terms/title", "Doc")),
    );
    let mut acl = AclDocument::new(acl_sidecar(DOC), DOC);
    acl.rules.push(AclRule {
        iri: format!("{}#owner", acl_sidecar(DOC)),
        agents: vec![Agent::web_id("https://owner.example/card#me")],
        modes: AccessModes::CONTROL,
        access_to: Some(DOC.to_string()),
        default: None,
    });
    store.put_acl(acl);
    store
}

fn facade(source: Arc<StaticGrantSource>) -> PermissionsFacade {
    let adapter = ConsentAdapter::new(source, Arc::new(RejectIds(vec!["vc-carol"])), ConsentConfig::default());
    PermissionsFacade::new(acl_store(), Arc::new(MemoryProfileFetcher::new()), &Config::default())
        .with_consent(adapter)
}

#[tokio::test]
async fn test_only_valid_grants_are_listed() {
    let source = Arc::new(StaticGrantSource::with_credentials(vec![
        credential("vc-bob", BOB),
        credential("vc-carol", CAROL),
    ]));
    let facade = facade(source);

    let permissions = facade.get_all_permissions(DOC).await.unwrap();

    assert!(permissions.iter().all(|p| p.entry.agent != Agent::web_id(CAROL)));
    let bob = permissions
        .iter()
        .find(|p| p.entry.agent == Agent::web_id(BOB))
        .unwrap();
    assert_eq!(bob.entry.provenance, Provenance::Consent);
    assert_eq!(bob.entry.modes, AccessModes::READ);
    assert_eq!(bob.entry.credentials[0].id, "vc-bob");
    assert!(!bob.is_mutable());

    let err = facade
        .mutate(DOC, &bob.entry, PermissionChange::Modes(AccessModes::NONE))
        .await
        .unwrap_err();
    assert!(matches!(err, AccessError::UnsupportedMutation(_)));
}

#[tokio::test]
async fn test_grant_source_failure_degrades_listing() {
    let source = Arc::new(StaticGrantSource::with_credentials(vec![credential("vc-bob", BOB)]));
    source.set_failure(Some("vc service unavailable".into()));

    let permissions = facade(source).get_all_permissions(DOC).await.unwrap();

    assert_eq!(permissions.len(), 1);
    assert_eq!(permissions[0].entry.provenance, Provenance::Acl);
}

#[tokio::test]
async fn test_grant_and_acl_entries_stay_separate() {
    let source = Arc::new(StaticGrantSource::with_credentials(vec![credential(
        "vc-owner",
        "https://owner.example/card#me",
    )]));

    let permissions = facade(source).get_all_permissions(DOC).await.unwrap();

    assert_eq!(permissions.len(), 2);
    assert!(permissions.iter().any(|p| p.entry.provenance == Provenance::Acl));
    assert!(permissions.iter().any(|p| p.entry.provenance == Provenance::Consent));
}

#[tokio::test]
async fn test_grants_to_one_agent_share_one_row() {
    let source = Arc::new(StaticGrantSource::with_credentials(vec![
        credential("vc-bob-1", BOB),
        credential("vc-bob-2", BOB),
    ]));

    let permissions = facade(source).get_all_permissions(DOC).await.unwrap();

    let rows: Vec<_> = permissions
        .iter()
        .filter(|p| p.entry.agent == Agent::web_id(BOB))
        .collect();
    assert_eq!(rows.len(), 1);
    let ids: Vec<&str> = rows[0].entry.credentials.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec!["vc-bob-1", "vc-bob-2"]);
}

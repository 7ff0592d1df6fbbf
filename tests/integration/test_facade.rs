//! Facade behaviour shared by both strategies.

use std::sync::Arc;

use pod_access::access::{AccessModes, Agent};
use pod_access::config::Config;
use pod_access::error::{AccessError, ResolutionError, StoreError};
use pod_access::facade::PermissionsFacade;
use pod_access::profile::{MemoryProfileFetcher, Profile};
use pod_access::store::{acl_sidecar, AclDocument, AclRule, MemoryResourceStore, ResourceInfo, REL_ACL};

const DOC: &str = "https://pod.example/doc";
const AMY: &str = "https://amy.example/card#me";
const BOB: &str = "https://bob.example/card#me";
const ZED: &str = "https://zed.example/card#me";

fn store_with(agents: Vec<Agent>) -> Arc<MemoryResourceStore> {
    let store = Arc::new(MemoryResourceStore::new());
    store.put_resource(ResourceInfo::new(DOC).with_link(REL_ACL, acl_sidecar(DOC)), None);
    let mut acl = AclDocument::new(acl_sidecar(DOC), DOC);
    acl.rules.push(AclRule {
        iri: format!("{}#readers", acl_sidecar(DOC)),
        agents,
        modes: AccessModes::READ,
        access_to: Some(DOC.to_string()),
        default: None,
    });
    store.put_acl(acl);
    store
}

#[tokio::test]
async fn test_listing_order_and_profile_failures() {
    let store = store_with(vec![
        Agent::web_id(ZED),
        Agent::web_id(BOB),
        Agent::Authenticated,
        Agent::web_id(AMY),
        Agent::Public,
    ]);
    let profiles = MemoryProfileFetcher::new();
    profiles.insert(Profile::new(AMY).with_name("Amy"));
    profiles.insert(Profile::new(ZED).with_name("Zed"));
    profiles.fail_on(BOB);
    let profiles = Arc::new(profiles);

    let facade = PermissionsFacade::new(store, profiles.clone(), &Config::default());
    let permissions = facade.get_all_permissions(DOC).await.unwrap();

    let names: Vec<&str> = permissions.iter().map(|p| p.display_name.as_str()).collect();
    assert_eq!(names, vec!["Anyone", "Anyone signed in", "Amy", BOB, "Zed"]);
    assert!(permissions[3].profile.is_none());
    // Pseudo-agents are never looked up.
    assert_eq!(profiles.fetch_count(), 3);
}

#[tokio::test]
async fn test_resolution_errors_surface() {
    let store = Arc::new(MemoryResourceStore::new());
    store.put_resource(ResourceInfo::new(DOC), None);
    store.put_resource(ResourceInfo::new("https://pod.example/down"), None);
    store.fail_on("https://pod.example/down", StoreError::status_code("503", "unavailable"));

    let facade = PermissionsFacade::new(store, Arc::new(MemoryProfileFetcher::new()), &Config::default());

    let err = facade.get_all_permissions(DOC).await.unwrap_err();
    assert!(matches!(err, AccessError::Resolution(ResolutionError::NoAccessPolicy(_))));

    let err = facade
        .get_all_permissions("https://pod.example/down")
        .await
        .unwrap_err();
    assert!(matches!(err, AccessError::Resolution(ResolutionError::Network(_))));
    assert_eq!(err.status(), Some("503"));
}

#[tokio::test]
async fn test_disabled_cache_rereads() {
    let store = store_with(vec![Agent::Public]);
    let mut config = Config::default();
    config.cache.enabled = false;

    let facade = PermissionsFacade::new(store.clone(), Arc::new(MemoryProfileFetcher::new()), &config);
    facade.get_all_permissions(DOC).await.unwrap();
    facade.get_all_permissions(DOC).await.unwrap();

    assert_eq!(store.resource_info_reads(), 2);
    assert!(!facade.cache().is_enabled());
}

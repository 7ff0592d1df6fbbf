//! WAC resources that inherit from a container ACL.

use std::sync::Arc;

use pod_access::access::{AccessModes, Agent, PermissionEntry, Provenance, Scope};
use pod_access::config::Config;
use pod_access::facade::{PermissionChange, PermissionsFacade};
use pod_access::profile::{MemoryProfileFetcher, Profile};
use pod_access::store::{acl_sidecar, AclDocument, AclRule, Dataset, MemoryResourceStore, ResourceInfo, REL_ACL};

const FOLDER: &str = "https://pod.example/notes/";
const DOC: &str = "https://pod.example/notes/doc";
const BOB: &str = "https://bob.example/card#me";

/// A container ACL whose default rules grant `grants`, and a document
/// without its own ACL.
fn setup(grants: Vec<(Agent, AccessModes)>) -> Arc<MemoryResourceStore> {
    let store = Arc::new(MemoryResourceStore::new());

    store.put_resource(
        ResourceInfo::new(FOLDER).with_link(REL_ACL, acl_sidecar(FOLDER)),
        Some(Dataset::new(FOLDER).with_statement(FOLDER, "http://www.w3.org/ns/ldp#contains", DOC)),
    );
    store.put_resource(
        ResourceInfo::new(DOC).with_link(REL_ACL, acl_sidecar(DOC)),
        Some(Dataset::new(DOC).with_statement(DOC, "http://purl.org/dc/terms/title", "Doc")),
    );

    let mut acl = AclDocument::new(acl_sidecar(FOLDER), FOLDER);
    for (index, (agent, modes)) in grants.into_iter().enumerate() {
        acl.rules.push(AclRule {
            iri: format!("{}#rule{}", acl_sidecar(FOLDER), index),
            agents: vec![agent],
            modes,
            access_to: Some(FOLDER.to_string()),
            default: Some(FOLDER.to_string()),
        });
    }
    store.put_acl(acl);
    store
}

fn facade(store: Arc<MemoryResourceStore>) -> PermissionsFacade {
    let profiles = MemoryProfileFetcher::new();
    profiles.insert(Profile::new(BOB).with_name("Bob"));
    PermissionsFacade::new(store, Arc::new(profiles), &Config::default())
}

#[tokio::test]
async fn test_public_fallback_is_listed_first() {
    let store = setup(vec![(Agent::Public, AccessModes::READ)]);

    let permissions = facade(store).get_all_permissions(DOC).await.unwrap();

    assert_eq!(permissions.len(), 1);
    assert_eq!(permissions[0].entry.agent, Agent::Public);
    assert_eq!(permissions[0].entry.scope, Scope::Default);
    assert_eq!(permissions[0].display_name, "Anyone");
}

#[tokio::test]
async fn test_fallback_modes_are_reported_as_stored() {
    let read_write = AccessModes::new(true, true, false, false);
    let store = setup(vec![(Agent::web_id(BOB), read_write)]);

    let permissions = facade(store).get_all_permissions(DOC).await.unwrap();

    assert_eq!(permissions.len(), 1);
    let entry = &permissions[0].entry;
    assert_eq!(entry.agent, Agent::web_id(BOB));
    assert_eq!(entry.scope, Scope::Default);
    assert_eq!(entry.modes, read_write);
    assert_eq!(entry.alias(), "Custom");
    assert_eq!(permissions[0].display_name, "Bob");
}

#[tokio::test]
async fn test_edit_creates_resource_acl_and_keeps_fallback() {
    let store = setup(vec![(Agent::Public, AccessModes::READ)]);
    let fallback_before = store.acl(&acl_sidecar(FOLDER)).unwrap();
    let facade = facade(store.clone());

    let bob = PermissionEntry::new(Agent::web_id(BOB), AccessModes::NONE, Scope::Resource, Provenance::Acl);
    facade
        .mutate(DOC, &bob, PermissionChange::Modes(AccessModes::EDIT))
        .await
        .unwrap();

    assert_eq!(store.acl(&acl_sidecar(FOLDER)).unwrap(), fallback_before);
    assert!(store.acl(&acl_sidecar(DOC)).is_some());

    let permissions = facade.get_all_permissions(DOC).await.unwrap();
    assert_eq!(permissions.len(), 2);
    assert_eq!(permissions[0].entry.agent, Agent::Public);
    assert_eq!(permissions[0].entry.scope, Scope::Resource);
    assert_eq!(permissions[1].entry.agent, Agent::web_id(BOB));
    assert_eq!(permissions[1].entry.modes, AccessModes::EDIT);
}

#[tokio::test]
async fn test_container_edit_refreshes_cached_members() {
    let store = setup(vec![(Agent::Public, AccessModes::READ)]);
    let facade = facade(store);

    let before = facade.get_all_permissions(DOC).await.unwrap();
    assert_eq!(before.len(), 1);

    let bob = PermissionEntry::new(Agent::web_id(BOB), AccessModes::NONE, Scope::Resource, Provenance::Acl);
    facade
        .mutate(FOLDER, &bob, PermissionChange::Modes(AccessModes::EDIT))
        .await
        .unwrap();

    let after = facade.get_all_permissions(DOC).await.unwrap();
    assert_eq!(after.len(), 2);
    assert_eq!(after[1].entry.agent, Agent::web_id(BOB));
    assert_eq!(after[1].entry.scope, Scope::Default);
    assert_eq!(after[1].entry.modes, AccessModes::EDIT);
}

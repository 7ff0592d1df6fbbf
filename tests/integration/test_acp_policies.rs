//! ACP policy buckets edited through the facade and the strategy.

use std::sync::Arc;
use std::time::Duration;

use pod_access::access::{AccessModes, Agent, PermissionEntry, Provenance, Scope};
use pod_access::acp::{AcpStrategy, PolicyStorage};
use pod_access::config::Config;
use pod_access::error::{AccessError, AcpError, StoreError};
use pod_access::facade::{PermissionChange, PermissionsFacade};
use pod_access::profile::MemoryProfileFetcher;
use pod_access::resolver::StrategyKind;
use pod_access::store::{Acr, MemoryResourceStore, ResourceInfo, WriteKind, REL_ACP_ACCESS_CONTROL};

const DOC: &str = "https://pod.example/notes/doc";
const ACR: &str = "https://pod.example/notes/doc.acr";
const ALICE: &str = "https://alice.example/card#me";

fn info(iri: &str, acr: &str) -> ResourceInfo {
    ResourceInfo::new(iri).with_link(REL_ACP_ACCESS_CONTROL, acr)
}

fn setup(store: MemoryResourceStore) -> (Arc<MemoryResourceStore>, AcpStrategy) {
    let store = Arc::new(store);
    store.put_resource(info(DOC, ACR), None);
    store.put_acr(Acr::new(ACR, DOC));
    let strategy = AcpStrategy::new(store.clone(), info(DOC, ACR), PolicyStorage::Inline).unwrap();
    (store, strategy)
}

fn facade(store: Arc<MemoryResourceStore>) -> PermissionsFacade {
    PermissionsFacade::new(store, Arc::new(MemoryProfileFetcher::new()), &Config::default())
}

fn acp_entry(agent: Agent) -> PermissionEntry {
    PermissionEntry::new(agent, AccessModes::NONE, Scope::Resource, Provenance::Acp)
}

#[tokio::test]
async fn test_editor_moved_to_viewers() {
    let (store, strategy) = setup(MemoryResourceStore::new());
    let alice = Agent::web_id(ALICE);
    strategy.add_agent_to_policy(&alice, "editors").await.unwrap();

    let session = facade(store).session(DOC).await.unwrap();
    assert_eq!(session.kind(), StrategyKind::Acp);
    session
        .mutate(&acp_entry(alice.clone()), PermissionChange::AddToPolicy("viewers".into()))
        .await
        .unwrap();

    let permissions = session.permissions().await.unwrap();
    let alice_entries: Vec<_> = permissions.iter().filter(|p| p.entry.agent == alice).collect();
    assert_eq!(alice_entries.len(), 1);
    assert_eq!(alice_entries[0].entry.policy_aliases, vec!["viewers"]);
    assert_eq!(alice_entries[0].entry.modes, AccessModes::READ);
    assert!(strategy.members("editors").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_batch_removal_is_serialized() {
    let (store, strategy) = setup(MemoryResourceStore::new().with_write_latency(Duration::from_millis(2)));
    for n in 0..4 {
        let agent = Agent::web_id(format!("https://agent{}.example/card#me", n));
        strategy.add_agent_to_policy(&agent, "viewers").await.unwrap();
    }
    let before = store.writes().len();

    strategy.remove_all_agents_from_policy("viewers").await.unwrap();

    let writes = store.writes();
    let removals = &writes[before..];
    assert_eq!(removals.len(), 4);
    assert!(removals.iter().all(|w| w.kind == WriteKind::Acr));
    for pair in removals.windows(2) {
        assert!(pair[1].started > pair[0].finished);
    }
    assert_eq!(store.max_concurrent_writes(), 1);
    assert!(strategy.members("viewers").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_modes_map_onto_policies() {
    let (store, strategy) = setup(MemoryResourceStore::new());
    let facade = facade(store);
    let alice = Agent::web_id(ALICE);

    facade
        .mutate(DOC, &acp_entry(alice.clone()), PermissionChange::Modes(AccessModes::APPEND))
        .await
        .unwrap();
    assert_eq!(strategy.members("addOnly").await.unwrap(), vec![alice.clone()]);

    facade
        .mutate(DOC, &acp_entry(alice.clone()), PermissionChange::Modes(AccessModes::EDIT))
        .await
        .unwrap();
    assert!(strategy.members("addOnly").await.unwrap().is_empty());
    assert_eq!(strategy.members("editors").await.unwrap(), vec![alice.clone()]);

    let err = facade
        .mutate(
            DOC,
            &acp_entry(alice.clone()),
            PermissionChange::Modes(AccessModes::new(true, true, false, false)),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AccessError::UnsupportedMutation(_)));

    facade
        .mutate(DOC, &acp_entry(alice.clone()), PermissionChange::Modes(AccessModes::NONE))
        .await
        .unwrap();
    let permissions = facade.get_all_permissions(DOC).await.unwrap();
    assert!(permissions.iter().all(|p| p.entry.agent != alice));
}

#[tokio::test]
async fn test_container_entries_are_deduplicated() {
    const FOLDER: &str = "https://pod.example/notes/";
    const FOLDER_ACR: &str = "https://pod.example/notes/.acr";

    let store = Arc::new(MemoryResourceStore::new());
    store.put_resource(info(FOLDER, FOLDER_ACR), None);
    store.put_acr(Acr::new(FOLDER_ACR, FOLDER));
    let strategy = AcpStrategy::new(store.clone(), info(FOLDER, FOLDER_ACR), PolicyStorage::Inline).unwrap();
    strategy.set_rule_public("viewers", true).await.unwrap();

    let acr = store.acr(FOLDER_ACR).unwrap();
    assert_eq!(acr.access_policies, acr.member_policies);

    let permissions = facade(store).get_all_permissions(FOLDER).await.unwrap();
    assert_eq!(permissions.len(), 1);
    assert_eq!(permissions[0].entry.agent, Agent::Public);
    assert_eq!(permissions[0].entry.scope, Scope::Resource);
}

#[tokio::test]
async fn test_external_policy_storage() {
    let mut config = Config::default();
    config.acp.policy_storage = pod_access::config::PolicyStorageMode::External;

    let store = Arc::new(MemoryResourceStore::new());
    store.put_resource(info(DOC, ACR), None);
    store.put_acr(Acr::new(ACR, DOC));
    let facade = PermissionsFacade::new(store.clone(), Arc::new(MemoryProfileFetcher::new()), &config);

    facade
        .mutate(DOC, &acp_entry(Agent::Authenticated), PermissionChange::AddToPolicy("viewers".into()))
        .await
        .unwrap();

    let doc = store
        .policy_document("https://pod.example/pb_policies/notes/doc.ttl")
        .unwrap();
    let rule = doc
        .graph
        .rule("https://pod.example/pb_policies/notes/doc.ttl#viewersRule")
        .unwrap();
    assert!(rule.authenticated);

    let permissions = facade.get_all_permissions(DOC).await.unwrap();
    assert_eq!(permissions.len(), 1);
    assert_eq!(permissions[0].display_name, "Anyone signed in");
}

#[tokio::test]
async fn test_failed_move_shows_on_next_read() {
    let (store, strategy) = setup(MemoryResourceStore::new());
    let alice = Agent::web_id(ALICE);
    strategy.add_agent_to_policy(&alice, "editors").await.unwrap();

    let facade = facade(store.clone());
    let before = facade.get_all_permissions(DOC).await.unwrap();
    assert_eq!(before[0].entry.policy_aliases, vec!["editors"]);

    // The leave lands, the join does not.
    store.fail_writes_after(1, StoreError::status_code("500", "boom"));
    let err = facade
        .mutate(DOC, &acp_entry(alice.clone()), PermissionChange::AddToPolicy("viewers".into()))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AccessError::Acp(AcpError::PartialBatch { completed: 1, total: 2, .. })
    ));
    store.clear_write_failure();

    let after = facade.get_all_permissions(DOC).await.unwrap();
    assert!(after.iter().all(|p| p.entry.agent != alice));
}

#[tokio::test]
async fn test_named_and_custom_policy_share_one_row() {
    let (store, strategy) = setup(MemoryResourceStore::new());
    let alice = Agent::web_id(ALICE);
    strategy.add_agent_to_policy(&alice, "editors").await.unwrap();
    strategy.add_agent_to_policy(&alice, "addOnly").await.unwrap();

    let permissions = facade(store).get_all_permissions(DOC).await.unwrap();
    assert_eq!(permissions.len(), 1);
    assert_eq!(permissions[0].entry.policy_aliases, vec!["editors", "addOnly"]);
    assert_eq!(permissions[0].entry.modes, AccessModes::EDIT);
}

#[tokio::test]
async fn test_pseudo_agents_are_routed_to_rule_flags() {
    let (store, strategy) = setup(MemoryResourceStore::new());
    let facade = facade(store);

    facade
        .mutate(DOC, &acp_entry(Agent::Public), PermissionChange::Modes(AccessModes::READ))
        .await
        .unwrap();
    assert_eq!(strategy.members("viewers").await.unwrap(), vec![Agent::Public]);

    facade
        .mutate(DOC, &acp_entry(Agent::Public), PermissionChange::RemoveFromPolicy("viewers".into()))
        .await
        .unwrap();
    assert!(strategy.members("viewers").await.unwrap().is_empty());

    let err = strategy
        .add_agent_to_policy(&Agent::Public, "viewers")
        .await
        .unwrap_err();
    assert!(matches!(err, AcpError::PseudoAgent(_)));
}

#[tokio::test]
async fn test_acl_entry_is_not_routed_to_policies() {
    let (store, _) = setup(MemoryResourceStore::new());
    let facade = facade(store.clone());
    let acl_entry = PermissionEntry::new(Agent::web_id(ALICE), AccessModes::NONE, Scope::Resource, Provenance::Acl);

    let err = facade
        .mutate(DOC, &acl_entry, PermissionChange::AddToPolicy("viewers".into()))
        .await
        .unwrap_err();
    assert!(matches!(err, AccessError::UnsupportedMutation(_)));
    assert!(store.writes().is_empty());
}

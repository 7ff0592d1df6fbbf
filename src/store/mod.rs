//! Resource store client interface.
//!
//! The pod's Linked-Data HTTP client is consumed through [`ResourceStore`].
//! Documents are exposed as already-parsed values; RDF parsing happens on
//! the far side of the trait.

mod memory;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::access::{AccessModes, Agent};
use crate::error::StoreError;

pub use memory::{MemoryResourceStore, WriteKind, WriteRecord};

/// Link relation pointing at a resource's ACL (or, on ACP servers, its ACR).
pub const REL_ACL: &str = "acl";
/// Link relation that only ACP servers advertise.
pub const REL_ACP_ACCESS_CONTROL: &str = "http://www.w3.org/ns/solid/acp#accessControl";
/// Link relation naming the pod root.
pub const REL_STORAGE: &str = "http://www.w3.org/ns/pim/space#storage";

/// Result type for store calls.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Metadata of a fetched resource.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResourceInfo {
    pub iri: String,
    pub is_container: bool,
    /// Link header relations, keyed by `rel`.
    #[serde(default)]
    pub links: BTreeMap<String, Vec<String>>,
}

impl ResourceInfo {
    pub fn new(iri: impl Into<String>) -> Self {
        let iri = iri.into();
        let is_container = iri.ends_with('/');
        Self {
            iri,
            is_container,
            links: BTreeMap::new(),
        }
    }

    /// Add a link relation.
    pub fn with_link(mut self, rel: impl Into<String>, target: impl Into<String>) -> Self {
        self.links.entry(rel.into()).or_default().push(target.into());
        self
    }

    pub fn link(&self, rel: &str) -> Option<&str> {
        self.links
            .get(rel)
            .and_then(|targets| targets.first())
            .map(String::as_str)
    }

    /// `hasLinkedAcr`: the server advertises an ACP access-control resource.
    pub fn has_linked_access_control_resource(&self) -> bool {
        self.link(REL_ACP_ACCESS_CONTROL).is_some()
    }

    /// `hasAccessibleAcl`: the server exposes an ACL link to this client.
    pub fn is_access_controlled(&self) -> bool {
        self.link(REL_ACL).is_some()
    }

    pub fn acl_url(&self) -> Option<&str> {
        self.link(REL_ACL)
    }

    /// IRI of the linked ACR. ACP servers may only send `rel="acl"`.
    pub fn acr_url(&self) -> Option<&str> {
        self.link(REL_ACP_ACCESS_CONTROL).or_else(|| self.link(REL_ACL))
    }

    /// Storage root from the link headers, if advertised.
    pub fn storage_root(&self) -> Option<&str> {
        self.link(REL_STORAGE)
    }
}

/// A single RDF statement, kept opaque.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statement {
    pub subject: String,
    pub predicate: String,
    pub object: String,
}

/// Snapshot of a resource's contents.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Dataset {
    pub iri: String,
    #[serde(default)]
    pub statements: Vec<Statement>,
}

impl Dataset {
    pub fn new(iri: impl Into<String>) -> Self {
        Self {
            iri: iri.into(),
            statements: Vec::new(),
        }
    }

    pub fn with_statement(
        mut self,
        subject: impl Into<String>,
        predicate: impl Into<String>,
        object: impl Into<String>,
    ) -> Self {
        self.statements.push(Statement {
            subject: subject.into(),
            predicate: predicate.into(),
            object: object.into(),
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }
}

/// One authorization rule of a WAC document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AclRule {
    /// Rule IRI (usually a fragment of the ACL document).
    pub iri: String,
    pub agents: Vec<Agent>,
    pub modes: AccessModes,
    /// `acl:accessTo` target.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_to: Option<String>,
    /// `acl:default` target (container whose members inherit the rule).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
}

/// A WAC `.acl` document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AclDocument {
    pub iri: String,
    /// Resource the document governs.
    pub access_to: String,
    #[serde(default)]
    pub rules: Vec<AclRule>,
}

impl AclDocument {
    pub fn new(iri: impl Into<String>, access_to: impl Into<String>) -> Self {
        Self {
            iri: iri.into(),
            access_to: access_to.into(),
            rules: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Per-agent modes granted directly on `resource`.
    pub fn agent_resource_access(&self, resource: &str) -> Vec<(Agent, AccessModes)> {
        collect_agent_modes(
            self.rules
                .iter()
                .filter(|r| r.access_to.as_deref() == Some(resource)),
        )
    }

    /// Per-agent modes inherited by members of `container`.
    pub fn agent_default_access(&self, container: &str) -> Vec<(Agent, AccessModes)> {
        collect_agent_modes(
            self.rules
                .iter()
                .filter(|r| r.default.as_deref() == Some(container)),
        )
    }

    /// Replace `agent`'s resource access on `resource` with `modes`.
    pub fn set_agent_resource_access(&mut self, resource: &str, agent: &Agent, modes: AccessModes) {
        self.set_agent_access(agent, modes, RuleTarget::AccessTo(resource));
    }

    /// Replace `agent`'s default access on `container` with `modes`.
    pub fn set_agent_default_access(&mut self, container: &str, agent: &Agent, modes: AccessModes) {
        self.set_agent_access(agent, modes, RuleTarget::Default(container));
    }

    fn set_agent_access(&mut self, agent: &Agent, modes: AccessModes, target: RuleTarget<'_>) {
        let base = self.rules.len();
        let mut split = Vec::new();
        for rule in &mut self.rules {
            if !target.matches(rule) || !rule.agents.contains(agent) {
                continue;
            }
            rule.agents.retain(|a| a != agent);
            // The rule may still carry the other target; keep that half for the agent.
            let mut remainder = rule.clone();
            remainder.agents = vec![agent.clone()];
            target.clear(&mut remainder);
            if remainder.access_to.is_some() || remainder.default.is_some() {
                remainder.iri = format!("{}-{}", rule.iri, base + split.len());
                split.push(remainder);
            }
        }
        self.rules.extend(split);
        self.rules.retain(|r| !r.agents.is_empty());

        if modes.is_empty() {
            return;
        }
        let mut rule = AclRule {
            iri: format!("{}#{}-{}", self.iri, target.label(), self.rules.len()),
            agents: vec![agent.clone()],
            modes,
            access_to: None,
            default: None,
        };
        target.set(&mut rule);
        self.rules.push(rule);
    }
}

enum RuleTarget<'a> {
    AccessTo(&'a str),
    Default(&'a str),
}

impl RuleTarget<'_> {
    fn matches(&self, rule: &AclRule) -> bool {
        match self {
            RuleTarget::AccessTo(r) => rule.access_to.as_deref() == Some(*r),
            RuleTarget::Default(c) => rule.default.as_deref() == Some(*c),
        }
    }

    fn clear(&self, rule: &mut AclRule) {
        match self {
            RuleTarget::AccessTo(_) => rule.access_to = None,
            RuleTarget::Default(_) => rule.default = None,
        }
    }

    fn set(&self, rule: &mut AclRule) {
        match self {
            RuleTarget::AccessTo(r) => rule.access_to = Some((*r).to_string()),
            RuleTarget::Default(c) => rule.default = Some((*c).to_string()),
        }
    }

    fn label(&self) -> &'static str {
        match self {
            RuleTarget::AccessTo(_) => "access",
            RuleTarget::Default(_) => "default",
        }
    }
}

fn collect_agent_modes<'a>(rules: impl Iterator<Item = &'a AclRule>) -> Vec<(Agent, AccessModes)> {
    let mut out: Vec<(Agent, AccessModes)> = Vec::new();
    for rule in rules {
        for agent in &rule.agents {
            match out.iter_mut().find(|(a, _)| a == agent) {
                Some((_, modes)) => *modes = modes.union(&rule.modes),
                None => out.push((agent.clone(), rule.modes)),
            }
        }
    }
    out
}

/// An ACP matcher ("rule" in older vocabularies).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Rule {
    pub iri: String,
    /// Individual WebIDs matched by the rule.
    #[serde(default)]
    pub agents: Vec<String>,
    /// Matches `acp:PublicAgent`.
    #[serde(default)]
    pub public: bool,
    /// Matches `acp:AuthenticatedAgent`.
    #[serde(default)]
    pub authenticated: bool,
}

impl Rule {
    pub fn new(iri: impl Into<String>) -> Self {
        Self {
            iri: iri.into(),
            ..Default::default()
        }
    }

    /// All agents matched, pseudo-agents first.
    pub fn matched_agents(&self) -> Vec<Agent> {
        let mut agents = Vec::new();
        if self.public {
            agents.push(Agent::Public);
        }
        if self.authenticated {
            agents.push(Agent::Authenticated);
        }
        agents.extend(self.agents.iter().map(|a| Agent::WebId(a.clone())));
        agents
    }

    pub fn is_empty(&self) -> bool {
        !self.public && !self.authenticated && self.agents.is_empty()
    }
}

/// An ACP policy.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Policy {
    pub iri: String,
    #[serde(default)]
    pub allow: AccessModes,
    #[serde(default)]
    pub deny: AccessModes,
    /// Rules of which any must match (`acp:anyOf`).
    #[serde(default)]
    pub any_of: Vec<String>,
}

/// Policies and rules held together in one document.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PolicyGraph {
    #[serde(default)]
    pub policies: Vec<Policy>,
    #[serde(default)]
    pub rules: Vec<Rule>,
}

impl PolicyGraph {
    pub fn policy(&self, iri: &str) -> Option<&Policy> {
        self.policies.iter().find(|p| p.iri == iri)
    }

    pub fn policy_mut(&mut self, iri: &str) -> Option<&mut Policy> {
        self.policies.iter_mut().find(|p| p.iri == iri)
    }

    pub fn rule(&self, iri: &str) -> Option<&Rule> {
        self.rules.iter().find(|r| r.iri == iri)
    }

    pub fn rule_mut(&mut self, iri: &str) -> Option<&mut Rule> {
        self.rules.iter_mut().find(|r| r.iri == iri)
    }

    /// Rules referenced by a policy.
    pub fn rules_of<'a>(&'a self, policy: &'a Policy) -> impl Iterator<Item = &'a Rule> + 'a {
        policy.any_of.iter().filter_map(move |iri| self.rule(iri))
    }
}

/// An ACP access-control resource.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Acr {
    pub iri: String,
    /// Resource governed by this ACR.
    pub resource_iri: String,
    /// Policies applied to the resource (`acp:apply` via `acp:accessControl`).
    #[serde(default)]
    pub access_policies: Vec<String>,
    /// Policies applied to container members (`acp:memberAccessControl`).
    #[serde(default)]
    pub member_policies: Vec<String>,
    /// Policies and rules stored inline in the ACR.
    #[serde(default)]
    pub inline: PolicyGraph,
}

impl Acr {
    pub fn new(iri: impl Into<String>, resource_iri: impl Into<String>) -> Self {
        Self {
            iri: iri.into(),
            resource_iri: resource_iri.into(),
            ..Default::default()
        }
    }
}

/// An externally stored policy document.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PolicyDocument {
    pub iri: String,
    #[serde(default)]
    pub graph: PolicyGraph,
}

impl PolicyDocument {
    pub fn new(iri: impl Into<String>) -> Self {
        Self {
            iri: iri.into(),
            graph: PolicyGraph::default(),
        }
    }
}

/// Linked-Data resource store.
///
/// `get_*` return `Ok(None)` when the document does not exist (404); any
/// other failure is an error carrying the status code. `save_*` return the
/// stored document as the server reports it, or `None` on an empty response.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Fetch resource metadata (link relations).
    async fn get_resource_info(&self, iri: &str) -> StoreResult<ResourceInfo>;

    /// Fetch a resource's contents.
    async fn get_dataset(&self, iri: &str) -> StoreResult<Option<Dataset>>;

    async fn get_acl(&self, acl_iri: &str) -> StoreResult<Option<AclDocument>>;

    async fn save_acl(&self, acl: AclDocument) -> StoreResult<Option<AclDocument>>;

    async fn get_acr(&self, acr_iri: &str) -> StoreResult<Option<Acr>>;

    async fn save_acr(&self, acr: Acr) -> StoreResult<Option<Acr>>;

    async fn get_policy_document(&self, iri: &str) -> StoreResult<Option<PolicyDocument>>;

    async fn save_policy_document(&self, doc: PolicyDocument) -> StoreResult<Option<PolicyDocument>>;
}

/// Parent container of a resource (`https://pod/a/b` -> `https://pod/a/`).
/// Returns `None` at the origin root.
pub fn parent_container(iri: &str) -> Option<String> {
    let url = Url::parse(iri).ok()?;
    let path = url.path();
    if path == "/" || path.is_empty() {
        return None;
    }
    let trimmed = path.trim_end_matches('/');
    let cut = trimmed.rfind('/')?;
    let mut parent = url.clone();
    parent.set_path(&trimmed[..=cut]);
    parent.set_query(None);
    parent.set_fragment(None);
    Some(parent.to_string())
}

/// Conventional `.acl` sidecar of a resource.
pub fn acl_sidecar(iri: &str) -> String {
    format!("{}.acl", iri)
}

/// Origin root of an IRI (`https://pod.example/`), used when no storage root
/// is advertised.
pub fn origin_root(iri: &str) -> Option<String> {
    let url = Url::parse(iri).ok()?;
    let mut root = url.clone();
    root.set_path("/");
    root.set_query(None);
    root.set_fragment(None);
    Some(root.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = "https://pod.example/notes/doc";

    #[test]
    fn test_parent_container() {
        assert_eq!(
            parent_container("https://pod.example/a/b/c").as_deref(),
            Some("https://pod.example/a/b/")
        );
        assert_eq!(
            parent_container("https://pod.example/a/b/").as_deref(),
            Some("https://pod.example/a/")
        );
        assert_eq!(
            parent_container("https://pod.example/a").as_deref(),
            Some("https://pod.example/")
        );
        assert_eq!(parent_container("https://pod.example/"), None);
        assert_eq!(parent_container("not a url"), None);
    }

    #[test]
    fn test_link_inspection() {
        let info = ResourceInfo::new(DOC).with_link(REL_ACL, acl_sidecar(DOC));
        assert!(info.is_access_controlled());
        assert!(!info.has_linked_access_control_resource());
        assert_eq!(info.acl_url(), Some("https://pod.example/notes/doc.acl"));
        assert!(!info.is_container);

        let acp = ResourceInfo::new("https://pod.example/notes/")
            .with_link(REL_ACP_ACCESS_CONTROL, "https://pod.example/notes/.acr");
        assert!(acp.has_linked_access_control_resource());
        assert!(acp.is_container);
        assert_eq!(acp.acr_url(), Some("https://pod.example/notes/.acr"));
    }

    #[test]
    fn test_set_agent_resource_access_replaces_modes() {
        let alice = Agent::web_id("https://alice.example/card#me");
        let bob = Agent::web_id("https://bob.example/card#me");
        let mut acl = AclDocument::new(acl_sidecar(DOC), DOC);
        acl.rules.push(AclRule {
            iri: format!("{}#shared", acl.iri),
            agents: vec![alice.clone(), bob.clone()],
            modes: AccessModes::READ,
            access_to: Some(DOC.to_string()),
            default: None,
        });

        acl.set_agent_resource_access(DOC, &alice, AccessModes::EDIT);

        let access = acl.agent_resource_access(DOC);
        assert!(access.contains(&(alice.clone(), AccessModes::EDIT)));
        assert!(access.contains(&(bob.clone(), AccessModes::READ)));

        acl.set_agent_resource_access(DOC, &alice, AccessModes::NONE);
        let access = acl.agent_resource_access(DOC);
        assert_eq!(access, vec![(bob, AccessModes::READ)]);
    }

    #[test]
    fn test_split_rule_keeps_other_target() {
        let container = "https://pod.example/notes/";
        let alice = Agent::web_id("https://alice.example/card#me");
        let mut acl = AclDocument::new(acl_sidecar(container), container);
        acl.rules.push(AclRule {
            iri: format!("{}#both", acl.iri),
            agents: vec![alice.clone()],
            modes: AccessModes::READ,
            access_to: Some(container.to_string()),
            default: Some(container.to_string()),
        });

        acl.set_agent_resource_access(container, &alice, AccessModes::CONTROL);

        assert_eq!(
            acl.agent_resource_access(container),
            vec![(alice.clone(), AccessModes::CONTROL)]
        );
        assert_eq!(
            acl.agent_default_access(container),
            vec![(alice, AccessModes::READ)]
        );
    }

    #[test]
    fn test_rule_matched_agents() {
        let mut rule = Rule::new("https://pod.example/.acr#rule");
        assert!(rule.is_empty());
        rule.agents.push("https://alice.example/card#me".to_string());
        rule.public = true;
        assert_eq!(
            rule.matched_agents(),
            vec![Agent::Public, Agent::web_id("https://alice.example/card#me")]
        );
    }
}

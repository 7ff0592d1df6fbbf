//! ACP (Access Control Policy) strategy.
//!
//! Access is expressed as policies applied from the resource's ACR. Each
//! policy bucket owns one rule listing the agents it matches. Policies live
//! either inline in the ACR or in a per-resource file of a shared policies
//! container.

mod policy;

use std::sync::Arc;

use crate::access::{merge_entries, Agent, PermissionEntry, Provenance, Scope};
use crate::error::AcpError;
use crate::sequence::{serialize_fold, BatchFailure};
use crate::store::{origin_root, Acr, Policy, PolicyDocument, PolicyGraph, ResourceInfo, ResourceStore};

pub use policy::{policy_url, PolicyName, PolicyStorage};

/// ACR plus, in external storage, the resource's policy document.
#[derive(Debug, Clone)]
struct AcpSnapshot {
    acr: Acr,
    external: Option<PolicyDocument>,
}

/// Which halves of a snapshot a mutation touched.
#[derive(Debug, Default, Clone, Copy)]
struct Changes {
    acr: bool,
    graph: bool,
}

impl Changes {
    fn any(&self) -> bool {
        self.acr || self.graph
    }
}

impl AcpSnapshot {
    /// Document IRI that policy and rule fragments hang off.
    fn base(&self) -> &str {
        match &self.external {
            Some(doc) => &doc.iri,
            None => &self.acr.iri,
        }
    }

    fn graph(&self) -> &PolicyGraph {
        match &self.external {
            Some(doc) => &doc.graph,
            None => &self.acr.inline,
        }
    }

    fn graph_mut(&mut self) -> &mut PolicyGraph {
        match &mut self.external {
            Some(doc) => &mut doc.graph,
            None => &mut self.acr.inline,
        }
    }

    /// Look a policy up inline first, then in the external document.
    fn find_policy(&self, iri: &str) -> Option<(&Policy, &PolicyGraph)> {
        if let Some(p) = self.acr.inline.policy(iri) {
            return Some((p, &self.acr.inline));
        }
        let doc = self.external.as_ref()?;
        doc.graph.policy(iri).map(|p| (p, &doc.graph))
    }

    fn is_member(&self, name: PolicyName, agent: &Agent) -> bool {
        self.graph()
            .rule(&name.rule_iri(self.base()))
            .map(|rule| rule.matched_agents().contains(agent))
            .unwrap_or(false)
    }

    fn members(&self, name: PolicyName) -> Vec<Agent> {
        self.graph()
            .rule(&name.rule_iri(self.base()))
            .map(|rule| rule.matched_agents())
            .unwrap_or_default()
    }

    /// Create the policy and its rule if missing and apply it from the ACR.
    fn ensure_policy(&mut self, name: PolicyName, is_container: bool) -> Changes {
        let mut changes = Changes::default();
        let policy_iri = name.policy_iri(self.base());
        let rule_iri = name.rule_iri(self.base());

        let graph = self.graph_mut();
        if graph.policy(&policy_iri).is_none() {
            graph.policies.push(Policy {
                iri: policy_iri.clone(),
                allow: name.allow(),
                deny: name.deny(),
                any_of: vec![rule_iri.clone()],
            });
            changes.graph = true;
        }
        if graph.rule(&rule_iri).is_none() {
            graph.rules.push(crate::store::Rule::new(rule_iri));
            changes.graph = true;
        }

        if !self.acr.access_policies.contains(&policy_iri) {
            self.acr.access_policies.push(policy_iri.clone());
            changes.acr = true;
        }
        if is_container && !self.acr.member_policies.contains(&policy_iri) {
            self.acr.member_policies.push(policy_iri);
            changes.acr = true;
        }

        if self.external.is_none() && changes.graph {
            // Inline graphs are part of the ACR document.
            changes.acr = true;
        }
        changes
    }

    /// Add or remove `agent` from the rule of `name`.
    fn set_membership(&mut self, name: PolicyName, agent: &Agent, present: bool, is_container: bool) -> Changes {
        let mut changes = if present {
            self.ensure_policy(name, is_container)
        } else {
            Changes::default()
        };

        let rule_iri = name.rule_iri(self.base());
        let Some(rule) = self.graph_mut().rule_mut(&rule_iri) else {
            return changes;
        };

        let changed = match agent {
            Agent::Public => std::mem::replace(&mut rule.public, present) != present,
            Agent::Authenticated => std::mem::replace(&mut rule.authenticated, present) != present,
            Agent::WebId(id) => {
                let listed = rule.agents.contains(id);
                if present && !listed {
                    rule.agents.push(id.clone());
                } else if !present && listed {
                    rule.agents.retain(|a| a != id);
                }
                listed != present
            }
        };

        if changed {
            changes.graph = true;
            if self.external.is_none() {
                changes.acr = true;
            }
        }
        changes
    }
}

/// One membership change inside a serialized batch.
#[derive(Debug, Clone, Copy)]
struct MembershipStep {
    policy: PolicyName,
    present: bool,
}

/// ACP strategy bound to one resource.
#[derive(Clone)]
pub struct AcpStrategy {
    store: Arc<dyn ResourceStore>,
    resource: ResourceInfo,
    acr_iri: String,
    pod_root: String,
    storage: PolicyStorage,
}

impl AcpStrategy {
    /// Create a strategy from the resource's metadata.
    pub fn new(
        store: Arc<dyn ResourceStore>,
        resource: ResourceInfo,
        storage: PolicyStorage,
    ) -> Result<Self, AcpError> {
        let acr_iri = resource
            .acr_url()
            .ok_or_else(|| AcpError::AcrUnavailable(resource.iri.clone()))?
            .to_string();
        let pod_root = resource
            .storage_root()
            .map(str::to_string)
            .or_else(|| origin_root(&resource.iri))
            .ok_or_else(|| AcpError::OutsidePod(resource.iri.clone()))?;

        Ok(Self {
            store,
            resource,
            acr_iri,
            pod_root,
            storage,
        })
    }

    pub fn resource(&self) -> &ResourceInfo {
        &self.resource
    }

    pub fn acr_iri(&self) -> &str {
        &self.acr_iri
    }

    pub fn storage(&self) -> &PolicyStorage {
        &self.storage
    }

    /// External policy file IRI for this resource, if policies are external.
    pub fn policy_document_url(&self) -> Result<Option<String>, AcpError> {
        match &self.storage {
            PolicyStorage::Inline => Ok(None),
            PolicyStorage::External { container, .. } => {
                policy_url(&self.resource.iri, &self.pod_root, container).map(Some)
            }
        }
    }

    async fn load(&self) -> Result<AcpSnapshot, AcpError> {
        let acr = self
            .store
            .get_acr(&self.acr_iri)
            .await?
            .ok_or_else(|| AcpError::AcrUnavailable(self.resource.iri.clone()))?;

        let external = match &self.storage {
            PolicyStorage::Inline => None,
            PolicyStorage::External {
                container,
                legacy_container,
            } => Some(self.load_policy_document(container, legacy_container).await?),
        };

        Ok(AcpSnapshot { acr, external })
    }

    async fn load_policy_document(
        &self,
        container: &str,
        legacy_container: &str,
    ) -> Result<PolicyDocument, AcpError> {
        let url = policy_url(&self.resource.iri, &self.pod_root, container)?;
        if let Some(doc) = self.store.get_policy_document(&url).await? {
            return Ok(doc);
        }

        let legacy_url = policy_url(&self.resource.iri, &self.pod_root, legacy_container)?;
        if legacy_url != url {
            if let Some(doc) = self.store.get_policy_document(&legacy_url).await? {
                tracing::debug!(resource = %self.resource.iri, url = %legacy_url, "using legacy policy document");
                return Ok(doc);
            }
        }

        Ok(PolicyDocument::new(url))
    }

    async fn persist(&self, snapshot: AcpSnapshot, changes: Changes) -> Result<Acr, AcpError> {
        let AcpSnapshot { acr, external } = snapshot;

        if let (Some(doc), true) = (external, changes.graph) {
            let iri = doc.iri.clone();
            self.store
                .save_policy_document(doc)
                .await?
                .ok_or(AcpError::EmptyResponse(iri))?;
        }

        if !changes.acr {
            return Ok(acr);
        }
        let iri = acr.iri.clone();
        self.store
            .save_acr(acr)
            .await?
            .ok_or(AcpError::EmptyResponse(iri))
    }

    /// Apply one membership change against freshly read server state.
    async fn update_membership(&self, policy: PolicyName, agent: &Agent, present: bool) -> Result<Acr, AcpError> {
        let mut snapshot = self.load().await?;
        let changes = snapshot.set_membership(policy, agent, present, self.resource.is_container);

        if !changes.any() {
            tracing::debug!(resource = %self.resource.iri, %agent, %policy, present, "membership unchanged");
            return Ok(snapshot.acr);
        }

        let acr = self.persist(snapshot, changes).await?;
        tracing::info!(resource = %self.resource.iri, %agent, %policy, present, "updated policy membership");
        Ok(acr)
    }

    /// Run membership changes strictly one after another.
    async fn run_steps(&self, initial: Acr, agent: &Agent, steps: Vec<MembershipStep>) -> Result<Acr, AcpError> {
        serialize_fold(initial, steps, |_, step| {
            self.update_membership(step.policy, agent, step.present)
        })
        .await
        .map_err(batch_error)
    }

    /// Effective permissions from every policy the ACR applies.
    pub async fn get_permissions(&self) -> Result<Vec<PermissionEntry>, AcpError> {
        let snapshot = self.load().await?;
        let applied = snapshot
            .acr
            .access_policies
            .iter()
            .map(|iri| (iri, Scope::Resource))
            .chain(snapshot.acr.member_policies.iter().map(|iri| (iri, Scope::Default)));

        let mut entries = Vec::new();
        for (policy_iri, scope) in applied {
            let Some((policy, graph)) = snapshot.find_policy(policy_iri) else {
                tracing::debug!(policy = %policy_iri, "applied policy not found in loaded documents");
                continue;
            };
            let alias = policy_alias(policy_iri);
            for rule in graph.rules_of(policy) {
                for agent in rule.matched_agents() {
                    entries.push(
                        PermissionEntry::new(agent, policy.allow, scope, Provenance::Acp)
                            .with_policy(alias.clone()),
                    );
                }
            }
        }

        Ok(merge_entries(entries))
    }

    /// Agents currently matched by a policy bucket.
    pub async fn members(&self, policy_name: &str) -> Result<Vec<Agent>, AcpError> {
        let policy = PolicyName::parse(policy_name)?;
        Ok(self.load().await?.members(policy))
    }

    /// Add an individual agent to a policy bucket.
    ///
    /// Adding a present agent is a no-op. For named policies the agent first
    /// leaves any other named policy; the leave and join are separate writes,
    /// so a failure in between is visible on the next read. Pseudo-agents are
    /// rejected; see [`set_rule_public`](Self::set_rule_public) and
    /// [`set_rule_authenticated`](Self::set_rule_authenticated).
    pub async fn add_agent_to_policy(&self, agent: &Agent, policy_name: &str) -> Result<Acr, AcpError> {
        let policy = PolicyName::parse(policy_name)?;
        individual(agent)?;
        self.join_policy(agent, policy).await
    }

    /// Remove an individual agent from a policy bucket. Removing an absent
    /// agent is a no-op.
    pub async fn remove_agent_from_policy(&self, agent: &Agent, policy_name: &str) -> Result<Acr, AcpError> {
        let policy = PolicyName::parse(policy_name)?;
        individual(agent)?;
        self.update_membership(policy, agent, false).await
    }

    /// Leave the policies exclusive with `policy`, then join it.
    async fn join_policy(&self, agent: &Agent, policy: PolicyName) -> Result<Acr, AcpError> {
        let snapshot = self.load().await?;

        let mut steps: Vec<MembershipStep> = policy
            .exclusive_with()
            .into_iter()
            .filter(|other| snapshot.is_member(*other, agent))
            .map(|other| MembershipStep {
                policy: other,
                present: false,
            })
            .collect();
        if !snapshot.is_member(policy, agent) {
            steps.push(MembershipStep {
                policy,
                present: true,
            });
        }

        if steps.is_empty() {
            return Ok(snapshot.acr);
        }
        self.run_steps(snapshot.acr, agent, steps).await
    }

    /// Remove every agent from a policy bucket, one write at a time.
    ///
    /// The ACR returned by the last removal is the result. A failure part way
    /// through is reported as [`AcpError::PartialBatch`] and is not rolled back.
    pub async fn remove_all_agents_from_policy(&self, policy_name: &str) -> Result<Acr, AcpError> {
        let policy = PolicyName::parse(policy_name)?;
        let snapshot = self.load().await?;
        let members = snapshot.members(policy);

        serialize_fold(snapshot.acr, members, |_, agent| async move {
            self.update_membership(policy, &agent, false).await
        })
        .await
        .map_err(batch_error)
    }

    /// Toggle whether a policy matches the public pseudo-agent.
    ///
    /// Setting the flag on a named policy clears it on the other named
    /// policies, as for individual agents.
    pub async fn set_rule_public(&self, policy_name: &str, public: bool) -> Result<Acr, AcpError> {
        let policy = PolicyName::parse(policy_name)?;
        self.set_rule_flag(&Agent::Public, policy, public).await
    }

    /// Toggle whether a policy matches the authenticated pseudo-agent.
    pub async fn set_rule_authenticated(&self, policy_name: &str, authenticated: bool) -> Result<Acr, AcpError> {
        let policy = PolicyName::parse(policy_name)?;
        self.set_rule_flag(&Agent::Authenticated, policy, authenticated)
            .await
    }

    async fn set_rule_flag(&self, agent: &Agent, policy: PolicyName, on: bool) -> Result<Acr, AcpError> {
        if on {
            self.join_policy(agent, policy).await
        } else {
            self.update_membership(policy, agent, false).await
        }
    }
}

fn individual(agent: &Agent) -> Result<(), AcpError> {
    if agent.is_pseudo() {
        return Err(AcpError::PseudoAgent(agent.to_string()));
    }
    Ok(())
}

/// Display alias of a policy: its bucket name, or the IRI fragment for
/// policies created elsewhere.
fn policy_alias(policy_iri: &str) -> String {
    match PolicyName::from_policy_iri(policy_iri) {
        Some(name) => name.as_str().to_string(),
        None => policy_iri
            .rsplit_once('#')
            .map(|(_, fragment)| fragment)
            .unwrap_or(policy_iri)
            .to_string(),
    }
}

/// Nothing was persisted when the first step fails, so report it as is.
fn batch_error(failure: BatchFailure<AcpError>) -> AcpError {
    if failure.completed == 0 {
        failure.error
    } else {
        AcpError::PartialBatch {
            completed: failure.completed,
            total: failure.total,
            source: Box::new(failure.error),
        }
    }
}

//! Policy catalogue and policy IRI derivation.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::access::AccessModes;
use crate::config::{AcpConfig, PolicyStorageMode};
use crate::error::AcpError;

/// Policy buckets understood by the ACP strategy.
///
/// Named policies (`editors`, `viewers`, `blocked`) are fixed roles and
/// mutually exclusive per agent. Custom policies compose freely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PolicyName {
    #[serde(rename = "editors")]
    Editors,
    #[serde(rename = "viewers")]
    Viewers,
    #[serde(rename = "blocked")]
    Blocked,
    #[serde(rename = "viewAndAdd")]
    ViewAndAdd,
    #[serde(rename = "editOnly")]
    EditOnly,
    #[serde(rename = "addOnly")]
    AddOnly,
}

impl PolicyName {
    pub const NAMED: [PolicyName; 3] = [PolicyName::Editors, PolicyName::Viewers, PolicyName::Blocked];
    pub const CUSTOM: [PolicyName; 3] = [PolicyName::ViewAndAdd, PolicyName::EditOnly, PolicyName::AddOnly];

    pub fn all() -> impl Iterator<Item = PolicyName> {
        Self::NAMED.into_iter().chain(Self::CUSTOM)
    }

    /// Parse an exact policy-type name.
    pub fn parse(name: &str) -> Result<Self, AcpError> {
        Self::all()
            .find(|p| p.as_str() == name)
            .ok_or_else(|| AcpError::UnknownPolicy(name.to_string()))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyName::Editors => "editors",
            PolicyName::Viewers => "viewers",
            PolicyName::Blocked => "blocked",
            PolicyName::ViewAndAdd => "viewAndAdd",
            PolicyName::EditOnly => "editOnly",
            PolicyName::AddOnly => "addOnly",
        }
    }

    /// Fixed-role policy, exclusive with the other named policies.
    pub fn is_named(&self) -> bool {
        Self::NAMED.contains(self)
    }

    /// Named policies an agent must leave before joining this one.
    pub fn exclusive_with(&self) -> Vec<PolicyName> {
        if !self.is_named() {
            return Vec::new();
        }
        Self::NAMED.into_iter().filter(|p| p != self).collect()
    }

    /// Modes the policy allows.
    pub fn allow(&self) -> AccessModes {
        match self {
            PolicyName::Editors => AccessModes::EDIT,
            PolicyName::Viewers => AccessModes::READ,
            PolicyName::Blocked => AccessModes::NONE,
            PolicyName::ViewAndAdd => AccessModes::new(true, false, true, false),
            PolicyName::EditOnly => AccessModes::new(false, true, true, false),
            PolicyName::AddOnly => AccessModes::APPEND,
        }
    }

    /// Modes the policy denies.
    pub fn deny(&self) -> AccessModes {
        match self {
            PolicyName::Blocked => AccessModes::EDIT,
            _ => AccessModes::NONE,
        }
    }

    /// Policy whose allowed modes equal `modes`, preferring named policies.
    pub fn for_modes(modes: &AccessModes) -> Option<PolicyName> {
        Self::all().find(|p| !p.allow().is_empty() && p.allow() == *modes)
    }

    /// `<base>#<name>Policy`
    pub fn policy_iri(&self, base: &str) -> String {
        format!("{}#{}Policy", base, self.as_str())
    }

    /// `<base>#<name>Rule`
    pub fn rule_iri(&self, base: &str) -> String {
        format!("{}#{}Rule", base, self.as_str())
    }

    /// Recover the policy name from a policy IRI built by [`policy_iri`](Self::policy_iri).
    pub fn from_policy_iri(iri: &str) -> Option<PolicyName> {
        let fragment = iri.rsplit_once('#')?.1;
        let name = fragment.strip_suffix("Policy")?;
        PolicyName::parse(name).ok()
    }
}

impl FromStr for PolicyName {
    type Err = AcpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PolicyName::parse(s)
    }
}

impl fmt::Display for PolicyName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a resource's policies are stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyStorage {
    /// In the resource's ACR.
    Inline,
    /// In a per-resource file under a shared container of the pod root.
    External {
        container: String,
        legacy_container: String,
    },
}

impl From<&AcpConfig> for PolicyStorage {
    fn from(config: &AcpConfig) -> Self {
        match config.policy_storage {
            PolicyStorageMode::Inline => PolicyStorage::Inline,
            PolicyStorageMode::External => PolicyStorage::External {
                container: config.policies_container.clone(),
                legacy_container: config.legacy_policies_container.clone(),
            },
        }
    }
}

/// IRI of the external policy file for `resource_iri`.
///
/// The resource path relative to `pod_root` is placed under `container` and
/// suffixed with `.ttl`. The mapping is purely textual, so the policy file
/// of `foo` has the same IRI as a resource stored at `<container>foo.ttl`.
pub fn policy_url(resource_iri: &str, pod_root: &str, container: &str) -> Result<String, AcpError> {
    let relative = resource_iri
        .strip_prefix(pod_root)
        .ok_or_else(|| AcpError::OutsidePod(resource_iri.to_string()))?;
    Ok(format!("{}{}{}.ttl", pod_root, container, relative))
}

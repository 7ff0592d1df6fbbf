//! Permission model shared by every access-control strategy.
//!
//! Entries produced here are read-only views rebuilt on every fetch; changes
//! go through the strategy that owns the resource.

use std::fmt;

use serde::{Deserialize, Serialize};

/// IRI identifying the public pseudo-agent (anyone, including anonymous).
pub const PUBLIC_AGENT_IRI: &str = "http://xmlns.com/foaf/0.1/Agent";
/// IRI identifying the authenticated pseudo-agent (anyone signed in).
pub const AUTHENTICATED_AGENT_IRI: &str = "http://www.w3.org/ns/auth/acl#AuthenticatedAgent";

/// Fixed display name of the public pseudo-agent.
pub const PUBLIC_DISPLAY_NAME: &str = "Anyone";
/// Fixed display name of the authenticated pseudo-agent.
pub const AUTHENTICATED_DISPLAY_NAME: &str = "Anyone signed in";

/// Alias returned when modes match no template exactly.
pub const CUSTOM_ALIAS: &str = "Custom";

/// The four access flags of a grant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccessModes {
    pub read: bool,
    pub write: bool,
    pub append: bool,
    pub control: bool,
}

impl AccessModes {
    pub const NONE: AccessModes = AccessModes::new(false, false, false, false);
    pub const READ: AccessModes = AccessModes::new(true, false, false, false);
    pub const APPEND: AccessModes = AccessModes::new(false, false, true, false);
    pub const EDIT: AccessModes = AccessModes::new(true, true, true, false);
    pub const CONTROL: AccessModes = AccessModes::new(true, true, true, true);

    /// Create a mode set from explicit flags.
    pub const fn new(read: bool, write: bool, append: bool, control: bool) -> Self {
        Self {
            read,
            write,
            append,
            control,
        }
    }

    /// True iff all four flags are false.
    pub fn is_empty(&self) -> bool {
        !(self.read || self.write || self.append || self.control)
    }

    /// Flags set in either operand.
    pub fn union(&self, other: &AccessModes) -> AccessModes {
        AccessModes {
            read: self.read || other.read,
            write: self.write || other.write,
            append: self.append || other.append,
            control: self.control || other.control,
        }
    }

    /// Parse a mode vocabulary list (`"Read"`, `"acl:Write"`,
    /// `"http://www.w3.org/ns/auth/acl#Append"`, ...) by substring.
    pub fn from_vocabulary<I, S>(modes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = AccessModes::NONE;
        for mode in modes {
            let mode = mode.as_ref();
            set.read |= mode.contains("Read");
            set.write |= mode.contains("Write");
            set.append |= mode.contains("Append");
            set.control |= mode.contains("Control");
        }
        set
    }
}

impl fmt::Display for AccessModes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let flags = [
            (self.read, 'r'),
            (self.write, 'w'),
            (self.append, 'a'),
            (self.control, 'c'),
        ];
        for (set, c) in flags {
            write!(f, "{}", if set { c } else { '-' })?;
        }
        Ok(())
    }
}

/// `createAccessMap`: all flags default to false at call sites that pass them.
pub fn create_access_map(read: bool, write: bool, append: bool, control: bool) -> AccessModes {
    AccessModes::new(read, write, append, control)
}

/// Structural equality of two mode sets.
pub fn access_maps_equal(a: &AccessModes, b: &AccessModes) -> bool {
    a.read == b.read && a.write == b.write && a.append == b.append && a.control == b.control
}

/// Alias of the template that matches `modes` exactly, or `"Custom"`.
pub fn display_alias(modes: &AccessModes) -> &'static str {
    AccessTemplate::matching(modes)
        .map(|t| t.alias())
        .unwrap_or(CUSTOM_ALIAS)
}

/// Named mode templates offered to users.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessTemplate {
    None,
    Read,
    /// Read + write + append.
    Write,
    Append,
    /// Everything, including control.
    Control,
}

impl AccessTemplate {
    pub const ALL: [AccessTemplate; 5] = [
        AccessTemplate::None,
        AccessTemplate::Read,
        AccessTemplate::Write,
        AccessTemplate::Append,
        AccessTemplate::Control,
    ];

    /// Canonical modes of the template.
    pub fn modes(&self) -> AccessModes {
        match self {
            AccessTemplate::None => AccessModes::NONE,
            AccessTemplate::Read => AccessModes::READ,
            AccessTemplate::Write => AccessModes::EDIT,
            AccessTemplate::Append => AccessModes::APPEND,
            AccessTemplate::Control => AccessModes::CONTROL,
        }
    }

    pub fn alias(&self) -> &'static str {
        match self {
            AccessTemplate::None => "No Access",
            AccessTemplate::Read => "View",
            AccessTemplate::Write => "Edit",
            AccessTemplate::Append => "Append",
            AccessTemplate::Control => "Control",
        }
    }

    /// Template whose modes equal `modes` exactly.
    pub fn matching(modes: &AccessModes) -> Option<AccessTemplate> {
        Self::ALL
            .into_iter()
            .find(|t| access_maps_equal(&t.modes(), modes))
    }
}

/// Grant target: an individual WebID or one of the pseudo-agents.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "type", content = "id")]
#[serde(rename_all = "lowercase")]
pub enum Agent {
    Public,
    Authenticated,
    WebId(String),
}

impl Agent {
    pub fn web_id(id: impl Into<String>) -> Self {
        Agent::WebId(id.into())
    }

    /// Map a raw identifier onto an agent, recognising the pseudo-agent IRIs
    /// and their short constant names.
    pub fn from_iri(iri: &str) -> Self {
        match iri {
            PUBLIC_AGENT_IRI | "PublicAgent" => Agent::Public,
            AUTHENTICATED_AGENT_IRI | "AuthenticatedAgent" => Agent::Authenticated,
            other => Agent::WebId(other.to_string()),
        }
    }

    pub fn iri(&self) -> &str {
        match self {
            Agent::Public => PUBLIC_AGENT_IRI,
            Agent::Authenticated => AUTHENTICATED_AGENT_IRI,
            Agent::WebId(id) => id,
        }
    }

    pub fn is_pseudo(&self) -> bool {
        !matches!(self, Agent::WebId(_))
    }

    /// Fixed name for pseudo-agents; individual agents need a profile lookup.
    pub fn fixed_display_name(&self) -> Option<&'static str> {
        match self {
            Agent::Public => Some(PUBLIC_DISPLAY_NAME),
            Agent::Authenticated => Some(AUTHENTICATED_DISPLAY_NAME),
            Agent::WebId(_) => None,
        }
    }

    /// Sort rank: Public, then Authenticated, then everyone else.
    pub(crate) fn rank(&self) -> u8 {
        match self {
            Agent::Public => 0,
            Agent::Authenticated => 1,
            Agent::WebId(_) => 2,
        }
    }
}

impl fmt::Display for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Agent::Public => write!(f, "PublicAgent"),
            Agent::Authenticated => write!(f, "AuthenticatedAgent"),
            Agent::WebId(id) => write!(f, "{}", id),
        }
    }
}

/// Whether a grant applies to the resource itself or is inherited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Resource,
    Default,
}

/// Which authority issued an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    Acl,
    Acp,
    Consent,
}

/// Reference to the signed credential behind a consent entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRef {
    /// Credential identifier.
    pub id: String,
    /// Issuer of the credential.
    pub issuer: String,
    /// Purpose annotations attached to the grant.
    #[serde(default)]
    pub purposes: Vec<String>,
}

/// One agent's access to one resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionEntry {
    pub agent: Agent,
    pub modes: AccessModes,
    pub scope: Scope,
    pub provenance: Provenance,
    /// Policy buckets granting the access, ACP only.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub policy_aliases: Vec<String>,
    /// Credentials granting the access, consent only.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub credentials: Vec<CredentialRef>,
}

impl PermissionEntry {
    pub fn new(agent: Agent, modes: AccessModes, scope: Scope, provenance: Provenance) -> Self {
        Self {
            agent,
            modes,
            scope,
            provenance,
            policy_aliases: Vec::new(),
            credentials: Vec::new(),
        }
    }

    pub fn with_policy(mut self, alias: impl Into<String>) -> Self {
        self.policy_aliases.push(alias.into());
        self
    }

    pub fn with_credential(mut self, credential: CredentialRef) -> Self {
        self.credentials.push(credential);
        self
    }

    /// Fold a same-scope duplicate into this entry.
    fn absorb(&mut self, other: PermissionEntry) {
        self.modes = self.modes.union(&other.modes);
        for alias in other.policy_aliases {
            if !self.policy_aliases.contains(&alias) {
                self.policy_aliases.push(alias);
            }
        }
        for credential in other.credentials {
            if !self.credentials.iter().any(|c| c.id == credential.id) {
                self.credentials.push(credential);
            }
        }
    }

    /// Alias of this entry's modes.
    pub fn alias(&self) -> &'static str {
        display_alias(&self.modes)
    }

    /// Whether the policy-mutation API may alter this entry.
    pub fn is_mutable(&self) -> bool {
        self.provenance != Provenance::Consent
    }
}

/// Collapse entries so that each agent appears at most once per provenance,
/// preferring resource scope over default scope.
///
/// Same-scope duplicates are folded together: modes are unioned and their
/// policy buckets and credentials collected. A resource-scope entry replaces
/// a default-scope one outright. Input order of first appearance is kept.
pub fn merge_entries(entries: impl IntoIterator<Item = PermissionEntry>) -> Vec<PermissionEntry> {
    let mut merged: Vec<PermissionEntry> = Vec::new();

    for entry in entries {
        let existing = merged
            .iter_mut()
            .find(|e| e.agent == entry.agent && e.provenance == entry.provenance);

        match existing {
            None => merged.push(entry),
            Some(current) => match (current.scope, entry.scope) {
                (Scope::Default, Scope::Resource) => *current = entry,
                (Scope::Resource, Scope::Default) => {}
                _ => current.absorb(entry),
            },
        }
    }

    merged
}

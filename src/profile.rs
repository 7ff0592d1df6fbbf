//! Agent profiles used to label permission entries.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::access::Agent;
use crate::error::StoreError;

/// Public profile of a WebID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub web_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

impl Profile {
    pub fn new(web_id: impl Into<String>) -> Self {
        Self {
            web_id: web_id.into(),
            name: None,
            avatar: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_avatar(mut self, avatar: impl Into<String>) -> Self {
        self.avatar = Some(avatar.into());
        self
    }

    /// Profile name, or the WebID when the profile has none.
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or(&self.web_id)
    }
}

/// Label for `agent`: the fixed name of a pseudo-agent, the profile name
/// when one is known, otherwise the WebID.
pub fn display_name_for(agent: &Agent, profile: Option<&Profile>) -> String {
    if let Some(name) = agent.fixed_display_name() {
        return name.to_string();
    }
    match profile {
        Some(profile) => profile.display_name().to_string(),
        None => agent.iri().to_string(),
    }
}

#[async_trait]
pub trait ProfileFetcher: Send + Sync {
    async fn fetch_profile(&self, web_id: &str) -> Result<Profile, StoreError>;
}

/// Profile table held in memory.
#[derive(Default)]
pub struct MemoryProfileFetcher {
    profiles: RwLock<HashMap<String, Profile>>,
    failing: RwLock<HashSet<String>>,
    fetches: AtomicUsize,
}

impl MemoryProfileFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, profile: Profile) {
        self.profiles.write().insert(profile.web_id.clone(), profile);
    }

    /// Make lookups of `web_id` fail with a network error.
    pub fn fail_on(&self, web_id: &str) {
        self.failing.write().insert(web_id.to_string());
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProfileFetcher for MemoryProfileFetcher {
    async fn fetch_profile(&self, web_id: &str) -> Result<Profile, StoreError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.failing.read().contains(web_id) {
            return Err(StoreError::Network(format!("profile {} unreachable", web_id)));
        }
        self.profiles
            .read()
            .get(web_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found(web_id))
    }
}

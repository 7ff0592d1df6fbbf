//! Pod Access: unified access-control resolution for Solid pods
//!
//! Reads and edits who may access a pod resource, whichever mechanism
//! governs it: Web Access Control (`.acl` documents with inherited
//! defaults), Access Control Policies (ACRs and policy buckets), or signed
//! access grants.

pub mod access;
pub mod acl;
pub mod acp;
pub mod cache;
pub mod config;
pub mod consent;
pub mod error;
pub mod facade;
pub mod logging;
pub mod profile;
pub mod resolver;
pub mod sequence;
pub mod store;

pub use access::{
    access_maps_equal, create_access_map, display_alias, merge_entries, AccessModes,
    AccessTemplate, Agent, CredentialRef, PermissionEntry, Provenance, Scope,
};
pub use acl::{AclSaveOutcome, AclState, AclStrategy};
pub use acp::{policy_url, AcpStrategy, PolicyName, PolicyStorage};
pub use cache::{CacheStats, PermissionCache};
pub use config::Config;
pub use consent::{
    normalize_grant, ConsentAdapter, GrantSource, GrantVerifier, SignedCredential,
    StaticGrantSource,
};
pub use error::{
    AccessError, AclError, AcpError, ConfigError, ConsentError, ResolutionError, Result,
    StoreError,
};
pub use facade::{PermissionChange, PermissionSession, PermissionsFacade, ResolvedPermission};
pub use logging::init_logging;
pub use profile::{display_name_for, MemoryProfileFetcher, Profile, ProfileFetcher};
pub use resolver::{AccessStrategy, StrategyKind, StrategyResolver};
pub use sequence::{serialize_fold, BatchFailure};
pub use store::{MemoryResourceStore, ResourceInfo, ResourceStore};

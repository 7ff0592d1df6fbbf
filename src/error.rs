//! Error types for pod access control.

use thiserror::Error;

/// Main error type for access-control operations.
#[derive(Error, Debug)]
pub enum AccessError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Resolution error: {0}")]
    Resolution(#[from] ResolutionError),

    #[error("ACL error: {0}")]
    Acl(#[from] AclError),

    #[error("ACP error: {0}")]
    Acp(#[from] AcpError),

    #[error("Consent error: {0}")]
    Consent(#[from] ConsentError),

    #[error("Unsupported mutation: {0}")]
    UnsupportedMutation(String),
}

impl AccessError {
    /// Status code of the underlying store failure, if any.
    pub fn status(&self) -> Option<&str> {
        match self {
            AccessError::Store(e) => e.status(),
            AccessError::Resolution(ResolutionError::Network(e)) => e.status(),
            AccessError::Acl(AclError::Store(e)) => e.status(),
            AccessError::Acp(e) => e.status(),
            _ => None,
        }
    }
}

/// Configuration-related errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadFile(#[source] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Failures reported by the resource store client.
///
/// HTTP-style failures carry the status code as a string (`"401"`, `"403"`,
/// `"404"`, `"500"`); transport failures have no status.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("{status}: {message}")]
    Status { status: String, message: String },

    #[error("Network failure: {0}")]
    Network(String),
}

impl StoreError {
    /// Create a status-coded error.
    pub fn status_code(status: impl Into<String>, message: impl Into<String>) -> Self {
        StoreError::Status {
            status: status.into(),
            message: message.into(),
        }
    }

    /// Create a 404 error for an IRI.
    pub fn not_found(iri: &str) -> Self {
        Self::status_code("404", format!("{} not found", iri))
    }

    /// Status code string, when the failure came from the server.
    pub fn status(&self) -> Option<&str> {
        match self {
            StoreError::Status { status, .. } => Some(status.as_str()),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some("404")
    }

    pub fn is_forbidden(&self) -> bool {
        matches!(self.status(), Some("401") | Some("403"))
    }

    /// Whether repeating the request may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            StoreError::Network(_) => true,
            StoreError::Status { status, .. } => status.starts_with('5'),
        }
    }
}

/// Errors while deciding which strategy governs a resource.
#[derive(Error, Debug)]
pub enum ResolutionError {
    #[error("No access policy found for {0}")]
    NoAccessPolicy(String),

    #[error("Unable to inspect resource metadata: {0}")]
    Network(#[source] StoreError),
}

/// ACL strategy failures. Each variant renders a distinct named condition.
#[derive(Error, Debug)]
pub enum AclError {
    #[error("unable to access ACL")]
    UnableToAccessAcl,

    #[error("unable to access default ACL")]
    UnableToAccessDefaultAcl,

    #[error("aclDataset is empty")]
    AclDatasetEmpty,

    #[error("updatedAcl is empty")]
    UpdatedAclEmpty,

    #[error("response is empty")]
    ResponseEmpty,

    #[error("dataset is empty")]
    DatasetEmpty,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// ACP strategy failures.
#[derive(Error, Debug)]
pub enum AcpError {
    #[error("Unknown policy type: {0}")]
    UnknownPolicy(String),

    #[error("Access control resource unavailable for {0}")]
    AcrUnavailable(String),

    #[error("Resource {0} is outside the pod root")]
    OutsidePod(String),

    #[error("{0} is matched by a rule flag, not an agent list")]
    PseudoAgent(String),

    #[error("Empty response while saving {0}")]
    EmptyResponse(String),

    #[error("Batch stopped after {completed} of {total} operations: {source}")]
    PartialBatch {
        completed: usize,
        total: usize,
        #[source]
        source: Box<AcpError>,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AcpError {
    /// Status code of the underlying store failure, if any.
    pub fn status(&self) -> Option<&str> {
        match self {
            AcpError::Store(e) => e.status(),
            AcpError::PartialBatch { source, .. } => source.status(),
            _ => None,
        }
    }
}

/// Access-grant credential failures.
#[derive(Error, Debug)]
pub enum ConsentError {
    #[error("Credential {0} has no consent subject")]
    MissingConsent(String),

    #[error("Credential {0} does not name a grantee")]
    MissingGrantee(String),

    #[error("Verification failed: {0}")]
    Verification(String),

    #[error("Grant source unavailable: {0}")]
    Source(String),
}

/// Result type alias for access-control operations.
pub type Result<T> = std::result::Result<T, AccessError>;

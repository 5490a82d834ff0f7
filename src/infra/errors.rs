// src/infra/errors.rs — Error types for Spaceport

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::dispatch::response::Status;

pub type Result<T> = std::result::Result<T, SpaceportError>;

#[derive(Error, Debug)]
pub enum SpaceportError {
    // Install-time errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Native resources required by plugin '{namespace}' not found in {}", .expected.display())]
    Dependency { namespace: String, expected: PathBuf },

    #[error("Plugin '{namespace}' failed: {source}")]
    Plugin {
        namespace: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Discovery under {} failed for {} unit(s)", .root.display(), .failures.len())]
    Discovery {
        root: PathBuf,
        failures: Vec<(PathBuf, SpaceportError)>,
    },

    // Feature errors
    #[error(transparent)]
    FeatureNotFound(#[from] FeatureNotFound),

    #[error("Feature '{kind}' from provider '{provider}' failed: {message}")]
    Feature {
        kind: String,
        provider: String,
        message: String,
    },

    // Request errors (converted into terminal outcomes by the dispatcher)
    #[error("Server keys expired at {0}")]
    CredentialsExpired(chrono::DateTime<chrono::Utc>),

    #[error(transparent)]
    Routing(#[from] RoutingError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    // Management
    #[error("Management error: {0}")]
    Management(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SpaceportError {
    pub fn plugin(namespace: &str, source: anyhow::Error) -> Self {
        SpaceportError::Plugin {
            namespace: namespace.to_string(),
            source,
        }
    }

    /// Terminal status a request would end with if it failed with this error.
    pub fn status(&self) -> Status {
        match self {
            SpaceportError::CredentialsExpired(_) => Status::Forbidden,
            SpaceportError::Routing(e) => e.status(),
            SpaceportError::Execution(e) => e.status(),
            SpaceportError::FeatureNotFound(_) => Status::NotFound,
            _ => Status::BadRequest,
        }
    }
}

/// Why a feature could not be resolved for a space. All of these are
/// "not found" to the caller; the variants keep the diagnosis apart.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FeatureNotFound {
    #[error("type {type_name} declares no feature kind and has no registered alias")]
    UnknownKind { type_name: String },

    #[error("feature '{kind}' not available in space '{space}'")]
    KindNotBound { kind: String, space: String },

    #[error("feature '{kind}/{name}' not available in space '{space}'")]
    NameNotBound {
        kind: String,
        name: String,
        space: String,
    },

    #[error("provider for feature '{kind}/{name}' is missing in space '{space}'")]
    ProviderMissing {
        kind: String,
        name: String,
        space: String,
    },

    #[error("feature '{kind}' has no registered provider '{provider}'")]
    ProviderNotRegistered { kind: String, provider: String },
}

/// Coarse classification of [`FeatureNotFound`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotFoundCause {
    NoKind,
    NoBinding,
    NoProvider,
}

impl FeatureNotFound {
    pub fn cause(&self) -> NotFoundCause {
        match self {
            FeatureNotFound::UnknownKind { .. } => NotFoundCause::NoKind,
            FeatureNotFound::KindNotBound { .. }
            | FeatureNotFound::NameNotBound { .. }
            | FeatureNotFound::ProviderMissing { .. } => NotFoundCause::NoBinding,
            FeatureNotFound::ProviderNotRegistered { .. } => NotFoundCause::NoProvider,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RoutingError {
    #[error("can't resolve {target} from request: {reason}")]
    Unresolved { target: String, reason: String },

    #[error("space '{0}' not found")]
    SpaceNotFound(String),

    #[error("space '{0}' is not available")]
    SpaceUnavailable(String),

    #[error("api '{app}' not found in space '{space}'")]
    AppNotFound { space: String, app: String },

    #[error("api '{app}' in space '{space}' stopped or paused")]
    AppUnavailable { space: String, app: String },
}

impl RoutingError {
    pub fn status(&self) -> Status {
        match self {
            RoutingError::Unresolved { .. }
            | RoutingError::SpaceNotFound(_)
            | RoutingError::AppNotFound { .. } => Status::NotFound,
            RoutingError::SpaceUnavailable(_) | RoutingError::AppUnavailable { .. } => {
                Status::Unavailable
            }
        }
    }
}

/// Failures reported by a space's concurrency policy.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    #[error("Cancellation Error | {0}")]
    Cancelled(String),

    #[error("Timeout Error | no result after {}ms", .after.as_millis())]
    TimedOut { after: Duration },

    #[error("Rejected | {0}")]
    Rejected(String),

    #[error("Execution Error | {0}")]
    Failed(String),
}

impl ExecutionError {
    pub fn status(&self) -> Status {
        match self {
            ExecutionError::Cancelled(_) => Status::Cancelled,
            ExecutionError::TimedOut { .. } => Status::RequestTimeout,
            ExecutionError::Rejected(_) | ExecutionError::Failed(_) => Status::BadRequest,
        }
    }
}

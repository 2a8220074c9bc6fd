//! Error types for the Hetzner Cloud provider.
//!
//! Errors are grouped by where they originate: configuration, persisted
//! state, the remote API, asynchronous actions, planning and validation.
//! Every failure is surfaced to the host unmodified; nothing here retries
//! or suppresses.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for the provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// State management errors.
    #[error("State error: {0}")]
    State(#[from] StateError),

    /// Hetzner Cloud API errors.
    #[error("Hetzner Cloud API error: {0}")]
    Api(#[from] ApiError),

    /// An asynchronous action finished with an error.
    #[error("Action failed: {0}")]
    Job(#[from] JobError),

    /// Planning errors.
    #[error("Planning error: {0}")]
    Plan(#[from] PlanError),

    /// Input that was rejected before any remote call.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file was not found.
    #[error("Configuration file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// The configuration file could not be parsed.
    #[error("Failed to parse configuration: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },

    /// Validation failed.
    #[error("Configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation error.
        message: String,
        /// Field that failed validation.
        field: Option<String>,
    },

    /// Environment variable is missing.
    #[error("Missing environment variable: {name}")]
    MissingEnvVar {
        /// Name of the missing variable.
        name: String,
    },

    /// Duplicate resource declaration.
    #[error("Duplicate {resource_type} declaration: {name}")]
    DuplicateName {
        /// Type of resource (server, ssh key, ...).
        resource_type: String,
        /// The duplicated name.
        name: String,
    },
}

/// State management errors.
#[derive(Debug, Error)]
pub enum StateError {
    /// State is corrupted.
    #[error("State is corrupted: {message}")]
    Corrupted {
        /// Description of the corruption.
        message: String,
    },

    /// State could not be written.
    #[error("Failed to write state: {message}")]
    WriteFailed {
        /// Description of the write failure.
        message: String,
    },

    /// State lock acquisition failed.
    #[error("Failed to acquire state lock: {message}")]
    LockFailed {
        /// Description of the lock failure.
        message: String,
    },

    /// State lock is held by another process.
    #[error("State is locked by another process (lock holder: {holder}, since: {since})")]
    LockedByOther {
        /// Identifier of the lock holder.
        holder: String,
        /// When the lock was acquired.
        since: String,
    },

    /// Serialization error.
    #[error("State serialization error: {message}")]
    SerializationError {
        /// Description of the serialization error.
        message: String,
    },

    /// State version mismatch.
    #[error("State version mismatch: expected {expected}, found {found}")]
    VersionMismatch {
        /// Expected state version.
        expected: String,
        /// Found state version.
        found: String,
    },
}

/// Hetzner Cloud API errors.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Authentication failed.
    #[error("Hetzner Cloud authentication failed: {message}")]
    AuthenticationFailed {
        /// Description of the auth failure.
        message: String,
    },

    /// The API rejected the request.
    #[error("Hetzner Cloud API request failed: {status} {code} - {message}")]
    ApiRequestFailed {
        /// HTTP status code.
        status: u16,
        /// Machine-readable error code from the error envelope.
        code: String,
        /// Error message from the API.
        message: String,
    },

    /// Rate limited.
    #[error("Hetzner Cloud API rate limited, retry after {retry_after_secs} seconds")]
    RateLimited {
        /// Seconds to wait before retrying.
        retry_after_secs: u64,
    },

    /// Remote object not found.
    #[error("{resource} not found: {id}")]
    NotFound {
        /// Kind of object that was looked up.
        resource: String,
        /// Id or name used for the lookup.
        id: String,
    },

    /// Network error.
    #[error("Network error communicating with Hetzner Cloud: {message}")]
    NetworkError {
        /// Description of the network error.
        message: String,
    },

    /// Invalid response from API.
    #[error("Invalid response from Hetzner Cloud API: {message}")]
    InvalidResponse {
        /// Description of the response issue.
        message: String,
    },
}

/// An asynchronous action resolved to an error.
#[derive(Debug, Error)]
#[error("action {action_id} ({command}) failed: {code}: {message}")]
pub struct JobError {
    /// Id of the failed action.
    pub action_id: u64,
    /// Command the action was running (e.g. `change_server_type`).
    pub command: String,
    /// Error code reported by the API.
    pub code: String,
    /// Error message reported by the API.
    pub message: String,
}

/// Planning errors.
#[derive(Debug, Error)]
pub enum PlanError {
    /// Desired and observed state describe different resource types.
    #[error("Cannot plan {desired} against observed {observed} state")]
    ResourceTypeMismatch {
        /// Resource type of the declaration.
        desired: String,
        /// Resource type of the stored state.
        observed: String,
    },

    /// An operation does not apply to the resource it targets.
    #[error("Operation {operation} is not supported for {resource_type}")]
    UnsupportedOperation {
        /// Operation kind.
        operation: String,
        /// Target resource type.
        resource_type: String,
    },

    /// An operation needs observed state that is not present.
    #[error("Operation {operation} requires existing state for {resource_type}")]
    MissingState {
        /// Operation kind.
        operation: String,
        /// Target resource type.
        resource_type: String,
    },
}

/// Input rejected before any remote call.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A resource identity string is not a valid numeric id.
    #[error("Invalid resource id '{id}': {reason}")]
    InvalidId {
        /// The offending identity string.
        id: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Two mutually exclusive fields were both set.
    #[error("Fields '{first}' and '{second}' conflict; set only one")]
    ConflictingFields {
        /// First field.
        first: String,
        /// Second field.
        second: String,
    },

    /// A data source lookup was given neither an id nor a name.
    #[error("Data source {data_source} needs an id or a name")]
    MissingLookupKey {
        /// Data source kind.
        data_source: String,
    },

    /// A field value is outside the accepted set.
    #[error("Invalid value '{value}' for field '{field}'")]
    InvalidValue {
        /// Field name.
        field: String,
        /// Rejected value.
        value: String,
    },
}

/// Result type alias for provider operations.
pub type Result<T> = std::result::Result<T, ProviderError>;

impl ProviderError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns true if the error is a transport-level failure worth retrying.
    ///
    /// Only idempotent reads are ever retried; see [`crate::hcloud::HcloudClient`].
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Api(ApiError::RateLimited { .. } | ApiError::NetworkError { .. })
                | Self::State(StateError::LockFailed { .. })
        )
    }

    /// Returns true if the remote object does not exist.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::Api(ApiError::NotFound { .. }))
    }

    /// Returns the suggested retry delay in seconds, if applicable.
    #[must_use]
    pub const fn retry_delay_secs(&self) -> Option<u64> {
        match self {
            Self::Api(ApiError::RateLimited { retry_after_secs }) => Some(*retry_after_secs),
            Self::Api(ApiError::NetworkError { .. }) => Some(1),
            Self::State(StateError::LockFailed { .. }) => Some(2),
            _ => None,
        }
    }
}

impl ConfigError {
    /// Creates a validation error for a specific field.
    #[must_use]
    pub fn validation(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: Some(field.into()),
        }
    }
}

impl StateError {
    /// Creates a serialization error with the given message.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::SerializationError {
            message: message.into(),
        }
    }

    /// Creates a write error with the given message.
    #[must_use]
    pub fn write(message: impl Into<String>) -> Self {
        Self::WriteFailed {
            message: message.into(),
        }
    }
}

impl ApiError {
    /// Creates an API request error.
    #[must_use]
    pub fn api_error(status: u16, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ApiRequestFailed {
            status,
            code: code.into(),
            message: message.into(),
        }
    }

    /// Creates a network error.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::NetworkError {
            message: message.into(),
        }
    }

    /// Creates a not-found error.
    #[must_use]
    pub fn not_found(resource: impl Into<String>, id: impl ToString) -> Self {
        Self::NotFound {
            resource: resource.into(),
            id: id.to_string(),
        }
    }
}

impl PlanError {
    /// Creates an unsupported-operation error.
    #[must_use]
    pub fn unsupported(operation: impl ToString, resource_type: impl ToString) -> Self {
        Self::UnsupportedOperation {
            operation: operation.to_string(),
            resource_type: resource_type.to_string(),
        }
    }

    /// Creates a missing-state error.
    #[must_use]
    pub fn missing_state(operation: impl ToString, resource_type: impl ToString) -> Self {
        Self::MissingState {
            operation: operation.to_string(),
            resource_type: resource_type.to_string(),
        }
    }
}

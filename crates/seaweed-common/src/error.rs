//! Error types for the Seaweed operator
//!
//! Errors are structured with fields to aid debugging in production.
//! Store failures keep the object kind and name they were acting on, and
//! builder failures keep the role whose output was inconsistent.

use thiserror::Error;

/// Default context value when no specific context is available
pub const UNKNOWN_CONTEXT: &str = "unknown";

/// Failure of a single call to the object store.
///
/// There is no "not found" variant: lookups report a missing object as `Ok(None)`.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Create rejected because an object with the same key already exists
    #[error("{kind} {name} already exists")]
    AlreadyExists {
        /// Object kind (Service, ConfigMap, StatefulSet)
        kind: String,
        /// Object name
        name: String,
    },

    /// Update rejected because the stored object changed since it was read
    #[error("conflict updating {kind} {name}")]
    Conflict {
        /// Object kind (Service, ConfigMap, StatefulSet)
        kind: String,
        /// Object name
        name: String,
    },

    /// The store refused the request outright (validation, RBAC, bad request)
    #[error("{operation} rejected with {code}: {message}")]
    Rejected {
        /// The store operation that was refused (get, create, update)
        operation: String,
        /// HTTP status code returned by the store
        code: u16,
        /// Description of the rejection
        message: String,
    },

    /// Connectivity or availability failure talking to the store
    #[error("{operation} failed: {message}")]
    Transient {
        /// The store operation that failed (get, create, update)
        operation: String,
        /// Description of what failed
        message: String,
    },
}

impl StoreError {
    /// Create a transient error for the given operation
    pub fn transient(operation: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Transient {
            operation: operation.into(),
            message: msg.into(),
        }
    }

    /// Returns true when repeating the same call can succeed without a spec change
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Rejected { .. })
    }

    /// Returns true for the write races a later pass resolves on its own
    pub fn is_write_race(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. } | Self::Conflict { .. })
    }
}

/// Main error type for Seaweed operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error outside the store gateway (status patches, CRD install)
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// Store gateway error surfaced from an ensure step
    #[error("store error: {source}")]
    Store {
        /// The underlying store failure
        #[from]
        source: StoreError,
    },

    /// A builder produced an object inconsistent with the key or label scheme
    #[error("builder invariant violated for {role}: {message}")]
    BuilderInvariant {
        /// Role whose builder misbehaved (e.g. "master-peer")
        role: String,
        /// Description of the inconsistency
        message: String,
    },

    /// Desired-state record is unusable as given
    #[error("validation error for {cluster}: {message}")]
    Validation {
        /// Name of the Seaweed resource
        cluster: String,
        /// Description of what's invalid
        message: String,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Context where the error occurred (e.g., "controller", "startup")
        context: String,
    },
}

impl Error {
    /// Create a builder invariant error for a role
    pub fn builder_invariant(role: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::BuilderInvariant {
            role: role.into(),
            message: msg.into(),
        }
    }

    /// Create a validation error with cluster context
    pub fn validation_for(cluster: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Validation {
            cluster: cluster.into(),
            message: msg.into(),
        }
    }

    /// Create an internal error with the given message
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: UNKNOWN_CONTEXT.to_string(),
        }
    }

    /// Check if this error is retryable
    ///
    /// Builder and validation errors need a code or spec change.
    /// Kubernetes 4xx errors other than conflicts and throttling are treated the same way,
    /// whether they come back directly or as a rejected store call.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube { source } => !matches!(
                source,
                kube::Error::Api(ae) if (400..500).contains(&ae.code) && ae.code != 409 && ae.code != 429
            ),
            Error::Store { source } => source.is_retryable(),
            Error::BuilderInvariant { .. } => false,
            Error::Validation { .. } => false,
            Error::Internal { .. } => true,
        }
    }

    /// Short machine-readable category, used as the status reason
    pub fn reason(&self) -> &'static str {
        match self {
            Error::Kube { .. } => "KubeError",
            Error::Store { .. } => "StoreError",
            Error::BuilderInvariant { .. } => "BuilderInvariantViolation",
            Error::Validation { .. } => "ValidationFailed",
            Error::Internal { .. } => "InternalError",
        }
    }
}

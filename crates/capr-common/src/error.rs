//! Error types for the RKE2 control-plane core
//!
//! Errors are structured with fields to aid debugging in production.
//! Variants that concern a managed cluster carry its `namespace/name` so the
//! caller's retry policy can tell configuration failures, connection failures
//! and trust-material failures apart.

use thiserror::Error;

/// Default context value when no specific context is available
pub const UNKNOWN_CONTEXT: &str = "unknown";

/// Main error type for control-plane operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// Validation error for CRD specs or client usage
    #[error("validation error for {cluster}: {message}")]
    Validation {
        /// Name of the cluster with invalid configuration
        cluster: String,
        /// Description of what's invalid
        message: String,
        /// The invalid field path (e.g., "spec.machineTemplate.infrastructureRef")
        field: Option<String>,
    },

    /// A client for a workload cluster could not be constructed
    ///
    /// Distinct from configuration resolution failures, which surface as
    /// whatever error the resolver returned.
    #[error("{cluster}: {source}")]
    RemoteConnection {
        /// `namespace/name` of the workload cluster
        cluster: String,
        /// The underlying client construction error
        #[source]
        source: kube::Error,
    },

    /// Certificate material could not be read, decoded or generated
    #[error("failed to get secret; {purpose} {secret}: {message}")]
    TrustMaterial {
        /// `namespace/name` of the cluster the material belongs to
        cluster: String,
        /// `namespace/name` of the secret holding the material
        secret: String,
        /// Human readable purpose of the material (e.g. "etcd CA bundle")
        purpose: String,
        /// Description of what failed
        message: String,
    },

    /// A bounded call against a workload cluster ran out of time
    #[error("timed out after {timeout_secs}s during {operation} against {cluster}")]
    Timeout {
        /// `namespace/name` of the workload cluster
        cluster: String,
        /// Operation that timed out (e.g. "get Secret kube-system/foo")
        operation: String,
        /// Timeout that was applied, in seconds
        timeout_secs: u64,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Context where the error occurred (e.g., "resolver", "management")
        context: String,
    },
}

impl Error {
    /// Create a validation error with the given message
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            cluster: UNKNOWN_CONTEXT.to_string(),
            message: msg.into(),
            field: None,
        }
    }

    /// Create a validation error with cluster context
    pub fn validation_for(cluster: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Validation {
            cluster: cluster.into(),
            message: msg.into(),
            field: None,
        }
    }

    /// Create a validation error with cluster context and field path
    pub fn validation_for_field(
        cluster: impl Into<String>,
        field: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::Validation {
            cluster: cluster.into(),
            message: msg.into(),
            field: Some(field.into()),
        }
    }

    /// Wrap a client construction failure for a workload cluster
    pub fn remote_connection(cluster: impl Into<String>, source: kube::Error) -> Self {
        Self::RemoteConnection {
            cluster: cluster.into(),
            source,
        }
    }

    /// Create a trust material error for a cluster secret
    pub fn trust_material(
        cluster: impl Into<String>,
        secret: impl Into<String>,
        purpose: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::TrustMaterial {
            cluster: cluster.into(),
            secret: secret.into(),
            purpose: purpose.into(),
            message: msg.into(),
        }
    }

    /// Create a timeout error for a bounded workload cluster call
    pub fn timeout(
        cluster: impl Into<String>,
        operation: impl Into<String>,
        timeout: std::time::Duration,
    ) -> Self {
        Self::Timeout {
            cluster: cluster.into(),
            operation: operation.into(),
            timeout_secs: timeout.as_secs(),
        }
    }

    /// Create an internal error with context
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// Check if this is a Kubernetes 409 (already exists / optimistic concurrency)
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Kube { source: kube::Error::Api(ae) } if ae.code == 409)
    }

    /// Check if this error is retryable
    ///
    /// Validation errors are not retryable (require config fix).
    /// Conflicts are retryable once the caller has re-read current state.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube { source } => match source {
                kube::Error::Api(ae) if ae.code == 409 || ae.code == 429 => true,
                kube::Error::Api(ae) => !(400..500).contains(&ae.code),
                _ => true,
            },
            Error::Validation { .. } => false,
            Error::RemoteConnection { .. } => true,
            Error::TrustMaterial { .. } => true,
            Error::Timeout { .. } => true,
            Error::Internal { .. } => true,
        }
    }

    /// Get the cluster name if this error is associated with a specific cluster
    pub fn cluster(&self) -> Option<&str> {
        match self {
            Error::Validation { cluster, .. } => Some(cluster),
            Error::RemoteConnection { cluster, .. } => Some(cluster),
            Error::TrustMaterial { cluster, .. } => Some(cluster),
            Error::Timeout { cluster, .. } => Some(cluster),
            Error::Kube { .. } | Error::Internal { .. } => None,
        }
    }

    /// Get the context if this error has one
    pub fn context(&self) -> Option<&str> {
        match self {
            Error::Internal { context, .. } => Some(context),
            _ => None,
        }
    }
}

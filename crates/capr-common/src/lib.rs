//! Common types for the RKE2 control plane: CRDs, errors, and utilities

#![deny(missing_docs)]

pub mod cluster_key;
pub mod config;
pub mod crd;
pub mod error;
pub mod kube_utils;
pub mod telemetry;

pub use cluster_key::ClusterKey;
pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Name used when building clients and field managers for this controller
pub const CONTROLLER_NAME: &str = "rke2-controlplane-controller";

/// Label set by CAPI on every object that belongs to a cluster
pub const CLUSTER_NAME_LABEL: &str = "cluster.x-k8s.io/cluster-name";

/// Annotation on an infrastructure machine recording the template it was cloned from
pub const TEMPLATE_CLONED_FROM_NAME_ANNOTATION: &str = "cluster.x-k8s.io/cloned-from-name";

/// Annotation on an infrastructure machine recording the group-kind of its template
pub const TEMPLATE_CLONED_FROM_GROUP_KIND_ANNOTATION: &str =
    "cluster.x-k8s.io/cloned-from-groupkind";

/// Annotation on a Machine carrying the JSON server configuration it was created with
pub const RKE2_SERVER_CONFIGURATION_ANNOTATION: &str =
    "controlplane.cluster.x-k8s.io/rke2-server-configuration";

/// Annotation set on RKE2Configs whose files were injected by the Rancher Turtles webhook
pub const TURTLES_SYSTEM_AGENT_ANNOTATION: &str = "cluster-api.cattle.io/turtles-system-agent";

/// Secret type used for CAPI-managed certificate and kubeconfig secrets
pub const CLUSTER_SECRET_TYPE: &str = "cluster.x-k8s.io/secret";

/// Namespace holding RKE2 system secrets inside a workload cluster
pub const WORKLOAD_SYSTEM_NAMESPACE: &str = "kube-system";

/// Install aws-lc-rs as the process-wide rustls crypto provider
///
/// Must run before any kube client is built. Safe to call repeatedly; a
/// provider that is already installed is left in place.
pub fn install_crypto_provider() {
    if rustls::crypto::CryptoProvider::get_default().is_some() {
        return;
    }
    if rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .is_err()
    {
        tracing::debug!("crypto provider installed concurrently, keeping it");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crypto_provider_install_is_idempotent() {
        install_crypto_provider();
        install_crypto_provider();
        assert!(rustls::crypto::CryptoProvider::get_default().is_some());
    }
}

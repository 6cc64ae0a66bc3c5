//! Namespaced identity of a CAPI cluster

use std::fmt;

/// Namespace + name key identifying a managed cluster
///
/// Used to resolve the cluster's kubeconfig and to name the secrets that
/// hold its certificates. Displays as `namespace/name`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClusterKey {
    /// Namespace of the CAPI Cluster object
    pub namespace: String,
    /// Name of the CAPI Cluster object
    pub name: String,
}

impl ClusterKey {
    /// Create a new cluster key
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Name of a cluster-scoped secret with the given suffix (e.g. `my-cluster-etcd`)
    pub fn secret_name(&self, suffix: &str) -> String {
        format!("{}-{}", self.name, suffix)
    }
}

impl fmt::Display for ClusterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

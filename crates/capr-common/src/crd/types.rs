//! Supporting types shared by the RKE2 and CAPI CRDs

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::kube_utils::parse_api_version;

/// Reference to another Kubernetes object
///
/// Mirrors the subset of `corev1.ObjectReference` CAPI uses for bootstrap,
/// infrastructure and secret references.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ObjectReference {
    /// API version of the referent (e.g. "infrastructure.cluster.x-k8s.io/v1beta1")
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub api_version: String,
    /// Kind of the referent
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub kind: String,
    /// Name of the referent
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    /// Namespace of the referent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl ObjectReference {
    /// Create a reference from apiVersion, kind and name
    pub fn new(
        api_version: impl Into<String>,
        kind: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            api_version: api_version.into(),
            kind: kind.into(),
            name: name.into(),
            namespace: None,
        }
    }

    /// Group-kind in Kubernetes string form: `Kind.group`, or `Kind` for the core group
    pub fn group_kind(&self) -> String {
        let (group, _) = parse_api_version(&self.api_version);
        if group.is_empty() {
            self.kind.clone()
        } else {
            format!("{}.{}", self.kind, group)
        }
    }
}

/// Extra configuration for an RKE2 component (kube-apiserver, kubelet, ...)
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ComponentConfig {
    /// Extra environment variables for the component
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra_env: BTreeMap<String, String>,
    /// Extra command-line arguments
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_args: Vec<String>,
    /// Extra host path mounts
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra_mounts: BTreeMap<String, String>,
    /// Image overriding the default for this component
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub override_image: Option<String>,
}

//! RKE2 server configuration carried by the control plane spec
//!
//! The same structure is serialized into the
//! `controlplane.cluster.x-k8s.io/rke2-server-configuration` annotation of
//! every control-plane Machine, so field names follow the JSON produced by
//! the CAPI provider.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{ComponentConfig, ObjectReference};

/// Server-only RKE2 settings
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RKE2ServerConfig {
    /// Secret holding the kube-apiserver audit policy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audit_policy_secret: Option<ObjectReference>,

    /// Address the RKE2 supervisor binds to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bind_address: Option<String>,

    /// CNI plugin to deploy (none, canal, cilium, calico)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cni: Option<String>,

    /// Deploy Multus alongside the primary CNI
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub cni_multus_enable: bool,

    /// Override for the pause image
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pause_image: Option<String>,

    /// Cluster DNS service IP
    #[serde(default, rename = "clusterDNS", skip_serializing_if = "Option::is_none")]
    pub cluster_dns: Option<String>,

    /// Cluster domain
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_domain: Option<String>,

    /// Cloud provider name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloud_provider_name: Option<String>,

    /// ConfigMap holding the cloud provider configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloud_provider_config_map: Option<ObjectReference>,

    /// Built-in components to disable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disable_components: Option<DisableComponents>,

    /// kube-apiserver configuration
    #[serde(default, rename = "kubeAPIServer", skip_serializing_if = "Option::is_none")]
    pub kube_api_server: Option<ComponentConfig>,

    /// kube-controller-manager configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kube_controller_manager: Option<ComponentConfig>,

    /// kube-scheduler configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kube_scheduler: Option<ComponentConfig>,

    /// Embedded etcd configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etcd: Option<EtcdConfig>,

    /// NodePort range for services
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_node_port_range: Option<String>,

    /// Enable the embedded Spegel registry mirror
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub embedded_registry: bool,
}

/// Components RKE2 should not deploy
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DisableComponents {
    /// Kubernetes components (e.g. "scheduler", "kubeProxy")
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub kubernetes_components: Vec<String>,
    /// Packaged plugins (e.g. "rke2-ingress-nginx")
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub plugin_components: Vec<String>,
}

/// Embedded etcd settings
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EtcdConfig {
    /// Expose etcd metrics on the node's address
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub expose_metrics: bool,
    /// Snapshot backup settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_config: Option<EtcdBackupConfig>,
    /// Extra etcd process configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_config: Option<ComponentConfig>,
}

/// etcd snapshot schedule and retention
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EtcdBackupConfig {
    /// Enable automatic snapshots
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_automatic_snapshots: Option<bool>,
    /// Snapshot name prefix
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_name: Option<String>,
    /// Cron schedule for snapshots
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule_cron: Option<String>,
    /// Number of snapshots to keep
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retention: Option<String>,
    /// Directory snapshots are written to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<String>,
    /// Secret holding S3 credentials for off-node snapshots
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s3_credentials_secret: Option<ObjectReference>,
}

impl RKE2ServerConfig {
    /// True when no field differs from the default
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

//! RKE2Config bootstrap CRD
//!
//! An `RKE2Config` is the configuration a Machine was actually bootstrapped
//! with. Its spec is also embedded inline in the control plane spec, which
//! makes the two directly comparable.

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{ComponentConfig, ObjectReference};

/// Bootstrap configuration for an RKE2 node
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[kube(
    group = "bootstrap.cluster.x-k8s.io",
    version = "v1beta1",
    kind = "RKE2Config",
    plural = "rke2configs",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct RKE2ConfigSpec {
    /// Files written to the node before RKE2 starts
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<File>,

    /// Commands run before RKE2 is installed
    #[serde(default, rename = "preRKE2Commands", skip_serializing_if = "Vec::is_empty")]
    pub pre_rke2_commands: Vec<String>,

    /// Commands run after RKE2 is installed
    #[serde(default, rename = "postRKE2Commands", skip_serializing_if = "Vec::is_empty")]
    pub post_rke2_commands: Vec<String>,

    /// Settings shared by servers and agents
    #[serde(default)]
    pub agent_config: AgentConfig,

    /// Private registry mirrors and credentials
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_registries_config: Option<Registry>,

    /// Gzip the generated cloud-init user data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gzip_user_data: Option<bool>,
}

/// A file to place on the node
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct File {
    /// Absolute path on the node
    pub path: String,
    /// Owner in `user:group` form
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    /// Octal permissions (e.g. "0640")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permissions: Option<String>,
    /// Encoding of `content` (base64, gzip, gzip+base64)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
    /// Inline content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Content sourced from a secret key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_from: Option<FileSource>,
}

impl File {
    /// Create a file with inline content
    pub fn inline(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: Some(content.into()),
            ..Default::default()
        }
    }
}

/// Source of file content
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FileSource {
    /// Secret key holding the content
    pub secret: SecretFileSource,
}

/// Secret key selector for file content
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SecretFileSource {
    /// Secret name in the Machine's namespace
    pub name: String,
    /// Key within the secret
    pub key: String,
}

/// Configuration common to RKE2 servers and agents
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AgentConfig {
    /// RKE2 version (deprecated in favor of the control plane `version`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// RKE2 data directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<String>,
    /// CIS profile to enforce
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cis_profile: Option<String>,
    /// Labels registered with the node
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub node_labels: Vec<String>,
    /// Taints registered with the node
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub node_taints: Vec<String>,
    /// Kubelet configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubelet: Option<ComponentConfig>,
    /// kube-proxy configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kube_proxy: Option<ComponentConfig>,
    /// NTP settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ntp: Option<Ntp>,
    /// ConfigMap holding the image credential provider configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_credential_provider_config_map: Option<ObjectReference>,
    /// Refuse to start if kernel defaults differ from kubelet expectations
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub protect_kernel_defaults: bool,
    /// Enable SELinux in containerd
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub selinux: bool,
    /// Install from pre-staged artifacts
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub airgapped: bool,
    /// Bootstrap data format (cloud-config or ignition)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

/// NTP client settings
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Ntp {
    /// NTP servers
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub servers: Vec<String>,
    /// Enable NTP
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
}

/// containerd registry configuration
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Registry {
    /// Mirrors keyed by registry host
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub mirrors: BTreeMap<String, Mirror>,
    /// Per-registry auth/TLS keyed by registry host
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub configs: BTreeMap<String, RegistryConfig>,
}

/// Mirror endpoints for a registry
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Mirror {
    /// Endpoints tried in order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub endpoint: Vec<String>,
    /// Image name rewrite rules
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub rewrite: BTreeMap<String, String>,
}

/// Credentials and TLS settings for a registry
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RegistryConfig {
    /// Secret with username/password or token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_secret: Option<ObjectReference>,
    /// Secret with CA/cert/key for the registry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls_secret: Option<ObjectReference>,
    /// Skip TLS verification
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub insecure_skip_verify: bool,
}

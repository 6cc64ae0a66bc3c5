//! CAPI Machine, the observed state of a single managed node
//!
//! Only the fields the control plane reads are modelled; unknown fields are
//! ignored on deserialization.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::ObjectReference;

/// Specification of a CAPI Machine
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[kube(
    group = "cluster.x-k8s.io",
    version = "v1beta1",
    kind = "Machine",
    plural = "machines",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct MachineSpec {
    /// Name of the CAPI Cluster this Machine belongs to
    #[serde(default)]
    pub cluster_name: String,

    /// Bootstrap configuration reference
    #[serde(default)]
    pub bootstrap: Bootstrap,

    /// Infrastructure machine backing this Machine
    #[serde(default)]
    pub infrastructure_ref: ObjectReference,

    /// Version the node reports (either Kubernetes or RKE2 form)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Cloud provider ID of the node
    #[serde(default, rename = "providerID", skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,

    /// Failure domain the Machine was placed in
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_domain: Option<String>,
}

/// Bootstrap section of a Machine
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Bootstrap {
    /// Reference to the bootstrap config (an RKE2Config)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_ref: Option<ObjectReference>,

    /// Secret holding rendered bootstrap data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_secret_name: Option<String>,
}

//! RKE2ControlPlane Custom Resource Definition
//!
//! The desired state of a cluster's control plane: which RKE2 version to
//! run, the server configuration, the bootstrap configuration every
//! control-plane Machine should carry, and the infrastructure template new
//! Machines are cloned from.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::bootstrap::RKE2ConfigSpec;
use super::server_config::RKE2ServerConfig;
use super::types::ObjectReference;

/// Specification for an RKE2ControlPlane
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "controlplane.cluster.x-k8s.io",
    version = "v1beta1",
    kind = "RKE2ControlPlane",
    plural = "rke2controlplanes",
    namespaced,
    printcolumn = r#"{"name":"Version","type":"string","jsonPath":".spec.version"}"#,
    printcolumn = r#"{"name":"Replicas","type":"integer","jsonPath":".spec.replicas"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct RKE2ControlPlaneSpec {
    /// Bootstrap configuration shared by every control-plane Machine
    #[serde(flatten)]
    pub rke2_config_spec: RKE2ConfigSpec,

    /// Server-only RKE2 configuration
    #[serde(default)]
    pub server_config: RKE2ServerConfig,

    /// Template for control-plane Machines
    pub machine_template: RKE2ControlPlaneMachineTemplate,

    /// Desired number of control-plane Machines
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,

    /// Desired RKE2 version (e.g. "v1.28.5+rke2r1")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// How new nodes find the control plane (internal-first, address, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registration_method: Option<String>,
}

/// Machine template for control-plane Machines
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RKE2ControlPlaneMachineTemplate {
    /// Infrastructure template new Machines are cloned from
    pub infrastructure_ref: ObjectReference,

    /// Maximum time to drain a node before deletion (e.g. "10m")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_drain_timeout: Option<String>,
}

impl RKE2ControlPlaneSpec {
    /// Desired version for control-plane Machines
    ///
    /// A non-empty `spec.version` wins; older resources only set the
    /// deprecated `spec.agentConfig.version`.
    pub fn desired_version(&self) -> Option<&str> {
        self.version
            .as_deref()
            .filter(|v| !v.is_empty())
            .or(self.rke2_config_spec.agent_config.version.as_deref())
    }

    /// Validate the control plane specification
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.desired_version().map_or(true, str::is_empty) {
            return Err(crate::Error::validation_for_field(
                crate::error::UNKNOWN_CONTEXT,
                "spec.version",
                "a version must be set in spec.version or spec.agentConfig.version",
            ));
        }
        let infra = &self.machine_template.infrastructure_ref;
        if infra.name.is_empty() || infra.kind.is_empty() {
            return Err(crate::Error::validation_for_field(
                crate::error::UNKNOWN_CONTEXT,
                "spec.machineTemplate.infrastructureRef",
                "infrastructure template must have a kind and name",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::File;

    fn sample_spec() -> RKE2ControlPlaneSpec {
        RKE2ControlPlaneSpec {
            machine_template: RKE2ControlPlaneMachineTemplate {
                infrastructure_ref: ObjectReference::new(
                    "infrastructure.cluster.x-k8s.io/v1beta1",
                    "DockerMachineTemplate",
                    "cp-template",
                ),
                node_drain_timeout: None,
            },
            version: Some("v1.28.5+rke2r1".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn desired_version_prefers_spec_version() {
        let mut spec = sample_spec();
        spec.rke2_config_spec.agent_config.version = Some("v1.27.1+rke2r1".to_string());
        assert_eq!(spec.desired_version(), Some("v1.28.5+rke2r1"));
    }

    #[test]
    fn desired_version_falls_back_to_agent_config() {
        let mut spec = sample_spec();
        spec.version = None;
        spec.rke2_config_spec.agent_config.version = Some("v1.27.1+rke2r1".to_string());
        assert_eq!(spec.desired_version(), Some("v1.27.1+rke2r1"));
    }

    /// Story: `version: ""` in a manifest is the same as leaving it out
    ///
    /// An empty desired version would mark every versioned Machine as
    /// outdated, so it defers to the agent config version.
    #[test]
    fn story_empty_spec_version_falls_back_to_agent_config() {
        let json = serde_json::json!({
            "version": "",
            "agentConfig": { "version": "v1.28.5+rke2r1" },
            "machineTemplate": {
                "infrastructureRef": {
                    "apiVersion": "infrastructure.cluster.x-k8s.io/v1beta1",
                    "kind": "DockerMachineTemplate",
                    "name": "cp-template"
                }
            }
        });
        let spec: RKE2ControlPlaneSpec = serde_json::from_value(json).expect("deserialize");
        assert_eq!(spec.version.as_deref(), Some(""));
        assert_eq!(spec.desired_version(), Some("v1.28.5+rke2r1"));
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn validate_requires_version_and_template() {
        assert!(sample_spec().validate().is_ok());

        let mut no_version = sample_spec();
        no_version.version = None;
        assert!(no_version.validate().is_err());

        let mut no_template = sample_spec();
        no_template.machine_template.infrastructure_ref.name.clear();
        assert!(no_template.validate().is_err());
    }

    #[test]
    fn bootstrap_fields_are_inlined() {
        let mut spec = sample_spec();
        spec.rke2_config_spec.files = vec![File::inline("/etc/motd", "hi")];
        let json = serde_json::to_value(&spec).expect("serialize");
        assert_eq!(json["files"][0]["path"], "/etc/motd");
        assert_eq!(json["machineTemplate"]["infrastructureRef"]["name"], "cp-template");

        let back: RKE2ControlPlaneSpec = serde_json::from_value(json).expect("deserialize");
        assert_eq!(back, spec);
    }
}

//! Machine conformance filters
//!
//! Decide, per control-plane Machine, whether it still matches the desired
//! `RKE2ControlPlane` or must be rolled out. Every check here is a pure
//! function over borrowed snapshots: no I/O, no errors.
//!
//! The checks share one policy. Missing information (no server configuration annotation,
//! no bootstrap reference, no infrastructure object) never forces a rollout.
//! Corrupted information (an annotation that fails to decode) always does.

use std::borrow::Cow;
use std::collections::BTreeMap;

use kube::api::DynamicObject;
use kube::ResourceExt;
use tracing::{debug, trace};

use capr_common::crd::{
    Machine, ObjectReference, RKE2Config, RKE2ConfigSpec, RKE2ControlPlane, RKE2ServerConfig,
};
use capr_common::{
    RKE2_SERVER_CONFIGURATION_ANNOTATION, TEMPLATE_CLONED_FROM_GROUP_KIND_ANNOTATION,
    TEMPLATE_CLONED_FROM_NAME_ANNOTATION, TURTLES_SYSTEM_AGENT_ANNOTATION,
};

use crate::version::{compare_versions, is_rke2_version, rke2_to_kube_version};

/// Bootstrap configs keyed by the name of the Machine they belong to
pub type BootstrapConfigs = BTreeMap<String, RKE2Config>;

/// Infrastructure machines keyed by the name of the Machine they back
pub type InfraObjects = BTreeMap<String, DynamicObject>;

/// Files the Rancher Turtles webhook writes into bootstrap configs
pub const TURTLES_INJECTED_FILES: [&str; 3] = [
    "/etc/rancher/agent/connect-info-config.json",
    "/opt/system-agent-install.sh",
    "/etc/rancher/agent/config.yaml",
];

/// Post-install command the Rancher Turtles webhook appends
pub const TURTLES_INJECTED_COMMAND: &str = "sh /opt/system-agent-install.sh";

/// A predicate over Machines that can be combined with [`and`]
pub type MachineFilter<'a> = Box<dyn Fn(&Machine) -> bool + Send + Sync + 'a>;

/// Combine filters conjunctively, short-circuiting on the first `false`
///
/// An empty set of filters matches every Machine.
pub fn and<'a>(filters: Vec<MachineFilter<'a>>) -> MachineFilter<'a> {
    Box::new(move |machine: &Machine| filters.iter().all(|filter| filter(machine)))
}

/// Filter matching Machines that need no rollout for `rcp`
///
/// Version, bootstrap configuration and infrastructure template lineage must
/// all match.
pub fn matches_configuration<'a>(
    rcp: &'a RKE2ControlPlane,
    bootstrap_configs: &'a BootstrapConfigs,
    infra_objects: &'a InfraObjects,
) -> MachineFilter<'a> {
    and(vec![
        Box::new(move |m: &Machine| matches_version(rcp.spec.desired_version(), m)),
        Box::new(move |m: &Machine| matches_bootstrap_config(rcp, bootstrap_configs, m)),
        Box::new(move |m: &Machine| {
            matches_template_cloned_from(
                &rcp.spec.machine_template.infrastructure_ref,
                infra_objects,
                m,
            )
        }),
    ])
}

/// Whether `machine` conforms to `rcp`; see [`matches_configuration`]
pub fn machine_matches(
    rcp: &RKE2ControlPlane,
    machine: &Machine,
    bootstrap_configs: &BootstrapConfigs,
    infra_objects: &InfraObjects,
) -> bool {
    matches_configuration(rcp, bootstrap_configs, infra_objects)(machine)
}

/// Whether the Machine's reported version is the desired one
///
/// The desired version is an RKE2 release. A Machine reporting a Kubernetes
/// version is compared against the Kubernetes version that release ships;
/// if that translation fails the result cannot be trusted and the Machine
/// is treated as matching.
pub fn matches_version(desired: Option<&str>, machine: &Machine) -> bool {
    let Some(reported) = machine.spec.version.as_deref() else {
        debug!(machine = %machine.name_any(), "machine reports no version");
        return false;
    };
    let desired = desired.unwrap_or_default();

    if is_rke2_version(reported) {
        return compare_versions(reported, desired);
    }

    match rke2_to_kube_version(desired) {
        Ok(kube_version) => compare_versions(reported, &kube_version),
        Err(e) => {
            debug!(
                machine = %machine.name_any(),
                desired,
                error = %e,
                "cannot translate desired version, not forcing rollout"
            );
            true
        }
    }
}

/// Decoded server configuration annotation of a Machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerConfigAnnotation {
    /// The Machine carries no server configuration annotation
    Absent,
    /// The annotation is present but is not a valid server configuration
    Corrupted(String),
    /// The server configuration the Machine was created with
    Present(RKE2ServerConfig),
}

impl ServerConfigAnnotation {
    /// Decode the annotation from a Machine
    ///
    /// JSON `null` decodes to the empty configuration.
    pub fn decode(machine: &Machine) -> Self {
        let Some(raw) = machine.annotations().get(RKE2_SERVER_CONFIGURATION_ANNOTATION) else {
            return Self::Absent;
        };
        match serde_json::from_str::<Option<RKE2ServerConfig>>(raw) {
            Ok(config) => Self::Present(config.unwrap_or_default()),
            Err(e) => Self::Corrupted(e.to_string()),
        }
    }
}

/// Whether the server configuration a Machine was created with is the desired one
pub fn match_server_config(desired: &RKE2ServerConfig, machine: &Machine) -> bool {
    match ServerConfigAnnotation::decode(machine) {
        ServerConfigAnnotation::Absent => true,
        ServerConfigAnnotation::Corrupted(error) => {
            debug!(
                machine = %machine.name_any(),
                %error,
                "server configuration annotation is corrupted"
            );
            false
        }
        ServerConfigAnnotation::Present(actual) => actual == *desired,
    }
}

/// Bootstrap config spec with webhook-injected files and commands removed
///
/// Only configs carrying the Turtles marker annotation are normalized; the
/// input is never modified.
pub fn normalize_injected(config: &RKE2Config) -> Cow<'_, RKE2ConfigSpec> {
    if !config
        .annotations()
        .contains_key(TURTLES_SYSTEM_AGENT_ANNOTATION)
    {
        return Cow::Borrowed(&config.spec);
    }

    let mut spec = config.spec.clone();
    spec.files
        .retain(|file| !TURTLES_INJECTED_FILES.contains(&file.path.as_str()));
    spec.post_rke2_commands
        .retain(|cmd| cmd != TURTLES_INJECTED_COMMAND);
    Cow::Owned(spec)
}

/// Whether the Machine was bootstrapped with the desired configuration
///
/// List fields are compared in order.
pub fn matches_bootstrap_config(
    rcp: &RKE2ControlPlane,
    bootstrap_configs: &BootstrapConfigs,
    machine: &Machine,
) -> bool {
    if !match_server_config(&rcp.spec.server_config, machine) {
        return false;
    }

    if machine.spec.bootstrap.config_ref.is_none() {
        return true;
    }

    let Some(config) = bootstrap_configs.get(&machine.name_any()) else {
        trace!(machine = %machine.name_any(), "bootstrap config not available");
        return true;
    };

    let matches = *normalize_injected(config) == rcp.spec.rke2_config_spec;
    if !matches {
        debug!(machine = %machine.name_any(), "bootstrap config differs from control plane");
    }
    matches
}

/// Whether the Machine's infrastructure was cloned from the desired template
pub fn matches_template_cloned_from(
    template: &ObjectReference,
    infra_objects: &InfraObjects,
    machine: &Machine,
) -> bool {
    let Some(infra) = infra_objects.get(&machine.name_any()) else {
        return true;
    };

    let annotations = infra.annotations();
    let (Some(name), Some(group_kind)) = (
        annotations.get(TEMPLATE_CLONED_FROM_NAME_ANNOTATION),
        annotations.get(TEMPLATE_CLONED_FROM_GROUP_KIND_ANNOTATION),
    ) else {
        return true;
    };

    *name == template.name && *group_kind == template.group_kind()
}

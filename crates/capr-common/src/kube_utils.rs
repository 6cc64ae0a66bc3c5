//! Shared Kubernetes utilities using kube-rs

use std::time::Duration;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Config, Resource};
use tracing::debug;

use crate::Error;

/// Parse apiVersion into (group, version)
///
/// # Examples
/// ```
/// use capr_common::kube_utils::parse_api_version;
///
/// let (group, version) = parse_api_version("cluster.x-k8s.io/v1beta1");
/// assert_eq!(group, "cluster.x-k8s.io");
/// assert_eq!(version, "v1beta1");
///
/// let (group, version) = parse_api_version("v1");
/// assert_eq!(group, "");
/// assert_eq!(version, "v1");
/// ```
pub fn parse_api_version(api_version: &str) -> (String, String) {
    match api_version.split_once('/') {
        Some((group, version)) => (group.to_string(), version.to_string()),
        None => (String::new(), api_version.to_string()),
    }
}

/// Build a controller owner reference pointing at `owner`
///
/// Objects carrying this reference are garbage collected with their owner.
/// Fails if the owner has not been persisted yet (no uid).
pub fn controller_owner_ref<K>(owner: &K) -> Result<OwnerReference, Error>
where
    K: Resource<DynamicType = ()>,
{
    owner.controller_owner_ref(&()).ok_or_else(|| {
        Error::validation(format!(
            "{} {} has no name or uid; cannot own other objects",
            K::kind(&()),
            owner.meta().name.as_deref().unwrap_or("<unnamed>")
        ))
    })
}

/// Apply a timeout to both connection setup and every read on a client config
pub fn apply_timeout(config: &mut Config, timeout: Duration) {
    config.connect_timeout = Some(timeout);
    config.read_timeout = Some(timeout);
}

/// Build a client config from kubeconfig YAML, bounded by `timeout`
pub async fn config_from_kubeconfig_yaml(yaml: &str, timeout: Duration) -> Result<Config, Error> {
    let kubeconfig = Kubeconfig::from_yaml(yaml).map_err(|e| {
        Error::internal_with_context(
            "config_from_kubeconfig",
            format!("failed to parse kubeconfig: {}", e),
        )
    })?;
    let mut config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
        .await
        .map_err(|e| {
            Error::internal_with_context(
                "config_from_kubeconfig",
                format!("failed to load kubeconfig: {}", e),
            )
        })?;
    apply_timeout(&mut config, timeout);
    debug!(cluster_url = %config.cluster_url, timeout_secs = timeout.as_secs(), "loaded kubeconfig");
    Ok(config)
}

//! Management cluster facade
//!
//! [`Management`] reads Machines and secrets from the management cluster
//! and opens time-bounded connections to workload clusters. Connections are
//! built per request; caching them is the caller's concern.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::Client;
use tracing::{debug, info};

#[cfg(test)]
use mockall::automock;

use capr_common::config::ManagementConfig;
use capr_common::crd::Machine;
use capr_common::kube_utils::{apply_timeout, config_from_kubeconfig_yaml};
use capr_common::{install_crypto_provider, ClusterKey, Error, CLUSTER_NAME_LABEL};
use capr_pki::Purpose;

use crate::client::{ApiRegistry, KubeObjectClient, NamespacedObject, ObjectReader};
use crate::filters::MachineFilter;
use crate::workload::WorkloadCluster;

/// Key of the kubeconfig inside a CAPI kubeconfig secret
pub const KUBECONFIG_SECRET_KEY: &str = "value";

/// Resolves the client configuration of a workload cluster
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterConfigResolver: Send + Sync {
    /// Client configuration for the cluster identified by `key`
    async fn resolve(&self, key: &ClusterKey) -> Result<kube::Config, Error>;
}

/// Resolves workload cluster configuration from CAPI kubeconfig secrets
///
/// Reads `<cluster>-kubeconfig` in the cluster's namespace and parses the
/// kubeconfig stored under the `value` key.
pub struct KubeconfigSecretResolver<R = KubeObjectClient> {
    reader: R,
    timeout: std::time::Duration,
}

impl<R> KubeconfigSecretResolver<R> {
    /// Create a resolver reading secrets through `reader`
    pub fn new(reader: R, timeout: std::time::Duration) -> Self {
        Self { reader, timeout }
    }
}

#[async_trait]
impl<R: ObjectReader> ClusterConfigResolver for KubeconfigSecretResolver<R> {
    async fn resolve(&self, key: &ClusterKey) -> Result<kube::Config, Error> {
        let secret_name = key.secret_name(Purpose::Kubeconfig.secret_suffix());
        let secret: Secret = self
            .reader
            .get_opt(&key.namespace, &secret_name)
            .await?
            .ok_or_else(|| {
                Error::internal_with_context(
                    "resolver",
                    format!("kubeconfig secret {}/{} not found", key.namespace, secret_name),
                )
            })?;

        let yaml = secret
            .data
            .as_ref()
            .and_then(|data| data.get(KUBECONFIG_SECRET_KEY))
            .ok_or_else(|| {
                Error::internal_with_context(
                    "resolver",
                    format!(
                        "kubeconfig secret {}/{} has no {:?} key",
                        key.namespace, secret_name, KUBECONFIG_SECRET_KEY
                    ),
                )
            })?;
        let yaml = std::str::from_utf8(&yaml.0).map_err(|e| {
            Error::internal_with_context(
                "resolver",
                format!("kubeconfig for {} is not UTF-8: {}", key, e),
            )
        })?;

        config_from_kubeconfig_yaml(yaml, self.timeout).await
    }
}

/// Operations against the management cluster
pub struct Management<C = KubeObjectClient> {
    pub(crate) client: C,
    pub(crate) secret_cache: C,
    resolver: Arc<dyn ClusterConfigResolver>,
    config: ManagementConfig,
    registry: ApiRegistry,
}

impl<C> Management<C> {
    /// Create a management facade
    ///
    /// `client` serves reads and writes; `secret_cache` serves cached
    /// secret reads for trust material lookups.
    pub fn new(
        client: C,
        secret_cache: C,
        resolver: Arc<dyn ClusterConfigResolver>,
        config: ManagementConfig,
    ) -> Self {
        Self {
            client,
            secret_cache,
            resolver,
            config,
            registry: ApiRegistry::workload(),
        }
    }

    /// Open a time-bounded connection to a workload cluster
    ///
    /// Errors from configuration resolution are returned as-is. Failure to
    /// build a client from the resolved configuration is reported as
    /// [`Error::RemoteConnection`].
    pub async fn get_workload_cluster(
        &self,
        key: &ClusterKey,
    ) -> Result<WorkloadCluster<KubeObjectClient>, Error> {
        let mut config = self.resolver.resolve(key).await?;
        apply_timeout(&mut config, self.config.workload_timeout);

        install_crypto_provider();
        let client = Client::try_from(config)
            .map_err(|e| Error::remote_connection(key.to_string(), e))?;
        debug!(cluster = %key, timeout_secs = self.config.workload_timeout.as_secs(), "connected to workload cluster");

        let client = KubeObjectClient::new(client, self.registry.clone(), key.to_string())
            .with_field_manager(self.config.field_manager.clone());
        Ok(WorkloadCluster::new(
            key.clone(),
            client,
            self.config.workload_timeout,
        ))
    }
}

impl<C: ObjectReader> Management<C> {
    /// Machines belonging to a cluster, narrowed by every filter
    ///
    /// With no filters, every Machine of the cluster is returned.
    pub async fn get_machines_for_cluster(
        &self,
        key: &ClusterKey,
        filters: &[MachineFilter<'_>],
    ) -> Result<Vec<Machine>, Error> {
        let mut selector = BTreeMap::new();
        selector.insert(CLUSTER_NAME_LABEL.to_string(), key.name.clone());

        let machines: Vec<Machine> = self
            .client
            .list(&key.namespace, &selector)
            .await
            .map_err(|e| {
                Error::internal_with_context(
                    "management",
                    format!("failed to list machines: {}", e),
                )
            })?;

        let total = machines.len();
        let matched: Vec<Machine> = machines
            .into_iter()
            .filter(|m| filters.iter().all(|f| f(m)))
            .collect();
        info!(cluster = %key, total, matched = matched.len(), "listed machines for cluster");
        Ok(matched)
    }
}

#[async_trait]
impl<C: ObjectReader> ObjectReader for Management<C> {
    async fn get_opt<K: NamespacedObject>(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<K>, Error> {
        self.client.get_opt(namespace, name).await
    }

    async fn list<K: NamespacedObject>(
        &self,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<K>, Error> {
        self.client.list(namespace, labels).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::fake::FakeObjects;
    use crate::filters::{self, BootstrapConfigs, InfraObjects};
    use capr_common::crd::{MachineSpec, RKE2ControlPlane, RKE2ControlPlaneSpec};
    use k8s_openapi::api::core::v1::ConfigMap;
    use k8s_openapi::ByteString;
    use kube::api::ObjectMeta;
    use kube::ResourceExt;
    use std::time::Duration;

    const KUBECONFIG: &str = r#"
apiVersion: v1
kind: Config
clusters:
- name: prod
  cluster:
    server: https://10.0.0.1:6443
users:
- name: admin
  user:
    token: abc123
contexts:
- name: prod
  context:
    cluster: prod
    user: admin
current-context: prod
"#;

    fn key() -> ClusterKey {
        ClusterKey::new("default", "prod")
    }

    fn config() -> ManagementConfig {
        ManagementConfig {
            workload_timeout: Duration::from_secs(7),
            field_manager: "test".to_string(),
        }
    }

    fn resolver_returning(url: &'static str) -> Arc<dyn ClusterConfigResolver> {
        let mut resolver = MockClusterConfigResolver::new();
        resolver.expect_resolve().returning(move |_| {
            let uri = url.parse().expect("valid url");
            Ok(kube::Config::new(uri))
        });
        Arc::new(resolver)
    }

    fn management(client: FakeObjects, resolver: Arc<dyn ClusterConfigResolver>) -> Management<FakeObjects> {
        Management::new(client, FakeObjects::new(), resolver, config())
    }

    fn machine(name: &str, cluster: &str, version: &str) -> Machine {
        let mut m = Machine::new(
            name,
            MachineSpec {
                cluster_name: cluster.to_string(),
                version: Some(version.to_string()),
                ..Default::default()
            },
        );
        m.metadata.namespace = Some("default".to_string());
        m.labels_mut()
            .insert(CLUSTER_NAME_LABEL.to_string(), cluster.to_string());
        m
    }

    #[tokio::test]
    async fn workload_cluster_carries_timeout_and_registry() {
        let mgmt = management(FakeObjects::new(), resolver_returning("https://10.0.0.1:6443"));

        let workload = mgmt
            .get_workload_cluster(&key())
            .await
            .expect("client construction should succeed");
        assert_eq!(workload.key(), &key());
        assert_eq!(workload.timeout(), Duration::from_secs(7));
        assert_eq!(workload.client().registry(), &ApiRegistry::workload());

        let err = workload
            .get_opt::<ConfigMap>("default", "anything")
            .await
            .expect_err("ConfigMap is not registered");
        assert!(matches!(err, Error::Validation { .. }));
    }

    /// Story: a cluster's kubeconfig secret yields a working TLS client
    ///
    /// The https endpoint from the CAPI kubeconfig secret goes through
    /// rustls, so building the client must not depend on the caller having
    /// installed a crypto provider.
    #[tokio::test]
    async fn story_connects_through_kubeconfig_secret() {
        let secrets = FakeObjects::new();
        secrets.insert(kubeconfig_secret(Some((KUBECONFIG_SECRET_KEY, KUBECONFIG))));
        let resolver = KubeconfigSecretResolver::new(secrets, Duration::from_secs(30));
        let mgmt = management(FakeObjects::new(), Arc::new(resolver));

        let workload = mgmt
            .get_workload_cluster(&key())
            .await
            .expect("https client construction should succeed");
        assert_eq!(workload.key(), &key());
        assert_eq!(workload.timeout(), Duration::from_secs(7));
    }

    /// Story: configuration failures are not reported as connection failures
    ///
    /// The caller retries connection failures differently, so the resolver's
    /// own error must come back untouched.
    #[tokio::test]
    async fn story_resolver_errors_surface_verbatim() {
        let mut resolver = MockClusterConfigResolver::new();
        resolver
            .expect_resolve()
            .returning(|_| Err(Error::internal_with_context("resolver", "kubeconfig secret missing")));
        let mgmt = management(FakeObjects::new(), Arc::new(resolver));

        let err = mgmt
            .get_workload_cluster(&key())
            .await
            .err()
            .expect("resolution should fail");
        assert_eq!(err.context(), Some("resolver"));
        assert!(!matches!(err, Error::RemoteConnection { .. }));
    }

    #[tokio::test]
    async fn client_construction_failure_is_remote_connection_error() {
        let mut resolver = MockClusterConfigResolver::new();
        resolver.expect_resolve().returning(|_| {
            let mut config = kube::Config::new("https://10.0.0.1:6443".parse().expect("url"));
            config.proxy_url = Some("ftp://proxy.internal:21".parse().expect("url"));
            Ok(config)
        });
        let mgmt = management(FakeObjects::new(), Arc::new(resolver));

        let err = mgmt
            .get_workload_cluster(&key())
            .await
            .err()
            .expect("client construction should fail");
        assert!(matches!(err, Error::RemoteConnection { .. }));
        assert!(err.to_string().starts_with("default/prod: "));
        assert_eq!(err.cluster(), Some("default/prod"));
    }

    #[tokio::test]
    async fn machines_are_listed_by_cluster_label() {
        let store = FakeObjects::new();
        store.insert(machine("prod-cp-0", "prod", "v1.28.5+rke2r1"));
        store.insert(machine("prod-cp-1", "prod", "v1.28.4+rke2r1"));
        store.insert(machine("staging-cp-0", "staging", "v1.28.5+rke2r1"));
        let mgmt = management(store, resolver_returning("https://10.0.0.1:6443"));

        let all = mgmt
            .get_machines_for_cluster(&key(), &[])
            .await
            .expect("list");
        let mut names: Vec<String> = all.iter().map(|m| m.name_any()).collect();
        names.sort();
        assert_eq!(names, vec!["prod-cp-0", "prod-cp-1"]);
    }

    #[tokio::test]
    async fn machine_filters_apply_conjunctively() {
        let store = FakeObjects::new();
        store.insert(machine("prod-cp-0", "prod", "v1.28.5+rke2r1"));
        store.insert(machine("prod-cp-1", "prod", "v1.28.4+rke2r1"));
        let mgmt = management(store, resolver_returning("https://10.0.0.1:6443"));

        let rcp = RKE2ControlPlane::new(
            "prod",
            RKE2ControlPlaneSpec {
                version: Some("v1.28.5+rke2r1".to_string()),
                ..Default::default()
            },
        );
        let configs = BootstrapConfigs::new();
        let infra = InfraObjects::new();
        let outdated: MachineFilter<'_> = Box::new(|m: &Machine| !filters::machine_matches(&rcp, m, &configs, &infra));

        let matched = mgmt
            .get_machines_for_cluster(&key(), &[outdated])
            .await
            .expect("list");
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].name_any(), "prod-cp-1");

        let none: MachineFilter<'_> = Box::new(|_: &Machine| false);
        let conforming = filters::matches_configuration(&rcp, &configs, &infra);
        let matched = mgmt
            .get_machines_for_cluster(&key(), &[conforming, none])
            .await
            .expect("list");
        assert!(matched.is_empty());
    }

    #[tokio::test]
    async fn machine_list_failure_is_wrapped() {
        let store = FakeObjects::new();
        store.fail_reads(500);
        let mgmt = management(store, resolver_returning("https://10.0.0.1:6443"));

        let err = mgmt
            .get_machines_for_cluster(&key(), &[])
            .await
            .expect_err("list should fail");
        assert!(err.to_string().contains("failed to list machines"));
    }

    #[tokio::test]
    async fn reader_passes_through_to_management_client() {
        let store = FakeObjects::new();
        store.insert(machine("prod-cp-0", "prod", "v1.28.5+rke2r1"));
        let mgmt = management(store, resolver_returning("https://10.0.0.1:6443"));

        let found: Option<Machine> = mgmt.get_opt("default", "prod-cp-0").await.expect("get");
        assert_eq!(found.map(|m| m.name_any()), Some("prod-cp-0".to_string()));
    }

    fn kubeconfig_secret(data: Option<(&str, &str)>) -> Secret {
        Secret {
            metadata: ObjectMeta {
                name: Some("prod-kubeconfig".to_string()),
                namespace: Some("default".to_string()),
                ..Default::default()
            },
            data: data.map(|(k, v)| {
                let mut map = BTreeMap::new();
                map.insert(k.to_string(), ByteString(v.as_bytes().to_vec()));
                map
            }),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn kubeconfig_resolver_reads_capi_secret() {
        let store = FakeObjects::new();
        store.insert(kubeconfig_secret(Some((KUBECONFIG_SECRET_KEY, KUBECONFIG))));
        let resolver = KubeconfigSecretResolver::new(store, Duration::from_secs(30));

        let config = resolver.resolve(&key()).await.expect("resolve");
        assert!(config.cluster_url.to_string().contains("10.0.0.1:6443"));
        assert_eq!(config.read_timeout, Some(Duration::from_secs(30)));
    }

    #[tokio::test]
    async fn kubeconfig_resolver_errors() {
        let resolver = KubeconfigSecretResolver::new(FakeObjects::new(), Duration::from_secs(30));
        let err = resolver.resolve(&key()).await.expect_err("no secret");
        assert!(err.to_string().contains("default/prod-kubeconfig not found"));

        let store = FakeObjects::new();
        store.insert(kubeconfig_secret(Some(("other", KUBECONFIG))));
        let resolver = KubeconfigSecretResolver::new(store, Duration::from_secs(30));
        let err = resolver.resolve(&key()).await.expect_err("no value key");
        assert_eq!(err.context(), Some("resolver"));
    }
}

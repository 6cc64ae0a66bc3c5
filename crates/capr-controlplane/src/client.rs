//! Object access capabilities
//!
//! [`ObjectReader`] and [`ObjectWriter`] are the only way the control plane
//! touches a Kubernetes API. They are generic over typed namespaced
//! resources, so the same conformance and trust-material code runs against
//! the management cluster, a workload cluster, or an in-memory store in
//! tests.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Debug;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Node, Secret};
use k8s_openapi::NamespaceResourceScope;
use kube::api::{Api, ListParams, PostParams};
use kube::{Client, Resource};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use capr_common::crd::{Machine, RKE2Config, RKE2ControlPlane};
use capr_common::{Error, CONTROLLER_NAME};

/// A typed, namespaced Kubernetes resource the capabilities can carry
pub trait NamespacedObject:
    Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone
    + Debug
    + DeserializeOwned
    + Serialize
    + Send
    + Sync
    + 'static
{
}

impl<K> NamespacedObject for K where
    K: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + Debug
        + DeserializeOwned
        + Serialize
        + Send
        + Sync
        + 'static
{
}

/// Read access to namespaced objects
#[async_trait]
pub trait ObjectReader: Send + Sync {
    /// Get an object by name, `None` if it does not exist
    async fn get_opt<K: NamespacedObject>(&self, namespace: &str, name: &str)
        -> Result<Option<K>, Error>;

    /// List objects in a namespace carrying all of the given labels
    async fn list<K: NamespacedObject>(
        &self,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<K>, Error>;
}

/// Write access to namespaced objects
#[async_trait]
pub trait ObjectWriter: Send + Sync {
    /// Create an object; an existing object with the same name is a conflict
    async fn create<K: NamespacedObject>(&self, namespace: &str, obj: &K) -> Result<K, Error>;
}

/// Render a label map as a Kubernetes label selector (`a=b,c=d`)
pub fn label_selector(labels: &BTreeMap<String, String>) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",")
}

/// The set of kinds a client may operate on
///
/// Kinds are identified by `apiVersion` and `kind`, so two versions of the
/// same CRD are distinct entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApiRegistry {
    kinds: BTreeSet<(String, String)>,
}

impl ApiRegistry {
    /// Registry of the kinds the control plane uses on a workload cluster
    pub fn workload() -> Self {
        Self::default()
            .with::<Secret>()
            .with::<Node>()
            .with::<Machine>()
            .with::<RKE2Config>()
            .with::<RKE2ControlPlane>()
    }

    /// Add a kind to the registry
    pub fn with<K: Resource<DynamicType = ()>>(mut self) -> Self {
        self.kinds
            .insert((K::api_version(&()).into_owned(), K::kind(&()).into_owned()));
        self
    }

    /// Whether a kind is registered
    pub fn contains<K: Resource<DynamicType = ()>>(&self) -> bool {
        self.kinds
            .contains(&(K::api_version(&()).into_owned(), K::kind(&()).into_owned()))
    }

    /// Fail with a validation error if a kind is not registered
    pub fn ensure<K: Resource<DynamicType = ()>>(&self, cluster: &str) -> Result<(), Error> {
        if self.contains::<K>() {
            return Ok(());
        }
        Err(Error::validation_for(
            cluster,
            format!(
                "kind {} ({}) is not registered with this client",
                K::kind(&()),
                K::api_version(&())
            ),
        ))
    }

    /// Number of registered kinds
    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    /// Whether no kinds are registered
    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }
}

/// [`ObjectReader`]/[`ObjectWriter`] backed by a kube-rs client
#[derive(Clone)]
pub struct KubeObjectClient {
    client: Client,
    registry: ApiRegistry,
    cluster: String,
    field_manager: String,
}

impl KubeObjectClient {
    /// Create a client restricted to the kinds in `registry`
    ///
    /// `cluster` names the target in errors and logs.
    pub fn new(client: Client, registry: ApiRegistry, cluster: impl Into<String>) -> Self {
        Self {
            client,
            registry,
            cluster: cluster.into(),
            field_manager: CONTROLLER_NAME.to_string(),
        }
    }

    /// Override the field manager recorded on created objects
    pub fn with_field_manager(mut self, field_manager: impl Into<String>) -> Self {
        self.field_manager = field_manager.into();
        self
    }

    /// Kinds this client may touch
    pub fn registry(&self) -> &ApiRegistry {
        &self.registry
    }

    fn api<K: NamespacedObject>(&self, namespace: &str) -> Result<Api<K>, Error> {
        self.registry.ensure::<K>(&self.cluster)?;
        Ok(Api::namespaced(self.client.clone(), namespace))
    }
}

#[async_trait]
impl ObjectReader for KubeObjectClient {
    async fn get_opt<K: NamespacedObject>(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<K>, Error> {
        let api = self.api::<K>(namespace)?;
        debug!(cluster = %self.cluster, kind = %K::kind(&()), namespace, name, "get");
        Ok(api.get_opt(name).await?)
    }

    async fn list<K: NamespacedObject>(
        &self,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<K>, Error> {
        let api = self.api::<K>(namespace)?;
        let selector = label_selector(labels);
        debug!(cluster = %self.cluster, kind = %K::kind(&()), namespace, %selector, "list");
        let params = if selector.is_empty() {
            ListParams::default()
        } else {
            ListParams::default().labels(&selector)
        };
        Ok(api.list(&params).await?.items)
    }
}

#[async_trait]
impl ObjectWriter for KubeObjectClient {
    async fn create<K: NamespacedObject>(&self, namespace: &str, obj: &K) -> Result<K, Error> {
        let api = self.api::<K>(namespace)?;
        let params = PostParams {
            field_manager: Some(self.field_manager.clone()),
            ..Default::default()
        };
        debug!(
            cluster = %self.cluster,
            kind = %K::kind(&()),
            namespace,
            name = obj.meta().name.as_deref().unwrap_or_default(),
            "create"
        );
        Ok(api.create(&params, obj).await?)
    }
}


#[cfg(test)]
mod tests {
    use super::fake::FakeObjects;
    use super::*;
    use k8s_openapi::api::core::v1::ConfigMap;
    use kube::api::ObjectMeta;

    fn secret(name: &str, labels: &[(&str, &str)]) -> Secret {
        Secret {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("default".to_string()),
                labels: Some(
                    labels
                        .iter()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect(),
                ),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn workload_registry_contains_control_plane_kinds() {
        let registry = ApiRegistry::workload();
        assert_eq!(registry.len(), 5);
        assert!(registry.contains::<Secret>());
        assert!(registry.contains::<Node>());
        assert!(registry.contains::<Machine>());
        assert!(registry.contains::<RKE2Config>());
        assert!(registry.contains::<RKE2ControlPlane>());
        assert!(!registry.contains::<ConfigMap>());
    }

    #[test]
    fn unregistered_kind_is_validation_error() {
        let err = ApiRegistry::workload()
            .ensure::<ConfigMap>("default/prod")
            .expect_err("ConfigMap is not registered");
        assert!(matches!(err, Error::Validation { .. }));
        assert_eq!(err.cluster(), Some("default/prod"));
        assert!(err.to_string().contains("ConfigMap"));
    }

    #[test]
    fn label_selector_is_sorted_and_joined() {
        let mut labels = BTreeMap::new();
        labels.insert("b".to_string(), "2".to_string());
        labels.insert("a".to_string(), "1".to_string());
        assert_eq!(label_selector(&labels), "a=1,b=2");
        assert_eq!(label_selector(&BTreeMap::new()), "");
    }

    #[tokio::test]
    async fn fake_store_filters_by_labels() {
        let store = FakeObjects::new();
        store.insert(secret("a", &[("team", "x")]));
        store.insert(secret("b", &[("team", "y")]));
        store.insert(secret("c", &[]));

        let mut labels = BTreeMap::new();
        labels.insert("team".to_string(), "x".to_string());
        let found: Vec<Secret> = store.list("default", &labels).await.expect("list");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].metadata.name.as_deref(), Some("a"));

        let all: Vec<Secret> = store.list("default", &BTreeMap::new()).await.expect("list");
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn fake_store_rejects_duplicate_creates() {
        let store = FakeObjects::new();
        let created = store
            .create("default", &secret("a", &[]))
            .await
            .expect("first create");
        assert_eq!(created.metadata.uid.as_deref(), Some("uid-a"));

        let err = store
            .create("default", &secret("a", &[]))
            .await
            .expect_err("duplicate create");
        assert!(err.is_conflict());
        assert_eq!(store.creates(), 1);
    }
}

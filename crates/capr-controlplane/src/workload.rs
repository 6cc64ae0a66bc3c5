//! Time-bounded access to a workload cluster

use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use capr_common::{ClusterKey, Error};

use crate::client::{KubeObjectClient, NamespacedObject, ObjectReader, ObjectWriter};

/// A connection to one workload cluster
///
/// Every call is bounded by the workload timeout; a call that runs out of
/// time fails with [`Error::Timeout`] and is not retried. Instances are
/// created per request and never cached.
pub struct WorkloadCluster<C = KubeObjectClient> {
    key: ClusterKey,
    client: C,
    timeout: Duration,
}

impl<C> WorkloadCluster<C> {
    /// Wrap a client for the cluster identified by `key`
    pub fn new(key: ClusterKey, client: C, timeout: Duration) -> Self {
        Self {
            key,
            client,
            timeout,
        }
    }

    /// Identity of the workload cluster
    pub fn key(&self) -> &ClusterKey {
        &self.key
    }

    /// Timeout applied to every call
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// The underlying client, without the timeout
    pub fn client(&self) -> &C {
        &self.client
    }

    async fn bounded<T, F>(&self, operation: String, fut: F) -> Result<T, Error>
    where
        F: Future<Output = Result<T, Error>> + Send,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    cluster = %self.key,
                    %operation,
                    timeout_secs = self.timeout.as_secs(),
                    "workload cluster call timed out"
                );
                Err(Error::timeout(self.key.to_string(), operation, self.timeout))
            }
        }
    }
}

#[async_trait]
impl<C: ObjectReader> ObjectReader for WorkloadCluster<C> {
    async fn get_opt<K: NamespacedObject>(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<K>, Error> {
        let operation = format!("get {} {}/{}", K::kind(&()), namespace, name);
        self.bounded(operation, self.client.get_opt::<K>(namespace, name))
            .await
    }

    async fn list<K: NamespacedObject>(
        &self,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<K>, Error> {
        let operation = format!("list {} in {}", K::kind(&()), namespace);
        self.bounded(operation, self.client.list::<K>(namespace, labels))
            .await
    }
}

#[async_trait]
impl<C: ObjectWriter> ObjectWriter for WorkloadCluster<C> {
    async fn create<K: NamespacedObject>(&self, namespace: &str, obj: &K) -> Result<K, Error> {
        let operation = format!(
            "create {} {}/{}",
            K::kind(&()),
            namespace,
            obj.meta().name.as_deref().unwrap_or_default()
        );
        self.bounded(operation, self.client.create(namespace, obj))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::fake::FakeObjects;
    use k8s_openapi::api::core::v1::Secret;
    use kube::api::ObjectMeta;

    fn workload(store: FakeObjects, timeout: Duration) -> WorkloadCluster<FakeObjects> {
        WorkloadCluster::new(ClusterKey::new("default", "prod"), store, timeout)
    }

    fn secret(name: &str) -> Secret {
        Secret {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("kube-system".to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn calls_pass_through_within_timeout() {
        let store = FakeObjects::new();
        store.insert(secret("prod-etcd"));
        let cluster = workload(store, Duration::from_secs(5));

        let found: Option<Secret> = cluster
            .get_opt("kube-system", "prod-etcd")
            .await
            .expect("get");
        assert!(found.is_some());

        let missing: Option<Secret> = cluster.get_opt("kube-system", "other").await.expect("get");
        assert!(missing.is_none());
    }

    /// Story: a hung workload API server cannot stall reconciliation
    ///
    /// Every call carries the workload timeout and fails with a timeout
    /// error naming the cluster and the operation.
    #[tokio::test]
    async fn story_slow_calls_time_out() {
        let store = FakeObjects::new();
        store.delay_calls(Duration::from_secs(30));
        let cluster = workload(store, Duration::from_millis(20));

        let err = cluster
            .get_opt::<Secret>("kube-system", "prod-etcd")
            .await
            .expect_err("call should time out");
        match &err {
            Error::Timeout {
                cluster, operation, ..
            } => {
                assert_eq!(cluster, "default/prod");
                assert_eq!(operation, "get Secret kube-system/prod-etcd");
            }
            other => panic!("expected Timeout, got {:?}", other),
        }
        assert!(err.is_retryable());

        let err = cluster
            .create("kube-system", &secret("prod-etcd"))
            .await
            .expect_err("create should time out");
        assert!(matches!(err, Error::Timeout { .. }));
        assert_eq!(cluster.client().creates(), 0);
    }

    #[tokio::test]
    async fn errors_pass_through_unchanged() {
        let store = FakeObjects::new();
        store.fail_reads(500);
        let cluster = workload(store, Duration::from_secs(5));

        let err = cluster
            .list::<Secret>("kube-system", &BTreeMap::new())
            .await
            .expect_err("read should fail");
        assert!(matches!(err, Error::Kube { .. }));
    }
}

//! etcd CA trust material
//!
//! The etcd CA lives in the management cluster as a CAPI certificate secret
//! `<cluster>-etcd`. The cached lookup never generates; only the remote
//! lookup-or-generate path creates a new CA, owned by the control plane so
//! it is garbage collected with it.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use k8s_openapi::ByteString;
use kube::api::ObjectMeta;
use tracing::{error, info};

use capr_common::crd::RKE2ControlPlane;
use capr_common::kube_utils::controller_owner_ref;
use capr_common::{
    ClusterKey, Error, CLUSTER_NAME_LABEL, CLUSTER_SECRET_TYPE, WORKLOAD_SYSTEM_NAMESPACE,
};
use capr_pki::{generate_ca, KeyPair, Purpose};

use crate::client::{ObjectReader, ObjectWriter};
use crate::management::Management;

/// Secret data key holding the PEM certificate
pub const TLS_CRT_KEY: &str = "tls.crt";

/// Secret data key holding the PEM private key
pub const TLS_KEY_KEY: &str = "tls.key";

fn secret_id(namespace: &str, name: &str) -> String {
    format!("{}/{}", namespace, name)
}

/// Decode a key pair from a CAPI certificate secret
pub fn key_pair_from_secret(
    cluster: &ClusterKey,
    purpose: Purpose,
    secret: &Secret,
) -> Result<KeyPair, Error> {
    let namespace = secret.metadata.namespace.as_deref().unwrap_or_default();
    let name = secret.metadata.name.as_deref().unwrap_or_default();
    let fail = |message: String| {
        Error::trust_material(
            cluster.to_string(),
            secret_id(namespace, name),
            purpose.description(),
            message,
        )
    };

    let data = secret.data.as_ref();
    let field = |key: &str| {
        data.and_then(|d| d.get(key))
            .map(|b| b.0.clone())
            .ok_or_else(|| fail(format!("secret has no {:?} key", key)))
    };
    let cert = field(TLS_CRT_KEY)?;
    let key = field(TLS_KEY_KEY)?;

    KeyPair::from_pem(cert, key).map_err(|e| fail(format!("corrupted key pair: {}", e)))
}

/// Build the CAPI certificate secret for a key pair
pub fn secret_for_key_pair(
    cluster: &ClusterKey,
    purpose: Purpose,
    key_pair: &KeyPair,
    owner_ref: OwnerReference,
) -> Secret {
    let mut labels = BTreeMap::new();
    labels.insert(CLUSTER_NAME_LABEL.to_string(), cluster.name.clone());

    let mut data = BTreeMap::new();
    data.insert(TLS_CRT_KEY.to_string(), ByteString(key_pair.cert.clone()));
    data.insert(TLS_KEY_KEY.to_string(), ByteString(key_pair.key.clone()));

    Secret {
        metadata: ObjectMeta {
            name: Some(cluster.secret_name(purpose.secret_suffix())),
            namespace: Some(cluster.namespace.clone()),
            labels: Some(labels),
            owner_references: Some(vec![owner_ref]),
            ..Default::default()
        },
        type_: Some(CLUSTER_SECRET_TYPE.to_string()),
        data: Some(data),
        ..Default::default()
    }
}

impl<C: ObjectReader> Management<C> {
    /// etcd CA key pair from the secret cache
    ///
    /// Never generates. A missing secret and a failed lookup are both
    /// reported as [`Error::TrustMaterial`].
    pub async fn get_etcd_ca_key_pair(&self, cluster: &ClusterKey) -> Result<KeyPair, Error> {
        let purpose = Purpose::EtcdCa;
        let name = cluster.secret_name(purpose.secret_suffix());
        let secret_ref = secret_id(&cluster.namespace, &name);

        let secret: Secret = match self.secret_cache.get_opt(&cluster.namespace, &name).await {
            Ok(Some(secret)) => secret,
            Ok(None) => {
                return Err(Error::trust_material(
                    cluster.to_string(),
                    secret_ref,
                    purpose.description(),
                    "not found",
                ))
            }
            Err(e) => {
                return Err(Error::trust_material(
                    cluster.to_string(),
                    secret_ref,
                    purpose.description(),
                    e.to_string(),
                ))
            }
        };

        key_pair_from_secret(cluster, purpose, &secret)
    }
}

impl<C: ObjectReader + ObjectWriter> Management<C> {
    /// etcd CA key pair, generating and persisting one if none exists
    ///
    /// The workload cluster is checked first (`kube-system/<cluster>-etcd`),
    /// then the management cluster. A generated CA is stored in the
    /// management cluster, owned by `owner`. Losing a creation race to
    /// another writer surfaces as a conflict error; it is not retried.
    pub async fn get_remote_key_pair<W: ObjectReader>(
        &self,
        remote: &W,
        cluster: &ClusterKey,
        owner: &RKE2ControlPlane,
    ) -> Result<KeyPair, Error> {
        let result = self
            .lookup_or_generate(remote, cluster, owner, generate_ca)
            .await;
        if let Err(e) = &result {
            error!(cluster = %cluster, error = %e, "unable to lookup or create cluster certificates");
        }
        result
    }

    async fn lookup_or_generate<W, G>(
        &self,
        remote: &W,
        cluster: &ClusterKey,
        owner: &RKE2ControlPlane,
        generate: G,
    ) -> Result<KeyPair, Error>
    where
        W: ObjectReader,
        G: FnOnce(&str) -> capr_pki::Result<KeyPair> + Send,
    {
        let purpose = Purpose::EtcdCa;
        let name = cluster.secret_name(purpose.secret_suffix());

        if let Some(secret) = remote
            .get_opt::<Secret>(WORKLOAD_SYSTEM_NAMESPACE, &name)
            .await?
        {
            return key_pair_from_secret(cluster, purpose, &secret);
        }

        if let Some(secret) = self
            .client
            .get_opt::<Secret>(&cluster.namespace, &name)
            .await?
        {
            return key_pair_from_secret(cluster, purpose, &secret);
        }

        let owner_ref = controller_owner_ref(owner)?;
        let fail = |message: String| {
            Error::trust_material(
                cluster.to_string(),
                secret_id(&cluster.namespace, &name),
                purpose.description(),
                message,
            )
        };
        let key_pair = generate(purpose.common_name())
            .map_err(|e| fail(format!("failed to generate: {}", e)))?;
        let cert = key_pair
            .cert_info()
            .map_err(|e| fail(format!("generated certificate is unreadable: {}", e)))?;

        let secret = secret_for_key_pair(cluster, purpose, &key_pair, owner_ref);
        self.client.create(&cluster.namespace, &secret).await?;

        info!(
            cluster = %cluster,
            secret = %name,
            common_name = %cert.common_name,
            not_after = cert.not_after,
            "generated {}", purpose
        );
        Ok(key_pair)
    }
}

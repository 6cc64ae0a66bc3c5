//! CA generation and certificate inspection
//!
//! Every CAPI cluster owns a fixed set of certificate authorities, each
//! stored in a secret named `<cluster>-<suffix>`. The control plane only
//! ever creates the etcd CA itself; the other purposes are recognised so
//! their secrets can be named and decoded consistently.

use std::fmt;

use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, DnValue, IsCa, KeyUsagePurpose,
};
use thiserror::Error;
use x509_parser::prelude::*;

/// Default validity period for CA certificates (10 years)
pub const CA_VALIDITY_YEARS: i64 = 10;

/// Organization written into generated CA subjects
const CA_ORGANIZATION: &str = "RKE2";

/// What a key pair is used for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Purpose {
    /// CA for the etcd peer and client certificates
    EtcdCa,
    /// Cluster root CA for the API server
    ClusterCa,
    /// Service account token signing key
    ServiceAccount,
    /// CA for the front proxy (aggregation layer)
    FrontProxyCa,
    /// Admin kubeconfig for the cluster
    Kubeconfig,
}

impl Purpose {
    /// Suffix of the secret `<cluster>-<suffix>` holding this material
    pub fn secret_suffix(self) -> &'static str {
        match self {
            Purpose::EtcdCa => "etcd",
            Purpose::ClusterCa => "ca",
            Purpose::ServiceAccount => "sa",
            Purpose::FrontProxyCa => "proxy",
            Purpose::Kubeconfig => "kubeconfig",
        }
    }

    /// Human readable description used in error messages and logs
    pub fn description(self) -> &'static str {
        match self {
            Purpose::EtcdCa => "etcd CA bundle",
            Purpose::ClusterCa => "cluster CA bundle",
            Purpose::ServiceAccount => "service account key pair",
            Purpose::FrontProxyCa => "front proxy CA bundle",
            Purpose::Kubeconfig => "kubeconfig",
        }
    }

    /// Common name used when generating a CA for this purpose
    pub fn common_name(self) -> &'static str {
        match self {
            Purpose::EtcdCa => "etcd-ca",
            Purpose::ClusterCa => "kubernetes",
            Purpose::ServiceAccount => "service-account",
            Purpose::FrontProxyCa => "front-proxy-ca",
            Purpose::Kubeconfig => "kubernetes-admin",
        }
    }
}

impl fmt::Display for Purpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// PEM-encoded certificate and private key
#[derive(Clone, PartialEq, Eq)]
pub struct KeyPair {
    /// PEM certificate bytes
    pub cert: Vec<u8>,
    /// PEM private key bytes
    pub key: Vec<u8>,
}

// Private key bytes must never end up in logs
impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("cert_len", &self.cert.len())
            .field("key", &"<redacted>")
            .finish()
    }
}

impl KeyPair {
    /// Build a key pair from PEM bytes, checking both halves parse
    pub fn from_pem(cert: Vec<u8>, key: Vec<u8>) -> Result<Self> {
        let pair = Self { cert, key };
        pair.validate()?;
        Ok(pair)
    }

    /// Certificate as a PEM string
    pub fn cert_pem(&self) -> Result<&str> {
        std::str::from_utf8(&self.cert)
            .map_err(|e| PkiError::ParseError(format!("certificate is not UTF-8: {}", e)))
    }

    /// Private key as a PEM string
    pub fn key_pem(&self) -> Result<&str> {
        std::str::from_utf8(&self.key)
            .map_err(|e| PkiError::ParseError(format!("private key is not UTF-8: {}", e)))
    }

    /// Check both halves parse and the key belongs to the certificate
    pub fn validate(&self) -> Result<()> {
        let key = rcgen::KeyPair::from_pem(self.key_pem()?)
            .map_err(|e| PkiError::ParseError(format!("failed to parse private key: {}", e)))?;
        let der = parse_pem(self.cert_pem()?)?;
        let (_, cert) = X509Certificate::from_der(&der)
            .map_err(|e| PkiError::ParseError(format!("failed to parse certificate: {}", e)))?;

        if cert.public_key().subject_public_key.data.as_ref() != key.public_key_raw() {
            return Err(PkiError::KeyMismatch);
        }
        Ok(())
    }

    /// Validity and subject of the certificate
    pub fn cert_info(&self) -> Result<CertificateInfo> {
        CertificateInfo::from_pem(self.cert_pem()?)
    }
}

/// Compute certificate validity period from now
fn compute_validity(years: i64) -> (::time::OffsetDateTime, ::time::OffsetDateTime) {
    let now = ::time::OffsetDateTime::now_utc();
    let not_after = now + ::time::Duration::days(years * 365);
    (now, not_after)
}

/// Generate a self-signed CA with the given common name
pub fn generate_ca(common_name: &str) -> Result<KeyPair> {
    let mut params = CertificateParams::default();

    let mut dn = DistinguishedName::new();
    dn.push(
        DnType::CommonName,
        DnValue::Utf8String(common_name.to_string()),
    );
    dn.push(
        DnType::OrganizationName,
        DnValue::Utf8String(CA_ORGANIZATION.to_string()),
    );
    params.distinguished_name = dn;

    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params.key_usages = vec![
        KeyUsagePurpose::KeyCertSign,
        KeyUsagePurpose::CrlSign,
        KeyUsagePurpose::DigitalSignature,
        KeyUsagePurpose::KeyEncipherment,
    ];

    let (not_before, not_after) = compute_validity(CA_VALIDITY_YEARS);
    params.not_before = not_before;
    params.not_after = not_after;

    let key_pair = rcgen::KeyPair::generate().map_err(|e| {
        PkiError::KeyGenerationFailed(format!("failed to generate CA key: {}", e))
    })?;

    let cert = params.self_signed(&key_pair).map_err(|e| {
        PkiError::CertificateGenerationFailed(format!("failed to create CA cert: {}", e))
    })?;

    Ok(KeyPair {
        cert: cert.pem().into_bytes(),
        key: key_pair.serialize_pem().into_bytes(),
    })
}

/// Information about a certificate's validity
#[derive(Debug, Clone)]
pub struct CertificateInfo {
    /// When the certificate becomes valid (Unix timestamp)
    pub not_before: i64,
    /// When the certificate expires (Unix timestamp)
    pub not_after: i64,
    /// Subject common name
    pub common_name: String,
    /// Whether basic constraints mark this certificate as a CA
    pub is_ca: bool,
}

impl CertificateInfo {
    /// Parse certificate info from PEM-encoded certificate
    pub fn from_pem(pem_data: &str) -> Result<Self> {
        let der = parse_pem(pem_data)?;
        Self::from_der(&der)
    }

    /// Parse certificate info from DER-encoded certificate
    pub fn from_der(der: &[u8]) -> Result<Self> {
        let (_, cert) = X509Certificate::from_der(der)
            .map_err(|e| PkiError::ParseError(format!("failed to parse certificate: {}", e)))?;

        let common_name = cert
            .subject()
            .iter_common_name()
            .next()
            .and_then(|cn| cn.as_str().ok())
            .unwrap_or("")
            .to_string();

        Ok(Self {
            not_before: cert.validity().not_before.timestamp(),
            not_after: cert.validity().not_after.timestamp(),
            common_name,
            is_ca: cert.is_ca(),
        })
    }
}

/// PKI errors
#[derive(Debug, Error)]
pub enum PkiError {
    /// Certificate generation failed
    #[error("certificate generation failed: {0}")]
    CertificateGenerationFailed(String),

    /// Key generation failed
    #[error("key generation failed: {0}")]
    KeyGenerationFailed(String),

    /// Certificate or key parsing error
    #[error("certificate parsing error: {0}")]
    ParseError(String),

    /// The private key does not belong to the certificate
    #[error("private key does not match certificate public key")]
    KeyMismatch,
}

/// Result type for PKI operations
pub type Result<T> = std::result::Result<T, PkiError>;

/// Parse PEM-encoded data and return the DER bytes
pub fn parse_pem(pem_data: &str) -> Result<Vec<u8>> {
    let pem_obj = ::pem::parse(pem_data.as_bytes())
        .map_err(|e| PkiError::ParseError(format!("failed to parse PEM: {}", e)))?;
    Ok(pem_obj.contents().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn purpose_suffixes_follow_capi_naming() {
        assert_eq!(Purpose::EtcdCa.secret_suffix(), "etcd");
        assert_eq!(Purpose::ClusterCa.secret_suffix(), "ca");
        assert_eq!(Purpose::ServiceAccount.secret_suffix(), "sa");
        assert_eq!(Purpose::FrontProxyCa.secret_suffix(), "proxy");
        assert_eq!(Purpose::Kubeconfig.secret_suffix(), "kubeconfig");
        assert_eq!(Purpose::EtcdCa.to_string(), "etcd CA bundle");
    }

    #[test]
    fn generated_ca_is_a_valid_ca() {
        let pair = generate_ca("etcd-ca").expect("CA generation should succeed");
        assert!(pair.cert_pem().expect("utf8").contains("BEGIN CERTIFICATE"));
        assert!(pair.key_pem().expect("utf8").contains("PRIVATE KEY"));
        pair.validate().expect("generated pair should validate");

        let info = pair.cert_info().expect("cert info");
        assert_eq!(info.common_name, "etcd-ca");
        assert!(info.is_ca);
        assert_eq!(
            info.not_after - info.not_before,
            CA_VALIDITY_YEARS * 365 * 24 * 3600
        );
    }

    #[test]
    fn generated_cas_are_distinct() {
        let a = generate_ca("etcd-ca").expect("CA a");
        let b = generate_ca("etcd-ca").expect("CA b");
        assert_ne!(a.key, b.key);
        assert_ne!(a.cert, b.cert);
    }

    /// Story: corrupted secrets are rejected before use
    ///
    /// A secret that has been hand-edited or truncated must not be handed to
    /// the etcd client; both halves are checked independently.
    #[test]
    fn story_corrupted_key_pair_detection() {
        let good = generate_ca("etcd-ca").expect("CA creation should succeed");

        let result = KeyPair::from_pem(good.cert.clone(), b"invalid key pem".to_vec());
        assert!(matches!(result, Err(PkiError::ParseError(_))));

        let result = KeyPair::from_pem(b"invalid cert pem".to_vec(), good.key.clone());
        assert!(matches!(result, Err(PkiError::ParseError(_))));

        let result = KeyPair::from_pem(vec![0xff, 0xfe], good.key.clone());
        assert!(result.is_err());

        assert!(KeyPair::from_pem(good.cert.clone(), good.key.clone()).is_ok());
    }

    /// Story: a secret whose tls.crt and tls.key come from different CAs
    ///
    /// Both halves parse on their own, but signing with that key would
    /// produce certificates nobody trusting the CA accepts.
    #[test]
    fn story_mismatched_key_pair_is_rejected() {
        let a = generate_ca("etcd-ca").expect("CA a");
        let b = generate_ca("etcd-ca").expect("CA b");

        let result = KeyPair::from_pem(a.cert.clone(), b.key.clone());
        assert!(matches!(result, Err(PkiError::KeyMismatch)));
        assert!(KeyPair::from_pem(b.cert, b.key).is_ok());
    }

    #[test]
    fn debug_output_redacts_private_key() {
        let pair = generate_ca("etcd-ca").expect("CA creation should succeed");
        let rendered = format!("{:?}", pair);
        assert!(rendered.contains("<redacted>"));
        assert!(!rendered.contains("PRIVATE KEY"));
    }

    #[test]
    fn story_pem_parsing_errors() {
        let result = parse_pem("this is not valid PEM data at all");
        match result {
            Err(PkiError::ParseError(msg)) => assert!(msg.contains("parse PEM")),
            _ => panic!("Expected ParseError"),
        }
    }
}

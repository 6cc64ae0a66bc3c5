//! Trust material for RKE2 clusters
//!
//! This crate generates and inspects the certificate authorities a CAPI
//! managed RKE2 cluster needs. Persistence is handled by the control plane
//! (CA secrets stored in the management cluster); everything here is pure.
//!
//! # Public API
//!
//! - [`Purpose`]: which piece of trust material a key pair is for, and the
//!   secret name suffix CAPI uses for it
//! - [`KeyPair`]: PEM certificate and private key for one purpose
//! - [`generate_ca`]: self-signed CA generation
//! - [`CertificateInfo`]: validity period and subject of a certificate
//! - [`PkiError`]: error type for PKI operations

#![deny(missing_docs)]

pub mod pki;

pub use pki::{generate_ca, parse_pem, CertificateInfo, KeyPair, PkiError, Purpose, Result};

//! RKE2 control-plane core
//!
//! Decides whether control-plane Machines still conform to their
//! `RKE2ControlPlane`, opens time-bounded connections to workload clusters,
//! and looks up or generates the etcd CA those clusters need.
//!
//! # Public API
//!
//! - [`filters`]: conformance filters ([`filters::matches_configuration`],
//!   [`filters::machine_matches`]) and the [`filters::and`] combinator
//! - [`version`]: RKE2/Kubernetes version translation and comparison
//! - [`Management`]: management cluster facade (Machine listing, workload
//!   cluster connections, etcd CA lookup)
//! - [`WorkloadCluster`]: time-bounded client for one workload cluster
//! - [`ObjectReader`], [`ObjectWriter`]: object access capabilities

#![deny(missing_docs)]

pub mod certificates;
pub mod client;
pub mod filters;
pub mod management;
pub mod version;
pub mod workload;

pub use client::{ApiRegistry, KubeObjectClient, NamespacedObject, ObjectReader, ObjectWriter};
pub use filters::{and, machine_matches, matches_configuration, MachineFilter};
pub use management::{ClusterConfigResolver, KubeconfigSecretResolver, Management};
pub use workload::WorkloadCluster;

//! Custom Resource Definitions consumed by the RKE2 control plane
//!
//! `RKE2ControlPlane` is the desired state, `Machine` and `RKE2Config` are the
//! observed state of each node. Infrastructure machines are provider-specific
//! and handled as `DynamicObject`s.

mod bootstrap;
mod control_plane;
mod machine;
mod server_config;
mod types;

pub use bootstrap::{
    AgentConfig, File, FileSource, Mirror, Ntp, RKE2Config, RKE2ConfigSpec, Registry,
    RegistryConfig, SecretFileSource,
};
pub use control_plane::{RKE2ControlPlane, RKE2ControlPlaneMachineTemplate, RKE2ControlPlaneSpec};
pub use machine::{Bootstrap, Machine, MachineSpec};
pub use server_config::{DisableComponents, EtcdBackupConfig, EtcdConfig, RKE2ServerConfig};
pub use types::{ComponentConfig, ObjectReference};

//! # Model
//!
//! Records the deployment core reads and writes. Records reference each other
//! by id only; a WlApp is always reached through its `uuid`.

pub mod addon;
pub mod app;
pub mod build;
pub mod cluster;
pub mod credential;
pub mod deploy;
pub mod domain;
pub mod egress;
pub mod revision;
pub mod wlapp;

pub use addon::{AddonTls, ServiceInstanceBinding};
pub use app::{Application, EnvName, EnvTarget, Module, ModuleEnv};
pub use build::{ArtifactType, Build};
pub use cluster::{
    AllocationContext, AllocationPolicy, AllocationRule, Cluster, ClusterAllocationPolicy,
    ClusterAuth, DomainConfig, IngressConfig, PortMap,
};
pub use credential::AppUserCredential;
pub use deploy::{AppModelDeploy, DeployStatus, ModelResState};
pub use domain::{
    AppDomain, AppDomainCert, AppDomainSharedCert, AppSubpath, Domain, DomainSource, MarketConfig,
};
pub use egress::{RCStateAppBinding, RegionClusterState};
pub use revision::AppModelRevision;
pub use wlapp::{Toleration, WlApp, WlAppConfig, WlAppMetadata, WlAppType};

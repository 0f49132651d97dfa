//! # Prelude
//!
//! Re-exports commonly used types and traits for convenience.
//!
//! ```rust
//! use cnative_deployer::prelude::*;
//! ```

// CRD types
pub use crate::crd::*;

// Domain records
pub use crate::model::{
    AppModelDeploy, AppModelRevision, Cluster, DeployStatus, EnvName, EnvTarget, ModelResState,
};

// Seams
pub use crate::cluster::{ClusterGateway, SharedGateway};
pub use crate::store::{Repository, SharedRepository};

// Services
pub use crate::deploy::{DeployController, RevisionService};
pub use crate::ingress::DomainManager;
pub use crate::processes::ProcessReadModel;
pub use crate::runtime::Components;

// Config types
pub use crate::config::{Settings, SharedSettings};

// Common error types
pub use crate::artifacts::RegistryError;
pub use crate::error::{Error, ErrorKind, Result};
pub use crate::manifest::ManifestConstructorError;

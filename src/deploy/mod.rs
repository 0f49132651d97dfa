//! # Deployment
//!
//! Revisions, built-in runtime variables and the controller that applies a
//! revision to a cluster.
//!
//! ## Module Structure
//!
//! - `revisions.rs` - [`RevisionService`]
//! - `env_vars.rs` - `BKPAAS_*` runtime variables
//! - `controller.rs` - [`DeployController`]

pub mod controller;
pub mod env_vars;
pub mod revisions;

pub use controller::DeployController;
pub use env_vars::builtin_env_vars;
pub use revisions::RevisionService;

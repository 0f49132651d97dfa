//! Cloud-Native Deployer Library
//!
//! Deployment core of the PaaS: compiles a module revision into a BkApp
//! custom resource, applies it to the environment's cluster and follows the
//! rollout until the operator reports a final status.
//!
//! ## Quick Start
//!
//! ```rust
//! use cnative_deployer::prelude::*;
//! ```
//!
//! This brings commonly used types and traits into scope. For more specific imports,
//! use the individual modules.

pub mod artifacts;
pub mod auxiliary;
pub mod backoff;
pub mod cluster;
pub mod config;
pub mod constants;
pub mod crd;
pub mod deploy;
pub mod error;
pub mod ingress;
pub mod manifest;
pub mod model;
pub mod observability;
pub mod poller;
pub mod prelude;
pub mod processes;
pub mod resources;
pub mod runtime;
pub mod server;
pub mod store;
pub mod svc_discovery;

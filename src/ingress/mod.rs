//! # Ingress and Domains
//!
//! HTTP routing of a deployed environment: generated sub-domains and
//! sub-paths, user custom domains, TLS certificate selection and the single
//! DomainGroupMapping the operator renders Ingresses from.
//!
//! ## Module Structure
//!
//! - `addresses.rs` - generated sub-domains, sub-paths and entrance URLs
//! - `certs.rs` - shared certificate matcher
//! - `rewrite.rs` - nginx sub-path rewrite rules
//! - `manager.rs` - [`DomainManager`], mapping reconciliation and custom domains

pub mod addresses;
pub mod certs;
pub mod manager;
pub mod rewrite;

pub use addresses::EnvAddresses;
pub use certs::SharedCertMatcher;
pub use manager::{CustomDomainRequest, DomainManager, DomainPlan};

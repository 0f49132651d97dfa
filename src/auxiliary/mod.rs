//! # Auxiliary Resources
//!
//! Small cluster-side objects other components depend on.
//!
//! ## Module Structure
//!
//! - `image_credentials.rs` - registry pull Secrets
//! - `addon_tls.rs` - TLS Secrets of enhanced services
//! - `egress.rs` - [`EgressBinder`], node snapshots and app pinning

pub mod addon_tls;
pub mod egress;
pub mod image_credentials;

pub use egress::EgressBinder;

//! # Build Artifacts
//!
//! Container images produced by builds and their cleanup in the registry.
//!
//! ## Module Structure
//!
//! - `image.rs` - image reference parsing
//! - `registry.rs` - Docker Registry HTTP API v2 client
//! - `retention.rs` - [`delete_redundant_images`]

pub mod image;
pub mod registry;
pub mod retention;

pub use image::ImageRef;
pub use registry::{DockerRegistryClient, RegistryApi, RegistryAuth, RegistryError};
pub use retention::{delete_redundant_images, RetentionReport};

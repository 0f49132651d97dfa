//! # Runtime
//!
//! Process wiring of the deployment core.
//!
//! ## Module Structure
//!
//! - `initialization.rs` - rustls, tracing, metrics, HTTP server and settings
//!   watch for the daemon
//! - `wiring.rs` - [`Components`]: every service built over one store and
//!   one gateway, with the poller and event handlers running
//! - `handlers.rs` - post-deploy event handlers

pub mod handlers;
pub mod initialization;
pub mod wiring;

pub use handlers::PostDeployHandler;
pub use initialization::{initialize, InitOptions, InitializationResult};
pub use wiring::Components;

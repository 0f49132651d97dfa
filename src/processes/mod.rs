//! # Processes and Instances
//!
//! Read model of what actually runs in an environment, built from the
//! Deployments and Pods the operator creates for a BkApp.
//!
//! ## Module Structure
//!
//! - `model.rs` - [`Process`] and [`Instance`]
//! - `read_model.rs` - [`ProcessReadModel`] list and watch
//! - `diff.rs` - snapshot differences as deployment log events

pub mod diff;
pub mod model;
pub mod read_model;

pub use diff::{
    diff_instances, diff_processes, ProcInstEvent, ProcInstEventType, ProcessEvent,
    ProcessEventType,
};
pub use model::{Instance, Process};
pub use read_model::{ProcessReadModel, ProcessSnapshot, WatchMessage};

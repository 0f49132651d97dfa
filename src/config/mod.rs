//! # Configuration
//!
//! Settings of the deployment core and their hot-reload from a ConfigMap.

mod settings;
mod watch;

pub use settings::Settings;
pub use watch::{reload_from_configmap, start_configmap_watch};

use std::sync::Arc;
use tokio::sync::RwLock;

/// Settings shared between components, replaced wholesale on reload
pub type SharedSettings = Arc<RwLock<Settings>>;

pub fn create_shared_settings(settings: Settings) -> SharedSettings {
    Arc::new(RwLock::new(settings))
}

//! Domain events published when a deploy reaches a final status.

use crate::model::{AppModelDeploy, EnvTarget};
use tokio::sync::broadcast;
use tracing::debug;

const EVENT_BUS_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub enum DeployEvent {
    /// A cloud-native environment deploy finished (ready, error or unknown)
    PostCnativeEnvDeploy {
        target: Box<EnvTarget>,
        deploy: Box<AppModelDeploy>,
    },
}

/// Fan-out of [`DeployEvent`]s to any number of subscribers
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<DeployEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_BUS_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DeployEvent> {
        self.sender.subscribe()
    }

    /// Publishing without subscribers is not an error
    pub fn publish(&self, event: DeployEvent) {
        if self.sender.send(event).is_err() {
            debug!("No subscriber for deploy event");
        }
    }
}

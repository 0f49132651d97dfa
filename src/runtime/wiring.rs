//! # Wiring
//!
//! Builds every service of the deployment core over one store and one
//! gateway, then starts the poll worker and the post-deploy handlers.
//!
//! The daemon wires [`KubeGateway`](crate::cluster::KubeGateway); the
//! integration tests wire the in-memory fake.

use super::handlers::PostDeployHandler;
use crate::auxiliary::EgressBinder;
use crate::cluster::{ClusterRegistry, SharedGateway};
use crate::config::SharedSettings;
use crate::deploy::{DeployController, RevisionService};
use crate::ingress::DomainManager;
use crate::poller::{EventBus, PollQueue, StatusPoller};
use crate::processes::ProcessReadModel;
use crate::store::SharedRepository;
use crate::svc_discovery::{PreallocatedEntranceResolver, SvcDiscoveryProjector};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

pub struct Components {
    pub store: SharedRepository,
    pub gateway: SharedGateway,
    pub settings: SharedSettings,
    pub registry: ClusterRegistry,
    pub events: EventBus,
    pub queue: PollQueue,
    pub revisions: RevisionService,
    pub deploys: DeployController,
    pub domains: DomainManager,
    pub svc_discovery: SvcDiscoveryProjector,
    pub processes: ProcessReadModel,
    pub egress: EgressBinder,
    pub poller_handle: JoinHandle<()>,
    pub handler_handle: JoinHandle<()>,
}

impl std::fmt::Debug for Components {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Components")
            .field("queue", &self.queue)
            .field("poller_running", &!self.poller_handle.is_finished())
            .finish_non_exhaustive()
    }
}

impl Components {
    /// Build the services and spawn the background tasks.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(store: SharedRepository, gateway: SharedGateway, settings: SharedSettings) -> Self {
        let registry = ClusterRegistry::new(Arc::clone(&store));
        let events = EventBus::new();
        let (queue, receiver) = PollQueue::new();

        let svc_discovery = SvcDiscoveryProjector::new(
            Arc::new(PreallocatedEntranceResolver::new(registry.clone())),
            Arc::clone(&gateway),
            Arc::clone(&settings),
        );
        let deploys = DeployController::new(
            registry.clone(),
            Arc::clone(&gateway),
            Arc::clone(&settings),
            queue.clone(),
            svc_discovery.clone(),
        );
        let domains = DomainManager::new(registry.clone(), Arc::clone(&gateway), Arc::clone(&settings));

        let poller = StatusPoller::new(
            Arc::clone(&store),
            Arc::clone(&gateway),
            Arc::clone(&settings),
            queue.clone(),
            events.clone(),
        );
        let poller_handle = tokio::spawn(poller.run(receiver));
        let handler_handle = PostDeployHandler::new(domains.clone()).spawn(&events);
        info!("Deployment core started");

        Self {
            revisions: RevisionService::new(Arc::clone(&store)),
            processes: ProcessReadModel::new(Arc::clone(&gateway), Arc::clone(&settings)),
            egress: EgressBinder::new(registry.clone(), Arc::clone(&gateway)),
            store,
            gateway,
            settings,
            registry,
            events,
            queue,
            deploys,
            domains,
            svc_discovery,
            poller_handle,
            handler_handle,
        }
    }

    /// Stop the background tasks
    pub fn shutdown(&self) {
        self.poller_handle.abort();
        self.handler_handle.abort();
        info!("Deployment core stopped");
    }
}

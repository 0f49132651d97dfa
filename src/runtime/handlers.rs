//! # Post-Deploy Handlers
//!
//! Subscribers of the [`EventBus`] that run once a deploy is final.
//!
//! A successful deploy re-syncs the DomainGroupMapping of its environment so
//! custom domains created against an earlier deploy follow the new release.
//! Handler failures are logged and never affect the deploy record.

use crate::error::Result;
use crate::ingress::DomainManager;
use crate::model::DeployStatus;
use crate::poller::{DeployEvent, EventBus};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, warn, Instrument};

#[derive(Clone)]
pub struct PostDeployHandler {
    domains: DomainManager,
}

impl std::fmt::Debug for PostDeployHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostDeployHandler").finish_non_exhaustive()
    }
}

impl PostDeployHandler {
    pub fn new(domains: DomainManager) -> Self {
        Self { domains }
    }

    /// Handle a single event; returns whether any work was done
    pub async fn handle(&self, event: &DeployEvent) -> Result<bool> {
        let DeployEvent::PostCnativeEnvDeploy { target, deploy } = event;
        if deploy.status != DeployStatus::Ready {
            debug!(deploy.id = deploy.id, status = %deploy.status, "Skipping domain sync");
            return Ok(false);
        }

        let span = info_span!("post_deploy", deploy.id = deploy.id, bkapp.name = %target.bkapp_name);
        async {
            let mapping = self.domains.reconcile_target(target).await?;
            info!(applied = mapping.is_some(), "Domains synced after deploy");
            Ok(true)
        }
        .instrument(span)
        .await
    }

    /// Consume events from `bus` until it is dropped
    pub fn spawn(self, bus: &EventBus) -> JoinHandle<()> {
        let mut receiver = bus.subscribe();
        tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(event) => {
                        if let Err(e) = self.handle(&event).await {
                            error!(error = %e, "Post-deploy handler failed");
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Post-deploy handler lagged behind, events dropped");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            debug!("Post-deploy handler stopped");
        })
    }
}

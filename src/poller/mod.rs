//! # Deploy Status Poller
//!
//! Follows a deploy until the operator reports a final status.
//!
//! A single worker consumes [`PollTask`]s; each task runs one probe and is
//! re-enqueued with the polling interval until the deploy is final. The
//! delayed re-enqueue is the only way a deploy makes progress, so at most one
//! probe per deploy is ever in flight.
//!
//! ## Probe Rules
//!
//! - An interrupted deploy ends as `unknown/interrupted` with the user reason
//! - A deploy older than the polling timeout ends as `error/timeout`
//! - `ready` is final at once
//! - `error` is final only after more consecutive observations than the
//!   configured failure limit; any other observation resets the count
//! - Every other change of status, reason or message is recorded
//!
//! ## Module Structure
//!
//! - `queue.rs` - [`PollTask`] and [`PollQueue`]
//! - `state.rs` - status derivation from the BkApp
//! - `events.rs` - [`EventBus`] and [`DeployEvent`]

pub mod events;
pub mod queue;
pub mod state;

pub use events::{DeployEvent, EventBus};
pub use queue::{PollQueue, PollTask};
pub use state::derive_state;

use crate::cluster::SharedGateway;
use crate::config::SharedSettings;
use crate::crd::BkApp;
use crate::error::{Error, Result};
use crate::model::{deploy, AppModelDeploy, DeployStatus, ModelResState};
use crate::observability::metrics;
use crate::resources::{Kind, ResourceEntity};
use crate::store::SharedRepository;
use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// What the worker does with a task after probing it
#[derive(Debug)]
pub enum ProbeOutcome {
    Requeue(PollTask),
    Finished(DeployStatus),
}

#[derive(Clone)]
pub struct StatusPoller {
    store: SharedRepository,
    gateway: SharedGateway,
    settings: SharedSettings,
    queue: PollQueue,
    events: EventBus,
}

impl std::fmt::Debug for StatusPoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusPoller")
            .field("queue", &self.queue)
            .finish_non_exhaustive()
    }
}

impl StatusPoller {
    pub fn new(
        store: SharedRepository,
        gateway: SharedGateway,
        settings: SharedSettings,
        queue: PollQueue,
        events: EventBus,
    ) -> Self {
        Self {
            store,
            gateway,
            settings,
            queue,
            events,
        }
    }

    pub fn queue(&self) -> &PollQueue {
        &self.queue
    }

    /// Consume tasks until every sender is gone
    pub async fn run(self, mut receiver: mpsc::UnboundedReceiver<PollTask>) {
        info!("Status poller started");
        while let Some(task) = receiver.recv().await {
            let deploy_id = task.deploy_id;
            match self.probe(task).await {
                ProbeOutcome::Requeue(task) => {
                    let interval = self.settings.read().await.polling_interval();
                    self.queue.enqueue_after(task, interval);
                }
                ProbeOutcome::Finished(status) => {
                    debug!(deploy.id = deploy_id, status = %status, "Polling finished");
                    self.queue.finish(deploy_id);
                }
            }
        }
        info!("Status poller stopped");
    }

    /// Run one probe of `task`.
    ///
    /// Storage and cluster failures requeue the task until the polling
    /// timeout has passed. A deploy record that no longer exists ends the
    /// polling as `unknown`.
    pub async fn probe(&self, task: PollTask) -> ProbeOutcome {
        let span = info_span!(
            "poller.probe",
            deploy.id = task.deploy_id,
            attempt = task.attempt,
            cluster.name = %task.target.cluster.name,
        );
        metrics::increment_poll_probes();
        let retry = task.clone();
        match self.try_probe(task).instrument(span).await {
            Ok(outcome) => outcome,
            Err(Error::NotFound { kind, key }) => {
                warn!(deploy.id = retry.deploy_id, kind, key = %key, "Deploy record is gone, stop polling");
                ProbeOutcome::Finished(DeployStatus::Unknown)
            }
            Err(e) => {
                metrics::increment_poll_probe_errors();
                let timeout = self.settings.read().await.polling_timeout();
                if retry.started_at.elapsed() >= timeout {
                    error!(deploy.id = retry.deploy_id, error = %e, "Probe failed past the polling timeout, giving up");
                    return ProbeOutcome::Finished(DeployStatus::Error);
                }
                warn!(deploy.id = retry.deploy_id, error = %e, "Probe failed, will retry");
                ProbeOutcome::Requeue(PollTask {
                    attempt: retry.attempt + 1,
                    ..retry
                })
            }
        }
    }

    async fn try_probe(&self, mut task: PollTask) -> Result<ProbeOutcome> {
        let mut deploy = self.store.get_deploy(task.deploy_id).await?;
        if deploy.status.is_terminal() {
            return Ok(ProbeOutcome::Finished(deploy.status));
        }

        if deploy.is_interrupted {
            let state = ModelResState::new(DeployStatus::Unknown).with_reason(
                deploy::REASON_INTERRUPTED,
                deploy.interrupted_reason.clone().unwrap_or_default(),
            );
            info!("Deploy interrupted by user");
            return self.finish(&task, &mut deploy, &state, Utc::now()).await;
        }

        let settings = self.settings.read().await.clone();
        if task.started_at.elapsed() >= settings.polling_timeout() {
            let state = ModelResState::new(DeployStatus::Error).with_reason(
                deploy::REASON_TIMEOUT,
                format!(
                    "deploy did not finish within {} seconds",
                    settings.polling_timeout_secs
                ),
            );
            warn!("Deploy timed out");
            return self.finish(&task, &mut deploy, &state, Utc::now()).await;
        }

        let object = tokio::time::timeout(
            settings.probe_deadline(),
            self.gateway.get(
                &task.target.cluster,
                Kind::BkApp,
                &task.target.namespace,
                &task.target.bkapp_name,
            ),
        )
        .await
        .map_err(|_| Error::Transient("probe deadline exceeded".to_string()))??;
        let bkapp = object.as_ref().map(BkApp::deserialize).transpose()?;

        let state = derive_state(bkapp.as_ref(), &task.expected_deploy_id, &settings);
        let at = state::last_update(bkapp.as_ref()).unwrap_or_else(Utc::now);
        task.attempt += 1;

        match state.status {
            DeployStatus::Ready => self.finish(&task, &mut deploy, &state, at).await,
            DeployStatus::Error => {
                task.consecutive_errors += 1;
                if task.consecutive_errors > settings.polling_failure_limits {
                    return self.finish(&task, &mut deploy, &state, at).await;
                }
                debug!(
                    consecutive_errors = task.consecutive_errors,
                    reason = state.reason.as_deref().unwrap_or_default(),
                    "Tolerating error report"
                );
                Ok(ProbeOutcome::Requeue(task))
            }
            _ => {
                task.consecutive_errors = 0;
                if deploy.transition(&state, at) {
                    self.store.save_deploy(&deploy).await?;
                    info!(status = %deploy.status, "Deploy status changed");
                }
                Ok(ProbeOutcome::Requeue(task))
            }
        }
    }

    async fn finish(
        &self,
        task: &PollTask,
        deploy: &mut AppModelDeploy,
        state: &ModelResState,
        at: chrono::DateTime<Utc>,
    ) -> Result<ProbeOutcome> {
        if !deploy.transition(state, at) {
            return Ok(ProbeOutcome::Finished(deploy.status));
        }
        self.store.save_deploy(deploy).await?;

        let status = deploy.status;
        metrics::increment_deploys_finished(status.as_str());
        let elapsed = (Utc::now() - deploy.created).num_milliseconds();
        #[allow(clippy::cast_precision_loss, reason = "durations are far below 2^52 ms")]
        metrics::observe_deploy_duration(elapsed.max(0) as f64 / 1000.0);

        match status {
            DeployStatus::Error => error!(
                reason = deploy.reason.as_deref().unwrap_or_default(),
                message = deploy.message.as_deref().unwrap_or_default(),
                "Deploy failed"
            ),
            _ => info!(status = %status, "Deploy finished"),
        }

        self.events.publish(DeployEvent::PostCnativeEnvDeploy {
            target: Box::new(task.target.clone()),
            deploy: Box::new(deploy.clone()),
        });
        Ok(ProbeOutcome::Finished(status))
    }
}

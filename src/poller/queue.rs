//! Typed poll tasks and the delayed re-enqueue queue.

use crate::model::EnvTarget;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::warn;

/// One pending probe of a deploy
#[derive(Debug, Clone)]
pub struct PollTask {
    pub deploy_id: i64,
    pub target: EnvTarget,
    /// Value of the deploy-id annotation the operator echoes in its status
    pub expected_deploy_id: String,
    pub started_at: Instant,
    pub attempt: u32,
    /// Consecutive probes that observed `error`
    pub consecutive_errors: u32,
}

impl PollTask {
    pub fn new(deploy_id: i64, target: EnvTarget) -> Self {
        Self {
            deploy_id,
            target,
            expected_deploy_id: deploy_id.to_string(),
            started_at: Instant::now(),
            attempt: 0,
            consecutive_errors: 0,
        }
    }
}

/// Sending half of the poll queue.
///
/// A deploy is scheduled at most once; it leaves the queue when its probe
/// loop finishes.
#[derive(Debug, Clone)]
pub struct PollQueue {
    sender: mpsc::UnboundedSender<PollTask>,
    scheduled: Arc<Mutex<HashSet<i64>>>,
}

impl PollQueue {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<PollTask>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            Self {
                sender,
                scheduled: Arc::new(Mutex::new(HashSet::new())),
            },
            receiver,
        )
    }

    /// Schedule the first probe; false when the deploy is already polled
    pub fn enqueue(&self, task: PollTask) -> bool {
        let Ok(mut scheduled) = self.scheduled.lock() else {
            return false;
        };
        if !scheduled.insert(task.deploy_id) {
            return false;
        }
        drop(scheduled);
        self.send(task);
        true
    }

    /// Schedule the next probe of an already scheduled deploy
    pub fn enqueue_after(&self, task: PollTask, delay: Duration) {
        let queue = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            queue.send(task);
        });
    }

    pub fn finish(&self, deploy_id: i64) {
        if let Ok(mut scheduled) = self.scheduled.lock() {
            scheduled.remove(&deploy_id);
        }
    }

    pub fn is_scheduled(&self, deploy_id: i64) -> bool {
        self.scheduled
            .lock()
            .map(|s| s.contains(&deploy_id))
            .unwrap_or(false)
    }

    fn send(&self, task: PollTask) {
        let deploy_id = task.deploy_id;
        if self.sender.send(task).is_err() {
            warn!(deploy.id = deploy_id, "Poll worker is gone, dropping task");
            self.finish(deploy_id);
        }
    }
}

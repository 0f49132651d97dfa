//! Deploy attempts and their status lifecycle.

use crate::model::app::EnvName;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub const REASON_INVALID_CREDENTIALS: &str = "invalid_credentials";
pub const REASON_INTERNAL: &str = "internal";
pub const REASON_INTERRUPTED: &str = "interrupted";
pub const REASON_SUPERSEDED: &str = "superseded";
pub const REASON_TIMEOUT: &str = "timeout";
pub const REASON_VALIDATION: &str = "validation";
pub const REASON_CLUSTER: &str = "cluster_resolution";

/// External deploy status enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeployStatus {
    Pending,
    Progressing,
    Ready,
    Error,
    Unknown,
}

impl DeployStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DeployStatus::Pending => "pending",
            DeployStatus::Progressing => "progressing",
            DeployStatus::Ready => "ready",
            DeployStatus::Error => "error",
            DeployStatus::Unknown => "unknown",
        }
    }

    /// `unknown` is final as well: it is only ever set on interruption or supersession
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            DeployStatus::Ready | DeployStatus::Error | DeployStatus::Unknown
        )
    }

    fn rank(self) -> u8 {
        match self {
            DeployStatus::Pending => 0,
            DeployStatus::Progressing => 1,
            DeployStatus::Ready | DeployStatus::Error | DeployStatus::Unknown => 2,
        }
    }
}

impl fmt::Display for DeployStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status derived from one observation of the cluster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelResState {
    pub status: DeployStatus,
    pub reason: Option<String>,
    pub message: Option<String>,
}

impl ModelResState {
    pub fn new(status: DeployStatus) -> Self {
        Self {
            status,
            reason: None,
            message: None,
        }
    }

    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>, message: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self.message = Some(message.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppModelDeploy {
    pub id: i64,
    /// `{code}-{revision_pk}-{unix_ts}`
    pub name: String,
    pub application_id: Uuid,
    pub module_id: Uuid,
    pub environment_name: EnvName,
    pub revision_id: i64,
    pub status: DeployStatus,
    pub reason: Option<String>,
    pub message: Option<String>,
    pub operator: String,
    pub created: DateTime<Utc>,
    pub last_transition_time: Option<DateTime<Utc>>,
    pub is_interrupted: bool,
    pub interrupted_reason: Option<String>,
}

impl AppModelDeploy {
    pub fn make_name(app_code: &str, revision_id: i64, at: DateTime<Utc>) -> String {
        format!("{app_code}-{revision_id}-{}", at.timestamp())
    }

    /// Apply an observed state.
    ///
    /// Returns `false` and leaves the record untouched when the record is
    /// already final, when the state would move backwards, or when nothing
    /// changed.
    pub fn transition(&mut self, state: &ModelResState, at: DateTime<Utc>) -> bool {
        if self.status.is_terminal() || state.status.rank() < self.status.rank() {
            return false;
        }
        if self.status == state.status
            && self.reason == state.reason
            && self.message == state.message
        {
            return false;
        }
        self.status = state.status;
        self.reason.clone_from(&state.reason);
        self.message.clone_from(&state.message);
        self.last_transition_time = Some(at.max(self.created));
        true
    }

    pub fn mark_interrupted(&mut self, reason: &str) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.is_interrupted = true;
        self.interrupted_reason = Some(reason.to_string());
        true
    }
}

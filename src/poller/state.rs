//! Derive a deploy status from one observation of the BkApp.

use crate::config::Settings;
use crate::crd::{
    BkApp, BkAppStatus, Condition, CONDITION_ADDONS_PROVISIONED, CONDITION_APP_AVAILABLE,
    CONDITION_APP_PROGRESSING, CONDITION_HOOKS_FINISHED,
};
use crate::model::{DeployStatus, ModelResState};
use chrono::{DateTime, Utc};

const PHASE_FAILED: &str = "Failed";

/// Conditions checked for failures, in reporting order
const WATCHED_CONDITIONS: [&str; 4] = [
    CONDITION_APP_AVAILABLE,
    CONDITION_APP_PROGRESSING,
    CONDITION_ADDONS_PROVISIONED,
    CONDITION_HOOKS_FINISHED,
];

fn from_condition(status: DeployStatus, c: &Condition) -> ModelResState {
    ModelResState::new(status).with_reason(
        c.reason.clone().unwrap_or_default(),
        c.message.clone().unwrap_or_default(),
    )
}

fn hard_failure<'a>(status: &'a BkAppStatus, settings: &Settings) -> Option<&'a Condition> {
    WATCHED_CONDITIONS
        .iter()
        .filter_map(|t| status.condition(t))
        .find(|c| c.is_false() && c.reason.as_deref().is_some_and(|r| settings.is_hard_failure(r)))
}

/// Map the observed BkApp onto a deploy status.
///
/// A missing object, a missing status or a status that still describes an
/// older deploy all read as `pending`. A `False` condition is a failure only
/// when its reason is one of the configured hard-failure reasons, or when the
/// operator put the whole app in the `Failed` phase.
pub fn derive_state(bkapp: Option<&BkApp>, expected_deploy_id: &str, settings: &Settings) -> ModelResState {
    let Some(status) = bkapp.and_then(|b| b.status.as_ref()) else {
        return ModelResState::new(DeployStatus::Pending);
    };
    if status
        .deploy_id
        .as_deref()
        .is_some_and(|id| id != expected_deploy_id)
    {
        return ModelResState::new(DeployStatus::Pending);
    }

    if let Some(available) = status.condition(CONDITION_APP_AVAILABLE).filter(|c| c.is_true()) {
        return from_condition(DeployStatus::Ready, available);
    }

    if let Some(failed) = hard_failure(status, settings) {
        return from_condition(DeployStatus::Error, failed);
    }
    if status.phase.as_deref() == Some(PHASE_FAILED) {
        let cause = WATCHED_CONDITIONS
            .iter()
            .filter_map(|t| status.condition(t))
            .find(|c| c.is_false());
        return match cause {
            Some(c) => from_condition(DeployStatus::Error, c),
            None => ModelResState::new(DeployStatus::Error).with_reason(PHASE_FAILED, ""),
        };
    }

    if let Some(progressing) = status.condition(CONDITION_APP_PROGRESSING).filter(|c| c.is_true()) {
        return from_condition(DeployStatus::Progressing, progressing);
    }
    ModelResState::new(DeployStatus::Pending)
}

/// `status.lastUpdate` when present and well formed
pub fn last_update(bkapp: Option<&BkApp>) -> Option<DateTime<Utc>> {
    let raw = bkapp?.status.as_ref()?.last_update.as_deref()?;
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

//! # Errors
//!
//! Typed failures of the deployment core.
//!
//! Every component returns [`Error`]; callers branch on [`Error::kind`] to map
//! a failure onto a deploy record or an API response.

use crate::artifacts::RegistryError;
use crate::manifest::ManifestConstructorError;
use thiserror::Error;

/// Result alias used across the crate
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Failure classes the deployment core distinguishes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Rejected before any cluster write
    Validation,
    /// No cluster matched or no API server could be reached
    ClusterResolution,
    /// The API server kept answering 409 Conflict
    ConflictOnApply,
    /// Timeouts, 5xx and connection failures
    Transient,
    /// The on-cluster operator reported a definitive failure
    TerminalOperatorFailure,
    /// Stopped on user request
    Interrupted,
    /// Container registry call failed
    RegistryFailure,
    /// Programming or storage errors
    Internal,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("invalid image credentials, missing: {}", missing.join(", "))]
    InvalidImageCredentials { missing: Vec<String> },

    #[error("cluster not found: {0}")]
    ClusterNotFound(String),

    #[error("no default cluster configured for tenant {tenant_id}")]
    NoDefaultCluster { tenant_id: String },

    #[error("misconfigured cluster allocation policy: {0}")]
    MisconfiguredPolicy(String),

    #[error("no reachable API server for cluster {cluster}: {}", errors.join("; "))]
    NoReachableApiServer { cluster: String, errors: Vec<String> },

    #[error("cluster {cluster} credentials are invalid: {message}")]
    ClusterAuth { cluster: String, message: String },

    #[error("cluster {cluster} is still referenced by {references} application(s)")]
    ClusterInUse { cluster: String, references: usize },

    #[error("conflict applying {kind} {name} after {attempts} attempts")]
    ConflictOnApply {
        kind: String,
        name: String,
        attempts: u32,
    },

    /// Error answered by the Kubernetes API server, message kept verbatim
    #[error("{message}")]
    Api {
        code: u16,
        reason: String,
        message: String,
    },

    #[error("transient error: {0}")]
    Transient(String),

    #[error("operator reported failure: {reason}: {message}")]
    OperatorFailure { reason: String, message: String },

    #[error("interrupted: {0}")]
    Interrupted(String),

    #[error("{kind} {key} not found")]
    NotFound { kind: &'static str, key: String },

    #[error("{0}")]
    Conflict(String),

    #[error("deploy {deploy_id} failed: {source}")]
    DeployFailed {
        deploy_id: i64,
        #[source]
        source: Box<Error>,
    },

    #[error(transparent)]
    Manifest(#[from] ManifestConstructorError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("kubernetes client error: {0}")]
    Kube(#[source] kube::Error),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation(_)
            | Error::InvalidImageCredentials { .. }
            | Error::Manifest(_)
            | Error::Conflict(_) => ErrorKind::Validation,
            Error::ClusterNotFound(_)
            | Error::NoDefaultCluster { .. }
            | Error::MisconfiguredPolicy(_)
            | Error::NoReachableApiServer { .. }
            | Error::ClusterAuth { .. }
            | Error::ClusterInUse { .. } => ErrorKind::ClusterResolution,
            Error::ConflictOnApply { .. } => ErrorKind::ConflictOnApply,
            Error::Api { code, .. } if *code >= 500 => ErrorKind::Transient,
            Error::Api { code, .. } if *code == 401 || *code == 403 => {
                ErrorKind::ClusterResolution
            }
            Error::Api { code, .. } if *code == 409 => ErrorKind::ConflictOnApply,
            Error::Api { .. } => ErrorKind::Internal,
            Error::Transient(_) | Error::Kube(_) => ErrorKind::Transient,
            Error::OperatorFailure { .. } => ErrorKind::TerminalOperatorFailure,
            Error::Interrupted(_) => ErrorKind::Interrupted,
            Error::Registry(_) => ErrorKind::RegistryFailure,
            Error::DeployFailed { source, .. } => source.kind(),
            Error::NotFound { .. } | Error::Serialization(_) => ErrorKind::Internal,
        }
    }

    /// True when the API server answered 404
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Api { code: 404, .. } | Error::NotFound { .. })
    }

    /// True when the API server answered 409
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Api { code: 409, .. })
    }
}

impl From<kube::Error> for Error {
    fn from(err: kube::Error) -> Self {
        match err {
            kube::Error::Api(resp) => Error::Api {
                code: resp.code,
                reason: resp.reason,
                message: resp.message,
            },
            other => Error::Kube(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_errors_are_classified_by_status_code() {
        let api = |code| Error::Api {
            code,
            reason: "x".to_string(),
            message: "y".to_string(),
        };
        assert_eq!(api(503).kind(), ErrorKind::Transient);
        assert_eq!(api(409).kind(), ErrorKind::ConflictOnApply);
        assert_eq!(api(403).kind(), ErrorKind::ClusterResolution);
        assert_eq!(api(422).kind(), ErrorKind::Internal);
        assert!(api(404).is_not_found());
        assert!(api(409).is_conflict());
    }

    #[test]
    fn test_api_error_message_is_verbatim() {
        let err = Error::Api {
            code: 422,
            reason: "Invalid".to_string(),
            message: "BkApp.paas.bk.tencent.com \"demo\" is invalid".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "BkApp.paas.bk.tencent.com \"demo\" is invalid"
        );
    }

    #[test]
    fn test_deploy_failed_inherits_kind() {
        let err = Error::DeployFailed {
            deploy_id: 7,
            source: Box::new(Error::InvalidImageCredentials {
                missing: vec!["absent".to_string()],
            }),
        };
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(err.to_string().contains("absent"));
    }
}

//! Build artifacts produced by the build pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactType {
    Image,
    Slug,
}

/// Output of one build. The core only ever writes `artifact_deleted`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Build {
    pub uuid: Uuid,
    pub application_id: Uuid,
    pub module_id: Uuid,
    pub image: Option<String>,
    pub image_repository: Option<String>,
    pub image_tag: Option<String>,
    pub artifact_type: ArtifactType,
    pub artifact_deleted: bool,
    /// Process name to command line
    pub procfile: BTreeMap<String, String>,
    pub owner: String,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

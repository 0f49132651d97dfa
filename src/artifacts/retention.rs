//! Image retention: keep the newest images of a module, delete the rest.

use super::image::ImageRef;
use super::registry::{RegistryApi, RegistryError};
use crate::error::Result;
use crate::model::Build;
use crate::observability::metrics;
use crate::store::BuildStore;
use chrono::Utc;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetentionReport {
    pub deleted: usize,
    pub failed: usize,
}

fn image_of(build: &Build) -> Option<ImageRef> {
    let image = build.image.as_deref()?;
    let mut parsed = ImageRef::parse(image)?;
    if parsed.tag.is_none() {
        parsed.tag.clone_from(&build.image_tag);
    }
    parsed.tag.is_some().then_some(parsed)
}

/// Delete every live image build of `module_id` beyond the newest
/// `max_reserved`.
///
/// A row without a resolvable tag counts as failed. A manifest the registry
/// no longer has counts as deleted. Deleted rows are flagged
/// `artifact_deleted` in a single update.
pub async fn delete_redundant_images(
    store: &dyn BuildStore,
    registry: &dyn RegistryApi,
    module_id: Uuid,
    max_reserved: usize,
) -> Result<RetentionReport> {
    let span = info_span!("artifacts.retention", module.id = %module_id, max_reserved);
    async move {
        let builds = store.list_live_image_builds(module_id).await?;
        let mut report = RetentionReport::default();
        let mut deleted = Vec::new();

        for build in builds.iter().skip(max_reserved) {
            let Some(image) = image_of(build) else {
                warn!(build.uuid = %build.uuid, "Build image has no tag, skipping");
                metrics::increment_image_deletions("failed");
                report.failed += 1;
                continue;
            };

            match registry.delete_image(&image).await {
                Ok(()) => {
                    metrics::increment_image_deletions("deleted");
                    deleted.push(build.uuid);
                }
                Err(RegistryError::ResourceNotFound(_)) => {
                    metrics::increment_image_deletions("not_found");
                    deleted.push(build.uuid);
                }
                Err(e) => {
                    warn!(build.uuid = %build.uuid, image = %image, error = %e, "Failed to delete image");
                    metrics::increment_image_deletions("failed");
                    report.failed += 1;
                }
            }
        }

        if !deleted.is_empty() {
            store.mark_artifacts_deleted(&deleted, Utc::now()).await?;
        }
        report.deleted = deleted.len();
        info!(deleted = report.deleted, failed = report.failed, "Image retention finished");
        Ok(report)
    }
    .instrument(span)
    .await
}

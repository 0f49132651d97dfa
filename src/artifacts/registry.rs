//! Docker Registry HTTP API v2 client.
//!
//! Deleting an image by tag takes two calls: `HEAD` on the manifest resolves
//! the tag to its `Docker-Content-Digest`, then `DELETE` removes the manifest
//! by digest (registries refuse deletes by tag).
//!
//! References:
//! - [Registry API v2: deleting an image](https://distribution.github.io/distribution/spec/api/#deleting-an-image)

use super::image::ImageRef;
use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info_span, Instrument};

const MANIFEST_MEDIA_TYPES: &str = "application/vnd.docker.distribution.manifest.v2+json, \
    application/vnd.docker.distribution.manifest.list.v2+json, \
    application/vnd.oci.image.manifest.v1+json, \
    application/vnd.oci.image.index.v1+json";

const DIGEST_HEADER: &str = "Docker-Content-Digest";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// The manifest is already gone
    #[error("image {0} not found in registry")]
    ResourceNotFound(String),

    #[error("permission denied deleting {0}")]
    PermissionDeny(String),

    #[error("image {0} has no tag or digest")]
    MissingTag(String),

    #[error("registry answered {status}: {message}")]
    Api { status: u16, message: String },

    #[error("registry transport error: {0}")]
    Transport(String),
}

impl From<reqwest::Error> for RegistryError {
    fn from(err: reqwest::Error) -> Self {
        RegistryError::Transport(err.to_string())
    }
}

/// Manifest deletion in a container registry
#[async_trait]
pub trait RegistryApi: Send + Sync {
    async fn delete_image(&self, image: &ImageRef) -> Result<(), RegistryError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryAuth {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct DockerRegistryClient {
    http: Client,
    /// Sends every request here instead of `https://{registry}`
    base_url: Option<String>,
    auth: Option<RegistryAuth>,
}

impl DockerRegistryClient {
    pub fn new(auth: Option<RegistryAuth>, timeout: Duration) -> Result<Self, RegistryError> {
        Ok(Self {
            http: Client::builder().timeout(timeout).build()?,
            base_url: None,
            auth,
        })
    }

    /// Client talking to one fixed endpoint regardless of the image registry
    #[must_use]
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = Some(base_url.trim_end_matches('/').to_string());
        self
    }

    fn manifest_url(&self, image: &ImageRef, reference: &str) -> String {
        let base = self
            .base_url
            .clone()
            .unwrap_or_else(|| format!("https://{}", image.registry));
        format!("{base}/v2/{}/manifests/{reference}", image.repository)
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth {
            Some(a) => req.basic_auth(&a.username, Some(&a.password)),
            None => req,
        }
    }

    /// Resolve a tag to the digest of its manifest
    pub async fn resolve_digest(&self, image: &ImageRef, tag: &str) -> Result<String, RegistryError> {
        let url = self.manifest_url(image, tag);
        let resp = self
            .authorize(self.http.head(&url).header(ACCEPT, MANIFEST_MEDIA_TYPES))
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(classify(status, image, String::new()));
        }
        resp.headers()
            .get(DIGEST_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| RegistryError::Api {
                status: status.as_u16(),
                message: format!("response carries no {DIGEST_HEADER} header"),
            })
    }

    pub async fn delete_manifest(&self, image: &ImageRef, digest: &str) -> Result<(), RegistryError> {
        let url = self.manifest_url(image, digest);
        let resp = self.authorize(self.http.delete(&url)).send().await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        let body = resp.text().await.unwrap_or_default();
        Err(classify(status, image, body))
    }
}

fn classify(status: StatusCode, image: &ImageRef, body: String) -> RegistryError {
    match status {
        StatusCode::NOT_FOUND => RegistryError::ResourceNotFound(image.to_string()),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            RegistryError::PermissionDeny(image.to_string())
        }
        other => RegistryError::Api {
            status: other.as_u16(),
            message: body,
        },
    }
}

#[async_trait]
impl RegistryApi for DockerRegistryClient {
    async fn delete_image(&self, image: &ImageRef) -> Result<(), RegistryError> {
        let span = info_span!("registry.delete_image", image = %image);
        async {
            let digest = match (&image.digest, &image.tag) {
                (Some(d), _) => d.clone(),
                (None, Some(tag)) => self.resolve_digest(image, tag).await?,
                (None, None) => return Err(RegistryError::MissingTag(image.to_string())),
            };
            debug!(digest = %digest, "Resolved manifest digest");
            self.delete_manifest(image, &digest).await
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        let image = ImageRef::parse("registry.local/demo:v1").unwrap();
        assert!(matches!(
            classify(StatusCode::NOT_FOUND, &image, String::new()),
            RegistryError::ResourceNotFound(_)
        ));
        assert!(matches!(
            classify(StatusCode::FORBIDDEN, &image, String::new()),
            RegistryError::PermissionDeny(_)
        ));
        assert_eq!(
            classify(StatusCode::BAD_GATEWAY, &image, "oops".to_string()),
            RegistryError::Api {
                status: 502,
                message: "oops".to_string()
            }
        );
    }

    #[test]
    fn test_manifest_url_uses_registry_host() {
        let client = DockerRegistryClient::new(None, Duration::from_secs(5)).unwrap();
        let image = ImageRef::parse("registry.local/team/demo:v1").unwrap();
        assert_eq!(
            client.manifest_url(&image, "v1"),
            "https://registry.local/v2/team/demo/manifests/v1"
        );
        let client = client.with_base_url("http://127.0.0.1:9000/");
        assert_eq!(
            client.manifest_url(&image, "sha256:1"),
            "http://127.0.0.1:9000/v2/team/demo/manifests/sha256:1"
        );
    }
}

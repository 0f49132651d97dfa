//! Pact contract tests for the Docker Registry HTTP API v2
//!
//! These tests define the contract between the deployer's image retention and
//! the registry: resolve a tag to its manifest digest with `HEAD`, then delete
//! the manifest by digest.

#[cfg(test)]
mod common;

use common::init_rustls;
use std::sync::Once;

static RUSTLS_INIT: Once = Once::new();

/// Initialize rustls before tests
fn init() {
    RUSTLS_INIT.call_once(|| {
        init_rustls();
    });
}

use cnative_deployer::artifacts::{DockerRegistryClient, ImageRef, RegistryApi, RegistryAuth, RegistryError};
use pact_consumer::prelude::*;
use std::time::Duration;

const DIGEST: &str = "sha256:6c3c624b58dbbcd3c0dd82b4c53f04194d1247c6eebdaab7c610cf7d66709b3b";
// base64("user:pass")
const BASIC_AUTH: &str = "Basic dXNlcjpwYXNz";

fn client(base_url: &str) -> DockerRegistryClient {
    DockerRegistryClient::new(
        Some(RegistryAuth {
            username: "user".to_string(),
            password: "pass".to_string(),
        }),
        Duration::from_secs(5),
    )
    .expect("Failed to build registry client")
    .with_base_url(base_url)
}

/// Mock server URL with the trailing slash stripped
fn base_url(mut base_url: String) -> String {
    if base_url.ends_with('/') {
        base_url.pop();
    }
    base_url
}

#[tokio::test]
async fn test_registry_delete_image_by_tag_contract() {
    init();
    let mut pact_builder = PactBuilder::new("Cnative-Deployer", "Docker-Registry");

    pact_builder
        .interaction("resolve the manifest digest of a tag", "", |mut i| {
            i.given("image demo/web:v1 exists");
            i.request
                .method("HEAD")
                .path("/v2/demo/web/manifests/v1")
                .header("authorization", BASIC_AUTH);
            i.response
                .status(200)
                .header("docker-content-digest", DIGEST);
            i
        })
        .interaction("delete a manifest by digest", "", |mut i| {
            i.given("image demo/web:v1 exists");
            i.request
                .method("DELETE")
                .path(format!("/v2/demo/web/manifests/{DIGEST}"))
                .header("authorization", BASIC_AUTH);
            i.response.status(202);
            i
        });

    let mock_server = pact_builder.start_mock_server(None, None);
    let registry = client(&base_url(mock_server.url().to_string()));
    let image = ImageRef::parse("registry.example.com/demo/web:v1").expect("valid image reference");

    registry
        .delete_image(&image)
        .await
        .expect("Failed to delete image");
}

#[tokio::test]
async fn test_registry_missing_tag_contract() {
    init();
    let mut pact_builder = PactBuilder::new("Cnative-Deployer", "Docker-Registry");

    pact_builder.interaction("resolve a tag that does not exist", "", |mut i| {
        i.given("image demo/web:gone does not exist");
        i.request
            .method("HEAD")
            .path("/v2/demo/web/manifests/gone")
            .header("authorization", BASIC_AUTH);
        i.response.status(404);
        i
    });

    let mock_server = pact_builder.start_mock_server(None, None);
    let registry = client(&base_url(mock_server.url().to_string()));
    let image = ImageRef::parse("registry.example.com/demo/web:gone").expect("valid image reference");

    let err = registry.delete_image(&image).await.unwrap_err();
    assert!(matches!(err, RegistryError::ResourceNotFound(_)));
}

#[tokio::test]
async fn test_registry_delete_forbidden_contract() {
    init();
    let mut pact_builder = PactBuilder::new("Cnative-Deployer", "Docker-Registry");

    pact_builder.interaction("delete a manifest without delete permission", "", |mut i| {
        i.given("deletion is disabled for the robot account");
        i.request
            .method("DELETE")
            .path(format!("/v2/demo/web/manifests/{DIGEST}"))
            .header("authorization", BASIC_AUTH);
        i.response
            .status(403)
            .header("content-type", "application/json")
            .body(r#"{"errors":[{"code":"DENIED","message":"requested access to the resource is denied"}]}"#);
        i
    });

    let mock_server = pact_builder.start_mock_server(None, None);
    let registry = client(&base_url(mock_server.url().to_string()));
    let image = ImageRef::parse(&format!("registry.example.com/demo/web@{DIGEST}"))
        .expect("valid image reference");

    let err = registry.delete_image(&image).await.unwrap_err();
    assert!(matches!(err, RegistryError::PermissionDeny(_)));
}

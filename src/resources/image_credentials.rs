//! Docker config Secret holding registry credentials for image pulls.

use super::{from_dynamic, object_meta, preserve_resource_version, to_dynamic, Kind, ResourceEntity};
use crate::error::{Error, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use kube::api::DynamicObject;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const SECRET_TYPE_DOCKER_CONFIG_JSON: &str = "kubernetes.io/dockerconfigjson";
pub const DOCKER_CONFIG_JSON_KEY: &str = ".dockerconfigjson";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageCredential {
    pub registry: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageCredentialsEntity {
    pub name: String,
    pub labels: BTreeMap<String, String>,
    pub credentials: Vec<ImageCredential>,
}

#[derive(Serialize, Deserialize)]
struct DockerConfig {
    auths: BTreeMap<String, DockerAuth>,
}

#[derive(Serialize, Deserialize)]
struct DockerAuth {
    username: String,
    password: String,
    auth: String,
}

impl ResourceEntity for ImageCredentialsEntity {
    const KIND: Kind = Kind::ImageCredentials;

    fn name(&self) -> &str {
        &self.name
    }

    fn serialize(&self, original: Option<&DynamicObject>) -> Result<DynamicObject> {
        let config = DockerConfig {
            auths: self
                .credentials
                .iter()
                .map(|c| {
                    let auth = STANDARD.encode(format!("{}:{}", c.username, c.password));
                    (
                        c.registry.clone(),
                        DockerAuth {
                            username: c.username.clone(),
                            password: c.password.clone(),
                            auth,
                        },
                    )
                })
                .collect(),
        };

        let secret = Secret {
            metadata: object_meta(&self.name, &self.labels, &BTreeMap::new()),
            type_: Some(SECRET_TYPE_DOCKER_CONFIG_JSON.to_string()),
            data: Some(BTreeMap::from([(
                DOCKER_CONFIG_JSON_KEY.to_string(),
                ByteString(serde_json::to_vec(&config)?),
            )])),
            ..Secret::default()
        };
        let mut obj = to_dynamic(Self::KIND, &secret)?;
        preserve_resource_version(&mut obj, original);
        Ok(obj)
    }

    fn deserialize(obj: &DynamicObject) -> Result<Self> {
        let secret: Secret = from_dynamic(obj)?;
        let raw = secret
            .data
            .unwrap_or_default()
            .remove(DOCKER_CONFIG_JSON_KEY)
            .ok_or_else(|| {
                Error::Validation(format!(
                    "secret {} has no {DOCKER_CONFIG_JSON_KEY} key",
                    secret.metadata.name.as_deref().unwrap_or_default()
                ))
            })?;
        let config: DockerConfig = serde_json::from_slice(&raw.0)?;

        Ok(Self {
            name: secret.metadata.name.unwrap_or_default(),
            labels: secret.metadata.labels.unwrap_or_default(),
            credentials: config
                .auths
                .into_iter()
                .map(|(registry, auth)| ImageCredential {
                    registry,
                    username: auth.username,
                    password: auth.password,
                })
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_docker_config_contains_basic_auth() {
        let entity = ImageCredentialsEntity {
            name: "demo--dockerconfigjson".to_string(),
            labels: BTreeMap::new(),
            credentials: vec![ImageCredential {
                registry: "registry.local".to_string(),
                username: "u".to_string(),
                password: "p".to_string(),
            }],
        };
        let obj = entity.serialize(None).unwrap();
        assert_eq!(obj.data["type"], SECRET_TYPE_DOCKER_CONFIG_JSON);

        let encoded = obj.data["data"][DOCKER_CONFIG_JSON_KEY].as_str().unwrap();
        let config: serde_json::Value =
            serde_json::from_slice(&STANDARD.decode(encoded).unwrap()).unwrap();
        assert_eq!(config["auths"]["registry.local"]["auth"], "dTpw");

        assert_eq!(ImageCredentialsEntity::deserialize(&obj).unwrap(), entity);
    }
}

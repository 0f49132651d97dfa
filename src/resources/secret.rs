//! Opaque and TLS Secret entity.

use super::{from_dynamic, object_meta, preserve_resource_version, to_dynamic, Kind, ResourceEntity};
use crate::error::Result;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use kube::api::DynamicObject;
use std::collections::BTreeMap;

pub const SECRET_TYPE_OPAQUE: &str = "Opaque";
pub const SECRET_TYPE_TLS: &str = "kubernetes.io/tls";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecretEntity {
    pub name: String,
    pub labels: BTreeMap<String, String>,
    pub type_: String,
    /// Raw (decoded) values
    pub data: BTreeMap<String, Vec<u8>>,
}

impl SecretEntity {
    /// A `kubernetes.io/tls` secret; `ca.crt` is added when a CA is given
    pub fn tls(
        name: &str,
        labels: BTreeMap<String, String>,
        cert: &str,
        key: &str,
        ca: Option<&str>,
    ) -> Self {
        let mut data = BTreeMap::from([
            ("tls.crt".to_string(), cert.as_bytes().to_vec()),
            ("tls.key".to_string(), key.as_bytes().to_vec()),
        ]);
        if let Some(ca) = ca {
            data.insert("ca.crt".to_string(), ca.as_bytes().to_vec());
        }
        Self {
            name: name.to_string(),
            labels,
            type_: SECRET_TYPE_TLS.to_string(),
            data,
        }
    }
}

impl ResourceEntity for SecretEntity {
    const KIND: Kind = Kind::Secret;

    fn name(&self) -> &str {
        &self.name
    }

    fn serialize(&self, original: Option<&DynamicObject>) -> Result<DynamicObject> {
        let secret = Secret {
            metadata: object_meta(&self.name, &self.labels, &BTreeMap::new()),
            type_: Some(self.type_.clone()),
            data: Some(
                self.data
                    .iter()
                    .map(|(k, v)| (k.clone(), ByteString(v.clone())))
                    .collect(),
            ),
            ..Secret::default()
        };
        let mut obj = to_dynamic(Self::KIND, &secret)?;
        preserve_resource_version(&mut obj, original);
        Ok(obj)
    }

    fn deserialize(obj: &DynamicObject) -> Result<Self> {
        let secret: Secret = from_dynamic(obj)?;
        Ok(Self {
            name: secret.metadata.name.unwrap_or_default(),
            labels: secret.metadata.labels.unwrap_or_default(),
            type_: secret.type_.unwrap_or_else(|| SECRET_TYPE_OPAQUE.to_string()),
            data: secret
                .data
                .unwrap_or_default()
                .into_iter()
                .map(|(k, v)| (k, v.0))
                .collect(),
        })
    }
}

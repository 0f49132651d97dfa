//! Domains, sub-paths and certificates.

use crate::model::app::EnvName;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DomainSource {
    AutoGen,
    Custom,
    Independent,
}

/// Generated sub-domain of an environment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppDomain {
    pub host: String,
    pub https_enabled: bool,
    pub source: DomainSource,
    /// Explicit certificate; wins over shared-cert matching
    pub tls_secret_name: Option<String>,
}

/// Generated sub-path of an environment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppSubpath {
    pub host: String,
    pub subpath: String,
    pub https_enabled: bool,
}

/// Custom domain declared by a user for one (module, environment)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Domain {
    pub id: i64,
    pub tenant_id: String,
    pub application_id: Uuid,
    pub module_id: Uuid,
    pub environment: EnvName,
    pub name: String,
    pub path_prefix: String,
    pub https_enabled: bool,
    /// Name of an independent certificate bound to this domain
    pub cert_name: Option<String>,
}

/// Tenant-wide certificate picked automatically when a host matches
/// one of the `;`-separated `auto_match_cns` patterns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppDomainSharedCert {
    pub tenant_id: String,
    pub name: String,
    pub cert_data: String,
    pub key_data: String,
    pub auto_match_cns: String,
}

impl AppDomainSharedCert {
    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.auto_match_cns
            .split(';')
            .map(str::trim)
            .filter(|p| !p.is_empty())
    }
}

/// Certificate uploaded for a single custom domain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppDomainCert {
    pub tenant_id: String,
    pub name: String,
    pub cert_data: String,
    pub key_data: String,
}

/// Where the application's market entry points to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketConfig {
    pub application_id: Uuid,
    pub enabled: bool,
    /// Full URL of the market entrance, e.g. `https://foo.example.com/bar/`
    pub custom_domain_url: Option<String>,
}

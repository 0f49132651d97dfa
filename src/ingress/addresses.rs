//! Generated addresses of a module environment.
//!
//! Sub-domains are `{prefix}.{root}` for every root domain of the cluster, where
//! the prefix is the app code, qualified by the module for non-default modules.
//! The cluster's `default_ingress_domain_tmpl` may rewrite that layout (for
//! example `{env}-dot-{code}.{root}` when both environments share a cluster).
//!
//! Sub-paths come in three lengths per sub-path domain:
//!
//! | length | path                                         |
//! |--------|----------------------------------------------|
//! | short  | `/{env}--{code}/`, `/{env}--{module}-dot-{code}/` |
//! | medium | `/{env}--{module}--{code}/`                       |
//! | long   | `/{region}-bkapp-{code}-m-{module}-{env}/`        |
//!
//! The short path of a non-default module is qualified like its sub-domain.

use crate::model::{AppDomain, AppSubpath, DomainSource, EnvName, EnvTarget, IngressConfig, PortMap};

const DEFAULT_DOMAIN_TMPL: &str = "{code}.{root}";

/// Everything generated for one environment
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvAddresses {
    pub subdomains: Vec<AppDomain>,
    pub subpaths: Vec<AppSubpath>,
}

impl EnvAddresses {
    pub fn for_target(target: &EnvTarget) -> Self {
        let ingress = &target.cluster.ingress_config;
        let code = &target.application.code;
        let module = &target.module.name;
        Self {
            subdomains: subdomains(ingress, code, module, target.module.is_default, target.environment),
            subpaths: subpaths(
                ingress,
                &target.application.region,
                code,
                module,
                target.module.is_default,
                target.environment,
            ),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.subdomains.is_empty() && self.subpaths.is_empty()
    }

    /// Preferred entrance: first sub-domain, else first sub-path
    pub fn preferred_url(&self, port_map: &PortMap) -> Option<String> {
        if let Some(d) = self.subdomains.first() {
            return Some(make_url(&d.host, "/", d.https_enabled, port_map));
        }
        self.subpaths
            .first()
            .map(|p| make_url(&p.host, &p.subpath, p.https_enabled, port_map))
    }
}

fn code_part(code: &str, module: &str, is_default_module: bool) -> String {
    if is_default_module {
        code.to_string()
    } else {
        format!("{module}-dot-{code}")
    }
}

pub fn subdomains(
    ingress: &IngressConfig,
    code: &str,
    module: &str,
    is_default_module: bool,
    env: EnvName,
) -> Vec<AppDomain> {
    let tmpl = if ingress.default_ingress_domain_tmpl.is_empty() {
        DEFAULT_DOMAIN_TMPL
    } else {
        ingress.default_ingress_domain_tmpl.as_str()
    };
    let code_part = code_part(code, module, is_default_module);

    ingress
        .app_root_domains
        .iter()
        .filter(|root| !root.reserved)
        .map(|root| AppDomain {
            host: tmpl
                .replace("{code}", &code_part)
                .replace("{env}", env.as_str())
                .replace("{root}", &root.name)
                .to_lowercase(),
            https_enabled: root.https_enabled,
            source: DomainSource::AutoGen,
            tls_secret_name: None,
        })
        .collect()
}

pub fn subpaths(
    ingress: &IngressConfig,
    region: &str,
    code: &str,
    module: &str,
    is_default_module: bool,
    env: EnvName,
) -> Vec<AppSubpath> {
    let paths = [
        format!("/{env}--{}/", code_part(code, module, is_default_module)),
        format!("/{env}--{module}--{code}/"),
        format!("/{region}-bkapp-{code}-m-{module}-{env}/"),
    ];

    ingress
        .sub_path_domains
        .iter()
        .filter(|d| !d.reserved)
        .flat_map(|d| {
            paths.iter().map(move |p| AppSubpath {
                host: d.name.clone(),
                subpath: p.to_lowercase(),
                https_enabled: d.https_enabled,
            })
        })
        .collect()
}

/// Render an URL, omitting the port when it is the scheme default
pub fn make_url(host: &str, path: &str, https: bool, port_map: &PortMap) -> String {
    let (scheme, port, default) = if https {
        ("https", port_map.https, 443)
    } else {
        ("http", port_map.http, 80)
    };
    if port == default {
        format!("{scheme}://{host}{path}")
    } else {
        format!("{scheme}://{host}:{port}{path}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DomainConfig;

    fn ingress() -> IngressConfig {
        IngressConfig {
            app_root_domains: vec![
                DomainConfig {
                    name: "apps.example.com".to_string(),
                    reserved: false,
                    https_enabled: true,
                },
                DomainConfig {
                    name: "internal.example.com".to_string(),
                    reserved: true,
                    https_enabled: false,
                },
            ],
            sub_path_domains: vec![DomainConfig {
                name: "paas.example.com".to_string(),
                reserved: false,
                https_enabled: false,
            }],
            ..IngressConfig::default()
        }
    }

    #[test]
    fn test_default_module_addresses() {
        let domains = subdomains(&ingress(), "demo", "default", true, EnvName::Stag);
        assert_eq!(domains.len(), 1);
        assert_eq!(domains[0].host, "demo.apps.example.com");

        let paths: Vec<_> = subpaths(&ingress(), "default", "demo", "default", true, EnvName::Stag)
            .into_iter()
            .map(|p| p.subpath)
            .collect();
        assert_eq!(
            paths,
            vec![
                "/stag--demo/",
                "/stag--default--demo/",
                "/default-bkapp-demo-m-default-stag/",
            ]
        );
    }

    #[test]
    fn test_other_modules_are_qualified() {
        let domains = subdomains(&ingress(), "demo", "api", false, EnvName::Prod);
        assert_eq!(domains[0].host, "api-dot-demo.apps.example.com");
        let paths: Vec<_> = subpaths(&ingress(), "default", "demo", "api", false, EnvName::Prod)
            .into_iter()
            .map(|p| p.subpath)
            .collect();
        assert_eq!(
            paths,
            vec![
                "/prod--api-dot-demo/",
                "/prod--api--demo/",
                "/default-bkapp-demo-m-api-prod/",
            ]
        );
    }

    #[test]
    fn test_template_can_add_environment() {
        let mut cfg = ingress();
        cfg.default_ingress_domain_tmpl = "{env}-dot-{code}.{root}".to_string();
        let domains = subdomains(&cfg, "demo", "default", true, EnvName::Stag);
        assert_eq!(domains[0].host, "stag-dot-demo.apps.example.com");
    }

    #[test]
    fn test_url_omits_default_ports() {
        let ports = PortMap::default();
        assert_eq!(make_url("a.com", "/", true, &ports), "https://a.com/");
        let custom = PortMap { http: 8080, https: 8443 };
        assert_eq!(make_url("a.com", "/x/", false, &custom), "http://a.com:8080/x/");
    }
}

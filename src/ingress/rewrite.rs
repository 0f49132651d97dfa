//! Sub-path rewriting for nginx ingress.
//!
//! A request to `/{prefix}/rest` reaches the workload as `/rest`; the stripped
//! prefix travels in the `X-Script-Name` header so the application can build
//! absolute links.

use std::collections::BTreeMap;

pub const ANNO_REWRITE_TARGET: &str = "nginx.ingress.kubernetes.io/rewrite-target";
pub const ANNO_USE_REGEX: &str = "nginx.ingress.kubernetes.io/use-regex";
pub const ANNO_CONFIGURATION_SNIPPET: &str = "nginx.ingress.kubernetes.io/configuration-snippet";

/// Ingress path matching `path_prefix`; `/` needs no rewriting
pub fn ingress_path(path_prefix: &str) -> String {
    let trimmed = path_prefix.trim_matches('/');
    if trimmed.is_empty() {
        return "/".to_string();
    }
    format!("/({})(/|$)(.*)", regex::escape(trimmed))
}

/// Annotations turning [`ingress_path`] captures back into a root path
pub fn rewrite_annotations() -> BTreeMap<String, String> {
    BTreeMap::from([
        (ANNO_USE_REGEX.to_string(), "true".to_string()),
        (ANNO_REWRITE_TARGET.to_string(), "/$3".to_string()),
        (
            ANNO_CONFIGURATION_SNIPPET.to_string(),
            "proxy_set_header X-Script-Name /$1;".to_string(),
        ),
    ])
}

pub fn needs_rewrite(path_prefix: &str) -> bool {
    !path_prefix.trim_matches('/').is_empty()
}

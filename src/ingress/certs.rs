//! Shared certificate matching.
//!
//! Patterns of every shared certificate are compiled once into a trie keyed by
//! reversed host labels. `*.example.com` matches any host below `example.com`;
//! a plain pattern matches only itself. When several certificates match, the
//! one whose pattern has the longest literal suffix wins, and among equal
//! suffixes the certificate listed first.

use crate::model::AppDomainSharedCert;
use std::collections::HashMap;

#[derive(Debug, Default)]
struct Node {
    children: HashMap<String, Node>,
    /// Certificate of a pattern ending exactly here
    exact: Option<usize>,
    /// Certificate of a `*.` pattern rooted here
    wildcard: Option<usize>,
}

#[derive(Debug, Default)]
pub struct SharedCertMatcher {
    certs: Vec<AppDomainSharedCert>,
    root: Node,
}

impl SharedCertMatcher {
    pub fn new(certs: Vec<AppDomainSharedCert>) -> Self {
        let mut root = Node::default();
        for (idx, cert) in certs.iter().enumerate() {
            for pattern in cert.patterns() {
                let pattern = pattern.to_lowercase();
                let (wildcard, literal) = match pattern.strip_prefix("*.") {
                    Some(rest) => (true, rest.to_string()),
                    None => (false, pattern),
                };
                let mut node = &mut root;
                for label in literal.rsplit('.') {
                    node = node.children.entry(label.to_string()).or_default();
                }
                let slot = if wildcard {
                    &mut node.wildcard
                } else {
                    &mut node.exact
                };
                slot.get_or_insert(idx);
            }
        }
        Self { certs, root }
    }

    pub fn is_empty(&self) -> bool {
        self.certs.is_empty()
    }

    pub fn match_host(&self, host: &str) -> Option<&AppDomainSharedCert> {
        let host = host.to_lowercase();
        let labels: Vec<&str> = host.rsplit('.').collect();

        let mut best: Option<usize> = None;
        let mut node = &self.root;
        for label in &labels {
            // Checked before descending so a wildcard always covers one label
            if node.wildcard.is_some() {
                best = node.wildcard;
            }
            match node.children.get(*label) {
                Some(next) => node = next,
                None => return best.map(|i| &self.certs[i]),
            }
        }
        node.exact.or(best).map(|i| &self.certs[i])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cert(name: &str, cns: &str) -> AppDomainSharedCert {
        AppDomainSharedCert {
            tenant_id: "t1".to_string(),
            name: name.to_string(),
            cert_data: String::new(),
            key_data: String::new(),
            auto_match_cns: cns.to_string(),
        }
    }

    #[test]
    fn test_longest_suffix_wins() {
        let matcher = SharedCertMatcher::new(vec![
            cert("broad", "*.example.com"),
            cert("narrow", "*.apps.example.com"),
        ]);
        assert_eq!(matcher.match_host("demo.apps.example.com").unwrap().name, "narrow");
        assert_eq!(matcher.match_host("demo.example.com").unwrap().name, "broad");
        assert_eq!(matcher.match_host("a.b.example.com").unwrap().name, "broad");
        assert!(matcher.match_host("example.com").is_none());
        assert!(matcher.match_host("demo.example.org").is_none());
    }

    #[test]
    fn test_exact_pattern_and_multiple_cns() {
        let matcher = SharedCertMatcher::new(vec![
            cert("wild", "*.example.com"),
            cert("exact", "other.org; www.example.com"),
        ]);
        assert_eq!(matcher.match_host("www.example.com").unwrap().name, "exact");
        assert_eq!(matcher.match_host("OTHER.org").unwrap().name, "exact");
        assert_eq!(matcher.match_host("api.example.com").unwrap().name, "wild");
    }

    #[test]
    fn test_first_certificate_wins_ties() {
        let matcher = SharedCertMatcher::new(vec![
            cert("first", "*.example.com"),
            cert("second", "*.example.com"),
        ]);
        assert_eq!(matcher.match_host("a.example.com").unwrap().name, "first");
    }
}

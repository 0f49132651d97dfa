//! Container image references.

use std::fmt;

const DEFAULT_REGISTRY: &str = "docker.io";

/// `registry/repository[:tag][@digest]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    pub registry: String,
    pub repository: String,
    pub tag: Option<String>,
    pub digest: Option<String>,
}

impl ImageRef {
    /// Parse an image reference. The first path component is a registry when
    /// it contains `.` or `:` or is `localhost`, as the docker CLI decides.
    pub fn parse(image: &str) -> Option<Self> {
        let image = image.trim();
        if image.is_empty() {
            return None;
        }

        let (name, digest) = match image.split_once('@') {
            Some((n, d)) => (n, Some(d.to_string())),
            None => (image, None),
        };

        // A ':' after the last '/' separates the tag
        let last_slash = name.rfind('/').map_or(0, |i| i + 1);
        let (name, tag) = match name[last_slash..].rfind(':') {
            Some(i) => (
                &name[..last_slash + i],
                Some(name[last_slash + i + 1..].to_string()),
            ),
            None => (name, None),
        };

        let (registry, repository) = match name.split_once('/') {
            Some((first, rest))
                if first.contains('.') || first.contains(':') || first == "localhost" =>
            {
                (first.to_string(), rest.to_string())
            }
            _ if !name.contains('/') => (DEFAULT_REGISTRY.to_string(), format!("library/{name}")),
            _ => (DEFAULT_REGISTRY.to_string(), name.to_string()),
        };
        if repository.is_empty() || tag.as_deref() == Some("") {
            return None;
        }

        Some(Self {
            registry,
            repository,
            tag,
            digest,
        })
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.registry, self.repository)?;
        if let Some(tag) = &self.tag {
            write!(f, ":{tag}")?;
        }
        if let Some(digest) = &self.digest {
            write!(f, "@{digest}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_registry_with_port() {
        let r = ImageRef::parse("registry.local:5000/team/demo:v1").unwrap();
        assert_eq!(r.registry, "registry.local:5000");
        assert_eq!(r.repository, "team/demo");
        assert_eq!(r.tag.as_deref(), Some("v1"));
    }

    #[test]
    fn test_parse_docker_hub_shorthand() {
        let r = ImageRef::parse("nginx").unwrap();
        assert_eq!(r.registry, "docker.io");
        assert_eq!(r.repository, "library/nginx");
        assert_eq!(r.tag, None);

        let r = ImageRef::parse("bitnami/redis:7").unwrap();
        assert_eq!(r.repository, "bitnami/redis");
    }

    #[test]
    fn test_parse_digest() {
        let r = ImageRef::parse("registry.local/demo@sha256:abc").unwrap();
        assert_eq!(r.tag, None);
        assert_eq!(r.digest.as_deref(), Some("sha256:abc"));
        assert_eq!(r.to_string(), "registry.local/demo@sha256:abc");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(ImageRef::parse("").is_none());
        assert!(ImageRef::parse("registry.local/demo:").is_none());
    }
}

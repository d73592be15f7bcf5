//! REST paths of the namespaced resources the service works with

use crate::error::{OnOffError, Result};

/// Longest name a DNS-1123 subdomain may have
const MAX_NAME_LEN: usize = 253;

/// Check that `name` is a DNS-1123 subdomain, the format of deployment and
/// pod names.
///
/// Names arrive percent-decoded from request paths, so anything else
/// (slashes, dot segments, escapes) could address objects outside the
/// namespace once formatted into an API path.
pub fn validate_name(name: &str) -> Result<&str> {
    let label_ok = |label: &str| {
        let bytes = label.as_bytes();
        match (bytes.first(), bytes.last()) {
            (Some(first), Some(last)) => {
                first.is_ascii_alphanumeric()
                    && last.is_ascii_alphanumeric()
                    && bytes
                        .iter()
                        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || *b == b'-')
            }
            _ => false,
        }
    };

    if name.len() <= MAX_NAME_LEN && name.split('.').all(label_ok) {
        Ok(name)
    } else {
        Err(OnOffError::InvalidName(name.to_string()))
    }
}

/// Builds API paths for a single namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiPaths {
    namespace: String,
}

impl ApiPaths {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn deployments(&self) -> String {
        format!("/apis/apps/v1/namespaces/{}/deployments", self.namespace)
    }

    pub fn deployment(&self, name: &str) -> String {
        format!("{}/{}", self.deployments(), name)
    }

    pub fn daemon_sets(&self) -> String {
        format!("/apis/apps/v1/namespaces/{}/daemonsets", self.namespace)
    }

    pub fn replica_sets(&self) -> String {
        format!("/apis/apps/v1/namespaces/{}/replicasets", self.namespace)
    }

    pub fn pods(&self) -> String {
        format!("/api/v1/namespaces/{}/pods", self.namespace)
    }

    pub fn pod(&self, name: &str) -> String {
        format!("{}/{}", self.pods(), name)
    }

    pub fn pod_log(&self, name: &str) -> String {
        format!("{}/log", self.pod(name))
    }

    pub fn pod_metrics(&self) -> String {
        format!(
            "/apis/metrics.k8s.io/v1beta1/namespaces/{}/pods",
            self.namespace
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_names() {
        for name in ["web", "web-1", "kubeonoff-5d9f-x2k8q", "a.b-c.d", "0"] {
            assert_eq!(validate_name(name).unwrap(), name);
        }
    }

    #[test]
    fn test_names_that_could_leave_the_namespace_are_rejected() {
        for name in [
            "",
            ".",
            "..",
            "../../kube-system/pods/coredns",
            "web/log",
            "%2e%2e",
            "web..1",
            "-web",
            "web-",
            "Web",
            "web 1",
            "web?watch=true",
        ] {
            assert_eq!(
                validate_name(name),
                Err(OnOffError::InvalidName(name.to_string())),
                "{name:?} should be rejected"
            );
        }
        assert!(validate_name(&"a".repeat(254)).is_err());
    }

    #[test]
    fn test_paths_are_namespaced() {
        let paths = ApiPaths::new("staging");
        assert_eq!(
            paths.deployment("web"),
            "/apis/apps/v1/namespaces/staging/deployments/web"
        );
        assert_eq!(paths.pod_log("web-1"), "/api/v1/namespaces/staging/pods/web-1/log");
        assert_eq!(
            paths.pod_metrics(),
            "/apis/metrics.k8s.io/v1beta1/namespaces/staging/pods"
        );
    }
}

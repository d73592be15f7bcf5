//! Error taxonomy shared by the aggregation core and the lifecycle operations

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum OnOffError {
    #[error("malformed quantity {0:?}: expected <integer><suffix>")]
    MalformedQuantity(String),

    #[error("unknown unit suffix {suffix:?} in quantity {quantity:?}")]
    UnknownUnitSuffix { quantity: String, suffix: String },

    /// Non-2xx answer from the Kubernetes API, passed through verbatim.
    #[error("{} ({status})", body.trim())]
    Upstream { status: u16, body: String },

    #[error("failed to reach the Kubernetes API: {0}")]
    Transport(String),

    #[error("unexpected response from the Kubernetes API: {0}")]
    Decode(String),

    #[error("pod metrics are unavailable: {0}")]
    MetricsUnavailable(String),

    #[error("deployment \"{name}\" wasn't stopped by onoff: {reason}")]
    NotPreviouslyStopped { name: String, reason: String },

    #[error("deployment \"{name}\" has a non-numeric rolling restart serial {value:?}")]
    InvalidRestartSerial { name: String, value: String },

    #[error("invalid object name {0:?}: expected a lowercase DNS-1123 name")]
    InvalidName(String),

    /// A request path the client would not send as given.
    #[error("refusing to request {0:?}: path is not in canonical form")]
    InvalidPath(String),

    #[error("extension not found: {0}")]
    UnknownExtension(String),
}

impl OnOffError {
    /// HTTP status this error should be reported with.
    pub fn status_code(&self) -> u16 {
        match self {
            OnOffError::Upstream { status, .. } => *status,
            OnOffError::MalformedQuantity(_)
            | OnOffError::UnknownUnitSuffix { .. }
            | OnOffError::NotPreviouslyStopped { .. }
            | OnOffError::InvalidRestartSerial { .. }
            | OnOffError::InvalidName(_)
            | OnOffError::InvalidPath(_) => 400,
            OnOffError::UnknownExtension(_) => 404,
            OnOffError::Transport(_) => 502,
            OnOffError::Decode(_) | OnOffError::MetricsUnavailable(_) => 500,
        }
    }

    pub fn is_upstream(&self) -> bool {
        matches!(self, OnOffError::Upstream { .. } | OnOffError::Transport(_))
    }
}

impl From<serde_json::Error> for OnOffError {
    fn from(err: serde_json::Error) -> Self {
        OnOffError::Decode(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, OnOffError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_error_display_trims_body() {
        let err = OnOffError::Upstream {
            status: 404,
            body: "not found\n".to_string(),
        };
        assert_eq!(err.to_string(), "not found (404)");
        assert_eq!(err.status_code(), 404);
    }

    #[test]
    fn test_not_previously_stopped_is_client_error() {
        let err = OnOffError::NotPreviouslyStopped {
            name: "web".to_string(),
            reason: "annotation missing".to_string(),
        };
        assert_eq!(err.status_code(), 400);
        assert!(err.to_string().contains("wasn't stopped by onoff"));
        assert!(!err.is_upstream());
    }
}

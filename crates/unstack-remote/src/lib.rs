//! Remote control-plane access for unstack.
//!
//! This crate defines the `StackService` trait the teardown core polls and
//! deletes through, the `RemoteStackState` snapshot it returns, an HTTP backend
//! speaking the unstack control-plane protocol, and a scriptable in-memory mock
//! used by tests and dry runs.

pub mod config;
pub mod http;
pub mod mock;
pub mod state;

pub use config::RemoteConfig;
pub use http::HttpStackService;
pub use mock::{MockResponse, MockStackService};
pub use state::RemoteStackState;

use std::sync::Arc;
use thiserror::Error;
use unstack_schema::{KeyName, StackName};

/// Protocol version sent as `X-Unstack-Protocol` header on all HTTP requests.
pub const PROTOCOL_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum RemoteError {
    /// Transport or auth failure while describing a stack.
    #[error("describe failed for '{stack}': {reason}")]
    Query { stack: StackName, reason: String },
    /// The delete request could not be submitted.
    #[error("delete request failed for '{stack}': {reason}")]
    Request { stack: StackName, reason: String },
    #[error("key pair deletion failed for '{key}': {reason}")]
    KeyPair { key: KeyName, reason: String },
    #[error("remote I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("remote config error: {0}")]
    Config(String),
    #[error("backend '{0}' is not available")]
    BackendUnavailable(String),
    #[error("{operation} is not supported by the {backend} backend")]
    Unsupported {
        backend: String,
        operation: &'static str,
    },
}

impl RemoteError {
    /// Errors a deletion worker recovers from by waiting and retrying.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Query { .. } | Self::Request { .. })
    }
}

/// Control-plane capability the teardown core depends on.
///
/// Implementations are shared by every deletion worker and called from many
/// threads at once, so they must not rely on call ordering between stacks.
pub trait StackService: Send + Sync {
    fn name(&self) -> &str;

    /// Fetch the current state of a stack.
    ///
    /// A stack that does not exist maps to `Ok(RemoteStackState::Absent)`,
    /// never to an error.
    fn describe(&self, stack: &StackName) -> Result<RemoteStackState, RemoteError>;

    /// Ask the control plane to delete a stack and return once acknowledged.
    ///
    /// Requesting deletion of a stack that is already deleting or already
    /// gone succeeds.
    fn request_delete(&self, stack: &StackName) -> Result<(), RemoteError>;

    /// Delete a key pair. Returns `false` if the key did not exist.
    fn delete_key_pair(&self, _key: &KeyName) -> Result<bool, RemoteError> {
        Err(RemoteError::Unsupported {
            backend: self.name().to_owned(),
            operation: "key pair deletion",
        })
    }
}

/// Build a service by backend name.
///
/// `"http"` needs a remote config; `"mock"` starts empty, so every stack reads
/// as already absent.
pub fn select_service(
    name: &str,
    config: Option<RemoteConfig>,
) -> Result<Arc<dyn StackService>, RemoteError> {
    match name {
        "http" => {
            let config = config.ok_or_else(|| {
                RemoteError::Config("the http backend needs a remote URL".to_owned())
            })?;
            Ok(Arc::new(HttpStackService::new(config)))
        }
        "mock" => Ok(Arc::new(MockStackService::new())),
        other => Err(RemoteError::BackendUnavailable(other.to_owned())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_valid_services() {
        let http = select_service("http", Some(RemoteConfig::new("http://127.0.0.1:1"))).unwrap();
        assert_eq!(http.name(), "http");
        let mock = select_service("mock", None).unwrap();
        assert_eq!(mock.name(), "mock");
    }

    #[test]
    fn select_http_without_config_fails() {
        assert!(matches!(
            select_service("http", None),
            Err(RemoteError::Config(_))
        ));
    }

    #[test]
    fn select_invalid_service_fails() {
        assert!(matches!(
            select_service("cloudformation-sdk", None),
            Err(RemoteError::BackendUnavailable(_))
        ));
    }

    #[test]
    fn transient_classification() {
        let query = RemoteError::Query {
            stack: "a".into(),
            reason: "timeout".to_owned(),
        };
        let request = RemoteError::Request {
            stack: "a".into(),
            reason: "HTTP 503".to_owned(),
        };
        assert!(query.is_transient());
        assert!(request.is_transient());
        assert!(!RemoteError::Config("x".to_owned()).is_transient());
    }

    struct DescribeOnly;

    impl StackService for DescribeOnly {
        fn name(&self) -> &str {
            "describe-only"
        }

        fn describe(&self, _stack: &StackName) -> Result<RemoteStackState, RemoteError> {
            Ok(RemoteStackState::Absent)
        }

        fn request_delete(&self, _stack: &StackName) -> Result<(), RemoteError> {
            Ok(())
        }
    }

    #[test]
    fn key_pair_deletion_defaults_to_unsupported() {
        let err = DescribeOnly
            .delete_key_pair(&KeyName::from("bastion"))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "key pair deletion is not supported by the describe-only backend"
        );
    }
}

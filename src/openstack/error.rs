//! Error types for the OpenStack Nova adapter.

use thiserror::Error;

use crate::address::AddressError;
use crate::backend::BackendError;
use crate::config::ConfigError;
use crate::gateway::GatewayError;

/// Errors raised by the OpenStack Nova adapter.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum OpenStackProviderError {
    /// Raised when the connector configuration is incomplete.
    #[error("configuration error: {0}")]
    Config(String),
    /// Raised when a request is missing a required field.
    #[error("invalid instance request: {0}")]
    Validation(String),
    /// Raised when a server creation call fails. Servers created by earlier
    /// calls of the same request are left running.
    #[error("created {created} of {requested} server(s) named {name}: {message}")]
    Creation {
        /// Server name shared by the request.
        name: String,
        /// Servers created before the failure.
        created: u32,
        /// Servers requested.
        requested: u32,
        /// Failure reported by the provider.
        message: String,
    },
    /// Raised when the provider returns an identifier already seen for the
    /// same request.
    #[error("provider returned duplicate server id {id}")]
    DuplicateInstance {
        /// Repeated identifier.
        id: String,
    },
    /// Raised when a floating IP cannot be added or removed.
    #[error(transparent)]
    Address(#[from] AddressError),
    /// Wrapper for other remote failures.
    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

impl From<BackendError> for OpenStackProviderError {
    fn from(value: BackendError) -> Self {
        match value {
            BackendError::Validation(field) => Self::Validation(field),
        }
    }
}

impl From<ConfigError> for OpenStackProviderError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value.to_string())
    }
}

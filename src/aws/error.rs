//! Error types for the AWS EC2 adapter.

use thiserror::Error;

use crate::address::AddressError;
use crate::backend::BackendError;
use crate::config::ConfigError;
use crate::gateway::GatewayError;
use crate::region::RegionError;

/// Errors raised by the AWS EC2 adapter.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum AwsProviderError {
    /// Raised when the connector configuration is incomplete.
    #[error("configuration error: {0}")]
    Config(String),
    /// Raised when a request is missing a required field.
    #[error("invalid instance request: {0}")]
    Validation(String),
    /// Raised when the region of an image or instance cannot be derived.
    #[error(transparent)]
    Region(#[from] RegionError),
    /// Raised when no default key pair could be created and the
    /// configuration requires one.
    #[error("no default key pair available in region {region}: {message}")]
    KeyPairUnavailable {
        /// Region the key pair was requested for.
        region: String,
        /// Creation failure reported by the provider.
        message: String,
    },
    /// Raised when the batch creation call fails. Instances created before
    /// the failure may still exist remotely.
    #[error("failed to create {requested} instance(s) in group {group}: {message}")]
    BatchCreation {
        /// Group tag of the batch.
        group: String,
        /// Number of instances requested.
        requested: u32,
        /// Failure reported by the provider.
        message: String,
    },
    /// Raised when a public address cannot be acquired or released.
    #[error(transparent)]
    Address(#[from] AddressError),
    /// Wrapper for other remote failures.
    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

impl From<BackendError> for AwsProviderError {
    fn from(value: BackendError) -> Self {
        match value {
            BackendError::Validation(field) => Self::Validation(field),
        }
    }
}

impl From<ConfigError> for AwsProviderError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value.to_string())
    }
}

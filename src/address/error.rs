//! Error types for public IP acquisition.

use thiserror::Error;

use crate::gateway::GatewayError;

/// Errors raised while acquiring or releasing a public address.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum AddressError {
    /// Raised when no free address could be associated and allocation failed.
    #[error("no addresses available in region {region}: {message}")]
    Exhausted {
        /// Region the allocation was attempted in.
        region: String,
        /// Allocation failure reported by the provider.
        message: String,
    },
    /// Raised when the floating-IP pool has no unbound entry.
    #[error("no floating IP available in region {region}")]
    NoFloatingIp {
        /// Region whose pool was inspected.
        region: String,
    },
    /// Raised when the cloud lacks the extension needed for public addresses.
    #[error("operation not supported: {capability}")]
    Unsupported {
        /// Missing capability.
        capability: String,
    },
    /// Wrapper for other remote failures.
    #[error(transparent)]
    Remote(#[from] GatewayError),
}

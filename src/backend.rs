//! Provider abstraction shared by the AWS EC2 and OpenStack Nova adapters.

use std::collections::BTreeSet;
use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::gateway::NodeRecord;
use crate::request::InstanceRequest;

/// Account-level description of the cloud a request targets.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Infrastructure {
    /// Identifier assigned by the hosting service.
    pub id: String,
    /// Provider type, for example `aws-ec2` or `openstack-nova`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Optional API endpoint; providers fall back to their public default.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Credentials used by the gateway connector to authenticate.
    pub credentials: InfrastructureCredentials,
}

/// Account credentials handed to the gateway connector untouched.
#[derive(Clone, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct InfrastructureCredentials {
    /// Access key or user name.
    pub username: String,
    /// Secret key or password.
    pub password: String,
}

impl std::fmt::Debug for InfrastructureCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InfrastructureCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Internal representation of an instance created by a provider.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct Instance {
    /// Provider identifier; AWS identifiers carry a `region/` prefix.
    pub id: String,
    /// Group tag (AWS) or server name (OpenStack).
    pub tag: String,
    /// Image the instance booted from.
    pub image: String,
    /// Always `1` for a created instance.
    pub number: u32,
    /// Hardware type or flavour reported by the provider.
    pub hardware_type: Option<String>,
    /// Provider status string.
    pub status: String,
    /// Public addresses known at creation time.
    pub public_addresses: Vec<String>,
}

impl From<NodeRecord> for Instance {
    fn from(node: NodeRecord) -> Self {
        Self {
            id: node.id,
            tag: node.group,
            image: node.image,
            number: 1,
            hardware_type: node.hardware_type,
            status: node.status,
            public_addresses: node.public_addresses,
        }
    }
}

/// Errors raised while validating provider-neutral requests.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum BackendError {
    /// Raised when a request is missing a required field.
    #[error("missing or empty field: {0}")]
    Validation(String),
}

/// Future returned by provider and gateway operations.
pub type BackendFuture<'a, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'a>>;

/// Uniform capability set implemented by each cloud adapter.
pub trait InfrastructureProvider {
    /// Provider specific error type returned by the adapter.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Infrastructure type served by this adapter.
    const TYPE: &'static str;

    /// Creates `request.number` instances and returns them as a set.
    ///
    /// A failure part way through is surfaced as an error even though some
    /// instances may already exist remotely.
    fn create_instance<'a>(
        &'a self,
        infrastructure: &'a Infrastructure,
        request: &'a InstanceRequest,
    ) -> BackendFuture<'a, BTreeSet<Instance>, Self::Error>;

    /// Associates a public address with the instance and returns it.
    fn add_public_ip<'a>(
        &'a self,
        infrastructure: &'a Infrastructure,
        instance_id: &'a str,
        desired_address: Option<&'a str>,
    ) -> BackendFuture<'a, String, Self::Error>;

    /// Disassociates `desired_address`, or any address bound to the instance.
    fn remove_public_ip<'a>(
        &'a self,
        infrastructure: &'a Infrastructure,
        instance_id: &'a str,
        desired_address: Option<&'a str>,
    ) -> BackendFuture<'a, (), Self::Error>;
}

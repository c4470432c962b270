//! Collaborator interfaces for authenticated cloud API handles.
//!
//! The adapters never talk to a vendor SDK directly. A [`GatewayConnector`]
//! turns an [`Infrastructure`] into an already-authenticated handle, and the
//! handle exposes the narrow set of remote calls the key-pair cache and the
//! address engines need.

use std::collections::{BTreeMap, BTreeSet};
use std::iter;

use thiserror::Error;

use crate::backend::{BackendFuture, Infrastructure};

/// Errors reported by gateway handles.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum GatewayError {
    /// Raised when a remote call fails.
    #[error("{operation} failed: {message}")]
    Remote {
        /// Remote operation that failed.
        operation: String,
        /// Message returned by the provider.
        message: String,
    },
    /// Raised when the account or cloud lacks the required API extension.
    #[error("operation not supported: {capability}")]
    Unsupported {
        /// Missing capability.
        capability: String,
    },
}

impl GatewayError {
    /// Convenience constructor for [`GatewayError::Remote`].
    #[must_use]
    pub fn remote(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Remote {
            operation: operation.into(),
            message: message.into(),
        }
    }
}

/// Generated key pair: provider-side name and private key material.
#[derive(Clone, Eq, PartialEq)]
pub struct KeyPairRecord {
    /// Name registered with the provider.
    pub name: String,
    /// Private key returned once at creation time.
    pub private_key_material: String,
}

impl std::fmt::Debug for KeyPairRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPairRecord")
            .field("name", &self.name)
            .field("private_key_material", &"<redacted>")
            .finish()
    }
}

/// Elastic address as reported by the provider.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PublicAddress {
    /// Dotted address.
    pub value: String,
    /// Instance the address is bound to, if any.
    pub associated_instance_id: Option<String>,
}

impl PublicAddress {
    /// Creates an address that is not bound to any instance.
    #[must_use]
    pub fn free(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            associated_instance_id: None,
        }
    }

    /// Creates an address bound to `instance_id`.
    #[must_use]
    pub fn associated(value: impl Into<String>, instance_id: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            associated_instance_id: Some(instance_id.into()),
        }
    }

    /// Returns `true` when no instance holds the address.
    #[must_use]
    pub const fn is_free(&self) -> bool {
        self.associated_instance_id.is_none()
    }
}

/// Node in the provider's location tree (zone, region, provider).
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Location {
    /// Location identifier, for example `eu-west-1c`.
    pub id: String,
    /// Enclosing location.
    pub parent: Option<Box<Location>>,
}

impl Location {
    /// Creates a root location.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            parent: None,
        }
    }

    /// Nests this location inside `parent`.
    #[must_use]
    pub fn within(mut self, parent: Self) -> Self {
        self.parent = Some(Box::new(parent));
        self
    }

    /// Iterates from this location up to the root.
    pub fn ancestry(&self) -> impl Iterator<Item = &Self> {
        iter::successors(Some(self), |location| location.parent.as_deref())
    }
}

/// Instance record as reported by the provider.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NodeRecord {
    /// Identifier used by the connector (AWS: `region/instance-id`).
    pub id: String,
    /// Bare provider identifier (AWS: `i-…`).
    pub provider_id: String,
    /// Group tag or server name.
    pub group: String,
    /// Image the node booted from.
    pub image: String,
    /// Hardware type or flavour.
    pub hardware_type: Option<String>,
    /// Placement of the node.
    pub location: Option<Location>,
    /// Public addresses currently bound to the node.
    pub public_addresses: Vec<String>,
    /// Provider status string.
    pub status: String,
}

/// Template options passed to the AWS batch creation call.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TemplateOptions {
    /// Key pair installed on the instances.
    pub key_pair_name: Option<String>,
    /// Login user override.
    pub login_user: Option<String>,
    /// Maximum spot price.
    pub spot_price: Option<f32>,
    /// Security groups the instances join.
    pub security_group_ids: Vec<String>,
    /// Subnet the instances are placed in.
    pub subnet_id: Option<String>,
    /// User metadata, built from request tags.
    pub user_metadata: BTreeMap<String, String>,
}

/// Template used for AWS batch creation.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct InstanceTemplate {
    /// Region qualified image identifier.
    pub image_id: String,
    /// Minimum RAM in megabytes.
    pub min_ram: u32,
    /// Minimum virtual cores.
    pub min_cores: f64,
    /// Additional options.
    pub options: TemplateOptions,
}

/// Options passed to the OpenStack single server creation call.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ServerOptions {
    /// Key pair installed on the server.
    pub key_pair_name: Option<String>,
    /// User data executed on first boot.
    pub user_data: String,
}

/// OpenStack floating IP entry.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FloatingIp {
    /// Public address.
    pub ip: String,
    /// Fixed address the floating IP is bound to; `None` when unbound.
    pub fixed_ip: Option<String>,
    /// Server holding the floating IP, if any.
    pub instance_id: Option<String>,
}

/// Turns infrastructure credentials into an authenticated gateway handle.
pub trait GatewayConnector: Send + Sync {
    /// Handle type produced by the connector.
    type Gateway: Send + Sync;

    /// Connects to the account or project described by `infrastructure`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError`] when the handle cannot be built.
    fn connect(&self, infrastructure: &Infrastructure) -> Result<Self::Gateway, GatewayError>;
}

/// Remote calls needed against one AWS EC2 account.
pub trait Ec2Gateway: Send + Sync {
    /// Creates a key pair named `name` in `region`.
    fn create_key_pair<'a>(
        &'a self,
        region: &'a str,
        name: &'a str,
    ) -> BackendFuture<'a, KeyPairRecord, GatewayError>;

    /// Lists key-pair names in `region` matching `name_filter`.
    fn list_key_pairs<'a>(
        &'a self,
        region: &'a str,
        name_filter: &'a str,
    ) -> BackendFuture<'a, BTreeSet<String>, GatewayError>;

    /// Lists elastic addresses in `region`, in provider order.
    fn describe_addresses<'a>(
        &'a self,
        region: &'a str,
    ) -> BackendFuture<'a, Vec<PublicAddress>, GatewayError>;

    /// Binds `address` to the instance with the bare provider identifier.
    fn associate_address<'a>(
        &'a self,
        region: &'a str,
        address: &'a str,
        provider_instance_id: &'a str,
    ) -> BackendFuture<'a, (), GatewayError>;

    /// Unbinds `address` from whatever instance holds it.
    fn disassociate_address<'a>(
        &'a self,
        region: &'a str,
        address: &'a str,
    ) -> BackendFuture<'a, (), GatewayError>;

    /// Allocates a new elastic address from the provider's pool.
    fn allocate_address<'a>(&'a self, region: &'a str) -> BackendFuture<'a, String, GatewayError>;

    /// Creates `count` instances in one batch call.
    fn create_nodes<'a>(
        &'a self,
        group: &'a str,
        count: u32,
        template: &'a InstanceTemplate,
    ) -> BackendFuture<'a, Vec<NodeRecord>, GatewayError>;

    /// Fetches the node with the connector identifier `instance_id`.
    fn get_node<'a>(&'a self, instance_id: &'a str) -> BackendFuture<'a, NodeRecord, GatewayError>;

    /// Lists the identifiers of the account's assignable locations.
    fn list_assignable_locations(&self) -> BackendFuture<'_, BTreeSet<String>, GatewayError>;
}

/// Remote calls needed against one OpenStack Nova project.
pub trait NovaGateway: Send + Sync {
    /// Creates one server and returns its identifier.
    fn create_server<'a>(
        &'a self,
        region: &'a str,
        name: &'a str,
        image: &'a str,
        flavor: &'a str,
        options: &'a ServerOptions,
    ) -> BackendFuture<'a, String, GatewayError>;

    /// Fetches a server by identifier.
    fn get_server<'a>(
        &'a self,
        region: &'a str,
        server_id: &'a str,
    ) -> BackendFuture<'a, NodeRecord, GatewayError>;

    /// Returns `true` when the floating-IP extension is enabled in `region`.
    fn supports_floating_ips(&self, region: &str) -> bool;

    /// Lists the project's floating IPs.
    fn list_floating_ips<'a>(
        &'a self,
        region: &'a str,
    ) -> BackendFuture<'a, Vec<FloatingIp>, GatewayError>;

    /// Binds floating IP `ip` to `server_id`.
    fn add_floating_ip<'a>(
        &'a self,
        region: &'a str,
        ip: &'a str,
        server_id: &'a str,
    ) -> BackendFuture<'a, (), GatewayError>;

    /// Unbinds floating IP `ip` from `server_id`.
    fn remove_floating_ip<'a>(
        &'a self,
        region: &'a str,
        ip: &'a str,
        server_id: &'a str,
    ) -> BackendFuture<'a, (), GatewayError>;
}

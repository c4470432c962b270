//! Core library for the IaaS connector.
//!
//! The crate provisions virtual machine instances and manages their public
//! IP addresses on AWS EC2 and OpenStack Nova behind one internal instance
//! model. Each adapter composes an authenticated gateway handle, the
//! per-region key-pair cache (AWS only) and a public IP acquisition engine
//! to implement [`InfrastructureProvider`].

pub mod address;
pub mod aws;
pub mod backend;
pub mod config;
pub mod gateway;
pub mod keypair;
pub mod openstack;
pub mod region;
pub mod request;
pub mod test_support;

pub use address::{AcquisitionPolicy, AddressError, ElasticIpEngine, FloatingIpEngine};
pub use aws::{AwsEc2Provider, AwsProviderError};
pub use backend::{
    BackendError, BackendFuture, Infrastructure, InfrastructureCredentials,
    InfrastructureProvider, Instance,
};
pub use config::{ConfigError, ConnectorConfig};
pub use gateway::{Ec2Gateway, GatewayConnector, GatewayError, NovaGateway};
pub use keypair::{KeyPairCache, KeyPairResolution};
pub use openstack::{OpenStackProvider, OpenStackProviderError};
pub use region::RegionError;
pub use request::{
    Hardware, InstanceCredentials, InstanceOptions, InstanceRequest, InstanceRequestBuilder,
    SshCredentials, Tag,
};

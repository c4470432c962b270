//! OpenStack Nova adapter.
//!
//! Nova has no batch primitive, so a request for `n` instances issues `n`
//! sequential server creations. Every call targets the single configured
//! region. Public IPs come from the project's floating-IP pool.

mod error;

use std::collections::BTreeSet;

use tracing::{debug, info, warn};

use crate::address::FloatingIpEngine;
use crate::backend::{
    BackendError, BackendFuture, Infrastructure, InfrastructureProvider, Instance,
};
use crate::config::ConnectorConfig;
use crate::gateway::{GatewayConnector, NovaGateway, ServerOptions};
use crate::request::InstanceRequest;

pub use error::OpenStackProviderError;

/// Adapter that provisions servers through an OpenStack Nova gateway.
#[derive(Debug)]
pub struct OpenStackProvider<C> {
    connector: C,
    region: String,
}

impl<C> OpenStackProvider<C>
where
    C: GatewayConnector,
    C::Gateway: NovaGateway,
{
    /// Constructs a new adapter from a connector and configuration.
    ///
    /// # Errors
    ///
    /// Returns [`OpenStackProviderError::Config`] when the configuration
    /// fails validation.
    pub fn new(connector: C, config: &ConnectorConfig) -> Result<Self, OpenStackProviderError> {
        config.validate()?;
        Ok(Self {
            connector,
            region: config.openstack_region.clone(),
        })
    }

    /// Region every remote call targets.
    #[must_use]
    pub fn region(&self) -> &str {
        &self.region
    }

    fn server_options(request: &InstanceRequest) -> ServerOptions {
        ServerOptions {
            key_pair_name: request
                .credentials
                .as_ref()
                .and_then(|credentials| credentials.key_pair_name())
                .map(str::to_owned),
            user_data: request.user_data(),
        }
    }
}

impl<C> InfrastructureProvider for OpenStackProvider<C>
where
    C: GatewayConnector,
    C::Gateway: NovaGateway,
{
    type Error = OpenStackProviderError;

    const TYPE: &'static str = "openstack-nova";

    fn create_instance<'a>(
        &'a self,
        infrastructure: &'a Infrastructure,
        request: &'a InstanceRequest,
    ) -> BackendFuture<'a, BTreeSet<Instance>, Self::Error> {
        Box::pin(async move {
            request.validate()?;
            let flavor = request
                .hardware
                .hardware_type
                .as_deref()
                .filter(|flavor| !flavor.is_empty())
                .ok_or_else(|| BackendError::Validation(String::from("hardware.type")))?;
            let gateway = self.connector.connect(infrastructure)?;
            let options = Self::server_options(request);

            let mut instances = BTreeSet::new();
            let mut seen = BTreeSet::new();
            for created in 0..request.number {
                let server_id = match gateway
                    .create_server(&self.region, &request.tag, &request.image, flavor, &options)
                    .await
                {
                    Ok(id) => id,
                    Err(err) => {
                        warn!(
                            name = %request.tag,
                            created,
                            requested = request.number,
                            error = %err,
                            "server creation failed; earlier servers are not reconciled"
                        );
                        return Err(OpenStackProviderError::Creation {
                            name: request.tag.clone(),
                            created,
                            requested: request.number,
                            message: err.to_string(),
                        });
                    }
                };
                if !seen.insert(server_id.clone()) {
                    return Err(OpenStackProviderError::DuplicateInstance { id: server_id });
                }
                let server = gateway.get_server(&self.region, &server_id).await?;
                debug!(server = %server.id, status = %server.status, "created server");
                instances.insert(Instance::from(server));
            }

            info!(
                name = %request.tag,
                count = instances.len(),
                region = %self.region,
                "created servers"
            );
            Ok(instances)
        })
    }

    fn add_public_ip<'a>(
        &'a self,
        infrastructure: &'a Infrastructure,
        instance_id: &'a str,
        desired_address: Option<&'a str>,
    ) -> BackendFuture<'a, String, Self::Error> {
        Box::pin(async move {
            let gateway = self.connector.connect(infrastructure)?;
            let server = gateway.get_server(&self.region, instance_id).await?;
            let ip = FloatingIpEngine::new(&gateway, &self.region)
                .acquire(&server.id, desired_address)
                .await?;
            Ok(ip)
        })
    }

    fn remove_public_ip<'a>(
        &'a self,
        infrastructure: &'a Infrastructure,
        instance_id: &'a str,
        desired_address: Option<&'a str>,
    ) -> BackendFuture<'a, (), Self::Error> {
        Box::pin(async move {
            let gateway = self.connector.connect(infrastructure)?;
            let server = gateway.get_server(&self.region, instance_id).await?;
            let released = FloatingIpEngine::new(&gateway, &self.region)
                .release(&server.id, desired_address)
                .await?;
            if released.is_none() {
                debug!(instance = instance_id, "no floating IP to remove");
            }
            Ok(())
        })
    }
}

//! AWS EC2 adapter.
//!
//! Instances without caller credentials receive the generated key pair of
//! their image's region. Public IPs are elastic addresses, reused before a
//! new one is allocated.

mod error;
mod template;

use std::collections::BTreeSet;

use tracing::{debug, info, warn};

use crate::address::{AcquisitionPolicy, ElasticIpEngine};
use crate::backend::{BackendFuture, Infrastructure, InfrastructureProvider, Instance};
use crate::config::ConnectorConfig;
use crate::gateway::{Ec2Gateway, GatewayConnector, NodeRecord};
use crate::keypair::{KeyPairCache, KeyPairResolution};
use crate::region::{
    RegionError, assignable_ancestor, parent_region, region_from_image, region_from_instance_id,
};
use crate::request::{InstanceCredentials, InstanceRequest, SshCredentials};

pub use error::AwsProviderError;

/// Adapter that provisions instances through an AWS EC2 gateway.
#[derive(Debug)]
pub struct AwsEc2Provider<C> {
    connector: C,
    key_pairs: KeyPairCache,
    policy: AcquisitionPolicy,
    vm_user_login: String,
    require_default_key_pair: bool,
}

impl<C> AwsEc2Provider<C>
where
    C: GatewayConnector,
    C::Gateway: Ec2Gateway,
{
    /// Constructs a new adapter from a connector and configuration.
    ///
    /// # Errors
    ///
    /// Returns [`AwsProviderError::Config`] when the configuration fails
    /// validation.
    pub fn new(connector: C, config: &ConnectorConfig) -> Result<Self, AwsProviderError> {
        config.validate()?;
        Ok(Self {
            connector,
            key_pairs: KeyPairCache::new(config.key_pair_prefix.clone()),
            policy: config.acquisition_policy(),
            vm_user_login: config.vm_user_login.clone(),
            require_default_key_pair: config.require_default_key_pair,
        })
    }

    /// Returns the per-region key-pair cache owned by this adapter.
    #[must_use]
    pub const fn key_pairs(&self) -> &KeyPairCache {
        &self.key_pairs
    }

    /// Returns SSH credentials for running scripts on an instance created
    /// with the generated key pair of its region.
    ///
    /// Returns `None` when no key pair was generated for that region. The
    /// cached key is not checked against the provider.
    ///
    /// # Errors
    ///
    /// Returns [`AwsProviderError`] when the node or its region cannot be
    /// resolved.
    pub async fn default_ssh_credentials(
        &self,
        infrastructure: &Infrastructure,
        instance_id: &str,
    ) -> Result<Option<SshCredentials>, AwsProviderError> {
        let gateway = self.connector.connect(infrastructure)?;
        let node = gateway.get_node(instance_id).await?;
        let zone = Self::location_region(&gateway, &node).await?;
        let region = parent_region(&zone);

        Ok(self
            .key_pairs
            .cached(region)
            .map(|record| SshCredentials {
                username: self.vm_user_login.clone(),
                private_key: Some(record.private_key_material),
            }))
    }

    /// Returns SSH credentials for caller supplied instance credentials,
    /// falling back to the configured login user.
    #[must_use]
    pub fn ssh_credentials_for(&self, credentials: &InstanceCredentials) -> SshCredentials {
        SshCredentials {
            username: credentials
                .login_user()
                .map_or_else(|| self.vm_user_login.clone(), str::to_owned),
            private_key: credentials.private_key.clone(),
        }
    }

    async fn default_credentials(
        &self,
        gateway: &C::Gateway,
        request: &InstanceRequest,
    ) -> Result<InstanceCredentials, AwsProviderError> {
        let region = region_from_image(&request.image)?;
        match self.key_pairs.resolve(region, gateway).await? {
            KeyPairResolution::Validated(record) | KeyPairResolution::Created(record) => Ok(
                InstanceCredentials::with_key_pair(self.vm_user_login.clone(), record.name),
            ),
            KeyPairResolution::Unavailable { region: failed, reason } => {
                if self.require_default_key_pair {
                    return Err(AwsProviderError::KeyPairUnavailable {
                        region: failed,
                        message: reason.to_string(),
                    });
                }
                warn!(
                    region = %failed,
                    "creating instances without a default key pair"
                );
                Ok(InstanceCredentials {
                    username: Some(self.vm_user_login.clone()),
                    ..InstanceCredentials::default()
                })
            }
        }
    }

    /// Region of an instance: the prefix of its identifier when present,
    /// otherwise the region containing the node's assignable location.
    async fn node_region(
        gateway: &C::Gateway,
        instance_id: &str,
        node: &NodeRecord,
    ) -> Result<String, AwsProviderError> {
        if let Some(region) = region_from_instance_id(instance_id) {
            return Ok(region.to_owned());
        }
        let location = Self::location_region(gateway, node).await?;
        Ok(parent_region(&location).to_owned())
    }

    async fn location_region(
        gateway: &C::Gateway,
        node: &NodeRecord,
    ) -> Result<String, AwsProviderError> {
        let location = node
            .location
            .as_ref()
            .ok_or_else(|| RegionError::MissingLocation {
                instance_id: node.id.clone(),
            })?;
        let assignable = gateway.list_assignable_locations().await?;
        let region = assignable_ancestor(location, &assignable)?;
        debug!(instance = %node.id, region, "resolved node location");
        Ok(region.to_owned())
    }
}

impl<C> InfrastructureProvider for AwsEc2Provider<C>
where
    C: GatewayConnector,
    C::Gateway: Ec2Gateway,
{
    type Error = AwsProviderError;

    const TYPE: &'static str = "aws-ec2";

    fn create_instance<'a>(
        &'a self,
        infrastructure: &'a Infrastructure,
        request: &'a InstanceRequest,
    ) -> BackendFuture<'a, BTreeSet<Instance>, Self::Error> {
        Box::pin(async move {
            request.validate()?;
            let gateway = self.connector.connect(infrastructure)?;

            let credentials = match &request.credentials {
                Some(explicit) => explicit.clone(),
                None => self.default_credentials(&gateway, request).await?,
            };
            let template = template::build_template(request, &credentials)?;

            let nodes = match gateway
                .create_nodes(&request.tag, request.number, &template)
                .await
            {
                Ok(nodes) => nodes,
                Err(err) => {
                    warn!(
                        group = %request.tag,
                        requested = request.number,
                        error = %err,
                        "batch creation failed; instances created before the failure are not reconciled"
                    );
                    return Err(AwsProviderError::BatchCreation {
                        group: request.tag.clone(),
                        requested: request.number,
                        message: err.to_string(),
                    });
                }
            };

            info!(group = %request.tag, count = nodes.len(), "created instances");
            Ok(nodes.into_iter().map(Instance::from).collect())
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
            let node = gateway.get_node(instance_id).await?;
            let region = Self::node_region(&gateway, instance_id, &node).await?;
            let address = ElasticIpEngine::new(&gateway, &region, self.policy)
                .acquire(&node.provider_id, desired_address)
                .await?;
            Ok(address)
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
            let node = gateway.get_node(instance_id).await?;
            let region = Self::node_region(&gateway, instance_id, &node).await?;
            let released = ElasticIpEngine::new(&gateway, &region, self.policy)
                .release(&node.public_addresses, desired_address)
                .await?;
            if released.is_none() {
                debug!(instance = instance_id, "no public address to remove");
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests;

//! Elastic IP strategy for AWS EC2.

use tracing::{info, warn};

use super::{AcquisitionPolicy, AddressError};
use crate::gateway::Ec2Gateway;

/// Acquires and releases elastic addresses in one region.
#[derive(Debug)]
pub struct ElasticIpEngine<'a, G: ?Sized> {
    gateway: &'a G,
    region: &'a str,
    policy: AcquisitionPolicy,
}

impl<'a, G> ElasticIpEngine<'a, G>
where
    G: Ec2Gateway + ?Sized,
{
    /// Creates an engine operating on `region` through `gateway`.
    #[must_use]
    pub const fn new(gateway: &'a G, region: &'a str, policy: AcquisitionPolicy) -> Self {
        Self {
            gateway,
            region,
            policy,
        }
    }

    /// Associates an address with `provider_instance_id` and returns it.
    ///
    /// A desired address is associated as given. Otherwise free addresses are
    /// tried in provider order, skipping any the provider refuses, and a new
    /// address is allocated once the free ones are exhausted.
    ///
    /// # Errors
    ///
    /// Returns [`AddressError::Exhausted`] when allocation fails after the
    /// scan, and [`AddressError::Remote`] for any other remote failure.
    pub async fn acquire(
        &self,
        provider_instance_id: &str,
        desired: Option<&str>,
    ) -> Result<String, AddressError> {
        if let Some(address) = desired {
            self.associate(address, provider_instance_id).await?;
            return Ok(address.to_owned());
        }

        let free: Vec<String> = self
            .gateway
            .describe_addresses(self.region)
            .await?
            .into_iter()
            .filter(|address| address.is_free())
            .map(|address| address.value)
            .collect();

        let limit = self.policy.candidate_limit(free.len());
        for candidate in free.iter().take(limit) {
            match self.associate(candidate, provider_instance_id).await {
                Ok(()) => return Ok(candidate.clone()),
                Err(err) => warn!(
                    address = %candidate,
                    region = self.region,
                    error = %err,
                    "cannot associate address"
                ),
            }
        }

        let allocated = self
            .gateway
            .allocate_address(self.region)
            .await
            .map_err(|err| AddressError::Exhausted {
                region: self.region.to_owned(),
                message: err.to_string(),
            })?;
        self.associate(&allocated, provider_instance_id).await?;
        Ok(allocated)
    }

    /// Disassociates `desired`, or one of `associated`, and returns the
    /// released address. Returns `None` when there is nothing to release.
    ///
    /// # Errors
    ///
    /// Returns [`AddressError::Remote`] when the provider rejects the call.
    pub async fn release(
        &self,
        associated: &[String],
        desired: Option<&str>,
    ) -> Result<Option<String>, AddressError> {
        let Some(address) = desired.or_else(|| associated.first().map(String::as_str)) else {
            return Ok(None);
        };
        self.gateway
            .disassociate_address(self.region, address)
            .await?;
        info!(address, region = self.region, "disassociated address");
        Ok(Some(address.to_owned()))
    }

    async fn associate(
        &self,
        address: &str,
        provider_instance_id: &str,
    ) -> Result<(), AddressError> {
        self.gateway
            .associate_address(self.region, address, provider_instance_id)
            .await?;
        info!(
            address,
            instance = provider_instance_id,
            region = self.region,
            "associated address"
        );
        Ok(())
    }
}

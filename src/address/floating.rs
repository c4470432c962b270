//! Floating IP strategy for OpenStack Nova.

use tracing::info;

use super::AddressError;
use crate::gateway::NovaGateway;

/// Acquires and releases floating IPs in one region.
#[derive(Debug)]
pub struct FloatingIpEngine<'a, G: ?Sized> {
    gateway: &'a G,
    region: &'a str,
}

impl<'a, G> FloatingIpEngine<'a, G>
where
    G: NovaGateway + ?Sized,
{
    /// Creates an engine operating on `region` through `gateway`.
    #[must_use]
    pub const fn new(gateway: &'a G, region: &'a str) -> Self {
        Self { gateway, region }
    }

    fn ensure_supported(&self) -> Result<(), AddressError> {
        if self.gateway.supports_floating_ips(self.region) {
            Ok(())
        } else {
            Err(AddressError::Unsupported {
                capability: format!("floating IPs in region {}", self.region),
            })
        }
    }

    /// Binds `desired`, or the first unbound floating IP, to `server_id`.
    ///
    /// # Errors
    ///
    /// Returns [`AddressError::Unsupported`] when the floating-IP extension is
    /// disabled, [`AddressError::NoFloatingIp`] when every entry is bound, and
    /// [`AddressError::Remote`] for remote failures.
    pub async fn acquire(
        &self,
        server_id: &str,
        desired: Option<&str>,
    ) -> Result<String, AddressError> {
        self.ensure_supported()?;

        let ip = match desired {
            Some(address) => address.to_owned(),
            None => self
                .gateway
                .list_floating_ips(self.region)
                .await?
                .into_iter()
                .find(|entry| entry.fixed_ip.is_none())
                .map(|entry| entry.ip)
                .ok_or_else(|| AddressError::NoFloatingIp {
                    region: self.region.to_owned(),
                })?,
        };

        self.gateway
            .add_floating_ip(self.region, &ip, server_id)
            .await?;
        info!(address = %ip, instance = server_id, region = self.region, "added floating IP");
        Ok(ip)
    }

    /// Unbinds `desired`, or the first floating IP bound to `server_id`, and
    /// returns it. Returns `None` when the server holds no floating IP.
    ///
    /// # Errors
    ///
    /// Returns [`AddressError::Unsupported`] when the floating-IP extension is
    /// disabled and [`AddressError::Remote`] for remote failures.
    pub async fn release(
        &self,
        server_id: &str,
        desired: Option<&str>,
    ) -> Result<Option<String>, AddressError> {
        self.ensure_supported()?;

        let ip = match desired {
            Some(address) => address.to_owned(),
            None => {
                let bound = self
                    .gateway
                    .list_floating_ips(self.region)
                    .await?
                    .into_iter()
                    .find(|entry| entry.instance_id.as_deref() == Some(server_id));
                let Some(entry) = bound else {
                    return Ok(None);
                };
                entry.ip
            }
        };

        self.gateway
            .remove_floating_ip(self.region, &ip, server_id)
            .await?;
        info!(address = %ip, instance = server_id, region = self.region, "removed floating IP");
        Ok(Some(ip))
    }
}

//! Per-region cache of generated SSH key pairs.
//!
//! The cache keeps at most one [`KeyPairRecord`] per region and checks it
//! against the provider before handing it out, so a key deleted remotely is
//! replaced instead of being used for an instance nobody could reach.
//!
//! Resolution is read, then remote call, then write. Two concurrent
//! resolutions for the same empty region may both create a key pair; the
//! last write wins and both callers receive a key that exists remotely. The
//! lock is never held across a remote call.

use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::gateway::{Ec2Gateway, GatewayError, KeyPairRecord};

/// Outcome of a key-pair resolution.
#[derive(Clone, Debug, Eq, PartialEq)]
#[must_use]
pub enum KeyPairResolution {
    /// The cached key pair still exists remotely.
    Validated(KeyPairRecord),
    /// A new key pair was created and cached.
    Created(KeyPairRecord),
    /// Creation failed; the cache holds no usable key for the region.
    Unavailable {
        /// Region the key was requested for.
        region: String,
        /// Failure reported by the provider.
        reason: GatewayError,
    },
}

impl KeyPairResolution {
    /// Returns the usable key pair, if any.
    #[must_use]
    pub const fn record(&self) -> Option<&KeyPairRecord> {
        match self {
            Self::Validated(record) | Self::Created(record) => Some(record),
            Self::Unavailable { .. } => None,
        }
    }

    /// Consumes the resolution and returns the usable key pair, if any.
    #[must_use]
    pub fn into_record(self) -> Option<KeyPairRecord> {
        match self {
            Self::Validated(record) | Self::Created(record) => Some(record),
            Self::Unavailable { .. } => None,
        }
    }
}

/// In-memory mapping from region to generated key pair.
#[derive(Debug)]
pub struct KeyPairCache {
    entries: RwLock<HashMap<String, KeyPairRecord>>,
    prefix: String,
}

impl KeyPairCache {
    /// Creates an empty cache naming new keys `<prefix>-<region>-<uuid>`.
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            prefix: prefix.into(),
        }
    }

    /// Returns the cached key pair for `region` without checking the provider.
    #[must_use]
    pub fn cached(&self, region: &str) -> Option<KeyPairRecord> {
        self.entries.read().get(region).cloned()
    }

    /// Number of regions with a cached key pair.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns `true` when no region has a cached key pair.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Returns a key pair for `region` that exists remotely, creating one on a
    /// miss or when the cached key was deleted on the provider side.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError`] when listing the provider's key pairs fails.
    /// Creation failures are not errors: they yield
    /// [`KeyPairResolution::Unavailable`].
    pub async fn resolve<G>(
        &self,
        region: &str,
        gateway: &G,
    ) -> Result<KeyPairResolution, GatewayError>
    where
        G: Ec2Gateway + ?Sized,
    {
        let Some(cached) = self.cached(region) else {
            return Ok(self.create(region, gateway, None).await);
        };

        let remote = gateway.list_key_pairs(region, &cached.name).await?;
        if remote.contains(&cached.name) {
            debug!(region, key_pair = %cached.name, "cached key pair still present");
            return Ok(KeyPairResolution::Validated(cached));
        }

        warn!(region, key_pair = %cached.name, "cached key pair missing remotely; recreating");
        Ok(self.create(region, gateway, Some(&cached.name)).await)
    }

    fn generate_name(&self, region: &str) -> String {
        format!("{}-{region}-{}", self.prefix, Uuid::new_v4())
    }

    async fn create<G>(&self, region: &str, gateway: &G, stale: Option<&str>) -> KeyPairResolution
    where
        G: Ec2Gateway + ?Sized,
    {
        let name = self.generate_name(region);
        match gateway.create_key_pair(region, &name).await {
            Ok(record) => {
                info!(region, key_pair = %record.name, "created key pair");
                self.entries
                    .write()
                    .insert(region.to_owned(), record.clone());
                KeyPairResolution::Created(record)
            }
            Err(reason) => {
                warn!(region, error = %reason, "cannot create key pair");
                if let Some(stale_name) = stale {
                    self.forget_if_named(region, stale_name);
                }
                KeyPairResolution::Unavailable {
                    region: region.to_owned(),
                    reason,
                }
            }
        }
    }

    /// Drops the entry for `region` unless a concurrent resolution already
    /// replaced it.
    fn forget_if_named(&self, region: &str, name: &str) {
        let mut entries = self.entries.write();
        if entries.get(region).is_some_and(|record| record.name == name) {
            entries.remove(region);
        }
    }
}

//! Public IP acquisition and release.
//!
//! [`ElasticIpEngine`] reuses unassociated AWS elastic addresses before
//! allocating a new one; [`FloatingIpEngine`] binds the first unbound
//! OpenStack floating IP. Neither retries with backoff: the elastic engine's
//! only recovery is advancing to the next free candidate when an association
//! is rejected.

mod elastic;
mod error;
mod floating;

use std::num::NonZeroUsize;

pub use elastic::ElasticIpEngine;
pub use error::AddressError;
pub use floating::FloatingIpEngine;

/// Limits applied while scanning free addresses.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct AcquisitionPolicy {
    /// Maximum number of free candidates tried before allocating. `None`
    /// tries every free address.
    pub max_association_attempts: Option<NonZeroUsize>,
}

impl AcquisitionPolicy {
    /// Policy that tries at most `attempts` free candidates.
    #[must_use]
    pub const fn capped(attempts: NonZeroUsize) -> Self {
        Self {
            max_association_attempts: Some(attempts),
        }
    }

    fn candidate_limit(self, available: usize) -> usize {
        self.max_association_attempts
            .map_or(available, |cap| cap.get().min(available))
    }
}

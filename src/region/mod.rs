//! Region derivation from images, instance identifiers and locations.

use std::collections::BTreeSet;

use thiserror::Error;
use tracing::debug;

use crate::gateway::Location;

/// Separator between the region and the bare identifier in AWS images and
/// instance identifiers (`eu-west-1/i-0abc`).
pub const REGION_SEPARATOR: char = '/';

/// Errors raised while deriving a region.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum RegionError {
    /// Raised when an image identifier lacks its region prefix.
    #[error("image '{image}' is not qualified with a region")]
    MalformedImage {
        /// Image identifier passed by the caller.
        image: String,
    },
    /// Raised when the provider does not report a location for a node.
    #[error("instance {instance_id} has no location")]
    MissingLocation {
        /// Connector instance identifier.
        instance_id: String,
    },
    /// Raised when no ancestor of a location is assignable.
    #[error("no assignable location encloses {location}")]
    Unresolved {
        /// Location the walk started from.
        location: String,
    },
}

/// Returns the region an AWS image lives in.
///
/// # Errors
///
/// Returns [`RegionError::MalformedImage`] when the image has no non-empty
/// region prefix.
pub fn region_from_image(image: &str) -> Result<&str, RegionError> {
    match image.split_once(REGION_SEPARATOR) {
        Some((region, _)) if !region.is_empty() => Ok(region),
        _ => Err(RegionError::MalformedImage {
            image: image.to_owned(),
        }),
    }
}

/// Returns the region embedded in a `region/instance-id` identifier.
#[must_use]
pub fn region_from_instance_id(instance_id: &str) -> Option<&str> {
    instance_id
        .split_once(REGION_SEPARATOR)
        .map(|(region, _)| region)
        .filter(|region| !region.is_empty())
}

/// Drops the availability-zone letter from a zone identifier
/// (`eu-west-1c` becomes `eu-west-1`).
///
/// Identifiers that do not end in a lowercase letter are already regions and
/// are returned unchanged.
#[must_use]
pub fn parent_region(zone: &str) -> &str {
    let mut chars = zone.chars();
    let region = match chars.next_back() {
        Some(letter) if letter.is_ascii_lowercase() => chars.as_str(),
        _ => zone,
    };
    debug!(zone, region, "derived region from zone");
    region
}

/// Walks up from `location` until it reaches one of the `assignable`
/// locations and returns that location's identifier.
///
/// # Errors
///
/// Returns [`RegionError::Unresolved`] when the walk reaches the root without
/// meeting an assignable location.
pub fn assignable_ancestor<'a>(
    location: &'a Location,
    assignable: &BTreeSet<String>,
) -> Result<&'a str, RegionError> {
    location
        .ancestry()
        .find(|candidate| assignable.contains(&candidate.id))
        .map(|found| found.id.as_str())
        .ok_or_else(|| RegionError::Unresolved {
            location: location.id.clone(),
        })
}

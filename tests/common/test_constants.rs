//! Shared constants for integration tests.
//!
//! Integration tests are compiled as separate crates (one per top-level file in
//! `tests/`). Placing shared constants under `tests/common/` avoids creating an
//! additional integration test binary while still allowing reuse via:
//!
//! ```rust
//! #[path = "common/test_constants.rs"]
//! mod test_constants;
//! ```

/// Region used by AWS scenarios.
pub const AWS_REGION: &str = "eu-west-1";

/// Region qualified AWS image used by AWS scenarios.
pub const AWS_IMAGE: &str = "eu-west-1/ami-0abc1234";

/// OpenStack flavour used by OpenStack scenarios.
pub const OPENSTACK_FLAVOR: &str = "m1.small";

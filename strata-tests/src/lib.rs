//! Strata Tests - property and scenario tests for Strata routing.
//!
//! ## Test Organization
//!
//! **Scenario Tests** (`scenario_tests`): hand-built rings with known answers
//! - single unassigned owner, two started owners, wrap-around split
//! - bootstrap, departed owners, advertised host ids, search strategy swaps
//!
//! **Property Tests** (`property_tests`): seeded random rings checked against
//! the routing properties with both selection policies
//!
//! **Support Modules**:
//! - `properties`: Property definitions (`check_route_coverage`,
//!   `check_classification`, etc.)
//! - `scenarios`: Reusable fixtures, seeds and the random ring generator
//!
//! ## Naming Conventions
//!
//! - Integration tests: `test_<component>_<scenario>`
//! - Unit tests: Inline in each crate under `#[cfg(test)]`
//!
//! Set `RUST_LOG=strata_routing=debug` to see router and route builds.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod properties;
pub mod scenarios;


use tracing_subscriber::EnvFilter;

/// Installs a test log subscriber filtered by `RUST_LOG`.
///
/// Safe to call from every test; only the first call installs it.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

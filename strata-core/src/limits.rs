//! System limits for routing inputs.
//!
//! Every input the engine sizes a structure from has an explicit maximum:
//! the number of ring segments, the number of cluster members and the
//! replica count of a single range.

use crate::{Error, Result};

/// Limits applied while building a router.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Maximum number of ring segments (distinct range boundaries).
    pub max_segments: u32,
    /// Maximum number of cluster members.
    pub max_members: u32,
    /// Maximum number of endpoints owning a single range.
    pub max_owners_per_range: u32,
}

impl Limits {
    /// Creates limits with safe defaults.
    ///
    /// 256 vnodes per member on a 1024 member cluster stays below the
    /// segment bound.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_segments: 1 << 20,
            max_members: 4096,
            max_owners_per_range: 64,
        }
    }

    /// Validates that all limits are usable.
    ///
    /// # Errors
    /// Returns an error if any limit is zero.
    pub const fn validate(&self) -> Result<()> {
        if self.max_segments == 0 {
            return Err(Error::InvalidArgument {
                name: "max_segments",
                reason: "must be positive",
            });
        }
        if self.max_members == 0 {
            return Err(Error::InvalidArgument {
                name: "max_members",
                reason: "must be positive",
            });
        }
        if self.max_owners_per_range == 0 {
            return Err(Error::InvalidArgument {
                name: "max_owners_per_range",
                reason: "must be positive",
            });
        }
        Ok(())
    }

    /// Checks a measured count against one of the limits.
    ///
    /// # Errors
    /// Returns `LimitExceeded` if `actual > max`.
    pub fn check(limit: &'static str, max: u32, actual: usize) -> Result<()> {
        let actual = actual as u64;
        if actual > u64::from(max) {
            return Err(Error::LimitExceeded {
                limit,
                max: u64::from(max),
                actual,
            });
        }
        Ok(())
    }
}

impl Default for Limits {
    fn default() -> Self {
        Self::new()
    }
}

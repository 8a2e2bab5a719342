//! Strongly-typed identifiers for Strata entities.
//!
//! Explicit types keep a member's host id from being mixed up with a shard
//! id or a cluster-state version.

use std::fmt;

/// Generates a `u64` newtype with `host-1` style display.
macro_rules! define_id {
    ($name:ident, $prefix:expr, $doc:expr) => {
        #[doc = $doc]
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
        #[repr(transparent)]
        pub struct $name(u64);

        impl $name {
            /// Wraps a raw value.
            #[inline]
            #[must_use]
            pub const fn new(value: u64) -> Self {
                Self(value)
            }

            /// Returns the raw value.
            #[inline]
            #[must_use]
            pub const fn get(self) -> u64 {
                self.0
            }

            /// Returns the following value.
            ///
            /// # Panics
            /// Panics on overflow.
            #[inline]
            #[must_use]
            pub const fn next(self) -> Self {
                assert!(self.0 < u64::MAX, "id overflow");
                Self(self.0 + 1)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", $prefix, self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}-{}", $prefix, self.0)
            }
        }
    };
}

// Cluster membership.
define_id!(HostId, "host", "Stable identifier of a cluster member, advertised on the ring.");
define_id!(ClusterVersion, "v", "Version of the cluster state a router was built from.");

// Query routing.
define_id!(ShardId, "shard", "Identifier of a synthesized shard within one route.");

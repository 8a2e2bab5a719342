//! Availability classification of ring segments and members.
//!
//! One pass over the segments sorts every member into:
//! - **green**: started owner of some segments (bitmap of those segments)
//! - **red**: nominal owner of orphaned segments, i.e. segments with no
//!   started owner at all (bitmap of those segments)
//! - **yellow**: neither, a safe but unassigned replica
//!
//! A member may be green for some segments and red for others.

use std::collections::BTreeMap;

use roaring::RoaringBitmap;
use strata_core::HostId;
use tracing::{debug, warn};

use crate::boundary::BoundaryModel;
use crate::error::RoutingResult;
use crate::membership::{ClusterSnapshot, MembershipResolver, ShardState};

/// Green/red/yellow classification of one router snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    /// False iff at least one segment is orphaned.
    consistent: bool,
    /// Started owners: member -> segments.
    green: BTreeMap<HostId, RoaringBitmap>,
    /// Owners of orphaned segments: member -> segments.
    red: BTreeMap<HostId, RoaringBitmap>,
    /// Members with neither green nor red segments, in host id order.
    yellow: Vec<HostId>,
}

impl Classification {
    /// Classifies every segment of `model` against the cluster.
    ///
    /// # Errors
    ///
    /// Returns `UnresolvableEndpoint` if an owner maps to no member.
    pub fn classify(
        model: &BoundaryModel,
        cluster: &ClusterSnapshot,
        resolver: &MembershipResolver<'_>,
    ) -> RoutingResult<Self> {
        let mut green: BTreeMap<HostId, RoaringBitmap> = BTreeMap::new();
        let mut red: BTreeMap<HostId, RoaringBitmap> = BTreeMap::new();
        let mut owners = Vec::new();

        for segment in 0..model.segment_count() {
            owners.clear();
            for endpoint in model.owners(segment) {
                owners.push(resolver.resolve(*endpoint)?.host_id);
            }

            let mut orphan = true;
            for host in &owners {
                if resolver.shard_state(*host) == ShardState::Started {
                    orphan = false;
                    green.entry(*host).or_default().insert(segment);
                }
            }

            if orphan {
                for host in &owners {
                    red.entry(*host).or_default().insert(segment);
                }
            }
        }

        let yellow: Vec<HostId> = cluster
            .members()
            .map(|m| m.host_id)
            .filter(|host| !green.contains_key(host) && !red.contains_key(host))
            .collect();

        let consistent = red.is_empty();
        if !consistent {
            let orphaned = red
                .values()
                .fold(RoaringBitmap::new(), |acc, bits| acc | bits)
                .len();
            warn!(
                version = %cluster.version(),
                orphaned,
                segments = model.segment_count(),
                "ring has orphaned segments"
            );
        }
        debug!(
            version = %cluster.version(),
            green = green.len(),
            red = red.len(),
            yellow = yellow.len(),
            consistent,
            "classified segments"
        );

        Ok(Self {
            consistent,
            green,
            red,
            yellow,
        })
    }

    /// Returns false iff some segment has no started owner.
    #[must_use]
    pub const fn is_consistent(&self) -> bool {
        self.consistent
    }

    /// Started owners and their segments.
    #[must_use]
    pub const fn green(&self) -> &BTreeMap<HostId, RoaringBitmap> {
        &self.green
    }

    /// Owners of orphaned segments and those segments.
    #[must_use]
    pub const fn red(&self) -> &BTreeMap<HostId, RoaringBitmap> {
        &self.red
    }

    /// Members holding no green or red segment.
    #[must_use]
    pub fn yellow(&self) -> &[HostId] {
        &self.yellow
    }

    /// Union of all orphaned segments.
    #[must_use]
    pub fn orphaned_segments(&self) -> RoaringBitmap {
        self.red
            .values()
            .fold(RoaringBitmap::new(), |acc, bits| acc | bits)
    }

    /// Union of all segments with a started owner.
    #[must_use]
    pub fn available_segments(&self) -> RoaringBitmap {
        self.green
            .values()
            .fold(RoaringBitmap::new(), |acc, bits| acc | bits)
    }
}

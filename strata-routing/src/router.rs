//! Router - immutable per-index routing snapshot.
//!
//! A router is built once per topology change from the ownership map, the
//! cluster snapshot and the index shard states. It is never mutated after
//! construction and may be shared across any number of concurrent route
//! builds.

use std::net::IpAddr;

use roaring::RoaringBitmap;
use strata_core::{ClusterVersion, HostId, Limits, Range};
use tracing::debug;

use crate::boundary::{BoundaryModel, OwnershipMap};
use crate::classifier::Classification;
use crate::coalesce::coalesce;
use crate::error::RoutingResult;
use crate::membership::{
    ClusterSnapshot, Member, MembershipResolver, ShardState, ShardStates, UnassignedReason,
};
use crate::policy::{SelectionPolicy, StrategyKind};
use crate::route::Route;

/// Configuration for routing one index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterConfig {
    /// Name of the search index.
    pub index: String,
    /// Name of the partitioned dataset backing the index.
    pub keyspace: String,
    /// Input limits.
    pub limits: Limits,
    /// Shard selection strategy used for queries.
    pub strategy: StrategyKind,
}

impl RouterConfig {
    /// Creates a configuration with default limits and strategy.
    #[must_use]
    pub fn new(index: impl Into<String>, keyspace: impl Into<String>) -> Self {
        Self {
            index: index.into(),
            keyspace: keyspace.into(),
            limits: Limits::default(),
            strategy: StrategyKind::default(),
        }
    }

    /// Sets the limits.
    #[must_use]
    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Sets the selection strategy.
    #[must_use]
    pub fn with_strategy(mut self, strategy: StrategyKind) -> Self {
        self.strategy = strategy;
        self
    }
}

/// Immutable routing snapshot for one index at one cluster version.
#[derive(Debug, Clone, PartialEq)]
pub struct Router {
    /// Index name.
    index: String,
    /// Cluster snapshot the router was built from.
    cluster: ClusterSnapshot,
    /// Index shard state per member.
    shard_states: ShardStates,
    /// Segment boundaries and owners.
    model: BoundaryModel,
    /// Green/red/yellow classification.
    classification: Classification,
}

impl Router {
    /// Builds a router.
    ///
    /// `ownership` of `None` or an empty map bootstraps a single segment
    /// owned by the local member.
    ///
    /// # Errors
    ///
    /// Returns an error if the limits are invalid or exceeded, the local
    /// member is missing from `cluster`, the ownership map is malformed, or
    /// a ring endpoint cannot be resolved to a member.
    pub fn build(
        config: &RouterConfig,
        ownership: Option<&OwnershipMap>,
        cluster: &ClusterSnapshot,
        shard_states: &ShardStates,
    ) -> RoutingResult<Self> {
        config.limits.validate()?;
        Limits::check(
            "max_members",
            config.limits.max_members,
            cluster.member_count(),
        )?;

        let local = cluster.local_member()?;
        let model = BoundaryModel::build(ownership, local.address, &config.limits)?;
        let resolver = MembershipResolver::new(cluster, shard_states);
        let classification = Classification::classify(&model, cluster, &resolver)?;

        debug!(
            index = %config.index,
            keyspace = %config.keyspace,
            version = %cluster.version(),
            segments = model.segment_count(),
            bootstrap = model.is_bootstrap(),
            consistent = classification.is_consistent(),
            "built router"
        );

        Ok(Self {
            index: config.index.clone(),
            cluster: cluster.clone(),
            shard_states: shard_states.clone(),
            model,
            classification,
        })
    }

    /// Returns the index name.
    #[must_use]
    pub fn index(&self) -> &str {
        &self.index
    }

    /// Returns the cluster-state version the router was built from.
    #[must_use]
    pub const fn version(&self) -> ClusterVersion {
        self.cluster.version()
    }

    /// Returns the cluster snapshot the router was built from.
    #[must_use]
    pub const fn cluster(&self) -> &ClusterSnapshot {
        &self.cluster
    }

    /// Returns the local member's id.
    #[must_use]
    pub const fn local(&self) -> HostId {
        self.cluster.local()
    }

    /// Returns the local member's address.
    #[must_use]
    pub fn local_address(&self) -> Option<IpAddr> {
        self.member(self.local()).map(|m| m.address)
    }

    /// Returns false iff some segment has no started owner.
    #[must_use]
    pub const fn is_consistent(&self) -> bool {
        self.classification.is_consistent()
    }

    /// Returns the classification.
    #[must_use]
    pub const fn classification(&self) -> &Classification {
        &self.classification
    }

    /// Returns the boundary model.
    #[must_use]
    pub const fn model(&self) -> &BoundaryModel {
        &self.model
    }

    /// Returns the number of ring segments.
    #[must_use]
    pub fn segment_count(&self) -> u32 {
        self.model.segment_count()
    }

    /// Looks up a member of the snapshot.
    #[must_use]
    pub fn member(&self, host_id: HostId) -> Option<&Member> {
        self.cluster.member(host_id)
    }

    /// Returns a member's shard state, `Unassigned` if none is recorded.
    #[must_use]
    pub fn shard_state(&self, host_id: HostId) -> ShardState {
        self.shard_states.get(&host_id).copied().unwrap_or_default()
    }

    /// Returns why a member's shard is unusable, if it is.
    ///
    /// A host missing from the snapshot is treated as departed.
    #[must_use]
    pub fn unassigned_reason(&self, host_id: HostId) -> Option<UnassignedReason> {
        match self.member(host_id) {
            Some(member) => UnassignedReason::of(self.shard_state(host_id), member.liveness),
            None => Some(UnassignedReason::NodeLeft),
        }
    }

    /// Coalesces a segment bitmap into token ranges.
    ///
    /// # Panics
    ///
    /// Panics if the bitmap holds an index `>= segment_count()`.
    #[must_use]
    pub fn token_ranges(&self, segments: &RoaringBitmap) -> Vec<Range> {
        coalesce(self.model.tokens(), segments)
    }

    /// Builds a route for one query using `policy` to pick shards.
    ///
    /// # Errors
    ///
    /// Returns an error if the policy's selection is invalid or does not,
    /// together with the orphaned segments, cover the ring.
    pub fn new_route(&self, policy: &dyn SelectionPolicy) -> RoutingResult<Route> {
        let selection = policy.selected_shards(self);
        Route::build(self, &selection)
    }
}

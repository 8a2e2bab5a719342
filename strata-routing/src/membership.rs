//! Cluster membership snapshot and ring endpoint resolution.
//!
//! The storage ring speaks in endpoint addresses; the search cluster speaks
//! in members. [`MembershipResolver`] maps one onto the other, preferring
//! the host id the ring advertises for an endpoint over the raw address.

use std::collections::BTreeMap;
use std::fmt;
use std::net::IpAddr;

use strata_core::{ClusterVersion, HostId};

use crate::error::{RoutingError, RoutingResult};

/// Per-member state of the index shard hosted on that member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ShardState {
    /// No shard allocated, or nothing recorded for the member.
    #[default]
    Unassigned,
    /// Shard is recovering.
    Initializing,
    /// Shard is queryable.
    Started,
    /// Shard is moving to another member.
    Relocating,
}

impl fmt::Display for ShardState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unassigned => "UNASSIGNED",
            Self::Initializing => "INITIALIZING",
            Self::Started => "STARTED",
            Self::Relocating => "RELOCATING",
        };
        f.write_str(name)
    }
}

/// Whether a member is currently part of the live cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Liveness {
    /// The member is up.
    Alive,
    /// The member left or is unreachable.
    Left,
}

/// Why a routing entry carries no usable shard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnassignedReason {
    /// The member has no shard for the index.
    Unavailable,
    /// The member is not live.
    NodeLeft,
}

impl UnassignedReason {
    /// Derives the reason for a member's shard, if it is unassigned or gone.
    ///
    /// Liveness wins: a departed member reports `NodeLeft` whatever its
    /// last recorded shard state.
    #[must_use]
    pub fn of(state: ShardState, liveness: Liveness) -> Option<Self> {
        if liveness != Liveness::Alive {
            return Some(Self::NodeLeft);
        }
        (state == ShardState::Unassigned).then_some(Self::Unavailable)
    }
}

/// A search cluster member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    /// Stable identity.
    pub host_id: HostId,
    /// Human readable node name.
    pub name: String,
    /// Address the member is reachable on, also its ring endpoint.
    pub address: IpAddr,
    /// Current liveness.
    pub liveness: Liveness,
}

impl Member {
    /// Creates a live member.
    #[must_use]
    pub fn new(host_id: HostId, name: impl Into<String>, address: IpAddr) -> Self {
        Self {
            host_id,
            name: name.into(),
            address,
            liveness: Liveness::Alive,
        }
    }

    /// Sets the liveness.
    #[must_use]
    pub fn with_liveness(mut self, liveness: Liveness) -> Self {
        self.liveness = liveness;
        self
    }

    /// Returns true if the member is live.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.liveness == Liveness::Alive
    }
}

/// Shard state of the routed index, keyed by member.
pub type ShardStates = BTreeMap<HostId, ShardState>;

/// Immutable view of the cluster at one version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterSnapshot {
    /// Cluster-state version.
    version: ClusterVersion,
    /// The member this process runs as.
    local: HostId,
    /// Members by host id.
    members: BTreeMap<HostId, Member>,
    /// Member host ids by address.
    addresses: BTreeMap<IpAddr, HostId>,
    /// Host ids advertised by the storage ring, by endpoint.
    endpoint_host_ids: BTreeMap<IpAddr, HostId>,
}

impl ClusterSnapshot {
    /// Creates an empty snapshot.
    #[must_use]
    pub const fn new(version: ClusterVersion, local: HostId) -> Self {
        Self {
            version,
            local,
            members: BTreeMap::new(),
            addresses: BTreeMap::new(),
            endpoint_host_ids: BTreeMap::new(),
        }
    }

    /// Adds or replaces a member.
    ///
    /// When two members share an address, the first one added owns it.
    #[must_use]
    pub fn with_member(mut self, member: Member) -> Self {
        let (host_id, address) = (member.host_id, member.address);
        if let Some(previous) = self.members.insert(host_id, member) {
            if self.addresses.get(&previous.address) == Some(&host_id) {
                self.addresses.remove(&previous.address);
            }
        }
        self.addresses.entry(address).or_insert(host_id);
        self
    }

    /// Records the host id the ring advertises for an endpoint.
    #[must_use]
    pub fn with_endpoint_host_id(mut self, endpoint: IpAddr, host_id: HostId) -> Self {
        self.endpoint_host_ids.insert(endpoint, host_id);
        self
    }

    /// Returns the cluster-state version.
    #[must_use]
    pub const fn version(&self) -> ClusterVersion {
        self.version
    }

    /// Returns the local member's id.
    #[must_use]
    pub const fn local(&self) -> HostId {
        self.local
    }

    /// Returns the local member.
    ///
    /// # Errors
    ///
    /// Returns `UnknownMember` if the local id is not in the snapshot.
    pub fn local_member(&self) -> RoutingResult<&Member> {
        self.member(self.local)
            .ok_or(RoutingError::UnknownMember { host: self.local })
    }

    /// Looks up a member by id.
    #[must_use]
    pub fn member(&self, host_id: HostId) -> Option<&Member> {
        self.members.get(&host_id)
    }

    /// Iterates members in host id order.
    pub fn members(&self) -> impl Iterator<Item = &Member> + '_ {
        self.members.values()
    }

    /// Returns the number of members.
    #[must_use]
    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    /// Finds a member by address.
    #[must_use]
    pub fn find_by_address(&self, address: IpAddr) -> Option<&Member> {
        self.addresses
            .get(&address)
            .and_then(|host_id| self.members.get(host_id))
    }

    /// Returns the host id the ring advertises for `endpoint`, if any.
    #[must_use]
    pub fn advertised_host_id(&self, endpoint: IpAddr) -> Option<HostId> {
        self.endpoint_host_ids.get(&endpoint).copied()
    }
}

/// Resolves ring endpoints to members and members to shard states.
///
/// Pure lookups over the snapshots it borrows; nothing is cached.
#[derive(Debug, Clone, Copy)]
pub struct MembershipResolver<'a> {
    cluster: &'a ClusterSnapshot,
    shard_states: &'a ShardStates,
}

impl<'a> MembershipResolver<'a> {
    /// Creates a resolver over the given snapshots.
    #[must_use]
    pub const fn new(cluster: &'a ClusterSnapshot, shard_states: &'a ShardStates) -> Self {
        Self {
            cluster,
            shard_states,
        }
    }

    /// Resolves a ring endpoint to a member.
    ///
    /// An advertised host id is authoritative: when present, the address is
    /// not consulted.
    ///
    /// # Errors
    ///
    /// Returns `UnresolvableEndpoint` if no member matches.
    pub fn resolve(&self, endpoint: IpAddr) -> RoutingResult<&'a Member> {
        let host_id = self.cluster.advertised_host_id(endpoint);
        let member = match host_id {
            Some(id) => self.cluster.member(id),
            None => self.cluster.find_by_address(endpoint),
        };
        member.ok_or(RoutingError::UnresolvableEndpoint { endpoint, host_id })
    }

    /// Returns the member's shard state, `Unassigned` if none is recorded.
    #[must_use]
    pub fn shard_state(&self, host_id: HostId) -> ShardState {
        self.shard_states.get(&host_id).copied().unwrap_or_default()
    }
}

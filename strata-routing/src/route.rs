//! Route - the shard routing table for one query.
//!
//! Each selected member becomes a started primary shard serving the ranges
//! it was selected for. Every member owning orphaned segments becomes an
//! extra primary shard carrying those ranges with its real (unusable) state,
//! so the caller sees that part of the ring may be missing or stale. An
//! orphaned segment with several owners appears once per owner; started
//! primaries never overlap each other or the orphaned segments.
//! Yellow members ride along as unassigned replicas of the first shard.

use strata_core::{ClusterVersion, HostId, Range, ShardId};
use tracing::debug;

use crate::coalesce::SegmentBitmap;
use crate::error::{RoutingError, RoutingResult};
use crate::membership::{ShardState, UnassignedReason};
use crate::policy::Selection;
use crate::router::Router;

/// One synthesized shard copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingEntry {
    /// Shard the entry belongs to.
    pub shard_id: ShardId,
    /// Member hosting the copy.
    pub host_id: HostId,
    /// True for primaries, false for replicas.
    pub primary: bool,
    /// Shard state on the member.
    pub state: ShardState,
    /// Why the copy is unusable, if it is.
    pub unassigned: Option<UnassignedReason>,
    /// Token ranges served; empty for replicas.
    pub ranges: Vec<Range>,
}

/// All copies of one shard, primary first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardRoutingTable {
    /// The shard id.
    pub shard_id: ShardId,
    /// The primary followed by any replicas.
    pub entries: Vec<RoutingEntry>,
}

impl ShardRoutingTable {
    /// Returns the primary entry.
    #[must_use]
    pub fn primary(&self) -> &RoutingEntry {
        &self.entries[0]
    }

    /// Returns the replica entries.
    #[must_use]
    pub fn replicas(&self) -> &[RoutingEntry] {
        &self.entries[1..]
    }
}

/// Hands out shard ids: 0 to the local member's first shard, then 1, 2, ...
#[derive(Debug)]
struct ShardIdAllocator {
    local: HostId,
    local_assigned: bool,
    next: ShardId,
}

impl ShardIdAllocator {
    const fn new(local: HostId) -> Self {
        Self {
            local,
            local_assigned: false,
            next: ShardId::new(1),
        }
    }

    fn assign(&mut self, host_id: HostId) -> ShardId {
        if host_id == self.local && !self.local_assigned {
            self.local_assigned = true;
            return ShardId::new(0);
        }
        let id = self.next;
        self.next = id.next();
        id
    }
}

/// Routing table for one query, bound to one router version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    /// Version of the router the route was built from.
    version: ClusterVersion,
    /// Whether the router had no orphaned segments.
    consistent: bool,
    /// Shard tables in emission order.
    tables: Vec<ShardRoutingTable>,
}

impl Route {
    /// Builds the routing table for `selection`.
    ///
    /// # Errors
    ///
    /// Returns `UnknownMember`, `SegmentOutOfRange`, `OverlappingSelection`
    /// or `IncompleteSelection` if the selection is not a valid cover of the
    /// non-orphaned segments. No partial table is produced.
    pub fn build(router: &Router, selection: &Selection) -> RoutingResult<Self> {
        validate(router, selection)?;

        let classification = router.classification();
        let mut ids = ShardIdAllocator::new(router.local());
        let mut tables = Vec::with_capacity(selection.len() + classification.red().len());

        for (host_id, segments) in selection {
            if segments.is_empty() {
                continue;
            }
            let shard_id = ids.assign(*host_id);
            tables.push(ShardRoutingTable {
                shard_id,
                entries: vec![RoutingEntry {
                    shard_id,
                    host_id: *host_id,
                    primary: true,
                    state: ShardState::Started,
                    unassigned: None,
                    ranges: router.token_ranges(segments),
                }],
            });
        }

        for (host_id, segments) in classification.red() {
            let shard_id = ids.assign(*host_id);
            tables.push(ShardRoutingTable {
                shard_id,
                entries: vec![RoutingEntry {
                    shard_id,
                    host_id: *host_id,
                    primary: true,
                    state: router.shard_state(*host_id),
                    unassigned: router.unassigned_reason(*host_id),
                    ranges: router.token_ranges(segments),
                }],
            });
        }

        if let Some(first) = tables.first_mut() {
            let shard_id = first.shard_id;
            first
                .entries
                .extend(classification.yellow().iter().map(|host_id| RoutingEntry {
                    shard_id,
                    host_id: *host_id,
                    primary: false,
                    state: router.shard_state(*host_id),
                    unassigned: router.unassigned_reason(*host_id),
                    ranges: Vec::new(),
                }));
        }

        debug!(
            index = %router.index(),
            version = %router.version(),
            shards = tables.len(),
            orphaned = classification.red().len(),
            "built route"
        );

        Ok(Self {
            version: router.version(),
            consistent: router.is_consistent(),
            tables,
        })
    }

    /// Returns the router version the route is bound to.
    #[must_use]
    pub const fn version(&self) -> ClusterVersion {
        self.version
    }

    /// Returns false if part of the ring is served by orphaned shards.
    #[must_use]
    pub const fn is_consistent(&self) -> bool {
        self.consistent
    }

    /// Returns the shard tables.
    #[must_use]
    pub fn tables(&self) -> &[ShardRoutingTable] {
        &self.tables
    }

    /// Iterates the primary entries.
    pub fn primaries(&self) -> impl Iterator<Item = &RoutingEntry> + '_ {
        self.tables.iter().map(ShardRoutingTable::primary)
    }

    /// Returns the number of shards.
    #[must_use]
    pub fn shard_count(&self) -> usize {
        self.tables.len()
    }
}

/// Checks that the selection plus the orphaned segments partition the ring.
fn validate(router: &Router, selection: &Selection) -> RoutingResult<()> {
    let segments = router.segment_count();
    let mut covered = router.classification().orphaned_segments();

    for (host_id, bits) in selection {
        if router.member(*host_id).is_none() {
            return Err(RoutingError::UnknownMember { host: *host_id });
        }
        if let Some(max) = bits.max().filter(|max| *max >= segments) {
            return Err(RoutingError::SegmentOutOfRange {
                segment: max,
                segments,
            });
        }
        if let Some(segment) = (&covered & bits).min() {
            return Err(RoutingError::OverlappingSelection {
                segment,
                host: *host_id,
            });
        }
        covered |= bits;
    }

    match covered.first_missing(segments) {
        Some(first) => Err(RoutingError::IncompleteSelection {
            missing: u64::from(segments) - covered.len(),
            segments,
            first,
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use std::net::IpAddr;

    use roaring::RoaringBitmap;
    use strata_core::Token;

    use super::*;
    use crate::boundary::OwnershipMap;
    use crate::membership::{ClusterSnapshot, Liveness, Member, ShardStates};
    use crate::policy::{PrimaryFirstPolicy, SelectionPolicy};
    use crate::router::RouterConfig;

    fn ip(last: u8) -> IpAddr {
        IpAddr::from([10, 0, 0, last])
    }

    fn host(n: u64) -> HostId {
        HostId::new(n)
    }

    fn bits(segments: &[u32]) -> RoaringBitmap {
        segments.iter().copied().collect()
    }

    /// Three segments, one owner each; host 4 is off the ring and left.
    fn router(local: u64, states: &[(u64, ShardState)]) -> Router {
        let mut ownership = OwnershipMap::new();
        ownership.insert(Range::new(Token::MIN, Token::new(-100)), vec![ip(1)]);
        ownership.insert(Range::new(Token::new(-100), Token::new(100)), vec![ip(2)]);
        ownership.insert(Range::new(Token::new(100), Token::MAX), vec![ip(3)]);
        let cluster = ClusterSnapshot::new(ClusterVersion::new(9), host(local))
            .with_member(Member::new(host(1), "node1", ip(1)))
            .with_member(Member::new(host(2), "node2", ip(2)))
            .with_member(Member::new(host(3), "node3", ip(3)))
            .with_member(Member::new(host(4), "node4", ip(4)).with_liveness(Liveness::Left));
        let states: ShardStates = states.iter().map(|(n, s)| (host(*n), *s)).collect();
        let config = RouterConfig::new("idx", "ks");
        Router::build(&config, Some(&ownership), &cluster, &states).unwrap()
    }

    /// Two segments, replication factor two; host 4 is alive but off the ring.
    fn replicated_router(states: &[(u64, ShardState)]) -> Router {
        let mut ownership = OwnershipMap::new();
        ownership.insert(Range::new(Token::MIN, Token::new(0)), vec![ip(1), ip(2)]);
        ownership.insert(Range::new(Token::new(0), Token::MAX), vec![ip(2), ip(3)]);
        let cluster = (1..=4u8).fold(
            ClusterSnapshot::new(ClusterVersion::new(4), host(1)),
            |cluster, n| {
                cluster.with_member(Member::new(host(u64::from(n)), format!("node{n}"), ip(n)))
            },
        );
        let states: ShardStates = states.iter().map(|(n, s)| (host(*n), *s)).collect();
        let config = RouterConfig::new("idx", "ks");
        Router::build(&config, Some(&ownership), &cluster, &states).unwrap()
    }

    fn all_started(local: u64) -> Router {
        router(
            local,
            &[
                (1, ShardState::Started),
                (2, ShardState::Started),
                (3, ShardState::Started),
            ],
        )
    }

    #[test]
    fn test_local_shard_gets_id_zero() {
        let router = all_started(2);
        let route = router.new_route(&PrimaryFirstPolicy).unwrap();

        let ids: Vec<(HostId, u64)> = route
            .primaries()
            .map(|e| (e.host_id, e.shard_id.get()))
            .collect();
        // Encounter order is host id order; host 2 is local.
        assert_eq!(ids, vec![(host(1), 1), (host(2), 0), (host(3), 2)]);
        assert!(route.is_consistent());
        assert_eq!(route.version(), ClusterVersion::new(9));
    }

    #[test]
    fn test_yellow_replicas_on_first_table() {
        let router = all_started(1);
        let route = router.new_route(&PrimaryFirstPolicy).unwrap();

        let first = &route.tables()[0];
        assert_eq!(first.primary().host_id, host(1));
        assert_eq!(first.replicas().len(), 1);
        let replica = &first.replicas()[0];
        assert_eq!(replica.host_id, host(4));
        assert_eq!(replica.shard_id, first.shard_id);
        assert!(!replica.primary);
        assert_eq!(replica.state, ShardState::Unassigned);
        assert_eq!(replica.unassigned, Some(UnassignedReason::NodeLeft));
        assert!(replica.ranges.is_empty());
        assert!(route.tables()[1..].iter().all(|t| t.replicas().is_empty()));
    }

    #[test]
    fn test_red_entries_surface_orphans() {
        // Host 2 is initializing: segment 1 is orphaned.
        let router = router(
            1,
            &[
                (1, ShardState::Started),
                (2, ShardState::Initializing),
                (3, ShardState::Started),
            ],
        );
        let route = router.new_route(&PrimaryFirstPolicy).unwrap();

        assert!(!route.is_consistent());
        assert_eq!(route.shard_count(), 3);
        let red = route.tables()[2].primary();
        assert_eq!(red.host_id, host(2));
        assert_eq!(red.shard_id, ShardId::new(2));
        assert!(red.primary);
        assert_eq!(red.state, ShardState::Initializing);
        assert_eq!(red.unassigned, None);
        assert_eq!(red.ranges, vec![Range::new(Token::new(-100), Token::new(100))]);
    }

    #[test]
    fn test_replicated_orphan_has_one_red_entry_per_owner() {
        // Segment 1 is owned by hosts 2 and 3, neither of them started.
        let router =
            replicated_router(&[(1, ShardState::Started), (3, ShardState::Relocating)]);
        let route = router.new_route(&PrimaryFirstPolicy).unwrap();

        assert!(!route.is_consistent());
        let primaries: Vec<&RoutingEntry> = route.primaries().collect();
        assert_eq!(primaries.len(), 3);

        let started: Vec<&RoutingEntry> = primaries
            .iter()
            .copied()
            .filter(|e| e.state == ShardState::Started)
            .collect();
        assert_eq!(started.len(), 1);
        assert_eq!(started[0].host_id, host(1));
        assert_eq!(started[0].shard_id, ShardId::new(0));
        assert_eq!(started[0].ranges, vec![Range::new(Token::MIN, Token::new(0))]);

        let red: Vec<(HostId, ShardState, Option<UnassignedReason>)> = primaries[1..]
            .iter()
            .map(|e| (e.host_id, e.state, e.unassigned))
            .collect();
        assert_eq!(
            red,
            vec![
                (host(2), ShardState::Unassigned, Some(UnassignedReason::Unavailable)),
                (host(3), ShardState::Relocating, None),
            ]
        );
        assert!(primaries[1..]
            .iter()
            .all(|e| e.ranges == vec![Range::new(Token::new(0), Token::MAX)]));
    }

    #[test]
    fn test_live_yellow_without_state_is_unavailable() {
        let router = replicated_router(&[(1, ShardState::Started), (2, ShardState::Started)]);
        let route = router.new_route(&PrimaryFirstPolicy).unwrap();

        // Host 3 only co-owns a covered segment; host 4 owns nothing.
        let replicas = route.tables()[0].replicas();
        let yellow: Vec<(HostId, Option<UnassignedReason>)> =
            replicas.iter().map(|e| (e.host_id, e.unassigned)).collect();
        assert_eq!(
            yellow,
            vec![
                (host(3), Some(UnassignedReason::Unavailable)),
                (host(4), Some(UnassignedReason::Unavailable)),
            ]
        );
        assert!(replicas.iter().all(|e| e.state == ShardState::Unassigned));
    }

    #[test]
    fn test_incomplete_selection_rejected() {
        let router = all_started(1);
        let mut selection = Selection::new();
        selection.insert(host(1), bits(&[0]));
        selection.insert(host(3), bits(&[2]));

        assert_eq!(
            Route::build(&router, &selection).unwrap_err(),
            RoutingError::IncompleteSelection {
                missing: 1,
                segments: 3,
                first: 1,
            }
        );
    }

    #[test]
    fn test_overlapping_selection_rejected() {
        let router = all_started(1);
        let mut selection = PrimaryFirstPolicy.selected_shards(&router);
        selection.entry(host(3)).or_default().insert(0);

        assert_eq!(
            Route::build(&router, &selection).unwrap_err(),
            RoutingError::OverlappingSelection {
                segment: 0,
                host: host(3),
            }
        );
    }

    #[test]
    fn test_selecting_orphan_rejected() {
        let router = router(1, &[(1, ShardState::Started), (3, ShardState::Started)]);
        let mut selection = PrimaryFirstPolicy.selected_shards(&router);
        selection.insert(host(4), bits(&[1]));

        assert!(matches!(
            Route::build(&router, &selection),
            Err(RoutingError::OverlappingSelection { segment: 1, .. })
        ));
    }

    #[test]
    fn test_invalid_members_and_segments_rejected() {
        let router = all_started(1);

        let mut selection = Selection::new();
        selection.insert(host(9), bits(&[0, 1, 2]));
        assert_eq!(
            Route::build(&router, &selection).unwrap_err(),
            RoutingError::UnknownMember { host: host(9) }
        );

        let mut selection = Selection::new();
        selection.insert(host(1), bits(&[0, 1, 2, 3]));
        assert_eq!(
            Route::build(&router, &selection).unwrap_err(),
            RoutingError::SegmentOutOfRange {
                segment: 3,
                segments: 3,
            }
        );
    }

    #[test]
    fn test_empty_bitmaps_emit_nothing() {
        let router = all_started(1);
        let mut selection = PrimaryFirstPolicy.selected_shards(&router);
        selection.insert(host(4), RoaringBitmap::new());

        let route = Route::build(&router, &selection).unwrap();
        assert_eq!(route.shard_count(), 3);
    }

    #[test]
    fn test_primary_ranges_cover_ring_once() {
        let router = router(1, &[(1, ShardState::Started), (3, ShardState::Started)]);
        let route = router.new_route(&PrimaryFirstPolicy).unwrap();

        let mut seen = RoaringBitmap::new();
        for entry in route.primaries() {
            for range in &entry.ranges {
                let segments = router.model().segments_in(*range).unwrap();
                assert!(seen.is_disjoint(&segments));
                seen |= segments;
            }
        }
        assert_eq!(seen, RoaringBitmap::all_segments(router.segment_count()));
    }
}

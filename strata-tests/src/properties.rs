//! Property definitions and checkers for routing tests.
//!
//! Properties are invariants every router and every route must satisfy,
//! whatever the ring shape, liveness or shard states.

use roaring::RoaringBitmap;
use strata_core::{HostId, Range, Token};
use strata_routing::{coalesce, Route, Router, SegmentBitmap, ShardState};

// ============================================================================
// Property Violation Types
// ============================================================================

/// A violation of a routing property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyViolation {
    /// A primary range does not line up with segment boundaries.
    MisalignedRange {
        /// The offending range.
        range: Range,
    },
    /// A segment is served by more than one started primary, or by a
    /// started primary while orphaned.
    DoublyRouted {
        /// The segment index.
        segment: u32,
    },
    /// An orphaned owner's primary does not carry exactly its red segments.
    WrongRedEntry {
        /// The member.
        host_id: HostId,
    },
    /// A segment is served by no primary.
    Unrouted {
        /// The segment index.
        segment: u32,
    },
    /// The consistency flag disagrees with the orphaned segments.
    ConsistencyMismatch {
        /// The flag reported by the router.
        reported: bool,
        /// Number of segments without a started owner.
        orphaned: u64,
    },
    /// A member is classified green for a segment it does not serve.
    WrongGreen {
        /// The member.
        host_id: HostId,
        /// The segment index.
        segment: u32,
    },
    /// A member is classified red for a segment that has a started owner.
    WrongRed {
        /// The member.
        host_id: HostId,
        /// The segment index.
        segment: u32,
    },
    /// A member is yellow while holding segments, or vice versa.
    WrongYellow {
        /// The member.
        host_id: HostId,
    },
    /// A started primary is not a started member.
    NotStarted {
        /// The member.
        host_id: HostId,
        /// Its shard state.
        state: ShardState,
    },
    /// Coalescing every segment does not give back the whole ring.
    RingNotReconstructed {
        /// What coalescing produced.
        ranges: Vec<Range>,
    },
    /// The halves of a wrap-around range do not cover it.
    BadWrapSplit {
        /// The wrap-around range.
        range: Range,
        /// The halves produced.
        halves: Vec<Range>,
    },
}

impl std::fmt::Display for PropertyViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MisalignedRange { range } => {
                write!(f, "Range {range} is not aligned with segment boundaries")
            }
            Self::DoublyRouted { segment } => {
                write!(f, "Segment {segment} is routed to more than one primary")
            }
            Self::WrongRedEntry { host_id } => {
                write!(f, "Orphaned primary on {host_id} does not match its red segments")
            }
            Self::Unrouted { segment } => write!(f, "Segment {segment} is not routed"),
            Self::ConsistencyMismatch { reported, orphaned } => {
                write!(
                    f,
                    "Router reports consistent={reported} with {orphaned} orphaned segments"
                )
            }
            Self::WrongGreen { host_id, segment } => {
                write!(f, "{host_id} is green for segment {segment} without serving it")
            }
            Self::WrongRed { host_id, segment } => {
                write!(f, "{host_id} is red for available segment {segment}")
            }
            Self::WrongYellow { host_id } => {
                write!(f, "{host_id} has the wrong yellow classification")
            }
            Self::NotStarted { host_id, state } => {
                write!(f, "Started primary on {host_id} whose shard is {state}")
            }
            Self::RingNotReconstructed { ranges } => {
                write!(f, "Coalescing all segments gave {ranges:?}")
            }
            Self::BadWrapSplit { range, halves } => {
                write!(f, "Wrap-around range {range} split into {halves:?}")
            }
        }
    }
}

// ============================================================================
// Checkers
// ============================================================================

/// Runs every router and route check.
#[must_use]
pub fn check_all(router: &Router, route: &Route) -> Vec<PropertyViolation> {
    let mut violations = check_classification(router);
    violations.extend(check_ring_reconstruction(router));
    violations.extend(check_route_coverage(router, route));
    violations.extend(check_started_primaries(router, route));
    violations
}

/// Checks how the primaries of `route` cover the ring.
///
/// Started primaries serve every available segment exactly once and no
/// orphaned segment. Each orphaned owner's primary carries exactly its red
/// segments, so a replicated orphan appears once per owner.
#[must_use]
pub fn check_route_coverage(router: &Router, route: &Route) -> Vec<PropertyViolation> {
    let model = router.model();
    let red = router.classification().red();
    let mut violations = Vec::new();
    let mut started = RoaringBitmap::new();
    let mut orphaned = RoaringBitmap::new();

    for entry in route.primaries() {
        let mut served = RoaringBitmap::new();
        for range in &entry.ranges {
            match model.segments_in(*range) {
                Some(segments) => served |= segments,
                None => violations.push(PropertyViolation::MisalignedRange { range: *range }),
            }
        }

        if entry.state == ShardState::Started {
            for segment in &(&started & &served) {
                violations.push(PropertyViolation::DoublyRouted { segment });
            }
            started |= served;
        } else {
            if red.get(&entry.host_id) != Some(&served) {
                violations.push(PropertyViolation::WrongRedEntry {
                    host_id: entry.host_id,
                });
            }
            orphaned |= served;
        }
    }

    for segment in &(&started & &orphaned) {
        violations.push(PropertyViolation::DoublyRouted { segment });
    }
    let all = RoaringBitmap::all_segments(router.segment_count());
    for segment in &(all - (started | orphaned)) {
        violations.push(PropertyViolation::Unrouted { segment });
    }
    violations
}

/// Checks the green/red/yellow classification against the raw shard states.
#[must_use]
pub fn check_classification(router: &Router) -> Vec<PropertyViolation> {
    let classification = router.classification();
    let mut violations = Vec::new();

    let orphaned = classification.orphaned_segments();
    if router.is_consistent() != orphaned.is_empty() {
        violations.push(PropertyViolation::ConsistencyMismatch {
            reported: router.is_consistent(),
            orphaned: orphaned.len(),
        });
    }

    for (host_id, segments) in classification.green() {
        if router.shard_state(*host_id) != ShardState::Started {
            violations.extend(segments.iter().map(|segment| PropertyViolation::WrongGreen {
                host_id: *host_id,
                segment,
            }));
        }
    }

    let available = classification.available_segments();
    for (host_id, segments) in classification.red() {
        for segment in &(segments & &available) {
            violations.push(PropertyViolation::WrongRed {
                host_id: *host_id,
                segment,
            });
        }
    }

    for member in router.cluster().members() {
        let host_id = member.host_id;
        let classified = classification.green().contains_key(&host_id)
            || classification.red().contains_key(&host_id);
        let yellow = classification.yellow().contains(&host_id);
        if classified == yellow {
            violations.push(PropertyViolation::WrongYellow { host_id });
        }
    }
    violations
}

/// Checks that the segment boundaries reassemble into the full ring.
#[must_use]
pub fn check_ring_reconstruction(router: &Router) -> Vec<PropertyViolation> {
    let all = RoaringBitmap::all_segments(router.segment_count());
    let ranges = coalesce(router.model().tokens(), &all);
    if ranges == [Range::FULL] {
        Vec::new()
    } else {
        vec![PropertyViolation::RingNotReconstructed { ranges }]
    }
}

/// Checks that only started shards are routed as started primaries.
#[must_use]
pub fn check_started_primaries(router: &Router, route: &Route) -> Vec<PropertyViolation> {
    route
        .primaries()
        .filter(|entry| entry.state == ShardState::Started)
        .filter_map(|entry| {
            let state = router.shard_state(entry.host_id);
            (state != ShardState::Started).then_some(PropertyViolation::NotStarted {
                host_id: entry.host_id,
                state,
            })
        })
        .collect()
}

/// Checks that the halves of a wrap-around range cover exactly what it does.
///
/// The halves must not wrap, must be non-empty, and must end at `MAX` and
/// start at `MIN` respectively.
#[must_use]
pub fn check_wrap_split(range: Range) -> Vec<PropertyViolation> {
    let halves = range.split_wrap_around();
    let upper_ok = range.left == Token::MAX
        || halves.contains(&Range::new(range.left, Token::MAX));
    let lower_ok = range.right == Token::MIN
        || halves.contains(&Range::new(Token::MIN, range.right));
    let well_formed = halves
        .iter()
        .all(|half| !half.is_wrap_around() && half.left != half.right);

    if upper_ok && lower_ok && well_formed && halves.len() <= 2 {
        Vec::new()
    } else {
        vec![PropertyViolation::BadWrapSplit { range, halves }]
    }
}

/// Returns true if every segment has a started owner.
#[must_use]
pub fn fully_available(router: &Router) -> bool {
    router.classification().available_segments().len() == u64::from(router.segment_count())
}

//! Boundary model - the ownership map normalized into ring segments.
//!
//! The raw ownership map may hold one wrap-around range. It is split at the
//! ring edge, the right boundaries are sorted, and segment `i` becomes
//! `(tokens[i-1], tokens[i]]` with `tokens[-1] = MIN`.

use std::collections::BTreeMap;
use std::net::IpAddr;

use roaring::RoaringBitmap;
use strata_core::{Limits, Range, Token};
use tracing::{trace, warn};

use crate::error::{RoutingError, RoutingResult};

/// Range to ordered endpoint list, as published by the storage ring.
pub type OwnershipMap = BTreeMap<Range, Vec<IpAddr>>;

/// Source of ownership snapshots for a partitioned dataset.
///
/// Returning `None` (or an empty map) means the ring is not ready yet; the
/// router then bootstraps with a single local range.
pub trait OwnershipSource {
    /// Returns the current ownership map for `keyspace`.
    fn range_to_endpoints(&self, keyspace: &str) -> Option<OwnershipMap>;
}

impl OwnershipSource for OwnershipMap {
    fn range_to_endpoints(&self, _keyspace: &str) -> Option<OwnershipMap> {
        Some(self.clone())
    }
}

impl OwnershipSource for BTreeMap<String, OwnershipMap> {
    fn range_to_endpoints(&self, keyspace: &str) -> Option<OwnershipMap> {
        self.get(keyspace).cloned()
    }
}

/// Sorted, non-wrapping segment boundaries with their owners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundaryModel {
    /// Right edge of each segment, strictly ascending, never `MIN`.
    tokens: Vec<Token>,
    /// Owning endpoints of each segment, aligned with `tokens`.
    owners: Vec<Vec<IpAddr>>,
    /// True if built from the single-range bootstrap fallback.
    bootstrap: bool,
}

impl BoundaryModel {
    /// Builds the model from an ownership snapshot.
    ///
    /// An absent, empty or non-covering map falls back to
    /// [`BoundaryModel::bootstrap`] owned by `local`.
    ///
    /// # Errors
    ///
    /// Returns `MultipleWrapAround` if more than one range wraps,
    /// `UnownedRange` if a range has no endpoints, or `Limits` if the map
    /// exceeds the configured bounds.
    pub fn build(
        ownership: Option<&OwnershipMap>,
        local: IpAddr,
        limits: &Limits,
    ) -> RoutingResult<Self> {
        let Some(ownership) = ownership.filter(|map| !map.is_empty()) else {
            warn!(%local, "ownership map unavailable, bootstrapping with local full range");
            return Ok(Self::bootstrap(local));
        };

        let Some(normalized) = normalize(ownership)? else {
            warn!(
                %local,
                "wrap-around range overlaps another range, bootstrapping with local full range"
            );
            return Ok(Self::bootstrap(local));
        };
        if let Some((expected, found)) = coverage_gap(&normalized) {
            warn!(
                %local,
                expected = %expected,
                found = %found,
                "ownership map does not cover the ring, bootstrapping with local full range"
            );
            return Ok(Self::bootstrap(local));
        }

        Limits::check("max_segments", limits.max_segments, normalized.len())?;

        let mut tokens = Vec::with_capacity(normalized.len());
        let mut owners = Vec::with_capacity(normalized.len());
        for (range, endpoints) in normalized {
            if endpoints.is_empty() {
                return Err(RoutingError::UnownedRange { range });
            }
            Limits::check(
                "max_owners_per_range",
                limits.max_owners_per_range,
                endpoints.len(),
            )?;
            tokens.push(range.right);
            owners.push(endpoints);
        }

        trace!(?tokens, "ordered segment boundaries");
        Ok(Self {
            tokens,
            owners,
            bootstrap: false,
        })
    }

    /// Single full-ring segment owned by `local`.
    #[must_use]
    pub fn bootstrap(local: IpAddr) -> Self {
        Self {
            tokens: vec![Token::MAX],
            owners: vec![vec![local]],
            bootstrap: true,
        }
    }

    /// Returns true if this model came from the bootstrap fallback.
    #[must_use]
    pub const fn is_bootstrap(&self) -> bool {
        self.bootstrap
    }

    /// Returns the number of segments.
    #[must_use]
    pub fn segment_count(&self) -> u32 {
        // Bounded by `Limits::max_segments`, which is a u32.
        #[allow(clippy::cast_possible_truncation)]
        let count = self.tokens.len() as u32;
        count
    }

    /// Returns the ordered segment boundaries.
    #[must_use]
    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    /// Returns the owning endpoints of segment `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= segment_count()`.
    #[must_use]
    pub fn owners(&self, index: u32) -> &[IpAddr] {
        &self.owners[index as usize]
    }

    /// Returns the range covered by segment `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= segment_count()`.
    #[must_use]
    pub fn segment_range(&self, index: u32) -> Range {
        let index = index as usize;
        let left = if index == 0 {
            Token::MIN
        } else {
            self.tokens[index - 1]
        };
        Range::new(left, self.tokens[index])
    }

    /// Returns the segment containing `token`.
    ///
    /// `MIN` is the exclusive left edge of the ring and belongs to no segment.
    #[must_use]
    pub fn segment_for(&self, token: Token) -> Option<u32> {
        if token.is_min() {
            return None;
        }
        let index = self.tokens.partition_point(|boundary| *boundary < token);
        #[allow(clippy::cast_possible_truncation)]
        (index < self.tokens.len()).then_some(index as u32)
    }

    /// Returns the segments spanned by a boundary-aligned, non-wrapping range.
    ///
    /// Returns `None` if the range wraps or an edge is not a boundary.
    #[must_use]
    pub fn segments_in(&self, range: Range) -> Option<RoaringBitmap> {
        if range.is_wrap_around() {
            return None;
        }
        let start = if range.left.is_min() {
            0
        } else {
            self.tokens.binary_search(&range.left).ok()? + 1
        };
        let end = self.tokens.binary_search(&range.right).ok()?;

        let mut segments = RoaringBitmap::new();
        #[allow(clippy::cast_possible_truncation)]
        segments.insert_range(start as u32..=end as u32);
        Some(segments)
    }
}

/// Splits the wrap-around range and returns non-wrapping ranges only.
///
/// Returns `None` if a half of the wrap-around range collides with a range
/// already in the map.
fn normalize(ownership: &OwnershipMap) -> RoutingResult<Option<OwnershipMap>> {
    let wrapping: Vec<&Range> = ownership.keys().filter(|r| r.is_wrap_around()).collect();
    if wrapping.len() > 1 {
        return Err(RoutingError::MultipleWrapAround {
            count: wrapping.len(),
            first: *wrapping[0],
        });
    }

    let mut normalized = OwnershipMap::new();
    for (range, endpoints) in ownership {
        let halves = if range.is_wrap_around() {
            range.split_wrap_around()
        } else {
            vec![*range]
        };
        for half in halves {
            if normalized.insert(half, endpoints.clone()).is_some() {
                return Ok(None);
            }
        }
    }
    Ok(Some(normalized))
}

/// Returns the first `(expected left edge, found left edge)` mismatch when
/// the ranges do not chain from `MIN` to `MAX`.
fn coverage_gap(normalized: &OwnershipMap) -> Option<(Token, Token)> {
    let mut expected = Token::MIN;
    for range in normalized.keys() {
        if range.left != expected {
            return Some((expected, range.left));
        }
        expected = range.right;
    }
    (expected != Token::MAX).then_some((Token::MAX, expected))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(value: i64) -> Token {
        Token::new(value)
    }

    fn ip(last: u8) -> IpAddr {
        IpAddr::from([10, 0, 0, last])
    }

    fn map(entries: &[(Range, &[u8])]) -> OwnershipMap {
        entries
            .iter()
            .map(|(range, hosts)| (*range, hosts.iter().map(|h| ip(*h)).collect()))
            .collect()
    }

    #[test]
    fn test_bootstrap_on_missing_or_empty() {
        let limits = Limits::new();
        let model = BoundaryModel::build(None, ip(1), &limits).unwrap();
        assert!(model.is_bootstrap());
        assert_eq!(model.tokens(), &[Token::MAX]);
        assert_eq!(model.owners(0), &[ip(1)]);

        let empty = OwnershipMap::new();
        let model = BoundaryModel::build(Some(&empty), ip(1), &limits).unwrap();
        assert!(model.is_bootstrap());
        assert_eq!(model.segment_range(0), Range::FULL);
    }

    #[test]
    fn test_non_wrapping_map() {
        let ownership = map(&[
            (Range::new(Token::MIN, t(0)), &[1]),
            (Range::new(t(0), Token::MAX), &[2, 3]),
        ]);
        let model = BoundaryModel::build(Some(&ownership), ip(1), &Limits::new()).unwrap();

        assert!(!model.is_bootstrap());
        assert_eq!(model.segment_count(), 2);
        assert_eq!(model.tokens(), &[t(0), Token::MAX]);
        assert_eq!(model.owners(1), &[ip(2), ip(3)]);
        assert_eq!(model.segment_range(0), Range::new(Token::MIN, t(0)));
        assert_eq!(model.segment_range(1), Range::new(t(0), Token::MAX));
    }

    #[test]
    fn test_wrap_around_is_split() {
        // (20, -20] wraps; the ring is -20 .. 0 .. 20 .. wrap.
        let ownership = map(&[
            (Range::new(t(-20), t(0)), &[1]),
            (Range::new(t(0), t(20)), &[2]),
            (Range::new(t(20), t(-20)), &[3]),
        ]);
        let model = BoundaryModel::build(Some(&ownership), ip(1), &Limits::new()).unwrap();

        assert_eq!(model.tokens(), &[t(-20), t(0), t(20), Token::MAX]);
        assert_eq!(model.owners(0), &[ip(3)]);
        assert_eq!(model.owners(3), &[ip(3)]);
        assert!(model.tokens().iter().all(|token| !token.is_min()));
    }

    #[test]
    fn test_single_token_ring() {
        // One token: (t, t] is the whole ring.
        let ownership = map(&[(Range::new(t(7), t(7)), &[4])]);
        let model = BoundaryModel::build(Some(&ownership), ip(1), &Limits::new()).unwrap();

        assert_eq!(model.tokens(), &[t(7), Token::MAX]);
        assert_eq!(model.owners(0), &[ip(4)]);
        assert_eq!(model.owners(1), &[ip(4)]);
    }

    #[test]
    fn test_gap_falls_back_to_bootstrap() {
        let ownership = map(&[
            (Range::new(Token::MIN, t(0)), &[1]),
            (Range::new(t(5), Token::MAX), &[2]),
        ]);
        let model = BoundaryModel::build(Some(&ownership), ip(9), &Limits::new()).unwrap();
        assert!(model.is_bootstrap());
        assert_eq!(model.owners(0), &[ip(9)]);
    }

    #[test]
    fn test_wrap_half_colliding_with_range_falls_back_to_bootstrap() {
        // (10, 0] splits into (10, MAX] and (MIN, 0], which is already owned.
        let ownership = map(&[
            (Range::new(Token::MIN, t(0)), &[1]),
            (Range::new(t(0), t(10)), &[3]),
            (Range::new(t(10), t(0)), &[2]),
        ]);
        let model = BoundaryModel::build(Some(&ownership), ip(9), &Limits::new()).unwrap();
        assert!(model.is_bootstrap());
        assert_eq!(model.tokens(), &[Token::MAX]);
        assert_eq!(model.owners(0), &[ip(9)]);
    }

    #[test]
    fn test_overlapping_ranges_fall_back_to_bootstrap() {
        let ownership = map(&[
            (Range::new(Token::MIN, t(10)), &[1]),
            (Range::new(t(0), Token::MAX), &[2]),
        ]);
        let model = BoundaryModel::build(Some(&ownership), ip(9), &Limits::new()).unwrap();
        assert!(model.is_bootstrap());
    }

    #[test]
    fn test_multiple_wrap_around_rejected() {
        let ownership = map(&[
            (Range::new(t(10), t(0)), &[1]),
            (Range::new(t(20), t(5)), &[2]),
        ]);
        let err = BoundaryModel::build(Some(&ownership), ip(1), &Limits::new()).unwrap_err();
        assert!(matches!(err, RoutingError::MultipleWrapAround { count: 2, .. }));
    }

    #[test]
    fn test_unowned_range_rejected() {
        let ownership = map(&[(Range::FULL, &[])]);
        let err = BoundaryModel::build(Some(&ownership), ip(1), &Limits::new()).unwrap_err();
        assert_eq!(err, RoutingError::UnownedRange { range: Range::FULL });
    }

    #[test]
    fn test_segment_limit() {
        let ownership = map(&[
            (Range::new(Token::MIN, t(0)), &[1]),
            (Range::new(t(0), Token::MAX), &[2]),
        ]);
        let limits = Limits {
            max_segments: 1,
            ..Limits::new()
        };
        let err = BoundaryModel::build(Some(&ownership), ip(1), &limits).unwrap_err();
        assert!(matches!(err, RoutingError::Limits(_)));
    }

    #[test]
    fn test_segment_for() {
        let ownership = map(&[
            (Range::new(Token::MIN, t(0)), &[1]),
            (Range::new(t(0), t(100)), &[2]),
            (Range::new(t(100), Token::MAX), &[3]),
        ]);
        let model = BoundaryModel::build(Some(&ownership), ip(1), &Limits::new()).unwrap();

        assert_eq!(model.segment_for(Token::MIN), None);
        assert_eq!(model.segment_for(t(-1)), Some(0));
        assert_eq!(model.segment_for(t(0)), Some(0));
        assert_eq!(model.segment_for(t(1)), Some(1));
        assert_eq!(model.segment_for(t(100)), Some(1));
        assert_eq!(model.segment_for(Token::MAX), Some(2));
    }

    #[test]
    fn test_segments_in() {
        let ownership = map(&[
            (Range::new(Token::MIN, t(0)), &[1]),
            (Range::new(t(0), t(100)), &[2]),
            (Range::new(t(100), Token::MAX), &[3]),
        ]);
        let model = BoundaryModel::build(Some(&ownership), ip(1), &Limits::new()).unwrap();

        let all: RoaringBitmap = (0..3).collect();
        assert_eq!(model.segments_in(Range::FULL), Some(all));
        let upper: RoaringBitmap = (1..3).collect();
        assert_eq!(model.segments_in(Range::new(t(0), Token::MAX)), Some(upper));
        assert_eq!(model.segments_in(Range::new(t(5), Token::MAX)), None);
        assert_eq!(model.segments_in(Range::new(t(100), t(0))), None);
    }

    #[test]
    fn test_ownership_source_by_keyspace() {
        let mut sources = BTreeMap::new();
        sources.insert("ks".to_string(), map(&[(Range::FULL, &[1])]));
        assert!(sources.range_to_endpoints("ks").is_some());
        assert!(sources.range_to_endpoints("other").is_none());
    }
}

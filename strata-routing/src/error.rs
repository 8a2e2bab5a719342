//! Routing error types.

use std::net::IpAddr;

use strata_core::{HostId, Range};
use thiserror::Error;

/// Result type for routing operations.
pub type RoutingResult<T> = Result<T, RoutingError>;

/// Errors raised while building a router or a route.
///
/// Build-time errors abort the new router and leave the previous one
/// serving. Query-time errors abort the route with no partial output.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RoutingError {
    /// A ring endpoint maps to no known cluster member.
    #[error("cannot resolve ring endpoint {endpoint} (advertised host id: {host_id:?})")]
    UnresolvableEndpoint {
        /// The ring endpoint address.
        endpoint: IpAddr,
        /// The host id the ring advertised for it, if any.
        host_id: Option<HostId>,
    },

    /// The ownership map holds more than one wrap-around range.
    #[error("ownership map has {count} wrap-around ranges, first {first}")]
    MultipleWrapAround {
        /// Number of wrap-around ranges found.
        count: usize,
        /// The first wrap-around range, in range order.
        first: Range,
    },

    /// A range in the ownership map has no owner.
    #[error("range {range} has no owning endpoint")]
    UnownedRange {
        /// The range without owners.
        range: Range,
    },

    /// The selection and the orphaned segments leave segments uncovered.
    #[error("selection leaves {missing} of {segments} segments uncovered (first: {first})")]
    IncompleteSelection {
        /// Number of uncovered segments.
        missing: u64,
        /// Total number of segments.
        segments: u32,
        /// Lowest uncovered segment index.
        first: u32,
    },

    /// A segment is selected twice, or selected while orphaned.
    #[error("segment {segment} is routed more than once (host {host})")]
    OverlappingSelection {
        /// The segment index.
        segment: u32,
        /// The member whose selection collided.
        host: HostId,
    },

    /// A selection references a segment index past the segment count.
    #[error("segment {segment} out of range (segments: {segments})")]
    SegmentOutOfRange {
        /// The offending segment index.
        segment: u32,
        /// Total number of segments.
        segments: u32,
    },

    /// A selection references a host that is not a cluster member.
    #[error("unknown cluster member {host}")]
    UnknownMember {
        /// The unknown host.
        host: HostId,
    },

    /// A strategy name does not match any known policy.
    #[error("unknown search strategy: {name}")]
    UnknownStrategy {
        /// The name that failed to parse.
        name: String,
    },

    /// No router has been built yet for the index.
    #[error("no router available for index {index}")]
    NoRouter {
        /// The index name.
        index: String,
    },

    /// An input exceeded a configured limit.
    #[error(transparent)]
    Limits(#[from] strata_core::Error),
}

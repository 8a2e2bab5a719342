//! Strata Routing - availability classification and shard routing.
//!
//! This crate decides which cluster members hold a queryable copy of each
//! part of a partitioned, replicated ring, and turns that knowledge into a
//! per-query shard routing table.
//!
//! # Flow
//!
//! - On every topology change a [`Router`] is built once: the ownership map
//!   is normalized into a [`BoundaryModel`], ring endpoints are resolved to
//!   members by a [`MembershipResolver`], and every segment is classified
//!   green, red or yellow ([`Classification`]).
//! - Every query builds a [`Route`]: a [`SelectionPolicy`] picks members for
//!   the available segments, and the route adds the orphaned segments and
//!   the unassigned replicas.
//!
//! # Design
//!
//! - **Immutable snapshots**: a router never changes after construction and
//!   is shared across queries behind an `Arc`
//! - **No gaps**: every available segment is routed to exactly one started
//!   primary, and every orphaned segment to each of its owners, or the
//!   route fails
//! - **Explicit limits**: input sizes are bounded by [`strata_core::Limits`]

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod boundary;
mod classifier;
mod coalesce;
mod error;
mod membership;
mod policy;
mod route;
mod router;
mod strategy;

pub use boundary::{BoundaryModel, OwnershipMap, OwnershipSource};
pub use classifier::Classification;
pub use coalesce::{coalesce, SegmentBitmap};
pub use error::{RoutingError, RoutingResult};
pub use membership::{
    ClusterSnapshot, Liveness, Member, MembershipResolver, ShardState, ShardStates,
    UnassignedReason,
};
pub use policy::{PrimaryFirstPolicy, RandomPolicy, Selection, SelectionPolicy, StrategyKind};
pub use route::{Route, RoutingEntry, ShardRoutingTable};
pub use router::{Router, RouterConfig};
pub use strategy::SearchStrategy;

//! Shard selection policies.
//!
//! A policy decides, per query, which started member serves which segments.
//! The route builder surfaces orphaned segments on its own, so a policy only
//! has to cover the segments that have a started owner.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use roaring::RoaringBitmap;
use strata_core::HostId;

use crate::error::RoutingError;
use crate::router::Router;

/// Segments chosen per member for one query.
///
/// Ordered by host id so shard ids are assigned deterministically.
pub type Selection = BTreeMap<HostId, RoaringBitmap>;

/// Picks, for each query, the members that serve each segment.
pub trait SelectionPolicy {
    /// Returns the selection for a query against `router`.
    ///
    /// The union of the returned bitmaps and the router's orphaned segments
    /// must cover every segment exactly once.
    fn selected_shards(&self, router: &Router) -> Selection;
}

/// Prefers the local member, then the members covering the most segments.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrimaryFirstPolicy;

impl SelectionPolicy for PrimaryFirstPolicy {
    fn selected_shards(&self, router: &Router) -> Selection {
        let green = router.classification().green();
        let mut selection = Selection::new();
        if let Some(local) = green.get(&router.local()) {
            selection.insert(router.local(), local.clone());
        }
        let order: Vec<HostId> = green.keys().copied().collect();
        cover_greedily(router, &order, selection)
    }
}

/// Spreads load by visiting started members in a seeded random order.
#[derive(Debug, Clone, Copy)]
pub struct RandomPolicy {
    /// Per-query seed.
    pub seed: u64,
}

impl RandomPolicy {
    /// Creates a policy for one query.
    #[must_use]
    pub const fn new(seed: u64) -> Self {
        Self { seed }
    }
}

impl SelectionPolicy for RandomPolicy {
    fn selected_shards(&self, router: &Router) -> Selection {
        let mut order: Vec<HostId> = router.classification().green().keys().copied().collect();
        let mut rng = StdRng::seed_from_u64(self.seed ^ router.version().get());
        order.shuffle(&mut rng);
        cover_greedily(router, &order, Selection::new())
    }
}

/// Extends `selection` until every available segment is covered.
///
/// Each step takes the member in `order` that covers the most uncovered
/// segments; ties go to the earlier member.
fn cover_greedily(router: &Router, order: &[HostId], mut selection: Selection) -> Selection {
    let green = router.classification().green();
    let mut remaining = router.classification().available_segments();
    for bits in selection.values() {
        remaining -= bits;
    }

    // Every step covers at least one segment with a member not taken yet.
    for _ in 0..order.len() {
        if remaining.is_empty() {
            break;
        }
        let mut best: Option<(HostId, u64)> = None;
        for host in order {
            let gain = green[host].intersection_len(&remaining);
            if gain > best.map_or(0, |(_, g)| g) {
                best = Some((*host, gain));
            }
        }
        let Some((host, _)) = best else {
            break;
        };
        let taken = &green[&host] & &remaining;
        remaining -= &taken;
        *selection.entry(host).or_default() |= taken;
    }

    assert!(remaining.is_empty(), "available segments left uncovered");
    selection
}

/// Named selection strategies, as configured per index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StrategyKind {
    /// [`PrimaryFirstPolicy`].
    #[default]
    PrimaryFirst,
    /// [`RandomPolicy`].
    Random,
}

impl StrategyKind {
    /// Instantiates the policy for one query.
    #[must_use]
    pub fn policy(self, seed: u64) -> Box<dyn SelectionPolicy> {
        match self {
            Self::PrimaryFirst => Box::new(PrimaryFirstPolicy),
            Self::Random => Box::new(RandomPolicy::new(seed)),
        }
    }
}

impl FromStr for StrategyKind {
    type Err = RoutingError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        // Accept fully-qualified names too.
        let short = name.rsplit('.').next().unwrap_or(name);
        match short {
            "PrimaryFirstSearchStrategy" | "primary_first" => Ok(Self::PrimaryFirst),
            "RandomSearchStrategy" | "random" => Ok(Self::Random),
            _ => Err(RoutingError::UnknownStrategy {
                name: name.to_string(),
            }),
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PrimaryFirst => f.write_str("PrimaryFirstSearchStrategy"),
            Self::Random => f.write_str("RandomSearchStrategy"),
        }
    }
}

//! Reusable rings, clusters and seeds for routing tests.

use std::net::IpAddr;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use strata_core::{ClusterVersion, HostId, Range, Token};
use strata_routing::{ClusterSnapshot, Liveness, Member, OwnershipMap, ShardState, ShardStates};

/// Seeds for reproducible testing.
pub mod seeds {
    /// Standard test seeds that have historically found bugs.
    pub const REGRESSION_SEEDS: &[u64] = &[
        42,
        12345,
        0xDEAD_BEEF,
        999,
        7777,
        0x1337,
        0xCAFE_BABE,
        1,
        u64::MAX,
        0,
    ];

    /// Number of random seeds to test in CI.
    pub const CI_SEED_COUNT: u32 = 100;
}

/// Address of member `n`.
#[must_use]
pub fn ip(n: u8) -> IpAddr {
    IpAddr::from([10, 0, 0, n])
}

/// Host id of member `n`.
#[must_use]
pub fn host(n: u8) -> HostId {
    HostId::new(u64::from(n))
}

/// Cluster of live members `1..=count` named `node<n>`.
#[must_use]
pub fn cluster(version: u64, local: u8, count: u8) -> ClusterSnapshot {
    (1..=count).fold(
        ClusterSnapshot::new(ClusterVersion::new(version), host(local)),
        |cluster, n| cluster.with_member(Member::new(host(n), format!("node{n}"), ip(n))),
    )
}

/// Shard states with every listed member in `state`.
#[must_use]
pub fn states(members: &[u8], state: ShardState) -> ShardStates {
    members.iter().map(|n| (host(*n), state)).collect()
}

/// A randomly generated ring and the cluster around it.
#[derive(Debug, Clone)]
pub struct RandomRing {
    /// Ownership map, possibly with one wrap-around range.
    pub ownership: OwnershipMap,
    /// Cluster snapshot; members past the ring owners are off-ring.
    pub cluster: ClusterSnapshot,
    /// Index shard states.
    pub states: ShardStates,
    /// The wrap-around range, if the ring has one.
    pub wrap_around: Option<Range>,
}

impl RandomRing {
    /// Generates a ring from `seed`.
    ///
    /// Vnode tokens are drawn uniformly; each range is owned by up to three
    /// distinct ring members. Half the seeds produce a Cassandra-style ring
    /// with a wrap-around range, the other half a ring anchored at `MIN`.
    #[must_use]
    pub fn generate(seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);

        let ring_members: u8 = rng.gen_range(1..=6);
        let off_ring: u8 = rng.gen_range(0..=2);
        let replication = usize::from(rng.gen_range(1..=3u8).min(ring_members));
        let token_count: usize = rng.gen_range(1..=24);

        let mut tokens: Vec<Token> = (0..token_count)
            .map(|_| Token::new(rng.gen_range(i64::MIN + 1..i64::MAX)))
            .collect();
        tokens.sort();
        tokens.dedup();

        let wraps = rng.gen_bool(0.5);
        let mut edges = Vec::with_capacity(tokens.len() + 2);
        if !wraps {
            edges.push(Token::MIN);
        }
        edges.extend(tokens.iter().copied());
        if !wraps {
            edges.push(Token::MAX);
        }

        let candidates: Vec<u8> = (1..=ring_members).collect();
        let owners = |rng: &mut StdRng| -> Vec<IpAddr> {
            candidates
                .choose_multiple(rng, replication)
                .map(|n| ip(*n))
                .collect()
        };

        let mut ownership = OwnershipMap::new();
        for pair in edges.windows(2) {
            ownership.insert(Range::new(pair[0], pair[1]), owners(&mut rng));
        }
        let wrap_around = if wraps {
            // Last token back around to the first; `(t, t]` for a single token.
            let range = Range::new(edges[edges.len() - 1], edges[0]);
            ownership.insert(range, owners(&mut rng));
            Some(range)
        } else {
            None
        };

        let total = ring_members + off_ring;
        let local = rng.gen_range(1..=total);
        let mut cluster = ClusterSnapshot::new(ClusterVersion::new(seed % 1000), host(local));
        let mut states = ShardStates::new();
        for n in 1..=total {
            let liveness = if rng.gen_bool(0.1) {
                Liveness::Left
            } else {
                Liveness::Alive
            };
            let member = Member::new(host(n), format!("node{n}"), ip(n)).with_liveness(liveness);
            cluster = cluster.with_member(member);
            let state = [
                ShardState::Unassigned,
                ShardState::Initializing,
                ShardState::Started,
                ShardState::Started,
                ShardState::Started,
                ShardState::Relocating,
            ]
            .choose(&mut rng)
            .copied()
            .unwrap_or_default();
            // Leave some states unrecorded.
            if rng.gen_bool(0.8) {
                states.insert(host(n), state);
            }
        }

        Self {
            ownership,
            cluster,
            states,
            wrap_around,
        }
    }
}

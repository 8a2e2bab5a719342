//! Search strategy - the per-index holder of the current router.
//!
//! Topology events rebuild the router; queries grab the router current at
//! their start and finish against it even if a newer one is swapped in.

use std::sync::{Arc, PoisonError, RwLock};

use tracing::{info, warn};

use crate::boundary::OwnershipSource;
use crate::error::{RoutingError, RoutingResult};
use crate::membership::{ClusterSnapshot, ShardStates};
use crate::route::Route;
use crate::router::{Router, RouterConfig};

/// Versioned router holder for one index.
#[derive(Debug)]
pub struct SearchStrategy {
    /// Routing configuration.
    config: RouterConfig,
    /// The router serving queries, if one has been built.
    current: RwLock<Option<Arc<Router>>>,
}

impl SearchStrategy {
    /// Creates a holder with no router yet.
    #[must_use]
    pub const fn new(config: RouterConfig) -> Self {
        Self {
            config,
            current: RwLock::new(None),
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Rebuilds the router after a topology change.
    ///
    /// On success the new router replaces the current one. On failure the
    /// current router keeps serving.
    ///
    /// # Errors
    ///
    /// Returns the build error of the new router.
    pub fn on_topology_change(
        &self,
        source: &dyn OwnershipSource,
        cluster: &ClusterSnapshot,
        shard_states: &ShardStates,
    ) -> RoutingResult<Arc<Router>> {
        let ownership = source.range_to_endpoints(&self.config.keyspace);
        match Router::build(&self.config, ownership.as_ref(), cluster, shard_states) {
            Ok(router) => {
                let router = Arc::new(router);
                *self.current.write().unwrap_or_else(PoisonError::into_inner) =
                    Some(Arc::clone(&router));
                info!(
                    index = %self.config.index,
                    version = %router.version(),
                    consistent = router.is_consistent(),
                    "installed router"
                );
                Ok(router)
            }
            Err(error) => {
                warn!(
                    index = %self.config.index,
                    version = %cluster.version(),
                    serving = ?self.router().map(|r| r.version()),
                    %error,
                    "router rebuild failed, keeping previous router"
                );
                Err(error)
            }
        }
    }

    /// Returns the router currently serving queries.
    #[must_use]
    pub fn router(&self) -> Option<Arc<Router>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Builds a route with the configured strategy against the current router.
    ///
    /// # Errors
    ///
    /// Returns `NoRouter` before the first successful build, or the route
    /// build error.
    pub fn route(&self, seed: u64) -> RoutingResult<Route> {
        let router = self.router().ok_or_else(|| RoutingError::NoRouter {
            index: self.config.index.clone(),
        })?;
        let policy = self.config.strategy.policy(seed);
        router.new_route(policy.as_ref())
    }
}

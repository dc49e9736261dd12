//! Per-query dispatch decisions.
//!
//! The [`Dispatcher`] decides whether a query is dispatched internally, directly to search
//! nodes, or left to the external dispatch tier. Internal dispatch honours an explicit search
//! path when the query has one; otherwise a group is selected by the
//! [`LoadBalancer`](crate::load_balancing::LoadBalancer), retrying on other groups a bounded
//! number of times when the [`InvokerFactory`] refuses a group.

use derivative::Derivative;
use fxhash::FxHashSet;
use std::cmp::min;
use std::sync::Arc;
use tracing::*;

use crate::cluster::{ClusterMetadata, DispatchConfig, SearchCluster, SearchPath};
use crate::error::ErrorMessage;
use crate::invoker::{DispatchedInvoker, ErrorInvoker, FillInvoker, GroupLease, SearchResult};
use crate::load_balancing::{GroupSelection, LoadBalancer};
use crate::metrics::{DispatchMetrics, DispatchPath};
use crate::query::{Query, DISPATCH_TRACE_LEVEL};

pub use crate::invoker::{Backend, InvokerFactory};

/// Upper bound on groups tried for a single query.
pub const MAX_GROUP_SELECTION_ATTEMPTS: usize = 3;

/// How a query should be dispatched.
#[derive(Debug)]
pub enum DispatchDecision {
    /// Dispatch internally using the given invoker, which must be torn down when done.
    Internal(DispatchedInvoker),
    /// Dispatch through the external tier.
    External,
    /// The query asked for an impossible route and must be answered with the given error.
    IllegalQuery(ErrorInvoker),
}

impl DispatchDecision {
    #[inline]
    pub fn is_internal(&self) -> bool {
        matches!(self, DispatchDecision::Internal(_))
    }
}

enum Resolution {
    Found(DispatchedInvoker),
    Exhausted,
    Malformed(ErrorMessage),
}

/// Decides how queries are dispatched to a search cluster.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct Dispatcher {
    search_cluster: Arc<SearchCluster>,
    load_balancer: Arc<LoadBalancer>,
    multilevel_dispatch: bool,
    internal_dispatch_by_default: bool,
    #[derivative(Debug = "ignore")]
    invoker_factory: Arc<dyn InvokerFactory + Send + Sync>,
    #[derivative(Debug = "ignore")]
    metrics: Arc<dyn DispatchMetrics + Send + Sync>,
}

impl Dispatcher {
    pub fn new(
        search_cluster: Arc<SearchCluster>,
        config: &DispatchConfig,
        invoker_factory: Arc<dyn InvokerFactory + Send + Sync>,
        metrics: Arc<dyn DispatchMetrics + Send + Sync>,
    ) -> Self {
        let load_balancer = Arc::new(LoadBalancer::new(
            &search_cluster.metadata(),
            config.distribution_policy,
        ));

        Dispatcher {
            search_cluster,
            load_balancer,
            multilevel_dispatch: config.use_multilevel_dispatch,
            internal_dispatch_by_default: config.internal_dispatch_by_default(),
            invoker_factory,
            metrics,
        }
    }

    #[inline]
    pub fn search_cluster(&self) -> &Arc<SearchCluster> {
        &self.search_cluster
    }

    #[inline]
    pub fn load_balancer(&self) -> &Arc<LoadBalancer> {
        &self.load_balancer
    }

    /// Decides how to dispatch a query. May record the chosen route on the query, so subsequent
    /// calls for the same request take the same one.
    pub fn search_invoker(&self, query: &mut Query, backend: &Backend) -> DispatchDecision {
        if self.multilevel_dispatch || !query.dispatch_internal(self.internal_dispatch_by_default)
        {
            self.metrics.record(DispatchPath::External);
            return DispatchDecision::External;
        }

        let metadata = self.search_cluster.metadata();
        let resolution = match self.search_path_invoker(query, backend, &metadata) {
            Some(resolution) => resolution,
            None => self.internal_invoker(query, backend, &metadata),
        };

        let decision = match resolution {
            Resolution::Found(invoker) => {
                query.set_dispatch_internal(true);
                if query.is_estimate() {
                    query.disable_hits();
                }
                DispatchDecision::Internal(invoker)
            }
            Resolution::Exhausted => DispatchDecision::External,
            Resolution::Malformed(error) => DispatchDecision::IllegalQuery(ErrorInvoker::new(error)),
        };

        self.metrics.record(match decision {
            DispatchDecision::External => DispatchPath::External,
            _ => DispatchPath::Internal,
        });

        decision
    }

    /// Creates an invoker filling hits of a result found earlier.
    pub fn fill_invoker(
        &self,
        result: &SearchResult,
        backend: &Backend,
    ) -> Option<Box<dyn FillInvoker>> {
        self.invoker_factory.create_fill_invoker(backend, result)
    }

    /// Releases backend resources. The dispatcher must not be used afterwards.
    pub fn shutdown(&self) {
        debug!(cluster = self.search_cluster.id(), "Shutting down dispatcher.");
        self.invoker_factory.release();
    }

    // None means the query carries no effective search path
    fn search_path_invoker(
        &self,
        query: &mut Query,
        backend: &Backend,
        metadata: &ClusterMetadata,
    ) -> Option<Resolution> {
        let path = query.search_path()?.to_string();

        let search_path = match SearchPath::parse(&path) {
            Ok(search_path) => search_path?,
            Err(error) => {
                debug!(%error, "Rejecting query with malformed search path.");
                return Some(Resolution::Malformed(error.to_error_message()));
            }
        };

        let nodes = search_path.map_to_nodes(metadata);
        if nodes.is_empty() {
            query.trace(DISPATCH_TRACE_LEVEL, || {
                format!("Search path '{}' matches no nodes", path)
            });
            return Some(Resolution::Exhausted);
        }

        query.trace(DISPATCH_TRACE_LEVEL, || {
            format!("Dispatching to {} nodes selected by search path", nodes.len())
        });

        Some(
            self.invoker_factory
                .create_search_invoker(backend, query, None, &nodes, true)
                .map_or(Resolution::Exhausted, |invoker| {
                    Resolution::Found(DispatchedInvoker::new(invoker, None))
                }),
        )
    }

    fn internal_invoker(
        &self,
        query: &mut Query,
        backend: &Backend,
        metadata: &ClusterMetadata,
    ) -> Resolution {
        if let Some(node) = metadata.direct_dispatch_target() {
            query.trace(DISPATCH_TRACE_LEVEL, || format!("Dispatching directly to {}", node));

            return self
                .invoker_factory
                .create_search_invoker(backend, query, None, &[node], true)
                .map_or(Resolution::Exhausted, |invoker| {
                    Resolution::Found(DispatchedInvoker::new(invoker, None))
                });
        }

        let max_attempts = min(
            min(
                metadata.groups_with_sufficient_coverage() + 1,
                metadata.ordered_groups().len(),
            ),
            MAX_GROUP_SELECTION_ATTEMPTS,
        );

        let mut rejected: Option<FxHashSet<u32>> = None;
        for attempt in 0..max_attempts {
            let group = match self.load_balancer.take_group(metadata, rejected.as_ref()) {
                GroupSelection::Selected(group) => group,
                GroupSelection::Exhausted => break,
            };

            let lease = GroupLease::new(self.load_balancer.clone(), group.id());
            let accept_incomplete_coverage = attempt == max_attempts - 1;

            match self.invoker_factory.create_search_invoker(
                backend,
                query,
                Some(group.id()),
                group.nodes(),
                accept_incomplete_coverage,
            ) {
                Some(invoker) => {
                    query.trace(DISPATCH_TRACE_LEVEL, || {
                        format!("Dispatching internally to search group {}", group.id())
                    });
                    query.set_search_path(format!("/{}", group.id()));

                    return Resolution::Found(DispatchedInvoker::new(invoker, Some(lease)));
                }
                None => {
                    debug!(
                        group = group.id(),
                        attempt, accept_incomplete_coverage, "Search group refused query."
                    );

                    // releases the group as failed
                    drop(lease);
                    rejected
                        .get_or_insert_with(FxHashSet::default)
                        .insert(group.id());
                }
            }
        }

        Resolution::Exhausted
    }
}

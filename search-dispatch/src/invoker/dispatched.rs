use derivative::Derivative;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::Result;
use crate::invoker::{SearchInvoker, SearchResult};
use crate::load_balancing::LoadBalancer;
use crate::query::Query;

/// A group allocated by the load balancer for one query. The group is released exactly once, when
/// the lease is dropped, with the last recorded outcome. A lease dropped without an outcome counts
/// as a failed query.
#[derive(Debug)]
pub struct GroupLease {
    load_balancer: Arc<LoadBalancer>,
    group_id: u32,
    outcome: Option<(bool, Duration)>,
}

impl GroupLease {
    pub(crate) fn new(load_balancer: Arc<LoadBalancer>, group_id: u32) -> Self {
        GroupLease {
            load_balancer,
            group_id,
            outcome: None,
        }
    }

    #[inline]
    pub fn group_id(&self) -> u32 {
        self.group_id
    }

    pub(crate) fn record(&mut self, success: bool, search_time: Duration) {
        self.outcome = Some((success, search_time));
    }
}

impl Drop for GroupLease {
    fn drop(&mut self) {
        let (success, search_time) = self.outcome.unwrap_or((false, Duration::ZERO));
        self.load_balancer
            .release_group(self.group_id, success, search_time);
    }
}

/// A search invoker handed out by the dispatcher. When bound to a load-balanced group, the
/// outcome and latency of the search are fed back to the load balancer on
/// [`teardown`](DispatchedInvoker::teardown).
#[derive(Derivative)]
#[derivative(Debug)]
pub struct DispatchedInvoker {
    #[derivative(Debug = "ignore")]
    invoker: Box<dyn SearchInvoker>,
    lease: Option<GroupLease>,
}

impl DispatchedInvoker {
    pub(crate) fn new(invoker: Box<dyn SearchInvoker>, lease: Option<GroupLease>) -> Self {
        DispatchedInvoker { invoker, lease }
    }

    /// Id of the load-balanced group the invoker is bound to. Invokers for a direct dispatch
    /// target or an explicit search path are not bound to a group.
    #[inline]
    pub fn group_id(&self) -> Option<u32> {
        self.lease.as_ref().map(GroupLease::group_id)
    }

    pub async fn search(&mut self, query: &Query) -> Result<SearchResult> {
        let start = Instant::now();
        let result = self.invoker.search(query).await;

        if let Some(lease) = &mut self.lease {
            let success = matches!(&result, Ok(result) if !result.has_errors());
            lease.record(success, start.elapsed());
        }

        result
    }

    /// Finishes using the invoker, releasing its group.
    pub fn teardown(self) {}
}

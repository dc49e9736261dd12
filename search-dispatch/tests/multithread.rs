use futures::future::BoxFuture;
use futures::FutureExt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use search_dispatch::cluster::{
    DispatchConfigBuilder, DistributionPolicy, Node, NodeConfig, SearchCluster,
};
use search_dispatch::dispatcher::{Backend, DispatchDecision, Dispatcher, InvokerFactory};
use search_dispatch::invoker::{Coverage, FillInvoker, Hit, SearchInvoker, SearchResult};
use search_dispatch::metrics::{DispatchMetrics, DispatchPath};
use search_dispatch::query::Query;
use search_dispatch::Result;

const QUERIES: usize = 200;

struct HitInvoker {
    node: u32,
}

impl SearchInvoker for HitInvoker {
    fn search<'a>(&'a mut self, _query: &'a Query) -> BoxFuture<'a, Result<SearchResult>> {
        let node = self.node;
        async move {
            tokio::task::yield_now().await;
            Ok(SearchResult {
                hits: vec![Hit::new(format!("doc:{}", node), 1.0, node)],
                total_hit_count: 1,
                coverage: Coverage {
                    documents: 10,
                    active_documents: 10,
                    nodes: 1,
                    nodes_answered: 1,
                },
                errors: vec![],
            })
        }
        .boxed()
    }
}

/// Refuses every third request.
#[derive(Default)]
struct FlakyInvokerFactory {
    requests: AtomicUsize,
    refusals: AtomicUsize,
}

impl InvokerFactory for FlakyInvokerFactory {
    fn create_search_invoker(
        &self,
        _backend: &Backend,
        _query: &Query,
        _group_id: Option<u32>,
        nodes: &[Arc<Node>],
        _accept_incomplete_coverage: bool,
    ) -> Option<Box<dyn SearchInvoker>> {
        if self.requests.fetch_add(1, Ordering::SeqCst) % 3 == 2 {
            self.refusals.fetch_add(1, Ordering::SeqCst);
            return None;
        }

        Some(Box::new(HitInvoker {
            node: nodes[0].key(),
        }))
    }

    fn create_fill_invoker(
        &self,
        _backend: &Backend,
        _result: &SearchResult,
    ) -> Option<Box<dyn FillInvoker>> {
        None
    }
}

#[derive(Default)]
struct CountingMetrics {
    internal: AtomicUsize,
    external: AtomicUsize,
}

impl DispatchMetrics for CountingMetrics {
    fn record(&self, path: DispatchPath) {
        match path {
            DispatchPath::Internal => self.internal.fetch_add(1, Ordering::SeqCst),
            DispatchPath::External => self.external.fetch_add(1, Ordering::SeqCst),
        };
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn multithread() {
    let config = DispatchConfigBuilder::new()
        .with_distribution_policy(DistributionPolicy::Adaptive)
        .with_nodes((0..4).map(|group| NodeConfig::new(group, group, format!("search{}", group), 1)))
        .build()
        .unwrap();
    let cluster = Arc::new(SearchCluster::new("music", &config, "container", 1));

    let factory = Arc::new(FlakyInvokerFactory::default());
    let metrics = Arc::new(CountingMetrics::default());
    let dispatcher = Arc::new(Dispatcher::new(
        cluster,
        &config,
        factory.clone(),
        metrics.clone(),
    ));

    let mut handles = vec![];
    for _ in 0..QUERIES {
        let dispatcher = Arc::clone(&dispatcher);

        handles.push(tokio::spawn(async move {
            let mut query = Query::new("music");
            match dispatcher.search_invoker(&mut query, &Backend::new("music".into())) {
                DispatchDecision::Internal(mut invoker) => {
                    let result = invoker.search(&query).await;
                    invoker.teardown();
                    result.map(|result| result.hits.len())
                }
                DispatchDecision::External => Ok(0),
                DispatchDecision::IllegalQuery(error) => panic!("{}", error.message()),
            }
        }));
    }

    let mut internal = 0;
    for task in handles {
        if task.await.unwrap().unwrap() == 1 {
            internal += 1;
        }
    }

    let recorded_internal = metrics.internal.load(Ordering::SeqCst);
    let recorded_external = metrics.external.load(Ordering::SeqCst);
    assert_eq!(recorded_internal + recorded_external, QUERIES);
    assert_eq!(recorded_internal, internal);

    let lb = dispatcher.load_balancer();
    let statuses: Vec<_> = (0..4).map(|group| lb.group_status(group).unwrap()).collect();
    assert!(statuses.iter().all(|status| status.allocations() == 0));
    assert_eq!(
        statuses
            .iter()
            .map(|status| status.stats().queries)
            .sum::<u64>(),
        internal as u64
    );
    assert_eq!(
        statuses
            .iter()
            .map(|status| status.stats().failures)
            .sum::<u64>(),
        factory.refusals.load(Ordering::SeqCst) as u64
    );
}

use futures::future::join_all;
use futures::FutureExt;
use itertools::Itertools;
#[cfg(test)]
use mockall::automock;
use std::sync::Arc;
use tracing::*;

use crate::cluster::{Node, SearchCluster};
use crate::error::{ErrorCode, ErrorMessage, Result};
use crate::future::BoxFuture;
use crate::invoker::{
    Backend, Coverage, FillInvoker, InvokerFactory, SearchInvoker, SearchResult,
};
use crate::query::Query;

/// Creates invokers talking to single nodes. Implemented by protocol backends.
#[cfg_attr(test, automock)]
pub trait NodeInvokerFactory {
    /// Creates an invoker for a node, or returns `None` if the node cannot be reached.
    fn create_node_search_invoker(
        &self,
        backend: &Backend,
        query: &Query,
        node: &Arc<Node>,
    ) -> Option<Box<dyn SearchInvoker>>;

    fn create_fill_invoker(
        &self,
        backend: &Backend,
        result: &SearchResult,
    ) -> Option<Box<dyn FillInvoker>>;

    fn release(&self) {}
}

/// An [`InvokerFactory`] fanning a query out to every node of a group. Unreachable nodes are
/// tolerated as long as the remaining ones cover enough of the corpus.
pub struct GroupInvokerFactory<F> {
    search_cluster: Arc<SearchCluster>,
    node_factory: F,
}

impl<F: NodeInvokerFactory> GroupInvokerFactory<F> {
    pub fn new(search_cluster: Arc<SearchCluster>, node_factory: F) -> Self {
        GroupInvokerFactory {
            search_cluster,
            node_factory,
        }
    }
}

impl<F: NodeInvokerFactory> InvokerFactory for GroupInvokerFactory<F> {
    fn create_search_invoker(
        &self,
        backend: &Backend,
        query: &Query,
        group_id: Option<u32>,
        nodes: &[Arc<Node>],
        accept_incomplete_coverage: bool,
    ) -> Option<Box<dyn SearchInvoker>> {
        let mut invokers = Vec::with_capacity(nodes.len());
        let mut reached = Vec::with_capacity(nodes.len());
        let mut failed = vec![];

        for node in nodes {
            let invoker = if node.is_working() {
                self.node_factory
                    .create_node_search_invoker(backend, query, node)
            } else {
                None
            };

            match invoker {
                Some(invoker) => {
                    invokers.push(invoker);
                    reached.push(node.clone());
                }
                None => failed.push(node.clone()),
            }
        }

        let mut report_coverage_error = false;
        if !failed.is_empty()
            && !self
                .search_cluster
                .is_partial_group_coverage_sufficient(group_id, &reached)
        {
            if !accept_incomplete_coverage {
                debug!(
                    ?group_id,
                    failed = failed.len(),
                    "Refusing group with insufficient coverage."
                );
                return None;
            }

            report_coverage_error = true;
        }

        if invokers.len() == 1 && failed.is_empty() {
            return invokers.pop();
        }

        Some(Box::new(GroupSearchInvoker::new(
            invokers,
            failed,
            report_coverage_error,
        )))
    }

    fn create_fill_invoker(
        &self,
        backend: &Backend,
        result: &SearchResult,
    ) -> Option<Box<dyn FillInvoker>> {
        self.node_factory.create_fill_invoker(backend, result)
    }

    fn release(&self) {
        self.node_factory.release();
    }
}

/// Searches a number of nodes concurrently and concatenates their results.
pub struct GroupSearchInvoker {
    invokers: Vec<Box<dyn SearchInvoker>>,
    failed: Vec<Arc<Node>>,
    report_coverage_error: bool,
}

impl GroupSearchInvoker {
    pub fn new(
        invokers: Vec<Box<dyn SearchInvoker>>,
        failed: Vec<Arc<Node>>,
        report_coverage_error: bool,
    ) -> Self {
        GroupSearchInvoker {
            invokers,
            failed,
            report_coverage_error,
        }
    }

    fn coverage_error(&self) -> ErrorMessage {
        ErrorMessage::new(
            ErrorCode::InsufficientCoverage,
            format!(
                "Insufficient coverage, connection failure on nodes with distribution-keys: {}",
                self.failed.iter().map(|node| node.key()).join(", ")
            ),
        )
    }
}

impl SearchInvoker for GroupSearchInvoker {
    fn search<'a>(&'a mut self, query: &'a Query) -> BoxFuture<'a, Result<SearchResult>> {
        async move {
            let responses =
                join_all(self.invokers.iter_mut().map(|invoker| invoker.search(query))).await;

            let mut result = SearchResult {
                coverage: Coverage {
                    nodes: self.failed.len(),
                    ..Default::default()
                },
                ..Default::default()
            };

            for response in responses {
                match response {
                    Ok(response) => {
                        result.hits.extend(response.hits);
                        result.total_hit_count += response.total_hit_count;
                        result.coverage.merge(&response.coverage);
                        result.errors.extend(response.errors);
                    }
                    Err(error) => {
                        warn!(%error, "Node search failed.");
                        result.coverage.nodes += 1;
                        result.errors.push(error.to_error_message());
                    }
                }
            }

            if self.report_coverage_error {
                result.errors.push(self.coverage_error());
            }

            Ok(result)
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::cluster::{DispatchConfigBuilder, Node, NodeConfig, NodeState, SearchCluster};
    use crate::error::ErrorCode;
    use crate::invoker::group_invoker::MockNodeInvokerFactory;
    use crate::invoker::test_support::StubInvoker;
    use crate::invoker::{Backend, GroupInvokerFactory, InvokerFactory};
    use crate::query::Query;

    fn create_cluster(groups: u32, nodes_per_group: u32) -> Arc<SearchCluster> {
        let config = DispatchConfigBuilder::new()
            .with_nodes((0..groups).flat_map(|group| {
                (0..nodes_per_group).map(move |index| {
                    let key = group * nodes_per_group + index;
                    NodeConfig::new(key, group, format!("search{}", key), 19106)
                })
            }))
            .build()
            .unwrap();

        let cluster = Arc::new(SearchCluster::new("test", &config, "container", 1));
        for node in cluster.metadata().nodes() {
            node.set_state(NodeState::Up);
            node.set_active_documents(100);
        }
        cluster.refresh();
        cluster
    }

    fn group_nodes(cluster: &SearchCluster, group: u32) -> Vec<Arc<Node>> {
        cluster.metadata().group(group).unwrap().nodes().to_vec()
    }

    fn node_factory(failing_keys: &'static [u32]) -> MockNodeInvokerFactory {
        let mut factory = MockNodeInvokerFactory::new();
        factory
            .expect_create_node_search_invoker()
            .returning(move |_, _, node| {
                if failing_keys.contains(&node.key()) {
                    None
                } else {
                    Some(Box::new(StubInvoker {
                        node: node.key(),
                        fail: false,
                    }))
                }
            });
        factory
    }

    #[tokio::test]
    async fn should_fan_out_to_all_nodes_of_group() {
        let cluster = create_cluster(2, 3);
        let factory = GroupInvokerFactory::new(cluster.clone(), node_factory(&[]));
        let query = Query::new("foo");

        let mut invoker = factory
            .create_search_invoker(
                &Backend::new("test".into()),
                &query,
                Some(1),
                &group_nodes(&cluster, 1),
                false,
            )
            .unwrap();
        let result = invoker.search(&query).await.unwrap();

        let mut nodes: Vec<_> = result.hits.iter().map(|hit| hit.node).collect();
        nodes.sort_unstable();
        assert_eq!(nodes, vec![3, 4, 5]);
        assert_eq!(result.total_hit_count, 3);
        assert!(result.coverage.is_full());
        assert!(result.errors.is_empty());
    }

    #[test]
    fn should_refuse_group_missing_nodes() {
        let cluster = create_cluster(2, 2);
        let factory = GroupInvokerFactory::new(cluster.clone(), node_factory(&[1]));

        let invoker = factory.create_search_invoker(
            &Backend::new("test".into()),
            &Query::new("foo"),
            Some(0),
            &group_nodes(&cluster, 0),
            false,
        );
        assert!(invoker.is_none());
    }

    #[tokio::test]
    async fn should_report_missing_nodes_when_accepting_incomplete_coverage() {
        let cluster = create_cluster(2, 2);
        let factory = GroupInvokerFactory::new(cluster.clone(), node_factory(&[1]));
        let query = Query::new("foo");

        let mut invoker = factory
            .create_search_invoker(
                &Backend::new("test".into()),
                &query,
                Some(0),
                &group_nodes(&cluster, 0),
                true,
            )
            .unwrap();
        let result = invoker.search(&query).await.unwrap();

        assert_eq!(result.hits.len(), 1);
        assert_eq!(result.coverage.nodes, 2);
        assert_eq!(result.coverage.nodes_answered, 1);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].code(), ErrorCode::InsufficientCoverage);
        assert!(result.errors[0].message().ends_with("distribution-keys: 1"));
    }

    #[tokio::test]
    async fn should_tolerate_allowed_nodes_down_in_single_group() {
        let config = DispatchConfigBuilder::new()
            .with_max_nodes_down_per_group(1)
            .with_nodes((0..3).map(|key| NodeConfig::new(key, 0, format!("search{}", key), 1)))
            .build()
            .unwrap();
        let cluster = Arc::new(SearchCluster::new("test", &config, "container", 1));
        let factory = GroupInvokerFactory::new(cluster.clone(), node_factory(&[2]));
        let query = Query::new("foo");

        let mut invoker = factory
            .create_search_invoker(
                &Backend::new("test".into()),
                &query,
                Some(0),
                &group_nodes(&cluster, 0),
                false,
            )
            .unwrap();
        let result = invoker.search(&query).await.unwrap();

        assert_eq!(result.hits.len(), 2);
        assert!(!result.coverage.is_full());
        assert!(result.errors.is_empty());
    }

    #[test]
    fn should_not_contact_nodes_which_are_down() {
        let cluster = create_cluster(1, 2);
        let nodes = group_nodes(&cluster, 0);
        nodes[1].set_state(NodeState::Down);

        let mut node_factory = MockNodeInvokerFactory::new();
        node_factory
            .expect_create_node_search_invoker()
            .withf(|_, _, node| node.key() == 0)
            .times(1)
            .returning(|_, _, _| {
                Some(Box::new(StubInvoker {
                    node: 0,
                    fail: false,
                }))
            });

        let factory = GroupInvokerFactory::new(cluster, node_factory);
        let invoker = factory.create_search_invoker(
            &Backend::new("test".into()),
            &Query::new("foo"),
            Some(0),
            &nodes,
            true,
        );
        assert!(invoker.is_some());
    }

    #[tokio::test]
    async fn should_collect_node_failures_as_errors() {
        let cluster = create_cluster(1, 2);
        let mut node_factory = MockNodeInvokerFactory::new();
        node_factory
            .expect_create_node_search_invoker()
            .returning(|_, _, node| {
                Some(Box::new(StubInvoker {
                    node: node.key(),
                    fail: node.key() == 1,
                }))
            });

        let factory = GroupInvokerFactory::new(cluster.clone(), node_factory);
        let query = Query::new("foo");
        let mut invoker = factory
            .create_search_invoker(
                &Backend::new("test".into()),
                &query,
                Some(0),
                &group_nodes(&cluster, 0),
                false,
            )
            .unwrap();
        let result = invoker.search(&query).await.unwrap();

        assert_eq!(result.hits.len(), 1);
        assert_eq!(result.coverage.nodes, 2);
        assert_eq!(result.errors[0].code(), ErrorCode::BackendCommunicationError);
    }

    #[test]
    fn should_release_node_factory() {
        let cluster = create_cluster(1, 1);
        let mut node_factory = MockNodeInvokerFactory::new();
        node_factory.expect_release().times(1).return_const(());

        GroupInvokerFactory::new(cluster, node_factory).release();
    }
}

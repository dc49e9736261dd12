use derive_more::Constructor;
use futures::future::join_all;
#[cfg(test)]
use mockall::automock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::*;

use crate::cluster::topology::{Node, NodeState};
use crate::cluster::SearchCluster;
use crate::error::Result;
use crate::future::BoxFuture;

/// Reply to a successful ping.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Constructor)]
pub struct Pong {
    pub active_documents: u64,
}

/// Creates health probes for search nodes. Implemented by the backend protocol in use.
#[cfg_attr(test, automock)]
pub trait PingFactory {
    /// Pings a node. The returned future resolves with the node's document count, or an error if
    /// the node cannot serve queries.
    fn ping(&self, node: &Node) -> BoxFuture<'static, Result<Pong>>;
}

/// Keeps the health view of a [`SearchCluster`] current by periodically pinging all nodes.
pub struct ClusterMonitor {
    search_cluster: Arc<SearchCluster>,
    ping_factory: Arc<dyn PingFactory + Send + Sync>,
    ping_interval: Duration,
}

impl ClusterMonitor {
    pub fn new(
        search_cluster: Arc<SearchCluster>,
        ping_factory: Arc<dyn PingFactory + Send + Sync>,
        ping_interval: Duration,
    ) -> Self {
        ClusterMonitor {
            search_cluster,
            ping_factory,
            ping_interval,
        }
    }

    /// Starts monitoring in the background. Monitoring stops when `true` is sent through the
    /// shutdown channel or the sender is dropped.
    pub fn start(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(self.ping_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => self.ping_iteration().await,
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            debug!(cluster = %self.search_cluster.id(), "Stopping cluster monitor.");
                            break;
                        }
                    }
                }
            }
        })
    }

    /// Pings all nodes once and publishes the resulting coverage.
    pub async fn ping_iteration(&self) {
        let metadata = self.search_cluster.metadata();
        let pings = metadata.nodes().map(|node| {
            let node = node.clone();
            let ping = self.ping_factory.ping(&node);
            async move {
                let result = ping.await;
                (node, result)
            }
        });

        for (node, result) in join_all(pings).await {
            match result {
                Ok(pong) => {
                    if node.state() == NodeState::Down {
                        info!(%node, "Search node is working again.");
                    }

                    node.set_active_documents(pong.active_documents);
                    node.set_state(NodeState::Up);
                }
                Err(error) => {
                    if node.state() != NodeState::Down {
                        warn!(%node, %error, "Search node failed to respond to ping.");
                    }

                    node.set_state(NodeState::Down);
                }
            }
        }

        self.search_cluster.refresh();
    }
}

#[cfg(test)]
mod tests {
    use futures::FutureExt;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::watch;

    use crate::cluster::cluster_monitor::{ClusterMonitor, MockPingFactory, Pong};
    use crate::cluster::topology::NodeState;
    use crate::cluster::{DispatchConfigBuilder, NodeConfig, SearchCluster};
    use crate::error::Error;

    fn create_cluster() -> Arc<SearchCluster> {
        let config = DispatchConfigBuilder::new()
            .with_node(NodeConfig::new(0, 0, "a".into(), 1))
            .with_node(NodeConfig::new(1, 0, "b".into(), 1))
            .with_node(NodeConfig::new(2, 1, "c".into(), 1))
            .with_node(NodeConfig::new(3, 1, "d".into(), 1))
            .build()
            .unwrap();

        Arc::new(SearchCluster::new("test", &config, "container", 1))
    }

    #[tokio::test]
    async fn should_update_coverage_after_ping_round() {
        let cluster = create_cluster();

        let mut ping_factory = MockPingFactory::new();
        ping_factory.expect_ping().times(4).returning(|node| {
            if node.key() == 2 {
                async { Err(Error::Timeout("ping".into())) }.boxed()
            } else {
                async { Ok(Pong::new(1000)) }.boxed()
            }
        });

        let monitor =
            ClusterMonitor::new(cluster.clone(), Arc::new(ping_factory), Duration::from_secs(1));
        monitor.ping_iteration().await;

        let metadata = cluster.metadata();
        assert_eq!(metadata.groups_with_sufficient_coverage(), 1);
        assert!(metadata.group(0).unwrap().has_sufficient_coverage());
        assert!(!metadata.group(1).unwrap().has_sufficient_coverage());

        let states: Vec<_> = metadata.nodes().map(|node| node.state()).collect();
        assert_eq!(
            states,
            vec![NodeState::Up, NodeState::Up, NodeState::Down, NodeState::Up]
        );
        assert_eq!(metadata.group(0).unwrap().active_documents(), 2000);
    }

    #[tokio::test]
    async fn should_stop_on_shutdown() {
        let cluster = create_cluster();

        let mut ping_factory = MockPingFactory::new();
        ping_factory
            .expect_ping()
            .returning(|_| async { Ok(Pong::new(10)) }.boxed());

        let (shutdown_sender, shutdown_receiver) = watch::channel(false);
        let handle = ClusterMonitor::new(cluster, Arc::new(ping_factory), Duration::from_millis(5))
            .start(shutdown_receiver);

        tokio::time::sleep(Duration::from_millis(20)).await;
        shutdown_sender.send(true).unwrap();

        handle.await.unwrap();
    }
}

//! **search-dispatch** decides where and how a search query is sent inside a grouped search
//! cluster.
//!
//! ## Getting started
//!
//! This example configures a cluster of two groups with two nodes each, and dispatches a query
//! using adaptive load balancing.
//!
//! ```no_run
//! use search_dispatch::cluster::{DispatchConfigBuilder, NodeConfig, SearchCluster};
//! use search_dispatch::dispatcher::{Backend, DispatchDecision, Dispatcher};
//! use search_dispatch::invoker::InvokerFactory;
//! use search_dispatch::metrics::CounterDispatchMetrics;
//! use search_dispatch::query::Query;
//! use std::sync::Arc;
//!
//! async fn run(invoker_factory: Arc<dyn InvokerFactory + Send + Sync>) {
//!     let config = DispatchConfigBuilder::new()
//!         .with_node(NodeConfig::new(0, 0, "search-0".into(), 19106))
//!         .with_node(NodeConfig::new(1, 0, "search-1".into(), 19106))
//!         .with_node(NodeConfig::new(2, 1, "search-2".into(), 19106))
//!         .with_node(NodeConfig::new(3, 1, "search-3".into(), 19106))
//!         .build()
//!         .unwrap();
//!     let cluster = Arc::new(SearchCluster::new("music", &config, "container-0", 1));
//!     let dispatcher = Dispatcher::new(
//!         cluster,
//!         &config,
//!         invoker_factory,
//!         Arc::new(CounterDispatchMetrics),
//!     );
//!
//!     let mut query = Query::new("music");
//!     match dispatcher.search_invoker(&mut query, &Backend::new("music".into())) {
//!         DispatchDecision::Internal(mut invoker) => {
//!             let result = invoker.search(&query).await;
//!             invoker.teardown();
//!             println!("{:?}", result.map(|result| result.hits.len()));
//!         }
//!         DispatchDecision::IllegalQuery(error) => println!("{}", error.message()),
//!         DispatchDecision::External => println!("sending through the legacy dispatch tier"),
//!     }
//! }
//! ```
//!
//! ## Groups and load balancing
//!
//! A search cluster is made of groups; every group holds a full copy of the corpus spread over
//! its nodes. The [`Dispatcher`](crate::dispatcher::Dispatcher) asks the
//! [`LoadBalancer`](crate::load_balancing::LoadBalancer) for a group, asks the
//! [`InvokerFactory`](crate::invoker::InvokerFactory) for an invoker bound to that group, and
//! retries a bounded number of times on other groups when the factory refuses. Cluster health is
//! kept current in the background by a [`ClusterMonitor`](crate::cluster::ClusterMonitor).

pub mod cluster;
pub mod dispatcher;
pub mod error;
pub mod future;
pub mod invoker;
pub mod load_balancing;
pub mod metrics;
pub mod query;

pub type Error = error::Error;
pub type Result<T> = error::Result<T>;

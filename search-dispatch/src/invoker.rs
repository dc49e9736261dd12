//! Invocation handles and the factories producing them.
//!
//! An invoker is bound to a set of nodes for one phase of a query: searching, or filling hits of
//! an earlier result. Invokers are created by an [`InvokerFactory`], which decides synchronously
//! whether a set of nodes can serve a query; network I/O only happens once the invoker is used.

mod dispatched;
mod group_invoker;

pub use self::dispatched::{DispatchedInvoker, GroupLease};
pub use self::group_invoker::{GroupInvokerFactory, GroupSearchInvoker, NodeInvokerFactory};

use derive_more::Constructor;
#[cfg(test)]
use mockall::automock;
use std::sync::Arc;

use crate::cluster::Node;
use crate::error::{ErrorMessage, Result};
use crate::future::BoxFuture;
use crate::query::Query;

/// The backend (document database) a query is executed against.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Constructor)]
pub struct Backend {
    pub name: String,
}

/// A single hit returned by a node.
#[derive(Debug, Clone, PartialEq, Constructor)]
pub struct Hit {
    pub global_id: String,
    pub relevance: f64,
    /// Distribution key of the node which produced the hit.
    pub node: u32,
}

/// How much of the corpus answered a query.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Hash)]
pub struct Coverage {
    pub documents: u64,
    pub active_documents: u64,
    /// Nodes which should have answered.
    pub nodes: usize,
    /// Nodes which actually answered.
    pub nodes_answered: usize,
}

impl Coverage {
    #[inline]
    pub fn is_full(&self) -> bool {
        self.nodes == self.nodes_answered
    }

    /// Adds coverage of another part of the cluster.
    pub fn merge(&mut self, other: &Coverage) {
        self.documents += other.documents;
        self.active_documents += other.active_documents;
        self.nodes += other.nodes;
        self.nodes_answered += other.nodes_answered;
    }
}

/// Result of the search phase. Hits are collected as returned by the nodes; ranking and merging
/// happen downstream.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchResult {
    pub hits: Vec<Hit>,
    pub total_hit_count: u64,
    pub coverage: Coverage,
    pub errors: Vec<ErrorMessage>,
}

impl SearchResult {
    pub fn with_error(error: ErrorMessage) -> Self {
        SearchResult {
            errors: vec![error],
            ..Default::default()
        }
    }

    #[inline]
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Executes the search phase of a query.
pub trait SearchInvoker: Send {
    fn search<'a>(&'a mut self, query: &'a Query) -> BoxFuture<'a, Result<SearchResult>>;
}

/// Fetches full content of hits found by an earlier search.
pub trait FillInvoker: Send {
    fn fill<'a>(
        &'a mut self,
        result: &'a mut SearchResult,
        summary_class: &'a str,
    ) -> BoxFuture<'a, Result<()>>;
}

/// Creates invokers for a given backend protocol.
#[cfg_attr(test, automock)]
pub trait InvokerFactory {
    /// Creates a search invoker for given nodes, or returns `None` if the nodes cannot serve the
    /// query. When `accept_incomplete_coverage` is false, the factory must refuse nodes which do
    /// not cover enough of the corpus, so a better group can be tried. Must not block.
    fn create_search_invoker(
        &self,
        backend: &Backend,
        query: &Query,
        group_id: Option<u32>,
        nodes: &[Arc<Node>],
        accept_incomplete_coverage: bool,
    ) -> Option<Box<dyn SearchInvoker>>;

    /// Creates an invoker filling hits of a given result.
    fn create_fill_invoker(
        &self,
        backend: &Backend,
        result: &SearchResult,
    ) -> Option<Box<dyn FillInvoker>>;

    /// Releases resources held by the factory.
    fn release(&self) {}
}

/// An invoker which answers every query with a fixed error, without contacting any node.
#[derive(Debug, Clone, Constructor)]
pub struct ErrorInvoker {
    message: ErrorMessage,
}

impl ErrorInvoker {
    #[inline]
    pub fn message(&self) -> &ErrorMessage {
        &self.message
    }
}

impl SearchInvoker for ErrorInvoker {
    fn search<'a>(&'a mut self, _query: &'a Query) -> BoxFuture<'a, Result<SearchResult>> {
        let result = SearchResult::with_error(self.message.clone());
        Box::pin(async move { Ok(result) })
    }
}

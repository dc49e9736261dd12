use derive_more::Display;
use metrics::counter;
#[cfg(test)]
use mockall::automock;

/// Name of the counter incremented once per dispatch decision.
pub const DISPATCH_PATH_COUNTER: &str = "dispatch_path_total";

/// Path a query took through the dispatcher.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Display)]
pub enum DispatchPath {
    /// Dispatched by this container, directly to search nodes.
    #[display("internal")]
    Internal,
    /// Handed over to the external dispatch tier.
    #[display("external")]
    External,
}

impl DispatchPath {
    #[inline]
    pub fn label(self) -> &'static str {
        match self {
            DispatchPath::Internal => "internal",
            DispatchPath::External => "external",
        }
    }
}

/// Sink for dispatch metrics.
#[cfg_attr(test, automock)]
pub trait DispatchMetrics {
    fn record(&self, path: DispatchPath);
}

/// Reports dispatch decisions to the globally installed `metrics` recorder.
#[derive(Debug, Default, Copy, Clone)]
pub struct CounterDispatchMetrics;

impl DispatchMetrics for CounterDispatchMetrics {
    fn record(&self, path: DispatchPath) {
        counter!(DISPATCH_PATH_COUNTER, "path" => path.label()).increment(1);
    }
}

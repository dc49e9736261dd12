use derive_more::Display;

const DEFAULT_HITS: usize = 10;

/// Trace level at which dispatch decisions are recorded on a query.
pub const DISPATCH_TRACE_LEVEL: u32 = 2;

/// An in-flight search request, as far as dispatching is concerned.
#[derive(Debug, Clone, Display)]
#[display("query '{text}' (hits = {hits}, offset = {offset})")]
pub struct Query {
    text: String,
    search_path: Option<String>,
    dispatch_internal: Option<bool>,
    estimate: bool,
    hits: usize,
    offset: usize,
    trace_level: u32,
    trace: Vec<String>,
}

impl Query {
    pub fn new(text: impl Into<String>) -> Self {
        Query {
            text: text.into(),
            search_path: None,
            dispatch_internal: None,
            estimate: false,
            hits: DEFAULT_HITS,
            offset: 0,
            trace_level: 0,
            trace: vec![],
        }
    }

    /// Routes the query explicitly. See [`SearchPath`](crate::cluster::SearchPath) for syntax.
    pub fn with_search_path(mut self, search_path: impl Into<String>) -> Self {
        self.search_path = Some(search_path.into());
        self
    }

    /// Overrides the configured default of using internal dispatch.
    pub fn with_dispatch_internal(mut self, dispatch_internal: bool) -> Self {
        self.dispatch_internal = Some(dispatch_internal);
        self
    }

    /// Marks the query as only needing a hit count estimate.
    pub fn with_estimate(mut self, estimate: bool) -> Self {
        self.estimate = estimate;
        self
    }

    pub fn with_hits(mut self, hits: usize) -> Self {
        self.hits = hits;
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_trace_level(mut self, trace_level: u32) -> Self {
        self.trace_level = trace_level;
        self
    }

    #[inline]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[inline]
    pub fn search_path(&self) -> Option<&str> {
        self.search_path.as_deref()
    }

    /// Returns whether internal dispatch should be used, falling back to given default when the
    /// query does not say.
    #[inline]
    pub fn dispatch_internal(&self, default: bool) -> bool {
        self.dispatch_internal.unwrap_or(default)
    }

    #[inline]
    pub fn is_estimate(&self) -> bool {
        self.estimate
    }

    #[inline]
    pub fn hits(&self) -> usize {
        self.hits
    }

    #[inline]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Returns collected trace messages.
    #[inline]
    pub fn trace_messages(&self) -> &[String] {
        &self.trace
    }

    /// Records a trace message if the query is traced at `level` or above.
    pub fn trace(&mut self, level: u32, message: impl FnOnce() -> String) {
        if self.trace_level >= level {
            self.trace.push(message());
        }
    }

    pub(crate) fn set_search_path(&mut self, search_path: String) {
        self.search_path = Some(search_path);
    }

    pub(crate) fn set_dispatch_internal(&mut self, dispatch_internal: bool) {
        self.dispatch_internal = Some(dispatch_internal);
    }

    // estimates never need actual hits
    pub(crate) fn disable_hits(&mut self) {
        self.hits = 0;
        self.offset = 0;
    }
}

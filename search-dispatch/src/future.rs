/// An owned dynamically typed [`Future`] used by the invoker and ping seams, which are
/// implemented by protocol-specific code outside this crate.
pub type BoxFuture<'a, T> = futures::future::BoxFuture<'a, T>;

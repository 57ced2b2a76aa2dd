//! The upstream data source consulted on a cache miss.

use std::future::Future;
use std::pin::Pin;

/// A heap-allocated, `Send` future borrowed for `'a`.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The answer an [`Upstream`] gives for a single key.
///
/// `Unavailable` is a normal outcome ("not found" or "not ready yet"), not an
/// error. Transport failures belong in the `Err` side of
/// [`Upstream::try_fetch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fetched<V> {
    /// The upstream produced a value for the key.
    Found(V),
    /// The upstream has nothing for the key right now.
    Unavailable,
}

impl<V> Fetched<V> {
    /// Returns `true` if a value was produced.
    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }

    /// Converts into an `Option`, discarding the distinction's name.
    pub fn into_option(self) -> Option<V> {
        match self {
            Self::Found(value) => Some(value),
            Self::Unavailable => None,
        }
    }
}

impl<V> From<Option<V>> for Fetched<V> {
    fn from(value: Option<V>) -> Self {
        match value {
            Some(value) => Self::Found(value),
            None => Self::Unavailable,
        }
    }
}

/// An external source of values, keyed by string.
///
/// The cache owns nothing about the upstream's lifecycle and never retries its
/// failures. Implementations must be `Send + Sync` because a single upstream is
/// shared by every caller of the cache.
///
/// # Examples
///
/// ```rust,no_run
/// use std::convert::Infallible;
/// use readthru::cache::{BoxFuture, Fetched, Upstream};
///
/// struct Uppercase;
///
/// impl Upstream for Uppercase {
///     type Value = String;
///     type Error = Infallible;
///
///     fn try_fetch<'a>(
///         &'a self,
///         key: &'a str,
///     ) -> BoxFuture<'a, Result<Fetched<String>, Infallible>> {
///         Box::pin(async move { Ok(Fetched::Found(key.to_uppercase())) })
///     }
/// }
/// ```
pub trait Upstream: Send + Sync {
    /// The value type stored by the cache.
    type Value: Send + Sync + 'static;

    /// Transport or I/O failure. "Not found" is never an error.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Attempt to fetch the value for `key`.
    fn try_fetch<'a>(
        &'a self,
        key: &'a str,
    ) -> BoxFuture<'a, Result<Fetched<Self::Value>, Self::Error>>;
}

/// An [`Upstream`] backed by an async closure. Built by [`upstream_fn`].
pub struct FnUpstream<F> {
    f: F,
}

/// Wraps an async closure as an [`Upstream`].
///
/// The closure receives an owned copy of the key so the returned future can be
/// `'static`.
///
/// ```rust,no_run
/// use std::convert::Infallible;
/// use readthru::cache::{Fetched, ReadThroughCache, upstream_fn};
///
/// let cache = ReadThroughCache::new(upstream_fn(|key: String| async move {
///     Ok::<_, Infallible>(Fetched::Found(key.len()))
/// }));
/// ```
pub fn upstream_fn<F, Fut, V, E>(f: F) -> FnUpstream<F>
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Fetched<V>, E>> + Send + 'static,
    V: Send + Sync + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    FnUpstream { f }
}

impl<F, Fut, V, E> Upstream for FnUpstream<F>
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Fetched<V>, E>> + Send + 'static,
    V: Send + Sync + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    type Value = V;
    type Error = E;

    fn try_fetch<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Fetched<V>, E>> {
        Box::pin((self.f)(key.to_owned()))
    }
}

//! The refresh capability: one observation of an external entity per call.

use std::fmt;
use std::future::Future;

use async_trait::async_trait;

use crate::state::StateToken;

/// Boxed error returned by refresh implementations.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result of a single refresh.
///
/// `value` is absent while the entity does not exist yet (or has nothing
/// worth returning); `state` is always present and drives classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation<T> {
    /// The observed entity, if any.
    pub value: Option<T>,
    /// The observed state token.
    pub state: StateToken,
}

impl<T> Observation<T> {
    /// An observation carrying a value.
    pub fn found(value: T, state: impl Into<StateToken>) -> Self {
        Self {
            value: Some(value),
            state: state.into(),
        }
    }

    /// An observation with no value, e.g. a search that matched nothing yet.
    pub fn absent(state: impl Into<StateToken>) -> Self {
        Self {
            value: None,
            state: state.into(),
        }
    }

    /// Map the carried value.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Observation<U> {
        Observation {
            value: self.value.map(f),
            state: self.state,
        }
    }
}

/// Queries the external system once and reports what it saw.
///
/// Implementations must only observe: calling `refresh` repeatedly must not
/// itself advance the watched entity. A returned error is fatal to the wait
/// unless the implementation maps it to a pending observation first; the
/// engine never retries errors on its own.
///
/// The engine calls `refresh` strictly sequentially, so implementations
/// need not be reentrant.
#[async_trait]
pub trait Refresh: Send + Sync {
    /// Entity type handed back on convergence.
    type Output: Send;

    /// Perform one observation.
    async fn refresh(&self) -> Result<Observation<Self::Output>, BoxError>;
}

#[async_trait]
impl<R: Refresh + ?Sized> Refresh for &R {
    type Output = R::Output;

    async fn refresh(&self) -> Result<Observation<Self::Output>, BoxError> {
        (**self).refresh().await
    }
}

#[async_trait]
impl<R: Refresh + ?Sized> Refresh for Box<R> {
    type Output = R::Output;

    async fn refresh(&self) -> Result<Observation<Self::Output>, BoxError> {
        (**self).refresh().await
    }
}

/// Adapter turning a closure into a [`Refresh`].
///
/// Created with [`refresh_fn`]. Anything the closure captures is its
/// explicit state; the futures it returns must own their data, so clone
/// handles into an `async move` block.
#[derive(Clone)]
pub struct RefreshFn<F> {
    f: F,
}

impl<F> fmt::Debug for RefreshFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshFn").finish_non_exhaustive()
    }
}

/// Wrap a closure returning a future of an observation.
///
/// ```rust
/// use converge::{Observation, refresh_fn};
///
/// let refresh = refresh_fn(|| async { Ok(Observation::found(42_u32, "READY")) });
/// # let _ = refresh;
/// ```
pub fn refresh_fn<F, Fut, T>(f: F) -> RefreshFn<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<Observation<T>, BoxError>> + Send + 'static,
    T: Send + 'static,
{
    RefreshFn { f }
}

#[async_trait]
impl<F, Fut, T> Refresh for RefreshFn<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<Observation<T>, BoxError>> + Send + 'static,
    T: Send + 'static,
{
    type Output = T;

    async fn refresh(&self) -> Result<Observation<T>, BoxError> {
        (self.f)().await
    }
}

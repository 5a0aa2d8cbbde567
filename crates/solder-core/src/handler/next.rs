//! The continuation handed to middleware.

use std::fmt;
use std::marker::PhantomData;

use crate::error::TerminalError;
use crate::runtime::Continuation;
use crate::values::{Provided, Returned};

/// The rest of the chain, as seen by a middleware.
///
/// `I` is the tuple of values the middleware injects for downstream handlers
/// and `O` the tuple of values it takes back from downstream returns. Both are
/// declared types: the resolver binds downstream consumers to `I` and checks
/// that something downstream returns every element of `O`.
///
/// [`call`](Self::call) can be awaited zero, one or many times while the
/// middleware runs. Each call re-enters the downstream handlers with an
/// isolated copy of the values produced so far. Once the middleware has
/// returned, the continuation is expired and further calls fail.
///
/// # Example
///
/// ```rust,ignore
/// let retry = try_middleware(|next: Next<(), (Reply,)>| async move {
///     match next.call(()).await {
///         Ok((reply,)) => Ok(reply),
///         Err(_) => next.call(()).await.map(|(reply,)| reply),
///     }
/// });
/// ```
pub struct Next<I, O> {
    continuation: Continuation,
    _marker: PhantomData<fn(I) -> O>,
}

impl<I, O> Next<I, O>
where
    I: Provided,
    O: Returned,
{
    pub(crate) fn new(continuation: Continuation) -> Self {
        Self {
            continuation,
            _marker: PhantomData,
        }
    }

    /// Runs the downstream handlers with `input` injected.
    ///
    /// Returns the requested values, or the [`TerminalError`] that stopped the
    /// downstream handlers. Downstream returns that are not part of `O` are
    /// passed on to the enclosing continuation when the middleware returns.
    pub async fn call(&self, input: I) -> Result<O, TerminalError> {
        let mut returns = self.continuation.run(input.into_values()).await?;
        let output = O::take_from(&mut returns)?;
        self.continuation.keep(returns);
        Ok(output)
    }

    /// Returns `true` while the owning middleware is still running.
    pub fn is_live(&self) -> bool {
        self.continuation.is_live()
    }
}

impl<I, O> Clone for Next<I, O> {
    fn clone(&self) -> Self {
        Self {
            continuation: self.continuation.clone(),
            _marker: PhantomData,
        }
    }
}

impl<I, O> fmt::Debug for Next<I, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Next")
            .field("input", &std::any::type_name::<I>())
            .field("output", &std::any::type_name::<O>())
            .field("live", &self.continuation.is_live())
            .finish()
    }
}

//! Function traits implemented for async closures of every supported arity.
//!
//! Like axum's handler system, the traits are blanket-implemented for
//! `Fn(T1, .., Tn) -> impl Future` with up to 12 parameters. The argument
//! tuple is a type parameter of the trait so that each arity gets its own,
//! non-overlapping implementation.

use std::any::type_name;
use std::future::Future;

use futures::FutureExt;
use futures::future::BoxFuture;

use super::next::Next;
use crate::error::{InvokeError, TerminalError};
use crate::key::{TypeKey, Value};
use crate::values::{Provided, Returned};

// ============================================================================
// HandlerFn
// ============================================================================

/// An async function whose parameters are all looked up by type.
///
/// Implemented for `Fn(T1, .., Tn) -> Fut` where every `Ti` is
/// `Clone + Send + Sync + 'static` and `Fut` is a `Send` future.
pub trait HandlerFn<Args, R>: Clone + Send + Sync + 'static {
    /// The keys of the parameters, in declaration order.
    fn input_keys() -> Vec<TypeKey>;

    /// Calls the function with the looked-up arguments, in declaration order.
    fn call(&self, args: Vec<Value>) -> BoxFuture<'static, Result<R, TerminalError>>;
}

// ============================================================================
// MiddlewareFn
// ============================================================================

/// An async function whose first parameter is the continuation [`Next<I, O>`].
///
/// The remaining parameters are looked up by type exactly like
/// [`HandlerFn`] parameters.
pub trait MiddlewareFn<I, O, Args, R>: Clone + Send + Sync + 'static {
    /// The keys of the parameters after the continuation.
    fn input_keys() -> Vec<TypeKey>;

    /// Calls the function with the continuation and the looked-up arguments.
    fn call(&self, next: Next<I, O>, args: Vec<Value>)
    -> BoxFuture<'static, Result<R, TerminalError>>;
}

/// Clones the argument out of a stored value.
fn take_arg<T: Clone + 'static>(value: Option<Value>) -> Result<T, TerminalError> {
    value
        .as_deref()
        .and_then(|v| v.downcast_ref::<T>())
        .cloned()
        .ok_or_else(|| InvokeError::TypeMismatch(type_name::<T>()).into())
}

macro_rules! impl_handler_fn {
    (
        $($ty:ident),*
    ) => {
        #[allow(non_snake_case, unused_mut, unused_variables)]
        impl<F, Fut, R, $($ty,)*> HandlerFn<($($ty,)*), R> for F
        where
            F: Fn($($ty,)*) -> Fut + Clone + Send + Sync + 'static,
            Fut: Future<Output = R> + Send + 'static,
            R: Send + 'static,
            $( $ty: Clone + Send + Sync + 'static, )*
        {
            fn input_keys() -> Vec<TypeKey> {
                vec![$(TypeKey::of::<$ty>(),)*]
            }

            fn call(&self, args: Vec<Value>) -> BoxFuture<'static, Result<R, TerminalError>> {
                let f = self.clone();
                async move {
                    let mut args = args.into_iter();
                    $(
                        let $ty = take_arg::<$ty>(args.next())?;
                    )*
                    Ok::<R, TerminalError>(f($($ty,)*).await)
                }
                .boxed()
            }
        }

        #[allow(non_snake_case, unused_mut, unused_variables)]
        impl<F, Fut, R, I, O, $($ty,)*> MiddlewareFn<I, O, ($($ty,)*), R> for F
        where
            F: Fn(Next<I, O>, $($ty,)*) -> Fut + Clone + Send + Sync + 'static,
            Fut: Future<Output = R> + Send + 'static,
            R: Send + 'static,
            I: Provided,
            O: Returned,
            $( $ty: Clone + Send + Sync + 'static, )*
        {
            fn input_keys() -> Vec<TypeKey> {
                vec![$(TypeKey::of::<$ty>(),)*]
            }

            fn call(
                &self,
                next: Next<I, O>,
                args: Vec<Value>,
            ) -> BoxFuture<'static, Result<R, TerminalError>> {
                let f = self.clone();
                async move {
                    let mut args = args.into_iter();
                    $(
                        let $ty = take_arg::<$ty>(args.next())?;
                    )*
                    Ok::<R, TerminalError>(f(next, $($ty,)*).await)
                }
                .boxed()
            }
        }
    };
}

impl_handler_fn!();
impl_handler_fn!(T1);
impl_handler_fn!(T1, T2);
impl_handler_fn!(T1, T2, T3);
impl_handler_fn!(T1, T2, T3, T4);
impl_handler_fn!(T1, T2, T3, T4, T5);
impl_handler_fn!(T1, T2, T3, T4, T5, T6);
impl_handler_fn!(T1, T2, T3, T4, T5, T6, T7);
impl_handler_fn!(T1, T2, T3, T4, T5, T6, T7, T8);
impl_handler_fn!(T1, T2, T3, T4, T5, T6, T7, T8, T9);
impl_handler_fn!(T1, T2, T3, T4, T5, T6, T7, T8, T9, T10);
impl_handler_fn!(T1, T2, T3, T4, T5, T6, T7, T8, T9, T10, T11);
impl_handler_fn!(T1, T2, T3, T4, T5, T6, T7, T8, T9, T10, T11, T12);

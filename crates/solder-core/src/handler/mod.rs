//! Handler declarations.
//!
//! A [`Handler`] is a type-erased async function together with the type
//! descriptors the resolver needs: the keys it consumes, the keys it produces
//! and, for middleware, the keys its continuation injects and takes back.
//!
//! Rust cannot inspect a function signature at runtime, so the variant of a
//! handler is chosen by the constructor that declares it:
//!
//! ```rust,ignore
//! // Injector with one output.
//! let load = provide(|| async { Config::default() });
//!
//! // Injector that may short-circuit the chain.
//! let auth = fallible(|req: Request| async move {
//!     check(&req).map_err(TerminalError::new)
//! });
//!
//! // Middleware wrapping everything declared after it.
//! let timing = middleware(|next: Next<(), (Reply,)>| async move {
//!     let started = Instant::now();
//!     let out = next.call(()).await;
//!     log(started.elapsed());
//!     out.map(|(reply,)| reply).unwrap_or_default()
//! });
//!
//! // Terminal handler.
//! let hello = endpoint(|config: Config| async move { Reply(config.greeting) });
//! ```

mod next;
mod traits;

pub use next::Next;
pub use traits::{HandlerFn, MiddlewareFn};

use std::any::{Any, type_name};
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;

use crate::error::TerminalError;
use crate::key::{TypeKey, Value, single};
use crate::runtime::Continuation;
use crate::values::{Provided, Returned};

/// A boxed value travelling upward.
pub(crate) type Boxed = Box<dyn Any + Send>;

/// Erased injector body: arguments in, produced values out.
pub(crate) type ProvideFn =
    Arc<dyn Fn(Vec<Value>) -> BoxFuture<'static, Result<Vec<Value>, TerminalError>> + Send + Sync>;

/// Erased middleware body.
pub(crate) type MiddlewareCallFn = Arc<
    dyn Fn(Continuation, Vec<Value>) -> BoxFuture<'static, Result<Option<Boxed>, TerminalError>>
        + Send
        + Sync,
>;

/// Erased endpoint body.
pub(crate) type EndpointFn =
    Arc<dyn Fn(Vec<Value>) -> BoxFuture<'static, Result<Option<Boxed>, TerminalError>> + Send + Sync>;

/// Erased capability cast.
pub(crate) type CastFn = Arc<dyn Fn(&Value) -> Option<Value> + Send + Sync>;

/// The variant a handler was declared as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    /// Declared with [`provide`] or [`provide_all`].
    Provide,
    /// Declared with [`fallible`].
    Fallible,
    /// Declared with [`middleware`] or [`try_middleware`].
    Middleware,
    /// Declared with [`endpoint`] or [`try_endpoint`].
    Endpoint,
}

impl Kind {
    pub fn is_injector(self) -> bool {
        matches!(self, Kind::Provide | Kind::Fallible)
    }
}

#[derive(Clone)]
pub(crate) enum Body {
    Provide(ProvideFn),
    Middleware(MiddlewareCallFn),
    Endpoint(EndpointFn),
}

/// "Output `from` also satisfies capability `to`."
#[derive(Clone)]
pub(crate) struct Capability {
    pub(crate) from: TypeKey,
    pub(crate) to: TypeKey,
    pub(crate) cast: CastFn,
}

/// A declared handler.
///
/// Cheap to clone; the same declaration may be added to several chains and
/// is bound separately in each.
#[derive(Clone)]
pub struct Handler {
    pub(crate) name: Cow<'static, str>,
    pub(crate) kind: Kind,
    pub(crate) inputs: Vec<TypeKey>,
    /// Produced keys; for middleware, the keys injected through `Next`.
    pub(crate) outputs: Vec<TypeKey>,
    /// Keys a middleware takes back from downstream returns.
    pub(crate) next_outputs: Vec<TypeKey>,
    /// Key a middleware or endpoint returns upward.
    pub(crate) returns: Option<TypeKey>,
    pub(crate) capabilities: Vec<Capability>,
    pub(crate) body: Body,
}

impl Handler {
    /// Sets the name used in diagnostics.
    pub fn named(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.name = name.into();
        self
    }

    /// Declares that the output `T` also satisfies the capability `C`.
    ///
    /// Capabilities are only consulted when no upstream handler produces `C`
    /// exactly. `C` is typically a trait object behind an `Arc`:
    ///
    /// ```rust,ignore
    /// let store = provide(|| async { MemoryStore::default() })
    ///     .capability::<MemoryStore, Arc<dyn Store>>(|s| Arc::new(s.clone()));
    /// ```
    ///
    /// # Panics
    ///
    /// Panics if this handler does not produce `T`.
    pub fn capability<T, C>(mut self, cast: impl Fn(&T) -> C + Send + Sync + 'static) -> Self
    where
        T: 'static,
        C: Send + Sync + 'static,
    {
        let from = TypeKey::of::<T>();
        assert!(
            self.outputs.contains(&from),
            "handler '{}' does not produce `{}`",
            self.name,
            from
        );
        let cast: CastFn = Arc::new(move |value: &Value| {
            (**value)
                .downcast_ref::<T>()
                .map(|v| Arc::new(cast(v)) as Value)
        });
        self.capabilities.push(Capability {
            from,
            to: TypeKey::of::<C>(),
            cast,
        });
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    /// The keys this handler looks up, in parameter order.
    pub fn inputs(&self) -> &[TypeKey] {
        &self.inputs
    }

    /// The keys this handler makes available to downstream handlers.
    pub fn outputs(&self) -> &[TypeKey] {
        &self.outputs
    }

    /// The key this handler returns upward, if any.
    pub fn returns(&self) -> Option<TypeKey> {
        self.returns
    }

    /// The keys a middleware's continuation takes back.
    pub fn continuation_outputs(&self) -> &[TypeKey] {
        &self.next_outputs
    }

    fn new(name: &'static str, kind: Kind, inputs: Vec<TypeKey>, body: Body) -> Self {
        Self {
            name: Cow::Borrowed(name),
            kind,
            inputs,
            outputs: Vec::new(),
            next_outputs: Vec::new(),
            returns: None,
            capabilities: Vec::new(),
            body,
        }
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .field("returns", &self.returns)
            .finish()
    }
}

// ============================================================================
// Constructors
// ============================================================================

fn boxed_return<R: Send + 'static>(value: R) -> Option<Boxed> {
    if TypeKey::of::<R>().is_unit() {
        None
    } else {
        Some(Box::new(value))
    }
}

fn single_value<T: Send + Sync + 'static>(value: T) -> Vec<Value> {
    if TypeKey::of::<T>().is_unit() {
        Vec::new()
    } else {
        vec![Arc::new(value) as Value]
    }
}

/// Declares an injector producing one value of type `T`.
///
/// `T = ()` declares a handler without outputs; such a handler is never
/// pruned.
pub fn provide<F, Args, T>(f: F) -> Handler
where
    F: HandlerFn<Args, T>,
    T: Clone + Send + Sync + 'static,
{
    let call: ProvideFn = Arc::new(move |args: Vec<Value>| {
        let fut = f.call(args);
        async move { fut.await.map(single_value) }.boxed()
    });
    let mut handler = Handler::new(
        type_name::<F>(),
        Kind::Provide,
        F::input_keys(),
        Body::Provide(call),
    );
    handler.outputs = single::<T>();
    handler
}

/// Declares an injector producing every element of the tuple `P`.
pub fn provide_all<F, Args, P>(f: F) -> Handler
where
    F: HandlerFn<Args, P>,
    P: Provided,
{
    let call: ProvideFn = Arc::new(move |args: Vec<Value>| {
        let fut = f.call(args);
        async move { fut.await.map(Provided::into_values) }.boxed()
    });
    let mut handler = Handler::new(
        type_name::<F>(),
        Kind::Provide,
        F::input_keys(),
        Body::Provide(call),
    );
    handler.outputs = P::keys();
    handler
}

/// Declares an injector that may short-circuit the chain.
///
/// Returning `Err` skips every downstream handler; the error surfaces from
/// the nearest enclosing [`Next::call`] or from the invocation itself.
pub fn fallible<F, Args, T>(f: F) -> Handler
where
    F: HandlerFn<Args, Result<T, TerminalError>>,
    T: Clone + Send + Sync + 'static,
{
    let call: ProvideFn = Arc::new(move |args: Vec<Value>| {
        let fut = f.call(args);
        async move { fut.await?.map(single_value) }.boxed()
    });
    let mut handler = Handler::new(
        type_name::<F>(),
        Kind::Fallible,
        F::input_keys(),
        Body::Provide(call),
    );
    handler.outputs = single::<T>();
    handler
}

fn middleware_handler<F, I, O, Args, R>(call: MiddlewareCallFn) -> Handler
where
    F: MiddlewareFn<I, O, Args, R>,
    I: Provided,
    O: Returned,
{
    let mut handler = Handler::new(
        type_name::<F>(),
        Kind::Middleware,
        F::input_keys(),
        Body::Middleware(call),
    );
    handler.outputs = I::keys();
    handler.next_outputs = O::keys();
    handler
}

/// Declares a middleware returning `R` upward.
///
/// The first parameter is the continuation; every handler declared after the
/// middleware runs inside it.
pub fn middleware<F, I, O, Args, R>(f: F) -> Handler
where
    F: MiddlewareFn<I, O, Args, R>,
    I: Provided,
    O: Returned,
    R: Send + 'static,
{
    let call: MiddlewareCallFn = Arc::new(move |continuation: Continuation, args: Vec<Value>| {
        let fut = f.call(Next::new(continuation), args);
        async move { fut.await.map(boxed_return) }.boxed()
    });
    let mut handler = middleware_handler::<F, I, O, Args, R>(call);
    handler.returns = single::<R>().pop();
    handler
}

/// Declares a middleware that can forward a short-circuit with `?`.
pub fn try_middleware<F, I, O, Args, T>(f: F) -> Handler
where
    F: MiddlewareFn<I, O, Args, Result<T, TerminalError>>,
    I: Provided,
    O: Returned,
    T: Send + 'static,
{
    let call: MiddlewareCallFn = Arc::new(move |continuation: Continuation, args: Vec<Value>| {
        let fut = f.call(Next::new(continuation), args);
        async move { fut.await?.map(boxed_return) }.boxed()
    });
    let mut handler = middleware_handler::<F, I, O, Args, Result<T, TerminalError>>(call);
    handler.returns = single::<T>().pop();
    handler
}

/// Declares the terminal handler of a chain, returning `R` upward.
pub fn endpoint<F, Args, R>(f: F) -> Handler
where
    F: HandlerFn<Args, R>,
    R: Send + 'static,
{
    let call: EndpointFn = Arc::new(move |args: Vec<Value>| {
        let fut = f.call(args);
        async move { fut.await.map(boxed_return) }.boxed()
    });
    let mut handler = Handler::new(
        type_name::<F>(),
        Kind::Endpoint,
        F::input_keys(),
        Body::Endpoint(call),
    );
    handler.returns = single::<R>().pop();
    handler
}

/// Declares a terminal handler that may short-circuit.
pub fn try_endpoint<F, Args, T>(f: F) -> Handler
where
    F: HandlerFn<Args, Result<T, TerminalError>>,
    T: Send + 'static,
{
    let call: EndpointFn = Arc::new(move |args: Vec<Value>| {
        let fut = f.call(args);
        async move { fut.await?.map(boxed_return) }.boxed()
    });
    let mut handler = Handler::new(
        type_name::<F>(),
        Kind::Endpoint,
        F::input_keys(),
        Body::Endpoint(call),
    );
    handler.returns = single::<T>().pop();
    handler
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone)]
    struct Token(String);

    #[test]
    fn test_provide_descriptors() {
        let handler = provide(|n: u32| async move { Token(n.to_string()) }).named("token");
        assert_eq!(handler.name(), "token");
        assert_eq!(handler.kind(), Kind::Provide);
        assert_eq!(handler.inputs(), &[TypeKey::of::<u32>()]);
        assert_eq!(handler.outputs(), &[TypeKey::of::<Token>()]);
    }

    #[test]
    fn test_unit_output_is_empty() {
        let handler = provide(|| async {});
        assert!(handler.outputs().is_empty());

        let handler = fallible(|_: u8| async { Ok::<(), TerminalError>(()) });
        assert_eq!(handler.kind(), Kind::Fallible);
        assert!(handler.outputs().is_empty());
    }

    #[test]
    fn test_middleware_descriptors() {
        let handler = try_middleware(|next: Next<(u8,), (String,)>, _: u16| async move {
            let (s,) = next.call((1,)).await?;
            Ok::<_, TerminalError>(s.len())
        });
        assert_eq!(handler.kind(), Kind::Middleware);
        assert_eq!(handler.inputs(), &[TypeKey::of::<u16>()]);
        assert_eq!(handler.outputs(), &[TypeKey::of::<u8>()]);
        assert_eq!(handler.continuation_outputs(), &[TypeKey::of::<String>()]);
        assert_eq!(handler.returns(), Some(TypeKey::of::<usize>()));
    }

    #[tokio::test]
    async fn test_provide_body_produces_value() {
        let handler = provide_all(|n: u32| async move { (n + 1, Token("t".into())) });
        let Body::Provide(call) = &handler.body else {
            panic!("expected an injector body");
        };
        let values = call(vec![Arc::new(41u32) as Value]).await.unwrap();
        assert_eq!(values.len(), 2);
        assert_eq!((*values[0]).downcast_ref::<u32>(), Some(&42));
    }

    #[tokio::test]
    async fn test_wrong_argument_type_is_reported() {
        let handler = provide(|n: u32| async move { n });
        let Body::Provide(call) = &handler.body else {
            panic!("expected an injector body");
        };
        let err = call(vec![Arc::new("nope") as Value]).await.unwrap_err();
        assert!(err.to_string().contains("unexpected type"));
    }
}

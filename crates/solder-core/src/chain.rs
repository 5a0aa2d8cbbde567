//! Chain declaration.

use std::fmt;
use std::sync::Arc;

use crate::error::ResolveResult;
use crate::handler::Handler;
use crate::key::TypeKey;
use crate::resolve::{Plan, resolve};

/// Synthesizes a producer for a type nothing upstream produces.
///
/// Consulted by the resolver at most once per required type and chain, before
/// it gives up with [`ResolveError::MissingProducer`](crate::ResolveError::MissingProducer).
/// The returned handler is inserted right before the first consumer and
/// resolved like any declared handler.
pub trait Generator: Send + Sync {
    /// Returns `None` when this generator does not know `required`.
    fn generate(&self, required: TypeKey) -> Option<ResolveResult<Handler>>;
}

/// An ordered list of handlers plus the types flowing in and out of it.
///
/// ```rust,ignore
/// let plan = Chain::new("GET /users/{id}")
///     .seed::<RawRequest>()
///     .with(provide(load_config))
///     .with(fallible(authenticate))
///     .with(endpoint(show_user))
///     .returns::<Result<User, BoxError>>()
///     .resolve()?;
/// ```
#[derive(Clone)]
pub struct Chain {
    pub(crate) name: String,
    pub(crate) seeds: Vec<TypeKey>,
    pub(crate) handlers: Vec<Handler>,
    pub(crate) returns: Vec<TypeKey>,
    pub(crate) generators: Vec<Arc<dyn Generator>>,
}

impl Chain {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            seeds: Vec::new(),
            handlers: Vec::new(),
            returns: Vec::new(),
            generators: Vec::new(),
        }
    }

    /// Declares a type supplied by the caller of every invocation.
    pub fn seed<T: Clone + Send + Sync + 'static>(mut self) -> Self {
        let key = TypeKey::of::<T>();
        if !self.seeds.contains(&key) {
            self.seeds.push(key);
        }
        self
    }

    /// Appends a handler.
    pub fn with(mut self, handler: Handler) -> Self {
        self.handlers.push(handler);
        self
    }

    /// Appends several handlers, in order.
    pub fn extend(mut self, handlers: impl IntoIterator<Item = Handler>) -> Self {
        self.handlers.extend(handlers);
        self
    }

    /// Declares a type handed back to the caller of every invocation.
    pub fn returns<T: Send + 'static>(mut self) -> Self {
        let key = TypeKey::of::<T>();
        if !key.is_unit() && !self.returns.contains(&key) {
            self.returns.push(key);
        }
        self
    }

    /// Adds a generator for unproduced types.
    pub fn generator(mut self, generator: Arc<dyn Generator>) -> Self {
        self.generators.push(generator);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn handlers(&self) -> &[Handler] {
        &self.handlers
    }

    /// Binds every handler input and classifies every handler.
    pub fn resolve(&self) -> ResolveResult<Plan> {
        resolve(self)
    }
}

impl fmt::Debug for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chain")
            .field("name", &self.name)
            .field("seeds", &self.seeds)
            .field("handlers", &self.handlers)
            .field("returns", &self.returns)
            .field("generators", &self.generators.len())
            .finish()
    }
}

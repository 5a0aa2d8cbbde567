//! Invocation runtime.
//!
//! A resolved [`Plan`](crate::Plan) compiles into a [`Compiled`] pipeline.
//! Every retained handler becomes a [`Stage`] whose inputs are slot indices
//! into a flat store, so looking up an argument never searches.
//!
//! The static stages run once, into the base store shared by every
//! invocation. Each invocation clones the base store, writes the seeds and
//! walks the dynamic stages. A middleware stage hands the rest of the walk to
//! its [`Continuation`], which re-runs it on a fresh copy of the store each
//! time it is called.

use std::borrow::Cow;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::sync::OnceCell;
use tracing::{Instrument, debug, debug_span, info};

use crate::collection::{Returns, ValueCollection};
use crate::error::{InvokeError, TerminalError};
use crate::handler::{Body, CastFn};
use crate::key::{TypeKey, Value};
use crate::values::Returned;

/// Per-invocation values, indexed by slot.
pub(crate) type Store = Vec<Option<Value>>;

// ============================================================================
// Stages
// ============================================================================

/// Where a stage argument is read from.
#[derive(Clone)]
pub(crate) enum Binding {
    Slot { slot: usize, key: TypeKey },
    Cast { slot: usize, key: TypeKey, cast: CastFn },
}

impl Binding {
    fn load(&self, store: &Store) -> Result<Value, InvokeError> {
        match self {
            Binding::Slot { slot, key } => store[*slot]
                .clone()
                .ok_or(InvokeError::MissingValue(key.name())),
            Binding::Cast { slot, key, cast } => store[*slot]
                .as_ref()
                .and_then(|value| cast(value))
                .ok_or(InvokeError::MissingValue(key.name())),
        }
    }
}

/// One compiled handler.
pub(crate) struct Stage {
    pub(crate) name: Cow<'static, str>,
    pub(crate) inputs: Vec<Binding>,
    /// Slots written by an injector, or injected by a middleware continuation.
    pub(crate) outputs: Vec<usize>,
    pub(crate) returns: Option<TypeKey>,
    pub(crate) body: Body,
}

impl Stage {
    fn args(&self, store: &Store) -> Result<Vec<Value>, InvokeError> {
        self.inputs.iter().map(|binding| binding.load(store)).collect()
    }
}

/// Runs an injector stage and stores what it produced.
async fn run_injector(stage: &Stage, store: &mut Store) -> Result<(), TerminalError> {
    let Body::Provide(call) = &stage.body else {
        return Ok(());
    };
    let args = stage.args(store)?;
    let values = call(args).await.inspect_err(|err| {
        debug!(handler = %stage.name, error = %err, "Handler short-circuited");
    })?;
    for (slot, value) in stage.outputs.iter().zip(values) {
        store[*slot] = Some(value);
    }
    Ok(())
}

/// The dynamic stages of a compiled chain.
pub(crate) struct Program {
    pub(crate) stages: Vec<Stage>,
}

impl Program {
    /// Runs the stages from `from` to the end.
    ///
    /// Returns as soon as a middleware or endpoint stage returns, or with the
    /// first terminal error.
    pub(crate) fn run(
        self: Arc<Self>,
        from: usize,
        mut store: Store,
    ) -> BoxFuture<'static, Result<Returns, TerminalError>> {
        async move {
            for index in from..self.stages.len() {
                let stage = &self.stages[index];
                match &stage.body {
                    Body::Provide(_) => run_injector(stage, &mut store).await?,
                    Body::Middleware(call) => {
                        let args = stage.args(&store)?;
                        let continuation = Continuation::new(
                            self.clone(),
                            index + 1,
                            store,
                            stage.outputs.clone(),
                        );
                        let result = call(continuation.clone(), args).await;
                        let mut returns = continuation.expire();
                        let own = result.inspect_err(|err| {
                            debug!(handler = %stage.name, error = %err, "Middleware returned an error");
                        })?;
                        if let (Some(key), Some(value)) = (stage.returns, own) {
                            returns.insert_boxed(key, value);
                        }
                        return Ok(returns);
                    }
                    Body::Endpoint(call) => {
                        let args = stage.args(&store)?;
                        let own = call(args).await.inspect_err(|err| {
                            debug!(handler = %stage.name, error = %err, "Endpoint returned an error");
                        })?;
                        let mut returns = Returns::new();
                        if let (Some(key), Some(value)) = (stage.returns, own) {
                            returns.insert_boxed(key, value);
                        }
                        return Ok(returns);
                    }
                }
            }
            Ok::<_, TerminalError>(Returns::new())
        }
        .boxed()
    }
}

// ============================================================================
// Continuation
// ============================================================================

struct ContinuationInner {
    program: Arc<Program>,
    resume_at: usize,
    store: Store,
    injected: Vec<usize>,
    live: AtomicBool,
    passthrough: Mutex<Returns>,
}

/// The downstream part of a running program, bound to one middleware call.
#[derive(Clone)]
pub(crate) struct Continuation {
    inner: Arc<ContinuationInner>,
}

impl Continuation {
    fn new(program: Arc<Program>, resume_at: usize, store: Store, injected: Vec<usize>) -> Self {
        Self {
            inner: Arc::new(ContinuationInner {
                program,
                resume_at,
                store,
                injected,
                live: AtomicBool::new(true),
                passthrough: Mutex::new(Returns::new()),
            }),
        }
    }

    /// Runs the downstream stages on a copy of the captured store.
    pub(crate) async fn run(&self, values: Vec<Value>) -> Result<Returns, TerminalError> {
        if !self.is_live() {
            return Err(InvokeError::ContinuationExpired.into());
        }
        let mut store = self.inner.store.clone();
        for (slot, value) in self.inner.injected.iter().zip(values) {
            store[*slot] = Some(value);
        }
        self.inner
            .program
            .clone()
            .run(self.inner.resume_at, store)
            .await
    }

    /// Keeps the returns the middleware did not take, replacing those of an
    /// earlier call.
    pub(crate) fn keep(&self, returns: Returns) {
        *self.inner.passthrough.lock() = returns;
    }

    pub(crate) fn is_live(&self) -> bool {
        self.inner.live.load(Ordering::Acquire)
    }

    /// Ends the continuation and hands back the kept returns.
    fn expire(&self) -> Returns {
        self.inner.live.store(false, Ordering::Release);
        std::mem::take(&mut *self.inner.passthrough.lock())
    }
}

// ============================================================================
// Compiled
// ============================================================================

struct CompiledInner {
    chain: String,
    slots: usize,
    seeds: Vec<(TypeKey, usize)>,
    statics: Vec<Stage>,
    program: Arc<Program>,
    started: AtomicBool,
    base: OnceCell<Result<Store, TerminalError>>,
}

/// A compiled chain, ready to be invoked concurrently.
///
/// Cloning is cheap; clones share the static values and the init guard.
#[derive(Clone)]
pub struct Compiled {
    inner: Arc<CompiledInner>,
}

impl Compiled {
    pub(crate) fn new(
        chain: String,
        slots: usize,
        seeds: Vec<(TypeKey, usize)>,
        statics: Vec<Stage>,
        dynamic: Vec<Stage>,
    ) -> Self {
        Self {
            inner: Arc::new(CompiledInner {
                chain,
                slots,
                seeds,
                statics,
                program: Arc::new(Program { stages: dynamic }),
                started: AtomicBool::new(false),
                base: OnceCell::new(),
            }),
        }
    }

    /// The name of the chain this was compiled from.
    pub fn name(&self) -> &str {
        &self.inner.chain
    }

    /// Number of handlers run once by [`init`](Self::init).
    pub fn static_len(&self) -> usize {
        self.inner.statics.len()
    }

    /// Number of handlers run on every invocation.
    pub fn dynamic_len(&self) -> usize {
        self.inner.program.stages.len()
    }

    /// Runs the static handlers.
    ///
    /// Must be called once, after resolution and before serving traffic. An
    /// invocation racing with `init` still runs the static handlers only once.
    ///
    /// # Panics
    ///
    /// Panics when called a second time on the same compiled chain.
    pub async fn init(&self) {
        if self.inner.started.swap(true, Ordering::AcqRel) {
            panic!("chain '{}' was initialised twice", self.inner.chain);
        }
        match self.base().await {
            Ok(_) => info!(
                chain = %self.inner.chain,
                statics = self.inner.statics.len(),
                "Chain initialised"
            ),
            Err(err) => tracing::warn!(
                chain = %self.inner.chain,
                error = %err,
                "Static handler failed; every invocation will return this error"
            ),
        }
    }

    async fn base(&self) -> &Result<Store, TerminalError> {
        self.inner
            .base
            .get_or_init(|| async {
                let mut store: Store = vec![None; self.inner.slots];
                for stage in &self.inner.statics {
                    run_injector(stage, &mut store).await?;
                }
                Ok::<_, TerminalError>(store)
            })
            .await
    }

    /// Runs the chain once with the given seed values.
    ///
    /// Returns the values declared with [`Chain::returns`](crate::Chain::returns),
    /// or the terminal error that stopped the chain.
    pub async fn invoke(&self, seeds: ValueCollection) -> Result<Returns, TerminalError> {
        let span = debug_span!("solder.invoke", chain = %self.inner.chain);
        self.run(seeds).instrument(span).await
    }

    /// Runs the chain and takes the typed root returns.
    pub async fn invoke_as<O: Returned>(&self, seeds: ValueCollection) -> Result<O, TerminalError> {
        let mut returns = self.invoke(seeds).await?;
        Ok(O::take_from(&mut returns)?)
    }

    async fn run(&self, seeds: ValueCollection) -> Result<Returns, TerminalError> {
        let mut store = self.base().await.clone()?;
        for (key, slot) in &self.inner.seeds {
            let value = seeds
                .value(key)
                .ok_or(InvokeError::MissingSeed(key.name()))?;
            store[*slot] = Some(value);
        }
        self.inner.program.clone().run(0, store).await
    }
}

impl std::fmt::Debug for Compiled {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Compiled")
            .field("chain", &self.inner.chain)
            .field("statics", &self.inner.statics.len())
            .field("dynamic", &self.inner.program.stages.len())
            .finish()
    }
}

//! Chain resolution.
//!
//! Resolution runs four passes over the declared handlers:
//!
//! 1. **Bind** (forward): every input is bound to the nearest upstream
//!    producer of the exact type, then to a seed, then to the nearest
//!    capability cast. Types nobody produces are offered to the chain's
//!    generators.
//! 2. **Prune** (backward): injectors whose outputs no retained handler
//!    consumes are dropped. Handlers without outputs, middleware and the
//!    endpoint are always kept.
//! 3. **Classify** (forward): the retained prefix that depends on no seed is
//!    static; everything from the first seed consumer, middleware or endpoint
//!    on is dynamic.
//! 4. **Check returns**: every continuation output must be returned by
//!    something downstream, and every middleware return must be taken by an
//!    enclosing continuation or by the caller.

use std::collections::HashSet;
use std::fmt;

use tracing::debug;

use crate::chain::Chain;
use crate::error::{ResolveError, ResolveResult};
use crate::handler::{Handler, Kind};
use crate::key::TypeKey;
use crate::runtime::{Binding, Compiled, Stage};

/// The resolved role of a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Class {
    /// Runs once per compiled chain.
    StaticInjector,
    /// Runs once per invocation.
    Injector,
    /// Runs once per invocation and may short-circuit.
    FallibleInjector,
    Middleware,
    Endpoint,
}

impl fmt::Display for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            Class::StaticInjector => "StaticInjector",
            Class::Injector => "Injector",
            Class::FallibleInjector => "FallibleInjector",
            Class::Middleware => "Middleware",
            Class::Endpoint => "Endpoint",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    Seed(usize),
    Output {
        node: usize,
        output: usize,
    },
    Cast {
        node: usize,
        output: usize,
        capability: usize,
    },
}

impl Source {
    fn node(self) -> Option<usize> {
        match self {
            Source::Seed(_) => None,
            Source::Output { node, .. } | Source::Cast { node, .. } => Some(node),
        }
    }
}

#[derive(Clone)]
struct Node {
    handler: Handler,
    synthesized: bool,
    bindings: Vec<Source>,
    retained: bool,
    dynamic: bool,
    reason: String,
}

impl Node {
    fn new(handler: Handler, synthesized: bool) -> Self {
        Self {
            handler,
            synthesized,
            bindings: Vec::new(),
            retained: false,
            dynamic: false,
            reason: String::new(),
        }
    }

    fn class(&self) -> Class {
        match self.handler.kind {
            Kind::Endpoint => Class::Endpoint,
            Kind::Middleware => Class::Middleware,
            Kind::Fallible => Class::FallibleInjector,
            Kind::Provide if self.retained && !self.dynamic => Class::StaticInjector,
            Kind::Provide => Class::Injector,
        }
    }
}

// ============================================================================
// Plan
// ============================================================================

/// One handler as seen by the resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanEntry {
    pub name: String,
    pub class: Class,
    pub retained: bool,
    /// Inserted by a generator rather than declared.
    pub synthesized: bool,
    /// Why the handler was kept or pruned.
    pub reason: String,
    /// One line per input: the key and where it is read from.
    pub bindings: Vec<String>,
}

impl fmt::Display for PlanEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:<6} {:<16} '{}' ({})",
            if self.retained { "keep" } else { "prune" },
            self.class,
            self.name,
            self.reason
        )?;
        if self.synthesized {
            f.write_str(" [generated]")?;
        }
        for binding in &self.bindings {
            write!(f, "; {binding}")?;
        }
        Ok(())
    }
}

/// A comparable snapshot of a plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Summary {
    pub chain: String,
    pub entries: Vec<PlanEntry>,
}

impl Summary {
    /// Names of the retained handlers, in execution order.
    pub fn retained(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|e| e.retained)
            .map(|e| e.name.as_str())
            .collect()
    }

    /// Names of the pruned handlers.
    pub fn pruned(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|e| !e.retained)
            .map(|e| e.name.as_str())
            .collect()
    }

    /// Returns the class of the first entry named `name`.
    pub fn class_of(&self, name: &str) -> Option<Class> {
        self.entries.iter().find(|e| e.name == name).map(|e| e.class)
    }
}

/// A resolved chain.
#[derive(Clone)]
pub struct Plan {
    chain: String,
    seeds: Vec<TypeKey>,
    nodes: Vec<Node>,
}

impl Plan {
    pub fn chain(&self) -> &str {
        &self.chain
    }

    /// Every declared or generated handler, in declaration order.
    pub fn entries(&self) -> Vec<PlanEntry> {
        self.nodes
            .iter()
            .map(|node| PlanEntry {
                name: node.handler.name.to_string(),
                class: node.class(),
                retained: node.retained,
                synthesized: node.synthesized,
                reason: node.reason.clone(),
                bindings: node
                    .bindings
                    .iter()
                    .zip(&node.handler.inputs)
                    .map(|(source, key)| self.describe(*source, *key))
                    .collect(),
            })
            .collect()
    }

    pub fn summary(&self) -> Summary {
        Summary {
            chain: self.chain.clone(),
            entries: self.entries(),
        }
    }

    /// Human-readable resolution trace, one line per handler.
    pub fn trace(&self) -> String {
        let mut out = format!("chain '{}'\n", self.chain);
        for entry in self.entries() {
            out.push_str("  ");
            out.push_str(&entry.to_string());
            out.push('\n');
        }
        out
    }

    fn describe(&self, source: Source, key: TypeKey) -> String {
        match source {
            Source::Seed(_) => format!("`{key}` <- seed"),
            Source::Output { node, .. } => {
                format!("`{key}` <- '{}'", self.nodes[node].handler.name)
            }
            Source::Cast { node, .. } => {
                format!("`{key}` <- '{}' (capability)", self.nodes[node].handler.name)
            }
        }
    }

    /// Compiles the retained handlers into slot-indexed stages.
    pub fn compile(&self) -> Compiled {
        let mut slots = 0;
        let mut seeds = Vec::with_capacity(self.seeds.len());
        for key in &self.seeds {
            seeds.push((*key, slots));
            slots += 1;
        }

        let mut output_slots = vec![Vec::new(); self.nodes.len()];
        for (index, node) in self.nodes.iter().enumerate() {
            if !node.retained {
                continue;
            }
            for _ in &node.handler.outputs {
                output_slots[index].push(slots);
                slots += 1;
            }
        }

        let mut statics = Vec::new();
        let mut dynamic = Vec::new();
        for (index, node) in self.nodes.iter().enumerate() {
            if !node.retained {
                continue;
            }
            let inputs = node
                .bindings
                .iter()
                .zip(&node.handler.inputs)
                .map(|(source, key)| match *source {
                    Source::Seed(seed) => Binding::Slot {
                        slot: seeds[seed].1,
                        key: *key,
                    },
                    Source::Output { node, output } => Binding::Slot {
                        slot: output_slots[node][output],
                        key: *key,
                    },
                    Source::Cast {
                        node,
                        output,
                        capability,
                    } => Binding::Cast {
                        slot: output_slots[node][output],
                        key: *key,
                        cast: self.nodes[node].handler.capabilities[capability]
                            .cast
                            .clone(),
                    },
                })
                .collect();
            let stage = Stage {
                name: node.handler.name.clone(),
                inputs,
                outputs: output_slots[index].clone(),
                returns: node.handler.returns,
                body: node.handler.body.clone(),
            };
            if node.dynamic {
                dynamic.push(stage);
            } else {
                statics.push(stage);
            }
        }

        Compiled::new(self.chain.clone(), slots, seeds, statics, dynamic)
    }
}

impl fmt::Debug for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Plan")
            .field("chain", &self.chain)
            .field("entries", &self.entries())
            .finish()
    }
}

// ============================================================================
// Passes
// ============================================================================

pub(crate) fn resolve(chain: &Chain) -> ResolveResult<Plan> {
    check_structure(chain)?;

    let mut nodes: Vec<Node> = chain
        .handlers
        .iter()
        .cloned()
        .map(|handler| Node::new(handler, false))
        .collect();
    bind(chain, &mut nodes)?;
    prune(&mut nodes);
    classify(&mut nodes);
    check_returns(chain, &nodes)?;

    let plan = Plan {
        chain: chain.name.clone(),
        seeds: chain.seeds.clone(),
        nodes,
    };
    for entry in plan.entries() {
        debug!(chain = %plan.chain, "{entry}");
    }
    Ok(plan)
}

fn check_structure(chain: &Chain) -> ResolveResult<()> {
    let Some((last, rest)) = chain.handlers.split_last() else {
        return Err(ResolveError::MissingEndpoint {
            chain: chain.name.clone(),
        });
    };
    if let Some(early) = rest.iter().find(|h| h.kind == Kind::Endpoint) {
        return Err(ResolveError::MisplacedEndpoint {
            chain: chain.name.clone(),
            handler: early.name.to_string(),
        });
    }
    if last.kind != Kind::Endpoint {
        return Err(ResolveError::MissingEndpoint {
            chain: chain.name.clone(),
        });
    }
    Ok(())
}

fn missing(chain: &Chain, required: TypeKey, consumer: &Node) -> ResolveError {
    ResolveError::MissingProducer {
        chain: chain.name.clone(),
        required: required.name(),
        consumer: consumer.handler.name.to_string(),
    }
}

fn bind(chain: &Chain, nodes: &mut Vec<Node>) -> ResolveResult<()> {
    let mut generated = HashSet::new();
    let mut index = 0;
    'nodes: while index < nodes.len() {
        let inputs = nodes[index].handler.inputs.clone();
        let mut bindings = Vec::with_capacity(inputs.len());
        for key in inputs {
            if let Some(source) = lookup(chain, &nodes[..index], key, &nodes[index])? {
                bindings.push(source);
                continue;
            }
            if !generated.insert(key) {
                return Err(missing(chain, key, &nodes[index]));
            }
            let Some(handler) = chain.generators.iter().find_map(|g| g.generate(key)) else {
                return Err(missing(chain, key, &nodes[index]));
            };
            let handler = handler?;
            debug!(
                chain = %chain.name,
                required = %key,
                handler = %handler.name,
                "Generated producer"
            );
            // The generated handler is bound first; the consumer is rebound
            // from scratch once it is in place.
            nodes.insert(index, Node::new(handler, true));
            continue 'nodes;
        }
        nodes[index].bindings = bindings;
        index += 1;
    }
    Ok(())
}

fn lookup(
    chain: &Chain,
    upstream: &[Node],
    key: TypeKey,
    consumer: &Node,
) -> ResolveResult<Option<Source>> {
    let ambiguous = |candidates: Vec<String>| ResolveError::AmbiguousProducer {
        chain: chain.name.clone(),
        required: key.name(),
        consumer: consumer.handler.name.to_string(),
        candidates,
    };

    for (node, producer) in upstream.iter().enumerate().rev() {
        let outputs: Vec<usize> = producer
            .handler
            .outputs
            .iter()
            .enumerate()
            .filter(|(_, k)| **k == key)
            .map(|(output, _)| output)
            .collect();
        match outputs.as_slice() {
            [] => {}
            [output] => {
                return Ok(Some(Source::Output {
                    node,
                    output: *output,
                }));
            }
            _ => {
                let name = &producer.handler.name;
                return Err(ambiguous(
                    outputs.iter().map(|o| format!("{name}#{o}")).collect(),
                ));
            }
        }
    }

    if let Some(seed) = chain.seeds.iter().position(|k| *k == key) {
        return Ok(Some(Source::Seed(seed)));
    }

    for (node, producer) in upstream.iter().enumerate().rev() {
        let capabilities: Vec<usize> = producer
            .handler
            .capabilities
            .iter()
            .enumerate()
            .filter(|(_, c)| c.to == key)
            .map(|(capability, _)| capability)
            .collect();
        match capabilities.as_slice() {
            [] => {}
            [capability] => {
                let from = producer.handler.capabilities[*capability].from;
                let Some(output) = producer.handler.outputs.iter().position(|k| *k == from) else {
                    continue;
                };
                return Ok(Some(Source::Cast {
                    node,
                    output,
                    capability: *capability,
                }));
            }
            _ => {
                let name = &producer.handler.name;
                return Err(ambiguous(
                    capabilities
                        .iter()
                        .map(|c| format!("{name} as `{}`", producer.handler.capabilities[*c].from))
                        .collect(),
                ));
            }
        }
    }

    Ok(None)
}

fn prune(nodes: &mut [Node]) {
    for index in (0..nodes.len()).rev() {
        let (retained, reason) = match nodes[index].handler.kind {
            Kind::Endpoint => (true, "endpoint".to_string()),
            Kind::Middleware => (true, "middleware".to_string()),
            _ if nodes[index].handler.outputs.is_empty() => (true, "no outputs".to_string()),
            _ => match nodes[index + 1..].iter().find(|consumer| {
                consumer.retained
                    && consumer
                        .bindings
                        .iter()
                        .any(|source| source.node() == Some(index))
            }) {
                Some(consumer) => (true, format!("used by '{}'", consumer.handler.name)),
                None => (false, "outputs never required".to_string()),
            },
        };
        nodes[index].retained = retained;
        nodes[index].reason = reason;
    }
}

fn classify(nodes: &mut [Node]) {
    let mut dynamic = false;
    for node in nodes.iter_mut().filter(|node| node.retained) {
        dynamic = dynamic
            || !node.handler.kind.is_injector()
            || node
                .bindings
                .iter()
                .any(|source| matches!(source, Source::Seed(_)));
        node.dynamic = dynamic;
    }
}

fn check_returns(chain: &Chain, nodes: &[Node]) -> ResolveResult<()> {
    let wrappers: Vec<&Handler> = nodes
        .iter()
        .map(|node| &node.handler)
        .filter(|handler| !handler.kind.is_injector())
        .collect();

    let mut consumed = chain.returns.clone();
    for handler in wrappers.iter().filter(|h| h.kind == Kind::Middleware) {
        if let Some(returned) = handler.returns {
            if !consumed.contains(&returned) {
                return Err(ResolveError::UnconsumedReturn {
                    chain: chain.name.clone(),
                    middleware: handler.name.to_string(),
                    returned: returned.name(),
                });
            }
        }
        consumed.extend(handler.next_outputs.iter().copied());
    }

    let mut available: Vec<TypeKey> = Vec::new();
    for handler in wrappers.iter().rev() {
        if handler.kind == Kind::Middleware {
            if let Some(required) = handler
                .next_outputs
                .iter()
                .find(|key| !available.contains(key))
            {
                return Err(ResolveError::MissingReturn {
                    chain: chain.name.clone(),
                    middleware: handler.name.to_string(),
                    required: required.name(),
                });
            }
            available.retain(|key| !handler.next_outputs.contains(key));
        }
        if let Some(returned) = handler.returns {
            if !available.contains(&returned) {
                available.push(returned);
            }
        }
    }

    if let Some(required) = chain.returns.iter().find(|key| !available.contains(key)) {
        return Err(ResolveError::MissingReturn {
            chain: chain.name.clone(),
            middleware: "<caller>".to_string(),
            required: required.name(),
        });
    }
    Ok(())
}

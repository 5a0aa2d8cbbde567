//! Decode target registry and the generator consulted by the resolver.

use std::any::type_name;
use std::fmt;
use std::sync::Arc;

use linkme::distributed_slice;
use solder_core::{Generator, Handler, ResolveResult, TypeKey, fallible};
use tracing::debug;

use super::{BodyDecoder, Decode, FillPlan, json_body};
use crate::request::{RawBody, RawRequest, read_body};
use crate::router::DEFAULT_MAX_BODY_BYTES;

type GenerateFn = fn(&BodyDecoder, bool) -> ResolveResult<Option<Handler>>;

/// A decode target known to the generator.
///
/// `#[derive(Decode)]` registers one per struct in [`DECODE_TARGETS`];
/// [`DecodeGenerator::register`] adds one explicitly.
#[derive(Clone, Copy)]
pub struct DecodeEntry {
    name: fn() -> &'static str,
    key: fn() -> TypeKey,
    shared_key: fn() -> TypeKey,
    generate: GenerateFn,
}

fn key_of<T: 'static>() -> TypeKey {
    TypeKey::of::<T>()
}

impl DecodeEntry {
    pub const fn of<T: Decode>() -> Self {
        Self {
            name: type_name::<T>,
            key: key_of::<T>,
            shared_key: key_of::<Arc<T>>,
            generate: generate::<T>,
        }
    }

    pub fn name(&self) -> &'static str {
        (self.name)()
    }

    /// Whether this entry produces `required`, and in which form.
    fn matches(&self, required: TypeKey) -> Option<bool> {
        if (self.key)() == required {
            Some(false)
        } else if (self.shared_key)() == required {
            Some(true)
        } else {
            None
        }
    }
}

impl fmt::Debug for DecodeEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("DecodeEntry").field(&self.name()).finish()
    }
}

/// Registry of `#[derive(Decode)]` structs.
#[distributed_slice]
pub static DECODE_TARGETS: [DecodeEntry];

fn generate<T: Decode>(body_decoder: &BodyDecoder, shared: bool) -> ResolveResult<Option<Handler>> {
    let plan = Arc::new(FillPlan::<T>::build(body_decoder.clone())?);
    if plan.is_empty() {
        return Ok(None);
    }

    let handler = match (plan.needs_body(), shared) {
        (false, false) => fallible(move |request: RawRequest| {
            let plan = plan.clone();
            async move { plan.decode(&request, None) }
        }),
        (true, false) => fallible(move |request: RawRequest, body: RawBody| {
            let plan = plan.clone();
            async move { plan.decode(&request, Some(&body)) }
        }),
        (false, true) => fallible(move |request: RawRequest| {
            let plan = plan.clone();
            async move { plan.decode(&request, None).map(Arc::new) }
        }),
        (true, true) => fallible(move |request: RawRequest, body: RawBody| {
            let plan = plan.clone();
            async move { plan.decode(&request, Some(&body)).map(Arc::new) }
        }),
    };

    let name = if shared {
        format!("decode Arc<{}>", type_name::<T>())
    } else {
        format!("decode {}", type_name::<T>())
    };
    Ok(Some(handler.named(name)))
}

/// Synthesizes producers for [`Decode`] structs and for [`RawBody`].
///
/// A required `T` or `Arc<T>` is matched against explicitly registered
/// targets first, then against [`DECODE_TARGETS`]. A required [`RawBody`] is
/// answered with [`read_body`], so the body reader lands right before its
/// first consumer.
#[derive(Clone)]
pub struct DecodeGenerator {
    body_decoder: BodyDecoder,
    body_limit: usize,
    entries: Vec<DecodeEntry>,
}

impl DecodeGenerator {
    pub fn new() -> Self {
        Self {
            body_decoder: json_body(),
            body_limit: DEFAULT_MAX_BODY_BYTES,
            entries: Vec::new(),
        }
    }

    /// Replaces the JSON body decoder used for `model` fields.
    pub fn body_decoder(mut self, decoder: BodyDecoder) -> Self {
        self.body_decoder = decoder;
        self
    }

    /// Body size limit of the synthesized [`read_body`].
    pub fn body_limit(mut self, limit: usize) -> Self {
        self.body_limit = limit;
        self
    }

    /// Registers a target that is not in [`DECODE_TARGETS`], such as a
    /// struct with a hand-written [`Decode`] impl.
    pub fn register<T: Decode>(mut self) -> Self {
        self.entries.push(DecodeEntry::of::<T>());
        self
    }

    fn find(&self, required: TypeKey) -> Option<(&DecodeEntry, bool)> {
        self.entries
            .iter()
            .chain(DECODE_TARGETS.iter())
            .find_map(|entry| entry.matches(required).map(|shared| (entry, shared)))
    }
}

impl Default for DecodeGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl Generator for DecodeGenerator {
    fn generate(&self, required: TypeKey) -> Option<ResolveResult<Handler>> {
        if required == TypeKey::of::<RawBody>() {
            return Some(Ok(read_body(self.body_limit)));
        }
        let (entry, shared) = self.find(required)?;
        debug!(target_type = entry.name(), shared, "Synthesizing decoder");
        (entry.generate)(&self.body_decoder, shared).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::Field;
    use solder_core::Kind;

    #[derive(Debug, Clone, Default)]
    struct Lookup {
        id: u32,
    }

    impl Decode for Lookup {
        fn fields() -> Vec<Field<Self>> {
            vec![Field::scalar("id", "path", |t: &mut Self, v: u32| t.id = v)]
        }
    }

    #[derive(Debug, Clone, Default)]
    struct Bare;

    impl Decode for Bare {
        fn fields() -> Vec<Field<Self>> {
            Vec::new()
        }
    }

    #[test]
    fn test_generates_value_and_shared_forms() {
        let generator = DecodeGenerator::new().register::<Lookup>();

        let handler = generator
            .generate(TypeKey::of::<Lookup>())
            .unwrap()
            .unwrap();
        assert_eq!(handler.kind(), Kind::Fallible);
        assert_eq!(handler.inputs(), &[TypeKey::of::<RawRequest>()]);
        assert_eq!(handler.outputs(), &[TypeKey::of::<Lookup>()]);

        let handler = generator
            .generate(TypeKey::of::<Arc<Lookup>>())
            .unwrap()
            .unwrap();
        assert_eq!(handler.outputs(), &[TypeKey::of::<Arc<Lookup>>()]);
    }

    #[test]
    fn test_raw_body_is_read_on_demand() {
        let generator = DecodeGenerator::new().body_limit(16);
        let handler = generator
            .generate(TypeKey::of::<RawBody>())
            .unwrap()
            .unwrap();
        assert_eq!(handler.name(), "read_body");
        assert_eq!(handler.kind(), Kind::Fallible);
        assert_eq!(handler.inputs(), &[TypeKey::of::<RawRequest>()]);
    }

    #[test]
    fn test_unknown_and_unannotated_types() {
        let generator = DecodeGenerator::new().register::<Bare>();
        assert!(generator.generate(TypeKey::of::<u32>()).is_none());
        assert!(generator.generate(TypeKey::of::<Bare>()).is_none());
    }
}

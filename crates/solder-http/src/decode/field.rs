//! Field descriptors produced by `#[derive(Decode)]`.

use std::str::FromStr;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use solder_core::BoxError;

/// A struct that can be filled from a request.
///
/// Implemented by `#[derive(Decode)]`. Fields without a descriptor keep their
/// `Default` value.
pub trait Decode: Default + Clone + Send + Sync + 'static {
    /// One descriptor per annotated field, flattened structs included.
    fn fields() -> Vec<Field<Self>>;
}

type TextSetter<T> = Arc<dyn Fn(&mut T, &str) -> Result<(), BoxError> + Send + Sync>;
type MultiSetter<T> = Arc<dyn Fn(&mut T, &[&str]) -> Result<(), BoxError> + Send + Sync>;
type ModelSetter<T> =
    Arc<dyn Fn(&mut T, serde_json::Value) -> Result<(), BoxError> + Send + Sync>;

pub(crate) enum Setter<T> {
    /// One text value, parsed with `FromStr`.
    Scalar { required: bool, set: TextSetter<T> },
    /// Every text value of a repeated header or query parameter.
    Multi(MultiSetter<T>),
    /// The deserialized body.
    Model(ModelSetter<T>),
}

impl<T> Clone for Setter<T> {
    fn clone(&self) -> Self {
        match self {
            Setter::Scalar { required, set } => Setter::Scalar {
                required: *required,
                set: set.clone(),
            },
            Setter::Multi(set) => Setter::Multi(set.clone()),
            Setter::Model(set) => Setter::Model(set.clone()),
        }
    }
}

impl<T> Setter<T> {
    pub(crate) fn shape(&self) -> &'static str {
        match self {
            Setter::Scalar { required: true, .. } => "scalar",
            Setter::Scalar { required: false, .. } => "optional",
            Setter::Multi(_) => "multi-value",
            Setter::Model(_) => "model",
        }
    }
}

/// How one field of `T` is filled.
pub struct Field<T> {
    pub(crate) name: &'static str,
    pub(crate) tag: &'static str,
    pub(crate) setter: Setter<T>,
}

impl<T> Clone for Field<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            tag: self.tag,
            setter: self.setter.clone(),
        }
    }
}

fn parse<V>(text: &str) -> Result<V, BoxError>
where
    V: FromStr,
    V::Err: Into<BoxError>,
{
    text.parse::<V>().map_err(Into::into)
}

impl<T: 'static> Field<T> {
    /// The Rust field name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The annotation, as written.
    pub fn tag(&self) -> &'static str {
        self.tag
    }

    /// A required text field.
    pub fn scalar<V>(
        name: &'static str,
        tag: &'static str,
        set: impl Fn(&mut T, V) + Send + Sync + 'static,
    ) -> Self
    where
        V: FromStr + 'static,
        V::Err: Into<BoxError>,
    {
        Self::text(name, tag, true, set)
    }

    /// An optional text field; `set` is only called when a value is present.
    pub fn optional<V>(
        name: &'static str,
        tag: &'static str,
        set: impl Fn(&mut T, V) + Send + Sync + 'static,
    ) -> Self
    where
        V: FromStr + 'static,
        V::Err: Into<BoxError>,
    {
        Self::text(name, tag, false, set)
    }

    fn text<V>(
        name: &'static str,
        tag: &'static str,
        required: bool,
        set: impl Fn(&mut T, V) + Send + Sync + 'static,
    ) -> Self
    where
        V: FromStr + 'static,
        V::Err: Into<BoxError>,
    {
        let set: TextSetter<T> = Arc::new(move |target: &mut T, text: &str| {
            set(target, parse::<V>(text)?);
            Ok(())
        });
        Self {
            name,
            tag,
            setter: Setter::Scalar { required, set },
        }
    }

    /// A field receiving every value of a repeated header or query
    /// parameter.
    pub fn multi<V>(
        name: &'static str,
        tag: &'static str,
        set: impl Fn(&mut T, Vec<V>) + Send + Sync + 'static,
    ) -> Self
    where
        V: FromStr + 'static,
        V::Err: Into<BoxError>,
    {
        let set: MultiSetter<T> = Arc::new(move |target: &mut T, texts: &[&str]| {
            let values = texts
                .iter()
                .map(|text| parse::<V>(text))
                .collect::<Result<Vec<V>, BoxError>>()?;
            set(target, values);
            Ok(())
        });
        Self {
            name,
            tag,
            setter: Setter::Multi(set),
        }
    }

    /// A field deserialized from the request body.
    pub fn model<V>(
        name: &'static str,
        tag: &'static str,
        set: impl Fn(&mut T, V) + Send + Sync + 'static,
    ) -> Self
    where
        V: DeserializeOwned + 'static,
    {
        let set: ModelSetter<T> = Arc::new(move |target: &mut T, body: serde_json::Value| {
            set(target, serde_json::from_value::<V>(body)?);
            Ok(())
        });
        Self {
            name,
            tag,
            setter: Setter::Model(set),
        }
    }

    /// The fields of a nested [`Decode`] struct, reached through `project`.
    pub fn flatten<U: Decode>(project: fn(&mut T) -> &mut U) -> Vec<Self> {
        U::fields()
            .into_iter()
            .map(|field| field.lift(project))
            .collect()
    }

    fn lift<S: 'static>(self, project: fn(&mut S) -> &mut T) -> Field<S> {
        let setter = match self.setter {
            Setter::Scalar { required, set } => Setter::Scalar {
                required,
                set: Arc::new(move |target: &mut S, text: &str| set(project(target), text)),
            },
            Setter::Multi(set) => Setter::Multi(Arc::new(move |target: &mut S, texts: &[&str]| {
                set(project(target), texts)
            })),
            Setter::Model(set) => {
                Setter::Model(Arc::new(move |target: &mut S, body: serde_json::Value| {
                    set(project(target), body)
                }))
            }
        };
        Field {
            name: self.name,
            tag: self.tag,
            setter,
        }
    }
}

//! Tuple-shaped value sets.
//!
//! [`Provided`] describes a tuple of values pushed *downstream* (the outputs
//! of [`provide_all`](crate::provide_all) or the inputs of a
//! [`Next`](crate::Next)). [`Returned`] describes a tuple of values pulled back
//! *upward* from downstream returns.

use std::sync::Arc;

use crate::collection::Returns;
use crate::error::InvokeError;
use crate::key::{TypeKey, Value};

/// A tuple of values that can be stored as separate type slots.
pub trait Provided: Send + 'static {
    /// The slot keys, in tuple order.
    fn keys() -> Vec<TypeKey>;

    /// Splits the tuple into stored values, in tuple order.
    fn into_values(self) -> Vec<Value>;
}

/// A tuple of values that can be taken out of downstream [`Returns`].
pub trait Returned: Sized + Send + 'static {
    /// The requested keys, in tuple order.
    fn keys() -> Vec<TypeKey>;

    /// Takes every requested value out of `returns`.
    fn take_from(returns: &mut Returns) -> Result<Self, InvokeError>;
}

macro_rules! impl_values {
    (
        $($ty:ident),*
    ) => {
        #[allow(non_snake_case, unused_variables)]
        impl<$($ty,)*> Provided for ($($ty,)*)
        where
            $( $ty: Clone + Send + Sync + 'static, )*
        {
            fn keys() -> Vec<TypeKey> {
                vec![$(TypeKey::of::<$ty>(),)*]
            }

            fn into_values(self) -> Vec<Value> {
                let ($($ty,)*) = self;
                vec![$(Arc::new($ty) as Value,)*]
            }
        }

        #[allow(non_snake_case, unused_variables)]
        impl<$($ty,)*> Returned for ($($ty,)*)
        where
            $( $ty: Send + 'static, )*
        {
            fn keys() -> Vec<TypeKey> {
                vec![$(TypeKey::of::<$ty>(),)*]
            }

            fn take_from(returns: &mut Returns) -> Result<Self, InvokeError> {
                Ok(($(
                    returns
                        .take::<$ty>()
                        .ok_or(InvokeError::MissingReturn(std::any::type_name::<$ty>()))?,
                )*))
            }
        }
    };
}

impl_values!();
impl_values!(T1);
impl_values!(T1, T2);
impl_values!(T1, T2, T3);
impl_values!(T1, T2, T3, T4);
impl_values!(T1, T2, T3, T4, T5);
impl_values!(T1, T2, T3, T4, T5, T6);
impl_values!(T1, T2, T3, T4, T5, T6, T7);
impl_values!(T1, T2, T3, T4, T5, T6, T7, T8);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tuple_keys_follow_declaration_order() {
        assert_eq!(
            <(u8, String) as Provided>::keys(),
            vec![TypeKey::of::<u8>(), TypeKey::of::<String>()]
        );
        assert!(<() as Provided>::keys().is_empty());
    }

    #[test]
    fn test_take_from_reports_missing_value() {
        let mut returns = Returns::new();
        returns.insert(3u8);
        assert!(matches!(
            <(u8, String)>::take_from(&mut returns),
            Err(InvokeError::MissingReturn(_))
        ));
    }
}

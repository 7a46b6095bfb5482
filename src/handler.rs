//! Text hooks for [`Properties`](crate::Properties).
//!
//! A [`Stringify`] decides how a field reads from and renders to the text a
//! user types. A [`PropertyHandler`] takes over the string edits of a field
//! entirely: set, add, remove and clear.

use crate::reflect::{Reflect, Typed};
use crate::validator::Veto;
use std::marker::PhantomData;
use thiserror::Error;

/// Converts a field value to and from user text.
pub trait Stringify<V>: Send + Sync + 'static {
    fn to_text(&self, value: &V) -> String;

    /// `None` when `text` does not describe a value.
    fn from_text(&self, text: &str) -> Option<V>;
}

/// Why a [`PropertyHandler`] refused an edit.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HandlerError {
    #[error(transparent)]
    Veto(#[from] Veto),

    #[error("operation not supported")]
    Unsupported,
}

/// Custom string edits for one field. Each method returns the new field
/// value, which still passes the field's validator before it is stored.
///
/// Only `set` is required; the collection edits are refused unless
/// overridden.
pub trait PropertyHandler<V>: Send + Sync + 'static {
    fn set(&self, current: &V, text: &str) -> Result<V, HandlerError>;

    fn add(&self, _current: &V, _text: &str) -> Result<V, HandlerError> {
        Err(HandlerError::Unsupported)
    }

    fn remove(&self, _current: &V, _text: &str) -> Result<V, HandlerError> {
        Err(HandlerError::Unsupported)
    }

    fn clear(&self, _current: &V) -> Result<V, HandlerError> {
        Err(HandlerError::Unsupported)
    }
}

/// A string edit requested through [`Properties`](crate::Properties).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edit<'t> {
    Set(&'t str),
    Add(&'t str),
    Remove(&'t str),
    Clear,
}

impl Edit<'_> {
    pub fn name(&self) -> &'static str {
        match self {
            Edit::Set(_) => "set",
            Edit::Add(_) => "add",
            Edit::Remove(_) => "remove",
            Edit::Clear => "clear",
        }
    }
}

/// Type-erased form stored on a field descriptor.
pub trait ErasedHandler: Send + Sync {
    fn apply(&self, edit: Edit<'_>, current: &dyn Reflect) -> Result<Box<dyn Reflect>, HandlerError>;
}

pub trait ErasedStringifier: Send + Sync {
    /// `None` when `value` is not of the stringified type.
    fn to_text(&self, value: &dyn Reflect) -> Option<String>;

    fn from_text(&self, text: &str) -> Option<Box<dyn Reflect>>;
}

pub(crate) struct TypedHandler<V, H> {
    inner: H,
    _value: PhantomData<fn(V) -> V>,
}

impl<V, H> TypedHandler<V, H> {
    pub(crate) fn new(inner: H) -> Self {
        Self {
            inner,
            _value: PhantomData,
        }
    }
}

impl<V: Typed, H: PropertyHandler<V>> ErasedHandler for TypedHandler<V, H> {
    fn apply(&self, edit: Edit<'_>, current: &dyn Reflect) -> Result<Box<dyn Reflect>, HandlerError> {
        let Some(current) = current.downcast_ref::<V>() else {
            return Err(Veto::new(format!(
                "current value is not a `{}`",
                std::any::type_name::<V>()
            ))
            .into());
        };
        let next = match edit {
            Edit::Set(text) => self.inner.set(current, text),
            Edit::Add(text) => self.inner.add(current, text),
            Edit::Remove(text) => self.inner.remove(current, text),
            Edit::Clear => self.inner.clear(current),
        }?;
        Ok(Box::new(next))
    }
}

pub(crate) struct TypedStringifier<V, S> {
    inner: S,
    _value: PhantomData<fn(V) -> V>,
}

impl<V, S> TypedStringifier<V, S> {
    pub(crate) fn new(inner: S) -> Self {
        Self {
            inner,
            _value: PhantomData,
        }
    }
}

impl<V: Typed, S: Stringify<V>> ErasedStringifier for TypedStringifier<V, S> {
    fn to_text(&self, value: &dyn Reflect) -> Option<String> {
        value.downcast_ref::<V>().map(|value| self.inner.to_text(value))
    }

    fn from_text(&self, text: &str) -> Option<Box<dyn Reflect>> {
        self.inner
            .from_text(text)
            .map(|value| Box::new(value) as Box<dyn Reflect>)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Hex;

    impl Stringify<u32> for Hex {
        fn to_text(&self, value: &u32) -> String {
            format!("{value:#x}")
        }

        fn from_text(&self, text: &str) -> Option<u32> {
            u32::from_str_radix(text.trim().trim_start_matches("0x"), 16).ok()
        }
    }

    struct Csv;

    impl PropertyHandler<Vec<String>> for Csv {
        fn set(&self, _current: &Vec<String>, text: &str) -> Result<Vec<String>, HandlerError> {
            Ok(text.split(',').map(|part| part.trim().to_string()).collect())
        }
    }

    #[test]
    fn test_stringifier_round_trip() {
        let erased = TypedStringifier::<u32, _>::new(Hex);
        assert_eq!(erased.to_text(&255u32).as_deref(), Some("0xff"));
        assert_eq!(erased.to_text(&"255".to_string()), None);

        let parsed = erased.from_text("0x1f").unwrap();
        assert_eq!(parsed.downcast_ref::<u32>(), Some(&31));
        assert!(erased.from_text("zz").is_none());
    }

    #[test]
    fn test_handler_defaults_refuse_collection_edits() {
        let erased = TypedHandler::<Vec<String>, _>::new(Csv);
        let current = vec!["a".to_string()];

        let set = erased.apply(Edit::Set("x, y"), &current).unwrap();
        assert_eq!(
            set.downcast_ref::<Vec<String>>().unwrap(),
            &vec!["x".to_string(), "y".to_string()]
        );
        assert_eq!(erased.apply(Edit::Add("z"), &current).unwrap_err(), HandlerError::Unsupported);
        assert_eq!(erased.apply(Edit::Clear, &current).unwrap_err(), HandlerError::Unsupported);
        assert!(matches!(
            erased.apply(Edit::Set("x"), &5u8).unwrap_err(),
            HandlerError::Veto(_)
        ));
    }
}

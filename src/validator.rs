use crate::reflect::{Reflect, Typed};
use std::marker::PhantomData;
use thiserror::Error;

/// A rejected change, carrying the reason shown to whoever attempted it.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{reason}")]
pub struct Veto {
    pub reason: String,
    /// Lookup key for a localized message, when the caller translates.
    pub message_key: Option<String>,
}

impl Veto {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            message_key: None,
        }
    }

    pub fn with_key(message_key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            message_key: Some(message_key.into()),
        }
    }
}

/// Decides whether a field may change from `old` to `new`.
///
/// The returned value is the one stored, so a validator may normalize the
/// input or fall back to `old` instead of vetoing.
pub trait Validate<V>: Send + Sync + 'static {
    fn validate(&self, new: V, old: &V) -> Result<V, Veto>;
}

impl<V, F> Validate<V> for F
where
    F: Fn(V, &V) -> Result<V, Veto> + Send + Sync + 'static,
{
    fn validate(&self, new: V, old: &V) -> Result<V, Veto> {
        self(new, old)
    }
}

/// Type-erased form stored on a field descriptor.
pub trait ErasedValidator: Send + Sync {
    fn validate(&self, new: Box<dyn Reflect>, old: &dyn Reflect) -> Result<Box<dyn Reflect>, Veto>;
}

pub(crate) struct TypedValidator<V, Vd> {
    inner: Vd,
    _value: PhantomData<fn(V) -> V>,
}

impl<V, Vd> TypedValidator<V, Vd> {
    pub(crate) fn new(inner: Vd) -> Self {
        Self {
            inner,
            _value: PhantomData,
        }
    }
}

impl<V: Typed, Vd: Validate<V>> ErasedValidator for TypedValidator<V, Vd> {
    fn validate(&self, new: Box<dyn Reflect>, old: &dyn Reflect) -> Result<Box<dyn Reflect>, Veto> {
        let Some(old) = old.downcast_ref::<V>() else {
            return Err(Veto::new(format!(
                "current value is not a `{}`",
                std::any::type_name::<V>()
            )));
        };
        let new = new.take::<V>().map_err(|found| {
            Veto::new(format!(
                "expected a `{}`, got a `{}`",
                std::any::type_name::<V>(),
                found.reflect_info().path()
            ))
        })?;
        self.inner
            .validate(new, old)
            .map(|accepted| Box::new(accepted) as Box<dyn Reflect>)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct MinLength;

    impl Validate<String> for MinLength {
        fn validate(&self, new: String, old: &String) -> Result<String, Veto> {
            if new.len() < 4 {
                Ok(old.clone())
            } else {
                Ok(new)
            }
        }
    }

    #[test]
    fn test_validator_may_keep_old_value() {
        let erased = TypedValidator::<String, _>::new(MinLength);
        let old = "steve".to_string();

        let kept = erased.validate(Box::new("ab".to_string()), &old).unwrap();
        assert_eq!(kept.downcast_ref::<String>().unwrap(), "steve");

        let taken = erased.validate(Box::new("alex".to_string()), &old).unwrap();
        assert_eq!(taken.downcast_ref::<String>().unwrap(), "alex");
    }

    #[test]
    fn test_closure_validator_veto() {
        let positive = |new: i32, _old: &i32| {
            if new > 0 {
                Ok(new)
            } else {
                Err(Veto::with_key("error.positive", "must be positive"))
            }
        };
        let erased = TypedValidator::<i32, _>::new(positive);

        let veto = erased.validate(Box::new(-1i32), &5i32).unwrap_err();
        assert_eq!(veto.reason, "must be positive");
        assert_eq!(veto.message_key.as_deref(), Some("error.positive"));
    }

    #[test]
    fn test_wrong_type_is_vetoed() {
        let erased = TypedValidator::<i32, _>::new(|new: i32, _: &i32| -> Result<i32, Veto> { Ok(new) });
        assert!(erased.validate(Box::new("x".to_string()), &1i32).is_err());
    }
}

use crate::converter::Converter;
use crate::error::ConfError;
use crate::handler::{ErasedHandler, ErasedStringifier};
use crate::reflect::{Reflect, TypeInfo, Typed};
use crate::schema::Schema;
use crate::validator::ErasedValidator;
use std::any::Any;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

/// A field value read through an [`Accessor`]: borrowed from a stored field,
/// or computed on demand for virtual fields.
pub enum FieldRef<'a> {
    Borrowed(&'a dyn Reflect),
    Owned(Box<dyn Reflect>),
}

impl Deref for FieldRef<'_> {
    type Target = dyn Reflect;

    fn deref(&self) -> &Self::Target {
        match self {
            FieldRef::Borrowed(value) => *value,
            FieldRef::Owned(value) => &**value,
        }
    }
}

impl fmt::Debug for FieldRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}

/// Reads and writes one field of an erased owner value.
pub trait Accessor: Send + Sync {
    fn get<'a>(&self, owner: &'a dyn Any) -> Option<FieldRef<'a>>;

    /// `None` for computed fields, which have no storage to borrow.
    fn get_mut<'a>(&self, owner: &'a mut dyn Any) -> Option<&'a mut dyn Reflect>;

    fn set(&self, owner: &mut dyn Any, value: Box<dyn Reflect>) -> Result<(), ConfError>;
}

fn owner_mismatch<T>() -> ConfError {
    ConfError::mismatch(std::any::type_name::<T>(), "a different owner type")
}

fn take_value<V: Typed>(value: Box<dyn Reflect>) -> Result<V, ConfError> {
    value
        .take::<V>()
        .map_err(|found| ConfError::mismatch(std::any::type_name::<V>(), found.reflect_info().path()))
}

/// A stored field, reached through plain projection functions.
pub struct FieldAccessor<T, V> {
    get: fn(&T) -> &V,
    get_mut: fn(&mut T) -> &mut V,
}

impl<T, V> FieldAccessor<T, V> {
    pub fn new(get: fn(&T) -> &V, get_mut: fn(&mut T) -> &mut V) -> Self {
        Self { get, get_mut }
    }
}

impl<T: Any + Send + Sync, V: Typed> Accessor for FieldAccessor<T, V> {
    fn get<'a>(&self, owner: &'a dyn Any) -> Option<FieldRef<'a>> {
        let owner = owner.downcast_ref::<T>()?;
        Some(FieldRef::Borrowed((self.get)(owner)))
    }

    fn get_mut<'a>(&self, owner: &'a mut dyn Any) -> Option<&'a mut dyn Reflect> {
        let owner = owner.downcast_mut::<T>()?;
        Some((self.get_mut)(owner))
    }

    fn set(&self, owner: &mut dyn Any, value: Box<dyn Reflect>) -> Result<(), ConfError> {
        let value = take_value::<V>(value)?;
        let Some(owner) = owner.downcast_mut::<T>() else {
            return Err(owner_mismatch::<T>());
        };
        *(self.get_mut)(owner) = value;
        Ok(())
    }
}

/// A computed field backed by a getter and a setter.
pub struct VirtualAccessor<T, V> {
    get: fn(&T) -> V,
    set: fn(&mut T, V),
}

impl<T, V> VirtualAccessor<T, V> {
    pub fn new(get: fn(&T) -> V, set: fn(&mut T, V)) -> Self {
        Self { get, set }
    }
}

impl<T: Any + Send + Sync, V: Typed> Accessor for VirtualAccessor<T, V> {
    fn get<'a>(&self, owner: &'a dyn Any) -> Option<FieldRef<'a>> {
        let owner = owner.downcast_ref::<T>()?;
        Some(FieldRef::Owned(Box::new((self.get)(owner))))
    }

    fn get_mut<'a>(&self, _owner: &'a mut dyn Any) -> Option<&'a mut dyn Reflect> {
        None
    }

    fn set(&self, owner: &mut dyn Any, value: Box<dyn Reflect>) -> Result<(), ConfError> {
        let value = take_value::<V>(value)?;
        let Some(owner) = owner.downcast_mut::<T>() else {
            return Err(owner_mismatch::<T>());
        };
        (self.set)(owner, value);
        Ok(())
    }
}

/// Reaches a parent's field through the child's embedded parent value.
pub(crate) struct ParentAccessor {
    pub(crate) outer: Arc<dyn Accessor>,
    pub(crate) inner: Arc<dyn Accessor>,
}

impl Accessor for ParentAccessor {
    fn get<'a>(&self, owner: &'a dyn Any) -> Option<FieldRef<'a>> {
        match self.outer.get(owner)? {
            FieldRef::Borrowed(parent) => self.inner.get(parent.as_any()),
            FieldRef::Owned(parent) => self
                .inner
                .get(parent.as_any())
                .map(|value| FieldRef::Owned(value.clone_value())),
        }
    }

    fn get_mut<'a>(&self, owner: &'a mut dyn Any) -> Option<&'a mut dyn Reflect> {
        let parent = self.outer.get_mut(owner)?;
        self.inner.get_mut(parent.as_any_mut())
    }

    fn set(&self, owner: &mut dyn Any, value: Box<dyn Reflect>) -> Result<(), ConfError> {
        let parent = self
            .outer
            .get_mut(owner)
            .ok_or_else(|| ConfError::mismatch("an embedded parent", "a computed value"))?;
        self.inner.set(parent.as_any_mut(), value)
    }
}

/// Everything the engine knows about one serializable member of a type.
pub struct FieldDescriptor {
    pub(crate) name: String,
    pub(crate) key: String,
    pub(crate) ty: TypeInfo,
    pub(crate) element: Option<TypeInfo>,
    pub(crate) default: Option<Box<dyn Reflect>>,
    pub(crate) comments: Vec<String>,
    pub(crate) description: Option<String>,
    pub(crate) validator: Option<Arc<dyn ErasedValidator>>,
    pub(crate) converter: Option<Arc<dyn Converter>>,
    pub(crate) handler: Option<Arc<dyn ErasedHandler>>,
    pub(crate) stringifier: Option<Arc<dyn ErasedStringifier>>,
    pub(crate) accessor: Arc<dyn Accessor>,
    pub(crate) nested: Option<Arc<Schema>>,
    pub(crate) transient: bool,
    pub(crate) immutable: bool,
    pub(crate) is_virtual: bool,
    pub(crate) inherited: bool,
}

impl FieldDescriptor {
    /// The declared member name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The external key, which is the name unless renamed.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn ty(&self) -> TypeInfo {
        self.ty
    }

    /// Element type for sequences and sets, value type for maps.
    pub fn element(&self) -> Option<TypeInfo> {
        self.element
    }

    pub fn default_value(&self) -> Option<&dyn Reflect> {
        self.default.as_deref()
    }

    pub fn comments(&self) -> &[String] {
        &self.comments
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn has_validator(&self) -> bool {
        self.validator.is_some()
    }

    pub fn converter(&self) -> Option<&Arc<dyn Converter>> {
        self.converter.as_ref()
    }

    pub fn handler(&self) -> Option<&Arc<dyn ErasedHandler>> {
        self.handler.as_ref()
    }

    pub fn stringifier(&self) -> Option<&Arc<dyn ErasedStringifier>> {
        self.stringifier.as_ref()
    }

    /// Schema of the compound type this field holds, seen through `Option`
    /// and `Box`.
    pub fn nested(&self) -> Option<&Arc<Schema>> {
        self.nested.as_ref()
    }

    pub fn is_transient(&self) -> bool {
        self.transient
    }

    pub fn is_immutable(&self) -> bool {
        self.immutable
    }

    pub fn is_virtual(&self) -> bool {
        self.is_virtual
    }

    /// Whether the field was spliced in from a parent type.
    pub fn is_inherited(&self) -> bool {
        self.inherited
    }

    pub fn get<'a>(&self, owner: &'a dyn Reflect) -> Option<FieldRef<'a>> {
        self.accessor.get(owner.as_any())
    }

    pub fn get_mut<'a>(&self, owner: &'a mut dyn Reflect) -> Option<&'a mut dyn Reflect> {
        self.accessor.get_mut(owner.as_any_mut())
    }

    pub fn set(&self, owner: &mut dyn Reflect, value: Box<dyn Reflect>) -> Result<(), ConfError> {
        self.accessor.set(owner.as_any_mut(), value)
    }

    /// Runs the field's validator on a proposed change and returns the value
    /// to store.
    pub fn validate(
        &self,
        new: Box<dyn Reflect>,
        old: &dyn Reflect,
    ) -> Result<Box<dyn Reflect>, ConfError> {
        let Some(validator) = &self.validator else {
            return Ok(new);
        };
        validator.validate(new, old).map_err(|veto| {
            log::debug!("change to `{}` vetoed: {}", self.key, veto.reason);
            ConfError::PropertyVeto {
                field: self.key.clone(),
                reason: veto.reason,
                message_key: veto.message_key,
            }
        })
    }
}

impl fmt::Debug for FieldDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDescriptor")
            .field("name", &self.name)
            .field("key", &self.key)
            .field("ty", &self.ty)
            .field("element", &self.element)
            .field("default", &self.default)
            .field("comments", &self.comments)
            .field("transient", &self.transient)
            .field("immutable", &self.immutable)
            .field("is_virtual", &self.is_virtual)
            .field("inherited", &self.inherited)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Default)]
    struct Player {
        name: String,
    }

    #[test]
    fn test_field_accessor_roundtrip() {
        let accessor = FieldAccessor::<Player, String>::new(|p| &p.name, |p| &mut p.name);
        let mut player = Player::default();

        accessor.set(&mut player, Box::new("alex".to_string())).unwrap();
        let value = accessor.get(&player).unwrap();
        assert_eq!(value.downcast_ref::<String>().unwrap(), "alex");

        let err = accessor.set(&mut player, Box::new(3i32)).unwrap_err();
        assert!(matches!(err, ConfError::TypeMismatch { .. }));
    }

    #[test]
    fn test_virtual_accessor_has_no_storage() {
        let accessor = VirtualAccessor::<Player, usize>::new(
            |p| p.name.len(),
            |p, len| p.name = "x".repeat(len),
        );
        let mut player = Player::default();

        accessor.set(&mut player, Box::new(3usize)).unwrap();
        assert_eq!(player.name, "xxx");
        assert!(matches!(accessor.get(&player), Some(FieldRef::Owned(_))));
        assert!(accessor.get_mut(&mut player).is_none());
    }
}

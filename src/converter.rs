//! Converters between live values and [`Node`] trees.
//!
//! Every structural family has a built-in converter. A [`ConverterSet`]
//! layers exact-type and family overrides on top of a parent set; lookups
//! fall through to the parent and finally to the built-ins.

use crate::engine::Codec;
use crate::error::ConfError;
use crate::field::FieldDescriptor;
use crate::node::{Node, Scalar, TYPE_TAG_KEY};
use crate::reflect::{Dynamic, Reflect, ReflectRef, TypeInfo, TypeKind, Typed};
use indexmap::IndexMap;
use log::{debug, trace};
use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Converts values of some type to and from [`Node`]s.
pub trait Converter: Send + Sync + 'static {
    fn serialize(&self, value: &dyn Reflect, cx: &Codec<'_>) -> Result<Node, ConfError>;

    /// Builds a new value of type `info` from `node`.
    fn deserialize(
        &self,
        node: &Node,
        info: TypeInfo,
        cx: &Codec<'_>,
    ) -> Result<Box<dyn Reflect>, ConfError>;

    /// Reads `node` into an existing value. Converters that can merge
    /// override this; by default the value is replaced.
    fn deserialize_into(
        &self,
        node: &Node,
        target: &mut dyn Reflect,
        cx: &Codec<'_>,
    ) -> Result<(), ConfError> {
        let info = target.reflect_info();
        let value = self.deserialize(node, info, cx)?;
        target
            .apply(value)
            .map_err(|found| ConfError::mismatch(info.path(), found.reflect_info().path()))
    }
}

/// Structural families, each with a built-in converter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    Scalar,
    Sequence,
    Set,
    Map,
    Enum,
    Optional,
    Boxed,
    Compound,
    Dynamic,
}

impl Family {
    pub const ALL: [Family; 9] = [
        Family::Scalar,
        Family::Sequence,
        Family::Set,
        Family::Map,
        Family::Enum,
        Family::Optional,
        Family::Boxed,
        Family::Compound,
        Family::Dynamic,
    ];

    pub fn of(info: &TypeInfo) -> Self {
        match info.kind() {
            TypeKind::Scalar(_) => Family::Scalar,
            TypeKind::Sequence(_) => Family::Sequence,
            TypeKind::Set(_) => Family::Set,
            TypeKind::Map(_) => Family::Map,
            TypeKind::Enum(_) => Family::Enum,
            TypeKind::Optional(_) => Family::Optional,
            TypeKind::Boxed(_) => Family::Boxed,
            TypeKind::Compound(_) => Family::Compound,
            TypeKind::Dynamic => Family::Dynamic,
        }
    }

    /// The converter used when no set overrides this family.
    pub fn builtin(self) -> Arc<dyn Converter> {
        match self {
            Family::Scalar => Arc::new(ScalarConverter),
            Family::Sequence | Family::Set => Arc::new(SequenceConverter),
            Family::Map => Arc::new(MapConverter),
            Family::Enum => Arc::new(EnumConverter),
            Family::Optional | Family::Boxed => Arc::new(WrapperConverter),
            Family::Compound => Arc::new(SchemaConverter),
            Family::Dynamic => Arc::new(DynamicConverter),
        }
    }
}

/// An immutable set of converter overrides with an optional parent.
#[derive(Default)]
pub struct ConverterSet {
    parent: Option<Arc<ConverterSet>>,
    exact: HashMap<TypeId, Arc<dyn Converter>>,
    families: HashMap<Family, Arc<dyn Converter>>,
}

impl ConverterSet {
    /// The root set holding the built-in converter of every family.
    pub fn defaults() -> Arc<Self> {
        let families = Family::ALL
            .iter()
            .map(|family| (*family, family.builtin()))
            .collect();
        Arc::new(Self {
            parent: None,
            exact: HashMap::new(),
            families,
        })
    }

    /// Starts a set whose entries shadow those of `parent`.
    pub fn layer(parent: &Arc<ConverterSet>) -> ConverterSetBuilder {
        ConverterSetBuilder {
            set: ConverterSet {
                parent: Some(Arc::clone(parent)),
                ..Default::default()
            },
        }
    }

    pub fn exact(&self, id: TypeId) -> Option<Arc<dyn Converter>> {
        match self.exact.get(&id) {
            Some(converter) => Some(Arc::clone(converter)),
            None => self.parent.as_ref()?.exact(id),
        }
    }

    pub fn family(&self, family: Family) -> Option<Arc<dyn Converter>> {
        match self.families.get(&family) {
            Some(converter) => Some(Arc::clone(converter)),
            None => self.parent.as_ref()?.family(family),
        }
    }

    /// Number of sets in the chain, this one included.
    pub fn depth(&self) -> usize {
        1 + self.parent.as_ref().map_or(0, |parent| parent.depth())
    }
}

impl fmt::Debug for ConverterSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConverterSet")
            .field("exact", &self.exact.len())
            .field("families", &self.families.keys().collect::<Vec<_>>())
            .field("depth", &self.depth())
            .finish()
    }
}

pub struct ConverterSetBuilder {
    set: ConverterSet,
}

impl ConverterSetBuilder {
    /// Converts values of exactly `T` with `converter`.
    pub fn exact<T: Typed>(mut self, converter: impl Converter) -> Self {
        self.set
            .exact
            .insert(TypeId::of::<T>(), Arc::new(converter));
        self
    }

    pub fn family(mut self, family: Family, converter: impl Converter) -> Self {
        self.set.families.insert(family, Arc::new(converter));
        self
    }

    pub fn build(self) -> Arc<ConverterSet> {
        Arc::new(self.set)
    }
}

fn malformed(info: &TypeInfo, expected: &'static str, node: &Node) -> ConfError {
    ConfError::malformed(info.path(), expected, node.kind_name())
}

fn unexpected_value(info: &TypeInfo, expected: &str) -> ConfError {
    ConfError::mismatch(expected, info.path())
}

/// Scalars map one-to-one onto [`Scalar`] nodes.
#[derive(Debug, Default, Clone, Copy)]
pub struct ScalarConverter;

impl Converter for ScalarConverter {
    fn serialize(&self, value: &dyn Reflect, _cx: &Codec<'_>) -> Result<Node, ConfError> {
        match value.reflect_ref() {
            ReflectRef::Scalar(scalar) => Ok(Node::Scalar(scalar)),
            _ => Err(unexpected_value(&value.reflect_info(), "a scalar")),
        }
    }

    fn deserialize(
        &self,
        node: &Node,
        info: TypeInfo,
        _cx: &Codec<'_>,
    ) -> Result<Box<dyn Reflect>, ConfError> {
        let TypeKind::Scalar(scalar_info) = info.kind() else {
            return Err(unexpected_value(&info, "a scalar type"));
        };
        let Node::Scalar(scalar) = node else {
            return Err(malformed(&info, "scalar", node));
        };
        (scalar_info.from_scalar)(scalar).ok_or_else(|| ConfError::invalid(info.path(), scalar.to_text()))
    }
}

/// Sequences and sets, element by element with the element type declared.
#[derive(Debug, Default, Clone, Copy)]
pub struct SequenceConverter;

impl Converter for SequenceConverter {
    fn serialize(&self, value: &dyn Reflect, cx: &Codec<'_>) -> Result<Node, ConfError> {
        let info = value.reflect_info();
        let items = match value.reflect_ref() {
            ReflectRef::Sequence(items) | ReflectRef::Set(items) => items,
            _ => return Err(unexpected_value(&info, "a sequence")),
        };
        let element = info.element();
        items
            .into_iter()
            .map(|item| cx.serialize_as(item, element))
            .collect::<Result<Vec<_>, _>>()
            .map(Node::Sequence)
    }

    fn deserialize(
        &self,
        node: &Node,
        info: TypeInfo,
        cx: &Codec<'_>,
    ) -> Result<Box<dyn Reflect>, ConfError> {
        let (TypeKind::Sequence(collection) | TypeKind::Set(collection)) = info.kind() else {
            return Err(unexpected_value(&info, "a sequence type"));
        };
        let Node::Sequence(nodes) = node else {
            return Err(malformed(&info, "sequence", node));
        };
        let element = (collection.element)();
        let items = nodes
            .iter()
            .map(|item| cx.deserialize(item, element))
            .collect::<Result<Vec<_>, _>>()?;
        (collection.collect)(items).ok_or_else(|| unexpected_value(&info, element.path()))
    }
}

/// String-keyed maps; keys go through the key type's text form.
#[derive(Debug, Default, Clone, Copy)]
pub struct MapConverter;

impl Converter for MapConverter {
    fn serialize(&self, value: &dyn Reflect, cx: &Codec<'_>) -> Result<Node, ConfError> {
        let info = value.reflect_info();
        let ReflectRef::Map(entries) = value.reflect_ref() else {
            return Err(unexpected_value(&info, "a map"));
        };
        let element = info.element();
        let mut map = IndexMap::with_capacity(entries.len());
        for (key, item) in entries {
            map.insert(key, cx.serialize_as(item, element)?);
        }
        Ok(Node::Mapping(map))
    }

    fn deserialize(
        &self,
        node: &Node,
        info: TypeInfo,
        cx: &Codec<'_>,
    ) -> Result<Box<dyn Reflect>, ConfError> {
        let TypeKind::Map(map_info) = info.kind() else {
            return Err(unexpected_value(&info, "a map type"));
        };
        let Node::Mapping(nodes) = node else {
            return Err(malformed(&info, "mapping", node));
        };
        let element = (map_info.value)();
        let mut entries = Vec::with_capacity(nodes.len());
        for (key, item) in nodes {
            if key != TYPE_TAG_KEY {
                entries.push((key.clone(), cx.deserialize(item, element)?));
            }
        }
        (map_info.collect)(entries).map_err(|key| ConfError::invalid(info.path(), key))
    }
}

/// Enum-likes are stored by variant name.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnumConverter;

impl Converter for EnumConverter {
    fn serialize(&self, value: &dyn Reflect, _cx: &Codec<'_>) -> Result<Node, ConfError> {
        match value.reflect_ref() {
            ReflectRef::Variant(name) => Ok(Node::from(name)),
            _ => Err(unexpected_value(&value.reflect_info(), "an enum")),
        }
    }

    fn deserialize(
        &self,
        node: &Node,
        info: TypeInfo,
        _cx: &Codec<'_>,
    ) -> Result<Box<dyn Reflect>, ConfError> {
        let TypeKind::Enum(enum_info) = info.kind() else {
            return Err(unexpected_value(&info, "an enum type"));
        };
        let Some(name) = node.as_scalar().and_then(Scalar::as_str) else {
            return Err(malformed(&info, "string", node));
        };
        (enum_info.from_name)(name).ok_or_else(|| ConfError::invalid(info.path(), name))
    }
}

/// `Option` and `Box` are transparent: `None` is a null node, anything else
/// is the inner value's node.
#[derive(Debug, Default, Clone, Copy)]
pub struct WrapperConverter;

impl Converter for WrapperConverter {
    fn serialize(&self, value: &dyn Reflect, cx: &Codec<'_>) -> Result<Node, ConfError> {
        let info = value.reflect_info();
        let (TypeKind::Optional(wrapper) | TypeKind::Boxed(wrapper)) = info.kind() else {
            return Err(unexpected_value(&info, "an option or box"));
        };
        match value.reflect_ref() {
            ReflectRef::Optional(None) => Ok(Node::null()),
            ReflectRef::Optional(Some(inner)) | ReflectRef::Boxed(inner) => {
                cx.serialize_as(inner, Some((wrapper.inner)()))
            }
            _ => Err(unexpected_value(&info, "an option or box")),
        }
    }

    fn deserialize(
        &self,
        node: &Node,
        info: TypeInfo,
        cx: &Codec<'_>,
    ) -> Result<Box<dyn Reflect>, ConfError> {
        let (optional, wrapper) = match info.kind() {
            TypeKind::Optional(wrapper) => (true, wrapper),
            TypeKind::Boxed(wrapper) => (false, wrapper),
            _ => return Err(unexpected_value(&info, "an option or box type")),
        };
        let inner = if optional && node.is_null() {
            None
        } else {
            Some(cx.deserialize(node, (wrapper.inner)())?)
        };
        (wrapper.wrap)(inner).ok_or_else(|| unexpected_value(&info, (wrapper.inner)().path()))
    }

    fn deserialize_into(
        &self,
        node: &Node,
        target: &mut dyn Reflect,
        cx: &Codec<'_>,
    ) -> Result<(), ConfError> {
        if !node.is_null() {
            if let Some(inner) = target.inner_mut() {
                return cx.deserialize_into(node, inner);
            }
        }
        let info = target.reflect_info();
        let value = self.deserialize(node, info, cx)?;
        target
            .apply(value)
            .map_err(|found| ConfError::mismatch(info.path(), found.reflect_info().path()))
    }
}

/// Values of runtime type. Tagged mappings become their registered type;
/// everything else becomes the closest untyped container.
#[derive(Debug, Default, Clone, Copy)]
pub struct DynamicConverter;

impl DynamicConverter {
    fn decode(node: &Node, cx: &Codec<'_>) -> Result<Box<dyn Reflect>, ConfError> {
        let value: Box<dyn Reflect> = match node {
            Node::Scalar(Scalar::Bool(b)) => Box::new(*b),
            Node::Scalar(Scalar::Int(i)) => Box::new(*i),
            Node::Scalar(Scalar::Float(f)) => Box::new(*f),
            Node::Scalar(Scalar::String(s)) => Box::new(s.clone()),
            Node::Scalar(Scalar::Null) => Box::new(()),
            Node::Sequence(items) => {
                let items = items
                    .iter()
                    .map(|item| Self::decode(item, cx).map(Dynamic))
                    .collect::<Result<Vec<_>, _>>()?;
                Box::new(items)
            }
            Node::Mapping(_) if node.type_tag().is_some() => cx.deserialize_untyped(node)?,
            Node::Mapping(entries) => {
                let mut map = IndexMap::with_capacity(entries.len());
                for (key, item) in entries {
                    map.insert(key.clone(), Dynamic(Self::decode(item, cx)?));
                }
                Box::new(map)
            }
        };
        Ok(value)
    }
}

impl Converter for DynamicConverter {
    fn serialize(&self, value: &dyn Reflect, cx: &Codec<'_>) -> Result<Node, ConfError> {
        match value.reflect_ref() {
            ReflectRef::Dynamic(inner) => cx.serialize_as(inner, None),
            _ => Err(unexpected_value(&value.reflect_info(), "a dynamic value")),
        }
    }

    fn deserialize(
        &self,
        node: &Node,
        _info: TypeInfo,
        cx: &Codec<'_>,
    ) -> Result<Box<dyn Reflect>, ConfError> {
        Ok(Box::new(Dynamic(Self::decode(node, cx)?)))
    }
}

/// Compound types, field by field through their schema.
///
/// Requires the type to be registered. Reading merges onto the current
/// value: absent keys keep their value, unknown keys are skipped, and every
/// accepted field passes its validator first.
#[derive(Debug, Default, Clone, Copy)]
pub struct SchemaConverter;

impl SchemaConverter {
    fn merge_field(
        field: &FieldDescriptor,
        node: &Node,
        target: &mut dyn Reflect,
        cx: &Codec<'_>,
    ) -> Result<(), ConfError> {
        let Some(old) = field.get(&*target).map(|value| value.clone_value()) else {
            return Ok(());
        };
        let mut candidate = old.clone_value();
        cx.deserialize_field_into(node, &mut *candidate, field)?;
        let accepted = field.validate(candidate, &*old)?;
        field.set(target, accepted)
    }
}

impl Converter for SchemaConverter {
    fn serialize(&self, value: &dyn Reflect, cx: &Codec<'_>) -> Result<Node, ConfError> {
        let info = value.reflect_info();
        let alias = cx.registry().alias_of(&info)?;
        let schema = cx.mapper().schema(info)?;
        if let Some(custom) = schema.converter() {
            return custom.serialize(value, cx);
        }

        let mut map = IndexMap::with_capacity(schema.len() + 1);
        if !(schema.suppresses_type_tag() && cx.known_type() == Some(info.id())) {
            map.insert(TYPE_TAG_KEY.to_string(), Node::from(alias));
        }
        for field in schema.fields() {
            if field.is_transient() {
                continue;
            }
            let Some(field_value) = field.get(value) else {
                continue;
            };
            map.insert(field.key().to_string(), cx.serialize_field(&*field_value, field)?);
        }
        Ok(Node::Mapping(map))
    }

    fn deserialize(
        &self,
        node: &Node,
        info: TypeInfo,
        cx: &Codec<'_>,
    ) -> Result<Box<dyn Reflect>, ConfError> {
        let Some(compound) = info.compound() else {
            return Err(ConfError::NotCompound {
                type_name: info.path().to_string(),
            });
        };
        let schema = cx.mapper().schema(info)?;
        if let Some(custom) = schema.converter() {
            cx.registry().alias_of(&info)?;
            return custom.deserialize(node, info, cx);
        }
        let mut value = (compound.default)();
        self.deserialize_into(node, &mut *value, cx)?;
        Ok(value)
    }

    fn deserialize_into(
        &self,
        node: &Node,
        target: &mut dyn Reflect,
        cx: &Codec<'_>,
    ) -> Result<(), ConfError> {
        let info = target.reflect_info();
        let alias = cx.registry().alias_of(&info)?;
        let schema = cx.mapper().schema(info)?;
        if let Some(custom) = schema.converter() {
            return custom.deserialize_into(node, target, cx);
        }

        let Node::Mapping(entries) = node else {
            return Err(malformed(&info, "mapping", node));
        };
        if let Some(tag) = node.type_tag() {
            if tag != alias {
                return Err(ConfError::TagMismatch {
                    expected: alias.to_string(),
                    found: tag.to_string(),
                });
            }
        }

        for (key, child) in entries {
            if key == TYPE_TAG_KEY {
                continue;
            }
            let Some(field) = schema.get_field(key) else {
                debug!("ignoring unknown key `{}` for `{}`", key, info.path());
                continue;
            };
            if field.is_transient() || field.is_immutable() {
                trace!("skipping read-only field `{}`", key);
                continue;
            }
            Self::merge_field(field, child, target, cx)?;
        }
        Ok(())
    }
}

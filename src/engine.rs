use crate::api::Context;
use crate::converter::{Converter, ConverterSet, Family};
use crate::error::ConfError;
use crate::field::FieldDescriptor;
use crate::mapper::Mapper;
use crate::node::Node;
use crate::reflect::{Reflect, TypeInfo};
use crate::registry::TypeRegistry;
use log::trace;
use std::any::TypeId;
use std::sync::Arc;

/// The state threaded through one conversion: the context, the converter
/// set in effect and the static type declared at the current position.
///
/// Converters recurse through the codec they were given so nested values go
/// through the same override chain.
#[derive(Clone, Copy)]
pub struct Codec<'a> {
    context: &'a Context,
    converters: &'a ConverterSet,
    known: Option<TypeId>,
}

impl<'a> Codec<'a> {
    pub(crate) fn new(context: &'a Context, converters: &'a ConverterSet) -> Self {
        Self {
            context,
            converters,
            known: None,
        }
    }

    pub fn context(&self) -> &'a Context {
        self.context
    }

    pub fn registry(&self) -> &'a TypeRegistry {
        self.context.types()
    }

    pub fn mapper(&self) -> &'a Mapper {
        self.context.mapper()
    }

    pub fn converters(&self) -> &'a ConverterSet {
        self.converters
    }

    /// The statically declared type at the value being converted, if any.
    pub fn known_type(&self) -> Option<TypeId> {
        self.known
    }

    fn declared(&self, declared: Option<TypeInfo>) -> Codec<'a> {
        Codec {
            known: declared.map(|info| info.id()),
            ..*self
        }
    }

    /// Finds the converter for a value of `info`: the field's own converter,
    /// then an exact-type entry, then the structural family.
    pub fn converter_for(
        &self,
        info: &TypeInfo,
        field: Option<&FieldDescriptor>,
    ) -> Arc<dyn Converter> {
        if let Some(converter) = field.and_then(FieldDescriptor::converter) {
            return Arc::clone(converter);
        }
        if let Some(converter) = self.converters.exact(info.id()) {
            return converter;
        }
        let family = Family::of(info);
        self.converters
            .family(family)
            .unwrap_or_else(|| family.builtin())
    }

    /// Serializes a value whose static type is unknown, so compound values
    /// always carry their type tag.
    pub fn serialize(&self, value: &dyn Reflect) -> Result<Node, ConfError> {
        self.serialize_as(value, None)
    }

    pub fn serialize_as(
        &self,
        value: &dyn Reflect,
        declared: Option<TypeInfo>,
    ) -> Result<Node, ConfError> {
        let info = value.reflect_info();
        self.converter_for(&info, None)
            .serialize(value, &self.declared(declared))
    }

    pub fn serialize_field(
        &self,
        value: &dyn Reflect,
        field: &FieldDescriptor,
    ) -> Result<Node, ConfError> {
        trace!("serializing field `{}`", field.key());
        let info = value.reflect_info();
        self.converter_for(&info, Some(field))
            .serialize(value, &self.declared(Some(field.ty())))
    }

    pub fn deserialize(&self, node: &Node, info: TypeInfo) -> Result<Box<dyn Reflect>, ConfError> {
        self.converter_for(&info, None)
            .deserialize(node, info, &self.declared(Some(info)))
    }

    /// Converts a node to the declared type of `field`, honouring the field's
    /// own converter.
    pub fn deserialize_field(
        &self,
        node: &Node,
        field: &FieldDescriptor,
    ) -> Result<Box<dyn Reflect>, ConfError> {
        let info = field.ty();
        self.converter_for(&info, Some(field))
            .deserialize(node, info, &self.declared(Some(info)))
    }

    /// Reads a node whose type comes from its tag alone.
    pub fn deserialize_untyped(&self, node: &Node) -> Result<Box<dyn Reflect>, ConfError> {
        let tag = node.type_tag().ok_or(ConfError::MissingTypeTag)?;
        let info = self
            .registry()
            .type_by_alias(tag)
            .ok_or_else(|| ConfError::UnregisteredType {
                type_name: tag.to_string(),
            })?;
        self.deserialize(node, info)
    }

    /// Merges a node into an existing value.
    pub fn deserialize_into(&self, node: &Node, target: &mut dyn Reflect) -> Result<(), ConfError> {
        let info = target.reflect_info();
        self.converter_for(&info, None)
            .deserialize_into(node, target, &self.declared(Some(info)))
    }

    pub fn deserialize_field_into(
        &self,
        node: &Node,
        target: &mut dyn Reflect,
        field: &FieldDescriptor,
    ) -> Result<(), ConfError> {
        trace!("deserializing field `{}`", field.key());
        let info = target.reflect_info();
        self.converter_for(&info, Some(field))
            .deserialize_into(node, target, &self.declared(Some(field.ty())))
    }
}

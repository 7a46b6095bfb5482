use crate::converter::ConverterSet;
use crate::engine::Codec;
use crate::error::ConfError;
use crate::mapper::Mapper;
use crate::node::Node;
use crate::properties::Properties;
use crate::reflect::{Reflect, Typed};
use crate::registry::TypeRegistry;
use crate::schema::Schema;
use std::sync::Arc;

/// Everything a conversion needs: registered types, the schema cache and the
/// default converter set.
///
/// A context is built once through [`ContextBuilder`] and can be shared
/// between threads; it has no global state.
#[derive(Debug)]
pub struct Context {
    types: TypeRegistry,
    mapper: Mapper,
    converters: Arc<ConverterSet>,
}

/// Registration phase of a [`Context`].
#[derive(Debug, Default)]
pub struct ContextBuilder {
    types: TypeRegistry,
    converters: Option<Arc<ConverterSet>>,
}

impl ContextBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `T` under its declared alias, or its type path.
    ///
    /// # Errors
    /// Fails when `T` is not compound or its alias is already taken.
    pub fn register<T: Typed>(mut self) -> Result<Self, ConfError> {
        self.types.register::<T>()?;
        Ok(self)
    }

    /// Registers `T` under an explicit alias.
    ///
    /// # Errors
    /// Fails when `T` is not compound, is already registered under another
    /// alias, or the alias belongs to another type.
    pub fn register_as<T: Typed>(mut self, alias: &str) -> Result<Self, ConfError> {
        self.types.register_as::<T>(alias)?;
        Ok(self)
    }

    /// Replaces the default converter set.
    pub fn converters(mut self, converters: Arc<ConverterSet>) -> Self {
        self.converters = Some(converters);
        self
    }

    /// Finishes registration and builds the schema of every registered type,
    /// so structural errors such as recursion surface here.
    ///
    /// # Errors
    /// Returns the first schema error found.
    pub fn build(self) -> Result<Context, ConfError> {
        let context = Context {
            types: self.types,
            mapper: Mapper::new(),
            converters: self.converters.unwrap_or_else(ConverterSet::defaults),
        };
        for registration in context.types.iter() {
            context.mapper.schema(registration.info())?;
        }
        log::debug!(
            "context ready with {} registered types",
            context.types.len()
        );
        Ok(context)
    }
}

impl Context {
    pub fn builder() -> ContextBuilder {
        ContextBuilder::new()
    }

    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }

    pub fn mapper(&self) -> &Mapper {
        &self.mapper
    }

    pub fn converters(&self) -> &Arc<ConverterSet> {
        &self.converters
    }

    /// A codec over the context's own converter set.
    pub fn codec(&self) -> Codec<'_> {
        Codec::new(self, &self.converters)
    }

    /// A codec over another converter set, usually one layered on top of
    /// [`Context::converters`].
    pub fn with_converters<'a>(&'a self, converters: &'a ConverterSet) -> Codec<'a> {
        Codec::new(self, converters)
    }

    pub fn schema_of<T: Typed>(&self) -> Result<Arc<Schema>, ConfError> {
        self.mapper.schema_of::<T>()
    }

    /// Serializes `value` with `T` as its declared type.
    pub fn serialize<T: Typed>(&self, value: &T) -> Result<Node, ConfError> {
        self.codec().serialize_as(value, Some(T::type_info()))
    }

    /// Serializes a value of unknown static type; compound values always
    /// carry their tag.
    pub fn serialize_dyn(&self, value: &dyn Reflect) -> Result<Node, ConfError> {
        self.codec().serialize(value)
    }

    pub fn deserialize<T: Typed>(&self, node: &Node) -> Result<T, ConfError> {
        let value = self.codec().deserialize(node, T::type_info())?;
        value
            .take::<T>()
            .map_err(|found| ConfError::mismatch(std::any::type_name::<T>(), found.reflect_info().path()))
    }

    /// Reconstructs a value from a tagged mapping.
    pub fn deserialize_untyped(&self, node: &Node) -> Result<Box<dyn Reflect>, ConfError> {
        self.codec().deserialize_untyped(node)
    }

    /// Merges `node` into `target`. On error `target` is left untouched.
    pub fn deserialize_into<T: Typed>(&self, node: &Node, target: &mut T) -> Result<(), ConfError> {
        let mut candidate = target.clone();
        self.codec().deserialize_into(node, &mut candidate)?;
        *target = candidate;
        Ok(())
    }

    /// Wraps `value` for path-based, validated mutation.
    pub fn properties<T: Typed>(&self, value: T) -> Result<Properties<'_, T>, ConfError> {
        Properties::new(self, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configurable;
    use crate::node::TYPE_TAG_KEY;
    use crate::schema::{Configurable, SchemaBuilder};

    #[derive(Debug, Clone, PartialEq, Default)]
    struct Point {
        x: i32,
        y: i32,
    }

    impl Configurable for Point {
        const ALIAS: Option<&'static str> = Some("Point");

        fn describe(schema: &mut SchemaBuilder<Self>) {
            schema.field("x", |p| &p.x, |p| &mut p.x);
            schema.field("y", |p| &p.y, |p| &mut p.y);
        }
    }

    configurable!(Point);

    #[test]
    fn test_tag_comes_first() {
        let cx = Context::builder().register::<Point>().unwrap().build().unwrap();
        let node = cx.serialize(&Point { x: 1, y: 2 }).unwrap();
        let keys: Vec<&str> = node
            .as_mapping()
            .unwrap()
            .keys()
            .map(String::as_str)
            .collect();
        assert_eq!(keys, vec![TYPE_TAG_KEY, "x", "y"]);
    }

    #[test]
    fn test_failed_merge_leaves_target() {
        let cx = Context::builder().register::<Point>().unwrap().build().unwrap();
        let mut point = Point { x: 1, y: 2 };
        let node: Node = serde_json::from_str(r#"{"x": 5, "y": "nope"}"#).unwrap();

        assert!(cx.deserialize_into(&node, &mut point).is_err());
        assert_eq!(point, Point { x: 1, y: 2 });
    }

    #[test]
    fn test_context_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Context>();
    }
}

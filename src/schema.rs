//! Schema declarations.
//!
//! A compound type implements [`Configurable`] and lists its fields on a
//! [`SchemaBuilder`]; the [`Mapper`](crate::mapper::Mapper) turns that
//! description into a cached, immutable [`Schema`].

use crate::converter::Converter;
use crate::field::{Accessor, FieldAccessor, FieldDescriptor, VirtualAccessor};
use crate::handler::{ErasedHandler, ErasedStringifier, PropertyHandler, Stringify, TypedHandler, TypedStringifier};
use crate::reflect::{Reflect, TypeInfo, Typed};
use crate::validator::{ErasedValidator, TypedValidator, Validate};
use indexmap::IndexMap;
use std::any::TypeId;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// A type with named, serializable fields.
///
/// ```
/// use confgraph::{configurable, Configurable, SchemaBuilder};
///
/// #[derive(Debug, Clone, PartialEq, Default)]
/// struct Server {
///     host: String,
///     port: u16,
/// }
///
/// impl Configurable for Server {
///     const ALIAS: Option<&'static str> = Some("Server");
///
///     fn describe(schema: &mut SchemaBuilder<Self>) {
///         schema.field("host", |s| &s.host, |s| &mut s.host);
///         schema
///             .field("port", |s| &s.port, |s| &mut s.port)
///             .comment("Port to listen on");
///     }
/// }
///
/// configurable!(Server);
/// ```
pub trait Configurable: Default + Clone + PartialEq + fmt::Debug + Send + Sync + 'static {
    /// Alias written into the type tag. Defaults to the type path.
    const ALIAS: Option<&'static str> = None;

    fn describe(schema: &mut SchemaBuilder<Self>);
}

#[doc(hidden)]
pub fn default_boxed<T: Configurable + Reflect>() -> Box<dyn Reflect> {
    Box::new(T::default())
}

#[doc(hidden)]
pub fn describe_erased<T: Configurable>() -> SchemaDraft {
    let mut builder = SchemaBuilder::<T>::new();
    T::describe(&mut builder);
    builder.into_draft()
}

/// Implements reflection for [`Configurable`] types.
#[macro_export]
macro_rules! configurable {
    ($($ty:ty),+ $(,)?) => {$(
        impl $crate::reflect::Reflect for $ty {
            fn reflect_info(&self) -> $crate::reflect::TypeInfo {
                <Self as $crate::reflect::Typed>::type_info()
            }

            fn reflect_ref(&self) -> $crate::reflect::ReflectRef<'_> {
                $crate::reflect::ReflectRef::Compound
            }

            $crate::reflect_boilerplate!();
        }

        impl $crate::reflect::Typed for $ty {
            fn type_info() -> $crate::reflect::TypeInfo {
                $crate::reflect::TypeInfo::new::<Self>($crate::reflect::TypeKind::Compound(
                    $crate::reflect::CompoundInfo {
                        alias: <Self as $crate::schema::Configurable>::ALIAS,
                        default: $crate::schema::default_boxed::<Self>,
                        describe: $crate::schema::describe_erased::<Self>,
                    },
                ))
            }
        }
    )+};
}

/// Where a field hook comes from: a caller-supplied instance, or one shared
/// through the mapper's cache per key.
pub(crate) enum Source<E: ?Sized> {
    Instance(Arc<E>),
    Cached { key: TypeId, make: fn() -> Arc<E> },
}

impl<E: ?Sized> Clone for Source<E> {
    fn clone(&self) -> Self {
        match self {
            Source::Instance(hook) => Source::Instance(Arc::clone(hook)),
            Source::Cached { key, make } => Source::Cached {
                key: *key,
                make: *make,
            },
        }
    }
}

pub(crate) type ValidatorSource = Source<dyn ErasedValidator>;
pub(crate) type ConverterSource = Source<dyn Converter>;
pub(crate) type HandlerSource = Source<dyn ErasedHandler>;
pub(crate) type StringifierSource = Source<dyn ErasedStringifier>;

fn make_validator<V: Typed, Vd: Validate<V> + Default>() -> Arc<dyn ErasedValidator> {
    Arc::new(TypedValidator::<V, Vd>::new(Vd::default()))
}

fn make_handler<V: Typed, H: PropertyHandler<V> + Default>() -> Arc<dyn ErasedHandler> {
    Arc::new(TypedHandler::<V, H>::new(H::default()))
}

fn make_stringifier<V: Typed, S: Stringify<V> + Default>() -> Arc<dyn ErasedStringifier> {
    Arc::new(TypedStringifier::<V, S>::new(S::default()))
}

fn make_converter<C: Converter + Default>() -> Arc<dyn Converter> {
    Arc::new(C::default())
}

pub(crate) fn cached_converter<C: Converter + Default>() -> ConverterSource {
    ConverterSource::Cached {
        key: TypeId::of::<C>(),
        make: make_converter::<C>,
    }
}

/// A declared field before resolution.
pub struct FieldDraft {
    pub(crate) name: String,
    pub(crate) key: Option<String>,
    pub(crate) ty: TypeInfo,
    pub(crate) accessor: Arc<dyn Accessor>,
    pub(crate) comments: Vec<String>,
    pub(crate) description: Option<String>,
    pub(crate) validator: Option<ValidatorSource>,
    pub(crate) converter: Option<ConverterSource>,
    pub(crate) handler: Option<HandlerSource>,
    pub(crate) stringifier: Option<StringifierSource>,
    pub(crate) transient: bool,
    pub(crate) immutable: bool,
    pub(crate) is_virtual: bool,
}

pub(crate) struct ParentDraft {
    pub(crate) ty: TypeInfo,
    pub(crate) accessor: Arc<dyn Accessor>,
}

/// The type-erased output of [`Configurable::describe`].
pub struct SchemaDraft {
    pub(crate) fields: Vec<FieldDraft>,
    pub(crate) parent: Option<ParentDraft>,
    pub(crate) ignore_parent_fields: bool,
    pub(crate) suppress_type_tag: bool,
    pub(crate) converter: Option<ConverterSource>,
    pub(crate) property_aliases: Vec<(String, String)>,
}

impl SchemaDraft {
    /// Declared field names, in order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    pub fn has_parent(&self) -> bool {
        self.parent.is_some()
    }
}

/// Collects the field declarations of `T`.
pub struct SchemaBuilder<T> {
    draft: SchemaDraft,
    _owner: PhantomData<fn(&T)>,
}

impl<T: Configurable> SchemaBuilder<T> {
    fn new() -> Self {
        Self {
            draft: SchemaDraft {
                fields: Vec::new(),
                parent: None,
                ignore_parent_fields: false,
                suppress_type_tag: false,
                converter: None,
                property_aliases: Vec::new(),
            },
            _owner: PhantomData,
        }
    }

    fn into_draft(self) -> SchemaDraft {
        self.draft
    }

    fn push<V>(&mut self, name: &str, ty: TypeInfo, accessor: Arc<dyn Accessor>, is_virtual: bool) -> FieldOptions<'_, V> {
        self.draft.fields.push(FieldDraft {
            name: name.to_string(),
            key: None,
            ty,
            accessor,
            comments: Vec::new(),
            description: None,
            validator: None,
            converter: None,
            handler: None,
            stringifier: None,
            transient: false,
            immutable: false,
            is_virtual,
        });
        let last = self.draft.fields.len() - 1;
        FieldOptions {
            draft: &mut self.draft.fields[last],
            _value: PhantomData,
        }
    }

    /// Declares a stored field.
    pub fn field<V: Typed>(
        &mut self,
        name: &str,
        get: fn(&T) -> &V,
        get_mut: fn(&mut T) -> &mut V,
    ) -> FieldOptions<'_, V> {
        let accessor = Arc::new(FieldAccessor::new(get, get_mut));
        self.push(name, V::type_info(), accessor, false)
    }

    /// Declares a computed field, read and written through a getter and a
    /// setter instead of storage.
    pub fn virtual_field<V: Typed>(
        &mut self,
        name: &str,
        get: fn(&T) -> V,
        set: fn(&mut T, V),
    ) -> FieldOptions<'_, V> {
        let accessor = Arc::new(VirtualAccessor::new(get, set));
        self.push(name, V::type_info(), accessor, true)
    }

    /// Embeds a parent type; its fields are spliced in ahead of this type's
    /// own fields.
    pub fn extends<P: Configurable + Typed>(
        &mut self,
        get: fn(&T) -> &P,
        get_mut: fn(&mut T) -> &mut P,
    ) -> &mut Self {
        self.draft.parent = Some(ParentDraft {
            ty: P::type_info(),
            accessor: Arc::new(FieldAccessor::new(get, get_mut)),
        });
        self
    }

    /// Drops the fields the immediate parent declares itself; fields it
    /// inherited further up are kept.
    pub fn ignore_parent_fields(&mut self) -> &mut Self {
        self.draft.ignore_parent_fields = true;
        self
    }

    /// Omits the type tag when the static type at the serialization site is
    /// already this type.
    pub fn suppress_type_tag(&mut self) -> &mut Self {
        self.draft.suppress_type_tag = true;
        self
    }

    /// Converts the whole type with `C`, shared per converter type.
    pub fn serialize_with<C: Converter + Default>(&mut self) -> &mut Self {
        self.draft.converter = Some(cached_converter::<C>());
        self
    }

    pub fn converter(&mut self, converter: impl Converter) -> &mut Self {
        self.draft.converter = Some(ConverterSource::Instance(Arc::new(converter)));
        self
    }

    /// Registers a case-insensitive alias for a property path.
    pub fn alias_property(&mut self, alias: &str, path: &str) -> &mut Self {
        self.draft
            .property_aliases
            .push((alias.to_string(), path.to_string()));
        self
    }
}

/// Directives for the field just declared.
pub struct FieldOptions<'a, V> {
    draft: &'a mut FieldDraft,
    _value: PhantomData<fn(V)>,
}

impl<V: Typed> FieldOptions<'_, V> {
    /// Stores the field under `key` instead of its name.
    pub fn rename(self, key: impl Into<String>) -> Self {
        self.draft.key = Some(key.into());
        self
    }

    pub fn comment(self, line: impl Into<String>) -> Self {
        self.draft.comments.push(line.into());
        self
    }

    pub fn comments<I, S>(self, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.draft.comments.extend(lines.into_iter().map(Into::into));
        self
    }

    /// Message key describing the field to users.
    pub fn description(self, key: impl Into<String>) -> Self {
        self.draft.description = Some(key.into());
        self
    }

    /// Validates changes with `Vd`; one instance is shared by every field
    /// naming the same validator type.
    pub fn validate_with<Vd: Validate<V> + Default>(self) -> Self {
        self.draft.validator = Some(ValidatorSource::Cached {
            key: TypeId::of::<TypedValidator<V, Vd>>(),
            make: make_validator::<V, Vd>,
        });
        self
    }

    pub fn validator(self, validator: impl Validate<V>) -> Self {
        self.draft.validator = Some(ValidatorSource::Instance(Arc::new(TypedValidator::<V, _>::new(
            validator,
        ))));
        self
    }

    /// Converts this field with `C`, shared per converter type.
    pub fn serialize_with<C: Converter + Default>(self) -> Self {
        self.draft.converter = Some(cached_converter::<C>());
        self
    }

    pub fn converter(self, converter: impl Converter) -> Self {
        self.draft.converter = Some(ConverterSource::Instance(Arc::new(converter)));
        self
    }

    /// Takes over string edits of this field with `H`, shared per handler
    /// type.
    pub fn handle_with<H: PropertyHandler<V> + Default>(self) -> Self {
        self.draft.handler = Some(Source::Cached {
            key: TypeId::of::<TypedHandler<V, H>>(),
            make: make_handler::<V, H>,
        });
        self
    }

    pub fn handler(self, handler: impl PropertyHandler<V>) -> Self {
        self.draft.handler = Some(Source::Instance(Arc::new(TypedHandler::<V, _>::new(handler))));
        self
    }

    /// Reads and renders this field's text with `S`, shared per type.
    pub fn stringify_with<S: Stringify<V> + Default>(self) -> Self {
        self.draft.stringifier = Some(Source::Cached {
            key: TypeId::of::<TypedStringifier<V, S>>(),
            make: make_stringifier::<V, S>,
        });
        self
    }

    pub fn stringifier(self, stringifier: impl Stringify<V>) -> Self {
        self.draft.stringifier = Some(Source::Instance(Arc::new(TypedStringifier::<V, _>::new(
            stringifier,
        ))));
        self
    }

    /// Keeps the field out of serialized output and ignores it on input.
    pub fn transient(self) -> Self {
        self.draft.transient = true;
        self
    }

    /// Rejects changes through properties and deserialization.
    pub fn immutable(self) -> Self {
        self.draft.immutable = true;
        self
    }
}

/// The resolved field layout of a compound type.
pub struct Schema {
    pub(crate) info: TypeInfo,
    pub(crate) fields: IndexMap<String, Arc<FieldDescriptor>>,
    pub(crate) suppress_type_tag: bool,
    pub(crate) converter: Option<Arc<dyn Converter>>,
    pub(crate) property_aliases: IndexMap<String, String>,
}

impl Schema {
    pub fn info(&self) -> TypeInfo {
        self.info
    }

    pub fn has_field(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn get_field(&self, key: &str) -> Option<&Arc<FieldDescriptor>> {
        self.fields.get(key)
    }

    /// Looks a field up by its declared name rather than its key.
    pub fn field_by_name(&self, name: &str) -> Option<&Arc<FieldDescriptor>> {
        self.fields.values().find(|f| f.name() == name)
    }

    /// Fields in schema order: inherited fields first, then declaration order.
    pub fn fields(&self) -> impl Iterator<Item = &Arc<FieldDescriptor>> {
        self.fields.values()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn suppresses_type_tag(&self) -> bool {
        self.suppress_type_tag
    }

    /// The class-level converter, if the type declared one.
    pub fn converter(&self) -> Option<&Arc<dyn Converter>> {
        self.converter.as_ref()
    }

    /// Resolves a property alias, ignoring case.
    pub fn resolve_alias(&self, alias: &str) -> Option<&str> {
        self.property_aliases
            .get(&alias.to_lowercase())
            .map(String::as_str)
    }
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("type", &self.info.path())
            .field("fields", &self.fields.keys().collect::<Vec<_>>())
            .field("suppress_type_tag", &self.suppress_type_tag)
            .field("property_aliases", &self.property_aliases)
            .finish_non_exhaustive()
    }
}

use crate::converter::Converter;
use crate::error::ConfError;
use crate::field::{FieldDescriptor, ParentAccessor};
use crate::node::TYPE_TAG_KEY;
use crate::reflect::{CompoundInfo, Reflect, TypeInfo, Typed};
use crate::handler::{ErasedHandler, ErasedStringifier};
use crate::schema::{ConverterSource, FieldDraft, Schema, Source, ValidatorSource};
use crate::validator::ErasedValidator;
use indexmap::IndexMap;
use log::debug;
use parking_lot::{Mutex, RwLock};
use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Builds and caches [`Schema`]s.
///
/// Lookups take a read lock; the first build of a type runs under a single
/// build lock and only commits to the cache when every schema it needed was
/// built successfully.
#[derive(Default)]
pub struct Mapper {
    schemas: RwLock<HashMap<TypeId, Arc<Schema>>>,
    build_lock: Mutex<()>,
    validators: Mutex<HashMap<TypeId, Arc<dyn ErasedValidator>>>,
    converters: Mutex<HashMap<TypeId, Arc<dyn Converter>>>,
    handlers: Mutex<HashMap<TypeId, Arc<dyn ErasedHandler>>>,
    stringifiers: Mutex<HashMap<TypeId, Arc<dyn ErasedStringifier>>>,
}

/// State of one schema request.
#[derive(Default)]
struct Resolution {
    in_progress: Vec<TypeInfo>,
    built: HashMap<TypeId, Arc<Schema>>,
}

impl Resolution {
    fn chain_to(&self, info: &TypeInfo) -> String {
        self.in_progress
            .iter()
            .chain(std::iter::once(info))
            .map(TypeInfo::path)
            .collect::<Vec<_>>()
            .join(" -> ")
    }
}

impl Mapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the schema of a compound type, building it on first use.
    pub fn schema(&self, info: TypeInfo) -> Result<Arc<Schema>, ConfError> {
        if let Some(schema) = self.cached(info.id()) {
            return Ok(schema);
        }

        let _guard = self.build_lock.lock();
        if let Some(schema) = self.cached(info.id()) {
            return Ok(schema);
        }

        let mut resolution = Resolution::default();
        let schema = self.build(info, &mut resolution)?;
        self.schemas.write().extend(resolution.built);
        Ok(schema)
    }

    pub fn schema_of<T: Typed>(&self) -> Result<Arc<Schema>, ConfError> {
        self.schema(T::type_info())
    }

    pub fn cached(&self, id: TypeId) -> Option<Arc<Schema>> {
        self.schemas.read().get(&id).cloned()
    }

    /// Number of cached schemas.
    pub fn len(&self) -> usize {
        self.schemas.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of distinct cached validator instances.
    pub fn validator_count(&self) -> usize {
        self.validators.lock().len()
    }

    fn build(&self, info: TypeInfo, resolution: &mut Resolution) -> Result<Arc<Schema>, ConfError> {
        let Some(compound) = info.compound() else {
            return Err(ConfError::NotCompound {
                type_name: info.path().to_string(),
            });
        };

        if let Some(schema) = resolution.built.get(&info.id()).cloned().or_else(|| self.cached(info.id())) {
            return Ok(schema);
        }
        if resolution.in_progress.contains(&info) {
            return Err(ConfError::RecursiveSchema {
                type_name: info.path().to_string(),
                chain: resolution.chain_to(&info),
            });
        }

        resolution.in_progress.push(info);
        let result = self.build_fields(info, compound, resolution);
        resolution.in_progress.pop();

        let schema = Arc::new(result?);
        debug!(
            "built schema for `{}` with {} fields",
            info.path(),
            schema.len()
        );
        resolution.built.insert(info.id(), Arc::clone(&schema));
        Ok(schema)
    }

    fn build_fields(
        &self,
        info: TypeInfo,
        compound: CompoundInfo,
        resolution: &mut Resolution,
    ) -> Result<Schema, ConfError> {
        let draft = (compound.describe)();
        let defaults = (compound.default)();
        let mut fields: IndexMap<String, Arc<FieldDescriptor>> = IndexMap::new();

        if let Some(parent) = &draft.parent {
            let parent_schema = self.build(parent.ty, resolution)?;
            for field in parent_schema.fields() {
                if draft.ignore_parent_fields && !field.is_inherited() {
                    continue;
                }
                let accessor = Arc::new(ParentAccessor {
                    outer: Arc::clone(&parent.accessor),
                    inner: Arc::clone(&field.accessor),
                });
                let default = accessor_default(&*accessor, &*defaults);
                let descriptor = FieldDescriptor {
                    name: field.name.clone(),
                    key: field.key.clone(),
                    ty: field.ty,
                    element: field.element,
                    default,
                    comments: field.comments.clone(),
                    description: field.description.clone(),
                    validator: field.validator.clone(),
                    converter: field.converter.clone(),
                    handler: field.handler.clone(),
                    stringifier: field.stringifier.clone(),
                    accessor,
                    nested: field.nested.clone(),
                    transient: field.transient,
                    immutable: field.immutable,
                    is_virtual: field.is_virtual,
                    inherited: true,
                };
                insert_unique(&mut fields, descriptor, &info)?;
            }
        }

        for field in draft.fields {
            let descriptor = self.resolve_field(field, &*defaults, resolution)?;
            insert_unique(&mut fields, descriptor, &info)?;
        }

        let converter = draft.converter.map(|source| self.resolve_converter(source));
        let property_aliases = draft
            .property_aliases
            .into_iter()
            .map(|(alias, path)| (alias.to_lowercase(), path))
            .collect();

        Ok(Schema {
            info,
            fields,
            suppress_type_tag: draft.suppress_type_tag,
            converter,
            property_aliases,
        })
    }

    fn resolve_field(
        &self,
        field: FieldDraft,
        defaults: &dyn Reflect,
        resolution: &mut Resolution,
    ) -> Result<FieldDescriptor, ConfError> {
        let converter = field.converter.map(|source| self.resolve_converter(source));
        let validator = field.validator.map(|source| self.resolve_validator(source));
        let handler = field.handler.map(|source| resolve(&self.handlers, source));
        let stringifier = field.stringifier.map(|source| resolve(&self.stringifiers, source));

        // Fields with their own converter decide their own representation.
        let target = field.ty.unwrapped();
        let nested = if converter.is_none() && target.compound().is_some() {
            Some(self.build(target, resolution)?)
        } else {
            None
        };

        let default = accessor_default(&*field.accessor, defaults);
        Ok(FieldDescriptor {
            key: field.key.unwrap_or_else(|| field.name.clone()),
            name: field.name,
            ty: field.ty,
            element: target.element(),
            default,
            comments: field.comments,
            description: field.description,
            validator,
            converter,
            handler,
            stringifier,
            accessor: field.accessor,
            nested,
            transient: field.transient,
            immutable: field.immutable,
            is_virtual: field.is_virtual,
            inherited: false,
        })
    }

    fn resolve_validator(&self, source: ValidatorSource) -> Arc<dyn ErasedValidator> {
        resolve(&self.validators, source)
    }

    fn resolve_converter(&self, source: ConverterSource) -> Arc<dyn Converter> {
        resolve(&self.converters, source)
    }
}

fn resolve<E: ?Sized>(cache: &Mutex<HashMap<TypeId, Arc<E>>>, source: Source<E>) -> Arc<E> {
    match source {
        Source::Instance(hook) => hook,
        Source::Cached { key, make } => Arc::clone(cache.lock().entry(key).or_insert_with(make)),
    }
}

impl fmt::Debug for Mapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mapper")
            .field("schemas", &self.len())
            .field("validators", &self.validator_count())
            .finish_non_exhaustive()
    }
}

fn accessor_default(
    accessor: &dyn crate::field::Accessor,
    defaults: &dyn Reflect,
) -> Option<Box<dyn Reflect>> {
    accessor
        .get(defaults.as_any())
        .map(|value| value.clone_value())
}

fn insert_unique(
    fields: &mut IndexMap<String, Arc<FieldDescriptor>>,
    descriptor: FieldDescriptor,
    owner: &TypeInfo,
) -> Result<(), ConfError> {
    if descriptor.key == TYPE_TAG_KEY {
        return Err(ConfError::ReservedKey {
            type_name: owner.path().to_string(),
            field: descriptor.name,
        });
    }
    if fields.contains_key(&descriptor.key) {
        return Err(ConfError::DuplicateKey {
            type_name: owner.path().to_string(),
            key: descriptor.key,
        });
    }
    fields.insert(descriptor.key.clone(), Arc::new(descriptor));
    Ok(())
}

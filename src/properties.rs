//! Path-based access to a live value.
//!
//! [`Properties`] owns a compound value and changes it one field at a time.
//! Every change goes through the field's validator first; a veto leaves the
//! value as it was.

use crate::api::Context;
use crate::backend;
use crate::error::ConfError;
use crate::field::FieldDescriptor;
use crate::handler::{Edit, HandlerError};
use crate::node::{Node, Scalar};
use crate::parser;
use crate::reflect::{CollectionInfo, MapInfo, Reflect, ReflectRef, TypeInfo, TypeKind, Typed};
use crate::schema::Schema;
use log::debug;
use std::fmt;
use std::sync::Arc;

/// Called after every accepted change with the wrapper and the changed field.
pub type Observer<'cx, T> = Box<dyn Fn(&Properties<'cx, T>, &FieldDescriptor) + Send + Sync + 'cx>;

pub struct Properties<'cx, T: Typed> {
    cx: &'cx Context,
    value: T,
    schema: Arc<Schema>,
    separator: String,
    observers: Vec<Observer<'cx, T>>,
}

impl<'cx, T: Typed> Properties<'cx, T> {
    /// Wraps `value`. Fails when `T` has no schema.
    pub fn new(cx: &'cx Context, value: T) -> Result<Self, ConfError> {
        let schema = cx.mapper().schema(T::type_info())?;
        Ok(Self {
            cx,
            value,
            schema,
            separator: ".".to_string(),
            observers: Vec::new(),
        })
    }

    /// Uses `separator` between path segments instead of `.`.
    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    pub fn separator(&self) -> &str {
        &self.separator
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn into_inner(self) -> T {
        self.value
    }

    /// Registers an observer. Observers run in registration order.
    pub fn observe<F>(&mut self, observer: F)
    where
        F: Fn(&Properties<'cx, T>, &FieldDescriptor) + Send + Sync + 'cx,
    {
        self.observers.push(Box::new(observer));
    }

    /// Every settable leaf path, nested schemas expanded.
    pub fn property_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        collect_names(&self.schema, "", &self.separator, &mut names);
        names
    }

    /// A copy of the value at `path`.
    pub fn get(&self, path: &str) -> Result<Box<dyn Reflect>, ConfError> {
        let segments = self.segments(path);
        read(&self.schema, &self.value, &segments, path)
    }

    pub fn get_as<V: Typed>(&self, path: &str) -> Result<V, ConfError> {
        self.get(path)?
            .take::<V>()
            .map_err(|found| ConfError::mismatch(std::any::type_name::<V>(), found.reflect_info().path()))
    }

    /// The value at `path` as user text: the field's stringifier when it has
    /// one, otherwise the serialized form on one line.
    pub fn get_string(&self, path: &str) -> Result<String, ConfError> {
        let value = self.get(path)?;
        let Some(field) = self.field_at(path) else {
            return Err(self.no_such(path));
        };
        if let Some(text) = field.stringifier().and_then(|s| s.to_text(&*value)) {
            return Ok(text);
        }
        let node = self.cx.codec().serialize_field(&*value, &field)?;
        Ok(backend::inline_text(&node))
    }

    pub fn set<V: Typed>(&mut self, path: &str, value: V) -> Result<(), ConfError> {
        self.set_dyn(path, Box::new(value))
    }

    pub fn set_dyn(&mut self, path: &str, value: Box<dyn Reflect>) -> Result<(), ConfError> {
        self.mutate(path, move |field, _| {
            check_type(field.ty(), &*value)?;
            Ok(value)
        })
    }

    /// Parses `text` into the type of the field at `path` and sets it. A
    /// field handler or stringifier takes precedence over the default parse.
    pub fn set_from_str(&mut self, path: &str, text: &str) -> Result<(), ConfError> {
        let cx = self.cx;
        self.mutate(path, |field, current| {
            if let Some(result) = handled(field, Edit::Set(text), current, path) {
                return result;
            }
            if let Some(stringifier) = field.stringifier() {
                return stringifier
                    .from_text(text)
                    .ok_or_else(|| ConfError::invalid(field.ty().path(), text));
            }
            let node = text_node(field.ty(), text);
            cx.codec().deserialize_field(&node, field)
        })
    }

    /// Appends an element to the sequence or set at `path`.
    pub fn add<V: Typed>(&mut self, path: &str, element: V) -> Result<(), ConfError> {
        self.add_dyn(path, Box::new(element))
    }

    pub fn add_dyn(&mut self, path: &str, element: Box<dyn Reflect>) -> Result<(), ConfError> {
        self.mutate(path, move |field, current| {
            let (info, mut items) = collection_parts(field, current, path)?;
            check_type((info.element)(), &*element)?;
            items.push(element);
            rebuild_collection(field.ty(), info, items)
        })
    }

    /// Parses `text` as an element of the collection at `path` and appends it.
    pub fn add_from_str(&mut self, path: &str, text: &str) -> Result<(), ConfError> {
        let cx = self.cx;
        self.mutate(path, |field, current| {
            if let Some(result) = handled(field, Edit::Add(text), current, path) {
                return result;
            }
            let (info, mut items) = collection_parts(field, current, path)?;
            let element_type = (info.element)();
            let element = cx
                .codec()
                .deserialize(&text_node(element_type, text), element_type)?;
            items.push(element);
            rebuild_collection(field.ty(), info, items)
        })
    }

    /// Removes the first element equal to `element`. Returns whether one was
    /// found; nothing changes and no observer runs otherwise.
    pub fn remove<V: Typed>(&mut self, path: &str, element: V) -> Result<bool, ConfError> {
        self.remove_dyn(path, Box::new(element))
    }

    pub fn remove_dyn(&mut self, path: &str, element: Box<dyn Reflect>) -> Result<bool, ConfError> {
        let current = self.get(path)?;
        let Some(field) = self.field_at(path) else {
            return Err(self.no_such(path));
        };
        let (_, items) = collection_parts(&field, &*current, path)?;
        if !items.iter().any(|item| item.reflect_eq(&*element)) {
            return Ok(false);
        }

        self.mutate(path, move |field, current| {
            let (info, mut items) = collection_parts(field, current, path)?;
            if let Some(index) = items.iter().position(|item| item.reflect_eq(&*element)) {
                items.remove(index);
            }
            rebuild_collection(field.ty(), info, items)
        })?;
        Ok(true)
    }

    /// Parses `text` as an element of the collection at `path` and removes
    /// it. A field handler decides the result itself, so the change always
    /// counts as made.
    pub fn remove_from_str(&mut self, path: &str, text: &str) -> Result<bool, ConfError> {
        let Some(field) = self.field_at(path) else {
            return Err(self.no_such(path));
        };
        if field.handler().is_some() {
            self.mutate(path, |field, current| {
                handled(field, Edit::Remove(text), current, path).unwrap_or_else(|| Err(no_such_property(path)))
            })?;
            return Ok(true);
        }

        let current = self.get(path)?;
        let (info, _) = collection_parts(&field, &*current, path)?;
        let element_type = (info.element)();
        let element = self
            .cx
            .codec()
            .deserialize(&text_node(element_type, text), element_type)?;
        self.remove_dyn(path, element)
    }

    /// Empties the collection or map at `path`, or hands the field to its
    /// handler.
    pub fn clear(&mut self, path: &str) -> Result<(), ConfError> {
        self.mutate(path, |field, current| {
            if let Some(result) = handled(field, Edit::Clear, current, path) {
                return result;
            }
            match field.ty().unwrapped().kind() {
                TypeKind::Sequence(info) | TypeKind::Set(info) => {
                    rebuild_collection(field.ty(), info, Vec::new())
                }
                TypeKind::Map(info) => {
                    let map = (info.collect)(Vec::new())
                        .map_err(|key| ConfError::invalid(field.ty().path(), key))?;
                    rewrap(field.ty(), map)
                }
                _ => Err(ConfError::NotACollection {
                    path: path.to_string(),
                }),
            }
        })
    }

    /// Inserts or replaces the entry `key` of the map at `path`.
    pub fn set_entry<V: Typed>(&mut self, path: &str, key: &str, value: V) -> Result<(), ConfError> {
        let value: Box<dyn Reflect> = Box::new(value);
        self.mutate(path, move |field, current| {
            let (info, mut entries) = map_parts(field, current, path)?;
            check_type((info.value)(), &*value)?;
            match entries.iter().position(|entry| entry.0 == key) {
                Some(index) => entries[index].1 = value,
                None => entries.push((key.to_string(), value)),
            }
            let map = (info.collect)(entries).map_err(|bad| ConfError::invalid(field.ty().path(), bad))?;
            rewrap(field.ty(), map)
        })
    }

    /// Removes the entry `key` of the map at `path`. Returns whether it
    /// existed.
    pub fn clear_entry(&mut self, path: &str, key: &str) -> Result<bool, ConfError> {
        let current = self.get(path)?;
        let Some(field) = self.field_at(path) else {
            return Err(self.no_such(path));
        };
        let (_, entries) = map_parts(&field, &*current, path)?;
        if !entries.iter().any(|(existing, _)| existing == key) {
            return Ok(false);
        }

        self.mutate(path, |field, current| {
            let (info, mut entries) = map_parts(field, current, path)?;
            entries.retain(|(existing, _)| existing != key);
            let map = (info.collect)(entries).map_err(|bad| ConfError::invalid(field.ty().path(), bad))?;
            rewrap(field.ty(), map)
        })?;
        Ok(true)
    }

    fn segments<'p>(&'p self, path: &'p str) -> Vec<&'p str> {
        let path = self.schema.resolve_alias(path).unwrap_or(path);
        path.split(self.separator.as_str()).collect()
    }

    fn no_such(&self, path: &str) -> ConfError {
        ConfError::NoSuchProperty {
            path: path.to_string(),
        }
    }

    fn field_at(&self, path: &str) -> Option<Arc<FieldDescriptor>> {
        let segments = self.segments(path);
        let (last, parents) = segments.split_last()?;
        let mut schema = Arc::clone(&self.schema);
        for segment in parents {
            let nested = Arc::clone(schema.get_field(segment)?.nested()?);
            schema = nested;
        }
        schema.get_field(last).cloned()
    }

    /// Applies one change: locate the field, build the candidate from the
    /// current value, validate, store, notify.
    fn mutate<F>(&mut self, path: &str, build: F) -> Result<(), ConfError>
    where
        F: FnOnce(&FieldDescriptor, &dyn Reflect) -> Result<Box<dyn Reflect>, ConfError>,
    {
        let schema = Arc::clone(&self.schema);
        let segments: Vec<String> = self.segments(path).into_iter().map(str::to_string).collect();
        let segments: Vec<&str> = segments.iter().map(String::as_str).collect();

        let (owner, field) = locate_mut(&schema, &mut self.value, &segments, path)?;
        if field.is_immutable() {
            return Err(ConfError::ImmutableProperty {
                path: path.to_string(),
            });
        }

        let current = field
            .get(&*owner)
            .ok_or_else(|| ConfError::NoSuchProperty {
                path: path.to_string(),
            })?
            .clone_value();
        let candidate = build(&*field, &*current)?;
        let accepted = field
            .validate(candidate, &*current)
            .map_err(|err| match err {
                ConfError::PropertyVeto {
                    reason,
                    message_key,
                    ..
                } => ConfError::PropertyVeto {
                    field: path.to_string(),
                    reason,
                    message_key,
                },
                other => other,
            })?;
        field.set(owner, accepted)?;
        debug!("property `{path}` changed");

        for observer in &self.observers {
            observer(&*self, &*field);
        }
        Ok(())
    }
}

impl<T: Typed> fmt::Debug for Properties<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Properties")
            .field("value", &self.value)
            .field("separator", &self.separator)
            .field("observers", &self.observers.len())
            .finish_non_exhaustive()
    }
}

fn collect_names(schema: &Schema, prefix: &str, separator: &str, names: &mut Vec<String>) {
    for field in schema.fields() {
        let path = if prefix.is_empty() {
            field.key().to_string()
        } else {
            format!("{prefix}{separator}{}", field.key())
        };
        if let Some(nested) = field.nested() {
            collect_names(nested, &path, separator, names);
        } else if !field.is_immutable() {
            names.push(path);
        }
    }
}

fn no_such_property(path: &str) -> ConfError {
    ConfError::NoSuchProperty {
        path: path.to_string(),
    }
}

/// Looks through `Option` and `Box` to the value they hold.
fn unwrap_ref(value: &dyn Reflect) -> Option<&dyn Reflect> {
    match value.reflect_ref() {
        ReflectRef::Optional(inner) => inner.and_then(unwrap_ref),
        ReflectRef::Boxed(inner) => unwrap_ref(inner),
        _ => Some(value),
    }
}

fn unwrap_mut(value: &mut dyn Reflect) -> Option<&mut dyn Reflect> {
    match value.reflect_info().kind() {
        TypeKind::Optional(_) | TypeKind::Boxed(_) => value.inner_mut().and_then(unwrap_mut),
        _ => Some(value),
    }
}

fn read(
    schema: &Schema,
    owner: &dyn Reflect,
    segments: &[&str],
    path: &str,
) -> Result<Box<dyn Reflect>, ConfError> {
    let (first, rest) = segments
        .split_first()
        .ok_or_else(|| no_such_property(path))?;
    let field = schema.get_field(first).ok_or_else(|| no_such_property(path))?;
    let value = field.get(owner).ok_or_else(|| no_such_property(path))?;
    if rest.is_empty() {
        return Ok(value.clone_value());
    }
    let nested = field.nested().ok_or_else(|| no_such_property(path))?;
    let inner = unwrap_ref(&*value).ok_or_else(|| no_such_property(path))?;
    read(nested, inner, rest, path)
}

/// Finds the value owning the last segment of `segments`, and its field.
fn locate_mut<'v>(
    schema: &Schema,
    owner: &'v mut dyn Reflect,
    segments: &[&str],
    path: &str,
) -> Result<(&'v mut dyn Reflect, Arc<FieldDescriptor>), ConfError> {
    let (first, rest) = segments
        .split_first()
        .ok_or_else(|| no_such_property(path))?;
    let field = Arc::clone(schema.get_field(first).ok_or_else(|| no_such_property(path))?);
    if rest.is_empty() {
        return Ok((owner, field));
    }

    let nested = Arc::clone(field.nested().ok_or_else(|| no_such_property(path))?);
    // computed parents have no storage to change in place
    let child = field
        .get_mut(owner)
        .ok_or_else(|| ConfError::ImmutableProperty {
            path: path.to_string(),
        })?;
    let child = unwrap_mut(child).ok_or_else(|| no_such_property(path))?;
    locate_mut(&nested, child, rest, path)
}

fn check_type(expected: TypeInfo, value: &dyn Reflect) -> Result<(), ConfError> {
    let found = value.reflect_info();
    if found == expected {
        Ok(())
    } else {
        Err(ConfError::mismatch(expected.path(), found.path()))
    }
}

/// Wraps `value` back into the `Option`/`Box` layers of `ty`.
fn rewrap(ty: TypeInfo, value: Box<dyn Reflect>) -> Result<Box<dyn Reflect>, ConfError> {
    match ty.kind() {
        TypeKind::Optional(wrapper) | TypeKind::Boxed(wrapper) => {
            let inner = rewrap((wrapper.inner)(), value)?;
            (wrapper.wrap)(Some(inner)).ok_or_else(|| ConfError::mismatch(ty.path(), "its inner value"))
        }
        _ => Ok(value),
    }
}

fn collection_parts(
    field: &FieldDescriptor,
    current: &dyn Reflect,
    path: &str,
) -> Result<(CollectionInfo, Vec<Box<dyn Reflect>>), ConfError> {
    let (TypeKind::Sequence(info) | TypeKind::Set(info)) = field.ty().unwrapped().kind() else {
        return Err(ConfError::NotACollection {
            path: path.to_string(),
        });
    };
    let items = match unwrap_ref(current).map(|value| value.reflect_ref()) {
        Some(ReflectRef::Sequence(items) | ReflectRef::Set(items)) => {
            items.into_iter().map(|item| item.clone_value()).collect()
        }
        _ => Vec::new(),
    };
    Ok((info, items))
}

fn rebuild_collection(
    ty: TypeInfo,
    info: CollectionInfo,
    items: Vec<Box<dyn Reflect>>,
) -> Result<Box<dyn Reflect>, ConfError> {
    let collection = (info.collect)(items).ok_or_else(|| ConfError::mismatch(ty.path(), "elements of another type"))?;
    rewrap(ty, collection)
}

type MapEntries = Vec<(String, Box<dyn Reflect>)>;

fn map_parts(
    field: &FieldDescriptor,
    current: &dyn Reflect,
    path: &str,
) -> Result<(MapInfo, MapEntries), ConfError> {
    let TypeKind::Map(info) = field.ty().unwrapped().kind() else {
        return Err(ConfError::NotAMap {
            path: path.to_string(),
        });
    };
    let entries = match unwrap_ref(current).map(|value| value.reflect_ref()) {
        Some(ReflectRef::Map(entries)) => entries
            .into_iter()
            .map(|(key, value)| (key, value.clone_value()))
            .collect(),
        _ => Vec::new(),
    };
    Ok((info, entries))
}

/// Runs `edit` through the field's handler, if it has one.
fn handled(
    field: &FieldDescriptor,
    edit: Edit<'_>,
    current: &dyn Reflect,
    path: &str,
) -> Option<Result<Box<dyn Reflect>, ConfError>> {
    let handler = field.handler()?;
    Some(handler.apply(edit, current).map_err(|err| match err {
        HandlerError::Veto(veto) => ConfError::PropertyVeto {
            field: path.to_string(),
            reason: veto.reason,
            message_key: veto.message_key,
        },
        HandlerError::Unsupported => ConfError::UnsupportedOperation {
            path: path.to_string(),
            operation: edit.name(),
        },
    }))
}

/// Reads user input for a value of type `ty`. Scalars take the text as is,
/// since their conversion already parses strings; other kinds go through the
/// HOCON value syntax.
fn text_node(ty: TypeInfo, text: &str) -> Node {
    let trimmed = text.trim();
    if matches!(ty.kind(), TypeKind::Optional(_)) && trimmed.eq_ignore_ascii_case("null") {
        return Node::null();
    }
    match ty.unwrapped().kind() {
        TypeKind::Scalar(_) | TypeKind::Enum(_) => Node::Scalar(Scalar::String(text.to_string())),
        _ => parser::parse_value(trimmed).unwrap_or_else(|_| Node::Scalar(Scalar::String(text.to_string()))),
    }
}

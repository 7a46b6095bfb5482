//! Runtime type metadata for values the engine can convert.
//!
//! [`Reflect`] is the object-safe view over a live value; [`Typed`] gives the
//! static [`TypeInfo`] of a type, including the constructors needed to
//! rebuild a value of that type from converted parts. Implementations exist
//! for the primitive scalars, `Option`, `Box`, the std collections and
//! `IndexMap`; user types opt in through [`scalar!`](crate::scalar),
//! [`enum_like!`](crate::enum_like) and [`configurable!`](crate::configurable).

use crate::node::Scalar;
use crate::schema::SchemaDraft;
use indexmap::IndexMap;
use std::any::{Any, TypeId};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;
use std::hash::Hash;

/// An object-safe view of a convertible value.
pub trait Reflect: Any + Send + Sync + fmt::Debug {
    /// The type information of the concrete value behind this reference.
    fn reflect_info(&self) -> TypeInfo;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;

    fn into_any(self: Box<Self>) -> Box<dyn Any>;

    fn clone_value(&self) -> Box<dyn Reflect>;

    /// Structural equality against another reflected value of the same type.
    fn reflect_eq(&self, other: &dyn Reflect) -> bool;

    fn reflect_ref(&self) -> ReflectRef<'_>;

    /// Mutable access to the wrapped value of `Option`, `Box` and [`Dynamic`].
    fn inner_mut(&mut self) -> Option<&mut dyn Reflect> {
        None
    }

    /// Replaces `self` with `value` when both have the same concrete type,
    /// handing the value back otherwise.
    fn apply(&mut self, value: Box<dyn Reflect>) -> Result<(), Box<dyn Reflect>>;

    #[inline]
    fn into_reflect(self) -> Box<dyn Reflect>
    where
        Self: Sized,
    {
        Box::new(self)
    }
}

impl dyn Reflect {
    #[inline]
    pub fn is<T: Any>(&self) -> bool {
        self.as_any().is::<T>()
    }

    #[inline]
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    #[inline]
    pub fn downcast_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.as_any_mut().downcast_mut::<T>()
    }

    /// Moves the value out of the box if it is a `T`.
    pub fn take<T: Any>(self: Box<Self>) -> Result<T, Box<dyn Reflect>> {
        if !self.is::<T>() {
            return Err(self);
        }
        match self.into_any().downcast::<T>() {
            Ok(value) => Ok(*value),
            Err(_) => unreachable!("type id checked above"),
        }
    }
}

/// Types with static type information.
pub trait Typed: Reflect + Clone + PartialEq {
    fn type_info() -> TypeInfo;
}

/// Static description of a type: identity, path and structural kind.
#[derive(Clone, Copy)]
pub struct TypeInfo {
    id: TypeId,
    path: &'static str,
    kind: TypeKind,
}

impl TypeInfo {
    pub fn new<T: Any>(kind: TypeKind) -> Self {
        Self {
            id: TypeId::of::<T>(),
            path: std::any::type_name::<T>(),
            kind,
        }
    }

    #[inline]
    pub fn of<T: Typed>() -> Self {
        T::type_info()
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    pub fn path(&self) -> &'static str {
        self.path
    }

    pub fn kind(&self) -> TypeKind {
        self.kind
    }

    pub fn is<T: Any>(&self) -> bool {
        self.id == TypeId::of::<T>()
    }

    pub fn compound(&self) -> Option<CompoundInfo> {
        match self.kind {
            TypeKind::Compound(info) => Some(info),
            _ => None,
        }
    }

    /// Element type of a sequence or set, value type of a map.
    pub fn element(&self) -> Option<TypeInfo> {
        match self.kind {
            TypeKind::Sequence(c) | TypeKind::Set(c) => Some((c.element)()),
            TypeKind::Map(m) => Some((m.value)()),
            _ => None,
        }
    }

    /// Looks through `Option` and `Box` layers to the type they carry.
    pub fn unwrapped(&self) -> TypeInfo {
        let mut info = *self;
        while let TypeKind::Optional(w) | TypeKind::Boxed(w) = info.kind {
            info = (w.inner)();
        }
        info
    }
}

impl PartialEq for TypeInfo {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeInfo {}

impl fmt::Debug for TypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeInfo")
            .field("path", &self.path)
            .field("kind", &self.kind.name())
            .finish()
    }
}

impl fmt::Display for TypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path)
    }
}

/// The structural kind of a type together with its constructors.
#[derive(Clone, Copy)]
pub enum TypeKind {
    Scalar(ScalarInfo),
    Sequence(CollectionInfo),
    Set(CollectionInfo),
    Map(MapInfo),
    Enum(EnumInfo),
    Optional(WrapperInfo),
    Boxed(WrapperInfo),
    Compound(CompoundInfo),
    /// A value whose concrete type is only known at runtime.
    Dynamic,
}

impl TypeKind {
    pub fn name(&self) -> &'static str {
        match self {
            TypeKind::Scalar(_) => "scalar",
            TypeKind::Sequence(_) => "sequence",
            TypeKind::Set(_) => "set",
            TypeKind::Map(_) => "map",
            TypeKind::Enum(_) => "enum",
            TypeKind::Optional(_) => "optional",
            TypeKind::Boxed(_) => "boxed",
            TypeKind::Compound(_) => "compound",
            TypeKind::Dynamic => "dynamic",
        }
    }
}

impl fmt::Debug for TypeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Clone, Copy)]
pub struct ScalarInfo {
    pub from_scalar: fn(&Scalar) -> Option<Box<dyn Reflect>>,
}

#[derive(Clone, Copy)]
pub struct CollectionInfo {
    pub element: fn() -> TypeInfo,
    /// Builds the collection from elements of the element type.
    pub collect: fn(Vec<Box<dyn Reflect>>) -> Option<Box<dyn Reflect>>,
}

#[derive(Clone, Copy)]
pub struct MapInfo {
    pub value: fn() -> TypeInfo,
    /// Builds the map from textual keys; the error carries the first key that
    /// does not parse.
    pub collect: fn(Vec<(String, Box<dyn Reflect>)>) -> Result<Box<dyn Reflect>, String>,
}

#[derive(Clone, Copy)]
pub struct EnumInfo {
    pub variants: &'static [&'static str],
    pub from_name: fn(&str) -> Option<Box<dyn Reflect>>,
}

#[derive(Clone, Copy)]
pub struct WrapperInfo {
    pub inner: fn() -> TypeInfo,
    /// Wraps a value of the inner type; `None` asks for the empty wrapper.
    pub wrap: fn(Option<Box<dyn Reflect>>) -> Option<Box<dyn Reflect>>,
}

#[derive(Clone, Copy)]
pub struct CompoundInfo {
    pub alias: Option<&'static str>,
    pub default: fn() -> Box<dyn Reflect>,
    pub describe: fn() -> SchemaDraft,
}

/// A borrowed, structural view of a value.
pub enum ReflectRef<'a> {
    Scalar(Scalar),
    Sequence(Vec<&'a dyn Reflect>),
    Set(Vec<&'a dyn Reflect>),
    Map(Vec<(String, &'a dyn Reflect)>),
    Variant(&'static str),
    Optional(Option<&'a dyn Reflect>),
    Boxed(&'a dyn Reflect),
    Dynamic(&'a dyn Reflect),
    /// Fields are reached through the type's schema.
    Compound,
}

/// Shared plumbing for `Reflect` impls of `Clone + PartialEq` types.
#[doc(hidden)]
#[macro_export]
macro_rules! reflect_boilerplate {
    () => {
        fn as_any(&self) -> &dyn ::std::any::Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn ::std::any::Any {
            self
        }

        fn into_any(self: ::std::boxed::Box<Self>) -> ::std::boxed::Box<dyn ::std::any::Any> {
            self
        }

        fn clone_value(&self) -> ::std::boxed::Box<dyn $crate::reflect::Reflect> {
            ::std::boxed::Box::new(::std::clone::Clone::clone(self))
        }

        fn reflect_eq(&self, other: &dyn $crate::reflect::Reflect) -> bool {
            other
                .as_any()
                .downcast_ref::<Self>()
                .map_or(false, |other| other == self)
        }

        fn apply(
            &mut self,
            value: ::std::boxed::Box<dyn $crate::reflect::Reflect>,
        ) -> ::std::result::Result<(), ::std::boxed::Box<dyn $crate::reflect::Reflect>> {
            *self = value.take::<Self>()?;
            ::std::result::Result::Ok(())
        }
    };
}

// ---------------------------------------------------------------------------
// Scalars
// ---------------------------------------------------------------------------

/// A type that is stored as a single [`Scalar`].
///
/// `from_scalar` is lenient: numbers parse from strings and integral floats
/// convert to integers, since text formats do not always preserve the
/// distinction.
pub trait ScalarValue: Clone + PartialEq + fmt::Debug + Send + Sync + 'static {
    fn to_scalar(&self) -> Scalar;
    fn from_scalar(scalar: &Scalar) -> Option<Self>;
}

#[doc(hidden)]
pub fn scalar_factory<T: ScalarValue + Reflect>(scalar: &Scalar) -> Option<Box<dyn Reflect>> {
    T::from_scalar(scalar).map(|value| Box::new(value) as Box<dyn Reflect>)
}

/// Implements [`Reflect`] and [`Typed`] for types implementing [`ScalarValue`].
#[macro_export]
macro_rules! scalar {
    ($($ty:ty),+ $(,)?) => {$(
        impl $crate::reflect::Reflect for $ty {
            fn reflect_info(&self) -> $crate::reflect::TypeInfo {
                <Self as $crate::reflect::Typed>::type_info()
            }

            fn reflect_ref(&self) -> $crate::reflect::ReflectRef<'_> {
                $crate::reflect::ReflectRef::Scalar($crate::reflect::ScalarValue::to_scalar(self))
            }

            $crate::reflect_boilerplate!();
        }

        impl $crate::reflect::Typed for $ty {
            fn type_info() -> $crate::reflect::TypeInfo {
                $crate::reflect::TypeInfo::new::<Self>($crate::reflect::TypeKind::Scalar(
                    $crate::reflect::ScalarInfo {
                        from_scalar: $crate::reflect::scalar_factory::<Self>,
                    },
                ))
            }
        }
    )+};
}

macro_rules! int_scalar {
    ($($ty:ty),+) => {$(
        impl ScalarValue for $ty {
            fn to_scalar(&self) -> Scalar {
                match i64::try_from(*self) {
                    Ok(value) => Scalar::Int(value),
                    Err(_) => Scalar::String(self.to_string()),
                }
            }

            fn from_scalar(scalar: &Scalar) -> Option<Self> {
                match scalar {
                    Scalar::Int(value) => <$ty>::try_from(*value).ok(),
                    // `as i128` saturates, so anything past the target range fails `try_from`.
                    Scalar::Float(value) if value.fract() == 0.0 => <$ty>::try_from(*value as i128).ok(),
                    Scalar::String(text) => text.trim().parse().ok(),
                    _ => None,
                }
            }
        }
    )+};
}

macro_rules! float_scalar {
    ($($ty:ty),+) => {$(
        impl ScalarValue for $ty {
            fn to_scalar(&self) -> Scalar {
                Scalar::Float(*self as f64)
            }

            fn from_scalar(scalar: &Scalar) -> Option<Self> {
                match scalar {
                    Scalar::Float(value) => Some(*value as $ty),
                    Scalar::Int(value) => Some(*value as $ty),
                    Scalar::String(text) => text.trim().parse().ok(),
                    _ => None,
                }
            }
        }
    )+};
}

int_scalar!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);
float_scalar!(f32, f64);

impl ScalarValue for bool {
    fn to_scalar(&self) -> Scalar {
        Scalar::Bool(*self)
    }

    fn from_scalar(scalar: &Scalar) -> Option<Self> {
        match scalar {
            Scalar::Bool(value) => Some(*value),
            Scalar::String(text) => match text.trim().to_ascii_lowercase().as_str() {
                "true" | "on" | "yes" => Some(true),
                "false" | "off" | "no" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }
}

impl ScalarValue for String {
    fn to_scalar(&self) -> Scalar {
        Scalar::String(self.clone())
    }

    fn from_scalar(scalar: &Scalar) -> Option<Self> {
        match scalar {
            Scalar::Null => None,
            other => Some(other.to_text()),
        }
    }
}

impl ScalarValue for char {
    fn to_scalar(&self) -> Scalar {
        Scalar::String(self.to_string())
    }

    fn from_scalar(scalar: &Scalar) -> Option<Self> {
        let text = scalar.as_str()?;
        let mut chars = text.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Some(c),
            _ => None,
        }
    }
}

impl ScalarValue for () {
    fn to_scalar(&self) -> Scalar {
        Scalar::Null
    }

    fn from_scalar(scalar: &Scalar) -> Option<Self> {
        matches!(scalar, Scalar::Null).then_some(())
    }
}

scalar!(bool, i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, f32, f64, String, char, ());

/// A type usable as a map key: rendered to and parsed from mapping key text.
pub trait MapKey: Clone + PartialEq + fmt::Debug + Send + Sync + 'static {
    fn to_key(&self) -> String;
    fn from_key(text: &str) -> Option<Self>;
}

impl<T: ScalarValue> MapKey for T {
    fn to_key(&self) -> String {
        self.to_scalar().to_text()
    }

    fn from_key(text: &str) -> Option<Self> {
        T::from_scalar(&Scalar::String(text.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Enum-likes
// ---------------------------------------------------------------------------

/// A fieldless enum stored by variant name.
pub trait EnumLike: Sized {
    const VARIANTS: &'static [&'static str];

    fn name(&self) -> &'static str;

    fn from_name(name: &str) -> Option<Self>;
}

#[doc(hidden)]
pub fn enum_factory<T: EnumLike + Reflect>(name: &str) -> Option<Box<dyn Reflect>> {
    T::from_name(name).map(|value| Box::new(value) as Box<dyn Reflect>)
}

/// Implements [`EnumLike`], [`ScalarValue`] and reflection for a fieldless
/// enum. Variant names match case-insensitively when read back.
///
/// ```
/// use confgraph::enum_like;
///
/// #[derive(Debug, Clone, Copy, PartialEq)]
/// enum Mode {
///     Survival,
///     Creative,
/// }
///
/// enum_like!(Mode { Survival, Creative });
/// ```
#[macro_export]
macro_rules! enum_like {
    ($ty:ident { $($variant:ident),+ $(,)? }) => {
        impl $crate::reflect::EnumLike for $ty {
            const VARIANTS: &'static [&'static str] = &[$(stringify!($variant)),+];

            fn name(&self) -> &'static str {
                match self {
                    $($ty::$variant => stringify!($variant),)+
                }
            }

            fn from_name(name: &str) -> ::std::option::Option<Self> {
                $(
                    if name.eq_ignore_ascii_case(stringify!($variant)) {
                        return ::std::option::Option::Some($ty::$variant);
                    }
                )+
                ::std::option::Option::None
            }
        }

        impl $crate::reflect::ScalarValue for $ty {
            fn to_scalar(&self) -> $crate::node::Scalar {
                $crate::node::Scalar::String(
                    $crate::reflect::EnumLike::name(self).to_string(),
                )
            }

            fn from_scalar(scalar: &$crate::node::Scalar) -> ::std::option::Option<Self> {
                scalar
                    .as_str()
                    .and_then(<Self as $crate::reflect::EnumLike>::from_name)
            }
        }

        impl $crate::reflect::Reflect for $ty {
            fn reflect_info(&self) -> $crate::reflect::TypeInfo {
                <Self as $crate::reflect::Typed>::type_info()
            }

            fn reflect_ref(&self) -> $crate::reflect::ReflectRef<'_> {
                $crate::reflect::ReflectRef::Variant($crate::reflect::EnumLike::name(self))
            }

            $crate::reflect_boilerplate!();
        }

        impl $crate::reflect::Typed for $ty {
            fn type_info() -> $crate::reflect::TypeInfo {
                $crate::reflect::TypeInfo::new::<Self>($crate::reflect::TypeKind::Enum(
                    $crate::reflect::EnumInfo {
                        variants: <Self as $crate::reflect::EnumLike>::VARIANTS,
                        from_name: $crate::reflect::enum_factory::<Self>,
                    },
                ))
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Collections
// ---------------------------------------------------------------------------

fn take_all<T: Any>(items: Vec<Box<dyn Reflect>>) -> Option<impl Iterator<Item = T>> {
    let items = items
        .into_iter()
        .map(|item| item.take::<T>().ok())
        .collect::<Option<Vec<T>>>()?;
    Some(items.into_iter())
}

fn collect_vec<T: Typed>(items: Vec<Box<dyn Reflect>>) -> Option<Box<dyn Reflect>> {
    let items: Vec<T> = take_all::<T>(items)?.collect();
    Some(Box::new(items))
}

fn collect_btree_set<T: Typed + Ord>(items: Vec<Box<dyn Reflect>>) -> Option<Box<dyn Reflect>> {
    let items: BTreeSet<T> = take_all::<T>(items)?.collect();
    Some(Box::new(items))
}

fn collect_hash_set<T: Typed + Eq + Hash>(items: Vec<Box<dyn Reflect>>) -> Option<Box<dyn Reflect>> {
    let items: HashSet<T> = take_all::<T>(items)?.collect();
    Some(Box::new(items))
}

fn take_entries<K: MapKey, V: Any>(
    entries: Vec<(String, Box<dyn Reflect>)>,
) -> Result<Vec<(K, V)>, String> {
    entries
        .into_iter()
        .map(|(key, value)| {
            let parsed = K::from_key(&key).ok_or_else(|| key.clone())?;
            let value = value.take::<V>().map_err(|_| key)?;
            Ok((parsed, value))
        })
        .collect()
}

fn collect_btree_map<K: MapKey + Ord, V: Typed>(
    entries: Vec<(String, Box<dyn Reflect>)>,
) -> Result<Box<dyn Reflect>, String> {
    let map: BTreeMap<K, V> = take_entries(entries)?.into_iter().collect();
    Ok(Box::new(map))
}

fn collect_hash_map<K: MapKey + Eq + Hash, V: Typed>(
    entries: Vec<(String, Box<dyn Reflect>)>,
) -> Result<Box<dyn Reflect>, String> {
    let map: HashMap<K, V> = take_entries(entries)?.into_iter().collect();
    Ok(Box::new(map))
}

fn collect_index_map<K: MapKey + Eq + Hash, V: Typed>(
    entries: Vec<(String, Box<dyn Reflect>)>,
) -> Result<Box<dyn Reflect>, String> {
    let map: IndexMap<K, V> = take_entries(entries)?.into_iter().collect();
    Ok(Box::new(map))
}

impl<T: Typed> Reflect for Vec<T> {
    fn reflect_info(&self) -> TypeInfo {
        Self::type_info()
    }

    fn reflect_ref(&self) -> ReflectRef<'_> {
        ReflectRef::Sequence(self.iter().map(|item| item as &dyn Reflect).collect())
    }

    crate::reflect_boilerplate!();
}

impl<T: Typed> Typed for Vec<T> {
    fn type_info() -> TypeInfo {
        TypeInfo::new::<Self>(TypeKind::Sequence(CollectionInfo {
            element: T::type_info,
            collect: collect_vec::<T>,
        }))
    }
}

impl<T: Typed + Ord> Reflect for BTreeSet<T> {
    fn reflect_info(&self) -> TypeInfo {
        Self::type_info()
    }

    fn reflect_ref(&self) -> ReflectRef<'_> {
        ReflectRef::Set(self.iter().map(|item| item as &dyn Reflect).collect())
    }

    crate::reflect_boilerplate!();
}

impl<T: Typed + Ord> Typed for BTreeSet<T> {
    fn type_info() -> TypeInfo {
        TypeInfo::new::<Self>(TypeKind::Set(CollectionInfo {
            element: T::type_info,
            collect: collect_btree_set::<T>,
        }))
    }
}

/// Text that orders hash-based elements the same way on every run.
fn order_key(item: &dyn Reflect) -> String {
    match item.reflect_ref() {
        ReflectRef::Scalar(scalar) => scalar.to_text(),
        ReflectRef::Variant(name) => name.to_string(),
        _ => format!("{item:?}"),
    }
}

fn keep_order(_entries: &mut [(String, &dyn Reflect)]) {}

fn sort_by_text_key(entries: &mut [(String, &dyn Reflect)]) {
    entries.sort_by(|a, b| a.0.cmp(&b.0));
}

impl<T: Typed + Eq + Hash> Reflect for HashSet<T> {
    fn reflect_info(&self) -> TypeInfo {
        Self::type_info()
    }

    fn reflect_ref(&self) -> ReflectRef<'_> {
        let mut items: Vec<&dyn Reflect> = self.iter().map(|item| item as &dyn Reflect).collect();
        items.sort_by_cached_key(|item| order_key(*item));
        ReflectRef::Set(items)
    }

    crate::reflect_boilerplate!();
}

impl<T: Typed + Eq + Hash> Typed for HashSet<T> {
    fn type_info() -> TypeInfo {
        TypeInfo::new::<Self>(TypeKind::Set(CollectionInfo {
            element: T::type_info,
            collect: collect_hash_set::<T>,
        }))
    }
}

macro_rules! map_reflect {
    ($map:ident, [$($bound:tt)+], $collect:ident, $order:ident) => {
        impl<K: MapKey + $($bound)+, V: Typed> Reflect for $map<K, V> {
            fn reflect_info(&self) -> TypeInfo {
                Self::type_info()
            }

            fn reflect_ref(&self) -> ReflectRef<'_> {
                let mut entries: Vec<(String, &dyn Reflect)> = self
                    .iter()
                    .map(|(key, value)| (key.to_key(), value as &dyn Reflect))
                    .collect();
                $order(&mut entries);
                ReflectRef::Map(entries)
            }

            crate::reflect_boilerplate!();
        }

        impl<K: MapKey + $($bound)+, V: Typed> Typed for $map<K, V> {
            fn type_info() -> TypeInfo {
                TypeInfo::new::<Self>(TypeKind::Map(MapInfo {
                    value: V::type_info,
                    collect: $collect::<K, V>,
                }))
            }
        }
    };
}

map_reflect!(BTreeMap, [Ord], collect_btree_map, keep_order);
map_reflect!(HashMap, [Eq + Hash], collect_hash_map, sort_by_text_key);
map_reflect!(IndexMap, [Eq + Hash], collect_index_map, keep_order);

// ---------------------------------------------------------------------------
// Wrappers
// ---------------------------------------------------------------------------

fn wrap_option<T: Typed>(inner: Option<Box<dyn Reflect>>) -> Option<Box<dyn Reflect>> {
    match inner {
        None => Some(Box::new(None::<T>)),
        Some(value) => value
            .take::<T>()
            .ok()
            .map(|value| Box::new(Some(value)) as Box<dyn Reflect>),
    }
}

fn wrap_box<T: Typed>(inner: Option<Box<dyn Reflect>>) -> Option<Box<dyn Reflect>> {
    let value = inner?.take::<T>().ok()?;
    Some(Box::new(Box::new(value)))
}

impl<T: Typed> Reflect for Option<T> {
    fn reflect_info(&self) -> TypeInfo {
        Self::type_info()
    }

    fn reflect_ref(&self) -> ReflectRef<'_> {
        ReflectRef::Optional(self.as_ref().map(|value| value as &dyn Reflect))
    }

    fn inner_mut(&mut self) -> Option<&mut dyn Reflect> {
        self.as_mut().map(|value| value as &mut dyn Reflect)
    }

    crate::reflect_boilerplate!();
}

impl<T: Typed> Typed for Option<T> {
    fn type_info() -> TypeInfo {
        TypeInfo::new::<Self>(TypeKind::Optional(WrapperInfo {
            inner: T::type_info,
            wrap: wrap_option::<T>,
        }))
    }
}

impl<T: Typed> Reflect for Box<T> {
    fn reflect_info(&self) -> TypeInfo {
        Self::type_info()
    }

    fn reflect_ref(&self) -> ReflectRef<'_> {
        ReflectRef::Boxed(&**self)
    }

    fn inner_mut(&mut self) -> Option<&mut dyn Reflect> {
        Some(&mut **self)
    }

    crate::reflect_boilerplate!();
}

impl<T: Typed> Typed for Box<T> {
    fn type_info() -> TypeInfo {
        TypeInfo::new::<Self>(TypeKind::Boxed(WrapperInfo {
            inner: T::type_info,
            wrap: wrap_box::<T>,
        }))
    }
}

/// A value of any reflected type, reconstructed from the type tag when read.
///
/// Untyped mappings come back as `IndexMap<String, Dynamic>`, sequences as
/// `Vec<Dynamic>`, and scalars as `bool`, `i64`, `f64`, `String` or `()`.
#[derive(Debug)]
pub struct Dynamic(pub Box<dyn Reflect>);

impl Dynamic {
    pub fn new<T: Reflect>(value: T) -> Self {
        Self(Box::new(value))
    }

    pub fn get<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }

    pub fn get_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.0.downcast_mut::<T>()
    }

    pub fn into_inner(self) -> Box<dyn Reflect> {
        self.0
    }

    /// Type information of the wrapped value.
    pub fn value_info(&self) -> TypeInfo {
        self.0.reflect_info()
    }
}

impl Default for Dynamic {
    fn default() -> Self {
        Self::new(())
    }
}

impl Clone for Dynamic {
    fn clone(&self) -> Self {
        Self(self.0.clone_value())
    }
}

impl PartialEq for Dynamic {
    fn eq(&self, other: &Self) -> bool {
        self.0.reflect_eq(&*other.0)
    }
}

impl Reflect for Dynamic {
    fn reflect_info(&self) -> TypeInfo {
        Self::type_info()
    }

    fn reflect_ref(&self) -> ReflectRef<'_> {
        ReflectRef::Dynamic(&*self.0)
    }

    fn inner_mut(&mut self) -> Option<&mut dyn Reflect> {
        Some(&mut *self.0)
    }

    crate::reflect_boilerplate!();
}

impl Typed for Dynamic {
    fn type_info() -> TypeInfo {
        TypeInfo::new::<Self>(TypeKind::Dynamic)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum Color {
        Red,
        DarkBlue,
    }

    crate::enum_like!(Color { Red, DarkBlue });

    #[test]
    fn test_take_and_downcast() {
        let boxed: Box<dyn Reflect> = Box::new(42i32);
        assert!(boxed.is::<i32>());
        assert_eq!(boxed.downcast_ref::<i32>(), Some(&42));

        let boxed = boxed.take::<String>().unwrap_err();
        assert_eq!(boxed.take::<i32>().unwrap(), 42);
    }

    #[test]
    fn test_lenient_scalars() {
        assert_eq!(i32::from_scalar(&Scalar::String(" 12 ".into())), Some(12));
        assert_eq!(u8::from_scalar(&Scalar::Int(300)), None);
        assert_eq!(i64::from_scalar(&Scalar::Float(3.0)), Some(3));
        assert_eq!(i64::from_scalar(&Scalar::Float(3.5)), None);
        assert_eq!(bool::from_scalar(&Scalar::String("on".into())), Some(true));
        assert_eq!(String::from_scalar(&Scalar::Float(1.5)), Some("1.5".into()));
        assert_eq!(u64::MAX.to_scalar(), Scalar::String(u64::MAX.to_string()));
    }

    #[test]
    fn test_whole_floats_out_of_range_are_refused() {
        assert_eq!(i64::from_scalar(&Scalar::Float(1e19)), None);
        assert_eq!(i64::from_scalar(&Scalar::Float(9_223_372_036_854_775_808.0)), None);
        assert_eq!(u64::from_scalar(&Scalar::Float(-1.0)), None);
        assert_eq!(u8::from_scalar(&Scalar::Float(256.0)), None);
        assert_eq!(i32::from_scalar(&Scalar::Float(f64::INFINITY)), None);
        assert_eq!(u64::from_scalar(&Scalar::Float(1e19)), Some(10_000_000_000_000_000_000));
        assert_eq!(i8::from_scalar(&Scalar::Float(-128.0)), Some(-128));
    }

    #[test]
    fn test_collect_rebuilds_collections() {
        let TypeKind::Sequence(info) = Vec::<String>::type_info().kind() else {
            panic!("expected a sequence");
        };
        let items: Vec<Box<dyn Reflect>> = vec![Box::new("a".to_string()), Box::new("b".to_string())];
        let rebuilt = (info.collect)(items).unwrap();
        assert_eq!(
            rebuilt.downcast_ref::<Vec<String>>(),
            Some(&vec!["a".to_string(), "b".to_string()])
        );

        // a wrong element type is refused
        assert!((info.collect)(vec![1i32.into_reflect()]).is_none());
    }

    #[test]
    fn test_map_collect_reports_bad_key() {
        let TypeKind::Map(info) = BTreeMap::<i32, bool>::type_info().kind() else {
            panic!("expected a map");
        };
        let err = (info.collect)(vec![("nope".to_string(), true.into_reflect())]).unwrap_err();
        assert_eq!(err, "nope");

        let ok = (info.collect)(vec![("7".to_string(), true.into_reflect())]).unwrap();
        assert_eq!(ok.downcast_ref::<BTreeMap<i32, bool>>().unwrap()[&7], true);
    }

    #[test]
    fn test_hash_collections_iterate_in_stable_order() {
        let forward: HashMap<String, i32> = (0..40).map(|i| (format!("k{i:02}"), i)).collect();
        let backward: HashMap<String, i32> = (0..40).rev().map(|i| (format!("k{i:02}"), i)).collect();
        let keys = |map: &HashMap<String, i32>| match map.reflect_ref() {
            ReflectRef::Map(entries) => entries.into_iter().map(|(key, _)| key).collect::<Vec<_>>(),
            _ => panic!("expected a map"),
        };
        let expected: Vec<String> = (0..40).map(|i| format!("k{i:02}")).collect();
        assert_eq!(keys(&forward), expected);
        assert_eq!(keys(&backward), expected);

        let set: HashSet<Color> = [Color::Red, Color::DarkBlue].into_iter().collect();
        let ReflectRef::Set(items) = set.reflect_ref() else {
            panic!("expected a set");
        };
        let names: Vec<String> = items.into_iter().map(order_key).collect();
        assert_eq!(names, vec!["DarkBlue", "Red"]);
    }

    #[test]
    fn test_enum_like() {
        assert_eq!(Color::VARIANTS, &["Red", "DarkBlue"]);
        assert_eq!(Color::from_name("darkblue"), Some(Color::DarkBlue));
        assert!(matches!(Color::Red.reflect_ref(), ReflectRef::Variant("Red")));
        assert_eq!(Color::DarkBlue.to_key(), "DarkBlue");
    }

    #[test]
    fn test_wrappers_unwrap_to_inner_type() {
        let info = Option::<Box<Vec<i32>>>::type_info();
        assert_eq!(info.unwrapped(), Vec::<i32>::type_info());
        assert_eq!(info.unwrapped().element(), Some(i32::type_info()));

        let mut value: Option<i32> = Some(3);
        let inner = value.inner_mut().unwrap();
        inner.apply(Box::new(9i32)).unwrap();
        assert_eq!(value, Some(9));
    }

    #[test]
    fn test_dynamic_equality_and_clone() {
        let a = Dynamic::new("x".to_string());
        let b = a.clone();
        assert_eq!(a, b);
        assert_ne!(a, Dynamic::new(1i64));
        assert_eq!(b.get::<String>().map(String::as_str), Some("x"));
    }
}

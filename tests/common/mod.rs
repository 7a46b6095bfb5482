#![allow(dead_code)]

use confgraph::reflect::{EnumInfo, ReflectRef};
use confgraph::{
    configurable, enum_like, Codec, ConfError, Configurable, Context, Converter, Dynamic, EnumLike,
    Node, Reflect, Scalar, ScalarValue, SchemaBuilder, TypeInfo, TypeKind, Typed, Validate, Veto,
};
use indexmap::IndexMap;
use std::any::Any;
use std::collections::{BTreeMap, BTreeSet, HashMap};

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Child {
    pub a_boolean: bool,
}

impl Configurable for Child {
    const ALIAS: Option<&'static str> = Some("Child");

    fn describe(schema: &mut SchemaBuilder<Self>) {
        schema.field("aBoolean", |c| &c.a_boolean, |c| &mut c.a_boolean);
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Parent {
    pub a_child: Child,
}

impl Configurable for Parent {
    const ALIAS: Option<&'static str> = Some("Parent");

    fn describe(schema: &mut SchemaBuilder<Self>) {
        schema.field("aChild", |p| &p.a_child, |p| &mut p.a_child);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Mode {
    #[default]
    Survival,
    Creative,
    Adventure,
}

enum_like!(Mode { Survival, Creative, Adventure });

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Comprehensive {
    pub flag: bool,
    pub small: u8,
    pub count: i32,
    pub big: i64,
    pub ratio: f64,
    pub letter: char,
    pub name: String,
    pub mode: Mode,
    pub nickname: Option<String>,
    pub child: Option<Child>,
    pub boxed: Box<Child>,
    pub list: Vec<String>,
    pub children: Vec<Child>,
    pub modes: BTreeSet<Mode>,
    pub scores: BTreeMap<String, i64>,
    pub lookup: HashMap<String, Child>,
    pub ordered: IndexMap<String, f64>,
    pub cache: u32,
}

impl Configurable for Comprehensive {
    const ALIAS: Option<&'static str> = Some("Comprehensive");

    fn describe(schema: &mut SchemaBuilder<Self>) {
        schema
            .field("flag", |c| &c.flag, |c| &mut c.flag)
            .rename("cbool")
            .comment("Renamed on disk");
        schema.field("small", |c| &c.small, |c| &mut c.small);
        schema.field("count", |c| &c.count, |c| &mut c.count);
        schema.field("big", |c| &c.big, |c| &mut c.big);
        schema.field("ratio", |c| &c.ratio, |c| &mut c.ratio);
        schema.field("letter", |c| &c.letter, |c| &mut c.letter);
        schema.field("name", |c| &c.name, |c| &mut c.name);
        schema.field("mode", |c| &c.mode, |c| &mut c.mode);
        schema.field("nickname", |c| &c.nickname, |c| &mut c.nickname);
        schema.field("child", |c| &c.child, |c| &mut c.child);
        schema.field("boxed", |c| &c.boxed, |c| &mut c.boxed);
        schema.field("list", |c| &c.list, |c| &mut c.list);
        schema.field("children", |c| &c.children, |c| &mut c.children);
        schema.field("modes", |c| &c.modes, |c| &mut c.modes);
        schema.field("scores", |c| &c.scores, |c| &mut c.scores);
        schema.field("lookup", |c| &c.lookup, |c| &mut c.lookup);
        schema.field("ordered", |c| &c.ordered, |c| &mut c.ordered);
        schema.field("cache", |c| &c.cache, |c| &mut c.cache).transient();
    }
}

/// A filled-in instance touching every field kind.
pub fn comprehensive() -> Comprehensive {
    let mut lookup = HashMap::new();
    lookup.insert("left".to_string(), Child { a_boolean: true });

    let mut ordered = IndexMap::new();
    ordered.insert("zeta".to_string(), 0.25);
    ordered.insert("alpha".to_string(), -3.5);

    Comprehensive {
        flag: true,
        small: 7,
        count: -42,
        big: 9_000_000_000,
        ratio: 0.75,
        letter: 'x',
        name: "server \"one\"".to_string(),
        mode: Mode::Creative,
        nickname: Some("srv".to_string()),
        child: Some(Child { a_boolean: true }),
        boxed: Box::new(Child { a_boolean: true }),
        list: vec!["a".to_string(), "b c".to_string(), "8080".to_string()],
        children: vec![Child { a_boolean: false }, Child { a_boolean: true }],
        modes: [Mode::Adventure, Mode::Survival].into_iter().collect(),
        scores: [("x".to_string(), 1), ("y".to_string(), -2)].into_iter().collect(),
        lookup,
        ordered,
        cache: 0,
    }
}

/// Contains itself through an optional box.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Node2 {
    pub next: Option<Box<Node2>>,
}

impl Configurable for Node2 {
    fn describe(schema: &mut SchemaBuilder<Self>) {
        schema.field("next", |n| &n.next, |n| &mut n.next);
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Unknown {
    pub value: i32,
}

impl Configurable for Unknown {
    fn describe(schema: &mut SchemaBuilder<Self>) {
        schema.field("value", |u| &u.value, |u| &mut u.value);
    }
}

/// Keeps the old name when the new one is shorter than four characters.
#[derive(Debug, Default)]
pub struct NameLength;

impl Validate<String> for NameLength {
    fn validate(&self, new: String, old: &String) -> Result<String, Veto> {
        if new.chars().count() < 4 {
            Ok(old.clone())
        } else {
            Ok(new)
        }
    }
}

/// Rejects anything outside 1..=65535.
#[derive(Debug, Default)]
pub struct PortRange;

impl Validate<u32> for PortRange {
    fn validate(&self, new: u32, _old: &u32) -> Result<u32, Veto> {
        if (1..=65535).contains(&new) {
            Ok(new)
        } else {
            Err(Veto::with_key("port.range", format!("{new} is not a valid port")))
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Server {
    pub name: String,
    pub host: String,
    pub port: u32,
    pub mode: Mode,
    pub motd: Vec<String>,
    pub limits: BTreeMap<String, u32>,
    pub extra: Option<Dynamic>,
}

impl Default for Server {
    fn default() -> Self {
        Self {
            name: "lobby".to_string(),
            host: "localhost".to_string(),
            port: 25565,
            mode: Mode::Survival,
            motd: vec!["Welcome".to_string()],
            limits: BTreeMap::new(),
            extra: None,
        }
    }
}

impl Configurable for Server {
    const ALIAS: Option<&'static str> = Some("Server");

    fn describe(schema: &mut SchemaBuilder<Self>) {
        schema
            .field("name", |s| &s.name, |s| &mut s.name)
            .validate_with::<NameLength>();
        schema
            .field("host", |s| &s.host, |s| &mut s.host)
            .comment("Address to bind");
        schema
            .field("port", |s| &s.port, |s| &mut s.port)
            .comments(["Port to listen on", "Must be between 1 and 65535"])
            .validate_with::<PortRange>();
        schema.field("mode", |s| &s.mode, |s| &mut s.mode);
        schema.field("motd", |s| &s.motd, |s| &mut s.motd);
        schema.field("limits", |s| &s.limits, |s| &mut s.limits);
        schema.field("extra", |s| &s.extra, |s| &mut s.extra);
    }
}

/// A base type embedded by [`Proxy`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Endpoint {
    pub address: String,
}

impl Configurable for Endpoint {
    const ALIAS: Option<&'static str> = Some("Endpoint");

    fn describe(schema: &mut SchemaBuilder<Self>) {
        schema.field("address", |e| &e.address, |e| &mut e.address);
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Proxy {
    pub endpoint: Endpoint,
    pub servers: Vec<Server>,
    pub fallback: Option<Server>,
    pub meta: Vec<Dynamic>,
}

impl Configurable for Proxy {
    const ALIAS: Option<&'static str> = Some("Proxy");

    fn describe(schema: &mut SchemaBuilder<Self>) {
        schema.extends(|p| &p.endpoint, |p| &mut p.endpoint);
        schema
            .field("servers", |p| &p.servers, |p| &mut p.servers)
            .comment("Backend servers");
        schema.field("fallback", |p| &p.fallback, |p| &mut p.fallback);
        schema.field("meta", |p| &p.meta, |p| &mut p.meta);
    }
}

/// A priority with a fixed set of named values, written without `enum_like!`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Level(u8);

impl Level {
    pub const LOW: Level = Level(1);
    pub const NORMAL: Level = Level(5);
    pub const HIGH: Level = Level(9);

    const NAMED: [(&'static str, Level); 3] = [
        ("Low", Level::LOW),
        ("Normal", Level::NORMAL),
        ("High", Level::HIGH),
    ];

    pub fn rank(self) -> u8 {
        self.0
    }
}

impl Default for Level {
    fn default() -> Self {
        Level::NORMAL
    }
}

impl EnumLike for Level {
    const VARIANTS: &'static [&'static str] = &["Low", "Normal", "High"];

    fn name(&self) -> &'static str {
        Self::NAMED
            .iter()
            .find(|(_, level)| level == self)
            .map_or("Normal", |(name, _)| *name)
    }

    fn from_name(name: &str) -> Option<Self> {
        Self::NAMED
            .iter()
            .find(|(known, _)| known.eq_ignore_ascii_case(name))
            .map(|(_, level)| *level)
    }
}

impl ScalarValue for Level {
    fn to_scalar(&self) -> Scalar {
        Scalar::String(self.name().to_string())
    }

    fn from_scalar(scalar: &Scalar) -> Option<Self> {
        scalar.as_str().and_then(Level::from_name)
    }
}

fn level_from_name(name: &str) -> Option<Box<dyn Reflect>> {
    Level::from_name(name).map(|level| Box::new(level) as Box<dyn Reflect>)
}

impl Reflect for Level {
    fn reflect_info(&self) -> TypeInfo {
        Level::type_info()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }

    fn clone_value(&self) -> Box<dyn Reflect> {
        Box::new(*self)
    }

    fn reflect_eq(&self, other: &dyn Reflect) -> bool {
        other.downcast_ref::<Level>() == Some(self)
    }

    fn reflect_ref(&self) -> ReflectRef<'_> {
        ReflectRef::Variant(self.name())
    }

    fn apply(&mut self, value: Box<dyn Reflect>) -> Result<(), Box<dyn Reflect>> {
        *self = value.take::<Level>()?;
        Ok(())
    }
}

impl Typed for Level {
    fn type_info() -> TypeInfo {
        TypeInfo::new::<Self>(TypeKind::Enum(EnumInfo {
            variants: Self::VARIANTS,
            from_name: level_from_name,
        }))
    }
}

/// Holds [`Level`] in every position a field can take.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Alarm {
    pub level: Level,
    pub escalation: Vec<Level>,
    pub fallback: Option<Level>,
}

impl Configurable for Alarm {
    const ALIAS: Option<&'static str> = Some("Alarm");

    fn describe(schema: &mut SchemaBuilder<Self>) {
        schema.field("level", |a| &a.level, |a| &mut a.level);
        schema.field("escalation", |a| &a.escalation, |a| &mut a.escalation);
        schema.field("fallback", |a| &a.fallback, |a| &mut a.fallback);
    }
}

/// Writes a child as its bare flag.
#[derive(Debug, Default)]
pub struct ChildAsFlag;

impl Converter for ChildAsFlag {
    fn serialize(&self, value: &dyn Reflect, _cx: &Codec<'_>) -> Result<Node, ConfError> {
        let child = value
            .downcast_ref::<Child>()
            .ok_or_else(|| ConfError::TypeMismatch {
                expected: "Child".to_string(),
                found: value.reflect_info().path().to_string(),
            })?;
        Ok(Node::from(child.a_boolean))
    }

    fn deserialize(
        &self,
        node: &Node,
        _info: TypeInfo,
        _cx: &Codec<'_>,
    ) -> Result<Box<dyn Reflect>, ConfError> {
        match node {
            Node::Scalar(Scalar::Bool(flag)) => Ok(Box::new(Child { a_boolean: *flag })),
            other => Err(ConfError::MalformedNode {
                type_name: "Child".to_string(),
                expected: "boolean",
                found: other.kind_name(),
            }),
        }
    }
}

configurable!(Child, Parent, Comprehensive, Node2, Unknown, Server, Endpoint, Proxy, Alarm);

pub fn context() -> Context {
    Context::builder()
        .register::<Child>()
        .and_then(|b| b.register::<Parent>())
        .and_then(|b| b.register::<Comprehensive>())
        .and_then(|b| b.register::<Server>())
        .and_then(|b| b.register::<Endpoint>())
        .and_then(|b| b.register::<Proxy>())
        .and_then(|b| b.register::<Alarm>())
        .and_then(|b| b.build())
        .unwrap()
}

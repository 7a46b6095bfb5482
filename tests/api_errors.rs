// Error values, their diagnostics and the conversions into ConfError.

mod common;

use common::*;
use confgraph::{
    configurable, Backend, BackendConfig, CommentMap, ConfError, Configurable, Context,
    FormatKind, Node, SchemaBuilder, Typed,
};
use miette::Diagnostic;

#[derive(Debug, Clone, PartialEq, Default)]
struct Ping {
    pong: Option<Box<Pong>>,
}

#[derive(Debug, Clone, PartialEq, Default)]
struct Pong {
    ping: Option<Box<Ping>>,
}

impl Configurable for Ping {
    fn describe(schema: &mut SchemaBuilder<Self>) {
        schema.field("pong", |p| &p.pong, |p| &mut p.pong);
    }
}

impl Configurable for Pong {
    fn describe(schema: &mut SchemaBuilder<Self>) {
        schema.field("ping", |p| &p.ping, |p| &mut p.ping);
    }
}

configurable!(Ping, Pong);

fn code(err: &ConfError) -> Option<String> {
    err.code().map(|code| code.to_string())
}

#[test]
fn test_unregistered_type_has_help() {
    let cx = context();
    let err = cx.serialize(&Unknown::default()).unwrap_err();
    assert_eq!(code(&err).as_deref(), Some("registry::unregistered_type"));
    assert!(err.help().is_some());
    assert!(err.to_string().contains("Unknown"));
}

#[test]
fn test_recursive_schema_names_the_chain() {
    let err = confgraph::Context::builder()
        .register::<Node2>()
        .and_then(|b| b.build())
        .unwrap_err();
    match &err {
        ConfError::RecursiveSchema { type_name, chain } => {
            assert!(type_name.ends_with("Node2"));
            assert_eq!(chain.matches("Node2").count(), 2);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(code(&err).as_deref(), Some("schema::recursive"));
}

#[test]
fn test_mutual_recursion_reports_first_registered_type() {
    let ping = Ping::type_info().path();
    let pong = Pong::type_info().path();

    for _ in 0..20 {
        let err = Context::builder()
            .register::<Ping>()
            .and_then(|b| b.register::<Pong>())
            .and_then(|b| b.build())
            .unwrap_err();
        match err {
            ConfError::RecursiveSchema { type_name, chain } => {
                assert_eq!(type_name, ping);
                assert_eq!(chain, format!("{ping} -> {pong} -> {ping}"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    let err = Context::builder()
        .register::<Pong>()
        .and_then(|b| b.register::<Ping>())
        .and_then(|b| b.build())
        .unwrap_err();
    assert!(matches!(err, ConfError::RecursiveSchema { type_name, .. } if type_name == pong));
}

#[test]
fn test_veto_is_recoverable() {
    let cx = context();
    let node: Node = serde_json::from_str(r#"{"port": 0}"#).unwrap();
    let err = cx.deserialize::<Server>(&node).unwrap_err();
    assert!(err.is_veto());
    assert_eq!(err.to_string(), "change to `port` was vetoed: 0 is not a valid port");

    let other = cx.deserialize_untyped(&Node::mapping()).unwrap_err();
    assert!(!other.is_veto());
}

#[test]
fn test_parser_error_is_transparent() {
    let cx = context();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.conf");
    std::fs::write(&path, "name = [unclosed\n").unwrap();

    let mut backend = Backend::new(&cx, BackendConfig::builder(&path).build());
    let err = backend.load::<Server>().unwrap_err();
    assert!(matches!(err, ConfError::Parser(_)));
    assert_eq!(code(&err).as_deref(), Some("parser::unexpected_eof"));
}

#[test]
fn test_io_error_for_missing_file() {
    let cx = context();
    let dir = tempfile::tempdir().unwrap();
    let config = BackendConfig::builder(dir.path().join("missing.yml")).build();
    let mut backend = Backend::new(&cx, config);
    assert!(matches!(backend.load::<Server>(), Err(ConfError::Io(_))));
}

#[test]
fn test_format_errors_are_wrapped() {
    let json = FormatKind::Json
        .handler()
        .parse("{ nope", "bad.json", &mut CommentMap::default())
        .unwrap_err();
    assert!(matches!(json, ConfError::Json(_)));
    assert_eq!(code(&json).as_deref(), Some("backend::json"));

    let yaml = FormatKind::Yaml
        .handler()
        .parse("a: [1, 2\nb: :", "bad.yml", &mut CommentMap::default())
        .unwrap_err();
    assert!(matches!(yaml, ConfError::Yaml(_)));
}

#[test]
fn test_type_mismatch_on_load_untyped_target() {
    let cx = context();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("child.json");
    std::fs::write(&path, r#"{"=$$=": "Child", "aBoolean": true}"#).unwrap();

    let mut backend = Backend::new(&cx, BackendConfig::builder(&path).build());
    assert!(matches!(
        backend.load::<Server>(),
        Err(ConfError::TagMismatch { .. })
    ));
    let value = backend.load_untyped().unwrap();
    assert_eq!(value.downcast_ref::<Child>(), Some(&Child { a_boolean: true }));
}

#[test]
fn test_report_renders() {
    let cx = context();
    let err = cx.serialize(&Unknown::default()).unwrap_err();
    let report = miette::Report::new(err);
    let rendered = format!("{report:?}");
    assert!(rendered.contains("registry::unregistered_type"));
}

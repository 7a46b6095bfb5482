//! Schema-driven object graph serialization.
//!
//! Types describe their fields once, through [`Configurable`]. A [`Context`]
//! registers them under stable aliases and converts values to and from
//! generic [`Node`] trees. Compound values always carry a type tag (`=$$=`),
//! so polymorphic graphs survive a round trip; a type that calls
//! `suppress_type_tag` omits it where its own type is the declared one. On
//! top of the trees sit file [`Backend`]s for JSON, YAML and HOCON that keep
//! comment blocks, and [`Properties`], a path-addressed view for validated
//! live edits.
//!
//! ```
//! use confgraph::{configurable, Configurable, Context, SchemaBuilder};
//!
//! #[derive(Debug, Clone, PartialEq, Default)]
//! struct Server {
//!     host: String,
//!     port: u16,
//! }
//!
//! impl Configurable for Server {
//!     const ALIAS: Option<&'static str> = Some("Server");
//!
//!     fn describe(schema: &mut SchemaBuilder<Self>) {
//!         schema.field("host", |s| &s.host, |s| &mut s.host);
//!         schema.field("port", |s| &s.port, |s| &mut s.port);
//!     }
//! }
//!
//! configurable!(Server);
//!
//! let cx = Context::builder().register::<Server>()?.build()?;
//! let server = Server { host: "localhost".into(), port: 8080 };
//! let node = cx.serialize(&server)?;
//! assert_eq!(cx.deserialize::<Server>(&node)?, server);
//! # Ok::<(), confgraph::ConfError>(())
//! ```

pub mod api;
pub mod backend;
pub mod comments;
pub mod config;
pub mod converter;
pub mod engine;
pub mod error;
pub mod field;
pub mod handler;
pub mod lexer;
pub mod mapper;
pub mod node;
pub mod parser;
pub mod properties;
pub mod reflect;
pub mod registry;
pub mod schema;
pub mod utils;
pub mod validator;

pub use api::{Context, ContextBuilder};
pub use backend::{Backend, Format, HoconFormat, JsonFormat, YamlFormat};
pub use comments::CommentMap;
pub use config::{BackendConfig, BackendConfigBuilder, FieldSeparator, FormatKind};
pub use converter::{Converter, ConverterSet, Family};
pub use engine::Codec;
pub use error::{ConfError, ParserError};
pub use field::FieldDescriptor;
pub use handler::{Edit, HandlerError, PropertyHandler, Stringify};
pub use node::{Node, Scalar, TYPE_TAG_KEY};
pub use properties::{Observer, Properties};
pub use reflect::{Dynamic, EnumLike, Reflect, ScalarValue, TypeInfo, TypeKind, Typed};
pub use schema::{Configurable, FieldOptions, Schema, SchemaBuilder};
pub use validator::{Validate, Veto};

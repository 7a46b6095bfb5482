use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

#[derive(Error, Debug, Diagnostic)]
pub enum ConfError {
    #[error("type `{type_name}` is not registered for serialization")]
    #[diagnostic(
        code(registry::unregistered_type),
        help("Register the type on the ContextBuilder before serializing or deserializing it.")
    )]
    UnregisteredType { type_name: String },

    #[error("type `{type_name}` contains itself through its fields ({chain})")]
    #[diagnostic(
        code(schema::recursive),
        help("Break the cycle with a collection field or a `Dynamic` value; direct nesting is expanded eagerly.")
    )]
    RecursiveSchema { type_name: String, chain: String },

    #[error("change to `{field}` was vetoed: {reason}")]
    #[diagnostic(code(properties::veto))]
    PropertyVeto {
        field: String,
        reason: String,
        /// Lookup key for a localized message, copied from the [`Veto`](crate::Veto).
        message_key: Option<String>,
    },

    #[error("expected a {expected} for `{type_name}`, found a {found}")]
    #[diagnostic(
        code(engine::malformed_node),
        help("The generic tree does not have the shape this converter expects.")
    )]
    MalformedNode {
        type_name: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("the node carries no type tag and no expected type was given")]
    #[diagnostic(
        code(engine::missing_type_tag),
        help("Deserialize with an explicit target type, or make sure the mapping contains the `=$$=` entry.")
    )]
    MissingTypeTag,

    #[error("type `{type_name}` is already registered as `{existing}`, cannot re-register it as `{requested}`")]
    #[diagnostic(
        code(registry::alias_conflict),
        help("Aliases must stay stable so previously saved data can still be read.")
    )]
    AliasConflict {
        type_name: String,
        existing: String,
        requested: String,
    },

    #[error("alias `{alias}` is already used by `{owner}`")]
    #[diagnostic(code(registry::alias_taken))]
    AliasTaken { alias: String, owner: String },

    #[error("type `{type_name}` is not a compound type")]
    #[diagnostic(
        code(schema::not_compound),
        help("Only types implementing `Configurable` have a schema and can be registered.")
    )]
    NotCompound { type_name: String },

    #[error("field key `{key}` appears more than once in `{type_name}`")]
    #[diagnostic(code(schema::duplicate_key))]
    DuplicateKey { type_name: String, key: String },

    #[error("field `{field}` of `{type_name}` uses the reserved type tag key")]
    #[diagnostic(
        code(schema::reserved_key),
        help("Rename the field; `=$$=` is reserved for the type tag.")
    )]
    ReservedKey { type_name: String, field: String },

    #[error("node is tagged as `{found}` but `{expected}` was expected")]
    #[diagnostic(code(engine::tag_mismatch))]
    TagMismatch { expected: String, found: String },

    #[error("expected a value of type `{expected}`, got `{found}`")]
    #[diagnostic(code(engine::type_mismatch))]
    TypeMismatch { expected: String, found: String },

    #[error("`{value}` is not a valid `{type_name}`")]
    #[diagnostic(code(engine::invalid_value))]
    InvalidValue { type_name: String, value: String },

    #[error("no property named `{path}`")]
    #[diagnostic(code(properties::no_such_property))]
    NoSuchProperty { path: String },

    #[error("property `{path}` cannot be modified")]
    #[diagnostic(code(properties::immutable))]
    ImmutableProperty { path: String },

    #[error("property `{path}` is not a collection")]
    #[diagnostic(code(properties::not_a_collection))]
    NotACollection { path: String },

    #[error("property `{path}` does not support `{operation}`")]
    #[diagnostic(code(properties::unsupported))]
    UnsupportedOperation { path: String, operation: &'static str },

    #[error("property `{path}` is not a map")]
    #[diagnostic(code(properties::not_a_map))]
    NotAMap { path: String },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Parser(#[from] ParserError),

    #[error("I/O error: {0}")]
    #[diagnostic(code(backend::io))]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    #[diagnostic(code(backend::json))]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    #[diagnostic(code(backend::yaml))]
    Yaml(#[from] serde_yaml::Error),
}

impl ConfError {
    pub(crate) fn malformed(type_name: &str, expected: &'static str, found: &'static str) -> Self {
        ConfError::MalformedNode {
            type_name: type_name.to_string(),
            expected,
            found,
        }
    }

    pub(crate) fn invalid(type_name: &str, value: impl Into<String>) -> Self {
        ConfError::InvalidValue {
            type_name: type_name.to_string(),
            value: value.into(),
        }
    }

    pub(crate) fn mismatch(expected: &str, found: &str) -> Self {
        ConfError::TypeMismatch {
            expected: expected.to_string(),
            found: found.to_string(),
        }
    }

    /// Whether the error is a validator veto, which callers usually surface
    /// to an end user instead of treating as a failure.
    pub fn is_veto(&self) -> bool {
        matches!(self, ConfError::PropertyVeto { .. })
    }
}

#[derive(Error, Debug, Diagnostic, Clone)]
#[error("Parser Error")]
pub enum ParserError {
    #[error("Unexpected token at {line}:{column}")]
    #[diagnostic(
        code(parser::unexpected_token),
        help("The parser found a token it did not expect in this position.")
    )]
    UnexpectedToken {
        #[source_code]
        src: NamedSource<String>,
        #[label("Expected {expected}, but found this")]
        span: SourceSpan,
        expected: String,
        line: usize,
        column: usize,
    },

    #[error("Unexpected end of file")]
    #[diagnostic(
        code(parser::unexpected_eof),
        help("The file ended unexpectedly. The parser expected more tokens.")
    )]
    UnexpectedEof {
        #[source_code]
        src: NamedSource<String>,
        #[label("File ended unexpectedly here")]
        span: SourceSpan,
    },

    #[error("Invalid token")]
    #[diagnostic(
        code(parser::invalid_token),
        help("Check for an unterminated string or a malformed number.")
    )]
    InvalidToken {
        #[source_code]
        src: NamedSource<String>,
        #[label("This could not be read")]
        span: SourceSpan,
    },
}

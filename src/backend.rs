//! File backends.
//!
//! A [`Backend`] converts values to [`Node`] trees with the context's codec
//! and stores them as JSON, YAML or HOCON text. YAML and HOCON keep the
//! comment blocks of a [`CommentMap`]: they are written above their keys and
//! recovered from the file on load.

use crate::api::Context;
use crate::comments::CommentMap;
use crate::config::{BackendConfig, FieldSeparator, FormatKind};
use crate::engine::Codec;
use crate::error::ConfError;
use crate::node::{Node, Scalar};
use crate::parser;
use crate::reflect::{Reflect, TypeInfo, Typed};
use indexmap::IndexMap;
use log::info;
use serde::Serialize;
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use tempfile::NamedTempFile;

/// Renders and parses one text format.
pub trait Format: Send + Sync {
    fn render(&self, node: &Node, comments: &CommentMap, config: &BackendConfig) -> Result<String, ConfError>;

    /// Parses `text`, adding the comment blocks it finds to `comments`.
    fn parse(&self, text: &str, name: &str, comments: &mut CommentMap) -> Result<Node, ConfError>;
}

impl FormatKind {
    pub fn handler(&self) -> &'static dyn Format {
        match self {
            FormatKind::Json => &JsonFormat,
            FormatKind::Yaml => &YamlFormat,
            FormatKind::Hocon => &HoconFormat,
        }
    }
}

/// Reads and writes a value at one path.
pub struct Backend<'cx> {
    cx: &'cx Context,
    config: BackendConfig,
    comments: CommentMap,
}

impl<'cx> Backend<'cx> {
    pub fn new(cx: &'cx Context, config: BackendConfig) -> Self {
        let comments = empty_comments(&config);
        Self {
            cx,
            config,
            comments,
        }
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    /// Comments written on the next save. Loading replaces them with the
    /// comments found in the file.
    pub fn comments(&self) -> &CommentMap {
        &self.comments
    }

    pub fn comments_mut(&mut self) -> &mut CommentMap {
        &mut self.comments
    }

    fn codec(&self) -> Codec<'_> {
        match self.config.converters() {
            Some(converters) => self.cx.with_converters(converters),
            None => self.cx.codec(),
        }
    }

    pub fn load<T: Typed>(&mut self) -> Result<T, ConfError> {
        let node = self.read()?;
        self.codec()
            .deserialize(&node, T::type_info())?
            .take::<T>()
            .map_err(|found| ConfError::mismatch(std::any::type_name::<T>(), found.reflect_info().path()))
    }

    /// Loads a value whose type comes from the tag stored in the file.
    pub fn load_untyped(&mut self) -> Result<Box<dyn Reflect>, ConfError> {
        let node = self.read()?;
        self.codec().deserialize_untyped(&node)
    }

    /// Loads the file, or writes and returns the default value when it does
    /// not exist yet.
    pub fn load_or_default<T: Typed + Default>(&mut self) -> Result<T, ConfError> {
        if self.config.path().exists() {
            return self.load();
        }
        info!(
            "{} does not exist, writing defaults",
            self.config.path().display()
        );
        let value = T::default();
        self.save(&value)?;
        Ok(value)
    }

    pub fn save<T: Typed>(&mut self, value: &T) -> Result<(), ConfError> {
        let node = self.codec().serialize_as(value, Some(T::type_info()))?;
        self.write(&node, T::type_info())
    }

    /// Saves a value of unknown static type; compound values keep their tag.
    pub fn save_dyn(&mut self, value: &dyn Reflect) -> Result<(), ConfError> {
        let node = self.codec().serialize(value)?;
        self.write(&node, value.reflect_info())
    }

    fn read(&mut self) -> Result<Node, ConfError> {
        let path = self.config.path();
        let text = fs::read_to_string(path)?;
        let mut comments = empty_comments(&self.config);
        let node = self
            .config
            .format()
            .handler()
            .parse(&text, &path.display().to_string(), &mut comments)?;
        strip_header(&mut comments, self.config.header());
        info!(
            "loaded {} ({} comment blocks)",
            path.display(),
            comments.len()
        );
        self.comments = comments;
        Ok(node)
    }

    fn write(&mut self, node: &Node, info: TypeInfo) -> Result<(), ConfError> {
        let target = info.unwrapped();
        if target.compound().is_some() {
            let schema = self.cx.mapper().schema(target)?;
            self.comments.merge_schema(&schema);
        }
        let text = self
            .config
            .format()
            .handler()
            .render(node, &self.comments, &self.config)?;
        write_atomic(self.config.path(), &text)?;
        info!("saved {}", self.config.path().display());
        Ok(())
    }
}

impl std::fmt::Debug for Backend<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backend")
            .field("config", &self.config)
            .field("comments", &self.comments)
            .finish_non_exhaustive()
    }
}

fn empty_comments(config: &BackendConfig) -> CommentMap {
    CommentMap::new(
        config.indent(),
        config.path_separator(),
        config.line_separator(),
    )
}

/// Writes to a temporary file next to `path` and moves it into place.
fn write_atomic(path: &Path, text: &str) -> Result<(), ConfError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;
    let mut file = NamedTempFile::new_in(dir)?;
    file.write_all(text.as_bytes())?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|err| err.error)?;
    Ok(())
}

/// Removes the header lines, and the blank line after them, from the block
/// they were read into.
fn strip_header(comments: &mut CommentMap, header: &[String]) {
    if header.is_empty() {
        return;
    }
    let Some((path, lines)) = comments
        .iter()
        .next()
        .map(|(path, lines)| (path.to_string(), lines.to_vec()))
    else {
        return;
    };
    let n = header.len();
    if lines.len() > n && lines[..n] == *header && lines[n].is_empty() {
        comments.set_comments_for_path(&path, lines[n + 1..].to_vec());
    }
}

fn finish(lines: Vec<String>, config: &BackendConfig) -> String {
    let separator = config.line_separator();
    let mut text = lines.join(separator);
    text.push_str(separator);
    text
}

fn push_header(lines: &mut Vec<String>, config: &BackendConfig) {
    if config.header().is_empty() {
        return;
    }
    let mut header = CommentMap::new(0, config.path_separator(), config.line_separator());
    header.set_comments_for_path("", config.header().iter().cloned());
    lines.push(header.comments_for_path(""));
    lines.push(String::new());
}

/// Double-quoted string with the escapes both YAML and HOCON read.
fn quote(text: &str) -> String {
    let mut quoted = String::with_capacity(text.len() + 2);
    quoted.push('"');
    for c in text.chars() {
        match c {
            '"' => quoted.push_str("\\\""),
            '\\' => quoted.push_str("\\\\"),
            '\n' => quoted.push_str("\\n"),
            '\r' => quoted.push_str("\\r"),
            '\t' => quoted.push_str("\\t"),
            c if c.is_control() => quoted.push_str(&format!("\\u{:04x}", u32::from(c))),
            c => quoted.push(c),
        }
    }
    quoted.push('"');
    quoted
}

fn float_text(value: f64) -> Option<String> {
    value.is_finite().then(|| format!("{value:?}"))
}

// ---------------------------------------------------------------------------
// JSON
// ---------------------------------------------------------------------------

/// Pretty-printed JSON. JSON has no comments, so none are written or read.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonFormat;

impl Format for JsonFormat {
    fn render(&self, node: &Node, _comments: &CommentMap, config: &BackendConfig) -> Result<String, ConfError> {
        let indent = " ".repeat(config.indent());
        let formatter = serde_json::ser::PrettyFormatter::with_indent(indent.as_bytes());
        let mut buffer = Vec::new();
        let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
        node.serialize(&mut serializer)?;
        let text = String::from_utf8(buffer)
            .map_err(|err| ConfError::Io(io::Error::new(io::ErrorKind::InvalidData, err)))?;
        Ok(finish(text.lines().map(str::to_string).collect(), config))
    }

    fn parse(&self, text: &str, _name: &str, _comments: &mut CommentMap) -> Result<Node, ConfError> {
        Ok(serde_json::from_str(text)?)
    }
}

// ---------------------------------------------------------------------------
// YAML
// ---------------------------------------------------------------------------

/// Block-style YAML with comment blocks above their keys.
///
/// Sequence items and values nested inside sequences are written in flow
/// style, so every key sits on its own line and comments can be placed
/// unambiguously.
#[derive(Debug, Default, Clone, Copy)]
pub struct YamlFormat;

impl Format for YamlFormat {
    fn render(&self, node: &Node, comments: &CommentMap, config: &BackendConfig) -> Result<String, ConfError> {
        let mut lines = Vec::new();
        push_header(&mut lines, config);
        match node {
            Node::Mapping(map) if !map.is_empty() => {
                yaml_mapping(&mut lines, map, "", 0, comments, config.indent());
            }
            other => lines.push(yaml_flow(other)),
        }
        Ok(finish(lines, config))
    }

    fn parse(&self, text: &str, _name: &str, comments: &mut CommentMap) -> Result<Node, ConfError> {
        let node: Node = serde_yaml::from_str(text)?;
        yaml_comments(text, comments);
        Ok(node)
    }
}

fn yaml_mapping(
    lines: &mut Vec<String>,
    map: &IndexMap<String, Node>,
    path: &str,
    depth: usize,
    comments: &CommentMap,
    indent: usize,
) {
    let pad = " ".repeat(depth * indent);
    for (key, value) in map {
        let child = comments.child_path(path, key);
        let block = comments.comments_for_path(&child);
        if !block.is_empty() {
            lines.push(block);
        }
        let key_text = yaml_string(key);
        match value {
            Node::Mapping(inner) if !inner.is_empty() => {
                lines.push(format!("{pad}{key_text}:"));
                yaml_mapping(lines, inner, &child, depth + 1, comments, indent);
            }
            Node::Sequence(items) if !items.is_empty() => {
                lines.push(format!("{pad}{key_text}:"));
                for item in items {
                    lines.push(format!("{pad}- {}", yaml_flow(item)));
                }
            }
            other => lines.push(format!("{pad}{key_text}: {}", yaml_flow(other))),
        }
    }
}

fn yaml_flow(node: &Node) -> String {
    match node {
        Node::Scalar(scalar) => yaml_scalar(scalar),
        Node::Sequence(items) => {
            let items: Vec<String> = items.iter().map(yaml_flow).collect();
            format!("[{}]", items.join(", "))
        }
        Node::Mapping(map) => {
            let entries: Vec<String> = map
                .iter()
                .map(|(key, value)| format!("{}: {}", yaml_string(key), yaml_flow(value)))
                .collect();
            format!("{{{}}}", entries.join(", "))
        }
    }
}

fn yaml_scalar(scalar: &Scalar) -> String {
    match scalar {
        Scalar::Bool(value) => value.to_string(),
        Scalar::Int(value) => value.to_string(),
        Scalar::Float(value) => match float_text(*value) {
            Some(text) => text,
            None if value.is_nan() => ".nan".to_string(),
            None if *value > 0.0 => ".inf".to_string(),
            None => "-.inf".to_string(),
        },
        Scalar::String(text) => yaml_string(text),
        Scalar::Null => "null".to_string(),
    }
}

const YAML_WORDS: &[&str] = &["true", "false", "yes", "no", "on", "off", "y", "n", "null", "~"];

/// Plain when the text cannot be mistaken for another scalar or for syntax.
fn yaml_string(text: &str) -> String {
    let plain = text.starts_with(|c: char| c.is_alphabetic() || c == '_')
        && !text.ends_with(' ')
        && text
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | '/' | ' '))
        && !YAML_WORDS.contains(&text.to_ascii_lowercase().as_str())
        && text.parse::<f64>().is_err();
    if plain {
        text.to_string()
    } else {
        quote(text)
    }
}

/// Recovers the comment blocks of a YAML document from its lines.
fn yaml_comments(text: &str, comments: &mut CommentMap) {
    let mut parents: Vec<(usize, String)> = Vec::new();
    let mut pending: Vec<String> = Vec::new();

    for line in text.lines() {
        let trimmed = line.trim_start();
        if trimmed.is_empty() {
            if !pending.is_empty() {
                pending.push(String::new());
            }
            continue;
        }
        if let Some(comment) = trimmed.strip_prefix('#') {
            let comment = comment.trim_end();
            pending.push(comment.strip_prefix(' ').unwrap_or(comment).to_string());
            continue;
        }
        let Some(key) = yaml_key(trimmed) else {
            pending.clear();
            continue;
        };

        let indent = line.len() - trimmed.len();
        while parents.last().map_or(false, |(level, _)| *level >= indent) {
            parents.pop();
        }
        let path = match parents.last() {
            Some((_, parent)) => comments.child_path(parent, &key),
            None => key,
        };
        if !pending.is_empty() {
            comments.set_comments_for_path(&path, std::mem::take(&mut pending));
        }
        parents.push((indent, path));
    }
}

/// The key of a `key: value` line, unquoted.
fn yaml_key(line: &str) -> Option<String> {
    if line.starts_with('-') {
        return None;
    }
    if line.starts_with('"') {
        let mut escaped = false;
        for (index, c) in line.char_indices().skip(1) {
            match c {
                '\\' if !escaped => escaped = true,
                '"' if !escaped => {
                    let rest = line[index + 1..].trim_start();
                    if !rest.starts_with(':') {
                        return None;
                    }
                    return serde_json::from_str::<String>(&line[..=index]).ok();
                }
                _ => escaped = false,
            }
        }
        return None;
    }
    let colon = line.find(':')?;
    Some(line[..colon].trim_end().to_string())
}

// ---------------------------------------------------------------------------
// HOCON
// ---------------------------------------------------------------------------

/// HOCON-style text: unquoted keys, `{ }` blocks and `#` comments.
#[derive(Debug, Default, Clone, Copy)]
pub struct HoconFormat;

impl Format for HoconFormat {
    fn render(&self, node: &Node, comments: &CommentMap, config: &BackendConfig) -> Result<String, ConfError> {
        let mut lines = Vec::new();
        push_header(&mut lines, config);
        let separator = config.field_separator().as_str();
        match node {
            Node::Mapping(map) => {
                hocon_members(&mut lines, map, "", 0, comments, config.indent(), separator);
            }
            other => lines.push(hocon_inline(other, separator)),
        }
        Ok(finish(lines, config))
    }

    fn parse(&self, text: &str, name: &str, comments: &mut CommentMap) -> Result<Node, ConfError> {
        Ok(parser::parse_document(text, name, comments)?)
    }
}

fn hocon_members(
    lines: &mut Vec<String>,
    map: &IndexMap<String, Node>,
    path: &str,
    depth: usize,
    comments: &CommentMap,
    indent: usize,
    separator: &str,
) {
    let pad = " ".repeat(depth * indent);
    for (key, value) in map {
        let child = comments.child_path(path, key);
        let block = comments.comments_for_path(&child);
        if !block.is_empty() {
            lines.push(block);
        }
        let key_text = hocon_string(key);
        match value {
            Node::Mapping(inner) if !inner.is_empty() => {
                lines.push(format!("{pad}{key_text} {{"));
                hocon_members(lines, inner, &child, depth + 1, comments, indent, separator);
                lines.push(format!("{pad}}}"));
            }
            other => lines.push(format!("{pad}{key_text}{separator}{}", hocon_inline(other, separator))),
        }
    }
}

/// One-line text of a node: scalars bare, anything else in HOCON syntax.
pub(crate) fn inline_text(node: &Node) -> String {
    match node {
        Node::Scalar(scalar) => scalar.to_text(),
        other => hocon_inline(other, FieldSeparator::Equals.as_str()),
    }
}

fn hocon_inline(node: &Node, separator: &str) -> String {
    match node {
        Node::Scalar(scalar) => hocon_scalar(scalar),
        Node::Sequence(items) => {
            let items: Vec<String> = items
                .iter()
                .map(|item| hocon_inline(item, separator))
                .collect();
            format!("[{}]", items.join(", "))
        }
        Node::Mapping(map) if map.is_empty() => "{}".to_string(),
        Node::Mapping(map) => {
            let entries: Vec<String> = map
                .iter()
                .map(|(key, value)| format!("{}{separator}{}", hocon_string(key), hocon_inline(value, separator)))
                .collect();
            format!("{{ {} }}", entries.join(", "))
        }
    }
}

fn hocon_scalar(scalar: &Scalar) -> String {
    match scalar {
        Scalar::Bool(value) => value.to_string(),
        Scalar::Int(value) => value.to_string(),
        Scalar::Float(value) => float_text(*value).unwrap_or_else(|| quote(&value.to_string())),
        Scalar::String(text) => hocon_string(text),
        Scalar::Null => "null".to_string(),
    }
}

const HOCON_WORDS: &[&str] = &["true", "false", "on", "off", "null"];

fn hocon_string(text: &str) -> String {
    let plain = text.starts_with(|c: char| c.is_alphabetic() || c == '_')
        && text
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '-')
        && !HOCON_WORDS.contains(&text);
    if plain {
        text.to_string()
    } else {
        quote(text)
    }
}

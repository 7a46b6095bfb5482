use crate::converter::ConverterSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Text formats a [`Backend`](crate::backend::Backend) can read and write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatKind {
    Json,
    Yaml,
    Hocon,
}

impl FormatKind {
    /// Guesses the format from a file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "json" => Some(FormatKind::Json),
            "yml" | "yaml" => Some(FormatKind::Yaml),
            "conf" | "hocon" => Some(FormatKind::Hocon),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            FormatKind::Json => "json",
            FormatKind::Yaml => "yml",
            FormatKind::Hocon => "conf",
        }
    }
}

/// How HOCON separates a key from its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FieldSeparator {
    #[default]
    Equals,
    Colon,
}

impl FieldSeparator {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldSeparator::Equals => " = ",
            FieldSeparator::Colon => ": ",
        }
    }
}

/// Settings of one file backend.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    path: PathBuf,
    format: FormatKind,
    converters: Option<Arc<ConverterSet>>,
    indent: usize,
    path_separator: char,
    line_separator: String,
    field_separator: FieldSeparator,
    header: Vec<String>,
}

impl BackendConfig {
    pub fn builder(path: impl Into<PathBuf>) -> BackendConfigBuilder {
        BackendConfigBuilder::new(path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> FormatKind {
        self.format
    }

    /// Converter set used instead of the context's, if any. Build it with
    /// [`ConverterSet::layer`] over [`Context::converters`](crate::Context::converters)
    /// to keep the context's entries.
    pub fn converters(&self) -> Option<&Arc<ConverterSet>> {
        self.converters.as_ref()
    }

    pub fn indent(&self) -> usize {
        self.indent
    }

    pub fn path_separator(&self) -> char {
        self.path_separator
    }

    pub fn line_separator(&self) -> &str {
        &self.line_separator
    }

    pub fn field_separator(&self) -> FieldSeparator {
        self.field_separator
    }

    /// Comment lines written at the top of the file.
    pub fn header(&self) -> &[String] {
        &self.header
    }
}

#[derive(Debug, Clone)]
pub struct BackendConfigBuilder {
    path: PathBuf,
    format: Option<FormatKind>,
    converters: Option<Arc<ConverterSet>>,
    indent: usize,
    path_separator: char,
    line_separator: String,
    field_separator: FieldSeparator,
    header: Vec<String>,
}

impl BackendConfigBuilder {
    fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            format: None,
            converters: None,
            indent: 2,
            path_separator: '.',
            line_separator: "\n".to_string(),
            field_separator: FieldSeparator::default(),
            header: Vec::new(),
        }
    }

    /// Overrides the format inferred from the file extension.
    pub fn format(mut self, format: FormatKind) -> Self {
        self.format = Some(format);
        self
    }

    /// Replaces the context's converter set for this backend.
    pub fn converters(mut self, converters: Arc<ConverterSet>) -> Self {
        self.converters = Some(converters);
        self
    }

    pub fn indent(mut self, indent: usize) -> Self {
        self.indent = indent;
        self
    }

    pub fn path_separator(mut self, separator: char) -> Self {
        self.path_separator = separator;
        self
    }

    pub fn line_separator(mut self, separator: impl Into<String>) -> Self {
        self.line_separator = separator.into();
        self
    }

    pub fn field_separator(mut self, separator: FieldSeparator) -> Self {
        self.field_separator = separator;
        self
    }

    pub fn header<I, S>(mut self, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.header = lines.into_iter().map(Into::into).collect();
        self
    }

    /// Files without a known extension default to YAML.
    pub fn build(self) -> BackendConfig {
        let format = self
            .format
            .or_else(|| FormatKind::from_path(&self.path))
            .unwrap_or(FormatKind::Yaml);
        BackendConfig {
            path: self.path,
            format,
            converters: self.converters,
            indent: self.indent,
            path_separator: self.path_separator,
            line_separator: self.line_separator,
            field_separator: self.field_separator,
            header: self.header,
        }
    }
}

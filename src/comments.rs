use crate::schema::Schema;
use indexmap::IndexMap;

const COMMENT_PREFIX: &str = "# ";

/// Comment blocks keyed by hierarchical path.
///
/// Lines are stored as given and formatted on the way out: every non-empty
/// line is prefixed with `# ` unless it already starts with `#`, then indented
/// by `indent` spaces per path separator; an empty line becomes a single
/// space so it survives as a blank line.
#[derive(Debug, Clone, PartialEq)]
pub struct CommentMap {
    indent: usize,
    separator: char,
    line_separator: String,
    blocks: IndexMap<String, Vec<String>>,
}

impl Default for CommentMap {
    fn default() -> Self {
        Self::new(2, '.', "\n")
    }
}

impl CommentMap {
    pub fn new(indent: usize, separator: char, line_separator: impl Into<String>) -> Self {
        Self {
            indent,
            separator,
            line_separator: line_separator.into(),
            blocks: IndexMap::new(),
        }
    }

    pub fn indent(&self) -> usize {
        self.indent
    }

    pub fn separator(&self) -> char {
        self.separator
    }

    pub fn line_separator(&self) -> &str {
        &self.line_separator
    }

    /// Replaces the block at `path`. An empty list of lines clears it.
    pub fn set_comments_for_path<I, S>(&mut self, path: &str, lines: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let lines: Vec<String> = lines.into_iter().map(Into::into).collect();
        if lines.is_empty() {
            self.blocks.shift_remove(path);
        } else {
            self.blocks.insert(path.to_string(), lines);
        }
    }

    /// The formatted block for `path`, or an empty string.
    pub fn comments_for_path(&self, path: &str) -> String {
        let Some(lines) = self.blocks.get(path) else {
            return String::new();
        };
        let leading = " ".repeat(self.depth(path) * self.indent);
        lines
            .iter()
            .map(|line| {
                if line.is_empty() {
                    " ".to_string()
                } else if line.starts_with('#') {
                    format!("{leading}{line}")
                } else {
                    format!("{leading}{COMMENT_PREFIX}{line}")
                }
            })
            .collect::<Vec<_>>()
            .join(&self.line_separator)
    }

    /// The lines stored for `path`, unformatted.
    pub fn raw(&self, path: &str) -> Option<&[String]> {
        self.blocks.get(path).map(Vec::as_slice)
    }

    pub fn has_comments(&self) -> bool {
        !self.blocks.is_empty()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.blocks.contains_key(path)
    }

    pub fn remove(&mut self, path: &str) -> Option<Vec<String>> {
        self.blocks.shift_remove(path)
    }

    pub fn clear(&mut self) {
        self.blocks.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.blocks
            .iter()
            .map(|(path, lines)| (path.as_str(), lines.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Nesting depth of a path: the number of separators in it.
    pub fn depth(&self, path: &str) -> usize {
        path.chars().filter(|c| *c == self.separator).count()
    }

    /// Joins a parent path and a key with the separator.
    pub fn child_path(&self, parent: &str, key: &str) -> String {
        if parent.is_empty() {
            key.to_string()
        } else {
            format!("{parent}{}{key}", self.separator)
        }
    }

    /// Fills blocks from the comments declared on `schema`'s fields and on
    /// nested schemas. Blocks that already exist are kept.
    pub fn merge_schema(&mut self, schema: &Schema) {
        self.merge_schema_at("", schema);
    }

    fn merge_schema_at(&mut self, prefix: &str, schema: &Schema) {
        for field in schema.fields() {
            if field.is_transient() {
                continue;
            }
            let path = self.child_path(prefix, field.key());
            if !field.comments().is_empty() && !self.blocks.contains_key(&path) {
                self.blocks.insert(path.clone(), field.comments().to_vec());
            }
            if let Some(nested) = field.nested() {
                self.merge_schema_at(&path, nested);
            }
        }
    }
}

use crate::comments::CommentMap;
use crate::error::ParserError;
use crate::lexer::{Lexer, Token, TokenType};
use crate::node::{Node, Scalar};
use crate::utils::get_line_and_column;
use indexmap::IndexMap;
use miette::NamedSource;
use std::sync::Arc;

/// A recursive descent parser for the HOCON-like text format.
///
/// Comment lines directly above a key are collected into a [`CommentMap`]
/// under the key's full path.
#[derive(Debug)]
pub struct Parser<'a> {
    source: Arc<NamedSource<String>>,
    tokens: Vec<Token>,
    /// Comment lines found before each token.
    leading: Vec<Vec<String>>,
    position: usize,
    source_text: &'a str,
    path_separator: char,
}

impl<'a> Parser<'a> {
    pub fn new(source_text: &'a str) -> Self {
        Self::new_with_name(source_text, "source.conf".to_string())
    }

    pub fn new_with_name(source_text: &'a str, name: String) -> Self {
        let source = Arc::new(NamedSource::new(name, source_text.to_string()));
        let mut tokens = Vec::new();
        let mut leading = Vec::new();
        let mut pending: Vec<String> = Vec::new();

        for token in Lexer::new(source_text).lex() {
            match token.ttype {
                TokenType::Comment(text) => pending.push(text),
                TokenType::Whitespace => {
                    // blank lines inside a comment block are kept as empty lines
                    if !pending.is_empty() {
                        let newlines = source_text[token.pos_start..token.pos_end]
                            .matches('\n')
                            .count();
                        pending.extend(std::iter::repeat(String::new()).take(newlines.saturating_sub(1)));
                    }
                }
                _ => {
                    leading.push(std::mem::take(&mut pending));
                    tokens.push(token);
                }
            }
        }

        Self {
            source,
            tokens,
            leading,
            position: 0,
            source_text,
            path_separator: '.',
        }
    }

    /// Separator used to join comment paths.
    pub fn with_path_separator(mut self, separator: char) -> Self {
        self.path_separator = separator;
        self
    }

    // === Main Parsing Methods ===

    /// Document ::= "{" MemberList "}" | MemberList
    pub fn parse_document(&mut self, comments: &mut CommentMap) -> Result<Node, ParserError> {
        if self.check(TokenType::LBracket) {
            let root = self.parse_value("", comments)?;
            self.expect(TokenType::Eof)?;
            return Ok(root);
        }
        let root = if self.check(TokenType::LBrace) {
            self.advance();
            let root = self.parse_members("", comments, TokenType::RBrace)?;
            self.expect(TokenType::RBrace)?;
            root
        } else {
            self.parse_members("", comments, TokenType::Eof)?
        };

        // After the root object, we expect the end of the file.
        self.expect(TokenType::Eof)?;
        Ok(Node::Mapping(root))
    }

    /// Parses a single value spanning the whole input.
    pub fn parse_single_value(&mut self) -> Result<Node, ParserError> {
        let mut ignored = CommentMap::default();
        let value = self.parse_value("", &mut ignored)?;
        self.expect(TokenType::Eof)?;
        Ok(value)
    }

    /// MemberList ::= { Member [ "," ] }
    fn parse_members(
        &mut self,
        path: &str,
        comments: &mut CommentMap,
        end: TokenType,
    ) -> Result<IndexMap<String, Node>, ParserError> {
        let mut members = IndexMap::new();
        while !self.check(end.clone()) && !self.check(TokenType::Eof) {
            self.parse_member(path, comments, &mut members)?;
            self.match_token(TokenType::Comma);
        }
        Ok(members)
    }

    /// Member ::= Key ( Object | ( "=" | ":" ) Value )
    fn parse_member(
        &mut self,
        path: &str,
        comments: &mut CommentMap,
        members: &mut IndexMap<String, Node>,
    ) -> Result<(), ParserError> {
        let leading = self.leading.get(self.position).cloned().unwrap_or_default();
        let segments = self.parse_key()?;
        let full_path = segments
            .iter()
            .fold(path.to_string(), |prefix, segment| self.join(&prefix, segment));
        if !leading.is_empty() {
            comments.set_comments_for_path(&full_path, leading);
        }

        if !self.check(TokenType::LBrace) && !self.match_token(TokenType::Equals) {
            self.expect(TokenType::Colon)?;
        }
        let value = self.parse_value(&full_path, comments)?;
        insert_path(members, &segments, value);
        Ok(())
    }

    /// Key ::= KeySegment { "." KeySegment }
    fn parse_key(&mut self) -> Result<Vec<String>, ParserError> {
        let mut segments = vec![self.parse_key_segment()?];
        while self.match_token(TokenType::Dot) {
            segments.push(self.parse_key_segment()?);
        }
        Ok(segments)
    }

    /// KeySegment ::= String | Identifier | Integer | keyword
    fn parse_key_segment(&mut self) -> Result<String, ParserError> {
        let token = self.current_token()?.clone();
        let segment = match token.ttype {
            TokenType::String(text) => text,
            TokenType::Identifier(_)
            | TokenType::Integer(_)
            | TokenType::True
            | TokenType::False
            | TokenType::Null => self.source_text[token.pos_start..token.pos_end].to_string(),
            _ => return self.err_unexpected("a key"),
        };
        self.advance();
        Ok(segment)
    }

    /// Value ::= Object | Array | String | Number | Boolean | Null | Unquoted
    fn parse_value(&mut self, path: &str, comments: &mut CommentMap) -> Result<Node, ParserError> {
        let start_token = self.current_token()?.clone();
        let scalar = match start_token.ttype {
            TokenType::LBrace => {
                self.advance();
                let members = self.parse_members(path, comments, TokenType::RBrace)?;
                self.expect(TokenType::RBrace)?;
                return Ok(Node::Mapping(members));
            }
            TokenType::LBracket => return self.parse_array(path, comments),
            TokenType::Identifier(_) => return Ok(self.parse_unquoted()),
            TokenType::String(text) => Scalar::String(text),
            TokenType::Integer(n) => Scalar::Int(n),
            TokenType::Float(n) => Scalar::Float(n),
            TokenType::True => Scalar::Bool(true),
            TokenType::False => Scalar::Bool(false),
            TokenType::Null => Scalar::Null,
            _ => return self.err_unexpected("a value"),
        };
        self.advance();
        Ok(Node::Scalar(scalar))
    }

    /// Array ::= "[" { Value [ "," ] } "]"
    fn parse_array(&mut self, path: &str, comments: &mut CommentMap) -> Result<Node, ParserError> {
        self.expect(TokenType::LBracket)?;
        let mut values = Vec::new();
        while !self.check(TokenType::RBracket) {
            values.push(self.parse_value(path, comments)?);
            if !self.match_token(TokenType::Comma) {
                break;
            }
        }
        self.expect(TokenType::RBracket)?;
        Ok(Node::Sequence(values))
    }

    /// An unquoted string: adjacent identifier, number and dot tokens read as
    /// one piece of text, so `com.example.Main` stays whole.
    fn parse_unquoted(&mut self) -> Node {
        let start = self.tokens[self.position].pos_start;
        let mut end = self.tokens[self.position].pos_end;
        self.advance();
        while let Some(token) = self.tokens.get(self.position) {
            let joins = matches!(
                token.ttype,
                TokenType::Identifier(_) | TokenType::Dot | TokenType::Integer(_) | TokenType::Float(_)
            );
            if !joins || token.pos_start != end {
                break;
            }
            end = token.pos_end;
            self.advance();
        }
        Node::Scalar(Scalar::String(self.source_text[start..end].to_string()))
    }

    fn join(&self, prefix: &str, segment: &str) -> String {
        if prefix.is_empty() {
            segment.to_string()
        } else {
            format!("{prefix}{}{segment}", self.path_separator)
        }
    }

    // === Helper Methods ===

    fn current_token(&self) -> Result<&Token, ParserError> {
        self.tokens
            .get(self.position)
            .ok_or_else(|| self.eof_error())
    }

    fn eof_error(&self) -> ParserError {
        let pos = self.source_text.len().saturating_sub(1);
        ParserError::UnexpectedEof {
            src: (*self.source).clone(),
            span: (pos, 0).into(),
        }
    }

    fn advance(&mut self) {
        if self.position < self.tokens.len() {
            self.position += 1;
        }
    }

    fn expect(&mut self, expected: TokenType) -> Result<(), ParserError> {
        let token = self.current_token()?;
        if std::mem::discriminant(&token.ttype) == std::mem::discriminant(&expected) {
            self.advance();
            Ok(())
        } else {
            self.err_unexpected(&format!("{:?}", expected))
        }
    }

    fn match_token(&mut self, ttype: TokenType) -> bool {
        if self.check(ttype) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn check(&self, ttype: TokenType) -> bool {
        if let Ok(token) = self.current_token() {
            std::mem::discriminant(&token.ttype) == std::mem::discriminant(&ttype)
        } else {
            false
        }
    }

    fn err_unexpected<T>(&self, expected: &str) -> Result<T, ParserError> {
        let token = self.current_token()?;
        let span = (token.pos_start, token.pos_end - token.pos_start).into();
        match token.ttype {
            TokenType::Eof => Err(ParserError::UnexpectedEof {
                src: (*self.source).clone(),
                span,
            }),
            TokenType::Unknown => Err(ParserError::InvalidToken {
                src: (*self.source).clone(),
                span,
            }),
            _ => {
                let (line, column) = get_line_and_column(self.source_text, token.pos_start);
                Err(ParserError::UnexpectedToken {
                    src: (*self.source).clone(),
                    span,
                    expected: expected.to_string(),
                    line,
                    column,
                })
            }
        }
    }
}

/// Inserts `value` under a dotted key, creating intermediate mappings.
/// Mappings given twice are merged; anything else is replaced.
fn insert_path(members: &mut IndexMap<String, Node>, segments: &[String], value: Node) {
    let Some((last, parents)) = segments.split_last() else {
        return;
    };
    let mut target = members;
    for segment in parents {
        let entry = target.entry(segment.clone()).or_insert_with(Node::mapping);
        if !matches!(entry, Node::Mapping(_)) {
            *entry = Node::mapping();
        }
        let Node::Mapping(next) = entry else {
            return;
        };
        target = next;
    }
    if let Node::Mapping(incoming) = value {
        if let Some(Node::Mapping(existing)) = target.get_mut(last) {
            for (key, node) in incoming {
                insert_path(existing, &[key], node);
            }
            return;
        }
        target.insert(last.clone(), Node::Mapping(incoming));
    } else {
        target.insert(last.clone(), value);
    }
}

/// Parses one value in the text syntax, such as `[1, 2]` or `{ a = 1 }`.
pub fn parse_value(text: &str) -> Result<Node, ParserError> {
    Parser::new_with_name(text, "value".to_string()).parse_single_value()
}

/// Parses a whole document, collecting comments into `comments`.
pub fn parse_document(text: &str, name: &str, comments: &mut CommentMap) -> Result<Node, ParserError> {
    Parser::new_with_name(text, name.to_string())
        .with_path_separator(comments.separator())
        .parse_document(comments)
}

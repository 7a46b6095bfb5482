/// Represents the different kinds of tokens that the lexer can produce.
/// Each token is a meaningful unit of the HOCON-like text format.
#[derive(Debug, PartialEq, Clone)]
pub enum TokenType {
    // == Special Tokens ==
    /// Represents the end of the input file.
    Eof,
    /// Represents a sequence of one or more whitespace characters (spaces, tabs, newlines).
    Whitespace,
    /// Represents a comment, starting with `#` or `//` and continuing to the end of the line.
    /// The associated `String` holds the text after the marker, minus one leading space.
    Comment(String),
    /// Represents a token that could not be recognized by the lexer.
    Unknown,

    // == Literals ==
    /// An unquoted key or string value.
    /// Examples: `name`, `max-size`, `DarkBlue`.
    Identifier(String),
    /// A string literal, enclosed in double quotes.
    /// The associated `String` holds the content of the string.
    String(String),
    /// An integer literal.
    Integer(i64),
    /// A floating-point literal, or an integer too large for `u64`.
    Float(f64),

    // == Keywords ==
    /// The boolean `true` value, can be written as `true` or `on`.
    True,
    /// The boolean `false` value, can be written as `false` or `off`.
    False,
    /// The `null` keyword, representing an empty or absent value.
    Null,

    // == Punctuation & Operators ==
    /// Left Brace: `{`
    LBrace,
    /// Right Brace: `}`
    RBrace,
    /// Left Bracket: `[`
    LBracket,
    /// Right Bracket: `]`
    RBracket,
    /// Comma: `,`
    Comma,
    /// Colon: `:` (separates a key from its value)
    Colon,
    /// Equals: `=` (separates a key from its value)
    Equals,
    /// Dot: `.` (joins the segments of a dotted key)
    Dot,
}

/// A token with its type and position
#[derive(Debug, Clone)]
pub struct Token {
    pub ttype: TokenType,
    pub pos_start: usize,
    pub pos_end: usize,
}

impl Token {
    pub fn new(ttype: TokenType, pos_start: usize, pos_end: usize) -> Token {
        Token {
            ttype,
            pos_start,
            pos_end,
        }
    }
}

pub struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    position: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            chars: input.chars().peekable(),
            position: 0,
        }
    }

    pub fn lex(&mut self) -> Vec<Token> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token();
            if token.ttype == TokenType::Eof {
                tokens.push(token);
                break;
            }
            tokens.push(token);
        }
        tokens
    }

    pub fn next_token(&mut self) -> Token {
        let start_pos = self.position;

        let ttype = if let Some(char) = self.advance() {
            match char {
                '{' => TokenType::LBrace,
                '}' => TokenType::RBrace,
                '[' => TokenType::LBracket,
                ']' => TokenType::RBracket,
                ',' => TokenType::Comma,
                ':' => TokenType::Colon,
                '=' => TokenType::Equals,
                '.' => TokenType::Dot,
                '#' => self.read_comment(),
                '/' => {
                    if self.peek() == Some(&'/') {
                        self.advance();
                        self.read_comment()
                    } else {
                        TokenType::Unknown
                    }
                }
                '"' => self.read_string(),
                c if c.is_whitespace() => self.read_whitespace(),
                c if c.is_alphabetic() || c == '_' => self.read_identifier(c),
                c if c.is_ascii_digit()
                    || (c == '-' && self.peek().map_or(false, |c| c.is_ascii_digit())) =>
                {
                    self.read_number(c)
                }

                _ => TokenType::Unknown,
            }
        } else {
            TokenType::Eof
        };

        Token::new(ttype, start_pos, self.position)
    }

    fn advance(&mut self) -> Option<char> {
        let char = self.chars.next();
        if let Some(c) = char {
            self.position += c.len_utf8();
        }
        char
    }

    fn peek(&mut self) -> Option<&char> {
        self.chars.peek()
    }

    /// Consumes the next character if it satisfies `accept`.
    fn advance_if(&mut self, accept: impl Fn(char) -> bool) -> Option<char> {
        match self.peek() {
            Some(&c) if accept(c) => self.advance(),
            _ => None,
        }
    }

    fn read_whitespace(&mut self) -> TokenType {
        while self.advance_if(char::is_whitespace).is_some() {}
        TokenType::Whitespace
    }

    fn read_comment(&mut self) -> TokenType {
        let mut comment_text = String::new();
        while let Some(c) = self.advance_if(|c| c != '\n') {
            comment_text.push(c);
        }
        let comment_text = comment_text.trim_end();
        let comment_text = comment_text.strip_prefix(' ').unwrap_or(comment_text);
        TokenType::Comment(comment_text.to_string())
    }

    fn read_string(&mut self) -> TokenType {
        let mut value = String::new();
        while let Some(c) = self.advance() {
            match c {
                '"' => return TokenType::String(value),
                '\\' => match self.advance() {
                    Some('"') => value.push('"'),
                    Some('\\') => value.push('\\'),
                    Some('n') => value.push('\n'),
                    Some('r') => value.push('\r'),
                    Some('t') => value.push('\t'),
                    Some('u') => match self.read_unicode_escape() {
                        Some(c) => value.push(c),
                        None => return TokenType::Unknown,
                    },
                    Some(escaped_char) => {
                        value.push('\\');
                        value.push(escaped_char);
                    }
                    None => return TokenType::Unknown, // Unclosed escape sequence
                },
                c => value.push(c),
            }
        }
        TokenType::Unknown // Unclosed string
    }

    /// The four hex digits after `\u`.
    fn read_unicode_escape(&mut self) -> Option<char> {
        let mut code = 0u32;
        for _ in 0..4 {
            let digit = self.advance()?.to_digit(16)?;
            code = code * 16 + digit;
        }
        char::from_u32(code)
    }

    fn read_identifier(&mut self, first_char: char) -> TokenType {
        let mut ident = String::new();
        ident.push(first_char);

        while let Some(c) = self.advance_if(|c| c.is_alphanumeric() || c == '_' || c == '-') {
            ident.push(c);
        }

        match ident.as_str() {
            "true" | "on" => TokenType::True,
            "false" | "off" => TokenType::False,
            "null" => TokenType::Null,
            _ => TokenType::Identifier(ident),
        }
    }

    fn read_number(&mut self, first_char: char) -> TokenType {
        let mut number_str = String::new();
        number_str.push(first_char);
        let mut has_dot = false;
        let mut has_exponent = false;

        loop {
            if let Some(c) = self.advance_if(|c| c.is_ascii_digit()) {
                number_str.push(c);
            } else if !has_dot && !has_exponent && self.next_is_fraction() {
                has_dot = true;
                number_str.extend(self.advance());
            } else if let Some(c) = self.advance_if(|c| (c == 'e' || c == 'E') && !has_exponent) {
                has_exponent = true;
                number_str.push(c);
                // Check for optional sign after 'e' or 'E'
                if let Some(sign) = self.advance_if(|c| c == '+' || c == '-') {
                    number_str.push(sign);
                }
            } else {
                break;
            }
        }

        if !has_dot && !has_exponent {
            if let Ok(num) = number_str.parse::<i64>() {
                return TokenType::Integer(num);
            }
            // Kept as text so unsigned values past `i64::MAX` stay exact.
            if number_str.parse::<u64>().is_ok() {
                return TokenType::Identifier(number_str);
            }
        }
        match number_str.parse::<f64>() {
            Ok(num) => TokenType::Float(num),
            Err(_) => TokenType::Unknown,
        }
    }

    /// A `.` only continues a number when a digit follows it, so `1.x`
    /// stays a dotted key.
    fn next_is_fraction(&self) -> bool {
        let mut ahead = self.chars.clone();
        ahead.next() == Some('.') && ahead.next().map_or(false, |c| c.is_ascii_digit())
    }
}

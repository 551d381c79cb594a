// Copyright 2024 OctoFHIR Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Tokenizer for FHIRPath expressions
//!
//! Produces zero-copy tokens borrowing from the input. String literals are
//! returned raw; escape sequences are resolved by the parser.

use super::error::{ParseError, ParseResult};
use once_cell::sync::Lazy;
use rustc_hash::FxHashMap;

/// Token with zero-copy string slices
#[derive(Debug, Clone, PartialEq)]
pub enum Token<'input> {
    // Literals
    /// Integer literal (e.g., 42)
    Integer(i64),
    /// Decimal literal as string slice, parsed on demand (e.g., 3.14)
    Decimal(&'input str),
    /// String literal content between the quotes, escapes unresolved
    String(&'input str),
    /// Date literal without the `@` (e.g., 2023-01-01)
    Date(&'input str),
    /// DateTime literal without the `@` (e.g., 2023-01-01T12:00:00Z)
    DateTime(&'input str),
    /// Time literal without the `@T` (e.g., 12:00:00)
    Time(&'input str),

    /// Identifier token
    Identifier(&'input str),
    /// Backtick-delimited identifier, never treated as a keyword
    DelimitedIdentifier(&'input str),

    /// Addition operator (+)
    Plus,
    /// Subtraction operator (-)
    Minus,
    /// Multiplication operator (*)
    Multiply,
    /// Division operator (/)
    Divide,
    /// Modulo operator (mod keyword)
    Mod,
    /// Integer division operator (div keyword)
    Div,
    /// Equality operator (=)
    Equal,
    /// Inequality operator (!=)
    NotEqual,
    /// Less than operator (<)
    LessThan,
    /// Less than or equal operator (<=)
    LessThanOrEqual,
    /// Greater than operator (>)
    GreaterThan,
    /// Greater than or equal operator (>=)
    GreaterThanOrEqual,
    /// Equivalence operator (~)
    Equivalent,
    /// Non-equivalence operator (!~)
    NotEquivalent,
    /// Logical AND operator (and keyword)
    And,
    /// Logical OR operator (or keyword)
    Or,
    /// Logical XOR operator (xor keyword)
    Xor,
    /// Logical implication operator (implies keyword)
    Implies,
    /// Union operator (|)
    Union,
    /// Membership operator (in keyword)
    In,
    /// Contains operator (contains keyword)
    Contains,
    /// Ampersand operator (&) for string concatenation
    Ampersand,
    /// Type checking operator (is keyword)
    Is,
    /// Type casting operator (as keyword)
    As,

    /// Left parenthesis (
    LeftParen,
    /// Right parenthesis )
    RightParen,
    /// Left square bracket [
    LeftBracket,
    /// Right square bracket ]
    RightBracket,
    /// Left curly brace {
    LeftBrace,
    /// Right curly brace }
    RightBrace,
    /// Dot operator (.) for member access
    Dot,
    /// Comma separator (,)
    Comma,
    /// Percent sign (%) introducing an environment variable
    Percent,

    /// Special variable $this
    DollarThis,
    /// Special variable $index
    DollarIndex,
    /// Special variable $total
    DollarTotal,
    /// Boolean literal true
    True,
    /// Boolean literal false
    False,
}

impl<'input> Token<'input> {
    /// Name usable after a `.`: identifiers and keywords that double as function names
    pub fn as_member_name(&self) -> Option<&'input str> {
        match self {
            Token::Identifier(name) | Token::DelimitedIdentifier(name) => Some(*name),
            Token::Contains => Some("contains"),
            Token::In => Some("in"),
            Token::Is => Some("is"),
            Token::As => Some("as"),
            Token::Div => Some("div"),
            Token::Mod => Some("mod"),
            Token::True => Some("true"),
            Token::False => Some("false"),
            Token::And => Some("and"),
            Token::Or => Some("or"),
            Token::Xor => Some("xor"),
            Token::Implies => Some("implies"),
            _ => None,
        }
    }

    /// Get the identifier text for plain or delimited identifiers
    pub fn as_identifier(&self) -> Option<&'input str> {
        match self {
            Token::Identifier(name) | Token::DelimitedIdentifier(name) => Some(*name),
            _ => None,
        }
    }
}

static KEYWORD_TABLE: Lazy<FxHashMap<&'static str, Token<'static>>> = Lazy::new(|| {
    let mut table = FxHashMap::default();
    table.insert("true", Token::True);
    table.insert("false", Token::False);
    table.insert("and", Token::And);
    table.insert("or", Token::Or);
    table.insert("xor", Token::Xor);
    table.insert("implies", Token::Implies);
    table.insert("div", Token::Div);
    table.insert("mod", Token::Mod);
    table.insert("in", Token::In);
    table.insert("contains", Token::Contains);
    table.insert("is", Token::Is);
    table.insert("as", Token::As);
    table
});

#[inline]
fn lookup_single_char_operator(byte: u8) -> Option<Token<'static>> {
    match byte {
        b'.' => Some(Token::Dot),
        b'(' => Some(Token::LeftParen),
        b')' => Some(Token::RightParen),
        b',' => Some(Token::Comma),
        b'+' => Some(Token::Plus),
        b'-' => Some(Token::Minus),
        b'*' => Some(Token::Multiply),
        b'[' => Some(Token::LeftBracket),
        b']' => Some(Token::RightBracket),
        b'{' => Some(Token::LeftBrace),
        b'}' => Some(Token::RightBrace),
        b'&' => Some(Token::Ampersand),
        b'%' => Some(Token::Percent),
        b'|' => Some(Token::Union),
        b'=' => Some(Token::Equal),
        b'~' => Some(Token::Equivalent),
        _ => None,
    }
}

/// Tokenizer over a single expression
pub struct Tokenizer<'input> {
    input: &'input str,
    bytes: &'input [u8],
    pos: usize,
    token_start: usize,
}

impl<'input> Tokenizer<'input> {
    /// Create a new tokenizer
    pub fn new(input: &'input str) -> Self {
        Self {
            input,
            bytes: input.as_bytes(),
            pos: 0,
            token_start: 0,
        }
    }

    /// Byte offset just past the last token returned
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Byte offset where the last token returned starts
    pub fn token_start(&self) -> usize {
        self.token_start
    }

    #[inline]
    fn peek_byte(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    #[inline]
    fn is_id_start(byte: u8) -> bool {
        byte.is_ascii_alphabetic() || byte == b'_'
    }

    #[inline]
    fn is_id_continue(byte: u8) -> bool {
        byte.is_ascii_alphanumeric() || byte == b'_'
    }

    fn skip_whitespace_and_comments(&mut self) -> ParseResult<()> {
        loop {
            while let Some(byte) = self.peek_byte(0) {
                if byte.is_ascii_whitespace() {
                    self.pos += 1;
                } else {
                    break;
                }
            }
            match (self.peek_byte(0), self.peek_byte(1)) {
                (Some(b'/'), Some(b'/')) => {
                    while let Some(byte) = self.peek_byte(0) {
                        if byte == b'\n' {
                            break;
                        }
                        self.pos += 1;
                    }
                }
                (Some(b'/'), Some(b'*')) => {
                    let start = self.pos;
                    self.pos += 2;
                    loop {
                        match (self.peek_byte(0), self.peek_byte(1)) {
                            (Some(b'*'), Some(b'/')) => {
                                self.pos += 2;
                                break;
                            }
                            (Some(_), _) => self.pos += 1,
                            (None, _) => {
                                return Err(ParseError::UnexpectedEndOfInput { position: start });
                            }
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn take_while(&mut self, predicate: impl Fn(u8) -> bool) -> &'input str {
        let start = self.pos;
        while let Some(byte) = self.peek_byte(0) {
            if !predicate(byte) {
                break;
            }
            self.pos += 1;
        }
        &self.input[start..self.pos]
    }

    fn parse_number(&mut self) -> ParseResult<Token<'input>> {
        let start = self.pos;
        self.take_while(|b| b.is_ascii_digit());
        if self.peek_byte(0) == Some(b'.') && self.peek_byte(1).is_some_and(|b| b.is_ascii_digit())
        {
            self.pos += 1;
            self.take_while(|b| b.is_ascii_digit());
            return Ok(Token::Decimal(&self.input[start..self.pos]));
        }
        let text = &self.input[start..self.pos];
        text.parse::<i64>()
            .map(Token::Integer)
            .map_err(|_| ParseError::InvalidLiteral {
                literal_type: "integer".to_string(),
                value: text.to_string(),
                position: start,
            })
    }

    fn parse_quoted(&mut self, quote: u8) -> ParseResult<&'input str> {
        let opening = self.pos;
        self.pos += 1;
        let start = self.pos;
        while let Some(byte) = self.peek_byte(0) {
            if byte == quote {
                let content = &self.input[start..self.pos];
                self.pos += 1;
                return Ok(content);
            }
            self.pos += if byte == b'\\' { 2 } else { 1 };
        }
        Err(ParseError::UnclosedString { position: opening })
    }

    fn parse_time_part(&mut self) {
        self.take_while(|b| b.is_ascii_digit() || b == b':' || b == b'.');
    }

    fn parse_timezone(&mut self) {
        match self.peek_byte(0) {
            Some(b'Z') => self.pos += 1,
            Some(b'+') | Some(b'-') if self.peek_byte(1).is_some_and(|b| b.is_ascii_digit()) => {
                self.pos += 1;
                self.take_while(|b| b.is_ascii_digit() || b == b':');
            }
            _ => {}
        }
    }

    fn parse_datetime_literal(&mut self) -> ParseResult<Token<'input>> {
        let at = self.pos;
        self.pos += 1;
        if self.peek_byte(0) == Some(b'T') {
            self.pos += 1;
            let start = self.pos;
            self.parse_time_part();
            if self.pos == start {
                return Err(ParseError::InvalidLiteral {
                    literal_type: "time".to_string(),
                    value: self.input[at..self.pos].to_string(),
                    position: at,
                });
            }
            return Ok(Token::Time(&self.input[start..self.pos]));
        }

        let start = self.pos;
        self.take_while(|b| b.is_ascii_digit() || b == b'-');
        if self.pos == start {
            return Err(ParseError::InvalidLiteral {
                literal_type: "date".to_string(),
                value: "@".to_string(),
                position: at,
            });
        }
        if self.peek_byte(0) == Some(b'T') {
            self.pos += 1;
            self.parse_time_part();
            self.parse_timezone();
            return Ok(Token::DateTime(&self.input[start..self.pos]));
        }
        Ok(Token::Date(&self.input[start..self.pos]))
    }

    fn parse_dollar(&mut self) -> ParseResult<Token<'input>> {
        let start = self.pos;
        self.pos += 1;
        let name = self.take_while(Self::is_id_continue);
        match name {
            "this" => Ok(Token::DollarThis),
            "index" => Ok(Token::DollarIndex),
            "total" => Ok(Token::DollarTotal),
            other => Err(ParseError::UnexpectedToken {
                token: format!("${other}"),
                position: start,
            }),
        }
    }

    /// Return the next token, or `None` at end of input
    pub fn next_token(&mut self) -> ParseResult<Option<Token<'input>>> {
        self.skip_whitespace_and_comments()?;
        self.token_start = self.pos;

        let Some(byte) = self.peek_byte(0) else {
            return Ok(None);
        };

        let token = match byte {
            b'!' => match self.peek_byte(1) {
                Some(b'=') => {
                    self.pos += 2;
                    Token::NotEqual
                }
                Some(b'~') => {
                    self.pos += 2;
                    Token::NotEquivalent
                }
                _ => {
                    return Err(ParseError::UnexpectedCharacter {
                        character: '!',
                        position: self.pos,
                    });
                }
            },
            b'<' | b'>' => {
                let or_equal = self.peek_byte(1) == Some(b'=');
                self.pos += if or_equal { 2 } else { 1 };
                match (byte, or_equal) {
                    (b'<', true) => Token::LessThanOrEqual,
                    (b'<', false) => Token::LessThan,
                    (_, true) => Token::GreaterThanOrEqual,
                    (_, false) => Token::GreaterThan,
                }
            }
            b'/' => {
                self.pos += 1;
                Token::Divide
            }
            b'$' => self.parse_dollar()?,
            b'0'..=b'9' => self.parse_number()?,
            b'\'' => Token::String(self.parse_quoted(b'\'')?),
            b'`' => Token::DelimitedIdentifier(self.parse_quoted(b'`')?),
            b'@' => self.parse_datetime_literal()?,
            ch if Self::is_id_start(ch) => {
                let ident = self.take_while(Self::is_id_continue);
                KEYWORD_TABLE
                    .get(ident)
                    .cloned()
                    .unwrap_or(Token::Identifier(ident))
            }
            ch => {
                if let Some(token) = lookup_single_char_operator(ch) {
                    self.pos += 1;
                    token
                } else {
                    let character = self.input[self.pos..].chars().next().unwrap_or('\0');
                    return Err(ParseError::UnexpectedCharacter {
                        character,
                        position: self.pos,
                    });
                }
            }
        };

        Ok(Some(token))
    }

    /// Tokenize the whole input
    pub fn tokenize_all(&mut self) -> ParseResult<Vec<Token<'input>>> {
        let mut tokens = Vec::with_capacity(16);
        while let Some(token) = self.next_token()? {
            tokens.push(token);
        }
        Ok(tokens)
    }
}

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

//! Pratt parser for FHIRPath expressions
//!
//! Binary operators are driven by a single precedence table; primaries and
//! postfix invocations (`.member`, `.fn(args)`, `[index]`) are parsed directly.

use super::error::{ParseError, ParseResult};
use super::tokenizer::{Token, Tokenizer};
use crate::ast::{Arguments, BinaryOperator, ExpressionNode, LiteralValue, UnaryOperator};

/// Operator precedence levels (higher = tighter binding)
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
    /// Lowest precedence - implies (right associative)
    Implies = 1,
    /// Logical OR and XOR
    Or = 2,
    /// Logical AND
    And = 3,
    /// Membership operators (in, contains)
    Membership = 4,
    /// Equality operators (=, !=, ~, !~)
    Equality = 5,
    /// Inequality operators (<, >, <=, >=)
    Inequality = 6,
    /// Union operator (|)
    Union = 7,
    /// Type operators (is, as)
    Type = 8,
    /// Additive operators (+, -, &)
    Additive = 9,
    /// Multiplicative operators (*, /, div, mod)
    Multiplicative = 10,
    /// Unary operators (+, -)
    Unary = 11,
}

impl Precedence {
    /// Get the next higher precedence level for left-associative operators
    pub const fn next_level(self) -> Self {
        match self {
            Precedence::Implies => Precedence::Or,
            Precedence::Or => Precedence::And,
            Precedence::And => Precedence::Membership,
            Precedence::Membership => Precedence::Equality,
            Precedence::Equality => Precedence::Inequality,
            Precedence::Inequality => Precedence::Union,
            Precedence::Union => Precedence::Type,
            Precedence::Type => Precedence::Additive,
            Precedence::Additive => Precedence::Multiplicative,
            Precedence::Multiplicative => Precedence::Unary,
            Precedence::Unary => Precedence::Unary,
        }
    }

    /// Check if this precedence is right associative
    pub const fn is_right_associative(self) -> bool {
        matches!(self, Precedence::Implies)
    }
}

fn get_precedence(token: &Token<'_>) -> Option<Precedence> {
    match token {
        Token::Implies => Some(Precedence::Implies),
        Token::Or | Token::Xor => Some(Precedence::Or),
        Token::And => Some(Precedence::And),
        Token::In | Token::Contains => Some(Precedence::Membership),
        Token::Equal | Token::NotEqual | Token::Equivalent | Token::NotEquivalent => {
            Some(Precedence::Equality)
        }
        Token::LessThan
        | Token::LessThanOrEqual
        | Token::GreaterThan
        | Token::GreaterThanOrEqual => Some(Precedence::Inequality),
        Token::Union => Some(Precedence::Union),
        Token::Is | Token::As => Some(Precedence::Type),
        Token::Plus | Token::Minus | Token::Ampersand => Some(Precedence::Additive),
        Token::Multiply | Token::Divide | Token::Div | Token::Mod => {
            Some(Precedence::Multiplicative)
        }
        _ => None,
    }
}

fn token_to_binary_op(token: &Token<'_>) -> Option<BinaryOperator> {
    match token {
        Token::Equal => Some(BinaryOperator::Equal),
        Token::NotEqual => Some(BinaryOperator::NotEqual),
        Token::Plus => Some(BinaryOperator::Add),
        Token::Minus => Some(BinaryOperator::Subtract),
        Token::And => Some(BinaryOperator::And),
        Token::Or => Some(BinaryOperator::Or),
        Token::Equivalent => Some(BinaryOperator::Equivalent),
        Token::NotEquivalent => Some(BinaryOperator::NotEquivalent),
        Token::LessThan => Some(BinaryOperator::LessThan),
        Token::LessThanOrEqual => Some(BinaryOperator::LessThanOrEqual),
        Token::GreaterThan => Some(BinaryOperator::GreaterThan),
        Token::GreaterThanOrEqual => Some(BinaryOperator::GreaterThanOrEqual),
        Token::In => Some(BinaryOperator::In),
        Token::Contains => Some(BinaryOperator::Contains),
        Token::Multiply => Some(BinaryOperator::Multiply),
        Token::Divide => Some(BinaryOperator::Divide),
        Token::Div => Some(BinaryOperator::IntegerDivide),
        Token::Mod => Some(BinaryOperator::Modulo),
        Token::Union => Some(BinaryOperator::Union),
        Token::Ampersand => Some(BinaryOperator::Concatenate),
        Token::Xor => Some(BinaryOperator::Xor),
        Token::Implies => Some(BinaryOperator::Implies),
        _ => None,
    }
}

/// Pratt parser over a token stream
pub struct PrattParser<'input> {
    tokenizer: Tokenizer<'input>,
    current_token: Option<Token<'input>>,
    current_position: usize,
}

impl<'input> PrattParser<'input> {
    /// Create a parser; the first token is read lazily by [`PrattParser::parse`]
    pub fn new(input: &'input str) -> Self {
        Self {
            tokenizer: Tokenizer::new(input),
            current_token: None,
            current_position: 0,
        }
    }

    /// Parse the complete input as a single expression
    pub fn parse(mut self) -> ParseResult<ExpressionNode> {
        self.advance()?;
        let expr = self.parse_expression_with_precedence(Precedence::Implies)?;
        match &self.current_token {
            None => Ok(expr),
            Some(token) => Err(self.unexpected(token)),
        }
    }

    fn advance(&mut self) -> ParseResult<()> {
        self.current_token = self.tokenizer.next_token()?;
        self.current_position = self.tokenizer.token_start();
        Ok(())
    }

    fn current(&self) -> Option<&Token<'input>> {
        self.current_token.as_ref()
    }

    fn unexpected(&self, token: &Token<'input>) -> ParseError {
        ParseError::UnexpectedToken {
            token: format!("{token:?}"),
            position: self.current_position,
        }
    }

    fn end_of_input(&self) -> ParseError {
        ParseError::UnexpectedEndOfInput {
            position: self.tokenizer.position(),
        }
    }

    fn expect(&mut self, expected: Token<'input>, description: &str) -> ParseResult<()> {
        match &self.current_token {
            Some(token) if *token == expected => self.advance(),
            Some(_) => Err(ParseError::ExpectedToken {
                expected: description.to_string(),
                position: self.current_position,
            }),
            None => Err(self.end_of_input()),
        }
    }

    /// Resolve FHIRPath escape sequences in a string literal body
    fn process_string_escapes(&self, raw: &str) -> ParseResult<String> {
        if !raw.contains('\\') {
            return Ok(raw.to_string());
        }
        let mut result = String::with_capacity(raw.len());
        let mut chars = raw.chars();
        while let Some(ch) = chars.next() {
            if ch != '\\' {
                result.push(ch);
                continue;
            }
            match chars.next() {
                Some('\'') => result.push('\''),
                Some('"') => result.push('"'),
                Some('`') => result.push('`'),
                Some('\\') => result.push('\\'),
                Some('/') => result.push('/'),
                Some('f') => result.push('\u{000C}'),
                Some('n') => result.push('\n'),
                Some('r') => result.push('\r'),
                Some('t') => result.push('\t'),
                Some('u') => {
                    let hex: String = chars.by_ref().take(4).collect();
                    let decoded = u32::from_str_radix(&hex, 16)
                        .ok()
                        .filter(|_| hex.len() == 4)
                        .and_then(char::from_u32);
                    match decoded {
                        Some(c) => result.push(c),
                        None => {
                            return Err(ParseError::InvalidEscape {
                                sequence: format!("\\u{hex}"),
                                position: self.current_position,
                            });
                        }
                    }
                }
                Some(other) => {
                    return Err(ParseError::InvalidEscape {
                        sequence: format!("\\{other}"),
                        position: self.current_position,
                    });
                }
                None => {
                    return Err(ParseError::InvalidEscape {
                        sequence: "\\".to_string(),
                        position: self.current_position,
                    });
                }
            }
        }
        Ok(result)
    }

    fn parse_primary(&mut self) -> ParseResult<ExpressionNode> {
        let Some(token) = self.current_token.clone() else {
            return Err(self.end_of_input());
        };

        match token {
            Token::Identifier(name) => {
                self.advance()?;
                if let Some(Token::LeftParen) = self.current() {
                    let args = self.parse_arguments()?;
                    Ok(ExpressionNode::function_call(name, args))
                } else {
                    Ok(ExpressionNode::identifier(name))
                }
            }
            Token::DelimitedIdentifier(name) => {
                self.advance()?;
                Ok(ExpressionNode::identifier(name))
            }
            Token::Integer(value) => {
                self.advance()?;
                Ok(ExpressionNode::literal(LiteralValue::Integer(value)))
            }
            Token::Decimal(value) => {
                self.advance()?;
                Ok(ExpressionNode::literal(LiteralValue::Decimal(
                    value.to_string(),
                )))
            }
            Token::String(raw) => {
                let processed = self.process_string_escapes(raw)?;
                self.advance()?;
                Ok(ExpressionNode::literal(LiteralValue::String(processed)))
            }
            Token::True | Token::False => {
                self.advance()?;
                Ok(ExpressionNode::literal(LiteralValue::Boolean(
                    token == Token::True,
                )))
            }
            Token::Date(value) => {
                self.advance()?;
                Ok(ExpressionNode::literal(LiteralValue::Date(value.to_string())))
            }
            Token::DateTime(value) => {
                self.advance()?;
                Ok(ExpressionNode::literal(LiteralValue::DateTime(
                    value.to_string(),
                )))
            }
            Token::Time(value) => {
                self.advance()?;
                Ok(ExpressionNode::literal(LiteralValue::Time(value.to_string())))
            }
            Token::LeftParen => {
                self.advance()?;
                let expr = self.parse_expression_with_precedence(Precedence::Implies)?;
                self.expect(Token::RightParen, "')'")?;
                Ok(expr)
            }
            Token::LeftBrace => {
                self.advance()?;
                self.expect(Token::RightBrace, "'}'")?;
                Ok(ExpressionNode::literal(LiteralValue::Null))
            }
            Token::Percent => {
                self.advance()?;
                let name = match self.current_token.clone() {
                    Some(Token::Identifier(name)) | Some(Token::DelimitedIdentifier(name)) => {
                        name.to_string()
                    }
                    Some(Token::String(raw)) => self.process_string_escapes(raw)?,
                    Some(other) => return Err(self.unexpected(&other)),
                    None => return Err(self.end_of_input()),
                };
                self.advance()?;
                Ok(ExpressionNode::environment_variable(name))
            }
            Token::DollarThis => {
                self.advance()?;
                Ok(ExpressionNode::variable("this"))
            }
            Token::DollarIndex => {
                self.advance()?;
                Ok(ExpressionNode::variable("index"))
            }
            Token::DollarTotal => {
                self.advance()?;
                Ok(ExpressionNode::variable("total"))
            }
            Token::Minus => {
                self.advance()?;
                let operand = self.parse_expression_with_precedence(Precedence::Unary)?;
                Ok(ExpressionNode::unary_op(UnaryOperator::Negate, operand))
            }
            Token::Plus => {
                self.advance()?;
                let operand = self.parse_expression_with_precedence(Precedence::Unary)?;
                Ok(ExpressionNode::unary_op(UnaryOperator::Positive, operand))
            }
            other => Err(self.unexpected(&other)),
        }
    }

    /// Parse `( arg, arg, ... )`; the current token must be `(`
    fn parse_arguments(&mut self) -> ParseResult<Arguments> {
        self.expect(Token::LeftParen, "'('")?;
        let mut args = Arguments::new();
        if let Some(Token::RightParen) = self.current() {
            self.advance()?;
            return Ok(args);
        }
        loop {
            args.push(self.parse_expression_with_precedence(Precedence::Implies)?);
            match self.current_token.clone() {
                Some(Token::Comma) => self.advance()?,
                Some(Token::RightParen) => {
                    self.advance()?;
                    return Ok(args);
                }
                Some(_) => {
                    return Err(ParseError::ExpectedToken {
                        expected: "',' or ')' in function arguments".to_string(),
                        position: self.current_position,
                    });
                }
                None => return Err(self.end_of_input()),
            }
        }
    }

    /// Parse postfix invocations: `.member`, `.method(args)` and `[index]`
    fn parse_postfix(&mut self, mut left: ExpressionNode) -> ParseResult<ExpressionNode> {
        loop {
            match self.current() {
                Some(Token::Dot) => {
                    self.advance()?;
                    let name = match self.current_token.clone() {
                        Some(token) => match token.as_member_name() {
                            Some(name) => name,
                            None => return Err(self.unexpected(&token)),
                        },
                        None => return Err(self.end_of_input()),
                    };
                    self.advance()?;
                    left = if let Some(Token::LeftParen) = self.current() {
                        let args = self.parse_arguments()?;
                        ExpressionNode::method_call(left, name, args)
                    } else {
                        ExpressionNode::path(left, name)
                    };
                }
                Some(Token::LeftBracket) => {
                    self.advance()?;
                    let index = self.parse_expression_with_precedence(Precedence::Implies)?;
                    self.expect(Token::RightBracket, "']'")?;
                    left = ExpressionNode::index(left, index);
                }
                _ => return Ok(left),
            }
        }
    }

    /// Parse a type specifier after `is`/`as`: `Quantity`, `FHIR.Patient` or `(Quantity)`
    fn parse_type_specifier(&mut self) -> ParseResult<String> {
        let parenthesized = matches!(self.current(), Some(Token::LeftParen));
        if parenthesized {
            self.advance()?;
        }
        let mut type_name = match self.current_token.clone() {
            Some(token) => match token.as_identifier() {
                Some(name) => name.to_string(),
                None => return Err(self.unexpected(&token)),
            },
            None => return Err(self.end_of_input()),
        };
        self.advance()?;
        while let Some(Token::Dot) = self.current() {
            self.advance()?;
            match self.current_token.clone() {
                Some(token) => match token.as_identifier() {
                    Some(part) => {
                        type_name.push('.');
                        type_name.push_str(part);
                    }
                    None => return Err(self.unexpected(&token)),
                },
                None => return Err(self.end_of_input()),
            }
            self.advance()?;
        }
        if parenthesized {
            self.expect(Token::RightParen, "')'")?;
        }
        Ok(type_name)
    }

    /// Core precedence-climbing loop
    fn parse_expression_with_precedence(
        &mut self,
        min_precedence: Precedence,
    ) -> ParseResult<ExpressionNode> {
        let primary = self.parse_primary()?;
        let mut left = self.parse_postfix(primary)?;

        while let Some(current_token) = self.current_token.clone() {
            let precedence = match get_precedence(&current_token) {
                Some(prec) if prec >= min_precedence => prec,
                _ => break,
            };

            match current_token {
                Token::Is => {
                    self.advance()?;
                    let type_name = self.parse_type_specifier()?;
                    left = ExpressionNode::type_check(left, type_name);
                }
                Token::As => {
                    self.advance()?;
                    let type_name = self.parse_type_specifier()?;
                    left = ExpressionNode::type_cast(left, type_name);
                }
                ref token => {
                    let Some(op) = token_to_binary_op(token) else {
                        return Err(self.unexpected(token));
                    };
                    self.advance()?;
                    let next_min = if precedence.is_right_associative() {
                        precedence
                    } else {
                        precedence.next_level()
                    };
                    let right = self.parse_expression_with_precedence(next_min)?;
                    left = ExpressionNode::binary_op(op, left, right);
                }
            }
        }

        Ok(left)
    }
}

/// Parse a FHIRPath expression into an AST
pub fn parse_expression_pratt(input: &str) -> ParseResult<ExpressionNode> {
    PrattParser::new(input).parse()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(input: &str) -> ExpressionNode {
        parse_expression_pratt(input).unwrap()
    }

    fn ident(name: &str) -> ExpressionNode {
        ExpressionNode::identifier(name)
    }

    fn string(value: &str) -> ExpressionNode {
        ExpressionNode::literal(LiteralValue::String(value.to_string()))
    }

    #[test]
    fn test_path_navigation() {
        assert_eq!(
            parse("Patient.name.given"),
            ExpressionNode::path(ExpressionNode::path(ident("Patient"), "name"), "given")
        );
    }

    #[test]
    fn test_method_call_with_lambda_argument() {
        assert_eq!(
            parse("name.where(use = 'official').family"),
            ExpressionNode::path(
                ExpressionNode::method_call(
                    ident("name"),
                    "where",
                    vec![ExpressionNode::binary_op(
                        BinaryOperator::Equal,
                        ident("use"),
                        string("official"),
                    )],
                ),
                "family",
            )
        );
    }

    #[test]
    fn test_multiplicative_binds_tighter_than_additive() {
        assert_eq!(
            parse("1 + 2 * 3"),
            ExpressionNode::binary_op(
                BinaryOperator::Add,
                ExpressionNode::literal(LiteralValue::Integer(1)),
                ExpressionNode::binary_op(
                    BinaryOperator::Multiply,
                    ExpressionNode::literal(LiteralValue::Integer(2)),
                    ExpressionNode::literal(LiteralValue::Integer(3)),
                ),
            )
        );
    }

    #[test]
    fn test_and_binds_tighter_than_or() {
        assert_eq!(parse("a or b and c").to_string(), "(a or (b and c))");
        assert_eq!(parse("a implies b implies c").to_string(), "(a implies (b implies c))");
        assert_eq!(parse("a - b - c").to_string(), "((a - b) - c)");
    }

    #[test]
    fn test_type_operators() {
        assert_eq!(
            parse("value is Quantity"),
            ExpressionNode::type_check(ident("value"), "Quantity")
        );
        assert_eq!(
            parse("value as FHIR.string = 'x'").to_string(),
            "((value as FHIR.string) = 'x')"
        );
    }

    #[test]
    fn test_function_calls_and_variables() {
        assert_eq!(
            parse("getReferenceKey(Patient)"),
            ExpressionNode::function_call("getReferenceKey", vec![ident("Patient")])
        );
        assert_eq!(
            parse("%resource.id"),
            ExpressionNode::path(ExpressionNode::environment_variable("resource"), "id")
        );
        assert_eq!(parse("$this").to_string(), "$this");
        assert_eq!(parse("name[0]").to_string(), "name[0]");
    }

    #[test]
    fn test_keyword_member_names() {
        assert_eq!(
            parse("name.given.contains('x')"),
            ExpressionNode::method_call(
                ExpressionNode::path(ident("name"), "given"),
                "contains",
                vec![string("x")],
            )
        );
        assert_eq!(parse("name.`div`").to_string(), "name.div");
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(parse(r"'it\'s'"), string("it's"));
        assert_eq!(parse(r"'\u0041'"), string("A"));
        assert!(matches!(
            parse_expression_pratt(r"'\q'"),
            Err(ParseError::InvalidEscape { .. })
        ));
    }

    #[test]
    fn test_unary_minus_and_empty() {
        assert_eq!(
            parse("-5"),
            ExpressionNode::unary_op(
                UnaryOperator::Negate,
                ExpressionNode::literal(LiteralValue::Integer(5))
            )
        );
        assert_eq!(parse("{}"), ExpressionNode::literal(LiteralValue::Null));
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            parse_expression_pratt("name."),
            Err(ParseError::UnexpectedEndOfInput { .. })
        ));
        assert!(matches!(
            parse_expression_pratt("name name"),
            Err(ParseError::UnexpectedToken { position: 5, .. })
        ));
        assert!(parse_expression_pratt("where(").is_err());
        assert!(parse_expression_pratt("").is_err());
    }
}

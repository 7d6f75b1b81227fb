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

use crate::error::{FhirPathError, Result};

/// Token produced by the tokenizer
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Integer literal
    Integer(i64),
    /// Decimal literal kept textual to preserve precision
    Decimal(String),
    /// String literal, already unescaped
    String(String),
    /// Date-time literal without the leading `@`
    DateTime(String),
    /// Identifier
    Identifier(String),
    /// `true`
    True,
    /// `false`
    False,
    /// `$this`
    DollarThis,
    /// `%`, introducing an external constant
    Percent,
    /// `+`
    Plus,
    /// `-`
    Minus,
    /// `*`
    Star,
    /// `/`
    Slash,
    /// `div`
    Div,
    /// `mod`
    Mod,
    /// `&`
    Ampersand,
    /// `|`
    Pipe,
    /// `=`
    Equal,
    /// `!=`
    NotEqual,
    /// `~`
    Equivalent,
    /// `!~`
    NotEquivalent,
    /// `<`
    LessThan,
    /// `<=`
    LessThanOrEqual,
    /// `>`
    GreaterThan,
    /// `>=`
    GreaterThanOrEqual,
    /// `and`
    And,
    /// `or`
    Or,
    /// `xor`
    Xor,
    /// `implies`
    Implies,
    /// `in`
    In,
    /// `contains`
    Contains,
    /// `is`
    Is,
    /// `as`
    As,
    /// `(`
    LeftParen,
    /// `)`
    RightParen,
    /// `[`
    LeftBracket,
    /// `]`
    RightBracket,
    /// `{`
    LeftBrace,
    /// `}`
    RightBrace,
    /// `.`
    Dot,
    /// `,`
    Comma,
}

/// A token with the byte position it started at
#[derive(Debug, Clone, PartialEq)]
pub struct SpannedToken {
    /// The token
    pub token: Token,
    /// Byte position in the source
    pub position: usize,
}

fn keyword(text: &str) -> Option<Token> {
    match text {
        "and" => Some(Token::And),
        "or" => Some(Token::Or),
        "xor" => Some(Token::Xor),
        "implies" => Some(Token::Implies),
        "in" => Some(Token::In),
        "contains" => Some(Token::Contains),
        "is" => Some(Token::Is),
        "as" => Some(Token::As),
        "div" => Some(Token::Div),
        "mod" => Some(Token::Mod),
        "true" => Some(Token::True),
        "false" => Some(Token::False),
        _ => None,
    }
}

/// Scanner over FHIRPath source text
pub struct Tokenizer<'input> {
    input: &'input str,
    bytes: &'input [u8],
    pos: usize,
}

impl<'input> Tokenizer<'input> {
    /// Create a tokenizer over the given source
    pub fn new(input: &'input str) -> Self {
        Self {
            input,
            bytes: input.as_bytes(),
            pos: 0,
        }
    }

    /// Scan the whole input
    pub fn tokenize(mut self) -> Result<Vec<SpannedToken>> {
        let mut tokens = Vec::new();
        loop {
            self.skip_whitespace();
            if self.pos >= self.bytes.len() {
                break;
            }
            let position = self.pos;
            let token = self.next_token()?;
            tokens.push(SpannedToken { token, position });
        }
        Ok(tokens)
    }

    fn skip_whitespace(&mut self) {
        while self.pos < self.bytes.len() && self.bytes[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn next_token(&mut self) -> Result<Token> {
        let start = self.pos;
        let byte = self.bytes[self.pos];

        match byte {
            b'(' => self.single(Token::LeftParen),
            b')' => self.single(Token::RightParen),
            b'[' => self.single(Token::LeftBracket),
            b']' => self.single(Token::RightBracket),
            b'{' => self.single(Token::LeftBrace),
            b'}' => self.single(Token::RightBrace),
            b'.' => self.single(Token::Dot),
            b',' => self.single(Token::Comma),
            b'+' => self.single(Token::Plus),
            b'-' => self.single(Token::Minus),
            b'*' => self.single(Token::Star),
            b'/' => self.single(Token::Slash),
            b'&' => self.single(Token::Ampersand),
            b'|' => self.single(Token::Pipe),
            b'=' => self.single(Token::Equal),
            b'~' => self.single(Token::Equivalent),
            b'%' => self.single(Token::Percent),
            b'<' => {
                if self.peek_at(1) == Some(b'=') {
                    self.pos += 2;
                    Ok(Token::LessThanOrEqual)
                } else {
                    self.single(Token::LessThan)
                }
            }
            b'>' => {
                if self.peek_at(1) == Some(b'=') {
                    self.pos += 2;
                    Ok(Token::GreaterThanOrEqual)
                } else {
                    self.single(Token::GreaterThan)
                }
            }
            b'!' => match self.peek_at(1) {
                Some(b'=') => {
                    self.pos += 2;
                    Ok(Token::NotEqual)
                }
                Some(b'~') => {
                    self.pos += 2;
                    Ok(Token::NotEquivalent)
                }
                _ => Err(FhirPathError::parse_error(start, "Unexpected character '!'")),
            },
            b'$' => self.dollar_variable(),
            b'@' => self.date_time_literal(),
            b'\'' => self.string_literal(),
            b'0'..=b'9' => self.number_literal(),
            _ if byte == b'_' || byte.is_ascii_alphabetic() => self.identifier_or_keyword(),
            _ => {
                let ch = self.input[self.pos..].chars().next().unwrap_or('?');
                Err(FhirPathError::parse_error(
                    start,
                    format!("Unexpected character '{ch}'"),
                ))
            }
        }
    }

    fn single(&mut self, token: Token) -> Result<Token> {
        self.pos += 1;
        Ok(token)
    }

    fn dollar_variable(&mut self) -> Result<Token> {
        let start = self.pos;
        self.pos += 1;
        let name_start = self.pos;
        while let Some(b) = self.peek() {
            if b == b'_' || b.is_ascii_alphanumeric() {
                self.pos += 1;
            } else {
                break;
            }
        }
        let name = &self.input[name_start..self.pos];
        if name == "this" {
            Ok(Token::DollarThis)
        } else {
            Err(FhirPathError::parse_error(
                start,
                format!("Unsupported special variable ${name}"),
            ))
        }
    }

    fn date_time_literal(&mut self) -> Result<Token> {
        self.pos += 1;
        let start = self.pos;
        while let Some(b) = self.peek() {
            let part_of_literal = b.is_ascii_digit()
                || matches!(b, b'-' | b'T' | b':' | b'.' | b'+' | b'Z');
            if part_of_literal {
                self.pos += 1;
            } else {
                break;
            }
        }
        if self.pos == start {
            return Err(FhirPathError::parse_error(
                start - 1,
                "Empty date-time literal",
            ));
        }
        Ok(Token::DateTime(self.input[start..self.pos].to_string()))
    }

    fn string_literal(&mut self) -> Result<Token> {
        let start = self.pos;
        self.pos += 1;
        let mut value = String::new();
        loop {
            let Some(b) = self.peek() else {
                return Err(FhirPathError::parse_error(start, "Unterminated string literal"));
            };
            match b {
                b'\'' => {
                    self.pos += 1;
                    return Ok(Token::String(value));
                }
                b'\\' => {
                    self.pos += 1;
                    let Some(escape) = self.peek() else {
                        return Err(FhirPathError::parse_error(
                            start,
                            "Unterminated string literal",
                        ));
                    };
                    self.pos += 1;
                    match escape {
                        b't' => value.push('\t'),
                        b'n' => value.push('\n'),
                        b'r' => value.push('\r'),
                        b'f' => value.push('\u{000C}'),
                        b'\\' => value.push('\\'),
                        b'"' => value.push('"'),
                        b'\'' => value.push('\''),
                        b'/' => value.push('/'),
                        b'u' => {
                            let end = self.pos + 4;
                            if end > self.bytes.len() {
                                return Err(FhirPathError::parse_error(
                                    self.pos,
                                    "Truncated unicode escape",
                                ));
                            }
                            let hex = &self.input[self.pos..end];
                            let code = u32::from_str_radix(hex, 16).map_err(|_| {
                                FhirPathError::parse_error(self.pos, "Invalid unicode escape")
                            })?;
                            let ch = char::from_u32(code).ok_or_else(|| {
                                FhirPathError::parse_error(self.pos, "Invalid unicode escape")
                            })?;
                            value.push(ch);
                            self.pos = end;
                        }
                        _ => {
                            return Err(FhirPathError::parse_error(
                                self.pos - 1,
                                format!("Invalid escape sequence '\\{}'", escape as char),
                            ));
                        }
                    }
                }
                _ => {
                    // Advance by whole characters so multi-byte input survives.
                    let ch = self.input[self.pos..].chars().next().ok_or_else(|| {
                        FhirPathError::parse_error(self.pos, "Invalid character in string literal")
                    })?;
                    value.push(ch);
                    self.pos += ch.len_utf8();
                }
            }
        }
    }

    fn number_literal(&mut self) -> Result<Token> {
        let start = self.pos;
        while self.peek().is_some_and(|b| b.is_ascii_digit()) {
            self.pos += 1;
        }

        let is_decimal = self.peek() == Some(b'.')
            && self.peek_at(1).is_some_and(|b| b.is_ascii_digit());
        if is_decimal {
            self.pos += 1;
            while self.peek().is_some_and(|b| b.is_ascii_digit()) {
                self.pos += 1;
            }
            return Ok(Token::Decimal(self.input[start..self.pos].to_string()));
        }

        let text = &self.input[start..self.pos];
        let value: i64 = text
            .parse()
            .map_err(|_| FhirPathError::parse_error(start, format!("Malformed integer {text}")))?;
        Ok(Token::Integer(value))
    }

    fn identifier_or_keyword(&mut self) -> Result<Token> {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if b == b'_' || b.is_ascii_alphanumeric() {
                self.pos += 1;
            } else {
                break;
            }
        }
        let text = &self.input[start..self.pos];
        Ok(keyword(text).unwrap_or_else(|| Token::Identifier(text.to_string())))
    }
}

/// Tokenize a full expression
pub fn tokenize(input: &str) -> Result<Vec<SpannedToken>> {
    Tokenizer::new(input).tokenize()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(input: &str) -> Vec<Token> {
        tokenize(input).unwrap().into_iter().map(|t| t.token).collect()
    }

    #[test]
    fn test_simple_path() {
        assert_eq!(
            tokens("name.family"),
            vec![
                Token::Identifier("name".into()),
                Token::Dot,
                Token::Identifier("family".into()),
            ]
        );
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            tokens("a <= b != c"),
            vec![
                Token::Identifier("a".into()),
                Token::LessThanOrEqual,
                Token::Identifier("b".into()),
                Token::NotEqual,
                Token::Identifier("c".into()),
            ]
        );
    }

    #[test]
    fn test_keywords_and_booleans() {
        assert_eq!(
            tokens("true and false implies x"),
            vec![
                Token::True,
                Token::And,
                Token::False,
                Token::Implies,
                Token::Identifier("x".into()),
            ]
        );
    }

    #[test]
    fn test_numbers() {
        assert_eq!(tokens("42"), vec![Token::Integer(42)]);
        assert_eq!(tokens("3.14"), vec![Token::Decimal("3.14".into())]);
        // A trailing dot is an invocation, not a decimal point.
        assert_eq!(
            tokens("5.combine(x)")[0..2],
            [Token::Integer(5), Token::Dot]
        );
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(
            tokens(r#"'a\tb\n\\\'\"'"#),
            vec![Token::String("a\tb\n\\'\"".into())]
        );
        assert_eq!(tokens(r"'A'"), vec![Token::String("A".into())]);
        assert!(tokenize(r"'\q'").is_err());
        assert!(tokenize("'unterminated").is_err());
    }

    #[test]
    fn test_date_time_literal() {
        assert_eq!(tokens("@2020"), vec![Token::DateTime("2020".into())]);
        assert_eq!(
            tokens("@2020-06-01T10:00:00+02:00"),
            vec![Token::DateTime("2020-06-01T10:00:00+02:00".into())]
        );
    }

    #[test]
    fn test_this_variable() {
        assert_eq!(tokens("$this"), vec![Token::DollarThis]);
        assert!(tokenize("$index").is_err());
    }

    #[test]
    fn test_external_constant_prefix() {
        assert_eq!(
            tokens("%context"),
            vec![Token::Percent, Token::Identifier("context".into())]
        );
    }

    #[test]
    fn test_positions() {
        let spanned = tokenize("a = b").unwrap();
        assert_eq!(spanned[0].position, 0);
        assert_eq!(spanned[1].position, 2);
        assert_eq!(spanned[2].position, 4);
    }
}

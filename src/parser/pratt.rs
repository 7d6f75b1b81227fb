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
//! Precedence follows the FHIRPath grammar; the parser accepts every
//! grammatical operator, including ones the compiler later rejects, so that
//! unsupported constructs fail with a compile error rather than a syntax
//! error.

use smallvec::SmallVec;

use crate::ast::{BinaryOperator, ExpressionNode, LiteralValue, UnaryOperator};
use crate::error::{FhirPathError, Result};
use crate::parser::tokenizer::{tokenize, SpannedToken, Token};

/// Operator precedence levels (higher binds tighter)
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Precedence {
    Implies = 1,
    Or = 2,
    And = 3,
    Membership = 4,
    Type = 5,
    Equality = 6,
    Inequality = 7,
    Union = 8,
    Additive = 9,
    Multiplicative = 10,
    Unary = 11,
}

fn binary_operator(token: &Token) -> Option<(BinaryOperator, Precedence)> {
    let entry = match token {
        Token::Star => (BinaryOperator::Multiply, Precedence::Multiplicative),
        Token::Slash => (BinaryOperator::Divide, Precedence::Multiplicative),
        Token::Div => (BinaryOperator::IntegerDivide, Precedence::Multiplicative),
        Token::Mod => (BinaryOperator::Modulo, Precedence::Multiplicative),
        Token::Plus => (BinaryOperator::Add, Precedence::Additive),
        Token::Minus => (BinaryOperator::Subtract, Precedence::Additive),
        Token::Ampersand => (BinaryOperator::Concatenate, Precedence::Additive),
        Token::LessThan => (BinaryOperator::LessThan, Precedence::Inequality),
        Token::LessThanOrEqual => (BinaryOperator::LessThanOrEqual, Precedence::Inequality),
        Token::GreaterThan => (BinaryOperator::GreaterThan, Precedence::Inequality),
        Token::GreaterThanOrEqual => (BinaryOperator::GreaterThanOrEqual, Precedence::Inequality),
        Token::Equal => (BinaryOperator::Equal, Precedence::Equality),
        Token::NotEqual => (BinaryOperator::NotEqual, Precedence::Equality),
        Token::Equivalent => (BinaryOperator::Equivalent, Precedence::Equality),
        Token::NotEquivalent => (BinaryOperator::NotEquivalent, Precedence::Equality),
        Token::In => (BinaryOperator::In, Precedence::Membership),
        Token::Contains => (BinaryOperator::Contains, Precedence::Membership),
        Token::And => (BinaryOperator::And, Precedence::And),
        Token::Or => (BinaryOperator::Or, Precedence::Or),
        Token::Xor => (BinaryOperator::Xor, Precedence::Or),
        Token::Implies => (BinaryOperator::Implies, Precedence::Implies),
        _ => return None,
    };
    Some(entry)
}

/// Member and function names may collide with keywords (`contains('x')`,
/// `value.is(Code)`), so anything identifier-shaped is accepted after a dot.
fn identifier_text(token: &Token) -> Option<&str> {
    match token {
        Token::Identifier(name) => Some(name),
        Token::Contains => Some("contains"),
        Token::In => Some("in"),
        Token::Is => Some("is"),
        Token::As => Some("as"),
        Token::Div => Some("div"),
        Token::Mod => Some("mod"),
        Token::And => Some("and"),
        Token::Or => Some("or"),
        Token::Xor => Some("xor"),
        Token::Implies => Some("implies"),
        _ => None,
    }
}

struct Parser {
    tokens: Vec<SpannedToken>,
    index: usize,
    input_len: usize,
}

impl Parser {
    fn new(tokens: Vec<SpannedToken>, input_len: usize) -> Self {
        Self {
            tokens,
            index: 0,
            input_len,
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.index).map(|t| &t.token)
    }

    fn position(&self) -> usize {
        self.tokens
            .get(self.index)
            .map(|t| t.position)
            .unwrap_or(self.input_len)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.index).map(|t| t.token.clone());
        if token.is_some() {
            self.index += 1;
        }
        token
    }

    fn expect(&mut self, expected: &Token, what: &str) -> Result<()> {
        if self.peek() == Some(expected) {
            self.index += 1;
            Ok(())
        } else {
            Err(FhirPathError::parse_error(
                self.position(),
                format!("Expected {what}"),
            ))
        }
    }

    fn expect_identifier(&mut self, what: &str) -> Result<String> {
        let name = self.peek().and_then(identifier_text).map(str::to_string);
        match name {
            Some(name) => {
                self.index += 1;
                Ok(name)
            }
            None => Err(FhirPathError::parse_error(
                self.position(),
                format!("Expected {what}"),
            )),
        }
    }

    fn parse(&mut self) -> Result<ExpressionNode> {
        let expression = self.parse_binary(Precedence::Implies as u8)?;
        if self.peek().is_some() {
            return Err(FhirPathError::parse_error(
                self.position(),
                "Unexpected trailing input",
            ));
        }
        Ok(expression)
    }

    fn parse_binary(&mut self, min_precedence: u8) -> Result<ExpressionNode> {
        let mut left = self.parse_unary()?;

        loop {
            let Some(token) = self.peek().cloned() else { break };

            match token {
                Token::Dot => {
                    self.index += 1;
                    let name = self.expect_identifier("member name after '.'")?;
                    if self.peek() == Some(&Token::LeftParen) {
                        let args = self.parse_arguments()?;
                        left = ExpressionNode::method_call(left, name, args);
                    } else {
                        left = ExpressionNode::path(left, name);
                    }
                }
                Token::LeftBracket => {
                    self.index += 1;
                    let index = self.parse_binary(Precedence::Implies as u8)?;
                    self.expect(&Token::RightBracket, "']' after index expression")?;
                    left = ExpressionNode::index(left, index);
                }
                Token::Is | Token::As => {
                    let precedence = Precedence::Type as u8;
                    if precedence < min_precedence {
                        break;
                    }
                    let is_check = matches!(token, Token::Is);
                    self.index += 1;
                    let type_name = self.expect_identifier("type name")?;
                    left = if is_check {
                        ExpressionNode::type_check(left, type_name)
                    } else {
                        ExpressionNode::type_cast(left, type_name)
                    };
                }
                Token::Pipe => {
                    let precedence = Precedence::Union as u8;
                    if precedence < min_precedence {
                        break;
                    }
                    self.index += 1;
                    let right = self.parse_binary(precedence + 1)?;
                    left = ExpressionNode::union(left, right);
                }
                _ => {
                    let Some((op, precedence)) = binary_operator(&token) else {
                        break;
                    };
                    let precedence = precedence as u8;
                    if precedence < min_precedence {
                        break;
                    }
                    self.index += 1;
                    // implies is right-associative, everything else is left.
                    let next_min = if op == BinaryOperator::Implies {
                        precedence
                    } else {
                        precedence + 1
                    };
                    let right = self.parse_binary(next_min)?;
                    left = ExpressionNode::binary_op(op, left, right);
                }
            }
        }

        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<ExpressionNode> {
        match self.peek() {
            Some(Token::Plus) => {
                self.index += 1;
                let operand = self.parse_binary(Precedence::Unary as u8)?;
                Ok(ExpressionNode::unary_op(UnaryOperator::Positive, operand))
            }
            Some(Token::Minus) => {
                self.index += 1;
                let operand = self.parse_binary(Precedence::Unary as u8)?;
                Ok(ExpressionNode::unary_op(UnaryOperator::Negate, operand))
            }
            _ => self.parse_primary(),
        }
    }

    fn parse_primary(&mut self) -> Result<ExpressionNode> {
        let position = self.position();
        let Some(token) = self.advance() else {
            return Err(FhirPathError::parse_error(position, "Unexpected end of input"));
        };

        match token {
            Token::Integer(value) => Ok(ExpressionNode::literal(LiteralValue::Integer(value))),
            Token::Decimal(text) => Ok(ExpressionNode::literal(LiteralValue::Decimal(text))),
            Token::String(value) => Ok(ExpressionNode::literal(LiteralValue::String(value))),
            Token::DateTime(text) => Ok(ExpressionNode::literal(LiteralValue::DateTime(text))),
            Token::True => Ok(ExpressionNode::literal(LiteralValue::Boolean(true))),
            Token::False => Ok(ExpressionNode::literal(LiteralValue::Boolean(false))),
            Token::LeftBrace => {
                self.expect(&Token::RightBrace, "'}' to close the empty literal")?;
                Ok(ExpressionNode::literal(LiteralValue::Null))
            }
            Token::DollarThis => Ok(ExpressionNode::variable("this")),
            Token::Percent => {
                let name = self.expect_identifier("external constant name after '%'")?;
                Ok(ExpressionNode::external_constant(name))
            }
            Token::Identifier(name) => {
                if self.peek() == Some(&Token::LeftParen) {
                    let args = self.parse_arguments()?;
                    Ok(ExpressionNode::function_call(name, args))
                } else {
                    Ok(ExpressionNode::identifier(name))
                }
            }
            Token::LeftParen => {
                let expression = self.parse_binary(Precedence::Implies as u8)?;
                self.expect(&Token::RightParen, "')' to close the expression")?;
                Ok(expression)
            }
            other => Err(FhirPathError::parse_error(
                position,
                format!("Unexpected token {other:?}"),
            )),
        }
    }

    fn parse_arguments(&mut self) -> Result<SmallVec<[ExpressionNode; 4]>> {
        self.expect(&Token::LeftParen, "'('")?;
        let mut args = SmallVec::new();
        if self.peek() == Some(&Token::RightParen) {
            self.index += 1;
            return Ok(args);
        }
        loop {
            args.push(self.parse_binary(Precedence::Implies as u8)?);
            match self.peek() {
                Some(Token::Comma) => {
                    self.index += 1;
                }
                Some(Token::RightParen) => {
                    self.index += 1;
                    return Ok(args);
                }
                _ => {
                    return Err(FhirPathError::parse_error(
                        self.position(),
                        "Expected ',' or ')' in argument list",
                    ));
                }
            }
        }
    }
}

/// Parse a FHIRPath expression into its parse tree
pub fn parse_expression(input: &str) -> Result<ExpressionNode> {
    let tokens = tokenize(input)?;
    Parser::new(tokens, input.len()).parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_chain() {
        let ast = parse_expression("name.family").unwrap();
        assert_eq!(
            ast,
            ExpressionNode::path(ExpressionNode::identifier("name"), "family")
        );
    }

    #[test]
    fn test_method_call() {
        let ast = parse_expression("name.exists()").unwrap();
        if let ExpressionNode::MethodCall(data) = ast {
            assert_eq!(data.method, "exists");
            assert!(data.args.is_empty());
        } else {
            panic!("Expected MethodCall");
        }
    }

    #[test]
    fn test_precedence() {
        // count() > 0 or active: comparison binds tighter than or.
        let ast = parse_expression("a > 0 or b").unwrap();
        if let ExpressionNode::BinaryOp(data) = ast {
            assert_eq!(data.op, BinaryOperator::Or);
        } else {
            panic!("Expected Or at the root");
        }

        // implies is right-associative.
        let ast = parse_expression("a implies b implies c").unwrap();
        if let ExpressionNode::BinaryOp(data) = ast {
            assert_eq!(data.op, BinaryOperator::Implies);
            assert!(matches!(data.left, ExpressionNode::Identifier(_)));
        } else {
            panic!("Expected Implies at the root");
        }
    }

    #[test]
    fn test_union_and_indexer() {
        let ast = parse_expression("(a | b)[0]").unwrap();
        if let ExpressionNode::Index { base, .. } = ast {
            assert!(matches!(*base, ExpressionNode::Union { .. }));
        } else {
            panic!("Expected Index at the root");
        }
    }

    #[test]
    fn test_type_operators() {
        let ast = parse_expression("value is Boolean").unwrap();
        assert!(matches!(ast, ExpressionNode::TypeCheck { .. }));

        let ast = parse_expression("value as Boolean").unwrap();
        assert!(matches!(ast, ExpressionNode::TypeCast { .. }));
    }

    #[test]
    fn test_type_operators_bind_looser_than_equality() {
        // is/as sit between membership and equality in the ladder, so
        // a = b is Patient reads as (a = b) is Patient.
        let ast = parse_expression("a = b is Patient").unwrap();
        if let ExpressionNode::TypeCheck {
            expression,
            type_name,
        } = ast
        {
            assert_eq!(type_name, "Patient");
            if let ExpressionNode::BinaryOp(data) = *expression {
                assert_eq!(data.op, BinaryOperator::Equal);
                assert_eq!(data.left, ExpressionNode::identifier("a"));
                assert_eq!(data.right, ExpressionNode::identifier("b"));
            } else {
                panic!("Expected Equal under the TypeCheck");
            }
        } else {
            panic!("Expected TypeCheck at the root");
        }

        // ...and looser than union as well.
        let ast = parse_expression("a | b as Quantity").unwrap();
        if let ExpressionNode::TypeCast { expression, .. } = ast {
            assert!(matches!(*expression, ExpressionNode::Union { .. }));
        } else {
            panic!("Expected TypeCast at the root");
        }
    }

    #[test]
    fn test_keyword_member_names() {
        let ast = parse_expression("name.contains('x')").unwrap();
        if let ExpressionNode::MethodCall(data) = ast {
            assert_eq!(data.method, "contains");
            assert_eq!(data.args.len(), 1);
        } else {
            panic!("Expected MethodCall");
        }
    }

    #[test]
    fn test_external_constant_and_this() {
        assert_eq!(
            parse_expression("%context").unwrap(),
            ExpressionNode::external_constant("context")
        );
        assert_eq!(
            parse_expression("$this").unwrap(),
            ExpressionNode::variable("this")
        );
    }

    #[test]
    fn test_empty_literal() {
        assert_eq!(
            parse_expression("{}").unwrap(),
            ExpressionNode::literal(LiteralValue::Null)
        );
    }

    #[test]
    fn test_unary_binds_tighter_than_comparison() {
        let ast = parse_expression("-x < 1").unwrap();
        if let ExpressionNode::BinaryOp(data) = ast {
            assert_eq!(data.op, BinaryOperator::LessThan);
            assert!(matches!(data.left, ExpressionNode::UnaryOp { .. }));
        } else {
            panic!("Expected LessThan at the root");
        }
    }

    #[test]
    fn test_syntax_errors() {
        assert!(parse_expression("name.").is_err());
        assert!(parse_expression("(a").is_err());
        assert!(parse_expression("a b").is_err());
        assert!(parse_expression("where(,)").is_err());
    }
}

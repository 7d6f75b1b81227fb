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

//! Parse-tree node definitions
//!
//! The parser produces these nodes without consulting the schema; the
//! compiler visits them against a root descriptor to build the typed
//! evaluation tree.

use smallvec::SmallVec;

use crate::ast::operator::{BinaryOperator, UnaryOperator};

/// Parse-tree representation of FHIRPath expressions
#[derive(Debug, Clone, PartialEq)]
pub enum ExpressionNode {
    /// Literal value
    Literal(LiteralValue),

    /// Member name looked up on the current context
    Identifier(String),

    /// Special variable such as `$this`
    Variable(String),

    /// External constant such as `%context` or `%ucum`
    ExternalConstant(String),

    /// Member invocation on a base expression (`base.path`)
    Path {
        /// Base expression
        base: Box<ExpressionNode>,
        /// Member name
        path: String,
    },

    /// Function call without an explicit base (`exists()`)
    FunctionCall(Box<FunctionCallData>),

    /// Function call on a base expression (`base.where(...)`)
    MethodCall(Box<MethodCallData>),

    /// Index access (`collection[index]`)
    Index {
        /// Base expression
        base: Box<ExpressionNode>,
        /// Index expression
        index: Box<ExpressionNode>,
    },

    /// Binary operation (boxed to keep the enum small)
    BinaryOp(Box<BinaryOpData>),

    /// Unary operation (`-x`, `+x`)
    UnaryOp {
        /// The operator
        op: UnaryOperator,
        /// The operand
        operand: Box<ExpressionNode>,
    },

    /// Type check (`value is Type`)
    TypeCheck {
        /// Expression to check
        expression: Box<ExpressionNode>,
        /// Type name
        type_name: String,
    },

    /// Type cast (`value as Type`)
    TypeCast {
        /// Expression to cast
        expression: Box<ExpressionNode>,
        /// Type name
        type_name: String,
    },

    /// Collection union (`left | right`)
    Union {
        /// Left collection
        left: Box<ExpressionNode>,
        /// Right collection
        right: Box<ExpressionNode>,
    },
}

/// Binary operation data
#[derive(Debug, Clone, PartialEq)]
pub struct BinaryOpData {
    /// The operator
    pub op: BinaryOperator,
    /// Left operand
    pub left: ExpressionNode,
    /// Right operand
    pub right: ExpressionNode,
}

/// Function call data
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionCallData {
    /// Function name
    pub name: String,
    /// Function arguments
    pub args: SmallVec<[ExpressionNode; 4]>,
}

/// Method call data
#[derive(Debug, Clone, PartialEq)]
pub struct MethodCallData {
    /// Base expression the method is invoked on
    pub base: ExpressionNode,
    /// Method name
    pub method: String,
    /// Method arguments
    pub args: SmallVec<[ExpressionNode; 4]>,
}

/// Literal values
#[derive(Debug, Clone, PartialEq)]
pub enum LiteralValue {
    /// Boolean literal
    Boolean(bool),
    /// Integer literal (range-checked by the compiler)
    Integer(i64),
    /// Decimal literal kept in textual form to preserve precision
    Decimal(String),
    /// String literal, unescaped by the tokenizer
    String(String),
    /// Date-time literal (`@2020-06-01`), kept textual until compilation
    DateTime(String),
    /// Empty collection literal (`{}`)
    Null,
}

impl ExpressionNode {
    /// Create a literal expression
    pub fn literal(value: LiteralValue) -> Self {
        Self::Literal(value)
    }

    /// Create an identifier expression
    pub fn identifier(name: impl Into<String>) -> Self {
        Self::Identifier(name.into())
    }

    /// Create a variable reference
    pub fn variable(name: impl Into<String>) -> Self {
        Self::Variable(name.into())
    }

    /// Create an external constant reference
    pub fn external_constant(name: impl Into<String>) -> Self {
        Self::ExternalConstant(name.into())
    }

    /// Create a member invocation
    pub fn path(base: ExpressionNode, path: impl Into<String>) -> Self {
        Self::Path {
            base: Box::new(base),
            path: path.into(),
        }
    }

    /// Create a function call without an explicit base
    pub fn function_call(
        name: impl Into<String>,
        args: impl Into<SmallVec<[ExpressionNode; 4]>>,
    ) -> Self {
        Self::FunctionCall(Box::new(FunctionCallData {
            name: name.into(),
            args: args.into(),
        }))
    }

    /// Create a method call on a base expression
    pub fn method_call(
        base: ExpressionNode,
        method: impl Into<String>,
        args: impl Into<SmallVec<[ExpressionNode; 4]>>,
    ) -> Self {
        Self::MethodCall(Box::new(MethodCallData {
            base,
            method: method.into(),
            args: args.into(),
        }))
    }

    /// Create an index access expression
    pub fn index(base: ExpressionNode, index: ExpressionNode) -> Self {
        Self::Index {
            base: Box::new(base),
            index: Box::new(index),
        }
    }

    /// Create a binary operation
    pub fn binary_op(op: BinaryOperator, left: ExpressionNode, right: ExpressionNode) -> Self {
        Self::BinaryOp(Box::new(BinaryOpData { op, left, right }))
    }

    /// Create a unary operation
    pub fn unary_op(op: UnaryOperator, operand: ExpressionNode) -> Self {
        Self::UnaryOp {
            op,
            operand: Box::new(operand),
        }
    }

    /// Create a type check
    pub fn type_check(expression: ExpressionNode, type_name: impl Into<String>) -> Self {
        Self::TypeCheck {
            expression: Box::new(expression),
            type_name: type_name.into(),
        }
    }

    /// Create a type cast
    pub fn type_cast(expression: ExpressionNode, type_name: impl Into<String>) -> Self {
        Self::TypeCast {
            expression: Box::new(expression),
            type_name: type_name.into(),
        }
    }

    /// Create a collection union
    pub fn union(left: ExpressionNode, right: ExpressionNode) -> Self {
        Self::Union {
            left: Box::new(left),
            right: Box::new(right),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors() {
        let literal = ExpressionNode::literal(LiteralValue::Integer(42));
        assert!(matches!(literal, ExpressionNode::Literal(_)));

        let path = ExpressionNode::path(ExpressionNode::identifier("name"), "family");
        if let ExpressionNode::Path { path, .. } = path {
            assert_eq!(path, "family");
        } else {
            panic!("Expected Path");
        }

        let call = ExpressionNode::method_call(
            ExpressionNode::identifier("name"),
            "exists",
            SmallVec::new(),
        );
        if let ExpressionNode::MethodCall(data) = call {
            assert_eq!(data.method, "exists");
            assert!(data.args.is_empty());
        } else {
            panic!("Expected MethodCall");
        }
    }
}

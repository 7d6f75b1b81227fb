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

//! The typed evaluation tree
//!
//! A closed set of variants built by the compiler. Every node evaluates to
//! an ordered collection of messages and advertises an advisory static
//! return type (`None` = unknown at compile time). Shared sub-expressions
//! (`!=` wraps the `=` node in `not()`) are reference-counted.

use std::sync::Arc;

use crate::evaluator::functions;
use crate::evaluator::operators;
use crate::evaluator::workspace::{Collection, WorkSpace};
use crate::error::Result;
use crate::model::core;
use crate::model::descriptor::{Descriptor, FieldRef, PrimitiveKind};
use crate::model::message::{Message, PrimitiveValue};

/// Comparison flavors of the inequality operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CompareOp {
    LessThan,
    GreaterThan,
    LessThanOrEqual,
    GreaterThanOrEqual,
}

/// Three-valued boolean operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LogicOp {
    And,
    Or,
    Xor,
    Implies,
}

/// Field access data shared by invoke-term and invoke-expression nodes.
/// When the context type was unknown at compile time the field is resolved
/// per element at evaluation time; a missing field yields an empty
/// collection rather than an error, since sibling types in a heterogeneous
/// collection may lack it.
#[derive(Debug)]
pub(crate) struct InvokeData {
    pub(crate) field: Option<FieldRef>,
    pub(crate) field_name: String,
}

impl InvokeData {
    pub(crate) fn append_values(&self, message: &Arc<Message>, out: &mut Collection) {
        let index = match &self.field {
            Some(field) if field.containing().full_name() == message.descriptor().full_name() => {
                Some(field.index())
            }
            _ => message.descriptor().field_index_by_json_name(&self.field_name),
        };
        if let Some(index) = index {
            out.extend(message.field_values(index).iter().cloned());
        }
    }

    pub(crate) fn return_type(&self) -> Option<Arc<Descriptor>> {
        self.field.as_ref().and_then(|field| field.field().message_type())
    }
}

/// Functions of the supported FHIRPath subset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FunctionKind {
    Exists,
    Empty,
    Not,
    HasValue,
    Count,
    First,
    Tail,
    Distinct,
    IsDistinct,
    ToInteger,
    ToString,
    Length,
    Children,
    StartsWith,
    ContainsString,
    Matches,
    Trace,
    Combine,
    Intersect,
    Where,
    All,
    Select,
    Iif,
}

/// A compiled function invocation: the receiver plus compiled parameters
#[derive(Debug)]
pub(crate) struct FunctionExpr {
    pub(crate) kind: FunctionKind,
    pub(crate) child: Arc<Expr>,
    pub(crate) params: Vec<Arc<Expr>>,
}

/// A node of the compiled evaluation tree
#[derive(Debug)]
pub(crate) enum Expr {
    /// Freshly-minted primitive value
    Literal(PrimitiveValue),
    /// `{}` — always evaluates to the empty collection
    Empty,
    /// `$this` — top of the context stack
    This(Option<Arc<Descriptor>>),
    /// `%context` — bottom of the context stack
    Context(Option<Arc<Descriptor>>),
    /// Field read on the current context
    InvokeTerm(InvokeData),
    /// Field read on each result of a child expression
    InvokeExpr {
        child: Arc<Expr>,
        data: InvokeData,
    },
    /// `left[right]`
    Indexer {
        left: Arc<Expr>,
        right: Arc<Expr>,
    },
    /// `left | right`
    Union {
        left: Arc<Expr>,
        right: Arc<Expr>,
    },
    /// `left = right`
    Equals {
        left: Arc<Expr>,
        right: Arc<Expr>,
    },
    /// `<`, `>`, `<=`, `>=`
    Compare {
        op: CompareOp,
        left: Arc<Expr>,
        right: Arc<Expr>,
    },
    /// `left + right`
    Add {
        left: Arc<Expr>,
        right: Arc<Expr>,
    },
    /// `left & right`
    Concat {
        left: Arc<Expr>,
        right: Arc<Expr>,
    },
    /// Unary `+` / `-`
    Polarity {
        negate: bool,
        operand: Arc<Expr>,
    },
    /// `and`, `or`, `xor`, `implies`
    Logic {
        op: LogicOp,
        left: Arc<Expr>,
        right: Arc<Expr>,
    },
    /// `element in collection` / `collection contains element`
    Membership {
        collection: Arc<Expr>,
        element: Arc<Expr>,
    },
    /// `value is Type` (name-only, no inheritance)
    Is {
        child: Arc<Expr>,
        type_name: String,
    },
    /// `value as Type` (name-only filter)
    As {
        child: Arc<Expr>,
        type_name: String,
    },
    /// Function invocation
    Function(FunctionExpr),
}

impl Expr {
    /// Evaluate this node to an ordered collection
    pub(crate) fn evaluate(&self, work_space: &mut WorkSpace) -> Result<Collection> {
        match self {
            Expr::Literal(value) => Ok(vec![literal_message(value)]),
            Expr::Empty => Ok(Vec::new()),
            Expr::This(_) => Ok(vec![work_space.current_context().clone()]),
            Expr::Context(_) => Ok(vec![work_space.root_context().clone()]),
            Expr::InvokeTerm(data) => {
                let context = work_space.current_context().clone();
                let mut out = Vec::new();
                data.append_values(&context, &mut out);
                Ok(out)
            }
            Expr::InvokeExpr { child, data } => {
                let child_results = child.evaluate(work_space)?;
                let mut out = Vec::new();
                for message in &child_results {
                    data.append_values(message, &mut out);
                }
                Ok(out)
            }
            Expr::Indexer { left, right } => operators::eval_indexer(work_space, left, right),
            Expr::Union { left, right } => operators::eval_union(work_space, left, right),
            Expr::Equals { left, right } => operators::eval_equals(work_space, left, right),
            Expr::Compare { op, left, right } => {
                operators::eval_comparison(work_space, *op, left, right)
            }
            Expr::Add { left, right } => operators::eval_addition(work_space, left, right),
            Expr::Concat { left, right } => operators::eval_concatenation(work_space, left, right),
            Expr::Polarity { negate, operand } => {
                operators::eval_polarity(work_space, *negate, operand)
            }
            Expr::Logic { op, left, right } => operators::eval_logic(work_space, *op, left, right),
            Expr::Membership {
                collection,
                element,
            } => operators::eval_membership(work_space, collection, element),
            Expr::Is { child, type_name } => functions::eval_is(work_space, child, type_name),
            Expr::As { child, type_name } => functions::eval_as(work_space, child, type_name),
            Expr::Function(function) => functions::eval_function(work_space, function),
        }
    }

    /// Advisory static return type; `None` means unknown at compile time
    pub(crate) fn return_type(&self) -> Option<Arc<Descriptor>> {
        match self {
            Expr::Literal(value) => Some(literal_descriptor(value)),
            Expr::Empty => None,
            Expr::This(descriptor) | Expr::Context(descriptor) => descriptor.clone(),
            Expr::InvokeTerm(data) => data.return_type(),
            Expr::InvokeExpr { data, .. } => data.return_type(),
            Expr::Indexer { left, .. } => left.return_type(),
            Expr::Union { left, right } => same_type(left.return_type(), right.return_type()),
            Expr::Equals { .. }
            | Expr::Compare { .. }
            | Expr::Logic { .. }
            | Expr::Membership { .. }
            | Expr::Is { .. } => Some(core::boolean()),
            Expr::Add { left, .. } => left.return_type(),
            Expr::Concat { .. } => Some(core::string()),
            Expr::Polarity { operand, .. } => operand.return_type(),
            Expr::As { .. } => None,
            Expr::Function(function) => function_return_type(function),
        }
    }
}

fn function_return_type(function: &FunctionExpr) -> Option<Arc<Descriptor>> {
    match function.kind {
        FunctionKind::Exists
        | FunctionKind::Empty
        | FunctionKind::Not
        | FunctionKind::HasValue
        | FunctionKind::IsDistinct
        | FunctionKind::StartsWith
        | FunctionKind::ContainsString
        | FunctionKind::Matches
        | FunctionKind::All => Some(core::boolean()),
        FunctionKind::Count | FunctionKind::ToInteger | FunctionKind::Length => {
            Some(core::integer())
        }
        FunctionKind::ToString => Some(core::string()),
        FunctionKind::First
        | FunctionKind::Tail
        | FunctionKind::Distinct
        | FunctionKind::Trace
        | FunctionKind::Where
        | FunctionKind::Iif => function.child.return_type(),
        FunctionKind::Select => function.params.first().and_then(|p| p.return_type()),
        FunctionKind::Combine | FunctionKind::Intersect => same_type(
            function.child.return_type(),
            function.params.first().and_then(|p| p.return_type()),
        ),
        // The direct children of a value may mix types.
        FunctionKind::Children => None,
    }
}

fn same_type(
    left: Option<Arc<Descriptor>>,
    right: Option<Arc<Descriptor>>,
) -> Option<Arc<Descriptor>> {
    match (left, right) {
        (Some(left), Some(right)) if left.full_name() == right.full_name() => Some(left),
        _ => None,
    }
}

fn literal_message(value: &PrimitiveValue) -> Arc<Message> {
    Message::primitive(&literal_descriptor(value), value.clone())
}

fn literal_descriptor(value: &PrimitiveValue) -> Arc<Descriptor> {
    match value.kind() {
        PrimitiveKind::Boolean => core::boolean(),
        PrimitiveKind::Integer => core::integer(),
        PrimitiveKind::UnsignedInt => core::unsigned_int(),
        PrimitiveKind::Decimal => core::decimal(),
        PrimitiveKind::String => core::string(),
        PrimitiveKind::Code => core::code(),
        PrimitiveKind::Uri => core::uri(),
        PrimitiveKind::DateTime => core::date_time(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_evaluation() {
        let mut work_space = WorkSpace::new(Message::boolean(true));
        let literal = Expr::Literal(PrimitiveValue::Integer(7));
        let results = literal.evaluate(&mut work_space).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].as_integer(), Some(7));
        assert_eq!(
            literal.return_type().map(|d| d.name().to_string()),
            Some("Integer".to_string())
        );
    }

    #[test]
    fn test_empty_literal() {
        let mut work_space = WorkSpace::new(Message::boolean(true));
        assert!(Expr::Empty.evaluate(&mut work_space).unwrap().is_empty());
        assert!(Expr::Empty.return_type().is_none());
    }

    #[test]
    fn test_this_and_context_references() {
        let root = Message::string("root");
        let mut work_space = WorkSpace::new(root.clone());
        work_space.push_context(Message::string("inner"));

        let this_ref = Expr::This(None);
        let results = this_ref.evaluate(&mut work_space).unwrap();
        assert_eq!(results[0].as_str(), Some("inner"));

        let context_ref = Expr::Context(None);
        let results = context_ref.evaluate(&mut work_space).unwrap();
        assert_eq!(results[0].as_str(), Some("root"));
    }
}

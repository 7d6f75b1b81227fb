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

//! Compiler from the parse tree to the typed evaluation tree
//!
//! The compiler walks the parse tree carrying a descriptor stack: the top
//! is the current `$this` type, the bottom the root type bound to
//! `%context`. Field references resolve against the known context type at
//! compile time; when the context type is unknown (mixed collections,
//! `children()`), resolution defers to evaluation time. Arity and operator
//! support are checked here so unsupported constructs never reach the
//! evaluator.

use std::sync::Arc;

use rust_decimal::Decimal;

use crate::ast::{
    BinaryOpData, BinaryOperator, ExpressionNode as AstNode, LiteralValue, UnaryOperator,
};
use crate::error::{FhirPathError, Result};
use crate::evaluator::expression::{
    CompareOp, Expr, FunctionExpr, FunctionKind, InvokeData, LogicOp,
};
use crate::evaluator::workspace::WorkSpace;
use crate::evaluator::EvaluationResult;
use crate::model::descriptor::{Descriptor, FieldRef};
use crate::model::message::{DateTimeValue, Message, PrimitiveValue};
use crate::parser::parse_expression;

const UCUM_IRI: &str = "http://unitsofmeasure.org";
const SCT_IRI: &str = "http://snomed.info/sct";
const LOINC_IRI: &str = "http://loinc.org";

/// A compiled FHIRPath expression: the evaluation-tree root plus the
/// original source text. Cheap to clone by shared ownership of the root and
/// safe to share across threads for read-only evaluation.
#[derive(Debug, Clone)]
pub struct CompiledExpression {
    source: String,
    root: Arc<Expr>,
}

impl CompiledExpression {
    /// Compile a FHIRPath expression against the given root descriptor.
    ///
    /// Returns the compiled expression or the first parse/compile failure.
    pub fn compile(descriptor: &Arc<Descriptor>, source: &str) -> Result<CompiledExpression> {
        let ast = parse_expression(source)?;
        let compiler = ExpressionCompiler::new(descriptor.clone());
        let root = compiler.compile(&ast)?;
        Ok(CompiledExpression {
            source: source.to_string(),
            root,
        })
    }

    /// The original source text
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluate the expression with the given message as root context
    pub fn evaluate(&self, message: &Arc<Message>) -> Result<EvaluationResult> {
        let mut work_space = WorkSpace::new(message.clone());
        let messages = self.root.evaluate(&mut work_space)?;
        Ok(EvaluationResult::new(messages))
    }
}

/// Visitor over the parse tree producing evaluation-tree nodes
struct ExpressionCompiler {
    // Top entry is the current $this type, bottom the root type; None marks
    // a statically unknown context.
    descriptor_stack: Vec<Option<Arc<Descriptor>>>,
}

impl ExpressionCompiler {
    fn new(root: Arc<Descriptor>) -> Self {
        Self {
            descriptor_stack: vec![Some(root)],
        }
    }

    /// Visitor for a function parameter compiled in the child context: the
    /// receiver's element type becomes $this.
    fn child_compiler(&self, context: Option<Arc<Descriptor>>) -> Self {
        let mut descriptor_stack = self.descriptor_stack.clone();
        descriptor_stack.push(context);
        Self { descriptor_stack }
    }

    fn current_context(&self) -> Option<&Arc<Descriptor>> {
        self.descriptor_stack.last().and_then(|d| d.as_ref())
    }

    fn root_context(&self) -> Option<&Arc<Descriptor>> {
        self.descriptor_stack.first().and_then(|d| d.as_ref())
    }

    fn compile(&self, node: &AstNode) -> Result<Arc<Expr>> {
        match node {
            AstNode::Literal(literal) => self.compile_literal(literal),
            AstNode::Identifier(name) => {
                let data = self.resolve_field(self.current_context(), name)?;
                Ok(Arc::new(Expr::InvokeTerm(data)))
            }
            AstNode::Variable(name) => {
                if name == "this" {
                    Ok(Arc::new(Expr::This(self.current_context().cloned())))
                } else {
                    Err(FhirPathError::compile_error(format!(
                        "Unknown variable ${name}"
                    )))
                }
            }
            AstNode::ExternalConstant(name) => self.compile_external_constant(name),
            AstNode::Path { base, path } => {
                let child = self.compile(base)?;
                let data = self.resolve_field(child.return_type().as_ref(), path)?;
                Ok(Arc::new(Expr::InvokeExpr { child, data }))
            }
            AstNode::FunctionCall(data) => {
                let child = Arc::new(Expr::This(self.current_context().cloned()));
                self.compile_function(&data.name, child, &data.args)
            }
            AstNode::MethodCall(data) => {
                let child = self.compile(&data.base)?;
                self.compile_function(&data.method, child, &data.args)
            }
            AstNode::Index { base, index } => Ok(Arc::new(Expr::Indexer {
                left: self.compile(base)?,
                right: self.compile(index)?,
            })),
            AstNode::UnaryOp { op, operand } => Ok(Arc::new(Expr::Polarity {
                negate: *op == UnaryOperator::Negate,
                operand: self.compile(operand)?,
            })),
            AstNode::TypeCheck {
                expression,
                type_name,
            } => Ok(Arc::new(Expr::Is {
                child: self.compile(expression)?,
                type_name: type_name.clone(),
            })),
            AstNode::TypeCast {
                expression,
                type_name,
            } => Ok(Arc::new(Expr::As {
                child: self.compile(expression)?,
                type_name: type_name.clone(),
            })),
            AstNode::Union { left, right } => Ok(Arc::new(Expr::Union {
                left: self.compile(left)?,
                right: self.compile(right)?,
            })),
            AstNode::BinaryOp(data) => self.compile_binary_op(data),
        }
    }

    fn compile_literal(&self, literal: &LiteralValue) -> Result<Arc<Expr>> {
        let expr = match literal {
            LiteralValue::Boolean(value) => Expr::Literal(PrimitiveValue::Boolean(*value)),
            LiteralValue::Integer(value) => {
                let value = i32::try_from(*value).map_err(|_| {
                    FhirPathError::compile_error(format!("Malformed integer {value}"))
                })?;
                Expr::Literal(PrimitiveValue::Integer(value))
            }
            LiteralValue::Decimal(text) => {
                text.parse::<Decimal>().map_err(|_| {
                    FhirPathError::compile_error(format!("Malformed decimal {text}"))
                })?;
                Expr::Literal(PrimitiveValue::Decimal(text.clone()))
            }
            LiteralValue::String(value) => Expr::Literal(PrimitiveValue::String(value.clone())),
            LiteralValue::DateTime(text) => {
                let value = DateTimeValue::parse(text).map_err(|_| {
                    FhirPathError::compile_error(format!("Malformed date-time literal @{text}"))
                })?;
                Expr::Literal(PrimitiveValue::DateTime(value))
            }
            LiteralValue::Null => Expr::Empty,
        };
        Ok(Arc::new(expr))
    }

    fn compile_external_constant(&self, name: &str) -> Result<Arc<Expr>> {
        match name {
            "ucum" => Ok(Arc::new(Expr::Literal(PrimitiveValue::String(
                UCUM_IRI.to_string(),
            )))),
            "sct" => Ok(Arc::new(Expr::Literal(PrimitiveValue::String(
                SCT_IRI.to_string(),
            )))),
            "loinc" => Ok(Arc::new(Expr::Literal(PrimitiveValue::String(
                LOINC_IRI.to_string(),
            )))),
            "context" => Ok(Arc::new(Expr::Context(self.root_context().cloned()))),
            _ => Err(FhirPathError::compile_error(format!(
                "Unknown external constant: {name}"
            ))),
        }
    }

    /// Resolve a field reference against the known context type. An unknown
    /// context defers resolution to evaluation time; a known context without
    /// the field is a compile error.
    fn resolve_field(
        &self,
        context: Option<&Arc<Descriptor>>,
        name: &str,
    ) -> Result<InvokeData> {
        match context {
            Some(descriptor) => match descriptor.field_index_by_json_name(name) {
                Some(index) => Ok(InvokeData {
                    field: Some(FieldRef::new(descriptor.clone(), index)),
                    field_name: name.to_string(),
                }),
                None => Err(FhirPathError::compile_error(format!(
                    "Unable to find field {name}"
                ))),
            },
            None => Ok(InvokeData {
                field: None,
                field_name: name.to_string(),
            }),
        }
    }

    fn compile_binary_op(&self, data: &BinaryOpData) -> Result<Arc<Expr>> {
        let unsupported = |what: &str| {
            Err(FhirPathError::compile_error(format!(
                "Unsupported {what} operator: {}",
                data.op.symbol()
            )))
        };

        let logic = |op: LogicOp| -> Result<Arc<Expr>> {
            Ok(Arc::new(Expr::Logic {
                op,
                left: self.compile(&data.left)?,
                right: self.compile(&data.right)?,
            }))
        };
        let compare = |op: CompareOp| -> Result<Arc<Expr>> {
            Ok(Arc::new(Expr::Compare {
                op,
                left: self.compile(&data.left)?,
                right: self.compile(&data.right)?,
            }))
        };

        match data.op {
            BinaryOperator::Equal => Ok(Arc::new(Expr::Equals {
                left: self.compile(&data.left)?,
                right: self.compile(&data.right)?,
            })),
            BinaryOperator::NotEqual => {
                // != negates the shared equals node.
                let equals = Arc::new(Expr::Equals {
                    left: self.compile(&data.left)?,
                    right: self.compile(&data.right)?,
                });
                Ok(Arc::new(Expr::Function(FunctionExpr {
                    kind: FunctionKind::Not,
                    child: equals,
                    params: Vec::new(),
                })))
            }
            BinaryOperator::LessThan => compare(CompareOp::LessThan),
            BinaryOperator::GreaterThan => compare(CompareOp::GreaterThan),
            BinaryOperator::LessThanOrEqual => compare(CompareOp::LessThanOrEqual),
            BinaryOperator::GreaterThanOrEqual => compare(CompareOp::GreaterThanOrEqual),
            BinaryOperator::Add => Ok(Arc::new(Expr::Add {
                left: self.compile(&data.left)?,
                right: self.compile(&data.right)?,
            })),
            BinaryOperator::Concatenate => Ok(Arc::new(Expr::Concat {
                left: self.compile(&data.left)?,
                right: self.compile(&data.right)?,
            })),
            BinaryOperator::And => logic(LogicOp::And),
            BinaryOperator::Or => logic(LogicOp::Or),
            BinaryOperator::Xor => logic(LogicOp::Xor),
            BinaryOperator::Implies => logic(LogicOp::Implies),
            BinaryOperator::In => Ok(Arc::new(Expr::Membership {
                collection: self.compile(&data.right)?,
                element: self.compile(&data.left)?,
            })),
            BinaryOperator::Contains => Ok(Arc::new(Expr::Membership {
                collection: self.compile(&data.left)?,
                element: self.compile(&data.right)?,
            })),
            BinaryOperator::Subtract => unsupported("additive"),
            BinaryOperator::Multiply
            | BinaryOperator::Divide
            | BinaryOperator::IntegerDivide
            | BinaryOperator::Modulo => unsupported("multiplicative"),
            BinaryOperator::Equivalent | BinaryOperator::NotEquivalent => unsupported("equality"),
        }
    }

    fn compile_function(
        &self,
        name: &str,
        child: Arc<Expr>,
        args: &[AstNode],
    ) -> Result<Arc<Expr>> {
        let wrap = |error: FhirPathError| {
            FhirPathError::compile_error(format!("Failed to compile call to {name}(): {error}"))
        };
        let arity_error = |message: &str| {
            Err(FhirPathError::compile_error(format!(
                "Failed to compile call to {name}(): {message}"
            )))
        };

        let zero_parameter = |kind: FunctionKind| -> Result<Arc<Expr>> {
            if !args.is_empty() {
                return arity_error("Function does not accept any arguments.");
            }
            Ok(Arc::new(Expr::Function(FunctionExpr {
                kind,
                child: child.clone(),
                params: Vec::new(),
            })))
        };

        // Parameters of where/all/select and iif's criterion see the
        // receiver's element type as $this; all others compile in the base
        // context.
        let base_context_parameter = |kind: FunctionKind| -> Result<Arc<Expr>> {
            if args.len() != 1 {
                return arity_error("Function requires exactly one argument.");
            }
            let param = self.compile(&args[0]).map_err(&wrap)?;
            Ok(Arc::new(Expr::Function(FunctionExpr {
                kind,
                child: child.clone(),
                params: vec![param],
            })))
        };

        let child_context_parameter = |kind: FunctionKind| -> Result<Arc<Expr>> {
            if args.len() != 1 {
                return arity_error("Function requires exactly one argument.");
            }
            let child_visitor = self.child_compiler(child.return_type());
            let param = child_visitor.compile(&args[0]).map_err(&wrap)?;
            Ok(Arc::new(Expr::Function(FunctionExpr {
                kind,
                child: child.clone(),
                params: vec![param],
            })))
        };

        match name {
            "exists" => zero_parameter(FunctionKind::Exists),
            "empty" => zero_parameter(FunctionKind::Empty),
            "not" => zero_parameter(FunctionKind::Not),
            "hasValue" => zero_parameter(FunctionKind::HasValue),
            "count" => zero_parameter(FunctionKind::Count),
            "first" => zero_parameter(FunctionKind::First),
            "tail" => zero_parameter(FunctionKind::Tail),
            "distinct" => zero_parameter(FunctionKind::Distinct),
            "isDistinct" => zero_parameter(FunctionKind::IsDistinct),
            "toInteger" => zero_parameter(FunctionKind::ToInteger),
            "toString" => zero_parameter(FunctionKind::ToString),
            "length" => zero_parameter(FunctionKind::Length),
            "children" => zero_parameter(FunctionKind::Children),
            "startsWith" => base_context_parameter(FunctionKind::StartsWith),
            "contains" => base_context_parameter(FunctionKind::ContainsString),
            "matches" => base_context_parameter(FunctionKind::Matches),
            "trace" => base_context_parameter(FunctionKind::Trace),
            "combine" => base_context_parameter(FunctionKind::Combine),
            "intersect" => base_context_parameter(FunctionKind::Intersect),
            "where" => child_context_parameter(FunctionKind::Where),
            "all" => child_context_parameter(FunctionKind::All),
            "select" => child_context_parameter(FunctionKind::Select),
            "iif" => {
                if args.len() < 2 || args.len() > 3 {
                    return arity_error("iif() requires 2 or 3 arguments.");
                }
                let child_visitor = self.child_compiler(child.return_type());
                let mut params = vec![child_visitor.compile(&args[0]).map_err(&wrap)?];
                for arg in &args[1..] {
                    params.push(self.compile(arg).map_err(&wrap)?);
                }
                Ok(Arc::new(Expr::Function(FunctionExpr {
                    kind: FunctionKind::Iif,
                    child: child.clone(),
                    params,
                })))
            }
            "is" | "as" => {
                let type_name = match args {
                    [AstNode::Identifier(type_name)] => type_name.clone(),
                    _ => return arity_error("Function requires a single type identifier."),
                };
                if name == "is" {
                    Ok(Arc::new(Expr::Is {
                        child: child.clone(),
                        type_name,
                    }))
                } else {
                    Ok(Arc::new(Expr::As {
                        child: child.clone(),
                        type_name,
                    }))
                }
            }
            _ => Err(FhirPathError::compile_error(format!(
                "The function {name} is not yet implemented"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::schema;

    fn compile(source: &str) -> Result<CompiledExpression> {
        CompiledExpression::compile(&schema::patient(), source)
    }

    #[test]
    fn test_compiles_known_fields() {
        assert!(compile("name.family").is_ok());
        assert!(compile("name.given").is_ok());
        assert!(compile("birthDate").is_ok());
        // Lookup goes through the JSON name, not the wire name.
        assert!(compile("name.use").is_ok());
    }

    #[test]
    fn test_unknown_field_is_a_compile_error() {
        let error = compile("name.nickname").unwrap_err();
        assert!(error.to_string().contains("Unable to find field nickname"));

        let error = compile("nickname").unwrap_err();
        assert!(error.to_string().contains("Unable to find field nickname"));
    }

    #[test]
    fn test_unknown_field_inside_function_parameter() {
        let error = compile("name.where(nickname = 'x')").unwrap_err();
        let text = error.to_string();
        assert!(text.contains("Failed to compile call to where()"));
        assert!(text.contains("Unable to find field nickname"));
    }

    #[test]
    fn test_children_defers_field_resolution() {
        // children() has no static type, so member lookup on it must not
        // fail at compile time.
        assert!(compile("children().family").is_ok());
    }

    #[test]
    fn test_arity_errors() {
        assert!(compile("name.exists(1)").is_err());
        assert!(compile("name.where()").is_err());
        assert!(compile("iif(active)").is_err());
        assert!(compile("name.startsWith('a', 'b')").is_err());
    }

    #[test]
    fn test_unsupported_operators() {
        let error = compile("1 - 1").unwrap_err();
        assert!(error.to_string().contains("Unsupported additive operator: -"));

        assert!(compile("1 * 2").is_err());
        assert!(compile("1 / 2").is_err());
        assert!(compile("1 div 2").is_err());
        assert!(compile("1 mod 2").is_err());
        assert!(compile("active ~ active").is_err());
    }

    #[test]
    fn test_unknown_function() {
        let error = compile("name.repeat()").unwrap_err();
        assert!(error
            .to_string()
            .contains("The function repeat is not yet implemented"));
    }

    #[test]
    fn test_external_constants() {
        assert!(compile("%context.name").is_ok());
        assert!(compile("%ucum").is_ok());
        let error = compile("%unknown").unwrap_err();
        assert!(error.to_string().contains("Unknown external constant"));
    }

    #[test]
    fn test_integer_literal_overflow() {
        let error = compile("2147483648").unwrap_err();
        assert!(error.to_string().contains("Malformed integer"));
        assert!(compile("2147483647").is_ok());
    }

    #[test]
    fn test_malformed_date_time_literal() {
        assert!(compile("@20").is_err());
        assert!(compile("@2020-06-01").is_ok());
    }

    #[test]
    fn test_syntax_error_surfaces_through_compile() {
        let error = compile("name..family").unwrap_err();
        assert!(matches!(error, FhirPathError::ParseError { .. }));
    }
}

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

//! Error types for FHIRPath compilation, evaluation and validation

use thiserror::Error;

/// Result type alias for FHIRPath operations
pub type Result<T> = std::result::Result<T, FhirPathError>;

/// Error type covering every stage of the engine: parsing, compilation,
/// evaluation and constraint validation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FhirPathError {
    /// Syntax not accepted by the grammar
    #[error("Parse error at position {position}: {message}")]
    ParseError {
        /// Byte position in the source where the error occurred
        position: usize,
        /// Human-readable error message
        message: String,
    },

    /// Arity mismatch, unknown field on a known type, unknown external
    /// constant or unsupported operator
    #[error("Compile error: {message}")]
    CompileError {
        /// Human-readable error message
        message: String,
    },

    /// Operand shape or type wrong at evaluation time
    #[error("Type error: {message}")]
    TypeError {
        /// Human-readable error message
        message: String,
    },

    /// Runtime evaluation errors
    #[error("Evaluation error: {message}")]
    EvaluationError {
        /// Human-readable error message
        message: String,
    },

    /// Regular expression passed to `matches()` failed to compile
    #[error("Unable to parse regular expression '{pattern}': {message}")]
    InvalidRegex {
        /// The offending pattern
        pattern: String,
        /// Error reported by the regex engine
        message: String,
    },

    /// Arithmetic overflow during evaluation
    #[error("Arithmetic overflow in {operation}")]
    ArithmeticOverflow {
        /// The operation that overflowed
        operation: String,
    },

    /// A constraint expression evaluated to non-true
    #[error("{message}")]
    ConstraintViolation {
        /// Violation description including the source expression
        message: String,
    },
}

impl FhirPathError {
    /// Create a parse error
    pub fn parse_error(position: usize, message: impl Into<String>) -> Self {
        Self::ParseError {
            position,
            message: message.into(),
        }
    }

    /// Create a compile error
    pub fn compile_error(message: impl Into<String>) -> Self {
        Self::CompileError {
            message: message.into(),
        }
    }

    /// Create a type error
    pub fn type_error(message: impl Into<String>) -> Self {
        Self::TypeError {
            message: message.into(),
        }
    }

    /// Create an evaluation error
    pub fn evaluation_error(message: impl Into<String>) -> Self {
        Self::EvaluationError {
            message: message.into(),
        }
    }

    /// Create an invalid regex error
    pub fn invalid_regex(pattern: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidRegex {
            pattern: pattern.into(),
            message: message.into(),
        }
    }

    /// Create an arithmetic overflow error
    pub fn arithmetic_overflow(operation: impl Into<String>) -> Self {
        Self::ArithmeticOverflow {
            operation: operation.into(),
        }
    }

    /// Create a constraint violation error
    pub fn constraint_violation(message: impl Into<String>) -> Self {
        Self::ConstraintViolation {
            message: message.into(),
        }
    }

    /// True if this error is a constraint violation
    pub fn is_constraint_violation(&self) -> bool {
        matches!(self, Self::ConstraintViolation { .. })
    }
}

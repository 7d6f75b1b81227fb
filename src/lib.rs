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

//! Schema-driven FHIRPath engine
//!
//! Compiles FHIRPath source text against a reflective schema into a typed
//! evaluation tree, evaluates it over message trees to ordered collections,
//! and enforces schema-attached constraints through a recursive validator.
//!
//! ```
//! use fhirpath_engine::{message_from_json, schema, CompiledExpression};
//!
//! # fn main() -> fhirpath_engine::Result<()> {
//! let patient = message_from_json(
//!     &schema::patient(),
//!     &serde_json::json!({"name": [{"family": "Smith"}], "active": true}),
//! )?;
//!
//! let expression = CompiledExpression::compile(&schema::patient(), "name.family")?;
//! let result = expression.evaluate(&patient)?;
//! assert_eq!(result.as_string()?, "Smith");
//! # Ok(())
//! # }
//! ```

pub mod ast;
pub mod compiler;
pub mod error;
pub mod evaluator;
pub mod model;
pub mod parser;
pub mod validator;

pub use compiler::CompiledExpression;
pub use error::{FhirPathError, Result};
pub use evaluator::EvaluationResult;
pub use model::schema;
pub use model::{
    message_from_json, Cardinality, DateTimePrecision, DateTimeValue, Descriptor,
    DescriptorBuilder, FieldDescriptor, FieldRef, FhirVersion, Message, PrimitiveKind,
    PrimitiveValue, StructureKind,
};
pub use parser::parse_expression;
pub use validator::MessageValidator;

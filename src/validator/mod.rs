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

//! Recursive constraint validator
//!
//! Walks a message tree, lazily compiling and caching the constraint
//! expressions attached to each descriptor and its fields, evaluating them
//! and reporting violations through a caller-supplied handler. The cache
//! entry is inserted before recursing into field types, so cyclic schemas
//! terminate. Constraints that fail to compile are logged and skipped; the
//! validator keeps working for the rest of the schema.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::warn;

use crate::compiler::CompiledExpression;
use crate::error::{FhirPathError, Result};
use crate::model::descriptor::{Descriptor, FieldDescriptor, FieldRef};
use crate::model::message::Message;

/// Per-descriptor constraint cache entry
struct MessageConstraints {
    /// Constraints attached to the message type itself
    message_expressions: Vec<CompiledExpression>,
    /// Constraints attached to fields, compiled against the field's type
    field_expressions: Vec<(FieldRef, CompiledExpression)>,
    /// Fields whose types directly or transitively carry constraints
    nested_with_constraints: Vec<FieldRef>,
}

impl MessageConstraints {
    fn is_empty(&self) -> bool {
        self.message_expressions.is_empty()
            && self.field_expressions.is_empty()
            && self.nested_with_constraints.is_empty()
    }
}

type ConstraintsCache = HashMap<String, Arc<MessageConstraints>>;

/// Validates message trees against the constraint expressions declared on
/// their schema. Shareable across threads; the internal cache is guarded by
/// a mutex around the lazy compile step.
pub struct MessageValidator {
    constraints_cache: Mutex<ConstraintsCache>,
}

impl Default for MessageValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageValidator {
    /// Create a validator with an empty constraints cache
    pub fn new() -> Self {
        Self {
            constraints_cache: Mutex::new(HashMap::new()),
        }
    }

    /// Validate a message, halting on the first violation
    pub fn validate(&self, message: &Arc<Message>) -> Result<()> {
        self.validate_with_handler(message, |_, _, _| true)
    }

    /// Validate a message, reporting each violation through `handler`.
    ///
    /// The handler receives the containing message, the violated field (or
    /// `None` for message-level constraints) and the constraint source
    /// text; returning `true` halts further validation. The first non-ok
    /// status becomes the return value, but traversal continues until a
    /// handler halts or the walk completes.
    pub fn validate_with_handler<F>(&self, message: &Arc<Message>, mut handler: F) -> Result<()>
    where
        F: FnMut(&Message, Option<&FieldDescriptor>, &str) -> bool,
    {
        let mut halt_validation = false;
        self.validate_message(message, &mut handler, &mut halt_validation)
    }

    fn validate_message(
        &self,
        message: &Arc<Message>,
        handler: &mut dyn FnMut(&Message, Option<&FieldDescriptor>, &str) -> bool,
        halt_validation: &mut bool,
    ) -> Result<()> {
        // constraints_for may recursively build entries, so the lock is
        // held around the whole lazy compute step.
        let constraints = {
            let mut cache = self.constraints_cache.lock();
            constraints_for(&mut cache, message.descriptor())
        };

        // Keep the first failure to return to the caller.
        let mut status: Result<()> = Ok(());

        for expression in &constraints.message_expressions {
            update_status(
                &mut status,
                validate_message_constraint(message, expression, handler, halt_validation),
            );
            if *halt_validation {
                return status;
            }
        }

        for (field, expression) in &constraints.field_expressions {
            if *halt_validation {
                return status;
            }
            if field.containing().full_name() != message.descriptor().full_name() {
                continue;
            }
            for child in message.field_values(field.index()) {
                update_status(
                    &mut status,
                    validate_field_constraint(message, field, child, expression, handler, halt_validation),
                );
                if *halt_validation {
                    break;
                }
            }
        }

        for field in &constraints.nested_with_constraints {
            if *halt_validation {
                return status;
            }
            if field.containing().full_name() != message.descriptor().full_name() {
                continue;
            }
            for child in message.field_values(field.index()) {
                update_status(
                    &mut status,
                    self.validate_message(child, handler, halt_validation),
                );
                if *halt_validation {
                    break;
                }
            }
        }

        status
    }
}

/// Build (or fetch) the constraints for a descriptor, inserting the cache
/// entry before recursing into field types so cycles terminate.
fn constraints_for(
    cache: &mut ConstraintsCache,
    descriptor: &Arc<Descriptor>,
) -> Arc<MessageConstraints> {
    if let Some(constraints) = cache.get(descriptor.full_name()) {
        return constraints.clone();
    }

    let mut message_expressions = Vec::new();
    for source in descriptor.constraints() {
        match CompiledExpression::compile(descriptor, source) {
            Ok(expression) => message_expressions.push(expression),
            Err(error) => warn!(
                "Ignoring message constraint on {} ({}). {}",
                descriptor.name(),
                source,
                error
            ),
        }
    }

    let mut field_expressions = Vec::new();
    for (index, field) in descriptor.fields().iter().enumerate() {
        // Constraints only apply to message-typed fields; raw scalars
        // inside primitive wrappers carry none.
        let Some(field_type) = field.message_type() else {
            continue;
        };
        for source in field.constraints() {
            match CompiledExpression::compile(&field_type, source) {
                Ok(expression) => {
                    field_expressions.push((FieldRef::new(descriptor.clone(), index), expression));
                }
                Err(error) => warn!(
                    "Ignoring field constraint on {}.{} ({}). {}",
                    descriptor.name(),
                    field.json_name(),
                    source,
                    error
                ),
            }
        }
    }

    // A placeholder with an empty nested list goes in first; the only
    // recursive use below reads the expression lists, so cycles see a
    // complete-enough entry and terminate.
    cache.insert(
        descriptor.full_name().to_string(),
        Arc::new(MessageConstraints {
            message_expressions: message_expressions.clone(),
            field_expressions: field_expressions.clone(),
            nested_with_constraints: Vec::new(),
        }),
    );

    let mut nested_with_constraints = Vec::new();
    for (index, field) in descriptor.fields().iter().enumerate() {
        let Some(field_type) = field.message_type() else {
            continue;
        };
        let child_constraints = constraints_for(cache, &field_type);
        if !child_constraints.is_empty() {
            nested_with_constraints.push(FieldRef::new(descriptor.clone(), index));
        }
    }

    let constraints = Arc::new(MessageConstraints {
        message_expressions,
        field_expressions,
        nested_with_constraints,
    });
    cache.insert(descriptor.full_name().to_string(), constraints.clone());
    constraints
}

fn validate_message_constraint(
    message: &Arc<Message>,
    expression: &CompiledExpression,
    handler: &mut dyn FnMut(&Message, Option<&FieldDescriptor>, &str) -> bool,
    halt_validation: &mut bool,
) -> Result<()> {
    let result = expression.evaluate(message)?;

    match result.as_boolean() {
        Err(_) => {
            *halt_validation = true;
            Err(FhirPathError::evaluation_error(format!(
                "Constraint did not evaluate to boolean: {}: \"{}\"",
                message.descriptor().name(),
                expression.source()
            )))
        }
        Ok(true) => Ok(()),
        Ok(false) => {
            *halt_validation = handler(message, None, expression.source());
            Err(FhirPathError::constraint_violation(format!(
                "fhirpath-constraint-violation-{}: \"{}\"",
                message.descriptor().name(),
                expression.source()
            )))
        }
    }
}

fn validate_field_constraint(
    parent: &Arc<Message>,
    field: &FieldRef,
    field_value: &Arc<Message>,
    expression: &CompiledExpression,
    handler: &mut dyn FnMut(&Message, Option<&FieldDescriptor>, &str) -> bool,
    halt_validation: &mut bool,
) -> Result<()> {
    let result = expression.evaluate(field_value)?;

    match result.as_boolean() {
        Err(_) => {
            *halt_validation = true;
            Err(FhirPathError::evaluation_error(format!(
                "Constraint did not evaluate to boolean: {}.{}: \"{}\"",
                field.containing().name(),
                field.field().json_name(),
                expression.source()
            )))
        }
        Ok(true) => Ok(()),
        Ok(false) => {
            *halt_validation = handler(parent, Some(field.field()), expression.source());
            Err(FhirPathError::constraint_violation(format!(
                "fhirpath-constraint-violation-{}.{}: \"{}\"",
                field.containing().name(),
                field.field().json_name(),
                expression.source()
            )))
        }
    }
}

/// Store the first detected failure in the accumulative status
fn update_status(accumulative_status: &mut Result<()>, current_status: Result<()>) {
    if accumulative_status.is_ok() && current_status.is_err() {
        *accumulative_status = current_status;
    }
}

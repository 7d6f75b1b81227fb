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

//! Per-evaluation scratch state and the public result type

use std::sync::Arc;

use crate::error::{FhirPathError, Result};
use crate::model::message::{Message, PrimitiveValue};

/// Ordered collection of messages produced by evaluating an expression node
pub(crate) type Collection = Vec<Arc<Message>>;

/// Per-evaluation scratch: the context stack. The bottom entry is the root
/// passed to `evaluate` (`%context`); the top is `$this`. Synthesized
/// messages are reference-counted, so results stay valid for as long as the
/// caller holds them.
pub(crate) struct WorkSpace {
    root: Arc<Message>,
    stack: Vec<Arc<Message>>,
}

impl WorkSpace {
    pub(crate) fn new(root: Arc<Message>) -> Self {
        Self {
            root,
            stack: Vec::new(),
        }
    }

    /// The current `$this` context
    pub(crate) fn current_context(&self) -> &Arc<Message> {
        self.stack.last().unwrap_or(&self.root)
    }

    /// The root `%context` message
    pub(crate) fn root_context(&self) -> &Arc<Message> {
        &self.root
    }

    pub(crate) fn push_context(&mut self, message: Arc<Message>) {
        self.stack.push(message);
    }

    pub(crate) fn pop_context(&mut self) {
        self.stack.pop();
    }
}

/// Boolean value of a collection that must be empty or a single Boolean
pub(crate) fn boolean_or_empty(messages: &[Arc<Message>]) -> Result<Option<bool>> {
    if messages.is_empty() {
        return Ok(None);
    }
    if messages.len() > 1 || !messages[0].is_primitive() {
        return Err(FhirPathError::evaluation_error(
            "Expression must be empty or represent a single primitive value.",
        ));
    }
    match messages[0].primitive_value() {
        Some(PrimitiveValue::Boolean(value)) => Ok(Some(*value)),
        _ => Err(FhirPathError::evaluation_error(
            "Single value expression of wrong type.",
        )),
    }
}

/// Integer value of a collection that must be empty or a single Integer
pub(crate) fn integer_or_empty(messages: &[Arc<Message>]) -> Result<Option<i32>> {
    if messages.is_empty() {
        return Ok(None);
    }
    if messages.len() > 1 || !messages[0].is_primitive() {
        return Err(FhirPathError::evaluation_error(
            "Expression must be empty or represent a single primitive value.",
        ));
    }
    match messages[0].primitive_value() {
        Some(PrimitiveValue::Integer(value)) => Ok(Some(*value)),
        _ => Err(FhirPathError::evaluation_error(
            "Single value expression of wrong type.",
        )),
    }
}

/// Result of evaluating a compiled expression: an ordered collection of
/// messages aliasing the input tree or evaluation-owned temporaries.
#[derive(Debug)]
pub struct EvaluationResult {
    messages: Vec<Arc<Message>>,
}

impl EvaluationResult {
    pub(crate) fn new(messages: Vec<Arc<Message>>) -> Self {
        Self { messages }
    }

    /// The result collection in evaluation order
    pub fn messages(&self) -> &[Arc<Message>] {
        &self.messages
    }

    /// The result as a single boolean
    pub fn as_boolean(&self) -> Result<bool> {
        if self.messages.len() == 1 {
            if let Some(value) = self.messages[0].as_boolean() {
                return Ok(value);
            }
        }
        Err(FhirPathError::evaluation_error(
            "Expression did not evaluate to boolean",
        ))
    }

    /// The result as a single integer
    pub fn as_integer(&self) -> Result<i32> {
        if self.messages.len() == 1 {
            if let Some(value) = self.messages[0].as_integer() {
                return Ok(value);
            }
        }
        Err(FhirPathError::evaluation_error(
            "Expression did not evaluate to integer",
        ))
    }

    /// The result as the textual form of a single decimal
    pub fn as_decimal_text(&self) -> Result<&str> {
        if self.messages.len() == 1 {
            if let Some(value) = self.messages[0].as_decimal_text() {
                return Ok(value);
            }
        }
        Err(FhirPathError::evaluation_error(
            "Expression did not evaluate to decimal",
        ))
    }

    /// The result as a single string
    pub fn as_string(&self) -> Result<&str> {
        if self.messages.len() == 1 {
            if let Some(PrimitiveValue::String(value)) = self.messages[0].primitive_value() {
                return Ok(value);
            }
        }
        Err(FhirPathError::evaluation_error(
            "Expression did not evaluate to string",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_stack() {
        let root = Message::boolean(true);
        let mut workspace = WorkSpace::new(root.clone());
        assert_eq!(workspace.current_context(), &root);

        let inner = Message::integer(1);
        workspace.push_context(inner.clone());
        assert_eq!(workspace.current_context(), &inner);
        assert_eq!(workspace.root_context(), &root);

        workspace.pop_context();
        assert_eq!(workspace.current_context(), &root);
    }

    #[test]
    fn test_boolean_or_empty() {
        assert_eq!(boolean_or_empty(&[]).unwrap(), None);
        assert_eq!(
            boolean_or_empty(&[Message::boolean(true)]).unwrap(),
            Some(true)
        );
        assert!(boolean_or_empty(&[Message::integer(1)]).is_err());
        assert!(boolean_or_empty(&[Message::boolean(true), Message::boolean(false)]).is_err());
    }

    #[test]
    fn test_result_accessors() {
        let result = EvaluationResult::new(vec![Message::string("abc")]);
        assert_eq!(result.as_string().unwrap(), "abc");
        assert!(result.as_boolean().is_err());

        let result = EvaluationResult::new(vec![Message::decimal("1.50")]);
        assert_eq!(result.as_decimal_text().unwrap(), "1.50");

        let empty = EvaluationResult::new(Vec::new());
        assert!(empty.as_boolean().is_err());
        assert!(empty.messages().is_empty());
    }
}

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

//! Canonical JSON wrapping of primitive messages
//!
//! Every primitive value has a canonical JSON token form: booleans and
//! numbers render bare, string-shaped values render quoted and escaped,
//! date-times render as quoted ISO-8601 at their precision. Value-equality
//! across differently-typed primitives compares these forms.

use std::sync::Arc;

use crate::error::{FhirPathError, Result};
use crate::model::descriptor::FhirVersion;
use crate::model::message::{Message, PrimitiveValue};

/// Schema-version-specific conversion of primitive messages to their
/// canonical JSON string form.
pub trait PrimitiveHandler: Send + Sync {
    /// The schema version this handler serves
    fn version(&self) -> FhirVersion;

    /// Canonical JSON token for a primitive message
    fn wrap_primitive(&self, message: &Message) -> Result<String>;
}

/// Primitive handler for R4 schemas
pub struct R4PrimitiveHandler;

impl R4PrimitiveHandler {
    /// Process-wide handler instance
    pub fn instance() -> &'static R4PrimitiveHandler {
        static INSTANCE: R4PrimitiveHandler = R4PrimitiveHandler;
        &INSTANCE
    }
}

impl PrimitiveHandler for R4PrimitiveHandler {
    fn version(&self) -> FhirVersion {
        FhirVersion::R4
    }

    fn wrap_primitive(&self, message: &Message) -> Result<String> {
        wrap_primitive_message(message)
    }
}

/// Primitive handler for STU3 schemas
pub struct Stu3PrimitiveHandler;

impl Stu3PrimitiveHandler {
    /// Process-wide handler instance
    pub fn instance() -> &'static Stu3PrimitiveHandler {
        static INSTANCE: Stu3PrimitiveHandler = Stu3PrimitiveHandler;
        &INSTANCE
    }
}

impl PrimitiveHandler for Stu3PrimitiveHandler {
    fn version(&self) -> FhirVersion {
        FhirVersion::Stu3
    }

    fn wrap_primitive(&self, message: &Message) -> Result<String> {
        wrap_primitive_message(message)
    }
}

/// Select the primitive handler for a message's schema version
pub fn primitive_handler_for(message: &Message) -> &'static dyn PrimitiveHandler {
    match message.descriptor().version() {
        FhirVersion::R4 => R4PrimitiveHandler::instance(),
        FhirVersion::Stu3 => Stu3PrimitiveHandler::instance(),
    }
}

fn wrap_primitive_message(message: &Message) -> Result<String> {
    let value = message.primitive_value().ok_or_else(|| {
        FhirPathError::type_error(format!(
            "Cannot wrap non-primitive message {}",
            message.descriptor().full_name()
        ))
    })?;

    match value {
        PrimitiveValue::Boolean(b) => Ok(b.to_string()),
        PrimitiveValue::Integer(i) => Ok(i.to_string()),
        PrimitiveValue::UnsignedInt(u) => Ok(u.to_string()),
        // The textual form is already a valid JSON number token.
        PrimitiveValue::Decimal(text) => Ok(text.clone()),
        PrimitiveValue::String(s) | PrimitiveValue::Code(s) | PrimitiveValue::Uri(s) => {
            serde_json::to_string(s).map_err(|e| FhirPathError::evaluation_error(e.to_string()))
        }
        PrimitiveValue::DateTime(dt) => Ok(format!("\"{}\"", dt.iso_string())),
    }
}

/// Canonical JSON token for a primitive message, dispatching by version
pub fn message_to_json_string(message: &Message) -> Result<String> {
    primitive_handler_for(message).wrap_primitive(message)
}

/// String value of a message whose JSON form is a string.
///
/// String messages return their raw value; other primitives are wrapped and
/// must render quoted, otherwise the expression is not string-valued.
pub fn message_to_string(message: &Message) -> Result<String> {
    if let Some(PrimitiveValue::String(s)) = message.primitive_value() {
        return Ok(s.clone());
    }

    if !message.descriptor().is_primitive() {
        return Err(FhirPathError::type_error("Expression must be a primitive."));
    }

    let json = message_to_json_string(message)?;
    if !json.starts_with('"') {
        return Err(FhirPathError::type_error(
            "Expression must evaluate to a string.",
        ));
    }

    // Trim the surrounding double quotation marks added by the JSON form.
    Ok(json[1..json.len() - 1].to_string())
}

/// String value of a collection that must hold exactly one string-shaped
/// message.
pub fn messages_to_string(messages: &[Arc<Message>]) -> Result<String> {
    if messages.len() != 1 {
        return Err(FhirPathError::type_error(
            "Expression must represent a single value.",
        ));
    }

    message_to_string(&messages[0])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::message::DateTimeValue;

    #[test]
    fn test_wrap_scalars() {
        assert_eq!(message_to_json_string(&Message::boolean(true)).unwrap(), "true");
        assert_eq!(message_to_json_string(&Message::integer(42)).unwrap(), "42");
        assert_eq!(message_to_json_string(&Message::decimal("1.00")).unwrap(), "1.00");
    }

    #[test]
    fn test_wrap_string_escapes() {
        let message = Message::string("a\"b\\c");
        assert_eq!(message_to_json_string(&message).unwrap(), "\"a\\\"b\\\\c\"");
    }

    #[test]
    fn test_wrap_date_time() {
        let value = DateTimeValue::parse("2020-06-01").unwrap();
        let message = Message::date_time(value);
        assert_eq!(message_to_json_string(&message).unwrap(), "\"2020-06-01\"");
    }

    #[test]
    fn test_message_to_string_requires_string_form() {
        assert_eq!(message_to_string(&Message::string("abc")).unwrap(), "abc");

        // Booleans render bare in JSON, so they are not string-valued.
        assert!(message_to_string(&Message::boolean(true)).is_err());
    }

    #[test]
    fn test_messages_to_string_arity() {
        let single = vec![Message::string("x")];
        assert_eq!(messages_to_string(&single).unwrap(), "x");

        let two = vec![Message::string("x"), Message::string("y")];
        assert!(messages_to_string(&two).is_err());
        assert!(messages_to_string(&[]).is_err());
    }
}

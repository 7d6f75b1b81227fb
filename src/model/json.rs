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

//! Building message trees from JSON values against a schema

use std::sync::Arc;

use rust_decimal::Decimal;
use serde_json::Value;

use crate::error::{FhirPathError, Result};
use crate::model::descriptor::{Descriptor, PrimitiveKind};
use crate::model::message::{DateTimeValue, Message, PrimitiveValue};

/// Build a message tree from a JSON value against the given descriptor.
///
/// Objects map to composites by JSON field name, arrays to repeated fields,
/// scalars to primitive values. Date-time strings are parsed with precision
/// detection; decimals accept either a JSON number or a string preserving
/// the textual form.
pub fn message_from_json(descriptor: &Arc<Descriptor>, value: &Value) -> Result<Arc<Message>> {
    if let Some(kind) = descriptor.primitive_kind() {
        return Ok(Message::primitive(
            descriptor,
            primitive_from_json(descriptor, kind, value)?,
        ));
    }

    let object = value.as_object().ok_or_else(|| {
        FhirPathError::evaluation_error(format!(
            "Expected a JSON object for {}",
            descriptor.full_name()
        ))
    })?;

    let mut fields: Vec<Vec<Arc<Message>>> = vec![Vec::new(); descriptor.fields().len()];

    for (key, field_value) in object {
        let index = descriptor.field_index_by_json_name(key).ok_or_else(|| {
            FhirPathError::evaluation_error(format!(
                "Unknown field '{}' on {}",
                key,
                descriptor.full_name()
            ))
        })?;
        let field = descriptor.field(index);
        let field_type = field.message_type().ok_or_else(|| {
            FhirPathError::evaluation_error(format!(
                "Field '{}' on {} has no message type",
                key,
                descriptor.full_name()
            ))
        })?;

        if field.is_repeated() {
            let items = field_value.as_array().ok_or_else(|| {
                FhirPathError::evaluation_error(format!(
                    "Field '{}' on {} is repeated and requires a JSON array",
                    key,
                    descriptor.full_name()
                ))
            })?;
            for item in items {
                fields[index].push(message_from_json(&field_type, item)?);
            }
        } else {
            fields[index].push(message_from_json(&field_type, field_value)?);
        }
    }

    Ok(Message::composite(descriptor, fields))
}

fn primitive_from_json(
    descriptor: &Arc<Descriptor>,
    kind: PrimitiveKind,
    value: &Value,
) -> Result<PrimitiveValue> {
    let mismatch = || {
        FhirPathError::evaluation_error(format!(
            "JSON value {} does not fit {}",
            value,
            descriptor.full_name()
        ))
    };

    match kind {
        PrimitiveKind::Boolean => value.as_bool().map(PrimitiveValue::Boolean).ok_or_else(mismatch),
        PrimitiveKind::Integer => value
            .as_i64()
            .and_then(|i| i32::try_from(i).ok())
            .map(PrimitiveValue::Integer)
            .ok_or_else(mismatch),
        PrimitiveKind::UnsignedInt => value
            .as_u64()
            .and_then(|u| u32::try_from(u).ok())
            .map(PrimitiveValue::UnsignedInt)
            .ok_or_else(mismatch),
        PrimitiveKind::Decimal => {
            let text = match value {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                _ => return Err(mismatch()),
            };
            text.parse::<Decimal>().map_err(|_| mismatch())?;
            Ok(PrimitiveValue::Decimal(text))
        }
        PrimitiveKind::String => value
            .as_str()
            .map(|s| PrimitiveValue::String(s.to_string()))
            .ok_or_else(mismatch),
        PrimitiveKind::Code => value
            .as_str()
            .map(|s| PrimitiveValue::Code(s.to_string()))
            .ok_or_else(mismatch),
        PrimitiveKind::Uri => value
            .as_str()
            .map(|s| PrimitiveValue::Uri(s.to_string()))
            .ok_or_else(mismatch),
        PrimitiveKind::DateTime => {
            let text = value.as_str().ok_or_else(mismatch)?;
            Ok(PrimitiveValue::DateTime(DateTimeValue::parse(text)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::core;
    use crate::model::descriptor::{Cardinality, FhirVersion, StructureKind};
    use serde_json::json;

    fn name_type() -> Arc<Descriptor> {
        Descriptor::builder("test.HumanName", StructureKind::ComplexType, FhirVersion::R4)
            .field("family", "family", Cardinality::Single, &core::string())
            .field("given", "given", Cardinality::Repeated, &core::string())
            .build()
    }

    #[test]
    fn test_composite_from_json() {
        let descriptor = name_type();
        let message = message_from_json(
            &descriptor,
            &json!({"family": "Smith", "given": ["John", "Q"]}),
        )
        .unwrap();

        let family = message.field_values_by_json_name("family");
        assert_eq!(family.len(), 1);
        assert_eq!(family[0].as_str(), Some("Smith"));

        let given = message.field_values_by_json_name("given");
        assert_eq!(given.len(), 2);
        assert_eq!(given[1].as_str(), Some("Q"));
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        let descriptor = name_type();
        let result = message_from_json(&descriptor, &json!({"nickname": "J"}));
        assert!(result.is_err());
    }

    #[test]
    fn test_repeated_requires_array() {
        let descriptor = name_type();
        let result = message_from_json(&descriptor, &json!({"given": "John"}));
        assert!(result.is_err());
    }

    #[test]
    fn test_decimal_text_is_preserved() {
        let message = message_from_json(&core::decimal(), &json!("1.00")).unwrap();
        assert_eq!(message.as_decimal_text(), Some("1.00"));

        assert!(message_from_json(&core::decimal(), &json!("not-a-number")).is_err());
    }

    #[test]
    fn test_date_time_from_json() {
        let message = message_from_json(&core::date_time(), &json!("2020-06-01")).unwrap();
        let value = message.as_date_time().unwrap();
        assert_eq!(value.iso_string(), "2020-06-01");
    }
}

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

//! Binary and unary operator evaluation
//!
//! `=`, `<`..`>=`, `+` and the membership operators propagate empty
//! operands as empty results; `&` treats empty operands as empty strings.
//! The boolean operators follow the three-valued truth tables, with `and`
//! short-circuiting on false and `or` on true.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;

use crate::error::{FhirPathError, Result};
use crate::evaluator::datetime::compare_date_times;
use crate::evaluator::equality::{value_key, values_equal};
use crate::evaluator::expression::{CompareOp, Expr, LogicOp};
use crate::evaluator::workspace::{boolean_or_empty, integer_or_empty, Collection, WorkSpace};
use crate::model::message::{Message, PrimitiveValue};
use crate::model::primitive::message_to_string;

pub(crate) fn eval_indexer(
    work_space: &mut WorkSpace,
    left: &Arc<Expr>,
    right: &Arc<Expr>,
) -> Result<Collection> {
    let left_results = left.evaluate(work_space)?;
    let right_results = right.evaluate(work_space)?;

    let index = integer_or_empty(&right_results)?
        .ok_or_else(|| FhirPathError::evaluation_error("Index must be present."))?;
    if index < 0 {
        return Err(FhirPathError::type_error(
            "Indexer requires a non-negative integer index.",
        ));
    }

    match left_results.get(index as usize) {
        Some(message) => Ok(vec![message.clone()]),
        None => Ok(Vec::new()),
    }
}

pub(crate) fn eval_union(
    work_space: &mut WorkSpace,
    left: &Arc<Expr>,
    right: &Arc<Expr>,
) -> Result<Collection> {
    let left_results = left.evaluate(work_space)?;
    let right_results = right.evaluate(work_space)?;

    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for message in left_results.iter().chain(right_results.iter()) {
        if seen.insert(value_key(message)?) {
            out.push(message.clone());
        }
    }
    Ok(out)
}

pub(crate) fn eval_equals(
    work_space: &mut WorkSpace,
    left: &Arc<Expr>,
    right: &Arc<Expr>,
) -> Result<Collection> {
    let left_results = left.evaluate(work_space)?;
    let right_results = right.evaluate(work_space)?;

    if left_results.is_empty() || right_results.is_empty() {
        return Ok(Vec::new());
    }

    let equal = left_results.len() == right_results.len()
        && left_results
            .iter()
            .zip(right_results.iter())
            .all(|(l, r)| values_equal(l, r));
    Ok(vec![Message::boolean(equal)])
}

pub(crate) fn eval_comparison(
    work_space: &mut WorkSpace,
    op: CompareOp,
    left: &Arc<Expr>,
    right: &Arc<Expr>,
) -> Result<Collection> {
    let left_results = left.evaluate(work_space)?;
    let right_results = right.evaluate(work_space)?;

    if left_results.is_empty() || right_results.is_empty() {
        return Ok(Vec::new());
    }
    if left_results.len() > 1 || right_results.len() > 1 {
        return Err(FhirPathError::type_error(
            "Comparison operators must have one element on each side.",
        ));
    }

    let left_value = &left_results[0];
    let right_value = &right_results[0];

    if let (Some(left_quantity), Some(right_quantity)) =
        (as_quantity(left_value), as_quantity(right_value))
    {
        let result = eval_quantity_comparison(op, &left_quantity, &right_quantity)?;
        return Ok(vec![Message::boolean(result)]);
    }

    let result = match (left_value.primitive_value(), right_value.primitive_value()) {
        (Some(l), Some(r)) if int_value(l).is_some() && int_value(r).is_some() => {
            // UnsignedInt is restricted to 31 bits, so widening to i64 is
            // lossless for every mix.
            let ordering = int_value(l).cmp(&int_value(r));
            apply_ordering(op, ordering)
        }
        (Some(PrimitiveValue::Decimal(_)), Some(_)) | (Some(_), Some(PrimitiveValue::Decimal(_))) => {
            eval_decimal_comparison(op, left_value, right_value)?
        }
        (Some(PrimitiveValue::String(l)), Some(PrimitiveValue::String(r))) => {
            apply_ordering(op, l.as_str().cmp(r.as_str()))
        }
        (Some(PrimitiveValue::DateTime(l)), Some(PrimitiveValue::DateTime(r))) => {
            match compare_date_times(l, r) {
                // Equal at a shared coarser precision: order undecidable.
                None => return Ok(Vec::new()),
                Some(ordering) => apply_ordering(op, ordering),
            }
        }
        _ => {
            return Err(FhirPathError::type_error(format!(
                "Unsupported comparison value types: {} and {}",
                left_value.descriptor().full_name(),
                right_value.descriptor().full_name()
            )));
        }
    };

    Ok(vec![Message::boolean(result)])
}

fn int_value(value: &PrimitiveValue) -> Option<i64> {
    match value {
        PrimitiveValue::Integer(i) => Some(i64::from(*i)),
        PrimitiveValue::UnsignedInt(u) => Some(i64::from(*u)),
        _ => None,
    }
}

fn apply_ordering(op: CompareOp, ordering: Ordering) -> bool {
    match op {
        CompareOp::LessThan => ordering == Ordering::Less,
        CompareOp::GreaterThan => ordering == Ordering::Greater,
        CompareOp::LessThanOrEqual => ordering != Ordering::Greater,
        CompareOp::GreaterThanOrEqual => ordering != Ordering::Less,
    }
}

fn message_to_double(message: &Message) -> Result<f64> {
    match message.primitive_value() {
        Some(PrimitiveValue::Decimal(text)) => text.parse::<f64>().map_err(|_| {
            FhirPathError::evaluation_error(format!("Could not convert to numeric: {text}"))
        }),
        Some(PrimitiveValue::Integer(i)) => Ok(f64::from(*i)),
        Some(PrimitiveValue::UnsignedInt(u)) => Ok(f64::from(*u)),
        _ => Err(FhirPathError::type_error(format!(
            "Message type cannot be converted to double: {}",
            message.descriptor().full_name()
        ))),
    }
}

fn eval_decimal_comparison(
    op: CompareOp,
    left: &Arc<Message>,
    right: &Arc<Message>,
) -> Result<bool> {
    let left_value = message_to_double(left)?;
    let right_value = message_to_double(right)?;

    // On the equality edge, fall back to literal comparison to avoid
    // rounding errors in the double conversion.
    let result = match op {
        CompareOp::LessThan => left_value < right_value,
        CompareOp::GreaterThan => left_value > right_value,
        CompareOp::LessThanOrEqual => left_value <= right_value || left == right,
        CompareOp::GreaterThanOrEqual => left_value >= right_value || left == right,
    };
    Ok(result)
}

struct QuantityParts<'a> {
    value: Option<&'a Arc<Message>>,
    unit: String,
    system: String,
    code: String,
}

fn as_quantity(message: &Arc<Message>) -> Option<QuantityParts<'_>> {
    let descriptor = message.descriptor();
    if descriptor.is_primitive() || !matches!(descriptor.name(), "Quantity" | "SimpleQuantity") {
        return None;
    }

    let single = |name: &str| message.field_values_by_json_name(name).first();
    let string_of = |name: &str| {
        single(name)
            .and_then(|m| m.as_str())
            .unwrap_or_default()
            .to_string()
    };

    Some(QuantityParts {
        value: single("value"),
        unit: string_of("unit"),
        system: string_of("system"),
        code: string_of("code"),
    })
}

fn eval_quantity_comparison(
    op: CompareOp,
    left: &QuantityParts<'_>,
    right: &QuantityParts<'_>,
) -> Result<bool> {
    // Units are respected but never converted; differing units fail.
    if left.code != right.code || left.system != right.system {
        return Err(FhirPathError::type_error(format!(
            "Compared quantities must have the same units. Got {} and {}",
            left.unit, right.unit
        )));
    }

    let left_value = left
        .value
        .ok_or_else(|| FhirPathError::evaluation_error("Quantity has no value"))?;
    let right_value = right
        .value
        .ok_or_else(|| FhirPathError::evaluation_error("Quantity has no value"))?;

    eval_decimal_comparison(op, left_value, right_value)
}

pub(crate) fn eval_addition(
    work_space: &mut WorkSpace,
    left: &Arc<Expr>,
    right: &Arc<Expr>,
) -> Result<Collection> {
    let left_results = left.evaluate(work_space)?;
    let right_results = right.evaluate(work_space)?;

    if left_results.is_empty() || right_results.is_empty() {
        return Ok(Vec::new());
    }
    if left_results.len() > 1 || right_results.len() > 1 {
        return Err(FhirPathError::type_error(
            "Addition operators must have one element on each side.",
        ));
    }

    let left_value = &left_results[0];
    let right_value = &right_results[0];

    match (left_value.primitive_value(), right_value.primitive_value()) {
        (Some(PrimitiveValue::Integer(l)), Some(PrimitiveValue::Integer(r))) => {
            let sum = l
                .checked_add(*r)
                .ok_or_else(|| FhirPathError::arithmetic_overflow("integer addition"))?;
            Ok(vec![Message::integer(sum)])
        }
        (Some(PrimitiveValue::String(l)), Some(PrimitiveValue::String(r))) => {
            Ok(vec![Message::string(format!("{l}{r}"))])
        }
        _ => Err(FhirPathError::type_error(format!(
            "Addition not supported for {} and {}",
            left_value.descriptor().full_name(),
            right_value.descriptor().full_name()
        ))),
    }
}

pub(crate) fn eval_concatenation(
    work_space: &mut WorkSpace,
    left: &Arc<Expr>,
    right: &Arc<Expr>,
) -> Result<Collection> {
    let left_results = left.evaluate(work_space)?;
    let right_results = right.evaluate(work_space)?;

    if left_results.len() > 1 || right_results.len() > 1 {
        return Err(FhirPathError::type_error(
            "String concatenation operators must have one element on each side.",
        ));
    }

    // Unlike `+`, empty operands concatenate as empty strings.
    let left_text = match left_results.first() {
        Some(message) => message_to_string(message)?,
        None => String::new(),
    };
    let right_text = match right_results.first() {
        Some(message) => message_to_string(message)?,
        None => String::new(),
    };

    Ok(vec![Message::string(format!("{left_text}{right_text}"))])
}

pub(crate) fn eval_polarity(
    work_space: &mut WorkSpace,
    negate: bool,
    operand: &Arc<Expr>,
) -> Result<Collection> {
    let results = operand.evaluate(work_space)?;

    if results.len() > 1 {
        return Err(FhirPathError::type_error(
            "Polarity operators must operate on a single element.",
        ));
    }
    let Some(value) = results.first() else {
        return Ok(Vec::new());
    };

    if !negate {
        return Ok(vec![value.clone()]);
    }

    match value.primitive_value() {
        Some(PrimitiveValue::Integer(i)) => {
            let negated = i
                .checked_neg()
                .ok_or_else(|| FhirPathError::arithmetic_overflow("integer negation"))?;
            Ok(vec![Message::integer(negated)])
        }
        // Decimals negate textually to preserve the source precision.
        Some(PrimitiveValue::Decimal(text)) => {
            let negated = match text.strip_prefix('-') {
                Some(positive) => positive.to_string(),
                None => format!("-{text}"),
            };
            Ok(vec![Message::decimal(negated)])
        }
        _ => Err(FhirPathError::type_error(
            "Polarity operators must operate on a decimal or integer type.",
        )),
    }
}

fn eval_boolean_operand(work_space: &mut WorkSpace, expr: &Arc<Expr>) -> Result<Option<bool>> {
    let results = expr.evaluate(work_space)?;
    boolean_or_empty(&results)
}

pub(crate) fn eval_logic(
    work_space: &mut WorkSpace,
    op: LogicOp,
    left: &Arc<Expr>,
    right: &Arc<Expr>,
) -> Result<Collection> {
    let single = |value: bool| vec![Message::boolean(value)];

    match op {
        LogicOp::And => {
            let left_value = eval_boolean_operand(work_space, left)?;
            if left_value == Some(false) {
                return Ok(single(false));
            }
            let right_value = eval_boolean_operand(work_space, right)?;
            if right_value == Some(false) {
                return Ok(single(false));
            }
            if left_value.is_some() && right_value.is_some() {
                return Ok(single(true));
            }
            Ok(Vec::new())
        }
        LogicOp::Or => {
            let left_value = eval_boolean_operand(work_space, left)?;
            if left_value == Some(true) {
                return Ok(single(true));
            }
            let right_value = eval_boolean_operand(work_space, right)?;
            if right_value == Some(true) {
                return Ok(single(true));
            }
            if left_value.is_some() && right_value.is_some() {
                return Ok(single(false));
            }
            Ok(Vec::new())
        }
        LogicOp::Xor => {
            let Some(left_value) = eval_boolean_operand(work_space, left)? else {
                return Ok(Vec::new());
            };
            let Some(right_value) = eval_boolean_operand(work_space, right)? else {
                return Ok(Vec::new());
            };
            Ok(single(left_value != right_value))
        }
        LogicOp::Implies => {
            let left_value = eval_boolean_operand(work_space, left)?;
            // A false antecedent makes the implication true regardless of
            // the consequent.
            if left_value == Some(false) {
                return Ok(single(true));
            }
            let right_value = eval_boolean_operand(work_space, right)?;
            match left_value {
                None => {
                    if right_value == Some(true) {
                        Ok(single(true))
                    } else {
                        Ok(Vec::new())
                    }
                }
                Some(_) => match right_value {
                    Some(value) => Ok(single(value)),
                    None => Ok(Vec::new()),
                },
            }
        }
    }
}

pub(crate) fn eval_membership(
    work_space: &mut WorkSpace,
    collection: &Arc<Expr>,
    element: &Arc<Expr>,
) -> Result<Collection> {
    let collection_results = collection.evaluate(work_space)?;
    let element_results = element.evaluate(work_space)?;

    if element_results.is_empty() {
        return Ok(Vec::new());
    }
    if element_results.len() > 1 {
        return Err(FhirPathError::type_error(
            "in/contains must have one or fewer items in the left/right operand.",
        ));
    }

    let element_value = &element_results[0];
    let found = collection_results
        .iter()
        .any(|message| values_equal(element_value, message));
    Ok(vec![Message::boolean(found)])
}

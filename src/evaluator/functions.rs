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

//! Function evaluation
//!
//! `where`, `all`, `select` and `iif`'s criterion evaluate their parameter
//! element-at-a-time with the element pushed onto the context stack; every
//! other parameter evaluates in the enclosing context.

use std::collections::HashSet;
use std::sync::Arc;

use regex::Regex;

use crate::error::{FhirPathError, Result};
use crate::evaluator::equality::{deduplicate, value_key};
use crate::evaluator::expression::{Expr, FunctionExpr, FunctionKind};
use crate::evaluator::workspace::{boolean_or_empty, Collection, WorkSpace};
use crate::model::message::{Message, PrimitiveValue};
use crate::model::primitive::{message_to_json_string, message_to_string, messages_to_string};

pub(crate) fn eval_function(
    work_space: &mut WorkSpace,
    function: &FunctionExpr,
) -> Result<Collection> {
    let child_results = function.child.evaluate(work_space)?;

    match function.kind {
        FunctionKind::Exists => Ok(vec![Message::boolean(!child_results.is_empty())]),
        FunctionKind::Empty => Ok(vec![Message::boolean(child_results.is_empty())]),
        FunctionKind::Count => Ok(vec![Message::integer(child_results.len() as i32)]),
        FunctionKind::First => Ok(child_results.into_iter().take(1).collect()),
        FunctionKind::Tail => Ok(child_results.into_iter().skip(1).collect()),
        FunctionKind::Not => eval_not(&child_results),
        FunctionKind::HasValue => {
            let single_primitive = child_results.len() == 1 && child_results[0].is_primitive();
            Ok(vec![Message::boolean(single_primitive)])
        }
        FunctionKind::Distinct => deduplicate(&child_results),
        FunctionKind::IsDistinct => {
            let unique = deduplicate(&child_results)?;
            Ok(vec![Message::boolean(unique.len() == child_results.len())])
        }
        FunctionKind::ToInteger => eval_to_integer(&child_results),
        FunctionKind::ToString => eval_to_string(&child_results),
        FunctionKind::Length => eval_length(&child_results),
        FunctionKind::Children => eval_children(&child_results),
        FunctionKind::StartsWith => eval_starts_with(work_space, function, &child_results),
        FunctionKind::ContainsString => eval_contains_string(work_space, function, &child_results),
        FunctionKind::Matches => eval_matches(work_space, function, &child_results),
        FunctionKind::Trace => eval_trace(work_space, function, child_results),
        FunctionKind::Combine => {
            let mut out = child_results;
            out.extend(function.params[0].evaluate(work_space)?);
            Ok(out)
        }
        FunctionKind::Intersect => eval_intersect(work_space, function, &child_results),
        FunctionKind::Where => eval_where(work_space, function, &child_results),
        FunctionKind::All => eval_all(work_space, function, &child_results),
        FunctionKind::Select => eval_select(work_space, function, &child_results),
        FunctionKind::Iif => eval_iif(work_space, function, &child_results),
    }
}

fn eval_not(child_results: &[Arc<Message>]) -> Result<Collection> {
    // Boolean operations on the empty collection propagate empty, and a
    // non-boolean input produces no value rather than an error.
    if child_results.is_empty() {
        return Ok(Vec::new());
    }
    if child_results.len() == 1 {
        if let Some(value) = child_results[0].as_boolean() {
            return Ok(vec![Message::boolean(!value)]);
        }
    }
    Ok(Vec::new())
}

fn eval_to_integer(child_results: &[Arc<Message>]) -> Result<Collection> {
    if child_results.len() > 1 {
        return Err(FhirPathError::type_error(
            "toInteger() requires a collection with no more than 1 item.",
        ));
    }
    let Some(child) = child_results.first() else {
        return Ok(Vec::new());
    };
    if !child.descriptor().is_primitive() {
        return Ok(Vec::new());
    }

    match child.primitive_value() {
        Some(PrimitiveValue::Integer(_)) => Ok(vec![child.clone()]),
        Some(PrimitiveValue::Boolean(value)) => Ok(vec![Message::integer(i32::from(*value))]),
        _ => {
            if let Ok(text) = messages_to_string(child_results) {
                if let Ok(value) = text.parse::<i32>() {
                    return Ok(vec![Message::integer(value)]);
                }
            }
            Ok(Vec::new())
        }
    }
}

fn eval_to_string(child_results: &[Arc<Message>]) -> Result<Collection> {
    if child_results.len() > 1 {
        return Err(FhirPathError::type_error(
            "Input collection must not contain multiple items",
        ));
    }
    let Some(child) = child_results.first() else {
        return Ok(Vec::new());
    };

    if matches!(child.primitive_value(), Some(PrimitiveValue::String(_))) {
        return Ok(vec![child.clone()]);
    }
    if !child.descriptor().is_primitive() {
        return Ok(Vec::new());
    }

    let json = message_to_json_string(child)?;
    let text = if json.starts_with('"') {
        json[1..json.len() - 1].to_string()
    } else {
        json
    };
    Ok(vec![Message::string(text)])
}

fn eval_length(child_results: &[Arc<Message>]) -> Result<Collection> {
    if child_results.is_empty() {
        return Ok(Vec::new());
    }
    let text = messages_to_string(child_results)?;
    Ok(vec![Message::integer(text.chars().count() as i32)])
}

fn eval_children(child_results: &[Arc<Message>]) -> Result<Collection> {
    let mut out = Vec::new();
    for child in child_results {
        for index in 0..child.descriptor().fields().len() {
            out.extend(child.field_values(index).iter().cloned());
        }
    }
    Ok(out)
}

/// Evaluate a parameter that must yield exactly one value
fn single_value_param(
    work_space: &mut WorkSpace,
    function: &FunctionExpr,
) -> Result<Arc<Message>> {
    let mut results = function.params[0].evaluate(work_space)?;
    if results.len() != 1 {
        return Err(FhirPathError::type_error(
            "this function requires a single value parameter.",
        ));
    }
    Ok(results.swap_remove(0))
}

fn eval_starts_with(
    work_space: &mut WorkSpace,
    function: &FunctionExpr,
    child_results: &[Arc<Message>],
) -> Result<Collection> {
    let param = single_value_param(work_space, function)?;
    if child_results.len() != 1 {
        return Err(FhirPathError::type_error(
            "startsWith must be invoked on a string with a single string argument",
        ));
    }
    let item = messages_to_string(child_results)?;
    let prefix = message_to_string(&param)?;
    Ok(vec![Message::boolean(item.starts_with(&prefix))])
}

fn eval_contains_string(
    work_space: &mut WorkSpace,
    function: &FunctionExpr,
    child_results: &[Arc<Message>],
) -> Result<Collection> {
    let param = single_value_param(work_space, function)?;
    if child_results.is_empty() {
        return Ok(Vec::new());
    }
    if child_results.len() > 1 {
        return Err(FhirPathError::type_error(
            "contains() must be invoked on a single string.",
        ));
    }
    let haystack = messages_to_string(child_results)?;
    let needle = message_to_string(&param)?;
    Ok(vec![Message::boolean(haystack.contains(&needle))])
}

fn eval_matches(
    work_space: &mut WorkSpace,
    function: &FunctionExpr,
    child_results: &[Arc<Message>],
) -> Result<Collection> {
    let param = single_value_param(work_space, function)?;
    if child_results.is_empty() {
        return Ok(Vec::new());
    }
    let item = messages_to_string(child_results)?;
    let pattern = message_to_string(&param)?;

    // The whole input must match, so the pattern is anchored.
    let regex = Regex::new(&format!("^(?:{pattern})$"))
        .map_err(|e| FhirPathError::invalid_regex(&pattern, e.to_string()))?;
    Ok(vec![Message::boolean(regex.is_match(&item))])
}

fn eval_trace(
    work_space: &mut WorkSpace,
    function: &FunctionExpr,
    child_results: Collection,
) -> Result<Collection> {
    let param = single_value_param(work_space, function)?;
    let name = message_to_string(&param)?;

    tracing::info!("trace({name}):");
    for message in &child_results {
        tracing::info!("{message:?}");
    }
    Ok(child_results)
}

fn eval_intersect(
    work_space: &mut WorkSpace,
    function: &FunctionExpr,
    child_results: &[Arc<Message>],
) -> Result<Collection> {
    let param_results = function.params[0].evaluate(work_space)?;

    let mut child_set = HashSet::new();
    for message in child_results {
        child_set.insert(value_key(message)?);
    }

    let mut out = Vec::new();
    for message in &param_results {
        // Removing the key both deduplicates and marks the hit.
        if child_set.remove(&value_key(message)?) {
            out.push(message.clone());
        }
    }
    Ok(out)
}

fn eval_where(
    work_space: &mut WorkSpace,
    function: &FunctionExpr,
    child_results: &[Arc<Message>],
) -> Result<Collection> {
    let mut out = Vec::new();
    for message in child_results {
        if eval_predicate(work_space, &function.params[0], message)? {
            out.push(message.clone());
        }
    }
    Ok(out)
}

fn eval_all(
    work_space: &mut WorkSpace,
    function: &FunctionExpr,
    child_results: &[Arc<Message>],
) -> Result<Collection> {
    for message in child_results {
        if !eval_predicate(work_space, &function.params[0], message)? {
            return Ok(vec![Message::boolean(false)]);
        }
    }
    // Vacuously true on the empty collection.
    Ok(vec![Message::boolean(true)])
}

fn eval_predicate(
    work_space: &mut WorkSpace,
    predicate: &Arc<Expr>,
    message: &Arc<Message>,
) -> Result<bool> {
    work_space.push_context(message.clone());
    let results = predicate.evaluate(work_space);
    work_space.pop_context();
    Ok(boolean_or_empty(&results?)?.unwrap_or(false))
}

fn eval_select(
    work_space: &mut WorkSpace,
    function: &FunctionExpr,
    child_results: &[Arc<Message>],
) -> Result<Collection> {
    let mut out = Vec::new();
    for message in child_results {
        work_space.push_context(message.clone());
        let results = function.params[0].evaluate(work_space);
        work_space.pop_context();
        out.extend(results?);
    }
    Ok(out)
}

fn eval_iif(
    work_space: &mut WorkSpace,
    function: &FunctionExpr,
    child_results: &[Arc<Message>],
) -> Result<Collection> {
    if child_results.len() > 1 {
        return Err(FhirPathError::type_error(
            "iif() requires a collection with no more than 1 item.",
        ));
    }
    let Some(child) = child_results.first() else {
        return Ok(Vec::new());
    };

    // The criterion sees the single child as $this; the chosen branch
    // evaluates in the enclosing context.
    let criterion_met = eval_predicate(work_space, &function.params[0], child)?;
    if criterion_met {
        function.params[1].evaluate(work_space)
    } else if function.params.len() > 2 {
        function.params[2].evaluate(work_space)
    } else {
        Ok(Vec::new())
    }
}

pub(crate) fn eval_is(
    work_space: &mut WorkSpace,
    child: &Arc<Expr>,
    type_name: &str,
) -> Result<Collection> {
    let child_results = child.evaluate(work_space)?;
    if child_results.len() > 1 {
        return Err(FhirPathError::type_error(
            "is() requires a collection with no more than 1 item.",
        ));
    }
    let Some(message) = child_results.first() else {
        return Ok(Vec::new());
    };
    let matches = message.descriptor().name().eq_ignore_ascii_case(type_name);
    Ok(vec![Message::boolean(matches)])
}

pub(crate) fn eval_as(
    work_space: &mut WorkSpace,
    child: &Arc<Expr>,
    type_name: &str,
) -> Result<Collection> {
    let child_results = child.evaluate(work_space)?;
    if child_results.len() > 1 {
        return Err(FhirPathError::type_error(
            "as() requires a collection with no more than 1 item.",
        ));
    }
    match child_results.first() {
        Some(message) if message.descriptor().name().eq_ignore_ascii_case(type_name) => {
            Ok(vec![message.clone()])
        }
        _ => Ok(Vec::new()),
    }
}

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

//! Value-equality and canonical keys for set semantics
//!
//! Two messages of the same type compare by deep structure. Two primitives
//! of different types compare by their canonical JSON forms with the
//! surrounding quotes trimmed, so a code equals a string literal with the
//! same text. Anything else is unequal without being an error.

use std::collections::HashSet;
use std::fmt::Write;
use std::sync::Arc;

use crate::error::Result;
use crate::model::message::Message;
use crate::model::primitive::message_to_json_string;

/// Value-equality relation used by `=`, `in`, `contains` and the set
/// operations.
pub(crate) fn values_equal(left: &Message, right: &Message) -> bool {
    if left.descriptor().full_name() == right.descriptor().full_name() {
        return left == right;
    }

    if left.descriptor().is_primitive() && right.descriptor().is_primitive() {
        // A primitive (like an enum code) may be compared to a literal
        // string; both sides go through their canonical JSON form.
        return match (message_to_json_string(left), message_to_json_string(right)) {
            (Ok(left_json), Ok(right_json)) => trim_quotes(&left_json) == trim_quotes(&right_json),
            _ => false,
        };
    }

    false
}

/// Strip one layer of surrounding double quotes, if present
pub(crate) fn trim_quotes(json: &str) -> &str {
    if json.len() >= 2 && json.starts_with('"') && json.ends_with('"') {
        &json[1..json.len() - 1]
    } else {
        json
    }
}

/// Canonical key inducing the value-equality relation: primitives key on
/// their trimmed JSON form, composites on their type name plus recursive
/// field keys. The discriminating prefixes keep the two spaces apart.
pub(crate) fn value_key(message: &Message) -> Result<String> {
    let mut key = String::new();
    write_value_key(message, &mut key)?;
    Ok(key)
}

fn write_value_key(message: &Message, out: &mut String) -> Result<()> {
    if message.descriptor().is_primitive() {
        let json = message_to_json_string(message)?;
        out.push_str("p:");
        out.push_str(trim_quotes(&json));
        return Ok(());
    }

    let _ = write!(out, "m:{}{{", message.descriptor().full_name());
    for index in 0..message.descriptor().fields().len() {
        out.push('[');
        for value in message.field_values(index) {
            write_value_key(value, out)?;
            out.push(',');
        }
        out.push(']');
    }
    out.push('}');
    Ok(())
}

/// Deduplicate a collection by value-equality, keeping first occurrences in
/// order.
pub(crate) fn deduplicate(messages: &[Arc<Message>]) -> Result<Vec<Arc<Message>>> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for message in messages {
        if seen.insert(value_key(message)?) {
            out.push(message.clone());
        }
    }
    Ok(out)
}

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

//! Constraint validation over schema-attached expressions

use std::sync::Arc;

use serde_json::{json, Value};

use fhirpath_engine::model::core;
use fhirpath_engine::{
    message_from_json, Cardinality, Descriptor, FhirPathError, FhirVersion, Message,
    MessageValidator, StructureKind,
};

fn period_type() -> Arc<Descriptor> {
    Descriptor::builder("t.Period", StructureKind::ComplexType, FhirVersion::R4)
        .field("start", "start", Cardinality::Single, &core::date_time())
        .field("end", "end", Cardinality::Single, &core::date_time())
        .constraint("start.exists() and end.exists() implies start <= end")
        .build()
}

fn encounter_type(period: &Arc<Descriptor>) -> Arc<Descriptor> {
    Descriptor::builder("t.Encounter", StructureKind::Resource, FhirVersion::R4)
        .field("status", "status", Cardinality::Single, &core::code())
        .field("period", "period", Cardinality::Single, period)
        .field_constraint("start.exists()")
        .build()
}

fn encounter(value: Value) -> Arc<Message> {
    let descriptor = encounter_type(&period_type());
    message_from_json(&descriptor, &value).expect("valid test message")
}

#[test]
fn test_valid_message_passes() {
    let message = encounter(json!({
        "status": "finished",
        "period": {"start": "2020-01-01T10:00:00Z", "end": "2020-01-01T11:00:00Z"}
    }));
    assert!(MessageValidator::new().validate(&message).is_ok());
}

#[test]
fn test_message_constraint_violation() {
    // End precedes start, violating the Period constraint.
    let message = encounter(json!({
        "status": "finished",
        "period": {"start": "2020-01-01T11:00:00Z", "end": "2020-01-01T10:00:00Z"}
    }));

    let error = MessageValidator::new().validate(&message).unwrap_err();
    assert!(error.is_constraint_violation());
    assert!(error
        .to_string()
        .contains("fhirpath-constraint-violation-Period"));
}

#[test]
fn test_field_constraint_violation() {
    // The period field requires a start.
    let message = encounter(json!({
        "status": "finished",
        "period": {"end": "2020-01-01T10:00:00Z"}
    }));

    let error = MessageValidator::new().validate(&message).unwrap_err();
    assert!(error.is_constraint_violation());
    assert!(error
        .to_string()
        .contains("fhirpath-constraint-violation-Encounter.period"));
}

#[test]
fn test_message_without_constrained_fields_passes() {
    let message = encounter(json!({"status": "planned"}));
    assert!(MessageValidator::new().validate(&message).is_ok());
}

#[test]
fn test_handler_receives_violation_details() {
    let message = encounter(json!({
        "status": "finished",
        "period": {"end": "2020-01-01T10:00:00Z"}
    }));

    let mut reports = Vec::new();
    let status = MessageValidator::new().validate_with_handler(&message, |parent, field, source| {
        reports.push((
            parent.descriptor().name().to_string(),
            field.map(|f| f.json_name().to_string()),
            source.to_string(),
        ));
        false
    });

    assert!(status.is_err());
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].0, "Encounter");
    assert_eq!(reports[0].1.as_deref(), Some("period"));
    assert_eq!(reports[0].2, "start.exists()");
}

#[test]
fn test_handler_halt_stops_traversal() {
    let period = Descriptor::builder("t.Period", StructureKind::ComplexType, FhirVersion::R4)
        .field("start", "start", Cardinality::Single, &core::date_time())
        .constraint("start.exists()")
        .constraint("start.count() = 1")
        .build();
    let message = message_from_json(&period, &json!({})).unwrap();

    // Both constraints fail; a halting handler sees only the first.
    let mut violations = 0;
    let halting = MessageValidator::new().validate_with_handler(&message, |_, _, _| {
        violations += 1;
        true
    });
    assert!(halting.is_err());
    assert_eq!(violations, 1);

    let mut all_violations = 0;
    let status = MessageValidator::new().validate_with_handler(&message, |_, _, _| {
        all_violations += 1;
        false
    });
    assert!(status.is_err());
    assert_eq!(all_violations, 2);
}

#[test]
fn test_first_status_wins_with_non_halting_handler() {
    let period = Descriptor::builder("t.Period", StructureKind::ComplexType, FhirVersion::R4)
        .field("start", "start", Cardinality::Single, &core::date_time())
        .constraint("start.exists()")
        .constraint("start.empty()")
        .build();
    let message = message_from_json(&period, &json!({})).unwrap();

    let mut sources = Vec::new();
    let status = MessageValidator::new().validate_with_handler(&message, |_, _, source| {
        sources.push(source.to_string());
        false
    });

    // Only the first constraint fails; its status is returned even though
    // traversal continued.
    assert_eq!(sources, vec!["start.exists()"]);
    assert!(status
        .unwrap_err()
        .to_string()
        .contains("\"start.exists()\""));
}

#[test]
fn test_uncompilable_constraint_is_skipped() {
    let descriptor = Descriptor::builder("t.Thing", StructureKind::Resource, FhirVersion::R4)
        .field("flag", "flag", Cardinality::Single, &core::boolean())
        .constraint("no_such_field.exists()")
        .constraint("flag")
        .build();

    // The first constraint fails to compile and is ignored; the second
    // still validates.
    let valid = message_from_json(&descriptor, &json!({"flag": true})).unwrap();
    assert!(MessageValidator::new().validate(&valid).is_ok());

    let invalid = message_from_json(&descriptor, &json!({"flag": false})).unwrap();
    assert!(MessageValidator::new().validate(&invalid).is_err());
}

#[test]
fn test_constraint_must_be_boolean() {
    let descriptor = Descriptor::builder("t.Thing", StructureKind::Resource, FhirVersion::R4)
        .field("status", "status", Cardinality::Single, &core::code())
        .constraint("status")
        .build();
    let message = message_from_json(&descriptor, &json!({"status": "x"})).unwrap();

    let error = MessageValidator::new().validate(&message).unwrap_err();
    assert!(matches!(error, FhirPathError::EvaluationError { .. }));
    assert!(error
        .to_string()
        .contains("Constraint did not evaluate to boolean"));
}

#[test]
fn test_cyclic_schema_terminates() {
    let node = Descriptor::new_cyclic(
        "t.Node",
        StructureKind::ComplexType,
        FhirVersion::R4,
        |cycle, builder| {
            builder
                .field("value", "value", Cardinality::Single, &core::integer())
                .recursive_field("child", "child", Cardinality::Repeated, cycle)
                .constraint("value.exists()")
        },
    );

    let message = message_from_json(
        &node,
        &json!({"value": 1, "child": [{"value": 2, "child": [{}]}]}),
    )
    .unwrap();

    let mut violations = 0;
    let status = MessageValidator::new().validate_with_handler(&message, |_, _, _| {
        violations += 1;
        false
    });

    // The innermost node is missing its value; validation recursed through
    // the cycle and stopped.
    assert!(status.is_err());
    assert_eq!(violations, 1);
}

#[test]
fn test_validator_cache_is_reused_across_calls() {
    let validator = MessageValidator::new();
    let good = encounter(json!({
        "status": "finished",
        "period": {"start": "2020-01-01T10:00:00Z", "end": "2020-01-01T11:00:00Z"}
    }));
    let bad = encounter(json!({
        "status": "finished",
        "period": {"end": "2020-01-01T10:00:00Z"}
    }));

    assert!(validator.validate(&good).is_ok());
    assert!(validator.validate(&bad).is_err());
    assert!(validator.validate(&good).is_ok());
}

#[test]
fn test_repeated_constrained_field_checks_every_element() {
    let period = period_type();
    let visit = Descriptor::builder("t.Visit", StructureKind::Resource, FhirVersion::R4)
        .field("period", "period", Cardinality::Repeated, &period)
        .field_constraint("start.exists()")
        .build();

    let message = message_from_json(
        &visit,
        &json!({"period": [
            {"start": "2020-01-01T10:00:00Z"},
            {"end": "2020-01-01T10:00:00Z"}
        ]}),
    )
    .unwrap();

    let mut violations = 0;
    let status = MessageValidator::new().validate_with_handler(&message, |_, _, _| {
        violations += 1;
        false
    });
    assert!(status.is_err());
    assert_eq!(violations, 1);
}

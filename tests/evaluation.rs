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

//! End-to-end evaluation over a Patient-shaped schema

use std::sync::Arc;

use serde_json::{json, Value};

use fhirpath_engine::{
    message_from_json, schema, CompiledExpression, EvaluationResult, FhirPathError, Message,
};

fn patient(value: Value) -> Arc<Message> {
    message_from_json(&schema::patient(), &value).expect("valid test message")
}

fn evaluate(expression: &str, message: &Arc<Message>) -> EvaluationResult {
    CompiledExpression::compile(&schema::patient(), expression)
        .expect("expression compiles")
        .evaluate(message)
        .expect("expression evaluates")
}

fn evaluate_err(expression: &str, message: &Arc<Message>) -> FhirPathError {
    CompiledExpression::compile(&schema::patient(), expression)
        .expect("expression compiles")
        .evaluate(message)
        .expect_err("expression fails")
}

fn strings(result: &EvaluationResult) -> Vec<String> {
    result
        .messages()
        .iter()
        .filter_map(|m| m.as_str().map(str::to_string))
        .collect()
}

fn smith_john() -> Arc<Message> {
    patient(json!({"name": [{"family": "Smith", "given": ["John"]}], "active": true}))
}

#[test]
fn test_member_access() {
    let result = evaluate("name.family", &smith_john());
    assert_eq!(strings(&result), vec!["Smith"]);
}

#[test]
fn test_count_comparison() {
    let result = evaluate("name.given.count() > 0", &smith_john());
    assert!(result.as_boolean().unwrap());
}

#[test]
fn test_exists_on_empty_repeated_field() {
    let message = patient(json!({"name": []}));
    assert!(!evaluate("name.exists()", &message).as_boolean().unwrap());
    assert!(evaluate("name.empty()", &message).as_boolean().unwrap());
}

#[test]
fn test_implies_with_negation() {
    let message = patient(json!({"active": true}));
    let result = evaluate("active implies active.not()", &message);
    assert!(!result.as_boolean().unwrap());
}

#[test]
fn test_where_filters_by_value_equality() {
    let message = patient(json!({"name": [{"family": "Smith"}, {"family": "Jones"}]}));
    let result = evaluate("name.where(family = 'Smith').family", &message);
    assert_eq!(strings(&result), vec!["Smith"]);
}

#[test]
fn test_cross_precision_date_time_comparison_is_empty() {
    let message = patient(json!({"birthDate": "2020-06-01"}));
    // Equal at year precision: neither < nor > holds.
    assert!(evaluate("birthDate < @2020", &message).messages().is_empty());
    assert!(evaluate("birthDate > @2020", &message).messages().is_empty());
    assert!(evaluate("birthDate < @2021", &message).as_boolean().unwrap());
    assert!(evaluate("birthDate >= @2020-06-01", &message).as_boolean().unwrap());
}

#[test]
fn test_evaluation_does_not_mutate_input() {
    let message = smith_john();
    let copy = smith_john();

    evaluate("name.family", &message);
    evaluate("name.where(family = 'Smith')", &message);
    evaluate("name.given.combine(name.given)", &message);

    assert_eq!(*message, *copy);
}

#[test]
fn test_to_string_is_idempotent() {
    let message = patient(json!({"birthDate": "2020-06-01", "multipleBirth": 2}));
    let once = evaluate("birthDate.toString()", &message);
    let twice = evaluate("birthDate.toString().toString()", &message);
    assert_eq!(once.as_string().unwrap(), twice.as_string().unwrap());
    assert_eq!(once.as_string().unwrap(), "2020-06-01");

    assert_eq!(
        evaluate("multipleBirth.toString()", &message).as_string().unwrap(),
        "2"
    );
}

#[test]
fn test_distinct_and_is_distinct_agree() {
    let message = patient(json!({"name": [{"given": ["a", "b", "a", "c"]}]}));
    assert_eq!(
        evaluate("name.given.distinct().count()", &message).as_integer().unwrap(),
        3
    );
    assert!(!evaluate("name.given.isDistinct()", &message).as_boolean().unwrap());
    assert!(evaluate("name.given.distinct().isDistinct()", &message).as_boolean().unwrap());
}

#[test]
fn test_union_is_commutative_under_set_equality() {
    let message = patient(json!({"name": [{"family": "Smith", "given": ["a", "b"]}]}));
    let mut left = strings(&evaluate("name.given | name.family", &message));
    let mut right = strings(&evaluate("name.family | name.given", &message));
    left.sort();
    right.sort();
    assert_eq!(left, right);

    // Union deduplicates by value-equality.
    assert_eq!(
        evaluate("name.given | name.given", &message).messages().len(),
        2
    );
}

#[test]
fn test_where_is_idempotent() {
    let message = patient(json!({"name": [{"family": "Smith"}, {"family": "Jones"}]}));
    let once = strings(&evaluate("name.where(family = 'Smith').family", &message));
    let twice = strings(&evaluate(
        "name.where(family = 'Smith').where(family = 'Smith').family",
        &message,
    ));
    assert_eq!(once, twice);
}

#[test]
fn test_double_negation() {
    let message = patient(json!({"active": false}));
    assert_eq!(
        evaluate("active.not().not()", &message).as_boolean().unwrap(),
        evaluate("active", &message).as_boolean().unwrap()
    );
    // Empty input propagates through both negations.
    assert!(evaluate("birthDate.not().not()", &message).messages().is_empty());
}

#[test]
fn test_first_and_tail_reconstruct_the_collection() {
    let message = patient(json!({"name": [{"given": ["a", "b", "c"]}]}));
    let all = strings(&evaluate("name.given", &message));
    let first = strings(&evaluate("name.given.first()", &message));
    let tail = strings(&evaluate("name.given.tail()", &message));

    let mut reconstructed = first;
    reconstructed.extend(tail);
    assert_eq!(reconstructed, all);
}

#[test]
fn test_comparison_dichotomy() {
    let message = patient(json!({"multipleBirth": 2}));
    assert!(evaluate("(multipleBirth < 3) xor (multipleBirth >= 3)", &message)
        .as_boolean()
        .unwrap());
    assert!(evaluate("(multipleBirth < 1) xor (multipleBirth >= 1)", &message)
        .as_boolean()
        .unwrap());
}

#[test]
fn test_empty_propagation_through_operators() {
    let message = patient(json!({}));

    assert!(evaluate("{} = true", &message).messages().is_empty());
    assert!(evaluate("birthDate = @2020", &message).messages().is_empty());
    assert!(evaluate("1 < {}", &message).messages().is_empty());
    assert!(evaluate("{} + 1", &message).messages().is_empty());
    assert!(evaluate("multipleBirth + 1", &message).messages().is_empty());
    assert!(evaluate("{} in name.given", &message).messages().is_empty());

    // The concatenation operator treats empty operands as empty strings.
    assert_eq!(evaluate("{} & 'a'", &message).as_string().unwrap(), "a");
    assert_eq!(evaluate("{} & {}", &message).as_string().unwrap(), "");
}

#[test]
fn test_three_valued_boolean_logic() {
    let message = patient(json!({}));

    assert!(evaluate("{} and true", &message).messages().is_empty());
    assert!(!evaluate("{} and false", &message).as_boolean().unwrap());
    assert!(evaluate("{} or true", &message).as_boolean().unwrap());
    assert!(evaluate("{} or false", &message).messages().is_empty());
    assert!(evaluate("{} xor true", &message).messages().is_empty());
    assert!(evaluate("{} implies true", &message).as_boolean().unwrap());
    assert!(evaluate("{} implies false", &message).messages().is_empty());
    assert!(evaluate("false implies {}", &message).as_boolean().unwrap());
}

#[test]
fn test_string_functions() {
    let message = smith_john();

    assert!(evaluate("name.family.startsWith('Sm')", &message).as_boolean().unwrap());
    assert!(!evaluate("name.family.startsWith('X')", &message).as_boolean().unwrap());
    assert!(evaluate("name.family.startsWith('')", &message).as_boolean().unwrap());
    assert!(evaluate("name.family.contains('mit')", &message).as_boolean().unwrap());
    assert!(evaluate("name.family.matches('S.*h')", &message).as_boolean().unwrap());
    // The whole input must match.
    assert!(!evaluate("name.family.matches('S')", &message).as_boolean().unwrap());
    assert_eq!(evaluate("name.family.length()", &message).as_integer().unwrap(), 5);
}

#[test]
fn test_invalid_regex_is_an_error() {
    let error = evaluate_err("name.family.matches('(')", &smith_john());
    assert!(matches!(error, FhirPathError::InvalidRegex { .. }));
}

#[test]
fn test_string_escapes_evaluate() {
    let message = patient(json!({}));
    assert_eq!(
        evaluate(r"'a\tb' & ''", &message).as_string().unwrap(),
        "a\tb"
    );
    assert_eq!(evaluate(r"'a\tb'.length()", &message).as_integer().unwrap(), 3);
    assert!(evaluate(r"'\n' = '\n'", &message).as_boolean().unwrap());
}

#[test]
fn test_concatenation_and_addition() {
    let message = patient(json!({"multipleBirth": 2}));
    assert_eq!(
        evaluate("name.family & 'x'", &smith_john()).as_string().unwrap(),
        "Smithx"
    );
    assert_eq!(evaluate("'a' + 'b'", &message).as_string().unwrap(), "ab");
    assert_eq!(evaluate("multipleBirth + 1", &patient(json!({"multipleBirth": 2}))).as_integer().unwrap(), 3);

    let error = evaluate_err("1 + 'a'", &message);
    assert!(matches!(error, FhirPathError::TypeError { .. }));

    let error = evaluate_err("2147483647 + 1", &message);
    assert!(matches!(error, FhirPathError::ArithmeticOverflow { .. }));
}

#[test]
fn test_polarity() {
    let message = patient(json!({"multipleBirth": 3}));
    assert_eq!(evaluate("-multipleBirth", &message).as_integer().unwrap(), -3);
    assert_eq!(evaluate("+multipleBirth", &message).as_integer().unwrap(), 3);
    assert!(evaluate("-birthDate", &message).messages().is_empty());
    assert_eq!(evaluate("-1.50", &message).as_decimal_text().unwrap(), "-1.50");
    assert!(matches!(
        evaluate_err("-name.family", &smith_john()),
        FhirPathError::TypeError { .. }
    ));
}

#[test]
fn test_indexer() {
    let message = patient(json!({"name": [{"family": "Smith"}, {"family": "Jones"}]}));
    assert_eq!(
        strings(&evaluate("name[1].family", &message)),
        vec!["Jones"]
    );
    assert!(evaluate("name[5]", &message).messages().is_empty());
    assert!(evaluate_err("name[{}]", &message).to_string().contains("Index must be present"));
}

#[test]
fn test_membership() {
    let message = patient(json!({"name": [{"given": ["John", "Q"]}]}));
    assert!(evaluate("'John' in name.given", &message).as_boolean().unwrap());
    assert!(!evaluate("'X' in name.given", &message).as_boolean().unwrap());
    assert!(evaluate("name.given contains 'Q'", &message).as_boolean().unwrap());
}

#[test]
fn test_combine_and_intersect() {
    let message = patient(json!({"name": [{"given": ["a", "b"]}]}));
    // combine concatenates without deduplication.
    assert_eq!(
        evaluate("name.given.combine(name.given).count()", &message).as_integer().unwrap(),
        4
    );
    assert_eq!(
        strings(&evaluate("name.given.intersect('b')", &message)),
        vec!["b"]
    );
    assert!(evaluate("name.given.intersect('x')", &message).messages().is_empty());
}

#[test]
fn test_select_and_all() {
    let message = patient(json!({"name": [{"family": "Smith"}, {"family": "Jones"}]}));
    assert_eq!(
        strings(&evaluate("name.select(family)", &message)),
        vec!["Smith", "Jones"]
    );
    assert!(evaluate("name.all(family.exists())", &message).as_boolean().unwrap());

    let partial = patient(json!({"name": [{"family": "Smith"}, {}]}));
    assert!(!evaluate("name.all(family.exists())", &partial).as_boolean().unwrap());
    // all() is vacuously true on the empty collection.
    assert!(evaluate("name.all(family.exists())", &patient(json!({}))).as_boolean().unwrap());
}

#[test]
fn test_iif() {
    let message = patient(json!({"active": true}));
    assert_eq!(
        evaluate("iif(active, 'yes', 'no')", &message).as_string().unwrap(),
        "yes"
    );
    assert_eq!(
        evaluate("iif(active.not(), 'yes', 'no')", &message).as_string().unwrap(),
        "no"
    );
    // Without an otherwise-branch an unmet criterion yields empty.
    assert!(evaluate("iif(active.not(), 'yes')", &message).messages().is_empty());
}

#[test]
fn test_type_check_and_cast() {
    let message = patient(json!({"birthDate": "2020-06-01", "active": true}));
    assert!(evaluate("birthDate is DateTime", &message).as_boolean().unwrap());
    assert!(evaluate("birthDate is dateTime", &message).as_boolean().unwrap());
    assert!(!evaluate("birthDate is Boolean", &message).as_boolean().unwrap());
    assert!(evaluate("active.is(Boolean)", &message).as_boolean().unwrap());

    assert_eq!(evaluate("active as Boolean", &message).messages().len(), 1);
    assert!(evaluate("active as DateTime", &message).messages().is_empty());
}

#[test]
fn test_children() {
    let message = smith_john();
    // Direct children of the patient: one name and one active flag.
    assert_eq!(evaluate("children().count()", &message).as_integer().unwrap(), 2);
    // Member lookup on children() resolves at evaluation time, and types
    // lacking the field contribute empty.
    assert_eq!(strings(&evaluate("children().family", &message)), vec!["Smith"]);
}

#[test]
fn test_has_value() {
    let message = smith_john();
    assert!(evaluate("active.hasValue()", &message).as_boolean().unwrap());
    assert!(!evaluate("name.hasValue()", &message).as_boolean().unwrap());
    assert!(!evaluate("birthDate.hasValue()", &message).as_boolean().unwrap());
}

#[test]
fn test_to_integer() {
    let message = patient(json!({"active": true}));
    assert_eq!(evaluate("'5'.toInteger()", &message).as_integer().unwrap(), 5);
    assert_eq!(evaluate("active.toInteger()", &message).as_integer().unwrap(), 1);
    assert_eq!(evaluate("3.toInteger()", &message).as_integer().unwrap(), 3);
    assert!(evaluate("'x'.toInteger()", &message).messages().is_empty());
}

#[test]
fn test_external_constants() {
    let message = patient(json!({}));
    assert_eq!(
        evaluate("%ucum", &message).as_string().unwrap(),
        "http://unitsofmeasure.org"
    );
    assert_eq!(
        evaluate("%sct", &message).as_string().unwrap(),
        "http://snomed.info/sct"
    );
    assert_eq!(
        evaluate("%loinc", &message).as_string().unwrap(),
        "http://loinc.org"
    );
}

#[test]
fn test_context_reference_from_nested_scope() {
    let message = smith_john();
    // Inside where(), %context still refers to the root patient.
    let result = evaluate("name.where(%context.active).family", &message);
    assert_eq!(strings(&result), vec!["Smith"]);
}

#[test]
fn test_this_reference() {
    let message = patient(json!({"name": [{"given": ["a", "b"]}]}));
    assert_eq!(
        evaluate("name.given.where($this = 'a').count()", &message).as_integer().unwrap(),
        1
    );
}

#[test]
fn test_decimal_comparisons() {
    let message = patient(json!({"weight": {"value": "70.0", "code": "kg", "system": "http://unitsofmeasure.org", "unit": "kg"}}));
    assert!(evaluate("weight.value > 60.5", &message).as_boolean().unwrap());
    assert!(evaluate("weight.value <= 70.0", &message).as_boolean().unwrap());
    // Textual equality distinguishes trailing zeros, the ordering does not.
    assert!(!evaluate("1.0 = 1.00", &message).as_boolean().unwrap());
    assert!(evaluate("1.0 <= 1.00", &message).as_boolean().unwrap());
    assert!(evaluate("1.0 >= 1.00", &message).as_boolean().unwrap());
}

#[test]
fn test_quantity_comparison() {
    let message = patient(json!({
        "weight": {"value": "70.0", "code": "kg", "system": "http://unitsofmeasure.org", "unit": "kg"},
        "height": {"value": "1.80", "code": "m", "system": "http://unitsofmeasure.org", "unit": "m"}
    }));

    assert!(evaluate("weight >= weight", &message).as_boolean().unwrap());
    assert!(!evaluate("weight > weight", &message).as_boolean().unwrap());

    // Differing units are respected, not converted.
    let error = evaluate_err("weight > height", &message);
    assert!(error.to_string().contains("same units"));
}

#[test]
fn test_comparison_requires_single_elements() {
    let message = patient(json!({"name": [{"given": ["a", "b"]}]}));
    let error = evaluate_err("name.given > 'a'", &message);
    assert!(matches!(error, FhirPathError::TypeError { .. }));
}

#[test]
fn test_string_ordering() {
    let message = patient(json!({}));
    assert!(evaluate("'abc' < 'abd'", &message).as_boolean().unwrap());
    assert!(evaluate("'abc' >= 'abc'", &message).as_boolean().unwrap());
}

#[test]
fn test_time_zone_aware_date_time_comparison() {
    let message = patient(json!({"birthDate": "2020-06-01T10:00:00+02:00"}));
    // Comparison is by civil time in each operand's own zone.
    assert!(evaluate("birthDate > @2020-06-01T08:00:00Z", &message).as_boolean().unwrap());
    assert!(evaluate("birthDate < @2020-06-01T11:00:00+02:00", &message).as_boolean().unwrap());
    assert!(evaluate("birthDate = @2020-06-01T10:00:00+02:00", &message).as_boolean().unwrap());
}

#[test]
fn test_result_narrowing_errors() {
    let message = smith_john();
    let result = evaluate("name", &message);
    assert!(result.as_boolean().is_err());
    assert!(result.as_integer().is_err());
    assert!(result.as_string().is_err());

    let result = evaluate("name.given", &patient(json!({"name": [{"given": ["a", "b"]}]})));
    assert!(result.as_string().is_err());
}

#[test]
fn test_compiled_expression_is_reusable_and_cloneable() {
    let expression = CompiledExpression::compile(&schema::patient(), "name.family").unwrap();
    let clone = expression.clone();
    assert_eq!(expression.source(), "name.family");

    let message = smith_john();
    assert_eq!(strings(&expression.evaluate(&message).unwrap()), vec!["Smith"]);
    assert_eq!(strings(&clone.evaluate(&message).unwrap()), vec!["Smith"]);
}

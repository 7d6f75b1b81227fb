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

//! Reflective schema descriptors
//!
//! A [`Descriptor`] describes a composite or primitive type: its full name,
//! structure kind, schema version and ordered fields. A [`FieldDescriptor`]
//! carries the wire name, the JSON name (FHIR renames reserved-word fields,
//! e.g. `class` becomes `class_value` on the wire), cardinality, the
//! referenced message type and any attached constraint expressions.

use std::fmt;
use std::sync::{Arc, Weak};

/// Structure definition kind of a type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructureKind {
    /// Simple value holder (boolean, integer, string, dateTime, ...)
    PrimitiveType,
    /// Composite data type (HumanName, SimpleQuantity, ...)
    ComplexType,
    /// Top-level resource (Patient, Observation, ...)
    Resource,
}

/// Schema version tag used to select the primitive handler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FhirVersion {
    /// FHIR STU3
    Stu3,
    /// FHIR R4
    R4,
}

/// Field cardinality
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    /// At most one value
    Single,
    /// Ordered list of values
    Repeated,
}

/// Value kind of a primitive type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveKind {
    /// true / false
    Boolean,
    /// 32-bit signed integer
    Integer,
    /// 32-bit unsigned integer (FHIR restricts it to 31 bits)
    UnsignedInt,
    /// Arbitrary-precision decimal kept in textual form
    Decimal,
    /// Unicode string
    String,
    /// Coded value, string-shaped on the wire
    Code,
    /// URI, string-shaped on the wire
    Uri,
    /// Instant with precision and time zone
    DateTime,
}

/// Reference to a field's message type. Recursive schemas hold a weak
/// reference back into the cycle; scalar value fields inside primitive
/// wrappers have no message type at all.
#[derive(Debug, Clone)]
enum TypeRef {
    None,
    Message(Arc<Descriptor>),
    Recursive(Weak<Descriptor>),
}

/// Immutable field metadata, owned by its containing [`Descriptor`]
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    name: String,
    json_name: String,
    cardinality: Cardinality,
    type_ref: TypeRef,
    containing_type: String,
    constraints: Vec<String>,
}

impl FieldDescriptor {
    /// Wire name of the field (may be a renamed reserved word)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// JSON name of the field, the name FHIRPath expressions use
    pub fn json_name(&self) -> &str {
        &self.json_name
    }

    /// Field cardinality
    pub fn cardinality(&self) -> Cardinality {
        self.cardinality
    }

    /// True if the field holds an ordered list of values
    pub fn is_repeated(&self) -> bool {
        self.cardinality == Cardinality::Repeated
    }

    /// Referenced message type, absent for raw scalar fields
    pub fn message_type(&self) -> Option<Arc<Descriptor>> {
        match &self.type_ref {
            TypeRef::None => None,
            TypeRef::Message(descriptor) => Some(descriptor.clone()),
            TypeRef::Recursive(weak) => weak.upgrade(),
        }
    }

    /// Full name of the containing type
    pub fn containing_type(&self) -> &str {
        &self.containing_type
    }

    /// Attached `fhir_path_constraint` expressions
    pub fn constraints(&self) -> &[String] {
        &self.constraints
    }
}

/// Immutable schema of a type: full name and ordered fields. Shared via
/// `Arc` and alive as long as the schema that produced it.
pub struct Descriptor {
    full_name: String,
    kind: StructureKind,
    version: FhirVersion,
    primitive_kind: Option<PrimitiveKind>,
    fields: Vec<FieldDescriptor>,
    constraints: Vec<String>,
}

// Recursive schemas make a derived Debug loop forever.
impl fmt::Debug for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Descriptor({})", self.full_name)
    }
}

impl Descriptor {
    /// Start building a composite descriptor
    pub fn builder(
        full_name: impl Into<String>,
        kind: StructureKind,
        version: FhirVersion,
    ) -> DescriptorBuilder {
        DescriptorBuilder {
            full_name: full_name.into(),
            kind,
            version,
            fields: Vec::new(),
            constraints: Vec::new(),
        }
    }

    /// Create a primitive wrapper descriptor with its scalar `value` field
    pub fn primitive(
        full_name: impl Into<String>,
        version: FhirVersion,
        primitive_kind: PrimitiveKind,
    ) -> Arc<Descriptor> {
        let full_name = full_name.into();
        let value_field = FieldDescriptor {
            name: "value".to_string(),
            json_name: "value".to_string(),
            cardinality: Cardinality::Single,
            type_ref: TypeRef::None,
            containing_type: full_name.clone(),
            constraints: Vec::new(),
        };
        Arc::new(Descriptor {
            full_name,
            kind: StructureKind::PrimitiveType,
            version,
            primitive_kind: Some(primitive_kind),
            fields: vec![value_field],
            constraints: Vec::new(),
        })
    }

    /// Build a descriptor whose fields may refer back to the descriptor
    /// itself. The closure receives a weak handle to the cycle for use with
    /// [`DescriptorBuilder::recursive_field`].
    pub fn new_cyclic(
        full_name: impl Into<String>,
        kind: StructureKind,
        version: FhirVersion,
        f: impl FnOnce(&Weak<Descriptor>, DescriptorBuilder) -> DescriptorBuilder,
    ) -> Arc<Descriptor> {
        let builder = Descriptor::builder(full_name, kind, version);
        Arc::new_cyclic(|weak| f(weak, builder).into_descriptor())
    }

    /// Full name of the type, e.g. `fhir.r4.core.Patient`
    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    /// Simple name of the type, the last segment of the full name
    pub fn name(&self) -> &str {
        self.full_name.rsplit('.').next().unwrap_or(&self.full_name)
    }

    /// Structure definition kind
    pub fn kind(&self) -> StructureKind {
        self.kind
    }

    /// Schema version tag
    pub fn version(&self) -> FhirVersion {
        self.version
    }

    /// True if this type is a simple value holder
    pub fn is_primitive(&self) -> bool {
        self.kind == StructureKind::PrimitiveType
    }

    /// Value kind for primitive types
    pub fn primitive_kind(&self) -> Option<PrimitiveKind> {
        self.primitive_kind
    }

    /// Ordered fields of the type
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// Field at the given position
    pub fn field(&self, index: usize) -> &FieldDescriptor {
        &self.fields[index]
    }

    /// Position of the field with the given JSON name.
    ///
    /// Lookup goes through the JSON name rather than the wire name because
    /// the schema renames reserved-word fields on the wire.
    pub fn field_index_by_json_name(&self, json_name: &str) -> Option<usize> {
        self.fields
            .iter()
            .position(|field| field.json_name == json_name)
    }

    /// Field with the given JSON name
    pub fn field_by_json_name(&self, json_name: &str) -> Option<&FieldDescriptor> {
        self.fields
            .iter()
            .find(|field| field.json_name == json_name)
    }

    /// Attached `fhir_path_message_constraint` expressions
    pub fn constraints(&self) -> &[String] {
        &self.constraints
    }
}

/// A field identified by its containing descriptor and position. Used by
/// compiled field accesses and by the validator's constraint tables.
#[derive(Debug, Clone)]
pub struct FieldRef {
    containing: Arc<Descriptor>,
    index: usize,
}

impl FieldRef {
    /// Create a field reference
    pub fn new(containing: Arc<Descriptor>, index: usize) -> Self {
        Self { containing, index }
    }

    /// The containing descriptor
    pub fn containing(&self) -> &Arc<Descriptor> {
        &self.containing
    }

    /// Position of the field within the containing descriptor
    pub fn index(&self) -> usize {
        self.index
    }

    /// The field metadata
    pub fn field(&self) -> &FieldDescriptor {
        self.containing.field(self.index)
    }
}

/// Builder for composite descriptors
pub struct DescriptorBuilder {
    full_name: String,
    kind: StructureKind,
    version: FhirVersion,
    fields: Vec<FieldDescriptor>,
    constraints: Vec<String>,
}

impl DescriptorBuilder {
    /// Add a message-typed field
    pub fn field(
        mut self,
        name: impl Into<String>,
        json_name: impl Into<String>,
        cardinality: Cardinality,
        message_type: &Arc<Descriptor>,
    ) -> Self {
        self.fields.push(FieldDescriptor {
            name: name.into(),
            json_name: json_name.into(),
            cardinality,
            type_ref: TypeRef::Message(message_type.clone()),
            containing_type: self.full_name.clone(),
            constraints: Vec::new(),
        });
        self
    }

    /// Add a field whose type is the descriptor under construction
    pub fn recursive_field(
        mut self,
        name: impl Into<String>,
        json_name: impl Into<String>,
        cardinality: Cardinality,
        cycle: &Weak<Descriptor>,
    ) -> Self {
        self.fields.push(FieldDescriptor {
            name: name.into(),
            json_name: json_name.into(),
            cardinality,
            type_ref: TypeRef::Recursive(cycle.clone()),
            containing_type: self.full_name.clone(),
            constraints: Vec::new(),
        });
        self
    }

    /// Attach a constraint expression to the most recently added field
    pub fn field_constraint(mut self, expression: impl Into<String>) -> Self {
        if let Some(field) = self.fields.last_mut() {
            field.constraints.push(expression.into());
        }
        self
    }

    /// Attach a message-level constraint expression
    pub fn constraint(mut self, expression: impl Into<String>) -> Self {
        self.constraints.push(expression.into());
        self
    }

    fn into_descriptor(self) -> Descriptor {
        Descriptor {
            full_name: self.full_name,
            kind: self.kind,
            version: self.version,
            primitive_kind: None,
            fields: self.fields,
            constraints: self.constraints,
        }
    }

    /// Finish the descriptor
    pub fn build(self) -> Arc<Descriptor> {
        Arc::new(self.into_descriptor())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_name() {
        let descriptor =
            Descriptor::primitive("fhir.r4.core.Boolean", FhirVersion::R4, PrimitiveKind::Boolean);
        assert_eq!(descriptor.name(), "Boolean");
        assert_eq!(descriptor.full_name(), "fhir.r4.core.Boolean");
        assert!(descriptor.is_primitive());
    }

    #[test]
    fn test_json_name_lookup() {
        let string_type =
            Descriptor::primitive("fhir.r4.core.String", FhirVersion::R4, PrimitiveKind::String);
        let descriptor = Descriptor::builder("test.Encounter", StructureKind::Resource, FhirVersion::R4)
            .field("class_value", "class", Cardinality::Single, &string_type)
            .build();

        // Resolution goes through the JSON name, not the wire name.
        assert!(descriptor.field_by_json_name("class").is_some());
        assert!(descriptor.field_by_json_name("class_value").is_none());
        assert_eq!(descriptor.field_index_by_json_name("class"), Some(0));
    }

    #[test]
    fn test_cyclic_descriptor() {
        let descriptor = Descriptor::new_cyclic(
            "test.Node",
            StructureKind::ComplexType,
            FhirVersion::R4,
            |cycle, builder| builder.recursive_field("child", "child", Cardinality::Repeated, cycle),
        );

        let child_type = descriptor.field(0).message_type().unwrap();
        assert_eq!(child_type.full_name(), "test.Node");
    }
}

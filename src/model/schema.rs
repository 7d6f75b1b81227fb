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

//! Minimal Patient-shaped schema for examples and tests

use std::sync::Arc;

use once_cell::sync::Lazy;

use crate::model::core;
use crate::model::descriptor::{Cardinality, Descriptor, FhirVersion, StructureKind};

static HUMAN_NAME: Lazy<Arc<Descriptor>> = Lazy::new(|| {
    Descriptor::builder("test.HumanName", StructureKind::ComplexType, FhirVersion::R4)
        // "use" is a reserved word in several languages; the wire name is
        // renamed while the JSON name stays "use".
        .field("use_value", "use", Cardinality::Single, &core::code())
        .field("family", "family", Cardinality::Single, &core::string())
        .field("given", "given", Cardinality::Repeated, &core::string())
        .build()
});

static CONTACT_POINT: Lazy<Arc<Descriptor>> = Lazy::new(|| {
    Descriptor::builder("test.ContactPoint", StructureKind::ComplexType, FhirVersion::R4)
        .field("system", "system", Cardinality::Single, &core::code())
        .field("value", "value", Cardinality::Single, &core::string())
        .build()
});

static PATIENT: Lazy<Arc<Descriptor>> = Lazy::new(|| {
    Descriptor::builder("test.Patient", StructureKind::Resource, FhirVersion::R4)
        .field("name", "name", Cardinality::Repeated, &HUMAN_NAME)
        .field("telecom", "telecom", Cardinality::Repeated, &CONTACT_POINT)
        .field("active", "active", Cardinality::Single, &core::boolean())
        .field("birth_date", "birthDate", Cardinality::Single, &core::date_time())
        .field(
            "multiple_birth",
            "multipleBirth",
            Cardinality::Single,
            &core::integer(),
        )
        .field("weight", "weight", Cardinality::Single, &core::simple_quantity())
        .field("height", "height", Cardinality::Single, &core::simple_quantity())
        .build()
});

/// HumanName descriptor
pub fn human_name() -> Arc<Descriptor> {
    HUMAN_NAME.clone()
}

/// ContactPoint descriptor
pub fn contact_point() -> Arc<Descriptor> {
    CONTACT_POINT.clone()
}

/// Patient descriptor
pub fn patient() -> Arc<Descriptor> {
    PATIENT.clone()
}

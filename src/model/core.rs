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

//! Core R4 datatype descriptors
//!
//! Values synthesized during evaluation (literals, booleans, arithmetic
//! results) are wrapped in these descriptors regardless of the schema
//! version of the input tree.

use std::sync::Arc;

use once_cell::sync::Lazy;

use crate::model::descriptor::{
    Cardinality, Descriptor, FhirVersion, PrimitiveKind, StructureKind,
};

static BOOLEAN: Lazy<Arc<Descriptor>> =
    Lazy::new(|| Descriptor::primitive("fhir.r4.core.Boolean", FhirVersion::R4, PrimitiveKind::Boolean));

static INTEGER: Lazy<Arc<Descriptor>> =
    Lazy::new(|| Descriptor::primitive("fhir.r4.core.Integer", FhirVersion::R4, PrimitiveKind::Integer));

static UNSIGNED_INT: Lazy<Arc<Descriptor>> = Lazy::new(|| {
    Descriptor::primitive(
        "fhir.r4.core.UnsignedInt",
        FhirVersion::R4,
        PrimitiveKind::UnsignedInt,
    )
});

static DECIMAL: Lazy<Arc<Descriptor>> =
    Lazy::new(|| Descriptor::primitive("fhir.r4.core.Decimal", FhirVersion::R4, PrimitiveKind::Decimal));

static STRING: Lazy<Arc<Descriptor>> =
    Lazy::new(|| Descriptor::primitive("fhir.r4.core.String", FhirVersion::R4, PrimitiveKind::String));

static CODE: Lazy<Arc<Descriptor>> =
    Lazy::new(|| Descriptor::primitive("fhir.r4.core.Code", FhirVersion::R4, PrimitiveKind::Code));

static URI: Lazy<Arc<Descriptor>> =
    Lazy::new(|| Descriptor::primitive("fhir.r4.core.Uri", FhirVersion::R4, PrimitiveKind::Uri));

static DATE_TIME: Lazy<Arc<Descriptor>> = Lazy::new(|| {
    Descriptor::primitive(
        "fhir.r4.core.DateTime",
        FhirVersion::R4,
        PrimitiveKind::DateTime,
    )
});

static SIMPLE_QUANTITY: Lazy<Arc<Descriptor>> = Lazy::new(|| {
    Descriptor::builder(
        "fhir.r4.core.SimpleQuantity",
        StructureKind::ComplexType,
        FhirVersion::R4,
    )
    .field("value", "value", Cardinality::Single, &DECIMAL)
    .field("unit", "unit", Cardinality::Single, &STRING)
    .field("system", "system", Cardinality::Single, &URI)
    .field("code", "code", Cardinality::Single, &CODE)
    .build()
});

/// Boolean descriptor
pub fn boolean() -> Arc<Descriptor> {
    BOOLEAN.clone()
}

/// Integer descriptor
pub fn integer() -> Arc<Descriptor> {
    INTEGER.clone()
}

/// UnsignedInt descriptor
pub fn unsigned_int() -> Arc<Descriptor> {
    UNSIGNED_INT.clone()
}

/// Decimal descriptor
pub fn decimal() -> Arc<Descriptor> {
    DECIMAL.clone()
}

/// String descriptor
pub fn string() -> Arc<Descriptor> {
    STRING.clone()
}

/// Code descriptor
pub fn code() -> Arc<Descriptor> {
    CODE.clone()
}

/// Uri descriptor
pub fn uri() -> Arc<Descriptor> {
    URI.clone()
}

/// DateTime descriptor
pub fn date_time() -> Arc<Descriptor> {
    DATE_TIME.clone()
}

/// SimpleQuantity descriptor
pub fn simple_quantity() -> Arc<Descriptor> {
    SIMPLE_QUANTITY.clone()
}

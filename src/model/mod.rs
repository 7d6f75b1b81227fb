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

//! Schema adapter: descriptors, messages and primitive handlers

pub mod core;
pub mod descriptor;
pub mod json;
pub mod message;
pub mod primitive;
pub mod schema;

pub use descriptor::{
    Cardinality, Descriptor, DescriptorBuilder, FieldDescriptor, FieldRef, FhirVersion,
    PrimitiveKind, StructureKind,
};
pub use json::message_from_json;
pub use message::{DateTimePrecision, DateTimeValue, Message, PrimitiveValue};
pub use primitive::{
    message_to_json_string, message_to_string, messages_to_string, primitive_handler_for,
    PrimitiveHandler, R4PrimitiveHandler, Stu3PrimitiveHandler,
};

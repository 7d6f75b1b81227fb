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

//! Message trees
//!
//! A [`Message`] is a live node in the data tree: a descriptor plus either a
//! primitive value or composite field storage indexed by field position.
//! Messages are read-only once built; evaluation never mutates them.

use std::sync::Arc;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};

use crate::error::{FhirPathError, Result};
use crate::model::core;
use crate::model::descriptor::{Descriptor, PrimitiveKind};

/// Precision carried by a date-time value
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DateTimePrecision {
    /// Year only, e.g. `2020`
    Year,
    /// Year and month, e.g. `2020-06`
    Month,
    /// Calendar date, e.g. `2020-06-01`
    Day,
    /// Date and time to whole seconds
    Second,
    /// Date and time with fractional seconds
    Microsecond,
}

/// A date-time instant with its precision. The offset is part of the value
/// and is honored by comparisons.
#[derive(Debug, Clone)]
pub struct DateTimeValue {
    /// The instant, carrying its original offset
    pub value: DateTime<FixedOffset>,
    /// Precision of the source representation
    pub precision: DateTimePrecision,
}

// The offset is part of the value: the same instant written in two zones is
// structurally distinct.
impl PartialEq for DateTimeValue {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
            && self.value.offset() == other.value.offset()
            && self.precision == other.precision
    }
}

impl DateTimeValue {
    /// Parse a FHIR date-time string at any supported precision.
    ///
    /// `2020`, `2020-06`, `2020-06-01`, `2020-06-01T10:00:00Z`,
    /// `2020-06-01T10:00:00.123456+02:00` and the offset-less variants are
    /// accepted; offset-less values are taken as UTC.
    pub fn parse(text: &str) -> Result<Self> {
        let malformed = || FhirPathError::evaluation_error(format!("Malformed date-time: {text}"));

        if text.len() == 4 && text.bytes().all(|b| b.is_ascii_digit()) {
            let year: i32 = text.parse().map_err(|_| malformed())?;
            let date = NaiveDate::from_ymd_opt(year, 1, 1).ok_or_else(malformed)?;
            return Ok(Self {
                value: midnight_utc(date),
                precision: DateTimePrecision::Year,
            });
        }

        if text.len() == 7 {
            if let Some((year, month)) = text.split_once('-') {
                let year: i32 = year.parse().map_err(|_| malformed())?;
                let month: u32 = month.parse().map_err(|_| malformed())?;
                let date = NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(malformed)?;
                return Ok(Self {
                    value: midnight_utc(date),
                    precision: DateTimePrecision::Month,
                });
            }
        }

        if text.len() == 10 {
            let date = NaiveDate::parse_from_str(text, "%Y-%m-%d").map_err(|_| malformed())?;
            return Ok(Self {
                value: midnight_utc(date),
                precision: DateTimePrecision::Day,
            });
        }

        let precision = if text.contains('.') {
            DateTimePrecision::Microsecond
        } else {
            DateTimePrecision::Second
        };

        if let Ok(value) = DateTime::parse_from_rfc3339(text) {
            return Ok(Self { value, precision });
        }

        // No offset given; interpret as UTC.
        let naive = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
            .map_err(|_| malformed())?;
        Ok(Self {
            value: Utc.from_utc_datetime(&naive).fixed_offset(),
            precision,
        })
    }

    /// ISO-8601 rendering at this value's precision
    pub fn iso_string(&self) -> String {
        let format = match self.precision {
            DateTimePrecision::Year => "%Y",
            DateTimePrecision::Month => "%Y-%m",
            DateTimePrecision::Day => "%Y-%m-%d",
            DateTimePrecision::Second => "%Y-%m-%dT%H:%M:%S%:z",
            DateTimePrecision::Microsecond => "%Y-%m-%dT%H:%M:%S%.6f%:z",
        };
        self.value.format(format).to_string()
    }
}

fn midnight_utc(date: NaiveDate) -> DateTime<FixedOffset> {
    let naive = date.and_hms_opt(0, 0, 0).unwrap_or(NaiveDateTime::MIN);
    Utc.from_utc_datetime(&naive).fixed_offset()
}

/// Value of a primitive message
#[derive(Debug, Clone, PartialEq)]
pub enum PrimitiveValue {
    /// true / false
    Boolean(bool),
    /// 32-bit signed integer
    Integer(i32),
    /// 31-bit unsigned integer
    UnsignedInt(u32),
    /// Decimal kept in its source textual form to preserve precision
    Decimal(String),
    /// Unicode string
    String(String),
    /// Coded value
    Code(String),
    /// URI
    Uri(String),
    /// Instant with precision and offset
    DateTime(DateTimeValue),
}

impl PrimitiveValue {
    /// Value kind of this primitive
    pub fn kind(&self) -> PrimitiveKind {
        match self {
            Self::Boolean(_) => PrimitiveKind::Boolean,
            Self::Integer(_) => PrimitiveKind::Integer,
            Self::UnsignedInt(_) => PrimitiveKind::UnsignedInt,
            Self::Decimal(_) => PrimitiveKind::Decimal,
            Self::String(_) => PrimitiveKind::String,
            Self::Code(_) => PrimitiveKind::Code,
            Self::Uri(_) => PrimitiveKind::Uri,
            Self::DateTime(_) => PrimitiveKind::DateTime,
        }
    }
}

#[derive(Debug, PartialEq)]
enum MessageValue {
    Primitive(PrimitiveValue),
    Composite(Vec<Vec<Arc<Message>>>),
}

/// A live node in the data tree. Caller-owned; shared via `Arc` so that
/// evaluation results can alias the input tree.
#[derive(Debug)]
pub struct Message {
    descriptor: Arc<Descriptor>,
    value: MessageValue,
}

impl PartialEq for Message {
    fn eq(&self, other: &Self) -> bool {
        self.descriptor.full_name() == other.descriptor.full_name() && self.value == other.value
    }
}

impl Message {
    /// Create a primitive message
    pub fn primitive(descriptor: &Arc<Descriptor>, value: PrimitiveValue) -> Arc<Message> {
        Arc::new(Message {
            descriptor: descriptor.clone(),
            value: MessageValue::Primitive(value),
        })
    }

    /// Create a composite message. `fields` is indexed by field position;
    /// missing trailing positions are treated as unset.
    pub fn composite(descriptor: &Arc<Descriptor>, mut fields: Vec<Vec<Arc<Message>>>) -> Arc<Message> {
        fields.resize_with(descriptor.fields().len(), Vec::new);
        Arc::new(Message {
            descriptor: descriptor.clone(),
            value: MessageValue::Composite(fields),
        })
    }

    /// Fresh Boolean message using the core descriptor
    pub fn boolean(value: bool) -> Arc<Message> {
        Self::primitive(&core::boolean(), PrimitiveValue::Boolean(value))
    }

    /// Fresh Integer message using the core descriptor
    pub fn integer(value: i32) -> Arc<Message> {
        Self::primitive(&core::integer(), PrimitiveValue::Integer(value))
    }

    /// Fresh Decimal message using the core descriptor
    pub fn decimal(text: impl Into<String>) -> Arc<Message> {
        Self::primitive(&core::decimal(), PrimitiveValue::Decimal(text.into()))
    }

    /// Fresh String message using the core descriptor
    pub fn string(value: impl Into<String>) -> Arc<Message> {
        Self::primitive(&core::string(), PrimitiveValue::String(value.into()))
    }

    /// Fresh DateTime message using the core descriptor
    pub fn date_time(value: DateTimeValue) -> Arc<Message> {
        Self::primitive(&core::date_time(), PrimitiveValue::DateTime(value))
    }

    /// This message's descriptor
    pub fn descriptor(&self) -> &Arc<Descriptor> {
        &self.descriptor
    }

    /// True if this message is a primitive value holder
    pub fn is_primitive(&self) -> bool {
        matches!(self.value, MessageValue::Primitive(_))
    }

    /// The primitive value, if any
    pub fn primitive_value(&self) -> Option<&PrimitiveValue> {
        match &self.value {
            MessageValue::Primitive(value) => Some(value),
            MessageValue::Composite(_) => None,
        }
    }

    /// Boolean value of a Boolean message
    pub fn as_boolean(&self) -> Option<bool> {
        match self.primitive_value() {
            Some(PrimitiveValue::Boolean(value)) => Some(*value),
            _ => None,
        }
    }

    /// Integer value of an Integer message
    pub fn as_integer(&self) -> Option<i32> {
        match self.primitive_value() {
            Some(PrimitiveValue::Integer(value)) => Some(*value),
            _ => None,
        }
    }

    /// String value of a string-shaped message (String, Code or Uri)
    pub fn as_str(&self) -> Option<&str> {
        match self.primitive_value() {
            Some(PrimitiveValue::String(value))
            | Some(PrimitiveValue::Code(value))
            | Some(PrimitiveValue::Uri(value)) => Some(value),
            _ => None,
        }
    }

    /// Textual value of a Decimal message
    pub fn as_decimal_text(&self) -> Option<&str> {
        match self.primitive_value() {
            Some(PrimitiveValue::Decimal(value)) => Some(value),
            _ => None,
        }
    }

    /// Date-time value of a DateTime message
    pub fn as_date_time(&self) -> Option<&DateTimeValue> {
        match self.primitive_value() {
            Some(PrimitiveValue::DateTime(value)) => Some(value),
            _ => None,
        }
    }

    /// Values of the field at the given position. Empty for primitives and
    /// out-of-range positions.
    pub fn field_values(&self, index: usize) -> &[Arc<Message>] {
        match &self.value {
            MessageValue::Composite(fields) => {
                fields.get(index).map(Vec::as_slice).unwrap_or(&[])
            }
            MessageValue::Primitive(_) => &[],
        }
    }

    /// Values of the field with the given JSON name
    pub fn field_values_by_json_name(&self, json_name: &str) -> &[Arc<Message>] {
        match self.descriptor.field_index_by_json_name(json_name) {
            Some(index) => self.field_values(index),
            None => &[],
        }
    }
}

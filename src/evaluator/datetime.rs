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

//! Date-time comparison at the coarsest common precision

use std::cmp::Ordering;

use chrono::{Datelike, Timelike};

use crate::model::message::{DateTimePrecision, DateTimeValue};

/// Compare two date-times at the coarser of the two precisions, honoring
/// each operand's own time zone.
///
/// Returns `None` when the operands carry different precisions and are
/// equal at the shared precision: the order is then undecidable and the
/// comparison yields an empty collection.
pub(crate) fn compare_date_times(left: &DateTimeValue, right: &DateTimeValue) -> Option<Ordering> {
    let precision = left.precision.min(right.precision);

    // Civil (wall-clock) time in each operand's own offset.
    let left_local = left.value.naive_local();
    let right_local = right.value.naive_local();

    let ordering = match precision {
        DateTimePrecision::Year => left_local.year().cmp(&right_local.year()),
        DateTimePrecision::Month => (left_local.year(), left_local.month())
            .cmp(&(right_local.year(), right_local.month())),
        DateTimePrecision::Day => left_local.date().cmp(&right_local.date()),
        DateTimePrecision::Second => second_tuple(&left_local).cmp(&second_tuple(&right_local)),
        DateTimePrecision::Microsecond => {
            // Compare to the second first to resolve time-zone differences,
            // then fall back to the sub-second component.
            let seconds = second_tuple(&left_local).cmp(&second_tuple(&right_local));
            if seconds == Ordering::Equal {
                left.value
                    .timestamp_subsec_micros()
                    .cmp(&right.value.timestamp_subsec_micros())
            } else {
                seconds
            }
        }
    };

    if ordering == Ordering::Equal && left.precision != right.precision {
        return None;
    }
    Some(ordering)
}

type SecondTuple = (i32, u32, u32, u32, u32, u32);

fn second_tuple(local: &chrono::NaiveDateTime) -> SecondTuple {
    (
        local.year(),
        local.month(),
        local.day(),
        local.hour(),
        local.minute(),
        local.second(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dt(text: &str) -> DateTimeValue {
        DateTimeValue::parse(text).unwrap()
    }

    #[test]
    fn test_same_precision_ordering() {
        assert_eq!(
            compare_date_times(&dt("2019"), &dt("2020")),
            Some(Ordering::Less)
        );
        assert_eq!(
            compare_date_times(&dt("2020-06-01"), &dt("2020-05-31")),
            Some(Ordering::Greater)
        );
        assert_eq!(
            compare_date_times(&dt("2020-06-01"), &dt("2020-06-01")),
            Some(Ordering::Equal)
        );
    }

    #[test]
    fn test_cross_precision_truncates_to_coarsest() {
        // Day-precision June 1st against year-precision 2020: equal at the
        // year, so the order is undecidable.
        assert_eq!(compare_date_times(&dt("2020-06-01"), &dt("2020")), None);
        assert_eq!(compare_date_times(&dt("2020"), &dt("2020-06-01")), None);

        // Different years decide regardless of precision.
        assert_eq!(
            compare_date_times(&dt("2019-12-31"), &dt("2020")),
            Some(Ordering::Less)
        );
    }

    #[test]
    fn test_time_zone_is_honored() {
        // Comparison is by civil time in each operand's own zone: the same
        // instant written in two zones compares by wall clock.
        assert_eq!(
            compare_date_times(
                &dt("2020-06-01T10:00:00+02:00"),
                &dt("2020-06-01T08:00:00Z")
            ),
            Some(Ordering::Greater)
        );

        // Civil-year truncation uses the local year of each operand: half
        // past midnight on new year in +02:00 stays in 2020 even though the
        // UTC instant is still in 2019.
        assert_eq!(
            compare_date_times(&dt("2020-01-01T00:30:00+02:00"), &dt("2020")),
            None
        );
    }

    #[test]
    fn test_sub_second_comparison() {
        assert_eq!(
            compare_date_times(
                &dt("2020-06-01T10:00:00.000001Z"),
                &dt("2020-06-01T10:00:00.000002Z")
            ),
            Some(Ordering::Less)
        );
    }
}

//! Conversion of statistical records into the JSON array literal sent to clients.
//!
//! Each record becomes `[millis,nanos,min,mean,max,count]` where `millis` is the
//! floor of the nanosecond timestamp divided by 10^6 and `nanos` is the
//! non-negative remainder. NaN and infinite values are written as `null`,
//! since JSON has no literal for them.

use std::fmt::Write;

use crate::protocol::StatisticalRecord;

const NANOS_PER_MILLI: i64 = 1_000_000;

/// Split a nanosecond timestamp into floored milliseconds and the remainder.
pub fn split_time(time: i64) -> (i64, i64) {
    (
        time.div_euclid(NANOS_PER_MILLI),
        time.rem_euclid(NANOS_PER_MILLI),
    )
}

/// An `f64` rendered as a JSON value.
struct JsonNumber(f64);

impl std::fmt::Display for JsonNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0.is_finite() {
            write!(f, "{}", self.0)
        } else {
            f.write_str("null")
        }
    }
}

/// Format records as `[[millis,nanos,min,mean,max,count],...]`.
pub fn format_records(records: &[StatisticalRecord]) -> String {
    if records.is_empty() {
        return "[]".to_string();
    }

    let mut out = String::with_capacity(2 + records.len() * 48);
    out.push('[');
    for (i, record) in records.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        let (millis, nanos) = split_time(record.time);
        // Writing to a String cannot fail.
        let _ = write!(
            out,
            "[{},{},{},{},{},{}]",
            millis,
            nanos,
            JsonNumber(record.min),
            JsonNumber(record.mean),
            JsonNumber(record.max),
            record.count
        );
    }
    out.push(']');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(time: i64) -> StatisticalRecord {
        StatisticalRecord {
            time,
            ..Default::default()
        }
    }

    #[test]
    fn test_empty() {
        assert_eq!(format_records(&[]), "[]");
    }

    #[test]
    fn test_negative_time_carries_down() {
        assert_eq!(format_records(&[record(-1)]), "[[-1,999999,0,0,0,0]]");
        assert_eq!(split_time(-1_000_000), (-1, 0));
        assert_eq!(split_time(-1_000_001), (-2, 999_999));
    }

    #[test]
    fn test_positive_split() {
        assert_eq!(split_time(1_500_000), (1, 500_000));
        assert_eq!(split_time(0), (0, 0));
    }

    #[test]
    fn test_multiple_records() {
        let records = [
            StatisticalRecord {
                time: 1_500_000,
                min: 1.0,
                mean: 2.25,
                max: 3.5,
                count: 7,
            },
            StatisticalRecord {
                time: 2_000_000,
                min: -0.5,
                mean: 0.0,
                max: 10.0,
                count: 1,
            },
        ];
        assert_eq!(
            format_records(&records),
            "[[1,500000,1,2.25,3.5,7],[2,0,-0.5,0,10,1]]"
        );
    }

    #[test]
    fn test_output_is_json() {
        let records = [record(123_456_789), record(-5)];
        let parsed: serde_json::Value = serde_json::from_str(&format_records(&records)).unwrap();
        assert_eq!(parsed[0][0], 123);
        assert_eq!(parsed[0][1], 456_789);
        assert_eq!(parsed[1][0], -1);
        assert_eq!(parsed[1][1], 999_995);
    }

    #[test]
    fn test_non_finite_values_are_null() {
        let records = [StatisticalRecord {
            time: 0,
            min: f64::NEG_INFINITY,
            mean: f64::NAN,
            max: f64::INFINITY,
            count: 2,
        }];
        let out = format_records(&records);
        assert_eq!(out, "[[0,0,null,null,null,2]]");
        assert!(serde_json::from_str::<serde_json::Value>(&out).is_ok());
    }
}

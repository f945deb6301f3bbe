//! Conversions from raw polled values to the strings and enums the API serves.
//!
//! Text-like attributes and power readings return `Result`; status, offline
//! reason and optical distance always produce a value, falling back to
//! "Unknown".

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use shared::types::{OfflineReason, OnuStatus};
use crate::snmp::PolledValue;

/// Rendering used for device timestamps
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const SERIAL_VENDOR_PREFIX: &str = "1,";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("expected {expected} value, got {found}")]
    UnexpectedKind {
        expected: &'static str,
        found: &'static str,
    },
    #[error("timestamp must be 8 bytes, got {0}")]
    TimestampLength(usize),
    #[error("{field} out of range: {value}")]
    OutOfRange { field: &'static str, value: u32 },
    #[error("not a valid date: {0}")]
    InvalidDate(String),
    #[error("cannot parse timestamp {0:?}")]
    Parse(String),
}

/// Name, description, IP address and type attributes
pub fn text(value: &PolledValue) -> Result<String, DecodeError> {
    match value {
        PolledValue::Text(s) => Ok(s.clone()),
        PolledValue::Bytes(b) => Ok(String::from_utf8_lossy(b).into_owned()),
        other => Err(DecodeError::UnexpectedKind {
            expected: "text",
            found: other.kind(),
        }),
    }
}

pub fn serial_number(value: &PolledValue) -> Result<String, DecodeError> {
    let raw = text(value)?;
    Ok(match raw.strip_prefix(SERIAL_VENDOR_PREFIX) {
        Some(rest) => rest.to_string(),
        None => raw,
    })
}

/// Rx/Tx power: raw × 0.002 − 30, in dBm with two decimals
pub fn optical_power(value: &PolledValue) -> Result<String, DecodeError> {
    let PolledValue::Integer(raw) = value else {
        return Err(DecodeError::UnexpectedKind {
            expected: "integer",
            found: value.kind(),
        });
    };

    let dbm = *raw as f64 * 0.002 - 30.0;
    let rendered = format!("{:.2}", dbm);
    if rendered == "-0.00" {
        return Ok("0.00".to_string());
    }
    Ok(rendered)
}

pub fn status(value: &PolledValue) -> OnuStatus {
    match value {
        PolledValue::Integer(code) => OnuStatus::from_code(*code),
        _ => OnuStatus::Unknown,
    }
}

pub fn offline_reason(value: &PolledValue) -> OfflineReason {
    match value {
        PolledValue::Integer(code) => OfflineReason::from_code(*code),
        _ => OfflineReason::Unknown,
    }
}

/// Distance in meters as a decimal string
pub fn optical_distance(value: &PolledValue) -> String {
    match value {
        PolledValue::Integer(meters) => meters.to_string(),
        _ => "Unknown".to_string(),
    }
}

/// SNMP DateAndTime, 8-byte form: year (u16 BE), month, day, hour, minute,
/// second, deci-seconds. Deci-seconds are ignored.
pub fn timestamp(value: &PolledValue) -> Result<String, DecodeError> {
    let PolledValue::Bytes(bytes) = value else {
        return Err(DecodeError::UnexpectedKind {
            expected: "bytes",
            found: value.kind(),
        });
    };
    if bytes.len() != 8 {
        return Err(DecodeError::TimestampLength(bytes.len()));
    }

    let year = u16::from_be_bytes([bytes[0], bytes[1]]);
    let month = check_range("month", bytes[2], 1, 12)?;
    let day = check_range("day", bytes[3], 1, 31)?;
    let hour = check_range("hour", bytes[4], 0, 23)?;
    let minute = check_range("minute", bytes[5], 0, 59)?;
    let second = check_range("second", bytes[6], 0, 59)?;

    let datetime = NaiveDate::from_ymd_opt(i32::from(year), month, day)
        .and_then(|date| date.and_hms_opt(hour, minute, second))
        .ok_or_else(|| DecodeError::InvalidDate(format!("{:04}-{:02}-{:02}", year, month, day)))?;

    Ok(datetime.format(TIMESTAMP_FORMAT).to_string())
}

fn check_range(field: &'static str, raw: u8, min: u8, max: u8) -> Result<u32, DecodeError> {
    if raw < min || raw > max {
        return Err(DecodeError::OutOfRange {
            field,
            value: u32::from(raw),
        });
    }
    Ok(u32::from(raw))
}

/// ONU id from a full instance OID: its last dot component. 0 if unparsable.
pub fn slot_id_from_address(address: &str) -> u32 {
    address
        .rsplit('.')
        .next()
        .and_then(|last| last.parse().ok())
        .unwrap_or(0)
}

fn parse_timestamp(s: &str) -> Result<NaiveDateTime, DecodeError> {
    NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT).map_err(|_| DecodeError::Parse(s.to_string()))
}

/// Time since `last_online`. The device clock runs `utc_offset` ahead of UTC.
pub fn uptime(last_online: &str, now: DateTime<Utc>, utc_offset: Duration) -> Result<String, DecodeError> {
    let since = parse_timestamp(last_online)?;
    let device_now = now.naive_utc() + utc_offset;
    Ok(format_duration(device_now - since))
}

/// Length of the outage that ended at `last_online`
pub fn downtime(last_online: &str, last_offline: &str) -> Result<String, DecodeError> {
    let online = parse_timestamp(last_online)?;
    let offline = parse_timestamp(last_offline)?;
    Ok(format_duration(online - offline))
}

/// "D days H hours M minutes S seconds". Negative spans render as zero.
pub fn format_duration(span: Duration) -> String {
    let total = span.num_seconds().max(0);
    let days = total / 86_400;
    let hours = (total % 86_400) / 3_600;
    let minutes = (total % 3_600) / 60;
    let seconds = total % 60;
    format!("{} days {} hours {} minutes {} seconds", days, hours, minutes, seconds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn bytes(b: &[u8]) -> PolledValue {
        PolledValue::Bytes(b.to_vec())
    }

    #[test]
    fn test_text_accepts_text_and_bytes() {
        assert_eq!(text(&PolledValue::Text("ZTE-F660".into())).unwrap(), "ZTE-F660");
        assert_eq!(text(&bytes(b"CPE-3")).unwrap(), "CPE-3");
        assert!(matches!(
            text(&PolledValue::Integer(4)),
            Err(DecodeError::UnexpectedKind { .. })
        ));
        assert!(text(&PolledValue::Absent).is_err());
    }

    #[test]
    fn test_serial_number_strips_vendor_prefix() {
        assert_eq!(serial_number(&bytes(b"1,ZTEGC8A1B2C3")).unwrap(), "ZTEGC8A1B2C3");
        assert_eq!(serial_number(&PolledValue::Text("ZTEGC8A1B2C3".into())).unwrap(), "ZTEGC8A1B2C3");
        // Only a leading prefix is removed
        assert_eq!(serial_number(&bytes(b"ZTEG1,23")).unwrap(), "ZTEG1,23");
        assert!(serial_number(&PolledValue::Integer(1)).is_err());
    }

    #[test]
    fn test_optical_power() {
        assert_eq!(optical_power(&PolledValue::Integer(10)).unwrap(), "-29.98");
        assert_eq!(optical_power(&PolledValue::Integer(0)).unwrap(), "-30.00");
        assert_eq!(optical_power(&PolledValue::Integer(4250)).unwrap(), "-21.50");
        assert_eq!(optical_power(&PolledValue::Integer(15000)).unwrap(), "0.00");
        assert!(matches!(
            optical_power(&bytes(b"10")),
            Err(DecodeError::UnexpectedKind { expected: "integer", .. })
        ));
    }

    #[test]
    fn test_status_table() {
        let expected = [
            OnuStatus::Logging,
            OnuStatus::Los,
            OnuStatus::Synchronization,
            OnuStatus::Online,
            OnuStatus::DyingGasp,
            OnuStatus::AuthFailed,
            OnuStatus::Offline,
        ];
        for (code, want) in (1..=7).zip(expected) {
            assert_eq!(status(&PolledValue::Integer(code)), want);
        }

        let mapped: std::collections::HashSet<_> =
            (1..=7).map(|c| status(&PolledValue::Integer(c))).collect();
        assert_eq!(mapped.len(), 7);

        for code in [0, 8, -1, 1000] {
            assert_eq!(status(&PolledValue::Integer(code)), OnuStatus::Unknown);
        }
        assert_eq!(status(&bytes(b"4")), OnuStatus::Unknown);
        assert_eq!(status(&PolledValue::Absent), OnuStatus::Unknown);
    }

    #[test]
    fn test_offline_reason_and_distance() {
        assert_eq!(offline_reason(&PolledValue::Integer(12)), OfflineReason::Reboot);
        assert_eq!(offline_reason(&PolledValue::Integer(99)), OfflineReason::Unknown);
        assert_eq!(offline_reason(&bytes(b"x")), OfflineReason::Unknown);

        assert_eq!(optical_distance(&PolledValue::Integer(1532)), "1532");
        assert_eq!(optical_distance(&PolledValue::Text("1532".into())), "Unknown");
    }

    #[test]
    fn test_timestamp_decode() {
        // 2024-03-09 14:05:33
        let raw = bytes(&[0x07, 0xe8, 3, 9, 14, 5, 33, 0]);
        assert_eq!(timestamp(&raw).unwrap(), "2024-03-09 14:05:33");
        // Deterministic on repeat
        assert_eq!(timestamp(&raw).unwrap(), timestamp(&raw).unwrap());
    }

    #[test]
    fn test_timestamp_valid_ranges_always_decode() {
        for month in 1..=12u8 {
            for (day, hour, minute, second) in [(1, 0, 0, 0), (28, 23, 59, 59), (15, 12, 30, 30)] {
                let raw = bytes(&[0x07, 0xe7, month, day, hour, minute, second, 9]);
                let rendered = timestamp(&raw).unwrap();
                let expected = format!(
                    "2023-{:02}-{:02} {:02}:{:02}:{:02}",
                    month, day, hour, minute, second
                );
                assert_eq!(rendered, expected);
            }
        }
    }

    #[test]
    fn test_timestamp_wrong_length_fails() {
        for len in (0..=16).filter(|&l| l != 8) {
            let raw = bytes(&vec![1u8; len]);
            assert_eq!(timestamp(&raw), Err(DecodeError::TimestampLength(len)));
        }
        assert!(timestamp(&PolledValue::Integer(20240309)).is_err());
    }

    #[test]
    fn test_timestamp_out_of_range_fails() {
        let cases: [([u8; 8], &str); 6] = [
            ([0x07, 0xe8, 0, 9, 14, 5, 33, 0], "month"),
            ([0x07, 0xe8, 13, 9, 14, 5, 33, 0], "month"),
            ([0x07, 0xe8, 3, 0, 14, 5, 33, 0], "day"),
            ([0x07, 0xe8, 3, 9, 24, 5, 33, 0], "hour"),
            ([0x07, 0xe8, 3, 9, 14, 60, 33, 0], "minute"),
            ([0x07, 0xe8, 3, 9, 14, 5, 60, 0], "second"),
        ];
        for (raw, field) in cases {
            match timestamp(&bytes(&raw)) {
                Err(DecodeError::OutOfRange { field: f, .. }) => assert_eq!(f, field),
                other => panic!("expected {} out of range, got {:?}", field, other),
            }
        }

        // In range per field, but not a real date
        let feb_30 = bytes(&[0x07, 0xe8, 2, 30, 0, 0, 0, 0]);
        assert!(matches!(timestamp(&feb_30), Err(DecodeError::InvalidDate(_))));
    }

    #[test]
    fn test_slot_id_from_address() {
        assert_eq!(slot_id_from_address("1.3.6.1.4.1.3902.1012.3.28.1.1.2.268501248.7"), 7);
        assert_eq!(slot_id_from_address("128"), 128);
        assert_eq!(slot_id_from_address("1.3.6.x"), 0);
        assert_eq!(slot_id_from_address(""), 0);
    }

    #[test]
    fn test_uptime_applies_offset() {
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 7, 0, 0).unwrap();
        // Device clock is UTC+7, so device-local "now" is 14:00
        let rendered = uptime("2024-03-09 12:30:15", now, Duration::hours(7)).unwrap();
        assert_eq!(rendered, "1 days 1 hours 29 minutes 45 seconds");
    }

    #[test]
    fn test_uptime_rejects_malformed_source() {
        let now = Utc::now();
        assert!(matches!(uptime("", now, Duration::zero()), Err(DecodeError::Parse(_))));
        assert!(uptime("2024/03/09 12:30:15", now, Duration::zero()).is_err());
    }

    #[test]
    fn test_downtime() {
        let rendered = downtime("2024-03-09 12:30:15", "2024-03-09 12:00:00").unwrap();
        assert_eq!(rendered, "0 days 0 hours 30 minutes 15 seconds");
        assert!(downtime("2024-03-09 12:30:15", "garbage").is_err());
    }

    #[test]
    fn test_format_duration_clamps_negative() {
        assert_eq!(format_duration(Duration::seconds(-5)), "0 days 0 hours 0 minutes 0 seconds");
        assert_eq!(
            format_duration(Duration::seconds(2 * 86_400 + 3 * 3_600 + 4 * 60 + 5)),
            "2 days 3 hours 4 minutes 5 seconds"
        );
    }
}

use chrono::{DateTime, SecondsFormat, Utc};

/// Current UTC time as an ISO-8601 string with millisecond precision.
pub fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Filesystem-safe rendering of `at`: ISO-8601 with `:` and `.` replaced by `-`.
pub fn backup_stamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
        .replace([':', '.'], "-")
}

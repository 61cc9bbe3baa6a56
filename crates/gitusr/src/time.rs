//! Time utilities for gitusr.
//!
//! The store file records when it was last written as an RFC 3339 string.

/// Return the current UTC time as an RFC 3339 string with millisecond precision.
pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

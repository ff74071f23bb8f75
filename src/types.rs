//! Core identifier and time types for the catalog.

/// SoftwareId: monotonic identifier of a catalogued software
pub type SoftwareId = u64;

/// InstanceId: monotonic identifier of a deployed instance
pub type InstanceId = u64;

/// Timestamp: milliseconds since the Unix epoch
pub type Timestamp = i64;

/// Current wall-clock time as a [`Timestamp`].
pub fn now_millis() -> Timestamp {
    chrono::Utc::now().timestamp_millis()
}

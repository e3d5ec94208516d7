//! Wall-clock timestamps recorded on attempts and history entries.

/// Milliseconds since the Unix epoch.
pub type Timestamp = u64;

/// Current wall-clock time. Clocks set before 1970 read as zero.
pub fn now_millis() -> Timestamp {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as Timestamp)
        .unwrap_or(0)
}

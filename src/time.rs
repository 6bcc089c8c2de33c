use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before epoch")
        .as_millis() as u64
}

/// Today's calendar date (UTC), used by the rolling-window scheduler.
pub fn today() -> chrono::NaiveDate {
    chrono::Utc::now().date_naive()
}

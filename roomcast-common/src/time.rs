//! Timestamp utilities
//!
//! Playback arithmetic runs on epoch seconds (f64, fractional) rather than
//! milliseconds so `duration * ratio` expressions stay in one unit.

use chrono::{DateTime, Utc};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Current wall clock as fractional epoch seconds
pub fn epoch_seconds() -> f64 {
    Utc::now().timestamp_millis() as f64 / 1000.0
}

/// Clamp a progress ratio to [0, 1]
pub fn clamp_ratio(ratio: f64) -> f64 {
    ratio.clamp(0.0, 1.0)
}

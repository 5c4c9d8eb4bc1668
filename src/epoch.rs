//! Conversions between local timestamps and epoch-second floats.
//!
//! The index persists intervals as `REAL` epoch seconds; everything else in
//! the crate works with local-timezone timestamps. These helpers round-trip
//! at microsecond resolution.

use chrono::{DateTime, Local, Utc};

/// Convert a local timestamp to floating-point epoch seconds.
pub fn to_epoch(ts: &DateTime<Local>) -> f64 {
    ts.timestamp() as f64 + f64::from(ts.timestamp_subsec_micros()) / 1_000_000.0
}

/// Convert floating-point epoch seconds back to a local timestamp.
///
/// Returns `None` for values outside the representable range.
pub fn from_epoch(secs: f64) -> Option<DateTime<Local>> {
    if !secs.is_finite() {
        return None;
    }
    let whole = secs.floor();
    let micros = ((secs - whole) * 1_000_000.0).round() as u32;
    let (whole, micros) = if micros >= 1_000_000 {
        (whole + 1.0, 0)
    } else {
        (whole, micros)
    };
    DateTime::<Utc>::from_timestamp(whole as i64, micros * 1_000)
        .map(|utc| utc.with_timezone(&Local))
}

/// The Unix epoch as a local timestamp.
pub fn origin() -> DateTime<Local> {
    DateTime::<Utc>::UNIX_EPOCH.with_timezone(&Local)
}

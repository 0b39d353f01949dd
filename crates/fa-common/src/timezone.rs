use chrono::{FixedOffset, Offset, Utc};

/// Offset (minutes east of UTC) used when deriving the attendance calendar day.
///
/// Check-in/check-out alternation resets at local midnight of this offset, so
/// every component that talks about "today" must agree on it.
pub const DEFAULT_ATTENDANCE_UTC_OFFSET_MINUTES: i32 = 0;

/// Returns `None` when the offset is outside ±24h.
pub fn attendance_offset(minutes_east: i32) -> Option<FixedOffset> {
    FixedOffset::east_opt(minutes_east.checked_mul(60)?)
}

pub fn utc_offset() -> FixedOffset {
    Utc.fix()
}

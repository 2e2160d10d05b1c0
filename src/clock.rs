// Wall clock helpers for the scheduled update check

use std::time::{SystemTime, UNIX_EPOCH};

// 2023-01-01T00:00:00Z. Anything earlier means SNTP has not synced yet.
const MIN_SYNCED_UNIX: u64 = 1_672_531_200;

/// Local (hour, minute) once the clock is set, `None` before that.
pub fn local_time(utc_offset_minutes: i16) -> Option<(u8, u8)> {
    let unix = SystemTime::now().duration_since(UNIX_EPOCH).ok()?.as_secs();
    hour_minute(unix, utc_offset_minutes)
}

pub fn hour_minute(unix_secs: u64, utc_offset_minutes: i16) -> Option<(u8, u8)> {
    if unix_secs < MIN_SYNCED_UNIX {
        return None;
    }
    let local = unix_secs as i64 + utc_offset_minutes as i64 * 60;
    let minutes_of_day = local.rem_euclid(86_400) / 60;
    Some(((minutes_of_day / 60) as u8, (minutes_of_day % 60) as u8))
}

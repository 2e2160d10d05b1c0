/// When the device loop should run an unattended update check
use crate::config::OtaConfig;

/// Minutes after the check hour during which a scheduled check may start.
const CHECK_WINDOW_MINUTES: u8 = 5;

/// Daily check at a per-unit hour, so a fleet of devices does not hit the
/// release server at the same moment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateSchedule {
    interval_ms: u64,
    check_hour: u8,
    last_check_ms: u64,
}

impl UpdateSchedule {
    pub fn new(interval_hours: u32, check_hour: u8) -> Self {
        Self {
            interval_ms: u64::from(interval_hours) * 60 * 60 * 1000,
            check_hour: check_hour % 24,
            last_check_ms: 0,
        }
    }

    /// Check hour is `check_hour + unit_index`, wrapped to a day.
    pub fn from_config(config: &OtaConfig) -> Self {
        let hour = (u16::from(config.check_hour) + u16::from(config.unit_index)) % 24;
        Self::new(config.check_interval_hours, hour as u8)
    }

    pub fn check_hour(&self) -> u8 {
        self.check_hour
    }

    /// `local_time` is `(hour, minute)` of the wall clock, `None` until time
    /// has been synchronized. Uptime counts from boot, so the first check
    /// comes one interval after power-on at the earliest.
    pub fn is_due(&self, uptime_ms: u64, local_time: Option<(u8, u8)>) -> bool {
        if uptime_ms.saturating_sub(self.last_check_ms) < self.interval_ms {
            return false;
        }
        match local_time {
            Some((hour, minute)) => hour == self.check_hour && minute < CHECK_WINDOW_MINUTES,
            None => false,
        }
    }

    pub fn mark_checked(&mut self, uptime_ms: u64) {
        self.last_check_ms = uptime_ms;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAY_MS: u64 = 24 * 60 * 60 * 1000;

    #[test]
    fn test_not_due_before_interval() {
        let schedule = UpdateSchedule::new(24, 3);
        assert!(!schedule.is_due(DAY_MS - 1, Some((3, 0))));
        assert!(schedule.is_due(DAY_MS, Some((3, 0))));
    }

    #[test]
    fn test_only_inside_check_window() {
        let schedule = UpdateSchedule::new(24, 3);
        assert!(schedule.is_due(DAY_MS, Some((3, 4))));
        assert!(!schedule.is_due(DAY_MS, Some((3, 5))));
        assert!(!schedule.is_due(DAY_MS, Some((4, 0))));
        assert!(!schedule.is_due(DAY_MS, None));
    }

    #[test]
    fn test_mark_checked_restarts_interval() {
        let mut schedule = UpdateSchedule::new(24, 3);
        schedule.mark_checked(DAY_MS);
        assert!(!schedule.is_due(DAY_MS + 60_000, Some((3, 1))));
        assert!(schedule.is_due(2 * DAY_MS, Some((3, 1))));
    }

    #[test]
    fn test_unit_index_staggers_hour() {
        let config = OtaConfig { unit_index: 2, ..OtaConfig::default() };
        assert_eq!(UpdateSchedule::from_config(&config).check_hour(), 5);

        let config = OtaConfig { check_hour: 23, unit_index: 3, ..OtaConfig::default() };
        assert_eq!(UpdateSchedule::from_config(&config).check_hour(), 2);
    }
}

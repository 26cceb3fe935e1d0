//! Quiet hours: suppresses dispatch on weekends and outside the business
//! day. Suppressed executions are revisited next tick, not rescheduled.

use chrono::{DateTime, Datelike, FixedOffset, NaiveDateTime, Offset, Timelike, Utc, Weekday};

use relance_core::config::QuietHoursConfig;
use relance_core::error::{RelanceError, RelanceResult};

#[derive(Debug, Clone)]
pub struct QuietHoursPolicy {
    start_hour: u32,
    end_hour: u32,
    weekends_quiet: bool,
    offset: FixedOffset,
}

impl QuietHoursPolicy {
    pub fn from_config(config: &QuietHoursConfig) -> RelanceResult<Self> {
        let offset = FixedOffset::east_opt(config.utc_offset_minutes * 60).ok_or_else(|| {
            RelanceError::Config(format!(
                "utc offset of {} minutes is out of range",
                config.utc_offset_minutes
            ))
        })?;
        Ok(Self {
            start_hour: config.start_hour,
            end_hour: config.end_hour,
            weekends_quiet: config.weekends_quiet,
            offset,
        })
    }

    /// True on weekends, and on weekdays before the start hour or at/after
    /// the end hour, in local time.
    pub fn is_quiet_local(&self, local: &NaiveDateTime) -> bool {
        if self.weekends_quiet && matches!(local.weekday(), Weekday::Sat | Weekday::Sun) {
            return true;
        }
        let hour = local.hour();
        hour < self.start_hour || hour >= self.end_hour
    }

    pub fn is_quiet_at(&self, now: DateTime<Utc>) -> bool {
        self.is_quiet_local(&now.with_timezone(&self.offset).naive_local())
    }
}

impl Default for QuietHoursPolicy {
    fn default() -> Self {
        Self {
            start_hour: 8,
            end_hour: 18,
            weekends_quiet: true,
            offset: Utc.fix(),
        }
    }
}

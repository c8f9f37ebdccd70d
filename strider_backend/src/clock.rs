use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use std::time::Duration;

/// Allowed posting hours, half-open `[open_hour, close_hour)` in the target zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleWindow {
    pub open_hour: u32,
    pub close_hour: u32,
}

impl ScheduleWindow {
    pub fn contains_hour(&self, hour: u32) -> bool {
        hour >= self.open_hour && hour < self.close_hour
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeOfDay {
    Dawn,
    Morning,
    Midday,
    Evening,
}

impl TimeOfDay {
    pub fn from_hour(hour: u32) -> Self {
        if hour < 9 {
            TimeOfDay::Dawn
        } else if hour < 12 {
            TimeOfDay::Morning
        } else if hour < 17 {
            TimeOfDay::Midday
        } else {
            TimeOfDay::Evening
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            TimeOfDay::Dawn => "dawn",
            TimeOfDay::Morning => "morning",
            TimeOfDay::Midday => "midday",
            TimeOfDay::Evening => "evening",
        }
    }

    pub fn narrative(self) -> &'static str {
        match self {
            TimeOfDay::Dawn => {
                "It is early. The streets are quiet, the air is cool, and you just got back \
                 from (or are about to head out for) a run before the world wakes up."
            }
            TimeOfDay::Morning => {
                "It is mid-morning. The run is done, coffee is in hand, and you are thinking \
                 about how the session went while your legs settle."
            }
            TimeOfDay::Midday => {
                "It is the middle of the day. You are between work and training, planning \
                 the next session and noticing how your body feels."
            }
            TimeOfDay::Evening => {
                "It is evening. The day is winding down, you are stretching or foam rolling, \
                 and looking back on today's effort."
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct Clock {
    tz: Tz,
    window: ScheduleWindow,
}

impl Clock {
    pub fn new(tz: Tz, window: ScheduleWindow) -> Self {
        Self { tz, window }
    }

    pub fn now_in_target_zone(&self) -> DateTime<Tz> {
        Utc::now().with_timezone(&self.tz)
    }

    pub fn is_within_window(&self, now: &DateTime<Tz>) -> bool {
        self.window.contains_hour(now.hour())
    }

    /// Zero while the window is open and nothing has been done today.
    pub fn time_until_next_window_open(&self, now: &DateTime<Tz>, acted_today: bool) -> Duration {
        let today = now.date_naive();
        let target_date = if acted_today || now.hour() >= self.window.close_hour {
            match today.succ_opt() {
                Some(date) => date,
                None => return Duration::ZERO,
            }
        } else if now.hour() < self.window.open_hour {
            today
        } else {
            return Duration::ZERO;
        };

        let open = self.local_instant(target_date, self.window.open_hour);
        (open - *now).to_std().unwrap_or(Duration::ZERO)
    }

    /// Seconds until the next local midnight.
    pub fn seconds_remaining_today(&self, now: &DateTime<Tz>) -> u64 {
        let Some(tomorrow) = now.date_naive().succ_opt() else {
            return 0;
        };
        let midnight = self.local_instant(tomorrow, 0);
        (midnight - *now).num_seconds().max(0) as u64
    }

    /// Resolve a local wall-clock hour on `date`. Hours skipped by a DST jump map forward
    /// to the next valid instant.
    fn local_instant(&self, date: NaiveDate, hour: u32) -> DateTime<Tz> {
        let mut naive =
            date.and_time(chrono::NaiveTime::default()) + ChronoDuration::hours(hour as i64);
        for _ in 0..3 {
            if let Some(dt) = self.tz.from_local_datetime(&naive).earliest() {
                return dt;
            }
            naive += ChronoDuration::hours(1);
        }
        self.tz.from_utc_datetime(&naive)
    }
}
